//! Options recognized by the skeleton pipeline.

use std::str::FromStr;

use derive_more::Display;

use crate::{
    error::{Result, SkeletonError},
    medial::{Discriminator, MedialAxisExtractor},
    power::{DEFAULT_TIE_TOLERANCE, PowerSiteMap},
    scale::ScaleAxisBuilder,
};

/// Distance metric. Only the Euclidean one is supported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display)]
pub enum Metric {
    #[default]
    #[display("L2")]
    L2,
}

impl FromStr for Metric {
    type Err = SkeletonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "L2" => Ok(Self::L2),
            other => Err(SkeletonError::invalid_parameter(format!("unsupported metric `{other}`"))),
        }
    }
}

/// Parameters of a skeleton computation.
///
/// # Example
///
/// ```
/// use lattice_skeleton::{Discriminator, SkeletonConfig};
///
/// let config = SkeletonConfig::default()
///     .scale(1.5)
///     .discriminator(Discriminator::AngularThreshold(2.0));
/// assert!(config.validate().is_ok());
///
/// let parsed: SkeletonConfig = "scale=1.5, discriminator=angular-threshold(2)".parse().unwrap();
/// assert_eq!(parsed, config);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SkeletonConfig {
    pub metric: Metric,
    /// Ball inflation factor of the scale axis, `>= 1`.
    pub scale: f64,
    pub discriminator: Discriminator,
    /// Tie tolerance for real-valued power comparisons.
    pub tie_tolerance: f64,
}

impl Default for SkeletonConfig {
    fn default() -> Self {
        Self {
            metric: Metric::L2,
            scale: 1.0,
            discriminator: Discriminator::ExactTie,
            tie_tolerance: DEFAULT_TIE_TOLERANCE,
        }
    }
}

impl SkeletonConfig {
    #[must_use]
    pub const fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    #[must_use]
    pub const fn discriminator(mut self, discriminator: Discriminator) -> Self {
        self.discriminator = discriminator;
        self
    }

    #[must_use]
    pub const fn tie_tolerance(mut self, tie_tolerance: f64) -> Self {
        self.tie_tolerance = tie_tolerance;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.scale.is_finite() || self.scale < 1. {
            return Err(SkeletonError::invalid_parameter(format!(
                "scale {} must be a finite number >= 1",
                self.scale
            )));
        }
        if !(self.tie_tolerance >= 0.) {
            return Err(SkeletonError::invalid_parameter(format!(
                "tie tolerance {} must be a non-negative number",
                self.tie_tolerance
            )));
        }
        self.discriminator.validate()
    }

    /// Sets one option from its textual form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key.trim() {
            "metric" => self.metric = value.parse()?,
            "scale" => self.scale = parse_number(key, value)?,
            "discriminator" => self.discriminator = value.parse()?,
            "tie_tolerance" => self.tie_tolerance = parse_number(key, value)?,
            other => {
                return Err(SkeletonError::invalid_parameter(format!(
                    "unknown option `{other}`"
                )));
            }
        }
        Ok(())
    }

    pub fn power_map(&self) -> PowerSiteMap {
        PowerSiteMap::new().with_tolerance(self.tie_tolerance)
    }

    pub fn extractor(&self) -> MedialAxisExtractor {
        MedialAxisExtractor::new(self.discriminator).with_tolerance(self.tie_tolerance)
    }

    pub fn scale_axis_builder(&self) -> Result<ScaleAxisBuilder> {
        Ok(ScaleAxisBuilder::new(self.scale)?.with_tolerance(self.tie_tolerance))
    }
}

fn parse_number(key: &str, value: &str) -> Result<f64> {
    value.parse().map_err(|_| {
        SkeletonError::invalid_parameter(format!("`{key}` expects a number, got `{value}`"))
    })
}

impl FromStr for SkeletonConfig {
    type Err = SkeletonError;

    /// Parses `key=value` pairs separated by commas, on top of the defaults.
    ///
    /// Commas inside parentheses belong to the value.
    fn from_str(s: &str) -> Result<Self> {
        let mut config = Self::default();
        let mut depth = 0_usize;
        let mut start = 0;
        let mut entries = Vec::new();
        for (at, c) in s.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    entries.push(&s[start..at]);
                    start = at + 1;
                }
                _ => {}
            }
        }
        entries.push(&s[start..]);

        for entry in entries.into_iter().filter(|entry| !entry.trim().is_empty()) {
            let (key, value) = entry.split_once('=').ok_or_else(|| {
                SkeletonError::invalid_parameter(format!(
                    "expected key=value, got `{}`",
                    entry.trim()
                ))
            })?;
            config.set(key, value)?;
        }
        config.validate()?;
        Ok(config)
    }
}
