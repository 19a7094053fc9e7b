use std::ops::{Add, Mul, Sub};

use ndarray::{ArrayD, Dimension};
use tracing::debug;

use crate::{
    domain::Domain,
    envelope::{self, Slot, TieRule},
    error::{Result, SkeletonError},
    types::{MAX_EXACT_SQUARED, Point},
};

/// Values closer than this are treated as tied when weights are real-valued.
pub const DEFAULT_TIE_TOLERANCE: f64 = 1e-9;

/// Scalar type of power values `|p - s|^2 - w(s)`.
///
/// `i64` gives exact ties for integer weights; `f64` accepts real weights and
/// compares them with an explicit tolerance.
pub trait PowerValue: Copy + PartialOrd + std::fmt::Debug + Send + Sync + 'static {
    /// Wider type used to compare envelope breakpoints without division.
    type Wide: Copy
        + PartialOrd
        + Add<Output = Self::Wide>
        + Sub<Output = Self::Wide>
        + Mul<Output = Self::Wide>;

    /// Largest squared distance or weight magnitude represented exactly.
    const EXACT_LIMIT: i64;

    /// Power of a site at its own position when its weight is zero.
    const ZERO: Self;

    /// Converts to the breakpoint comparison type.
    fn widen(self) -> Self::Wide;

    /// Converts an integer coordinate expression to the breakpoint comparison type.
    fn wide(value: i64) -> Self::Wide;

    /// Approximate real value of a breakpoint quantity, for locating near ties.
    fn wide_to_f64(wide: Self::Wide) -> f64;

    /// `self + squared`, the value of a parabola `squared` units from its apex.
    fn plus_squared(self, squared: i64) -> Self;

    /// Turns a weight into the power of the site at its own position.
    fn negate(self) -> Self;

    /// Whether two powers are equal, within `tolerance` for inexact types.
    fn ties(self, other: Self, tolerance: f64) -> bool;

    /// Real value, for reporting.
    fn to_f64(self) -> f64;

    /// Rejects weights that cannot take part in an exact comparison.
    fn check_weight(self) -> Result<()>;
}

impl PowerValue for i64 {
    type Wide = i128;

    const EXACT_LIMIT: i64 = MAX_EXACT_SQUARED;

    const ZERO: Self = 0;

    fn widen(self) -> i128 {
        self as i128
    }

    fn wide(value: i64) -> i128 {
        value as i128
    }

    fn wide_to_f64(wide: i128) -> f64 {
        wide as f64
    }

    fn plus_squared(self, squared: i64) -> Self {
        self + squared
    }

    fn negate(self) -> Self {
        -self
    }

    fn ties(self, other: Self, _tolerance: f64) -> bool {
        self == other
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn check_weight(self) -> Result<()> {
        if self.unsigned_abs() > Self::EXACT_LIMIT as u64 {
            return Err(SkeletonError::numeric_overflow(format!(
                "weight {self} exceeds {}",
                Self::EXACT_LIMIT
            )));
        }
        Ok(())
    }
}

impl PowerValue for f64 {
    type Wide = f64;

    // Integers up to 2^53 are exact in an f64 mantissa.
    const EXACT_LIMIT: i64 = 1 << 53;

    const ZERO: Self = 0.;

    fn widen(self) -> f64 {
        self
    }

    fn wide(value: i64) -> f64 {
        value as f64
    }

    fn wide_to_f64(wide: f64) -> f64 {
        wide
    }

    fn plus_squared(self, squared: i64) -> Self {
        self + squared as f64
    }

    fn negate(self) -> Self {
        -self
    }

    fn ties(self, other: Self, tolerance: f64) -> bool {
        (self - other).abs() <= tolerance
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn check_weight(self) -> Result<()> {
        if !self.is_finite() {
            return Err(SkeletonError::invalid_parameter(format!("weight {self} is not finite")));
        }
        if self.abs() > Self::EXACT_LIMIT as f64 {
            return Err(SkeletonError::numeric_overflow(format!(
                "weight {self} exceeds {}",
                Self::EXACT_LIMIT
            )));
        }
        Ok(())
    }
}

/// Result of the power minimisation at one point.
#[derive(Clone, Debug, PartialEq)]
pub struct PowerCell<V, const D: usize> {
    /// `min_s |p - s|^2 - w(s)`.
    pub power: V,
    /// Every site reaching the minimum, ascending; `owners[0]` is the primary owner.
    pub owners: Vec<Point<D>>,
    /// Unweighted squared distance from the point to its primary owner.
    pub squared_distance: i64,
}

impl<V, const D: usize> PowerCell<V, D> {
    pub(crate) fn seed(site: Point<D>, power: V) -> Self {
        Self {
            power,
            owners: vec![site],
            squared_distance: 0,
        }
    }

    /// The smallest owner.
    pub fn primary_owner(&self) -> Option<Point<D>> {
        self.owners.first().copied()
    }

    /// Whether more than one site reaches the minimum.
    pub fn is_shared(&self) -> bool {
        self.owners.len() >= 2
    }
}

/// Power assignment of every domain point: the generalized (Laguerre) Voronoi map.
#[derive(Clone, Debug, PartialEq)]
pub struct PowerAssignment<V, const D: usize> {
    domain: Domain<D>,
    cells: ArrayD<Slot<V, D>>,
}

impl<V: PowerValue, const D: usize> PowerAssignment<V, D> {
    /// The box every point of which has a cell.
    pub fn domain(&self) -> &Domain<D> {
        &self.domain
    }

    /// The cell of `point`, or `None` outside the domain.
    pub fn get(&self, point: &Point<D>) -> Option<&PowerCell<V, D>> {
        self.domain
            .index_of(point)
            .and_then(|index| self.cells[&index[..]].as_ref())
    }

    /// Sites tied for the minimum at `point`, ascending; empty outside the domain.
    pub fn owners(&self, point: &Point<D>) -> &[Point<D>] {
        self.get(point).map_or(&[], |cell| cell.owners.as_slice())
    }

    /// Cells in lexicographic point order.
    pub fn iter(&self) -> impl Iterator<Item = (Point<D>, &PowerCell<V, D>)> + '_ {
        self.cells
            .indexed_iter()
            .filter_map(|(index, slot)| {
                slot.as_ref()
                    .map(|cell| (self.domain.point_at(index.slice()), cell))
            })
    }

    pub(crate) fn cells(&self) -> &ArrayD<Slot<V, D>> {
        &self.cells
    }
}

/// Builds [`PowerAssignment`]s from weighted sites.
///
/// ```text
/// power(p) = min over sites s of |p - s|^2 - w(s)
/// ```
///
/// Each weighted parabola has the same curvature as an unweighted one, so the
/// distance transform's separable lower-envelope passes apply unchanged.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PowerSiteMap {
    tolerance: f64,
}

impl Default for PowerSiteMap {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TIE_TOLERANCE,
        }
    }
}

impl PowerSiteMap {
    /// A map with the default tie tolerance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tie tolerance used for real-valued weights.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Tie tolerance for real-valued weights.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Assigns every point of `domain` to the sites minimizing its power distance.
    ///
    /// Sites must lie in the domain; a site given twice keeps its larger weight.
    /// Fails with [`SkeletonError::EmptySiteSet`] without sites and with
    /// [`SkeletonError::NumericOverflow`] when the domain diagonal or a weight
    /// leaves the exact range of `V`.
    pub fn build<V: PowerValue, const D: usize>(
        &self,
        domain: &Domain<D>,
        sites: impl IntoIterator<Item = (Point<D>, V)>,
    ) -> Result<PowerAssignment<V, D>> {
        if !(self.tolerance >= 0.) {
            return Err(SkeletonError::invalid_parameter(format!(
                "tie tolerance {} must be a non-negative number",
                self.tolerance
            )));
        }
        if domain.squared_diagonal() > V::EXACT_LIMIT {
            return Err(SkeletonError::numeric_overflow(format!(
                "squared diagonal {} exceeds {}",
                domain.squared_diagonal(),
                V::EXACT_LIMIT
            )));
        }

        let mut seeds: ArrayD<Slot<V, D>> = ArrayD::from_elem(domain.array_shape(), None);
        let mut site_count = 0_usize;
        for (site, weight) in sites {
            weight.check_weight()?;
            let index = domain.index_of(&site).ok_or_else(|| {
                SkeletonError::invalid_parameter(format!("site {site:?} lies outside the domain"))
            })?;
            let power = weight.negate();
            let slot = &mut seeds[&index[..]];
            if slot.as_ref().is_some_and(|existing| existing.power <= power) {
                continue;
            }
            if slot.is_none() {
                site_count += 1;
            }
            *slot = Some(PowerCell::seed(site, power));
        }
        if site_count == 0 {
            return Err(SkeletonError::EmptySiteSet);
        }

        let mut cells = envelope::separable_transform(seeds, TieRule::keep_all(self.tolerance));
        record_distances(domain, &mut cells);

        debug!(sites = site_count, points = domain.len(), "built power map");
        Ok(PowerAssignment {
            domain: *domain,
            cells,
        })
    }
}

/// Fills in the unweighted distance from each point to its primary owner.
pub(crate) fn record_distances<V: PowerValue, const D: usize>(
    domain: &Domain<D>,
    cells: &mut ArrayD<Slot<V, D>>,
) {
    domain.par_fill(cells, |point, slot| {
        if let Some(cell) = slot {
            cell.squared_distance = cell
                .owners
                .first()
                .map_or(0, |owner| point.squared_distance(owner));
        }
    });
}
