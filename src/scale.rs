use nalgebra::SVector;
use tracing::debug;

use crate::{
    distance::DistanceField,
    domain::Domain,
    error::{Result, SkeletonError},
    medial::{MedialAxis, MedialPoint, visible_balls},
    power::PowerSiteMap,
};

/// Builds the scale axis: the stable part of a medial axis under inflated balls.
///
/// Every ball of radius `r` is grown to `s * r`. Balls that end up inside the
/// union of their inflated neighbours are no longer the deepest ball anywhere and
/// drop out, so small features disappear first as `s` grows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleAxisBuilder {
    scale: f64,
    map: PowerSiteMap,
}

impl ScaleAxisBuilder {
    /// Fails with [`SkeletonError::InvalidParameter`] unless `scale` is a finite number `>= 1`.
    pub fn new(scale: f64) -> Result<Self> {
        if !scale.is_finite() || scale < 1. {
            return Err(SkeletonError::invalid_parameter(format!(
                "scale {scale} must be a finite number >= 1"
            )));
        }
        Ok(Self {
            scale,
            map: PowerSiteMap::default(),
        })
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.map = self.map.with_tolerance(tolerance);
        self
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Site weight of a ball with squared radius `squared_radius`.
    ///
    /// ```text
    /// w = r^2 + (s^2 - 1) r^2 = s^2 r^2
    /// ```
    pub fn weight(&self, squared_radius: f64) -> f64 {
        let growth = self.scale * self.scale - 1.;
        squared_radius + growth * squared_radius
    }

    /// Inflates `axis`, re-runs the power map over the inflated balls and keeps the
    /// stable ones. Reported squared radii are the inflated `s^2 r^2`.
    ///
    /// At `s = 1` the input is returned unchanged. An empty axis stays empty.
    pub fn build<const D: usize>(
        &self,
        domain: &Domain<D>,
        axis: &MedialAxis<D>,
    ) -> Result<MedialAxis<D>> {
        if self.scale == 1. {
            return Ok(axis.clone());
        }
        let inflated = axis
            .iter()
            .map(|ball| MedialPoint::new(ball.center, self.weight(ball.squared_radius)));
        let scale_axis = visible_balls(&self.map, domain, inflated)?;
        debug!(
            scale = self.scale,
            input = axis.len(),
            kept = scale_axis.len(),
            "built scale axis"
        );
        Ok(scale_axis)
    }

    /// Shrinks inflated balls back to their original radius, keeping the centers.
    pub fn deflate<const D: usize>(&self, axis: &MedialAxis<D>) -> MedialAxis<D> {
        let squared_scale = self.scale * self.scale;
        MedialAxis::from_balls(
            axis.iter()
                .map(|ball| MedialPoint::new(ball.center, ball.squared_radius / squared_scale))
                .collect(),
        )
    }
}

/// Deepest point of `field` as a ball.
///
/// When several points share the maximum distance, the one nearest to their
/// centroid wins, then the lexicographically smallest.
pub fn largest_inscribed_ball<const D: usize>(field: &DistanceField<D>) -> MedialPoint<D> {
    let deepest = field.max_squared_distance();
    let centers: Vec<_> = field
        .iter()
        .filter(|(_, sample)| sample.squared_distance == deepest)
        .map(|(point, _)| point)
        .collect();

    let centroid = centers
        .iter()
        .fold(SVector::<f64, D>::zeros(), |sum, point| sum + point.to_vector())
        / centers.len().max(1) as f64;

    let center = centers
        .iter()
        .min_by(|a, b| {
            let da = (a.to_vector() - centroid).norm_squared();
            let db = (b.to_vector() - centroid).norm_squared();
            da.total_cmp(&db).then_with(|| a.cmp(b))
        })
        .copied()
        .unwrap_or_else(|| field.domain().lower());

    MedialPoint::new(center, deepest as f64)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        distance::{Direction, SeparableDistanceField},
        types::Point2,
    };

    #[test]
    fn scale_below_one_is_rejected() {
        for scale in [0.5, 0.99, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                ScaleAxisBuilder::new(scale),
                Err(SkeletonError::InvalidParameter(_))
            ));
        }
        assert!(ScaleAxisBuilder::new(1.).is_ok());
    }

    #[test]
    fn weight_is_scaled_squared_radius() {
        let builder = ScaleAxisBuilder::new(1.5).unwrap();
        assert_relative_eq!(builder.weight(4.), 9.);
        assert_relative_eq!(ScaleAxisBuilder::new(1.).unwrap().weight(4.), 4.);
    }

    #[test]
    fn small_ball_next_to_large_one_disappears() {
        // r = 3 at x = 3 and r = 1 at x = 7: unscaled both are visible, at s = 2
        // the big ball (radius 6) reaches past x = 7 + 2.
        let domain = Domain::from_shape([11, 1]).unwrap();
        let axis = MedialAxis::from_balls(vec![
            MedialPoint::new(Point2::new([3, 0]), 9.),
            MedialPoint::new(Point2::new([7, 0]), 1.),
        ]);
        assert_eq!(ScaleAxisBuilder::new(1.).unwrap().build(&domain, &axis).unwrap(), axis);

        let builder = ScaleAxisBuilder::new(2.).unwrap();
        let scaled = builder.build(&domain, &axis).unwrap();
        assert_eq!(scaled.centers().collect::<Vec<_>>(), vec![Point2::new([3, 0])]);
        assert_relative_eq!(scaled.as_slice()[0].squared_radius, 36.);
        assert_relative_eq!(builder.deflate(&scaled).as_slice()[0].squared_radius, 9.);
    }

    #[test]
    fn empty_axis_scales_to_empty() {
        let domain = Domain::from_shape([4, 4]).unwrap();
        let scaled = ScaleAxisBuilder::new(3.)
            .unwrap()
            .build(&domain, &MedialAxis::default())
            .unwrap();
        assert!(scaled.is_empty());
    }

    #[test]
    fn inscribed_ball_of_a_row_is_its_middle() {
        let domain = Domain::from_shape([11, 11]).unwrap();
        let field =
            SeparableDistanceField::build(&domain, &|p: &Point2| p[1] == 0, Direction::Inward)
                .unwrap();
        let ball = largest_inscribed_ball(&field);
        assert_eq!(ball.center, Point2::new([5, 0]));
        assert_relative_eq!(ball.radius(), 1.);
    }

    #[test]
    fn inscribed_ball_of_even_tie_takes_smaller_point() {
        // Two deepest points (1,1) and (2,1) are equally far from their centroid.
        let domain = Domain::from_shape([4, 3]).unwrap();
        let field = SeparableDistanceField::build(
            &domain,
            &|p: &Point2| (1..=2).contains(&p[0]) && p[1] == 1,
            Direction::Inward,
        )
        .unwrap();
        let ball = largest_inscribed_ball(&field);
        assert_eq!(ball.center, Point2::new([1, 1]));
        assert_relative_eq!(ball.squared_radius, 1.);
    }
}
