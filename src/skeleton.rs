use tracing::{info, info_span};

use crate::{
    config::SkeletonConfig,
    distance::{Direction, DistanceField},
    domain::LatticeDomain,
    error::Result,
    medial::{MedialAxis, MedialPoint},
    scale::{ScaleAxisBuilder, largest_inscribed_ball},
};

/// Everything one pipeline run produces, as plain owned data.
#[derive(Clone, Debug, PartialEq)]
pub struct Skeleton<const D: usize> {
    /// Reduced medial axis.
    pub medial_axis: MedialAxis<D>,
    /// Scale axis, with the inflated radii it was computed with.
    pub scale_axis: MedialAxis<D>,
    pub inscribed_ball: MedialPoint<D>,
    pub scale: f64,
}

impl<const D: usize> Skeleton<D> {
    /// Runs the full pipeline over `lattice`.
    ///
    /// ```text
    /// lattice ─▶ zero-weight power map ─┬▶ distance field ─▶ largest inscribed ball
    ///                                   └▶ medial points ─▶ reduced medial axis ─▶ scale axis
    /// ```
    ///
    /// The background is transformed once; the distance field is read off the same map.
    pub fn compute(lattice: &LatticeDomain<D>, config: &SkeletonConfig) -> Result<Self> {
        config.validate()?;
        let _span = info_span!(
            "skeleton",
            points = lattice.domain().len(),
            scale = config.scale
        )
        .entered();

        let extractor = config.extractor();
        let site_map = extractor.site_map(lattice)?;
        let field = DistanceField::from_site_map(&site_map, Direction::Inward);
        let inscribed_ball = largest_inscribed_ball(&field);
        let medial_axis = extractor.reduce(&site_map, &extractor.extract(&site_map))?;
        let scale_axis = config
            .scale_axis_builder()?
            .build(lattice.domain(), &medial_axis)?;

        info!(
            medial_axis = medial_axis.len(),
            scale_axis = scale_axis.len(),
            inscribed_radius = inscribed_ball.radius(),
            "computed skeleton"
        );
        Ok(Self {
            medial_axis,
            scale_axis,
            inscribed_ball,
            scale: config.scale,
        })
    }

    /// The scale axis centers with their original, uninflated radii.
    ///
    /// Fails only if `scale` was edited to something [`ScaleAxisBuilder::new`] rejects.
    pub fn deflated_scale_axis(&self) -> Result<MedialAxis<D>> {
        Ok(ScaleAxisBuilder::new(self.scale)?.deflate(&self.scale_axis))
    }
}
