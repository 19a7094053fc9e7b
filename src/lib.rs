pub mod config;
pub mod distance;
pub mod domain;
mod envelope;
pub mod error;
pub mod medial;
pub mod plugin;
pub mod power;
pub mod scale;
pub mod skeleton;
pub mod types;

pub use config::{Metric, SkeletonConfig};
pub use distance::{Direction, DistanceField, DistanceSample, SeparableDistanceField};
pub use domain::{Domain, LatticeDomain, Occupancy};
pub use error::{Result, SkeletonError};
pub use medial::{Discriminator, MedialAxis, MedialAxisExtractor, MedialPoint};
pub use plugin::{
    GeneratedSkeleton, QueuedVolume, SkeletonPlugin, SkeletonSet, SkeletonTaskConfig, Volume,
};
pub use power::{DEFAULT_TIE_TOLERANCE, PowerAssignment, PowerCell, PowerSiteMap, PowerValue};
pub use scale::{ScaleAxisBuilder, largest_inscribed_ball};
pub use skeleton::Skeleton;
pub use types::{Point, Point2, Point3};
