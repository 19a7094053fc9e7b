use std::sync::Arc;

use bevy::{
    prelude::*,
    tasks::{AsyncComputeTaskPool, Task, block_on, futures_lite::future},
};
use tracing::warn;

use crate::{
    config::SkeletonConfig,
    domain::LatticeDomain,
    error::Result,
    skeleton::Skeleton,
};

/// System sets for the skeleton pipeline.
///
/// Use these to order your own systems relative to skeleton generation:
///
/// ```rust,ignore
/// app.add_systems(Update, draw_medial_balls.after(SkeletonSet::Generate));
/// ```
///
/// ```text
/// SkeletonSet::Spawn  →  [async compute]  →  SkeletonSet::Generate  →  [your systems]
/// ```
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum SkeletonSet {
    /// Spawns an async compute task for each queued volume.
    Spawn,
    /// Polls async tasks and inserts [`GeneratedSkeleton`] on completion.
    Generate,
}

/// A binary 3D volume whose skeleton should be computed.
///
/// `lattice` is wrapped in an [`Arc`] so the async task can read it without copying.
#[derive(Component, Clone, Debug)]
#[require(Transform)]
pub struct Volume {
    pub lattice: Arc<LatticeDomain<3>>,
    pub config: SkeletonConfig,
}

impl Volume {
    pub fn new(lattice: LatticeDomain<3>) -> Self {
        Self {
            lattice: Arc::new(lattice),
            config: SkeletonConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SkeletonConfig) -> Self {
        self.config = config;
        self
    }
}

/// Marker component added to [`Volume`] entities that are waiting for a task.
///
/// With the `auto_queue` feature disabled, insert it yourself to request a run.
#[derive(Component)]
pub struct QueuedVolume;

/// Holds the in-flight async compute task for a [`Volume`].
///
/// Removing it, or changing the volume, drops the task and discards its work.
#[derive(Component)]
pub struct SkeletonTask(Task<Result<Skeleton<3>>>);

/// The finished skeleton of a [`Volume`], in lattice coordinates.
#[derive(Component, Clone, Debug, PartialEq, Deref)]
pub struct GeneratedSkeleton(pub Skeleton<3>);

impl GeneratedSkeleton {
    /// Medial ball centers and radii, scaled by the entity's voxel size, ready for gizmos.
    pub fn medial_balls(&self, voxel_size: f32) -> Vec<(Vec3, f32)> {
        self.0
            .medial_axis
            .iter()
            .map(|ball| {
                let center = ball.center.to_vector().cast::<f32>();
                (
                    Vec3::new(center.x, center.y, center.z) * voxel_size,
                    ball.radius() as f32 * voxel_size,
                )
            })
            .collect()
    }
}

/// Runtime throttling of the skeleton tasks.
///
/// Inserted as a resource by [`SkeletonPlugin`]:
///
/// ```rust,ignore
/// fn my_system(mut config: ResMut<SkeletonTaskConfig>) {
///     config.max_tasks_per_frame = 1;
/// }
/// ```
#[derive(Resource)]
pub struct SkeletonTaskConfig {
    /// Maximum number of async skeleton tasks spawned per frame. Default: `2`.
    pub max_tasks_per_frame: usize,
}

impl Default for SkeletonTaskConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_frame: 2,
        }
    }
}

/// Bevy plugin that computes skeletons of [`Volume`]s in the background.
///
/// ```text
/// Volume added or changed
///   → QueuedVolume inserted, old task dropped   (on_volume_changed, `auto_queue` feature)
///   → SkeletonTask spawned                      (SkeletonSet::Spawn)
///   → [async compute runs]
///   → GeneratedSkeleton inserted                (SkeletonSet::Generate, once task completes)
/// ```
pub struct SkeletonPlugin {
    /// Initial value for [`SkeletonTaskConfig::max_tasks_per_frame`].
    pub max_tasks_per_frame: usize,
}

impl Default for SkeletonPlugin {
    fn default() -> Self {
        Self {
            max_tasks_per_frame: SkeletonTaskConfig::default().max_tasks_per_frame,
        }
    }
}

impl Plugin for SkeletonPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(SkeletonTaskConfig {
            max_tasks_per_frame: self.max_tasks_per_frame,
        })
        .configure_sets(Update, (SkeletonSet::Spawn, SkeletonSet::Generate).chain())
        .add_systems(
            Update,
            (
                spawn_skeleton_tasks.in_set(SkeletonSet::Spawn),
                poll_skeleton_tasks.in_set(SkeletonSet::Generate),
            ),
        );

        #[cfg(feature = "auto_queue")]
        app.add_systems(Update, on_volume_changed.before(SkeletonSet::Spawn));
    }
}

/// Queues every added or changed [`Volume`] and drops results computed for its old contents.
#[cfg(feature = "auto_queue")]
fn on_volume_changed(mut commands: Commands, query: Query<Entity, Changed<Volume>>) {
    for entity in query.iter() {
        commands
            .entity(entity)
            .insert(QueuedVolume)
            .remove::<(SkeletonTask, GeneratedSkeleton)>();
    }
}

/// Spawns async compute tasks for [`QueuedVolume`]s, up to
/// [`SkeletonTaskConfig::max_tasks_per_frame`] per frame.
fn spawn_skeleton_tasks(
    mut commands: Commands,
    config: Res<SkeletonTaskConfig>,
    query: Query<(Entity, &Volume), (With<QueuedVolume>, Without<SkeletonTask>)>,
) {
    let task_pool = AsyncComputeTaskPool::get();

    for (entity, volume) in query.iter().take(config.max_tasks_per_frame) {
        let lattice = Arc::clone(&volume.lattice);
        let config = volume.config;

        let task = task_pool.spawn(async move { Skeleton::compute(&lattice, &config) });

        commands
            .entity(entity)
            .insert(SkeletonTask(task))
            .remove::<QueuedVolume>();
    }
}

/// Polls in-flight [`SkeletonTask`]s each frame and inserts [`GeneratedSkeleton`] on success.
///
/// Non-blocking: tasks that haven't finished are skipped and retried next frame.
fn poll_skeleton_tasks(mut commands: Commands, mut query: Query<(Entity, &mut SkeletonTask)>) {
    for (entity, mut task) in query.iter_mut() {
        let Some(result) = block_on(future::poll_once(&mut task.0)) else {
            continue;
        };
        let mut entity_commands = commands.entity(entity);
        entity_commands.remove::<SkeletonTask>();
        match result {
            Ok(skeleton) => {
                entity_commands.insert(GeneratedSkeleton(skeleton));
            }
            Err(err) => warn!(?entity, %err, "skeleton computation failed"),
        }
    }
}
