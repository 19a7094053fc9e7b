#![cfg(feature = "auto_queue")]

use std::{thread, time::Duration};

use bevy::{app::TaskPoolPlugin, prelude::*};
use lattice_skeleton::{
    Domain, GeneratedSkeleton, LatticeDomain, Point3, SkeletonConfig, SkeletonPlugin, Volume,
};

fn cube(side: i64) -> LatticeDomain<3> {
    let domain = Domain::from_shape([side as usize + 2; 3]).unwrap();
    LatticeDomain::sample(domain, &move |p: &Point3| {
        (0..3).all(|axis| (1..=side).contains(&p[axis]))
    })
}

fn run_until_generated(app: &mut App, entity: Entity) -> GeneratedSkeleton {
    for _ in 0..500 {
        app.update();
        if let Some(generated) = app.world().get::<GeneratedSkeleton>(entity) {
            return generated.clone();
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("skeleton was never generated");
}

#[test]
fn volume_gets_a_skeleton() {
    let mut app = App::new();
    app.add_plugins((TaskPoolPlugin::default(), SkeletonPlugin::default()));
    let entity = app.world_mut().spawn(Volume::new(cube(5))).id();

    let generated = run_until_generated(&mut app, entity);
    assert_eq!(generated.inscribed_ball.center, Point3::new([3, 3, 3]));
    assert!(!generated.medial_axis.is_empty());
    assert_eq!(generated.medial_balls(0.5).len(), generated.medial_axis.len());
}

#[test]
fn changing_the_volume_recomputes() {
    let mut app = App::new();
    app.add_plugins((TaskPoolPlugin::default(), SkeletonPlugin::default()));
    let entity = app.world_mut().spawn(Volume::new(cube(3))).id();
    let first = run_until_generated(&mut app, entity);

    app.world_mut()
        .entity_mut(entity)
        .insert(Volume::new(cube(5)).with_config(SkeletonConfig::default().scale(1.5)));
    app.update();
    let second = run_until_generated(&mut app, entity);
    assert_ne!(first, second);
    assert_eq!(second.scale, 1.5);
}
