//! End-to-end scenarios on small analytic shapes.

use approx::assert_relative_eq;
use lattice_skeleton::{
    Direction, Discriminator, Domain, LatticeDomain, MedialAxisExtractor, Point2, Point3,
    ScaleAxisBuilder, SeparableDistanceField, Skeleton, SkeletonConfig, SkeletonError,
    largest_inscribed_ball,
};

/// A 20 x 10 x 5 box of foreground with one background layer around it.
fn slab() -> LatticeDomain<3> {
    let domain = Domain::new(Point3::new([0, 0, 0]), Point3::new([21, 11, 6])).unwrap();
    LatticeDomain::sample(domain, &|p: &Point3| {
        (1..=20).contains(&p[0]) && (1..=10).contains(&p[1]) && (1..=5).contains(&p[2])
    })
}

/// The mid-depth sheet of [`slab`]: every point 3 away from the nearest face.
fn mid_sheet() -> Vec<Point3> {
    let mut sheet = Vec::new();
    for x in 3..=18 {
        for y in 3..=8 {
            sheet.push(Point3::new([x, y, 3]));
        }
    }
    sheet
}

#[test]
fn row_has_its_inscribed_ball_in_the_middle() {
    let domain = Domain::from_shape([11, 11]).unwrap();
    let lattice = LatticeDomain::from_points(domain, (0..=10).map(|x| Point2::new([x, 0])));
    let field = SeparableDistanceField::from_lattice(&lattice, Direction::Inward).unwrap();
    let ball = largest_inscribed_ball(&field);
    assert_eq!(ball.center, Point2::new([5, 0]));
    assert_relative_eq!(ball.radius(), 1.0);
}

#[test]
fn slab_axis_is_the_mid_sheet_with_angular_discriminator() {
    let extractor = MedialAxisExtractor::new(Discriminator::AngularThreshold(2.0944));
    let axis = extractor.reduced_medial_axis(&slab()).unwrap();
    assert_eq!(axis.centers().collect::<Vec<_>>(), mid_sheet());
    for ball in &axis {
        assert_relative_eq!(ball.radius(), 3.0);
    }
}

#[test]
fn slab_axis_is_the_mid_sheet_with_exact_ties() {
    let axis = MedialAxisExtractor::default().reduced_medial_axis(&slab()).unwrap();
    assert_eq!(axis.centers().collect::<Vec<_>>(), mid_sheet());
    for ball in &axis {
        assert_relative_eq!(ball.radius(), 3.0);
    }
}

#[test]
fn slab_edges_tie_but_do_not_survive_reduction() {
    // Points along the slab's edges tie two adjacent faces at a right angle.
    let lattice = slab();
    let extractor = MedialAxisExtractor::default();
    let site_map = extractor.site_map(&lattice).unwrap();
    let candidates = extractor.extract(&site_map);
    assert!(candidates.contains(&Point3::new([2, 2, 2])));
    assert!(candidates.len() > mid_sheet().len());

    let reduced = extractor.reduce(&site_map, &candidates).unwrap();
    assert!(!reduced.contains(&Point3::new([2, 2, 2])));
    assert_eq!(reduced.len(), mid_sheet().len());
}

#[test]
fn default_skeleton_of_the_slab() {
    let skeleton = Skeleton::compute(&slab(), &SkeletonConfig::default()).unwrap();
    assert_eq!(skeleton.medial_axis.centers().collect::<Vec<_>>(), mid_sheet());
    assert_eq!(skeleton.inscribed_ball.center[2], 3);
}

#[test]
fn unit_scale_reproduces_the_medial_axis() {
    let skeleton = Skeleton::compute(&slab(), &SkeletonConfig::default()).unwrap();
    assert_eq!(skeleton.scale_axis, skeleton.medial_axis);
    assert_relative_eq!(skeleton.inscribed_ball.radius(), 3.0);
}

#[test]
fn scale_axis_covers_the_medial_axis() {
    let lattice = slab();
    let domain = lattice.domain();
    let medial_axis = MedialAxisExtractor::default().reduced_medial_axis(&lattice).unwrap();

    for scale in [1.5, 2.0] {
        let scale_axis = ScaleAxisBuilder::new(scale)
            .unwrap()
            .build(domain, &medial_axis)
            .unwrap();
        assert!(scale_axis.len() <= medial_axis.len());
        assert!(scale_axis.iter().all(|ball| medial_axis.contains(&ball.center)));
        for point in domain.points().filter(|point| medial_axis.covers(point)) {
            assert!(scale_axis.covers(&point), "scale {scale}: {point:?} uncovered");
        }
    }
}

#[test]
fn larger_scale_simplifies_an_l_shape() {
    // A thick bar with a thin arm: the arm's small balls vanish under inflation.
    let domain = Domain::from_shape([24, 16]).unwrap();
    let lattice = LatticeDomain::sample(domain, &|p: &Point2| {
        let bar = (1..=12).contains(&p[0]) && (1..=14).contains(&p[1]);
        let arm = (13..=22).contains(&p[0]) && (6..=8).contains(&p[1]);
        bar || arm
    });
    let thin = Skeleton::compute(&lattice, &SkeletonConfig::default()).unwrap();
    let thick = Skeleton::compute(&lattice, &SkeletonConfig::default().scale(3.0)).unwrap();
    assert!(thick.scale_axis.len() < thin.scale_axis.len());
    assert!(thin.medial_axis.iter().any(|ball| ball.center[0] > 14));
}

#[test]
fn scale_below_one_is_invalid() {
    assert!(matches!(
        ScaleAxisBuilder::new(0.5),
        Err(SkeletonError::InvalidParameter(_))
    ));
    assert!(matches!(
        Skeleton::compute(&slab(), &SkeletonConfig::default().scale(0.5)),
        Err(SkeletonError::InvalidParameter(_))
    ));
}

#[test]
fn empty_domain_has_no_sites() {
    let lattice = LatticeDomain::empty(Domain::from_shape([5, 5, 5]).unwrap());
    for direction in [Direction::Inward, Direction::Outward] {
        assert_eq!(
            SeparableDistanceField::from_lattice(&lattice, direction).unwrap_err(),
            SkeletonError::EmptySiteSet
        );
    }
    assert_eq!(
        MedialAxisExtractor::default().reduced_medial_axis(&lattice).unwrap_err(),
        SkeletonError::EmptySiteSet
    );
    assert_eq!(
        Skeleton::compute(&lattice, &SkeletonConfig::default()).unwrap_err(),
        SkeletonError::EmptySiteSet
    );
}
