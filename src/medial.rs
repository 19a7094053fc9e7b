use std::{collections::BTreeSet, f64::consts::PI, str::FromStr};

use derive_more::Display;
use nalgebra::SVector;
use rayon::prelude::*;
use tracing::debug;

use crate::{
    distance::{Direction, SeparableDistanceField},
    domain::{Domain, LatticeDomain},
    error::{Result, SkeletonError},
    power::{PowerAssignment, PowerSiteMap, PowerValue},
    types::Point,
};

/// A medial ball: a lattice center and its squared radius.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MedialPoint<const D: usize> {
    pub center: Point<D>,
    pub squared_radius: f64,
}

impl<const D: usize> MedialPoint<D> {
    pub fn new(center: Point<D>, squared_radius: f64) -> Self {
        Self { center, squared_radius }
    }

    pub fn radius(&self) -> f64 {
        self.squared_radius.sqrt()
    }

    /// Whether `point` lies strictly inside the ball.
    pub fn contains(&self, point: &Point<D>) -> bool {
        (self.center.squared_distance(point) as f64) < self.squared_radius
    }
}

/// A set of medial balls, ordered by center.
///
/// Both the reduced medial axis and the scale axis are handed out in this form;
/// renderers usually want [`centers`](MedialAxis::centers) and
/// [`radii`](MedialAxis::radii) side by side.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MedialAxis<const D: usize> {
    balls: Vec<MedialPoint<D>>,
}

impl<const D: usize> MedialAxis<D> {
    /// Sorts by center and drops repeated centers.
    pub fn from_balls(mut balls: Vec<MedialPoint<D>>) -> Self {
        balls.sort_by(|a, b| a.center.cmp(&b.center));
        balls.dedup_by_key(|ball| ball.center);
        Self { balls }
    }

    pub fn len(&self) -> usize {
        self.balls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balls.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MedialPoint<D>> {
        self.balls.iter()
    }

    pub fn as_slice(&self) -> &[MedialPoint<D>] {
        &self.balls
    }

    pub fn centers(&self) -> impl Iterator<Item = Point<D>> + '_ {
        self.balls.iter().map(|ball| ball.center)
    }

    pub fn radii(&self) -> impl Iterator<Item = f64> + '_ {
        self.balls.iter().map(MedialPoint::radius)
    }

    /// The ball centered at `center`, if any.
    pub fn get(&self, center: &Point<D>) -> Option<&MedialPoint<D>> {
        self.balls
            .binary_search_by(|ball| ball.center.cmp(center))
            .ok()
            .map(|at| &self.balls[at])
    }

    pub fn contains(&self, center: &Point<D>) -> bool {
        self.get(center).is_some()
    }

    /// Whether some ball of the axis strictly contains `point`.
    pub fn covers(&self, point: &Point<D>) -> bool {
        self.balls.iter().any(|ball| ball.contains(point))
    }

    pub fn into_vec(self) -> Vec<MedialPoint<D>> {
        self.balls
    }
}

impl<'a, const D: usize> IntoIterator for &'a MedialAxis<D> {
    type Item = &'a MedialPoint<D>;
    type IntoIter = std::slice::Iter<'a, MedialPoint<D>>;

    fn into_iter(self) -> Self::IntoIter {
        self.balls.iter()
    }
}

/// Decides whether a point's site assignment marks it as medial.
#[derive(Clone, Copy, Debug, Default, PartialEq, Display)]
pub enum Discriminator {
    /// At least two sites reach the minimum power.
    #[default]
    #[display("exact-tie")]
    ExactTie,
    /// The displacement vectors to two competing sites open wider than the angle
    /// (radians). Catches axes that fall between lattice points, where exact ties
    /// never happen.
    #[display("angular-threshold({_0})")]
    AngularThreshold(f64),
}

impl Discriminator {
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::ExactTie => Ok(()),
            Self::AngularThreshold(theta) if theta > 0. && theta <= PI => Ok(()),
            Self::AngularThreshold(theta) => Err(SkeletonError::invalid_parameter(format!(
                "angular threshold {theta} must lie in (0, pi]"
            ))),
        }
    }

    /// Whether `point` is a raw medial candidate of `assignment`.
    ///
    /// Depends only on the assignment, never on the order points are visited.
    pub fn is_medial<V: PowerValue, const D: usize>(
        &self,
        point: &Point<D>,
        assignment: &PowerAssignment<V, D>,
    ) -> bool {
        let Some(cell) = assignment.get(point) else {
            return false;
        };
        match *self {
            Self::ExactTie => cell.is_shared(),
            Self::AngularThreshold(theta) => {
                if cell.is_shared() {
                    return widest_angle(point, &cell.owners) > theta;
                }
                let Some(own) = cell.primary_owner() else {
                    return false;
                };
                let to_own = point.displacement_to(&own);
                if to_own.norm() == 0. {
                    return false;
                }
                assignment.domain().axis_neighbors(point).any(|neighbor| {
                    let other = assignment.get(&neighbor).and_then(|cell| cell.primary_owner());
                    let Some(other) = other else {
                        return false;
                    };
                    if other == own || angle(&to_own, &point.displacement_to(&other)) <= theta {
                        return false;
                    }
                    // Of the two points straddling the bisector, flag the one closer to it.
                    let gap_here = point.squared_distance(&other) - point.squared_distance(&own);
                    let gap_there =
                        neighbor.squared_distance(&own) - neighbor.squared_distance(&other);
                    gap_here < gap_there || (gap_here == gap_there && *point < neighbor)
                })
            }
        }
    }
}

impl FromStr for Discriminator {
    type Err = SkeletonError;

    /// Parses `exact-tie` or `angular-threshold(theta)`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "exact-tie" {
            return Ok(Self::ExactTie);
        }
        let theta = s
            .strip_prefix("angular-threshold(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| {
                SkeletonError::invalid_parameter(format!("unknown discriminator `{s}`"))
            })?;
        let theta: f64 = theta
            .trim()
            .parse()
            .map_err(|_| SkeletonError::invalid_parameter(format!("bad angle in `{s}`")))?;
        let discriminator = Self::AngularThreshold(theta);
        discriminator.validate()?;
        Ok(discriminator)
    }
}

fn angle<const D: usize>(a: &SVector<f64, D>, b: &SVector<f64, D>) -> f64 {
    if a.norm() == 0. || b.norm() == 0. {
        return 0.;
    }
    a.angle(b)
}

/// Largest angle between displacement vectors from `point` to any two of `sites`.
fn widest_angle<const D: usize>(point: &Point<D>, sites: &[Point<D>]) -> f64 {
    let vectors: Vec<SVector<f64, D>> =
        sites.iter().map(|site| point.displacement_to(site)).collect();
    let mut widest = 0_f64;
    for (i, a) in vectors.iter().enumerate() {
        for b in &vectors[i + 1..] {
            widest = widest.max(angle(a, b));
        }
    }
    widest
}

/// Whether two of `sites` lie on opposing sides of `point`: their displacement
/// vectors meet at an obtuse angle. Computed on integer dot products.
fn has_opposing_sites<const D: usize>(point: &Point<D>, sites: &[Point<D>]) -> bool {
    let offsets: Vec<[i64; D]> = sites
        .iter()
        .map(|site| std::array::from_fn(|axis| site[axis] - point[axis]))
        .collect();
    offsets.iter().enumerate().any(|(i, a)| {
        offsets[i + 1..]
            .iter()
            .any(|b| a.iter().zip(b).map(|(a, b)| a * b).sum::<i64>() < 0)
    })
}

/// Scans a power assignment for medial points and filters them for stability.
///
/// ```text
/// PowerAssignment ──extract──▶ raw medial balls ──reduce──▶ reduced medial axis
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MedialAxisExtractor {
    discriminator: Discriminator,
    map: PowerSiteMap,
}

impl MedialAxisExtractor {
    pub fn new(discriminator: Discriminator) -> Self {
        Self {
            discriminator,
            ..Default::default()
        }
    }

    /// Sets the tie tolerance of the power map used by [`reduce`](Self::reduce).
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.map = self.map.with_tolerance(tolerance);
        self
    }

    pub fn discriminator(&self) -> Discriminator {
        self.discriminator
    }

    /// Every point the discriminator accepts, with radius `sqrt` of the unweighted
    /// distance to its primary owner.
    pub fn extract<V: PowerValue, const D: usize>(
        &self,
        assignment: &PowerAssignment<V, D>,
    ) -> MedialAxis<D> {
        let points: Vec<Point<D>> = assignment.domain().points().collect();
        let balls: Vec<MedialPoint<D>> = points
            .par_iter()
            .filter(|point| self.discriminator.is_medial(point, assignment))
            .filter_map(|point| {
                assignment
                    .get(point)
                    .map(|cell| MedialPoint::new(*point, cell.squared_distance as f64))
            })
            .collect();
        debug!(
            discriminator = %self.discriminator,
            candidates = balls.len(),
            "extracted medial points"
        );
        MedialAxis::from_balls(balls)
    }

    /// Stability filter: keeps the balls that are the deepest ball somewhere.
    ///
    /// With [`Discriminator::ExactTie`] a candidate first needs two owners in
    /// `assignment` on opposing sides of it. Ties between sites at a right angle or
    /// less are what convex lattice edges and corners produce. The angular
    /// discriminator already bounds the angle itself, so its candidates skip this step.
    ///
    /// The survivors then become power sites weighted by their squared radius. A
    /// ball survives when it owns some lattice point at negative power, i.e. a
    /// point strictly inside it that no other ball contains more deeply. Balls
    /// swallowed by their neighbours disappear.
    ///
    /// `assignment` must be the map `candidates` were extracted from.
    pub fn reduce<V: PowerValue, const D: usize>(
        &self,
        assignment: &PowerAssignment<V, D>,
        candidates: &MedialAxis<D>,
    ) -> Result<MedialAxis<D>> {
        let separated: Vec<MedialPoint<D>> = match self.discriminator {
            Discriminator::ExactTie => candidates
                .as_slice()
                .par_iter()
                .filter(|ball| {
                    assignment
                        .get(&ball.center)
                        .is_some_and(|cell| has_opposing_sites(&ball.center, &cell.owners))
                })
                .copied()
                .collect(),
            Discriminator::AngularThreshold(_) => candidates.iter().copied().collect(),
        };
        let separated_count = separated.len();
        let reduced = visible_balls(&self.map, assignment.domain(), separated)?;
        debug!(
            candidates = candidates.len(),
            separated = separated_count,
            kept = reduced.len(),
            "reduced medial axis"
        );
        Ok(reduced)
    }

    /// Zero-weight power map over the background sites.
    ///
    /// This is the inward distance transform with every tied site kept. It feeds
    /// both [`extract`](Self::extract) and [`reduce`](Self::reduce), and
    /// [`crate::DistanceField::from_site_map`] reads it as a distance field.
    pub fn site_map<const D: usize>(
        &self,
        lattice: &LatticeDomain<D>,
    ) -> Result<PowerAssignment<i64, D>> {
        SeparableDistanceField::site_count(lattice, Direction::Inward)?;
        self.map
            .build(lattice.domain(), lattice.background().map(|site| (site, 0_i64)))
    }

    /// Site map → extract → reduce.
    pub fn reduced_medial_axis<const D: usize>(
        &self,
        lattice: &LatticeDomain<D>,
    ) -> Result<MedialAxis<D>> {
        let site_map = self.site_map(lattice)?;
        let candidates = self.extract(&site_map);
        self.reduce(&site_map, &candidates)
    }
}

/// Balls owning at least one lattice point at negative power in their power map.
pub(crate) fn visible_balls<const D: usize>(
    map: &PowerSiteMap,
    domain: &Domain<D>,
    balls: impl IntoIterator<Item = MedialPoint<D>>,
) -> Result<MedialAxis<D>> {
    let balls: Vec<MedialPoint<D>> = balls.into_iter().collect();
    if balls.is_empty() {
        return Ok(MedialAxis::default());
    }

    let sites = balls.iter().map(|ball| (ball.center, ball.squared_radius));
    let assignment = map.build(domain, sites)?;
    let visible: BTreeSet<Point<D>> = assignment
        .cells()
        .par_iter()
        .flatten()
        .filter(|cell| cell.power < 0.)
        .flat_map_iter(|cell| cell.owners.iter().copied())
        .collect();

    Ok(MedialAxis::from_balls(
        balls.into_iter().filter(|ball| visible.contains(&ball.center)).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point2;

    fn rectangle(width: i64, height: i64) -> LatticeDomain<2> {
        let domain = Domain::from_shape([width as usize + 2, height as usize + 2]).unwrap();
        LatticeDomain::sample(domain, &move |p: &Point2| {
            (1..=width).contains(&p[0]) && (1..=height).contains(&p[1])
        })
    }

    fn zero_weight_map(lattice: &LatticeDomain<2>) -> PowerAssignment<i64, 2> {
        PowerSiteMap::new()
            .build(lattice.domain(), lattice.background().map(|site| (site, 0_i64)))
            .unwrap()
    }

    #[test]
    fn exact_tie_finds_the_midline_of_an_odd_strip() {
        // 9 x 3 strip: row y = 2 is equidistant from y = 0 and y = 4.
        let lattice = rectangle(9, 3);
        let axis = MedialAxisExtractor::default().extract(&zero_weight_map(&lattice));
        for x in 2..=8 {
            let ball = axis.get(&Point2::new([x, 2])).unwrap();
            assert_eq!(ball.squared_radius, 4.);
            assert_eq!(ball.radius(), 2.);
        }
        assert!(axis.iter().all(|ball| lattice.get(&ball.center)));
    }

    #[test]
    fn reduce_drops_corner_noise() {
        let lattice = rectangle(9, 3);
        let extractor = MedialAxisExtractor::default();
        let reduced = extractor.reduced_medial_axis(&lattice).unwrap();
        // Corner diagonals have radius 1 and sit inside radius-2 balls of the midline.
        assert!(reduced.iter().all(|ball| ball.squared_radius == 4.));
        assert_eq!(
            reduced.centers().collect::<Vec<_>>(),
            (2..=8).map(|x| Point2::new([x, 2])).collect::<Vec<_>>()
        );
    }

    #[test]
    fn even_strip_needs_the_angular_discriminator() {
        // 9 x 4 strip: the axis y = 2.5 falls between lattice rows.
        let lattice = rectangle(9, 4);
        let assignment = zero_weight_map(&lattice);
        let exact = MedialAxisExtractor::default().extract(&assignment);
        for x in 3..=7 {
            assert!(!exact.contains(&Point2::new([x, 2])));
            assert!(!exact.contains(&Point2::new([x, 3])));
        }

        let angular = MedialAxisExtractor::new(Discriminator::AngularThreshold(2. * PI / 3.))
            .extract(&assignment);
        for x in 3..=7 {
            assert!(angular.contains(&Point2::new([x, 2])), "x = {x}");
            assert!(!angular.contains(&Point2::new([x, 3])), "x = {x}");
        }
    }

    #[test]
    fn right_angle_ties_are_not_stable() {
        let lattice = rectangle(9, 3);
        let site_map = zero_weight_map(&lattice);
        let extractor = MedialAxisExtractor::default();
        let candidates = extractor.extract(&site_map);
        // (1, 1) ties (0, 1) and (1, 0); (2, 2) also ties (2, 0) and (2, 4).
        assert!(candidates.contains(&Point2::new([1, 1])));
        assert!(candidates.contains(&Point2::new([2, 2])));

        let reduced = extractor.reduce(&site_map, &candidates).unwrap();
        assert!(!reduced.contains(&Point2::new([1, 1])));
        assert!(reduced.contains(&Point2::new([2, 2])));
        assert_eq!(extractor.reduce(&site_map, &reduced).unwrap(), reduced);
    }

    #[test]
    fn square_reduces_to_its_center() {
        let lattice = rectangle(5, 5);
        let reduced = MedialAxisExtractor::default().reduced_medial_axis(&lattice).unwrap();
        assert_eq!(reduced.as_slice(), &[MedialPoint::new(Point2::new([3, 3]), 9.)]);
    }

    #[test]
    fn opposing_sites_need_an_obtuse_angle() {
        let point = Point2::new([2, 2]);
        assert!(!has_opposing_sites(&point, &[Point2::new([0, 2]), Point2::new([2, 0])]));
        assert!(has_opposing_sites(&point, &[Point2::new([0, 2]), Point2::new([4, 1])]));
        assert!(!has_opposing_sites(&point, &[Point2::new([0, 2])]));
    }

    #[test]
    fn empty_candidates_reduce_to_nothing() {
        let site_map = zero_weight_map(&rectangle(1, 1));
        let reduced = MedialAxisExtractor::default()
            .reduce(&site_map, &MedialAxis::default())
            .unwrap();
        assert!(reduced.is_empty());
    }

    #[test]
    fn reduced_axis_of_empty_shape_fails() {
        let lattice = LatticeDomain::empty(Domain::from_shape([4, 4]).unwrap());
        assert_eq!(
            MedialAxisExtractor::default().reduced_medial_axis(&lattice).unwrap_err(),
            SkeletonError::EmptySiteSet
        );
    }

    #[test]
    fn discriminator_parses_and_prints() {
        assert_eq!("exact-tie".parse::<Discriminator>().unwrap(), Discriminator::ExactTie);
        assert_eq!(
            "angular-threshold(1.5)".parse::<Discriminator>().unwrap(),
            Discriminator::AngularThreshold(1.5)
        );
        assert_eq!(Discriminator::AngularThreshold(1.5).to_string(), "angular-threshold(1.5)");
        assert_eq!(Discriminator::ExactTie.to_string(), "exact-tie");
        assert!("angular-threshold(7)".parse::<Discriminator>().is_err());
        assert!("voronoi".parse::<Discriminator>().is_err());
    }

    #[test]
    fn medial_axis_lookup_and_cover() {
        let axis = MedialAxis::from_balls(vec![
            MedialPoint::new(Point2::new([3, 3]), 4.),
            MedialPoint::new(Point2::new([1, 1]), 1.),
            MedialPoint::new(Point2::new([3, 3]), 9.),
        ]);
        assert_eq!(axis.len(), 2);
        assert_eq!(axis.centers().next(), Some(Point2::new([1, 1])));
        assert!(axis.covers(&Point2::new([4, 4])));
        assert!(!axis.covers(&Point2::new([5, 3])));
        assert_eq!(axis.radii().collect::<Vec<_>>(), vec![1., 2.]);
    }
}
