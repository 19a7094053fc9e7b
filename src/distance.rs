use ndarray::{ArrayD, Dimension, Zip};
use tracing::debug;

use crate::{
    domain::{Domain, LatticeDomain, Occupancy},
    envelope::{self, Slot, TieRule},
    error::{Result, SkeletonError},
    power::{PowerAssignment, PowerCell},
    types::Point,
};

/// Which occupancy class provides the distance sites.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Sites are background points: distances measure depth inside the solid.
    #[default]
    Inward,
    /// Sites are foreground points: distances measure how far the background is from the solid.
    Outward,
}

impl Direction {
    /// Occupancy value of the site points.
    pub fn site_class(self) -> bool {
        matches!(self, Self::Outward)
    }

    pub fn reversed(self) -> Self {
        match self {
            Self::Inward => Self::Outward,
            Self::Outward => Self::Inward,
        }
    }
}

/// Squared distance from a point to its nearest site, and that site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DistanceSample<const D: usize> {
    pub squared_distance: i64,
    /// Lexicographically smallest among equidistant sites.
    pub nearest_site: Point<D>,
}

impl<const D: usize> DistanceSample<D> {
    /// Euclidean distance to the nearest site.
    pub fn distance(&self) -> f64 {
        (self.squared_distance as f64).sqrt()
    }
}

/// Exact squared Euclidean distance transform with its Voronoi sites.
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceField<const D: usize> {
    domain: Domain<D>,
    direction: Direction,
    samples: ArrayD<Option<DistanceSample<D>>>,
}

impl<const D: usize> DistanceField<D> {
    /// Reads a zero-weight site map as a distance field.
    ///
    /// With zero weights the power of a point is its squared distance to the nearest
    /// site and the primary owner is the smallest such site, so no transform is rerun.
    /// `direction` records which occupancy class the map's sites were taken from.
    pub fn from_site_map(site_map: &PowerAssignment<i64, D>, direction: Direction) -> Self {
        Self {
            domain: *site_map.domain(),
            direction,
            samples: samples_of(site_map.cells()),
        }
    }

    /// The box the field covers.
    pub fn domain(&self) -> &Domain<D> {
        &self.domain
    }

    /// Which occupancy class provided the sites.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Sample at `point`, or `None` outside the domain.
    pub fn get(&self, point: &Point<D>) -> Option<DistanceSample<D>> {
        self.domain
            .index_of(point)
            .and_then(|index| self.samples[&index[..]])
    }

    /// Exact squared distance from `point` to its nearest site.
    pub fn squared_distance(&self, point: &Point<D>) -> Option<i64> {
        self.get(point).map(|sample| sample.squared_distance)
    }

    /// Lexicographically smallest of the nearest sites of `point`.
    pub fn nearest_site(&self, point: &Point<D>) -> Option<Point<D>> {
        self.get(point).map(|sample| sample.nearest_site)
    }

    /// Euclidean distance from `point` to its nearest site.
    pub fn distance(&self, point: &Point<D>) -> Option<f64> {
        self.get(point).map(|sample| sample.distance())
    }

    /// Samples in lexicographic point order.
    pub fn iter(&self) -> impl Iterator<Item = (Point<D>, DistanceSample<D>)> + '_ {
        self.samples
            .indexed_iter()
            .filter_map(|(index, sample)| {
                sample.map(|sample| (self.domain.point_at(index.slice()), sample))
            })
    }

    /// Largest squared distance over the domain.
    pub fn max_squared_distance(&self) -> i64 {
        self.samples
            .iter()
            .flatten()
            .map(|sample| sample.squared_distance)
            .max()
            .unwrap_or(0)
    }
}

/// Exact separable distance transform.
///
/// One lower-envelope pass per axis turns the `(k - 1)`-dimensional partial field
/// into the `k`-dimensional one; after `D` passes every point holds
/// `min_s |p - s|^2` over all sites, as an integer.
pub struct SeparableDistanceField;

impl SeparableDistanceField {
    /// Samples `occupancy` over `domain` and transforms it.
    pub fn build<const D: usize>(
        domain: &Domain<D>,
        occupancy: &impl Occupancy<D>,
        direction: Direction,
    ) -> Result<DistanceField<D>> {
        Self::from_lattice(&LatticeDomain::sample(*domain, occupancy), direction)
    }

    /// Transforms an already sampled lattice.
    ///
    /// Fails with [`SkeletonError::EmptySiteSet`] unless both occupancy classes are
    /// present: without sites nothing can be measured, and without points of the
    /// other class there is no boundary to measure against.
    pub fn from_lattice<const D: usize>(
        lattice: &LatticeDomain<D>,
        direction: Direction,
    ) -> Result<DistanceField<D>> {
        let sites = Self::site_count(lattice, direction)?;
        let domain = *lattice.domain();
        let site_class = direction.site_class();

        let mut seeds: ArrayD<Slot<i64, D>> = ArrayD::from_elem(domain.array_shape(), None);
        domain.par_fill(&mut seeds, |point, slot| {
            if lattice.get(&point) == site_class {
                *slot = Some(PowerCell::seed(point, 0));
            }
        });

        let cells = envelope::separable_transform(seeds, TieRule::keep_smallest());
        let field = DistanceField {
            domain,
            direction,
            samples: samples_of(&cells),
        };
        debug!(
            ?direction,
            sites,
            max_squared_distance = field.max_squared_distance(),
            "built distance field"
        );
        Ok(field)
    }

    /// Number of sites `direction` measures against, once both classes are known to be present.
    pub(crate) fn site_count<const D: usize>(
        lattice: &LatticeDomain<D>,
        direction: Direction,
    ) -> Result<usize> {
        let sites = if direction.site_class() {
            lattice.foreground_count()
        } else {
            lattice.background_count()
        };
        if sites == 0 || sites == lattice.domain().len() {
            return Err(SkeletonError::EmptySiteSet);
        }
        Ok(sites)
    }
}

fn samples_of<const D: usize>(cells: &ArrayD<Slot<i64, D>>) -> ArrayD<Option<DistanceSample<D>>> {
    Zip::from(cells).par_map_collect(|slot| {
        slot.as_ref().and_then(|cell| {
            cell.primary_owner().map(|nearest_site| DistanceSample {
                squared_distance: cell.power,
                nearest_site,
            })
        })
    })
}
