use ndarray::{ArrayD, Dimension, IxDyn};
use rayon::prelude::*;
use tracing::debug;

use crate::{
    error::{Result, SkeletonError},
    types::{MAX_EXACT_SQUARED, Point},
};

/// An occupancy predicate: `true` for foreground points, `false` for background.
///
/// Implemented for every `Fn(&Point<D>) -> bool + Sync` closure, so a shape can be
/// described analytically and sampled with [`LatticeDomain::sample`].
pub trait Occupancy<const D: usize>: Sync {
    fn is_foreground(&self, point: &Point<D>) -> bool;
}

impl<const D: usize, F> Occupancy<D> for F
where
    F: Fn(&Point<D>) -> bool + Sync,
{
    fn is_foreground(&self, point: &Point<D>) -> bool {
        self(point)
    }
}

/// Axis-aligned integer box `[lower, upper]`, bounds included.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Domain<const D: usize> {
    lower: Point<D>,
    upper: Point<D>,
}

impl<const D: usize> Domain<D> {
    /// Creates the box spanned by `lower` and `upper`.
    ///
    /// Fails with [`SkeletonError::InvalidParameter`] when `lower[i] > upper[i]` on
    /// some axis and with [`SkeletonError::NumericOverflow`] when the squared
    /// diagonal leaves the exact integer range or the point count does not fit an
    /// array.
    pub fn new(lower: Point<D>, upper: Point<D>) -> Result<Self> {
        if D == 0 {
            return Err(SkeletonError::invalid_parameter("domain needs at least one axis"));
        }
        let mut squared_diagonal: i64 = 0;
        let mut point_count: usize = 1;
        for axis in 0..D {
            if lower[axis] > upper[axis] {
                return Err(SkeletonError::invalid_parameter(format!(
                    "lower bound {} exceeds upper bound {} on axis {axis}",
                    lower[axis], upper[axis]
                )));
            }
            squared_diagonal = upper[axis]
                .checked_sub(lower[axis])
                .and_then(|extent| extent.checked_mul(extent))
                .and_then(|square| squared_diagonal.checked_add(square))
                .filter(|total| *total <= MAX_EXACT_SQUARED)
                .ok_or_else(|| {
                    SkeletonError::numeric_overflow(format!(
                        "squared diagonal of [{lower:?}, {upper:?}] exceeds {MAX_EXACT_SQUARED}"
                    ))
                })?;
            // Extent is known to be non-negative and small enough to square.
            point_count = usize::try_from(upper[axis] - lower[axis])
                .ok()
                .and_then(|extent| extent.checked_add(1))
                .and_then(|len| point_count.checked_mul(len))
                .filter(|count| *count <= isize::MAX as usize)
                .ok_or_else(|| {
                    SkeletonError::numeric_overflow(format!(
                        "[{lower:?}, {upper:?}] holds more points than an array can index"
                    ))
                })?;
        }
        Ok(Self { lower, upper })
    }

    /// The box `[0, shape[i] - 1]` on every axis.
    pub fn from_shape(shape: [usize; D]) -> Result<Self> {
        let mut upper = [0_i64; D];
        for (axis, &len) in shape.iter().enumerate() {
            if len == 0 {
                return Err(SkeletonError::invalid_parameter(format!("axis {axis} is empty")));
            }
            upper[axis] = i64::try_from(len - 1).map_err(|_| {
                SkeletonError::numeric_overflow(format!(
                    "axis {axis} length {len} does not fit i64"
                ))
            })?;
        }
        Self::new(Point([0; D]), Point(upper))
    }

    /// Smallest corner of the box.
    pub fn lower(&self) -> Point<D> {
        self.lower
    }

    /// Largest corner of the box, included in the domain.
    pub fn upper(&self) -> Point<D> {
        self.upper
    }

    /// Number of lattice points along each axis.
    pub fn shape(&self) -> [usize; D] {
        std::array::from_fn(|axis| (self.upper[axis] - self.lower[axis]) as usize + 1)
    }

    /// Total number of lattice points.
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    /// A domain always holds at least one point.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Largest squared distance between two points of the box.
    pub fn squared_diagonal(&self) -> i64 {
        self.lower.squared_distance(&self.upper)
    }

    /// Whether `point` lies in the box, bounds included.
    pub fn contains(&self, point: &Point<D>) -> bool {
        (0..D).all(|axis| self.lower[axis] <= point[axis] && point[axis] <= self.upper[axis])
    }

    /// Array index of `point`, or `None` outside the box.
    pub fn index_of(&self, point: &Point<D>) -> Option<[usize; D]> {
        self.contains(point)
            .then(|| std::array::from_fn(|axis| (point[axis] - self.lower[axis]) as usize))
    }

    /// Lattice point stored at array index `index`.
    pub fn point_at(&self, index: &[usize]) -> Point<D> {
        Point(std::array::from_fn(|axis| self.lower[axis] + index[axis] as i64))
    }

    /// Dynamic-dimension shape used by the field arrays.
    pub(crate) fn array_shape(&self) -> IxDyn {
        IxDyn(&self.shape())
    }

    /// Lattice point at position `flat` of the row-major point order.
    pub(crate) fn point_at_flat(&self, mut flat: usize) -> Point<D> {
        let shape = self.shape();
        let mut index = [0_usize; D];
        for axis in (0..D).rev() {
            index[axis] = flat % shape[axis];
            flat /= shape[axis];
        }
        self.point_at(&index)
    }

    /// All points, lexicographically (last axis fastest).
    pub fn points(&self) -> impl Iterator<Item = Point<D>> + '_ {
        (0..self.len()).map(move |flat| self.point_at_flat(flat))
    }

    /// Calls `fill` with every point of the domain and its cell of `cells`, in parallel.
    ///
    /// `cells` must have [`array_shape`](Self::array_shape).
    pub(crate) fn par_fill<T, F>(&self, cells: &mut ArrayD<T>, fill: F)
    where
        T: Send,
        F: Fn(Point<D>, &mut T) + Sync,
    {
        match cells.as_slice_mut() {
            Some(cells) => cells
                .par_iter_mut()
                .enumerate()
                .for_each(|(flat, cell)| fill(self.point_at_flat(flat), cell)),
            None => cells
                .indexed_iter_mut()
                .for_each(|(index, cell)| fill(self.point_at(index.slice()), cell)),
        }
    }

    /// In-domain neighbours of `point` that differ by one step along a single axis.
    pub fn axis_neighbors(&self, point: &Point<D>) -> impl Iterator<Item = Point<D>> + '_ {
        let point = *point;
        (0..D).flat_map(move |axis| {
            [-1_i64, 1].into_iter().filter_map(move |step| {
                let mut coords = point.0;
                coords[axis] += step;
                let neighbor = Point(coords);
                self.contains(&neighbor).then_some(neighbor)
            })
        })
    }
}

/// A [`Domain`] with its occupancy sampled once.
///
/// Sampling up front keeps the predicate fixed for the duration of a pipeline run
/// and lets every stage read occupancy without calling back into user code.
#[derive(Clone, Debug, PartialEq)]
pub struct LatticeDomain<const D: usize> {
    domain: Domain<D>,
    occupancy: ArrayD<bool>,
}

impl<const D: usize> LatticeDomain<D> {
    /// A lattice with every point in the background.
    pub fn empty(domain: Domain<D>) -> Self {
        Self {
            occupancy: ArrayD::from_elem(domain.array_shape(), false),
            domain,
        }
    }

    /// Evaluates `occupancy` at every point of `domain`, in parallel.
    pub fn sample(domain: Domain<D>, occupancy: &impl Occupancy<D>) -> Self {
        let mut lattice = Self::empty(domain);
        domain.par_fill(&mut lattice.occupancy, |point, value| {
            *value = occupancy.is_foreground(&point);
        });
        debug!(
            points = domain.len(),
            foreground = lattice.foreground_count(),
            "sampled occupancy"
        );
        lattice
    }

    /// A lattice whose foreground is exactly `points` (points outside the domain are ignored).
    pub fn from_points(domain: Domain<D>, points: impl IntoIterator<Item = Point<D>>) -> Self {
        let mut lattice = Self::empty(domain);
        for point in points {
            lattice.set(&point, true);
        }
        lattice
    }

    /// The sampled box.
    pub fn domain(&self) -> &Domain<D> {
        &self.domain
    }

    /// Occupancy of `point`; points outside the domain read as background.
    pub fn get(&self, point: &Point<D>) -> bool {
        self.domain
            .index_of(point)
            .is_some_and(|index| self.occupancy[&index[..]])
    }

    /// Sets the occupancy of `point`. Returns `false` (and changes nothing) outside the domain.
    pub fn set(&mut self, point: &Point<D>, foreground: bool) -> bool {
        match self.domain.index_of(point) {
            Some(index) => {
                self.occupancy[&index[..]] = foreground;
                true
            }
            None => false,
        }
    }

    /// The logical complement on the same domain.
    pub fn complement(&self) -> Self {
        Self {
            domain: self.domain,
            occupancy: self.occupancy.mapv(|foreground| !foreground),
        }
    }

    /// Number of foreground points.
    pub fn foreground_count(&self) -> usize {
        self.occupancy.iter().filter(|&&foreground| foreground).count()
    }

    /// Number of background points.
    pub fn background_count(&self) -> usize {
        self.occupancy.len() - self.foreground_count()
    }

    /// Points of one occupancy class, lexicographically.
    pub fn points_where(&self, foreground: bool) -> impl Iterator<Item = Point<D>> + '_ {
        self.occupancy
            .indexed_iter()
            .filter(move |(_, value)| **value == foreground)
            .map(|(index, _)| self.domain.point_at(index.slice()))
    }

    /// Foreground points, lexicographically.
    pub fn foreground(&self) -> impl Iterator<Item = Point<D>> + '_ {
        self.points_where(true)
    }

    /// Background points, lexicographically.
    pub fn background(&self) -> impl Iterator<Item = Point<D>> + '_ {
        self.points_where(false)
    }

    pub(crate) fn occupancy(&self) -> &ArrayD<bool> {
        &self.occupancy
    }
}

impl<const D: usize> Occupancy<D> for LatticeDomain<D> {
    fn is_foreground(&self, point: &Point<D>) -> bool {
        self.get(point)
    }
}
