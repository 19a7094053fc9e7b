use std::ops::Index;

use nalgebra::SVector;

/// Largest squared distance (or weight magnitude) the exact integer pipeline accepts.
///
/// Power values are sums and differences of two such quantities, and envelope
/// breakpoints are compared in `i128`, so a quarter of the `i64` range is safe.
pub const MAX_EXACT_SQUARED: i64 = i64::MAX / 4;

/// A lattice point with `D` integer coordinates.
///
/// Ordering is lexicographic with axis 0 most significant, which is also the
/// iteration order of [`Domain::points`](crate::domain::Domain::points).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Point<const D: usize>(pub [i64; D]);

/// A point of the 2D lattice.
pub type Point2 = Point<2>;

/// A point of the 3D lattice.
pub type Point3 = Point<3>;

impl<const D: usize> Point<D> {
    pub const fn new(coords: [i64; D]) -> Self {
        Self(coords)
    }

    pub const fn coords(&self) -> [i64; D] {
        self.0
    }

    /// Squared Euclidean distance to `other`.
    ///
    /// Callers keep both points inside a [`Domain`](crate::domain::Domain), whose
    /// construction already rejected diagonals that would overflow.
    pub fn squared_distance(&self, other: &Self) -> i64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }

    /// Real-valued coordinates, for angles and for renderers.
    pub fn to_vector(&self) -> SVector<f64, D> {
        SVector::from_fn(|i, _| self.0[i] as f64)
    }

    /// Displacement vector from `self` to `target`.
    pub fn displacement_to(&self, target: &Self) -> SVector<f64, D> {
        SVector::from_fn(|i, _| (target.0[i] - self.0[i]) as f64)
    }
}

impl<const D: usize> From<[i64; D]> for Point<D> {
    fn from(coords: [i64; D]) -> Self {
        Self(coords)
    }
}

impl<const D: usize> Index<usize> for Point<D> {
    type Output = i64;

    fn index(&self, axis: usize) -> &i64 {
        &self.0[axis]
    }
}
