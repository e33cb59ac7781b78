//! Cell-boundary partitions along one axis, and the separable 3D grids built from them.
//!
//! A partition stores the cumulative upper boundary of each cell. Cell `i` spans
//! `(boundary[i-1], boundary[i])`, with the lower bound of the first cell at zero.
//!
//! ```rust
//! use gridmatch::axis::{Axis, AxisPartition};
//!
//! let widths = [0.5_f64, 1.25, 0.25, 0.25];
//! let x = AxisPartition::from_widths(Axis::X, &widths).unwrap();
//!
//! assert_eq!(x.len(), 4);
//! assert_eq!(x.span(1), (0.5, 1.75));
//! ```
use core::fmt;

use num_traits::Float;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// One of the three axes of a structured grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Position of this axis in a `[nx, ny, nz]` shape.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
        };
        f.write_str(s)
    }
}

/// Ordered cell boundaries along one axis.
///
/// Zero-width cells are accepted here, since they are geometrically valid.
/// They are rejected later if the partition is used as the source of an
/// overlap map, where they would need to be divided by.
#[derive(Clone, Debug, PartialEq)]
pub struct AxisPartition<T: Float> {
    axis: Axis,
    boundaries: Vec<T>,
}

impl<T: Float> AxisPartition<T> {
    /// Resolve cell widths sampled along one grid line into cumulative upper boundaries.
    ///
    /// # Errors
    /// * If there are no cells
    /// * If any width is NaN or infinite
    /// * If any width is negative
    pub fn from_widths(axis: Axis, widths: &[T]) -> Result<Self> {
        if widths.is_empty() {
            return Err(Error::EmptyAxis { axis });
        }

        let mut boundaries = Vec::with_capacity(widths.len());
        let mut acc = T::zero();
        for (index, &w) in widths.iter().enumerate() {
            if !w.is_finite() {
                return Err(Error::NonFiniteWidth { axis, index });
            }
            if w < T::zero() {
                return Err(Error::NegativeWidth { axis, index });
            }
            acc = acc + w;
            boundaries.push(acc);
        }

        Ok(Self { axis, boundaries })
    }

    /// Build a partition from already-accumulated upper boundaries.
    ///
    /// # Errors
    /// * If there are no cells
    /// * If any boundary is non-finite
    /// * If the boundaries decrease anywhere, or the first one is below zero
    pub fn from_boundaries(axis: Axis, boundaries: &[T]) -> Result<Self> {
        if boundaries.is_empty() {
            return Err(Error::EmptyAxis { axis });
        }

        let mut prev = T::zero();
        for (index, &b) in boundaries.iter().enumerate() {
            if !b.is_finite() {
                return Err(Error::NonFiniteBoundary { axis, index });
            }
            if b < prev {
                return Err(Error::DecreasingBoundary { axis, index });
            }
            prev = b;
        }

        Ok(Self {
            axis,
            boundaries: boundaries.to_vec(),
        })
    }

    #[inline]
    pub fn axis(&self) -> Axis {
        self.axis
    }

    /// Number of cells
    #[inline]
    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    /// Always false for a constructed partition; present for API symmetry with `len`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    /// Cumulative upper boundary of each cell
    #[inline]
    pub fn boundaries(&self) -> &[T] {
        &self.boundaries
    }

    /// Upper boundary of the last cell
    #[inline]
    pub fn extent(&self) -> T {
        self.boundaries[self.boundaries.len() - 1]
    }

    /// Lower and upper bound of cell `i`
    #[inline]
    pub fn span(&self, i: usize) -> (T, T) {
        let lo = if i == 0 {
            T::zero()
        } else {
            self.boundaries[i - 1]
        };
        (lo, self.boundaries[i])
    }

    /// Length of cell `i`
    #[inline]
    pub fn width(&self, i: usize) -> T {
        let (lo, hi) = self.span(i);
        hi - lo
    }
}

/// A structured, axis-aligned grid that is separable along each axis:
/// every grid line parallel to an axis shares the same cell widths.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T: Float> {
    axes: [AxisPartition<T>; 3],
}

impl<T: Float> Grid<T> {
    /// Assemble a grid from three partitions.
    ///
    /// # Errors
    /// * If the partitions are not given in X, Y, Z order
    pub fn new(x: AxisPartition<T>, y: AxisPartition<T>, z: AxisPartition<T>) -> Result<Self> {
        let axes = [x, y, z];
        for (i, p) in axes.iter().enumerate() {
            if p.axis().index() != i {
                return Err(Error::Config(format!(
                    "partition for {} axis given in position {i}",
                    p.axis()
                )));
            }
        }
        let grid = Self { axes };
        debug!(
            shape = ?grid.shape(),
            extent = ?grid.extent().map(|e| e.to_f64()),
            "grid resolved"
        );
        Ok(grid)
    }

    /// Resolve a grid from per-axis cell widths.
    pub fn from_widths(dx: &[T], dy: &[T], dz: &[T]) -> Result<Self> {
        Self::new(
            AxisPartition::from_widths(Axis::X, dx)?,
            AxisPartition::from_widths(Axis::Y, dy)?,
            AxisPartition::from_widths(Axis::Z, dz)?,
        )
    }

    #[inline]
    pub fn axis(&self, axis: Axis) -> &AxisPartition<T> {
        &self.axes[axis.index()]
    }

    /// Number of cells along each axis, `[nx, ny, nz]`
    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        [self.axes[0].len(), self.axes[1].len(), self.axes[2].len()]
    }

    /// Total number of cells
    #[inline]
    pub fn size(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn extent(&self) -> [T; 3] {
        [
            self.axes[0].extent(),
            self.axes[1].extent(),
            self.axes[2].extent(),
        ]
    }
}
