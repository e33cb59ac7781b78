//! Fractional-overlap maps between two partitions of the same axis.
//!
//! Entry `W[i, j]` of a map is the fraction of *source* cell `j`'s length that lies
//! inside *target* cell `i`. Normalizing by the source length makes each entry a
//! conservative redistribution weight for extensive quantities defined on the
//! source: summing `value[j] * W[i, j]` over `j` gives exactly the part of the
//! source volume that falls inside target cell `i`.
//!
//! ```rust
//! use gridmatch::axis::{Axis, AxisPartition};
//! use gridmatch::overlap::OverlapMap;
//!
//! // Two cells of length 2 refined into four unit cells
//! let source = AxisPartition::from_boundaries(Axis::X, &[2.0_f64, 4.0]).unwrap();
//! let target = AxisPartition::from_boundaries(Axis::X, &[1.0_f64, 2.0, 3.0, 4.0]).unwrap();
//! let w = OverlapMap::new(&source, &target).unwrap();
//!
//! assert_eq!(w.weight(0, 0), 0.5);
//! assert_eq!(w.weight(2, 0), 0.0);
//! assert_eq!(w.row(3), &[(1, 0.5)]);
//! ```
//!
//! Every pair of cells is visited once on construction, so building a map costs
//! O(rows * cols). Maps are meant to be built once per pair of grids and reused for
//! every field and timestep.
use num_traits::Float;
use tracing::{debug, warn};

use crate::axis::{Axis, AxisPartition, Grid};
use crate::error::{Error, Result};

/// Dense fractional-overlap matrix of shape `[target cells, source cells]`,
/// with the nonzero entries of each row precomputed for sparse traversal.
#[derive(Clone, Debug)]
pub struct OverlapMap<T: Float> {
    axis: Axis,

    /// Number of target cells
    rows: usize,

    /// Number of source cells
    cols: usize,

    /// Row-major weights, size rows * cols
    dense: Vec<T>,

    /// (source index, weight) for each nonzero weight, per target row
    sparse: Vec<Vec<(usize, T)>>,
}

impl<T: Float> OverlapMap<T> {
    /// Build the overlap map from `source` onto `target`.
    ///
    /// Target cells that extend beyond the source domain, or source cells beyond the
    /// target domain, are left under-covered rather than renormalized; a warning is
    /// emitted when the two extents differ.
    ///
    /// # Errors
    /// * If the partitions are on different axes
    /// * If any source cell has zero length
    pub fn new(source: &AxisPartition<T>, target: &AxisPartition<T>) -> Result<Self> {
        let axis = source.axis();
        if target.axis() != axis {
            return Err(Error::Config(format!(
                "cannot map {} axis onto {} axis",
                axis,
                target.axis()
            )));
        }

        let (rows, cols) = (target.len(), source.len());
        let lengths: Vec<T> = (0..cols).map(|j| source.width(j)).collect();
        if let Some(index) = lengths.iter().position(|&l| l <= T::zero()) {
            return Err(Error::DegenerateCell { index });
        }

        let mut dense = vec![T::zero(); rows * cols];
        let mut sparse = Vec::with_capacity(rows);
        for i in 0..rows {
            let (t0, t1) = target.span(i);
            let mut nonzero = Vec::new();
            for j in 0..cols {
                let (s0, s1) = source.span(j);
                let lo = s0.max(t0);
                let hi = s1.min(t1);

                // Touching or disjoint spans carry no weight
                if hi <= lo {
                    continue;
                }

                let w = (hi - lo) / lengths[j];
                dense[i * cols + j] = w;
                nonzero.push((j, w));
            }
            sparse.push(nonzero);
        }

        let (src_extent, trg_extent) = (source.extent(), target.extent());
        if src_extent != trg_extent {
            warn!(
                %axis,
                source_extent = src_extent.to_f64(),
                target_extent = trg_extent.to_f64(),
                "source and target extents differ; edge cells are under-covered"
            );
        }

        let map = Self {
            axis,
            rows,
            cols,
            dense,
            sparse,
        };
        debug!(%axis, rows, cols, nonzero = map.nnz(), "overlap map built");
        Ok(map)
    }

    #[inline]
    pub fn axis(&self) -> Axis {
        self.axis
    }

    /// Number of target cells
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of source cells
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Weight of source cell `j` inside target cell `i`
    #[inline]
    pub fn weight(&self, i: usize, j: usize) -> T {
        self.dense[i * self.cols + j]
    }

    /// All weights of target cell `i`, one per source cell
    #[inline]
    pub fn dense_row(&self, i: usize) -> &[T] {
        &self.dense[i * self.cols..(i + 1) * self.cols]
    }

    /// Nonzero `(source index, weight)` pairs of target cell `i`, in source order
    #[inline]
    pub fn row(&self, i: usize) -> &[(usize, T)] {
        &self.sparse[i]
    }

    /// Total number of nonzero weights
    pub fn nnz(&self) -> usize {
        self.sparse.iter().map(Vec::len).sum()
    }

    /// Fraction of each source cell's length that is covered by some target cell.
    ///
    /// Entries are 1 wherever the target domain contains the source cell, and
    /// fall below 1 at the edges when the target domain is shorter.
    pub fn coverage(&self) -> Vec<T> {
        let mut out = vec![T::zero(); self.cols];
        for row in &self.sparse {
            for &(j, w) in row {
                out[j] = out[j] + w;
            }
        }
        out
    }
}

/// The three per-axis overlap maps between a source grid and a target grid.
#[derive(Clone, Debug)]
pub struct GridOverlap<T: Float> {
    maps: [OverlapMap<T>; 3],
}

impl<T: Float> GridOverlap<T> {
    /// Build X, Y and Z overlap maps from `source` onto `target`.
    pub fn new(source: &Grid<T>, target: &Grid<T>) -> Result<Self> {
        let [x, y, z] = Axis::ALL;
        Ok(Self {
            maps: [
                OverlapMap::new(source.axis(x), target.axis(x))?,
                OverlapMap::new(source.axis(y), target.axis(y))?,
                OverlapMap::new(source.axis(z), target.axis(z))?,
            ],
        })
    }

    #[inline]
    pub fn axis(&self, axis: Axis) -> &OverlapMap<T> {
        &self.maps[axis.index()]
    }

    /// Shape of the grid the maps read from
    pub fn source_shape(&self) -> [usize; 3] {
        [self.maps[0].cols, self.maps[1].cols, self.maps[2].cols]
    }

    /// Shape of the grid the maps write to
    pub fn target_shape(&self) -> [usize; 3] {
        [self.maps[0].rows, self.maps[1].rows, self.maps[2].rows]
    }
}
