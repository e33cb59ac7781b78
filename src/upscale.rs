//! Conservative remapping of extensive 3D fields between rectilinear grids.
//!
//! For a source field `v`, each target cell receives
//!
//! ```text
//! out[I, J, K] = sum over (i, j, k) of v[i, j, k] * Wx[I, i] * Wy[J, j] * Wz[K, k]
//! ```
//!
//! which is the exact volume-weighted share of every source cell inside the target
//! cell. The separable product is only valid because both grids are Cartesian and
//! axis-aligned.
//!
//! Overlap maps are overwhelmingly sparse, since only spatially adjacent cells
//! overlap, so the sum runs over the precomputed nonzero entries of each map row
//! and zero-weight branches are never entered.
//!
//! ```rust
//! use gridmatch::axis::Grid;
//! use gridmatch::overlap::GridOverlap;
//! use gridmatch::upscale::Upscaler;
//!
//! // Three unit cells collapsed onto one cell along X
//! let fine = Grid::from_widths(&[1.0_f64; 3], &[1.0], &[1.0]).unwrap();
//! let coarse = Grid::from_widths(&[3.0_f64], &[1.0], &[1.0]).unwrap();
//! let overlap = GridOverlap::new(&fine, &coarse).unwrap();
//!
//! let mut out = [0.0; 1];
//! Upscaler::new(&overlap).upscale(&[2.0, 4.0, 6.0], &mut out).unwrap();
//! assert_eq!(out, [12.0]);
//! ```
use num_traits::Float;

use crate::axis::Axis;
use crate::error::{Error, Result};
use crate::field::{flat_index, Field3D};
use crate::overlap::{GridOverlap, OverlapMap};

/// Saturation from aggregated water and pore volume.
///
/// A cell with no pore volume is defined to hold no water, so the result is zero
/// rather than NaN.
#[inline]
pub fn saturation<T: Float>(water: T, pore: T) -> T {
    if pore == T::zero() {
        T::zero()
    } else {
        water / pore
    }
}

/// Elementwise [`saturation`] over two fields of the same shape.
pub fn derive_saturation<T: Float>(water: &Field3D<T>, pore: &Field3D<T>) -> Result<Field3D<T>> {
    water.zip_with(pore, saturation)
}

/// Pore volume and water volume aggregated onto the target grid,
/// with the saturation derived from them.
#[derive(Clone, Debug, PartialEq)]
pub struct UpscaledVolumes<T: Float> {
    pub pore_volume: Field3D<T>,
    pub water_volume: Field3D<T>,
    pub saturation: Field3D<T>,
}

/// Applies the three per-axis overlap maps of a grid pair as a separable weighting.
///
/// Borrowing the maps is cheap, so an upscaler can be created per call.
#[derive(Clone, Copy, Debug)]
pub struct Upscaler<'a, T: Float> {
    wx: &'a OverlapMap<T>,
    wy: &'a OverlapMap<T>,
    wz: &'a OverlapMap<T>,

    /// Shape of the source index space
    src: [usize; 3],

    /// Shape of the target index space
    trg: [usize; 3],
}

impl<'a, T: Float> Upscaler<'a, T> {
    pub fn new(overlap: &'a GridOverlap<T>) -> Self {
        Self {
            wx: overlap.axis(Axis::X),
            wy: overlap.axis(Axis::Y),
            wz: overlap.axis(Axis::Z),
            src: overlap.source_shape(),
            trg: overlap.target_shape(),
        }
    }

    #[inline]
    pub fn source_shape(&self) -> [usize; 3] {
        self.src
    }

    #[inline]
    pub fn target_shape(&self) -> [usize; 3] {
        self.trg
    }

    /// Remap C-ordered source values onto preallocated C-ordered target storage.
    ///
    /// # Errors
    /// * If `vals` does not match the source shape
    /// * If `out` does not match the target shape
    pub fn upscale(&self, vals: &[T], out: &mut [T]) -> Result<()> {
        self.check_sizes(vals.len(), out.len())?;

        let [nx, ny, nz] = self.trg;
        for i in 0..nx {
            for j in 0..ny {
                for k in 0..nz {
                    out[flat_index(self.trg, i, j, k)] = self.accumulate(vals, i, j, k);
                }
            }
        }
        Ok(())
    }

    /// Remap a source field, allocating the target field.
    pub fn upscale_field(&self, field: &Field3D<T>) -> Result<Field3D<T>> {
        if field.shape() != self.src {
            return Err(Error::shape(&self.src, &field.shape()));
        }
        let mut out = Field3D::zeros(self.trg);
        self.upscale(field.as_slice(), out.as_mut_slice())?;
        Ok(out)
    }

    /// Aggregate pore and water volume independently in one pass over the target
    /// grid, then derive the target saturation.
    pub fn upscale_volumes(
        &self,
        pore_volume: &Field3D<T>,
        water_volume: &Field3D<T>,
    ) -> Result<UpscaledVolumes<T>> {
        for shape in [pore_volume.shape(), water_volume.shape()] {
            if shape != self.src {
                return Err(Error::shape(&self.src, &shape));
            }
        }

        let mut pv = Field3D::zeros(self.trg);
        let mut vw = Field3D::zeros(self.trg);
        let mut sw = Field3D::zeros(self.trg);
        let [nx, ny, nz] = self.trg;
        for i in 0..nx {
            for j in 0..ny {
                for k in 0..nz {
                    let p = self.accumulate(pore_volume.as_slice(), i, j, k);
                    let w = self.accumulate(water_volume.as_slice(), i, j, k);
                    pv.set(i, j, k, p);
                    vw.set(i, j, k, w);
                    sw.set(i, j, k, saturation(w, p));
                }
            }
        }

        Ok(UpscaledVolumes {
            pore_volume: pv,
            water_volume: vw,
            saturation: sw,
        })
    }

    /// Weighted sum of the source values contributing to target cell `(ti, tj, tk)`
    #[inline]
    fn accumulate(&self, vals: &[T], ti: usize, tj: usize, tk: usize) -> T {
        let (rx, ry, rz) = (self.wx.row(ti), self.wy.row(tj), self.wz.row(tk));
        let [_, sy, sz] = self.src;

        let mut acc = T::zero();
        for &(i, px) in rx {
            for &(j, py) in ry {
                let pyx = py * px;
                let base = (i * sy + j) * sz;
                for &(k, pz) in rz {
                    acc = acc + vals[base + k] * (pz * pyx);
                }
            }
        }
        acc
    }

    fn check_sizes(&self, nvals: usize, nout: usize) -> Result<()> {
        let nsrc: usize = self.src.iter().product();
        if nvals != nsrc {
            return Err(Error::shape(&[nsrc], &[nvals]));
        }
        let ntrg: usize = self.trg.iter().product();
        if nout != ntrg {
            return Err(Error::shape(&[ntrg], &[nout]));
        }
        Ok(())
    }
}
