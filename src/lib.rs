//! Conservative upscaling between nested rectilinear grids, and a volumetric misfit
//! for calibrating a coarse reservoir model against a fine reference.
//!
//! A fine reference model and a coarse target model each live on a separable
//! rectilinear grid described by per-axis cell widths. Extensive quantities (pore
//! volume, water volume) are carried from the fine grid to the coarse grid through
//! per-axis overlap weights, `W[i, j] = |coarse cell i ∩ fine cell j| / |fine cell j|`,
//! applied as a separable tensor product. Intensive quantities (saturation) are then
//! derived from the upscaled extensives, never averaged directly.
//!
//! The misfit compares the upscaled reference saturation to the target saturation
//! at every coarse cell and requested timestep, and reduces the relative distances
//! to one scalar cost that is zero exactly when the two agree.
//!
//! # Performance Scalings
//! Overlap maps are stored both dense and as a sparse list of nonzero weights per
//! fine cell. For nested or near-nested grids each fine cell touches one or two
//! coarse cells per axis, so the upscaling cost is linear in the fine cell count.
//!
//! | Operation                     | RAM                     | Cost                          |
//! |-------------------------------|-------------------------|-------------------------------|
//! | overlap::OverlapMap::new      | O(n_fine * n_coarse)    | O(n_fine * n_coarse)          |
//! | upscale::Upscaler::upscale    | O(1) beyond the output  | O(n_fine * nnz_x * nnz_y * nnz_z) |
//! | misfit::evaluate_misfit       | O(n_fine + n_coarse)    | O(timesteps * n_fine)         |
//!
//! # Example: Upscaling a Field
//! ```rust
//! use gridmatch::{Field3D, Grid, GridOverlap, Upscaler};
//! use gridmatch::utils::refine;
//!
//! // Coarse grid and a fine grid refining it by 2 on each axis
//! let (dx, dy, dz) = ([1.0_f64, 3.0], [2.0_f64], [0.5_f64, 0.5]);
//! let coarse = Grid::from_widths(&dx, &dy, &dz).unwrap();
//! let (fx, fy, fz) = (refine(&dx, 2).unwrap(), refine(&dy, 2).unwrap(), refine(&dz, 2).unwrap());
//! let fine = Grid::from_widths(&fx, &fy, &fz).unwrap();
//!
//! // One unit of pore volume in every fine cell
//! let pore_volume = Field3D::from_vec(fine.shape(), vec![1.0; fine.size()]).unwrap();
//!
//! let overlap = GridOverlap::new(&fine, &coarse).unwrap();
//! let upscaled = Upscaler::new(&overlap).upscale_field(&pore_volume).unwrap();
//!
//! // Each coarse cell collects the 8 fine cells inside it
//! assert_eq!(upscaled.as_slice(), &[8.0; 4]);
//! ```
//!
//! # Example: Misfit Against a Reference
//! ```rust
//! use gridmatch::{evaluate_misfit, Field3D, MisfitConfig, MisfitContext, Model};
//! use gridmatch::source::{InMemorySource, Property};
//!
//! let uniform = |shape, v| Field3D::from_vec(shape, vec![v; 2 * 2 * 2]).unwrap();
//!
//! let reference = InMemorySource::new(vec![0.5_f64; 2], vec![0.5; 2], vec![0.5; 2])
//!     .with_timestep(0, Property::PoreVolume, None, uniform([2, 2, 2], 0.125))
//!     .unwrap()
//!     .with_timestep(0, Property::Saturation, None, uniform([2, 2, 2], 0.3))
//!     .unwrap();
//! let cell = |v| Field3D::from_vec([1, 1, 1], vec![v]).unwrap();
//! let target = InMemorySource::new(vec![1.0_f64], vec![1.0], vec![1.0])
//!     .with_timestep(0, Property::PoreVolume, None, cell(1.0))
//!     .unwrap()
//!     .with_timestep(0, Property::Saturation, None, cell(0.4))
//!     .unwrap();
//! let target = Model::new(target, None).unwrap();
//!
//! let config = MisfitConfig { exclude_marker: None, frame: None, ..Default::default() };
//! let context = MisfitContext::builder()
//!     .reference(Model::new(reference, None).unwrap())
//!     .config(config)
//!     .build(target.grid())
//!     .unwrap();
//!
//! let report = evaluate_misfit(&target, &context).unwrap();
//! assert!(report.cost > 0.0);
//! ```
// These "needless" range loops are a significant speedup
#![allow(clippy::needless_range_loop)]

pub mod axis;
pub use axis::{Axis, AxisPartition, Grid};

pub mod overlap;
pub use overlap::{GridOverlap, OverlapMap};

pub mod field;
pub use field::{CellMask, Field3D};

pub mod upscale;
pub use upscale::{UpscaledVolumes, Upscaler};

pub mod source;
pub use source::{Domain, Model, Property, PropertySource};

pub mod misfit;
pub use misfit::{distance_at, evaluate_misfit, CostReport, DistanceRecord, MisfitContext};

pub mod audit;
pub use audit::{evaluate_misfit_logged, AuditLog};

pub mod batch;
pub use batch::{evaluate_batch, run_batch, JobRunner, RunCost, RunOutcome};

pub mod config;
pub use config::{BatchConfig, MisfitConfig};

pub mod error;
pub use error::{Error, Result};

pub mod utils;

#[cfg(test)]
pub(crate) mod testing;
