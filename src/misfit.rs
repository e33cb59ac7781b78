//! Volumetric misfit between a coarse target model and an upscaled fine reference.
//!
//! For each requested timestep, the reference pore volume and water volume are
//! upscaled onto the target grid, the upscaled saturation is derived from them, and
//! the relative saturation distance to the target is reduced to its Euclidean norm.
//! The cost of an evaluation is the Euclidean norm of those per-timestep scalars.
//!
//! Evaluation is a pure function of the target model and an immutable
//! [`MisfitContext`], which holds the reference model, its overlap maps onto the
//! target grid, the timestep set and the masking settings. A single context can be
//! shared by any number of concurrent evaluations.
//!
//! ```rust
//! use gridmatch::config::MisfitConfig;
//! use gridmatch::field::Field3D;
//! use gridmatch::misfit::{evaluate_misfit, MisfitContext};
//! use gridmatch::source::{InMemorySource, Model, Property};
//!
//! let uniform = |n: usize, v: f64| Field3D::from_vec([n, 1, 1], vec![v; n]).unwrap();
//! let reference = InMemorySource::new(vec![0.5_f64; 4], vec![1.0], vec![1.0])
//!     .with_timestep(0, Property::PoreVolume, None, uniform(4, 1.0))
//!     .unwrap()
//!     .with_timestep(0, Property::Saturation, None, uniform(4, 0.5))
//!     .unwrap();
//! let target = InMemorySource::new(vec![1.0_f64; 2], vec![1.0], vec![1.0])
//!     .with_timestep(0, Property::PoreVolume, None, uniform(2, 2.0))
//!     .unwrap()
//!     .with_timestep(0, Property::Saturation, None, uniform(2, 0.5))
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
//! assert_eq!(report.cost, 0.0);
//! ```
use num_traits::Float;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::axis::Grid;
use crate::config::MisfitConfig;
use crate::error::{Error, Result};
use crate::field::{CellMask, Field3D};
use crate::overlap::GridOverlap;
use crate::source::{Domain, Model, Property, PropertySource};
use crate::upscale::Upscaler;

/// Saturation, water volume and pore volume over one grid.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeFields<T: Float> {
    pub saturation: Field3D<T>,
    pub water_volume: Field3D<T>,
    pub pore_volume: Field3D<T>,
}

impl<T: Float> VolumeFields<T> {
    fn zip_with<F>(&self, other: &Self, f: F) -> Result<Self>
    where
        F: Fn(&Field3D<T>, &Field3D<T>) -> Result<Field3D<T>>,
    {
        Ok(Self {
            saturation: f(&self.saturation, &other.saturation)?,
            water_volume: f(&self.water_volume, &other.water_volume)?,
            pore_volume: f(&self.pore_volume, &other.pore_volume)?,
        })
    }
}

/// Distances between the upscaled reference and the target at one timestep.
#[derive(Clone, Debug)]
pub struct DistanceRecord<T: Float> {
    pub timestep: usize,

    /// Reference fields upscaled onto the target grid
    pub reference: VolumeFields<T>,

    /// Target fields after masking
    pub target: VolumeFields<T>,

    /// `|reference - target|` per field
    pub absolute: VolumeFields<T>,

    /// Absolute distances normalized by the regularized reference value
    pub relative: VolumeFields<T>,
}

impl<T: Float> DistanceRecord<T> {
    /// Norm of the flattened relative saturation distance
    pub fn cost(&self) -> T {
        self.relative.saturation.norm()
    }
}

/// Scalar misfit of one timestep.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TimestepCost<T> {
    pub timestep: usize,
    pub cost: T,
}

/// Result of one evaluation: the per-timestep scalars and their norm.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CostReport<T> {
    pub timesteps: Vec<TimestepCost<T>>,
    pub cost: T,
}

/// Immutable inputs shared by every evaluation against one reference model.
#[derive(Debug)]
pub struct MisfitContext<T: Float, R> {
    reference: Model<T, R>,
    target_grid: Grid<T>,
    overlap: GridOverlap<T>,
    timesteps: Vec<usize>,
    config: MisfitConfig,

    /// Regularization terms of the relative distances, in the field precision
    saturation_epsilon: T,
    volume_offset: T,

    /// Reference cells removed before upscaling
    excluded: Option<CellMask>,

    /// Target cells outside the objective
    frame: Option<CellMask>,
}

impl<T: Float, R: PropertySource<T>> MisfitContext<T, R> {
    pub fn builder() -> MisfitContextBuilder<T, R> {
        MisfitContextBuilder {
            reference: None,
            timesteps: None,
            config: MisfitConfig::default(),
        }
    }

    #[inline]
    pub fn reference(&self) -> &Model<T, R> {
        &self.reference
    }

    #[inline]
    pub fn target_grid(&self) -> &Grid<T> {
        &self.target_grid
    }

    #[inline]
    pub fn overlap(&self) -> &GridOverlap<T> {
        &self.overlap
    }

    #[inline]
    pub fn timesteps(&self) -> &[usize] {
        &self.timesteps
    }

    #[inline]
    pub fn config(&self) -> &MisfitConfig {
        &self.config
    }
}

/// Collects the parts of a [`MisfitContext`] and validates them together.
pub struct MisfitContextBuilder<T: Float, R> {
    reference: Option<Model<T, R>>,
    timesteps: Option<Vec<usize>>,
    config: MisfitConfig,
}

impl<T: Float, R: PropertySource<T>> MisfitContextBuilder<T, R> {
    pub fn reference(mut self, reference: Model<T, R>) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Timesteps to evaluate. Defaults to every timestep of the reference.
    pub fn timesteps(mut self, timesteps: impl IntoIterator<Item = usize>) -> Self {
        self.timesteps = Some(timesteps.into_iter().collect());
        self
    }

    pub fn config(mut self, config: MisfitConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the overlap maps from the reference grid onto `target_grid` and
    /// resolve the masks.
    ///
    /// # Errors
    /// * If no reference model was given
    /// * If the timestep set is empty or names a timestep the reference lacks
    /// * If the configuration is invalid, including a frame layer outside the target grid
    /// * If the reference grid has a zero-length cell
    /// * If the reference marker cannot be read
    pub fn build(self, target_grid: &Grid<T>) -> Result<MisfitContext<T, R>> {
        let reference = self.reference.ok_or(Error::MissingReference)?;
        let config = self.config;
        config.validate()?;

        let available = reference.source().timesteps();
        let timesteps = self.timesteps.unwrap_or_else(|| available.clone());
        if timesteps.is_empty() {
            return Err(Error::NoTimesteps);
        }
        if let Some(&missing) = timesteps.iter().find(|ts| !available.contains(ts)) {
            return Err(Error::UnknownTimestep(missing));
        }

        let saturation_epsilon = regularization(config.saturation_epsilon, "saturation_epsilon")?;
        let volume_offset = regularization(config.volume_offset, "volume_offset")?;

        let overlap = GridOverlap::new(reference.grid(), target_grid)?;

        // Markers are static; read them at the first available timestep
        let excluded = match config.exclude_marker {
            Some(marker) => {
                let value = T::from(marker).ok_or_else(|| {
                    Error::Config(format!("marker {marker} is not representable"))
                })?;
                let mut markers =
                    reference
                        .source()
                        .field(Property::Marker, reference.domain(), available[0])?;
                markers.sanitize();
                Some(CellMask::from_field(&markers, |m| m == value))
            }
            None => None,
        };

        let frame = config
            .frame
            .map(|layer| CellMask::layer(target_grid.shape(), layer.axis, layer.index))
            .transpose()?;

        debug!(
            timesteps = timesteps.len(),
            excluded = excluded.as_ref().map_or(0, CellMask::count),
            frame = frame.as_ref().map_or(0, CellMask::count),
            "misfit context built"
        );

        Ok(MisfitContext {
            reference,
            target_grid: target_grid.clone(),
            overlap,
            timesteps,
            config,
            saturation_epsilon,
            volume_offset,
            excluded,
            frame,
        })
    }
}

/// Convert a regularization term to the field precision.
fn regularization<T: Float>(value: f64, name: &str) -> Result<T> {
    T::from(value)
        .filter(|v| v.is_finite() && *v > T::zero())
        .ok_or_else(|| {
            Error::Config(format!(
                "{name} = {value} is not a positive value in the field precision"
            ))
        })
}

/// Read saturation and pore volume at one timestep, coerce non-finite values to
/// zero, and zero both fields under `mask`.
fn masked_volumes<T, S>(
    source: &S,
    domain: Option<Domain>,
    timestep: usize,
    mask: Option<&CellMask>,
) -> Result<VolumeFields<T>>
where
    T: Float,
    S: PropertySource<T>,
{
    let mut saturation = source.field(Property::Saturation, domain, timestep)?;
    let mut pore_volume = source.field(Property::PoreVolume, domain, timestep)?;
    saturation.sanitize();
    pore_volume.sanitize();
    if let Some(mask) = mask {
        saturation.zero_where(mask)?;
        pore_volume.zero_where(mask)?;
    }
    let water_volume = pore_volume.product(&saturation)?;

    Ok(VolumeFields {
        saturation,
        water_volume,
        pore_volume,
    })
}

/// Compare the target model to the upscaled reference at one timestep.
///
/// # Errors
/// * If the target grid differs from the grid the context was built for
/// * If either model lacks the timestep or a required property
pub fn distance_at<T, S, R>(
    target: &Model<T, S>,
    context: &MisfitContext<T, R>,
    timestep: usize,
) -> Result<DistanceRecord<T>>
where
    T: Float,
    S: PropertySource<T>,
    R: PropertySource<T>,
{
    check_target_grid(target, context)?;

    let reference = masked_volumes(
        context.reference.source(),
        context.reference.domain(),
        timestep,
        context.excluded.as_ref(),
    )?;
    let target = masked_volumes(
        target.source(),
        target.domain(),
        timestep,
        context.frame.as_ref(),
    )?;

    let up = Upscaler::new(&context.overlap)
        .upscale_volumes(&reference.pore_volume, &reference.water_volume)?;
    let mut upscaled = VolumeFields {
        saturation: up.saturation,
        water_volume: up.water_volume,
        pore_volume: up.pore_volume,
    };
    if let Some(frame) = &context.frame {
        upscaled.saturation.zero_where(frame)?;
        upscaled.water_volume.zero_where(frame)?;
        upscaled.pore_volume.zero_where(frame)?;
    }

    let absolute = upscaled.zip_with(&target, |r, t| r.abs_diff(t))?;

    let (eps, offset) = (context.saturation_epsilon, context.volume_offset);
    let relative = VolumeFields {
        saturation: absolute
            .saturation
            .zip_with(&upscaled.saturation, |d, r| d / (r + eps))?,
        water_volume: absolute
            .water_volume
            .zip_with(&upscaled.water_volume, |d, r| d / (r + offset))?,
        pore_volume: absolute
            .pore_volume
            .zip_with(&upscaled.pore_volume, |d, r| d / (r + offset))?,
    };

    Ok(DistanceRecord {
        timestep,
        reference: upscaled,
        target,
        absolute,
        relative,
    })
}

/// Evaluate the misfit of `target` over every timestep of the context.
///
/// The cost is zero exactly when the upscaled reference saturation equals the
/// target saturation at every target cell and timestep.
#[instrument(skip_all, fields(timesteps = context.timesteps.len()))]
pub fn evaluate_misfit<T, S, R>(
    target: &Model<T, S>,
    context: &MisfitContext<T, R>,
) -> Result<CostReport<T>>
where
    T: Float,
    S: PropertySource<T>,
    R: PropertySource<T>,
{
    let mut timesteps = Vec::with_capacity(context.timesteps.len());
    for &ts in &context.timesteps {
        let cost = distance_at(target, context, ts)?.cost();
        debug!(timestep = ts, cost = cost.to_f64(), "timestep evaluated");
        timesteps.push(TimestepCost { timestep: ts, cost });
    }

    let cost = timesteps
        .iter()
        .fold(T::zero(), |acc, t| acc + t.cost * t.cost)
        .sqrt();
    info!(cost = cost.to_f64(), "misfit evaluated");

    Ok(CostReport { timesteps, cost })
}

fn check_target_grid<T, S, R>(target: &Model<T, S>, context: &MisfitContext<T, R>) -> Result<()>
where
    T: Float,
    S: PropertySource<T>,
{
    let (expected, found) = (context.target_grid.shape(), target.shape());
    if expected != found {
        return Err(Error::shape(&expected, &found));
    }
    if target.grid() != &context.target_grid {
        return Err(Error::Config(
            "target grid geometry differs from the grid the overlap maps were built for".into(),
        ));
    }
    Ok(())
}
