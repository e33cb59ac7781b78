//! Grid and property lookups from simulator results.
//!
//! The evaluator only needs random access to named per-cell scalars by cell index,
//! domain and timestep, plus the list of available timesteps. Readers for concrete
//! result formats implement [`PropertySource`]; [`InMemorySource`] holds fields that
//! have already been loaded.
use core::fmt;
use std::collections::HashMap;

use num_traits::Float;
use serde::{Deserialize, Serialize};

use crate::axis::{Axis, Grid};
use crate::error::{Error, Result};
use crate::field::Field3D;

/// A per-cell scalar that can be looked up from a source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Property {
    /// Cell width along an axis
    CellWidth(Axis),
    /// Water saturation
    Saturation,
    /// Categorical rock/fracture class
    Marker,
    /// Pore volume of the cell
    PoreVolume,
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Property::CellWidth(axis) => write!(f, "D{axis}"),
            Property::Saturation => f.write_str("saturation"),
            Property::Marker => f.write_str("marker"),
            Property::PoreVolume => f.write_str("pore volume"),
        }
    }
}

/// Porosity system of a cell in a dual-porosity model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Matrix,
    Fracture,
}

/// Random access to simulator results on a structured grid.
///
/// Single-porosity sources may ignore `domain`.
pub trait PropertySource<T: Float> {
    /// Number of cells along each axis, `[nx, ny, nz]`
    fn shape(&self) -> [usize; 3];

    /// Timestep indices with results, in ascending order
    fn timesteps(&self) -> Vec<usize>;

    /// Value of `property` at `cell` for the given domain and timestep.
    ///
    /// Static properties (cell widths, markers) should return the same value
    /// for every available timestep.
    fn value(
        &self,
        property: Property,
        cell: [usize; 3],
        domain: Option<Domain>,
        timestep: usize,
    ) -> Result<T>;

    fn has_timestep(&self, timestep: usize) -> bool {
        self.timesteps().contains(&timestep)
    }

    /// Read `property` at every cell into a field.
    fn field(
        &self,
        property: Property,
        domain: Option<Domain>,
        timestep: usize,
    ) -> Result<Field3D<T>> {
        if !self.has_timestep(timestep) {
            return Err(Error::UnknownTimestep(timestep));
        }
        Field3D::try_from_fn(self.shape(), |i, j, k| {
            self.value(property, [i, j, k], domain, timestep)
        })
    }
}

/// Storage key: static properties have no timestep
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct Key {
    property: Property,
    domain: Option<Domain>,
    timestep: Option<usize>,
}

/// A property source backed by fields held in memory.
///
/// Cell widths are stored per axis, since the grid is separable. Lookups for a
/// specific domain fall back to domain-less fields, so single-porosity data can
/// be read with any domain.
#[derive(Clone, Debug)]
pub struct InMemorySource<T: Float> {
    widths: [Vec<T>; 3],
    timesteps: Vec<usize>,
    fields: HashMap<Key, Field3D<T>>,
}

impl<T: Float> InMemorySource<T> {
    /// Start an empty source with the given per-axis cell widths.
    pub fn new(dx: Vec<T>, dy: Vec<T>, dz: Vec<T>) -> Self {
        Self {
            widths: [dx, dy, dz],
            timesteps: Vec::new(),
            fields: HashMap::new(),
        }
    }

    /// Add a property that does not change over time, such as a marker.
    ///
    /// # Errors
    /// * If the field shape does not match the cell widths
    pub fn with_static(
        mut self,
        property: Property,
        domain: Option<Domain>,
        field: Field3D<T>,
    ) -> Result<Self> {
        self.insert(property, domain, None, field)?;
        Ok(self)
    }

    /// Add a property at one timestep, registering the timestep if it is new.
    ///
    /// # Errors
    /// * If the field shape does not match the cell widths
    pub fn with_timestep(
        mut self,
        timestep: usize,
        property: Property,
        domain: Option<Domain>,
        field: Field3D<T>,
    ) -> Result<Self> {
        self.insert(property, domain, Some(timestep), field)?;
        if let Err(pos) = self.timesteps.binary_search(&timestep) {
            self.timesteps.insert(pos, timestep);
        }
        Ok(self)
    }

    fn insert(
        &mut self,
        property: Property,
        domain: Option<Domain>,
        timestep: Option<usize>,
        field: Field3D<T>,
    ) -> Result<()> {
        let shape = PropertySource::<T>::shape(self);
        if field.shape() != shape {
            return Err(Error::shape(&shape, &field.shape()));
        }
        let key = Key {
            property,
            domain,
            timestep,
        };
        self.fields.insert(key, field);
        Ok(())
    }

    fn lookup(
        &self,
        property: Property,
        domain: Option<Domain>,
        timestep: usize,
    ) -> Option<&Field3D<T>> {
        let domains = [domain, None];
        let n = if domain.is_some() { 2 } else { 1 };
        domains[..n].iter().find_map(|&domain| {
            [Some(timestep), None].iter().find_map(|&timestep| {
                self.fields.get(&Key {
                    property,
                    domain,
                    timestep,
                })
            })
        })
    }
}

impl<T: Float> PropertySource<T> for InMemorySource<T> {
    fn shape(&self) -> [usize; 3] {
        [
            self.widths[0].len(),
            self.widths[1].len(),
            self.widths[2].len(),
        ]
    }

    fn timesteps(&self) -> Vec<usize> {
        self.timesteps.clone()
    }

    fn value(
        &self,
        property: Property,
        cell: [usize; 3],
        domain: Option<Domain>,
        timestep: usize,
    ) -> Result<T> {
        let shape = PropertySource::<T>::shape(self);
        if (0..3).any(|d| cell[d] >= shape[d]) {
            return Err(Error::Property {
                property: property.to_string(),
                message: format!("cell {cell:?} is outside grid of shape {shape:?}"),
            });
        }

        if let Property::CellWidth(axis) = property {
            return Ok(self.widths[axis.index()][cell[axis.index()]]);
        }

        if !self.timesteps.contains(&timestep) {
            return Err(Error::UnknownTimestep(timestep));
        }
        self.lookup(property, domain, timestep)
            .map(|f| f.get(cell[0], cell[1], cell[2]))
            .ok_or_else(|| Error::Property {
                property: property.to_string(),
                message: format!("not loaded for domain {domain:?} at timestep {timestep}"),
            })
    }
}

/// A simulation result together with the grid resolved from its cell widths.
///
/// The grid is resolved once on construction and never changes afterwards.
#[derive(Clone, Debug)]
pub struct Model<T: Float, S> {
    source: S,
    grid: Grid<T>,
    domain: Option<Domain>,
}

impl<T: Float, S: PropertySource<T>> Model<T, S> {
    /// Resolve the grid of `source` by sampling cell widths along the first grid
    /// line of each axis, in the given domain.
    ///
    /// # Errors
    /// * If the source has no timesteps
    /// * If any width lookup fails or yields an invalid width
    pub fn new(source: S, domain: Option<Domain>) -> Result<Self> {
        let timestep = *source.timesteps().first().ok_or(Error::NoTimesteps)?;
        let shape = source.shape();

        let mut widths: [Vec<T>; 3] = Default::default();
        for axis in Axis::ALL {
            let d = axis.index();
            widths[d] = (0..shape[d])
                .map(|n| {
                    let mut cell = [0_usize; 3];
                    cell[d] = n;
                    source.value(Property::CellWidth(axis), cell, domain, timestep)
                })
                .collect::<Result<Vec<T>>>()?;
        }
        let grid = Grid::from_widths(&widths[0], &widths[1], &widths[2])?;

        Ok(Self {
            source,
            grid,
            domain,
        })
    }

    #[inline]
    pub fn source(&self) -> &S {
        &self.source
    }

    #[inline]
    pub fn grid(&self) -> &Grid<T> {
        &self.grid
    }

    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        self.grid.shape()
    }

    /// Domain the grid was resolved in
    #[inline]
    pub fn domain(&self) -> Option<Domain> {
        self.domain
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn source() -> InMemorySource<f64> {
        let shape = [2, 3, 1];
        InMemorySource::new(vec![1.0, 2.0], vec![0.5; 3], vec![4.0])
            .with_static(
                Property::Marker,
                None,
                Field3D::from_vec(shape, vec![1.0, 2.0, 1.0, 1.0, 1.0, 2.0]).unwrap(),
            )
            .unwrap()
            .with_timestep(10, Property::Saturation, None, Field3D::from_vec(shape, vec![0.1; 6]).unwrap())
            .unwrap()
            .with_timestep(
                10,
                Property::Saturation,
                Some(Domain::Fracture),
                Field3D::from_vec(shape, vec![0.9; 6]).unwrap(),
            )
            .unwrap()
            .with_timestep(0, Property::Saturation, None, Field3D::from_vec(shape, vec![0.0; 6]).unwrap())
            .unwrap()
    }

    #[test]
    fn test_lookup() {
        let s = source();
        assert_eq!(s.timesteps(), vec![0, 10]);
        assert!(s.has_timestep(10));
        assert!(!s.has_timestep(5));

        assert_eq!(s.value(Property::Marker, [0, 1, 0], None, 10).unwrap(), 2.0);
        assert_eq!(s.value(Property::Marker, [0, 1, 0], Some(Domain::Matrix), 0).unwrap(), 2.0);
        assert_eq!(s.value(Property::Saturation, [1, 2, 0], None, 10).unwrap(), 0.1);
        assert_eq!(s.value(Property::Saturation, [1, 2, 0], Some(Domain::Matrix), 10).unwrap(), 0.1);
        assert_eq!(s.value(Property::Saturation, [1, 2, 0], Some(Domain::Fracture), 10).unwrap(), 0.9);
        assert_eq!(s.value(Property::CellWidth(Axis::X), [1, 2, 0], None, 0).unwrap(), 2.0);
    }

    #[test]
    fn test_lookup_errors() {
        let s = source();
        assert!(matches!(
            s.value(Property::Saturation, [0, 0, 0], None, 5),
            Err(Error::UnknownTimestep(5))
        ));
        assert!(matches!(
            s.value(Property::PoreVolume, [0, 0, 0], None, 10),
            Err(Error::Property { .. })
        ));
        assert!(s.value(Property::Saturation, [2, 0, 0], None, 10).is_err());
        assert!(matches!(
            s.field(Property::Saturation, None, 3),
            Err(Error::UnknownTimestep(3))
        ));
        assert!(InMemorySource::new(vec![1.0_f64], vec![1.0], vec![1.0])
            .with_static(Property::Marker, None, Field3D::zeros([2, 1, 1]))
            .is_err());
    }

    #[test]
    fn test_field_read() {
        let s = source();
        let f = s.field(Property::Marker, None, 0).unwrap();
        assert_eq!(f.shape(), [2, 3, 1]);
        assert_eq!(f.get(1, 2, 0), 2.0);
    }

    #[test]
    fn test_model_resolves_grid() {
        let model = Model::new(source(), None).unwrap();
        assert_eq!(model.shape(), [2, 3, 1]);
        assert_eq!(model.grid().axis(Axis::X).boundaries(), &[1.0, 3.0]);
        assert_eq!(model.grid().axis(Axis::Y).boundaries(), &[0.5, 1.0, 1.5]);
        assert_eq!(model.grid().axis(Axis::Z).boundaries(), &[4.0]);

        let empty = InMemorySource::new(vec![1.0_f64], vec![1.0], vec![1.0]);
        assert!(matches!(Model::new(empty, None), Err(Error::NoTimesteps)));

        let bad = InMemorySource::new(vec![1.0_f64, f64::NAN], vec![1.0], vec![1.0])
            .with_timestep(0, Property::Saturation, None, Field3D::zeros([2, 1, 1]))
            .unwrap();
        assert!(matches!(Model::new(bad, None), Err(Error::NonFiniteWidth { .. })));
    }
}
