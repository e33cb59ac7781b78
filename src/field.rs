//! Dense 3D scalar fields over a structured grid's index space.
//!
//! Values are stored in C order, `(x0, y0, z0), (x0, y0, z1), ..., (x0, y1, z0), ...`,
//! so the Z index varies fastest.
use itertools::iproduct;
use num_traits::Float;

use crate::axis::Axis;
use crate::error::{Error, Result};

/// Flat index of cell `(i, j, k)` in a C-ordered array of the given shape
#[inline]
pub(crate) fn flat_index(shape: [usize; 3], i: usize, j: usize, k: usize) -> usize {
    (i * shape[1] + j) * shape[2] + k
}

/// One scalar per cell of a structured grid, for a single timestep.
#[derive(Clone, Debug, PartialEq)]
pub struct Field3D<T: Float> {
    shape: [usize; 3],
    data: Vec<T>,
}

impl<T: Float> Field3D<T> {
    pub fn zeros(shape: [usize; 3]) -> Self {
        Self {
            shape,
            data: vec![T::zero(); shape.iter().product()],
        }
    }

    /// Wrap C-ordered values.
    ///
    /// # Errors
    /// * If the number of values does not match the shape
    pub fn from_vec(shape: [usize; 3], data: Vec<T>) -> Result<Self> {
        let n: usize = shape.iter().product();
        if data.len() != n {
            return Err(Error::shape(&[n], &[data.len()]));
        }
        Ok(Self { shape, data })
    }

    /// Fill a field by evaluating `f(i, j, k)` at every cell.
    pub fn try_from_fn<F>(shape: [usize; 3], mut f: F) -> Result<Self>
    where
        F: FnMut(usize, usize, usize) -> Result<T>,
    {
        let data = iproduct!(0..shape[0], 0..shape[1], 0..shape[2])
            .map(|(i, j, k)| f(i, j, k))
            .collect::<Result<Vec<T>>>()?;
        Ok(Self { shape, data })
    }

    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> T {
        self.data[flat_index(self.shape, i, j, k)]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, k: usize, v: T) {
        let idx = flat_index(self.shape, i, j, k);
        self.data[idx] = v;
    }

    /// Replace NaN and infinite values (e.g. inactive cells) with zero.
    pub fn sanitize(&mut self) {
        self.data
            .iter_mut()
            .filter(|v| !v.is_finite())
            .for_each(|v| *v = T::zero());
    }

    /// Zero every cell where `mask` is set.
    ///
    /// # Errors
    /// * If the mask shape does not match the field
    pub fn zero_where(&mut self, mask: &CellMask) -> Result<()> {
        self.check_shape(mask.shape)?;
        self.data
            .iter_mut()
            .zip(&mask.data)
            .filter(|(_, m)| **m)
            .for_each(|(v, _)| *v = T::zero());
        Ok(())
    }

    /// Elementwise product, e.g. water volume from pore volume and saturation
    pub fn product(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, |a, b| a * b)
    }

    /// Elementwise `|self - other|`
    pub fn abs_diff(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, |a, b| (a - b).abs())
    }

    /// Apply `f` to each pair of values from two fields of the same shape.
    pub fn zip_with<F>(&self, other: &Self, f: F) -> Result<Self>
    where
        F: Fn(T, T) -> T,
    {
        self.check_shape(other.shape)?;
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| f(a, b))
            .collect();
        Ok(Self {
            shape: self.shape,
            data,
        })
    }

    /// Euclidean norm of the flattened field
    pub fn norm(&self) -> T {
        self.data
            .iter()
            .fold(T::zero(), |acc, &v| acc + v * v)
            .sqrt()
    }

    fn check_shape(&self, shape: [usize; 3]) -> Result<()> {
        if self.shape != shape {
            return Err(Error::shape(&self.shape, &shape));
        }
        Ok(())
    }
}

/// Boolean selection of cells over a grid's index space, in the same order as [`Field3D`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellMask {
    shape: [usize; 3],
    data: Vec<bool>,
}

impl CellMask {
    pub fn none(shape: [usize; 3]) -> Self {
        Self {
            shape,
            data: vec![false; shape.iter().product()],
        }
    }

    /// Select every cell whose index along `axis` equals `index`.
    ///
    /// # Errors
    /// * If `index` is outside the grid along `axis`
    pub fn layer(shape: [usize; 3], axis: Axis, index: usize) -> Result<Self> {
        let n = shape[axis.index()];
        if index >= n {
            return Err(Error::Config(format!(
                "layer {index} is outside the {axis} axis with {n} cells"
            )));
        }
        let data = iproduct!(0..shape[0], 0..shape[1], 0..shape[2])
            .map(|(i, j, k)| [i, j, k][axis.index()] == index)
            .collect();
        Ok(Self { shape, data })
    }

    /// Select cells where `pred` holds for the field value
    pub fn from_field<T: Float, F>(field: &Field3D<T>, pred: F) -> Self
    where
        F: Fn(T) -> bool,
    {
        Self {
            shape: field.shape,
            data: field.data.iter().map(|&v| pred(v)).collect(),
        }
    }

    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> bool {
        self.data[flat_index(self.shape, i, j, k)]
    }

    /// Number of selected cells
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&m| m).count()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_c_ordering() {
        let f = Field3D::from_vec([2, 3, 4], (0..24).map(|x| x as f64).collect()).unwrap();
        assert_eq!(f.get(0, 0, 1), 1.0);
        assert_eq!(f.get(0, 1, 0), 4.0);
        assert_eq!(f.get(1, 0, 0), 12.0);
        assert_eq!(f.get(1, 2, 3), 23.0);

        let g = Field3D::try_from_fn([2, 3, 4], |i, j, k| Ok((i * 12 + j * 4 + k) as f64)).unwrap();
        assert_eq!(f, g);
    }

    #[test]
    fn test_from_vec_checks_size() {
        assert!(Field3D::from_vec([2, 2, 2], vec![0.0_f64; 7]).is_err());
    }

    #[test]
    fn test_sanitize() {
        let mut f =
            Field3D::from_vec([1, 1, 4], vec![1.0_f64, f64::NAN, f64::INFINITY, -2.0]).unwrap();
        f.sanitize();
        assert_eq!(f.as_slice(), &[1.0, 0.0, 0.0, -2.0]);
    }

    #[test]
    fn test_layer_mask() {
        let shape = [2, 3, 4];
        let mask = CellMask::layer(shape, Axis::Z, 0).unwrap();
        assert_eq!(mask.count(), 6);
        assert!(mask.get(1, 2, 0));
        assert!(!mask.get(1, 2, 1));

        let mask = CellMask::layer(shape, Axis::Y, 2).unwrap();
        assert_eq!(mask.count(), 8);
        assert!(CellMask::layer(shape, Axis::X, 2).is_err());

        let mut f = Field3D::from_vec(shape, vec![1.0_f64; 24]).unwrap();
        f.zero_where(&mask).unwrap();
        assert_eq!(f.get(0, 2, 3), 0.0);
        assert_eq!(f.get(0, 1, 3), 1.0);
        assert!(f.zero_where(&CellMask::none([1, 1, 1])).is_err());
    }

    #[test]
    fn test_elementwise() {
        let a = Field3D::from_vec([1, 1, 3], vec![1.0_f64, 2.0, 3.0]).unwrap();
        let b = Field3D::from_vec([1, 1, 3], vec![0.5_f64, 0.5, 4.0]).unwrap();
        assert_eq!(a.product(&b).unwrap().as_slice(), &[0.5, 1.0, 12.0]);
        assert_eq!(a.abs_diff(&b).unwrap().as_slice(), &[0.5, 1.5, 1.0]);
        assert_eq!(
            Field3D::from_vec([1, 1, 2], vec![3.0_f64, 4.0]).unwrap().norm(),
            5.0
        );
        assert!(a.product(&Field3D::zeros([3, 1, 1])).is_err());
    }
}
