//! Convenience methods for constructing cell-width arrays for grid pairs,
//! echoing, but not exactly matching, methods common in scripting languages.
use itertools::Itertools;
use num_traits::Float;

use crate::error::{Error, Result};

/// Generates evenly spaced values from start to stop,
/// including the endpoint.
pub fn linspace<T>(start: T, stop: T, n: usize) -> Vec<T>
where
    T: Float,
{
    let dx: T = (stop - start) / T::from(n - 1).unwrap();
    (0..n).map(|i| start + T::from(i).unwrap() * dx).collect()
}

/// Split every cell into `factor` cells of equal width, producing a refinement
/// whose boundaries include every original boundary.
///
/// # Errors
/// * If `factor` is zero
pub fn refine<T>(widths: &[T], factor: usize) -> Result<Vec<T>>
where
    T: Float,
{
    check_factor(factor)?;
    let f = T::from(factor)
        .ok_or_else(|| Error::Config(format!("factor {factor} is not representable")))?;
    Ok(widths
        .iter()
        .flat_map(|&w| itertools::repeat_n(w / f, factor))
        .collect())
}

/// Merge consecutive runs of `factor` cells into one, producing a coarsening.
/// A trailing partial run becomes its own, shorter cell.
///
/// # Errors
/// * If `factor` is zero
pub fn coarsen<T>(widths: &[T], factor: usize) -> Result<Vec<T>>
where
    T: Float,
{
    check_factor(factor)?;
    Ok(widths
        .iter()
        .chunks(factor)
        .into_iter()
        .map(|chunk| chunk.fold(T::zero(), |acc, &w| acc + w))
        .collect())
}

fn check_factor(factor: usize) -> Result<()> {
    if factor == 0 {
        return Err(Error::Config("refinement factor must be at least 1".into()));
    }
    Ok(())
}
