//! Misfit and batch-evaluation settings, loadable from JSON.
//!
//! Every field has a default, so a partial document such as
//!
//! ```json
//! { "exclude_marker": null, "frame": { "axis": "z", "index": 0 } }
//! ```
//!
//! is a complete configuration.
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::axis::Axis;
use crate::error::{Error, Result};
use crate::source::Domain;

/// Marker value of the fracture relative-permeability set in the fine reference
const DEFAULT_EXCLUDE_MARKER: i64 = 2;

/// A single layer of cells along one axis, e.g. the first K layer of a model
/// whose top is a non-physical frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLayer {
    pub axis: Axis,
    pub index: usize,
}

impl Default for FrameLayer {
    fn default() -> Self {
        Self {
            axis: Axis::Z,
            index: 0,
        }
    }
}

/// Masking and regularization settings for one misfit evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MisfitConfig {
    /// Reference cells with this marker are removed before upscaling
    pub exclude_marker: Option<i64>,

    /// Target cells in this layer are excluded from the objective
    pub frame: Option<FrameLayer>,

    /// Added to the reference saturation when normalizing saturation distances
    pub saturation_epsilon: f64,

    /// Added to reference volumes when normalizing volume distances
    pub volume_offset: f64,
}

impl Default for MisfitConfig {
    fn default() -> Self {
        Self {
            exclude_marker: Some(DEFAULT_EXCLUDE_MARKER),
            frame: Some(FrameLayer::default()),
            saturation_epsilon: 1e-4,
            volume_offset: 1.0,
        }
    }
}

impl MisfitConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    /// # Errors
    /// * If either regularization term is negative or non-finite
    pub fn validate(&self) -> Result<()> {
        if !(self.saturation_epsilon.is_finite() && self.saturation_epsilon > 0.0) {
            return Err(Error::Config(format!(
                "saturation_epsilon must be positive, got {}",
                self.saturation_epsilon
            )));
        }
        if !(self.volume_offset.is_finite() && self.volume_offset > 0.0) {
            return Err(Error::Config(format!(
                "volume_offset must be positive, got {}",
                self.volume_offset
            )));
        }
        Ok(())
    }
}

/// Settings for dispatching and evaluating many independent runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Size of the evaluation worker pool
    pub workers: usize,

    /// Cost substituted for runs that failed or never completed
    pub penalty_cost: f64,

    /// Pause between polling rounds
    pub poll_interval_ms: u64,

    /// Polling rounds before unfinished runs are given up on
    pub max_polls: usize,

    /// Domain completed runs are read in, for dual-porosity models
    pub domain: Option<Domain>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            penalty_cost: 1e6,
            poll_interval_ms: 500,
            max_polls: 7200,
            domain: None,
        }
    }
}

impl BatchConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    /// # Errors
    /// * If there are no workers
    /// * If the penalty is negative or non-finite
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("at least one worker is required".into()));
        }
        if !(self.penalty_cost.is_finite() && self.penalty_cost >= 0.0) {
            return Err(Error::Config(format!(
                "penalty_cost must be a non-negative number, got {}",
                self.penalty_cost
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = MisfitConfig::from_json_str("{}").unwrap();
        assert_eq!(c, MisfitConfig::default());
        assert_eq!(c.exclude_marker, Some(2));
        assert_eq!(c.frame, Some(FrameLayer { axis: Axis::Z, index: 0 }));
        assert_eq!(c.saturation_epsilon, 1e-4);
        assert_eq!(c.volume_offset, 1.0);

        assert_eq!(BatchConfig::from_json_str("{}").unwrap(), BatchConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let c = MisfitConfig::from_json_str(
            r#"{ "exclude_marker": null, "frame": { "axis": "x", "index": 3 } }"#,
        )
        .unwrap();
        assert_eq!(c.exclude_marker, None);
        assert_eq!(c.frame, Some(FrameLayer { axis: Axis::X, index: 3 }));
        assert_eq!(c.volume_offset, 1.0);

        let b = BatchConfig::from_json_str(r#"{ "workers": 8, "domain": "fracture" }"#).unwrap();
        assert_eq!(b.workers, 8);
        assert_eq!(b.domain, Some(Domain::Fracture));
        assert_eq!(b.max_polls, 7200);
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(matches!(
            MisfitConfig::from_json_str(r#"{ "saturation_epsilon": 0.0 }"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            MisfitConfig::from_json_str(r#"{ "frame": { "axis": "w", "index": 0 } }"#),
            Err(Error::Json(_))
        ));
        assert!(BatchConfig::from_json_str(r#"{ "workers": 0 }"#).is_err());
        assert!(BatchConfig::from_json_str(r#"{ "penalty_cost": -1.0 }"#).is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            MisfitConfig::from_json_file("/nonexistent/gridmatch.json"),
            Err(Error::Io(_))
        ));
    }
}
