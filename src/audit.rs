//! Human-readable, append-only record of evaluations.
//!
//! Each report is written as a small table: a header, one line per timestep with
//! its scalar misfit, and a summary line with the aggregate cost.
//!
//! ```text
//!     TS     |    Cost
//! -------------------------
//!     0      |   0.412
//!    400     |   1.093
//! -------------------------
//!   Norm:    |   1.168
//! ```
//!
//! The format is meant for people reading along with a calibration, not for parsing.
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use num_traits::Float;

use crate::error::Result;
use crate::misfit::{evaluate_misfit, CostReport, MisfitContext};
use crate::source::{Model, PropertySource};

const RULE_WIDTH: usize = 25;

/// Writes cost reports to a text sink.
pub struct AuditLog<W: Write> {
    writer: W,
}

impl AuditLog<BufWriter<File>> {
    /// Open `path` for appending, creating it if needed.
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> AuditLog<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Append one report and flush.
    pub fn write_report<T: Float>(&mut self, report: &CostReport<T>) -> Result<()> {
        let rule = "-".repeat(RULE_WIDTH);
        let w = &mut self.writer;

        writeln!(w, "{:^10} | {:^10}", "TS", "Cost")?;
        writeln!(w, "{rule}")?;
        for t in &report.timesteps {
            writeln!(w, "{:^10} | {:^10.3}", t.timestep, as_f64(t.cost))?;
        }
        writeln!(w, "{rule}")?;
        writeln!(w, "{:^10} | {:^10.3}", "Norm:", as_f64(report.cost))?;
        w.flush()?;
        Ok(())
    }
}

#[inline]
fn as_f64<T: Float>(x: T) -> f64 {
    x.to_f64().unwrap_or(f64::NAN)
}

/// Evaluate the misfit of `target` and append the report to `log`.
///
/// The returned report is the same as from [`evaluate_misfit`]; logging has no
/// effect on the result.
pub fn evaluate_misfit_logged<T, S, R, W>(
    target: &Model<T, S>,
    context: &MisfitContext<T, R>,
    log: &mut AuditLog<W>,
) -> Result<CostReport<T>>
where
    T: Float,
    S: PropertySource<T>,
    R: PropertySource<T>,
    W: Write,
{
    let report = evaluate_misfit(target, context)?;
    log.write_report(&report)?;
    Ok(report)
}
