//! Dispatch of independent simulation runs and parallel scoring of their results.
//!
//! [`run_batch`] drives any [`JobRunner`] through submit, poll and fetch until
//! every job has finished or the polling budget is spent. [`evaluate_batch`] then
//! scores the completed runs against one shared [`MisfitContext`] on a bounded
//! worker pool, substituting a penalty for runs that never produced a result.
use std::thread;
use std::time::Duration;

use num_traits::Float;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, instrument, warn};

use crate::config::BatchConfig;
use crate::error::{Error, Result};
use crate::misfit::{evaluate_misfit, CostReport, MisfitContext};
use crate::source::{Model, PropertySource};

/// Handle of one submitted job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JobId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Something that can run a simulation and hand back its result, e.g. a local
/// process launcher or a cluster scheduler client.
pub trait JobRunner {
    /// Description of one run
    type Spec;

    /// Result of a completed run
    type Output;

    fn submit(&self, spec: &Self::Spec) -> Result<JobId>;

    fn poll(&self, id: JobId) -> Result<JobStatus>;

    /// Retrieve the result of a job that reported [`JobStatus::Completed`]
    fn fetch(&self, id: JobId) -> Result<Self::Output>;
}

/// Final state of one run in a batch.
#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome<S> {
    Completed(S),
    Failed { reason: String },
}

impl<S> RunOutcome<S> {
    fn failed(reason: impl Into<String>) -> Self {
        RunOutcome::Failed {
            reason: reason.into(),
        }
    }
}

/// Submit every spec, poll until all jobs are terminal or `max_polls` rounds
/// have passed, and fetch the completed ones.
///
/// Outcomes are returned in the order of `specs`. Jobs that could not be
/// submitted, reported failure, did not finish in time or could not be fetched
/// become [`RunOutcome::Failed`].
#[instrument(skip_all, fields(jobs = specs.len()))]
pub fn run_batch<J: JobRunner>(
    runner: &J,
    specs: &[J::Spec],
    config: &BatchConfig,
) -> Vec<RunOutcome<J::Output>> {
    let mut outcomes: Vec<Option<RunOutcome<J::Output>>> = Vec::with_capacity(specs.len());
    let mut pending: Vec<(usize, JobId)> = Vec::new();

    for (n, spec) in specs.iter().enumerate() {
        match runner.submit(spec) {
            Ok(id) => {
                debug!(run = n, job = id.0, "submitted");
                pending.push((n, id));
                outcomes.push(None);
            }
            Err(e) => {
                warn!(run = n, error = %e, "submission failed");
                outcomes.push(Some(RunOutcome::failed(format!("submission failed: {e}"))));
            }
        }
    }

    let interval = Duration::from_millis(config.poll_interval_ms);
    for round in 0..config.max_polls {
        if pending.is_empty() {
            break;
        }

        pending.retain(|&(n, id)| {
            let finished = match runner.poll(id) {
                Ok(status) if !status.is_terminal() => return true,
                Ok(JobStatus::Completed) => match runner.fetch(id) {
                    Ok(output) => RunOutcome::Completed(output),
                    Err(e) => {
                        warn!(run = n, job = id.0, error = %e, "fetch failed");
                        RunOutcome::failed(format!("fetch failed: {e}"))
                    }
                },
                Ok(_) => {
                    warn!(run = n, job = id.0, "job failed");
                    RunOutcome::failed("job reported failure")
                }
                Err(e) => {
                    warn!(run = n, job = id.0, error = %e, "poll failed");
                    RunOutcome::failed(format!("poll failed: {e}"))
                }
            };
            outcomes[n] = Some(finished);
            false
        });

        if !pending.is_empty() && round + 1 < config.max_polls {
            thread::sleep(interval);
        }
    }

    for &(n, id) in &pending {
        warn!(run = n, job = id.0, polls = config.max_polls, "timed out");
        outcomes[n] = Some(RunOutcome::failed(format!(
            "not finished after {} polls",
            config.max_polls
        )));
    }

    outcomes
        .into_iter()
        .map(|o| o.unwrap_or_else(|| RunOutcome::failed("not dispatched")))
        .collect()
}

/// Score of one run in a batch.
#[derive(Clone, Debug, PartialEq)]
pub enum RunCost<T> {
    Evaluated(CostReport<T>),
    Penalized { cost: T, reason: String },
}

impl<T: Float> RunCost<T> {
    #[inline]
    pub fn cost(&self) -> T {
        match self {
            RunCost::Evaluated(report) => report.cost,
            RunCost::Penalized { cost, .. } => *cost,
        }
    }
}

/// Evaluate every completed run against `context` on a pool of
/// `config.workers` threads.
///
/// Failed runs are given `config.penalty_cost`. Results are returned in the
/// order of `outcomes`.
///
/// # Errors
/// * If the batch configuration is invalid or the pool cannot be started
/// * If evaluating any completed run fails
pub fn evaluate_batch<T, S, R>(
    outcomes: Vec<RunOutcome<S>>,
    context: &MisfitContext<T, R>,
    config: &BatchConfig,
) -> Result<Vec<RunCost<T>>>
where
    T: Float + Send + Sync,
    S: PropertySource<T> + Send,
    R: PropertySource<T> + Sync,
{
    config.validate()?;
    let penalty = T::from(config.penalty_cost).ok_or_else(|| {
        Error::Config(format!("penalty {} is not representable", config.penalty_cost))
    })?;
    let domain = config.domain;
    let pool = ThreadPoolBuilder::new().num_threads(config.workers).build()?;

    let costs = pool.install(|| {
        outcomes
            .into_par_iter()
            .enumerate()
            .map(|(n, outcome)| match outcome {
                RunOutcome::Completed(source) => {
                    let model = Model::new(source, domain)?;
                    evaluate_misfit(&model, context).map(RunCost::Evaluated)
                }
                RunOutcome::Failed { reason } => {
                    debug!(run = n, %reason, "penalized");
                    Ok(RunCost::Penalized {
                        cost: penalty,
                        reason,
                    })
                }
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let penalized = costs
        .iter()
        .filter(|c| matches!(c, RunCost::Penalized { .. }))
        .count();
    info!(runs = costs.len(), penalized, "batch evaluated");
    Ok(costs)
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;

    use super::*;
    use crate::config::MisfitConfig;
    use crate::source::{Domain, InMemorySource, Property};
    use crate::field::Field3D;

    /// Scripted job: reports `Running` for `polls` rounds, then `outcome`
    #[derive(Clone, Copy)]
    struct Script {
        polls: usize,
        outcome: JobStatus,
        fetch_ok: bool,
        saturation: f64,
    }

    impl Script {
        fn done(polls: usize, saturation: f64) -> Self {
            Self {
                polls,
                outcome: JobStatus::Completed,
                fetch_ok: true,
                saturation,
            }
        }
    }

    #[derive(Default)]
    struct MockRunner {
        jobs: RefCell<Vec<(Script, usize)>>,
        reject: Option<usize>,
    }

    impl JobRunner for MockRunner {
        type Spec = Script;
        type Output = InMemorySource<f64>;

        fn submit(&self, spec: &Script) -> Result<JobId> {
            let mut jobs = self.jobs.borrow_mut();
            let id = jobs.len() as u64;
            if self.reject == Some(jobs.len()) {
                jobs.push((*spec, 0));
                return Err(Error::Job {
                    id,
                    message: "queue full".into(),
                });
            }
            jobs.push((*spec, 0));
            Ok(JobId(id))
        }

        fn poll(&self, id: JobId) -> Result<JobStatus> {
            let mut jobs = self.jobs.borrow_mut();
            let (script, seen) = &mut jobs[id.0 as usize];
            *seen += 1;
            if *seen > script.polls {
                Ok(script.outcome)
            } else if *seen == 1 {
                Ok(JobStatus::Pending)
            } else {
                Ok(JobStatus::Running)
            }
        }

        fn fetch(&self, id: JobId) -> Result<InMemorySource<f64>> {
            let (script, _) = self.jobs.borrow()[id.0 as usize];
            if !script.fetch_ok {
                return Err(Error::Job {
                    id: id.0,
                    message: "output missing".into(),
                });
            }
            Ok(coarse_source(script.saturation))
        }
    }

    fn coarse_source(saturation: f64) -> InMemorySource<f64> {
        InMemorySource::new(vec![1.0; 2], vec![1.0], vec![1.0])
            .with_timestep(0, Property::PoreVolume, None, Field3D::from_vec([2, 1, 1], vec![2.0; 2]).unwrap())
            .unwrap()
            .with_timestep(
                0,
                Property::Saturation,
                None,
                Field3D::from_vec([2, 1, 1], vec![saturation; 2]).unwrap(),
            )
            .unwrap()
    }

    fn context() -> MisfitContext<f64, InMemorySource<f64>> {
        let reference = InMemorySource::new(vec![0.5_f64; 4], vec![1.0], vec![1.0])
            .with_timestep(0, Property::PoreVolume, None, Field3D::from_vec([4, 1, 1], vec![1.0; 4]).unwrap())
            .unwrap()
            .with_timestep(0, Property::Saturation, None, Field3D::from_vec([4, 1, 1], vec![0.5; 4]).unwrap())
            .unwrap();
        let target = Model::new(coarse_source(0.5), None).unwrap();
        MisfitContext::builder()
            .reference(Model::new(reference, None).unwrap())
            .config(MisfitConfig {
                exclude_marker: None,
                frame: None,
                ..Default::default()
            })
            .build(target.grid())
            .unwrap()
    }

    fn fast() -> BatchConfig {
        BatchConfig {
            workers: 2,
            poll_interval_ms: 0,
            max_polls: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_run_batch_outcomes() {
        let runner = MockRunner {
            reject: Some(1),
            ..Default::default()
        };
        let specs = [
            Script::done(2, 0.5),
            Script::done(0, 0.5),
            Script {
                outcome: JobStatus::Failed,
                ..Script::done(1, 0.5)
            },
            Script {
                fetch_ok: false,
                ..Script::done(0, 0.5)
            },
            Script::done(10, 0.5),
            Script::done(4, 0.25),
        ];

        let outcomes = run_batch(&runner, &specs, &fast());
        assert_eq!(outcomes.len(), specs.len());
        assert!(matches!(outcomes[0], RunOutcome::Completed(_)));
        assert!(matches!(&outcomes[1], RunOutcome::Failed { reason } if reason.contains("submission")));
        assert!(matches!(&outcomes[2], RunOutcome::Failed { reason } if reason.contains("reported failure")));
        assert!(matches!(&outcomes[3], RunOutcome::Failed { reason } if reason.contains("fetch")));
        assert!(matches!(&outcomes[4], RunOutcome::Failed { reason } if reason.contains("5 polls")));
        assert!(matches!(outcomes[5], RunOutcome::Completed(_)));

        // No job is polled after it has finished
        let jobs = runner.jobs.borrow();
        assert_eq!(jobs[0].1, 3);
        assert_eq!(jobs[1].1, 0);
        assert_eq!(jobs[4].1, 5);
        assert_eq!(jobs[5].1, 5);
    }

    #[test]
    fn test_zero_polls_times_out_everything() {
        let runner = MockRunner::default();
        let config = BatchConfig {
            max_polls: 0,
            ..fast()
        };
        let outcomes = run_batch(&runner, &[Script::done(0, 0.5)], &config);
        assert!(matches!(outcomes[0], RunOutcome::Failed { .. }));
    }

    #[test]
    fn test_evaluate_batch_penalizes_and_preserves_order() {
        let ctx = context();
        let outcomes = vec![
            RunOutcome::Completed(coarse_source(0.5)),
            RunOutcome::Failed {
                reason: "node lost".into(),
            },
            RunOutcome::Completed(coarse_source(0.25)),
            RunOutcome::Completed(coarse_source(0.5)),
        ];

        let costs = evaluate_batch(outcomes, &ctx, &fast()).unwrap();
        assert_eq!(costs.len(), 4);
        assert_eq!(costs[0].cost(), 0.0);
        assert_eq!(
            costs[1],
            RunCost::Penalized {
                cost: 1e6,
                reason: "node lost".into()
            }
        );
        assert!(costs[2].cost() > 0.0);
        assert_eq!(costs[3].cost(), 0.0);

        // Same score as a sequential evaluation
        let single = Model::new(coarse_source(0.25), None).unwrap();
        assert_eq!(costs[2].cost(), evaluate_misfit(&single, &ctx).unwrap().cost);
    }

    #[test]
    fn test_evaluate_batch_propagates_errors() {
        let ctx = context();
        let foreign = InMemorySource::new(vec![1.0_f64; 3], vec![1.0], vec![1.0])
            .with_timestep(0, Property::Saturation, None, Field3D::zeros([3, 1, 1]))
            .unwrap();
        let outcomes = vec![RunOutcome::Completed(coarse_source(0.5)), RunOutcome::Completed(foreign)];
        assert!(matches!(
            evaluate_batch(outcomes, &ctx, &fast()),
            Err(Error::DimensionMismatch { .. })
        ));

        let config = BatchConfig {
            workers: 0,
            ..fast()
        };
        assert!(matches!(
            evaluate_batch(Vec::<RunOutcome<InMemorySource<f64>>>::new(), &ctx, &config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_end_to_end() {
        let ctx = context();
        let runner = MockRunner::default();
        let specs = [Script::done(1, 0.5), Script::done(0, 0.75)];

        let outcomes = run_batch(&runner, &specs, &fast());
        let costs = evaluate_batch(outcomes, &ctx, &fast()).unwrap();
        assert_eq!(costs[0].cost(), 0.0);
        assert!(matches!(costs[1], RunCost::Evaluated(_)));
        assert!(costs[1].cost() > 0.0);
    }

    #[test]
    fn test_evaluate_batch_reads_configured_domain() {
        let ctx = context();
        let dual = coarse_source(0.5)
            .with_timestep(
                0,
                Property::Saturation,
                Some(Domain::Fracture),
                Field3D::from_vec([2, 1, 1], vec![0.9; 2]).unwrap(),
            )
            .unwrap();
        let outcomes = || vec![RunOutcome::Completed(dual.clone())];

        let costs = evaluate_batch(outcomes(), &ctx, &fast()).unwrap();
        assert_eq!(costs[0].cost(), 0.0);

        let config = BatchConfig {
            domain: Some(Domain::Fracture),
            ..fast()
        };
        let costs = evaluate_batch(outcomes(), &ctx, &config).unwrap();
        assert!(costs[0].cost() > 0.0);
    }
}
