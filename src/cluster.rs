//! Runs a partitioned simulation with one thread per row band.
//!
//! Each round every worker calls `update` (ghost refresh + ignition return
//! with its neighbours), optionally contributes to a gather, then joins the
//! termination vote. The loop ends on the globally agreed answer.

use crate::aggregation::{termination_vote, GatherLayout, Observer};
use crate::comm::{is_peer_lost, Communicator, ThreadComm};
use crate::display::Display;
use crate::simulation::Model;
use anyhow::{anyhow, Context, Result};
use log::{debug, info, trace};
use serde::Serialize;
use std::thread;
use std::time::{Duration, Instant};
use wildfire_common::{ModelParams, ObservationMode, RunConfig};

/// How a run is laid out and observed.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub workers: usize,
    pub observation: ObservationMode,
    pub observe_every: u64,
    pub max_steps: Option<u64>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from(&RunConfig::default())
    }
}

impl From<&RunConfig> for RunSettings {
    fn from(run: &RunConfig) -> Self {
        Self {
            workers: run.workers,
            observation: run.observation,
            observe_every: run.observe_every.max(1),
            max_steps: run.max_steps,
        }
    }
}

/// Why the round loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// No worker had a burning cell left.
    Extinguished,
    /// `max_steps` rounds were run.
    StepLimit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub rank: usize,
    pub first_row: usize,
    pub local_rows: usize,
    /// Burning cells of this band when the run ended.
    pub final_front: usize,
    pub steps: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub steps: u64,
    pub stop: StopReason,
    pub workers: Vec<WorkerReport>,
    pub elapsed: Duration,
    /// Mean wall time of one round on the coordinator.
    pub mean_iteration: Duration,
    /// Frames the double-buffered display skipped.
    pub dropped_frames: u64,
}

struct WorkerOutcome<D> {
    report: WorkerReport,
    stop: StopReason,
    iteration_time: Duration,
    display: Option<D>,
    dropped_frames: u64,
}

/// Runs the whole simulation to completion and hands the display back.
pub fn run<D: Display + 'static>(params: &ModelParams, settings: &RunSettings, display: D) -> Result<(RunReport, D)> {
    if settings.workers == 0 {
        anyhow::bail!("a run needs at least one worker");
    }
    if settings.max_steps == Some(0) {
        anyhow::bail!("max_steps must be at least 1, every run performs one round");
    }
    info!(
        "Running {}x{} grid on {} worker(s), observation {:?} every {} step(s).",
        params.discretization, params.discretization, settings.workers, settings.observation, settings.observe_every
    );
    let started = Instant::now();

    let mut comms = ThreadComm::world(settings.workers).into_iter();
    let root_comm = comms.next().ok_or_else(|| anyhow!("empty worker world"))?;

    let (root_result, peer_results) = thread::scope(|scope| {
        let peers: Vec<_> = comms
            .map(|comm| {
                let rank = comm.rank();
                let handle = thread::Builder::new()
                    .name(format!("wildfire-rank-{}", rank))
                    .spawn_scoped(scope, move || run_worker::<_, D>(params, settings, comm, None));
                (rank, handle)
            })
            .collect();
        // The coordinator runs on the calling thread and owns the display.
        let root = run_worker(params, settings, root_comm, Some(display));
        let peers: Vec<(usize, Result<WorkerOutcome<D>>)> = peers
            .into_iter()
            .map(|(rank, handle)| {
                let outcome = match handle {
                    Ok(handle) => handle
                        .join()
                        .unwrap_or_else(|_| Err(anyhow!("worker thread panicked"))),
                    Err(e) => Err(anyhow::Error::from(e).context("spawning worker thread")),
                };
                (rank, outcome)
            })
            .collect();
        (root, peers)
    });

    let mut outcomes = Vec::with_capacity(settings.workers);
    let mut failures = Vec::new();
    for (rank, result) in std::iter::once((0, root_result)).chain(peer_results) {
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => failures.push((rank, e)),
        }
    }
    if let Some(error) = primary_failure(failures) {
        return Err(error);
    }

    let mut outcomes = outcomes.into_iter();
    let root = outcomes.next().ok_or_else(|| anyhow!("coordinator produced no outcome"))?;
    let mut workers = vec![root.report.clone()];
    workers.extend(outcomes.map(|outcome| outcome.report));

    let display = root.display.ok_or_else(|| anyhow!("coordinator did not return its display"))?;
    let steps = root.report.steps;
    let report = RunReport {
        steps,
        stop: root.stop,
        workers,
        elapsed: started.elapsed(),
        mean_iteration: mean_duration(root.iteration_time, steps),
        dropped_frames: root.dropped_frames,
    };
    info!(
        "Run finished after {} step(s) ({:?}) in {:.3} s.",
        report.steps,
        report.stop,
        report.elapsed.as_secs_f64()
    );
    Ok((report, display))
}

/// Picks the error to report from the failed ranks, listed in rank order.
///
/// One failing worker makes its neighbours fail with lost connections, so the
/// lowest rank with a cause of its own wins over ranks that only lost a peer.
fn primary_failure(failures: Vec<(usize, anyhow::Error)>) -> Option<anyhow::Error> {
    let index = failures.iter().position(|(_, e)| !is_peer_lost(e)).unwrap_or(0);
    for (rank, e) in failures.iter().enumerate().filter(|&(i, _)| i != index).map(|(_, f)| f) {
        debug!("worker {} also failed: {:#}", rank, e);
    }
    let (rank, error) = failures.into_iter().nth(index)?;
    Some(error.context(format!("worker {} failed", rank)))
}

fn mean_duration(total: Duration, steps: u64) -> Duration {
    if steps == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(total.as_secs_f64() / steps as f64)
}

fn run_worker<C: Communicator, D: Display + 'static>(
    params: &ModelParams,
    settings: &RunSettings,
    comm: C,
    display: Option<D>,
) -> Result<WorkerOutcome<D>> {
    let rank = comm.rank();
    let n = params.discretization;
    let layout = GatherLayout::new(n, comm.size())?;
    let mut model = Model::new(params, comm)?;
    // The coordinator keeps its display even when nothing is observed.
    let (mut observer, mut idle_display) = match settings.observation {
        ObservationMode::Off => (Observer::Off, display),
        mode => (Observer::new(mode, rank, display, n * n)?, None),
    };

    let every = settings.observe_every.max(1);
    let mut iteration_time = Duration::ZERO;
    let mut last_observed = None;
    let stop = loop {
        let round_start = Instant::now();
        let locally_burning = model.update()?;
        if observer.is_active() && model.time_step() % every == 0 {
            observer.observe(&model, &layout)?;
            last_observed = Some(model.time_step());
        }
        let globally_burning = termination_vote(model.comm(), locally_burning)?;
        iteration_time += round_start.elapsed();
        trace!(
            "rank {} round {}: local {}, global {}",
            rank,
            model.time_step(),
            locally_burning,
            globally_burning
        );

        if !globally_burning {
            break StopReason::Extinguished;
        }
        if settings.max_steps.is_some_and(|max| model.time_step() >= max) {
            break StopReason::StepLimit;
        }
    };

    // Every rank knows the last round number, so this extra gather is still collective.
    if observer.is_active() && last_observed != Some(model.time_step()) {
        observer.observe(&model, &layout)?;
    }
    let (observed_display, dropped_frames) = observer.finish()?;
    if observed_display.is_some() {
        idle_display = observed_display;
    }

    let partition = *model.partition();
    debug!(
        "rank {} done after {} step(s), {} cell(s) still burning",
        rank,
        model.time_step(),
        model.front().len()
    );
    Ok(WorkerOutcome {
        report: WorkerReport {
            rank,
            first_row: partition.first_row,
            local_rows: partition.local_rows,
            final_front: model.front().len(),
            steps: model.time_step(),
        },
        stop,
        iteration_time,
        display: idle_display,
        dropped_frames,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::PeerLost;
    use crate::display::NullDisplay;
    use wildfire_common::{CellCoord, Vec2};

    fn lost(rank: usize, peer: usize) -> anyhow::Error {
        anyhow::Error::new(PeerLost { rank, peer }).context("waiting for Halo")
    }

    #[test]
    fn root_cause_beats_lost_connections() {
        let failures = vec![
            (0, lost(0, 1)),
            (1, anyhow!("protocol desync: rank 1 expected Halo from rank 2, got Vote")),
            (2, lost(2, 1)),
        ];
        let error = primary_failure(failures).unwrap();
        let message = format!("{:#}", error);
        assert!(message.starts_with("worker 1 failed"), "{}", message);
        assert!(message.contains("desync"));
    }

    #[test]
    fn only_lost_connections_reports_lowest_rank() {
        let error = primary_failure(vec![(2, lost(2, 3)), (3, lost(3, 2))]).unwrap();
        assert!(format!("{:#}", error).starts_with("worker 2 failed"));
        assert!(primary_failure(Vec::new()).is_none());
    }

    #[test]
    fn mean_iteration_survives_huge_step_counts() {
        let steps = 1u64 << 32;
        assert_eq!(mean_duration(Duration::from_secs(steps), steps), Duration::from_secs(1));
        assert_eq!(mean_duration(Duration::from_secs(3), 4), Duration::from_millis(750));
        assert_eq!(mean_duration(Duration::from_secs(5), 0), Duration::ZERO);
    }

    #[test]
    fn zero_step_cap_is_rejected() {
        let params = ModelParams::new(1.0, 8, Vec2::zero(), CellCoord::new(4, 4));
        let settings = RunSettings {
            max_steps: Some(0),
            ..RunSettings::default()
        };
        let err = run(&params, &settings, NullDisplay).unwrap_err();
        assert!(err.to_string().contains("max_steps"));
    }

    #[test]
    fn report_serializes_for_export() {
        let params = ModelParams::new(1.0, 8, Vec2::zero(), CellCoord::new(4, 4));
        let settings = RunSettings {
            workers: 2,
            max_steps: Some(3),
            ..RunSettings::default()
        };
        let (report, _) = run(&params, &settings, NullDisplay).unwrap();
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["steps"], 3);
        assert_eq!(value["stop"], "step_limit");
        assert_eq!(value["workers"][1]["first_row"], 4);
    }
}
