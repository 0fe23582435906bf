use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wildfire_common::{CellCoord, ModelParams, ObservationMode, Vec2};
use wildfire_engine::{cluster, Display, NullDisplay, RunSettings, StatsDisplay, StopReason};

fn windy_params() -> ModelParams {
    ModelParams::new(1.0, 24, Vec2::new(8.0, 15.0), CellCoord::new(12, 3))
}

fn settings(workers: usize, observation: ObservationMode) -> RunSettings {
    RunSettings {
        workers,
        observation,
        observe_every: 1,
        max_steps: None,
    }
}

/// Records what it saw, sleeping to fall behind the simulation.
struct SlowRecorder {
    seen: Arc<Mutex<Vec<(u64, usize)>>>,
}

impl Display for SlowRecorder {
    fn update(&mut self, time_step: u64, _fuel: &[u8], fire: &[u8]) -> Result<()> {
        std::thread::sleep(Duration::from_millis(2));
        let burning = fire.iter().filter(|&&f| f > 0).count();
        self.seen.lock().unwrap().push((time_step, burning));
        Ok(())
    }
}

#[test]
fn double_buffered_run_delivers_the_final_frame() {
    let params = windy_params();
    let (sync_report, sync_display) =
        cluster::run(&params, &settings(3, ObservationMode::Sync), StatsDisplay::new(true)).unwrap();
    let (report, display) =
        cluster::run(&params, &settings(3, ObservationMode::DoubleBuffered), StatsDisplay::new(true)).unwrap();

    assert_eq!(report.steps, sync_report.steps);
    let frames = display.snapshots();
    let sync_frames = sync_display.snapshots();
    assert!(!frames.is_empty());
    assert_eq!(frames.last(), sync_frames.last());
    assert_eq!(frames.len() as u64 + report.dropped_frames, report.steps);
    // Whatever was shown must be an exact frame of the synchronous run.
    for frame in frames {
        assert_eq!(frame, &sync_frames[frame.time_step as usize - 1]);
    }
}

#[test]
fn slow_display_sees_ordered_frames_and_the_last_one() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let display = SlowRecorder { seen: Arc::clone(&seen) };
    let (report, _) = cluster::run(&windy_params(), &settings(2, ObservationMode::DoubleBuffered), display).unwrap();

    let seen = seen.lock().unwrap();
    assert!(seen.windows(2).all(|w| w[0].0 < w[1].0));
    assert_eq!(seen.last(), Some(&(report.steps, 0)));
}

#[test]
fn sparse_observation_still_ends_with_the_last_round() {
    let params = windy_params();
    let mut run = settings(2, ObservationMode::Sync);
    run.observe_every = 7;
    let (report, display) = cluster::run(&params, &run, StatsDisplay::new(false)).unwrap();

    let steps: Vec<u64> = display.snapshots().iter().map(|s| s.time_step).collect();
    let (last, regular) = steps.split_last().unwrap();
    assert_eq!(*last, report.steps);
    assert!(regular.iter().all(|t| t % 7 == 0));
    assert_eq!(regular.len() as u64, (report.steps - 1) / 7);
}

#[test]
fn step_limit_stops_every_worker_at_the_same_round() {
    let mut run = settings(4, ObservationMode::Sync);
    run.max_steps = Some(10);
    let (report, display) = cluster::run(&windy_params(), &run, StatsDisplay::new(false)).unwrap();

    assert_eq!(report.stop, StopReason::StepLimit);
    assert_eq!(report.steps, 10);
    assert!(report.workers.iter().all(|w| w.steps == 10));
    assert!(report.workers.iter().map(|w| w.final_front).sum::<usize>() > 0);
    assert_eq!(display.snapshots().len(), 10);
    assert!(display.snapshots()[9].burning_cells > 0);
}

#[test]
fn observation_off_leaves_the_display_untouched() {
    let (report, display) = cluster::run(&windy_params(), &settings(2, ObservationMode::Off), StatsDisplay::new(false)).unwrap();
    assert_eq!(report.stop, StopReason::Extinguished);
    assert!(display.snapshots().is_empty());
    assert_eq!(report.dropped_frames, 0);
}

#[test]
fn more_workers_than_rows_is_rejected() {
    let params = ModelParams::new(1.0, 3, Vec2::zero(), CellCoord::new(1, 1));
    let err = cluster::run(&params, &settings(4, ObservationMode::Off), NullDisplay).unwrap_err();
    assert!(format!("{:#}", err).contains("workers"));
}
