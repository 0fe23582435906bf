use wildfire_common::{CellCoord, ModelParams, ObservationMode, Snapshot, Vec2};
use wildfire_engine::{cluster, Model, RunSettings, StatsDisplay, StopReason};

fn sync_every_step(workers: usize) -> RunSettings {
    RunSettings {
        workers,
        observation: ObservationMode::Sync,
        observe_every: 1,
        max_steps: None,
    }
}

fn observed_run(params: &ModelParams, workers: usize) -> (cluster::RunReport, Vec<Snapshot>) {
    let (report, display) = cluster::run(params, &sync_every_step(workers), StatsDisplay::new(true)).unwrap();
    (report, display.into_snapshots())
}

fn scenarios() -> Vec<ModelParams> {
    vec![
        ModelParams::new(1.0, 20, Vec2::zero(), CellCoord::new(10, 10)),
        // Ignition on the top row, wind pushing west and north.
        ModelParams::new(1.0, 16, Vec2::new(-20.0, 5.0), CellCoord::new(0, 15)),
        ModelParams::new(2.5, 30, Vec2::new(12.0, -7.0), CellCoord::new(21, 4)),
    ]
}

#[test]
fn calm_reference_fire_burns_the_whole_grid() {
    let params = &scenarios()[0];
    let (report, snapshots) = observed_run(params, 1);

    assert_eq!(report.stop, StopReason::Extinguished);
    assert_eq!(report.steps, 565);
    let last = snapshots.last().unwrap();
    assert_eq!(last.time_step, 565);
    assert_eq!(last.burning_cells, 0);
    assert_eq!(last.extinguished_cells, 400);
}

#[test]
fn every_worker_count_observes_the_same_frames() {
    for params in scenarios() {
        let (reference_report, reference) = observed_run(&params, 1);
        for workers in 2..=4 {
            let (report, snapshots) = observed_run(&params, workers);
            assert_eq!(report.steps, reference_report.steps, "{} workers, {:?}", workers, params);
            assert_eq!(report.workers.len(), workers);
            assert_eq!(snapshots.len(), reference.len());
            for (got, want) in snapshots.iter().zip(&reference) {
                assert_eq!(got, want, "frame {} differs with {} workers", want.time_step, workers);
            }
        }
    }
}

#[test]
fn gathered_frames_match_an_unpartitioned_model() {
    let params = &scenarios()[1];
    let (_, snapshots) = observed_run(params, 3);

    let mut model = Model::single(params).unwrap();
    for snapshot in &snapshots {
        model.update().unwrap();
        assert_eq!(model.time_step(), snapshot.time_step);
        let expected = Snapshot::from_maps(model.time_step(), model.interior_fuel(), model.interior_fire(), true);
        assert_eq!(snapshot, &expected);
    }
    assert!(model.front().is_empty());
}

#[test]
fn partition_reports_cover_the_grid() {
    let params = &scenarios()[2];
    let settings = RunSettings {
        workers: 4,
        observation: ObservationMode::Off,
        observe_every: 1,
        max_steps: Some(40),
    };
    let (report, _) = cluster::run(params, &settings, StatsDisplay::new(false)).unwrap();

    let mut next_row = 0;
    for (rank, worker) in report.workers.iter().enumerate() {
        assert_eq!(worker.rank, rank);
        assert_eq!(worker.first_row, next_row);
        assert_eq!(worker.steps, report.steps);
        next_row += worker.local_rows;
    }
    assert_eq!(next_row, 30);
}
