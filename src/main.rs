use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use wildfire_common::{ObservationMode, SimulationConfig, Snapshot};
use wildfire_engine::{cluster, Grid, RunReport, RunSettings, StatsDisplay, StopReason};

/// Stochastic wildfire spread on a square grid split into row bands.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Optional path to a config.toml; defaults are used otherwise
    #[arg(long)]
    config: Option<PathBuf>,

    /// Terrain side length in km
    #[arg(short, long)]
    length: Option<f64>,

    /// Number of cells per side
    #[arg(short = 'n', long)]
    number_of_cases: Option<usize>,

    /// Wind vector as VX,VY
    #[arg(short, long, value_parser = parse_pair::<f64>, allow_hyphen_values = true)]
    wind: Option<(f64, f64)>,

    /// Ignition cell as COL,ROW
    #[arg(short, long, value_parser = parse_pair::<usize>)]
    start: Option<(usize, usize)>,

    /// Number of row bands (one worker thread each)
    #[arg(short = 'p', long)]
    workers: Option<usize>,

    /// Observation regime: off, sync or double_buffered
    #[arg(long, value_parser = parse_observation)]
    observation: Option<ObservationMode>,

    /// Gather every k-th round
    #[arg(long)]
    observe_every: Option<u64>,

    /// Stop after this many rounds even if the fire is still burning
    #[arg(long)]
    max_steps: Option<u64>,
}

fn parse_pair<T>(text: &str) -> Result<(T, T)>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let (a, b) = text
        .split_once(',')
        .with_context(|| format!("expected two comma-separated values, got '{}'", text))?;
    let a = a.trim().parse().with_context(|| format!("invalid number '{}'", a))?;
    let b = b.trim().parse().with_context(|| format!("invalid number '{}'", b))?;
    Ok((a, b))
}

fn parse_observation(text: &str) -> Result<ObservationMode> {
    match text.to_ascii_lowercase().as_str() {
        "off" => Ok(ObservationMode::Off),
        "sync" => Ok(ObservationMode::Sync),
        "double_buffered" | "double-buffered" => Ok(ObservationMode::DoubleBuffered),
        other => anyhow::bail!("unknown observation mode '{}'", other),
    }
}

impl Args {
    fn apply(&self, config: &mut SimulationConfig) {
        if let Some(length) = self.length {
            config.terrain.length = length;
        }
        if let Some(n) = self.number_of_cases {
            config.terrain.discretization = n;
        }
        if let Some((x, y)) = self.wind {
            config.wind.x = x;
            config.wind.y = y;
        }
        if let Some((column, row)) = self.start {
            config.ignition.column = column;
            config.ignition.row = row;
        }
        if let Some(workers) = self.workers {
            config.run.workers = workers;
        }
        if let Some(mode) = self.observation {
            config.run.observation = mode;
        }
        if let Some(every) = self.observe_every {
            config.run.observe_every = every;
        }
        if self.max_steps.is_some() {
            config.run.max_steps = self.max_steps;
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    info!("Starting wildfire engine...");

    // --- Load Configuration ---
    let mut config = match &args.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    args.apply(&mut config);
    if let Err(e) = config.validate() {
        error!("Invalid parameters: {}", e);
        return Err(e);
    }

    let params = config.model_params();
    let grid = Grid::new(params.length, params.discretization)?;
    info!(
        "Domain {} km, {}x{} = {} cells ({:.4} km per cell), wind ({}, {}), ignition at row {} column {}.",
        grid.length(),
        grid.size(),
        grid.size(),
        grid.cell_count(),
        grid.cell_distance(),
        params.wind.x,
        params.wind.y,
        params.ignition.row,
        params.ignition.column
    );
    debug!("Spread parameters: {:#?}", params.spread_params());
    info!("Using {} Rayon threads per worker.", rayon::current_num_threads());

    // --- Run ---
    let settings = RunSettings::from(&config.run);
    let display = StatsDisplay::new(config.output.save_maps_in_snapshot);
    let (report, display) = cluster::run(&params, &settings, display)?;

    match report.stop {
        StopReason::Extinguished => info!("Fire extinguished after {} step(s).", report.steps),
        StopReason::StepLimit => {
            let burning: usize = report.workers.iter().map(|w| w.final_front).sum();
            warn!("Stopped at the step limit ({}) with {} cell(s) still burning.", report.steps, burning)
        }
    }
    for worker in &report.workers {
        debug!(
            "worker {}: rows {}..{}, {} cell(s) burning at the end",
            worker.rank,
            worker.first_row,
            worker.first_row + worker.local_rows,
            worker.final_front
        );
    }
    info!("Global time: {:.6} s", report.elapsed.as_secs_f64());
    info!("Average time per iteration: {:.6} s", report.mean_iteration.as_secs_f64());

    // --- Save Recorded Data ---
    if config.output.save_stats {
        let format = config.output.format.as_deref().unwrap_or("json");
        save_snapshots(&config.output.base_filename, format, display.snapshots())?;
        save_report(&config.output.base_filename, &report)?;
    } else {
        info!("Skipping saving snapshots as per config (save_stats is false).");
    }

    info!("Simulation Complete.");
    Ok(())
}

fn save_snapshots(base: &str, format: &str, snapshots: &[Snapshot]) -> Result<()> {
    match format {
        "json" => save_json(base, snapshots),
        "bincode" => {
            let filename = format!("{}_snapshots.bin", base);
            let file = File::create(&filename).with_context(|| format!("creating '{}'", filename))?;
            bincode::serialize_into(BufWriter::new(file), snapshots)
                .with_context(|| format!("writing bincode snapshots to '{}'", filename))?;
            info!("All snapshots saved to {} (binary format)", filename);
            Ok(())
        }
        "messagepack" => {
            let filename = format!("{}_snapshots.msgpack", base);
            let file = File::create(&filename).with_context(|| format!("creating '{}'", filename))?;
            let mut writer = BufWriter::new(file);
            rmp_serde::encode::write(&mut writer, snapshots)
                .with_context(|| format!("writing MessagePack snapshots to '{}'", filename))?;
            writer.flush()?;
            info!("All snapshots saved to {} (MessagePack format)", filename);
            Ok(())
        }
        "csv" => {
            let filename = format!("{}_snapshots.csv", base);
            let mut writer = csv::Writer::from_path(&filename).with_context(|| format!("creating '{}'", filename))?;
            writer.write_record(["time_step", "burning_cells", "extinguished_cells", "mean_fuel", "peak_intensity"])?;
            for s in snapshots {
                writer.write_record(&[
                    s.time_step.to_string(),
                    s.burning_cells.to_string(),
                    s.extinguished_cells.to_string(),
                    format!("{:.4}", s.mean_fuel),
                    s.peak_intensity.to_string(),
                ])?;
            }
            writer.flush()?;
            info!("Snapshot summary saved to {}", filename);
            Ok(())
        }
        other => {
            warn!("Unknown output format: {}. Using JSON instead.", other);
            save_json(base, snapshots)
        }
    }
}

fn save_report(base: &str, report: &RunReport) -> Result<()> {
    let filename = format!("{}_report.json", base);
    let file = File::create(&filename).with_context(|| format!("creating '{}'", filename))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .with_context(|| format!("writing run report to '{}'", filename))?;
    info!("Run report saved to {}", filename);
    Ok(())
}

fn save_json(base: &str, snapshots: &[Snapshot]) -> Result<()> {
    let filename = format!("{}_snapshots.json", base);
    let json_string = serde_json::to_string(snapshots).context("serializing snapshots to JSON")?;
    let mut file = File::create(&filename).with_context(|| format!("creating '{}'", filename))?;
    file.write_all(json_string.as_bytes())
        .with_context(|| format!("writing snapshot JSON to '{}'", filename))?;
    info!("All snapshots saved to {} ({} KB)", filename, json_string.len() / 1024);
    Ok(())
}
