use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use swarmopt::{
    Benchmark, BoundaryMode, JsonLinesReporter, Outcome, Reporter, Snapshot, SwarmConfig,
    TracingReporter,
};
use tracing::error;
use tracing_subscriber::EnvFilter;

const DIM: usize = 2;
const NUM_PARTICLES: usize = 10;
const MAX_ITERATIONS: usize = 20;
const LOWER_BOUND: f64 = -5.;
const UPPER_BOUND: f64 = 5.;

/// Minimize a benchmark function with particle swarm optimization.
///
/// Flags override values read from --config.
#[derive(Parser)]
#[command(name = "swarmopt", version)]
struct Cli {
    /// JSON run configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Search-space dimensionality
    #[arg(short, long)]
    dim: Option<usize>,

    /// Swarm size
    #[arg(short = 'n', long)]
    particles: Option<usize>,

    /// Number of iterations
    #[arg(short, long)]
    iterations: Option<usize>,

    /// Lower bound of every dimension
    #[arg(long, allow_hyphen_values = true)]
    lower: Option<f64>,

    /// Upper bound of every dimension
    #[arg(long, allow_hyphen_values = true)]
    upper: Option<f64>,

    /// Inertia weight
    #[arg(long)]
    inertia: Option<f64>,

    /// Personal-best attraction
    #[arg(long)]
    c1: Option<f64>,

    /// Global-best attraction
    #[arg(long)]
    c2: Option<f64>,

    /// RNG seed; run k uses seed + k
    #[arg(long)]
    seed: Option<u64>,

    /// Worker threads per pass
    #[arg(short, long)]
    workers: Option<usize>,

    /// unbounded, clamp or reinitialize
    #[arg(long)]
    boundary: Option<BoundaryMode>,

    /// sphere, rosenbrock, rastrigin, ackley or griewank
    #[arg(short, long, default_value = "sphere")]
    function: Benchmark,

    /// Number of independent runs
    #[arg(long, default_value_t = 1)]
    runs: usize,

    /// Write per-iteration snapshots as JSON lines
    #[arg(long)]
    snapshots: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "run failed");
            ExitCode::FAILURE
        }
    }
}

fn build_config(cli: &Cli) -> swarmopt::Result<SwarmConfig> {
    let mut config = match &cli.config {
        Some(path) => SwarmConfig::from_json_file(path)?,
        None => SwarmConfig::new(DIM, NUM_PARTICLES, MAX_ITERATIONS, LOWER_BOUND, UPPER_BOUND),
    };

    if let Some(dim) = cli.dim {
        config.dim = dim;
    }
    if let Some(particles) = cli.particles {
        config.num_particles = particles;
    }
    if let Some(iterations) = cli.iterations {
        config.max_iterations = iterations;
    }
    if let Some(lower) = cli.lower {
        config.lower_bound = lower.into();
    }
    if let Some(upper) = cli.upper {
        config.upper_bound = upper.into();
    }
    if let Some(inertia) = cli.inertia {
        config.inertia_weight = inertia;
    }
    if let Some(c1) = cli.c1 {
        config.c1 = c1;
    }
    if let Some(c2) = cli.c2 {
        config.c2 = c2;
    }
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(boundary) = cli.boundary {
        config.boundary = boundary;
    }

    Ok(config)
}

fn execute(cli: &Cli) -> swarmopt::Result<()> {
    let base = build_config(cli)?;
    let mut snapshots = match &cli.snapshots {
        Some(path) => Some(JsonLinesReporter::new(BufWriter::new(File::create(path)?))),
        None => None,
    };

    let start_time: Instant = Instant::now();

    for run in 0..cli.runs {
        let mut config = base.clone();
        if let Some(seed) = base.seed {
            config.seed = Some(seed.wrapping_add(run as u64));
        }

        let mut progress = TracingReporter::default();
        let mut reporter = |snapshot: &Snapshot| {
            progress.report(snapshot);
            if let Some(writer) = snapshots.as_mut() {
                writer.report(snapshot);
            }
        };
        let outcome = swarmopt::run(config, cli.function, &mut reporter)?;
        println!("{}", csv_line(run, &outcome));
    }

    if let Some(writer) = snapshots {
        writer.into_inner().flush()?;
    }

    let elapsed_time: Duration = start_time.elapsed();
    println!("Elapsed Time: {:?}", elapsed_time);
    Ok(())
}

fn csv_line(run: usize, outcome: &Outcome) -> String {
    format!(
        "{},{},{},{:.6e}",
        run,
        outcome.best.iter.map_or(-1, |i| i as i64),
        outcome
            .best
            .value()
            .iter()
            .map(|&x| format!("{:.6}", x))
            .collect::<Vec<String>>()
            .join(","),
        outcome.best.fitness,
    )
}
