//! Command-line front-end
//!
//! Reads an input deck, spins up the rank fabric, runs the simulation
//! and reports the outcome. Logging goes to `furnace.log` in the working
//! directory, filtered by `RUST_LOG`.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

use furnace::error::FurnaceError;

const DEFAULT_DECK: &str = "tea.in";

struct Args {
    deck: PathBuf,
    ranks: usize,
    vtk_dir: Option<PathBuf>,
}

fn print_usage() {
    eprintln!("usage: furnace [--ranks N] [--vtk DIR] [DECK]");
    eprintln!();
    eprintln!("  DECK         input deck path (default: {DEFAULT_DECK})");
    eprintln!("  --ranks N    number of rank threads (default: 1)");
    eprintln!("  --vtk DIR    directory for VTK dumps (overrides the default)");
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        deck: PathBuf::from(DEFAULT_DECK),
        ranks: 1,
        vtk_dir: None,
    };

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--ranks" => {
                let raw = it.next().context("--ranks needs a value")?;
                args.ranks = raw
                    .parse()
                    .with_context(|| format!("invalid rank count `{raw}`"))?;
            }
            "--vtk" => {
                let raw = it.next().context("--vtk needs a value")?;
                args.vtk_dir = Some(PathBuf::from(raw));
            }
            other if other.starts_with('-') => bail!("unknown option `{other}`"),
            other => args.deck = PathBuf::from(other),
        }
    }

    Ok(args)
}

fn configure_logging() -> Option<WorkerGuard> {
    let file_appender = tracing_appender::rolling::never(".", "furnace.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
    {
        Ok(()) => Some(guard),
        // A subscriber is already installed; drop the guard so the
        // writer shuts down
        Err(_) => None,
    }
}

fn try_main() -> Result<()> {
    let args = parse_args()?;

    let text = fs::read_to_string(&args.deck)
        .with_context(|| format!("cannot read input deck {}", args.deck.display()))?;
    let (mut settings, states) = furnace::deck::parse(&text)?;
    if let Some(dir) = args.vtk_dir {
        settings.vtk_dir = dir;
    }

    info!(
        target: "startup",
        deck = %args.deck.display(),
        ranks = args.ranks,
        grid_x = settings.grid_x_cells,
        grid_y = settings.grid_y_cells,
        solver = settings.solver.name(),
        ft = settings.ft,
        "startup"
    );

    let start = std::time::Instant::now();
    let report = furnace::run(&settings, &states, args.ranks)?;
    let wallclock = start.elapsed();

    info!(
        target: "runtime",
        steps = report.steps,
        iterations = report.total_iterations,
        error = report.final_error,
        killed = report.killed,
        wallclock_s = wallclock.as_secs_f64(),
        "run complete"
    );
    println!(
        "furnace: {} steps, {} iterations, final residual {:.6e}, {}/{} ranks completed ({} killed) in {:.3}s",
        report.steps,
        report.total_iterations,
        report.final_error,
        report.completed,
        report.num_ranks,
        report.killed,
        wallclock.as_secs_f64()
    );

    Ok(())
}

fn main() {
    let _log_guard = configure_logging();

    if let Err(err) = try_main() {
        eprintln!("furnace: {err:#}");
        let code = err
            .downcast_ref::<FurnaceError>()
            .map_or(1, FurnaceError::exit_code);
        std::process::exit(code);
    }
}
