//! Furnace: fault-tolerant 2D heat conduction
//!
//! Solves the linear heat equation on a regular rectangular mesh,
//! decomposed over a Cartesian grid of ranks with one chunk per rank.
//! Ranks run as threads joined by an in-process message fabric; each
//! iteration of the Jacobi solver exchanges ghost-cell halos with its
//! neighbours and reduces the residual over the whole world. When a rank
//! dies mid-run, the missing halo data is reconstructed by one of four
//! recovery strategies (static fill, mirror, bridge, linear
//! interpolation across the gap).
//!
//! # Example
//!
//! ```
//! use furnace::settings::{Settings, State};
//!
//! let mut settings = Settings {
//!     grid_x_cells: 10,
//!     grid_y_cells: 10,
//!     grid_x_max: 10.0,
//!     grid_y_max: 10.0,
//!     end_step: 1,
//!     ..Settings::default()
//! };
//! settings.finalise().unwrap();
//!
//! let states = vec![State { density: 1.0, energy: 1.0, ..State::default() }];
//! let report = furnace::run(&settings, &states, 1).unwrap();
//! assert_eq!(report.completed, 1);
//! ```
//!
//! # Modules
//!
//! - `settings`: run-wide configuration, fields and state regions
//! - `deck`: plain-text input deck parser
//! - `decompose`: process-grid selection and chunk extents
//! - `fabric`: the in-process rank fabric with failure detection
//! - `chunk`: per-rank sub-mesh and staging buffers
//! - `pack` / `local_halos` / `jacobi`: rank-local kernels
//! - `backend`: capability interface over the kernel set
//! - `fault`: recovery strategies for dead-peer exchanges
//! - `halo`: the remote halo driver
//! - `driver`: solver and time-step drivers
//! - `vtk`: observational time-step dumps

use std::thread;

pub mod backend;
pub mod chunk;
pub mod deck;
pub mod decompose;
pub mod driver;
pub mod error;
pub mod fabric;
pub mod fault;
pub mod halo;
pub mod jacobi;
pub mod local_halos;
pub mod pack;
pub mod settings;
pub mod vtk;

pub use error::FurnaceError;
pub use settings::{Settings, State};

use driver::{FieldSummary, RankOutcome};
use settings::{BackendKind, Solver};

/// Aggregate result of a whole run
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    pub num_ranks: usize,
    /// Ranks that ran to completion
    pub completed: usize,
    /// Ranks lost to fault injection
    pub killed: usize,
    pub steps: u32,
    pub total_iterations: u64,
    pub final_error: f64,
    /// Reduced field totals from the lowest completed rank
    pub summary: Option<FieldSummary>,
}

/// Run the whole simulation with `num_ranks` rank threads.
///
/// Blocks until every rank thread has finished. Returns the aggregate
/// report, or the most meaningful error any rank produced.
pub fn run(
    settings: &Settings,
    states: &[State],
    num_ranks: usize,
) -> Result<RunReport, FurnaceError> {
    if num_ranks == 0 {
        return Err(FurnaceError::Config("at least one rank is required".into()));
    }
    if states.is_empty() {
        return Err(FurnaceError::Config(
            "at least one initial state is required".into(),
        ));
    }
    if settings.solver != Solver::Jacobi {
        return Err(FurnaceError::UnsupportedSolver(
            settings.solver.name().into(),
        ));
    }
    if !(settings.dx > 0.0 && settings.dy > 0.0) {
        return Err(FurnaceError::Config(
            "settings must be finalised before running".into(),
        ));
    }

    let comms = fabric::Fabric::new(num_ranks);

    let outcomes: Vec<Result<RankOutcome, FurnaceError>> = thread::scope(|scope| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|mut comm| {
                scope.spawn(move || match settings.backend {
                    BackendKind::Serial => {
                        driver::run_rank(&mut comm, settings, states, &backend::Serial)
                    }
                    BackendKind::Threaded => {
                        driver::run_rank(&mut comm, settings, states, &backend::Threaded)
                    }
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(FurnaceError::Transport("rank thread panicked".into())))
            })
            .collect()
    });

    let mut report = RunReport {
        num_ranks,
        completed: 0,
        killed: 0,
        steps: 0,
        total_iterations: 0,
        final_error: 0.0,
        summary: None,
    };
    let mut first_error: Option<FurnaceError> = None;

    for outcome in outcomes {
        match outcome {
            Ok(RankOutcome::Completed(rank_report)) => {
                if report.completed == 0 {
                    report.steps = rank_report.steps;
                    report.total_iterations = rank_report.total_iterations;
                    report.final_error = rank_report.final_error;
                    report.summary = Some(rank_report.summary);
                }
                report.completed += 1;
            }
            Ok(RankOutcome::Killed { .. }) => report.killed += 1,
            Err(err) => {
                // Prefer the root-cause error over the aborted-run noise
                // the other ranks unwind with
                let is_abort_noise = matches!(&err, FurnaceError::Transport(msg) if msg == "run aborted");
                match &first_error {
                    None => first_error = Some(err),
                    Some(FurnaceError::Transport(msg)) if msg == "run aborted" && !is_abort_noise => {
                        first_error = Some(err)
                    }
                    Some(_) => {}
                }
            }
        }
    }

    if let Some(err) = first_error {
        return Err(err);
    }
    Ok(report)
}
