//! Solver drivers
//!
//! One rank thread runs `run_rank`: decompose, build the Cartesian
//! topology and the chunk, apply the initial states, prime the halos,
//! then march time steps. Each step runs the Jacobi solve loop —
//! iterate, reduce the residual over all ranks, test convergence,
//! exchange the solution halo — and finishes by converting the solved
//! temperature back into energy.
//!
//! Fault injection: when `ft` is enabled, the rank at the configured
//! Cartesian coordinates marks itself dead at the configured solver
//! iteration and returns, so the surviving ranks observe the failure in
//! that same iteration's halo exchange.

use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::chunk::Chunk;
use crate::decompose;
use crate::error::FurnaceError;
use crate::fabric::RankComm;
use crate::halo;
use crate::settings::{Field, FieldMask, Settings, State};
use crate::vtk;

const MASTER: usize = 0;

/// Result of one Jacobi solve
#[derive(Debug, Clone, Copy)]
pub struct SolveResult {
    pub iterations: u32,
    pub error: f64,
}

/// Globally reduced field totals over the interior domain
#[derive(Debug, Clone, Copy)]
pub struct FieldSummary {
    pub volume: f64,
    pub mass: f64,
    pub internal_energy: f64,
    pub temperature: f64,
}

/// What one rank thread produced
#[derive(Debug, Clone, Copy)]
pub enum RankOutcome {
    Completed(RankReport),
    /// The rank died through fault injection at the given time step
    Killed { step: u32 },
}

/// Per-rank run totals
#[derive(Debug, Clone, Copy)]
pub struct RankReport {
    pub steps: u32,
    pub total_iterations: u64,
    pub final_error: f64,
    pub summary: FieldSummary,
}

/// One time step of the Jacobi solver. Returns `None` when this rank
/// was killed by fault injection.
pub fn jacobi_solve<B: Backend>(
    chunk: &mut Chunk,
    settings: &Settings,
    comm: &mut RankComm,
    backend: &B,
    step: u32,
) -> Result<Option<SolveResult>, FurnaceError> {
    let rx = settings.dt_init / (settings.dx * settings.dx);
    let ry = settings.dt_init / (settings.dy * settings.dy);
    backend.jacobi_init(chunk, settings.halo_depth, settings.coefficient, rx, ry);

    let mask = FieldMask::of(&[Field::U]);
    halo::halo_update(chunk, settings, comm, backend, &mask, settings.halo_depth)?;

    let kill_here = settings.ft
        && comm.cart_coords(comm.rank())? == (settings.with_ft_kill_x, settings.with_ft_kill_y);

    let mut result = SolveResult { iterations: 0, error: 0.0 };
    for tt in 0..settings.max_iters {
        if kill_here && tt == settings.with_ft_kill_iter {
            warn!(
                target: "ft",
                rank = comm.rank(),
                step,
                iteration = tt,
                "injected failure: rank dying"
            );
            comm.kill();
            return Ok(None);
        }

        let local_error = backend.jacobi_iterate(chunk, settings.halo_depth);
        let error = comm.sum_over_ranks(local_error)?;
        if !error.is_finite() {
            comm.abort();
            return Err(FurnaceError::Numerical(format!(
                "residual is not finite at step {step} iteration {tt}"
            )));
        }

        result = SolveResult { iterations: tt + 1, error };
        if error < settings.eps {
            break;
        }

        halo::halo_update(chunk, settings, comm, backend, &mask, 1)?;
    }

    if result.error >= settings.eps {
        debug!(
            target: "solve",
            step,
            error = result.error,
            "solve hit max_iters without reaching eps"
        );
    }

    Ok(Some(result))
}

/// Convert the solved temperature back into energy and refresh its halo.
fn solve_finished<B: Backend>(
    chunk: &mut Chunk,
    settings: &Settings,
    comm: &mut RankComm,
    backend: &B,
) -> Result<(), FurnaceError> {
    let halo_depth = settings.halo_depth;
    for jj in halo_depth..chunk.y - halo_depth {
        for kk in halo_depth..chunk.x - halo_depth {
            let index = chunk.index(kk, jj);
            chunk.energy[index] = chunk.u[index] / chunk.density[index];
        }
    }

    let mask = FieldMask::of(&[Field::Energy1]);
    halo::halo_update(chunk, settings, comm, backend, &mask, 1)
}

/// Reduce volume, mass, internal energy and temperature over the whole
/// interior domain.
pub fn field_summary(
    chunk: &Chunk,
    settings: &Settings,
    comm: &mut RankComm,
) -> Result<FieldSummary, FurnaceError> {
    let cell_volume = settings.dx * settings.dy;
    let halo_depth = settings.halo_depth;

    let mut volume = 0.0;
    let mut mass = 0.0;
    let mut internal_energy = 0.0;
    let mut temperature = 0.0;
    for jj in halo_depth..chunk.y - halo_depth {
        for kk in halo_depth..chunk.x - halo_depth {
            let index = chunk.index(kk, jj);
            volume += cell_volume;
            mass += chunk.density[index] * cell_volume;
            internal_energy += chunk.density[index] * chunk.energy[index] * cell_volume;
            temperature += chunk.density[index] * chunk.u[index] * cell_volume;
        }
    }

    Ok(FieldSummary {
        volume: comm.sum_over_ranks(volume)?,
        mass: comm.sum_over_ranks(mass)?,
        internal_energy: comm.sum_over_ranks(internal_energy)?,
        temperature: comm.sum_over_ranks(temperature)?,
    })
}

/// Whole-run lifecycle for one rank. Any error path aborts the fabric
/// so peers blocked in collectives unwind too.
pub fn run_rank<B: Backend>(
    comm: &mut RankComm,
    settings: &Settings,
    states: &[State],
    backend: &B,
) -> Result<RankOutcome, FurnaceError> {
    let result = run_rank_inner(comm, settings, states, backend);
    if result.is_err() {
        comm.abort();
    }
    result
}

fn run_rank_inner<B: Backend>(
    comm: &mut RankComm,
    settings: &Settings,
    states: &[State],
    backend: &B,
) -> Result<RankOutcome, FurnaceError> {
    let grid = decompose::decompose(settings.grid_x_cells, settings.grid_y_cells, comm.size())?;
    comm.cart_create(grid.x_chunks, grid.y_chunks)?;
    let coords = comm.cart_coords(comm.rank())?;
    let extent = decompose::chunk_extent(
        settings.grid_x_cells,
        settings.grid_y_cells,
        grid,
        coords,
    );

    if comm.rank() == MASTER {
        info!(
            target: "decompose",
            x_chunks = grid.x_chunks,
            y_chunks = grid.y_chunks,
            "decomposed {}x{} cells over {} ranks",
            settings.grid_x_cells,
            settings.grid_y_cells,
            comm.size()
        );
    }

    let mut chunk = Chunk::new(settings, extent);
    chunk.apply_states(settings, states);

    // Prime the initial halo data
    let mask = FieldMask::of(&[Field::Density, Field::Energy0, Field::Energy1]);
    halo::halo_update(&mut chunk, settings, comm, backend, &mask, settings.halo_depth)?;
    chunk.store_energy();

    if settings.visit_frequency > 0 {
        vtk::visit(0, &chunk, settings, comm)?;
    }

    let mut t = 0.0;
    let mut step: u32 = 1;
    let mut total_iterations: u64 = 0;
    let mut final_error = 0.0;

    while t + 1.0e-12 < settings.end_time && step <= settings.end_step {
        match jacobi_solve(&mut chunk, settings, comm, backend, step)? {
            Some(result) => {
                total_iterations += u64::from(result.iterations);
                final_error = result.error;
                if comm.rank() == MASTER {
                    info!(
                        target: "solve",
                        step,
                        iterations = result.iterations,
                        error = result.error,
                        "timestep complete"
                    );
                }
            }
            None => return Ok(RankOutcome::Killed { step }),
        }

        solve_finished(&mut chunk, settings, comm, backend)?;
        t += settings.dt_init;

        if settings.summary_frequency > 0 && step % settings.summary_frequency == 0 {
            let summary = field_summary(&chunk, settings, comm)?;
            if comm.rank() == MASTER {
                info!(
                    target: "summary",
                    step,
                    volume = summary.volume,
                    mass = summary.mass,
                    internal_energy = summary.internal_energy,
                    temperature = summary.temperature,
                    "field summary"
                );
            }
        }
        if settings.visit_frequency > 0 && step % settings.visit_frequency == 0 {
            vtk::visit(step, &chunk, settings, comm)?;
        }

        step += 1;
    }

    let summary = field_summary(&chunk, settings, comm)?;
    Ok(RankOutcome::Completed(RankReport {
        steps: step - 1,
        total_iterations,
        final_error,
        summary,
    }))
}
