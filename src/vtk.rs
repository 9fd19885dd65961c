//! VTK time-step dumps
//!
//! Purely observational output: each rank writes its chunk as an ASCII
//! rectilinear grid named `tea.<rank>.<step>.vtk`, and the master rank
//! maintains a `tea.visit` index listing every dump. Nothing in the
//! solver reads these files back.

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use crate::chunk::Chunk;
use crate::error::FurnaceError;
use crate::fabric::RankComm;
use crate::settings::Settings;

const MASTER: usize = 0;
const VISIT_INDEX: &str = "tea.visit";

fn io_err(err: std::io::Error) -> FurnaceError {
    FurnaceError::Io(err.to_string())
}

fn step_filename(rank: usize, time_step: u32) -> String {
    format!("tea.{:05}.{:05}.vtk", rank + 1, time_step)
}

/// Dump the current fields for `time_step`, keeping the index in sync.
/// Collective over the live ranks.
pub fn visit(
    time_step: u32,
    chunk: &Chunk,
    settings: &Settings,
    comm: &mut RankComm,
) -> Result<(), FurnaceError> {
    fs::create_dir_all(&settings.vtk_dir).map_err(io_err)?;

    let index_path: PathBuf = settings.vtk_dir.join(VISIT_INDEX);
    if time_step == 0 && comm.rank() == MASTER {
        fs::write(&index_path, format!("!NUM_CHUNKS {}\n", comm.size())).map_err(io_err)?;
    }
    comm.barrier()?;

    if comm.rank() == MASTER {
        let mut listing = fs::read_to_string(&index_path).unwrap_or_default();
        for rank in 0..comm.size() {
            listing.push_str(&step_filename(rank, time_step));
            listing.push('\n');
        }
        fs::write(&index_path, listing).map_err(io_err)?;
    }
    comm.barrier()?;

    let path = settings.vtk_dir.join(step_filename(comm.rank(), time_step));
    fs::write(&path, render_chunk(chunk, settings)).map_err(io_err)?;
    comm.barrier()?;

    Ok(())
}

fn render_chunk(chunk: &Chunk, settings: &Settings) -> String {
    let halo_depth = settings.halo_depth;
    let dim_x = chunk.right - chunk.left;
    let dim_y = chunk.top - chunk.bottom;

    let mut out = String::new();
    out.push_str("# vtk DataFile Version 3.0\n");
    out.push_str("vtk output\n");
    out.push_str("ASCII\n");
    out.push_str("DATASET RECTILINEAR_GRID\n");
    let _ = writeln!(out, "DIMENSIONS {} {} 1", dim_x + 1, dim_y + 1);

    let _ = writeln!(out, "X_COORDINATES {} double", dim_x + 1);
    for xx in chunk.left..=chunk.right {
        let _ = writeln!(out, "{:>12.4e}", settings.grid_x_min + settings.dx * xx as f64);
    }
    let _ = writeln!(out, "Y_COORDINATES {} double", dim_y + 1);
    for yy in chunk.bottom..=chunk.top {
        let _ = writeln!(out, "{:>12.4e}", settings.grid_y_min + settings.dy * yy as f64);
    }
    out.push_str("Z_COORDINATES 1 double\n0\n");

    let _ = writeln!(out, "CELL_DATA {}", dim_x * dim_y);
    out.push_str("FIELD FieldData 3\n");

    let cell_data = |name: &str, values: &dyn Fn(usize) -> f64, out: &mut String| {
        let _ = writeln!(out, "{} 1 {} double", name, dim_x * dim_y);
        for jj in halo_depth..chunk.y - halo_depth {
            for kk in halo_depth..chunk.x - halo_depth {
                let _ = writeln!(out, "{:>12.4e}", values(chunk.index(kk, jj)));
            }
        }
    };
    cell_data("density", &|i| chunk.density[i], &mut out);
    cell_data("energy", &|i| chunk.energy0[i], &mut out);
    cell_data("temperature", &|i| chunk.u[i], &mut out);

    out
}
