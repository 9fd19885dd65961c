//! Jacobi solver kernels
//!
//! The heat operator is discretised as a 5-point stencil with face
//! conductivities `kx`/`ky` harmonically averaged from the density
//! field. `init` seeds the solution from the energy loading and fills
//! the coefficients; `iterate` performs one relaxation sweep and returns
//! the rank-local residual `sum |u - r|`, which the driver reduces over
//! all ranks.
//!
//! Each kernel comes in a serial and a rayon row-parallel form with
//! identical semantics; the backend chooses.

use rayon::prelude::*;

use crate::chunk::Chunk;
use crate::settings::Coefficient;

/// Seed `u`/`u0` from `energy * density` and fill the conduction
/// coefficients for the chosen mode.
pub fn init(chunk: &mut Chunk, halo_depth: usize, coefficient: Coefficient, rx: f64, ry: f64) {
    let (x, y) = (chunk.x, chunk.y);

    for jj in 1..y - 1 {
        for kk in 1..x - 1 {
            let index = kk + jj * x;
            let temp = chunk.energy[index] * chunk.density[index];
            chunk.u0[index] = temp;
            chunk.u[index] = temp;
        }
    }

    for jj in halo_depth..y - 1 {
        for kk in halo_depth..x - 1 {
            let index = kk + jj * x;
            let (centre, left, down) = stencil_densities(&chunk.density, index, x, coefficient);
            chunk.kx[index] = rx * (left + centre) / (2.0 * left * centre);
            chunk.ky[index] = ry * (down + centre) / (2.0 * down * centre);
        }
    }
}

/// Row-parallel form of [`init`].
pub fn init_par(chunk: &mut Chunk, halo_depth: usize, coefficient: Coefficient, rx: f64, ry: f64) {
    let (x, y) = (chunk.x, chunk.y);
    let energy = &chunk.energy;
    let density = &chunk.density;

    chunk
        .u
        .par_chunks_mut(x)
        .zip(chunk.u0.par_chunks_mut(x))
        .enumerate()
        .skip(1)
        .take(y - 2)
        .for_each(|(jj, (u_row, u0_row))| {
            for kk in 1..x - 1 {
                let temp = energy[jj * x + kk] * density[jj * x + kk];
                u_row[kk] = temp;
                u0_row[kk] = temp;
            }
        });

    chunk
        .kx
        .par_chunks_mut(x)
        .zip(chunk.ky.par_chunks_mut(x))
        .enumerate()
        .skip(halo_depth)
        .take(y - 1 - halo_depth)
        .for_each(|(jj, (kx_row, ky_row))| {
            for kk in halo_depth..x - 1 {
                let index = kk + jj * x;
                let (centre, left, down) = stencil_densities(density, index, x, coefficient);
                kx_row[kk] = rx * (left + centre) / (2.0 * left * centre);
                ky_row[kk] = ry * (down + centre) / (2.0 * down * centre);
            }
        });
}

#[inline]
fn stencil_densities(
    density: &[f64],
    index: usize,
    x: usize,
    coefficient: Coefficient,
) -> (f64, f64, f64) {
    match coefficient {
        Coefficient::Conductivity => (density[index], density[index - 1], density[index - x]),
        Coefficient::RecipConductivity => (
            1.0 / density[index],
            1.0 / density[index - 1],
            1.0 / density[index - x],
        ),
    }
}

/// One Jacobi sweep: copy `r <- u`, update the interior, return the
/// rank-local residual `sum |u - r|`.
pub fn iterate(chunk: &mut Chunk, halo_depth: usize) -> f64 {
    let (x, y) = (chunk.x, chunk.y);
    chunk.r.copy_from_slice(&chunk.u);

    let mut err = 0.0;
    for jj in halo_depth..y - halo_depth {
        for kk in halo_depth..x - halo_depth {
            let index = kk + jj * x;
            chunk.u[index] = (chunk.u0[index]
                + (chunk.kx[index + 1] * chunk.r[index + 1] + chunk.kx[index] * chunk.r[index - 1])
                + (chunk.ky[index + x] * chunk.r[index + x] + chunk.ky[index] * chunk.r[index - x]))
                / (1.0
                    + (chunk.kx[index] + chunk.kx[index + 1])
                    + (chunk.ky[index] + chunk.ky[index + x]));

            err += (chunk.u[index] - chunk.r[index]).abs();
        }
    }

    err
}

/// Row-parallel form of [`iterate`].
pub fn iterate_par(chunk: &mut Chunk, halo_depth: usize) -> f64 {
    let (x, y) = (chunk.x, chunk.y);
    chunk.r.copy_from_slice(&chunk.u);

    let u0 = &chunk.u0;
    let r = &chunk.r;
    let kx = &chunk.kx;
    let ky = &chunk.ky;

    chunk
        .u
        .par_chunks_mut(x)
        .enumerate()
        .skip(halo_depth)
        .take(y - 2 * halo_depth)
        .map(|(jj, u_row)| {
            let mut row_err = 0.0;
            for kk in halo_depth..x - halo_depth {
                let index = kk + jj * x;
                let value = (u0[index]
                    + (kx[index + 1] * r[index + 1] + kx[index] * r[index - 1])
                    + (ky[index + x] * r[index + x] + ky[index] * r[index - x]))
                    / (1.0 + (kx[index] + kx[index + 1]) + (ky[index] + ky[index + x]));
                row_err += (value - r[index]).abs();
                u_row[kk] = value;
            }
            row_err
        })
        .sum()
}
