//! Grid decomposition over the rank mesh
//!
//! The global grid is tiled by one rectangular chunk per rank. The
//! process grid shape is chosen by enumerating divisor pairs of the rank
//! count and minimising the perimeter-to-area metric of the resulting
//! tile, so each chunk exchanges as little halo data as possible for its
//! volume. The full decomposition is computable on every rank without
//! communication.

use crate::error::FurnaceError;

/// Shape of the Cartesian process grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessGrid {
    pub x_chunks: usize,
    pub y_chunks: usize,
}

impl ProcessGrid {
    pub fn num_ranks(&self) -> usize {
        self.x_chunks * self.y_chunks
    }
}

/// Global cell range owned by one chunk: `[left, right) x [bottom, top)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub left: usize,
    pub right: usize,
    pub bottom: usize,
    pub top: usize,
}

impl Extent {
    /// Cells along X, excluding halo
    pub fn x_cells(&self) -> usize {
        self.right - self.left
    }

    /// Cells along Y, excluding halo
    pub fn y_cells(&self) -> usize {
        self.top - self.bottom
    }
}

/// Choose the process grid shape for `num_ranks` ranks.
///
/// Enumerates divisor pairs `(xx, yy)` with `xx * yy == num_ranks` and
/// selects the pair minimising `2 * (sx^2 + sy^2) / (sx * sy)` where
/// `sx = x_cells / xx` and `sy = y_cells / yy`. Ties go to the smallest
/// `xx` (first encountered in ascending order).
pub fn decompose(
    x_cells: usize,
    y_cells: usize,
    num_ranks: usize,
) -> Result<ProcessGrid, FurnaceError> {
    let mut best_metric = f64::MAX;
    let mut best: Option<ProcessGrid> = None;

    for xx in 1..=num_ranks {
        if num_ranks % xx != 0 {
            continue;
        }
        let yy = num_ranks / xx;

        let sx = x_cells as f64 / xx as f64;
        let sy = y_cells as f64 / yy as f64;
        let perimeter = 2.0 * (sx * sx + sy * sy);
        let area = sx * sy;
        let metric = perimeter / area;

        if metric < best_metric {
            best_metric = metric;
            best = Some(ProcessGrid {
                x_chunks: xx,
                y_chunks: yy,
            });
        }
    }

    best.ok_or(FurnaceError::Decompose {
        x_cells,
        y_cells,
        num_ranks,
    })
}

/// Compute the cell extent of the chunk at `coords` in the process grid.
///
/// Cells are distributed with the remainder spread over the leading
/// columns/rows: the first `x_cells % x_chunks` columns of the process
/// grid get one extra cell, and likewise in Y.
pub fn chunk_extent(
    x_cells: usize,
    y_cells: usize,
    grid: ProcessGrid,
    coords: (usize, usize),
) -> Extent {
    let (cx, cy) = coords;
    debug_assert!(cx < grid.x_chunks && cy < grid.y_chunks);

    let dx = x_cells / grid.x_chunks;
    let dy = y_cells / grid.y_chunks;
    let mod_x = x_cells % grid.x_chunks;
    let mod_y = y_cells % grid.y_chunks;

    let left = cx * dx + cx.min(mod_x);
    let right = left + dx + usize::from(cx < mod_x);
    let bottom = cy * dy + cy.min(mod_y);
    let top = bottom + dy + usize::from(cy < mod_y);

    Extent {
        left,
        right,
        bottom,
        top,
    }
}
