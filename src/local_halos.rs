//! Reflective halo updates
//!
//! A face whose Cartesian neighbour is NULL lies on the global domain
//! boundary; its halo is filled by reflecting the adjacent interior
//! cells outward, giving the solver a zero-flux (Neumann) boundary.

use crate::chunk::{Chunk, Face};
use crate::settings::FieldMask;

/// Reflect the interior cells of one field out into the halo of `face`.
///
/// Applying this twice is the same as applying it once: the update only
/// reads interior cells.
pub fn update_face(
    field: &mut [f64],
    x: usize,
    y: usize,
    halo_depth: usize,
    depth: usize,
    face: Face,
) {
    match face {
        Face::Left => {
            for jj in halo_depth..y - halo_depth {
                for kk in 0..depth {
                    let base = jj * x;
                    field[base + (halo_depth - kk - 1)] = field[base + (halo_depth + kk)];
                }
            }
        }
        Face::Right => {
            for jj in halo_depth..y - halo_depth {
                for kk in 0..depth {
                    let base = jj * x;
                    field[base + (x - halo_depth + kk)] = field[base + (x - halo_depth - 1 - kk)];
                }
            }
        }
        Face::Bottom => {
            for jj in 0..depth {
                for kk in halo_depth..x - halo_depth {
                    field[kk + (halo_depth - jj - 1) * x] = field[kk + (halo_depth + jj) * x];
                }
            }
        }
        Face::Top => {
            for jj in 0..depth {
                for kk in halo_depth..x - halo_depth {
                    field[kk + (y - halo_depth + jj) * x] = field[kk + (y - halo_depth - 1 - jj) * x];
                }
            }
        }
    }
}

/// Reflect every active field over the given boundary faces.
pub fn local_halos(
    chunk: &mut Chunk,
    mask: &FieldMask,
    halo_depth: usize,
    depth: usize,
    boundary_faces: &[Face],
) {
    let (x, y) = (chunk.x, chunk.y);
    for field in mask.active() {
        let data = chunk.field_mut(field);
        for &face in boundary_faces {
            update_face(data, x, y, halo_depth, depth, face);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompose::Extent;
    use crate::settings::{Field, Settings};

    fn ramp_chunk() -> Chunk {
        let mut settings = Settings {
            grid_x_cells: 4,
            grid_y_cells: 4,
            grid_x_max: 4.0,
            grid_y_max: 4.0,
            ..Settings::default()
        };
        settings.finalise().unwrap();
        let mut chunk = Chunk::new(&settings, Extent { left: 0, right: 4, bottom: 0, top: 4 });
        for jj in 0..chunk.y {
            for kk in 0..chunk.x {
                let index = chunk.index(kk, jj);
                chunk.u[index] = (10 * jj + kk) as f64;
            }
        }
        chunk
    }

    #[test]
    fn test_left_reflection() {
        let mut chunk = ramp_chunk();
        let (x, y) = (chunk.x, chunk.y);
        update_face(&mut chunk.u, x, y, 2, 2, Face::Left);

        for jj in 2..y - 2 {
            // halo col 1 mirrors interior col 2, halo col 0 mirrors col 3
            assert_eq!(chunk.u[jj * x + 1], chunk.u[jj * x + 2]);
            assert_eq!(chunk.u[jj * x], chunk.u[jj * x + 3]);
        }
    }

    #[test]
    fn test_top_reflection() {
        let mut chunk = ramp_chunk();
        let (x, y) = (chunk.x, chunk.y);
        update_face(&mut chunk.u, x, y, 2, 2, Face::Top);

        for kk in 2..x - 2 {
            assert_eq!(chunk.u[kk + (y - 2) * x], chunk.u[kk + (y - 3) * x]);
            assert_eq!(chunk.u[kk + (y - 1) * x], chunk.u[kk + (y - 4) * x]);
        }
    }

    #[test]
    fn test_reflection_is_idempotent() {
        let mut once = ramp_chunk();
        let (x, y) = (once.x, once.y);
        for face in [Face::Left, Face::Right, Face::Bottom, Face::Top] {
            update_face(&mut once.u, x, y, 2, 2, face);
        }
        let mut twice = once.clone();
        for face in [Face::Left, Face::Right, Face::Bottom, Face::Top] {
            update_face(&mut twice.u, x, y, 2, 2, face);
        }
        assert_eq!(once.u, twice.u);
    }

    #[test]
    fn test_only_active_fields_touched() {
        let mut chunk = ramp_chunk();
        chunk.density.fill(5.0);
        let before = chunk.density.clone();
        let mask = FieldMask::of(&[Field::U]);
        local_halos(&mut chunk, &mask, 2, 2, &[Face::Left, Face::Right]);
        assert_eq!(chunk.density, before);
    }
}
