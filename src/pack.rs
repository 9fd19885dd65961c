//! Face pack/unpack kernels
//!
//! A staging buffer holds the active fields in wire order, one slot of
//! `depth * buffer_span` doubles per field. Within a slot the packed
//! payload is row-major over the lines parallel to the face:
//!
//! - LEFT/RIGHT: `height` rows of `depth` columns, at `(row * depth + col)`
//! - BOTTOM/TOP: `depth` rows of `width` cells, at `(row * width + cell)`
//!
//! Pack reads the `depth` interior lines adjacent to the face; unpack
//! writes the `depth` halo lines on the same side. The two use one offset
//! formula family so that a packed face from one chunk unpacks exactly
//! into the paired halo of its neighbour.

use crate::chunk::{Chunk, Face};
use crate::settings::FieldMask;

/// Length of one field's slot in a staging buffer
pub fn field_slot_len(face: Face, depth: usize, x: usize, y: usize) -> usize {
    depth * face.buffer_span(x, y)
}

/// Total wire length for `mask` over `face`
pub fn buffer_len(face: Face, depth: usize, x: usize, y: usize, mask: &FieldMask) -> usize {
    mask.count() * field_slot_len(face, depth, x, y)
}

/// Pack the active fields of `chunk` for `face` into `buffer`.
///
/// Returns the number of doubles written (the wire length).
pub fn pack(
    chunk: &Chunk,
    face: Face,
    depth: usize,
    halo_depth: usize,
    mask: &FieldMask,
    buffer: &mut [f64],
) -> usize {
    let slot = field_slot_len(face, depth, chunk.x, chunk.y);
    let mut offset = 0;
    for field in mask.active() {
        pack_field(
            chunk.field(field),
            face,
            depth,
            halo_depth,
            chunk.x,
            chunk.y,
            &mut buffer[offset..offset + slot],
        );
        offset += slot;
    }
    offset
}

/// Unpack `buffer` into the halo lines of `face` for the active fields.
pub fn unpack(
    chunk: &mut Chunk,
    face: Face,
    depth: usize,
    halo_depth: usize,
    mask: &FieldMask,
    buffer: &[f64],
) {
    let slot = field_slot_len(face, depth, chunk.x, chunk.y);
    let (x, y) = (chunk.x, chunk.y);
    let mut offset = 0;
    for field in mask.active() {
        unpack_field(
            chunk.field_mut(field),
            face,
            depth,
            halo_depth,
            x,
            y,
            &buffer[offset..offset + slot],
        );
        offset += slot;
    }
}

fn pack_field(
    field: &[f64],
    face: Face,
    depth: usize,
    halo_depth: usize,
    x: usize,
    y: usize,
    buffer: &mut [f64],
) {
    match face {
        Face::Left => {
            for jj in halo_depth..y - halo_depth {
                for kk in 0..depth {
                    buffer[(jj - halo_depth) * depth + kk] = field[jj * x + halo_depth + kk];
                }
            }
        }
        Face::Right => {
            for jj in halo_depth..y - halo_depth {
                for kk in 0..depth {
                    buffer[(jj - halo_depth) * depth + kk] =
                        field[jj * x + (x - halo_depth - depth + kk)];
                }
            }
        }
        Face::Bottom => {
            let width = x - 2 * halo_depth;
            for jj in 0..depth {
                for kk in halo_depth..x - halo_depth {
                    buffer[jj * width + (kk - halo_depth)] = field[(halo_depth + jj) * x + kk];
                }
            }
        }
        Face::Top => {
            let width = x - 2 * halo_depth;
            for jj in 0..depth {
                for kk in halo_depth..x - halo_depth {
                    buffer[jj * width + (kk - halo_depth)] =
                        field[(y - halo_depth - depth + jj) * x + kk];
                }
            }
        }
    }
}

fn unpack_field(
    field: &mut [f64],
    face: Face,
    depth: usize,
    halo_depth: usize,
    x: usize,
    y: usize,
    buffer: &[f64],
) {
    match face {
        Face::Left => {
            for jj in halo_depth..y - halo_depth {
                for kk in 0..depth {
                    field[jj * x + (halo_depth - depth + kk)] =
                        buffer[(jj - halo_depth) * depth + kk];
                }
            }
        }
        Face::Right => {
            for jj in halo_depth..y - halo_depth {
                for kk in 0..depth {
                    field[jj * x + (x - halo_depth + kk)] = buffer[(jj - halo_depth) * depth + kk];
                }
            }
        }
        Face::Bottom => {
            let width = x - 2 * halo_depth;
            for jj in 0..depth {
                for kk in halo_depth..x - halo_depth {
                    field[(halo_depth - depth + jj) * x + kk] = buffer[jj * width + (kk - halo_depth)];
                }
            }
        }
        Face::Top => {
            let width = x - 2 * halo_depth;
            for jj in 0..depth {
                for kk in halo_depth..x - halo_depth {
                    field[(y - halo_depth + jj) * x + kk] = buffer[jj * width + (kk - halo_depth)];
                }
            }
        }
    }
}
