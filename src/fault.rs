//! Fault recovery for halo exchanges
//!
//! When an exchange reports a dead peer the recv staging buffer is
//! undefined and must be rebuilt before unpacking. Four strategies are
//! supported:
//!
//! - STATIC: fill the buffer with a configured constant
//! - MIRROR: copy our own send buffer back (reflect the boundary)
//! - BRIDGE: acknowledge the failure to the fabric, then MIRROR; later
//!   exchanges reach the next live rank along the axis
//! - INTERPOLATION: BRIDGE, plus a linear blend on later exchanges that
//!   treats the dead neighbours as unknowns and bridges the gap between
//!   the two live boundary values in equal steps
//!
//! The interpolation pass runs per active field with independent slot
//! offsets, using the same buffer layout as the pack kernels.

use tracing::warn;

use crate::chunk::Face;
use crate::error::FurnaceError;
use crate::fabric::RankComm;
use crate::pack::field_slot_len;
use crate::settings::{FieldMask, RecoveryStrategy};

/// Rebuild `recv_buffer` after a failed exchange.
///
/// STATIC and MIRROR mask the failure locally; BRIDGE and INTERPOLATION
/// additionally acknowledge it so the neighbour view shrinks around the
/// dead ranks.
pub fn recover_on_first_fault(
    comm: &mut RankComm,
    strategy: RecoveryStrategy,
    static_value: f64,
    send_buffer: &[f64],
    recv_buffer: &mut [f64],
) {
    warn!(
        target: "ft",
        rank = comm.rank(),
        ?strategy,
        len = recv_buffer.len(),
        "rebuilding recv buffer after peer failure"
    );
    match strategy {
        RecoveryStrategy::Static => {
            recv_buffer.fill(static_value);
        }
        RecoveryStrategy::Mirror => {
            recv_buffer.copy_from_slice(send_buffer);
        }
        RecoveryStrategy::Bridge | RecoveryStrategy::Interpolation => {
            comm.ack_failures();
            // Apply MIRROR the first time a fault is detected
            recv_buffer.copy_from_slice(send_buffer);
        }
    }
}

/// Number of consecutive dead ranks between us and `neighbour_rank`
/// along the exchange axis; 0 means the peer is adjacent and alive data
/// arrived, so no interpolation is needed.
fn dead_neighbours(
    comm: &RankComm,
    neighbour_rank: usize,
) -> Result<usize, FurnaceError> {
    let (cx, cy) = comm.cart_coords(comm.rank())?;
    let (nx, ny) = comm.cart_coords(neighbour_rank)?;
    let dx = (cx as i64 - nx as i64).abs();
    let dy = (cy as i64 - ny as i64).abs();
    Ok((dx.max(dy) - 1).max(0) as usize)
}

/// Stretch the received halo so it linearly bridges the gap left by the
/// dead ranks between us and `neighbour_rank`.
///
/// For each line along the face, `delta` is the difference between our
/// own boundary value and the far side's boundary value, divided by the
/// cell distance `face_span * dead + 1`; the reconstructed halo lines
/// step away from our boundary by one `delta` per cell.
#[allow(clippy::too_many_arguments)]
pub fn interpolation_recovery(
    comm: &RankComm,
    mask: &FieldMask,
    x: usize,
    y: usize,
    halo_depth: usize,
    depth: usize,
    face: Face,
    neighbour_rank: usize,
    send_buffer: &[f64],
    recv_buffer: &mut [f64],
) -> Result<(), FurnaceError> {
    let dead = dead_neighbours(comm, neighbour_rank)?;
    if dead == 0 {
        return Ok(());
    }

    let height = y - 2 * halo_depth;
    let width = x - 2 * halo_depth;
    let slot = field_slot_len(face, depth, x, y);

    for (ff, _) in mask.active().enumerate() {
        let offset = ff * slot;
        match face {
            Face::Left => {
                for rr in 0..height {
                    let own = send_buffer[offset + rr * depth];
                    let far = recv_buffer[offset + rr * depth + depth - 1];
                    let delta = (own - far) / (width * dead + 1) as f64;
                    for cc in 0..depth {
                        let steps = (depth - cc) as f64;
                        recv_buffer[offset + rr * depth + cc] = own - steps * delta;
                    }
                }
            }
            Face::Right => {
                for rr in 0..height {
                    let own = send_buffer[offset + rr * depth + depth - 1];
                    let far = recv_buffer[offset + rr * depth];
                    let delta = (own - far) / (width * dead + 1) as f64;
                    for cc in 0..depth {
                        let steps = (cc + 1) as f64;
                        recv_buffer[offset + rr * depth + cc] = own - steps * delta;
                    }
                }
            }
            Face::Bottom => {
                for cc in 0..width {
                    let own = send_buffer[offset + cc];
                    let far = recv_buffer[offset + (depth - 1) * width + cc];
                    let delta = (own - far) / (height * dead + 1) as f64;
                    for rr in 0..depth {
                        let steps = (depth - rr) as f64;
                        recv_buffer[offset + rr * width + cc] = own - steps * delta;
                    }
                }
            }
            Face::Top => {
                for cc in 0..width {
                    let own = send_buffer[offset + (depth - 1) * width + cc];
                    let far = recv_buffer[offset + cc];
                    let delta = (own - far) / (height * dead + 1) as f64;
                    for rr in 0..depth {
                        let steps = (rr + 1) as f64;
                        recv_buffer[offset + rr * width + cc] = own - steps * delta;
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fabric::Fabric;
    use crate::settings::Field;

    #[test]
    fn test_static_fills_constant() {
        let mut comms = Fabric::new(1);
        let mut comm = comms.pop().unwrap();
        let send = vec![1.0; 8];
        let mut recv = vec![9.9; 8];
        recover_on_first_fault(&mut comm, RecoveryStrategy::Static, 0.5, &send, &mut recv);
        assert!(recv.iter().all(|&v| v == 0.5));
        assert!(!comm.failures_acked());
    }

    #[test]
    fn test_mirror_copies_send_buffer() {
        let mut comms = Fabric::new(1);
        let mut comm = comms.pop().unwrap();
        let send: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let mut recv = vec![0.0; 8];
        recover_on_first_fault(&mut comm, RecoveryStrategy::Mirror, 0.0, &send, &mut recv);
        assert_eq!(recv, send);
        assert!(!comm.failures_acked());
    }

    #[test]
    fn test_bridge_acknowledges_and_mirrors() {
        let mut comms = Fabric::new(1);
        let mut comm = comms.pop().unwrap();
        let send = vec![3.0; 4];
        let mut recv = vec![0.0; 4];
        recover_on_first_fault(&mut comm, RecoveryStrategy::Bridge, 0.0, &send, &mut recv);
        assert_eq!(recv, send);
        assert!(comm.failures_acked());
    }

    /// One dead rank on the X axis: the reconstructed halo must sit on
    /// the straight line between the two live boundary columns.
    #[test]
    fn test_interpolation_right_face_is_linear() {
        // 3x1 process grid, each chunk 4x4 interior cells, halo depth 2
        let mut comms = Fabric::new(3);
        for comm in comms.iter_mut() {
            comm.cart_create(3, 1).unwrap();
        }
        let comm = &comms[0];

        let (x, y, hd, depth) = (8, 8, 2, 2);
        let height = 4;
        let mask = FieldMask::of(&[Field::U]);

        // Global field value = global column index. Our interior is
        // columns 2..6, the far rank's is 10..14; rank 1 in between is
        // dead, so dead_neighbours == 1.
        let mut send = vec![0.0; depth * y];
        let mut recv = vec![0.0; depth * y];
        for rr in 0..height {
            // Our RIGHT pack: columns 4 and 5
            send[rr * depth] = 4.0;
            send[rr * depth + 1] = 5.0;
            // Far rank's LEFT pack: columns 10 and 11
            recv[rr * depth] = 10.0;
            recv[rr * depth + 1] = 11.0;
        }

        interpolation_recovery(
            comm, &mask, x, y, hd, depth, Face::Right, 2, &send, &mut recv,
        )
        .unwrap();

        // delta = (5 - 10) / (4 * 1 + 1) = -1: halo columns 6 and 7
        for rr in 0..height {
            assert_eq!(recv[rr * depth], 6.0);
            assert_eq!(recv[rr * depth + 1], 7.0);
        }
    }

    /// Adjacent live neighbour: the received data must be left alone.
    #[test]
    fn test_interpolation_noop_for_adjacent_peer() {
        let mut comms = Fabric::new(3);
        for comm in comms.iter_mut() {
            comm.cart_create(3, 1).unwrap();
        }
        let comm = &comms[0];

        let mask = FieldMask::of(&[Field::U]);
        let send = vec![1.0; 2 * 8];
        let mut recv = vec![42.0; 2 * 8];
        let before = recv.clone();
        interpolation_recovery(
            comm, &mask, 8, 8, 2, 2, Face::Right, 1, &send, &mut recv,
        )
        .unwrap();
        assert_eq!(recv, before);
    }

    /// The vertical faces use the same equal-step geometry.
    #[test]
    fn test_interpolation_top_face_is_linear() {
        let mut comms = Fabric::new(3);
        for comm in comms.iter_mut() {
            comm.cart_create(1, 3).unwrap();
        }
        let comm = &comms[0];

        let (x, y, hd, depth) = (8, 8, 2, 2);
        let width = 4;
        let mask = FieldMask::of(&[Field::U]);

        // Global field value = global row index; our interior rows are
        // 2..6, the far rank's 10..14.
        let mut send = vec![0.0; depth * x];
        let mut recv = vec![0.0; depth * x];
        for cc in 0..width {
            // Our TOP pack: rows 4 and 5
            send[cc] = 4.0;
            send[width + cc] = 5.0;
            // Far rank's BOTTOM pack: rows 10 and 11
            recv[cc] = 10.0;
            recv[width + cc] = 11.0;
        }

        interpolation_recovery(
            comm, &mask, x, y, hd, depth, Face::Top, 2, &send, &mut recv,
        )
        .unwrap();

        // delta = (5 - 10) / 5 = -1: halo rows 6 and 7
        for cc in 0..width {
            assert_eq!(recv[cc], 6.0);
            assert_eq!(recv[width + cc], 7.0);
        }
    }

    /// Per-field slots are interpolated independently.
    #[test]
    fn test_interpolation_multiple_fields() {
        let mut comms = Fabric::new(4);
        for comm in comms.iter_mut() {
            comm.cart_create(4, 1).unwrap();
        }
        let comm = &comms[0];

        let (x, y, hd, depth) = (8, 8, 2, 2);
        let height = 4;
        let mask = FieldMask::of(&[Field::Density, Field::U]);
        let slot = depth * y;

        let mut send = vec![0.0; 2 * slot];
        let mut recv = vec![0.0; 2 * slot];
        for ff in 0..2 {
            let scale = (ff + 1) as f64;
            for rr in 0..height {
                send[ff * slot + rr * depth] = 4.0 * scale;
                send[ff * slot + rr * depth + 1] = 5.0 * scale;
                recv[ff * slot + rr * depth] = 14.0 * scale;
                recv[ff * slot + rr * depth + 1] = 15.0 * scale;
            }
        }

        // Neighbour rank 3 is two dead ranks away: 4 * 2 + 1 = 9 steps
        interpolation_recovery(
            comm, &mask, x, y, hd, depth, Face::Right, 3, &send, &mut recv,
        )
        .unwrap();

        for ff in 0..2 {
            let scale = (ff + 1) as f64;
            let delta = (5.0 * scale - 14.0 * scale) / 9.0;
            for rr in 0..height {
                assert!((recv[ff * slot + rr * depth] - (5.0 * scale - delta)).abs() < 1e-12);
                assert!(
                    (recv[ff * slot + rr * depth + 1] - (5.0 * scale - 2.0 * delta)).abs() < 1e-12
                );
            }
        }
    }
}
