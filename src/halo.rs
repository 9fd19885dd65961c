//! Remote halo driver
//!
//! One invocation refreshes the halo of every active field to `depth`
//! cells: the X faces are packed, exchanged and unpacked first, then the
//! Y faces, so that the vertical packs carry corner cells already
//! updated by the horizontal exchange. Faces whose neighbour is NULL lie
//! on the global boundary and are reflected locally instead.
//!
//! Tag discipline per axis: the exchange toward the predecessor uses
//! `(0, 1)` and toward the successor `(1, 0)`, so each side's send
//! matches the other's recv.

use crate::backend::Backend;
use crate::chunk::{Chunk, Face};
use crate::error::FurnaceError;
use crate::fabric::{ExchangeStatus, RankComm};
use crate::fault;
use crate::settings::{FieldMask, RecoveryStrategy, Settings};

struct FaceExchange {
    face: Face,
    neighbour: usize,
    send_tag: u32,
    recv_tag: u32,
}

fn take_buffers(chunk: &mut Chunk, face: Face) -> (Vec<f64>, Vec<f64>) {
    match face {
        Face::Left => (
            std::mem::take(&mut chunk.left_send),
            std::mem::take(&mut chunk.left_recv),
        ),
        Face::Right => (
            std::mem::take(&mut chunk.right_send),
            std::mem::take(&mut chunk.right_recv),
        ),
        Face::Bottom => (
            std::mem::take(&mut chunk.bottom_send),
            std::mem::take(&mut chunk.bottom_recv),
        ),
        Face::Top => (
            std::mem::take(&mut chunk.top_send),
            std::mem::take(&mut chunk.top_recv),
        ),
    }
}

fn restore_buffers(chunk: &mut Chunk, face: Face, send: Vec<f64>, recv: Vec<f64>) {
    match face {
        Face::Left => {
            chunk.left_send = send;
            chunk.left_recv = recv;
        }
        Face::Right => {
            chunk.right_send = send;
            chunk.right_recv = recv;
        }
        Face::Bottom => {
            chunk.bottom_send = send;
            chunk.bottom_recv = recv;
        }
        Face::Top => {
            chunk.top_send = send;
            chunk.top_recv = recv;
        }
    }
}

/// Pack, exchange and recover both faces of one axis, then unpack both.
#[allow(clippy::too_many_arguments)]
fn exchange_axis<B: Backend>(
    chunk: &mut Chunk,
    settings: &Settings,
    comm: &mut RankComm,
    backend: &B,
    mask: &FieldMask,
    depth: usize,
    exchanges: &[FaceExchange],
) -> Result<(), FurnaceError> {
    let halo_depth = settings.halo_depth;
    let mut pending: Vec<(Face, usize, Vec<f64>)> = Vec::with_capacity(exchanges.len());

    for ex in exchanges {
        let (mut send_buf, mut recv_buf) = take_buffers(chunk, ex.face);
        let len = backend.pack(chunk, ex.face, depth, halo_depth, mask, &mut send_buf);

        let status = comm.send_recv(
            &send_buf[..len],
            &mut recv_buf[..len],
            ex.neighbour,
            ex.send_tag,
            ex.recv_tag,
        )?;

        if status == ExchangeStatus::PeerFailed {
            fault::recover_on_first_fault(
                comm,
                settings.ft_recv_strategy,
                settings.ft_recv_static_value,
                &send_buf[..len],
                &mut recv_buf[..len],
            );
        }
        if settings.ft_recv_strategy == RecoveryStrategy::Interpolation {
            fault::interpolation_recovery(
                comm,
                mask,
                chunk.x,
                chunk.y,
                halo_depth,
                depth,
                ex.face,
                ex.neighbour,
                &send_buf[..len],
                &mut recv_buf[..len],
            )?;
        }

        restore_buffers(chunk, ex.face, send_buf, Vec::new());
        pending.push((ex.face, len, recv_buf));
    }

    for (face, len, recv_buf) in pending {
        backend.unpack(chunk, face, depth, halo_depth, mask, &recv_buf[..len]);
        match face {
            Face::Left => chunk.left_recv = recv_buf,
            Face::Right => chunk.right_recv = recv_buf,
            Face::Bottom => chunk.bottom_recv = recv_buf,
            Face::Top => chunk.top_recv = recv_buf,
        }
    }

    Ok(())
}

/// Exchange the active fields with all live Cartesian neighbours.
pub fn remote_halo_driver<B: Backend>(
    chunk: &mut Chunk,
    settings: &Settings,
    comm: &mut RankComm,
    backend: &B,
    mask: &FieldMask,
    depth: usize,
) -> Result<(), FurnaceError> {
    let neighbours = comm.neighbours()?;

    let mut x_faces = Vec::with_capacity(2);
    if let Some(left) = neighbours.left {
        x_faces.push(FaceExchange { face: Face::Left, neighbour: left, send_tag: 0, recv_tag: 1 });
    }
    if let Some(right) = neighbours.right {
        x_faces.push(FaceExchange { face: Face::Right, neighbour: right, send_tag: 1, recv_tag: 0 });
    }
    exchange_axis(chunk, settings, comm, backend, mask, depth, &x_faces)?;

    // Corner halo cells are only correct after both axis exchanges: the
    // vertical packs below include cells written by the X unpack above.
    let mut y_faces = Vec::with_capacity(2);
    if let Some(down) = neighbours.down {
        y_faces.push(FaceExchange { face: Face::Bottom, neighbour: down, send_tag: 0, recv_tag: 1 });
    }
    if let Some(up) = neighbours.up {
        y_faces.push(FaceExchange { face: Face::Top, neighbour: up, send_tag: 1, recv_tag: 0 });
    }
    exchange_axis(chunk, settings, comm, backend, mask, depth, &y_faces)?;

    Ok(())
}

/// Full halo refresh: remote exchange on interior faces, reflective
/// update on global-boundary faces.
pub fn halo_update<B: Backend>(
    chunk: &mut Chunk,
    settings: &Settings,
    comm: &mut RankComm,
    backend: &B,
    mask: &FieldMask,
    depth: usize,
) -> Result<(), FurnaceError> {
    if !mask.any() || depth == 0 {
        return Ok(());
    }

    remote_halo_driver(chunk, settings, comm, backend, mask, depth)?;

    let neighbours = comm.neighbours()?;
    let mut boundary = Vec::with_capacity(4);
    if neighbours.left.is_none() {
        boundary.push(Face::Left);
    }
    if neighbours.right.is_none() {
        boundary.push(Face::Right);
    }
    if neighbours.down.is_none() {
        boundary.push(Face::Bottom);
    }
    if neighbours.up.is_none() {
        boundary.push(Face::Top);
    }
    backend.local_halos(chunk, mask, settings.halo_depth, depth, &boundary);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Serial;
    use crate::decompose::Extent;
    use crate::fabric::Fabric;
    use crate::settings::Field;

    /// A single rank has no neighbours: halo_update reduces to the
    /// reflective boundary update on all four faces.
    #[test]
    fn test_single_rank_reflects_all_faces() {
        let mut settings = Settings {
            grid_x_cells: 4,
            grid_y_cells: 4,
            grid_x_max: 4.0,
            grid_y_max: 4.0,
            ..Settings::default()
        };
        settings.finalise().unwrap();

        let mut comms = Fabric::new(1);
        let mut comm = comms.pop().unwrap();
        comm.cart_create(1, 1).unwrap();

        let mut chunk = Chunk::new(&settings, Extent { left: 0, right: 4, bottom: 0, top: 4 });
        for jj in 0..chunk.y {
            for kk in 0..chunk.x {
                let index = chunk.index(kk, jj);
                chunk.u[index] = (jj * 10 + kk) as f64;
            }
        }

        let mask = FieldMask::of(&[Field::U]);
        halo_update(&mut chunk, &settings, &mut comm, &Serial, &mask, 2).unwrap();

        let x = chunk.x;
        for jj in 2..chunk.y - 2 {
            assert_eq!(chunk.u[jj * x + 1], chunk.u[jj * x + 2]);
            assert_eq!(chunk.u[jj * x], chunk.u[jj * x + 3]);
            assert_eq!(chunk.u[jj * x + x - 2], chunk.u[jj * x + x - 3]);
            assert_eq!(chunk.u[jj * x + x - 1], chunk.u[jj * x + x - 4]);
        }
    }

    #[test]
    fn test_empty_mask_is_noop() {
        let mut settings = Settings {
            grid_x_cells: 4,
            grid_y_cells: 4,
            grid_x_max: 4.0,
            grid_y_max: 4.0,
            ..Settings::default()
        };
        settings.finalise().unwrap();

        let mut comms = Fabric::new(1);
        let mut comm = comms.pop().unwrap();
        comm.cart_create(1, 1).unwrap();

        let mut chunk = Chunk::new(&settings, Extent { left: 0, right: 4, bottom: 0, top: 4 });
        chunk.u.fill(3.0);
        let before = chunk.u.clone();
        halo_update(&mut chunk, &settings, &mut comm, &Serial, &FieldMask::none(), 2).unwrap();
        assert_eq!(chunk.u, before);
    }
}
