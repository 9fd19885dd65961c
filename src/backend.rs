//! Kernel backend capability interface
//!
//! The drivers are generic over the set of rank-local kernels: solver
//! init/iterate, face pack/unpack, and the reflective halo update. The
//! pack/unpack/reflect operations are memory-bound bookkeeping and share
//! one implementation; backends differ in how they execute the stencil
//! sweeps.

use crate::chunk::{Chunk, Face};
use crate::settings::{Coefficient, FieldMask};
use crate::{jacobi, local_halos, pack};

/// The kernel set a solver driver needs from an execution backend
pub trait Backend: Sync {
    fn jacobi_init(
        &self,
        chunk: &mut Chunk,
        halo_depth: usize,
        coefficient: Coefficient,
        rx: f64,
        ry: f64,
    );

    /// One relaxation sweep; returns the rank-local residual
    fn jacobi_iterate(&self, chunk: &mut Chunk, halo_depth: usize) -> f64;

    fn pack(
        &self,
        chunk: &Chunk,
        face: Face,
        depth: usize,
        halo_depth: usize,
        mask: &FieldMask,
        buffer: &mut [f64],
    ) -> usize {
        pack::pack(chunk, face, depth, halo_depth, mask, buffer)
    }

    fn unpack(
        &self,
        chunk: &mut Chunk,
        face: Face,
        depth: usize,
        halo_depth: usize,
        mask: &FieldMask,
        buffer: &[f64],
    ) {
        pack::unpack(chunk, face, depth, halo_depth, mask, buffer)
    }

    fn local_halos(
        &self,
        chunk: &mut Chunk,
        mask: &FieldMask,
        halo_depth: usize,
        depth: usize,
        boundary_faces: &[Face],
    ) {
        local_halos::local_halos(chunk, mask, halo_depth, depth, boundary_faces)
    }
}

/// Straight-line loops on the control thread
pub struct Serial;

impl Backend for Serial {
    fn jacobi_init(
        &self,
        chunk: &mut Chunk,
        halo_depth: usize,
        coefficient: Coefficient,
        rx: f64,
        ry: f64,
    ) {
        jacobi::init(chunk, halo_depth, coefficient, rx, ry);
    }

    fn jacobi_iterate(&self, chunk: &mut Chunk, halo_depth: usize) -> f64 {
        jacobi::iterate(chunk, halo_depth)
    }
}

/// Rayon row-parallel stencil sweeps
pub struct Threaded;

impl Backend for Threaded {
    fn jacobi_init(
        &self,
        chunk: &mut Chunk,
        halo_depth: usize,
        coefficient: Coefficient,
        rx: f64,
        ry: f64,
    ) {
        jacobi::init_par(chunk, halo_depth, coefficient, rx, ry);
    }

    fn jacobi_iterate(&self, chunk: &mut Chunk, halo_depth: usize) -> f64 {
        jacobi::iterate_par(chunk, halo_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompose::Extent;
    use crate::settings::{Field, Settings};

    #[test]
    fn test_backends_agree_on_full_cycle() {
        let mut settings = Settings {
            grid_x_cells: 6,
            grid_y_cells: 6,
            grid_x_max: 6.0,
            grid_y_max: 6.0,
            ..Settings::default()
        };
        settings.finalise().unwrap();
        let extent = Extent { left: 0, right: 6, bottom: 0, top: 6 };

        let run = |backend: &dyn Backend| {
            let mut chunk = Chunk::new(&settings, extent);
            for index in 0..chunk.x * chunk.y {
                chunk.density[index] = 1.0 + (index % 4) as f64;
                chunk.energy[index] = 1.0;
            }
            backend.jacobi_init(&mut chunk, 2, Coefficient::Conductivity, 0.1, 0.1);
            let err = backend.jacobi_iterate(&mut chunk, 2);
            (chunk.u, err)
        };

        let (u_serial, err_serial) = run(&Serial);
        let (u_threaded, err_threaded) = run(&Threaded);
        assert_eq!(u_serial, u_threaded);
        assert!((err_serial - err_threaded).abs() < 1e-12 * (1.0 + err_serial.abs()));
    }

    #[test]
    fn test_default_pack_round_trip() {
        let mut settings = Settings {
            grid_x_cells: 4,
            grid_y_cells: 4,
            grid_x_max: 4.0,
            grid_y_max: 4.0,
            ..Settings::default()
        };
        settings.finalise().unwrap();
        let extent = Extent { left: 0, right: 4, bottom: 0, top: 4 };
        let mut chunk = Chunk::new(&settings, extent);
        for index in 0..chunk.x * chunk.y {
            chunk.u[index] = index as f64;
        }

        let mask = FieldMask::of(&[Field::U]);
        let mut buffer = vec![0.0; pack::buffer_len(Face::Right, 2, chunk.x, chunk.y, &mask)];
        let len = Serial.pack(&chunk, Face::Right, 2, 2, &mask, &mut buffer);
        assert_eq!(len, 2 * chunk.y);
    }
}
