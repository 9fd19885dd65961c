//! Per-rank sub-mesh
//!
//! A chunk owns one rectangular tile of the global grid plus a ghost-cell
//! halo of `halo_depth` on every side. Field arrays are row-major with
//! stride `x`; index `(kk, jj)` maps to `kk + jj * x`. The interior is
//! `[halo_depth, x - halo_depth) x [halo_depth, y - halo_depth)`; halo
//! cells are written only by the halo update paths. Each face carries a
//! send/recv staging buffer pair whose contents are only meaningful
//! during an exchange.

use crate::decompose::Extent;
use crate::settings::{Field, Geometry, Settings, State, NUM_FIELDS};

/// The four chunk faces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Left,
    Right,
    Bottom,
    Top,
}

impl Face {
    /// Per-field slot length in a staging buffer for this face is
    /// `depth * buffer_span`: the full chunk edge including halo.
    pub fn buffer_span(self, x: usize, y: usize) -> usize {
        match self {
            Face::Left | Face::Right => y,
            Face::Bottom | Face::Top => x,
        }
    }
}

/// One rank's tile of the mesh, with halo
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Cells along X including halo on both sides
    pub x: usize,
    /// Cells along Y including halo on both sides
    pub y: usize,

    /// Global cell index of the first interior column
    pub left: usize,
    /// Global cell index one past the last interior column
    pub right: usize,
    /// Global cell index of the first interior row
    pub bottom: usize,
    /// Global cell index one past the last interior row
    pub top: usize,

    pub density: Vec<f64>,
    pub energy0: Vec<f64>,
    pub energy: Vec<f64>,
    pub u: Vec<f64>,
    pub u0: Vec<f64>,
    pub r: Vec<f64>,
    pub p: Vec<f64>,
    pub sd: Vec<f64>,
    pub kx: Vec<f64>,
    pub ky: Vec<f64>,

    pub left_send: Vec<f64>,
    pub left_recv: Vec<f64>,
    pub right_send: Vec<f64>,
    pub right_recv: Vec<f64>,
    pub bottom_send: Vec<f64>,
    pub bottom_recv: Vec<f64>,
    pub top_send: Vec<f64>,
    pub top_recv: Vec<f64>,
}

impl Chunk {
    /// Allocate a chunk for the tile `extent`, with all fields zeroed.
    pub fn new(settings: &Settings, extent: Extent) -> Self {
        let halo_depth = settings.halo_depth;
        let x = extent.x_cells() + 2 * halo_depth;
        let y = extent.y_cells() + 2 * halo_depth;
        let cells = x * y;

        let buffer_len = NUM_FIELDS * halo_depth * x.max(y) + 2 * halo_depth;

        Chunk {
            x,
            y,
            left: extent.left,
            right: extent.right,
            bottom: extent.bottom,
            top: extent.top,
            density: vec![0.0; cells],
            energy0: vec![0.0; cells],
            energy: vec![0.0; cells],
            u: vec![0.0; cells],
            u0: vec![0.0; cells],
            r: vec![0.0; cells],
            p: vec![0.0; cells],
            sd: vec![0.0; cells],
            kx: vec![0.0; cells],
            ky: vec![0.0; cells],
            left_send: vec![0.0; buffer_len],
            left_recv: vec![0.0; buffer_len],
            right_send: vec![0.0; buffer_len],
            right_recv: vec![0.0; buffer_len],
            bottom_send: vec![0.0; buffer_len],
            bottom_recv: vec![0.0; buffer_len],
            top_send: vec![0.0; buffer_len],
            top_recv: vec![0.0; buffer_len],
        }
    }

    /// Row-major field index
    #[inline]
    pub fn index(&self, kk: usize, jj: usize) -> usize {
        kk + jj * self.x
    }

    /// Borrow one exchangeable field
    pub fn field(&self, field: Field) -> &[f64] {
        match field {
            Field::Density => &self.density,
            Field::Energy0 => &self.energy0,
            Field::Energy1 => &self.energy,
            Field::U => &self.u,
            Field::P => &self.p,
            Field::Sd => &self.sd,
        }
    }

    /// Mutably borrow one exchangeable field
    pub fn field_mut(&mut self, field: Field) -> &mut [f64] {
        match field {
            Field::Density => &mut self.density,
            Field::Energy0 => &mut self.energy0,
            Field::Energy1 => &mut self.energy,
            Field::U => &mut self.u,
            Field::P => &mut self.p,
            Field::Sd => &mut self.sd,
        }
    }

    /// X coordinate of the lower-left vertex of local column `kk`
    fn vertex_x(&self, settings: &Settings, kk: usize) -> f64 {
        let global = self.left as i64 + kk as i64 - settings.halo_depth as i64;
        settings.grid_x_min + settings.dx * global as f64
    }

    /// Y coordinate of the lower-left vertex of local row `jj`
    fn vertex_y(&self, settings: &Settings, jj: usize) -> f64 {
        let global = self.bottom as i64 + jj as i64 - settings.halo_depth as i64;
        settings.grid_y_min + settings.dy * global as f64
    }

    /// Apply the initial-condition regions to `density`/`energy0` and
    /// seed `u`. The first state is the background fill; later states
    /// overwrite the cells their geometry selects. Halo cells are
    /// initialised too, so the first exchange starts from defined data.
    pub fn apply_states(&mut self, settings: &Settings, states: &[State]) {
        for (ss, state) in states.iter().enumerate() {
            for jj in 0..self.y {
                for kk in 0..self.x {
                    let applies = if ss == 0 {
                        true
                    } else {
                        let vx0 = self.vertex_x(settings, kk);
                        let vx1 = self.vertex_x(settings, kk + 1);
                        let vy0 = self.vertex_y(settings, jj);
                        let vy1 = self.vertex_y(settings, jj + 1);
                        match state.geometry {
                            Geometry::Rectangular => {
                                vx1 > state.x_min
                                    && vx0 < state.x_max
                                    && vy1 > state.y_min
                                    && vy0 < state.y_max
                            }
                            Geometry::Circular => {
                                let cx = vx0 + 0.5 * settings.dx;
                                let cy = vy0 + 0.5 * settings.dy;
                                let dx = cx - state.x_min;
                                let dy = cy - state.y_min;
                                (dx * dx + dy * dy).sqrt() <= state.radius
                            }
                            Geometry::Point => {
                                vx0 <= state.x_min
                                    && state.x_min < vx1
                                    && vy0 <= state.y_min
                                    && state.y_min < vy1
                            }
                        }
                    };

                    if applies {
                        let index = self.index(kk, jj);
                        self.density[index] = state.density;
                        self.energy0[index] = state.energy;
                    }
                }
            }
        }

        for index in 0..self.x * self.y {
            self.u[index] = self.energy0[index] * self.density[index];
        }
    }

    /// Copy the initial energy into the working energy field
    pub fn store_energy(&mut self) {
        self.energy.copy_from_slice(&self.energy0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompose::Extent;

    fn test_settings() -> Settings {
        let mut s = Settings {
            grid_x_cells: 10,
            grid_y_cells: 10,
            grid_x_max: 10.0,
            grid_y_max: 10.0,
            ..Settings::default()
        };
        s.finalise().unwrap();
        s
    }

    fn test_extent() -> Extent {
        Extent { left: 0, right: 10, bottom: 0, top: 10 }
    }

    #[test]
    fn test_dimensions_include_halo() {
        let settings = test_settings();
        let chunk = Chunk::new(&settings, test_extent());
        assert_eq!(chunk.x, 14);
        assert_eq!(chunk.y, 14);
        assert_eq!(chunk.density.len(), 14 * 14);
        assert!(chunk.left_send.len() >= NUM_FIELDS * 2 * 14 + 4);
    }

    #[test]
    fn test_background_state_fills_everything() {
        let settings = test_settings();
        let mut chunk = Chunk::new(&settings, test_extent());
        let background = State {
            density: 2.0,
            energy: 3.0,
            ..State::default()
        };
        chunk.apply_states(&settings, &[background]);
        assert!(chunk.density.iter().all(|&d| d == 2.0));
        assert!(chunk.energy0.iter().all(|&e| e == 3.0));
        assert!(chunk.u.iter().all(|&u| u == 6.0));
    }

    #[test]
    fn test_rectangle_state_overwrites_region() {
        let settings = test_settings();
        let mut chunk = Chunk::new(&settings, test_extent());
        let background = State { density: 1.0, energy: 1.0, ..State::default() };
        let hot = State {
            density: 0.5,
            energy: 4.0,
            x_min: 0.0,
            x_max: 2.0,
            y_min: 0.0,
            y_max: 2.0,
            geometry: Geometry::Rectangular,
            ..State::default()
        };
        chunk.apply_states(&settings, &[background, hot]);

        let hd = settings.halo_depth;
        // First interior cell sits inside the region
        let inside = chunk.index(hd, hd);
        assert_eq!(chunk.density[inside], 0.5);
        assert_eq!(chunk.energy0[inside], 4.0);
        // An interior cell well outside keeps the background
        let outside = chunk.index(hd + 5, hd + 5);
        assert_eq!(chunk.density[outside], 1.0);
        // u is seeded from the applied fields
        assert_eq!(chunk.u[inside], 2.0);
    }

    #[test]
    fn test_store_energy() {
        let settings = test_settings();
        let mut chunk = Chunk::new(&settings, test_extent());
        chunk.energy0.fill(7.0);
        chunk.store_energy();
        assert!(chunk.energy.iter().all(|&e| e == 7.0));
    }
}
