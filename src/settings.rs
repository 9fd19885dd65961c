//! Run-wide configuration
//!
//! `Settings` is built once from the input deck and is read-only for the
//! rest of the run; every rank thread sees the same instance. Mutable
//! per-solve state (the active field mask, the communicator) is owned by
//! the drivers instead.

use std::path::PathBuf;

use crate::error::FurnaceError;

/// Number of exchangeable fields
pub const NUM_FIELDS: usize = 6;

/// The fields that can take part in a halo exchange, in wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Density,
    Energy0,
    Energy1,
    U,
    P,
    Sd,
}

impl Field {
    /// Fixed pack/unpack order; both sides of an exchange iterate this
    pub const EXCHANGE_ORDER: [Field; NUM_FIELDS] = [
        Field::Density,
        Field::Energy0,
        Field::Energy1,
        Field::U,
        Field::P,
        Field::Sd,
    ];

    fn index(self) -> usize {
        match self {
            Field::Density => 0,
            Field::Energy0 => 1,
            Field::Energy1 => 2,
            Field::U => 3,
            Field::P => 4,
            Field::Sd => 5,
        }
    }
}

/// Which fields the next halo exchange carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldMask([bool; NUM_FIELDS]);

impl FieldMask {
    /// Empty mask: no fields exchanged
    pub fn none() -> Self {
        FieldMask([false; NUM_FIELDS])
    }

    /// Mask with exactly the given fields enabled
    pub fn of(fields: &[Field]) -> Self {
        let mut mask = Self::none();
        for &f in fields {
            mask.0[f.index()] = true;
        }
        mask
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0[field.index()]
    }

    pub fn any(&self) -> bool {
        self.0.iter().any(|&b| b)
    }

    /// Number of enabled fields
    pub fn count(&self) -> usize {
        self.0.iter().filter(|&&b| b).count()
    }

    /// Enabled fields in wire order
    pub fn active(&self) -> impl Iterator<Item = Field> + '_ {
        Field::EXCHANGE_ORDER
            .into_iter()
            .filter(move |f| self.contains(*f))
    }
}

/// The type of solver to be run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Solver {
    Jacobi,
    Cg,
    Cheby,
    Ppcg,
}

impl Solver {
    pub fn name(&self) -> &'static str {
        match self {
            Solver::Jacobi => "JACOBI",
            Solver::Cg => "CG",
            Solver::Cheby => "CHEBY",
            Solver::Ppcg => "PPCG",
        }
    }
}

/// Conduction coefficient mode for the kx/ky fill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coefficient {
    Conductivity,
    RecipConductivity,
}

/// Recovery strategy applied to a face recv buffer when the peer has died
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Fill every recv cell with a configured constant
    Static,
    /// Copy the send buffer back (reflect our own boundary)
    Mirror,
    /// Acknowledge the failure, then mirror on the first fault
    Bridge,
    /// Acknowledge, mirror on the first fault, then linearly bridge the
    /// gap spanned by the dead neighbours on later exchanges
    Interpolation,
}

/// Which backend executes the rank-local kernels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Serial,
    Threaded,
}

/// The accepted kinds of state geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geometry {
    Rectangular,
    Circular,
    Point,
}

/// One geometric initial-condition region, consumed once at start
#[derive(Debug, Clone, Copy)]
pub struct State {
    pub density: f64,
    pub energy: f64,
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
    pub radius: f64,
    pub geometry: Geometry,
}

impl Default for State {
    fn default() -> Self {
        State {
            density: 0.0,
            energy: 0.0,
            x_min: 0.0,
            y_min: 0.0,
            x_max: 0.0,
            y_max: 0.0,
            radius: 0.0,
            geometry: Geometry::Rectangular,
        }
    }
}

/// The main settings structure
#[derive(Debug, Clone)]
pub struct Settings {
    // Field dimensions
    pub grid_x_cells: usize,
    pub grid_y_cells: usize,
    pub grid_x_min: f64,
    pub grid_y_min: f64,
    pub grid_x_max: f64,
    pub grid_y_max: f64,

    // Solve-wide constants
    pub halo_depth: usize,
    pub dt_init: f64,
    pub end_time: f64,
    pub end_step: u32,
    pub max_iters: u32,
    pub eps: f64,
    pub eps_lim: f64,
    pub solver: Solver,
    pub coefficient: Coefficient,
    pub preconditioner: bool,
    pub ppcg_inner_steps: u32,
    pub presteps: u32,
    pub backend: BackendKind,

    // Fault-tolerance config
    pub ft: bool,
    pub ft_recv_strategy: RecoveryStrategy,
    pub ft_recv_static_value: f64,
    pub ft_recv_interpolation_factor: f64,
    pub with_ft_kill_x: usize,
    pub with_ft_kill_y: usize,
    pub with_ft_kill_iter: u32,

    // Reporting cadence
    pub summary_frequency: u32,
    pub visit_frequency: u32,
    pub vtk_dir: PathBuf,

    /// Physical cell width, derived in [`Settings::finalise`]
    pub dx: f64,
    /// Physical cell height, derived in [`Settings::finalise`]
    pub dy: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            grid_x_cells: 10,
            grid_y_cells: 10,
            grid_x_min: 0.0,
            grid_y_min: 0.0,
            grid_x_max: 100.0,
            grid_y_max: 100.0,
            halo_depth: 2,
            dt_init: 0.1,
            end_time: 10.0,
            end_step: u32::MAX,
            max_iters: 10_000,
            eps: 1.0e-15,
            eps_lim: 1.0e-5,
            solver: Solver::Jacobi,
            coefficient: Coefficient::Conductivity,
            preconditioner: false,
            ppcg_inner_steps: 10,
            presteps: 30,
            backend: BackendKind::Serial,
            ft: false,
            ft_recv_strategy: RecoveryStrategy::Interpolation,
            ft_recv_static_value: 1.0e-5,
            ft_recv_interpolation_factor: 1.0e-3,
            with_ft_kill_x: 0,
            with_ft_kill_y: 0,
            with_ft_kill_iter: 0,
            summary_frequency: 10,
            visit_frequency: 0,
            vtk_dir: PathBuf::from("vtk"),
            dx: 0.0,
            dy: 0.0,
        }
    }
}

impl Settings {
    /// Derive `dx`/`dy` and validate the configuration. Must be called
    /// once after the deck has been applied and before any chunk exists.
    pub fn finalise(&mut self) -> Result<(), FurnaceError> {
        if self.grid_x_cells == 0 || self.grid_y_cells == 0 {
            return Err(FurnaceError::Config(
                "grid_x_cells and grid_y_cells must be positive".into(),
            ));
        }
        if self.halo_depth < 1 {
            return Err(FurnaceError::Config("halo_depth must be at least 1".into()));
        }
        if self.grid_x_max <= self.grid_x_min || self.grid_y_max <= self.grid_y_min {
            return Err(FurnaceError::Config(
                "grid extents must satisfy min < max".into(),
            ));
        }
        if !(self.eps > 0.0) {
            return Err(FurnaceError::Config("eps must be positive".into()));
        }
        if !(self.dt_init > 0.0) {
            return Err(FurnaceError::Config("dt_init must be positive".into()));
        }
        self.dx = (self.grid_x_max - self.grid_x_min) / self.grid_x_cells as f64;
        self.dy = (self.grid_y_max - self.grid_y_min) / self.grid_y_cells as f64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_values() {
        let s = Settings::default();
        assert_eq!(s.halo_depth, 2);
        assert_eq!(s.eps, 1.0e-15);
        assert_eq!(s.dt_init, 0.1);
        assert_eq!(s.summary_frequency, 10);
        assert_eq!(s.ft_recv_strategy, RecoveryStrategy::Interpolation);
        assert!(!s.ft);
    }

    #[test]
    fn test_finalise_derives_cell_sizes() {
        let mut s = Settings {
            grid_x_cells: 10,
            grid_y_cells: 20,
            grid_x_max: 10.0,
            grid_y_max: 10.0,
            ..Settings::default()
        };
        s.finalise().unwrap();
        assert_eq!(s.dx, 1.0);
        assert_eq!(s.dy, 0.5);
    }

    #[test]
    fn test_finalise_rejects_bad_extents() {
        let mut s = Settings {
            grid_x_min: 5.0,
            grid_x_max: 5.0,
            ..Settings::default()
        };
        assert!(matches!(s.finalise(), Err(FurnaceError::Config(_))));
    }

    #[test]
    fn test_mask_active_follows_wire_order() {
        let mask = FieldMask::of(&[Field::U, Field::Density]);
        let active: Vec<Field> = mask.active().collect();
        assert_eq!(active, vec![Field::Density, Field::U]);
        assert_eq!(mask.count(), 2);
        assert!(mask.any());
        assert!(!FieldMask::none().any());
    }
}
