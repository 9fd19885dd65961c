//! Error types for the solver

use thiserror::Error;

/// Error type covering every fatal failure class of the solver
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FurnaceError {
    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Malformed input deck line
    #[error("input deck line {line}: {reason}")]
    Deck { line: usize, reason: String },

    /// No divisor pair tiles the grid over the requested rank count
    #[error("failed to decompose {x_cells}x{y_cells} cells over {num_ranks} ranks")]
    Decompose {
        x_cells: usize,
        y_cells: usize,
        num_ranks: usize,
    },

    /// Requested solver is recognised but not implemented
    #[error("solver {0} is not implemented; use JACOBI")]
    UnsupportedSolver(String),

    /// Catastrophic transport failure (invalid communicator state,
    /// reduction could not complete, run aborted)
    #[error("transport failure: {0}")]
    Transport(String),

    /// Residual became NaN/Inf or the solve otherwise blew up
    #[error("numerical failure: {0}")]
    Numerical(String),

    /// Output file could not be written
    #[error("i/o failure: {0}")]
    Io(String),
}

impl FurnaceError {
    /// Process exit code the binary maps this error to
    pub fn exit_code(&self) -> i32 {
        match self {
            FurnaceError::Numerical(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        let err = FurnaceError::Decompose {
            x_cells: 10,
            y_cells: 10,
            num_ranks: 7,
        };
        let msg = err.to_string();
        assert!(msg.contains("10x10"));
        assert!(msg.contains("7 ranks"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(FurnaceError::Config("bad".into()).exit_code(), 1);
        assert_eq!(FurnaceError::Numerical("nan".into()).exit_code(), 2);
    }
}
