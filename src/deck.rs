//! Input deck parser
//!
//! The deck is plain text, one directive per line: `key value` pairs
//! (`key=value` is accepted too), `state N ...` region lines, and
//! comments starting with `!`, `#` or `*`. Unknown keys are logged and
//! skipped; malformed values are fatal.

use tracing::warn;

use crate::error::FurnaceError;
use crate::settings::{
    BackendKind, Coefficient, Geometry, RecoveryStrategy, Settings, Solver, State,
};

/// Parse a whole deck into settings plus the ordered state list.
///
/// The returned settings are already finalised (derived quantities
/// computed, values validated).
pub fn parse(text: &str) -> Result<(Settings, Vec<State>), FurnaceError> {
    let mut settings = Settings::default();
    let mut states: Vec<(usize, State)> = Vec::new();

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('!') || line.starts_with('#') || line.starts_with('*')
        {
            continue;
        }

        // Normalise `key=value` to `key value`
        let normalised = line.replace('=', " ");
        let tokens: Vec<&str> = normalised.split_whitespace().collect();
        let Some(first) = tokens.first() else {
            continue;
        };
        let key = first.to_ascii_lowercase();

        if key == "state" {
            let (index, state) = parse_state(&tokens, lineno + 1)?;
            states.push((index, state));
            continue;
        }

        apply_option(&mut settings, &key, &tokens[1..], lineno + 1)?;
    }

    states.sort_by_key(|(index, _)| *index);
    let states: Vec<State> = states.into_iter().map(|(_, s)| s).collect();

    settings.finalise()?;
    Ok((settings, states))
}

fn deck_err(line: usize, reason: impl Into<String>) -> FurnaceError {
    FurnaceError::Deck {
        line,
        reason: reason.into(),
    }
}

fn value<'a>(tokens: &[&'a str], line: usize, key: &str) -> Result<&'a str, FurnaceError> {
    tokens
        .first()
        .copied()
        .ok_or_else(|| deck_err(line, format!("missing value for `{key}`")))
}

fn parse_num<T: std::str::FromStr>(raw: &str, line: usize, key: &str) -> Result<T, FurnaceError> {
    raw.parse()
        .map_err(|_| deck_err(line, format!("invalid value `{raw}` for `{key}`")))
}

fn parse_bool(raw: &str, line: usize, key: &str) -> Result<bool, FurnaceError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "on" | "1" => Ok(true),
        "false" | "off" | "0" => Ok(false),
        _ => Err(deck_err(line, format!("invalid flag `{raw}` for `{key}`"))),
    }
}

fn apply_option(
    settings: &mut Settings,
    key: &str,
    rest: &[&str],
    line: usize,
) -> Result<(), FurnaceError> {
    match key {
        "grid_x_cells" => settings.grid_x_cells = parse_num(value(rest, line, key)?, line, key)?,
        "grid_y_cells" => settings.grid_y_cells = parse_num(value(rest, line, key)?, line, key)?,
        "grid_x_min" => settings.grid_x_min = parse_num(value(rest, line, key)?, line, key)?,
        "grid_y_min" => settings.grid_y_min = parse_num(value(rest, line, key)?, line, key)?,
        "grid_x_max" => settings.grid_x_max = parse_num(value(rest, line, key)?, line, key)?,
        "grid_y_max" => settings.grid_y_max = parse_num(value(rest, line, key)?, line, key)?,
        "dt_init" => settings.dt_init = parse_num(value(rest, line, key)?, line, key)?,
        "end_time" => settings.end_time = parse_num(value(rest, line, key)?, line, key)?,
        "end_step" => settings.end_step = parse_num(value(rest, line, key)?, line, key)?,
        "max_iters" => settings.max_iters = parse_num(value(rest, line, key)?, line, key)?,
        "halo_depth" => settings.halo_depth = parse_num(value(rest, line, key)?, line, key)?,
        "eps" => settings.eps = parse_num(value(rest, line, key)?, line, key)?,
        "eps_lim" => settings.eps_lim = parse_num(value(rest, line, key)?, line, key)?,
        "presteps" => settings.presteps = parse_num(value(rest, line, key)?, line, key)?,
        "ppcg_inner_steps" => {
            settings.ppcg_inner_steps = parse_num(value(rest, line, key)?, line, key)?
        }
        "preconditioner" => settings.preconditioner = parse_bool(value(rest, line, key)?, line, key)?,
        "summary_frequency" => {
            settings.summary_frequency = parse_num(value(rest, line, key)?, line, key)?
        }
        "visit_frequency" => {
            settings.visit_frequency = parse_num(value(rest, line, key)?, line, key)?
        }
        "solver" => {
            settings.solver = match value(rest, line, key)?.to_ascii_uppercase().as_str() {
                "JACOBI" => Solver::Jacobi,
                "CG" => Solver::Cg,
                "CHEBY" => Solver::Cheby,
                "PPCG" => Solver::Ppcg,
                other => return Err(deck_err(line, format!("unknown solver `{other}`"))),
            }
        }
        "coefficient" => {
            settings.coefficient = match value(rest, line, key)?.to_ascii_uppercase().as_str() {
                "CONDUCTIVITY" => Coefficient::Conductivity,
                "RECIP_CONDUCTIVITY" => Coefficient::RecipConductivity,
                other => return Err(deck_err(line, format!("unknown coefficient `{other}`"))),
            }
        }
        "backend" => {
            settings.backend = match value(rest, line, key)?.to_ascii_lowercase().as_str() {
                "serial" => BackendKind::Serial,
                "threaded" => BackendKind::Threaded,
                other => return Err(deck_err(line, format!("unknown backend `{other}`"))),
            }
        }
        // Bare `ft` enables fault tolerance
        "ft" => {
            settings.ft = match rest.first().copied() {
                Some(raw) => parse_bool(raw, line, key)?,
                None => true,
            }
        }
        "ft_recv_strategy" => {
            settings.ft_recv_strategy = match value(rest, line, key)?
                .to_ascii_uppercase()
                .as_str()
            {
                "STATIC" => RecoveryStrategy::Static,
                "MIRROR" => RecoveryStrategy::Mirror,
                "BRIDGE" => RecoveryStrategy::Bridge,
                "INTERPOLATION" => RecoveryStrategy::Interpolation,
                other => return Err(deck_err(line, format!("unknown recovery strategy `{other}`"))),
            }
        }
        "ft_recv_static_value" => {
            settings.ft_recv_static_value = parse_num(value(rest, line, key)?, line, key)?
        }
        "ft_recv_interpolation_factor" => {
            settings.ft_recv_interpolation_factor = parse_num(value(rest, line, key)?, line, key)?
        }
        "with_ft_kill_x" => settings.with_ft_kill_x = parse_num(value(rest, line, key)?, line, key)?,
        "with_ft_kill_y" => settings.with_ft_kill_y = parse_num(value(rest, line, key)?, line, key)?,
        "with_ft_kill_iter" => {
            settings.with_ft_kill_iter = parse_num(value(rest, line, key)?, line, key)?
        }
        unknown => {
            warn!(target: "deck", key = unknown, line, "ignoring unknown deck option");
        }
    }
    Ok(())
}

/// Parse a `state N density D energy E [geometry ...]` line.
fn parse_state(tokens: &[&str], line: usize) -> Result<(usize, State), FurnaceError> {
    if tokens.len() < 2 {
        return Err(deck_err(line, "state line missing index"));
    }
    let index: usize = parse_num(tokens[1], line, "state")?;
    if index == 0 {
        return Err(deck_err(line, "state indices are 1-based"));
    }

    let mut state = State::default();
    let mut it = tokens[2..].iter();
    while let Some(&attr) = it.next() {
        let attr = attr.to_ascii_lowercase();
        let raw = *it
            .next()
            .ok_or_else(|| deck_err(line, format!("missing value for state attribute `{attr}`")))?;
        match attr.as_str() {
            "density" => state.density = parse_num(raw, line, "density")?,
            "energy" => state.energy = parse_num(raw, line, "energy")?,
            "x_min" | "xmin" => state.x_min = parse_num(raw, line, "x_min")?,
            "y_min" | "ymin" => state.y_min = parse_num(raw, line, "y_min")?,
            "x_max" | "xmax" => state.x_max = parse_num(raw, line, "x_max")?,
            "y_max" | "ymax" => state.y_max = parse_num(raw, line, "y_max")?,
            "radius" => state.radius = parse_num(raw, line, "radius")?,
            "geometry" => {
                state.geometry = match raw.to_ascii_lowercase().as_str() {
                    "rectangle" | "rectangular" => Geometry::Rectangular,
                    "circle" | "circular" => Geometry::Circular,
                    "point" => Geometry::Point,
                    other => {
                        return Err(deck_err(line, format!("unknown geometry `{other}`")));
                    }
                }
            }
            other => {
                return Err(deck_err(line, format!("unknown state attribute `{other}`")));
            }
        }
    }

    Ok((index, state))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECK: &str = "\
! sample problem
grid_x_cells 10
grid_y_cells=10
grid_x_max 10.0
grid_y_max 10.0
dt_init 0.004
end_step 5
max_iters 1000
eps 1.0e-15
solver jacobi
state 1 density 100.0 energy 0.0001
state 2 density 0.1 energy 25.0 geometry rectangle x_min 0.0 x_max 10.0 y_min 0.0 y_max 2.0
ft
ft_recv_strategy STATIC
ft_recv_static_value 0.5
";

    #[test]
    fn test_parse_full_deck() {
        let (settings, states) = parse(DECK).unwrap();
        assert_eq!(settings.grid_x_cells, 10);
        assert_eq!(settings.grid_y_cells, 10);
        assert_eq!(settings.dt_init, 0.004);
        assert_eq!(settings.end_step, 5);
        assert_eq!(settings.solver, Solver::Jacobi);
        assert!(settings.ft);
        assert_eq!(settings.ft_recv_strategy, RecoveryStrategy::Static);
        assert_eq!(settings.ft_recv_static_value, 0.5);
        assert_eq!(settings.dx, 1.0);

        assert_eq!(states.len(), 2);
        assert_eq!(states[0].density, 100.0);
        assert_eq!(states[1].geometry, Geometry::Rectangular);
        assert_eq!(states[1].y_max, 2.0);
    }

    #[test]
    fn test_states_sorted_by_index() {
        let text = "\
state 2 density 0.1 energy 25.0 geometry circular radius 2.0
state 1 density 100.0 energy 0.0001
";
        let (_, states) = parse(text).unwrap();
        assert_eq!(states[0].density, 100.0);
        assert_eq!(states[1].geometry, Geometry::Circular);
    }

    #[test]
    fn test_unknown_key_is_ignored() {
        assert!(parse("no_such_option 3\n").is_ok());
    }

    #[test]
    fn test_malformed_value_is_fatal() {
        let err = parse("grid_x_cells banana\n").unwrap_err();
        assert!(matches!(err, FurnaceError::Deck { line: 1, .. }));
    }

    #[test]
    fn test_bad_solver_is_fatal() {
        assert!(parse("solver gauss\n").is_err());
    }
}
