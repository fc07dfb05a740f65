//! # Gain scheduler
//!
//! The scheduler discretises the crosstrack error into a small state space
//! and looks up a multiplier for the L1 law constant from a table trained
//! offline against logged flights (see the `train_exec` executable). It is
//! a pure, stateless read: no learning happens in the control loop, and the
//! table is immutable after initialisation.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::fs;
use std::path::Path;
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of discrete crosstrack-error states.
pub const NUM_ERROR_STATES: usize = 3;

/// Number of law-gain choices per state.
pub const NUM_GAIN_ACTIONS: usize = 3;

/// Multiplier on the L1 law constant selected by each action.
///
/// The trained actions correspond to law constants of 3.8, 4.0 and 6.0
/// against the 2D baseline of 4.0.
pub const ACTION_MULTIPLIERS: [f64; NUM_GAIN_ACTIONS] = [0.95, 1.0, 1.5];

/// Half width in meters of the near-zero crosstrack-error band.
const ERROR_BAND_M: f64 = 0.1;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Action-value table produced by the offline trainer.
///
/// Rows are crosstrack-error states, columns are gain choices; the choice
/// with the highest value in the current state's row wins.
#[derive(Debug, Clone)]
pub struct GainTable {
    values: [[f64; NUM_GAIN_ACTIONS]; NUM_ERROR_STATES],
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs while loading a gain table artifact.
#[derive(Debug, Error)]
pub enum GainTableError {
    #[error("Cannot read the gain table file: {0}")]
    FileReadError(std::io::Error),

    #[error("Gain table entry at row {0}, column {1} is missing or invalid")]
    MalformedEntry(usize, usize),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for GainTable {
    /// Built-in table, matching the shipped artifact.
    fn default() -> Self {
        Self {
            values: [
                [0.0, 0.0, 500.0],
                [0.0, 500.0, 400.0],
                [0.0, 0.0, 500.0],
            ],
        }
    }
}

impl GainTable {
    /// Load a table from the plain-text artifact written by the offline
    /// trainer: one whitespace-separated row of action values per error
    /// state.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, GainTableError> {
        let text = fs::read_to_string(path)
            .map_err(GainTableError::FileReadError)?;

        let mut values = [[0f64; NUM_GAIN_ACTIONS]; NUM_ERROR_STATES];
        let mut rows = text.lines().filter(|l| !l.trim().is_empty());

        for (i, row) in values.iter_mut().enumerate() {
            let line = rows
                .next()
                .ok_or(GainTableError::MalformedEntry(i, 0))?;
            let mut entries = line.split_whitespace();

            for (j, value) in row.iter_mut().enumerate() {
                *value = entries
                    .next()
                    .and_then(|e| e.parse().ok())
                    .ok_or(GainTableError::MalformedEntry(i, j))?;
            }
        }

        Ok(Self { values })
    }

    /// Get the multiplier on the L1 law constant for the given crosstrack
    /// error.
    pub fn multiplier(&self, xtrack_err_m: f64) -> f64 {
        let row = &self.values[error_state(xtrack_err_m)];

        let mut best = 0;
        for action in 1..NUM_GAIN_ACTIONS {
            if row[action] > row[best] {
                best = action;
            }
        }

        ACTION_MULTIPLIERS[best]
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Map a crosstrack error in meters onto one of the discrete scheduler
/// states: below the near-zero band, within it, or above it.
///
/// This mapping is shared with the offline trainer so that states seen in
/// training line up with states seen in flight.
pub fn error_state(xtrack_err_m: f64) -> usize {
    if xtrack_err_m < -ERROR_BAND_M {
        0
    } else if xtrack_err_m <= ERROR_BAND_M {
        1
    } else {
        2
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_state() {
        assert_eq!(error_state(-5.0), 0);
        assert_eq!(error_state(-0.11), 0);
        assert_eq!(error_state(-0.1), 1);
        assert_eq!(error_state(0.0), 1);
        assert_eq!(error_state(0.1), 1);
        assert_eq!(error_state(0.11), 2);
        assert_eq!(error_state(25.0), 2);
    }

    #[test]
    fn test_default_table_multipliers() {
        let table = GainTable::default();

        // best actions of the shipped table: state 0 -> action 2,
        // state 1 -> action 1, state 2 -> action 2
        assert_eq!(table.multiplier(-10.0), 1.5);
        assert_eq!(table.multiplier(0.0), 1.0);
        assert_eq!(table.multiplier(10.0), 1.5);
    }

    #[test]
    fn test_load() {
        let mut path = std::env::temp_dir();
        path.push("guid_ctrl_gain_table_test.txt");
        std::fs::write(&path, "1 2 3\n4 6 5\n9 8 7\n").unwrap();

        let table = GainTable::load(&path).unwrap();
        assert_eq!(table.multiplier(-10.0), ACTION_MULTIPLIERS[2]);
        assert_eq!(table.multiplier(0.0), ACTION_MULTIPLIERS[1]);
        assert_eq!(table.multiplier(10.0), ACTION_MULTIPLIERS[0]);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_malformed() {
        let mut path = std::env::temp_dir();
        path.push("guid_ctrl_gain_table_malformed_test.txt");
        std::fs::write(&path, "1 2 3\n4 nope 5\n9 8 7\n").unwrap();

        assert!(GainTable::load(&path).is_err());

        std::fs::remove_file(&path).unwrap();
    }
}
