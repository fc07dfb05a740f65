//! Offline gain-table trainer entry point.
//!
//! Replays logged flights through a tabular Q-learning loop to produce the
//! gain table consumed by the guidance module's gain scheduler. The
//! exchange formats are fixed: the input is a stream of 12-byte
//! little-endian records `{crosstrack_error: f32, gain_choice: f32,
//! reward: f32}` cut from flight logs, and the output is a plain-text
//! table of action values, one row per crosstrack-error state.
//!
//! Nothing here runs in the control loop: the guidance module loads the
//! emitted table once at initialisation and treats it as immutable.
//!
//! Usage: `train_exec [train_logs] [test_logs] [output_table]`, with
//! defaults of `train_flight_logs.dat`, `test_flight_logs.dat` and
//! `trained_gain_table.txt` in the working directory.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::eyre, eyre::WrapErr, Report};
use log::{info, warn};
use rand::Rng;
use std::convert::TryInto;
use std::path::Path;

// Internal
use guid_ctrl::gain_sched::{
    error_state, NUM_ERROR_STATES, NUM_GAIN_ACTIONS
};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of training episodes.
const MAX_EPISODES: usize = 1000;

/// Maximum number of log steps replayed per episode.
const MAX_STEPS: usize = 200;

/// Learning rate.
const ALPHA: f64 = 0.8;

/// Discount factor.
const GAMMA: f64 = 0.95;

/// Exploration rate of the epsilon-greedy policy.
const EPSILON: f64 = 0.1;

/// L1 law-gain choice corresponding to each action. The guidance module's
/// scheduler applies these normalised by the 2D baseline constant of 4.
const ACTION_GAINS: [f64; NUM_GAIN_ACTIONS] = [3.8, 4.0, 6.0];

/// Size in bytes of one binary flight-log record.
const RECORD_LEN: usize = 12;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Action-value table being trained.
type QTable = [[f64; NUM_GAIN_ACTIONS]; NUM_ERROR_STATES];

/// One fixed-size record cut from a logged flight.
#[derive(Debug, Clone, Copy)]
struct FlightLog {
    crosstrack_error: f32,
    gain_choice: f32,
    reward: f32,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "train_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Skua FCS Gain Table Trainer\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- FILE PATHS ----

    let args: Vec<String> = std::env::args().collect();
    let train_file = args
        .get(1)
        .map(String::as_str)
        .unwrap_or("train_flight_logs.dat")
        .to_string();
    let test_file = args
        .get(2)
        .map(String::as_str)
        .unwrap_or("test_flight_logs.dat")
        .to_string();
    let output_file = args
        .get(3)
        .map(String::as_str)
        .unwrap_or("trained_gain_table.txt")
        .to_string();

    // ---- TRAINING ----

    let train_logs = load_flight_logs(&train_file)
        .wrap_err("Could not load the training flight logs")?;
    if train_logs.len() <= MAX_STEPS + 1 {
        return Err(eyre!(
            "Not enough training data: {} samples loaded, need more than {}",
            train_logs.len(),
            MAX_STEPS + 1
        ));
    }
    info!("Loaded {} training samples", train_logs.len());

    let mut rng = rand::thread_rng();

    info!("Starting training");
    let q = train_q_table(&train_logs, &mut rng);

    save_q_table(&q, &output_file)
        .wrap_err("Could not save the gain table")?;
    info!("Gain table saved to {:?}", output_file);

    for state in 0..NUM_ERROR_STATES {
        info!(
            "State {}: best action {} (law gain {})",
            state,
            best_action(&q, state),
            ACTION_GAINS[best_action(&q, state)]
        );
    }

    // ---- VALIDATION ----

    match load_flight_logs(&test_file) {
        Ok(test_logs) if !test_logs.is_empty() => {
            info!("Validating against {} test samples", test_logs.len());
            validate_q_table(&q, &test_logs);
        }
        Ok(_) => warn!("No test data available for validation"),
        Err(e) => warn!("Could not load the test flight logs: {}", e),
    }

    Ok(())
}

/// Load a binary flight log file into records.
fn load_flight_logs<P: AsRef<Path>>(path: P) -> Result<Vec<FlightLog>, Report> {
    let bytes = std::fs::read(path.as_ref()).wrap_err_with(|| {
        format!("Cannot read the flight log file {:?}", path.as_ref())
    })?;

    if bytes.len() % RECORD_LEN != 0 {
        warn!(
            "Flight log {:?} has {} trailing bytes, ignoring them",
            path.as_ref(),
            bytes.len() % RECORD_LEN
        );
    }

    Ok(bytes
        .chunks_exact(RECORD_LEN)
        .map(parse_record)
        .collect())
}

/// Parse one fixed-size little-endian record.
fn parse_record(chunk: &[u8]) -> FlightLog {
    FlightLog {
        crosstrack_error: f32::from_le_bytes(
            chunk[0..4].try_into().unwrap()
        ),
        gain_choice: f32::from_le_bytes(chunk[4..8].try_into().unwrap()),
        reward: f32::from_le_bytes(chunk[8..12].try_into().unwrap()),
    }
}

/// Reward shaping for one transition of the replayed log.
fn calculate_reward(crosstrack_error: f32, prev_error: f32) -> f64 {
    let mut reward = 0.0;

    // reward an error decrease
    if crosstrack_error.abs() < prev_error.abs() {
        reward += 10.0;
    }

    // extra reward for holding inside the acceptable band
    if crosstrack_error.abs() < 0.1 {
        reward += 100.0;
    }

    // penalise large errors
    if crosstrack_error.abs() > 0.5 {
        reward -= 50.0;
    }

    reward
}

/// The action with the highest value in the given state.
fn best_action(q: &QTable, state: usize) -> usize {
    let mut best = 0;
    for action in 1..NUM_GAIN_ACTIONS {
        if q[state][action] > q[state][best] {
            best = action;
        }
    }
    best
}

/// Epsilon-greedy action selection.
fn select_action<R: Rng>(q: &QTable, state: usize, rng: &mut R) -> usize {
    if rng.gen::<f64>() < EPSILON {
        rng.gen_range(0..NUM_GAIN_ACTIONS)
    } else {
        best_action(q, state)
    }
}

/// Train a Q-table against the logged flights.
fn train_q_table<R: Rng>(logs: &[FlightLog], rng: &mut R) -> QTable {
    let mut q: QTable = [[0.0; NUM_GAIN_ACTIONS]; NUM_ERROR_STATES];

    for episode in 0..MAX_EPISODES {
        let mut total_reward = 0.0;
        let mut prev_error = 0.0f32;

        // replay a random stretch of the logs
        let start_idx = rng.gen_range(0..logs.len() - MAX_STEPS);

        for step in 0..MAX_STEPS {
            let current_state = error_state(
                logs[start_idx + step].crosstrack_error as f64
            );

            let action = select_action(&q, current_state, rng);

            let next_error = logs[start_idx + step + 1].crosstrack_error;
            let next_state = error_state(next_error as f64);
            let reward = calculate_reward(next_error, prev_error);

            let max_next_q = q[next_state]
                .iter()
                .cloned()
                .fold(f64::MIN, f64::max);

            // Q-learning update
            q[current_state][action] += ALPHA
                * (reward + GAMMA * max_next_q - q[current_state][action]);

            total_reward += reward;
            prev_error = next_error;

            // end the episode early once the target band is reached
            if next_error.abs() < 0.1 {
                break;
            }
        }

        if (episode + 1) % 100 == 0 {
            info!(
                "Episode {}, total reward {}",
                episode + 1,
                total_reward
            );
        }
    }

    q
}

/// Write the trained table as the plain-text artifact consumed by the
/// guidance module's gain scheduler.
fn save_q_table<P: AsRef<Path>>(q: &QTable, path: P) -> Result<(), Report> {
    let mut text = String::new();
    for row in q.iter() {
        for value in row.iter() {
            text.push_str(&format!("{} ", value));
        }
        text.push('\n');
    }

    std::fs::write(path.as_ref(), text).wrap_err_with(|| {
        format!("Cannot write the gain table to {:?}", path.as_ref())
    })
}

/// Report the mean tracking error of the test logs under the trained
/// policy's gain choices.
fn validate_q_table(q: &QTable, test_logs: &[FlightLog]) {
    let mut total_error = 0.0f64;
    let mut mean_logged_gain = 0.0f64;

    for log in test_logs {
        let state = error_state(log.crosstrack_error as f64);
        let action = best_action(q, state);

        total_error += log.crosstrack_error.abs() as f64;
        mean_logged_gain += (log.gain_choice as f64
            - ACTION_GAINS[action])
            .abs();
    }

    let steps = test_logs.len() as f64;
    info!("Average tracking error: {}", total_error / steps);
    info!(
        "Average gain deviation from trained policy: {}",
        mean_logged_gain / steps
    );

    let mut total_reward = 0.0f64;
    let mut prev = 0.0f32;
    for log in test_logs {
        total_reward += log.reward as f64
            + calculate_reward(log.crosstrack_error, prev);
        prev = log.crosstrack_error;
    }
    info!("Mean shaped + logged reward: {}", total_reward / steps);
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use guid_ctrl::gain_sched::ACTION_MULTIPLIERS;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parse_record() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(-1.5f32).to_le_bytes());
        bytes.extend_from_slice(&4.0f32.to_le_bytes());
        bytes.extend_from_slice(&10.0f32.to_le_bytes());

        let record = parse_record(&bytes);
        assert_eq!(record.crosstrack_error, -1.5);
        assert_eq!(record.gain_choice, 4.0);
        assert_eq!(record.reward, 10.0);
    }

    #[test]
    fn test_calculate_reward() {
        // error decreased and inside the band
        assert_eq!(calculate_reward(0.05, 0.2), 110.0);
        // error decreased but still outside the band
        assert_eq!(calculate_reward(0.3, 0.4), 10.0);
        // error grew beyond the penalty threshold
        assert_eq!(calculate_reward(0.8, 0.4), -50.0);
        // error grew but stays moderate
        assert_eq!(calculate_reward(0.3, 0.2), 0.0);
    }

    #[test]
    fn test_best_action() {
        let mut q: QTable = [[0.0; NUM_GAIN_ACTIONS]; NUM_ERROR_STATES];
        q[1] = [1.0, 5.0, 3.0];
        assert_eq!(best_action(&q, 1), 1);
        assert_eq!(best_action(&q, 0), 0);
    }

    #[test]
    fn test_action_gains_match_scheduler_multipliers() {
        // the scheduler's multipliers are these gains normalised by the
        // 2D baseline law constant
        for i in 0..NUM_GAIN_ACTIONS {
            assert!(
                (ACTION_GAINS[i] / 4.0 - ACTION_MULTIPLIERS[i]).abs()
                    < 1e-2
            );
        }
    }

    #[test]
    fn test_train_and_round_trip_artifact() {
        // a synthetic log that repeatedly converges into the target band
        let mut logs = Vec::new();
        for cycle in 0..300 {
            let start = if cycle % 2 == 0 { 1.0f32 } else { -1.0f32 };
            for step in 0..10 {
                logs.push(FlightLog {
                    crosstrack_error: start * (1.0 - step as f32 / 10.0),
                    gain_choice: 4.0,
                    reward: 0.0,
                });
            }
        }

        let mut rng = StdRng::seed_from_u64(42);
        let q = train_q_table(&logs, &mut rng);

        for row in &q {
            for value in row {
                assert!(value.is_finite());
            }
        }

        // the emitted artifact parses back through the scheduler loader
        let mut path = std::env::temp_dir();
        path.push("train_exec_round_trip_table.txt");
        save_q_table(&q, &path).unwrap();
        let table = guid_ctrl::GainTable::load(&path).unwrap();
        let _ = table.multiplier(0.0);
        std::fs::remove_file(&path).unwrap();
    }
}
