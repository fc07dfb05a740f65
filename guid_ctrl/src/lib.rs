//! # Lateral guidance control module
//!
//! This crate implements the lateral guidance laws of the Skua flight
//! control software. Given the current state estimate (position, velocity,
//! attitude) and the path commanded for the active flight-plan leg, it
//! produces a lateral acceleration demand (equivalently a bank angle
//! demand) which drives the aircraft onto and along that path.
//!
//! The core law is the nonlinear L1 guidance logic of Park, Deyst and How
//! ("A New Nonlinear Guidance Logic for Trajectory Tracking", AIAA 2004),
//! modified to:
//!
//! - use PD control for circle tracking, enabling loiter radii smaller than
//!   the L1 length,
//! - set the period and damping of the guidance loop explicitly,
//! - provide explicit control over the track capture angle,
//! - track elliptical and inclined-circle (3D / tethered) loiter paths, and
//! - scale one law gain through a scheduler trained offline against logged
//!   flights (see the `train_exec` executable).
//!
//! One tracking operation is executed per control cycle, selected by the
//! [`GuidanceCmd`] passed in the input data. The module is owned by a single
//! caller and performs no blocking work in its cyclic path; telemetry
//! archiving is best-effort.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod calc_ellipse;
mod calc_heading;
mod calc_loiter;
mod calc_sphere;
mod calc_tether;
mod calc_waypoint;
mod crossover;
pub mod gain_sched;
mod gains;
mod params;
mod report;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use gain_sched::GainTable;
pub use params::Params;
pub use report::loiter_radius;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during initialisation of the module.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("Cannot load the guidance parameters: {0}")]
    ParamLoadError(#[from] util::params::LoadError),

    #[error("Cannot load the gain table: {0}")]
    GainTableError(#[from] gain_sched::GainTableError),
}

/// Possible errors that can occur during cyclic processing of the module.
///
/// Guidance has no fatal errors: a thrown control cycle has flight-safety
/// consequences, so every input combination must produce a finite, bounded
/// demand. Degenerate geometry is substituted silently and a missing
/// position fix holds the previous outputs. This enum is therefore
/// uninhabited; it exists to satisfy the module interface.
#[derive(Debug, thiserror::Error)]
pub enum GuidCtrlError {}
