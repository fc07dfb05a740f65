//! Capture/circle crossover law
//!
//! The loiter trackers each run two acceleration estimates per cycle: an L1
//! "capture" estimate treating a point as the target, and a PD plus
//! centripetal "circle" estimate tracking the path itself. Switching
//! between them at the point where the two commands cross over gives a
//! seamless handoff with no command discontinuity, instead of a discrete
//! mode flag with hysteresis. This module holds the single implementation
//! shared by the circle, ellipse and 3D trackers.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
use crate::gains::LoopGains;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Inputs of the PD + centripetal circle law, expressed in the local
/// tangent/normal frame of the tracked path.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CircleLaw {
    /// Signed distance from the path, m, positive outside
    pub xtrack_err: f64,

    /// Velocity component along the outer normal, m/s
    pub xtrack_vel: f64,

    /// Velocity component along the path tangent, m/s
    pub tangent_vel: f64,

    /// Curvature of the path at the nearest point, 1/m
    pub curvature: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CircleLaw {
    /// PD correction toward the path: positive when outside the path or
    /// moving outwards.
    pub(crate) fn pd_accel(&self, gains: &LoopGains) -> f64 {
        self.xtrack_err * gains.kx + self.xtrack_vel * gains.kv
    }

    /// Centripetal demand for following the path at the current tangential
    /// speed.
    pub(crate) fn centripetal_accel(&self) -> f64 {
        self.tangent_vel * self.tangent_vel * self.curvature
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Floor the PD demand when flying the wrong way round the path (both the
/// radial-inbound and tangential velocities negative), so the correction
/// cannot steer further in the wrong direction.
pub(crate) fn wrong_way_floor(
    pd_accel: f64,
    ltrack_vel_cap: f64,
    tangent_vel: f64,
) -> f64 {
    if ltrack_vel_cap < 0.0 && tangent_vel < 0.0 {
        pd_accel.max(0.0)
    } else {
        pd_accel
    }
}

/// Select between the capture and circle demands.
///
/// Capture mode is only flown outside the path (`outside`), and only while
/// it demands less turn than the circle law in the direction of travel —
/// the point where the two commands cross over is exactly where the switch
/// happens, so the transfer is seamless. Returns the selected demand and
/// the on-circle flag.
pub(crate) fn select_crossover(
    accel_cap: f64,
    accel_circ: f64,
    direction: f64,
    outside: bool,
    capture_enabled: bool,
) -> (f64, bool) {
    if capture_enabled
        && outside
        && direction * accel_cap < direction * accel_circ
    {
        (accel_cap, false)
    } else {
        (accel_circ, true)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
