//! Derived loop gains
//!
//! All gains are recomputed from the current parameters on every cycle, so
//! that live retuning takes effect immediately; nothing is cached between
//! cycles.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
use crate::params::Params;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// L1 law constant for the straight-segment and circular laws.
pub(crate) const LAW_CONST_2D: f64 = 4.0;

/// L1 law constant for the elliptical and 3D laws.
pub(crate) const LAW_CONST_3D: f64 = 8.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Gains of the guidance loop for one cycle.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoopGains {
    /// Natural frequency of the tracking loop, rad/s
    pub omega: f64,

    /// Proportional gain of the circle-tracking PD loop
    pub kx: f64,

    /// Damping gain of the circle-tracking PD loop
    pub kv: f64,

    /// L1 guidance law gain
    pub k_l1: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LoopGains {
    /// Derive the loop gains from the parameters for the given law constant
    /// and gain-scheduler multiplier.
    pub(crate) fn derive(params: &Params, law_const: f64, sched_mult: f64) -> Self {
        // Parameter range floor keeps omega finite for any stored value
        let period_s = params.period_s.max(1.0);
        let omega = std::f64::consts::TAU / period_s;

        Self {
            omega,
            kx: omega * omega,
            kv: 2.0 * params.damping * omega,
            k_l1: law_const * params.damping * params.damping * sched_mult,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
