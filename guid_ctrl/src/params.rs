//! Guidance control parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for guidance control.
///
/// These are read from the persisted parameter store at initialisation and
/// may be retuned live; all derived gains are recomputed from them every
/// cycle. Out-of-range values are clamped at the point of use.
#[derive(Deserialize, Debug, Clone)]
pub struct Params {

    /// Period in seconds of the tracking loop. This is the primary control
    /// for aggressiveness of turns, and needs to be larger for less
    /// responsive airframes. Range 1-60.
    pub period_s: f64,

    /// Damping ratio of the tracking loop. Increase in small increments if
    /// the aircraft overshoots the path. Range 0.6-1.0.
    pub damping: f64,

    /// Crosstrack error integrator gain. Applied to the crosstrack error to
    /// converge it to zero when travelling straight. Set to zero to
    /// disable. Range 0-0.1.
    pub xtrack_i_gain: f64,

    /// Sea-level bank angle limit for a continuous loiter, in degrees, used
    /// to derive airframe loading limits at altitude. Setting to zero
    /// scales the loiter radius directly with altitude instead. Range 0-89.
    pub loiter_bank_limit_deg: f64,

    /// Minimum height in meters of the fallback segment flown when the 3D
    /// loiter frame degenerates to a line.
    pub min_fallback_height_m: f64,

    /// Tether extension in meters above which the restoring tension force
    /// engages.
    pub tether_trigger_len_m: f64,

    /// Demanded tether length in meters.
    pub tether_demand_len_m: f64,

    /// Spring constant of the tether tension model.
    pub tether_spring_coeff: f64,

    /// Scale from tether spring force to lateral acceleration.
    pub tether_accel_scale: f64,

    /// Enable the capture/circle crossover in the tether tracker. The
    /// flight heritage of this tracker is circle-mode only; enabling
    /// capture mode has not been flight proven.
    pub tether_capture_enabled: bool,

    /// Gain table artifact file, relative to the params directory. When
    /// not set the built-in table is used.
    pub gain_table_file: Option<String>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    /// Default parameters, matching the shipped parameter file.
    fn default() -> Self {
        Self {
            period_s: 17.0,
            damping: 0.75,
            xtrack_i_gain: 0.02,
            loiter_bank_limit_deg: 0.0,
            min_fallback_height_m: 20.0,
            tether_trigger_len_m: 390.0,
            tether_demand_len_m: 400.0,
            tether_spring_coeff: 2.0,
            tether_accel_scale: 0.5138,
            tether_capture_enabled: false,
            gain_table_file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_deserialise() {
        let params: Params = toml::from_str(
            r#"
            period_s = 17.0
            damping = 0.75
            xtrack_i_gain = 0.02
            loiter_bank_limit_deg = 0.0
            min_fallback_height_m = 20.0
            tether_trigger_len_m = 390.0
            tether_demand_len_m = 400.0
            tether_spring_coeff = 2.0
            tether_accel_scale = 0.5138
            tether_capture_enabled = false
            "#
        ).unwrap();

        assert_eq!(params.period_s, 17.0);
        assert_eq!(params.damping, 0.75);
        assert!(params.gain_table_file.is_none());
        assert!(!params.tether_capture_enabled);
    }
}
