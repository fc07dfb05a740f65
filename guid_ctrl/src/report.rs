//! Output and reporting queries
//!
//! Read-only queries against the last completed update. Internally the
//! module works in meters and radians; the integer centidegree conversions
//! live here, at the reporting boundary, and all reported angles are
//! wrapped to +-180 degrees.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
use crate::state::GuidCtrl;
use util::maths::{clamp, lin_map, rad_to_cd, wrap_180_cd};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Standard gravity, m/s².
const GRAVITY_MSS: f64 = 9.80665;

/// Floor on cos(pitch) in the bank angle conversion.
const COS_PITCH_MIN: f64 = 0.1;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl GuidCtrl {
    /// Bank angle in centidegrees needed to achieve the tracking demand of
    /// the last update, clamped to +-9000.
    pub fn nav_roll_cd(&self) -> i32 {
        let bank_rad = (self.output.lat_accel_dem_ms2 / GRAVITY_MSS).atan()
            / self.input.ahrs.pitch_rad.cos().max(COS_PITCH_MIN);
        clamp(&rad_to_cd(bank_rad), &-9000.0, &9000.0) as i32
    }

    /// Lateral acceleration demand of the last update, m/s².
    pub fn lateral_acceleration(&self) -> f64 {
        self.output.lat_accel_dem_ms2
    }

    /// Bearing from the aircraft to the L1 reference point, centidegrees.
    pub fn nav_bearing_cd(&self) -> i32 {
        wrap_180_cd(rad_to_cd(self.output.nav_bearing_rad)) as i32
    }

    /// Bearing error angle, centidegrees, positive to the left of track.
    pub fn bearing_error_cd(&self) -> i32 {
        rad_to_cd(self.output.bearing_err_rad) as i32
    }

    /// Bearing from the aircraft to the active target, centidegrees.
    pub fn target_bearing_cd(&self) -> i32 {
        wrap_180_cd(rad_to_cd(self.output.target_bearing_rad)) as i32
    }

    /// True while established on the loiter circle.
    pub fn reached_loiter_target(&self) -> bool {
        self.output.on_circle
    }

    /// True when the last cycle had no position fix and held its outputs.
    pub fn data_is_stale(&self) -> bool {
        self.output.data_stale
    }

    /// The distance before a waypoint at which a 90 degree turn should
    /// begin, m.
    pub fn turn_distance(&self, wp_radius_m: f64) -> f64 {
        let eas2tas = self.input.ahrs.eas2tas;
        (wp_radius_m * eas2tas * eas2tas).min(self.l1_dist_m)
    }

    /// Approximate turn distance for the given turn angle in degrees.
    ///
    /// Angles of 90 degrees or more use the full 90 degree distance;
    /// smaller angles reduce it linearly, so straight-ahead legs do not
    /// consider their waypoint reached early.
    pub fn turn_distance_angle(
        &self,
        wp_radius_m: f64,
        turn_angle_deg: f64
    ) -> f64 {
        let distance_90 = self.turn_distance(wp_radius_m);
        let turn_angle = turn_angle_deg.abs();

        if turn_angle >= 90.0 {
            distance_90
        } else {
            lin_map((0.0, 90.0), (0.0, distance_90), turn_angle)
        }
    }

    /// Effective loiter radius of the last ellipse/3D update, m.
    ///
    /// The ellipse and 3D trackers perturb their tracked boundary every
    /// cycle, so callers must not assume the commanded radius is held
    /// constant; this reports the radius actually in force.
    pub fn effective_loiter_radius(&self) -> f64 {
        self.effective_radius_m
    }

    /// Scale a demanded loiter radius for the current flight condition.
    pub fn loiter_radius(&self, radius_m: f64) -> f64 {
        loiter_radius(
            radius_m,
            self.params.loiter_bank_limit_deg,
            self.input.ahrs.target_airspeed_ms.unwrap_or(0.0),
            self.input.ahrs.eas2tas
        )
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Scale a demanded loiter radius by the bank-limited sea-level-equivalent
/// radius or by straight altitude (airspeed squared) scaling, whichever is
/// safer.
///
/// A zero bank limit or an unknown target airspeed selects straight
/// altitude scaling, which always protects the airframe.
pub fn loiter_radius(
    radius_m: f64,
    bank_limit_deg: f64,
    target_airspeed_ms: f64,
    eas2tas: f64
) -> f64 {
    // prevent an insane loiter bank limit
    let bank_limit_deg = clamp(&bank_limit_deg, &0.0, &89.0);
    let lat_accel_sea_level = bank_limit_deg.to_radians().tan() * GRAVITY_MSS;

    let eas2tas_sq = eas2tas * eas2tas;

    if bank_limit_deg <= 0.0
        || target_airspeed_ms <= 0.0
        || lat_accel_sea_level <= 0.0
    {
        // missing a sane input for the loading limit, or the user asked
        // for straight scaling with altitude
        radius_m * eas2tas_sq
    } else {
        let sea_level_radius =
            target_airspeed_ms * target_airspeed_ms / lat_accel_sea_level;

        if sea_level_radius > radius_m {
            // the demanded radius is unachievable at the bank limit even
            // at sea level: fall back to straight altitude scaling
            radius_m * eas2tas_sq
        } else {
            // the demanded radius, or the altitude-scaled limit radius,
            // whichever is safer
            (sea_level_radius * eas2tas_sq).max(radius_m)
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
