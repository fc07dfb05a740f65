//! Degenerate guidance modes: heading hold and level flight
//!
//! Neither mode tracks a path, so neither needs a position fix.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::f64::consts::{FRAC_PI_2, PI, SQRT_2};

// Internal
use crate::state::{GuidCtrl, OutputData};
use util::maths::wrap_pi;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl GuidCtrl {
    /// Hold the commanded heading.
    pub(crate) fn calc_heading_hold(&mut self, heading_rad: f64) {
        // normalised frequency of the heading loop. Deriving it from the
        // period alone keeps heading-hold tuning independent of the path
        // damping.
        let omega_a = SQRT_2 * PI / self.params.period_s.max(1.0);

        let target_bearing = wrap_pi(heading_rad);
        let nu = wrap_pi(target_bearing - self.input.ahrs.yaw());

        let ground_speed = self.input.ahrs.ground_vel_ne.norm();

        // L1 distance adjusted to maintain a constant tracking loop
        // frequency
        self.l1_dist_m = ground_speed / omega_a;
        let v_omega_a = ground_speed * omega_a;

        self.report.l1_dist_m = self.l1_dist_m;

        let nu_limited = nu.clamp(-FRAC_PI_2, FRAC_PI_2);

        self.commit(OutputData {
            lat_accel_dem_ms2: 2.0 * nu_limited.sin() * v_omega_a,
            crosstrack_err_m: 0.0,
            bearing_err_rad: nu,
            nav_bearing_rad: target_bearing,
            target_bearing_rad: target_bearing,
            // capture status is always false during heading hold
            on_circle: false,
            desired_loc: None,
            data_stale: false,
        });
    }

    /// Fly level on the current heading; used when no guidance target is
    /// active.
    pub(crate) fn calc_level_flight(&mut self) {
        let yaw = self.input.ahrs.yaw();

        self.commit(OutputData {
            lat_accel_dem_ms2: 0.0,
            crosstrack_err_m: 0.0,
            bearing_err_rad: 0.0,
            nav_bearing_rad: yaw,
            target_bearing_rad: wrap_pi(yaw),
            on_circle: false,
            desired_loc: None,
            data_stale: false,
        });
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::state::test_util::*;
    use crate::state::{GuidanceCmd, InputData};
    use nalgebra::Vector2;
    use util::module::State;

    #[test]
    fn test_heading_hold() {
        let mut ctrl = GuidCtrl::default();

        // heading north, commanded east, 20 m/s
        let (out, report) = ctrl
            .proc(&InputData {
                time_s: 0.0,
                ahrs: ahrs_at(0.0, 0.0, Vector2::new(20.0, 0.0), 0.0),
                cmd: GuidanceCmd::HeadingHold { heading_rad: FRAC_PI_2 },
            })
            .unwrap();

        let omega_a = SQRT_2 * PI / 17.0;
        assert!((report.l1_dist_m - 20.0 / omega_a).abs() < 1e-9);
        assert!((out.bearing_err_rad - FRAC_PI_2).abs() < 1e-9);
        assert!(
            (out.lat_accel_dem_ms2 - 2.0 * 20.0 * omega_a).abs() < 1e-9
        );
        assert_eq!(out.crosstrack_err_m, 0.0);
        assert!(!out.on_circle);
    }

    #[test]
    fn test_heading_hold_wraps_error() {
        let mut ctrl = GuidCtrl::default();

        // heading 170 degrees, commanded -170 degrees: the error wraps to
        // 20 degrees, not -340
        let (out, _) = ctrl
            .proc(&InputData {
                time_s: 0.0,
                ahrs: ahrs_at(
                    0.0,
                    0.0,
                    Vector2::new(20.0, 0.0),
                    (170.0f64).to_radians()
                ),
                cmd: GuidanceCmd::HeadingHold {
                    heading_rad: (-170.0f64).to_radians(),
                },
            })
            .unwrap();

        assert!(
            (out.bearing_err_rad - (20.0f64).to_radians()).abs() < 1e-9
        );
    }

    #[test]
    fn test_heading_hold_zero_speed_bounded() {
        let mut ctrl = GuidCtrl::default();

        let (out, _) = ctrl
            .proc(&InputData {
                time_s: 0.0,
                ahrs: ahrs_at(0.0, 0.0, Vector2::zeros(), 0.0),
                cmd: GuidanceCmd::HeadingHold { heading_rad: 1.0 },
            })
            .unwrap();

        assert_eq!(out.lat_accel_dem_ms2, 0.0);
        assert!(out.lat_accel_dem_ms2.is_finite());
    }
}
