//! Straight-segment tracking law
//!
//! Point-to-point leg tracking. The aircraft's position relative to the
//! segment selects one of three regions: behind the start waypoint and
//! facing away (steer straight at the start), past the end waypoint (steer
//! straight at the end), or on-segment (L1 law with a bounded integral
//! trim on the capture angle).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::f64::consts::{FRAC_1_PI, FRAC_PI_2};

// Internal
use crate::gains::{LoopGains, LAW_CONST_2D};
use crate::state::{GuidCtrl, OutputData};
use util::{maths::wrap_pi, nav::Location};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Groundspeed floor for the segment law, m/s. Below this the heading
/// vector stands in for the velocity direction.
const GROUNDSPEED_MIN_MS: f64 = 0.1;

/// Sine of the 45 degree track capture angle limit.
const SINE_NU1_LIMIT: f64 = 0.7071;

/// Segments shorter than this are treated as zero-length, m.
const SEGMENT_MIN_M: f64 = 1.0e-6;

/// Seconds of travel past the end waypoint before steering straight at it.
const OVERSHOOT_S: f64 = 3.0;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl GuidCtrl {
    /// Track the segment from `prev` to `next`.
    ///
    /// `dist_min_m` is a lower limit on the L1 distance, used by callers
    /// that need a minimum turn anticipation regardless of groundspeed.
    pub(crate) fn calc_waypoint(
        &mut self,
        prev: &Location,
        next: &Location,
        dist_min_m: f64
    ) {
        let dt = self.time_step(self.input.time_s);

        let current = match self.input.ahrs.position {
            Some(l) => l,
            // no fix: maintain the last nav/target bearing
            None => {
                self.mark_stale();
                return;
            }
        };

        let target_bearing = current.bearing_to(next);

        let mut gv = self.input.ahrs.ground_vel_ne;
        let mut ground_speed = gv.norm();
        if ground_speed < GROUNDSPEED_MIN_MS {
            // a small velocity in the heading direction lets the law work
            // from the compass at zero GPS velocity
            ground_speed = GROUNDSPEED_MIN_MS;
            gv = self.input.ahrs.heading_unit() * ground_speed;
        }

        // L1 length required for the specified period
        let l1_dist = (FRAC_1_PI
            * self.params.damping
            * self.params.period_s
            * ground_speed)
            .max(dist_min_m);
        self.l1_dist_m = l1_dist;

        // NE position of the next waypoint relative to the previous one;
        // a zero-length segment tracks directly to the destination, or
        // along the heading if the destination is on top of the aircraft
        let mut ab = prev.distance_ne(next);
        let ab_length = ab.norm();
        if ab_length < SEGMENT_MIN_M {
            ab = current.distance_ne(next);
            if ab.norm() < SEGMENT_MIN_M {
                ab = self.input.ahrs.heading_unit();
            }
        }
        let ab = ab.normalize();

        // NE position of the aircraft relative to the previous waypoint
        let a_air = prev.distance_ne(&current);

        // distance to the target track, positive left of track
        let crosstrack_err = a_air.perp(&ab);

        let wp_a_dist = a_air.norm();
        let along_track_dist = a_air.dot(&ab);

        let nu;
        let nav_bearing;

        if wp_a_dist > l1_dist
            && along_track_dist / wp_a_dist.max(1.0) < -SINE_NU1_LIMIT
        {
            // behind a +-135 degree arc centred on the start waypoint and
            // beyond L1 distance from it: use the start as the L1 point
            let a_air_unit = a_air.normalize();
            let xtrack_vel = gv.perp(&(-a_air_unit));
            let ltrack_vel = gv.dot(&(-a_air_unit));
            nu = xtrack_vel.atan2(ltrack_vel);
            nav_bearing = (-a_air_unit[1]).atan2(-a_air_unit[0]);
        } else if along_track_dist > ab_length + ground_speed * OVERSHOOT_S {
            // passed the end waypoint: head straight for it
            let b_air = next.distance_ne(&current);
            let b_air_unit = b_air.normalize();
            let xtrack_vel = gv.perp(&(-b_air_unit));
            let ltrack_vel = gv.dot(&(-b_air_unit));
            nu = xtrack_vel.atan2(ltrack_vel);
            nav_bearing = (-b_air_unit[1]).atan2(-b_air_unit[0]);
        } else {
            // on-segment: Nu2 is the angle of the velocity vector to the
            // segment, Nu1 the angle to the L1 reference point
            let xtrack_vel = gv.perp(&ab);
            let ltrack_vel = gv.dot(&ab);
            let nu2 = xtrack_vel.atan2(ltrack_vel);

            let sine_nu1 = (crosstrack_err / l1_dist.max(0.1))
                .clamp(-SINE_NU1_LIMIT, SINE_NU1_LIMIT);
            let mut nu1 = sine_nu1.asin();

            // push Nu1 harder to converge the steady-state crosstrack
            // error to zero
            nu1 += self.update_xtrack_integral(nu1, dt);

            nu = nu1 + nu2;
            nav_bearing = ab[1].atan2(ab[0]) + nu1;
        }

        let nu = self.prevent_indecision(nu, target_bearing);
        self.last_nu_rad = nu;
        let nu = nu.clamp(-FRAC_PI_2, FRAC_PI_2);

        // scheduled L1 law gain, keyed by this cycle's crosstrack error
        let mult = self.gain_table.multiplier(crosstrack_err);
        let gains = LoopGains::derive(&self.params, LAW_CONST_2D, mult);

        self.report.l1_dist_m = l1_dist;
        self.report.xtrack_i_rad = self.xtrack_i_rad;

        self.commit(OutputData {
            lat_accel_dem_ms2: gains.k_l1 * ground_speed * ground_speed
                / l1_dist.max(0.1)
                * nu.sin(),
            crosstrack_err_m: crosstrack_err,
            bearing_err_rad: nu,
            nav_bearing_rad: wrap_pi(nav_bearing),
            target_bearing_rad: target_bearing,
            // capture status is always false during waypoint following
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
    use crate::state::{GuidanceCmd, InputData, XTRACK_I_LIMIT_RAD};
    use nalgebra::Vector2;
    use util::module::State;

    fn segment_cmd(dist_min_m: f64) -> GuidanceCmd {
        GuidanceCmd::Waypoint {
            prev: origin(),
            next: local_ne(1000.0, 0.0),
            dist_min_m,
        }
    }

    #[test]
    fn test_l1_distance() {
        let mut ctrl = GuidCtrl::default();

        let mut last_l1 = 0.0;
        for speed in &[5.0, 10.0, 20.0, 30.0] {
            let (_, report) = ctrl
                .proc(&InputData {
                    time_s: 0.0,
                    ahrs: ahrs_at(0.0, -50.0, Vector2::new(*speed, 0.0), 0.0),
                    cmd: segment_cmd(0.0),
                })
                .unwrap();

            let expected = FRAC_1_PI * 0.75 * 17.0 * speed;
            assert!((report.l1_dist_m - expected).abs() < 1e-9);

            // monotonically increasing in groundspeed
            assert!(report.l1_dist_m > last_l1);
            last_l1 = report.l1_dist_m;
        }

        // the minimum capture distance takes over at low speed
        let (_, report) = ctrl
            .proc(&InputData {
                time_s: 0.0,
                ahrs: ahrs_at(0.0, -50.0, Vector2::new(5.0, 0.0), 0.0),
                cmd: segment_cmd(200.0),
            })
            .unwrap();
        assert_eq!(report.l1_dist_m, 200.0);
    }

    #[test]
    fn test_segment_scenario() {
        let mut ctrl = GuidCtrl::default();

        // segment running 1000 m north, aircraft 50 m west of the start,
        // heading north at 20 m/s
        let (out, _) = ctrl
            .proc(&InputData {
                time_s: 0.0,
                ahrs: ahrs_at(0.0, -50.0, Vector2::new(20.0, 0.0), 0.0),
                cmd: segment_cmd(0.0),
            })
            .unwrap();

        // west of a northbound track is left of track: positive crosstrack
        assert!((out.crosstrack_err_m - 50.0).abs() < 1e-6);
        assert!(!out.on_circle);
        assert!(!out.data_stale);

        // the demand is a right turn, back toward the line
        assert!(out.lat_accel_dem_ms2 > 0.0);

        // Nu1 = asin(50 / L1), Nu2 = 0, scheduled gain 1.5 above the band
        let l1 = FRAC_1_PI * 0.75 * 17.0 * 20.0;
        let nu1 = (50.0 / l1).asin();
        assert!((out.bearing_err_rad - nu1).abs() < 1e-9);
        let expected = 1.5 * 4.0 * 0.75 * 0.75 * 400.0 / l1 * nu1.sin();
        assert!((out.lat_accel_dem_ms2 - expected).abs() < 1e-6);
    }

    #[test]
    fn test_behind_start_steers_at_start() {
        let mut ctrl = GuidCtrl::default();

        // 200 m south of the start, flying north straight at it
        let (out, _) = ctrl
            .proc(&InputData {
                time_s: 0.0,
                ahrs: ahrs_at(-200.0, 0.0, Vector2::new(20.0, 0.0), 0.0),
                cmd: segment_cmd(0.0),
            })
            .unwrap();

        // already heading at the start waypoint: no turn demanded
        assert!(out.lat_accel_dem_ms2.abs() < 1e-9);
        assert!(out.nav_bearing_rad.abs() < 1e-9);
    }

    #[test]
    fn test_past_end_steers_at_end() {
        let mut ctrl = GuidCtrl::default();

        // 100 m beyond the end waypoint, still flying north away from it
        let (out, _) = ctrl
            .proc(&InputData {
                time_s: 0.0,
                ahrs: ahrs_at(1100.0, 0.0, Vector2::new(20.0, 0.0), 0.0),
                cmd: segment_cmd(0.0),
            })
            .unwrap();

        // the end waypoint is dead astern
        assert!(
            (out.nav_bearing_rad.abs() - std::f64::consts::PI).abs() < 1e-6
        );
        assert!(out.lat_accel_dem_ms2.abs() > 0.0);
    }

    #[test]
    fn test_zero_length_segment_tracks_destination() {
        let mut ctrl = GuidCtrl::default();

        let (out, _) = ctrl
            .proc(&InputData {
                time_s: 0.0,
                ahrs: ahrs_at(0.0, -50.0, Vector2::new(20.0, 0.0), 0.0),
                cmd: GuidanceCmd::Waypoint {
                    prev: local_ne(500.0, 0.0),
                    next: local_ne(500.0, 0.0),
                    dist_min_m: 0.0,
                },
            })
            .unwrap();

        assert!(out.lat_accel_dem_ms2.is_finite());
        assert!(out.crosstrack_err_m.is_finite());
    }

    #[test]
    fn test_integral_bounded_and_reset_on_retune() {
        let mut ctrl = GuidCtrl::default();

        // 5 m of crosstrack: the capture angle stays below 5 degrees so
        // the integrator engages
        let ahrs = ahrs_at(0.0, -5.0, Vector2::new(20.0, 0.0), 0.0);

        let mut report = Default::default();
        for i in 0..10_000 {
            let (_, r) = ctrl
                .proc(&InputData {
                    time_s: i as f64 * 0.05,
                    ahrs,
                    cmd: segment_cmd(0.0),
                })
                .unwrap();
            report = r;
            assert!(r.xtrack_i_rad.abs() <= XTRACK_I_LIMIT_RAD);
        }

        // the accumulator saturates at the clip level for this history
        assert!((report.xtrack_i_rad - XTRACK_I_LIMIT_RAD).abs() < 1e-9);

        // retuning the gain resets the accumulator on the next cycle
        ctrl.params.xtrack_i_gain = 0.03;
        let (_, report) = ctrl
            .proc(&InputData {
                time_s: 500.1,
                ahrs,
                cmd: segment_cmd(0.0),
            })
            .unwrap();
        assert_eq!(report.xtrack_i_rad, 0.0);

        // disabling the gain keeps it at zero
        ctrl.params.xtrack_i_gain = 0.0;
        let (_, report) = ctrl
            .proc(&InputData {
                time_s: 500.15,
                ahrs,
                cmd: segment_cmd(0.0),
            })
            .unwrap();
        assert_eq!(report.xtrack_i_rad, 0.0);
    }
}
