//! Tether-anchored 3D loiter tracking law
//!
//! Tracks an inclined circle specified by a plane rotation from an anchor
//! point, for flight on a physical tether. A restoring "tension"
//! pseudo-acceleration engages once the tether extension passes its trigger
//! length and is added directly into the lateral sum. The capture/circle
//! crossover exists in this law but its flight heritage is circle-mode
//! only; it is gated by the `tether_capture_enabled` parameter, which
//! defaults off.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Matrix3, Vector2, Vector3};
use std::f64::consts::{FRAC_1_PI, FRAC_PI_2};

// Internal
use crate::crossover::select_crossover;
use crate::gains::{LoopGains, LAW_CONST_2D};
use crate::state::{GuidCtrl, OutputData, PlaneRotation, TurnDirection};
use util::{
    maths::wrap_pi,
    nav::Location
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Groundspeed floor for the loiter laws, m/s.
const GROUNDSPEED_MIN_MS: f64 = 1.0;

/// Floor on the centripetal-term radius, m.
const RADIUS_MIN_M: f64 = 0.1;

/// Floor on the centripetal projection factor denominators.
const PROJECTION_MIN: f64 = 0.05;

/// Vectors shorter than this are treated as degenerate.
const VECTOR_MIN: f64 = 1.0e-6;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl GuidCtrl {
    /// Loiter on the tether-anchored circle around `center`, whose plane is
    /// given by the rotation angles and matrix relative to the earth frame.
    pub(crate) fn calc_tether(
        &mut self,
        anchor: &Location,
        center: &Location,
        radius_m: f64,
        rotation: &PlaneRotation,
        plane_matrix: &Matrix3<f64>,
        segment_index: i32,
        direction: TurnDirection
    ) {
        let dir = direction.sign();

        let (sin_psi, cos_psi) = rotation.psi_rad.sin_cos();
        let (sin_theta, cos_theta) = rotation.theta_rad.sin_cos();
        let (sin_w, cos_w) = rotation.w_rad.sin_cos();
        let (sin_sigma, cos_sigma) = rotation.sigma_rad.sin_cos();

        let gains = LoopGains::derive(&self.params, LAW_CONST_2D, 1.0);

        let current = match self.input.ahrs.position {
            Some(l) => l,
            // no fix: maintain the last nav/target bearing
            None => {
                self.mark_stale();
                return;
            }
        };

        // tether vector from the anchor to the aircraft
        let tether_vec = anchor.distance_ned(&current);

        let vel_ned = self.input.ahrs.vel_ned.unwrap_or_else(|| {
            let gv = self.input.ahrs.ground_vel_ne;
            Vector3::new(gv[0], gv[1], 0.0)
        });
        let ground_speed =
            Vector2::new(vel_ned[0], vel_ned[1]).norm().max(GROUNDSPEED_MIN_MS);

        // track velocity projected into the circle's plane frame
        let vel_pf = plane_matrix * vel_ned;
        let track_vel = Vector2::new(vel_pf[0], vel_pf[1]);

        // aircraft position relative to the circle center, in the earth
        // frame and projected into the plane frame
        let a_air_ef = center.distance_ned(&current);
        let a_air_pf = plane_matrix * a_air_ef;
        let a_air = Vector2::new(a_air_pf[0], a_air_pf[1]);

        let target_bearing = current.bearing_to(center);

        // unit vector from the center to the aircraft in the plane frame,
        // with the usual degenerate fallbacks
        let a_air_unit = if a_air.norm() > 0.1 {
            a_air.normalize()
        } else if track_vel.norm() < 0.1 {
            self.input.ahrs.heading_unit()
        } else {
            track_vel.normalize()
        };

        // L1 length required for the specified period
        let l1_dist = FRAC_1_PI
            * self.params.damping
            * self.params.period_s
            * ground_speed;
        self.l1_dist_m = l1_dist;

        // capture estimate toward the center, in the plane frame
        let xtrack_vel_cap = a_air_unit.perp(&track_vel);
        let ltrack_vel_cap = -track_vel.dot(&a_air_unit);
        let nu = xtrack_vel_cap.atan2(ltrack_vel_cap);

        let nu = self.prevent_indecision(nu, target_bearing);
        self.last_nu_rad = nu;
        let nu = nu.clamp(-FRAC_PI_2, FRAC_PI_2);

        let accel_cap = gains.k_l1 * ground_speed * ground_speed
            / l1_dist.max(0.1)
            * nu.sin();

        // course angle of the desired track: the circle's tangent at the
        // aircraft's angular position, rotated back into the earth frame
        let v_unit_x = dir
            * (-a_air_unit[1]
                * (cos_w * cos_sigma * cos_theta * cos_psi
                    - sin_w * cos_theta * sin_psi
                    - cos_w * sin_sigma * sin_theta)
                + a_air_unit[0]
                    * (-cos_w * cos_sigma * sin_psi - sin_w * cos_psi));
        let v_unit_y = dir
            * (-a_air_unit[1]
                * (sin_w * cos_sigma * cos_theta * cos_psi
                    + cos_w * cos_theta * sin_psi
                    - sin_w * sin_sigma * sin_theta)
                + a_air_unit[0]
                    * (-sin_w * cos_sigma * sin_psi + cos_w * cos_psi));
        let chi = v_unit_y.atan2(v_unit_x);
        let (sin_chi, cos_chi) = chi.sin_cos();

        // outer normal of the track in the lateral plane
        let n_lat = Vector2::new(v_unit_y, -v_unit_x);

        // desired point on the circle, rotated back into the earth frame
        let radius_pf =
            Vector3::new(radius_m * a_air_unit[0], radius_m * a_air_unit[1], 0.0);
        let ellipse_ef = plane_matrix.transpose() * radius_pf;
        let ellipse_lat = Vector2::new(ellipse_ef[0], ellipse_ef[1]);

        // lateral deviation between the current and desired positions;
        // its projection onto the outer normal signs the crosstrack error
        let air_lat = Vector2::new(a_air_ef[0], a_air_ef[1]);
        let diff_lat = air_lat - ellipse_lat;
        let sgn = if n_lat.dot(&diff_lat) < 0.0 { -1.0 } else { 1.0 };

        // crosstrack velocity: the across-track component of the earth
        // frame velocity in the course frame
        let xtrack_vel_circ = -sin_chi * vel_ned[0] + cos_chi * vel_ned[1];
        let xtrack_err = -sgn * diff_lat.norm();

        // tether tension engages beyond the trigger length
        let tether_len = tether_vec.norm();
        let tension = if tether_len > self.params.tether_trigger_len_m.max(VECTOR_MIN)
        {
            tether_vec / tether_len
                * (self.params.tether_spring_coeff
                    * (self.params.tether_demand_len_m
                        - self.params.tether_trigger_len_m)
                    * self.params.tether_accel_scale)
        } else {
            Vector3::zeros()
        };
        // the tension points from the anchor toward the aircraft, so its
        // across-track component adds into the demand
        let tether_err = -sin_chi * tension[0] + cos_chi * tension[1];

        // PD correction: the plane-frame crosstrack error is measured with
        // the opposite sign to the 2D circle law, hence the negation
        let pd_accel =
            -(xtrack_err * gains.kx + xtrack_vel_circ * gains.kv);

        let vel_tangent = xtrack_vel_cap * dir;

        // centripetal projection factor, alternating with the figure
        // segment parity
        let centripetal = if segment_index % 2 == 0 {
            vel_tangent * vel_tangent
                / radius_m.max(0.5 * radius_m).max(RADIUS_MIN_M)
                * cos_sigma * cos_theta
                / ((a_air_unit[1] * cos_theta) * (a_air_unit[1] * cos_theta)
                    + (-a_air_unit[1] * sin_sigma * sin_theta
                        + a_air_unit[0] * cos_sigma)
                        * (-a_air_unit[1] * sin_sigma * sin_theta
                            + a_air_unit[0] * cos_sigma))
                    .sqrt()
                    .max(PROJECTION_MIN)
        } else {
            vel_tangent * vel_tangent
                / radius_m.max(0.5 * radius_m).max(RADIUS_MIN_M)
                * (-sin_sigma) * cos_psi
                / ((a_air_unit[0] * cos_psi) * (a_air_unit[0] * cos_psi)
                    + (a_air_unit[0] * cos_sigma * sin_psi
                        - a_air_unit[1] * sin_sigma)
                        * (a_air_unit[0] * cos_sigma * sin_psi
                            - a_air_unit[1] * sin_sigma))
                    .sqrt()
                    .max(PROJECTION_MIN)
        };

        let accel_circ = pd_accel + dir * centripetal + tether_err;

        let (accel, on_circle) = select_crossover(
            accel_cap,
            accel_circ,
            dir,
            -dir * xtrack_err > 0.0,
            self.params.tether_capture_enabled
        );

        self.report.l1_dist_m = l1_dist;
        self.report.capture_mode = !on_circle;

        let (bearing_err, nav_bearing, desired) = if on_circle {
            let mut desired = *center;
            desired.offset(ellipse_ef[0], ellipse_ef[1]);
            desired.alt_m -= ellipse_ef[2];
            (
                0.0,
                wrap_pi(a_air_unit[1].atan2(a_air_unit[0])),
                desired
            )
        } else {
            (nu, 0.0, *center)
        };

        self.commit(OutputData {
            lat_accel_dem_ms2: accel,
            crosstrack_err_m: xtrack_err,
            bearing_err_rad: bearing_err,
            nav_bearing_rad: nav_bearing,
            target_bearing_rad: target_bearing,
            on_circle,
            desired_loc: Some(desired),
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
    use util::module::State;

    fn level_rotation() -> PlaneRotation {
        PlaneRotation {
            psi_rad: 0.0,
            theta_rad: 0.0,
            w_rad: 0.0,
            sigma_rad: 0.0,
        }
    }

    fn tether_cmd(anchor: Location) -> GuidanceCmd {
        GuidanceCmd::LoiterTether {
            anchor,
            center: origin(),
            radius_m: 100.0,
            rotation: level_rotation(),
            plane_matrix: Matrix3::identity(),
            segment_index: 0,
            direction: TurnDirection::Clockwise,
        }
    }

    /// Aircraft on the circle due east of the center, flying south
    /// (clockwise), with the anchor at the given location.
    fn on_circle_cycle(anchor: Location) -> crate::state::OutputData {
        let mut ctrl = GuidCtrl::default();

        let mut ahrs =
            ahrs_at(0.0, 100.0, Vector2::new(-15.0, 0.0), std::f64::consts::PI);
        ahrs.vel_ned = Some(Vector3::new(-15.0, 0.0, 0.0));

        let (out, _) = ctrl
            .proc(&InputData { time_s: 0.0, ahrs, cmd: tether_cmd(anchor) })
            .unwrap();
        out
    }

    #[test]
    fn test_on_circle_slack_tether() {
        // anchor beneath the center, tether well short of the trigger
        let out = on_circle_cycle(origin());

        assert!(out.on_circle);
        assert!(out.crosstrack_err_m.abs() < 1e-6);

        // pure centripetal demand on the circle
        assert!((out.lat_accel_dem_ms2 - 15.0 * 15.0 / 100.0).abs() < 1e-6);

        // the desired point is the aircraft's position on the circle
        let desired = out.desired_loc.unwrap();
        let ne = origin().distance_ne(&desired);
        assert!(ne[0].abs() < 1e-6);
        assert!((ne[1] - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_tether_tension_engages() {
        // anchor far enough below that the tether extension passes the
        // trigger length
        let slack = on_circle_cycle(origin());
        let taut = on_circle_cycle(Location::new(0.0, 0.0, -350.0));

        // tether vector from the anchor: (0, 100, -450), length ~461 m
        let len = (100.0f64 * 100.0 + 450.0 * 450.0).sqrt();
        let magnitude = 2.0 * (400.0 - 390.0) * 0.5138;
        // across-track component with the course angle at pi
        let expected = -(100.0 / len) * magnitude;

        let contribution =
            taut.lat_accel_dem_ms2 - slack.lat_accel_dem_ms2;
        assert!((contribution - expected).abs() < 1e-6);
    }

    #[test]
    fn test_capture_gated_by_parameter() {
        // far outside the circle, flying straight at the center: the
        // capture law would demand less turn than the circle law
        let ahrs = {
            let mut a =
                ahrs_at(0.0, 2000.0, Vector2::new(0.0, -15.0), -FRAC_PI_2);
            a.vel_ned = Some(Vector3::new(0.0, -15.0, 0.0));
            a
        };

        // default parameters: the crossover is disabled, circle mode holds
        let mut ctrl = GuidCtrl::default();
        let (out, _) = ctrl
            .proc(&InputData { time_s: 0.0, ahrs, cmd: tether_cmd(origin()) })
            .unwrap();
        assert!(out.on_circle);

        // enabling the parameter lets the capture branch fire
        let mut ctrl = GuidCtrl::default();
        ctrl.params.tether_capture_enabled = true;
        let (out, _) = ctrl
            .proc(&InputData { time_s: 0.0, ahrs, cmd: tether_cmd(origin()) })
            .unwrap();
        assert!(!out.on_circle);
        assert_eq!(out.desired_loc.unwrap(), origin());
    }
}
