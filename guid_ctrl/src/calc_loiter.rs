//! Circular loiter tracking law
//!
//! Capture/circle hybrid for a plain circle. Two acceleration estimates are
//! computed every cycle — an L1 capture law treating the circle center as a
//! point target, and a PD plus centripetal law tracking the circle itself —
//! and the crossover helper selects between them where the commands meet.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::f64::consts::{FRAC_1_PI, FRAC_PI_2};

// Internal
use crate::crossover::{select_crossover, wrong_way_floor, CircleLaw};
use crate::gains::{LoopGains, LAW_CONST_2D};
use crate::state::{GuidCtrl, OutputData, TurnDirection};
use util::nav::Location;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Groundspeed floor for the loiter laws, m/s.
const GROUNDSPEED_MIN_MS: f64 = 1.0;

/// Floor on the centripetal-term radius, m.
const RADIUS_MIN_M: f64 = 0.1;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl GuidCtrl {
    /// Loiter around `center` at the given radius and turn direction.
    pub(crate) fn calc_loiter(
        &mut self,
        center: &Location,
        radius_m: f64,
        direction: TurnDirection
    ) {
        let dir = direction.sign();

        // scale the radius for altitude so the turn stays flyable at the
        // airframe's loading limits
        let radius = self.loiter_radius(radius_m.abs());

        let gains = LoopGains::derive(&self.params, LAW_CONST_2D, 1.0);

        let current = match self.input.ahrs.position {
            Some(l) => l,
            // no fix: maintain the last nav/target bearing
            None => {
                self.mark_stale();
                return;
            }
        };

        let gv = self.input.ahrs.ground_vel_ne;
        let ground_speed = gv.norm().max(GROUNDSPEED_MIN_MS);

        let target_bearing = current.bearing_to(center);

        // L1 length required for the specified period
        let l1_dist = FRAC_1_PI
            * self.params.damping
            * self.params.period_s
            * ground_speed;
        self.l1_dist_m = l1_dist;

        // NE position of the aircraft relative to the circle center
        let a_air = center.distance_ne(&current);

        // unit radial vector from center to aircraft; on top of the center
        // the velocity direction stands in, and failing that the heading
        let a_air_unit = if a_air.norm() > 0.1 {
            a_air.normalize()
        } else if gv.norm() < 0.1 {
            self.input.ahrs.heading_unit()
        } else {
            gv.normalize()
        };

        // capture estimate: treat the circle center as a point target
        let xtrack_vel_cap = a_air_unit.perp(&gv);
        let ltrack_vel_cap = -gv.dot(&a_air_unit);
        let nu = xtrack_vel_cap.atan2(ltrack_vel_cap);

        let nu = self.prevent_indecision(nu, target_bearing);
        self.last_nu_rad = nu;
        let nu = nu.clamp(-FRAC_PI_2, FRAC_PI_2);

        let accel_cap = gains.k_l1 * ground_speed * ground_speed
            / l1_dist.max(0.1)
            * nu.sin();

        // circle estimate: radial PD plus centripetal tracking
        let xtrack_err = a_air.norm() - radius;
        let tangent_vel = xtrack_vel_cap * dir;
        let law = CircleLaw {
            xtrack_err,
            // radial outbound velocity
            xtrack_vel: -ltrack_vel_cap,
            tangent_vel,
            curvature: 1.0
                / (0.5 * radius).max(radius + xtrack_err).max(RADIUS_MIN_M),
        };
        let pd = wrong_way_floor(
            law.pd_accel(&gains),
            ltrack_vel_cap,
            tangent_vel
        );
        let accel_circ = dir * (pd + law.centripetal_accel());

        let (accel, on_circle) = select_crossover(
            accel_cap,
            accel_circ,
            dir,
            xtrack_err > 0.0,
            true
        );

        self.report.l1_dist_m = l1_dist;
        self.report.capture_mode = !on_circle;

        self.commit(OutputData {
            lat_accel_dem_ms2: accel,
            crosstrack_err_m: xtrack_err,
            bearing_err_rad: if on_circle { 0.0 } else { nu },
            nav_bearing_rad: (-a_air_unit[1]).atan2(-a_air_unit[0]),
            target_bearing_rad: target_bearing,
            on_circle,
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

    fn loiter_cmd(radius_m: f64) -> GuidanceCmd {
        GuidanceCmd::Loiter {
            center: origin(),
            radius_m,
            direction: TurnDirection::Clockwise,
        }
    }

    /// Run one loiter cycle with the aircraft at the given radial offset
    /// north of the center, flying east (tangentially for clockwise).
    fn cycle(
        ctrl: &mut GuidCtrl,
        north_m: f64,
        speed_ms: f64
    ) -> crate::state::OutputData {
        let (out, _) = ctrl
            .proc(&InputData {
                time_s: 0.0,
                ahrs: ahrs_at(
                    north_m,
                    0.0,
                    Vector2::new(0.0, speed_ms),
                    FRAC_PI_2
                ),
                cmd: loiter_cmd(100.0),
            })
            .unwrap();
        out
    }

    #[test]
    fn test_on_circle_scenario() {
        let mut ctrl = GuidCtrl::default();

        // on the circle, moving tangentially at 15 m/s
        let out = cycle(&mut ctrl, 100.0, 15.0);

        assert!(out.crosstrack_err_m.abs() < 1e-6);
        assert!(out.on_circle);
        assert_eq!(out.bearing_err_rad, 0.0);

        // the demand is the centripetal value V^2/R
        assert!((out.lat_accel_dem_ms2 - 15.0 * 15.0 / 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_crossover_continuity() {
        // sweep the radial offset through the capture/circle crossover and
        // check the command is continuous across the switch
        let mut last: Option<(bool, f64)> = None;
        let mut crossed = false;

        let mut offset = 0.0;
        while offset < 150.0 {
            let mut ctrl = GuidCtrl::default();
            let out = cycle(&mut ctrl, 100.0 + offset, 20.0);

            if let Some((last_on_circle, last_accel)) = last {
                if last_on_circle != out.on_circle {
                    crossed = true;
                    assert!(
                        (out.lat_accel_dem_ms2 - last_accel).abs() < 0.05,
                        "command discontinuity at offset {}: {} -> {}",
                        offset,
                        last_accel,
                        out.lat_accel_dem_ms2
                    );
                }
            }
            last = Some((out.on_circle, out.lat_accel_dem_ms2));

            offset += 0.01;
        }

        assert!(crossed, "the sweep never reached the crossover point");
    }

    #[test]
    fn test_capture_outside_circle() {
        let mut ctrl = GuidCtrl::default();

        // far outside the circle the capture law wins
        let out = cycle(&mut ctrl, 2000.0, 20.0);

        assert!(!out.on_circle);
        assert!((out.crosstrack_err_m - 1900.0).abs() < 1e-6);
        // flying tangentially with the center abeam: 90 degrees of bearing
        // error toward the center
        assert!((out.bearing_err_rad.abs() - FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn test_zero_radius_bounded() {
        let mut ctrl = GuidCtrl::default();

        let (out, _) = ctrl
            .proc(&InputData {
                time_s: 0.0,
                ahrs: ahrs_at(0.0, 0.0, Vector2::zeros(), 0.0),
                cmd: loiter_cmd(0.0),
            })
            .unwrap();

        assert!(out.lat_accel_dem_ms2.is_finite());
        assert!(out.crosstrack_err_m.is_finite());
    }
}
