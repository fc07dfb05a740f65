//! Elliptical loiter tracking law
//!
//! Tracks the lateral projection of a circle inclined at `acos(axis_ratio)`
//! and rotated so its major axis lies along a commanded bearing. The
//! nearest point of an ellipse has no closed form, so the law parametrizes
//! the aircraft's position in the principal-axis frame and applies a single
//! first-order (Newton) correction to the curve parameter — no iteration in
//! the cyclic path. The corrected parameter yields the tangent, outer
//! normal, signed distance and curvature that feed the shared
//! capture/circle structure.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;
use std::f64::consts::{FRAC_1_PI, FRAC_PI_2};

// Internal
use crate::crossover::{select_crossover, CircleLaw};
use crate::gains::{LoopGains, LAW_CONST_3D};
use crate::state::{GuidCtrl, OutputData, TurnDirection};
use util::nav::Location;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Groundspeed floor for the loiter laws, m/s.
const GROUNDSPEED_MIN_MS: f64 = 1.0;

/// Floor on the polar radius used in the parametrization divisions, m.
const RADIUS_MIN_M: f64 = 0.1;

/// Below this axis ratio the ellipse is treated as fully degenerate.
const AXIS_RATIO_MIN: f64 = 1.0e-6;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl GuidCtrl {
    /// Loiter on the ellipse around `center` with the given semi-major
    /// axis, minor/major axis ratio and major-axis bearing.
    pub(crate) fn calc_ellipse(
        &mut self,
        center: &Location,
        radius_m: f64,
        axis_ratio: f64,
        major_axis_bearing_rad: f64,
        direction: TurnDirection
    ) {
        let dir = direction.sign();

        // inclination of the projected circle
        let cos_theta = axis_ratio.clamp(0.0, 1.0);
        let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();

        // unit vectors along the major and minor principal axes
        let e1 = Vector2::new(
            major_axis_bearing_rad.cos(),
            major_axis_bearing_rad.sin()
        );
        let e2 = Vector2::new(-e1[1], e1[0]);

        if cos_theta < AXIS_RATIO_MIN {
            // fully inclined: the lateral projection is the straight line
            // spanned by the major axis
            let delta = e1 * radius_m * 2.0 * dir;
            let mut start = *center;
            start.offset(-delta[0], -delta[1]);
            let mut end = *center;
            end.offset(delta[0], delta[1]);

            self.calc_waypoint(&start, &end, 0.0);
            return;
        }

        let gains = LoopGains::derive(&self.params, LAW_CONST_3D, 1.0);

        let current = match self.input.ahrs.position {
            Some(l) => l,
            // no fix: maintain the last nav/target bearing
            None => {
                self.mark_stale();
                return;
            }
        };

        // lateral position of the aircraft relative to the ellipse center
        let pos_ned = center.distance_ned(&current);
        let pos_lat = Vector2::new(pos_ned[0], pos_ned[1]);

        let target_bearing = current.bearing_to(center);

        let vel_lat = self.input.ahrs.vel_lateral();
        let speed = vel_lat.norm().max(GROUNDSPEED_MIN_MS);

        // unit vector from the center to the aircraft; over the center the
        // velocity direction stands in, and failing that the heading
        let er = if pos_lat.norm() > 0.1 {
            pos_lat.normalize()
        } else if vel_lat.norm() < 0.1 {
            self.input.ahrs.heading_unit()
        } else {
            vel_lat.normalize()
        };

        // L1 length required for the specified period
        let l1_dist =
            FRAC_1_PI * self.params.damping * self.params.period_s * speed;
        self.l1_dist_m = l1_dist;

        // capture estimate toward the center
        let xtrack_vel_cap = er.perp(&vel_lat);
        let ltrack_vel_cap = -vel_lat.dot(&er);
        let nu = xtrack_vel_cap.atan2(ltrack_vel_cap);

        let nu = self.prevent_indecision(nu, target_bearing);
        self.last_nu_rad = nu;
        let nu = nu.clamp(-FRAC_PI_2, FRAC_PI_2);

        let accel_cap =
            gains.k_l1 * speed * speed / l1_dist.max(0.1) * nu.sin();

        // parametrize the aircraft's position in the principal-axis frame:
        // posal1 = ra cos(phia), posal2 = ra cos(theta) sin(phia)
        let posal1 = pos_lat.dot(&e1);
        let posal2 = pos_lat.dot(&e2);
        let ra = (posal1 * posal1
            + (posal2 / cos_theta) * (posal2 / cos_theta))
            .sqrt();

        // effective radius for this cycle: the instantaneous polar radius
        // perturbed by a bearing-keyed sinusoid, so the tracked boundary
        // wobbles rather than holding the commanded radius exactly
        let r_eff = if ra.is_finite() && ra > 0.0 {
            ra * (1.0 + (2.0 * target_bearing).sin())
        } else {
            radius_m
        };
        self.effective_radius_m = r_eff;
        self.report.effective_radius_m = r_eff;

        let ra_f = ra.max(RADIUS_MIN_M);
        let rho = ra - r_eff;

        // curve parameter at the aircraft's position
        let cos_phia = posal1 / ra_f;
        let sin_phia = dir * posal2 / (ra_f * cos_theta);

        // first-order correction toward the parameter of the nearest point
        let denom =
            (1.0 - (sin_theta * cos_phia) * (sin_theta * cos_phia)).max(1.0e-6);
        let dphi = -rho * sin_theta * sin_theta * sin_phia * cos_phia
            / (ra_f * denom);
        let (sin_dphi, cos_dphi) = dphi.sin_cos();
        let cos_phi = cos_phia * cos_dphi - sin_phia * sin_dphi;
        let sin_phi = cos_phia * sin_dphi + sin_phia * cos_dphi;

        // signed distance from the ellipse, positive outside
        let dae = rho * cos_theta / denom.sqrt();

        // tangent, outer normal and curvature at the nearest point
        let tel = -e1 * sin_phi + e2 * cos_theta * cos_phi * dir;
        let teln = tel.norm().max(1.0e-6);
        let et = tel / teln;
        let en = Vector2::new(et[1] * dir, -et[0] * dir);
        let kappa = cos_theta / (ra_f * teln * teln * teln);

        let law = CircleLaw {
            xtrack_err: dae,
            xtrack_vel: vel_lat.dot(&en),
            tangent_vel: vel_lat.dot(&et),
            curvature: kappa,
        };
        let accel_circ = dir * (law.pd_accel(&gains) + law.centripetal_accel());

        // capture only engages outside the wobbling boundary
        let outside = dae > r_eff * (1.0 - cos_theta);
        let (accel, on_circle) =
            select_crossover(accel_cap, accel_circ, dir, outside, true);

        self.report.l1_dist_m = l1_dist;
        self.report.capture_mode = !on_circle;

        self.commit(OutputData {
            lat_accel_dem_ms2: accel,
            crosstrack_err_m: dae,
            bearing_err_rad: if on_circle { 0.0 } else { nu },
            nav_bearing_rad: (-pos_lat[1]).atan2(-pos_lat[0]),
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
    use util::module::State;

    #[test]
    fn test_reduces_to_circle_at_unity_axis_ratio() {
        // on a 100 m circle north of the center, flying east at 15 m/s:
        // with axis ratio 1 the ellipse law must agree with the circle law
        let ahrs = ahrs_at(100.0, 0.0, Vector2::new(0.0, 15.0), FRAC_PI_2);

        let mut ellipse_ctrl = GuidCtrl::default();
        let (ellipse_out, _) = ellipse_ctrl
            .proc(&InputData {
                time_s: 0.0,
                ahrs,
                cmd: GuidanceCmd::LoiterEllipse {
                    center: origin(),
                    radius_m: 100.0,
                    axis_ratio: 1.0,
                    major_axis_bearing_rad: 0.0,
                    direction: TurnDirection::Clockwise,
                },
            })
            .unwrap();

        let mut circle_ctrl = GuidCtrl::default();
        let (circle_out, _) = circle_ctrl
            .proc(&InputData {
                time_s: 0.0,
                ahrs,
                cmd: GuidanceCmd::Loiter {
                    center: origin(),
                    radius_m: 100.0,
                    direction: TurnDirection::Clockwise,
                },
            })
            .unwrap();

        assert!(ellipse_out.on_circle);
        assert!(circle_out.on_circle);

        let diff =
            (ellipse_out.lat_accel_dem_ms2 - circle_out.lat_accel_dem_ms2)
                .abs();
        assert!(
            diff / circle_out.lat_accel_dem_ms2.abs() < 0.01,
            "ellipse {} vs circle {}",
            ellipse_out.lat_accel_dem_ms2,
            circle_out.lat_accel_dem_ms2
        );
    }

    #[test]
    fn test_degenerate_delegates_to_segment() {
        let ahrs = ahrs_at(0.0, -50.0, Vector2::new(20.0, 0.0), 0.0);

        let mut ellipse_ctrl = GuidCtrl::default();
        let (ellipse_out, _) = ellipse_ctrl
            .proc(&InputData {
                time_s: 0.0,
                ahrs,
                cmd: GuidanceCmd::LoiterEllipse {
                    center: origin(),
                    radius_m: 100.0,
                    axis_ratio: 0.0,
                    major_axis_bearing_rad: 0.0,
                    direction: TurnDirection::Clockwise,
                },
            })
            .unwrap();

        // the collapsed ellipse is the segment between the two points a
        // full diameter along the major axis either side of the center
        let mut segment_ctrl = GuidCtrl::default();
        let (segment_out, _) = segment_ctrl
            .proc(&InputData {
                time_s: 0.0,
                ahrs,
                cmd: GuidanceCmd::Waypoint {
                    prev: local_ne(-200.0, 0.0),
                    next: local_ne(200.0, 0.0),
                    dist_min_m: 0.0,
                },
            })
            .unwrap();

        assert_eq!(ellipse_out, segment_out);
        assert!(!ellipse_out.on_circle);
    }

    #[test]
    fn test_outputs_bounded_over_the_plane() {
        // sample positions across the plane, including the center and the
        // axes, and require a finite bounded demand everywhere
        let mut ctrl = GuidCtrl::default();

        for north in &[-300.0, -50.0, 0.0, 50.0, 300.0] {
            for east in &[-300.0, 0.0, 120.0] {
                let (out, _) = ctrl
                    .proc(&InputData {
                        time_s: 0.0,
                        ahrs: ahrs_at(
                            *north,
                            *east,
                            Vector2::new(-12.0, 9.0),
                            0.0
                        ),
                        cmd: GuidanceCmd::LoiterEllipse {
                            center: origin(),
                            radius_m: 150.0,
                            axis_ratio: 0.5,
                            major_axis_bearing_rad: 0.7,
                            direction: TurnDirection::CounterClockwise,
                        },
                    })
                    .unwrap();

                assert!(out.lat_accel_dem_ms2.is_finite());
                assert!(out.crosstrack_err_m.is_finite());
                assert!(out.nav_bearing_rad.is_finite());
            }
        }
    }
}
