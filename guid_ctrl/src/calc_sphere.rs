//! Sphere-constrained 3D loiter tracking law
//!
//! Tracks a circle lying on a sphere: the circle's plane is perpendicular
//! to a commanded unit normal, offset from the sphere center along it at a
//! cone angle. Spherical trigonometry gives the circle's center and radius,
//! cross products with the normal give a local tangent/normal/radial frame,
//! and the lateral-plane tracking then reuses the elliptical law on the
//! circle's lateral projection. The altitude of the desired point follows
//! from the vertical component of the outer normal.
//!
//! When the projected frame collapses (a vertical circle plane) the law
//! falls back to a fixed line segment clipped at a minimum height, steering
//! at the nearer endpoint or at the interior point beneath the circle.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Vector2, Vector3};
use std::f64::consts::{FRAC_1_PI, FRAC_PI_2};

// Internal
use crate::crossover::{select_crossover, wrong_way_floor, CircleLaw};
use crate::gains::{LoopGains, LAW_CONST_3D};
use crate::state::{GuidCtrl, OutputData, TurnDirection};
use util::{
    maths::wrap_2pi,
    nav::Location
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Groundspeed floor for the loiter laws, m/s.
const GROUNDSPEED_MIN_MS: f64 = 1.0;

/// Floor on the polar radius used in the parametrization divisions, m.
const RADIUS_MIN_M: f64 = 0.1;

/// Vectors shorter than this are treated as degenerate.
const VECTOR_MIN: f64 = 1.0e-6;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl GuidCtrl {
    /// Loiter on the circle at the given cone angle on the sphere around
    /// `center`, in the plane perpendicular to `circle_normal`.
    pub(crate) fn calc_sphere(
        &mut self,
        center: &Location,
        circle_normal: &Vector3<f64>,
        sphere_radius_m: f64,
        cone_angle_rad: f64,
        direction: TurnDirection
    ) {
        let dir = direction.sign();

        // unit normal of the circle's plane; a degenerate input falls back
        // to a level circle
        let ercv = if circle_normal.norm() > VECTOR_MIN {
            circle_normal.normalize()
        } else {
            Vector3::new(0.0, 0.0, -1.0)
        };

        // circle center and radius from spherical trigonometry
        let center_dist = sphere_radius_m * cone_angle_rad.cos();
        let circle_radius = sphere_radius_m * cone_angle_rad.sin();

        let mut s1center = *center;
        s1center.offset(ercv[0] * center_dist, ercv[1] * center_dist);
        s1center.alt_m -= ercv[2] * center_dist;

        // polar/azimuth decomposition of the circle normal. A horizontal
        // circle leaves the azimuth free, so psi = 0 is chosen.
        let cos_theta = -ercv[2];
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let (cos_psi, sin_psi) = if sin_theta < VECTOR_MIN {
            (1.0, 0.0)
        } else {
            (ercv[0] / sin_theta, ercv[1] / sin_theta)
        };

        // principal axes of the lateral projection. The inclined circle
        // swaps major and minor axes relative to the ellipse convention; a
        // 90 degree rotation (e1 -> e2, e2 -> -e1) preserves orientation.
        let e1 = Vector2::new(-sin_psi, cos_psi);
        let e2 = Vector2::new(-e1[1], e1[0]);

        let current = match self.input.ahrs.position {
            Some(l) => l,
            // no fix: maintain the last nav/target bearing
            None => {
                self.mark_stale();
                return;
            }
        };

        // aircraft position relative to the circle center
        let s1ctoav = s1center.distance_ned(&current);
        let s1ctoalv = Vector2::new(s1ctoav[0], s1ctoav[1]);

        let target_bearing = current.bearing_to(&s1center);

        let vel_ned = self.input.ahrs.vel_ned.unwrap_or_else(|| {
            let gv = self.input.ahrs.ground_vel_ne;
            Vector3::new(gv[0], gv[1], 0.0)
        });
        let vel_lat = Vector2::new(vel_ned[0], vel_ned[1]);
        let speed = vel_lat.norm().max(GROUNDSPEED_MIN_MS);

        // tangent/normal/radial frame at the point of the circle closest
        // to the aircraft, from cross products with the circle normal
        let etv_raw = s1ctoav.cross(&ercv) * dir;
        let etv = if etv_raw.norm() > VECTOR_MIN {
            etv_raw.normalize()
        } else {
            // directly on the circle axis: take the heading direction
            let hd = self.input.ahrs.heading_unit();
            Vector3::new(hd[0], hd[1], 0.0)
        };

        let etlv_raw = Vector2::new(etv[0], etv[1]);
        let etlv = if etlv_raw.norm() > VECTOR_MIN {
            etlv_raw.normalize()
        } else {
            self.input.ahrs.heading_unit()
        };

        let env = {
            let env_raw = ercv.cross(&etv) * dir;
            if env_raw.norm() > VECTOR_MIN {
                env_raw.normalize()
            } else {
                Vector3::new(0.0, 0.0, -1.0)
            }
        };

        // lateral radial vector, with the usual degenerate fallbacks
        let erlv_raw = Vector2::new(env[0], env[1]);
        let erlv = if erlv_raw.norm() > 0.1 {
            erlv_raw.normalize()
        } else if vel_lat.norm() < 0.1 {
            self.input.ahrs.heading_unit()
        } else {
            vel_lat.normalize()
        };

        // L1 length required for the specified period
        let l1_dist =
            FRAC_1_PI * self.params.damping * self.params.period_s * speed;
        self.l1_dist_m = l1_dist;

        // scheduled 3D law gain, keyed by the previous cycle's crosstrack
        // error
        let mult = self.gain_table.multiplier(self.output.crosstrack_err_m);
        let gains = LoopGains::derive(&self.params, LAW_CONST_3D, mult);

        // projections of the aircraft's position onto the principal axes
        let posal1 = s1ctoalv.dot(&e1);
        let posal2 = s1ctoalv.dot(&e2);

        if cos_theta.abs() > VECTOR_MIN {
            // non-degenerate: track the lateral projection of the circle
            let ra = (posal1 * posal1
                + (posal2 / cos_theta) * (posal2 / cos_theta))
                .sqrt();

            // effective radius for this cycle: the instantaneous polar
            // radius plus the wrapped bearing, a slowly turning spiral
            // boundary rather than a fixed one
            let r_eff = if ra.is_finite() && ra > 0.0 {
                ra + wrap_2pi(target_bearing)
            } else {
                circle_radius
            };
            self.effective_radius_m = r_eff;
            self.report.effective_radius_m = r_eff;

            let ra_f = ra.max(RADIUS_MIN_M);
            let rho = ra - r_eff;

            let cos_phia = posal1 / ra_f;
            let sin_phia = dir * posal2 / (ra_f * cos_theta);

            // first-order correction toward the nearest-point parameter
            let denom = (1.0
                - (sin_theta * cos_phia) * (sin_theta * cos_phia))
                .max(1.0e-6);
            let dphi = -rho * sin_theta * sin_theta * sin_phia * cos_phia
                / (ra_f * denom);
            let (sin_dphi, cos_dphi) = dphi.sin_cos();
            let cos_phi = cos_phia * cos_dphi - sin_phia * sin_dphi;
            let sin_phi = cos_phia * sin_dphi + sin_phia * cos_dphi;

            // signed distance from the projected circle, positive outside
            let dae = rho * cos_theta / denom.sqrt();

            let tel = -e1 * sin_phi + e2 * cos_theta * cos_phi * dir;
            let teln = tel.norm().max(1.0e-6);
            let ete = tel / teln;
            let ene = Vector2::new(ete[1] * dir, -ete[0] * dir);
            let kappa = cos_theta / (ra_f * teln * teln * teln);

            // capture estimate in the 3D frame: crosstrack along the
            // circle's tangent, along-track radially inbound
            let tangent_vel_cap = vel_lat.dot(&etlv);
            let xtrack_vel_cap = tangent_vel_cap * dir;
            let ltrack_vel_cap = -vel_lat.dot(&erlv);
            let nu = xtrack_vel_cap.atan2(ltrack_vel_cap);

            let nu = self.prevent_indecision(nu, target_bearing);
            self.last_nu_rad = nu;
            let nu = nu.clamp(-FRAC_PI_2, FRAC_PI_2);

            let accel_cap =
                gains.k_l1 * speed * speed / l1_dist.max(0.1) * nu.sin();

            let law = CircleLaw {
                xtrack_err: dae,
                xtrack_vel: vel_lat.dot(&ene),
                tangent_vel: vel_lat.dot(&ete),
                curvature: kappa,
            };
            let pd = wrong_way_floor(
                law.pd_accel(&gains),
                ltrack_vel_cap,
                tangent_vel_cap
            );
            let accel_circ = dir * (pd + law.centripetal_accel());

            let (accel, on_circle) = select_crossover(
                accel_cap,
                accel_circ,
                dir,
                dae > 0.0,
                true
            );

            // desired point: the nearest point of the inclined circle,
            // with the altitude target from the normal's vertical
            // component
            let mut desired = s1center;
            desired.offset(env[0] * r_eff, env[1] * r_eff);
            desired.alt_m -= env[2] * r_eff;

            self.report.l1_dist_m = l1_dist;
            self.report.capture_mode = !on_circle;

            self.commit(OutputData {
                lat_accel_dem_ms2: accel,
                crosstrack_err_m: dae,
                bearing_err_rad: if on_circle { 0.0 } else { nu },
                nav_bearing_rad: if on_circle {
                    (-erlv[1]).atan2(-erlv[0])
                } else {
                    0.0
                },
                target_bearing_rad: target_bearing,
                on_circle,
                desired_loc: Some(desired),
                data_stale: false,
            });
        } else {
            // degenerate: the circle's plane is vertical and its lateral
            // projection is the line spanned by e1. Fly the segment
            // between the two points of the circle at the minimum height.
            let height_min = self.params.min_fallback_height_m.max(0.0);
            let seg_radius = (circle_radius * circle_radius
                - height_min * height_min)
                .max(0.0)
                .sqrt();
            self.effective_radius_m = circle_radius;
            self.report.effective_radius_m = circle_radius;

            let maxv = -e1 * seg_radius * dir;
            let mut start = s1center;
            start.offset(-maxv[0], -maxv[1]);
            start.alt_m += height_min;
            let mut end = s1center;
            end.offset(maxv[0], maxv[1]);
            end.alt_m += height_min;

            // deviation from the line, in the e2 direction
            let dae = posal2;
            let ete = -e1;
            let ene = e2;

            // capture point: the nearer endpoint when the projection falls
            // outside the segment, otherwise the point of the circle above
            // the projection
            let capture_loc = if posal1.abs() >= seg_radius {
                if posal1 >= 0.0 {
                    start
                } else {
                    end
                }
            } else {
                let mut loc = s1center;
                loc.offset(e1[0] * posal1, e1[1] * posal1);
                loc.alt_m += (circle_radius * circle_radius
                    - posal1 * posal1)
                    .max(0.0)
                    .sqrt();
                loc
            };

            // radial/tangential frame toward the capture point
            let rl = capture_loc.distance_ne(&current);
            let erl = if rl.norm() > VECTOR_MIN {
                rl.normalize()
            } else {
                self.input.ahrs.heading_unit()
            };
            let etl = Vector2::new(-erl[1], erl[0]);

            let tangent_vel_cap = vel_lat.dot(&etl);
            let xtrack_vel_cap = tangent_vel_cap * dir;
            let ltrack_vel_cap = -vel_lat.dot(&erl);
            let nu_cap = xtrack_vel_cap.atan2(ltrack_vel_cap);

            let nu_cap = self.prevent_indecision(nu_cap, target_bearing);
            self.last_nu_rad = nu_cap;
            let nu_cap = nu_cap.clamp(-FRAC_PI_2, FRAC_PI_2);

            let accel_cap =
                gains.k_l1 * speed * speed / l1_dist.max(0.1) * nu_cap.sin();

            // the segment end is the target for the line-following law
            let target_bearing = current.bearing_to(&end);

            let xtrack_vel_circ = vel_lat.dot(&ene);
            let ltrack_vel_circ = vel_lat.dot(&ete);
            let nu2 = xtrack_vel_circ.atan2(ltrack_vel_circ);

            let sine_nu1 = (dae / l1_dist.max(0.1))
                .clamp(-0.7071, 0.7071);
            let nu1 = sine_nu1.asin();
            let nu_circ = nu1 + nu2;

            let nu_circ = self.prevent_indecision(nu_circ, target_bearing);
            self.last_nu_rad = nu_circ;
            let nu_circ = nu_circ.clamp(-FRAC_PI_2, FRAC_PI_2);

            let accel_circ =
                gains.k_l1 * speed * speed / l1_dist.max(0.1) * nu_circ.sin();

            let (accel, on_circle) = select_crossover(
                accel_cap,
                accel_circ,
                dir,
                dae > 0.0,
                true
            );

            let desired = if on_circle {
                capture_loc
            } else {
                let mut loc = s1center;
                loc.offset(env[0] * circle_radius, env[1] * circle_radius);
                loc.alt_m -= env[2] * circle_radius;
                loc
            };

            self.report.l1_dist_m = l1_dist;
            self.report.capture_mode = !on_circle;

            self.commit(OutputData {
                lat_accel_dem_ms2: accel,
                crosstrack_err_m: dae,
                bearing_err_rad: if on_circle { 0.0 } else { nu_cap },
                nav_bearing_rad: if on_circle {
                    (-erl[1]).atan2(-erl[0])
                } else {
                    0.0
                },
                target_bearing_rad: target_bearing,
                on_circle,
                desired_loc: Some(desired),
                data_stale: false,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
