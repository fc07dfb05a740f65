//! Guidance control module state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use nalgebra::{Matrix3, Vector2, Vector3};
use serde::Serialize;

// Internal
use crate::gain_sched::GainTable;
use crate::params::Params;
use crate::{GuidCtrlError, InitError};
use util::{
    archive::Archiver,
    maths::wrap_pi,
    module::State,
    nav::Location,
    params,
    session::Session
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Maximum accepted time step between updates, in seconds. Steps beyond
/// this are treated as stale and reset the crosstrack integrator.
pub(crate) const DT_MAX_S: f64 = 0.1;

/// Limit on the crosstrack integrator, in radians.
pub(crate) const XTRACK_I_LIMIT_RAD: f64 = 0.1;

/// The integrator only accumulates below this capture angle (5 degrees),
/// i.e. when travelling near-parallel to the track.
pub(crate) const XTRACK_I_ENGAGE_RAD: f64 = 5.0 * std::f64::consts::PI / 180.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Lateral guidance module state.
///
/// One instance exists per vehicle. It is owned by the guidance engine and
/// read by exactly one caller between cycles, so no locking is required.
#[derive(Default)]
pub struct GuidCtrl {
    pub(crate) params: Params,

    /// Gain table consulted by the gain scheduler, immutable after init.
    pub(crate) gain_table: GainTable,

    /// Previous cycle's guidance angle, used only by the indecision filter.
    pub(crate) last_nu_rad: f64,

    /// Crosstrack integrator accumulator.
    pub(crate) xtrack_i_rad: f64,

    /// Integrator gain at the previous accumulation, to detect retuning.
    pub(crate) xtrack_i_gain_prev: f64,

    /// Time of the previous segment-tracking update.
    pub(crate) last_update_time_s: Option<f64>,

    /// L1 distance of the most recent update, read by the turn-distance
    /// query.
    pub(crate) l1_dist_m: f64,

    /// Effective loiter radius of the most recent ellipse/3D update.
    pub(crate) effective_radius_m: f64,

    pub(crate) input: InputData,
    pub(crate) output: OutputData,
    pub(crate) report: StatusReport,

    arch_record: Archiver,
}

/// Input data to the guidance module for one control cycle.
#[derive(Debug, Copy, Clone, Default)]
pub struct InputData {
    /// Monotonic time of this cycle in seconds, supplied by the executive.
    pub time_s: f64,

    /// State estimate snapshot for this cycle.
    pub ahrs: AhrsData,

    /// The tracking operation to execute on this cycle.
    pub cmd: GuidanceCmd,
}

/// Snapshot of the attitude/position estimate for one control cycle.
#[derive(Debug, Copy, Clone)]
pub struct AhrsData {
    /// Current position, or `None` if no fix is available.
    pub position: Option<Location>,

    /// Ground velocity in the NE plane, m/s.
    pub ground_vel_ne: Vector2<f64>,

    /// Full NED velocity, when inertial navigation is available.
    pub vel_ned: Option<Vector3<f64>>,

    /// Yaw angle, radians.
    pub yaw_rad: f64,

    /// Pitch angle, radians.
    pub pitch_rad: f64,

    /// Equivalent-to-true airspeed scale factor.
    pub eas2tas: f64,

    /// Airspeed demanded by the speed/height controller, m/s, if one is
    /// running.
    pub target_airspeed_ms: Option<f64>,

    /// True when flying in reverse; the effective yaw is wrapped by pi.
    pub reverse: bool,
}

/// Output of the guidance module, read by the flight mode logic between
/// cycles.
///
/// All fields are committed together at the end of a successful
/// computation. When no position fix is available every field keeps its
/// previous value and only `data_stale` is raised, so a reader never sees
/// partially-updated state.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct OutputData {
    /// Demanded lateral acceleration, m/s², positive to the right.
    pub lat_accel_dem_ms2: f64,

    /// Signed crosstrack error, m, positive when left of track.
    pub crosstrack_err_m: f64,

    /// Bearing error, radians, positive to the left of track.
    pub bearing_err_rad: f64,

    /// Bearing from the aircraft to the L1 reference point, radians.
    pub nav_bearing_rad: f64,

    /// Bearing from the aircraft to the active target, radians.
    pub target_bearing_rad: f64,

    /// True while established on the loiter circle.
    pub on_circle: bool,

    /// Desired point on the tracked path, where the 3D trackers provide
    /// one.
    pub desired_loc: Option<Location>,

    /// True when the last cycle had no position fix and all other outputs
    /// were held at their previous values.
    pub data_stale: bool,
}

/// Monitoring quantities for one guidance cycle.
#[derive(Debug, Copy, Clone, Default, Serialize)]
pub struct StatusReport {
    /// L1 distance used this cycle, m.
    pub l1_dist_m: f64,

    /// Crosstrack integrator value, radians.
    pub xtrack_i_rad: f64,

    /// Effective loiter radius, m, for the ellipse/3D trackers.
    pub effective_radius_m: f64,

    /// True if the indecision filter held the previous guidance angle.
    pub indecision_hold: bool,

    /// True if the cycle resolved to capture mode.
    pub capture_mode: bool,
}

/// Plane rotation angles of the tether-anchored circle.
#[derive(Debug, Copy, Clone)]
pub struct PlaneRotation {
    pub psi_rad: f64,
    pub theta_rad: f64,
    pub w_rad: f64,
    pub sigma_rad: f64,
}

/// One telemetry record, archived per completed update.
#[derive(Serialize)]
struct GuidRecord {
    time_s: f64,
    mode: &'static str,
    crosstrack_err_m: f64,
    l1_dist_m: f64,
    lat_accel_dem_ms2: f64,
    nav_bearing_rad: f64,
    on_circle: bool,
    data_stale: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Turn direction around a loiter path.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum TurnDirection {
    Clockwise,
    CounterClockwise,
}

/// The tracking operation to execute for the active flight-plan leg.
/// Exactly one is selected per control cycle by the flight mode logic.
#[derive(Debug, Copy, Clone)]
pub enum GuidanceCmd {
    /// Track the segment between two waypoints.
    Waypoint {
        prev: Location,
        next: Location,
        /// Lower limit on the L1 distance, m.
        dist_min_m: f64,
    },

    /// Loiter on a circle.
    Loiter {
        center: Location,
        radius_m: f64,
        direction: TurnDirection,
    },

    /// Loiter on an ellipse: the lateral projection of a circle inclined at
    /// `acos(axis_ratio)`, major axis rotated to the given bearing.
    LoiterEllipse {
        center: Location,
        /// Semi-major axis, m.
        radius_m: f64,
        /// Minor/major axis ratio, in (0, 1]. Zero collapses the ellipse
        /// to a line segment.
        axis_ratio: f64,
        /// Bearing of the major axis, radians from north.
        major_axis_bearing_rad: f64,
        direction: TurnDirection,
    },

    /// Loiter on a circle constrained to a sphere: the circle's plane is
    /// perpendicular to `circle_normal`, offset from the sphere center
    /// along it at the given cone angle.
    LoiterSphere {
        center: Location,
        /// Unit normal of the circle's plane, NED.
        circle_normal: Vector3<f64>,
        sphere_radius_m: f64,
        cone_angle_rad: f64,
        direction: TurnDirection,
    },

    /// Loiter on a tether-anchored inclined circle, specified by a plane
    /// rotation from the anchor frame.
    LoiterTether {
        anchor: Location,
        center: Location,
        radius_m: f64,
        rotation: PlaneRotation,
        /// Rotation from the earth frame into the circle's plane frame.
        plane_matrix: Matrix3<f64>,
        /// Index of the active figure segment; parity selects the
        /// centripetal projection.
        segment_index: i32,
        direction: TurnDirection,
    },

    /// Hold a commanded heading.
    HeadingHold { heading_rad: f64 },

    /// Fly level on the current heading; used when no guidance target is
    /// active.
    LevelFlight,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for AhrsData {
    fn default() -> Self {
        Self {
            position: None,
            ground_vel_ne: Vector2::zeros(),
            vel_ned: None,
            yaw_rad: 0.0,
            pitch_rad: 0.0,
            eas2tas: 1.0,
            target_airspeed_ms: None,
            reverse: false,
        }
    }
}

impl Default for OutputData {
    fn default() -> Self {
        Self {
            lat_accel_dem_ms2: 0.0,
            crosstrack_err_m: 0.0,
            bearing_err_rad: 0.0,
            nav_bearing_rad: 0.0,
            target_bearing_rad: 0.0,
            on_circle: false,
            desired_loc: None,
            // no update has run yet
            data_stale: true,
        }
    }
}

impl Default for GuidanceCmd {
    fn default() -> Self {
        GuidanceCmd::LevelFlight
    }
}

impl TurnDirection {
    /// Sign of the turn: positive clockwise, negative counter-clockwise.
    pub(crate) fn sign(self) -> f64 {
        match self {
            TurnDirection::Clockwise => 1.0,
            TurnDirection::CounterClockwise => -1.0,
        }
    }
}

impl AhrsData {
    /// Effective yaw, wrapped by pi when flying in reverse.
    pub fn yaw(&self) -> f64 {
        if self.reverse {
            wrap_pi(std::f64::consts::PI + self.yaw_rad)
        } else {
            self.yaw_rad
        }
    }

    /// Unit vector along the current heading in the NE plane.
    pub(crate) fn heading_unit(&self) -> Vector2<f64> {
        Vector2::new(self.yaw().cos(), self.yaw().sin())
    }

    /// Lateral (NE) velocity, from inertial navigation when available.
    pub(crate) fn vel_lateral(&self) -> Vector2<f64> {
        match self.vel_ned {
            Some(v) => Vector2::new(v[0], v[1]),
            None => self.ground_vel_ne,
        }
    }
}

impl GuidanceCmd {
    /// Name of the tracking operation, for telemetry.
    pub fn name(&self) -> &'static str {
        match self {
            GuidanceCmd::Waypoint { .. } => "waypoint",
            GuidanceCmd::Loiter { .. } => "loiter",
            GuidanceCmd::LoiterEllipse { .. } => "loiter_ellipse",
            GuidanceCmd::LoiterSphere { .. } => "loiter_sphere",
            GuidanceCmd::LoiterTether { .. } => "loiter_tether",
            GuidanceCmd::HeadingHold { .. } => "heading_hold",
            GuidanceCmd::LevelFlight => "level_flight",
        }
    }
}

impl State for GuidCtrl {
    type InitData = &'static str;
    type InitError = InitError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = GuidCtrlError;

    /// Initialise the guidance module.
    ///
    /// Expected init data is the path to the parameter file. The gain table
    /// artifact named in the parameters is loaded here and treated as
    /// immutable afterwards.
    fn init(
        &mut self,
        init_data: Self::InitData,
        session: &Session
    ) -> Result<(), Self::InitError> {

        // Load the parameters
        self.params = params::load(init_data)?;

        // Load the gain table artifact, or fall back to the built-in table
        self.gain_table = match self.params.gain_table_file {
            Some(ref file) => {
                GainTable::load(params::resolve(file).map_err(InitError::ParamLoadError)?)?
            }
            None => GainTable::default(),
        };

        // Create the arch folder for guid_ctrl
        let mut arch_path = session.arch_root.clone();
        arch_path.push("guid_ctrl");
        if let Err(e) = std::fs::create_dir_all(arch_path) {
            warn!("Could not create the guidance archive directory: {}", e);
        }

        // Initialise the telemetry archiver. Telemetry is best-effort, so
        // a failure here downgrades to a warning rather than aborting init.
        match Archiver::from_path(session, "guid_ctrl/guidance.csv") {
            Ok(a) => self.arch_record = a,
            Err(e) => warn!("Could not create the guidance archiver: {}", e),
        }

        Ok(())
    }

    /// Perform cyclic processing of guidance control.
    ///
    /// Exactly one tracking operation runs per call, selected by the
    /// command in the input data. Outputs are committed atomically at the
    /// end of a successful computation; if no position fix is available the
    /// previous outputs are held and `data_stale` is raised.
    fn proc(
        &mut self,
        input_data: &Self::InputData
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {

        // Setup cycle data
        self.input = *input_data;
        self.report = StatusReport::default();

        match input_data.cmd {
            GuidanceCmd::Waypoint { prev, next, dist_min_m } => {
                self.calc_waypoint(&prev, &next, dist_min_m)
            }
            GuidanceCmd::Loiter { center, radius_m, direction } => {
                self.calc_loiter(&center, radius_m, direction)
            }
            GuidanceCmd::LoiterEllipse {
                center,
                radius_m,
                axis_ratio,
                major_axis_bearing_rad,
                direction,
            } => self.calc_ellipse(
                &center,
                radius_m,
                axis_ratio,
                major_axis_bearing_rad,
                direction,
            ),
            GuidanceCmd::LoiterSphere {
                center,
                circle_normal,
                sphere_radius_m,
                cone_angle_rad,
                direction,
            } => self.calc_sphere(
                &center,
                &circle_normal,
                sphere_radius_m,
                cone_angle_rad,
                direction,
            ),
            GuidanceCmd::LoiterTether {
                anchor,
                center,
                radius_m,
                rotation,
                plane_matrix,
                segment_index,
                direction,
            } => self.calc_tether(
                &anchor,
                &center,
                radius_m,
                &rotation,
                &plane_matrix,
                segment_index,
                direction,
            ),
            GuidanceCmd::HeadingHold { heading_rad } => {
                self.calc_heading_hold(heading_rad)
            }
            GuidanceCmd::LevelFlight => self.calc_level_flight(),
        }

        self.write_record(input_data.cmd.name());

        Ok((self.output, self.report))
    }
}

impl GuidCtrl {
    /// Commit the outputs of a completed computation.
    ///
    /// This is the only place outputs are written, so a reader never
    /// observes a partially-updated cycle.
    pub(crate) fn commit(&mut self, output: OutputData) {
        self.output = output;
    }

    /// Hold the previous outputs and flag them as stale. Used when no
    /// position fix is available.
    pub(crate) fn mark_stale(&mut self) {
        self.output.data_stale = true;
    }

    /// Compute the time step since the previous update, clamped to
    /// [`DT_MAX_S`]. A stale or non-monotonic clock resets the crosstrack
    /// integrator.
    pub(crate) fn time_step(&mut self, now_s: f64) -> f64 {
        let dt = match self.last_update_time_s {
            Some(t0) => now_s - t0,
            None => DT_MAX_S + 1.0,
        };
        self.last_update_time_s = Some(now_s);

        if !(0.0..=DT_MAX_S).contains(&dt) {
            self.xtrack_i_rad = 0.0;
            DT_MAX_S
        } else {
            dt
        }
    }

    /// Accumulate the crosstrack integrator and return its value.
    ///
    /// The integrator is reset whenever its gain is disabled or retuned, so
    /// that it re-converges from zero after every change. It only
    /// accumulates while the capture angle is small, i.e. when travelling
    /// near-parallel to the track, and is clamped to
    /// [`XTRACK_I_LIMIT_RAD`].
    pub(crate) fn update_xtrack_integral(&mut self, nu1_rad: f64, dt_s: f64) -> f64 {
        let gain = self.params.xtrack_i_gain;

        if gain <= 0.0 || gain != self.xtrack_i_gain_prev {
            self.xtrack_i_rad = 0.0;
            self.xtrack_i_gain_prev = gain;
        } else if nu1_rad.abs() < XTRACK_I_ENGAGE_RAD {
            self.xtrack_i_rad = (self.xtrack_i_rad + nu1_rad * gain * dt_s)
                .clamp(-XTRACK_I_LIMIT_RAD, XTRACK_I_LIMIT_RAD);
        }

        self.xtrack_i_rad
    }

    /// Prevent indecision in the turn direction.
    ///
    /// If both the new and previous guidance angles are in the narrow band
    /// beyond 0.9 pi, the target bears more than 120 degrees off the nose,
    /// and the sign of the guidance angle has flipped, the previous angle
    /// is reused. Near a bearing error of 180 degrees small numerical
    /// perturbations would otherwise flip the commanded turn direction
    /// every cycle.
    pub(crate) fn prevent_indecision(
        &mut self,
        nu_rad: f64,
        target_bearing_rad: f64
    ) -> f64 {
        let nu_limit = 0.9 * std::f64::consts::PI;
        let bearing_limit = (120.0f64).to_radians();
        let bearing_off_nose =
            wrap_pi(target_bearing_rad - self.input.ahrs.yaw());

        if nu_rad.abs() > nu_limit
            && self.last_nu_rad.abs() > nu_limit
            && bearing_off_nose.abs() > bearing_limit
            && nu_rad * self.last_nu_rad < 0.0
        {
            self.report.indecision_hold = true;
            self.last_nu_rad
        } else {
            nu_rad
        }
    }

    /// Archive one telemetry record for this cycle, best-effort.
    fn write_record(&mut self, mode: &'static str) {
        let record = GuidRecord {
            time_s: self.input.time_s,
            mode,
            crosstrack_err_m: self.output.crosstrack_err_m,
            l1_dist_m: self.l1_dist_m,
            lat_accel_dem_ms2: self.output.lat_accel_dem_ms2,
            nav_bearing_rad: self.output.nav_bearing_rad,
            on_circle: self.output.on_circle,
            data_stale: self.output.data_stale,
        };

        // A failed telemetry write must never abort the control computation
        if let Err(e) = self.arch_record.serialise(record) {
            warn!("Could not archive the guidance record: {}", e);
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
