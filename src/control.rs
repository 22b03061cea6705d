//! Fixed-rate attitude control loop

use std::time::{Duration, Instant};

use log::{info, trace};
use nalgebra::Vector3;

use crate::feedback::{AxisInput, FeedbackModeStateMachine};
use crate::mapper::ActuatorMapper;
use crate::pid::{AxisState, PidAxisController};
use crate::sensor::{Actuator, OrientationSource};
use crate::types::{Axis, ControlSettings, FeedbackMode, PerAxis};

/// Gate deciding when the next control tick is due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlLoopTiming {
    last_tick: Instant,
    sample_period: Duration,
}

impl ControlLoopTiming {
    pub fn new(now: Instant, sample_period: Duration) -> Self {
        Self {
            last_tick: now,
            sample_period,
        }
    }

    /// Seconds since the last tick if a tick is due at `now`
    ///
    /// A tick is due once at least one sample period has passed. A clock
    /// that stood still or went backwards never makes a tick due, so the
    /// returned interval is always positive.
    pub fn due(&self, now: Instant) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.last_tick);
        if elapsed.is_zero() || elapsed < self.sample_period {
            None
        } else {
            Some(elapsed.as_secs_f64())
        }
    }

    pub fn commit(&mut self, now: Instant) {
        self.last_tick = now;
    }

    pub fn last_tick(&self) -> Instant {
        self.last_tick
    }

    pub fn sample_period(&self) -> Duration {
        self.sample_period
    }
}

/// Closed-loop attitude controller for one vehicle
///
/// Call [`tick`](Self::tick) as often as convenient. Work is only done once
/// per sample period: the loop reads one orientation and one rate snapshot,
/// runs every axis through its feedback mode, and drives the actuated axes.
/// Axes without actuator travel (roll on the reference gimbal) are still
/// computed but never written.
///
/// Setpoints, measurements and outputs are in [`ControlSettings::unit`];
/// the `_degrees` and `_radians` accessors convert at the boundary.
///
/// # Example
/// ```
/// use std::time::{Duration, Instant};
/// use nalgebra::Vector3;
/// use tvc_attitude::{
///     Actuator, AttitudeControlLoop, Axis, ControlSettings, FeedbackMode, OrientationSource,
/// };
///
/// struct Still;
///
/// impl OrientationSource for Still {
///     fn read_orientation(&mut self) -> Vector3<f64> {
///         Vector3::new(2.0, 0.0, -1.0)
///     }
///
///     fn read_angular_rate(&mut self) -> Vector3<f64> {
///         Vector3::zeros()
///     }
/// }
///
/// #[derive(Default)]
/// struct Gimbal(Vec<(Axis, f64)>);
///
/// impl Actuator for Gimbal {
///     fn write_angle(&mut self, axis: Axis, degrees: f64) {
///         self.0.push((axis, degrees));
///     }
/// }
///
/// let start = Instant::now();
/// let settings = ControlSettings::default();
/// let mut control = AttitudeControlLoop::new(settings, Still, Gimbal::default(), start);
/// control.set_feedback_modes(FeedbackMode::On, FeedbackMode::Off, FeedbackMode::On);
///
/// assert!(!control.tick(start));
/// assert!(control.tick(start + Duration::from_millis(20)));
///
/// let written: Vec<Axis> = control.actuator().0.iter().map(|(axis, _)| *axis).collect();
/// assert_eq!(written, vec![Axis::Pitch, Axis::Yaw]);
/// ```
#[derive(Debug)]
pub struct AttitudeControlLoop<O, A> {
    settings: ControlSettings,
    source: O,
    actuator: A,
    mapper: ActuatorMapper,
    modes: FeedbackModeStateMachine,
    axes: PerAxis<PidAxisController>,
    setpoints: PerAxis<f64>,
    timing: ControlLoopTiming,
    ticks: u64,
}

impl<O: OrientationSource, A: Actuator> AttitudeControlLoop<O, A> {
    /// Build a loop whose first tick is due one sample period after `now`
    pub fn new(settings: ControlSettings, source: O, actuator: A, now: Instant) -> Self {
        info!(
            "attitude control at {:.1} Hz, {:?}, {:?} rate",
            1.0 / settings.sample_period.as_secs_f64(),
            settings.unit,
            settings.rate_source
        );
        Self {
            mapper: ActuatorMapper::new(settings.actuation),
            modes: FeedbackModeStateMachine::new(),
            axes: settings
                .gains
                .map(|_, gains| PidAxisController::new(*gains, settings.rate_source)),
            setpoints: PerAxis::default(),
            timing: ControlLoopTiming::new(now, settings.sample_period),
            ticks: 0,
            settings,
            source,
            actuator,
        }
    }

    /// Run one control step if a sample period has passed since the last
    ///
    /// Returns whether a step ran. The tick time is only committed after
    /// every axis is processed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let Some(dt) = self.timing.due(now) else {
            trace!("tick skipped, period not elapsed");
            return false;
        };

        let unit = self.settings.unit;
        let orientation = self.source.read_orientation();
        let angular_rate = self.source.read_angular_rate();

        for axis in Axis::ALL {
            let input = AxisInput {
                measured: unit.from_degrees(orientation[axis.index()]),
                measured_rate: unit.from_radians(angular_rate[axis.index()]),
                setpoint: self.setpoints[axis],
                dt,
            };
            let output = self.modes.update(axis, &mut self.axes[axis], input);

            if let Some(position) = self.mapper.to_actuator(axis, unit.to_degrees(output)) {
                self.actuator.write_angle(axis, position);
            }
        }

        self.timing.commit(now);
        self.ticks += 1;
        trace!(
            "tick {} dt {:.4}s outputs {:?}",
            self.ticks,
            dt,
            self.outputs()
        );
        true
    }

    /// Drive every actuated axis to the position its limits start at
    pub fn move_to_defaults(&mut self) {
        for axis in Axis::ALL {
            if let Some(position) = self.mapper.default_position(axis) {
                self.actuator.write_angle(axis, position);
            }
        }
    }

    /// Drive every actuated axis to its centre
    pub fn park(&mut self) {
        for axis in Axis::ALL {
            if let Some(position) = self.mapper.center(axis) {
                self.actuator.write_angle(axis, position);
            }
        }
    }

    pub fn set_setpoint(&mut self, axis: Axis, value: f64) {
        self.setpoints[axis] = value;
    }

    pub fn set_setpoint_degrees(&mut self, axis: Axis, degrees: f64) {
        self.setpoints[axis] = self.settings.unit.from_degrees(degrees);
    }

    pub fn set_setpoint_radians(&mut self, axis: Axis, radians: f64) {
        self.setpoints[axis] = self.settings.unit.from_radians(radians);
    }

    pub fn set_setpoints(&mut self, setpoints: PerAxis<f64>) {
        self.setpoints = setpoints;
    }

    pub fn set_setpoints_degrees(&mut self, pitch: f64, roll: f64, yaw: f64) {
        let unit = self.settings.unit;
        self.setpoints =
            PerAxis::new(pitch, roll, yaw).map(|_, degrees| unit.from_degrees(*degrees));
    }

    pub fn set_setpoints_radians(&mut self, pitch: f64, roll: f64, yaw: f64) {
        let unit = self.settings.unit;
        self.setpoints =
            PerAxis::new(pitch, roll, yaw).map(|_, radians| unit.from_radians(*radians));
    }

    pub fn setpoints(&self) -> PerAxis<f64> {
        self.setpoints
    }

    pub fn setpoints_degrees(&self) -> Vector3<f64> {
        let unit = self.settings.unit;
        self.setpoints.map(|_, value| unit.to_degrees(*value)).to_vector()
    }

    pub fn setpoints_radians(&self) -> Vector3<f64> {
        let unit = self.settings.unit;
        self.setpoints.map(|_, value| unit.to_radians(*value)).to_vector()
    }

    pub fn set_feedback_mode(&mut self, axis: Axis, mode: FeedbackMode) {
        self.modes.set_mode(axis, mode);
    }

    pub fn set_feedback_modes(
        &mut self,
        pitch: FeedbackMode,
        roll: FeedbackMode,
        yaw: FeedbackMode,
    ) {
        self.modes.set_modes(PerAxis::new(pitch, roll, yaw));
    }

    pub fn feedback_mode(&self, axis: Axis) -> FeedbackMode {
        self.modes.mode(axis)
    }

    pub fn feedback_modes(&self) -> PerAxis<FeedbackMode> {
        self.modes.modes()
    }

    pub fn outputs(&self) -> PerAxis<f64> {
        self.axes.map(|_, pid| pid.output())
    }

    pub fn outputs_degrees(&self) -> Vector3<f64> {
        let unit = self.settings.unit;
        self.axes.map(|_, pid| unit.to_degrees(pid.output())).to_vector()
    }

    pub fn outputs_radians(&self) -> Vector3<f64> {
        let unit = self.settings.unit;
        self.axes.map(|_, pid| unit.to_radians(pid.output())).to_vector()
    }

    /// Measurements seen on the last tick
    pub fn measurements(&self) -> PerAxis<f64> {
        self.axes.map(|_, pid| pid.state().measured)
    }

    pub fn measurements_degrees(&self) -> Vector3<f64> {
        let unit = self.settings.unit;
        self.axes.map(|_, pid| unit.to_degrees(pid.state().measured)).to_vector()
    }

    pub fn measurements_radians(&self) -> Vector3<f64> {
        let unit = self.settings.unit;
        self.axes.map(|_, pid| unit.to_radians(pid.state().measured)).to_vector()
    }

    pub fn axis_state(&self, axis: Axis) -> &AxisState {
        self.axes[axis].state()
    }

    pub fn controller(&self, axis: Axis) -> &PidAxisController {
        &self.axes[axis]
    }

    pub fn controller_mut(&mut self, axis: Axis) -> &mut PidAxisController {
        &mut self.axes[axis]
    }

    pub fn mapper(&self) -> &ActuatorMapper {
        &self.mapper
    }

    pub fn timing(&self) -> &ControlLoopTiming {
        &self.timing
    }

    /// Number of control steps run so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    pub fn source(&self) -> &O {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut O {
        &mut self.source
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn actuator_mut(&mut self) -> &mut A {
        &mut self.actuator
    }

    pub fn into_parts(self) -> (O, A) {
        (self.source, self.actuator)
    }
}
