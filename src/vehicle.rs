//! Vehicle facade tying control and calibration together

use std::time::Instant;

use log::info;
use nalgebra::Vector3;

use crate::calibration::CalibrationManager;
use crate::control::AttitudeControlLoop;
use crate::error::CalibrationError;
use crate::sensor::{Actuator, CalibratedSensor, OrientationSource, RawChannels};
use crate::types::{Axis, CalibrationSettings, ControlSettings, FeedbackMode};

/// A thrust-vectored vehicle
///
/// On construction every axis is off and the gimbal moves to its default
/// position. [`shutdown`](Self::shutdown), also run on drop, stops any
/// calibration, switches feedback off and parks the gimbal at centre.
#[derive(Debug)]
pub struct TvcVehicle<O: OrientationSource, A: Actuator> {
    control: AttitudeControlLoop<O, A>,
    calibration: CalibrationManager,
    shut_down: bool,
}

impl<O: OrientationSource, A: Actuator> TvcVehicle<O, A> {
    pub fn new(settings: ControlSettings, source: O, actuator: A, now: Instant) -> Self {
        let mut control = AttitudeControlLoop::new(settings, source, actuator, now);
        control.move_to_defaults();
        Self {
            control,
            calibration: CalibrationManager::new(),
            shut_down: false,
        }
    }

    /// Apply `mode` to every actuated axis; unactuated axes stay off
    pub fn set_feedback(&mut self, mode: FeedbackMode) {
        for axis in Axis::ALL {
            let axis_mode = if self.control.mapper().is_actuated(axis) {
                mode
            } else {
                FeedbackMode::Off
            };
            self.control.set_feedback_mode(axis, axis_mode);
        }
        info!("feedback {mode:?}");
    }

    /// Mode of the first actuated axis, `Off` if nothing is actuated
    pub fn feedback(&self) -> FeedbackMode {
        self.control
            .mapper()
            .actuated_axes()
            .next()
            .map_or(FeedbackMode::Off, |axis| self.control.feedback_mode(axis))
    }

    pub fn set_orientation_degrees(&mut self, pitch: f64, roll: f64, yaw: f64) {
        self.control.set_setpoints_degrees(pitch, roll, yaw);
    }

    pub fn set_orientation_radians(&mut self, pitch: f64, roll: f64, yaw: f64) {
        self.control.set_setpoints_radians(pitch, roll, yaw);
    }

    /// Orientation setpoint as (pitch, roll, yaw) in degrees
    pub fn orientation_setpoint_degrees(&self) -> Vector3<f64> {
        self.control.setpoints_degrees()
    }

    /// Run a control step if one is due; see [`AttitudeControlLoop::tick`]
    pub fn update(&mut self, now: Instant) -> bool {
        self.control.tick(now)
    }

    /// Start a background calibration of `sensor`
    pub fn calibrate<S: RawChannels + 'static>(
        &mut self,
        sensor: &CalibratedSensor<S>,
        settings: CalibrationSettings,
    ) -> Result<(), CalibrationError> {
        self.calibration.start(sensor, settings)
    }

    /// True once every sensor a calibration was started for is calibrated
    pub fn calibrated(&self) -> bool {
        self.calibration.all_calibrated()
    }

    pub fn control(&self) -> &AttitudeControlLoop<O, A> {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut AttitudeControlLoop<O, A> {
        &mut self.control
    }

    pub fn calibration(&self) -> &CalibrationManager {
        &self.calibration
    }

    pub fn calibration_mut(&mut self) -> &mut CalibrationManager {
        &mut self.calibration
    }

    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.calibration.shutdown();
        self.control
            .set_feedback_modes(FeedbackMode::Off, FeedbackMode::Off, FeedbackMode::Off);
        self.control.park();
        self.shut_down = true;
        info!("vehicle shut down, gimbal parked");
    }
}

impl<O: OrientationSource, A: Actuator> Drop for TvcVehicle<O, A> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
