//! Per-axis feedback mode selection

use log::debug;

use crate::pid::PidAxisController;
use crate::types::{Axis, FeedbackMode, PerAxis};

/// Inputs of one axis for one control tick, in the loop's unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisInput {
    pub measured: f64,
    pub measured_rate: f64,
    pub setpoint: f64,
    /// Seconds since the last committed tick, always positive
    pub dt: f64,
}

/// Chooses what each axis outputs, based on its [`FeedbackMode`]
///
/// Every axis starts [`FeedbackMode::Off`]. A mode change takes effect on
/// the next [`update`](Self::update) of that axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeedbackModeStateMachine {
    modes: PerAxis<FeedbackMode>,
}

impl FeedbackModeStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self, axis: Axis) -> FeedbackMode {
        self.modes[axis]
    }

    pub fn modes(&self) -> PerAxis<FeedbackMode> {
        self.modes
    }

    pub fn set_mode(&mut self, axis: Axis, mode: FeedbackMode) {
        let previous = self.modes[axis];
        if previous != mode {
            debug!("{} feedback {:?} -> {:?}", axis.name(), previous, mode);
        }
        self.modes[axis] = mode;
    }

    pub fn set_modes(&mut self, modes: PerAxis<FeedbackMode>) {
        for axis in Axis::ALL {
            self.set_mode(axis, modes[axis]);
        }
    }

    /// Produce the output of `axis` for this tick
    ///
    /// - Off: the setpoint, integral cleared
    /// - Follow: the measurement, integral cleared
    /// - On: one PID step
    ///
    /// Off and Follow leave the last PID error in place, so with
    /// [`RateSource::DeriveFromError`](crate::types::RateSource::DeriveFromError) the
    /// first On step after them differentiates against that older error.
    pub fn update(&self, axis: Axis, controller: &mut PidAxisController, input: AxisInput) -> f64 {
        match self.modes[axis] {
            FeedbackMode::Off => controller.hold(input.measured, input.setpoint),
            FeedbackMode::Follow => controller.follow(input.measured, input.setpoint),
            FeedbackMode::On => {
                controller.update(input.measured, input.measured_rate, input.setpoint, input.dt)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PidGains, RateSource, REFERENCE_GAINS};

    fn input(measured: f64, setpoint: f64) -> AxisInput {
        AxisInput {
            measured,
            measured_rate: 0.0,
            setpoint,
            dt: 0.02,
        }
    }

    #[test]
    fn test_all_axes_start_off() {
        let machine = FeedbackModeStateMachine::new();
        assert_eq!(machine.modes(), PerAxis::splat(FeedbackMode::Off));
    }

    #[test]
    fn test_off_holds_setpoint_exactly() {
        let machine = FeedbackModeStateMachine::new();
        let mut pid = PidAxisController::new(REFERENCE_GAINS, RateSource::External);
        let output = machine.update(Axis::Pitch, &mut pid, input(3.7, 12.5));
        assert_eq!(output, 12.5);
        assert_eq!(pid.state().integral, 0.0);
    }

    #[test]
    fn test_follow_passes_measurement_through() {
        let mut machine = FeedbackModeStateMachine::new();
        machine.set_mode(Axis::Yaw, FeedbackMode::Follow);
        let mut pid = PidAxisController::new(REFERENCE_GAINS, RateSource::External);
        let output = machine.update(Axis::Yaw, &mut pid, input(-4.25, 1.0));
        assert_eq!(output, -4.25);
        assert_eq!(pid.state().integral, 0.0);
    }

    #[test]
    fn test_on_runs_pid() {
        let mut machine = FeedbackModeStateMachine::new();
        machine.set_mode(Axis::Pitch, FeedbackMode::On);
        let mut pid = PidAxisController::new(PidGains::new(0.30, 0.33, 0.23), RateSource::External);
        let output = machine.update(Axis::Pitch, &mut pid, input(0.1, 0.0));
        assert!((output - -0.03066).abs() < 1e-12);
    }

    #[test]
    fn test_switching_off_drops_accumulated_integral() {
        let mut machine = FeedbackModeStateMachine::new();
        let mut pid = PidAxisController::new(REFERENCE_GAINS, RateSource::External);

        machine.set_mode(Axis::Pitch, FeedbackMode::On);
        for _ in 0..50 {
            machine.update(Axis::Pitch, &mut pid, input(0.0, 1.0));
        }
        assert!(pid.state().integral > 0.9);

        machine.set_mode(Axis::Pitch, FeedbackMode::Off);
        machine.update(Axis::Pitch, &mut pid, input(0.0, 1.0));
        assert_eq!(pid.state().integral, 0.0);

        // back on: integral restarts from this tick only
        machine.set_mode(Axis::Pitch, FeedbackMode::On);
        machine.update(Axis::Pitch, &mut pid, input(0.0, 1.0));
        assert!((pid.state().integral - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_derived_rate_resumes_from_last_on_error() {
        let mut machine = FeedbackModeStateMachine::new();
        let gains = PidGains::new(0.0, 0.0, 1.0);
        let mut pid = PidAxisController::new(gains, RateSource::DeriveFromError);

        machine.set_mode(Axis::Pitch, FeedbackMode::On);
        machine.update(Axis::Pitch, &mut pid, input(0.0, 1.0));

        machine.set_mode(Axis::Pitch, FeedbackMode::Off);
        machine.update(Axis::Pitch, &mut pid, input(0.0, 3.0));
        assert_eq!(pid.state().previous_error, 1.0);

        // error 1 -> 3 over 0.02 s
        machine.set_mode(Axis::Pitch, FeedbackMode::On);
        let output = machine.update(Axis::Pitch, &mut pid, input(0.0, 3.0));
        assert!((output - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_modes_are_independent_per_axis() {
        let mut machine = FeedbackModeStateMachine::new();
        machine.set_modes(PerAxis::new(FeedbackMode::On, FeedbackMode::Off, FeedbackMode::Follow));
        assert_eq!(machine.mode(Axis::Pitch), FeedbackMode::On);
        assert_eq!(machine.mode(Axis::Roll), FeedbackMode::Off);
        assert_eq!(machine.mode(Axis::Yaw), FeedbackMode::Follow);
    }
}
