//! Per-axis PID controller

use crate::types::{PidGains, RateSource};

/// Controller state of one axis
///
/// All angles are in the control loop's unit, rates in that unit per
/// second, the integral in unit-seconds. Everything starts at zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisState {
    pub setpoint: f64,
    pub measured: f64,
    /// Rate fed to the derivative term on the last update
    pub measured_rate: f64,
    pub previous_error: f64,
    pub integral: f64,
    pub output: f64,
}

/// PID controller for a single axis
///
/// The derivative term either differentiates successive errors or uses
/// the gyroscope rate directly, fixed at construction by [`RateSource`].
///
/// # Example
/// ```
/// use tvc_attitude::{PidAxisController, PidGains, RateSource};
///
/// let mut pid = PidAxisController::new(PidGains::new(0.30, 0.33, 0.23), RateSource::External);
/// let output = pid.update(0.1, 0.0, 0.0, 0.02);
/// assert!((output - -0.03066).abs() < 1e-12);
/// assert!((pid.state().integral - -0.002).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PidAxisController {
    gains: PidGains,
    rate_source: RateSource,
    state: AxisState,
}

impl PidAxisController {
    pub fn new(gains: PidGains, rate_source: RateSource) -> Self {
        Self {
            gains,
            rate_source,
            state: AxisState::default(),
        }
    }

    /// Run one PID step and return the new output
    ///
    /// `measured_rate` is only read with [`RateSource::External`]. `dt` must
    /// be positive; the control loop's timing gate guarantees it.
    pub fn update(&mut self, measured: f64, measured_rate: f64, setpoint: f64, dt: f64) -> f64 {
        let error = setpoint - measured;

        let rate = match self.rate_source {
            RateSource::External => measured_rate,
            RateSource::DeriveFromError => (error - self.state.previous_error) / dt,
        };

        let mut integral = self.state.integral + error * dt;
        if let Some(limit) = self.gains.integral_limit.filter(|limit| limit.is_finite()) {
            let limit = limit.abs();
            integral = integral.clamp(-limit, limit);
        }

        let output = self.gains.kp * error + self.gains.kd * rate + self.gains.ki * integral;

        self.state = AxisState {
            setpoint,
            measured,
            measured_rate: rate,
            previous_error: error,
            integral,
            output,
        };
        output
    }

    /// Hold the output at `setpoint` and clear the integral
    pub fn hold(&mut self, measured: f64, setpoint: f64) -> f64 {
        self.state.setpoint = setpoint;
        self.state.measured = measured;
        self.state.integral = 0.0;
        self.state.output = setpoint;
        setpoint
    }

    /// Pass `measured` straight through and clear the integral
    pub fn follow(&mut self, measured: f64, setpoint: f64) -> f64 {
        self.state.setpoint = setpoint;
        self.state.measured = measured;
        self.state.integral = 0.0;
        self.state.output = measured;
        measured
    }

    /// Zero all state, keeping gains and rate source
    pub fn reset(&mut self) {
        self.state = AxisState::default();
    }

    pub fn state(&self) -> &AxisState {
        &self.state
    }

    pub fn output(&self) -> f64 {
        self.state.output
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains = gains;
    }

    pub fn rate_source(&self) -> RateSource {
        self.rate_source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-12;

    fn reference(rate_source: RateSource) -> PidAxisController {
        PidAxisController::new(PidGains::new(0.30, 0.33, 0.23), rate_source)
    }

    #[test]
    fn test_new_controller_is_zeroed() {
        let pid = reference(RateSource::External);
        assert_eq!(*pid.state(), AxisState::default());
    }

    #[test]
    fn test_reference_step() {
        let mut pid = reference(RateSource::External);
        let output = pid.update(0.1, 0.0, 0.0, 0.02);

        let state = pid.state();
        assert!((state.previous_error - -0.1).abs() < EPSILON);
        assert!((state.integral - -0.002).abs() < EPSILON);
        assert!((output - -0.03066).abs() < EPSILON);
        assert_eq!(state.output, output);
    }

    #[test]
    fn test_external_rate_feeds_derivative() {
        let mut pid = PidAxisController::new(PidGains::new(0.0, 0.0, 2.0), RateSource::External);
        let output = pid.update(0.0, 0.5, 0.0, 0.02);
        assert!((output - 1.0).abs() < EPSILON);
        assert_eq!(pid.state().measured_rate, 0.5);
    }

    #[test]
    fn test_derived_rate_uses_error_deltas() {
        let mut pid =
            PidAxisController::new(PidGains::new(0.0, 0.0, 1.0), RateSource::DeriveFromError);

        // error goes 0 -> -0.1 over 0.02 s: rate -5
        let first = pid.update(0.1, 123.0, 0.0, 0.02);
        assert!((first - -5.0).abs() < 1e-9);
        assert!((pid.state().measured_rate - -5.0).abs() < 1e-9);

        // error constant: rate 0, the gyro value is ignored
        let second = pid.update(0.1, 123.0, 0.0, 0.02);
        assert!(second.abs() < 1e-9);
    }

    #[test]
    fn test_zero_error_output_decays_to_zero() {
        let mut pid = reference(RateSource::DeriveFromError);
        let mut previous_integral = 0.0;
        for _ in 0..100 {
            let output = pid.update(0.25, 0.0, 0.25, 0.02);
            assert_eq!(pid.state().integral, previous_integral);
            assert!(output.abs() < EPSILON);
            previous_integral = pid.state().integral;
        }
    }

    #[test]
    fn test_integral_unbounded_by_default() {
        let mut pid = reference(RateSource::External);
        for _ in 0..1000 {
            pid.update(0.0, 0.0, 1.0, 0.02);
        }
        assert!((pid.state().integral - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_integral_limit_clamps_windup() {
        let gains = PidGains {
            integral_limit: Some(0.5),
            ..PidGains::new(0.30, 0.33, 0.23)
        };
        let mut pid = PidAxisController::new(gains, RateSource::External);
        for _ in 0..1000 {
            pid.update(0.0, 0.0, 1.0, 0.02);
        }
        assert_eq!(pid.state().integral, 0.5);

        for _ in 0..1000 {
            pid.update(0.0, 0.0, -1.0, 0.02);
        }
        assert_eq!(pid.state().integral, -0.5);
    }

    #[test]
    fn test_hold_and_follow_clear_integral() {
        let mut pid = reference(RateSource::External);
        pid.update(0.0, 0.0, 1.0, 0.02);
        assert!(pid.state().integral != 0.0);

        assert_eq!(pid.hold(3.0, 12.5), 12.5);
        assert_eq!(pid.state().integral, 0.0);
        assert_eq!(pid.output(), 12.5);

        pid.update(0.0, 0.0, 1.0, 0.02);
        assert_eq!(pid.follow(3.0, 12.5), 3.0);
        assert_eq!(pid.state().integral, 0.0);
        assert_eq!(pid.output(), 3.0);
    }

    #[test]
    fn test_set_gains_applies_from_next_update() {
        let mut pid = reference(RateSource::External);
        pid.update(0.1, 0.0, 0.0, 0.02);

        pid.set_gains(PidGains::new(2.0, 0.0, 0.0));
        assert_eq!(pid.gains(), PidGains::new(2.0, 0.0, 0.0));
        let output = pid.update(0.1, 0.0, 0.0, 0.02);
        assert!((output - -0.2).abs() < EPSILON);
        // state carries over the gain change
        assert!((pid.state().integral - -0.004).abs() < EPSILON);
    }

    #[test]
    fn test_reset_keeps_gains() {
        let mut pid = reference(RateSource::DeriveFromError);
        pid.update(1.0, 0.0, 0.0, 0.02);
        pid.reset();
        assert_eq!(*pid.state(), AxisState::default());
        assert_eq!(pid.gains(), PidGains::new(0.30, 0.33, 0.23));
        assert_eq!(pid.rate_source(), RateSource::DeriveFromError);
    }
}
