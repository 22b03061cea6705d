//! Mapping between the control domain and actuator travel
//!
//! Everything in here is built on [`map`], a linear interpolation that
//! saturates at both ends of the source range. The same primitive turns a
//! gimbal deflection into a servo horn angle, a throttle percentage into a
//! PWM pulse width, and back again with the domains swapped.
//!
//! # Example
//! ```
//! use tvc_attitude::{Axis, ActuatorMapper, PerAxis, REFERENCE_PITCH_RANGE, map};
//!
//! // Midpoint throttle onto a 0.5 ms..2.5 ms pulse
//! assert_eq!(map(50.0, 0.0, 100.0, 500_000.0, 2_500_000.0), 1_500_000.0);
//!
//! let mapper = ActuatorMapper::new(PerAxis::new(Some(REFERENCE_PITCH_RANGE), None, None));
//! assert!(mapper.is_actuated(Axis::Pitch));
//! assert!(!mapper.is_actuated(Axis::Roll));
//! assert_eq!(mapper.to_actuator(Axis::Pitch, 15.0), Some(180.0));
//! assert_eq!(mapper.to_actuator(Axis::Pitch, 40.0), Some(180.0)); // saturated
//! ```

use crate::types::{ActuatorRange, Axis, PerAxis};

/// Shortest servo pulse in nanoseconds
pub const MIN_PULSE_WIDTH_NS: f64 = 500_000.0;
/// Longest servo pulse in nanoseconds
pub const MAX_PULSE_WIDTH_NS: f64 = 2_500_000.0;

pub const MIN_THROTTLE_PERCENT: f64 = 0.0;
pub const MAX_THROTTLE_PERCENT: f64 = 100.0;

/// Linear interpolation from `[from_low, from_high]` onto `[to_low, to_high]`
///
/// Values at or below `from_low` give `to_low`, values at or above
/// `from_high` give `to_high`. A degenerate source range therefore never
/// divides by zero.
pub fn map(value: f64, from_low: f64, from_high: f64, to_low: f64, to_high: f64) -> f64 {
    if value <= from_low {
        to_low
    } else if value >= from_high {
        to_high
    } else {
        to_low + (to_high - to_low) / (from_high - from_low) * (value - from_low)
    }
}

/// Per-axis conversion between control-domain and actuator-domain degrees
///
/// An axis without an [`ActuatorRange`] is not actuated: its conversions
/// return `None` and callers skip it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorMapper {
    ranges: PerAxis<Option<ActuatorRange>>,
}

impl ActuatorMapper {
    pub fn new(ranges: PerAxis<Option<ActuatorRange>>) -> Self {
        Self { ranges }
    }

    pub fn is_actuated(&self, axis: Axis) -> bool {
        self.ranges[axis].is_some()
    }

    pub fn range(&self, axis: Axis) -> Option<&ActuatorRange> {
        self.ranges[axis].as_ref()
    }

    /// Actuated axes in control order
    pub fn actuated_axes(&self) -> impl Iterator<Item = Axis> + '_ {
        Axis::ALL.into_iter().filter(|axis| self.is_actuated(*axis))
    }

    /// Control-domain degrees to actuator degrees, saturated at both limits
    pub fn to_actuator(&self, axis: Axis, control_degrees: f64) -> Option<f64> {
        self.ranges[axis].map(|range| {
            map(
                control_degrees,
                range.control.lower,
                range.control.upper,
                range.actuator.lower,
                range.actuator.upper,
            )
        })
    }

    /// Actuator degrees back to the control domain
    pub fn to_control(&self, axis: Axis, actuator_degrees: f64) -> Option<f64> {
        self.ranges[axis].map(|range| {
            map(
                actuator_degrees,
                range.actuator.lower,
                range.actuator.upper,
                range.control.lower,
                range.control.upper,
            )
        })
    }

    /// Actuator angle of the control-domain centre, the parking position
    pub fn center(&self, axis: Axis) -> Option<f64> {
        self.ranges[axis].and_then(|range| self.to_actuator(axis, range.control.center))
    }

    /// Actuator angle of the control-domain default, the start position
    pub fn default_position(&self, axis: Axis) -> Option<f64> {
        self.ranges[axis].and_then(|range| self.to_actuator(axis, range.control.default))
    }
}

/// Throttle percentage to PWM pulse width and back
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleMapper {
    pub min_pulse_width_ns: f64,
    pub max_pulse_width_ns: f64,
}

impl ThrottleMapper {
    pub fn new(min_pulse_width_ns: f64, max_pulse_width_ns: f64) -> Self {
        Self {
            min_pulse_width_ns,
            max_pulse_width_ns,
        }
    }

    pub fn pulse_width(&self, percent: f64) -> f64 {
        map(
            percent,
            MIN_THROTTLE_PERCENT,
            MAX_THROTTLE_PERCENT,
            self.min_pulse_width_ns,
            self.max_pulse_width_ns,
        )
    }

    pub fn percent(&self, pulse_width_ns: f64) -> f64 {
        map(
            pulse_width_ns,
            self.min_pulse_width_ns,
            self.max_pulse_width_ns,
            MIN_THROTTLE_PERCENT,
            MAX_THROTTLE_PERCENT,
        )
    }
}

impl Default for ThrottleMapper {
    fn default() -> Self {
        Self::new(MIN_PULSE_WIDTH_NS, MAX_PULSE_WIDTH_NS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AxisLimits, REFERENCE_PITCH_RANGE, REFERENCE_YAW_RANGE};

    const EPSILON: f64 = 1e-9;

    fn reference_mapper() -> ActuatorMapper {
        ActuatorMapper::new(PerAxis::new(
            Some(REFERENCE_PITCH_RANGE),
            None,
            Some(REFERENCE_YAW_RANGE),
        ))
    }

    #[test]
    fn test_map_endpoints_and_saturation() {
        assert_eq!(map(0.0, 0.0, 100.0, 10.0, 20.0), 10.0);
        assert_eq!(map(100.0, 0.0, 100.0, 10.0, 20.0), 20.0);
        assert_eq!(map(-5.0, 0.0, 100.0, 10.0, 20.0), 10.0);
        assert_eq!(map(1e9, 0.0, 100.0, 10.0, 20.0), 20.0);
    }

    #[test]
    fn test_map_midpoint_throttle() {
        assert_eq!(map(50.0, 0.0, 100.0, 500_000.0, 2_500_000.0), 1_500_000.0);
    }

    #[test]
    fn test_map_is_monotonic() {
        let mut previous = f64::NEG_INFINITY;
        for step in -20..=120 {
            let mapped = map(step as f64, 0.0, 100.0, -15.0, 15.0);
            assert!(mapped >= previous, "map decreased at {step}");
            previous = mapped;
        }
    }

    #[test]
    fn test_map_round_trip_inside_range() {
        let (a, b, c, d) = (-15.0, 15.0, 0.0, 180.0);
        for x in [-14.9, -7.3, 0.0, 0.001, 9.5, 14.99] {
            let there = map(x, a, b, c, d);
            let back = map(there, c, d, a, b);
            assert!((back - x).abs() < EPSILON, "{x} came back as {back}");
        }
    }

    #[test]
    fn test_map_degenerate_source_range() {
        assert_eq!(map(3.0, 3.0, 3.0, 0.0, 1.0), 0.0);
        assert_eq!(map(4.0, 3.0, 3.0, 0.0, 1.0), 1.0);
    }

    #[test]
    fn test_roll_is_not_actuated() {
        let mapper = reference_mapper();
        assert_eq!(mapper.to_actuator(Axis::Roll, 1.0), None);
        assert_eq!(mapper.to_control(Axis::Roll, 90.0), None);
        assert_eq!(
            mapper.actuated_axes().collect::<Vec<_>>(),
            vec![Axis::Pitch, Axis::Yaw]
        );
    }

    #[test]
    fn test_axis_mapping_and_inverse() {
        let mapper = reference_mapper();
        assert_eq!(mapper.to_actuator(Axis::Yaw, -10.0), Some(0.0));
        assert_eq!(mapper.to_actuator(Axis::Yaw, 0.0), Some(90.0));
        assert_eq!(mapper.to_actuator(Axis::Pitch, -99.0), Some(0.0));

        let servo = mapper.to_actuator(Axis::Pitch, 6.0).unwrap();
        let back = mapper.to_control(Axis::Pitch, servo).unwrap();
        assert!((back - 6.0).abs() < EPSILON);
    }

    #[test]
    fn test_center_and_default_positions() {
        let range = ActuatorRange {
            control: AxisLimits {
                lower: -10.0,
                upper: 10.0,
                center: 0.0,
                default: 5.0,
            },
            actuator: AxisLimits::new(0.0, 180.0, 90.0),
        };
        let mapper = ActuatorMapper::new(PerAxis::new(Some(range), None, None));
        assert_eq!(mapper.center(Axis::Pitch), Some(90.0));
        assert_eq!(mapper.default_position(Axis::Pitch), Some(135.0));
        assert_eq!(mapper.center(Axis::Yaw), None);
    }

    #[test]
    fn test_throttle_mapper() {
        let throttle = ThrottleMapper::default();
        assert_eq!(throttle.pulse_width(0.0), MIN_PULSE_WIDTH_NS);
        assert_eq!(throttle.pulse_width(100.0), MAX_PULSE_WIDTH_NS);
        assert_eq!(throttle.pulse_width(50.0), 1_500_000.0);
        assert_eq!(throttle.pulse_width(150.0), MAX_PULSE_WIDTH_NS);
        assert_eq!(throttle.percent(1_500_000.0), 50.0);
        assert_eq!(throttle.percent(0.0), 0.0);
    }
}
