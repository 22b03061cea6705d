//! Core types and settings for the attitude controller

use core::ops::{Index, IndexMut};
use core::time::Duration;

use nalgebra::Vector3;

use crate::math::{DEG_TO_RAD, RAD_TO_DEG};

/// Rotational degree of freedom of the vehicle
///
/// Axes are always visited in the order of [`Axis::ALL`]: pitch, roll, yaw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Axis {
    Pitch,
    Roll,
    Yaw,
}

impl Axis {
    /// All axes in control order
    pub const ALL: [Axis; 3] = [Axis::Pitch, Axis::Roll, Axis::Yaw];

    /// Position of the axis in [`Axis::ALL`]
    pub const fn index(self) -> usize {
        match self {
            Axis::Pitch => 0,
            Axis::Roll => 1,
            Axis::Yaw => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Axis::Pitch => "pitch",
            Axis::Roll => "roll",
            Axis::Yaw => "yaw",
        }
    }
}

/// One value per axis
///
/// Indexable by [`Axis`], so per-axis configuration and state never go
/// through bare array indices.
///
/// # Example
/// ```
/// use tvc_attitude::{Axis, PerAxis};
///
/// let mut values = PerAxis::new(1.0, 2.0, 3.0);
/// values[Axis::Roll] = 20.0;
/// assert_eq!(values.roll, 20.0);
/// assert_eq!(values[Axis::Yaw], 3.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PerAxis<T> {
    pub pitch: T,
    pub roll: T,
    pub yaw: T,
}

impl<T> PerAxis<T> {
    pub const fn new(pitch: T, roll: T, yaw: T) -> Self {
        Self { pitch, roll, yaw }
    }

    /// Same value on every axis
    pub fn splat(value: T) -> Self
    where
        T: Clone,
    {
        Self {
            pitch: value.clone(),
            roll: value.clone(),
            yaw: value,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(Axis, &T) -> U) -> PerAxis<U> {
        PerAxis {
            pitch: f(Axis::Pitch, &self.pitch),
            roll: f(Axis::Roll, &self.roll),
            yaw: f(Axis::Yaw, &self.yaw),
        }
    }

    /// Iterate `(axis, value)` pairs in control order
    pub fn iter(&self) -> impl Iterator<Item = (Axis, &T)> {
        Axis::ALL.into_iter().map(move |axis| (axis, &self[axis]))
    }
}

impl PerAxis<f64> {
    /// Interpret a vector as (pitch, roll, yaw)
    pub fn from_vector(vector: Vector3<f64>) -> Self {
        Self::new(vector.x, vector.y, vector.z)
    }

    pub fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.pitch, self.roll, self.yaw)
    }
}

impl<T> Index<Axis> for PerAxis<T> {
    type Output = T;

    fn index(&self, axis: Axis) -> &T {
        match axis {
            Axis::Pitch => &self.pitch,
            Axis::Roll => &self.roll,
            Axis::Yaw => &self.yaw,
        }
    }
}

impl<T> IndexMut<Axis> for PerAxis<T> {
    fn index_mut(&mut self, axis: Axis) -> &mut T {
        match axis {
            Axis::Pitch => &mut self.pitch,
            Axis::Roll => &mut self.roll,
            Axis::Yaw => &mut self.yaw,
        }
    }
}

/// Per-axis feedback mode
///
/// Any mode may follow any other; the mode only shapes the axis output.
///
/// - **Off**: output holds the setpoint, integral is reset
/// - **On**: full PID control
/// - **Follow**: output passes the measured value through, integral is reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FeedbackMode {
    #[default]
    Off,
    On,
    Follow,
}

/// Where the derivative term gets its rate from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RateSource {
    /// Rate is `(error - previous_error) / dt`
    DeriveFromError,
    /// Rate is the angular rate measured by the gyroscope
    #[default]
    External,
}

/// Angle unit the control loop reasons in
///
/// Setpoints, measurements, integral and outputs all live in this unit.
/// Conversion happens only where degrees enter (sensor, actuator limits)
/// or leave the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AngleUnit {
    #[default]
    Radians,
    Degrees,
}

impl AngleUnit {
    pub fn from_degrees(self, degrees: f64) -> f64 {
        match self {
            AngleUnit::Radians => degrees * DEG_TO_RAD,
            AngleUnit::Degrees => degrees,
        }
    }

    pub fn to_degrees(self, value: f64) -> f64 {
        match self {
            AngleUnit::Radians => value * RAD_TO_DEG,
            AngleUnit::Degrees => value,
        }
    }

    pub fn from_radians(self, radians: f64) -> f64 {
        match self {
            AngleUnit::Radians => radians,
            AngleUnit::Degrees => radians * RAD_TO_DEG,
        }
    }

    pub fn to_radians(self, value: f64) -> f64 {
        match self {
            AngleUnit::Radians => value,
            AngleUnit::Degrees => value * DEG_TO_RAD,
        }
    }
}

/// PID gains for one axis
///
/// # Example
/// ```
/// use tvc_attitude::PidGains;
///
/// let gains = PidGains {
///     integral_limit: Some(0.5), // opt-in anti-windup
///     ..PidGains::new(0.30, 0.33, 0.23)
/// };
/// assert_eq!(gains.kp, 0.30);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PidGains {
    /// Proportional gain
    pub kp: f64,
    /// Integral gain
    pub ki: f64,
    /// Derivative gain
    pub kd: f64,
    /// Symmetric bound on the integral of error
    ///
    /// `None` leaves the integral unbounded, which reproduces the reference
    /// vehicle numerically but is prone to windup.
    pub integral_limit: Option<f64>,
}

impl PidGains {
    pub const fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            integral_limit: None,
        }
    }
}

/// Angle limits of one axis in one coordinate system, in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AxisLimits {
    pub lower: f64,
    pub upper: f64,
    /// Parking position
    pub center: f64,
    /// Position taken when the vehicle starts
    pub default: f64,
}

impl AxisLimits {
    /// Limits with centre and default both at `center`
    pub const fn new(lower: f64, upper: f64, center: f64) -> Self {
        Self {
            lower,
            upper,
            center,
            default: center,
        }
    }

    pub fn contains(&self, degrees: f64) -> bool {
        degrees >= self.lower && degrees <= self.upper
    }
}

/// Pairing of the vehicle-centric and actuator-centric limits of an axis
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActuatorRange {
    /// Limits in the control domain (e.g. ±15° of gimbal deflection)
    pub control: AxisLimits,
    /// Limits in the actuator's own travel (e.g. 0..180° servo horn)
    pub actuator: AxisLimits,
}

/// Reference gimbal: pitch ±15° onto a servo centred at 80°
pub const REFERENCE_PITCH_RANGE: ActuatorRange = ActuatorRange {
    control: AxisLimits::new(-15.0, 15.0, 0.0),
    actuator: AxisLimits::new(0.0, 180.0, 80.0),
};

/// Reference gimbal: yaw ±10° onto a servo centred at 103°
pub const REFERENCE_YAW_RANGE: ActuatorRange = ActuatorRange {
    control: AxisLimits::new(-10.0, 10.0, 0.0),
    actuator: AxisLimits::new(0.0, 180.0, 103.0),
};

/// Reference gains shared by every axis
pub const REFERENCE_GAINS: PidGains = PidGains::new(0.30, 0.33, 0.23);

/// Attitude control loop settings
///
/// The default describes the reference vehicle: a two-axis gimbal (pitch
/// and yaw, roll is measured but never actuated) controlled at 50 Hz.
///
/// # Example
/// ```
/// use core::time::Duration;
/// use tvc_attitude::{AngleUnit, ControlSettings, RateSource};
///
/// let settings = ControlSettings {
///     sample_period: Duration::from_millis(10), // 100 Hz
///     unit: AngleUnit::Degrees,
///     rate_source: RateSource::DeriveFromError,
///     ..Default::default()
/// };
/// assert!(settings.actuation.roll.is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControlSettings {
    /// Minimum interval between committed control ticks
    pub sample_period: Duration,
    /// Unit of setpoints, measurements and outputs
    pub unit: AngleUnit,
    /// Rate input of the derivative term
    pub rate_source: RateSource,
    /// Gains per axis
    pub gains: PerAxis<PidGains>,
    /// Actuator mapping per axis; `None` means the axis is not actuated
    pub actuation: PerAxis<Option<ActuatorRange>>,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            sample_period: Duration::from_millis(20),
            unit: AngleUnit::default(),
            rate_source: RateSource::default(),
            gains: PerAxis::splat(REFERENCE_GAINS),
            actuation: PerAxis::new(Some(REFERENCE_PITCH_RANGE), None, Some(REFERENCE_YAW_RANGE)),
        }
    }
}

/// Length of a calibration run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CalibrationDuration {
    OneSecond,
    OneMinute,
    FiveMinutes,
}

impl CalibrationDuration {
    fn seconds(self) -> u32 {
        match self {
            CalibrationDuration::OneSecond => 1,
            CalibrationDuration::OneMinute => 60,
            CalibrationDuration::FiveMinutes => 300,
        }
    }
}

/// Inter-sample delay of the orientation IMU (100 Hz)
pub const IMU_SAMPLE_DELAY: Duration = Duration::from_millis(10);
pub const IMU_SAMPLES_PER_SECOND: u32 = 100;

/// Inter-sample delay of the barometer
pub const BAROMETER_SAMPLE_DELAY: Duration = Duration::from_millis(50);
pub const BAROMETER_SAMPLES_PER_SECOND: u32 = 21;

/// Offset zeroing settings for one sensor
///
/// Targets are in raw channel counts, one per channel. An empty target
/// list zeroes every channel.
///
/// # Example
/// ```
/// use tvc_attitude::{CalibrationDuration, CalibrationSettings};
///
/// let settings = CalibrationSettings::imu(CalibrationDuration::OneMinute);
/// assert_eq!(settings.sample_count, 6000);
///
/// let baro = CalibrationSettings::barometer(CalibrationDuration::OneSecond)
///     .with_targets(vec![2260.0, 100102.0, 33400.0]);
/// assert_eq!(baro.targets.len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalibrationSettings {
    /// Number of samples averaged per channel
    pub sample_count: u32,
    /// Delay between samples, the sensor's settling time
    pub sample_delay: Duration,
    /// Value each channel should read after zeroing
    pub targets: Vec<f64>,
}

impl CalibrationSettings {
    pub fn new(sample_count: u32, sample_delay: Duration) -> Self {
        Self {
            sample_count,
            sample_delay,
            targets: Vec::new(),
        }
    }

    pub fn imu(duration: CalibrationDuration) -> Self {
        Self::new(IMU_SAMPLES_PER_SECOND * duration.seconds(), IMU_SAMPLE_DELAY)
    }

    pub fn barometer(duration: CalibrationDuration) -> Self {
        Self::new(
            BAROMETER_SAMPLES_PER_SECOND * duration.seconds(),
            BAROMETER_SAMPLE_DELAY,
        )
    }

    pub fn with_targets(mut self, targets: Vec<f64>) -> Self {
        self.targets = targets;
        self
    }
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self::imu(CalibrationDuration::OneSecond)
    }
}
