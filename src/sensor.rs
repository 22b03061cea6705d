//! Sensor and actuator interfaces
//!
//! The control loop talks to hardware only through [`OrientationSource`] and
//! [`Actuator`]. Drivers expose their registers as [`RawChannels`]; wrapping
//! one in a [`CalibratedSensor`] makes it shareable between the control
//! thread and a calibration worker, and [`ImuOrientation`] and
//! [`BarometerAltitude`] turn the corrected channels into physical values.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use nalgebra::Vector3;

use crate::calibration::{CalibrationOffsets, CalibrationStatus};
use crate::math::Vector3Ext;
use crate::types::Axis;

/// Source of vehicle attitude
pub trait OrientationSource {
    /// Current (pitch, roll, yaw) in degrees
    fn read_orientation(&mut self) -> Vector3<f64>;

    /// Current angular rate in rad/s about the pitch, roll and yaw axes
    fn read_angular_rate(&mut self) -> Vector3<f64>;
}

/// Source of barometric readings
pub trait AltitudeSource {
    /// Temperature in degrees Celsius
    fn read_temperature(&mut self) -> f64;

    /// Pressure in millibar
    fn read_pressure(&mut self) -> f64;

    /// Altitude in metres
    fn read_altitude(&mut self) -> f64;
}

/// Something that moves an axis, typically a gimbal servo
pub trait Actuator {
    /// Drive `axis` to `degrees` of actuator travel
    fn write_angle(&mut self, axis: Axis, degrees: f64);
}

impl<T: OrientationSource + ?Sized> OrientationSource for &mut T {
    fn read_orientation(&mut self) -> Vector3<f64> {
        (**self).read_orientation()
    }

    fn read_angular_rate(&mut self) -> Vector3<f64> {
        (**self).read_angular_rate()
    }
}

impl<T: Actuator + ?Sized> Actuator for &mut T {
    fn write_angle(&mut self, axis: Axis, degrees: f64) {
        (**self).write_angle(axis, degrees)
    }
}

/// A device read as a fixed set of integer channels
///
/// Reads are best effort: a driver that fails to talk to its device keeps
/// the previous values in `out` rather than erroring.
pub trait RawChannels: Send {
    fn channel_count(&self) -> usize;

    /// Fill `out` (one slot per channel) with a single snapshot
    fn read_channels(&mut self, out: &mut [i64]);
}

struct Shared<S> {
    name: String,
    channels: usize,
    device: Mutex<S>,
    offsets: RwLock<CalibrationOffsets>,
    status: Arc<CalibrationStatus>,
}

/// Shared handle to a raw device and its calibration offsets
///
/// Clones refer to the same device. Offsets are swapped as one unit when a
/// calibration commits, so a corrected reading never mixes two runs.
pub struct CalibratedSensor<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for CalibratedSensor<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> core::fmt::Debug for CalibratedSensor<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CalibratedSensor")
            .field("name", &self.shared.name)
            .field("channels", &self.shared.channels)
            .field("status", &self.shared.status)
            .finish()
    }
}

impl<S: RawChannels> CalibratedSensor<S> {
    pub fn new(name: impl Into<String>, device: S) -> Self {
        let channels = device.channel_count();
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                channels,
                device: Mutex::new(device),
                offsets: RwLock::new(CalibrationOffsets::zeroed(channels)),
                status: Arc::new(CalibrationStatus::new()),
            }),
        }
    }

    /// One uncorrected snapshot of every channel into `out`
    pub fn read_raw(&self, out: &mut [i64]) {
        let mut device = self.shared.device.lock().unwrap_or_else(PoisonError::into_inner);
        device.read_channels(out);
    }

    /// One snapshot of every channel with the current offsets applied
    pub fn read_corrected(&self) -> Vec<f64> {
        let mut raw = vec![0; self.shared.channels];
        self.read_raw(&mut raw);
        self.offsets().apply(&raw)
    }

    /// Run `f` with exclusive access to the device
    pub fn with_device<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut device = self.shared.device.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut device)
    }
}

impl<S> CalibratedSensor<S> {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn channel_count(&self) -> usize {
        self.shared.channels
    }

    pub fn offsets(&self) -> CalibrationOffsets {
        self.shared
            .offsets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> &Arc<CalibrationStatus> {
        &self.shared.status
    }

    pub fn is_calibrated(&self) -> bool {
        self.shared.status.is_calibrated()
    }

    pub(crate) fn store_offsets(&self, offsets: CalibrationOffsets) {
        *self
            .shared
            .offsets
            .write()
            .unwrap_or_else(PoisonError::into_inner) = offsets;
    }
}

/// Signed sensor axis feeding one body axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SensorAxis {
    Px,
    Nx,
    Py,
    Ny,
    Pz,
    Nz,
}

impl SensorAxis {
    fn pick(self, sensor: &Vector3<f64>) -> f64 {
        match self {
            SensorAxis::Px => sensor.x,
            SensorAxis::Nx => -sensor.x,
            SensorAxis::Py => sensor.y,
            SensorAxis::Ny => -sensor.y,
            SensorAxis::Pz => sensor.z,
            SensorAxis::Nz => -sensor.z,
        }
    }
}

/// How the sensor is mounted relative to the vehicle body
///
/// Each body axis names the sensor axis it is read from, and whether that
/// axis is inverted. Sensor vectors are (x, y, z), body vectors are
/// (pitch, roll, yaw).
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use tvc_attitude::SensorMounting;
///
/// let body = SensorMounting::REFERENCE.apply(Vector3::new(1.0, 2.0, 3.0));
/// assert_eq!(body, Vector3::new(-1.0, 3.0, 2.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorMounting {
    pub pitch: SensorAxis,
    pub roll: SensorAxis,
    pub yaw: SensorAxis,
}

impl SensorMounting {
    pub const IDENTITY: SensorMounting =
        SensorMounting::new(SensorAxis::Px, SensorAxis::Py, SensorAxis::Pz);

    /// Reference airframe: pitch inverted, roll and yaw swapped
    pub const REFERENCE: SensorMounting =
        SensorMounting::new(SensorAxis::Nx, SensorAxis::Pz, SensorAxis::Py);

    pub const fn new(pitch: SensorAxis, roll: SensorAxis, yaw: SensorAxis) -> Self {
        Self { pitch, roll, yaw }
    }

    pub fn apply(&self, sensor: Vector3<f64>) -> Vector3<f64> {
        Vector3::new(
            self.pitch.pick(&sensor),
            self.roll.pick(&sensor),
            self.yaw.pick(&sensor),
        )
    }
}

impl Default for SensorMounting {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Channel layout and scaling of an orientation IMU
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImuLayout {
    /// Channels holding the fused Euler angles, sensor x, y, z
    pub orientation: [usize; 3],
    /// Channels holding the gyroscope rates, sensor x, y, z
    pub angular_rate: [usize; 3],
    /// Degrees per orientation count
    pub degrees_per_count: f64,
    /// rad/s per gyroscope count
    pub radians_per_second_per_count: f64,
    pub mounting: SensorMounting,
}

impl Default for ImuLayout {
    /// Six channels, angles at 1/16 degree and rates at 1/900 rad/s
    fn default() -> Self {
        Self {
            orientation: [0, 1, 2],
            angular_rate: [3, 4, 5],
            degrees_per_count: 1.0 / 16.0,
            radians_per_second_per_count: 1.0 / 900.0,
            mounting: SensorMounting::REFERENCE,
        }
    }
}

fn pick_channels(values: &[f64], channels: [usize; 3]) -> Option<Vector3<f64>> {
    Some(Vector3::new(
        *values.get(channels[0])?,
        *values.get(channels[1])?,
        *values.get(channels[2])?,
    ))
}

/// [`OrientationSource`] over a calibrated IMU
///
/// Angles are wrapped into [-180, 180] before the mounting is applied. A
/// layout pointing past the device's channels keeps the last good value.
#[derive(Debug, Clone)]
pub struct ImuOrientation<S> {
    sensor: CalibratedSensor<S>,
    layout: ImuLayout,
    orientation: Vector3<f64>,
    angular_rate: Vector3<f64>,
}

impl<S: RawChannels> ImuOrientation<S> {
    pub fn new(sensor: CalibratedSensor<S>, layout: ImuLayout) -> Self {
        Self {
            sensor,
            layout,
            orientation: Vector3::zeros(),
            angular_rate: Vector3::zeros(),
        }
    }

    pub fn sensor(&self) -> &CalibratedSensor<S> {
        &self.sensor
    }
}

impl<S: RawChannels> OrientationSource for ImuOrientation<S> {
    fn read_orientation(&mut self) -> Vector3<f64> {
        let values = self.sensor.read_corrected();
        if let Some(angles) = pick_channels(&values, self.layout.orientation) {
            let degrees = (angles * self.layout.degrees_per_count).wrap_degrees();
            self.orientation = self.layout.mounting.apply(degrees);
        }
        self.orientation
    }

    fn read_angular_rate(&mut self) -> Vector3<f64> {
        let values = self.sensor.read_corrected();
        if let Some(rates) = pick_channels(&values, self.layout.angular_rate) {
            let rates = rates * self.layout.radians_per_second_per_count;
            self.angular_rate = self.layout.mounting.apply(rates);
        }
        self.angular_rate
    }
}

/// Channel layout and scaling of a barometer
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BarometerLayout {
    pub temperature: usize,
    pub pressure: usize,
    pub altitude: usize,
    /// Degrees Celsius per temperature count
    pub celsius_per_count: f64,
    /// Millibar per pressure count
    pub millibar_per_count: f64,
    /// Metres per altitude count
    pub metres_per_count: f64,
}

impl Default for BarometerLayout {
    /// Temperature in 0.01 °C, pressure in Pa, altitude in cm
    fn default() -> Self {
        Self {
            temperature: 0,
            pressure: 1,
            altitude: 2,
            celsius_per_count: 0.01,
            millibar_per_count: 0.01,
            metres_per_count: 0.01,
        }
    }
}

/// [`AltitudeSource`] over a calibrated barometer
#[derive(Debug, Clone)]
pub struct BarometerAltitude<S> {
    sensor: CalibratedSensor<S>,
    layout: BarometerLayout,
    last: [f64; 3],
}

impl<S: RawChannels> BarometerAltitude<S> {
    pub fn new(sensor: CalibratedSensor<S>, layout: BarometerLayout) -> Self {
        Self {
            sensor,
            layout,
            last: [0.0; 3],
        }
    }

    pub fn sensor(&self) -> &CalibratedSensor<S> {
        &self.sensor
    }

    fn read(&mut self, slot: usize, channel: usize, scale: f64) -> f64 {
        if let Some(value) = self.sensor.read_corrected().get(channel) {
            self.last[slot] = value * scale;
        }
        self.last[slot]
    }
}

impl<S: RawChannels> AltitudeSource for BarometerAltitude<S> {
    fn read_temperature(&mut self) -> f64 {
        self.read(0, self.layout.temperature, self.layout.celsius_per_count)
    }

    fn read_pressure(&mut self) -> f64 {
        self.read(1, self.layout.pressure, self.layout.millibar_per_count)
    }

    fn read_altitude(&mut self) -> f64 {
        self.read(2, self.layout.altitude, self.layout.metres_per_count)
    }
}
