use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use nalgebra::Vector3;
use tvc_attitude::{
    Actuator, AltitudeSource, AngleUnit, Axis, BarometerAltitude, BarometerLayout,
    CalibratedSensor, CalibrationDuration, CalibrationError, CalibrationPhase, CalibrationSettings,
    ControlSettings, FeedbackMode, ImuLayout, ImuOrientation, OrientationSource, RawChannels,
    SensorMounting, TvcVehicle,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Six-channel IMU at rest with a constant bias, plus one tunable channel
struct BiasedImu {
    bias: [i64; 6],
    pitch_counts: Arc<AtomicI64>,
}

impl RawChannels for BiasedImu {
    fn channel_count(&self) -> usize {
        6
    }

    fn read_channels(&mut self, out: &mut [i64]) {
        out.copy_from_slice(&self.bias);
        out[0] += self.pitch_counts.load(Ordering::Relaxed);
    }
}

struct Barometer;

impl RawChannels for Barometer {
    fn channel_count(&self) -> usize {
        3
    }

    fn read_channels(&mut self, out: &mut [i64]) {
        out.copy_from_slice(&[2_300, 99_800, 15_000]);
    }
}

struct Idle;

impl Actuator for Idle {
    fn write_angle(&mut self, _axis: Axis, _degrees: f64) {}
}

fn imu_sensor() -> (CalibratedSensor<BiasedImu>, Arc<AtomicI64>) {
    let pitch_counts = Arc::new(AtomicI64::new(0));
    let imu = BiasedImu {
        bias: [32, -16, 8, 9, -18, 0],
        pitch_counts: Arc::clone(&pitch_counts),
    };
    (CalibratedSensor::new("imu", imu), pitch_counts)
}

fn identity_layout() -> ImuLayout {
    ImuLayout {
        mounting: SensorMounting::IDENTITY,
        ..Default::default()
    }
}

#[test]
fn test_calibration_removes_bias() {
    init_logging();
    let (sensor, pitch_counts) = imu_sensor();
    let mut orientation = ImuOrientation::new(sensor.clone(), identity_layout());

    let biased = orientation.read_orientation();
    assert!((biased - Vector3::new(2.0, -1.0, 0.5)).magnitude() < 1e-9);

    let mut vehicle =
        TvcVehicle::new(ControlSettings::default(), orientation, Idle, Instant::now());
    vehicle
        .calibrate(&sensor, CalibrationSettings::new(50, Duration::ZERO))
        .unwrap();
    vehicle.calibration_mut().join("imu").unwrap();
    assert!(vehicle.calibrated());

    let source = vehicle.control_mut().source_mut();
    assert_eq!(source.read_orientation(), Vector3::zeros());
    assert_eq!(source.read_angular_rate(), Vector3::zeros());

    // 10° of real pitch after zeroing
    pitch_counts.store(160, Ordering::Relaxed);
    assert!((source.read_orientation().x - 10.0).abs() < 1e-9);
}

#[test]
fn test_control_loop_is_not_blocked_by_calibration() {
    init_logging();
    let (sensor, _) = imu_sensor();
    let orientation = ImuOrientation::new(sensor.clone(), identity_layout());
    let start = Instant::now();
    let settings = ControlSettings {
        unit: AngleUnit::Degrees,
        ..Default::default()
    };
    let mut vehicle = TvcVehicle::new(settings, orientation, Idle, start);
    vehicle.set_feedback(FeedbackMode::Follow);

    vehicle
        .calibrate(&sensor, CalibrationSettings::imu(CalibrationDuration::FiveMinutes))
        .unwrap();

    let began = Instant::now();
    for n in 1..=100 {
        assert!(vehicle.update(start + Duration::from_millis(20) * n));
        assert!(!vehicle.calibrated());
    }
    assert!(began.elapsed() < Duration::from_secs(5));
    assert!(vehicle.calibration().is_running("imu"));

    // still biased while the run is going
    assert!((vehicle.control().outputs().pitch - 2.0).abs() < 1e-9);

    vehicle.shutdown();
    assert_eq!(sensor.status().phase(), CalibrationPhase::Idle);
    assert!(!sensor.is_calibrated());
}

#[test]
fn test_calibrated_waits_for_every_sensor() {
    init_logging();
    let (imu, _) = imu_sensor();
    let barometer = CalibratedSensor::new("baro", Barometer);
    let orientation = ImuOrientation::new(imu.clone(), ImuLayout::default());
    let mut vehicle =
        TvcVehicle::new(ControlSettings::default(), orientation, Idle, Instant::now());

    vehicle
        .calibrate(&imu, CalibrationSettings::new(10, Duration::ZERO))
        .unwrap();
    vehicle
        .calibrate(&barometer, CalibrationSettings::new(1_000, Duration::from_millis(50)))
        .unwrap();
    vehicle.calibration_mut().join("imu").unwrap();

    assert!(imu.is_calibrated());
    assert!(!vehicle.calibrated());

    vehicle.calibration().cancel("baro");
    let outcome = vehicle.calibration_mut().join("baro");
    assert!(matches!(outcome, Err(CalibrationError::Cancelled { .. })));
    assert!(!vehicle.calibrated());
    assert!(barometer.offsets().values().iter().all(|offset| *offset == 0.0));
}

#[test]
fn test_barometer_zeroes_onto_targets() {
    init_logging();
    let barometer = CalibratedSensor::new("baro", Barometer);
    let settings = CalibrationSettings::new(21, Duration::ZERO)
        .with_targets(vec![2_000.0, 101_325.0, 0.0]);

    let mut vehicle = TvcVehicle::new(
        ControlSettings::default(),
        ImuOrientation::new(imu_sensor().0, ImuLayout::default()),
        Idle,
        Instant::now(),
    );
    vehicle.calibrate(&barometer, settings).unwrap();
    let offsets = vehicle.calibration_mut().join("baro").unwrap();
    assert_eq!(offsets.values(), &[-300.0, 1_525.0, -15_000.0]);

    let mut altitude = BarometerAltitude::new(barometer, BarometerLayout::default());
    assert!((altitude.read_temperature() - 20.0).abs() < 1e-9);
    assert!((altitude.read_pressure() - 1013.25).abs() < 1e-9);
    assert!(altitude.read_altitude().abs() < 1e-9);
}

#[test]
fn test_rejected_settings_leave_sensor_idle() {
    init_logging();
    let (imu, _) = imu_sensor();
    let mut vehicle = TvcVehicle::new(
        ControlSettings::default(),
        ImuOrientation::new(imu.clone(), ImuLayout::default()),
        Idle,
        Instant::now(),
    );

    let wrong_targets = CalibrationSettings::new(10, Duration::ZERO).with_targets(vec![0.0; 3]);
    assert!(matches!(
        vehicle.calibrate(&imu, wrong_targets),
        Err(CalibrationError::TargetCountMismatch { expected: 6, actual: 3 })
    ));
    assert!(matches!(
        vehicle.calibrate(&imu, CalibrationSettings::new(0, Duration::ZERO)),
        Err(CalibrationError::ZeroSamples)
    ));
    assert_eq!(imu.status().phase(), CalibrationPhase::Idle);
    assert!(!vehicle.calibrated());
}
