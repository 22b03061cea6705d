use std::thread;
use std::time::{Duration, Instant};

use tvc_attitude::{
    Actuator, Axis, CalibratedSensor, CalibrationDuration, CalibrationSettings, ControlSettings,
    FeedbackMode, ImuLayout, ImuOrientation, RawChannels, TvcVehicle,
};

/// Stand-in for an IMU driver: fused angles at 1/16° and gyro at 1/900 rad/s
struct SimulatedImu {
    started: Instant,
}

impl RawChannels for SimulatedImu {
    fn channel_count(&self) -> usize {
        6
    }

    fn read_channels(&mut self, out: &mut [i64]) {
        let t = self.started.elapsed().as_secs_f64();
        let pitch = 2.0 * (t * 3.0).sin();
        let pitch_rate = (6.0 * (t * 3.0).cos()).to_radians();
        // replace this with the registers of your IMU
        out[0] = (pitch * 16.0) as i64 + 24; // constant bias
        out[1] = 8;
        out[2] = -16;
        out[3] = (pitch_rate * 900.0) as i64;
        out[4] = 0;
        out[5] = 0;
    }
}

struct PrintingGimbal;

impl Actuator for PrintingGimbal {
    fn write_angle(&mut self, axis: Axis, degrees: f64) {
        // replace this with a servo write
        println!("{:>5} servo: {degrees:6.2}", axis.name());
    }
}

fn main() {
    env_logger::init();

    let imu = CalibratedSensor::new(
        "imu",
        SimulatedImu {
            started: Instant::now(),
        },
    );
    let source = ImuOrientation::new(imu.clone(), ImuLayout::default());
    let mut vehicle =
        TvcVehicle::new(ControlSettings::default(), source, PrintingGimbal, Instant::now());

    vehicle
        .calibrate(&imu, CalibrationSettings::imu(CalibrationDuration::OneSecond))
        .expect("calibration should start");

    // the control loop keeps running while the IMU calibrates
    vehicle.set_feedback(FeedbackMode::Follow);
    while !vehicle.calibrated() {
        vehicle.update(Instant::now());
        thread::sleep(Duration::from_millis(5));
    }

    println!("calibrated, holding level");
    vehicle.set_orientation_degrees(0.0, 0.0, 0.0);
    vehicle.set_feedback(FeedbackMode::On);

    let hover = Instant::now();
    while hover.elapsed() < Duration::from_secs(2) {
        if vehicle.update(Instant::now()) {
            let measured = vehicle.control().measurements_degrees();
            println!(
                "Pitch: {:.2}, Roll: {:.2}, Yaw: {:.2}",
                measured.x, measured.y, measured.z
            );
        }
        thread::sleep(Duration::from_millis(1));
    }

    vehicle.shutdown();
}
