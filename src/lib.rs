//! TVC Attitude - closed-loop attitude control for thrust-vectored vehicles
//!
//! This library holds a vehicle's pitch, roll and yaw at commanded setpoints
//! by steering a gimbaled motor. Each axis runs its own PID controller under
//! a feedback mode, outputs are mapped onto actuator travel with saturation,
//! and sensor offsets are zeroed by calibration runs on background threads
//! that never block the control loop.
//!
//! # Features
//!
//! - Per-axis PID with gyroscope or error-derived rate and optional anti-windup
//! - Off / On / Follow feedback modes, switchable per axis at any time
//! - Fixed-rate control ticks gated on elapsed time
//! - Linear, saturating control-to-actuator mapping; unactuated axes are skipped
//! - Background offset calibration with lock-free readiness and cancellation
//! - Optional `serde` support for all settings types
//!
//! # Quick Start
//!
//! ```rust
//! use std::time::{Duration, Instant};
//! use nalgebra::Vector3;
//! use tvc_attitude::{
//!     Actuator, Axis, ControlSettings, FeedbackMode, OrientationSource, TvcVehicle,
//! };
//!
//! struct Imu;
//!
//! impl OrientationSource for Imu {
//!     fn read_orientation(&mut self) -> Vector3<f64> {
//!         Vector3::new(1.5, 0.0, -0.5) // pitch, roll, yaw in degrees
//!     }
//!
//!     fn read_angular_rate(&mut self) -> Vector3<f64> {
//!         Vector3::zeros() // rad/s
//!     }
//! }
//!
//! struct Gimbal;
//!
//! impl Actuator for Gimbal {
//!     fn write_angle(&mut self, axis: Axis, degrees: f64) {
//!         println!("{} servo -> {degrees:.1}", axis.name());
//!     }
//! }
//!
//! let start = Instant::now();
//! let mut vehicle = TvcVehicle::new(ControlSettings::default(), Imu, Gimbal, start);
//! vehicle.set_orientation_degrees(0.0, 0.0, 0.0);
//! vehicle.set_feedback(FeedbackMode::On);
//!
//! // call as often as you like, work happens every 20 ms
//! assert!(vehicle.update(start + Duration::from_millis(20)));
//! assert!(!vehicle.update(start + Duration::from_millis(25)));
//!
//! vehicle.shutdown(); // parks the gimbal
//! ```

pub mod calibration;
mod control;
mod error;
mod feedback;
pub mod mapper;
mod math;
mod pid;
pub mod sensor;
mod types;
mod vehicle;

// Re-export all public types and functions
pub use calibration::{
    CalibrationManager, CalibrationOffsets, CalibrationPhase, CalibrationStatus,
    CancellationToken, OffsetAccumulator, run_calibration,
};
pub use control::{AttitudeControlLoop, ControlLoopTiming};
pub use error::CalibrationError;
pub use feedback::{AxisInput, FeedbackModeStateMachine};
pub use mapper::{ActuatorMapper, ThrottleMapper, map};
pub use math::{DEG_TO_RAD, RAD_TO_DEG, Vector3Ext, wrap_degrees};
pub use pid::{AxisState, PidAxisController};
pub use sensor::{
    Actuator, AltitudeSource, BarometerAltitude, BarometerLayout, CalibratedSensor, ImuLayout,
    ImuOrientation, OrientationSource, RawChannels, SensorAxis, SensorMounting,
};
pub use types::*;
pub use vehicle::TvcVehicle;
