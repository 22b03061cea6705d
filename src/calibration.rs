//! Sensor offset zeroing
//!
//! A calibration run averages a fixed number of raw samples per channel
//! while the vehicle sits still, then stores `target - average` as the
//! channel's offset. Runs happen on a background thread owned by the
//! [`CalibrationManager`]; the control loop only ever looks at the atomic
//! [`CalibrationStatus`] and never waits on a run.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use tvc_attitude::{CalibratedSensor, CalibrationManager, CalibrationSettings, RawChannels};
//!
//! struct Level;
//!
//! impl RawChannels for Level {
//!     fn channel_count(&self) -> usize {
//!         2
//!     }
//!
//!     fn read_channels(&mut self, out: &mut [i64]) {
//!         out.copy_from_slice(&[4, -7]);
//!     }
//! }
//!
//! let sensor = CalibratedSensor::new("level", Level);
//! let mut manager = CalibrationManager::new();
//! manager
//!     .start(&sensor, CalibrationSettings::new(10, Duration::ZERO))
//!     .unwrap();
//!
//! let offsets = manager.join("level").unwrap();
//! assert_eq!(offsets.values(), &[-4.0, 7.0]);
//! assert!(manager.all_calibrated());
//! assert_eq!(sensor.read_corrected(), vec![0.0, 0.0]);
//! ```

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::CalibrationError;
use crate::sensor::{CalibratedSensor, RawChannels};
use crate::types::CalibrationSettings;

/// Integer mean of `count` samples summing to `sum`, halves rounded away from zero
///
/// # Example
/// ```
/// use tvc_attitude::calibration::rounded_average;
///
/// assert_eq!(rounded_average(21, 2), 11); // 10.5
/// assert_eq!(rounded_average(-21, 2), -11); // -10.5
/// assert_eq!(rounded_average(31, 3), 10); // 10.33
/// ```
pub fn rounded_average(sum: i128, count: u32) -> i64 {
    if count == 0 {
        return 0;
    }
    let count = i128::from(count);
    let half = count / 2;
    let biased = if sum < 0 { sum - half } else { sum + half };
    let average = biased / count;
    i64::try_from(average).unwrap_or(if average < 0 { i64::MIN } else { i64::MAX })
}

/// Per-channel running sums of raw samples
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetAccumulator {
    sums: Vec<i128>,
    samples: u32,
}

impl OffsetAccumulator {
    pub fn new(channels: usize) -> Self {
        Self {
            sums: vec![0; channels],
            samples: 0,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.sums.len()
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Add one reading of every channel; extra values are ignored
    pub fn add(&mut self, sample: &[i64]) {
        for (sum, value) in self.sums.iter_mut().zip(sample) {
            *sum += i128::from(*value);
        }
        self.samples = self.samples.saturating_add(1);
    }

    /// Rounded mean of each channel, zero before the first sample
    pub fn averages(&self) -> Vec<i64> {
        self.sums
            .iter()
            .map(|sum| rounded_average(*sum, self.samples))
            .collect()
    }

    /// `target - average` per channel; an empty `targets` means zero everywhere
    pub fn offsets(&self, targets: &[f64]) -> CalibrationOffsets {
        let values = self
            .averages()
            .into_iter()
            .enumerate()
            .map(|(channel, average)| {
                let target = targets.get(channel).copied().unwrap_or(0.0);
                target - average as f64
            })
            .collect();
        CalibrationOffsets::from_values(values)
    }
}

/// Offsets added to the raw reading of each channel
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalibrationOffsets {
    values: Vec<f64>,
}

impl CalibrationOffsets {
    pub fn zeroed(channels: usize) -> Self {
        Self::from_values(vec![0.0; channels])
    }

    pub fn from_values(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Offset of `channel`, zero for channels past the end
    pub fn get(&self, channel: usize) -> f64 {
        self.values.get(channel).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Corrected value of every raw channel
    pub fn apply(&self, raw: &[i64]) -> Vec<f64> {
        raw.iter()
            .enumerate()
            .map(|(channel, value)| *value as f64 + self.get(channel))
            .collect()
    }
}

/// Lifecycle of a sensor's calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CalibrationPhase {
    /// Never run, or the last run was abandoned
    Idle = 0,
    Running = 1,
    /// Last run committed its offsets
    Done = 2,
}

impl CalibrationPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CalibrationPhase::Running,
            2 => CalibrationPhase::Done,
            _ => CalibrationPhase::Idle,
        }
    }
}

/// Lock-free calibration state of one sensor
///
/// `is_calibrated` turns true with release ordering only after the offsets
/// of a run are stored, so a reader that acquires `true` also sees them.
#[derive(Debug, Default)]
pub struct CalibrationStatus {
    phase: AtomicU8,
    calibrated: AtomicBool,
}

impl CalibrationStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> CalibrationPhase {
        CalibrationPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.phase() == CalibrationPhase::Running
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated.load(Ordering::Acquire)
    }

    /// Move to `Running` unless a run already is; clears the calibrated flag
    fn try_begin(&self) -> bool {
        let mut current = self.phase.load(Ordering::Acquire);
        loop {
            if current == CalibrationPhase::Running as u8 {
                return false;
            }
            match self.phase.compare_exchange_weak(
                current,
                CalibrationPhase::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.calibrated.store(false, Ordering::Release);
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn complete(&self) {
        self.calibrated.store(true, Ordering::Release);
        self.phase.store(CalibrationPhase::Done as u8, Ordering::Release);
    }

    fn abandon(&self) {
        self.phase.store(CalibrationPhase::Idle as u8, Ordering::Release);
    }
}

/// Cooperative cancellation shared between a run and whoever started it
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (lock, condvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `timeout` or until cancelled; returns whether cancelled
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if timeout.is_zero() {
            return self.is_cancelled();
        }
        let (lock, condvar) = &*self.inner;
        let cancelled = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (cancelled, _) = condvar
            .wait_timeout_while(cancelled, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled
    }
}

/// Exclusive claim on a sensor's calibration
///
/// Dropping the guard without committing puts the sensor back to idle, so
/// cancelled, failed and panicking runs all release the sensor.
struct CalibrationGuard<S> {
    sensor: CalibratedSensor<S>,
    committed: bool,
}

impl<S> CalibrationGuard<S> {
    fn acquire(sensor: &CalibratedSensor<S>) -> Result<Self, CalibrationError> {
        if !sensor.status().try_begin() {
            warn!("calibration of {} already running", sensor.name());
            return Err(CalibrationError::AlreadyRunning {
                sensor: sensor.name().to_string(),
            });
        }
        Ok(Self {
            sensor: sensor.clone(),
            committed: false,
        })
    }

    fn commit(mut self, offsets: CalibrationOffsets) {
        self.sensor.store_offsets(offsets);
        self.sensor.status().complete();
        self.committed = true;
    }
}

impl<S> Drop for CalibrationGuard<S> {
    fn drop(&mut self) {
        if !self.committed {
            self.sensor.status().abandon();
        }
    }
}

fn validate(settings: &CalibrationSettings, channels: usize) -> Result<(), CalibrationError> {
    if settings.sample_count == 0 {
        return Err(CalibrationError::ZeroSamples);
    }
    if !settings.targets.is_empty() && settings.targets.len() != channels {
        return Err(CalibrationError::TargetCountMismatch {
            expected: channels,
            actual: settings.targets.len(),
        });
    }
    Ok(())
}

/// Calibrate `sensor` on the calling thread
///
/// Blocks for roughly `sample_count * sample_delay`. On success the
/// offsets are stored in the sensor and returned. A cancelled run stores
/// nothing and leaves the sensor uncalibrated.
pub fn run_calibration<S: RawChannels>(
    sensor: &CalibratedSensor<S>,
    settings: &CalibrationSettings,
    cancel: &CancellationToken,
) -> Result<CalibrationOffsets, CalibrationError> {
    validate(settings, sensor.channel_count())?;
    let guard = CalibrationGuard::acquire(sensor)?;
    sample_offsets(guard, settings, cancel)
}

fn sample_offsets<S: RawChannels>(
    guard: CalibrationGuard<S>,
    settings: &CalibrationSettings,
    cancel: &CancellationToken,
) -> Result<CalibrationOffsets, CalibrationError> {
    let sensor = guard.sensor.clone();
    let cancelled = || {
        warn!("calibration of {} cancelled", sensor.name());
        CalibrationError::Cancelled {
            sensor: sensor.name().to_string(),
        }
    };

    info!(
        "calibrating {}: {} samples {:?} apart",
        sensor.name(),
        settings.sample_count,
        settings.sample_delay
    );
    let started = Instant::now();

    let mut accumulator = OffsetAccumulator::new(sensor.channel_count());
    let mut sample = vec![0; sensor.channel_count()];
    for n in 1..=settings.sample_count {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        sensor.read_raw(&mut sample);
        accumulator.add(&sample);

        if n < settings.sample_count && cancel.wait_timeout(settings.sample_delay) {
            return Err(cancelled());
        }
    }

    let offsets = accumulator.offsets(&settings.targets);
    debug!("{} averages {:?}", sensor.name(), accumulator.averages());
    guard.commit(offsets.clone());
    info!(
        "{} calibrated in {:.2?}, offsets {:?}",
        sensor.name(),
        started.elapsed(),
        offsets.values()
    );
    Ok(offsets)
}

type Worker = JoinHandle<Result<CalibrationOffsets, CalibrationError>>;

#[derive(Debug)]
struct CalibrationRun {
    sensor: String,
    status: Arc<CalibrationStatus>,
    cancel: CancellationToken,
    worker: Option<Worker>,
}

impl CalibrationRun {
    fn join(&mut self) -> Result<CalibrationOffsets, CalibrationError> {
        let Some(worker) = self.worker.take() else {
            return Err(CalibrationError::NotStarted {
                sensor: self.sensor.clone(),
            });
        };
        worker.join().unwrap_or_else(|_| {
            Err(CalibrationError::WorkerPanicked {
                sensor: self.sensor.clone(),
            })
        })
    }
}

/// Runs calibrations in the background, one worker thread per sensor
///
/// Dropping the manager cancels and joins every worker.
#[derive(Debug, Default)]
pub struct CalibrationManager {
    runs: Vec<CalibrationRun>,
}

impl CalibrationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start calibrating `sensor` and return immediately
    ///
    /// Fails with [`CalibrationError::AlreadyRunning`] while a run on the
    /// same sensor is still going, whoever started it. Runs are looked up
    /// by name, so a different sensor reusing a managed name is turned away
    /// with [`CalibrationError::DuplicateName`].
    pub fn start<S: RawChannels + 'static>(
        &mut self,
        sensor: &CalibratedSensor<S>,
        settings: CalibrationSettings,
    ) -> Result<(), CalibrationError> {
        validate(&settings, sensor.channel_count())?;
        if self
            .run(sensor.name())
            .is_some_and(|run| !Arc::ptr_eq(&run.status, sensor.status()))
        {
            warn!("a different sensor named {} is already managed", sensor.name());
            return Err(CalibrationError::DuplicateName {
                sensor: sensor.name().to_string(),
            });
        }
        let guard = CalibrationGuard::acquire(sensor)?;

        // the previous run of this sensor is over, its worker only has to exit
        self.runs.retain_mut(|run| {
            if Arc::ptr_eq(&run.status, sensor.status()) {
                if let Err(err) = run.join() {
                    debug!("previous calibration of {}: {err}", run.sensor);
                }
                false
            } else {
                true
            }
        });

        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let worker = thread::Builder::new()
            .name(format!("calibrate-{}", sensor.name()))
            .spawn(move || sample_offsets(guard, &settings, &worker_cancel))?;

        self.runs.push(CalibrationRun {
            sensor: sensor.name().to_string(),
            status: Arc::clone(sensor.status()),
            cancel,
            worker: Some(worker),
        });
        Ok(())
    }

    fn run(&self, sensor: &str) -> Option<&CalibrationRun> {
        self.runs.iter().find(|run| run.sensor == sensor)
    }

    /// Names of the sensors calibrations were started for
    pub fn sensors(&self) -> impl Iterator<Item = &str> {
        self.runs.iter().map(|run| run.sensor.as_str())
    }

    pub fn phase(&self, sensor: &str) -> Option<CalibrationPhase> {
        self.run(sensor).map(|run| run.status.phase())
    }

    pub fn is_running(&self, sensor: &str) -> bool {
        self.run(sensor).is_some_and(|run| run.status.is_running())
    }

    pub fn is_calibrated(&self, sensor: &str) -> bool {
        self.run(sensor).is_some_and(|run| run.status.is_calibrated())
    }

    /// True once at least one run was started and every started sensor is calibrated
    pub fn all_calibrated(&self) -> bool {
        !self.runs.is_empty() && self.runs.iter().all(|run| run.status.is_calibrated())
    }

    /// Ask the run on `sensor` to stop; returns whether there was one
    pub fn cancel(&self, sensor: &str) -> bool {
        match self.run(sensor) {
            Some(run) => {
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for run in &self.runs {
            run.cancel.cancel();
        }
    }

    /// Wait for the run on `sensor` and return its outcome
    pub fn join(&mut self, sensor: &str) -> Result<CalibrationOffsets, CalibrationError> {
        match self.runs.iter_mut().find(|run| run.sensor == sensor) {
            Some(run) => run.join(),
            None => Err(CalibrationError::NotStarted {
                sensor: sensor.to_string(),
            }),
        }
    }

    /// Cancel every run and wait for all workers to exit
    pub fn shutdown(&mut self) {
        self.cancel_all();
        for run in &mut self.runs {
            if run.worker.is_none() {
                continue;
            }
            match run.join() {
                Ok(_) => debug!("calibration of {} finished before shutdown", run.sensor),
                Err(CalibrationError::Cancelled { .. }) => {}
                Err(err) => warn!("{err}"),
            }
        }
    }
}

impl Drop for CalibrationManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
