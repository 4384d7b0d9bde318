// head_tracker.rs - gyroscope-driven head orientation

use crate::integrator;
use crate::remap::{self, DisplayRotation};
use glam::{Mat4, Quat, Vec3};
use log::{debug, info, trace};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
}

impl SensorKind {
    /// Platform sensor type codes.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(SensorKind::Accelerometer),
            4 => Some(SensorKind::Gyroscope),
            _ => None,
        }
    }
}

/// One timestamped 3-axis reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub kind: SensorKind,
    pub values: [f32; 3],
    pub timestamp_ns: i64,
    pub accuracy: i32,
}

impl SensorSample {
    pub fn gyroscope(values: [f32; 3], timestamp_ns: i64) -> Self {
        Self { kind: SensorKind::Gyroscope, values, timestamp_ns, accuracy: 3 }
    }

    pub fn accelerometer(values: [f32; 3], timestamp_ns: i64) -> Self {
        Self { kind: SensorKind::Accelerometer, values, timestamp_ns, accuracy: 3 }
    }
}

struct TrackerState {
    orientation: Quat,
    last_gyro_ns: i64,
    last_accel: Option<Vec3>,
    display_rotation: DisplayRotation,
    head_view: Mat4,
}

/// Integrates gyroscope samples into a head-view matrix readable from any thread.
pub struct HeadTracker {
    tracking: AtomicBool,
    state: Mutex<TrackerState>,
}

impl Default for HeadTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadTracker {
    pub fn new() -> Self {
        Self {
            tracking: AtomicBool::new(false),
            state: Mutex::new(TrackerState {
                orientation: Quat::IDENTITY,
                last_gyro_ns: 0,
                last_accel: None,
                display_rotation: DisplayRotation::Deg0,
                head_view: Mat4::IDENTITY,
            }),
        }
    }

    pub fn start_tracking(&self) {
        self.state.lock().last_gyro_ns = 0;
        if !self.tracking.swap(true, Ordering::AcqRel) {
            info!("head tracking started");
        }
    }

    pub fn stop_tracking(&self) {
        if self.tracking.swap(false, Ordering::AcqRel) {
            info!("head tracking stopped");
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::Acquire)
    }

    pub fn set_display_rotation(&self, rotation: DisplayRotation) {
        self.state.lock().display_rotation = rotation;
    }

    pub fn process_sensor_data(&self, sample: &SensorSample) {
        if !self.is_tracking() {
            return;
        }

        match sample.kind {
            SensorKind::Gyroscope => {
                let mut state = self.state.lock();
                let dt = integrator::sample_interval(state.last_gyro_ns, sample.timestamp_ns);
                state.last_gyro_ns = sample.timestamp_ns;
                state.orientation =
                    integrator::integrate(state.orientation, Vec3::from_array(sample.values), dt);
                let view = integrator::head_view_matrix(state.orientation);
                state.head_view = remap::apply_display_rotation(state.display_rotation, &view);
                trace!("gyro dt={dt:.4} q={:?}", state.orientation);
            }
            SensorKind::Accelerometer => {
                // Kept for drift correction; not fused yet.
                self.state.lock().last_accel = Some(Vec3::from_array(sample.values));
                debug!("accelerometer sample at {}", sample.timestamp_ns);
            }
        }
    }

    /// Full snapshot of the current head-view matrix.
    pub fn last_head_view(&self) -> Mat4 {
        self.state.lock().head_view
    }

    pub fn orientation(&self) -> Quat {
        self.state.lock().orientation
    }

    pub fn last_acceleration(&self) -> Option<Vec3> {
        self.state.lock().last_accel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn ignores_samples_while_idle() {
        let tracker = HeadTracker::new();
        tracker.process_sensor_data(&SensorSample::gyroscope([90.0, 0.0, 0.0], 10));
        assert_eq!(tracker.last_head_view(), Mat4::IDENTITY);
    }

    #[test]
    fn gyro_updates_head_view() {
        let tracker = HeadTracker::new();
        tracker.start_tracking();
        let mut ts = 1_000_000_000;
        for _ in 0..50 {
            ts += 10_000_000;
            tracker.process_sensor_data(&SensorSample::gyroscope([0.0, 90.0, 0.0], ts));
        }
        let view = tracker.last_head_view();
        assert!(!view.abs_diff_eq(Mat4::IDENTITY, 1e-3));
        let expected = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4).transpose();
        assert!(view.abs_diff_eq(expected, 1e-2));
        assert!((tracker.orientation().length() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn accelerometer_does_not_rotate() {
        let tracker = HeadTracker::new();
        tracker.start_tracking();
        tracker.process_sensor_data(&SensorSample::accelerometer([0.0, 9.8, 0.0], 5));
        assert_eq!(tracker.last_head_view(), Mat4::IDENTITY);
        assert_eq!(tracker.last_acceleration(), Some(Vec3::new(0.0, 9.8, 0.0)));
    }

    #[test]
    fn stop_is_idempotent() {
        let tracker = HeadTracker::new();
        tracker.stop_tracking();
        tracker.start_tracking();
        tracker.stop_tracking();
        tracker.stop_tracking();
        assert!(!tracker.is_tracking());
    }

    #[test]
    fn snapshots_are_never_torn() {
        let tracker = Arc::new(HeadTracker::new());
        tracker.start_tracking();
        let writer = {
            let tracker = Arc::clone(&tracker);
            std::thread::spawn(move || {
                let mut ts = 1;
                for _ in 0..2000 {
                    ts += 5_000_000;
                    tracker.process_sensor_data(&SensorSample::gyroscope([40.0, -75.0, 12.0], ts));
                }
            })
        };
        for _ in 0..2000 {
            let m = tracker.last_head_view();
            let x = m.x_axis.truncate();
            let y = m.y_axis.truncate();
            assert!((x.length() - 1.0).abs() < 1e-3);
            assert!(x.dot(y).abs() < 1e-3);
        }
        writer.join().unwrap();
    }
}
