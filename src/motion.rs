// motion.rs - interactive strategies: touch, rotation-vector motion, cardboard

use crate::device::{ProgramId, RenderDevice};
use crate::error::{PlayerError, Result};
use crate::head_tracker::{HeadTracker, SensorSample};
use crate::integrator;
use crate::remap::{self, DisplayRotation};
use glam::{Mat4, Quat};
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-frame consumer of sensor orientation.
pub trait Director: Send + Sync {
    fn update_sensor_matrix(&self, matrix: &Mat4);
    /// Forgets any sensor orientation.
    fn reset(&self);
}

/// Which sensors the device has.
pub trait SensorProbe: Send + Sync {
    fn has_gyroscope(&self) -> bool;
    fn has_accelerometer(&self) -> bool;
}

/// Probe for hosts that have already checked sensor availability.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeSensors;

impl SensorProbe for AssumeSensors {
    fn has_gyroscope(&self) -> bool {
        true
    }

    fn has_accelerometer(&self) -> bool {
        true
    }
}

#[derive(Default)]
struct Directors(RwLock<Vec<Arc<dyn Director>>>);

impl Directors {
    fn set(&self, directors: Vec<Arc<dyn Director>>) {
        *self.0.write() = directors;
    }

    fn publish(&self, matrix: &Mat4) {
        for director in self.0.read().iter() {
            director.update_sensor_matrix(matrix);
        }
    }

    fn reset(&self) {
        for director in self.0.read().iter() {
            director.reset();
        }
    }
}

/// Orientation fed by the platform's fused rotation-vector quaternion.
pub struct MotionStrategy {
    on: AtomicBool,
    probe: Arc<dyn SensorProbe>,
    supported: OnceCell<bool>,
    display_rotation: Mutex<DisplayRotation>,
    sensor_matrix: Mutex<Mat4>,
    directors: Directors,
}

impl MotionStrategy {
    pub fn new(probe: Arc<dyn SensorProbe>) -> Self {
        Self {
            on: AtomicBool::new(false),
            probe,
            supported: OnceCell::new(),
            display_rotation: Mutex::new(DisplayRotation::Deg0),
            sensor_matrix: Mutex::new(Mat4::IDENTITY),
            directors: Directors::default(),
        }
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::Acquire)
    }

    pub fn turn_on(&self) {
        self.on.store(true, Ordering::Release);
    }

    pub fn turn_off(&self) {
        self.on.store(false, Ordering::Release);
    }

    pub fn turn_on_in_gl(&self) {
        self.directors.reset();
        self.turn_on();
        info!("motion strategy on");
    }

    pub fn turn_off_in_gl(&self) {
        self.turn_off();
        info!("motion strategy off");
    }

    pub fn is_support(&self) -> bool {
        *self.supported.get_or_init(|| self.probe.has_gyroscope())
    }

    pub fn set_display_rotation(&self, rotation: DisplayRotation) {
        *self.display_rotation.lock() = rotation;
    }

    pub fn set_directors(&self, directors: Vec<Arc<dyn Director>>) {
        self.directors.set(directors);
    }

    /// Publishes the orientation `(x, y, z, w)`. Ignored while off.
    pub fn update_gyro_data(&self, x: f32, y: f32, z: f32, w: f32) -> Result<()> {
        if !self.is_on() {
            debug!("gyro data ignored while motion is off");
            return Ok(());
        }
        let q = Quat::from_xyzw(x, y, z, w);
        let len = q.length();
        if !len.is_finite() || len <= f32::EPSILON {
            return Err(PlayerError::InvalidArgument(format!(
                "rotation quaternion ({x}, {y}, {z}, {w})"
            )));
        }

        let rotation = *self.display_rotation.lock();
        let matrix = remap::apply_display_rotation(
            rotation,
            &integrator::rotation_matrix(q * (1.0 / len)),
        );
        *self.sensor_matrix.lock() = matrix;
        self.directors.publish(&matrix);
        Ok(())
    }

    pub fn sensor_matrix(&self) -> Mat4 {
        *self.sensor_matrix.lock()
    }

    /// Writes the sensor matrix into `uniform` of `program`, switching to the
    /// program for the call and back to the previous one afterwards.
    /// Returns whether the uniform was written.
    pub fn apply_sensor_matrix_to_program(
        &self,
        device: &mut dyn RenderDevice,
        program: ProgramId,
        uniform: &str,
    ) -> bool {
        if !self.is_on() {
            return false;
        }
        let Some(location) = device.uniform_location(program, uniform) else {
            warn!("uniform {uniform} not found in program {program:?}");
            return false;
        };

        let previous = device.current_program();
        let switched = previous != Some(program);
        if switched {
            device.use_program(Some(program));
        }
        device.set_uniform_mat4(location, &self.sensor_matrix().to_cols_array());
        if switched {
            device.use_program(previous);
        }
        true
    }
}

/// Head tracking from raw gyroscope samples.
pub struct CardboardStrategy {
    tracker: HeadTracker,
    registered: AtomicBool,
    on: AtomicBool,
    probe: Arc<dyn SensorProbe>,
    supported: OnceCell<bool>,
    directors: Directors,
}

impl CardboardStrategy {
    pub fn new(probe: Arc<dyn SensorProbe>) -> Self {
        Self {
            tracker: HeadTracker::new(),
            registered: AtomicBool::new(false),
            on: AtomicBool::new(false),
            probe,
            supported: OnceCell::new(),
            directors: Directors::default(),
        }
    }

    pub fn on_resume(&self) {
        if !self.registered.swap(true, Ordering::AcqRel) {
            self.tracker.start_tracking();
        }
    }

    pub fn on_pause(&self) {
        if self.registered.swap(false, Ordering::AcqRel) {
            self.tracker.stop_tracking();
        }
    }

    pub fn turn_on_in_gl(&self) {
        self.directors.reset();
        self.on.store(true, Ordering::Release);
        info!("cardboard strategy on");
    }

    pub fn turn_off_in_gl(&self) {
        self.on.store(false, Ordering::Release);
        self.on_pause();
        info!("cardboard strategy off");
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::Acquire)
    }

    pub fn is_support(&self) -> bool {
        *self
            .supported
            .get_or_init(|| self.probe.has_accelerometer() || self.probe.has_gyroscope())
    }

    pub fn set_display_rotation(&self, rotation: DisplayRotation) {
        self.tracker.set_display_rotation(rotation);
    }

    pub fn set_directors(&self, directors: Vec<Arc<dyn Director>>) {
        self.directors.set(directors);
    }

    pub fn on_sensor_event(&self, sample: &SensorSample) {
        if !self.is_on() || sample.accuracy == 0 {
            return;
        }
        self.tracker.process_sensor_data(sample);
        self.directors.publish(&self.tracker.last_head_view());
    }

    pub fn sensor_matrix(&self) -> Mat4 {
        self.tracker.last_head_view()
    }

    pub fn tracker(&self) -> &HeadTracker {
        &self.tracker
    }
}

/// Strategy kind chosen at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InteractiveMode {
    #[default]
    Touch,
    Motion,
    Cardboard,
}

pub enum InteractiveStrategy {
    Touch,
    Motion(MotionStrategy),
    Cardboard(CardboardStrategy),
}

impl fmt::Debug for InteractiveStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InteractiveStrategy::Touch => "Touch",
            InteractiveStrategy::Motion(_) => "Motion",
            InteractiveStrategy::Cardboard(_) => "Cardboard",
        })
    }
}

impl InteractiveStrategy {
    pub fn new(mode: InteractiveMode, probe: Arc<dyn SensorProbe>) -> Self {
        match mode {
            InteractiveMode::Touch => InteractiveStrategy::Touch,
            InteractiveMode::Motion => InteractiveStrategy::Motion(MotionStrategy::new(probe)),
            InteractiveMode::Cardboard => {
                InteractiveStrategy::Cardboard(CardboardStrategy::new(probe))
            }
        }
    }

    pub fn mode(&self) -> InteractiveMode {
        match self {
            InteractiveStrategy::Touch => InteractiveMode::Touch,
            InteractiveStrategy::Motion(_) => InteractiveMode::Motion,
            InteractiveStrategy::Cardboard(_) => InteractiveMode::Cardboard,
        }
    }

    pub fn on_resume(&self) {
        match self {
            InteractiveStrategy::Touch => {}
            InteractiveStrategy::Motion(_) => debug!("motion strategy resumed"),
            InteractiveStrategy::Cardboard(s) => s.on_resume(),
        }
    }

    pub fn on_pause(&self) {
        match self {
            InteractiveStrategy::Touch => {}
            InteractiveStrategy::Motion(_) => debug!("motion strategy paused"),
            InteractiveStrategy::Cardboard(s) => s.on_pause(),
        }
    }

    pub fn turn_on(&self) {
        match self {
            InteractiveStrategy::Touch => {}
            InteractiveStrategy::Motion(s) => s.turn_on(),
            InteractiveStrategy::Cardboard(s) => s.on.store(true, Ordering::Release),
        }
    }

    pub fn turn_off(&self) {
        match self {
            InteractiveStrategy::Touch => {}
            InteractiveStrategy::Motion(s) => s.turn_off(),
            InteractiveStrategy::Cardboard(s) => s.on.store(false, Ordering::Release),
        }
    }

    pub fn turn_on_in_gl(&self) {
        match self {
            InteractiveStrategy::Touch => {}
            InteractiveStrategy::Motion(s) => s.turn_on_in_gl(),
            InteractiveStrategy::Cardboard(s) => s.turn_on_in_gl(),
        }
    }

    pub fn turn_off_in_gl(&self) {
        match self {
            InteractiveStrategy::Touch => {}
            InteractiveStrategy::Motion(s) => s.turn_off_in_gl(),
            InteractiveStrategy::Cardboard(s) => s.turn_off_in_gl(),
        }
    }

    /// Whether the strategy consumes drag input. Sensor strategies leave drags
    /// to the caller.
    pub fn handle_drag(&self, _dx: f32, _dy: f32) -> bool {
        matches!(self, InteractiveStrategy::Touch)
    }

    pub fn is_support(&self) -> bool {
        match self {
            InteractiveStrategy::Touch => true,
            InteractiveStrategy::Motion(s) => s.is_support(),
            InteractiveStrategy::Cardboard(s) => s.is_support(),
        }
    }

    pub fn set_directors(&self, directors: Vec<Arc<dyn Director>>) {
        match self {
            InteractiveStrategy::Touch => {}
            InteractiveStrategy::Motion(s) => s.set_directors(directors),
            InteractiveStrategy::Cardboard(s) => s.set_directors(directors),
        }
    }

    pub fn set_display_rotation(&self, rotation: DisplayRotation) {
        match self {
            InteractiveStrategy::Touch => {}
            InteractiveStrategy::Motion(s) => s.set_display_rotation(rotation),
            InteractiveStrategy::Cardboard(s) => s.set_display_rotation(rotation),
        }
    }

    pub fn update_gyro_data(&self, x: f32, y: f32, z: f32, w: f32) -> Result<()> {
        match self {
            InteractiveStrategy::Motion(s) => s.update_gyro_data(x, y, z, w),
            _ => {
                debug!("gyro quaternion ignored by {self:?} strategy");
                Ok(())
            }
        }
    }

    pub fn on_sensor_event(&self, sample: &SensorSample) {
        match self {
            InteractiveStrategy::Cardboard(s) => s.on_sensor_event(sample),
            _ => debug!("raw sensor sample ignored by {self:?} strategy"),
        }
    }

    pub fn sensor_matrix(&self) -> Mat4 {
        match self {
            InteractiveStrategy::Touch => Mat4::IDENTITY,
            InteractiveStrategy::Motion(s) => s.sensor_matrix(),
            InteractiveStrategy::Cardboard(s) => s.sensor_matrix(),
        }
    }
}
