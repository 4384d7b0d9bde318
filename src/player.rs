// player.rs - control-side player API and the state shared with the render thread
//
// Setters only touch `ControlState` under one short lock; anything that needs
// the GPU is queued as a `FrameCommand` for the render thread.

use crate::commands::{CommandQueue, FrameCommand};
use crate::config::PlayerConfig;
use crate::context::{GpuBackend, WindowSlot};
use crate::error::{PlayerError, Result};
use crate::motion::Director;
use crate::panorama::{ProjectionMode, TouchRotation};
use crate::render_loop::RenderLoop;
use crate::render_state::{BlendFactor, Rect, RenderState, VrConfig};
use crate::renderer::FrameInput;
use crate::window::WindowRef;
use glam::Mat4;
use log::{info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

struct ControlState {
    render_state: RenderState,
    projection_mode: ProjectionMode,
    vr: VrConfig,
    touch: TouchRotation,
    use_touch_control: bool,
    touch_dirty: bool,
    external_mvp: Option<Mat4>,
    sensor: Option<Mat4>,
    commands: CommandQueue,
}

pub(crate) struct Shared {
    control: Mutex<ControlState>,
    window_slot: Arc<WindowSlot>,
    paused: AtomicBool,
    destroyed: AtomicBool,
    video_surface_id: AtomicU64,
    video_connected: AtomicBool,
    frames: AtomicU64,
}

impl Shared {
    fn new(config: &PlayerConfig) -> Self {
        Self {
            control: Mutex::new(ControlState {
                render_state: config.render_state.clone(),
                projection_mode: config.projection_mode,
                vr: config.vr,
                touch: TouchRotation::default(),
                use_touch_control: true,
                touch_dirty: true,
                external_mvp: None,
                sensor: None,
                commands: CommandQueue::default(),
            }),
            window_slot: Arc::new(WindowSlot::default()),
            paused: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            video_surface_id: AtomicU64::new(0),
            video_connected: AtomicBool::new(false),
            frames: AtomicU64::new(0),
        }
    }

    pub fn window_slot(&self) -> Arc<WindowSlot> {
        Arc::clone(&self.window_slot)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn set_video_surface_id(&self, id: u64) {
        self.video_surface_id.store(id, Ordering::Release);
    }

    pub fn set_video_connected(&self, connected: bool) {
        self.video_connected.store(connected, Ordering::Release);
    }

    pub fn frame_done(&self) {
        self.frames.fetch_add(1, Ordering::AcqRel);
    }

    pub fn take_commands(&self) -> Vec<FrameCommand> {
        self.control.lock().commands.drain()
    }

    /// Everything a frame needs, copied out in one critical section.
    pub fn take_frame_input(&self) -> FrameInput {
        let mut c = self.control.lock();
        let touch = std::mem::take(&mut c.touch_dirty).then_some(c.touch);
        FrameInput {
            render_state: c.render_state.clone(),
            vr: c.vr,
            use_touch_control: c.use_touch_control,
            touch,
            external_mvp: c.external_mvp,
            sensor: c.sensor,
            commands: c.commands.drain(),
        }
    }
}

fn matrix_from_slice(name: &str, values: &[f32]) -> Result<Mat4> {
    let array: [f32; 16] = values.try_into().map_err(|_| {
        PlayerError::InvalidArgument(format!("{name} needs 16 floats, got {}", values.len()))
    })?;
    if array.iter().any(|v| !v.is_finite()) {
        return Err(PlayerError::InvalidArgument(format!("{name} has non-finite entries")));
    }
    Ok(Mat4::from_cols_array(&array))
}

fn rect_from(name: &str, x: i32, y: i32, width: i32, height: i32) -> Result<Rect> {
    if width < 0 || height < 0 {
        return Err(PlayerError::InvalidArgument(format!("{name} {width}x{height}")));
    }
    Ok(Rect::new(x, y, width as u32, height as u32))
}

/// Sensor-matrix slot of a player, attached to a strategy as its director.
pub struct SensorSink(Arc<Shared>);

impl Director for SensorSink {
    fn update_sensor_matrix(&self, matrix: &Mat4) {
        self.0.control.lock().sensor = Some(*matrix);
    }

    fn reset(&self) {
        self.0.control.lock().sensor = None;
    }
}

/// One player instance: `uninitialized -> running <-> paused -> destroyed`.
pub struct Player {
    config: PlayerConfig,
    shared: Arc<Shared>,
    backend: Mutex<Option<Box<dyn GpuBackend>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Player {
    pub fn new(config: PlayerConfig, backend: impl GpuBackend) -> Self {
        Self::with_backend(config, Box::new(backend))
    }

    pub fn with_backend(config: PlayerConfig, backend: Box<dyn GpuBackend>) -> Self {
        let shared = Arc::new(Shared::new(&config));
        Self {
            config,
            shared,
            backend: Mutex::new(Some(backend)),
            thread: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Starts the render thread. Only the first call on a live player does anything.
    pub fn init(&self) -> Result<()> {
        if self.shared.is_destroyed() {
            warn!("init after destroy ignored");
            return Ok(());
        }
        let mut thread_slot = self.thread.lock();
        let Some(backend) = self.backend.lock().take() else {
            return Ok(());
        };

        let render_loop = RenderLoop::new(&self.config, backend, Arc::clone(&self.shared));
        let handle = thread::Builder::new()
            .name("vr360-render".into())
            .spawn(move || render_loop.run())
            .map_err(|e| PlayerError::ContextInit(format!("spawn render thread: {e}")))?;
        *thread_slot = Some(handle);
        info!("player initialized");
        Ok(())
    }

    /// Stops the render thread and waits for it. Once this returns no GPU call
    /// is made any more. Without a prior `init` this does nothing.
    pub fn destroy(&self) {
        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        self.shared.destroyed.store(true, Ordering::Release);
        if handle.join().is_err() {
            warn!("render thread panicked");
        }
        info!("player destroyed");
    }

    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.thread.lock().is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.is_paused()
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.is_destroyed()
    }

    /// Render-loop iterations completed so far.
    pub fn frame_count(&self) -> u64 {
        self.shared.frames.load(Ordering::Acquire)
    }

    /// Director that feeds this player's sensor matrix.
    pub fn sensor_sink(&self) -> Arc<dyn Director> {
        Arc::new(SensorSink(Arc::clone(&self.shared)))
    }

    fn surface_changed(&self, c: &mut ControlState) {
        c.render_state.viewport = None;
        c.commands.push(FrameCommand::SurfaceChanged);
    }

    /// Binds the output window, or detaches it on `None`.
    pub fn set_surface(&self, window: Option<WindowRef>) {
        self.shared.window_slot.set(window);
        self.surface_changed(&mut self.shared.control.lock());
    }

    /// The window was resized; the size is re-queried on the render thread.
    pub fn notify_surface_changed(&self) {
        self.surface_changed(&mut self.shared.control.lock());
    }

    pub fn update_mvp_matrix(&self, values: &[f32]) -> Result<()> {
        let mvp = matrix_from_slice("mvp matrix", values).inspect_err(|e| warn!("{e}"))?;
        let mut c = self.shared.control.lock();
        c.external_mvp = Some(mvp);
        if !c.vr.enabled {
            c.use_touch_control = false;
        }
        Ok(())
    }

    pub fn update_touch_delta(&self, dx: f32, dy: f32) {
        if !dx.is_finite() || !dy.is_finite() {
            warn!("touch delta ({dx}, {dy}) ignored");
            return;
        }
        let mut c = self.shared.control.lock();
        c.touch.accumulate(dx, dy);
        c.use_touch_control = true;
        c.touch_dirty = true;
    }

    pub fn update_sensor_matrix(&self, values: &[f32]) -> Result<()> {
        let matrix = matrix_from_slice("sensor matrix", values).inspect_err(|e| warn!("{e}"))?;
        self.shared.control.lock().sensor = Some(matrix);
        Ok(())
    }

    pub fn set_clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        self.shared.control.lock().render_state.clear_color = [r, g, b, a];
    }

    pub fn set_cull_face_enabled(&self, enabled: bool) {
        self.shared.control.lock().render_state.cull_face = enabled;
    }

    pub fn set_depth_test_enabled(&self, enabled: bool) {
        self.shared.control.lock().render_state.depth_test = enabled;
    }

    pub fn set_viewport(&self, x: i32, y: i32, width: i32, height: i32) -> Result<()> {
        let rect = rect_from("viewport", x, y, width, height).inspect_err(|e| warn!("{e}"))?;
        self.shared.control.lock().render_state.viewport = Some(rect);
        Ok(())
    }

    pub fn set_scissor(&self, x: i32, y: i32, width: i32, height: i32) -> Result<()> {
        let rect = rect_from("scissor", x, y, width, height).inspect_err(|e| warn!("{e}"))?;
        self.shared.control.lock().render_state.scissor = rect;
        Ok(())
    }

    pub fn set_scissor_enabled(&self, enabled: bool) {
        self.shared.control.lock().render_state.scissor_enabled = enabled;
    }

    pub fn set_blend_enabled(&self, enabled: bool) {
        self.shared.control.lock().render_state.blend = enabled;
    }

    /// Factors are GL enum values.
    pub fn set_blend_func(&self, src: u32, dst: u32) -> Result<()> {
        let (Some(src_factor), Some(dst_factor)) = (BlendFactor::from_gl(src), BlendFactor::from_gl(dst))
        else {
            warn!("unknown blend factors {src:#x}/{dst:#x}");
            return Err(PlayerError::InvalidArgument(format!("blend func {src:#x}/{dst:#x}")));
        };
        let mut c = self.shared.control.lock();
        c.render_state.blend_src = src_factor;
        c.render_state.blend_dst = dst_factor;
        Ok(())
    }

    pub fn set_projection_mode(&self, code: i32) {
        let mode = ProjectionMode::from_code(code);
        let mut c = self.shared.control.lock();
        c.projection_mode = mode;
        c.commands.push(FrameCommand::SetProjectionMode(mode));
    }

    pub fn projection_mode(&self) -> ProjectionMode {
        self.shared.control.lock().projection_mode
    }

    pub fn render_state(&self) -> RenderState {
        self.shared.control.lock().render_state.clone()
    }

    /// Every enable re-applies the configured VR defaults, even when VR is
    /// already on. Either direction drops the stereo program on the render
    /// thread.
    pub fn set_vr_mode_enabled(&self, enabled: bool) {
        let mut c = self.shared.control.lock();
        if enabled {
            c.vr = VrConfig { enabled: true, ..self.config.vr };
            c.use_touch_control = true;
            c.touch_dirty = true;
        } else {
            c.vr.enabled = false;
        }
        c.commands.push(FrameCommand::ResetStereoProgram);
        info!("VR mode {}", if enabled { "on" } else { "off" });
    }

    pub fn is_vr_mode_enabled(&self) -> bool {
        self.shared.control.lock().vr.enabled
    }

    pub fn vr_config(&self) -> VrConfig {
        self.shared.control.lock().vr
    }

    pub fn set_ipd(&self, ipd: f32) {
        if !ipd.is_finite() {
            warn!("ipd {ipd} ignored");
            return;
        }
        self.shared.control.lock().vr.ipd = ipd;
    }

    pub fn set_eye_offset(&self, offset: f32) {
        if !offset.is_finite() {
            warn!("eye offset {offset} ignored");
            return;
        }
        self.shared.control.lock().vr.eye_offset = offset;
    }

    pub fn set_barrel_distortion_enabled(&self, enabled: bool) {
        self.shared.control.lock().vr.barrel_distortion = enabled;
    }

    pub fn set_barrel_distortion_params(&self, k1: f32, k2: f32, scale: f32) {
        self.shared.control.lock().vr.set_distortion_params(k1, k2, scale);
    }

    /// Numeric id of the video surface, empty until the render thread created it.
    pub fn get_video_surface_id(&self) -> String {
        match self.shared.video_surface_id.load(Ordering::Acquire) {
            0 => String::new(),
            id => id.to_string(),
        }
    }

    pub fn is_video_connected(&self) -> bool {
        self.shared.video_connected.load(Ordering::Acquire)
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingBackend;

    fn player() -> Player {
        let (backend, _log) = RecordingBackend::new();
        Player::new(PlayerConfig::default(), backend)
    }

    #[test]
    fn vr_enable_reapplies_defaults_and_queues_reset() {
        let p = player();
        p.set_ipd(0.07);
        p.set_barrel_distortion_params(1.5, 0.0, 1.0);
        p.set_vr_mode_enabled(true);
        assert_eq!(p.vr_config(), VrConfig { enabled: true, ..VrConfig::default() });

        p.set_ipd(0.07);
        p.set_barrel_distortion_params(1.5, 0.0, 1.0);
        p.update_mvp_matrix(&Mat4::IDENTITY.to_cols_array()).unwrap();
        p.set_vr_mode_enabled(true);
        assert_eq!(p.vr_config(), VrConfig { enabled: true, ..VrConfig::default() });
        assert!(p.shared.take_frame_input().use_touch_control);

        p.set_vr_mode_enabled(true);
        p.set_vr_mode_enabled(false);
        p.set_vr_mode_enabled(false);
        assert!(!p.is_vr_mode_enabled());
        assert_eq!(p.shared.take_commands(), vec![FrameCommand::ResetStereoProgram]);
    }

    #[test]
    fn external_mvp_turns_touch_off_outside_vr() {
        let p = player();
        let identity = Mat4::IDENTITY.to_cols_array();
        assert!(matches!(
            p.update_mvp_matrix(&identity[..15]),
            Err(PlayerError::InvalidArgument(_))
        ));
        assert!(p.shared.take_frame_input().use_touch_control);

        p.update_mvp_matrix(&identity).unwrap();
        let input = p.shared.take_frame_input();
        assert!(!input.use_touch_control);
        assert_eq!(input.external_mvp, Some(Mat4::IDENTITY));

        p.update_touch_delta(5.0, 0.0);
        let input = p.shared.take_frame_input();
        assert!(input.use_touch_control);
        assert_eq!(input.touch, Some(TouchRotation { delta_x: 5.0, delta_y: 0.0 }));
        assert_eq!(p.shared.take_frame_input().touch, None);
    }

    #[test]
    fn blend_func_rejects_unknown_factors() {
        let p = player();
        assert!(p.set_blend_func(0x0302, 0x0303).is_ok());
        assert!(matches!(p.set_blend_func(0x9999, 1), Err(PlayerError::InvalidArgument(_))));
        let state = p.render_state();
        assert_eq!((state.blend_src, state.blend_dst), (BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha));
    }

    #[test]
    fn surface_change_drops_custom_viewport() {
        let p = player();
        p.set_viewport(0, 0, 100, 100).unwrap();
        assert!(p.set_viewport(0, 0, -1, 100).is_err());
        p.notify_surface_changed();
        let input = p.shared.take_frame_input();
        assert_eq!(input.render_state.viewport, None);
        assert_eq!(input.commands, vec![FrameCommand::SurfaceChanged]);
    }

    #[test]
    fn sensor_sink_reset_clears_matrix() {
        let p = player();
        let sink = p.sensor_sink();
        sink.update_sensor_matrix(&Mat4::from_rotation_y(0.3));
        assert!(p.shared.take_frame_input().sensor.is_some());
        sink.reset();
        assert_eq!(p.shared.take_frame_input().sensor, None);
    }

    #[test]
    fn unknown_projection_code_falls_back_to_sphere() {
        let p = player();
        p.set_projection_mode(214);
        assert_eq!(p.projection_mode(), ProjectionMode::Cube);
        p.set_projection_mode(999);
        assert_eq!(p.projection_mode(), ProjectionMode::Sphere);
        assert_eq!(
            p.shared.take_commands(),
            vec![FrameCommand::SetProjectionMode(ProjectionMode::Sphere)]
        );
    }
}
