// renderer.rs - per-frame matrix composition and mono/stereo draw dispatch
//
// Owned by the render thread. Everything it touches on the GPU goes through the
// `RenderDevice` it is handed, and only while the context is current.

use crate::commands::FrameCommand;
use crate::config::{EyeProjection, MonoProjection, PlayerConfig, VideoConfig};
use crate::context::GpuContext;
use crate::device::{
    MeshId, ProgramId, RenderDevice, TextureId, UniformLocation, U_DISTORTION_PARAMS,
    U_MVP_MATRIX, U_ST_MATRIX,
};
use crate::error::{PlayerError, Result};
use crate::eye::{eye_aspect, eye_mvp, eye_viewport, mono_frustum, perspective, Eye};
use crate::mesh;
use crate::panorama::{ProjectionMode, TouchRotation};
use crate::render_state::{RenderState, Rect, VrConfig};
use crate::video::{VideoStatus, VideoSurface};
use glam::Mat4;
use log::{debug, error, info};

pub const PANORAMA_SHADER: &str = include_str!("shader_panorama.wgsl");
pub const STEREO_SHADER: &str = include_str!("shader_stereo.wgsl");

const BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Snapshot of the control-side state taken once per frame under the player lock.
#[derive(Debug, Clone, Default)]
pub struct FrameInput {
    pub render_state: RenderState,
    pub vr: VrConfig,
    pub use_touch_control: bool,
    /// Present when the drag angles changed since the previous frame.
    pub touch: Option<TouchRotation>,
    pub external_mvp: Option<Mat4>,
    pub sensor: Option<Mat4>,
    pub commands: Vec<FrameCommand>,
}

#[derive(Debug, Clone, Copy)]
struct ProgramBinding {
    program: ProgramId,
    mvp: Option<UniformLocation>,
    st: Option<UniformLocation>,
    distortion: Option<UniformLocation>,
}

#[derive(Debug)]
enum ProgramSlot {
    Empty,
    Ready(ProgramBinding),
    Failed(PlayerError),
}

impl ProgramSlot {
    fn load(device: &mut dyn RenderDevice, label: &str, source: &str) -> Self {
        match device.create_program(label, source) {
            Ok(program) => {
                info!("{label} program ready");
                ProgramSlot::Ready(ProgramBinding {
                    program,
                    mvp: device.uniform_location(program, U_MVP_MATRIX),
                    st: device.uniform_location(program, U_ST_MATRIX),
                    distortion: device.uniform_location(program, U_DISTORTION_PARAMS),
                })
            }
            Err(e) => {
                error!("{label} program failed: {e}");
                ProgramSlot::Failed(e)
            }
        }
    }

    fn release(&mut self, device: &mut dyn RenderDevice) {
        if let ProgramSlot::Ready(binding) = self {
            device.delete_program(binding.program);
        }
        *self = ProgramSlot::Empty;
    }
}

pub struct FrameRenderer {
    mono_params: MonoProjection,
    eye_params: EyeProjection,
    video_params: VideoConfig,
    default_size: (u32, u32),

    projection_mode: ProjectionMode,
    mesh: Option<MeshId>,
    texture: Option<TextureId>,
    video: Option<VideoSurface>,
    mono: ProgramSlot,
    stereo: ProgramSlot,

    surface_size: (u32, u32),
    mono_projection: Mat4,
    touch_view: Mat4,
    st_matrix: [f32; 16],
    initialized: bool,
}

impl FrameRenderer {
    pub fn new(config: &PlayerConfig) -> Self {
        let (w, h) = config.default_surface_size;
        Self {
            mono_params: config.mono,
            eye_params: config.eye,
            video_params: config.video,
            default_size: (w.max(1), h.max(1)),
            projection_mode: config.projection_mode,
            mesh: None,
            texture: None,
            video: None,
            mono: ProgramSlot::Empty,
            stereo: ProgramSlot::Empty,
            surface_size: (w.max(1), h.max(1)),
            mono_projection: Mat4::IDENTITY,
            touch_view: Mat4::IDENTITY,
            st_matrix: Mat4::IDENTITY.to_cols_array(),
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Creates the mono program, the mesh for the current mode and the video
    /// texture with its surface. Returns the video surface id.
    pub fn init_resources(&mut self, ctx: &mut GpuContext) -> u64 {
        self.resize(ctx);
        let device = ctx.device();
        self.mono = ProgramSlot::load(device, "panorama", PANORAMA_SHADER);
        self.mesh = Some(device.create_mesh(&mesh::build(self.projection_mode)));

        let texture = device.create_video_texture();
        let video = VideoSurface::create(
            texture,
            self.video_params.disconnect_threshold,
            self.video_params.waiting_log_every,
            self.video_params.transient_log_every,
        );
        let id = video.surface_id();
        self.texture = Some(texture);
        self.video = Some(video);
        self.initialized = true;
        id
    }

    /// Runs deferred work; called every iteration, paused or not.
    pub fn apply_commands(&mut self, ctx: &mut GpuContext, commands: &[FrameCommand]) {
        for command in commands {
            match *command {
                FrameCommand::SetProjectionMode(mode) => {
                    let device = ctx.device();
                    if let Some(old) = self.mesh.take() {
                        device.delete_mesh(old);
                    }
                    self.mesh = Some(device.create_mesh(&mesh::build(mode)));
                    self.projection_mode = mode;
                    info!("projection mode {mode:?}");
                }
                FrameCommand::ResetStereoProgram => {
                    self.stereo.release(ctx.device());
                    debug!("stereo program reset");
                }
                FrameCommand::SurfaceChanged => self.resize(ctx),
            }
        }
    }

    fn resize(&mut self, ctx: &GpuContext) {
        self.surface_size = ctx.surface_size().unwrap_or(self.default_size);
        let (w, h) = self.surface_size;
        let p = self.mono_params;
        self.mono_projection = mono_frustum(w as f32 / h as f32, p.fov_scale, p.near, p.far);
        debug!("surface size {w}x{h}");
    }

    /// Pulls the newest video frame. Returns whether the source counts as connected.
    pub fn update_video(&mut self, device: &mut dyn RenderDevice) -> bool {
        let Some(video) = self.video.as_mut() else {
            return false;
        };
        if let Ok(st) = video.update(device) {
            self.st_matrix = st;
        }
        video.status() == VideoStatus::Connected
    }

    pub fn video_surface_id(&self) -> Option<u64> {
        self.video.as_ref().map(VideoSurface::surface_id)
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    pub fn projection_mode(&self) -> ProjectionMode {
        self.projection_mode
    }

    pub fn on_draw_frame(&mut self, device: &mut dyn RenderDevice, input: &FrameInput) -> Result<()> {
        let state = &input.render_state;
        device.apply_state(state.raster());
        if !input.vr.enabled {
            let (w, h) = self.surface_size;
            device.set_viewport(state.viewport.unwrap_or(Rect::new(0, 0, w, h)));
            device.set_scissor(state.scissor_enabled.then_some(state.scissor));
        }
        device.clear(state.clear_color);

        if let Some(touch) = input.touch {
            self.touch_view = touch.view_matrix();
        }

        if input.vr.enabled {
            self.draw_stereo(device, input)
        } else {
            self.draw_mono(device, input)
        }
    }

    fn base_view(&self, input: &FrameInput) -> Mat4 {
        input.sensor.unwrap_or(Mat4::IDENTITY) * self.touch_view
    }

    fn draw_mono(&mut self, device: &mut dyn RenderDevice, input: &FrameInput) -> Result<()> {
        let binding = match &self.mono {
            ProgramSlot::Ready(binding) => *binding,
            ProgramSlot::Failed(e) => return Err(e.clone()),
            ProgramSlot::Empty => return Ok(()),
        };
        let (Some(mesh), Some(texture)) = (self.mesh, self.texture) else {
            return Ok(());
        };

        let mvp = if input.use_touch_control {
            self.mono_projection * self.base_view(input)
        } else {
            input.external_mvp.unwrap_or(Mat4::IDENTITY)
        };

        device.use_program(Some(binding.program));
        if let Some(loc) = binding.mvp {
            device.set_uniform_mat4(loc, &mvp.to_cols_array());
        }
        if let Some(loc) = binding.st {
            device.set_uniform_mat4(loc, &self.st_matrix);
        }
        device.draw(mesh, texture);
        Ok(())
    }

    fn draw_stereo(&mut self, device: &mut dyn RenderDevice, input: &FrameInput) -> Result<()> {
        if matches!(self.stereo, ProgramSlot::Empty) {
            self.stereo = ProgramSlot::load(device, "stereo", STEREO_SHADER);
        }
        let binding = match &self.stereo {
            ProgramSlot::Ready(binding) => *binding,
            ProgramSlot::Failed(e) => {
                device.set_scissor(None);
                device.clear(BLACK);
                return Err(e.clone());
            }
            ProgramSlot::Empty => return Ok(()),
        };
        let (Some(mesh), Some(texture)) = (self.mesh, self.texture) else {
            return Ok(());
        };

        let (w, h) = self.surface_size;
        let p = self.eye_params;
        let projection = perspective(p.fov_y_degrees, eye_aspect(w, h), p.near, p.far);
        let base = self.base_view(input);

        device.use_program(Some(binding.program));
        if let Some(loc) = binding.st {
            device.set_uniform_mat4(loc, &self.st_matrix);
        }
        for eye in Eye::BOTH {
            let viewport = eye_viewport(eye, w, h);
            device.set_viewport(viewport);
            device.set_scissor(Some(viewport));
            device.clear(input.render_state.clear_color);

            let mvp = eye_mvp(eye, &projection, &base, input.vr.ipd);
            if let Some(loc) = binding.mvp {
                device.set_uniform_mat4(loc, &mvp.to_cols_array());
            }
            if let Some(loc) = binding.distortion {
                device.set_uniform_vec4(loc, input.vr.distortion_uniform());
            }
            device.draw(mesh, texture);
        }
        device.set_scissor(None);
        Ok(())
    }

    /// Deletes every GPU object. The video surface id stops resolving.
    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        self.mono.release(device);
        self.stereo.release(device);
        if let Some(mesh) = self.mesh.take() {
            device.delete_mesh(mesh);
        }
        self.video = None;
        if let Some(texture) = self.texture.take() {
            device.delete_texture(texture);
        }
        self.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::WindowSlot;
    use crate::mock::{GpuCall, GpuLog, MockWindow, RecordingBackend};
    use crate::window::WindowRef;
    use std::sync::Arc;

    fn setup(width: u32, height: u32) -> (GpuContext, GpuLog, FrameRenderer) {
        let (backend, log) = RecordingBackend::new();
        let slot = Arc::new(WindowSlot::default());
        slot.set(Some(WindowRef::new(MockWindow::new(width, height))));
        let mut ctx = GpuContext::new(Box::new(backend), slot);
        ctx.prepare().unwrap();
        let mut renderer = FrameRenderer::new(&PlayerConfig::default());
        renderer.init_resources(&mut ctx);
        log.clear();
        (ctx, log, renderer)
    }

    fn vr_input() -> FrameInput {
        FrameInput {
            vr: VrConfig { enabled: true, ..VrConfig::default() },
            use_touch_control: true,
            ..FrameInput::default()
        }
    }

    #[test]
    fn stereo_frame_draws_both_eyes() {
        let (mut ctx, log, mut renderer) = setup(1001, 500);
        renderer.on_draw_frame(ctx.device(), &vr_input()).unwrap();

        let draws = log.draws();
        assert_eq!(draws.len(), 2);
        let left = draws[0].viewport.unwrap();
        let right = draws[1].viewport.unwrap();
        assert_eq!((left.x, right.x), (0, 500));
        assert_eq!(left.width + right.width, 1001);
        assert_eq!(draws[0].scissor, Some(left));
        assert_eq!(draws[0].distortion, Some([0.9, 0.1, 0.0, 0.0]));
        assert_ne!(draws[0].mvp, draws[1].mvp);
        assert_eq!(log.calls().last(), Some(&GpuCall::SetScissor(None)));
    }

    #[test]
    fn stereo_program_compiled_once_until_reset() {
        let (mut ctx, log, mut renderer) = setup(800, 400);
        let compiles = |log: &GpuLog| {
            log.count(|c| matches!(c, GpuCall::CreateProgram { label, .. } if label == "stereo"))
        };
        renderer.on_draw_frame(ctx.device(), &vr_input()).unwrap();
        renderer.on_draw_frame(ctx.device(), &vr_input()).unwrap();
        assert_eq!(compiles(&log), 1);

        renderer.apply_commands(&mut ctx, &[FrameCommand::ResetStereoProgram]);
        assert_eq!(log.count(|c| matches!(c, GpuCall::DeleteProgram(_))), 1);
        renderer.on_draw_frame(ctx.device(), &vr_input()).unwrap();
        assert_eq!(compiles(&log), 2);
    }

    #[test]
    fn failed_stereo_program_renders_black_and_is_not_retried() {
        let (backend, log) = RecordingBackend::new();
        backend.controls().fail_link("stereo");
        let mut ctx = GpuContext::new(Box::new(backend), Arc::new(WindowSlot::default()));
        ctx.prepare().unwrap();
        let mut renderer = FrameRenderer::new(&PlayerConfig::default());
        renderer.init_resources(&mut ctx);

        for _ in 0..3 {
            let result = renderer.on_draw_frame(ctx.device(), &vr_input());
            assert!(matches!(result, Err(PlayerError::ShaderLink(_))));
        }
        assert!(log.draws().is_empty());
        assert_eq!(log.calls().last(), Some(&GpuCall::Clear(BLACK)));

        // Mono is unaffected.
        renderer.on_draw_frame(ctx.device(), &FrameInput::default()).unwrap();
        assert_eq!(log.draws().len(), 1);
    }

    #[test]
    fn mono_uses_external_mvp_unless_touch() {
        let (mut ctx, log, mut renderer) = setup(640, 480);
        let external = Mat4::from_scale(glam::Vec3::splat(2.0));
        let input = FrameInput {
            external_mvp: Some(external),
            ..FrameInput::default()
        };
        renderer.on_draw_frame(ctx.device(), &input).unwrap();
        assert_eq!(log.draws()[0].mvp, Some(external.to_cols_array()));
        assert_eq!(log.draws()[0].viewport, Some(Rect::new(0, 0, 640, 480)));

        log.clear();
        let touch = FrameInput {
            use_touch_control: true,
            touch: Some(TouchRotation { delta_x: 30.0, delta_y: 0.0 }),
            ..input
        };
        renderer.on_draw_frame(ctx.device(), &touch).unwrap();
        let p = PlayerConfig::default().mono;
        let expected = mono_frustum(640.0 / 480.0, p.fov_scale, p.near, p.far)
            * Mat4::from_rotation_y((-30.0f32).to_radians())
            * Mat4::from_rotation_x(0.0);
        let got = Mat4::from_cols_array(&log.draws()[0].mvp.unwrap());
        assert!(got.abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn custom_viewport_and_scissor_only_outside_vr() {
        let (mut ctx, log, mut renderer) = setup(640, 480);
        let mut input = FrameInput::default();
        input.render_state.viewport = Some(Rect::new(10, 20, 100, 50));
        input.render_state.scissor = Rect::new(0, 0, 32, 32);
        input.render_state.scissor_enabled = true;
        renderer.on_draw_frame(ctx.device(), &input).unwrap();
        assert!(log.calls().contains(&GpuCall::SetViewport(Rect::new(10, 20, 100, 50))));
        assert!(log.calls().contains(&GpuCall::SetScissor(Some(Rect::new(0, 0, 32, 32)))));

        log.clear();
        input.vr.enabled = true;
        renderer.on_draw_frame(ctx.device(), &input).unwrap();
        assert!(!log.calls().contains(&GpuCall::SetViewport(Rect::new(10, 20, 100, 50))));
    }

    #[test]
    fn projection_mode_change_rebuilds_mesh() {
        let (mut ctx, log, mut renderer) = setup(640, 480);
        renderer.apply_commands(&mut ctx, &[FrameCommand::SetProjectionMode(ProjectionMode::Cube)]);
        let calls = log.calls();
        assert!(matches!(calls[0], GpuCall::DeleteMesh(_)));
        assert!(matches!(calls[1], GpuCall::CreateMesh { indices: 36, .. }));
        assert_eq!(renderer.projection_mode(), ProjectionMode::Cube);
    }

    #[test]
    fn unqueryable_surface_uses_default_size() {
        let (backend, _log) = RecordingBackend::new();
        let mut ctx = GpuContext::new(Box::new(backend), Arc::new(WindowSlot::default()));
        ctx.prepare().unwrap();
        let mut renderer = FrameRenderer::new(&PlayerConfig::default());
        renderer.init_resources(&mut ctx);
        assert_eq!(renderer.surface_size(), (1920, 1080));
    }

    #[test]
    fn release_frees_everything() {
        let (mut ctx, log, mut renderer) = setup(64, 64);
        renderer.on_draw_frame(ctx.device(), &vr_input()).unwrap();
        log.clear();
        let id = renderer.video_surface_id().unwrap();
        renderer.release(ctx.device());
        assert_eq!(log.count(|c| matches!(c, GpuCall::DeleteProgram(_))), 2);
        assert_eq!(log.count(|c| matches!(c, GpuCall::DeleteMesh(_))), 1);
        assert_eq!(log.count(|c| matches!(c, GpuCall::DeleteTexture(_))), 1);
        assert!(crate::video::connect(&id.to_string()).is_err());
    }
}
