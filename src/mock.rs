// mock.rs - recording backend and window for exercising the player without a GPU

use crate::context::{GraphicsDriver, SurfaceAttribute, SurfaceKind};
use crate::device::{
    MeshId, ProgramId, RenderDevice, TextureId, UniformLocation, U_DISTORTION_PARAMS,
    U_MVP_MATRIX, U_ST_MATRIX,
};
use crate::error::{PlayerError, Result};
use crate::mesh::MeshData;
use crate::render_state::{RasterState, Rect};
use crate::video::VideoFrame;
use crate::window::{NativeWindow, WindowRef};
use parking_lot::Mutex;
use raw_window_handle::{
    RawDisplayHandle, RawWindowHandle, XlibDisplayHandle, XlibWindowHandle,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Window with a settable size and dummy native handles.
#[derive(Debug)]
pub struct MockWindow {
    width: AtomicU32,
    height: AtomicU32,
}

impl MockWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width: AtomicU32::new(width), height: AtomicU32::new(height) }
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.width.store(width, Ordering::SeqCst);
        self.height.store(height, Ordering::SeqCst);
    }
}

impl NativeWindow for MockWindow {
    fn inner_size(&self) -> (u32, u32) {
        (self.width.load(Ordering::SeqCst), self.height.load(Ordering::SeqCst))
    }

    fn window_handle(&self) -> RawWindowHandle {
        RawWindowHandle::Xlib(XlibWindowHandle::empty())
    }

    fn display_handle(&self) -> RawDisplayHandle {
        RawDisplayHandle::Xlib(XlibDisplayHandle::empty())
    }
}

/// A draw with the state it was issued under.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub mesh: MeshId,
    pub texture: TextureId,
    pub program: Option<ProgramId>,
    pub viewport: Option<Rect>,
    pub scissor: Option<Rect>,
    pub mvp: Option<[f32; 16]>,
    pub distortion: Option<[f32; 4]>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CreateContext,
    DestroyContext,
    TerminateDisplay,
    CreateOffscreenSurface(u32, u32),
    DestroyOffscreenSurface,
    CreateWindowSurface(u32, u32),
    DestroyWindowSurface,
    MakeCurrent(Option<SurfaceKind>),
    SwapBuffers,
    CreateProgram { label: String, program: ProgramId },
    DeleteProgram(ProgramId),
    UseProgram(Option<ProgramId>),
    SetUniformMat4 { program: Option<ProgramId>, location: UniformLocation, value: [f32; 16] },
    SetUniformVec4 { program: Option<ProgramId>, location: UniformLocation, value: [f32; 4] },
    CreateMesh { mesh: MeshId, indices: usize },
    DeleteMesh(MeshId),
    CreateVideoTexture(TextureId),
    UploadVideoFrame { texture: TextureId, width: u32, height: u32 },
    DeleteTexture(TextureId),
    ApplyState(RasterState),
    Clear([f32; 4]),
    SetViewport(Rect),
    SetScissor(Option<Rect>),
    Draw(DrawCall),
}

/// Shared view of everything a [`RecordingBackend`] was asked to do.
#[derive(Debug, Clone, Default)]
pub struct GpuLog(Arc<Mutex<Vec<GpuCall>>>);

impl GpuLog {
    fn push(&self, call: GpuCall) {
        self.0.lock().push(call);
    }

    pub fn calls(&self) -> Vec<GpuCall> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    pub fn count(&self, pred: impl Fn(&GpuCall) -> bool) -> usize {
        self.0.lock().iter().filter(|c| pred(c)).count()
    }

    pub fn draws(&self) -> Vec<DrawCall> {
        self.0
            .lock()
            .iter()
            .filter_map(|c| match c {
                GpuCall::Draw(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct Failures {
    context: bool,
    window_surface: bool,
    upload: bool,
    compile: Vec<String>,
    link: Vec<String>,
}

/// Failure switches for a [`RecordingBackend`], usable after it moved to the
/// render thread.
#[derive(Debug, Clone, Default)]
pub struct MockControls(Arc<Mutex<Failures>>);

impl MockControls {
    pub fn fail_context(&self, fail: bool) {
        self.0.lock().context = fail;
    }

    pub fn fail_window_surface(&self, fail: bool) {
        self.0.lock().window_surface = fail;
    }

    pub fn fail_upload(&self, fail: bool) {
        self.0.lock().upload = fail;
    }

    /// Programs whose label contains `label` fail to compile.
    pub fn fail_compile(&self, label: &str) {
        self.0.lock().compile.push(label.to_owned());
    }

    /// Programs whose label contains `label` fail to link.
    pub fn fail_link(&self, label: &str) {
        self.0.lock().link.push(label.to_owned());
    }

    pub fn clear_failures(&self) {
        *self.0.lock() = Failures::default();
    }
}

/// Driver and device that only record calls.
pub struct RecordingBackend {
    log: GpuLog,
    controls: MockControls,
    next_id: u32,
    window: Option<WindowRef>,
    current: Option<SurfaceKind>,
    program: Option<ProgramId>,
    programs: HashMap<ProgramId, String>,
    uniforms: HashMap<(ProgramId, UniformLocation), Vec<f32>>,
    viewport: Option<Rect>,
    scissor: Option<Rect>,
}

impl RecordingBackend {
    pub fn new() -> (Self, GpuLog) {
        let log = GpuLog::default();
        let backend = Self {
            log: log.clone(),
            controls: MockControls::default(),
            next_id: 1,
            window: None,
            current: None,
            program: None,
            programs: HashMap::new(),
            uniforms: HashMap::new(),
            viewport: None,
            scissor: None,
        };
        (backend, log)
    }

    pub fn controls(&self) -> MockControls {
        self.controls.clone()
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn uniform(&self, name: &str) -> Option<Vec<f32>> {
        let program = self.program?;
        let location = self.uniform_location(program, name)?;
        self.uniforms.get(&(program, location)).cloned()
    }
}

impl GraphicsDriver for RecordingBackend {
    fn create_context(&mut self) -> Result<()> {
        if self.controls.0.lock().context {
            return Err(PlayerError::ContextInit("mock display unavailable".into()));
        }
        self.log.push(GpuCall::CreateContext);
        Ok(())
    }

    fn destroy_context(&mut self) {
        self.log.push(GpuCall::DestroyContext);
    }

    fn terminate_display(&mut self) {
        self.log.push(GpuCall::TerminateDisplay);
    }

    fn create_offscreen_surface(&mut self, width: u32, height: u32) -> Result<()> {
        self.log.push(GpuCall::CreateOffscreenSurface(width, height));
        Ok(())
    }

    fn destroy_offscreen_surface(&mut self) {
        self.log.push(GpuCall::DestroyOffscreenSurface);
    }

    fn create_window_surface(&mut self, window: &WindowRef) -> Result<()> {
        if self.controls.0.lock().window_surface {
            return Err(PlayerError::ContextInit("mock window surface".into()));
        }
        let (w, h) = window.inner_size();
        self.log.push(GpuCall::CreateWindowSurface(w, h));
        self.window = Some(window.clone());
        Ok(())
    }

    fn destroy_window_surface(&mut self) {
        self.log.push(GpuCall::DestroyWindowSurface);
        self.window = None;
    }

    fn make_current(&mut self, surface: Option<SurfaceKind>) -> Result<()> {
        self.log.push(GpuCall::MakeCurrent(surface));
        self.current = surface;
        Ok(())
    }

    fn swap_buffers(&mut self) -> Result<()> {
        self.log.push(GpuCall::SwapBuffers);
        Ok(())
    }

    fn query_surface(&self, surface: SurfaceKind, attribute: SurfaceAttribute) -> Option<i32> {
        let (w, h) = match surface {
            SurfaceKind::Window => self.window.as_ref()?.inner_size(),
            SurfaceKind::Offscreen => (16, 16),
        };
        Some(match attribute {
            SurfaceAttribute::Width => w as i32,
            SurfaceAttribute::Height => h as i32,
        })
    }
}

impl RenderDevice for RecordingBackend {
    fn create_program(&mut self, label: &str, _source: &str) -> Result<ProgramId> {
        let failures = self.controls.0.lock();
        if failures.compile.iter().any(|l| label.contains(l.as_str())) {
            return Err(PlayerError::ShaderCompile(format!("{label}: mock compile error")));
        }
        if failures.link.iter().any(|l| label.contains(l.as_str())) {
            return Err(PlayerError::ShaderLink(format!("{label}: mock link error")));
        }
        drop(failures);

        let program = ProgramId(self.next());
        self.programs.insert(program, label.to_owned());
        self.log.push(GpuCall::CreateProgram { label: label.to_owned(), program });
        Ok(program)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        self.uniforms.retain(|(p, _), _| *p != program);
        if self.program == Some(program) {
            self.program = None;
        }
        self.log.push(GpuCall::DeleteProgram(program));
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.program = program;
        self.log.push(GpuCall::UseProgram(program));
    }

    fn current_program(&self) -> Option<ProgramId> {
        self.program
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        if !self.programs.contains_key(&program) {
            return None;
        }
        match name {
            U_MVP_MATRIX => Some(UniformLocation(0)),
            U_ST_MATRIX => Some(UniformLocation(1)),
            U_DISTORTION_PARAMS => Some(UniformLocation(2)),
            _ => None,
        }
    }

    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &[f32; 16]) {
        if let Some(program) = self.program {
            self.uniforms.insert((program, location), value.to_vec());
        }
        self.log.push(GpuCall::SetUniformMat4 { program: self.program, location, value: *value });
    }

    fn set_uniform_vec4(&mut self, location: UniformLocation, value: [f32; 4]) {
        if let Some(program) = self.program {
            self.uniforms.insert((program, location), value.to_vec());
        }
        self.log.push(GpuCall::SetUniformVec4 { program: self.program, location, value });
    }

    fn create_mesh(&mut self, data: &MeshData) -> MeshId {
        let mesh = MeshId(self.next());
        self.log.push(GpuCall::CreateMesh { mesh, indices: data.index_count() });
        mesh
    }

    fn delete_mesh(&mut self, mesh: MeshId) {
        self.log.push(GpuCall::DeleteMesh(mesh));
    }

    fn create_video_texture(&mut self) -> TextureId {
        let texture = TextureId(self.next());
        self.log.push(GpuCall::CreateVideoTexture(texture));
        texture
    }

    fn upload_video_frame(&mut self, texture: TextureId, frame: &VideoFrame) -> Result<()> {
        if self.controls.0.lock().upload {
            return Err(PlayerError::InvalidArgument("mock upload rejected".into()));
        }
        self.log.push(GpuCall::UploadVideoFrame {
            texture,
            width: frame.width,
            height: frame.height,
        });
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.log.push(GpuCall::DeleteTexture(texture));
    }

    fn apply_state(&mut self, state: RasterState) {
        self.log.push(GpuCall::ApplyState(state));
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.log.push(GpuCall::Clear(color));
    }

    fn set_viewport(&mut self, rect: Rect) {
        self.viewport = Some(rect);
        self.log.push(GpuCall::SetViewport(rect));
    }

    fn set_scissor(&mut self, rect: Option<Rect>) {
        self.scissor = rect;
        self.log.push(GpuCall::SetScissor(rect));
    }

    fn draw(&mut self, mesh: MeshId, texture: TextureId) {
        let mvp = self.uniform(U_MVP_MATRIX).and_then(|v| v.try_into().ok());
        let distortion = self.uniform(U_DISTORTION_PARAMS).and_then(|v| v.try_into().ok());
        self.log.push(GpuCall::Draw(DrawCall {
            mesh,
            texture,
            program: self.program,
            viewport: self.viewport,
            scissor: self.scissor,
            mvp,
            distortion,
        }));
    }
}
