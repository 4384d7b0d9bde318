// device.rs - GPU resource and draw interface used by the render thread

use crate::error::Result;
use crate::mesh::MeshData;
use crate::render_state::{RasterState, Rect};
use crate::video::VideoFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// Uniform names shared by the bundled shaders.
pub const U_MVP_MATRIX: &str = "u_MVPMatrix";
pub const U_ST_MATRIX: &str = "u_STMatrix";
pub const U_DISTORTION_PARAMS: &str = "u_DistortionParams";

/// Program, mesh, texture and draw calls. Only the render thread holds one, and
/// only while the context is current.
///
/// Uniforms are per-program state: values set while a program is in use stick
/// to that program until overwritten, and every draw captures the current values.
pub trait RenderDevice {
    /// Builds a program from WGSL source with `vs_main`/`fs_main` entry points.
    /// Source errors map to `ShaderCompile`, pipeline errors to `ShaderLink`.
    fn create_program(&mut self, label: &str, source: &str) -> Result<ProgramId>;
    fn delete_program(&mut self, program: ProgramId);
    fn use_program(&mut self, program: Option<ProgramId>);
    fn current_program(&self) -> Option<ProgramId>;
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    /// Applies to the program in use; ignored when none is.
    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &[f32; 16]);
    fn set_uniform_vec4(&mut self, location: UniformLocation, value: [f32; 4]);

    fn create_mesh(&mut self, data: &MeshData) -> MeshId;
    fn delete_mesh(&mut self, mesh: MeshId);

    /// Texture sampled from the video surface, resized on upload as needed.
    fn create_video_texture(&mut self) -> TextureId;
    /// Fails when the frame cannot be stored in `texture`; the texture then
    /// keeps its previous contents.
    fn upload_video_frame(&mut self, texture: TextureId, frame: &VideoFrame) -> Result<()>;
    fn delete_texture(&mut self, texture: TextureId);

    fn apply_state(&mut self, state: RasterState);
    /// Clears the scissored region (or everything) to `color`, depth to far.
    fn clear(&mut self, color: [f32; 4]);
    /// Rect origin is bottom-left, as host viewports are given.
    fn set_viewport(&mut self, rect: Rect);
    fn set_scissor(&mut self, rect: Option<Rect>);
    /// Draws `mesh` with the program in use, sampling `texture`.
    fn draw(&mut self, mesh: MeshId, texture: TextureId);
}
