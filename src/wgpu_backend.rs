// wgpu_backend.rs - GraphicsDriver/RenderDevice on top of wgpu
//
// Device calls are recorded between make_current and swap_buffers and encoded
// into a single render pass at swap time:
// - the first clear of a frame becomes the color load op, later clears fold away
// - every draw snapshots its program's uniform block at a dynamic offset
// - pipelines are built per (program, raster state, target format) on demand

use crate::context::{GraphicsDriver, SurfaceAttribute, SurfaceKind, OFFSCREEN_SIZE};
use crate::device::{
    MeshId, ProgramId, RenderDevice, TextureId, UniformLocation, U_DISTORTION_PARAMS,
    U_MVP_MATRIX, U_ST_MATRIX,
};
use crate::error::{PlayerError, Result};
use crate::mesh::MeshData;
use crate::render_state::{BlendFactor, RasterState, Rect};
use crate::video::VideoFrame;
use crate::window::{RawHandles, WindowRef};
use glam::Mat4;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::num::NonZeroU64;
use wgpu::util::DeviceExt;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const VIDEO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Maps GL clip depth [-1, 1] to wgpu's [0, 1].
#[rustfmt::skip]
const OPENGL_TO_WGPU: Mat4 = Mat4::from_cols_array(&[
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
]);

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 3],
    uv: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Uniforms {
    mvp: [f32; 16],
    st: [f32; 16],
    distortion: [f32; 4],
}

impl Default for Uniforms {
    fn default() -> Self {
        Self {
            mvp: Mat4::IDENTITY.to_cols_array(),
            st: Mat4::IDENTITY.to_cols_array(),
            distortion: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

const UNIFORMS_SIZE: u64 = std::mem::size_of::<Uniforms>() as u64;

const LOC_MVP: UniformLocation = UniformLocation(0);
const LOC_ST: UniformLocation = UniformLocation(1);
const LOC_DISTORTION: UniformLocation = UniformLocation(2);

struct Program {
    module: wgpu::ShaderModule,
    uniforms: Uniforms,
}

struct GpuMesh {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

struct VideoTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: (u32, u32),
}

#[derive(Debug, Clone, Copy)]
struct DrawOp {
    program: ProgramId,
    state: RasterState,
    mesh: MeshId,
    texture: TextureId,
    uniform_offset: u32,
    viewport: Option<Rect>,
    scissor: Option<Rect>,
}

/// Device calls recorded since the last make_current.
#[derive(Default)]
struct FrameOps {
    clear: Option<[f32; 4]>,
    draws: Vec<DrawOp>,
    uniforms: Vec<u8>,
}

type PipelineKey = (ProgramId, RasterState, wgpu::TextureFormat);

/// Adapter, device and every object created on them.
struct Gpu {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    uniform_alignment: u64,
    programs: HashMap<ProgramId, Program>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    meshes: HashMap<MeshId, GpuMesh>,
    textures: HashMap<TextureId, VideoTexture>,
}

struct WindowTarget {
    window: WindowRef,
    surface: wgpu::Surface,
    config: wgpu::SurfaceConfiguration,
    depth: wgpu::TextureView,
}

struct OffscreenTarget {
    _color: wgpu::Texture,
    _depth: wgpu::TextureView,
}

pub struct WgpuBackend {
    instance: wgpu::Instance,
    gpu: Option<Gpu>,
    window: Option<WindowTarget>,
    offscreen: Option<OffscreenTarget>,
    current: Option<SurfaceKind>,
    next_id: u32,

    program: Option<ProgramId>,
    state: RasterState,
    viewport: Option<Rect>,
    scissor: Option<Rect>,
    frame: FrameOps,
}

impl Default for WgpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl WgpuBackend {
    pub fn new() -> Self {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        Self {
            instance,
            gpu: None,
            window: None,
            offscreen: None,
            current: None,
            next_id: 1,
            program: None,
            state: RasterState { cull_face: false, depth_test: true, blend: None },
            viewport: None,
            scissor: None,
            frame: FrameOps::default(),
        }
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn reset_frame(&mut self) {
        self.frame = FrameOps::default();
        self.viewport = None;
        self.scissor = None;
    }
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_uniform_buffer(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("uniform_buffer"),
        size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
    }
}

fn blend_state(state: RasterState) -> wgpu::BlendState {
    match state.blend {
        Some((src, dst)) => {
            let component = wgpu::BlendComponent {
                src_factor: blend_factor(src),
                dst_factor: blend_factor(dst),
                operation: wgpu::BlendOperation::Add,
            };
            wgpu::BlendState { color: component, alpha: component }
        }
        None => wgpu::BlendState::REPLACE,
    }
}

/// Converts a bottom-left-origin rect into a top-left one clipped to the
/// target. `None` when nothing of it is visible.
fn to_target_rect(rect: Rect, (tw, th): (u32, u32)) -> Option<(u32, u32, u32, u32)> {
    let x0 = i64::from(rect.x).clamp(0, i64::from(tw));
    let x1 = (i64::from(rect.x) + i64::from(rect.width)).clamp(0, i64::from(tw));
    let bottom = i64::from(rect.y).clamp(0, i64::from(th));
    let top = (i64::from(rect.y) + i64::from(rect.height)).clamp(0, i64::from(th));
    if x1 <= x0 || top <= bottom {
        return None;
    }
    let y = i64::from(th) - top;
    Some((x0 as u32, y as u32, (x1 - x0) as u32, (top - bottom) as u32))
}

impl Gpu {
    fn create(instance: &wgpu::Instance) -> Result<Self> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| PlayerError::ContextInit("no suitable GPU adapter".into()))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                features: wgpu::Features::empty(),
                limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                label: Some("vr360_device"),
            },
            None,
        ))
        .map_err(|e| PlayerError::ContextInit(e.to_string()))?;
        device.on_uncaptured_error(Box::new(|e| error!("wgpu error: {e}")));

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(UNIFORMS_SIZE),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
            label: Some("video_bind_group_layout"),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("panorama_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        // Panoramas wrap horizontally.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let uniform_alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);
        let uniform_buffer = create_uniform_buffer(&device, uniform_alignment * 4);

        info!("wgpu adapter: {:?}", adapter.get_info().name);
        Ok(Self {
            adapter,
            device,
            queue,
            bind_group_layout,
            pipeline_layout,
            sampler,
            uniform_buffer,
            uniform_alignment,
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            meshes: HashMap::new(),
            textures: HashMap::new(),
        })
    }

    fn build_pipeline(
        &self,
        module: &wgpu::ShaderModule,
        state: RasterState,
        format: wgpu::TextureFormat,
    ) -> wgpu::RenderPipeline {
        self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("panorama_pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2],
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(blend_state(state)),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: state.cull_face.then_some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: state.depth_test,
                depth_compare: if state.depth_test {
                    wgpu::CompareFunction::LessEqual
                } else {
                    wgpu::CompareFunction::Always
                },
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        })
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }
        let Some(program) = self.programs.get(&key.0) else {
            return;
        };
        let pipeline = self.build_pipeline(&program.module, key.1, key.2);
        self.pipelines.insert(key, pipeline);
    }

    fn surface_config(
        &self,
        surface: &wgpu::Surface,
        width: u32,
        height: u32,
    ) -> Result<wgpu::SurfaceConfiguration> {
        let caps = surface.get_capabilities(&self.adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| PlayerError::ContextInit("surface not supported by adapter".into()))?;
        Ok(wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        })
    }

    fn write_video_frame(&mut self, id: TextureId, frame: &VideoFrame) -> Result<()> {
        let max = self.device.limits().max_texture_dimension_2d;
        let scaled;
        let (width, height, pixels) = if frame.width > max || frame.height > max {
            let scale = max as f32 / frame.width.max(frame.height) as f32;
            let (w, h) = (
                ((frame.width as f32 * scale) as u32).max(1),
                ((frame.height as f32 * scale) as u32).max(1),
            );
            let img = image::RgbaImage::from_raw(frame.width, frame.height, frame.pixels.clone())
                .ok_or_else(|| {
                    PlayerError::InvalidArgument(format!(
                        "video frame buffer does not match {}x{}",
                        frame.width, frame.height
                    ))
                })?;
            warn!(
                "video frame {}x{} exceeds GPU limit {max}, scaled to {w}x{h}",
                frame.width, frame.height
            );
            scaled = image::imageops::resize(&img, w, h, image::imageops::FilterType::Triangle);
            (w, h, scaled.as_raw().as_slice())
        } else {
            (frame.width, frame.height, frame.pixels.as_slice())
        };

        if pixels.len() != 4 * width as usize * height as usize {
            return Err(PlayerError::InvalidArgument(format!(
                "video frame buffer does not match {width}x{height}"
            )));
        }
        let slot = self
            .textures
            .get_mut(&id)
            .ok_or_else(|| PlayerError::InvalidArgument(format!("unknown video texture {id:?}")))?;
        if slot.size != (width, height) {
            *slot = create_video_texture(&self.device, width, height);
        }
        let size = wgpu::Extent3d { width, height, depth_or_array_layers: 1 };
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &slot.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );
        Ok(())
    }

    /// Encodes one frame's recorded work into `color`/`depth` and submits it.
    fn encode(
        &mut self,
        frame: &FrameOps,
        color: &wgpu::TextureView,
        depth: &wgpu::TextureView,
        target: (u32, u32),
        format: wgpu::TextureFormat,
    ) {
        let needed = (frame.uniforms.len() as u64).max(self.uniform_alignment);
        if self.uniform_buffer.size() < needed {
            self.uniform_buffer = create_uniform_buffer(&self.device, needed.next_power_of_two());
        }
        if !frame.uniforms.is_empty() {
            self.queue.write_buffer(&self.uniform_buffer, 0, &frame.uniforms);
        }

        for draw in &frame.draws {
            self.ensure_pipeline((draw.program, draw.state, format));
        }

        let mut bind_groups: HashMap<TextureId, wgpu::BindGroup> = HashMap::new();
        for draw in &frame.draws {
            if bind_groups.contains_key(&draw.texture) {
                continue;
            }
            let Some(texture) = self.textures.get(&draw.texture) else {
                continue;
            };
            let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: &self.uniform_buffer,
                            offset: 0,
                            size: NonZeroU64::new(UNIFORMS_SIZE),
                        }),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&texture.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
                label: Some("video_bind_group"),
            });
            bind_groups.insert(draw.texture, group);
        }

        let load = match frame.clear {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: f64::from(r),
                g: f64::from(g),
                b: f64::from(b),
                a: f64::from(a),
            }),
            None => wgpu::LoadOp::Load,
        };

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("panorama_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color,
                    resolve_target: None,
                    ops: wgpu::Operations { load, store: true },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth,
                    depth_ops: Some(wgpu::Operations { load: wgpu::LoadOp::Clear(1.0), store: true }),
                    stencil_ops: None,
                }),
            });

            let full = Rect::new(0, 0, target.0, target.1);
            for draw in &frame.draws {
                let (Some(pipeline), Some(group), Some(mesh)) = (
                    self.pipelines.get(&(draw.program, draw.state, format)),
                    bind_groups.get(&draw.texture),
                    self.meshes.get(&draw.mesh),
                ) else {
                    continue;
                };
                let Some((vx, vy, vw, vh)) = to_target_rect(draw.viewport.unwrap_or(full), target)
                else {
                    continue;
                };
                let Some((sx, sy, sw, sh)) = to_target_rect(draw.scissor.unwrap_or(full), target)
                else {
                    continue;
                };

                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, group, &[draw.uniform_offset]);
                pass.set_viewport(vx as f32, vy as f32, vw as f32, vh as f32, 0.0, 1.0);
                pass.set_scissor_rect(sx, sy, sw, sh);
                pass.set_vertex_buffer(0, mesh.vertices.slice(..));
                pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

fn create_video_texture(device: &wgpu::Device, width: u32, height: u32) -> VideoTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: VIDEO_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        label: Some("video_texture"),
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    VideoTexture { texture, view, size: (width, height) }
}

impl GraphicsDriver for WgpuBackend {
    fn create_context(&mut self) -> Result<()> {
        if self.gpu.is_none() {
            self.gpu = Some(Gpu::create(&self.instance)?);
        }
        Ok(())
    }

    fn destroy_context(&mut self) {
        self.reset_frame();
        self.program = None;
        self.current = None;
        if self.gpu.take().is_some() {
            debug!("wgpu device released");
        }
    }

    fn terminate_display(&mut self) {
        self.window = None;
        self.offscreen = None;
        debug!("wgpu display terminated");
    }

    fn create_offscreen_surface(&mut self, width: u32, height: u32) -> Result<()> {
        let gpu = self
            .gpu
            .as_ref()
            .ok_or_else(|| PlayerError::ContextInit("no device".into()))?;
        let color = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen_target"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth = create_depth_view(&gpu.device, width, height);
        self.offscreen = Some(OffscreenTarget { _color: color, _depth: depth });
        Ok(())
    }

    fn destroy_offscreen_surface(&mut self) {
        self.offscreen = None;
    }

    fn create_window_surface(&mut self, window: &WindowRef) -> Result<()> {
        let gpu = self
            .gpu
            .as_ref()
            .ok_or_else(|| PlayerError::ContextInit("no device".into()))?;
        let handles = RawHandles::of(&**window);
        // Safety: the WindowRef stored next to the surface keeps the window alive.
        let surface = unsafe { self.instance.create_surface(&handles) }
            .map_err(|e| PlayerError::ContextInit(e.to_string()))?;
        let (width, height) = window.inner_size();
        let config = gpu.surface_config(&surface, width, height)?;
        surface.configure(&gpu.device, &config);
        let depth = create_depth_view(&gpu.device, config.width, config.height);
        info!("window surface {}x{} {:?}", config.width, config.height, config.format);
        self.window = Some(WindowTarget { window: window.clone(), surface, config, depth });
        Ok(())
    }

    fn destroy_window_surface(&mut self) {
        if self.current == Some(SurfaceKind::Window) {
            self.current = None;
        }
        self.window = None;
    }

    fn make_current(&mut self, surface: Option<SurfaceKind>) -> Result<()> {
        match surface {
            Some(SurfaceKind::Window) if self.window.is_none() => {
                return Err(PlayerError::ContextInit("no window surface".into()));
            }
            Some(SurfaceKind::Offscreen) if self.offscreen.is_none() => {
                return Err(PlayerError::ContextInit("no offscreen surface".into()));
            }
            Some(_) => self.reset_frame(),
            None => {}
        }
        self.current = surface;
        Ok(())
    }

    fn swap_buffers(&mut self) -> Result<()> {
        let (Some(gpu), Some(target)) = (self.gpu.as_mut(), self.window.as_mut()) else {
            return Ok(());
        };

        let (width, height) = target.window.inner_size();
        let resized = (width, height) != (target.config.width, target.config.height);
        if resized && width > 0 && height > 0 {
            target.config.width = width;
            target.config.height = height;
            target.surface.configure(&gpu.device, &target.config);
            target.depth = create_depth_view(&gpu.device, width, height);
            debug!("surface reconfigured to {width}x{height}");
        }

        let output = match target.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                target.surface.configure(&gpu.device, &target.config);
                debug!("surface lost or outdated, reconfigured");
                return Ok(());
            }
            Err(e) => return Err(PlayerError::Present(e.to_string())),
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let size = (target.config.width, target.config.height);
        gpu.encode(&self.frame, &view, &target.depth, size, target.config.format);
        output.present();
        Ok(())
    }

    fn query_surface(&self, surface: SurfaceKind, attribute: SurfaceAttribute) -> Option<i32> {
        let (w, h) = match surface {
            SurfaceKind::Window => self.window.as_ref()?.window.inner_size(),
            SurfaceKind::Offscreen => {
                self.offscreen.as_ref()?;
                (OFFSCREEN_SIZE, OFFSCREEN_SIZE)
            }
        };
        Some(match attribute {
            SurfaceAttribute::Width => w as i32,
            SurfaceAttribute::Height => h as i32,
        })
    }
}

impl RenderDevice for WgpuBackend {
    fn create_program(&mut self, label: &str, source: &str) -> Result<ProgramId> {
        let id = ProgramId(self.next());
        let gpu = self
            .gpu
            .as_mut()
            .ok_or_else(|| PlayerError::ContextInit("no device".into()))?;

        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        if let Some(e) = pollster::block_on(gpu.device.pop_error_scope()) {
            return Err(PlayerError::ShaderCompile(format!("{label}: {e}")));
        }

        // Linking: build the default pipeline now so entry point and layout
        // mismatches surface here rather than mid-frame.
        let state = RasterState { cull_face: false, depth_test: true, blend: None };
        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = gpu.build_pipeline(&module, state, OFFSCREEN_FORMAT);
        if let Some(e) = pollster::block_on(gpu.device.pop_error_scope()) {
            return Err(PlayerError::ShaderLink(format!("{label}: {e}")));
        }

        gpu.pipelines.insert((id, state, OFFSCREEN_FORMAT), pipeline);
        gpu.programs.insert(id, Program { module, uniforms: Uniforms::default() });
        debug!("program {label} -> {id:?}");
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.programs.remove(&program);
            gpu.pipelines.retain(|(p, _, _), _| *p != program);
        }
        if self.program == Some(program) {
            self.program = None;
        }
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.program = program;
    }

    fn current_program(&self) -> Option<ProgramId> {
        self.program
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.gpu.as_ref()?.programs.get(&program)?;
        match name {
            U_MVP_MATRIX => Some(LOC_MVP),
            U_ST_MATRIX => Some(LOC_ST),
            U_DISTORTION_PARAMS => Some(LOC_DISTORTION),
            _ => None,
        }
    }

    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &[f32; 16]) {
        let (Some(gpu), Some(id)) = (self.gpu.as_mut(), self.program) else {
            return;
        };
        let Some(program) = gpu.programs.get_mut(&id) else {
            return;
        };
        match location {
            LOC_MVP => program.uniforms.mvp = *value,
            LOC_ST => program.uniforms.st = *value,
            other => warn!("uniform {other:?} is not a mat4"),
        }
    }

    fn set_uniform_vec4(&mut self, location: UniformLocation, value: [f32; 4]) {
        let (Some(gpu), Some(id)) = (self.gpu.as_mut(), self.program) else {
            return;
        };
        let Some(program) = gpu.programs.get_mut(&id) else {
            return;
        };
        match location {
            LOC_DISTORTION => program.uniforms.distortion = value,
            other => warn!("uniform {other:?} is not a vec4"),
        }
    }

    fn create_mesh(&mut self, data: &MeshData) -> MeshId {
        let id = MeshId(self.next());
        let Some(gpu) = self.gpu.as_mut() else {
            return id;
        };
        let vertices: Vec<Vertex> = data
            .positions
            .iter()
            .zip(&data.uvs)
            .map(|(&position, &uv)| Vertex { position, uv })
            .collect();
        let vertex_buffer = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh_vertices"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh_indices"),
            contents: bytemuck::cast_slice(&data.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        gpu.meshes.insert(
            id,
            GpuMesh {
                vertices: vertex_buffer,
                indices: index_buffer,
                index_count: data.indices.len() as u32,
            },
        );
        id
    }

    fn delete_mesh(&mut self, mesh: MeshId) {
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.meshes.remove(&mesh);
        }
    }

    fn create_video_texture(&mut self) -> TextureId {
        let id = TextureId(self.next());
        let Some(gpu) = self.gpu.as_mut() else {
            return id;
        };
        let slot = create_video_texture(&gpu.device, 1, 1);
        gpu.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &slot.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &[0, 0, 0, 255],
            wgpu::ImageDataLayout { offset: 0, bytes_per_row: Some(4), rows_per_image: Some(1) },
            wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
        );
        gpu.textures.insert(id, slot);
        id
    }

    fn upload_video_frame(&mut self, texture: TextureId, frame: &VideoFrame) -> Result<()> {
        self.gpu
            .as_mut()
            .ok_or_else(|| PlayerError::ContextInit("no device".into()))?
            .write_video_frame(texture, frame)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.textures.remove(&texture);
        }
    }

    fn apply_state(&mut self, state: RasterState) {
        self.state = state;
    }

    fn clear(&mut self, color: [f32; 4]) {
        if self.frame.draws.is_empty() {
            self.frame.clear = Some(color);
        }
    }

    fn set_viewport(&mut self, rect: Rect) {
        self.viewport = Some(rect);
    }

    fn set_scissor(&mut self, rect: Option<Rect>) {
        self.scissor = rect;
    }

    fn draw(&mut self, mesh: MeshId, texture: TextureId) {
        let (Some(gpu), Some(program)) = (self.gpu.as_ref(), self.program) else {
            return;
        };
        let Some(uniforms) = gpu.programs.get(&program).map(|p| p.uniforms) else {
            return;
        };
        let corrected = Uniforms {
            mvp: (OPENGL_TO_WGPU * Mat4::from_cols_array(&uniforms.mvp)).to_cols_array(),
            ..uniforms
        };

        let align = gpu.uniform_alignment as usize;
        let offset = self.frame.uniforms.len().div_ceil(align) * align;
        self.frame.uniforms.resize(offset, 0);
        self.frame.uniforms.extend_from_slice(bytemuck::bytes_of(&corrected));
        self.frame.draws.push(DrawOp {
            program,
            state: self.state,
            mesh,
            texture,
            uniform_offset: offset as u32,
            viewport: self.viewport,
            scissor: self.scissor,
        });
    }
}
