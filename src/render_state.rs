// render_state.rs - cached pipeline state and VR parameters

use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// Blend factors, identified by their GL enum values on the host side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    DstColor,
    OneMinusDstColor,
}

impl BlendFactor {
    pub fn from_gl(value: u32) -> Option<Self> {
        match value {
            0 => Some(BlendFactor::Zero),
            1 => Some(BlendFactor::One),
            0x0300 => Some(BlendFactor::SrcColor),
            0x0301 => Some(BlendFactor::OneMinusSrcColor),
            0x0302 => Some(BlendFactor::SrcAlpha),
            0x0303 => Some(BlendFactor::OneMinusSrcAlpha),
            0x0304 => Some(BlendFactor::DstAlpha),
            0x0305 => Some(BlendFactor::OneMinusDstAlpha),
            0x0306 => Some(BlendFactor::DstColor),
            0x0307 => Some(BlendFactor::OneMinusDstColor),
            _ => None,
        }
    }
}

/// Fixed-function state a draw is issued with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterState {
    pub cull_face: bool,
    pub depth_test: bool,
    /// `Some((src, dst))` when blending is on.
    pub blend: Option<(BlendFactor, BlendFactor)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderState {
    pub clear_color: [f32; 4],
    pub cull_face: bool,
    pub depth_test: bool,
    pub blend: bool,
    pub blend_src: BlendFactor,
    pub blend_dst: BlendFactor,
    /// Custom viewport; `None` covers the whole surface.
    #[serde(skip)]
    pub viewport: Option<Rect>,
    pub scissor: Rect,
    pub scissor_enabled: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            cull_face: false,
            depth_test: true,
            blend: false,
            blend_src: BlendFactor::SrcAlpha,
            blend_dst: BlendFactor::OneMinusSrcAlpha,
            viewport: None,
            scissor: Rect::default(),
            scissor_enabled: false,
        }
    }
}

impl RenderState {
    pub fn raster(&self) -> RasterState {
        RasterState {
            cull_face: self.cull_face,
            depth_test: self.depth_test,
            blend: self.blend.then_some((self.blend_src, self.blend_dst)),
        }
    }
}

pub const K1_RANGE: (f32, f32) = (0.1, 2.0);
pub const K2_RANGE: (f32, f32) = (-1.0, 1.0);
pub const SCALE_RANGE: (f32, f32) = (0.1, 2.0);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VrConfig {
    pub enabled: bool,
    pub ipd: f32,
    pub eye_offset: f32,
    pub barrel_distortion: bool,
    pub k1: f32,
    pub k2: f32,
    pub scale: f32,
}

impl Default for VrConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ipd: 0.064,
            eye_offset: 0.03,
            barrel_distortion: true,
            k1: 0.9,
            k2: 0.1,
            scale: 0.95,
        }
    }
}

fn clamp_logged(name: &str, value: f32, (lo, hi): (f32, f32)) -> f32 {
    if value.is_nan() {
        warn!("{name} is NaN, using {lo}");
        return lo;
    }
    let clamped = value.clamp(lo, hi);
    if clamped != value {
        warn!("{name}={value} out of range [{lo}, {hi}], clamped to {clamped}");
    }
    clamped
}

impl VrConfig {
    /// Stores distortion coefficients, clamping each into its range.
    pub fn set_distortion_params(&mut self, k1: f32, k2: f32, scale: f32) {
        self.k1 = clamp_logged("k1", k1, K1_RANGE);
        self.k2 = clamp_logged("k2", k2, K2_RANGE);
        self.scale = clamp_logged("scale", scale, SCALE_RANGE);
    }

    /// Uniform value for the stereo shader; neutral when distortion is off.
    pub fn distortion_uniform(&self) -> [f32; 4] {
        if self.barrel_distortion {
            [self.k1, self.k2, 0.0, 0.0]
        } else {
            [1.0, 0.0, 0.0, 0.0]
        }
    }
}

/// CPU mirror of the stereo fragment stage's UV warp. `None` means the sample
/// falls outside the texture and renders black.
pub fn barrel_distort(uv: [f32; 2], k1: f32, k2: f32) -> Option<[f32; 2]> {
    let (dx, dy) = (uv[0] - 0.5, uv[1] - 0.5);
    let r2 = dx * dx + dy * dy;
    let f = k1 + k2 * r2;
    let out = [0.5 + dx * f, 0.5 + dy * f];
    let inside = (0.0..=1.0).contains(&out[0]) && (0.0..=1.0).contains(&out[1]);
    inside.then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distortion_params_are_clamped() {
        let mut vr = VrConfig::default();
        vr.set_distortion_params(3.0, 5.0, 10.0);
        assert_eq!((vr.k1, vr.k2, vr.scale), (2.0, 1.0, 2.0));
        vr.set_distortion_params(0.0, 0.0, 0.0);
        assert_eq!((vr.k1, vr.k2, vr.scale), (0.1, 0.0, 0.1));
        vr.set_distortion_params(1.1, -0.3, 0.8);
        assert_eq!((vr.k1, vr.k2, vr.scale), (1.1, -0.3, 0.8));
    }

    #[test]
    fn distortion_uniform_is_neutral_when_disabled() {
        let mut vr = VrConfig::default();
        assert_eq!(vr.distortion_uniform(), [0.9, 0.1, 0.0, 0.0]);
        vr.barrel_distortion = false;
        assert_eq!(vr.distortion_uniform(), [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn neutral_warp_is_identity_and_edges_go_black() {
        assert_eq!(barrel_distort([0.25, 0.75], 1.0, 0.0), Some([0.25, 0.75]));
        assert_eq!(barrel_distort([0.5, 0.5], 2.0, 1.0), Some([0.5, 0.5]));
        // Corner pushed outwards past the texture edge.
        assert_eq!(barrel_distort([0.0, 0.0], 1.5, 0.5), None);
    }

    #[test]
    fn gl_blend_enums() {
        assert_eq!(BlendFactor::from_gl(0x0302), Some(BlendFactor::SrcAlpha));
        assert_eq!(BlendFactor::from_gl(0x0303), Some(BlendFactor::OneMinusSrcAlpha));
        assert_eq!(BlendFactor::from_gl(0x9999), None);
    }

    #[test]
    fn raster_state_reflects_blend_flag() {
        let mut rs = RenderState::default();
        assert_eq!(rs.raster().blend, None);
        rs.blend = true;
        assert_eq!(
            rs.raster().blend,
            Some((BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha))
        );
    }
}
