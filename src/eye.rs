// eye.rs - projection and per-eye matrices
//
// Matrices follow the GL clip convention (depth in [-1, 1]); the wgpu backend
// remaps depth when uploading.

use crate::render_state::Rect;
use glam::{Mat4, Vec4};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    /// Sign of the lateral offset; left is negative.
    pub fn sign(self) -> f32 {
        match self {
            Eye::Left => -1.0,
            Eye::Right => 1.0,
        }
    }
}

/// Symmetric perspective projection, `fov_y_deg` in degrees.
pub fn perspective(fov_y_deg: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    Mat4::perspective_rh_gl(fov_y_deg.to_radians(), aspect, near, far)
}

/// Off-axis projection over the given near-plane rectangle.
pub fn frustum(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    let rl = right - left;
    let tb = top - bottom;
    let fnr = far - near;
    Mat4::from_cols(
        Vec4::new(2.0 * near / rl, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 2.0 * near / tb, 0.0, 0.0),
        Vec4::new((right + left) / rl, (top + bottom) / tb, -(far + near) / fnr, -1.0),
        Vec4::new(0.0, 0.0, -2.0 * far * near / fnr, 0.0),
    )
}

/// Centered frustum for the mono view: the near rectangle spans `aspect * scale`
/// by `scale`.
pub fn mono_frustum(aspect: f32, scale: f32, near: f32, far: f32) -> Mat4 {
    let half_w = aspect * 0.5 * scale;
    let half_h = 0.5 * scale;
    frustum(-half_w, half_w, -half_h, half_h, near, far)
}

/// Aspect of one eye's half of the target. Odd widths keep the half pixel.
pub fn eye_aspect(width: u32, height: u32) -> f32 {
    if width == 0 || height == 0 {
        return 1.0;
    }
    (width as f32 / 2.0) / height as f32
}

/// Half-width viewport for an eye. The right eye absorbs the odd pixel.
pub fn eye_viewport(eye: Eye, width: u32, height: u32) -> Rect {
    let half = width / 2;
    match eye {
        Eye::Left => Rect::new(0, 0, half, height),
        Eye::Right => Rect::new(half as i32, 0, width - half, height),
    }
}

/// View matrix for one eye: `base_view` shifted laterally by half the IPD.
pub fn eye_view(eye: Eye, base_view: &Mat4, ipd: f32) -> Mat4 {
    let mut view = *base_view;
    view.w_axis.x += eye.sign() * ipd * 0.5;
    view
}

/// Projection x eye view x model (identity).
pub fn eye_mvp(eye: Eye, projection: &Mat4, base_view: &Mat4, ipd: f32) -> Mat4 {
    *projection * eye_view(eye, base_view, ipd) * Mat4::IDENTITY
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn eye_offsets_are_symmetric() {
        let d = 0.064;
        let base = Mat4::from_rotation_y(0.5);
        let left = eye_view(Eye::Left, &base, d);
        let right = eye_view(Eye::Right, &base, d);
        assert!(left.w_axis.x < 0.0 && right.w_axis.x > 0.0);
        assert!((right.w_axis.x - left.w_axis.x - d).abs() < 1e-7);

        // With an identity projection the MVP carries the same offset.
        let l = eye_mvp(Eye::Left, &Mat4::IDENTITY, &base, d);
        let r = eye_mvp(Eye::Right, &Mat4::IDENTITY, &base, d);
        assert!((r.w_axis.x - l.w_axis.x - d).abs() < 1e-7);
    }

    #[test]
    fn viewports_split_the_surface() {
        for (w, h) in [(1920u32, 1080u32), (1921, 1080), (3, 2)] {
            let l = eye_viewport(Eye::Left, w, h);
            let r = eye_viewport(Eye::Right, w, h);
            assert_eq!(l.x, 0);
            assert_eq!(r.x, (w / 2) as i32);
            assert_eq!(l.width + r.width, w);
            assert_eq!(l.height, h);
        }
    }

    #[test]
    fn frustum_matches_perspective_when_symmetric() {
        let near = 0.5;
        let fov = 60.0f32;
        let top = near * (fov.to_radians() * 0.5).tan();
        let aspect = 16.0 / 9.0;
        let f = frustum(-top * aspect, top * aspect, -top, top, near, 100.0);
        let p = perspective(fov, aspect, near, 100.0);
        assert!(f.abs_diff_eq(p, 1e-4));
    }

    #[test]
    fn sphere_surface_lands_inside_clip_volume() {
        let proj = mono_frustum(1920.0 / 1080.0, 2.5, 0.7, 500.0);
        let clip = proj * Vec3::new(0.0, 0.0, -18.0).extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.z > -1.0 && ndc.z < 1.0);
        assert!(ndc.x.abs() < 1e-6 && ndc.y.abs() < 1e-6);
    }

    #[test]
    fn eye_aspect_uses_half_width() {
        assert!((eye_aspect(1920, 1080) - 960.0 / 1080.0).abs() < 1e-6);
        assert!((eye_aspect(1921, 1080) - 960.5 / 1080.0).abs() < 1e-6);
        assert_eq!(eye_aspect(1920, 0), 1.0);
        assert_eq!(eye_aspect(0, 1080), 1.0);
    }
}
