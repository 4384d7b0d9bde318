// panorama.rs - projection geometry modes and drag-driven view rotation

use glam::Mat4;
use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProjectionMode {
    #[default]
    Sphere,       // 201 full equirectangular sphere
    Dome180,      // 202 lower 180 degree dome
    Dome230,      // 203 lower 230 degree dome
    Dome180Upper, // 204
    Dome230Upper, // 205
    Cube,         // 214
}

impl ProjectionMode {
    pub fn code(self) -> i32 {
        match self {
            ProjectionMode::Sphere => 201,
            ProjectionMode::Dome180 => 202,
            ProjectionMode::Dome230 => 203,
            ProjectionMode::Dome180Upper => 204,
            ProjectionMode::Dome230Upper => 205,
            ProjectionMode::Cube => 214,
        }
    }

    /// Host mode code; unknown codes fall back to the sphere.
    pub fn from_code(code: i32) -> Self {
        match code {
            201 => ProjectionMode::Sphere,
            202 => ProjectionMode::Dome180,
            203 => ProjectionMode::Dome230,
            204 => ProjectionMode::Dome180Upper,
            205 => ProjectionMode::Dome230Upper,
            214 => ProjectionMode::Cube,
            other => {
                warn!("unknown projection mode {other}, using sphere");
                ProjectionMode::Sphere
            }
        }
    }
}

/// Accumulated drag angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TouchRotation {
    pub delta_x: f32,
    pub delta_y: f32,
}

impl TouchRotation {
    pub fn accumulate(&mut self, dx: f32, dy: f32) {
        self.delta_x += dx;
        self.delta_y += dy;
    }

    /// Horizontal drag turns about Y, vertical drag about X; Y is applied last.
    pub fn view_matrix(&self) -> Mat4 {
        let rx = Mat4::from_rotation_x((-self.delta_y).to_radians());
        let ry = Mat4::from_rotation_y((-self.delta_x).to_radians());
        ry * rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_deltas_never_move_the_view() {
        let mut touch = TouchRotation::default();
        touch.accumulate(12.5, -4.0);
        let before = touch.view_matrix();
        for _ in 0..100 {
            touch.accumulate(0.0, 0.0);
        }
        assert_eq!(touch.view_matrix(), before);
    }

    #[test]
    fn horizontal_drag_is_yaw() {
        let mut touch = TouchRotation::default();
        touch.accumulate(90.0, 0.0);
        let expected = Mat4::from_rotation_y(-std::f32::consts::FRAC_PI_2);
        assert!(touch.view_matrix().abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn mode_codes_round_trip_and_fall_back() {
        for mode in [
            ProjectionMode::Sphere,
            ProjectionMode::Dome180,
            ProjectionMode::Dome230,
            ProjectionMode::Dome180Upper,
            ProjectionMode::Dome230Upper,
            ProjectionMode::Cube,
        ] {
            assert_eq!(ProjectionMode::from_code(mode.code()), mode);
        }
        assert_eq!(ProjectionMode::from_code(999), ProjectionMode::Sphere);
    }
}
