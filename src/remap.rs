// remap.rs - sensor-to-display axis remapping

use glam::{Mat4, Vec4};

/// Signed source axis for a remapped basis vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X = 1,
    Y = 2,
    Z = 3,
    MinusX = 4,
    MinusY = 5,
    MinusZ = 6,
}

impl Axis {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Axis::X),
            2 => Some(Axis::Y),
            3 => Some(Axis::Z),
            4 => Some(Axis::MinusX),
            5 => Some(Axis::MinusY),
            6 => Some(Axis::MinusZ),
            _ => None,
        }
    }

    fn pick(self, m: &Mat4) -> Vec4 {
        match self {
            Axis::X => m.x_axis,
            Axis::Y => m.y_axis,
            Axis::Z => m.z_axis,
            Axis::MinusX => -m.x_axis,
            Axis::MinusY => -m.y_axis,
            Axis::MinusZ => -m.z_axis,
        }
    }
}

/// Physical rotation of the display relative to the sensor frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayRotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl DisplayRotation {
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(DisplayRotation::Deg0),
            90 => Some(DisplayRotation::Deg90),
            180 => Some(DisplayRotation::Deg180),
            270 => Some(DisplayRotation::Deg270),
            _ => None,
        }
    }

    /// Axis pair for the remap, `None` for the unrotated display.
    pub fn axes(self) -> Option<(Axis, Axis)> {
        match self {
            DisplayRotation::Deg0 => None,
            DisplayRotation::Deg90 => Some((Axis::Y, Axis::MinusX)),
            DisplayRotation::Deg180 => Some((Axis::MinusX, Axis::MinusY)),
            DisplayRotation::Deg270 => Some((Axis::MinusY, Axis::X)),
        }
    }
}

/// Rebuilds the basis of `m` with `x` and `y` as the new first two basis vectors
/// and their cross product as the third. The fourth components and translation
/// are carried over.
pub fn remap_coordinate_system(m: &Mat4, x: Axis, y: Axis) -> Mat4 {
    let new_x = x.pick(m);
    let new_y = y.pick(m);
    let new_z = new_x.truncate().cross(new_y.truncate());

    let mut out = *m;
    out.x_axis = new_x.truncate().extend(m.x_axis.w);
    out.y_axis = new_y.truncate().extend(m.y_axis.w);
    out.z_axis = new_z.extend(m.z_axis.w);
    out
}

/// Code-based remap as exposed to hosts. Unknown codes return `None` and the
/// caller keeps the original matrix.
pub fn remap_with_codes(m: &Mat4, x_code: i32, y_code: i32) -> Option<Mat4> {
    let x = Axis::from_code(x_code)?;
    let y = Axis::from_code(y_code)?;
    Some(remap_coordinate_system(m, x, y))
}

pub fn apply_display_rotation(rotation: DisplayRotation, m: &Mat4) -> Mat4 {
    match rotation.axes() {
        Some((x, y)) => remap_coordinate_system(m, x, y),
        None => *m,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn sample_rotation() -> Mat4 {
        Mat4::from_quat(Quat::from_euler(glam::EulerRot::YXZ, 0.6, -0.3, 0.2))
    }

    #[test]
    fn identity_pair_is_noop() {
        let m = sample_rotation();
        let out = remap_coordinate_system(&m, Axis::X, Axis::Y);
        assert!(out.abs_diff_eq(m, 1e-6));
    }

    #[test]
    fn half_turn_twice_restores() {
        let m = sample_rotation();
        let once = apply_display_rotation(DisplayRotation::Deg180, &m);
        assert!(!once.abs_diff_eq(m, 1e-3));
        let twice = apply_display_rotation(DisplayRotation::Deg180, &once);
        assert!(twice.abs_diff_eq(m, 1e-6));
    }

    #[test]
    fn quarter_turns_stay_orthonormal() {
        let m = sample_rotation();
        for rot in [DisplayRotation::Deg90, DisplayRotation::Deg270] {
            let out = apply_display_rotation(rot, &m);
            let (x, y, z) = (out.x_axis.truncate(), out.y_axis.truncate(), out.z_axis.truncate());
            assert!((x.length() - 1.0).abs() < 1e-5);
            assert!(x.dot(y).abs() < 1e-5);
            assert!(x.cross(y).abs_diff_eq(z, 1e-5));
        }
    }

    #[test]
    fn zero_rotation_is_noop() {
        let m = sample_rotation();
        assert_eq!(apply_display_rotation(DisplayRotation::Deg0, &m), m);
    }

    #[test]
    fn unknown_codes_report_noop() {
        let m = sample_rotation();
        assert!(remap_with_codes(&m, 7, 2).is_none());
        assert!(remap_with_codes(&m, 1, 0).is_none());
        assert!(remap_with_codes(&m, 1, 2).is_some());
    }

    #[test]
    fn rotation_from_degrees() {
        assert_eq!(DisplayRotation::from_degrees(-90), Some(DisplayRotation::Deg270));
        assert_eq!(DisplayRotation::from_degrees(450), Some(DisplayRotation::Deg90));
        assert_eq!(DisplayRotation::from_degrees(45), None);
    }
}
