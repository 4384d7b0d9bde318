// integrator.rs - gyroscope quaternion integration

use glam::{Mat4, Quat, Vec3};

/// Step used when the sample interval is unusable.
pub const DEFAULT_DT: f32 = 0.01;
/// Intervals above this are treated as a stall or timestamp reset.
pub const MAX_DT: f32 = 0.1;

/// Seconds between two sample timestamps (ns), with unusable intervals replaced
/// by [`DEFAULT_DT`].
pub fn sample_interval(last_ns: i64, now_ns: i64) -> f32 {
    if last_ns <= 0 {
        return DEFAULT_DT;
    }
    sanitize_dt(now_ns.saturating_sub(last_ns) as f32 / 1.0e9)
}

pub fn sanitize_dt(dt: f32) -> f32 {
    if !dt.is_finite() || dt <= 0.0 || dt > MAX_DT {
        DEFAULT_DT
    } else {
        dt
    }
}

/// Advances `q` by one gyroscope sample.
///
/// `gyro_deg` is angular velocity in degrees per second. The derivative is
/// `q * (0, w/2)`; the result is renormalized. A degenerate (zero or non-finite)
/// result leaves `q` untouched.
pub fn integrate(q: Quat, gyro_deg: Vec3, dt: f32) -> Quat {
    let dt = sanitize_dt(dt);
    let half = gyro_deg * (std::f32::consts::PI / 180.0) * 0.5;
    let dq = q * Quat::from_xyzw(half.x, half.y, half.z, 0.0);
    let next = q + dq * dt;

    let len = next.length();
    if len > f32::EPSILON && len.is_finite() {
        next * (1.0 / len)
    } else {
        q
    }
}

/// Rotation matrix of an orientation quaternion (column-major).
pub fn rotation_matrix(q: Quat) -> Mat4 {
    Mat4::from_quat(q)
}

/// Head-view matrix for an orientation: the inverse rotation.
pub fn head_view_matrix(q: Quat) -> Mat4 {
    Mat4::from_quat(q).transpose()
}
