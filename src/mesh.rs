// Panorama mesh generators: sphere, dome and cube seen from the inside

use crate::panorama::ProjectionMode;
use std::f32::consts::{FRAC_PI_2, PI};

pub const SPHERE_RADIUS: f32 = 18.0;
pub const SPHERE_RINGS: usize = 75;
pub const SPHERE_SECTORS: usize = 150;
pub const CUBE_SIZE: f32 = 18.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }
}

/// Geometry for a projection mode. Pure; called whenever the mode changes.
pub fn build(mode: ProjectionMode) -> MeshData {
    match mode {
        ProjectionMode::Sphere => build_sphere(SPHERE_RADIUS, SPHERE_RINGS, SPHERE_SECTORS),
        ProjectionMode::Dome180 => build_dome(SPHERE_RADIUS, SPHERE_SECTORS, 180.0, false),
        ProjectionMode::Dome230 => build_dome(SPHERE_RADIUS, SPHERE_SECTORS, 230.0, false),
        ProjectionMode::Dome180Upper => build_dome(SPHERE_RADIUS, SPHERE_SECTORS, 180.0, true),
        ProjectionMode::Dome230Upper => build_dome(SPHERE_RADIUS, SPHERE_SECTORS, 230.0, true),
        ProjectionMode::Cube => build_cube(CUBE_SIZE),
    }
}

fn grid_indices(rows: usize, cols: usize, indices: &mut Vec<u32>) {
    let stride = cols + 1;
    for r in 0..rows {
        for s in 0..cols {
            let a = (r * stride + s) as u32;
            let b = a + stride as u32;

            indices.extend_from_slice(&[
                a, b, a + 1,
                a + 1, b, b + 1,
            ]);
        }
    }
}

pub fn build_sphere(radius: f32, rings: usize, sectors: usize) -> MeshData {
    let mut positions = Vec::with_capacity((rings + 1) * (sectors + 1));
    let mut uvs = Vec::with_capacity((rings + 1) * (sectors + 1));
    let mut indices = Vec::with_capacity(rings * sectors * 6);

    let ring_step = 1.0 / rings as f32;
    let sector_step = 1.0 / sectors as f32;

    for r in 0..=rings {
        let polar = PI * r as f32 * ring_step;
        let y = -(-FRAC_PI_2 + polar).sin();
        let sin_t = polar.sin();

        for s in 0..=sectors {
            let phi = 2.0 * PI * s as f32 * sector_step;

            let x = phi.cos() * sin_t;
            let z = phi.sin() * sin_t;

            positions.push([x * radius, y * radius, z * radius]);
            uvs.push([s as f32 * sector_step, 1.0 - r as f32 * ring_step]);
        }
    }

    grid_indices(rings, sectors, &mut indices);

    MeshData { positions, uvs, indices }
}

/// Dome covering `degrees` of the sphere, texture mapped as a fisheye disc.
pub fn build_dome(radius: f32, sectors: usize, degrees: f32, upper: bool) -> MeshData {
    let percent = degrees / 360.0;
    let rings = sectors / 2;
    let ring_step = 1.0 / rings as f32;
    let sector_step = 1.0 / sectors as f32;

    let len_rings = (rings as f32 * percent) as usize + 1;
    let len_sectors = sectors + 1;
    let sign = if upper { 1.0 } else { -1.0 };

    let mut positions = Vec::with_capacity(len_rings * len_sectors);
    let mut uvs = Vec::with_capacity(len_rings * len_sectors);
    let mut indices = Vec::with_capacity((len_rings - 1) * sectors * 6);

    for r in 0..len_rings {
        let polar = PI * r as f32 * ring_step;
        for s in 0..len_sectors {
            let phi = 2.0 * PI * s as f32 * sector_step;

            let x = phi.cos() * polar.sin() * sign;
            let y = (-FRAC_PI_2 + polar).sin() * -sign;
            let z = phi.sin() * polar.sin();

            let rho = r as f32 * ring_step / percent;
            let a = phi.cos() * rho / 2.0 + 0.5;
            let b = phi.sin() * rho / 2.0 + 0.5;

            positions.push([x * radius, y * radius, z * radius]);
            uvs.push([b, a]);
        }
    }

    grid_indices(len_rings - 1, sectors, &mut indices);

    MeshData { positions, uvs, indices }
}

/// Cube of edge `size` centered on the origin, one quad per face.
pub fn build_cube(size: f32) -> MeshData {
    let h = size / 2.0;
    let corners = [
        [-h, -h, -h],
        [h, -h, -h],
        [h, h, -h],
        [-h, h, -h],
        [-h, -h, h],
        [h, -h, h],
        [h, h, h],
        [-h, h, h],
    ];
    let faces: [[usize; 4]; 6] = [
        [0, 1, 2, 3], // -Z
        [5, 4, 7, 6], // +Z
        [4, 0, 3, 7], // -X
        [1, 5, 6, 2], // +X
        [4, 5, 1, 0], // -Y
        [3, 2, 6, 7], // +Y
    ];
    let face_uvs = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

    let mut positions = Vec::with_capacity(24);
    let mut uvs = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (face, quad) in faces.iter().enumerate() {
        for (corner, uv) in quad.iter().zip(face_uvs) {
            positions.push(corners[*corner]);
            uvs.push(uv);
        }
        let base = (face * 4) as u32;
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    MeshData { positions, uvs, indices }
}
