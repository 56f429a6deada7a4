//! Primitive geometry and node transforms.
//!
//! Scene nodes only carry a [`Shape`] tag and a [`Transform`]; the renderer
//! generates [`MeshData`] once per shape and keeps the uploaded [`Mesh`].
//! Vertices are 32 bytes: position, normal and uv at locations 0, 1 and 2.

use std::f32::consts::{PI, TAU};

use glam::{Mat4, Quat, Vec3};

use crate::gpu::GpuContext;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3d {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex3d {
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex3d>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            // position
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            // normal
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x3,
            },
            // uv
            wgpu::VertexAttribute {
                offset: 24,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32x2,
            },
        ],
    };

    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// The primitives a scene node can be drawn as.
///
/// Every shape is unit-sized and centered at the origin; size comes from the
/// node's [`Transform`]. Ring-like shapes lie flat in the XZ plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Shape {
    /// 1×1×1 cube.
    Cube,
    /// Sphere of radius 0.5.
    Sphere,
    /// 1×1 plane facing +Y.
    Plane,
    /// Torus of radius 1 with a fat tube, for planetary rings.
    Torus,
    /// Torus of radius 1 with a thin tube, for ripple rings.
    Ring,
    /// Hairline circle of radius 1, for orbit paths.
    OrbitPath,
    /// (2, 3) torus knot roughly 1.3 units across.
    TorusKnot,
}

impl Shape {
    pub const ALL: [Shape; 7] = [
        Shape::Cube,
        Shape::Sphere,
        Shape::Plane,
        Shape::Torus,
        Shape::Ring,
        Shape::OrbitPath,
        Shape::TorusKnot,
    ];

    /// Generate the CPU geometry for this shape.
    pub fn mesh_data(self) -> MeshData {
        match self {
            Shape::Cube => MeshData::cube(),
            Shape::Sphere => MeshData::sphere(32, 16),
            Shape::Plane => MeshData::plane(1.0),
            Shape::Torus => MeshData::torus(1.0, 0.18, 8, 48),
            Shape::Ring => MeshData::torus(1.0, 0.04, 8, 64),
            Shape::OrbitPath => MeshData::torus(1.0, 0.006, 4, 90),
            Shape::TorusKnot => MeshData::torus_knot(0.6, 0.18, 128, 16, 2, 3),
        }
    }
}

/// CPU-side triangle geometry.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex3d>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Unit cube with per-face vertices for flat normals.
    pub fn cube() -> Self {
        #[rustfmt::skip]
        let vertices = vec![
            // Front face (Z+)
            Vertex3d::new([-0.5, -0.5,  0.5], [ 0.0,  0.0,  1.0], [0.0, 0.0]),
            Vertex3d::new([ 0.5, -0.5,  0.5], [ 0.0,  0.0,  1.0], [1.0, 0.0]),
            Vertex3d::new([ 0.5,  0.5,  0.5], [ 0.0,  0.0,  1.0], [1.0, 1.0]),
            Vertex3d::new([-0.5,  0.5,  0.5], [ 0.0,  0.0,  1.0], [0.0, 1.0]),
            // Back face (Z-)
            Vertex3d::new([ 0.5, -0.5, -0.5], [ 0.0,  0.0, -1.0], [0.0, 0.0]),
            Vertex3d::new([-0.5, -0.5, -0.5], [ 0.0,  0.0, -1.0], [1.0, 0.0]),
            Vertex3d::new([-0.5,  0.5, -0.5], [ 0.0,  0.0, -1.0], [1.0, 1.0]),
            Vertex3d::new([ 0.5,  0.5, -0.5], [ 0.0,  0.0, -1.0], [0.0, 1.0]),
            // Top face (Y+)
            Vertex3d::new([-0.5,  0.5,  0.5], [ 0.0,  1.0,  0.0], [0.0, 0.0]),
            Vertex3d::new([ 0.5,  0.5,  0.5], [ 0.0,  1.0,  0.0], [1.0, 0.0]),
            Vertex3d::new([ 0.5,  0.5, -0.5], [ 0.0,  1.0,  0.0], [1.0, 1.0]),
            Vertex3d::new([-0.5,  0.5, -0.5], [ 0.0,  1.0,  0.0], [0.0, 1.0]),
            // Bottom face (Y-)
            Vertex3d::new([-0.5, -0.5, -0.5], [ 0.0, -1.0,  0.0], [0.0, 0.0]),
            Vertex3d::new([ 0.5, -0.5, -0.5], [ 0.0, -1.0,  0.0], [1.0, 0.0]),
            Vertex3d::new([ 0.5, -0.5,  0.5], [ 0.0, -1.0,  0.0], [1.0, 1.0]),
            Vertex3d::new([-0.5, -0.5,  0.5], [ 0.0, -1.0,  0.0], [0.0, 1.0]),
            // Right face (X+)
            Vertex3d::new([ 0.5, -0.5,  0.5], [ 1.0,  0.0,  0.0], [0.0, 0.0]),
            Vertex3d::new([ 0.5, -0.5, -0.5], [ 1.0,  0.0,  0.0], [1.0, 0.0]),
            Vertex3d::new([ 0.5,  0.5, -0.5], [ 1.0,  0.0,  0.0], [1.0, 1.0]),
            Vertex3d::new([ 0.5,  0.5,  0.5], [ 1.0,  0.0,  0.0], [0.0, 1.0]),
            // Left face (X-)
            Vertex3d::new([-0.5, -0.5, -0.5], [-1.0,  0.0,  0.0], [0.0, 0.0]),
            Vertex3d::new([-0.5, -0.5,  0.5], [-1.0,  0.0,  0.0], [1.0, 0.0]),
            Vertex3d::new([-0.5,  0.5,  0.5], [-1.0,  0.0,  0.0], [1.0, 1.0]),
            Vertex3d::new([-0.5,  0.5, -0.5], [-1.0,  0.0,  0.0], [0.0, 1.0]),
        ];

        #[rustfmt::skip]
        let indices: Vec<u32> = vec![
            0,  1,  2,  2,  3,  0,  // front
            4,  5,  6,  6,  7,  4,  // back
            8,  9,  10, 10, 11, 8,  // top
            12, 13, 14, 14, 15, 12, // bottom
            16, 17, 18, 18, 19, 16, // right
            20, 21, 22, 22, 23, 20, // left
        ];

        Self { vertices, indices }
    }

    /// UV sphere of radius 0.5 with latitude/longitude subdivision.
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for ring in 0..=rings {
            let phi = PI * ring as f32 / rings as f32;
            let y = phi.cos();
            let ring_radius = phi.sin();

            for seg in 0..=segments {
                let theta = TAU * seg as f32 / segments as f32;
                let x = ring_radius * theta.cos();
                let z = ring_radius * theta.sin();

                let position = [x * 0.5, y * 0.5, z * 0.5];
                let normal = [x, y, z];
                let uv = [seg as f32 / segments as f32, ring as f32 / rings as f32];

                vertices.push(Vertex3d::new(position, normal, uv));
            }
        }

        for ring in 0..rings {
            for seg in 0..segments {
                let current = ring * (segments + 1) + seg;
                let next = current + segments + 1;

                indices.extend_from_slice(&[current, next, current + 1]);
                indices.extend_from_slice(&[current + 1, next, next + 1]);
            }
        }

        Self { vertices, indices }
    }

    /// Square plane on the XZ axis with its normal pointing up.
    pub fn plane(size: f32) -> Self {
        let half = size * 0.5;
        let vertices = vec![
            Vertex3d::new([-half, 0.0, -half], [0.0, 1.0, 0.0], [0.0, 0.0]),
            Vertex3d::new([half, 0.0, -half], [0.0, 1.0, 0.0], [1.0, 0.0]),
            Vertex3d::new([half, 0.0, half], [0.0, 1.0, 0.0], [1.0, 1.0]),
            Vertex3d::new([-half, 0.0, half], [0.0, 1.0, 0.0], [0.0, 1.0]),
        ];

        let indices = vec![0, 2, 1, 2, 0, 3];

        Self { vertices, indices }
    }

    /// Torus around the Y axis.
    ///
    /// * `radius` - Distance from the center to the middle of the tube
    /// * `tube` - Tube radius
    /// * `radial` - Segments around the tube cross-section
    /// * `tubular` - Segments around the ring
    pub fn torus(radius: f32, tube: f32, radial: u32, tubular: u32) -> Self {
        let mut vertices = Vec::with_capacity(((radial + 1) * (tubular + 1)) as usize);

        for j in 0..=radial {
            let v = TAU * j as f32 / radial as f32;
            for i in 0..=tubular {
                let u = TAU * i as f32 / tubular as f32;
                let center = Vec3::new(radius * u.cos(), 0.0, radius * u.sin());
                let position = Vec3::new(
                    (radius + tube * v.cos()) * u.cos(),
                    tube * v.sin(),
                    (radius + tube * v.cos()) * u.sin(),
                );
                let normal = (position - center).normalize_or(Vec3::Y);
                vertices.push(Vertex3d::new(
                    position.to_array(),
                    normal.to_array(),
                    [i as f32 / tubular as f32, j as f32 / radial as f32],
                ));
            }
        }

        Self {
            vertices,
            indices: grid_indices(radial, tubular),
        }
    }

    /// (p, q) torus knot, swept with a circular tube.
    pub fn torus_knot(radius: f32, tube: f32, tubular: u32, radial: u32, p: u32, q: u32) -> Self {
        let curve = |u: f32| {
            let q_over_p = q as f32 / p as f32 * u;
            let cs = q_over_p.cos();
            Vec3::new(
                radius * (2.0 + cs) * 0.5 * u.cos(),
                radius * (2.0 + cs) * 0.5 * u.sin(),
                radius * q_over_p.sin() * 0.5,
            )
        };

        let mut vertices = Vec::with_capacity(((radial + 1) * (tubular + 1)) as usize);
        for i in 0..=tubular {
            let u = i as f32 / tubular as f32 * p as f32 * TAU;
            let p1 = curve(u);
            let p2 = curve(u + 0.01);

            // Frenet-style frame along the curve
            let tangent = p2 - p1;
            let bitangent = tangent.cross(p2 + p1).normalize_or(Vec3::Z);
            let normal = bitangent.cross(tangent).normalize_or(Vec3::Y);

            for j in 0..=radial {
                let v = j as f32 / radial as f32 * TAU;
                let cx = -tube * v.cos();
                let cy = tube * v.sin();
                let position = p1 + normal * cx + bitangent * cy;
                let n = (position - p1).normalize_or(Vec3::Y);
                vertices.push(Vertex3d::new(
                    position.to_array(),
                    n.to_array(),
                    [i as f32 / tubular as f32, j as f32 / radial as f32],
                ));
            }
        }

        Self {
            vertices,
            indices: grid_indices(tubular, radial),
        }
    }
}

/// Two triangles per cell of an `(outer + 1) × (inner + 1)` vertex grid.
fn grid_indices(outer: u32, inner: u32) -> Vec<u32> {
    let stride = inner + 1;
    let mut indices = Vec::with_capacity((outer * inner * 6) as usize);
    for j in 1..=outer {
        for i in 1..=inner {
            let a = stride * (j - 1) + (i - 1);
            let b = stride * j + (i - 1);
            let c = stride * j + i;
            let d = stride * (j - 1) + i;
            indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }
    indices
}

/// GPU-resident mesh geometry with vertex and index buffers.
#[derive(Debug)]
pub struct Mesh {
    pub(crate) vertex_buffer: wgpu::Buffer,
    pub(crate) index_buffer: wgpu::Buffer,
    pub(crate) index_count: u32,
}

impl Mesh {
    /// Upload CPU geometry to GPU buffers.
    pub fn new(gpu: &GpuContext, data: &MeshData) -> Self {
        use wgpu::util::DeviceExt;

        let vertex_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Vertex Buffer"),
                contents: bytemuck::cast_slice(&data.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let index_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Index Buffer"),
                contents: bytemuck::cast_slice(&data.indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
        }
    }
}

/// A node's placement relative to its parent, applied as scale, rotate, translate.
///
/// ```
/// use vitrine::{Transform, Vec3};
///
/// let transform = Transform::new()
///     .position(Vec3::new(1.0, 0.0, 0.0))
///     .uniform_scale(2.0);
/// assert_eq!(transform.matrix().transform_point3(Vec3::X), Vec3::new(3.0, 0.0, 0.0));
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Rotation from XYZ Euler angles in radians.
    pub fn euler(mut self, x: f32, y: f32, z: f32) -> Self {
        self.rotation = Quat::from_euler(glam::EulerRot::XYZ, x, y, z);
        self
    }

    pub fn scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_shape_has_valid_indices() {
        for shape in Shape::ALL {
            let data = shape.mesh_data();
            assert!(!data.indices.is_empty(), "{shape:?}");
            assert_eq!(data.indices.len() % 3, 0, "{shape:?}");
            let max = data.vertices.len() as u32;
            assert!(data.indices.iter().all(|&i| i < max), "{shape:?}");
        }
    }

    #[test]
    fn torus_lies_in_xz_plane() {
        let data = MeshData::torus(1.0, 0.1, 6, 24);
        for v in &data.vertices {
            assert!(v.position[1].abs() <= 0.1 + 1e-5);
            let r = (v.position[0].powi(2) + v.position[2].powi(2)).sqrt();
            assert!((0.9 - 1e-4..=1.1 + 1e-4).contains(&r));
        }
    }

    #[test]
    fn cube_has_flat_faces() {
        let data = MeshData::cube();
        assert_eq!(data.vertices.len(), 24);
        assert_eq!(data.indices.len(), 36);
    }
}
