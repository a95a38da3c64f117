//! Drawables, meshes and per-frame uniform data.

use std::mem::{offset_of, size_of};

use ash::vk;
use glam::{Mat4, Vec3};

use crate::camera::Camera;
use crate::error::{RenderError, Result};

/// Vertex layout of scene meshes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex {
    pub const fn new(position: [f32; 3], normal: [f32; 3]) -> Self {
        Self { position, normal }
    }

    pub fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, normal) as u32,
            },
        ]
    }
}

/// CPU-side mesh data.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Axis-aligned cube of edge `size` centred on the origin, with flat
    /// normals (four vertices per face).
    pub fn cube(size: f32) -> Self {
        let h = size * 0.5;
        // (normal, tangent u, tangent v) with u × v = normal
        let faces: [(Vec3, Vec3, Vec3); 6] = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];

        let mut mesh = Self::default();
        for (normal, u, v) in faces {
            let base = mesh.vertices.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let position = (normal + u * su + v * sv) * h;
                mesh.vertices
                    .push(Vertex::new(position.to_array(), normal.to_array()));
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

/// One draw call of the scene subpass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Drawable {
    /// Model transform, pushed as a 64-byte vertex push constant.
    pub transform: Mat4,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
    /// Index into the renderer's material sets.
    pub material: usize,
}

/// The drawables of one frame, recorded in list order.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    drawables: Vec<Drawable>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, drawable: Drawable) {
        self.drawables.push(drawable);
    }

    pub fn clear(&mut self) {
        self.drawables.clear();
    }

    pub fn drawables(&self) -> &[Drawable] {
        &self.drawables
    }

    pub fn drawables_mut(&mut self) -> &mut [Drawable] {
        &mut self.drawables
    }

    pub fn len(&self) -> usize {
        self.drawables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drawables.is_empty()
    }

    /// Check that every drawable names one of `material_count` materials.
    pub fn check_materials(&self, material_count: usize) -> Result<()> {
        match self
            .drawables
            .iter()
            .position(|d| d.material >= material_count)
        {
            Some(drawable) => Err(RenderError::UnknownMaterial {
                drawable,
                material: self.drawables[drawable].material,
                available: material_count,
            }),
            None => Ok(()),
        }
    }
}

/// Per-frame uniform buffer contents.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub view_projection: [[f32; 4]; 4],
    pub inverse_projection: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    /// Direction towards the light, `w` unused.
    pub light_direction: [f32; 4],
    /// Width, height, 1/width, 1/height.
    pub viewport: [f32; 4],
}

impl FrameUniforms {
    pub fn new(camera: &Camera, light_direction: Vec3, extent: vk::Extent2D) -> Self {
        let projection = camera.projection_matrix();
        let light = light_direction.normalize_or_zero();
        let (width, height) = (extent.width.max(1) as f32, extent.height.max(1) as f32);

        Self {
            view: camera.view_matrix().to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
            view_projection: camera.view_projection_matrix().to_cols_array_2d(),
            inverse_projection: projection.inverse().to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).to_array(),
            light_direction: light.extend(0.0).to_array(),
            viewport: [width, height, 1.0 / width, 1.0 / height],
        }
    }
}

/// Material uniform buffer contents.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniforms {
    pub base_color: [f32; 4],
    /// Roughness, metallic, unused, unused.
    pub params: [f32; 4],
}

impl MaterialUniforms {
    pub const fn new(base_color: [f32; 4], roughness: f32, metallic: f32) -> Self {
        Self {
            base_color,
            params: [roughness, metallic, 0.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn drawable(material: usize) -> Drawable {
        Drawable {
            transform: Mat4::IDENTITY,
            vertex_buffer: vk::Buffer::null(),
            index_buffer: vk::Buffer::null(),
            index_count: 36,
            material,
        }
    }

    #[test]
    fn cube_topology() {
        let cube = MeshData::cube(2.0);
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.index_count(), 36);
        assert!(cube.indices.iter().all(|&i| (i as usize) < cube.vertices.len()));
        for vertex in &cube.vertices {
            for c in vertex.position {
                assert_relative_eq!(c.abs(), 1.0, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn cube_faces_wind_outwards() {
        let cube = MeshData::cube(1.0);
        for tri in cube.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from(cube.vertices[i as usize].position));
            let face_normal = (b - a).cross(c - a).normalize();
            let normal = Vec3::from(cube.vertices[tri[0] as usize].normal);
            assert_relative_eq!(face_normal.dot(normal), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn vertex_layout_matches_struct() {
        let attributes = Vertex::attribute_descriptions();
        assert_eq!(Vertex::binding_descriptions()[0].stride, 24);
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].offset, 12);
    }

    #[test]
    fn transform_fits_push_constant() {
        assert_eq!(
            size_of::<Mat4>() as u32,
            lumen_core::constants::MODEL_PUSH_CONSTANT_SIZE
        );
    }

    #[test]
    fn material_indices_checked() {
        let mut scene = Scene::new();
        scene.push(drawable(0));
        scene.push(drawable(2));

        assert!(scene.check_materials(3).is_ok());
        assert!(matches!(
            scene.check_materials(2),
            Err(RenderError::UnknownMaterial {
                drawable: 1,
                material: 2,
                available: 2
            })
        ));
    }

    #[test]
    fn frame_uniforms_viewport() {
        let camera = Camera::default();
        let uniforms = FrameUniforms::new(
            &camera,
            Vec3::new(0.0, 2.0, 0.0),
            vk::Extent2D {
                width: 200,
                height: 100,
            },
        );

        assert_eq!(uniforms.viewport, [200.0, 100.0, 0.005, 0.01]);
        assert_relative_eq!(uniforms.light_direction[1], 1.0);
        assert_eq!(uniforms.camera_position[3], 1.0);
    }

    #[test]
    fn frame_uniforms_are_std140_sized() {
        assert_eq!(size_of::<FrameUniforms>() % 16, 0);
        assert_eq!(size_of::<MaterialUniforms>(), 32);
    }
}
