//! Drawable primitives.
//!
//! Every [`Mesh`] variant keeps its vertex data on the CPU and uploads it lazily in
//! [`Mesh::write_to_buffer`]. Building and inspecting meshes therefore needs no device,
//! which keeps scene construction testable; the GPU buffers appear the first time a
//! mesh is drawn.

use cgmath::{InnerSpace, Vector3};
use wgpu::util::DeviceExt;

use crate::{
    data_structures::vertex::{BasicVertex, VertexLayout},
    error::ResourceError,
};

/// Shapes built into the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProceduralShape {
    Triangle,
    Quad,
    Cube,
    VerticalSegment,
    HorizontalSegment,
}

const SEGMENT_COLOUR: [f32; 4] = [0.9, 1.0, 0.0, 1.0];

impl ProceduralShape {
    pub fn vertices(&self) -> Vec<BasicVertex> {
        match self {
            ProceduralShape::Triangle => vec![
                BasicVertex::new([0.0, 1.0, 0.0], [1.0, 0.0, 0.0, 1.0], [0.0, 0.0]),
                BasicVertex::new([-1.0, -1.0, 0.0], [0.0, 1.0, 0.0, 1.0], [0.0, 0.0]),
                BasicVertex::new([1.0, -1.0, 0.0], [0.0, 0.0, 1.0, 1.0], [0.0, 0.0]),
            ],
            ProceduralShape::Quad => rectangle(5.0, 3.0),
            ProceduralShape::VerticalSegment => rectangle(0.009, 0.025),
            ProceduralShape::HorizontalSegment => rectangle(0.025, 0.009),
            ProceduralShape::Cube => cube(),
        }
    }
}

/// Two triangles spanning `[-w, w] x [-h, h]` in the xy plane.
fn rectangle(w: f32, h: f32) -> Vec<BasicVertex> {
    let top_right = BasicVertex::new([w, h, 0.0], SEGMENT_COLOUR, [1.0, 0.0]);
    let top_left = BasicVertex::new([-w, h, 0.0], SEGMENT_COLOUR, [0.0, 0.0]);
    let bottom_left = BasicVertex::new([-w, -h, 0.0], SEGMENT_COLOUR, [0.0, 1.0]);
    let bottom_right = BasicVertex::new([w, -h, 0.0], SEGMENT_COLOUR, [1.0, 1.0]);
    vec![
        top_right,
        top_left,
        bottom_left,
        top_right,
        bottom_left,
        bottom_right,
    ]
}

fn cube() -> Vec<BasicVertex> {
    #[rustfmt::skip]
    let faces: [([f32; 3], [f32; 4]); 36] = [
        // left
        ([-1.0, -1.0, -1.0], [1.0, 0.5, 0.0, 1.0]),
        ([-1.0, -1.0,  1.0], [0.0, 1.0, 0.5, 1.0]),
        ([-1.0,  1.0,  1.0], [0.0, 0.5, 1.0, 1.0]),
        ([-1.0, -1.0, -1.0], [1.0, 1.0, 0.0, 1.0]),
        ([-1.0,  1.0,  1.0], [0.0, 1.0, 1.0, 1.0]),
        ([-1.0,  1.0, -1.0], [1.0, 0.0, 1.0, 1.0]),
        // right
        ([ 1.0,  1.0,  1.0], [1.0, 0.0, 0.5, 1.0]),
        ([ 1.0, -1.0, -1.0], [0.0, 1.0, 0.0, 1.0]),
        ([ 1.0,  1.0, -1.0], [0.0, 0.5, 1.0, 1.0]),
        ([ 1.0, -1.0, -1.0], [1.0, 1.0, 0.0, 1.0]),
        ([ 1.0,  1.0,  1.0], [0.0, 1.0, 1.0, 1.0]),
        ([ 1.0, -1.0,  1.0], [1.0, 0.5, 1.0, 1.0]),
        // top
        ([ 1.0,  1.0,  1.0], [1.0, 0.0, 0.0, 1.0]),
        ([ 1.0,  1.0, -1.0], [0.0, 1.0, 0.0, 1.0]),
        ([-1.0,  1.0, -1.0], [0.0, 0.0, 1.0, 1.0]),
        ([ 1.0,  1.0,  1.0], [1.0, 1.0, 0.0, 1.0]),
        ([-1.0,  1.0, -1.0], [0.5, 1.0, 1.0, 1.0]),
        ([-1.0,  1.0,  1.0], [1.0, 0.0, 1.0, 1.0]),
        // bottom
        ([ 1.0, -1.0,  1.0], [1.0, 0.5, 0.0, 1.0]),
        ([-1.0, -1.0, -1.0], [0.5, 1.0, 0.0, 1.0]),
        ([ 1.0, -1.0, -1.0], [0.0, 0.0, 1.0, 1.0]),
        ([ 1.0, -1.0,  1.0], [1.0, 1.0, 0.5, 1.0]),
        ([-1.0, -1.0,  1.0], [0.0, 1.0, 1.0, 1.0]),
        ([-1.0, -1.0, -1.0], [1.0, 0.5, 1.0, 1.0]),
        // back
        ([ 1.0,  1.0, -1.0], [1.0, 0.5, 0.0, 1.0]),
        ([-1.0, -1.0, -1.0], [0.5, 1.0, 0.0, 1.0]),
        ([-1.0,  1.0, -1.0], [0.0, 0.0, 1.0, 1.0]),
        ([ 1.0,  1.0, -1.0], [1.0, 1.0, 0.0, 1.0]),
        ([ 1.0, -1.0, -1.0], [0.0, 1.0, 1.0, 1.0]),
        ([-1.0, -1.0, -1.0], [1.0, 0.5, 1.0, 1.0]),
        // front
        ([-1.0,  1.0,  1.0], [1.0, 0.5, 0.0, 1.0]),
        ([-1.0, -1.0,  1.0], [0.0, 1.0, 0.0, 1.0]),
        ([ 1.0, -1.0,  1.0], [0.5, 0.0, 1.0, 1.0]),
        ([ 1.0,  1.0,  1.0], [1.0, 1.0, 0.5, 1.0]),
        ([-1.0,  1.0,  1.0], [0.0, 1.0, 1.0, 1.0]),
        ([ 1.0, -1.0,  1.0], [1.0, 0.0, 1.0, 1.0]),
    ];
    faces
        .iter()
        .map(|(position, colour)| BasicVertex::new(*position, *colour, [0.0, 0.0]))
        .collect()
}

#[derive(Debug)]
pub struct ProceduralMesh {
    pub shape: ProceduralShape,
    vertices: Vec<BasicVertex>,
    instance_count: u32,
    vertex_buffer: Option<wgpu::Buffer>,
}

impl ProceduralMesh {
    pub fn new(shape: ProceduralShape) -> Self {
        Self {
            shape,
            vertices: shape.vertices(),
            instance_count: 1,
            vertex_buffer: None,
        }
    }
}

/// One indexed part of a loaded model.
#[derive(Debug)]
pub struct SubMesh {
    pub name: String,
    pub vertices: Vec<BasicVertex>,
    pub indices: Vec<u32>,
    /// Index into the model's materials, if the file declared one.
    pub material: Option<usize>,
    buffers: Option<(wgpu::Buffer, wgpu::Buffer)>,
}

impl SubMesh {
    pub fn new(
        name: String,
        vertices: Vec<BasicVertex>,
        indices: Vec<u32>,
        material: Option<usize>,
    ) -> Self {
        Self {
            name,
            vertices,
            indices,
            material,
            buffers: None,
        }
    }
}

#[derive(Debug)]
pub struct ModelMesh {
    pub name: String,
    pub sub_meshes: Vec<SubMesh>,
    instance_count: u32,
}

impl ModelMesh {
    pub fn new(name: String, sub_meshes: Vec<SubMesh>) -> Self {
        Self {
            name,
            sub_meshes,
            instance_count: 1,
        }
    }
}

/// Mesh of a detected real-world plane.
#[derive(Debug)]
pub struct PlaneMesh {
    vertices: Vec<BasicVertex>,
    indices: Vec<u32>,
    face_normal: Vector3<f32>,
    instance_count: u32,
    buffers: Option<(wgpu::Buffer, wgpu::Buffer)>,
}

impl PlaneMesh {
    /// Builds the mesh of a plane boundary as delivered by the tracking session.
    ///
    /// The face normal is taken from the first triangle, `normalize((v1 - v0) x (v2 - v0))`.
    /// The vertex colour is white so the plane renders in its material colour.
    pub fn new(
        vertices: &[[f32; 3]],
        tex_coords: &[[f32; 2]],
        indices: &[u16],
    ) -> Result<Self, ResourceError> {
        if indices.len() < 3 {
            return Err(ResourceError::InvalidPlane(format!(
                "need at least 3 indices, got {}",
                indices.len()
            )));
        }
        if vertices.len() != tex_coords.len() {
            return Err(ResourceError::InvalidPlane(format!(
                "{} vertices but {} texture coordinates",
                vertices.len(),
                tex_coords.len()
            )));
        }
        if let Some(i) = indices.iter().find(|&&i| usize::from(i) >= vertices.len()) {
            return Err(ResourceError::InvalidPlane(format!(
                "index {} out of bounds for {} vertices",
                i,
                vertices.len()
            )));
        }

        let corner = |n: usize| Vector3::from(vertices[usize::from(indices[n])]);
        let (v0, v1, v2) = (corner(0), corner(1), corner(2));
        let cross = (v1 - v0).cross(v2 - v0);
        if cross.magnitude2() <= f32::MIN_POSITIVE {
            return Err(ResourceError::InvalidPlane(
                "first triangle is degenerate".to_string(),
            ));
        }

        let vertices = vertices
            .iter()
            .zip(tex_coords)
            .map(|(position, uv)| BasicVertex::new(*position, [1.0; 4], *uv))
            .collect();

        Ok(Self {
            vertices,
            indices: indices.iter().map(|&i| u32::from(i)).collect(),
            face_normal: cross.normalize(),
            instance_count: 1,
            buffers: None,
        })
    }

    pub fn face_normal(&self) -> Vector3<f32> {
        self.face_normal
    }
}

#[derive(Debug)]
pub enum Mesh {
    Procedural(ProceduralMesh),
    Model(ModelMesh),
    Plane(PlaneMesh),
}

impl From<ProceduralShape> for Mesh {
    fn from(shape: ProceduralShape) -> Self {
        Mesh::Procedural(ProceduralMesh::new(shape))
    }
}

impl Mesh {
    pub fn topology(&self) -> wgpu::PrimitiveTopology {
        wgpu::PrimitiveTopology::TriangleList
    }

    pub fn vertex_count(&self) -> u32 {
        match self {
            Mesh::Procedural(mesh) => mesh.vertices.len() as u32,
            Mesh::Model(model) => model
                .sub_meshes
                .iter()
                .map(|sub| sub.vertices.len() as u32)
                .sum(),
            Mesh::Plane(plane) => plane.vertices.len() as u32,
        }
    }

    pub fn instance_count(&self) -> u32 {
        match self {
            Mesh::Procedural(mesh) => mesh.instance_count,
            Mesh::Model(model) => model.instance_count,
            Mesh::Plane(plane) => plane.instance_count,
        }
    }

    /// Every instance reads its own model-constant entry, so this also sets how many
    /// entries a draw of this mesh occupies.
    pub fn set_instance_count(&mut self, count: u32) {
        let count = count.max(1);
        match self {
            Mesh::Procedural(mesh) => mesh.instance_count = count,
            Mesh::Model(model) => model.instance_count = count,
            Mesh::Plane(plane) => plane.instance_count = count,
        }
    }

    /// Bytes of vertex data this mesh uploads.
    pub fn vertex_bytes(&self) -> usize {
        match self {
            Mesh::Procedural(mesh) => bytemuck::cast_slice::<_, u8>(&mesh.vertices).len(),
            Mesh::Model(model) => model
                .sub_meshes
                .iter()
                .map(|sub| bytemuck::cast_slice::<_, u8>(&sub.vertices).len())
                .sum(),
            Mesh::Plane(plane) => bytemuck::cast_slice::<_, u8>(&plane.vertices).len(),
        }
    }

    /// Checks that the vertex data matches the stride of `layout`.
    pub fn validate(&self, layout: VertexLayout) -> Result<(), ResourceError> {
        let bytes = self.vertex_bytes();
        let vertex_count = self.vertex_count();
        let stride = layout.stride();
        if bytes as u64 != u64::from(vertex_count) * stride {
            return Err(ResourceError::VertexLength {
                bytes,
                vertex_count,
                stride,
            });
        }
        Ok(())
    }

    pub fn is_uploaded(&self) -> bool {
        match self {
            Mesh::Procedural(mesh) => mesh.vertex_buffer.is_some(),
            Mesh::Model(model) => model.sub_meshes.iter().all(|sub| sub.buffers.is_some()),
            Mesh::Plane(plane) => plane.buffers.is_some(),
        }
    }

    /// Creates the GPU buffers of this mesh if they do not exist yet.
    pub fn write_to_buffer(&mut self, device: &wgpu::Device) {
        match self {
            Mesh::Procedural(mesh) => {
                if mesh.vertex_buffer.is_none() {
                    mesh.vertex_buffer = Some(vertex_buffer(
                        device,
                        &format!("{:?} Vertex Buffer", mesh.shape),
                        &mesh.vertices,
                    ));
                }
            }
            Mesh::Model(model) => {
                for sub in model.sub_meshes.iter_mut().filter(|s| s.buffers.is_none()) {
                    sub.buffers = Some(indexed_buffers(
                        device,
                        &format!("{}/{}", model.name, sub.name),
                        &sub.vertices,
                        &sub.indices,
                    ));
                }
            }
            Mesh::Plane(plane) => {
                if plane.buffers.is_none() {
                    plane.buffers = Some(indexed_buffers(
                        device,
                        "Plane",
                        &plane.vertices,
                        &plane.indices,
                    ));
                }
            }
        }
    }

    /// Records the draw call(s) of this mesh with its own instance count, starting at
    /// model-constant entry `first_instance`.
    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>, first_instance: u32) {
        let instances = first_instance..first_instance + self.instance_count();
        match self {
            Mesh::Procedural(mesh) => {
                let Some(buffer) = &mesh.vertex_buffer else {
                    log::warn!("{:?} mesh drawn before upload, skipping", mesh.shape);
                    return;
                };
                render_pass.set_vertex_buffer(0, buffer.slice(..));
                render_pass.draw(0..mesh.vertices.len() as u32, instances);
            }
            Mesh::Model(model) => {
                for sub in &model.sub_meshes {
                    let Some((vertices, indices)) = &sub.buffers else {
                        log::warn!("{}/{} drawn before upload, skipping", model.name, sub.name);
                        continue;
                    };
                    render_pass.set_vertex_buffer(0, vertices.slice(..));
                    render_pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                    render_pass.draw_indexed(0..sub.indices.len() as u32, 0, instances.clone());
                }
            }
            Mesh::Plane(plane) => {
                let Some((vertices, indices)) = &plane.buffers else {
                    log::warn!("plane mesh drawn before upload, skipping");
                    return;
                };
                render_pass.set_vertex_buffer(0, vertices.slice(..));
                render_pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..plane.indices.len() as u32, 0, instances);
            }
        }
    }
}

fn vertex_buffer(device: &wgpu::Device, label: &str, vertices: &[BasicVertex]) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(vertices),
        usage: wgpu::BufferUsages::VERTEX,
    })
}

fn indexed_buffers(
    device: &wgpu::Device,
    label: &str,
    vertices: &[BasicVertex],
    indices: &[u32],
) -> (wgpu::Buffer, wgpu::Buffer) {
    let vertex_buffer = vertex_buffer(device, &format!("{} Vertex Buffer", label), vertices);
    let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(&format!("{} Index Buffer", label)),
        contents: bytemuck::cast_slice(indices),
        usage: wgpu::BufferUsages::INDEX,
    });
    (vertex_buffer, index_buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn procedural_shapes_have_whole_triangles() {
        for shape in [
            ProceduralShape::Triangle,
            ProceduralShape::Quad,
            ProceduralShape::Cube,
            ProceduralShape::VerticalSegment,
            ProceduralShape::HorizontalSegment,
        ] {
            let mesh = Mesh::from(shape);
            assert_eq!(mesh.vertex_count() % 3, 0, "{:?}", shape);
            assert!(mesh.validate(VertexLayout::Basic).is_ok());
            assert!(!mesh.is_uploaded());
        }
        assert_eq!(Mesh::from(ProceduralShape::Cube).vertex_count(), 36);
    }

    #[test]
    fn quad_layout_rejects_basic_vertices() {
        let mesh = Mesh::from(ProceduralShape::Quad);
        assert!(matches!(
            mesh.validate(VertexLayout::Quad),
            Err(ResourceError::VertexLength { vertex_count: 6, .. })
        ));
    }
}
