//! Drawable content of a scene node.
//!
//! A [`Geometry`] is a [`Mesh`] plus everything the basic pipeline needs to draw it:
//! the vertex-layout selector, an optional texture selector and the material-check
//! flags telling the fragment shader whether a texture is bound. The per-geometry GPU
//! binding (material-check uniform and texture bind group) is created lazily in
//! [`Geometry::write_to_buffers`] and rebuilt whenever the bound texture changes.

use std::ops::Range;

use wgpu::util::DeviceExt;

use crate::{
    data_structures::{
        mesh::{Mesh, PlaneMesh, ProceduralShape},
        texture::Texture,
        uniforms::{
            MATERIAL_CHECK_BINDING, MATERIAL_SAMPLER_BINDING, MATERIAL_TEXTURE_BINDING,
            MaterialCheck,
        },
        vertex::VertexLayout,
    },
    error::ResourceError,
    resources::texture::TextureLibrary,
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Material {
    pub name: String,
    /// Texture-library key of the diffuse map, if the material has one.
    pub diffuse_texture: Option<String>,
}

/// A range of the mesh's indices drawn with one material.
#[derive(Clone, Debug, PartialEq)]
pub struct GeometryElement {
    pub material: Material,
    pub indices: Range<u32>,
}

/// Everything a draw needs from the GPU besides the mesh buffers.
pub struct MaterialResources<'a> {
    pub layout: &'a wgpu::BindGroupLayout,
    pub textures: &'a TextureLibrary,
    /// Bound when no texture is selected or the selected one is missing.
    pub placeholder: &'a Texture,
    pub sampler: &'a wgpu::Sampler,
}

#[derive(Debug)]
struct MaterialBinding {
    /// Library key of the bound texture; `None` when the placeholder is bound.
    bound_texture: Option<String>,
    #[allow(unused)]
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

#[derive(Debug)]
pub struct Geometry {
    pub elements: Vec<GeometryElement>,
    pub mesh: Mesh,
    pub vertex_layout: VertexLayout,
    texture: Option<String>,
    binding: Option<MaterialBinding>,
}

impl Geometry {
    pub fn new(mesh: Mesh) -> Self {
        Self {
            elements: Vec::new(),
            mesh,
            vertex_layout: VertexLayout::Basic,
            texture: None,
            binding: None,
        }
    }

    pub fn from_shape(shape: ProceduralShape) -> Self {
        Self::new(Mesh::from(shape))
    }

    pub fn plane(
        vertices: &[[f32; 3]],
        tex_coords: &[[f32; 2]],
        indices: &[u16],
    ) -> Result<Self, ResourceError> {
        let mut geometry = Self::new(Mesh::Plane(PlaneMesh::new(vertices, tex_coords, indices)?));
        geometry.elements.push(GeometryElement {
            material: Material {
                name: "plane".to_string(),
                diffuse_texture: None,
            },
            indices: 0..indices.len() as u32,
        });
        Ok(geometry)
    }

    pub fn with_texture(mut self, key: impl Into<String>) -> Self {
        self.set_texture(key);
        self
    }

    pub fn set_texture(&mut self, key: impl Into<String>) {
        self.texture = Some(key.into());
    }

    pub fn clear_texture(&mut self) {
        self.texture = None;
    }

    pub fn texture(&self) -> Option<&str> {
        self.texture.as_deref()
    }

    /// Flags as selected on the geometry; a selected but missing texture still reads
    /// as "textured" here. The flags written to the GPU account for that.
    pub fn material_check(&self) -> MaterialCheck {
        MaterialCheck::new(self.texture.is_some())
    }

    pub fn bind_group(&self) -> Option<&wgpu::BindGroup> {
        self.binding.as_ref().map(|b| &b.bind_group)
    }

    /// Uploads the mesh and (re)creates the material binding when needed.
    pub fn write_to_buffers(&mut self, device: &wgpu::Device, resources: &MaterialResources) {
        self.mesh.write_to_buffer(device);

        let bound = match &self.texture {
            Some(key) if resources.textures.get(key).is_some() => Some(key.clone()),
            Some(key) => {
                if self
                    .binding
                    .as_ref()
                    .is_none_or(|b| b.bound_texture.is_some())
                {
                    log::warn!("texture '{}' is not loaded, drawing untextured", key);
                }
                None
            }
            None => None,
        };
        if self
            .binding
            .as_ref()
            .is_some_and(|b| b.bound_texture == bound)
        {
            return;
        }

        let texture = bound
            .as_deref()
            .and_then(|key| resources.textures.get(key))
            .unwrap_or(resources.placeholder);
        let check = MaterialCheck::new(bound.is_some());
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Material Check Buffer"),
            contents: bytemuck::bytes_of(&check),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("material_bind_group"),
            layout: resources.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: MATERIAL_TEXTURE_BINDING,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: MATERIAL_CHECK_BINDING,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: MATERIAL_SAMPLER_BINDING,
                    resource: wgpu::BindingResource::Sampler(
                        texture.sampler.as_ref().unwrap_or(resources.sampler),
                    ),
                },
            ],
        });
        self.binding = Some(MaterialBinding {
            bound_texture: bound,
            buffer,
            bind_group,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_selection_drives_material_check() {
        let mut geometry = Geometry::from_shape(ProceduralShape::Quad);
        assert!(!geometry.material_check().uses_texture());
        geometry.set_texture("flower");
        assert!(geometry.material_check().uses_texture());
        assert_eq!(geometry.texture(), Some("flower"));
        geometry.clear_texture();
        assert!(!geometry.material_check().uses_texture());
        assert!(geometry.bind_group().is_none());
    }

    #[test]
    fn plane_geometry_has_one_element_over_all_indices() {
        let geometry = Geometry::plane(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
            &[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
            &[0, 1, 2],
        )
        .unwrap();
        assert_eq!(geometry.elements.len(), 1);
        assert_eq!(geometry.elements[0].indices, 0..3);
    }
}
