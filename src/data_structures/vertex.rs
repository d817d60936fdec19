//! Vertex formats shared with the WGSL shaders.
//!
//! The byte layout of [`BasicVertex`] is a fixed contract with `basic.wgsl`:
//! position `Float32x3` at offset 0, colour `Float32x4` at offset 12 and texture
//! coordinate `Float32x2` at offset 28, 36 bytes per vertex.

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

/// Vertex-layout selector of a geometry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    #[default]
    Basic,
    /// Screen-space quad: `x, y, s, t`.
    Quad,
}

impl VertexLayout {
    pub fn stride(&self) -> u64 {
        match self {
            VertexLayout::Basic => std::mem::size_of::<BasicVertex>() as u64,
            VertexLayout::Quad => std::mem::size_of::<QuadVertex>() as u64,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BasicVertex {
    pub position: [f32; 3],
    pub colour: [f32; 4],
    pub tex_coords: [f32; 2],
}

impl BasicVertex {
    /// Magenta, the colour of a vertex nobody painted.
    pub const DEFAULT_COLOUR: [f32; 4] = [1.0, 0.0, 1.0, 1.0];

    pub fn new(position: [f32; 3], colour: [f32; 4], tex_coords: [f32; 2]) -> Self {
        Self {
            position,
            colour,
            tex_coords,
        }
    }
}

impl Vertex for BasicVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<BasicVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 7]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub tex_coords: [f32; 2],
}

/// Full-screen quad as a 4 vertex triangle strip. Texture `t` grows downwards.
pub const CANONICAL_QUAD: [QuadVertex; 4] = [
    QuadVertex {
        position: [-1.0, -1.0],
        tex_coords: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, -1.0],
        tex_coords: [1.0, 1.0],
    },
    QuadVertex {
        position: [-1.0, 1.0],
        tex_coords: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        tex_coords: [1.0, 0.0],
    },
];

impl QuadVertex {
    /// Layout of the quad bound at `slot`. The composite pass reads the scene quad copy
    /// from slot 1 at shader locations 2 and 3.
    pub fn desc_at(slot: u32) -> wgpu::VertexBufferLayout<'static> {
        const SLOT_0: [wgpu::VertexAttribute; 2] =
            wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];
        const SLOT_1: [wgpu::VertexAttribute; 2] =
            wgpu::vertex_attr_array![2 => Float32x2, 3 => Float32x2];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: if slot == 0 { &SLOT_0 } else { &SLOT_1 },
        }
    }
}

impl Vertex for QuadVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        Self::desc_at(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_layout_matches_shader_contract() {
        let desc = BasicVertex::desc();
        assert_eq!(desc.array_stride, 36);
        let offsets: Vec<_> = desc.attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 28]);
        assert_eq!(VertexLayout::Basic.stride(), 36);
        assert_eq!(VertexLayout::Quad.stride(), 16);
    }
}
