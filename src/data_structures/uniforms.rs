//! Constant blocks shared with the shaders.
//!
//! Binding slots are part of the shader contract and must not move:
//! frame uniforms at group 0 binding 1, model constants at group 0 binding 2 and the
//! material-check flags at group 1 binding 1.

use cgmath::{Matrix3, Matrix4};

pub const FRAME_UNIFORMS_BINDING: u32 = 1;
pub const MODEL_CONSTANTS_BINDING: u32 = 2;
pub const MATERIAL_TEXTURE_BINDING: u32 = 0;
pub const MATERIAL_CHECK_BINDING: u32 = 1;
pub const MATERIAL_SAMPLER_BINDING: u32 = 2;

/// Written once per frame before the scene traversal.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub view: [[f32; 4]; 4],
    pub view_projection: [[f32; 4]; 4],
}

impl FrameUniforms {
    pub fn new(view: Matrix4<f32>, projection: Matrix4<f32>) -> Self {
        Self {
            view: view.into(),
            view_projection: (projection * view).into(),
        }
    }
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self::new(
            <Matrix4<f32> as cgmath::SquareMatrix>::identity(),
            <Matrix4<f32> as cgmath::SquareMatrix>::identity(),
        )
    }
}

/// One entry of the per-frame instance block, 64 bytes.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelConstants {
    pub model: [[f32; 4]; 4],
}

impl From<Matrix4<f32>> for ModelConstants {
    fn from(model: Matrix4<f32>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialCheck {
    pub use_texture: u32,
    // uniform blocks are 16 byte aligned
    _padding: [u32; 3],
}

impl MaterialCheck {
    pub fn new(use_texture: bool) -> Self {
        Self {
            use_texture: use_texture as u32,
            _padding: [0; 3],
        }
    }

    pub fn uses_texture(&self) -> bool {
        self.use_texture != 0
    }
}

/// Texture-coordinate transform of the video and composite quads, as a WGSL
/// `mat3x3<f32>` (every column padded to 16 bytes).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DisplayTransformUniform {
    pub columns: [[f32; 4]; 3],
}

impl From<Matrix3<f32>> for DisplayTransformUniform {
    fn from(m: Matrix3<f32>) -> Self {
        Self {
            columns: [
                [m.x.x, m.x.y, m.x.z, 0.0],
                [m.y.x, m.y.y, m.y.z, 0.0],
                [m.z.x, m.z.y, m.z.z, 0.0],
            ],
        }
    }
}

/// Fragment-side constants of the composite pass. The projection converts the
/// metric dilated depth of the matte into the scene's NDC depth.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CompositeUniforms {
    pub projection: [[f32; 4]; 4],
}

impl From<Matrix4<f32>> for CompositeUniforms {
    fn from(projection: Matrix4<f32>) -> Self {
        Self {
            projection: projection.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_sizes_match_shader_contract() {
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 128);
        assert_eq!(
            std::mem::size_of::<ModelConstants>() as u64,
            crate::config::MODEL_CONSTANTS_STRIDE
        );
        assert_eq!(std::mem::size_of::<MaterialCheck>(), 16);
        assert_eq!(std::mem::size_of::<DisplayTransformUniform>(), 48);
        assert_eq!(std::mem::size_of::<CompositeUniforms>(), 64);
    }
}
