use std::num::NonZeroU64;

use crate::{
    data_structures::{uniforms::CompositeUniforms, vertex::QuadVertex},
    error::InitError,
    pipelines::{
        basic::{DepthTest, compile_shader, mk_render_pipeline, triangle_strip},
        video::{display_transform_entry, plane_entry},
    },
};

pub const DISPLAY_TRANSFORM_BINDING: u32 = 0;
pub const COMPOSITE_UNIFORMS_BINDING: u32 = 1;
pub const LUMA_BINDING: u32 = 2;
pub const CHROMA_BINDING: u32 = 3;
pub const SCENE_COLOUR_BINDING: u32 = 4;
pub const SCENE_DEPTH_BINDING: u32 = 5;
pub const ALPHA_MATTE_BINDING: u32 = 6;
pub const DILATED_DEPTH_BINDING: u32 = 7;
pub const SAMPLER_BINDING: u32 = 8;

pub fn composite_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("composite_bind_group_layout"),
        entries: &[
            display_transform_entry(DISPLAY_TRANSFORM_BINDING),
            wgpu::BindGroupLayoutEntry {
                binding: COMPOSITE_UNIFORMS_BINDING,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(
                        std::mem::size_of::<CompositeUniforms>() as u64
                    ),
                },
                count: None,
            },
            plane_entry(LUMA_BINDING),
            plane_entry(CHROMA_BINDING),
            plane_entry(SCENE_COLOUR_BINDING),
            wgpu::BindGroupLayoutEntry {
                binding: SCENE_DEPTH_BINDING,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Depth,
                },
                count: None,
            },
            plane_entry(ALPHA_MATTE_BINDING),
            // R32Float is not filterable without an extra device feature; read with textureLoad
            wgpu::BindGroupLayoutEntry {
                binding: DILATED_DEPTH_BINDING,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: SAMPLER_BINDING,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

/// Blends camera image, matte and scene into the presented frame.
///
/// Vertex buffer 0 is the canonical quad used for the camera image and the matte,
/// vertex buffer 1 the scene quad copy. Nothing is culled so the strip works with
/// either winding after the display transform.
pub async fn mk_composite_pipeline(
    device: &wgpu::Device,
    surface_format: wgpu::TextureFormat,
    composite_layout: &wgpu::BindGroupLayout,
) -> Result<wgpu::RenderPipeline, InitError> {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Composite Pipeline Layout"),
        bind_group_layouts: &[composite_layout],
        immediate_size: 0,
    });
    let shader = compile_shader(
        device,
        "composite",
        wgpu::ShaderModuleDescriptor {
            label: Some("Composite Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("composite.wgsl").into()),
        },
    )
    .await?;

    Ok(mk_render_pipeline(
        device,
        "Composite Pipeline",
        &layout,
        surface_format,
        None,
        DepthTest::Always,
        triangle_strip(None),
        &[QuadVertex::desc_at(0), QuadVertex::desc_at(1)],
        &shader,
    ))
}
