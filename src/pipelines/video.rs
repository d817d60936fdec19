use std::num::NonZeroU64;

use crate::{
    data_structures::{
        texture::Texture,
        uniforms::DisplayTransformUniform,
        vertex::QuadVertex,
    },
    error::InitError,
    pipelines::basic::{DepthTest, compile_shader, mk_render_pipeline, triangle_strip},
};

pub const DISPLAY_TRANSFORM_BINDING: u32 = 0;
pub const LUMA_BINDING: u32 = 1;
pub const CHROMA_BINDING: u32 = 2;
pub const SAMPLER_BINDING: u32 = 3;

/// Camera image quad: display transform, the two planes of the captured image and a
/// sampler.
pub fn video_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("video_bind_group_layout"),
        entries: &[
            display_transform_entry(DISPLAY_TRANSFORM_BINDING),
            plane_entry(LUMA_BINDING),
            plane_entry(CHROMA_BINDING),
            wgpu::BindGroupLayoutEntry {
                binding: SAMPLER_BINDING,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

pub(crate) fn display_transform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(
                std::mem::size_of::<DisplayTransformUniform>() as u64
            ),
        },
        count: None,
    }
}

/// A filterable single texture sampled in the fragment stage.
pub(crate) fn plane_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
        },
        count: None,
    }
}

/// Draws the captured camera image into the scene target before any geometry.
/// It never writes depth, so scene geometry always lands in front of it.
pub async fn mk_video_pipeline(
    device: &wgpu::Device,
    video_layout: &wgpu::BindGroupLayout,
) -> Result<wgpu::RenderPipeline, InitError> {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Video Pipeline Layout"),
        bind_group_layouts: &[video_layout],
        immediate_size: 0,
    });
    let shader = compile_shader(
        device,
        "video",
        wgpu::ShaderModuleDescriptor {
            label: Some("Video Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("video.wgsl").into()),
        },
    )
    .await?;

    Ok(mk_render_pipeline(
        device,
        "Video Pipeline",
        &layout,
        Texture::SCENE_COLOUR_FORMAT,
        None,
        DepthTest::Always,
        triangle_strip(Some(wgpu::Face::Back)),
        &[QuadVertex::desc_at(0)],
        &shader,
    ))
}
