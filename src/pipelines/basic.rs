use std::num::NonZeroU64;

use crate::{
    config::{MAX_INSTANCES, MODEL_CONSTANTS_STRIDE},
    data_structures::{
        texture::Texture,
        uniforms::{
            FRAME_UNIFORMS_BINDING, FrameUniforms, MATERIAL_CHECK_BINDING,
            MATERIAL_SAMPLER_BINDING, MATERIAL_TEXTURE_BINDING, MODEL_CONSTANTS_BINDING,
            MaterialCheck,
        },
        vertex::{BasicVertex, Vertex},
    },
    error::InitError,
};

/// Depth behaviour of a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthTest {
    /// Nearer fragments win and write their depth.
    Less,
    /// Everything passes, nothing is written. Used for full-screen quads.
    Always,
}

impl DepthTest {
    fn state(self) -> wgpu::DepthStencilState {
        let (depth_compare, depth_write_enabled) = match self {
            DepthTest::Less => (wgpu::CompareFunction::Less, true),
            DepthTest::Always => (wgpu::CompareFunction::Always, false),
        };
        wgpu::DepthStencilState {
            format: Texture::DEPTH_FORMAT,
            depth_write_enabled,
            depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }
    }
}

/// Layout of group 0 of the basic pipeline: frame uniforms and the instance block.
pub fn frame_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("frame_bind_group_layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: FRAME_UNIFORMS_BINDING,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(std::mem::size_of::<FrameUniforms>() as u64),
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: MODEL_CONSTANTS_BINDING,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(
                        u64::from(MAX_INSTANCES) * MODEL_CONSTANTS_STRIDE,
                    ),
                },
                count: None,
            },
        ],
    })
}

/// Layout of group 1 of the basic pipeline: texture, material-check flags, sampler.
pub fn material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("material_bind_group_layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: MATERIAL_TEXTURE_BINDING,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: MATERIAL_CHECK_BINDING,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(std::mem::size_of::<MaterialCheck>() as u64),
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: MATERIAL_SAMPLER_BINDING,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

pub async fn mk_basic_pipeline(
    device: &wgpu::Device,
    frame_layout: &wgpu::BindGroupLayout,
    material_layout: &wgpu::BindGroupLayout,
) -> Result<wgpu::RenderPipeline, InitError> {
    let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Basic Pipeline Layout"),
        bind_group_layouts: &[frame_layout, material_layout],
        immediate_size: 0,
    });

    let shader = compile_shader(
        device,
        "basic",
        wgpu::ShaderModuleDescriptor {
            label: Some("Basic Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("basic.wgsl").into()),
        },
    )
    .await?;

    Ok(mk_render_pipeline(
        device,
        "Basic Pipeline",
        &render_pipeline_layout,
        Texture::SCENE_COLOUR_FORMAT,
        Some(wgpu::BlendState::ALPHA_BLENDING),
        DepthTest::Less,
        triangle_list(Some(wgpu::Face::Back)),
        &[BasicVertex::desc()],
        &shader,
    ))
}

/// Compiles a WGSL module and turns compiler errors into a fatal init error.
pub async fn compile_shader(
    device: &wgpu::Device,
    name: &'static str,
    shader: wgpu::ShaderModuleDescriptor<'_>,
) -> Result<wgpu::ShaderModule, InitError> {
    let module = device.create_shader_module(shader);
    let info = module.get_compilation_info().await;
    let errors: Vec<String> = info
        .messages
        .iter()
        .filter(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error))
        .map(|m| m.message.clone())
        .collect();
    if !errors.is_empty() {
        return Err(InitError::Pipeline {
            name,
            reason: errors.join("; "),
        });
    }
    for warning in info
        .messages
        .iter()
        .filter(|m| matches!(m.message_type, wgpu::CompilationMessageType::Warning))
    {
        log::warn!("{} shader: {}", name, warning.message);
    }
    Ok(module)
}

pub fn triangle_list(cull_mode: Option<wgpu::Face>) -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        topology: wgpu::PrimitiveTopology::TriangleList,
        strip_index_format: None,
        front_face: wgpu::FrontFace::Ccw,
        cull_mode,
        polygon_mode: wgpu::PolygonMode::Fill,
        unclipped_depth: false,
        conservative: false,
    }
}

pub fn triangle_strip(cull_mode: Option<wgpu::Face>) -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        topology: wgpu::PrimitiveTopology::TriangleStrip,
        ..triangle_list(cull_mode)
    }
}

#[allow(clippy::too_many_arguments)]
pub fn mk_render_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
    depth: DepthTest,
    primitive: wgpu::PrimitiveState,
    vertex_layouts: &[wgpu::VertexBufferLayout],
    shader: &wgpu::ShaderModule,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: vertex_layouts,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive,
        depth_stencil: Some(depth.state()),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview_mask: None,
    })
}
