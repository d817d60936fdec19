//! Render pipelines of the compositor.
//!
//! There is a fixed set of them, one per [`PipelineType`]. All are built once while
//! the [`Context`](crate::context::Context) is created and live as long as the device.

pub mod basic;
pub mod composite;
pub mod video;

use crate::error::InitError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineType {
    /// Scene geometry: basic vertex layout, depth tested, back faces culled.
    Basic,
    /// The camera image quad at the back of the scene target.
    Video,
    /// Camera image, matte and scene blended into the surface.
    Composite,
}

impl PipelineType {
    pub const ALL: [PipelineType; 3] = [
        PipelineType::Basic,
        PipelineType::Video,
        PipelineType::Composite,
    ];
}

/// Bind group layouts shared between the pipelines and the bind groups the
/// compositor creates every frame.
#[derive(Debug)]
pub struct BindGroupLayouts {
    pub frame: wgpu::BindGroupLayout,
    pub material: wgpu::BindGroupLayout,
    pub video: wgpu::BindGroupLayout,
    pub composite: wgpu::BindGroupLayout,
}

impl BindGroupLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            frame: basic::frame_layout(device),
            material: basic::material_layout(device),
            video: video::video_layout(device),
            composite: composite::composite_layout(device),
        }
    }
}

#[derive(Debug)]
pub struct PipelineRegistry {
    basic: wgpu::RenderPipeline,
    video: wgpu::RenderPipeline,
    composite: wgpu::RenderPipeline,
}

impl PipelineRegistry {
    /// Builds every pipeline. Any failure is fatal for the engine.
    pub async fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        layouts: &BindGroupLayouts,
    ) -> Result<Self, InitError> {
        let basic = basic::mk_basic_pipeline(device, &layouts.frame, &layouts.material).await?;
        let video = video::mk_video_pipeline(device, &layouts.video).await?;
        let composite =
            composite::mk_composite_pipeline(device, surface_format, &layouts.composite).await?;
        log::info!("built {} render pipelines", PipelineType::ALL.len());
        Ok(Self {
            basic,
            video,
            composite,
        })
    }

    pub fn get(&self, kind: PipelineType) -> &wgpu::RenderPipeline {
        match kind {
            PipelineType::Basic => &self.basic,
            PipelineType::Video => &self.video,
            PipelineType::Composite => &self.composite,
        }
    }
}
