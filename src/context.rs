use std::sync::Arc;

use winit::window::Window;

use crate::{
    config::EngineConfig,
    data_structures::texture::{self, Texture},
    error::{FrameSkip, InitError},
    pipelines::{BindGroupLayouts, PipelineRegistry},
    resources::{
        pool::{ResourcePool, readback_buffer_pool, uniform_buffer_pool},
        texture::TextureLibrary,
    },
};

/// 1x1 stand-ins bound whenever the real texture is not available.
#[derive(Debug)]
pub struct Placeholders {
    /// Bound by untextured geometry.
    pub texture: Texture,
    /// No pixel belongs to a foreground subject.
    pub alpha_matte: Texture,
    /// Foreground infinitely far away.
    pub matte_depth: Texture,
    pub luma: Texture,
    pub chroma: Texture,
}

impl Placeholders {
    fn new(device: &wgpu::Device, queue: &wgpu::Queue, z_far: f32) -> Self {
        Self {
            texture: Texture::create_placeholder(
                device,
                queue,
                wgpu::TextureFormat::Rgba8Unorm,
                &[255, 255, 255, 255],
                "placeholder_texture",
            ),
            alpha_matte: Texture::create_placeholder(
                device,
                queue,
                Texture::ALPHA_MATTE_FORMAT,
                &[0],
                "placeholder_alpha_matte",
            ),
            matte_depth: Texture::create_placeholder(
                device,
                queue,
                Texture::MATTE_DEPTH_FORMAT,
                &z_far.to_ne_bytes(),
                "placeholder_matte_depth",
            ),
            // black in full range YCbCr
            luma: Texture::create_placeholder(
                device,
                queue,
                Texture::LUMA_FORMAT,
                &[0],
                "placeholder_luma",
            ),
            chroma: Texture::create_placeholder(
                device,
                queue,
                Texture::CHROMA_FORMAT,
                &[128, 128],
                "placeholder_chroma",
            ),
        }
    }
}

/// Where the composite pass lands.
pub enum RenderTarget {
    Surface(wgpu::SurfaceTexture),
    /// Headless rendering, e.g. for golden image tests.
    Offscreen(wgpu::Texture),
}

impl RenderTarget {
    pub fn texture(&self) -> &wgpu::Texture {
        match self {
            RenderTarget::Surface(frame) => &frame.texture,
            RenderTarget::Offscreen(texture) => texture,
        }
    }

    pub fn present(self) {
        if let RenderTarget::Surface(frame) = self {
            frame.present();
        }
    }
}

/// Everything that is created once per device and shared by every frame: the GPU
/// handles, pipelines, pools, placeholders and the texture library.
#[derive(Debug)]
pub struct Context {
    pub(crate) window: Option<Arc<Window>>,
    pub(crate) depth_texture: texture::Texture,
    pub surface: Option<wgpu::Surface<'static>>,
    offscreen: Option<wgpu::Texture>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub engine: EngineConfig,
    pub layouts: BindGroupLayouts,
    pub pipelines: PipelineRegistry,
    pub instance_pool: Arc<ResourcePool<wgpu::Buffer>>,
    pub readback_pool: Arc<ResourcePool<wgpu::Buffer>>,
    pub sampler: wgpu::Sampler,
    pub placeholders: Placeholders,
    pub textures: TextureLibrary,
}

impl Context {
    pub async fn new(window: Arc<Window>, engine: EngineConfig) -> Result<Self, InitError> {
        engine.validate()?;
        let size = window.inner_size();

        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;
        let (device, queue) = request_device(&adapter).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        // camera image and scene are display-referred, prefer a surface that stores
        // them unchanged
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or(InitError::NoSurfaceFormat)?;
        let config = wgpu::SurfaceConfiguration {
            // COPY_SRC lets the recorder read the presented frame back
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | (surface_caps.usages & wgpu::TextureUsages::COPY_SRC),
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Self::assemble(device, queue, config, Some(window), Some(surface), None, engine).await
    }

    /// A context without a window. Frames are composited into an offscreen texture of
    /// `size` that can be read back with [`Context::offscreen_target`].
    pub async fn headless(size: [u32; 2], engine: EngineConfig) -> Result<Self, InitError> {
        engine.validate()?;
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await?;
        let (device, queue) = request_device(&adapter).await?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            format: wgpu::TextureFormat::Rgba8Unorm,
            width: size[0].max(1),
            height: size[1].max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        let offscreen = create_offscreen(&device, &config);
        Self::assemble(device, queue, config, None, None, Some(offscreen), engine).await
    }

    async fn assemble(
        device: wgpu::Device,
        queue: wgpu::Queue,
        config: wgpu::SurfaceConfiguration,
        window: Option<Arc<Window>>,
        surface: Option<wgpu::Surface<'static>>,
        offscreen: Option<wgpu::Texture>,
        engine: EngineConfig,
    ) -> Result<Self, InitError> {
        let layouts = BindGroupLayouts::new(&device);
        let pipelines = PipelineRegistry::new(&device, config.format, &layouts).await?;

        let depth_texture = Texture::create_depth_texture(
            &device,
            [config.width, config.height],
            "composite_depth_texture",
        );
        let placeholders = Placeholders::new(&device, &queue, engine.z_far);

        Ok(Self {
            window,
            depth_texture,
            surface,
            offscreen,
            instance_pool: Arc::new(uniform_buffer_pool(&device)),
            readback_pool: Arc::new(readback_buffer_pool(&device)),
            sampler: texture::create_default_sampler(&device),
            placeholders,
            textures: TextureLibrary::new(),
            layouts,
            pipelines,
            device,
            queue,
            config,
            engine,
        })
    }

    pub fn window(&self) -> Option<&Arc<Window>> {
        self.window.as_ref()
    }

    pub fn size(&self) -> [u32; 2] {
        [self.config.width, self.config.height]
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        if let Some(surface) = &self.surface {
            surface.configure(&self.device, &self.config);
        }
        if self.offscreen.is_some() {
            self.offscreen = Some(create_offscreen(&self.device, &self.config));
        }
        self.depth_texture =
            Texture::create_depth_texture(&self.device, [width, height], "composite_depth_texture");
    }

    /// Gets the texture the composite pass renders into. A lost or outdated surface is
    /// reconfigured and the frame skipped.
    pub fn acquire_target(&mut self) -> Result<RenderTarget, FrameSkip> {
        if let Some(offscreen) = &self.offscreen {
            return Ok(RenderTarget::Offscreen(offscreen.clone()));
        }
        let Some(surface) = &self.surface else {
            return Err(FrameSkip::NoRenderTarget);
        };
        match surface.get_current_texture() {
            Ok(frame) => Ok(RenderTarget::Surface(frame)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("surface lost, reconfiguring");
                let [width, height] = self.size();
                self.resize(width, height);
                Err(FrameSkip::NoRenderTarget)
            }
            Err(e) => {
                log::warn!("failed to acquire the surface texture: {}", e);
                Err(FrameSkip::NoRenderTarget)
            }
        }
    }

    /// The headless target, if this context has one.
    pub fn offscreen_target(&self) -> Option<&wgpu::Texture> {
        self.offscreen.as_ref()
    }

    pub fn has_render_target(&self) -> bool {
        (self.surface.is_some() || self.offscreen.is_some())
            && self.config.width > 0
            && self.config.height > 0
    }
}

async fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue), InitError> {
    log::info!("device and queue");
    Ok(adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("ar-ngin device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        })
        .await?)
}

fn create_offscreen(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen_target"),
        size: wgpu::Extent3d {
            width: config.width,
            height: config.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: config.format,
        usage: config.usage,
        view_formats: &[],
    })
}
