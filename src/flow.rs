//! Display loop.
//!
//! [`run`] opens a window, builds the [`Context`] and the [`FrameCompositor`] and then
//! draws one frame per redraw:
//!
//! 1. apply the anchor events the tracking session reported since the last frame
//! 2. hand the session's current frame to the compositor
//! 3. draw; a skipped frame is logged and the loop keeps going
//! 4. request the next redraw
//!
//! Pressing `R` toggles recording. Exports started by stopping a recording run in the
//! background; the loop waits for them when the window closes.

use std::{pin::Pin, sync::Arc};

use instant::Instant;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::{
    compositor::FrameCompositor,
    config::EngineConfig,
    context::Context,
    data_structures::scene_graph::{NodeId, Scene},
    recorder::ExportHandle,
    resources::texture::TextureLibrary,
    tracking::{MatteGenerator, TrackingSession},
};

/// What a scene builder gets to work with. `Device` and `Queue` are cheap handles to
/// the ones the engine renders with.
#[derive(Clone, Debug)]
pub struct InitContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub size: [u32; 2],
    pub config: EngineConfig,
}

impl From<&Context> for InitContext {
    fn from(ctx: &Context) -> Self {
        Self {
            device: ctx.device.clone(),
            queue: ctx.queue.clone(),
            size: ctx.size(),
            config: ctx.engine.clone(),
        }
    }
}

/// The scene a builder hands to the display loop.
pub struct SceneSetup {
    pub scene: Scene,
    /// Node the scene is seen from. Without one every frame is skipped.
    pub point_of_view: Option<NodeId>,
    /// Textures geometries refer to by key.
    pub textures: TextureLibrary,
    pub matte_generator: Option<Box<dyn MatteGenerator>>,
}

impl SceneSetup {
    pub fn new(scene: Scene, point_of_view: Option<NodeId>) -> Self {
        Self {
            scene,
            point_of_view,
            textures: TextureLibrary::new(),
            matte_generator: None,
        }
    }

    pub fn with_textures(mut self, textures: TextureLibrary) -> Self {
        self.textures = textures;
        self
    }

    pub fn with_matte_generator(mut self, generator: Box<dyn MatteGenerator>) -> Self {
        self.matte_generator = Some(generator);
        self
    }
}

/// Builds the scene once the GPU is up. Loading models and textures is async, so the
/// builder returns a future that the loop resolves before the first frame.
pub type SceneBuilder =
    Box<dyn FnOnce(InitContext) -> Pin<Box<dyn Future<Output = anyhow::Result<SceneSetup>>>>>;

struct AppState {
    ctx: Context,
    compositor: FrameCompositor,
    scene: Scene,
    point_of_view: Option<NodeId>,
}

impl AppState {
    fn toggle_recording(&mut self, exports: &mut Vec<ExportHandle>) {
        let recorder = self.compositor.recorder();
        if !recorder.is_recording() {
            if let Err(e) = recorder.start_recording() {
                log::warn!("{}", e);
            }
            return;
        }
        match self.compositor.stop_recording(&self.ctx) {
            Ok(Some(handle)) => exports.push(handle),
            Ok(None) => log::info!("nothing was recorded"),
            Err(e) => log::warn!("{}", e),
        }
    }
}

struct App<T: TrackingSession> {
    async_runtime: tokio::runtime::Runtime,
    session: T,
    config: EngineConfig,
    builder: Option<SceneBuilder>,
    state: Option<AppState>,
    exports: Vec<ExportHandle>,
    failure: Option<anyhow::Error>,
    last_frame: Instant,
}

impl<T: TrackingSession> App<T> {
    fn new(session: T, config: EngineConfig, builder: SceneBuilder) -> anyhow::Result<Self> {
        let async_runtime = tokio::runtime::Runtime::new()?;
        Ok(Self {
            async_runtime,
            session,
            config,
            builder: Some(builder),
            state: None,
            exports: Vec::new(),
            failure: None,
            last_frame: Instant::now(),
        })
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState> {
        let window = Arc::new(event_loop.create_window(
            Window::default_attributes().with_title("ar-ngin"),
        )?);
        let builder = self
            .builder
            .take()
            .ok_or_else(|| anyhow::anyhow!("the scene was already built"))?;
        let config = self.config.clone();

        self.async_runtime.block_on(async move {
            let mut ctx = Context::new(window, config).await?;
            let setup = builder(InitContext::from(&ctx)).await?;
            ctx.textures = setup.textures;
            let mut compositor = FrameCompositor::new(&ctx);
            if let Some(generator) = setup.matte_generator {
                compositor = compositor.with_matte_generator(generator);
            }
            log::info!(
                "display loop ready: {} nodes, {} frame(s) in flight",
                setup.scene.len(),
                ctx.engine.max_frames_in_flight
            );
            Ok::<_, anyhow::Error>(AppState {
                ctx,
                compositor,
                scene: setup.scene,
                point_of_view: setup.point_of_view,
            })
        })
    }

    fn redraw(&mut self) {
        let Some(state) = &mut self.state else {
            return;
        };
        for event in self.session.poll_anchor_events() {
            state.scene.apply_anchor_event(event);
        }
        state
            .compositor
            .set_tracking_frame(self.session.current_frame());

        // skipped frames are logged by the compositor
        let drawn = state.compositor.draw(
            &mut state.ctx,
            Some(&mut state.scene),
            state.point_of_view,
        );
        if let Ok(stats) = drawn {
            if stats.dropped > 0 {
                log::warn!(
                    "frame {}: {} node(s) did not fit into the instance block",
                    stats.frame_number,
                    stats.dropped
                );
            }
        }
        log::trace!("frame time {:?}", self.last_frame.elapsed());
        self.last_frame = Instant::now();

        self.exports.retain(|handle| !handle.is_finished());
        if let Some(window) = state.ctx.window() {
            window.request_redraw();
        }
    }
}

impl<T: TrackingSession> ApplicationHandler for App<T> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        match self.init(event_loop) {
            Ok(state) => {
                if let Some(window) = state.ctx.window() {
                    window.request_redraw();
                }
                self.state = Some(state);
            }
            Err(e) => {
                log::error!("cannot start the display loop: {:#}", e);
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    state.ctx.resize(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::KeyR),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                if let Some(state) = &mut self.state {
                    state.toggle_recording(&mut self.exports);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = self.state.as_mut() {
            if state.compositor.recorder().is_recording() {
                if let Ok(Some(handle)) = state.compositor.stop_recording(&state.ctx) {
                    self.exports.push(handle);
                }
            }
        }
        for handle in self.exports.drain(..) {
            match handle.join() {
                Ok(Some(path)) => log::info!("recording saved to {}", path.display()),
                Ok(None) => {}
                Err(e) => log::error!("export failed: {}", e),
            }
        }
    }
}

/// Runs the display loop with the default [`EngineConfig`].
pub fn run<T: TrackingSession + 'static>(session: T, scene_builder: SceneBuilder) -> anyhow::Result<()> {
    run_with_config(session, EngineConfig::default(), scene_builder)
}

/// Runs the display loop until the window is closed. Returns the error that stopped
/// the engine from starting, if any.
pub fn run_with_config<T: TrackingSession + 'static>(
    session: T,
    config: EngineConfig,
    scene_builder: SceneBuilder,
) -> anyhow::Result<()> {
    if let Err(e) = env_logger::try_init() {
        println!("Warning: Could not initialize logger: {}", e);
    }

    let event_loop = EventLoop::new()?;
    let mut app = App::new(session, config, scene_builder)?;
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
