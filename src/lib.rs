//! ar-ngin
//!
//! An augmented-reality frame compositor built on `wgpu`. Every frame the camera
//! image of a tracking session is drawn behind a scene graph of virtual geometry, and
//! a composite pass blends both into the presented frame, letting real-world
//! foreground subjects (described by an alpha matte and a dilated depth map) occlude
//! virtual content that lies behind them.
//!
//! High-level modules
//! - `camera`: projection state attached to a point-of-view node
//! - `compositor`: the per-frame state machine, frame planning and GPU readback
//! - `config`: engine tunables
//! - `context`: device, queue, surface and the shared GPU objects
//! - `data_structures`: scene graph, transforms, meshes, vertices and uniform blocks
//! - `error`: error types and frame skip reasons
//! - `flow`: a `winit` display loop driving the compositor
//! - `pipelines`: render pipelines and their bind group layouts
//! - `recorder`: frame recording and video export
//! - `resources`: asset loading and buffer pooling
//! - `tracking`: interfaces to the tracking session and the matte generator
//!

pub mod camera;
pub mod compositor;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod flow;
pub mod pipelines;
pub mod recorder;
pub mod resources;
pub mod tracking;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use compositor::{FrameCompositor, FrameStats};
pub use config::{EngineConfig, RecorderConfig, SceneTraversal};
pub use context::Context;
pub use data_structures::{
    geometry::Geometry,
    scene_graph::{Node, NodeId, Scene},
    transform::Transform,
};
pub use error::{FrameSkip, InitError};
pub use recorder::FrameRecorder;
pub use wgpu;
pub use winit;
