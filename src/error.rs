//! Error taxonomy of the engine.
//!
//! Errors are grouped by how far they reach:
//!
//! - [`InitError`] is fatal. The engine cannot render without a device, a surface
//!   or its compiled pipelines, so callers are expected to abort with the diagnostic.
//! - [`FrameSkip`] is not an error in the usual sense. It names the missing input
//!   that caused a single frame to be dropped; the display loop keeps running.
//! - [`ResourceError`] covers textures, models and meshes that failed to load or
//!   build. Lookups degrade to an explicit absent value instead of panicking.
//! - [`RecorderError`] and [`ExportError`] belong to the recording sink and never
//!   touch the recorder state machine.

use std::path::PathBuf;

use thiserror::Error;

/// Failure while bringing up the GPU context. Always fatal.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to create a rendering surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("no compatible GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to open the GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("surface reports no supported texture formats")]
    NoSurfaceFormat,
    #[error("failed to build the {name} pipeline: {reason}")]
    Pipeline { name: &'static str, reason: String },
    #[error("invalid engine configuration: {0}")]
    Config(String),
}

/// The reason a frame was dropped without submitting any GPU work.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum FrameSkip {
    #[error("no scene")]
    NoScene,
    #[error("no point-of-view node")]
    NoPointOfView,
    #[error("point-of-view node has no camera")]
    NoCamera,
    #[error("no render target available")]
    NoRenderTarget,
    /// All in-flight slots are still owned by the GPU.
    #[error("all in-flight frame slots are busy")]
    InFlightLimit,
}

/// A texture, model or mesh could not be produced.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("texture '{0}' is not loaded")]
    MissingTexture(String),
    #[error("failed to decode texture '{name}': {source}")]
    Texture {
        name: String,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to load model '{name}': {source}")]
    Model {
        name: String,
        #[source]
        source: tobj::LoadError,
    },
    #[error("invalid plane geometry: {0}")]
    InvalidPlane(String),
    #[error("vertex buffer holds {bytes} bytes, expected {vertex_count} vertices of {stride} bytes")]
    VertexLength {
        bytes: usize,
        vertex_count: u32,
        stride: u64,
    },
}

/// Misuse of the recorder state machine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecorderError {
    #[error("the recorder is already recording")]
    AlreadyRecording,
    #[error("the recorder is not recording")]
    NotRecording,
}

/// Failure while turning recorded samples into a video file.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to prepare output file '{path}': {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open the video writer: {0}")]
    Writer(String),
    #[error("failed to convert sample {index} to a pixel buffer: {reason}")]
    PixelConversion { index: usize, reason: String },
    #[error("failed to append sample {index}: {reason}")]
    Append { index: usize, reason: String },
    #[error("failed to finalize the video container: {0}")]
    Finalize(String),
    #[error("failed to hand '{path}' to storage: {reason}")]
    Store { path: PathBuf, reason: String },
}
