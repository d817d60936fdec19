//! Engine configuration.
//!
//! Every value the compositor and the recorder would otherwise hard-code lives in
//! [`EngineConfig`]. The [`Context`](crate::context::Context) owns one instance and
//! callers may tweak it between frames, e.g. to change the clear colour or the
//! traversal order.

use std::path::PathBuf;

use instant::Duration;

use crate::error::InitError;

/// Byte size of one [`ModelConstants`](crate::data_structures::uniforms::ModelConstants) entry.
pub const MODEL_CONSTANTS_STRIDE: u64 = 64;

/// Hard ceiling of model-constant entries per frame. The basic shader declares an
/// array of exactly this length.
pub const MAX_INSTANCES: u32 = 256;

/// Order in which the scene pass visits drawable nodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SceneTraversal {
    /// Breadth-first from the root, parents before children.
    #[default]
    BreadthFirst,
    /// Children are drawn before the node that contains them.
    ChildrenFirst,
}

#[derive(Clone, Debug)]
pub struct RecorderConfig {
    /// Minimum distance between two kept samples.
    pub sample_interval: Duration,
    /// Output frame rate of the exported video.
    pub fps: u32,
    /// Directory the container is written to before it is handed to storage.
    pub output_dir: PathBuf,
    pub file_stem: String,
    /// Directory the finished container is moved into.
    pub store_dir: PathBuf,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(40),
            fps: 30,
            output_dir: std::env::temp_dir(),
            file_stem: "capture".to_string(),
            store_dir: PathBuf::from("./recordings"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Number of frames whose GPU work may be pending at once.
    pub max_frames_in_flight: usize,
    /// Advance of the global frame clock per frame.
    pub frame_time_step: Duration,
    /// Delta handed to `Scene::update` per frame.
    pub scene_time_step: Duration,
    pub z_near: f32,
    pub z_far: f32,
    pub clear_colour: wgpu::Color,
    pub traversal: SceneTraversal,
    pub recorder: RecorderConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_frames_in_flight: 1,
            frame_time_step: Duration::from_secs_f64(1.0 / 60.0),
            scene_time_step: Duration::from_secs_f64(1.0 / 15.0),
            z_near: 0.01,
            z_far: 100.0,
            clear_colour: wgpu::Color::TRANSPARENT,
            traversal: SceneTraversal::BreadthFirst,
            recorder: RecorderConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    pub fn with_traversal(mut self, traversal: SceneTraversal) -> Self {
        self.traversal = traversal;
        self
    }

    pub fn with_clip_planes(mut self, z_near: f32, z_far: f32) -> Self {
        self.z_near = z_near;
        self.z_far = z_far;
        self
    }

    pub fn with_recorder(mut self, recorder: RecorderConfig) -> Self {
        self.recorder = recorder;
        self
    }

    /// Size in bytes of the per-frame instance uniform buffer.
    pub fn instance_buffer_size(&self) -> u64 {
        u64::from(MAX_INSTANCES) * MODEL_CONSTANTS_STRIDE
    }

    pub fn validate(&self) -> Result<(), InitError> {
        if self.max_frames_in_flight == 0 {
            return Err(InitError::Config(
                "max_frames_in_flight must be at least 1".to_string(),
            ));
        }
        if !(self.z_near > 0.0 && self.z_far > self.z_near) {
            return Err(InitError::Config(format!(
                "clip planes must satisfy 0 < z_near < z_far, got {} and {}",
                self.z_near, self.z_far
            )));
        }
        if self.recorder.fps == 0 {
            return Err(InitError::Config("recorder fps must be non-zero".to_string()));
        }
        Ok(())
    }
}
