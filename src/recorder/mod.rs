//! Recording of presented frames.
//!
//! [`FrameRecorder`] is a two-state machine, idle or recording. While recording it
//! keeps a decimated copy of the frames the compositor reads back; stopping hands the
//! kept samples to a background export thread. Export failures are logged and
//! reported through the [`ExportHandle`] but never touch the recorder state.

pub mod export;

use std::{
    path::PathBuf,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
    thread::JoinHandle,
};

use image::RgbaImage;
use instant::Duration;

use crate::{
    config::RecorderConfig,
    error::{ExportError, RecorderError},
    recorder::export::{DirectoryStore, FfmpegSink, MediaStore, VideoSink},
};

/// A presented frame and the frame-clock time it was shown at.
#[derive(Clone, Debug)]
pub struct FrameSample {
    pub image: RgbaImage,
    pub timestamp: Duration,
}

#[derive(Debug, Default)]
enum RecorderState {
    #[default]
    Idle,
    Recording {
        samples: Vec<FrameSample>,
        last_kept: Option<Duration>,
    },
}

/// A running export. Dropping it detaches the thread.
#[derive(Debug)]
pub struct ExportHandle {
    thread: JoinHandle<Result<Option<PathBuf>, ExportError>>,
}

impl ExportHandle {
    /// Waits for the export and returns where the recording was stored.
    pub fn join(self) -> Result<Option<PathBuf>, ExportError> {
        self.thread
            .join()
            .unwrap_or_else(|_| Err(ExportError::Finalize("export thread panicked".to_string())))
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

struct Shared {
    state: Mutex<RecorderState>,
    /// Sequence number of the next export.
    next_export: AtomicU64,
    config: RecorderConfig,
    sink: Arc<dyn VideoSink>,
    store: Arc<dyn MediaStore>,
}

/// Cheap to clone; clones share one state.
#[derive(Clone)]
pub struct FrameRecorder {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for FrameRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRecorder")
            .field("recording", &self.is_recording())
            .field("samples", &self.sample_count())
            .finish()
    }
}

impl FrameRecorder {
    /// A recorder exporting through `ffmpeg` into `config.store_dir`.
    pub fn new(config: RecorderConfig) -> Self {
        let store = DirectoryStore::new(config.store_dir.clone());
        Self::with_backends(config, Arc::new(FfmpegSink), Arc::new(store))
    }

    pub fn with_backends(
        config: RecorderConfig,
        sink: Arc<dyn VideoSink>,
        store: Arc<dyn MediaStore>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RecorderState::Idle),
                next_export: AtomicU64::new(0),
                config,
                sink,
                store,
            }),
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.shared.config
    }

    pub fn is_recording(&self) -> bool {
        matches!(*self.lock(), RecorderState::Recording { .. })
    }

    pub fn sample_count(&self) -> usize {
        match &*self.lock() {
            RecorderState::Recording { samples, .. } => samples.len(),
            RecorderState::Idle => 0,
        }
    }

    pub fn start_recording(&self) -> Result<(), RecorderError> {
        let mut state = self.lock();
        if matches!(*state, RecorderState::Recording { .. }) {
            return Err(RecorderError::AlreadyRecording);
        }
        *state = RecorderState::Recording {
            samples: Vec::new(),
            last_kept: None,
        };
        log::info!("recording started");
        Ok(())
    }

    /// Offers a presented frame. Returns whether it was kept: frames are dropped while
    /// idle and when they follow the last kept one by less than the sample interval.
    pub fn submit_frame(&self, image: RgbaImage, timestamp: Duration) -> bool {
        let interval = self.shared.config.sample_interval;
        let mut state = self.lock();
        let RecorderState::Recording { samples, last_kept } = &mut *state else {
            return false;
        };
        let due = match last_kept {
            None => true,
            Some(last) => timestamp
                .checked_sub(*last)
                .is_some_and(|elapsed| elapsed >= interval),
        };
        if due {
            samples.push(FrameSample { image, timestamp });
            *last_kept = Some(timestamp);
        }
        due
    }

    /// Stops recording and starts exporting the kept samples in the background.
    ///
    /// Returns `Ok(None)` when nothing was kept; no file is created then.
    pub fn stop_recording(&self) -> Result<Option<ExportHandle>, RecorderError> {
        let samples = match std::mem::take(&mut *self.lock()) {
            RecorderState::Recording { samples, .. } => samples,
            RecorderState::Idle => return Err(RecorderError::NotRecording),
        };
        log::info!("recording stopped with {} samples", samples.len());
        if samples.is_empty() {
            return Ok(None);
        }

        let sequence = self.shared.next_export.fetch_add(1, Ordering::Relaxed);
        let shared = self.shared.clone();
        let spawned = std::thread::Builder::new()
            .name("ar-ngin-export".to_string())
            .spawn(move || {
                let result = export::export(
                    samples,
                    &shared.config,
                    sequence,
                    shared.sink.as_ref(),
                    shared.store.as_ref(),
                );
                if let Err(e) = &result {
                    log::error!("export failed: {}", e);
                }
                result
            });
        match spawned {
            Ok(thread) => Ok(Some(ExportHandle { thread })),
            Err(e) => {
                log::error!("failed to start the export thread: {}", e);
                Ok(None)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> FrameRecorder {
        FrameRecorder::new(RecorderConfig::default())
    }

    #[test]
    fn idle_recorder_drops_frames() {
        let recorder = recorder();
        assert!(!recorder.submit_frame(RgbaImage::new(1, 1), Duration::ZERO));
        assert_eq!(recorder.sample_count(), 0);
    }

    #[test]
    fn state_transitions_are_checked() {
        let recorder = recorder();
        assert_eq!(
            recorder.stop_recording().err(),
            Some(RecorderError::NotRecording)
        );
        recorder.start_recording().unwrap();
        assert_eq!(
            recorder.start_recording(),
            Err(RecorderError::AlreadyRecording)
        );
        assert!(recorder.is_recording());
    }

    #[test]
    fn frames_going_backwards_are_dropped() {
        let recorder = recorder();
        recorder.start_recording().unwrap();
        assert!(recorder.submit_frame(RgbaImage::new(1, 1), Duration::from_secs(1)));
        assert!(!recorder.submit_frame(RgbaImage::new(1, 1), Duration::from_millis(500)));
    }
}
