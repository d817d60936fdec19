//! Turning recorded samples into a video file.
//!
//! The container is produced by a [`VideoSink`] (by default the system `ffmpeg`
//! binary, fed raw RGBA over a pipe) and then handed to a [`MediaStore`] (by default
//! a plain directory).

use std::{
    io::Write as _,
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
};

use image::RgbaImage;
use instant::Duration;

use crate::{config::RecorderConfig, error::ExportError, recorder::FrameSample};

/// One open video container.
pub trait VideoWriter {
    /// Appends a frame shown at `presentation_time` after the first one.
    fn append(&mut self, frame: &RgbaImage, presentation_time: Duration) -> Result<(), String>;
    fn finish(self: Box<Self>) -> Result<(), ExportError>;
}

/// Opens [`VideoWriter`]s.
pub trait VideoSink: Send + Sync {
    fn open(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn VideoWriter>, ExportError>;
}

/// Persistent storage a finished recording is handed to.
pub trait MediaStore: Send + Sync {
    /// Takes ownership of `file` and returns where it ended up.
    fn store(&self, file: &Path) -> Result<PathBuf, ExportError>;
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// H.264 in an mp4 container through the system `ffmpeg`.
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegSink;

impl VideoSink for FfmpegSink {
    fn open(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn VideoWriter>, ExportError> {
        if width == 0 || height == 0 || fps == 0 {
            return Err(ExportError::Writer(format!(
                "invalid video format {}x{} at {} fps",
                width, height, fps
            )));
        }
        if !is_ffmpeg_on_path() {
            return Err(ExportError::Writer(
                "ffmpeg is required for mp4 export, but was not found on PATH".to_string(),
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", width, height),
            "-r",
            &fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            // yuv420p needs even dimensions
            "-vf",
            "pad=ceil(iw/2)*2:ceil(ih/2)*2",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ])
        .arg(path);

        let mut child = cmd
            .spawn()
            .map_err(|e| ExportError::Writer(format!("failed to spawn ffmpeg: {}", e)))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExportError::Writer("failed to open ffmpeg stdin".to_string()))?;

        Ok(Box::new(FfmpegWriter {
            width,
            height,
            fps,
            child,
            stdin: Some(stdin),
            frames_written: 0,
        }))
    }
}

/// Writes a constant frame rate stream: every sample is repeated until the frame
/// counter reaches its presentation time.
pub struct FfmpegWriter {
    width: u32,
    height: u32,
    fps: u32,
    child: Child,
    stdin: Option<ChildStdin>,
    frames_written: u64,
}

/// Number of times a sample at `presentation_time` is written when `written` frames
/// are already in the stream.
pub fn frame_repeats(presentation_time: Duration, fps: u32, written: u64) -> u64 {
    let target = (presentation_time.as_secs_f64() * f64::from(fps)).round() as u64;
    (target + 1).saturating_sub(written)
}

impl VideoWriter for FfmpegWriter {
    fn append(&mut self, frame: &RgbaImage, presentation_time: Duration) -> Result<(), String> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            ));
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err("writer is already finalized".to_string());
        };
        let repeats = frame_repeats(presentation_time, self.fps, self.frames_written);
        if repeats == 0 {
            log::debug!("sample at {:?} falls on an already written frame", presentation_time);
        }
        for _ in 0..repeats {
            stdin
                .write_all(frame.as_raw())
                .map_err(|e| format!("failed to write frame to ffmpeg stdin: {}", e))?;
        }
        self.frames_written += repeats;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<(), ExportError> {
        drop(self.stdin.take());
        let output = self
            .child
            .wait_with_output()
            .map_err(|e| ExportError::Finalize(format!("failed to wait for ffmpeg: {}", e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExportError::Finalize(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Moves finished recordings into a directory, creating it if needed.
#[derive(Clone, Debug)]
pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl MediaStore for DirectoryStore {
    fn store(&self, file: &Path) -> Result<PathBuf, ExportError> {
        let store_error = |reason: String| ExportError::Store {
            path: file.to_path_buf(),
            reason,
        };
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| store_error(format!("cannot create '{}': {}", self.dir.display(), e)))?;
        let file_name = file
            .file_name()
            .ok_or_else(|| store_error("path has no file name".to_string()))?;
        if self.dir.join(file_name) == file {
            return Ok(file.to_path_buf());
        }
        let destination = free_destination(&self.dir, Path::new(file_name));
        // rename fails across file systems, fall back to copy and delete
        if std::fs::rename(file, &destination).is_err() {
            std::fs::copy(file, &destination).map_err(|e| store_error(e.to_string()))?;
            std::fs::remove_file(file).map_err(|e| store_error(e.to_string()))?;
        }
        Ok(destination)
    }
}

/// `dir/file_name`, or `dir/<stem>-<n>.<ext>` with the first `n` that is not taken.
fn free_destination(dir: &Path, file_name: &Path) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let stem = file_name
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = file_name
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    (1u64..)
        .map(|n| dir.join(format!("{}-{}{}", stem, n, extension)))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

/// `output_dir/<file_stem>-<sequence>.mp4`. Every export of a recorder gets its own
/// sequence number, so exports that overlap never write the same file.
pub fn destination_path(config: &RecorderConfig, sequence: u64) -> PathBuf {
    config
        .output_dir
        .join(format!("{}-{}.mp4", config.file_stem, sequence))
}

/// Writes `samples` into a new container and hands it to `store`.
///
/// Returns `Ok(None)` without touching the file system when there is nothing to
/// export. Any failure aborts the export; a partially written file is left behind.
pub fn export(
    samples: Vec<FrameSample>,
    config: &RecorderConfig,
    sequence: u64,
    sink: &dyn VideoSink,
    store: &dyn MediaStore,
) -> Result<Option<PathBuf>, ExportError> {
    let Some(first) = samples.first() else {
        return Ok(None);
    };
    let (width, height) = first.image.dimensions();
    let start = first.timestamp;

    let path = destination_path(config, sequence);
    let file_error = |source| ExportError::File {
        path: path.clone(),
        source,
    };
    std::fs::create_dir_all(&config.output_dir).map_err(file_error)?;
    if path.exists() {
        std::fs::remove_file(&path).map_err(file_error)?;
    }

    let mut writer = sink.open(&path, width, height, config.fps)?;
    log::info!(
        "exporting {} samples ({}x{}) to {}",
        samples.len(),
        width,
        height,
        path.display()
    );
    for (index, sample) in samples.iter().enumerate() {
        let frame = to_pixel_buffer(&sample.image, width, height)
            .map_err(|reason| ExportError::PixelConversion { index, reason })?;
        let presentation_time = sample.timestamp.saturating_sub(start);
        writer
            .append(&frame, presentation_time)
            .map_err(|reason| ExportError::Append { index, reason })?;
    }
    writer.finish()?;

    let stored = store.store(&path)?;
    log::info!("recording stored at {}", stored.display());
    Ok(Some(stored))
}

/// Every frame of one container must have the size of the first.
fn to_pixel_buffer(image: &RgbaImage, width: u32, height: u32) -> Result<RgbaImage, String> {
    if image.dimensions() != (width, height) {
        return Err(format!(
            "sample is {}x{}, the recording is {}x{}",
            image.width(),
            image.height(),
            width,
            height
        ));
    }
    let expected = width as usize * height as usize * 4;
    if image.as_raw().len() != expected {
        return Err(format!(
            "sample holds {} bytes, expected {}",
            image.as_raw().len(),
            expected
        ));
    }
    Ok(image.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeats_pad_to_constant_frame_rate() {
        assert_eq!(frame_repeats(Duration::ZERO, 30, 0), 1);
        // 40 ms later at 30 fps is frame 1
        assert_eq!(frame_repeats(Duration::from_millis(40), 30, 1), 1);
        // 100 ms later is frame 3: frames 2 and 3 both show this sample
        assert_eq!(frame_repeats(Duration::from_millis(100), 30, 2), 2);
        assert_eq!(frame_repeats(Duration::from_millis(10), 30, 1), 0);
    }

    #[test]
    fn destination_uses_stem_sequence_and_mp4() {
        let config = RecorderConfig {
            output_dir: PathBuf::from("/tmp/out"),
            file_stem: "clip".to_string(),
            ..Default::default()
        };
        assert_eq!(destination_path(&config, 0), PathBuf::from("/tmp/out/clip-0.mp4"));
        assert_eq!(destination_path(&config, 7), PathBuf::from("/tmp/out/clip-7.mp4"));
    }
}
