//! Copying presented frames back to the CPU for the recorder.
//!
//! The copy is recorded into the frame's command encoder, the buffer is mapped once
//! the submission completes and the mapping result arrives over a channel. Nothing
//! here waits on the GPU: finished copies are picked up by [`Readback::drain`] at the
//! start of a later frame, or when the compositor stops recording.

use std::{collections::HashMap, sync::Arc};

use crossbeam_channel::{Receiver, Sender};
use image::RgbaImage;
use instant::Duration;

use crate::{recorder::FrameRecorder, resources::pool::ResourcePool};

/// Row pitch of a buffer copy of a 4 byte per texel texture `width` texels wide.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (width * 4).div_ceil(align) * align
}

/// Strips row padding and, for BGRA sources, swaps red and blue.
pub fn unpad_rows(
    data: &[u8],
    width: u32,
    height: u32,
    padded_bytes_per_row: u32,
    swap_red_blue: bool,
) -> Option<RgbaImage> {
    let row_bytes = width as usize * 4;
    let pitch = padded_bytes_per_row as usize;
    if pitch < row_bytes || data.len() < pitch * height as usize {
        return None;
    }
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in data.chunks(pitch).take(height as usize) {
        pixels.extend_from_slice(&row[..row_bytes]);
    }
    if swap_red_blue {
        for texel in pixels.chunks_exact_mut(4) {
            texel.swap(0, 2);
        }
    }
    RgbaImage::from_raw(width, height, pixels)
}

fn is_bgra(format: wgpu::TextureFormat) -> bool {
    matches!(
        format,
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb
    )
}

fn is_rgba8(format: wgpu::TextureFormat) -> bool {
    matches!(
        format,
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb
    )
}

struct PendingReadback {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_bytes_per_row: u32,
    swap_red_blue: bool,
    timestamp: Duration,
}

type MapResult = (u64, Result<(), wgpu::BufferAsyncError>);

pub struct Readback {
    pool: Arc<ResourcePool<wgpu::Buffer>>,
    next_id: u64,
    /// Copies recorded into the current encoder, not yet submitted.
    encoded: Vec<u64>,
    pending: HashMap<u64, PendingReadback>,
    sender: Sender<MapResult>,
    receiver: Receiver<MapResult>,
}

impl Readback {
    pub fn new(pool: Arc<ResourcePool<wgpu::Buffer>>) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            pool,
            next_id: 0,
            encoded: Vec::new(),
            pending: HashMap::new(),
            sender,
            receiver,
        }
    }

    /// Number of copies that have not been handed to the recorder yet.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Records a copy of `texture` into a pooled mappable buffer.
    pub fn encode_copy(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        texture: &wgpu::Texture,
        timestamp: Duration,
    ) {
        let format = texture.format();
        if !is_bgra(format) && !is_rgba8(format) {
            log::warn!("cannot record frames of format {:?}", format);
            return;
        }
        if !texture.usage().contains(wgpu::TextureUsages::COPY_SRC) {
            log::warn!("the render target cannot be copied, frame not recorded");
            return;
        }
        let size = texture.size();
        let padded = padded_bytes_per_row(size.width);
        let buffer = self
            .pool
            .acquire(u64::from(padded) * u64::from(size.height));
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(size.height),
                },
            },
            size,
        );

        let id = self.next_id;
        self.next_id += 1;
        self.encoded.push(id);
        self.pending.insert(
            id,
            PendingReadback {
                buffer,
                width: size.width,
                height: size.height,
                padded_bytes_per_row: padded,
                swap_red_blue: is_bgra(format),
                timestamp,
            },
        );
    }

    /// Requests the mapping of every copy recorded since the last call. Must be called
    /// after the encoder holding them was submitted.
    pub fn map_submitted(&mut self) {
        for id in self.encoded.drain(..) {
            let Some(pending) = self.pending.get(&id) else {
                continue;
            };
            let sender = self.sender.clone();
            pending
                .buffer
                .slice(..)
                .map_async(wgpu::MapMode::Read, move |result| {
                    // the receiver only goes away with the compositor
                    let _ = sender.send((id, result));
                });
        }
    }

    /// Hands every completed copy to `recorder` and returns the buffers to the pool.
    pub fn drain(&mut self, recorder: &FrameRecorder) -> usize {
        let mut delivered = 0;
        for (id, result) in self.receiver.try_iter() {
            let Some(pending) = self.pending.remove(&id) else {
                continue;
            };
            match result {
                Ok(()) => {
                    let image = {
                        let view = pending.buffer.slice(..).get_mapped_range();
                        unpad_rows(
                            &view,
                            pending.width,
                            pending.height,
                            pending.padded_bytes_per_row,
                            pending.swap_red_blue,
                        )
                    };
                    pending.buffer.unmap();
                    match image {
                        Some(image) => {
                            recorder.submit_frame(image, pending.timestamp);
                            delivered += 1;
                        }
                        None => log::warn!("readback of frame {} has an unexpected size", id),
                    }
                }
                Err(e) => log::warn!("readback of frame {} failed: {}", id, e),
            }
            self.pool.release(pending.buffer);
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_aligned_to_copy_pitch() {
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
    }

    #[test]
    fn padding_is_stripped_and_bgra_swapped() {
        let pitch = 256;
        let mut data = vec![0u8; pitch * 2];
        data[..4].copy_from_slice(&[1, 2, 3, 4]);
        data[pitch..pitch + 4].copy_from_slice(&[5, 6, 7, 8]);
        let image = unpad_rows(&data, 1, 2, pitch as u32, true).unwrap();
        assert_eq!(image.as_raw(), &vec![3, 2, 1, 4, 7, 6, 5, 8]);
    }

    #[test]
    fn short_buffers_are_rejected() {
        assert!(unpad_rows(&[0u8; 16], 2, 2, 256, false).is_none());
    }
}
