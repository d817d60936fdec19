//! Bookkeeping of frames whose GPU work has been submitted but not completed.
//!
//! Frame `n` uses slot `n % N`. A slot is claimed with [`InFlightSlots::try_claim`]
//! and stays busy until the returned [`InFlightToken`] is dropped, which the compositor
//! does inside the queue's completion callback. Per-frame constant blocks live in the
//! slot so that frame `n + N` never overwrites data frame `n` is still reading.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use wgpu::util::DeviceExt;

use crate::data_structures::uniforms::{
    CompositeUniforms, DisplayTransformUniform, FrameUniforms,
};

/// Proof that a slot is owned by a frame. Dropping it frees the slot.
#[derive(Debug)]
pub struct InFlightToken {
    slot: usize,
    busy: Arc<AtomicBool>,
}

impl InFlightToken {
    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl Drop for InFlightToken {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct InFlightSlots {
    busy: Vec<Arc<AtomicBool>>,
}

impl InFlightSlots {
    pub fn new(count: usize) -> Self {
        Self {
            busy: (0..count.max(1))
                .map(|_| Arc::new(AtomicBool::new(false)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.busy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.busy.is_empty()
    }

    pub fn slot_for(&self, frame_number: u64) -> usize {
        (frame_number % self.busy.len() as u64) as usize
    }

    /// `None` while the slot of `frame_number` is still in flight.
    pub fn try_claim(&self, frame_number: u64) -> Option<InFlightToken> {
        let slot = self.slot_for(frame_number);
        let busy = &self.busy[slot];
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(InFlightToken {
            slot,
            busy: busy.clone(),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.busy
            .iter()
            .filter(|b| b.load(Ordering::Acquire))
            .count()
    }
}

/// Constant blocks written once per frame, one set per in-flight slot.
#[derive(Debug)]
pub struct SlotBuffers {
    pub frame_uniforms: wgpu::Buffer,
    pub display_transform: wgpu::Buffer,
    pub composite_uniforms: wgpu::Buffer,
}

impl SlotBuffers {
    pub fn new(device: &wgpu::Device, slot: usize) -> Self {
        let uniform = |label: String, contents: &[u8]| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&label),
                contents,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
        };
        Self {
            frame_uniforms: uniform(
                format!("Frame Uniforms {}", slot),
                bytemuck::bytes_of(&FrameUniforms::default()),
            ),
            display_transform: uniform(
                format!("Display Transform {}", slot),
                bytemuck::bytes_of(&DisplayTransformUniform::from(
                    <cgmath::Matrix3<f32> as cgmath::SquareMatrix>::identity(),
                )),
            ),
            composite_uniforms: uniform(
                format!("Composite Uniforms {}", slot),
                bytemuck::bytes_of(&CompositeUniforms::from(
                    <cgmath::Matrix4<f32> as cgmath::SquareMatrix>::identity(),
                )),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_slot_blocks_until_released() {
        let slots = InFlightSlots::new(1);
        let token = slots.try_claim(0).unwrap();
        assert!(slots.try_claim(1).is_none());
        assert_eq!(slots.in_flight(), 1);
        drop(token);
        assert!(slots.try_claim(1).is_some());
    }

    #[test]
    fn frames_rotate_through_slots() {
        let slots = InFlightSlots::new(3);
        let a = slots.try_claim(0).unwrap();
        let b = slots.try_claim(1).unwrap();
        let c = slots.try_claim(2).unwrap();
        assert_eq!((a.slot(), b.slot(), c.slot()), (0, 1, 2));
        assert!(slots.try_claim(3).is_none());
        drop(a);
        assert_eq!(slots.try_claim(3).map(|t| t.slot()), Some(0));
    }

    #[test]
    fn zero_slots_means_one() {
        assert_eq!(InFlightSlots::new(0).len(), 1);
    }
}
