//! Reuse pool for transient GPU-visible buffers.
//!
//! Per-frame buffers (the instance uniform block, readback buffers for the recorder)
//! are cycled through a [`ResourcePool`] instead of being created every frame. A buffer
//! is either sitting in the pool or checked out to exactly one caller; moving it in and
//! out of the pool is what enforces that.
//!
//! The pool is shared between the frame submission path and GPU completion callbacks,
//! which may run on another thread, so acquire and release go through one mutex.

use std::sync::{Mutex, MutexGuard};

/// Anything the pool can hand out. Capacity is in bytes.
pub trait PoolBuffer: Send {
    fn capacity(&self) -> u64;
}

impl PoolBuffer for wgpu::Buffer {
    fn capacity(&self) -> u64 {
        self.size()
    }
}

/// Hit/miss counters, mostly useful for logging and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
}

struct PoolInner<B> {
    free: Vec<B>,
    stats: PoolStats,
}

pub struct ResourcePool<B: PoolBuffer> {
    inner: Mutex<PoolInner<B>>,
    allocate: Box<dyn Fn(u64) -> B + Send + Sync>,
}

impl<B: PoolBuffer> std::fmt::Debug for ResourcePool<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("ResourcePool")
            .field("free", &inner.free.len())
            .field("stats", &inner.stats)
            .finish()
    }
}

impl<B: PoolBuffer> ResourcePool<B> {
    /// `allocate` is called with the exact requested size on a pool miss.
    pub fn new(allocate: impl Fn(u64) -> B + Send + Sync + 'static) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                free: Vec::new(),
                stats: PoolStats::default(),
            }),
            allocate: Box::new(allocate),
        }
    }

    /// Returns the first pooled buffer with at least `min_size` bytes, or a freshly
    /// allocated buffer of exactly `min_size` bytes.
    ///
    /// First-fit, not best-fit: a 1 MiB buffer happily serves a 16 byte request if it
    /// was released first.
    pub fn acquire(&self, min_size: u64) -> B {
        let mut inner = self.lock();
        if let Some(idx) = inner.free.iter().position(|b| b.capacity() >= min_size) {
            inner.stats.hits += 1;
            return inner.free.remove(idx);
        }
        inner.stats.misses += 1;
        // allocation runs under the lock so a concurrent release can't be missed
        // by the scan above and then double-counted as a miss
        (self.allocate)(min_size)
    }

    /// Puts a buffer back. No size check and no dedup.
    pub fn release(&self, buffer: B) {
        self.lock().free.push(buffer);
    }

    /// Number of buffers currently available for reuse.
    pub fn len(&self) -> usize {
        self.lock().free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> PoolStats {
        self.lock().stats
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner<B>> {
        // the pool list stays consistent even if a holder panicked mid-operation:
        // every mutation is a single push/remove
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Pool of uniform buffers, used for the per-frame instance constants.
pub fn uniform_buffer_pool(device: &wgpu::Device) -> ResourcePool<wgpu::Buffer> {
    let device = device.clone();
    ResourcePool::new(move |size| {
        log::debug!("allocating pooled uniform buffer of {} bytes", size);
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pooled Instance Uniform Buffer"),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    })
}

/// Pool of mappable buffers the presented frame is copied into for recording.
pub fn readback_buffer_pool(device: &wgpu::Device) -> ResourcePool<wgpu::Buffer> {
    let device = device.clone();
    ResourcePool::new(move |size| {
        log::debug!("allocating pooled readback buffer of {} bytes", size);
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pooled Readback Buffer"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        })
    })
}
