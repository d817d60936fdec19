use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use ar_ngin::resources::pool::{PoolBuffer, PoolStats, ResourcePool};

#[derive(Debug, PartialEq, Eq)]
struct FakeBuffer {
    id: u32,
    size: u64,
}

impl PoolBuffer for FakeBuffer {
    fn capacity(&self) -> u64 {
        self.size
    }
}

fn counting_pool() -> (ResourcePool<FakeBuffer>, Arc<AtomicU32>) {
    let allocations = Arc::new(AtomicU32::new(0));
    let counter = allocations.clone();
    let pool = ResourcePool::new(move |size| FakeBuffer {
        id: counter.fetch_add(1, Ordering::SeqCst),
        size,
    });
    (pool, allocations)
}

#[test]
fn should_allocate_on_miss_with_exact_size() {
    let (pool, allocations) = counting_pool();
    let buffer = pool.acquire(100);
    assert_eq!(buffer.size, 100);
    assert_eq!(allocations.load(Ordering::SeqCst), 1);
    assert_eq!(pool.stats(), PoolStats { hits: 0, misses: 1 });
}

#[test]
fn should_reuse_released_buffer_for_smaller_request() {
    let (pool, allocations) = counting_pool();
    let buffer = pool.acquire(100);
    let id = buffer.id;
    pool.release(buffer);
    assert_eq!(pool.len(), 1);

    let reused = pool.acquire(50);
    assert_eq!(reused.id, id);
    assert_eq!(reused.size, 100);
    assert!(pool.is_empty());
    assert_eq!(allocations.load(Ordering::SeqCst), 1);
    assert_eq!(pool.stats(), PoolStats { hits: 1, misses: 1 });
}

#[test]
fn should_allocate_fresh_buffer_when_pooled_ones_are_too_small() {
    let (pool, allocations) = counting_pool();
    let small = pool.acquire(16);
    pool.release(small);

    let big = pool.acquire(1024);
    assert_eq!(big.size, 1024);
    assert_eq!(allocations.load(Ordering::SeqCst), 2);
    // the small buffer stays available
    assert_eq!(pool.len(), 1);
}

#[test]
fn should_hand_out_first_fitting_buffer() {
    let (pool, _) = counting_pool();
    let large = pool.acquire(4096);
    let medium = pool.acquire(256);
    let (large_id, medium_id) = (large.id, medium.id);
    pool.release(large);
    pool.release(medium);

    assert_eq!(pool.acquire(128).id, large_id);
    assert_eq!(pool.acquire(128).id, medium_id);
}

#[test]
fn should_accept_releases_from_other_threads() {
    let (pool, allocations) = counting_pool();
    let pool = Arc::new(pool);
    let buffers: Vec<_> = (0..4).map(|_| pool.acquire(64)).collect();

    let handles: Vec<_> = buffers
        .into_iter()
        .map(|buffer| {
            let pool = pool.clone();
            std::thread::spawn(move || pool.release(buffer))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(pool.len(), 4);
    for _ in 0..4 {
        pool.acquire(64);
    }
    assert_eq!(allocations.load(Ordering::SeqCst), 4);
}
