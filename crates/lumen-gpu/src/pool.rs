//! Recycling pool for Vulkan handles.
//!
//! Per-frame resources (fences, semaphores, command buffers) are created on
//! first request and kept for the lifetime of the frame. `reset` rewinds the
//! pool so the same handles are handed out again, in the same order, on the
//! next use of the frame.

/// A grow-only list of handles with a "next free" cursor.
#[derive(Debug)]
pub struct HandlePool<H> {
    handles: Vec<H>,
    next: usize,
}

impl<H: Copy> HandlePool<H> {
    /// Create an empty pool.
    pub const fn new() -> Self {
        Self {
            handles: Vec::new(),
            next: 0,
        }
    }

    /// Hand out the next free handle, creating one with `create` when every
    /// existing handle is already in use this epoch.
    pub fn request_with<E>(&mut self, create: impl FnOnce() -> Result<H, E>) -> Result<H, E> {
        if let Some(&handle) = self.handles.get(self.next) {
            self.next += 1;
            return Ok(handle);
        }

        let handle = create()?;
        self.handles.push(handle);
        self.next += 1;
        Ok(handle)
    }

    /// Rewind the cursor. Handles are kept and reissued by later requests.
    pub fn reset(&mut self) {
        self.next = 0;
    }

    /// Handles handed out since the last reset, in request order.
    pub fn in_use(&self) -> &[H] {
        &self.handles[..self.next]
    }

    /// Every handle the pool has ever created.
    pub fn all(&self) -> &[H] {
        &self.handles
    }

    /// Number of handles handed out since the last reset.
    pub fn in_use_count(&self) -> usize {
        self.next
    }

    /// Total number of handles created.
    pub fn capacity(&self) -> usize {
        self.handles.len()
    }

    /// Remove every handle from the pool so the caller can destroy them.
    pub fn drain(&mut self) -> std::vec::Drain<'_, H> {
        self.next = 0;
        self.handles.drain(..)
    }
}

impl<H: Copy> Default for HandlePool<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::{self, Handle};
    use std::convert::Infallible;

    fn counter_pool() -> (HandlePool<vk::Fence>, impl FnMut() -> Result<vk::Fence, Infallible>) {
        let mut raw = 0u64;
        let create = move || {
            raw += 1;
            Ok(vk::Fence::from_raw(raw))
        };
        (HandlePool::new(), create)
    }

    #[test]
    fn reissues_same_handles_after_reset() {
        let (mut pool, mut create) = counter_pool();

        let first: Vec<_> = (0..3)
            .map(|_| pool.request_with(&mut create).unwrap())
            .collect();
        pool.reset();
        let second: Vec<_> = (0..3)
            .map(|_| pool.request_with(&mut create).unwrap())
            .collect();

        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![
                vk::Fence::from_raw(1),
                vk::Fence::from_raw(2),
                vk::Fence::from_raw(3)
            ]
        );
        assert_eq!(pool.capacity(), 3);
    }

    #[test]
    fn grows_past_high_water_mark() {
        let (mut pool, mut create) = counter_pool();

        pool.request_with(&mut create).unwrap();
        pool.request_with(&mut create).unwrap();
        pool.reset();

        for _ in 0..4 {
            pool.request_with(&mut create).unwrap();
        }

        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.in_use_count(), 4);
        assert_eq!(pool.in_use()[3], vk::Fence::from_raw(4));
    }

    #[test]
    fn in_use_tracks_current_epoch_only() {
        let (mut pool, mut create) = counter_pool();

        for _ in 0..3 {
            pool.request_with(&mut create).unwrap();
        }
        pool.reset();
        pool.request_with(&mut create).unwrap();

        assert_eq!(pool.in_use(), &[vk::Fence::from_raw(1)]);
        assert_eq!(pool.all().len(), 3);
    }

    #[test]
    fn failed_creation_leaves_pool_unchanged() {
        let mut pool: HandlePool<vk::Semaphore> = HandlePool::new();

        let result = pool.request_with(|| Err::<vk::Semaphore, _>("device lost"));

        assert_eq!(result, Err("device lost"));
        assert_eq!(pool.in_use_count(), 0);
        assert_eq!(pool.capacity(), 0);
    }

    #[test]
    fn drain_empties_pool() {
        let (mut pool, mut create) = counter_pool();
        pool.request_with(&mut create).unwrap();
        pool.request_with(&mut create).unwrap();

        let drained: Vec<_> = pool.drain().collect();

        assert_eq!(drained.len(), 2);
        assert_eq!(pool.capacity(), 0);
        assert_eq!(pool.in_use_count(), 0);
    }
}
