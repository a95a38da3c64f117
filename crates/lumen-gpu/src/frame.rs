//! Per-swapchain-image frame resources.
//!
//! A [`Frame`] owns everything one swapchain slot needs to record and submit
//! work: its render target, fence and semaphore pools, a descriptor pool, and
//! one command pool per (thread, queue family). Thread index 0 is the
//! orchestrating thread; worker `i` of the recording pool uses index `i + 1`.
//!
//! Frames cycle through `Idle → Waiting → Resetting → Recording → Submitted`.
//! Resources may only be requested after a completed wait and a reset, which
//! guarantees the GPU is done with the previous use of the slot.

use std::sync::Arc;

use crate::command::{CommandBuffer, CommandPool};
use crate::descriptors::DescriptorPool;
use crate::error::{GpuError, Result};
use crate::memory::GpuAllocator;
use crate::render_target::RenderTarget;
use crate::sync::{FencePool, FenceWait, SemaphorePool};
use ash::vk;
use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use lumen_core::constants::FENCE_TIMEOUT_INFINITE;

/// Lifecycle state of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    /// Not in use, or its last submission is known to be complete.
    Idle,
    /// A fence wait is in progress or timed out.
    Waiting,
    /// Pools are being rewound.
    Resetting,
    /// Resources may be requested and commands recorded.
    Recording,
    /// Work has been submitted and may still be executing.
    Submitted,
}

/// State machine enforcing the frame's call order.
///
/// Every violation is a programming error and panics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameLifecycle {
    state: FrameState,
    /// A wait completed since the last submission.
    drained: bool,
}

impl Default for FrameLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameLifecycle {
    pub const fn new() -> Self {
        Self {
            state: FrameState::Idle,
            drained: false,
        }
    }

    pub const fn state(&self) -> FrameState {
        self.state
    }

    /// Enter `Waiting`. Allowed from any state except `Resetting`; waiting
    /// from `Recording` abandons the unsubmitted recording.
    pub fn begin_wait(&mut self) {
        assert_ne!(
            self.state,
            FrameState::Resetting,
            "frame wait started while a reset is in progress"
        );
        self.state = FrameState::Waiting;
        self.drained = false;
    }

    /// Record the outcome of the wait.
    pub fn finish_wait(&mut self, outcome: FenceWait) {
        assert_eq!(self.state, FrameState::Waiting, "finish_wait without begin_wait");
        if outcome.is_signaled() {
            self.state = FrameState::Idle;
            self.drained = true;
        }
    }

    /// Enter `Resetting`. Requires a completed wait.
    pub fn begin_reset(&mut self) {
        assert!(
            self.state == FrameState::Idle && self.drained,
            "frame reset requires a completed wait first (state: {:?})",
            self.state
        );
        self.state = FrameState::Resetting;
    }

    /// Leave `Resetting` for `Recording`.
    pub fn finish_reset(&mut self) {
        assert_eq!(self.state, FrameState::Resetting, "finish_reset without begin_reset");
        self.state = FrameState::Recording;
        self.drained = false;
    }

    /// Panic unless resources may be requested.
    pub fn assert_recording(&self, operation: &str) {
        assert_eq!(
            self.state,
            FrameState::Recording,
            "{operation} requires the frame to be waited and reset first"
        );
    }

    /// `Recording → Submitted`.
    pub fn submit(&mut self) {
        self.assert_recording("mark_submitted");
        self.state = FrameState::Submitted;
    }
}

/// Resources for one swapchain image.
pub struct Frame {
    device: Arc<ash::Device>,
    index: usize,
    lifecycle: FrameLifecycle,
    render_target: RenderTarget,
    framebuffer: vk::Framebuffer,
    acquire_semaphore: vk::Semaphore,
    fence_pool: FencePool,
    semaphore_pool: SemaphorePool,
    descriptor_pool: DescriptorPool,
    /// thread index → queue family → pool
    thread_pools: Vec<HashMap<u32, CommandPool>>,
}

impl Frame {
    /// Create a frame with room for `thread_count` recording threads
    /// (the orchestrator included).
    pub fn new(
        device: Arc<ash::Device>,
        index: usize,
        render_target: RenderTarget,
        descriptor_pool: DescriptorPool,
        thread_count: usize,
    ) -> Self {
        assert!(thread_count > 0, "a frame needs at least the orchestrator thread");

        Self {
            fence_pool: FencePool::new(Arc::clone(&device)),
            semaphore_pool: SemaphorePool::new(Arc::clone(&device)),
            device,
            index,
            lifecycle: FrameLifecycle::new(),
            render_target,
            framebuffer: vk::Framebuffer::null(),
            acquire_semaphore: vk::Semaphore::null(),
            descriptor_pool,
            thread_pools: (0..thread_count).map(|_| HashMap::new()).collect(),
        }
    }

    /// Slot index of this frame.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Current lifecycle state.
    pub fn state(&self) -> FrameState {
        self.lifecycle.state()
    }

    /// Number of threads with a command pool slot, orchestrator included.
    pub fn thread_count(&self) -> usize {
        self.thread_pools.len()
    }

    pub fn render_target(&self) -> &RenderTarget {
        &self.render_target
    }

    pub fn framebuffer(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    pub fn descriptor_pool_mut(&mut self) -> &mut DescriptorPool {
        &mut self.descriptor_pool
    }

    /// Create the framebuffer for `render_pass` over the render target.
    ///
    /// # Safety
    /// The render pass must be compatible with the render target.
    pub unsafe fn create_framebuffer(&mut self, render_pass: vk::RenderPass) -> Result<()> {
        if self.framebuffer != vk::Framebuffer::null() {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
        self.framebuffer = self.render_target.create_framebuffer(render_pass)?;
        Ok(())
    }

    /// Wait for the frame's last submission.
    ///
    /// `FenceWait::Timeout` leaves the frame in `Waiting`; call again.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn wait(&mut self, timeout_ns: u64) -> Result<FenceWait> {
        self.lifecycle.begin_wait();
        let outcome = self.fence_pool.wait(timeout_ns)?;
        self.lifecycle.finish_wait(outcome);

        if outcome == FenceWait::Timeout {
            tracing::trace!(frame = self.index, "Frame fence wait timed out");
        }
        Ok(outcome)
    }

    /// Wait for the frame's last submission without a timeout.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn wait_forever(&mut self) -> Result<()> {
        match self.wait(FENCE_TIMEOUT_INFINITE)? {
            FenceWait::Signaled => Ok(()),
            FenceWait::Timeout => Err(GpuError::InvalidState(format!(
                "unbounded fence wait on frame {} reported a timeout",
                self.index
            ))),
        }
    }

    /// Rewind every pool so its resources are reissued.
    ///
    /// The descriptor pool is left untouched; its sets persist across uses.
    ///
    /// # Panics
    /// Panics unless the last [`Frame::wait`] returned `Signaled`.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn reset(&mut self) -> Result<()> {
        self.lifecycle.begin_reset();

        self.fence_pool.reset()?;
        self.semaphore_pool.reset();
        for pools in &mut self.thread_pools {
            for pool in pools.values_mut() {
                pool.reset()?;
            }
        }

        self.lifecycle.finish_reset();
        Ok(())
    }

    /// Swap in the semaphore the swapchain image of this frame was acquired
    /// with, returning the one from the previous use.
    ///
    /// Only valid after a completed wait, which guarantees the submission
    /// that consumed the previous semaphore has finished.
    pub fn swap_acquire_semaphore(&mut self, semaphore: vk::Semaphore) -> vk::Semaphore {
        self.lifecycle.assert_recording("swap_acquire_semaphore");
        std::mem::replace(&mut self.acquire_semaphore, semaphore)
    }

    /// The semaphore the current image was acquired with.
    pub fn acquire_semaphore(&self) -> vk::Semaphore {
        self.acquire_semaphore
    }

    fn pool_for(&mut self, queue_family: u32, thread_index: usize) -> Result<&mut CommandPool> {
        assert!(
            thread_index < self.thread_pools.len(),
            "thread index {thread_index} out of range (frame has {} threads)",
            self.thread_pools.len()
        );

        let pool = match self.thread_pools[thread_index].entry(queue_family) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let pool =
                    unsafe { CommandPool::new(Arc::clone(&self.device), queue_family, thread_index) }?;
                entry.insert(pool)
            }
        };
        Ok(pool)
    }

    /// Hand out the next command buffer from the pool of
    /// (`thread_index`, `queue_family`), creating the pool on first use.
    ///
    /// # Safety
    /// The pool of `thread_index` must only be used from that thread.
    pub unsafe fn request_command_buffer(
        &mut self,
        queue_family: u32,
        level: vk::CommandBufferLevel,
        thread_index: usize,
    ) -> Result<CommandBuffer> {
        self.lifecycle.assert_recording("request_command_buffer");
        self.pool_for(queue_family, thread_index)?
            .request_command_buffer(level)
    }

    /// Exclusive borrows of the pools for worker threads `1..=count`, in
    /// worker order, creating missing pools on the calling thread.
    pub fn worker_command_pools(
        &mut self,
        queue_family: u32,
        count: usize,
    ) -> Result<Vec<&mut CommandPool>> {
        self.lifecycle.assert_recording("worker_command_pools");
        assert!(
            count < self.thread_pools.len(),
            "{count} workers requested, frame has {} worker slots",
            self.thread_pools.len() - 1
        );
        for thread_index in 1..=count {
            self.pool_for(queue_family, thread_index)?;
        }

        self.thread_pools[1..=count]
            .iter_mut()
            .map(|pools| {
                pools.get_mut(&queue_family).ok_or_else(|| {
                    GpuError::InvalidState(format!("no command pool for family {queue_family}"))
                })
            })
            .collect()
    }

    /// Hand out an unsignaled fence from the frame's pool.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn request_fence(&mut self) -> Result<vk::Fence> {
        self.lifecycle.assert_recording("request_fence");
        self.fence_pool.request_fence()
    }

    /// Hand out a semaphore from the frame's pool.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn request_semaphore(&mut self) -> Result<vk::Semaphore> {
        self.lifecycle.assert_recording("request_semaphore");
        self.semaphore_pool.request_semaphore()
    }

    /// Record that the frame's work was submitted with `fence`.
    pub fn mark_submitted(&mut self, fence: vk::Fence) {
        debug_assert!(
            self.fence_pool.is_in_use(fence),
            "submission fence was not issued by this frame"
        );
        self.lifecycle.submit();
        tracing::trace!(frame = self.index, "Frame submitted");
    }

    /// Destroy every resource owned by the frame.
    ///
    /// # Safety
    /// The frame's work must be complete.
    pub unsafe fn destroy(&mut self, allocator: &mut GpuAllocator) {
        for pools in &mut self.thread_pools {
            for pool in pools.values_mut() {
                pool.destroy();
            }
            pools.clear();
        }
        self.fence_pool.destroy();
        self.semaphore_pool.destroy();
        self.descriptor_pool.destroy();
        if self.framebuffer != vk::Framebuffer::null() {
            self.device.destroy_framebuffer(self.framebuffer, None);
            self.framebuffer = vk::Framebuffer::null();
        }
        self.render_target.destroy(allocator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> FrameLifecycle {
        let mut lifecycle = FrameLifecycle::new();
        lifecycle.begin_wait();
        lifecycle.finish_wait(FenceWait::Signaled);
        lifecycle.begin_reset();
        lifecycle.finish_reset();
        lifecycle
    }

    #[test]
    fn full_cycle() {
        let mut lifecycle = ready();
        assert_eq!(lifecycle.state(), FrameState::Recording);
        lifecycle.assert_recording("request_fence");

        lifecycle.submit();
        assert_eq!(lifecycle.state(), FrameState::Submitted);

        lifecycle.begin_wait();
        assert_eq!(lifecycle.state(), FrameState::Waiting);
        lifecycle.finish_wait(FenceWait::Signaled);
        assert_eq!(lifecycle.state(), FrameState::Idle);
    }

    #[test]
    fn timeout_stays_waiting_and_can_retry() {
        let mut lifecycle = ready();
        lifecycle.submit();

        lifecycle.begin_wait();
        lifecycle.finish_wait(FenceWait::Timeout);
        assert_eq!(lifecycle.state(), FrameState::Waiting);

        lifecycle.begin_wait();
        lifecycle.finish_wait(FenceWait::Signaled);
        lifecycle.begin_reset();
        lifecycle.finish_reset();
        assert_eq!(lifecycle.state(), FrameState::Recording);
    }

    #[test]
    #[should_panic(expected = "requires a completed wait")]
    fn reset_without_wait_panics() {
        let mut lifecycle = FrameLifecycle::new();
        lifecycle.begin_reset();
    }

    #[test]
    #[should_panic(expected = "requires a completed wait")]
    fn reset_after_timeout_panics() {
        let mut lifecycle = FrameLifecycle::new();
        lifecycle.begin_wait();
        lifecycle.finish_wait(FenceWait::Timeout);
        lifecycle.begin_reset();
    }

    #[test]
    #[should_panic(expected = "requires a completed wait")]
    fn second_reset_needs_new_wait() {
        let mut lifecycle = ready();
        lifecycle.submit();
        lifecycle.begin_reset();
    }

    #[test]
    #[should_panic(expected = "waited and reset first")]
    fn recording_before_reset_panics() {
        let mut lifecycle = FrameLifecycle::new();
        lifecycle.begin_wait();
        lifecycle.finish_wait(FenceWait::Signaled);
        lifecycle.assert_recording("request_command_buffer");
    }

    #[test]
    #[should_panic(expected = "waited and reset first")]
    fn submit_twice_panics() {
        let mut lifecycle = ready();
        lifecycle.submit();
        lifecycle.submit();
    }

    #[test]
    fn abandoned_recording_can_wait_again() {
        let mut lifecycle = ready();
        lifecycle.begin_wait();
        lifecycle.finish_wait(FenceWait::Signaled);
        lifecycle.begin_reset();
        lifecycle.finish_reset();
        assert_eq!(lifecycle.state(), FrameState::Recording);
    }
}
