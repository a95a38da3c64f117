//! Synchronization primitives and their per-frame pools.

use std::sync::Arc;

use crate::error::Result;
use crate::pool::HandlePool;
use ash::vk;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    let semaphore = device.create_semaphore(&create_info, None)?;
    Ok(semaphore)
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    let fence = device.create_fence(&create_info, None)?;
    Ok(fence)
}

/// Outcome of a bounded fence wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceWait {
    /// Every waited fence is signaled.
    Signaled,
    /// The timeout elapsed first. Not an error; the caller may wait again.
    Timeout,
}

impl FenceWait {
    /// Returns true if the wait completed.
    pub const fn is_signaled(self) -> bool {
        matches!(self, Self::Signaled)
    }
}

/// Wait for all `fences` to be signaled.
///
/// # Safety
/// The device and fences must be valid.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn wait_for_fences(
    device: &ash::Device,
    fences: &[vk::Fence],
    timeout_ns: u64,
) -> Result<FenceWait> {
    if fences.is_empty() {
        return Ok(FenceWait::Signaled);
    }

    match device.wait_for_fences(fences, true, timeout_ns) {
        Ok(()) => Ok(FenceWait::Signaled),
        Err(vk::Result::TIMEOUT) => Ok(FenceWait::Timeout),
        Err(err) => Err(err.into()),
    }
}

/// Fences owned by one frame.
///
/// Fences are created unsignaled on demand and reissued in the same order
/// after [`FencePool::reset`].
pub struct FencePool {
    device: Arc<ash::Device>,
    fences: HandlePool<vk::Fence>,
}

impl FencePool {
    /// Create an empty pool.
    pub fn new(device: Arc<ash::Device>) -> Self {
        Self {
            device,
            fences: HandlePool::new(),
        }
    }

    /// Hand out an unsignaled fence.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn request_fence(&mut self) -> Result<vk::Fence> {
        let device = &self.device;
        self.fences.request_with(|| unsafe { create_fence(device, false) })
    }

    /// Wait for every fence issued since the last reset.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn wait(&self, timeout_ns: u64) -> Result<FenceWait> {
        wait_for_fences(&self.device, self.fences.in_use(), timeout_ns)
    }

    /// Reset the issued fences to unsignaled and rewind the pool.
    ///
    /// # Safety
    /// The issued fences must not be pending on any queue.
    pub unsafe fn reset(&mut self) -> Result<()> {
        let issued = self.fences.in_use();
        if !issued.is_empty() {
            self.device.reset_fences(issued)?;
        }
        self.fences.reset();
        Ok(())
    }

    /// Number of fences issued since the last reset.
    pub fn in_use_count(&self) -> usize {
        self.fences.in_use_count()
    }

    /// Returns true if `fence` was issued since the last reset.
    pub fn is_in_use(&self, fence: vk::Fence) -> bool {
        self.fences.in_use().contains(&fence)
    }

    /// Destroy every fence the pool created.
    ///
    /// # Safety
    /// No fence may be pending on any queue.
    pub unsafe fn destroy(&mut self) {
        for fence in self.fences.drain() {
            self.device.destroy_fence(fence, None);
        }
    }
}

/// Semaphores owned by one frame.
pub struct SemaphorePool {
    device: Arc<ash::Device>,
    semaphores: HandlePool<vk::Semaphore>,
}

impl SemaphorePool {
    /// Create an empty pool.
    pub fn new(device: Arc<ash::Device>) -> Self {
        Self {
            device,
            semaphores: HandlePool::new(),
        }
    }

    /// Hand out a semaphore.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn request_semaphore(&mut self) -> Result<vk::Semaphore> {
        let device = &self.device;
        self.semaphores
            .request_with(|| unsafe { create_semaphore(device) })
    }

    /// Rewind the pool. Binary semaphores return to unsignaled once the
    /// wait that consumed them has completed, so nothing is reset on the
    /// device.
    pub fn reset(&mut self) {
        self.semaphores.reset();
    }

    /// Number of semaphores issued since the last reset.
    pub fn in_use_count(&self) -> usize {
        self.semaphores.in_use_count()
    }

    /// Destroy every semaphore the pool created.
    ///
    /// # Safety
    /// No semaphore may be pending on any queue.
    pub unsafe fn destroy(&mut self) {
        for semaphore in self.semaphores.drain() {
            self.device.destroy_semaphore(semaphore, None);
        }
    }
}
