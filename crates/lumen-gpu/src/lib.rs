//! Vulkan abstraction layer for the Lumen engine.
//!
//! This crate provides:
//! - Vulkan instance and device management
//! - Memory allocation via gpu-allocator
//! - Per-frame synchronization and command pools
//! - Descriptor binding tables
//! - Render targets and multi-subpass render pass construction
//! - Swapchain handling

pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod frame;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod pool;
pub mod render_pass;
pub mod render_target;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use command::{submit_command_buffers, CommandBuffer, CommandPool, RenderPassBinding};
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{
    pool_sizes, DescriptorPool, DescriptorResourceReference, DescriptorSet, DescriptorSetLayout,
    ResourceBinding, ShaderResource,
};
pub use error::{GpuError, Result};
pub use frame::{Frame, FrameLifecycle, FrameState};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{GraphicsPipeline, GraphicsPipelineConfig};
pub use pool::HandlePool;
pub use render_pass::{LoadStoreInfo, RenderPass, RenderPassLayout, SubpassCounts};
pub use render_target::{is_depth_stencil_format, Attachment, AttachmentSpec, RenderTarget};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::{AcquiredImage, Swapchain};
pub use sync::{create_fence, create_semaphore, FencePool, FenceWait, SemaphorePool};
