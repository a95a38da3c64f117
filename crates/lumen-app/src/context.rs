//! Application context.

use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use lumen_gpu::GpuContext;
use lumen_render::{Renderer, RendererConfig};
use lumen_shaders::ShaderLoader;
use winit::window::Window;

/// Application context shared across all app methods.
pub struct AppContext {
    /// The window handle.
    pub window: Arc<Window>,
    /// GPU context with device, queue and surface.
    pub gpu: GpuContext,
    /// Renderer for the configured technique.
    pub renderer: Renderer,
    /// Total frames rendered.
    pub frame_count: u64,
    /// Time of last frame (for delta time calculation).
    pub(crate) last_frame_time: Instant,
    destroyed: bool,
}

impl AppContext {
    /// Create the swapchain and renderer for `window`.
    ///
    /// # Safety
    /// `gpu` must have been built for `window`.
    pub(crate) unsafe fn new(
        window: Arc<Window>,
        gpu: GpuContext,
        vsync: bool,
        shaders: &ShaderLoader,
        renderer_config: RendererConfig,
    ) -> anyhow::Result<Self> {
        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        // SAFETY: the surface belongs to this GPU context
        let swapchain = unsafe { gpu.surface().create_swapchain(&gpu, width, height, vsync)? };

        tracing::info!(
            "Swapchain created: {}x{} ({} images)",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.image_count()
        );

        // SAFETY: the swapchain was just created from this context
        let renderer = unsafe { Renderer::new(&gpu, swapchain, shaders, renderer_config)? };

        Ok(Self {
            window,
            gpu,
            renderer,
            frame_count: 0,
            last_frame_time: Instant::now(),
            destroyed: false,
        })
    }

    /// Get the current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.renderer.extent()
    }

    /// Get the aspect ratio (width / height).
    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.extent();
        extent.width as f32 / extent.height.max(1) as f32
    }

    /// Destroy the renderer. Idempotent.
    ///
    /// # Safety
    /// Must be called before the GPU context is dropped.
    pub(crate) unsafe fn cleanup(&mut self) {
        if self.destroyed {
            return;
        }
        // SAFETY: the renderer was created from this context
        unsafe { self.renderer.destroy(&self.gpu) };
        self.destroyed = true;
    }
}
