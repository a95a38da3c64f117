//! Command pools and command buffers.
//!
//! A [`CommandPool`] belongs to exactly one (thread, queue family) pair and
//! recycles its buffers: [`CommandPool::reset`] resets the Vulkan pool and
//! rewinds the primary and secondary recycle lists, so the next frame that
//! uses the pool gets the same buffers back.

use std::sync::Arc;

use crate::error::Result;
use crate::pool::HandlePool;
use ash::vk;

/// The render pass, framebuffer and subpass a primary buffer is currently
/// recording into. Secondary buffers inherit it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderPassBinding {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub subpass: u32,
}

/// Command pool for one thread and one queue family.
pub struct CommandPool {
    device: Arc<ash::Device>,
    pool: vk::CommandPool,
    queue_family: u32,
    thread_index: usize,
    primary: HandlePool<vk::CommandBuffer>,
    secondary: HandlePool<vk::CommandBuffer>,
}

impl CommandPool {
    /// Create a new command pool.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: Arc<ash::Device>,
        queue_family: u32,
        thread_index: usize,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);

        let pool = device.create_command_pool(&create_info, None)?;

        tracing::debug!(queue_family, thread_index, "Command pool created");

        Ok(Self {
            device,
            pool,
            queue_family,
            thread_index,
            primary: HandlePool::new(),
            secondary: HandlePool::new(),
        })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Get the queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Index of the thread that owns this pool.
    pub fn thread_index(&self) -> usize {
        self.thread_index
    }

    /// Hand out the next free buffer of `level`, allocating one if the
    /// recycle list is exhausted.
    ///
    /// # Safety
    /// The device must be valid and the pool must only be used by its thread.
    pub unsafe fn request_command_buffer(
        &mut self,
        level: vk::CommandBufferLevel,
    ) -> Result<CommandBuffer> {
        let (device, pool) = (&self.device, self.pool);
        let list = if level == vk::CommandBufferLevel::SECONDARY {
            &mut self.secondary
        } else {
            &mut self.primary
        };

        let handle = list.request_with(|| {
            let alloc_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(pool)
                .level(level)
                .command_buffer_count(1);
            let buffers = unsafe { device.allocate_command_buffers(&alloc_info)? };
            Ok::<_, crate::GpuError>(buffers[0])
        })?;

        Ok(CommandBuffer {
            device: Arc::clone(&self.device),
            handle,
            level,
            binding: None,
        })
    }

    /// Number of buffers of `level` handed out since the last reset.
    pub fn in_use_count(&self, level: vk::CommandBufferLevel) -> usize {
        if level == vk::CommandBufferLevel::SECONDARY {
            self.secondary.in_use_count()
        } else {
            self.primary.in_use_count()
        }
    }

    /// Reset every buffer of the pool and rewind the recycle lists.
    ///
    /// # Safety
    /// No buffer from this pool may be pending execution.
    pub unsafe fn reset(&mut self) -> Result<()> {
        self.device
            .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())?;
        self.primary.reset();
        self.secondary.reset();
        Ok(())
    }

    /// Destroy the command pool and every buffer allocated from it.
    ///
    /// # Safety
    /// No buffer from this pool may be pending execution.
    pub unsafe fn destroy(&mut self) {
        self.primary.drain();
        self.secondary.drain();
        self.device.destroy_command_pool(self.pool, None);
    }
}

/// A command buffer being recorded.
///
/// Primary buffers track the render pass binding they are inside so that
/// workers can begin secondary buffers with matching inheritance.
pub struct CommandBuffer {
    device: Arc<ash::Device>,
    handle: vk::CommandBuffer,
    level: vk::CommandBufferLevel,
    binding: Option<RenderPassBinding>,
}

impl CommandBuffer {
    /// Get the raw buffer handle.
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    /// Primary or secondary.
    pub fn level(&self) -> vk::CommandBufferLevel {
        self.level
    }

    /// The render pass binding currently recorded into, if any.
    pub fn render_pass_binding(&self) -> Option<RenderPassBinding> {
        self.binding
    }

    /// Begin a primary buffer for one-time submission.
    ///
    /// # Safety
    /// The buffer must not be pending execution.
    pub unsafe fn begin(&mut self) -> Result<()> {
        assert_eq!(
            self.level,
            vk::CommandBufferLevel::PRIMARY,
            "begin() is for primary buffers; use begin_secondary()"
        );
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        self.device.begin_command_buffer(self.handle, &begin_info)?;
        Ok(())
    }

    /// Begin a secondary buffer that continues the render pass in `inheritance`.
    ///
    /// # Panics
    /// Panics if the buffer is not secondary or `inheritance` is `None`.
    ///
    /// # Safety
    /// The buffer must not be pending execution.
    pub unsafe fn begin_secondary(&mut self, inheritance: Option<RenderPassBinding>) -> Result<()> {
        assert_eq!(
            self.level,
            vk::CommandBufferLevel::SECONDARY,
            "begin_secondary() called on a primary buffer"
        );
        let Some(binding) = inheritance else {
            panic!("secondary command buffer requires render pass inheritance information");
        };

        let inheritance_info = vk::CommandBufferInheritanceInfo::default()
            .render_pass(binding.render_pass)
            .subpass(binding.subpass)
            .framebuffer(binding.framebuffer);
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(
                vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
                    | vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE,
            )
            .inheritance_info(&inheritance_info);

        self.device.begin_command_buffer(self.handle, &begin_info)?;
        self.binding = Some(binding);
        Ok(())
    }

    /// End recording.
    ///
    /// # Safety
    /// The buffer must be in the recording state and outside any render pass
    /// it began itself.
    pub unsafe fn end(&mut self) -> Result<()> {
        self.device.end_command_buffer(self.handle)?;
        self.binding = None;
        Ok(())
    }

    /// Begin `render_pass` on `framebuffer` at subpass 0.
    ///
    /// # Safety
    /// The buffer must be a recording primary buffer.
    pub unsafe fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
        contents: vk::SubpassContents,
    ) {
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            })
            .clear_values(clear_values);

        self.device
            .cmd_begin_render_pass(self.handle, &begin_info, contents);
        self.binding = Some(RenderPassBinding {
            render_pass,
            framebuffer,
            subpass: 0,
        });
    }

    /// Advance to the next subpass.
    ///
    /// # Safety
    /// The buffer must be inside a render pass with a subpass remaining.
    pub unsafe fn next_subpass(&mut self, contents: vk::SubpassContents) {
        self.device.cmd_next_subpass(self.handle, contents);
        if let Some(binding) = self.binding.as_mut() {
            binding.subpass += 1;
        }
    }

    /// End the current render pass.
    ///
    /// # Safety
    /// The buffer must be inside the final subpass of a render pass.
    pub unsafe fn end_render_pass(&mut self) {
        self.device.cmd_end_render_pass(self.handle);
        self.binding = None;
    }

    /// Bind a graphics pipeline.
    ///
    /// # Safety
    /// The buffer must be recording.
    pub unsafe fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        self.device
            .cmd_bind_pipeline(self.handle, vk::PipelineBindPoint::GRAPHICS, pipeline);
    }

    /// Set viewport and scissor to cover `extent`.
    ///
    /// # Safety
    /// The buffer must be recording with a pipeline using dynamic viewport
    /// and scissor.
    pub unsafe fn set_viewport_and_scissor(&self, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        };
        self.device.cmd_set_viewport(self.handle, 0, &[viewport]);
        self.device.cmd_set_scissor(self.handle, 0, &[scissor]);
    }

    /// Push constant bytes.
    ///
    /// # Safety
    /// The range must lie within the layout's push constant ranges.
    pub unsafe fn push_constants(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        bytes: &[u8],
    ) {
        self.device
            .cmd_push_constants(self.handle, layout, stages, offset, bytes);
    }

    /// Bind descriptor sets starting at `first_set`.
    ///
    /// # Safety
    /// The sets must be compatible with `layout`.
    pub unsafe fn bind_descriptor_sets(
        &self,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        self.device.cmd_bind_descriptor_sets(
            self.handle,
            vk::PipelineBindPoint::GRAPHICS,
            layout,
            first_set,
            sets,
            &[],
        );
    }

    /// Bind a vertex buffer at binding 0 and a `u32` index buffer.
    ///
    /// # Safety
    /// The buffers must be valid.
    pub unsafe fn bind_mesh(&self, vertex_buffer: vk::Buffer, index_buffer: vk::Buffer) {
        self.device
            .cmd_bind_vertex_buffers(self.handle, 0, &[vertex_buffer], &[0]);
        self.device
            .cmd_bind_index_buffer(self.handle, index_buffer, 0, vk::IndexType::UINT32);
    }

    /// Indexed draw of one instance.
    ///
    /// # Safety
    /// A pipeline and index buffer must be bound.
    pub unsafe fn draw_indexed(&self, index_count: u32) {
        self.device
            .cmd_draw_indexed(self.handle, index_count, 1, 0, 0, 0);
    }

    /// Non-indexed draw of one instance.
    ///
    /// # Safety
    /// A pipeline must be bound.
    pub unsafe fn draw(&self, vertex_count: u32) {
        self.device.cmd_draw(self.handle, vertex_count, 1, 0, 0);
    }

    /// Execute secondary buffers, in slice order.
    ///
    /// # Safety
    /// The buffer must be a primary inside a subpass begun with
    /// `SECONDARY_COMMAND_BUFFERS` contents; the secondaries must be ended.
    pub unsafe fn execute_commands(&self, secondaries: &[vk::CommandBuffer]) {
        if secondaries.is_empty() {
            return;
        }
        self.device.cmd_execute_commands(self.handle, secondaries);
    }
}

/// Submit command buffers to a queue.
///
/// # Safety
/// All handles must be valid.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn submit_command_buffers(
    device: &ash::Device,
    queue: vk::Queue,
    command_buffers: &[vk::CommandBuffer],
    wait_semaphores: &[vk::Semaphore],
    wait_stages: &[vk::PipelineStageFlags],
    signal_semaphores: &[vk::Semaphore],
    fence: vk::Fence,
) -> Result<()> {
    let submit_info = vk::SubmitInfo::default()
        .command_buffers(command_buffers)
        .wait_semaphores(wait_semaphores)
        .wait_dst_stage_mask(wait_stages)
        .signal_semaphores(signal_semaphores);

    device.queue_submit(queue, &[submit_info], fence)?;
    Ok(())
}
