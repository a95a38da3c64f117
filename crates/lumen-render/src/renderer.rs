//! The renderer: owns the swapchain-sized frame set, the render pass of the
//! selected technique, its pipelines, and the recording worker pool.

use std::mem::size_of;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use lumen_core::constants::MODEL_PUSH_CONSTANT_SIZE;
use lumen_core::SubpassInfo;
use lumen_gpu::{
    create_semaphore, pool_sizes, submit_command_buffers, Attachment, CommandBuffer,
    DescriptorPool, DescriptorResourceReference, DescriptorSet, DescriptorSetLayout, FenceWait,
    Frame, GpuAllocator, GpuBuffer, GpuContext, GraphicsPipeline, GraphicsPipelineConfig,
    LoadStoreInfo, RenderPass, RenderTarget, ShaderResource, Swapchain,
};
use lumen_shaders::ShaderLoader;

use crate::config::RendererConfig;
use crate::error::{RenderError, Result};
use crate::recorder::{record_frame, RecordingContext, SubpassRecording};
use crate::scene::{Drawable, FrameUniforms, MaterialUniforms, MeshData, Scene, Vertex};
use crate::technique::{RenderGraphDesc, SubpassDesc, SubpassDraws, FRAME_SET, MATERIAL_SET};
use crate::worker_pool::{CancelToken, WorkerPool};

/// Material sets the renderer can hold.
pub const MAX_MATERIALS: u32 = 256;

/// Identifies one frame's use of the frame set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameContext {
    /// Slot in the frame set (equal to the image index: one frame per image).
    pub frame_index: usize,
    /// Swapchain image being rendered.
    pub image_index: u32,
    /// Monotonic count of rendered frames.
    pub frame_number: u64,
}

/// Result of [`Renderer::render_frame`].
#[derive(Clone, Copy, Debug)]
pub struct FrameOutcome {
    pub context: FrameContext,
    /// Presentation reported the swapchain as suboptimal or out of date.
    pub needs_recreate: bool,
}

/// GPU buffers of an uploaded mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshHandle {
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
}

impl MeshHandle {
    /// A drawable of this mesh.
    pub fn drawable(&self, transform: glam::Mat4, material: usize) -> Drawable {
        Drawable {
            transform,
            vertex_buffer: self.vertex_buffer,
            index_buffer: self.index_buffer,
            index_count: self.index_count,
            material,
        }
    }
}

/// Descriptor set layout and pipeline of one subpass.
struct SubpassPipeline {
    set_layout: DescriptorSetLayout,
    pipeline: GraphicsPipeline,
    draws: SubpassDraws,
}

/// Per-frame uniform buffer and one set 0 per subpass.
struct FrameBindings {
    uniforms: GpuBuffer,
    sets: Vec<DescriptorSet>,
}

struct MaterialStore {
    layout: DescriptorSetLayout,
    pool: DescriptorPool,
    buffers: Vec<GpuBuffer>,
    sets: Vec<vk::DescriptorSet>,
}

fn material_resources() -> [ShaderResource; 1] {
    [ShaderResource::uniform_buffer(
        MATERIAL_SET,
        0,
        vk::ShaderStageFlags::FRAGMENT,
    )]
}

/// Submit one primary command buffer.
///
/// # Safety
/// All handles must be valid and `command_buffer` fully recorded.
pub unsafe fn submit(
    device: &ash::Device,
    queue: vk::Queue,
    wait_semaphore: vk::Semaphore,
    wait_stage: vk::PipelineStageFlags,
    signal_semaphore: vk::Semaphore,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
) -> Result<()> {
    submit_command_buffers(
        device,
        queue,
        &[command_buffer],
        &[wait_semaphore],
        &[wait_stage],
        &[signal_semaphore],
        fence,
    )?;
    Ok(())
}

/// Create one render target and frame per swapchain image.
///
/// Every frame gets a descriptor pool sized for one set per subpass of
/// `desc` and command pool slots for `thread_count` threads.
///
/// # Safety
/// The GPU context and swapchain must be valid.
pub unsafe fn create_render_target_and_frames(
    gpu: &GpuContext,
    swapchain: &Swapchain,
    desc: &RenderGraphDesc,
    thread_count: usize,
) -> Result<Vec<Frame>> {
    let sizes = pool_sizes(desc.subpasses.iter().map(|s| s.resources.as_slice()), 1);
    let max_sets = desc.subpasses.len() as u32;

    let mut frames = Vec::with_capacity(swapchain.image_count());
    for (index, &view) in swapchain.image_views.iter().enumerate() {
        let target = RenderTarget::new(
            gpu,
            view,
            swapchain.format,
            swapchain.usage,
            swapchain.extent,
            &desc.attachments,
        )?;
        let descriptor_pool = DescriptorPool::new(gpu.shared_device(), max_sets, &sizes)?;
        frames.push(Frame::new(
            gpu.shared_device(),
            index,
            target,
            descriptor_pool,
            thread_count,
        ));
    }

    tracing::info!(
        frames = frames.len(),
        attachments = desc.attachment_count(),
        threads = thread_count,
        "Frames created"
    );
    Ok(frames)
}

/// Derive and create the render pass for `attachments` and `subpasses`.
///
/// # Safety
/// The GPU context must be valid.
pub unsafe fn create_render_pass(
    gpu: &GpuContext,
    attachments: &[Attachment],
    subpasses: &[SubpassInfo],
    load_store: &[LoadStoreInfo],
) -> Result<RenderPass> {
    Ok(RenderPass::new(
        gpu.shared_device(),
        attachments,
        subpasses,
        load_store,
    )?)
}

/// Check the technique against the device limits.
fn check_limits(gpu: &GpuContext, desc: &RenderGraphDesc) -> Result<()> {
    let caps = gpu.capabilities();
    for (index, subpass) in desc.subpasses.iter().enumerate() {
        let colors = subpass
            .info
            .outputs
            .iter()
            .filter(|&&a| {
                a == 0 || !lumen_gpu::is_depth_stencil_format(desc.attachments[a as usize - 1].format)
            })
            .count() as u32;
        if colors > caps.max_color_attachments {
            return Err(RenderError::Config(format!(
                "{} subpass {index} writes {colors} colour attachments, device supports {}",
                desc.name, caps.max_color_attachments
            )));
        }
        if subpass.info.inputs.len() as u32 > caps.max_per_stage_input_attachments {
            return Err(RenderError::Config(format!(
                "{} subpass {index} reads {} input attachments, device supports {}",
                desc.name,
                subpass.info.inputs.len(),
                caps.max_per_stage_input_attachments
            )));
        }
    }
    Ok(())
}

/// Multi-subpass renderer with parallel scene recording.
pub struct Renderer {
    config: RendererConfig,
    desc: RenderGraphDesc,
    clear_values: Vec<vk::ClearValue>,
    swapchain: Swapchain,
    render_pass: RenderPass,
    subpasses: Vec<SubpassPipeline>,
    frames: Vec<Frame>,
    bindings: Vec<FrameBindings>,
    materials: MaterialStore,
    meshes: Vec<(GpuBuffer, GpuBuffer)>,
    workers: WorkerPool,
    cancel: CancelToken,
    free_acquire_semaphores: Vec<vk::Semaphore>,
    frame_number: u64,
    suboptimal_logged: bool,
}

impl Renderer {
    /// Build the technique named in `config` over `swapchain`.
    ///
    /// # Safety
    /// The GPU context and swapchain must be valid; the renderer takes
    /// ownership of the swapchain.
    pub unsafe fn new(
        gpu: &GpuContext,
        swapchain: Swapchain,
        shaders: &ShaderLoader,
        config: RendererConfig,
    ) -> Result<Self> {
        let desc = RenderGraphDesc::by_name(&config.technique, gpu.depth_format())?
            .with_clear_color(config.clear_color);
        check_limits(gpu, &desc)?;

        let workers = WorkerPool::new(config.resolved_worker_threads())?;
        let frames = create_render_target_and_frames(
            gpu,
            &swapchain,
            &desc,
            workers.thread_count() + 1,
        )?;

        let first = frames
            .first()
            .ok_or_else(|| RenderError::Config("swapchain has no images".to_string()))?;
        let render_pass = create_render_pass(
            gpu,
            first.render_target().attachments(),
            &desc.subpass_infos(),
            &desc.load_store,
        )?;

        let material_layout =
            DescriptorSetLayout::new(gpu.shared_device(), MATERIAL_SET, &material_resources())?;
        let material_pool = DescriptorPool::new(
            gpu.shared_device(),
            MAX_MATERIALS,
            &pool_sizes([material_resources().as_slice()], MAX_MATERIALS),
        )?;

        let mut renderer = Self {
            clear_values: desc.vk_clear_values(),
            config,
            desc,
            swapchain,
            render_pass,
            subpasses: Vec::new(),
            frames,
            bindings: Vec::new(),
            materials: MaterialStore {
                layout: material_layout,
                pool: material_pool,
                buffers: Vec::new(),
                sets: Vec::new(),
            },
            meshes: Vec::new(),
            workers,
            cancel: CancelToken::new(),
            free_acquire_semaphores: Vec::new(),
            frame_number: 0,
            suboptimal_logged: false,
        };

        for frame in &mut renderer.frames {
            frame.create_framebuffer(renderer.render_pass.handle())?;
        }
        renderer.create_pipelines(gpu, shaders)?;
        renderer.create_frame_bindings(gpu)?;

        tracing::info!(
            technique = %renderer.desc.name,
            subpasses = renderer.desc.subpasses.len(),
            frames = renderer.frames.len(),
            workers = renderer.workers.thread_count(),
            "Renderer initialized"
        );
        Ok(renderer)
    }

    unsafe fn create_pipelines(&mut self, gpu: &GpuContext, shaders: &ShaderLoader) -> Result<()> {
        let device = gpu.shared_device();

        for (index, subpass) in self.desc.subpasses.iter().enumerate() {
            let index = index as u32;
            let (vertex_shader, fragment_shader) = shaders.load_subpass(&self.desc.name, index)?;
            let set_layout = DescriptorSetLayout::new(Arc::clone(&device), FRAME_SET, &subpass.resources)?;

            let result = match subpass.draws {
                SubpassDraws::SceneGeometry => {
                    let config = GraphicsPipelineConfig {
                        vertex_shader,
                        fragment_shader,
                        vertex_bindings: Vertex::binding_descriptions(),
                        vertex_attributes: Vertex::attribute_descriptions(),
                        ..GraphicsPipelineConfig::default()
                    };
                    let push = [vk::PushConstantRange {
                        stage_flags: vk::ShaderStageFlags::VERTEX,
                        offset: 0,
                        size: MODEL_PUSH_CONSTANT_SIZE,
                    }];
                    GraphicsPipeline::new(
                        &device,
                        &config,
                        &self.render_pass,
                        index,
                        &[set_layout.handle(), self.materials.layout.handle()],
                        &push,
                    )
                }
                SubpassDraws::FullScreen => GraphicsPipeline::new(
                    &device,
                    &GraphicsPipelineConfig::full_screen(vertex_shader, fragment_shader),
                    &self.render_pass,
                    index,
                    &[set_layout.handle()],
                    &[],
                ),
            };

            let pipeline = match result {
                Ok(pipeline) => pipeline,
                Err(err) => {
                    set_layout.destroy();
                    return Err(err.into());
                }
            };
            self.subpasses.push(SubpassPipeline {
                set_layout,
                pipeline,
                draws: subpass.draws,
            });
        }
        Ok(())
    }

    unsafe fn create_frame_bindings(&mut self, gpu: &GpuContext) -> Result<()> {
        let uniform_size = size_of::<FrameUniforms>() as u64;

        for frame in &mut self.frames {
            let uniforms = gpu.allocator().lock().create_buffer(
                uniform_size,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
                &format!("frame {} uniforms", frame.index()),
            )?;

            let mut sets = Vec::with_capacity(self.subpasses.len());
            for (desc, subpass) in self.desc.subpasses.iter().zip(&self.subpasses) {
                let reference = frame_reference(desc, frame.render_target(), &uniforms)?;
                let set = DescriptorSet::new(&subpass.set_layout, frame.descriptor_pool_mut(), &reference)?;
                set.update(&[]);
                sets.push(set);
            }

            self.bindings.push(FrameBindings { uniforms, sets });
        }
        Ok(())
    }

    /// The technique being rendered.
    pub fn technique(&self) -> &RenderGraphDesc {
        &self.desc
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    /// Token that aborts in-flight recording when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Upload a mesh into host-visible vertex and index buffers.
    pub fn upload_mesh(&mut self, gpu: &GpuContext, mesh: &MeshData) -> Result<MeshHandle> {
        let mut allocator = gpu.allocator().lock();
        let vertices = allocator.create_buffer_with_data(
            &mesh.vertices,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "mesh vertices",
        )?;
        let indices = match allocator.create_buffer_with_data(
            &mesh.indices,
            vk::BufferUsageFlags::INDEX_BUFFER,
            "mesh indices",
        ) {
            Ok(buffer) => buffer,
            Err(err) => {
                let mut vertices = vertices;
                allocator.free_buffer(&mut vertices)?;
                return Err(err.into());
            }
        };

        let handle = MeshHandle {
            vertex_buffer: vertices.buffer,
            index_buffer: indices.buffer,
            index_count: mesh.index_count(),
        };
        self.meshes.push((vertices, indices));
        tracing::debug!(vertices = mesh.vertices.len(), indices = mesh.indices.len(), "Mesh uploaded");
        Ok(handle)
    }

    /// Create a material and return its index.
    ///
    /// # Safety
    /// The GPU context must be valid.
    pub unsafe fn create_material(
        &mut self,
        gpu: &GpuContext,
        material: &MaterialUniforms,
    ) -> Result<usize> {
        if self.materials.pool.remaining() == 0 {
            return Err(RenderError::Config(format!(
                "material limit of {MAX_MATERIALS} reached"
            )));
        }

        let index = self.materials.sets.len();
        let buffer = gpu.allocator().lock().create_buffer_with_data(
            std::slice::from_ref(material),
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            &format!("material {index}"),
        )?;

        let mut reference = DescriptorResourceReference::new();
        reference.bind_buffer(0, 0, buffer.buffer, 0, buffer.size);
        let set = DescriptorSet::new(&self.materials.layout, &mut self.materials.pool, &reference)?;
        set.update(&[]);

        self.materials.buffers.push(buffer);
        self.materials.sets.push(set.handle());
        Ok(index)
    }

    /// Number of materials created so far.
    pub fn material_count(&self) -> usize {
        self.materials.sets.len()
    }

    /// Record the frame's commands into a primary command buffer.
    ///
    /// # Safety
    /// The frame at `ctx.frame_index` must be waited and reset.
    pub unsafe fn record_commands(
        &mut self,
        gpu: &GpuContext,
        ctx: &FrameContext,
        scene: &Scene,
    ) -> Result<CommandBuffer> {
        let bindings = &self.bindings[ctx.frame_index];
        let subpasses: Vec<SubpassRecording> = self
            .subpasses
            .iter()
            .zip(&bindings.sets)
            .map(|(subpass, set)| SubpassRecording {
                pipeline: subpass.pipeline.pipeline,
                layout: subpass.pipeline.layout,
                descriptor_set: set.handle(),
                draws: subpass.draws,
            })
            .collect();

        let recording = RecordingContext {
            render_pass: self.render_pass.handle(),
            extent: self.swapchain.extent,
            clear_values: &self.clear_values,
            queue_family: gpu.graphics_queue_family(),
            subpasses: &subpasses,
            materials: &self.materials.sets,
        };

        record_frame(
            &mut self.frames[ctx.frame_index],
            &self.workers,
            &self.cancel,
            &recording,
            scene,
        )
    }

    /// Acquire, wait, reset, record, submit and present one frame.
    ///
    /// Acquire failures are returned as errors; a suboptimal acquire is
    /// logged once and rendering continues.
    ///
    /// # Safety
    /// The GPU context must be the one the renderer was created with.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub unsafe fn render_frame(
        &mut self,
        gpu: &GpuContext,
        scene: &Scene,
        uniforms: &FrameUniforms,
    ) -> Result<FrameOutcome> {
        let acquire_semaphore = match self.free_acquire_semaphores.pop() {
            Some(semaphore) => semaphore,
            None => create_semaphore(gpu.device())?,
        };

        let acquired = match self.swapchain.acquire_next_image(acquire_semaphore) {
            Ok(acquired) => acquired,
            Err(err) => {
                self.free_acquire_semaphores.push(acquire_semaphore);
                return Err(err.into());
            }
        };
        if acquired.suboptimal && !self.suboptimal_logged {
            tracing::warn!("Swapchain is suboptimal for the surface, continuing");
            self.suboptimal_logged = true;
        }

        let ctx = FrameContext {
            frame_index: acquired.index as usize,
            image_index: acquired.index,
            frame_number: self.frame_number,
        };

        self.wait_frame(&ctx)?;
        let frame = &mut self.frames[ctx.frame_index];
        frame.reset()?;
        let previous = frame.swap_acquire_semaphore(acquire_semaphore);
        if previous != vk::Semaphore::null() {
            self.free_acquire_semaphores.push(previous);
        }

        self.bindings[ctx.frame_index]
            .uniforms
            .write_pod(0, std::slice::from_ref(uniforms))?;

        let cmd = self.record_commands(gpu, &ctx, scene)?;

        let frame = &mut self.frames[ctx.frame_index];
        let fence = frame.request_fence()?;
        let render_finished = frame.request_semaphore()?;
        submit(
            gpu.device(),
            gpu.graphics_queue(),
            acquire_semaphore,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            render_finished,
            cmd.handle(),
            fence,
        )?;
        frame.mark_submitted(fence);

        let needs_recreate =
            self.swapchain
                .present(gpu.graphics_queue(), ctx.image_index, &[render_finished])?;

        self.frame_number += 1;
        Ok(FrameOutcome {
            context: ctx,
            needs_recreate,
        })
    }

    /// Wait for the frame's previous submission, retrying on timeout.
    unsafe fn wait_frame(&mut self, ctx: &FrameContext) -> Result<()> {
        let timeout = self.config.fence_timeout_ns;
        let frame = &mut self.frames[ctx.frame_index];
        if self.config.waits_forever() {
            frame.wait_forever()?;
            return Ok(());
        }
        loop {
            match frame.wait(timeout)? {
                FenceWait::Signaled => return Ok(()),
                FenceWait::Timeout => tracing::warn!(
                    frame = ctx.frame_index,
                    frame_number = ctx.frame_number,
                    timeout_ns = timeout,
                    "Frame fence wait timed out, waiting again"
                ),
            }
        }
    }

    /// Destroy every GPU resource the renderer owns.
    ///
    /// # Safety
    /// The GPU context must be the one the renderer was created with.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext) {
        self.cancel.cancel();
        if let Err(err) = gpu.wait_idle() {
            tracing::error!("Device wait failed during renderer shutdown: {err}");
        }

        let device = gpu.device();
        let mut allocator = gpu.allocator().lock();

        for subpass in &self.subpasses {
            subpass.pipeline.destroy(device);
            subpass.set_layout.destroy();
        }
        self.subpasses.clear();

        free_buffers(&mut allocator, self.bindings.drain(..).map(|b| b.uniforms));
        free_buffers(&mut allocator, self.materials.buffers.drain(..));
        self.materials.pool.destroy();
        self.materials.layout.destroy();
        free_buffers(
            &mut allocator,
            self.meshes.drain(..).flat_map(|(v, i)| [v, i]),
        );

        for frame in &mut self.frames {
            let semaphore = frame.acquire_semaphore();
            if semaphore != vk::Semaphore::null() {
                device.destroy_semaphore(semaphore, None);
            }
            frame.destroy(&mut allocator);
        }
        self.frames.clear();
        for semaphore in self.free_acquire_semaphores.drain(..) {
            device.destroy_semaphore(semaphore, None);
        }

        self.render_pass.destroy();
        self.swapchain.destroy(device);

        tracing::info!("Renderer destroyed");
    }
}

fn free_buffers(allocator: &mut GpuAllocator, buffers: impl Iterator<Item = GpuBuffer>) {
    for mut buffer in buffers {
        if let Err(err) = allocator.free_buffer(&mut buffer) {
            tracing::error!("Failed to free buffer: {err}");
        }
    }
}

/// Set 0 contents of `desc` for one frame: the subpass's input attachments
/// in input order, then the frame uniform buffer if declared.
fn frame_reference(
    desc: &SubpassDesc,
    target: &RenderTarget,
    uniforms: &GpuBuffer,
) -> Result<DescriptorResourceReference> {
    let mut reference = DescriptorResourceReference::new();

    for (binding, &attachment) in desc.info.inputs.iter().enumerate() {
        let view = target.view(attachment).ok_or_else(|| {
            RenderError::Config(format!("input attachment {attachment} has no view"))
        })?;
        reference.bind_input_image(binding as u32, 0, view);
    }
    if let Some(binding) = desc.frame_uniform_binding() {
        reference.bind_buffer(binding, 0, uniforms.buffer, 0, uniforms.size);
    }

    Ok(reference)
}
