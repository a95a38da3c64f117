//! Parallel draw recording.
//!
//! The scene subpass is split across the worker pool: each worker records
//! one contiguous range of drawables into a secondary command buffer taken
//! from its own command pool. The orchestrator executes the secondaries in
//! range order, then records the full-screen subpasses inline.

use ash::vk;
use lumen_core::constants::ORCHESTRATOR_THREAD;
use lumen_core::{partition_draws, DrawRange};
use lumen_gpu::{CommandBuffer, CommandPool, Frame, GpuError, RenderPassBinding};

use crate::error::{RenderError, Result};
use crate::scene::{Drawable, Scene};
use crate::technique::{SubpassDraws, FRAME_SET, MATERIAL_SET};
use crate::worker_pool::{CancelToken, WorkerPool};

/// Pipeline state of one subpass for one frame.
#[derive(Clone, Copy, Debug)]
pub struct SubpassRecording {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    /// The frame's set 0 for this subpass.
    pub descriptor_set: vk::DescriptorSet,
    pub draws: SubpassDraws,
}

/// Everything needed to record one frame's render pass.
pub struct RecordingContext<'a> {
    pub render_pass: vk::RenderPass,
    pub extent: vk::Extent2D,
    pub clear_values: &'a [vk::ClearValue],
    pub queue_family: u32,
    /// One entry per subpass, in order.
    pub subpasses: &'a [SubpassRecording],
    /// Material set per material index.
    pub materials: &'a [vk::DescriptorSet],
}

/// State shared by every worker of one recording batch.
#[derive(Clone, Copy)]
struct WorkerShared<'a> {
    binding: RenderPassBinding,
    extent: vk::Extent2D,
    subpass: SubpassRecording,
    drawables: &'a [Drawable],
    materials: &'a [vk::DescriptorSet],
    cancel: &'a CancelToken,
}

/// Record `range` of the scene into a secondary buffer from `pool`.
///
/// Empty ranges, and ranges that observe cancellation, produce no buffer.
///
/// # Safety
/// `pool` must belong to the calling task for the duration of the call and
/// every handle in `shared` must be valid.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
unsafe fn record_range(
    pool: &mut CommandPool,
    range: DrawRange,
    shared: WorkerShared<'_>,
) -> Result<Option<vk::CommandBuffer>> {
    if range.is_empty() || shared.cancel.is_cancelled() {
        return Ok(None);
    }

    let mut cmd = pool.request_command_buffer(vk::CommandBufferLevel::SECONDARY)?;
    cmd.begin_secondary(Some(shared.binding))?;

    let layout = shared.subpass.layout;
    cmd.bind_graphics_pipeline(shared.subpass.pipeline);
    cmd.set_viewport_and_scissor(shared.extent);
    cmd.bind_descriptor_sets(layout, FRAME_SET, &[shared.subpass.descriptor_set]);

    for drawable in &shared.drawables[range.as_range()] {
        if shared.cancel.is_cancelled() {
            cmd.end()?;
            return Ok(None);
        }

        cmd.push_constants(
            layout,
            vk::ShaderStageFlags::VERTEX,
            0,
            bytemuck::bytes_of(&drawable.transform),
        );
        cmd.bind_mesh(drawable.vertex_buffer, drawable.index_buffer);
        cmd.bind_descriptor_sets(layout, MATERIAL_SET, &[shared.materials[drawable.material]]);
        cmd.draw_indexed(drawable.index_count);
    }

    cmd.end()?;
    tracing::trace!(
        thread = pool.thread_index(),
        start = range.start,
        end = range.end,
        "Recorded draw range"
    );
    Ok(Some(cmd.handle()))
}

/// Worker results in partition order, skipping ranges that recorded
/// nothing. The first failure wins.
fn collect_secondaries(
    results: Vec<Result<Option<vk::CommandBuffer>>>,
) -> Result<Vec<vk::CommandBuffer>> {
    let mut secondaries = Vec::with_capacity(results.len());
    for result in results {
        if let Some(handle) = result? {
            secondaries.push(handle);
        }
    }
    Ok(secondaries)
}

/// Record the frame's render pass into a primary buffer from the
/// orchestrator's pool.
///
/// Each subpass executes one secondary buffer per non-empty draw range, so
/// fewer secondaries than worker threads run when there are fewer draws.
///
/// The frame must have been waited and reset. On error or cancellation
/// nothing recorded here may be submitted; the buffers are recycled by the
/// frame's next reset.
///
/// # Safety
/// Every handle in `ctx` must be valid and compatible with the frame's
/// framebuffer.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn record_frame(
    frame: &mut Frame,
    workers: &WorkerPool,
    cancel: &CancelToken,
    ctx: &RecordingContext<'_>,
    scene: &Scene,
) -> Result<CommandBuffer> {
    let Some((first, rest)) = ctx.subpasses.split_first() else {
        return Err(GpuError::InvalidRenderGraph("no subpasses to record".to_string()).into());
    };
    if first.draws != SubpassDraws::SceneGeometry {
        return Err(RenderError::Config(
            "subpass 0 must draw scene geometry".to_string(),
        ));
    }
    scene.check_materials(ctx.materials.len())?;

    let framebuffer = frame.framebuffer();
    let mut primary = frame.request_command_buffer(
        ctx.queue_family,
        vk::CommandBufferLevel::PRIMARY,
        ORCHESTRATOR_THREAD,
    )?;
    primary.begin()?;
    primary.begin_render_pass(
        ctx.render_pass,
        framebuffer,
        ctx.extent,
        ctx.clear_values,
        vk::SubpassContents::SECONDARY_COMMAND_BUFFERS,
    );

    let binding = primary
        .render_pass_binding()
        .ok_or_else(|| GpuError::InvalidState("primary buffer lost its render pass".to_string()))?;
    let shared = WorkerShared {
        binding,
        extent: ctx.extent,
        subpass: *first,
        drawables: scene.drawables(),
        materials: ctx.materials,
        cancel,
    };

    let ranges = partition_draws(scene.len(), workers.thread_count());
    let pools = frame.worker_command_pools(ctx.queue_family, workers.thread_count())?;
    let tasks: Vec<(DrawRange, &mut CommandPool)> = ranges.into_iter().zip(pools).collect();

    let results = workers.fork_join(tasks, |_, (range, pool)| unsafe {
        record_range(pool, range, shared)
    });

    let secondaries = collect_secondaries(results)?;
    if cancel.is_cancelled() {
        return Err(RenderError::Cancelled);
    }

    primary.execute_commands(&secondaries);

    for subpass in rest {
        primary.next_subpass(vk::SubpassContents::INLINE);
        primary.bind_graphics_pipeline(subpass.pipeline);
        primary.set_viewport_and_scissor(ctx.extent);
        primary.bind_descriptor_sets(subpass.layout, FRAME_SET, &[subpass.descriptor_set]);
        primary.draw(3);
    }

    primary.end_render_pass();
    primary.end()?;

    tracing::trace!(
        frame = frame.index(),
        drawables = scene.len(),
        secondaries = secondaries.len(),
        "Frame recorded"
    );
    Ok(primary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::time::Duration;

    fn cmd(raw: u64) -> vk::CommandBuffer {
        vk::CommandBuffer::from_raw(raw)
    }

    #[test]
    fn secondaries_keep_partition_order() {
        let collected =
            collect_secondaries(vec![Ok(Some(cmd(10))), Ok(None), Ok(Some(cmd(30))), Ok(Some(cmd(20)))])
                .unwrap();
        assert_eq!(collected, vec![cmd(10), cmd(30), cmd(20)]);
    }

    #[test]
    fn worker_failure_propagates() {
        let result = collect_secondaries(vec![Ok(Some(cmd(1))), Err(RenderError::Cancelled)]);
        assert!(matches!(result, Err(RenderError::Cancelled)));
    }

    #[test]
    fn partitioned_batch_replays_in_range_order() {
        // Stand-in for recording: each task "records" a handle named after
        // its range start, later ranges finishing first.
        let workers = WorkerPool::new(4).unwrap();
        let ranges = partition_draws(10, workers.thread_count());

        let results = workers.fork_join(ranges, |_, range: DrawRange| {
            std::thread::sleep(Duration::from_millis(20 - range.start as u64 * 2));
            Ok(Some(cmd(range.start as u64 + 1)))
        });
        let secondaries = collect_secondaries(results).unwrap();

        assert_eq!(secondaries, vec![cmd(1), cmd(4), cmd(7), cmd(9)]);
    }

    #[test]
    fn sparse_batch_skips_empty_ranges() {
        let workers = WorkerPool::new(8).unwrap();
        let ranges = partition_draws(2, workers.thread_count());

        let results = workers.fork_join(ranges, |_, range: DrawRange| {
            Ok((!range.is_empty()).then(|| cmd(range.len() as u64)))
        });

        assert_eq!(collect_secondaries(results).unwrap(), vec![cmd(2)]);
    }
}
