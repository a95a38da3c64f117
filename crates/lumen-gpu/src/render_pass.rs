//! Multi-subpass render pass construction.
//!
//! A render pass is described by the render target's attachment list, one
//! [`SubpassInfo`] per subpass naming the attachments it reads and writes,
//! and one [`LoadStoreInfo`] per attachment. [`RenderPassLayout::derive`]
//! turns that description into Vulkan attachment descriptions, per-subpass
//! references with inferred layouts, and the subpass dependency chain. It
//! touches no device, so the inference is unit tested directly.

use std::sync::Arc;

use crate::error::{GpuError, Result};
use crate::render_target::Attachment;
use ash::vk;
use lumen_core::{validate_subpasses, SubpassInfo, PRESENT_ATTACHMENT};

/// Load and store operations for one attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadStoreInfo {
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
}

impl LoadStoreInfo {
    pub const fn new(load_op: vk::AttachmentLoadOp, store_op: vk::AttachmentStoreOp) -> Self {
        Self { load_op, store_op }
    }

    /// Clear on load, keep the result.
    pub const fn clear_store() -> Self {
        Self::new(vk::AttachmentLoadOp::CLEAR, vk::AttachmentStoreOp::STORE)
    }

    /// Clear on load, discard after the pass.
    pub const fn clear_discard() -> Self {
        Self::new(vk::AttachmentLoadOp::CLEAR, vk::AttachmentStoreOp::DONT_CARE)
    }
}

impl Default for LoadStoreInfo {
    fn default() -> Self {
        Self::clear_store()
    }
}

/// What one subpass binds, used to validate pipelines against it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubpassCounts {
    pub inputs: u32,
    pub colors: u32,
    pub depth_stencil: bool,
}

/// Attachment references of one subpass.
#[derive(Clone, Debug, Default)]
pub struct SubpassReferences {
    pub inputs: Vec<vk::AttachmentReference>,
    pub colors: Vec<vk::AttachmentReference>,
    pub depth_stencil: Option<vk::AttachmentReference>,
}

impl SubpassReferences {
    pub fn counts(&self) -> SubpassCounts {
        SubpassCounts {
            inputs: self.inputs.len() as u32,
            colors: self.colors.len() as u32,
            depth_stencil: self.depth_stencil.is_some(),
        }
    }

    /// Vulkan description borrowing these references.
    pub fn description(&self) -> vk::SubpassDescription<'_> {
        let description = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .input_attachments(&self.inputs)
            .color_attachments(&self.colors);

        match &self.depth_stencil {
            Some(depth) => description.depth_stencil_attachment(depth),
            None => description,
        }
    }
}

/// Everything needed to create a render pass, derived from its description.
#[derive(Clone, Debug)]
pub struct RenderPassLayout {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub subpasses: Vec<SubpassReferences>,
    pub dependencies: Vec<vk::SubpassDependency>,
}

impl RenderPassLayout {
    /// Derive attachment descriptions, subpass references and dependencies.
    ///
    /// Layout rules:
    /// - final layout is `PRESENT_SRC_KHR` for attachment 0, otherwise the
    ///   attachment-optimal layout of its format class;
    /// - inputs are read in `SHADER_READ_ONLY_OPTIMAL`, unless the attachment
    ///   declares an explicit initial layout, which is kept;
    /// - depth/stencil outputs go to the subpass's single depth reference,
    ///   everything else to its colour list.
    ///
    /// With more than one subpass, dependencies chain external → 0,
    /// each adjacent pair, and last → external.
    pub fn derive(
        attachments: &[Attachment],
        subpasses: &[SubpassInfo],
        load_store: &[LoadStoreInfo],
    ) -> Result<Self> {
        validate_subpasses(subpasses, attachments.len())?;

        if load_store.len() != attachments.len() {
            return Err(GpuError::InvalidRenderGraph(format!(
                "{} load/store entries for {} attachments",
                load_store.len(),
                attachments.len()
            )));
        }

        let attachment_descriptions = attachments
            .iter()
            .zip(load_store)
            .enumerate()
            .map(|(index, (attachment, ops))| {
                vk::AttachmentDescription::default()
                    .format(attachment.format)
                    .samples(attachment.samples)
                    .load_op(ops.load_op)
                    .store_op(ops.store_op)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(attachment.initial_layout)
                    .final_layout(final_layout(index as u32, attachment))
            })
            .collect();

        let references = subpasses
            .iter()
            .enumerate()
            .map(|(index, info)| subpass_references(index, info, attachments))
            .collect::<Result<Vec<_>>>()?;

        let dependencies = subpass_dependencies(&references);

        Ok(Self {
            attachments: attachment_descriptions,
            subpasses: references,
            dependencies,
        })
    }

    /// Binding counts per subpass.
    pub fn counts(&self) -> Vec<SubpassCounts> {
        self.subpasses.iter().map(SubpassReferences::counts).collect()
    }
}

fn final_layout(index: u32, attachment: &Attachment) -> vk::ImageLayout {
    if index == PRESENT_ATTACHMENT {
        vk::ImageLayout::PRESENT_SRC_KHR
    } else if attachment.is_depth_stencil() {
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    } else {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    }
}

fn subpass_references(
    subpass: usize,
    info: &SubpassInfo,
    attachments: &[Attachment],
) -> Result<SubpassReferences> {
    let mut references = SubpassReferences::default();

    for &index in &info.inputs {
        let attachment = &attachments[index as usize];
        let layout = if attachment.initial_layout == vk::ImageLayout::UNDEFINED {
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        } else {
            attachment.initial_layout
        };
        references.inputs.push(vk::AttachmentReference {
            attachment: index,
            layout,
        });
    }

    for &index in &info.outputs {
        let attachment = &attachments[index as usize];
        if attachment.is_depth_stencil() {
            if references.depth_stencil.is_some() {
                return Err(GpuError::InvalidRenderGraph(format!(
                    "subpass {subpass} writes more than one depth/stencil attachment"
                )));
            }
            references.depth_stencil = Some(vk::AttachmentReference {
                attachment: index,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            });
        } else {
            references.colors.push(vk::AttachmentReference {
                attachment: index,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            });
        }
    }

    Ok(references)
}

fn output_stages(references: &SubpassReferences) -> (vk::PipelineStageFlags, vk::AccessFlags) {
    let mut stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    let mut access = vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    if references.depth_stencil.is_some() {
        stages |= vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    }
    (stages, access)
}

fn subpass_dependencies(subpasses: &[SubpassReferences]) -> Vec<vk::SubpassDependency> {
    let count = subpasses.len();
    if count <= 1 {
        return Vec::new();
    }

    let last = (count - 1) as u32;
    let mut dependencies = Vec::with_capacity(count + 1);

    let (first_stages, first_access) = output_stages(&subpasses[0]);
    dependencies.push(vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        dst_stage_mask: first_stages,
        src_access_mask: vk::AccessFlags::MEMORY_READ,
        dst_access_mask: first_access | vk::AccessFlags::COLOR_ATTACHMENT_READ,
        dependency_flags: vk::DependencyFlags::BY_REGION,
    });

    for (src, references) in subpasses.iter().enumerate().take(count - 1) {
        let (src_stages, src_access) = output_stages(references);
        dependencies.push(vk::SubpassDependency {
            src_subpass: src as u32,
            dst_subpass: src as u32 + 1,
            src_stage_mask: src_stages,
            dst_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER,
            src_access_mask: src_access,
            dst_access_mask: vk::AccessFlags::SHADER_READ
                | vk::AccessFlags::INPUT_ATTACHMENT_READ,
            dependency_flags: vk::DependencyFlags::BY_REGION,
        });
    }

    dependencies.push(vk::SubpassDependency {
        src_subpass: last,
        dst_subpass: vk::SUBPASS_EXTERNAL,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_READ
            | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        dst_access_mask: vk::AccessFlags::MEMORY_READ,
        dependency_flags: vk::DependencyFlags::BY_REGION,
    });

    dependencies
}

/// A created render pass with its per-subpass binding counts.
pub struct RenderPass {
    device: Arc<ash::Device>,
    render_pass: vk::RenderPass,
    counts: Vec<SubpassCounts>,
}

impl RenderPass {
    /// Derive and create a render pass.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: Arc<ash::Device>,
        attachments: &[Attachment],
        subpasses: &[SubpassInfo],
        load_store: &[LoadStoreInfo],
    ) -> Result<Self> {
        let layout = RenderPassLayout::derive(attachments, subpasses, load_store)?;

        let descriptions: Vec<vk::SubpassDescription> = layout
            .subpasses
            .iter()
            .map(SubpassReferences::description)
            .collect();

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&layout.attachments)
            .subpasses(&descriptions)
            .dependencies(&layout.dependencies);

        let render_pass = device.create_render_pass(&create_info, None)?;

        tracing::info!(
            attachments = layout.attachments.len(),
            subpasses = layout.subpasses.len(),
            dependencies = layout.dependencies.len(),
            "Render pass created"
        );

        Ok(Self {
            device,
            render_pass,
            counts: layout.counts(),
        })
    }

    /// Get the raw render pass handle.
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Number of subpasses.
    pub fn subpass_count(&self) -> u32 {
        self.counts.len() as u32
    }

    /// Binding counts of `subpass`.
    pub fn counts(&self, subpass: u32) -> Option<SubpassCounts> {
        self.counts.get(subpass as usize).copied()
    }

    /// Destroy the render pass.
    ///
    /// # Safety
    /// No framebuffer or pending command buffer may still use it.
    pub unsafe fn destroy(&self) {
        self.device.destroy_render_pass(self.render_pass, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SWAPCHAIN: vk::Format = vk::Format::B8G8R8A8_SRGB;

    fn color(format: vk::Format) -> Attachment {
        Attachment::new(
            format,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT,
        )
    }

    fn depth() -> Attachment {
        Attachment::new(
            vk::Format::D32_SFLOAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT,
        )
    }

    fn ops(count: usize) -> Vec<LoadStoreInfo> {
        vec![LoadStoreInfo::clear_store(); count]
    }

    /// Swapchain, one colour attachment and one depth attachment.
    fn three_attachments() -> Vec<Attachment> {
        vec![
            color(SWAPCHAIN),
            color(vk::Format::R16G16B16A16_SFLOAT),
            depth(),
        ]
    }

    #[test]
    fn single_subpass_has_no_dependencies() {
        let layout = RenderPassLayout::derive(
            &[color(SWAPCHAIN)],
            &[SubpassInfo::writes([0])],
            &ops(1),
        )
        .unwrap();

        assert!(layout.dependencies.is_empty());
        assert_eq!(layout.subpasses.len(), 1);
        assert_eq!(layout.subpasses[0].colors.len(), 1);
        assert_eq!(
            layout.attachments[0].final_layout,
            vk::ImageLayout::PRESENT_SRC_KHR
        );
    }

    #[test]
    fn two_subpasses_have_three_dependencies() {
        let subpasses = [SubpassInfo::writes([1, 2]), SubpassInfo::new([1, 2], [0])];

        let layout =
            RenderPassLayout::derive(&three_attachments(), &subpasses, &ops(3)).unwrap();

        let chain: Vec<_> = layout
            .dependencies
            .iter()
            .map(|d| (d.src_subpass, d.dst_subpass))
            .collect();
        assert_eq!(
            chain,
            vec![(vk::SUBPASS_EXTERNAL, 0), (0, 1), (1, vk::SUBPASS_EXTERNAL)]
        );

        let entry = &layout.dependencies[0];
        assert_eq!(entry.src_stage_mask, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
        assert_eq!(entry.src_access_mask, vk::AccessFlags::MEMORY_READ);
        assert!(entry
            .dst_stage_mask
            .contains(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT));

        let between = &layout.dependencies[1];
        assert_eq!(between.dst_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert!(between
            .dst_access_mask
            .contains(vk::AccessFlags::INPUT_ATTACHMENT_READ));
        assert!(between
            .src_access_mask
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));

        let exit = &layout.dependencies[2];
        assert_eq!(exit.dst_stage_mask, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
        assert_eq!(exit.dst_access_mask, vk::AccessFlags::MEMORY_READ);

        assert!(layout
            .dependencies
            .iter()
            .all(|d| d.dependency_flags == vk::DependencyFlags::BY_REGION));
    }

    #[test]
    fn dependency_count_is_subpasses_plus_one() {
        let attachments = vec![
            color(SWAPCHAIN),
            color(vk::Format::R8G8B8A8_UNORM),
            color(vk::Format::R8G8B8A8_UNORM),
        ];
        let subpasses = [
            SubpassInfo::writes([1]),
            SubpassInfo::new([1], [2]),
            SubpassInfo::new([2], [0]),
        ];

        let layout = RenderPassLayout::derive(&attachments, &subpasses, &ops(3)).unwrap();

        assert_eq!(layout.dependencies.len(), 4);
    }

    #[test]
    fn inputs_and_depth_outputs_get_inferred_layouts() {
        let subpasses = [SubpassInfo::writes([1, 2]), SubpassInfo::new([1, 2], [0])];

        let layout =
            RenderPassLayout::derive(&three_attachments(), &subpasses, &ops(3)).unwrap();

        let first = &layout.subpasses[0];
        assert_eq!(first.colors.len(), 1);
        assert_eq!(first.colors[0].attachment, 1);
        assert_eq!(
            first.colors[0].layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
        let depth_ref = first.depth_stencil.unwrap();
        assert_eq!(depth_ref.attachment, 2);
        assert_eq!(
            depth_ref.layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );

        let second = &layout.subpasses[1];
        assert_eq!(second.inputs.len(), 2);
        for input in &second.inputs {
            assert_eq!(input.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        }

        assert_eq!(
            layout.attachments[1].final_layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
        assert_eq!(
            layout.attachments[2].final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn explicit_initial_layout_kept_for_inputs() {
        let mut attachments = three_attachments();
        attachments[1] = attachments[1].with_initial_layout(vk::ImageLayout::GENERAL);
        let subpasses = [SubpassInfo::writes([1]), SubpassInfo::new([1], [0])];

        let layout = RenderPassLayout::derive(&attachments, &subpasses, &ops(3)).unwrap();

        assert_eq!(layout.subpasses[1].inputs[0].layout, vk::ImageLayout::GENERAL);
        assert_eq!(layout.attachments[1].initial_layout, vk::ImageLayout::GENERAL);
    }

    #[test]
    fn load_store_and_stencil_ops() {
        let load_store = [
            LoadStoreInfo::clear_store(),
            LoadStoreInfo::clear_discard(),
            LoadStoreInfo::new(vk::AttachmentLoadOp::DONT_CARE, vk::AttachmentStoreOp::DONT_CARE),
        ];
        let subpasses = [SubpassInfo::writes([1, 2]), SubpassInfo::new([1], [0])];

        let layout =
            RenderPassLayout::derive(&three_attachments(), &subpasses, &load_store).unwrap();

        assert_eq!(layout.attachments[1].store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(layout.attachments[2].load_op, vk::AttachmentLoadOp::DONT_CARE);
        for description in &layout.attachments {
            assert_eq!(description.stencil_load_op, vk::AttachmentLoadOp::DONT_CARE);
            assert_eq!(description.stencil_store_op, vk::AttachmentStoreOp::DONT_CARE);
        }
    }

    #[test]
    fn counts_per_subpass() {
        let subpasses = [SubpassInfo::writes([1, 2]), SubpassInfo::new([1, 2], [0])];

        let counts = RenderPassLayout::derive(&three_attachments(), &subpasses, &ops(3))
            .unwrap()
            .counts();

        assert_eq!(
            counts,
            vec![
                SubpassCounts {
                    inputs: 0,
                    colors: 1,
                    depth_stencil: true
                },
                SubpassCounts {
                    inputs: 2,
                    colors: 1,
                    depth_stencil: false
                },
            ]
        );
    }

    #[test]
    fn two_depth_outputs_rejected() {
        let attachments = vec![color(SWAPCHAIN), depth(), depth()];
        let subpasses = [SubpassInfo::writes([0, 1, 2])];

        assert!(matches!(
            RenderPassLayout::derive(&attachments, &subpasses, &ops(3)),
            Err(GpuError::InvalidRenderGraph(_))
        ));
    }

    #[test]
    fn malformed_graphs_rejected_before_vulkan() {
        let attachments = three_attachments();

        let cases: [&[SubpassInfo]; 3] = [
            &[],
            &[SubpassInfo::new([1], [0])],
            &[SubpassInfo::writes([1]), SubpassInfo::new([1], [2])],
        ];
        for subpasses in cases {
            assert!(matches!(
                RenderPassLayout::derive(&attachments, subpasses, &ops(3)),
                Err(GpuError::InvalidRenderGraph(_))
            ));
        }

        assert!(matches!(
            RenderPassLayout::derive(&attachments, &[SubpassInfo::writes([0, 5])], &ops(3)),
            Err(GpuError::InvalidRenderGraph(_))
        ));
    }

    #[test]
    fn load_store_length_must_match() {
        assert!(matches!(
            RenderPassLayout::derive(&three_attachments(), &[SubpassInfo::writes([0])], &ops(2)),
            Err(GpuError::InvalidRenderGraph(_))
        ));
    }
}
