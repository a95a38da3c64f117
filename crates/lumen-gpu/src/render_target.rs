//! Render targets: the per-frame image set a render pass draws into.
//!
//! Attachment 0 is always the swapchain image for the target's slot. Every
//! further attachment is an image allocated by the target from an
//! [`AttachmentSpec`]. The image list is fixed at creation, so attachment
//! indices stay valid for the target's lifetime.

use std::sync::Arc;

use crate::context::GpuContext;
use crate::error::Result;
use crate::memory::{GpuAllocator, GpuImage};
use ash::vk;
use gpu_allocator::MemoryLocation;

/// Returns true for depth and depth/stencil formats.
pub fn is_depth_stencil_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT
            | vk::Format::S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// Aspect used for views of `format`.
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    if !is_depth_stencil_format(format) {
        return vk::ImageAspectFlags::COLOR;
    }
    // Input attachments and depth tests only read the depth aspect.
    if format == vk::Format::S8_UINT {
        vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

/// Description of one render-target image as the render pass sees it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub usage: vk::ImageUsageFlags,
    pub initial_layout: vk::ImageLayout,
}

impl Attachment {
    /// Single-sampled attachment with undefined initial contents.
    pub const fn new(format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            usage,
            initial_layout: vk::ImageLayout::UNDEFINED,
        }
    }

    /// Same attachment with an explicit initial layout.
    #[must_use]
    pub const fn with_initial_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.initial_layout = layout;
        self
    }

    pub fn is_depth_stencil(&self) -> bool {
        is_depth_stencil_format(self.format)
    }
}

/// An image the render target allocates for attachments after the first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentSpec {
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
}

impl AttachmentSpec {
    /// A colour attachment that later subpasses read as an input attachment.
    pub const fn color_input(format: vk::Format) -> Self {
        Self {
            format,
            usage: vk::ImageUsageFlags::from_raw(
                vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw()
                    | vk::ImageUsageFlags::INPUT_ATTACHMENT.as_raw()
                    | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT.as_raw(),
            ),
        }
    }

    /// A depth attachment, optionally readable as an input attachment.
    pub const fn depth(format: vk::Format, readable: bool) -> Self {
        let mut usage = vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT.as_raw();
        if readable {
            usage |= vk::ImageUsageFlags::INPUT_ATTACHMENT.as_raw();
        }
        Self {
            format,
            usage: vk::ImageUsageFlags::from_raw(usage),
        }
    }

    /// The attachment this spec produces.
    pub const fn attachment(&self) -> Attachment {
        Attachment::new(self.format, self.usage)
    }
}

/// The attachment list for a swapchain image followed by `specs`.
pub fn attachment_list(
    swapchain_format: vk::Format,
    swapchain_usage: vk::ImageUsageFlags,
    specs: &[AttachmentSpec],
) -> Vec<Attachment> {
    std::iter::once(Attachment::new(swapchain_format, swapchain_usage))
        .chain(specs.iter().map(AttachmentSpec::attachment))
        .collect()
}

/// Images, views and attachment descriptions for one swapchain slot.
pub struct RenderTarget {
    device: Arc<ash::Device>,
    extent: vk::Extent2D,
    attachments: Vec<Attachment>,
    /// Owned images for attachments `1..`.
    images: Vec<GpuImage>,
    /// One view per attachment; view 0 belongs to the swapchain.
    views: Vec<vk::ImageView>,
}

impl RenderTarget {
    /// Create a target around swapchain image view `swapchain_view`.
    ///
    /// # Safety
    /// The GPU context and swapchain view must be valid.
    pub unsafe fn new(
        gpu: &GpuContext,
        swapchain_view: vk::ImageView,
        swapchain_format: vk::Format,
        swapchain_usage: vk::ImageUsageFlags,
        extent: vk::Extent2D,
        specs: &[AttachmentSpec],
    ) -> Result<Self> {
        let device = gpu.shared_device();
        let attachments = attachment_list(swapchain_format, swapchain_usage, specs);

        let mut target = Self {
            device,
            extent,
            attachments,
            images: Vec::with_capacity(specs.len()),
            views: Vec::with_capacity(specs.len() + 1),
        };
        target.views.push(swapchain_view);

        let mut allocator = gpu.allocator().lock();
        for (index, spec) in specs.iter().enumerate() {
            let created = target.create_attachment_image(&mut allocator, index + 1, spec);
            if let Err(err) = created {
                target.destroy(&mut allocator);
                return Err(err);
            }
        }

        tracing::debug!(
            attachments = target.attachments.len(),
            width = extent.width,
            height = extent.height,
            "Render target created"
        );

        Ok(target)
    }

    unsafe fn create_attachment_image(
        &mut self,
        allocator: &mut GpuAllocator,
        index: usize,
        spec: &AttachmentSpec,
    ) -> Result<()> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(spec.format)
            .extent(vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(spec.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = allocator.create_image(
            &image_info,
            MemoryLocation::GpuOnly,
            &format!("render_target_attachment_{index}"),
        )?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(spec.format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect_for_format(spec.format))
                    .level_count(1)
                    .layer_count(1),
            );

        // Push the image first so destroy() frees it if the view fails.
        self.images.push(image);
        let view = self.device.create_image_view(&view_info, None)?;
        self.views.push(view);

        Ok(())
    }

    /// Size of every image in the target.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Attachment descriptions, index 0 being the swapchain image.
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// View of attachment `index`.
    pub fn view(&self, index: u32) -> Option<vk::ImageView> {
        self.views.get(index as usize).copied()
    }

    /// Create a framebuffer over every attachment for `render_pass`.
    ///
    /// # Safety
    /// The render pass must be compatible with this target's attachments.
    pub unsafe fn create_framebuffer(&self, render_pass: vk::RenderPass) -> Result<vk::Framebuffer> {
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&self.views)
            .width(self.extent.width)
            .height(self.extent.height)
            .layers(1);

        Ok(self.device.create_framebuffer(&info, None)?)
    }

    /// Destroy owned images and views. The swapchain view is left alone.
    ///
    /// # Safety
    /// No pending work may reference the target.
    pub unsafe fn destroy(&mut self, allocator: &mut GpuAllocator) {
        for &view in self.views.iter().skip(1) {
            self.device.destroy_image_view(view, None);
        }
        self.views.truncate(1);

        for image in &mut self.images {
            if let Err(err) = allocator.free_image(image) {
                tracing::error!("Failed to free render target image: {err}");
            }
        }
        self.images.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_formats_recognised() {
        assert!(is_depth_stencil_format(vk::Format::D32_SFLOAT));
        assert!(is_depth_stencil_format(vk::Format::D24_UNORM_S8_UINT));
        assert!(is_depth_stencil_format(vk::Format::S8_UINT));
        assert!(!is_depth_stencil_format(vk::Format::B8G8R8A8_SRGB));
        assert!(!is_depth_stencil_format(vk::Format::R16G16B16A16_SFLOAT));
    }

    #[test]
    fn aspect_matches_format_class() {
        assert_eq!(
            aspect_for_format(vk::Format::R8G8B8A8_UNORM),
            vk::ImageAspectFlags::COLOR
        );
        assert_eq!(
            aspect_for_format(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_for_format(vk::Format::S8_UINT),
            vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn attachment_zero_is_swapchain() {
        let specs = [
            AttachmentSpec::color_input(vk::Format::R16G16B16A16_SFLOAT),
            AttachmentSpec::depth(vk::Format::D32_SFLOAT, true),
        ];

        let list = attachment_list(
            vk::Format::B8G8R8A8_SRGB,
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
            &specs,
        );

        assert_eq!(list.len(), 3);
        assert_eq!(list[0].format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(list[0].initial_layout, vk::ImageLayout::UNDEFINED);
        assert!(list[1]
            .usage
            .contains(vk::ImageUsageFlags::INPUT_ATTACHMENT));
        assert!(list[2].is_depth_stencil());
        assert!(list[2]
            .usage
            .contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
    }

    #[test]
    fn depth_spec_readability() {
        let hidden = AttachmentSpec::depth(vk::Format::D16_UNORM, false);
        assert!(!hidden.usage.contains(vk::ImageUsageFlags::INPUT_ATTACHMENT));
    }
}
