//! GPU capability detection.

use ash::vk;
use lumen_core::constants::MODEL_PUSH_CONSTANT_SIZE;
use std::ffi::CStr;

/// Colour attachments the largest built-in technique writes in one subpass.
pub const REQUIRED_COLOR_ATTACHMENTS: u32 = 4;

/// Descriptor sets bound at once (frame uniforms + material).
pub const REQUIRED_BOUND_SETS: u32 = 2;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Vulkan API version
    pub api_version: u32,
    /// Driver version
    pub driver_version: u32,
    /// Device-local memory in MB
    pub device_local_memory_mb: u64,

    // Limits the render graph and pipelines depend on
    /// Maximum colour attachments per subpass
    pub max_color_attachments: u32,
    /// Maximum push constant block size in bytes
    pub max_push_constants_size: u32,
    /// Maximum descriptor sets bound at once
    pub max_bound_descriptor_sets: u32,
    /// Maximum input attachments visible to one stage
    pub max_per_stage_input_attachments: u32,
    /// Maximum uniform buffers across all sets of one pipeline layout
    pub max_descriptor_set_uniform_buffers: u32,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);
        let memory_properties = instance.get_physical_device_memory_properties(physical_device);
        let limits = properties.limits;

        let device_name = CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned();

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name,
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            device_local_memory_mb,
            max_color_attachments: limits.max_color_attachments,
            max_push_constants_size: limits.max_push_constants_size,
            max_bound_descriptor_sets: limits.max_bound_descriptor_sets,
            max_per_stage_input_attachments: limits.max_per_stage_descriptor_input_attachments,
            max_descriptor_set_uniform_buffers: limits.max_descriptor_set_uniform_buffers,
        }
    }

    /// Check if the GPU meets minimum requirements for the engine.
    pub fn meets_requirements(&self) -> bool {
        let api = (
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
        );

        api >= (1, 2)
            && self.max_push_constants_size >= MODEL_PUSH_CONSTANT_SIZE
            && self.max_color_attachments >= REQUIRED_COLOR_ATTACHMENTS
            && self.max_bound_descriptor_sets >= REQUIRED_BOUND_SETS
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM - {} colour attachments",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
            self.max_color_attachments,
        )
    }
}

/// Depth formats tried in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D16_UNORM,
];

/// Pick the first candidate usable as an optimal-tiling depth attachment.
///
/// # Safety
/// The instance and physical device must be valid.
pub unsafe fn select_depth_format(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Option<vk::Format> {
    DEPTH_FORMAT_CANDIDATES.into_iter().find(|&format| {
        let props = instance.get_physical_device_format_properties(physical_device, format);
        props
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capable() -> GpuCapabilities {
        GpuCapabilities {
            vendor: GpuVendor::Amd,
            device_name: "Test GPU".to_string(),
            api_version: vk::API_VERSION_1_2,
            driver_version: 0,
            device_local_memory_mb: 8192,
            max_color_attachments: 8,
            max_push_constants_size: 128,
            max_bound_descriptor_sets: 8,
            max_per_stage_input_attachments: 8,
            max_descriptor_set_uniform_buffers: 72,
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn baseline_device_accepted() {
        assert!(capable().meets_requirements());
    }

    #[test]
    fn small_push_constant_block_rejected() {
        let caps = GpuCapabilities {
            max_push_constants_size: 32,
            ..capable()
        };
        assert!(!caps.meets_requirements());
    }

    #[test]
    fn vulkan_1_1_rejected() {
        let caps = GpuCapabilities {
            api_version: vk::API_VERSION_1_1,
            ..capable()
        };
        assert!(!caps.meets_requirements());
    }

    #[test]
    fn summary_names_device() {
        assert!(capable().summary().starts_with("Test GPU (Amd) - Vulkan 1.2.0"));
    }
}
