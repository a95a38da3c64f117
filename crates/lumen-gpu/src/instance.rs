//! Vulkan instance creation and physical device selection.

use crate::error::{GpuError, Result};
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};

/// Engine name reported to the driver.
pub const ENGINE_NAME: &CStr = c"Lumen";

/// Lowest Vulkan version the engine runs on.
pub const MIN_API_VERSION: u32 = vk::API_VERSION_1_2;

/// Validation layers to enable when requested.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Create a Vulkan instance able to present to `display`.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    display: RawDisplayHandle,
    enable_validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::Other(format!("Invalid application name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(ENGINE_NAME)
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(MIN_API_VERSION);

    let mut extension_names: Vec<*const c_char> =
        ash_window::enumerate_required_extensions(display)?.to_vec();

    #[cfg(target_os = "macos")]
    extension_names.push(ash::khr::portability_enumeration::NAME.as_ptr());

    let layers = if enable_validation {
        available_layers(entry, &validation_layers())?
    } else {
        Vec::new()
    };
    let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    let instance = entry.create_instance(&create_info, None)?;
    tracing::debug!(validation = !layers.is_empty(), "Vulkan instance created");

    Ok(instance)
}

/// Filter `requested` down to the layers the loader actually provides.
unsafe fn available_layers(
    entry: &ash::Entry,
    requested: &[&'static CStr],
) -> Result<Vec<&'static CStr>> {
    let available = entry.enumerate_instance_layer_properties()?;

    Ok(requested
        .iter()
        .copied()
        .filter(|&layer| {
            let found = available
                .iter()
                .any(|props| props.layer_name_as_c_str() == Ok(layer));
            if !found {
                tracing::warn!("Validation layer {:?} not available", layer);
            }
            found
        })
        .collect())
}

/// Select the best physical device that can present to `surface`.
///
/// # Safety
/// The instance and surface must be valid.
pub unsafe fn select_physical_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<vk::PhysicalDevice> {
    let devices = instance.enumerate_physical_devices()?;

    let mut best: Option<(i32, vk::PhysicalDevice)> = None;

    for device in devices {
        let properties = instance.get_physical_device_properties(device);
        if !supports_swapchain(instance, device)? {
            continue;
        }
        if find_graphics_present_family(instance, surface_loader, surface, device)?.is_none() {
            continue;
        }

        let memory = instance.get_physical_device_memory_properties(device);
        let vram_mb: u64 = memory
            .memory_heaps
            .iter()
            .take(memory.memory_heap_count as usize)
            .filter(|h| h.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|h| h.size / (1024 * 1024))
            .sum();

        let Some(score) = score_device(properties.device_type, properties.api_version, vram_mb)
        else {
            continue;
        };

        if best.map_or(true, |(best_score, _)| score > best_score) {
            best = Some((score, device));
        }
    }

    best.map(|(_, device)| device)
        .ok_or(GpuError::NoSuitableDevice)
}

/// Rank a device. Returns `None` when it is below the minimum API version.
pub fn score_device(device_type: vk::PhysicalDeviceType, api_version: u32, vram_mb: u64) -> Option<i32> {
    let major = vk::api_version_major(api_version);
    let minor = vk::api_version_minor(api_version);
    if (major, minor)
        < (
            vk::api_version_major(MIN_API_VERSION),
            vk::api_version_minor(MIN_API_VERSION),
        )
    {
        return None;
    }

    let mut score = match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
        _ => 1,
    };

    // +1 per GB
    score += i32::try_from(vram_mb / 1024).unwrap_or(i32::MAX - score);

    Some(score)
}

unsafe fn supports_swapchain(instance: &ash::Instance, device: vk::PhysicalDevice) -> Result<bool> {
    let extensions = instance.enumerate_device_extension_properties(device)?;
    Ok(extensions
        .iter()
        .any(|ext| ext.extension_name_as_c_str() == Ok(ash::khr::swapchain::NAME)))
}

/// Find a queue family that supports both graphics and presentation.
///
/// # Safety
/// All handles must be valid.
pub unsafe fn find_graphics_present_family(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    device: vk::PhysicalDevice,
) -> Result<Option<u32>> {
    let families = instance.get_physical_device_queue_family_properties(device);

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        if !family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            continue;
        }
        if surface_loader.get_physical_device_surface_support(device, index, surface)? {
            return Ok(Some(index));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_preferred_over_integrated() {
        let discrete = score_device(vk::PhysicalDeviceType::DISCRETE_GPU, vk::API_VERSION_1_2, 0);
        let integrated =
            score_device(vk::PhysicalDeviceType::INTEGRATED_GPU, vk::API_VERSION_1_3, 16 * 1024);
        assert!(discrete > integrated);
    }

    #[test]
    fn old_api_version_rejected() {
        assert_eq!(
            score_device(vk::PhysicalDeviceType::DISCRETE_GPU, vk::API_VERSION_1_1, 8192),
            None
        );
    }

    #[test]
    fn vram_breaks_ties() {
        let small = score_device(vk::PhysicalDeviceType::DISCRETE_GPU, vk::API_VERSION_1_3, 4096);
        let large = score_device(vk::PhysicalDeviceType::DISCRETE_GPU, vk::API_VERSION_1_3, 8192);
        assert_eq!(small, Some(1004));
        assert_eq!(large, Some(1008));
    }
}
