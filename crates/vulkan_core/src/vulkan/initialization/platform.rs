//! Platform setup
//!
//! The only place that writes [`DeviceCapabilities`]. Called once while the
//! logical device is being brought up; the result is then shared read-only.

use ash::{vk, Entry, Instance};
use std::ffi::CStr;

use super::context::{DeviceCapabilities, DeviceFeatures, VulkanError, VulkanResult};
use crate::config::BackendConfig;

const DEBUG_MARKER_EXTENSION: &str = "VK_EXT_debug_marker";
const DEBUG_UTILS_EXTENSION: &str = "VK_EXT_debug_utils";
const PORTABILITY_SUBSET_EXTENSION: &str = "VK_KHR_portability_subset";
const PORTABILITY_ENUMERATION_EXTENSION: &str = "VK_KHR_portability_enumeration";
const MAINTENANCE_EXTENSIONS: [(&str, DeviceFeatures); 3] = [
    ("VK_KHR_maintenance1", DeviceFeatures::MAINTENANCE_1),
    ("VK_KHR_maintenance2", DeviceFeatures::MAINTENANCE_2),
    ("VK_KHR_maintenance3", DeviceFeatures::MAINTENANCE_3),
];

/// Query everything the backend needs to know about `physical_device`.
///
/// # Errors
///
/// Fails when extension enumeration fails or when none of the configured
/// depth formats can back a depth attachment.
pub fn query_capabilities(
    entry: &Entry,
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    config: &BackendConfig,
) -> VulkanResult<DeviceCapabilities> {
    let memory_properties =
        unsafe { instance.get_physical_device_memory_properties(physical_device) };
    let properties = unsafe { instance.get_physical_device_properties(physical_device) };
    let features = unsafe { instance.get_physical_device_features(physical_device) };

    #[allow(unused_unsafe)]
    let instance_extensions = unsafe {
        entry
            .enumerate_instance_extension_properties(None)
            .map_err(VulkanError::Api)?
    };
    let device_extensions = unsafe {
        instance
            .enumerate_device_extension_properties(physical_device)
            .map_err(VulkanError::Api)?
    };

    let instance_names = extension_names(&instance_extensions);
    let device_names = extension_names(&device_extensions);
    let supported = resolve_features(&instance_names, &device_names, &features, config);

    let candidates = config.depth_format_candidates();
    let depth_format = pick_depth_format(&candidates, |format| unsafe {
        instance.get_physical_device_format_properties(physical_device, format)
    })
    .ok_or(VulkanError::UnsupportedDepthFormat { candidates })?;

    let capabilities = DeviceCapabilities::new(
        memory_properties,
        properties,
        features,
        supported,
        depth_format,
    );

    log::info!(
        "Device capabilities for {}: vendor {:#06x}, {} memory types, depth {:?}, features {:?}",
        capabilities.device_name(),
        capabilities.vendor_id(),
        capabilities.memory_type_count(),
        depth_format,
        supported
    );

    Ok(capabilities)
}

fn extension_names(extensions: &[vk::ExtensionProperties]) -> Vec<String> {
    extensions
        .iter()
        .map(|extension| {
            unsafe { CStr::from_ptr(extension.extension_name.as_ptr()) }
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}

fn has_extension(names: &[String], wanted: &str) -> bool {
    names.iter().any(|name| name == wanted)
}

/// Fold extension lists and core features into the backend feature set
pub(crate) fn resolve_features(
    instance_extensions: &[String],
    device_extensions: &[String],
    features: &vk::PhysicalDeviceFeatures,
    config: &BackendConfig,
) -> DeviceFeatures {
    let mut supported = DeviceFeatures::empty();

    supported.set(
        DeviceFeatures::IMAGE_CUBE_ARRAY,
        features.image_cube_array == vk::TRUE,
    );

    if config.enable_debug_markers {
        supported.set(
            DeviceFeatures::DEBUG_MARKERS,
            has_extension(device_extensions, DEBUG_MARKER_EXTENSION),
        );
        supported.set(
            DeviceFeatures::DEBUG_UTILS,
            has_extension(instance_extensions, DEBUG_UTILS_EXTENSION),
        );
    }

    supported.set(
        DeviceFeatures::PORTABILITY_SUBSET,
        has_extension(device_extensions, PORTABILITY_SUBSET_EXTENSION),
    );
    supported.set(
        DeviceFeatures::PORTABILITY_ENUMERATION,
        has_extension(instance_extensions, PORTABILITY_ENUMERATION_EXTENSION),
    );

    for (name, flag) in MAINTENANCE_EXTENSIONS {
        supported.set(flag, has_extension(device_extensions, name));
    }

    supported
}

/// First candidate usable as an optimally tiled depth attachment
pub(crate) fn pick_depth_format<F>(candidates: &[vk::Format], format_properties: F) -> Option<vk::Format>
where
    F: Fn(vk::Format) -> vk::FormatProperties,
{
    candidates.iter().copied().find(|&format| {
        format_properties(format)
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
}
