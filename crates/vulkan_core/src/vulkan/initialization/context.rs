//! Vulkan device capabilities
//!
//! Immutable data about the selected adapter, resolved once by the platform
//! setup in [`super::platform`] and shared read-only with everything that
//! allocates memory or builds pipelines.

use ash::vk;
use std::ffi::CStr;
use thiserror::Error;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No memory type satisfies both the resource mask and the required properties
    #[error("No suitable memory type for type bits {type_bits:#034b} with {required:?}")]
    NoSuitableMemoryType {
        /// Memory types the resource can live in, one bit per index
        type_bits: u32,
        /// Property flags every candidate had to carry
        required: vk::MemoryPropertyFlags,
    },

    /// Every timer query slot pair is in use
    #[error("Timer query pool exhausted: all {capacity} slots are in use")]
    QueryPoolExhausted {
        /// Total slot count of the pool
        capacity: u32,
    },

    /// None of the configured depth formats can be used as a depth attachment
    #[error("No supported depth format among {candidates:?}")]
    UnsupportedDepthFormat {
        /// The formats that were tried, in preference order
        candidates: Vec<vk::Format>,
    },
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

bitflags::bitflags! {
    /// Optional device and instance features the backend cares about
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DeviceFeatures: u32 {
        /// `imageCubeArray` core feature
        const IMAGE_CUBE_ARRAY = 1 << 0;
        /// `VK_EXT_debug_marker`
        const DEBUG_MARKERS = 1 << 1;
        /// `VK_EXT_debug_utils`
        const DEBUG_UTILS = 1 << 2;
        /// `VK_KHR_portability_subset`
        const PORTABILITY_SUBSET = 1 << 3;
        /// `VK_KHR_portability_enumeration`
        const PORTABILITY_ENUMERATION = 1 << 4;
        /// `VK_KHR_maintenance1`
        const MAINTENANCE_1 = 1 << 5;
        /// `VK_KHR_maintenance2`
        const MAINTENANCE_2 = 1 << 6;
        /// `VK_KHR_maintenance3`
        const MAINTENANCE_3 = 1 << 7;
    }
}

/// Snapshot of the physical device taken during device setup.
///
/// There is no public constructor and no mutator: the platform layer builds
/// it once and everyone else reads it through `&` or `Arc`.
#[derive(Clone)]
pub struct DeviceCapabilities {
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    properties: vk::PhysicalDeviceProperties,
    features: vk::PhysicalDeviceFeatures,
    supported: DeviceFeatures,
    depth_format: vk::Format,
}

impl DeviceCapabilities {
    pub(crate) const fn new(
        memory_properties: vk::PhysicalDeviceMemoryProperties,
        properties: vk::PhysicalDeviceProperties,
        features: vk::PhysicalDeviceFeatures,
        supported: DeviceFeatures,
        depth_format: vk::Format,
    ) -> Self {
        Self {
            memory_properties,
            properties,
            features,
            supported,
            depth_format,
        }
    }

    /// Pick the memory type for an allocation.
    ///
    /// Scans the memory type table from index 0 and returns the first index
    /// whose bit is set in `type_bits` and whose property flags contain all of
    /// `required`. The lowest eligible index always wins; there is no ranking
    /// among eligible types.
    ///
    /// # Errors
    ///
    /// [`VulkanError::NoSuitableMemoryType`] when nothing qualifies. That means
    /// the caller assumed a memory configuration the device does not offer;
    /// it is not worth retrying.
    pub fn select_memory_type(
        &self,
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    ) -> VulkanResult<u32> {
        let count = self.memory_type_count();
        let eligible = (0..count).find(|&index| {
            type_bits & (1 << index) != 0
                && self.memory_properties.memory_types[index as usize]
                    .property_flags
                    .contains(required)
        });

        eligible.ok_or_else(|| {
            log::error!(
                "Unable to find a memory type that meets requirements (type bits {:#b}, required {:?})",
                type_bits,
                required
            );
            VulkanError::NoSuitableMemoryType { type_bits, required }
        })
    }

    /// Number of valid entries in the memory type table
    pub fn memory_type_count(&self) -> u32 {
        self.memory_properties
            .memory_type_count
            .min(vk::MAX_MEMORY_TYPES as u32)
    }

    /// Property flags of one memory type, `None` past the end of the table
    pub fn memory_type_flags(&self, index: u32) -> Option<vk::MemoryPropertyFlags> {
        (index < self.memory_type_count())
            .then(|| self.memory_properties.memory_types[index as usize].property_flags)
    }

    /// The full memory properties reported by the driver
    pub const fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Depth format resolved at device setup
    pub const fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    /// Device limits, handed out verbatim
    pub const fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.properties.limits
    }

    /// Device properties
    pub const fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    /// Core device features
    pub const fn features(&self) -> &vk::PhysicalDeviceFeatures {
        &self.features
    }

    /// PCI vendor id of the adapter
    pub const fn vendor_id(&self) -> u32 {
        self.properties.vendor_id
    }

    /// Human readable adapter name
    pub fn device_name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    /// Every optional feature as one set
    pub const fn supported_features(&self) -> DeviceFeatures {
        self.supported
    }

    /// Nanoseconds per timestamp tick
    pub const fn timestamp_period(&self) -> f32 {
        self.properties.limits.timestamp_period
    }

    /// Whether graphics and compute queues support timestamp writes
    pub fn supports_timestamps(&self) -> bool {
        self.properties.limits.timestamp_compute_and_graphics == vk::TRUE
    }

    /// Cube map array images can be created
    pub const fn is_image_cube_array_supported(&self) -> bool {
        self.supported.contains(DeviceFeatures::IMAGE_CUBE_ARRAY)
    }

    /// `VK_EXT_debug_marker` is available
    pub const fn is_debug_markers_supported(&self) -> bool {
        self.supported.contains(DeviceFeatures::DEBUG_MARKERS)
    }

    /// `VK_EXT_debug_utils` is available
    pub const fn is_debug_utils_supported(&self) -> bool {
        self.supported.contains(DeviceFeatures::DEBUG_UTILS)
    }

    /// `VK_KHR_portability_subset` is available
    pub const fn is_portability_subset_supported(&self) -> bool {
        self.supported.contains(DeviceFeatures::PORTABILITY_SUBSET)
    }

    /// `VK_KHR_portability_enumeration` is available
    pub const fn is_portability_enumeration_supported(&self) -> bool {
        self.supported.contains(DeviceFeatures::PORTABILITY_ENUMERATION)
    }

    /// `VK_KHR_maintenance1` is available
    pub const fn is_maintenance1_supported(&self) -> bool {
        self.supported.contains(DeviceFeatures::MAINTENANCE_1)
    }

    /// `VK_KHR_maintenance2` is available
    pub const fn is_maintenance2_supported(&self) -> bool {
        self.supported.contains(DeviceFeatures::MAINTENANCE_2)
    }

    /// `VK_KHR_maintenance3` is available
    pub const fn is_maintenance3_supported(&self) -> bool {
        self.supported.contains(DeviceFeatures::MAINTENANCE_3)
    }
}

impl std::fmt::Debug for DeviceCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCapabilities")
            .field("device_name", &self.device_name())
            .field("vendor_id", &self.vendor_id())
            .field("memory_type_count", &self.memory_type_count())
            .field("supported", &self.supported)
            .field("depth_format", &self.depth_format)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn capabilities_with_memory_types(
        types: &[vk::MemoryPropertyFlags],
    ) -> DeviceCapabilities {
        let mut memory_properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, flags) in memory_properties.memory_types.iter_mut().zip(types) {
            slot.property_flags = *flags;
        }

        DeviceCapabilities::new(
            memory_properties,
            vk::PhysicalDeviceProperties::default(),
            vk::PhysicalDeviceFeatures::default(),
            DeviceFeatures::empty(),
            vk::Format::D32_SFLOAT,
        )
    }

    const HOST: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_VISIBLE;
    const LOCAL: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::DEVICE_LOCAL;

    #[test]
    fn test_lowest_eligible_index_wins() {
        let both = HOST | LOCAL;
        let caps = capabilities_with_memory_types(&[HOST, LOCAL, both, HOST, LOCAL, both]);

        let mask = (1 << 0) | (1 << 2) | (1 << 5);
        assert_eq!(caps.select_memory_type(mask, both).unwrap(), 2);
    }

    #[test]
    fn test_type_bits_exclude_otherwise_eligible_types() {
        let caps = capabilities_with_memory_types(&[LOCAL, LOCAL, LOCAL]);
        assert_eq!(caps.select_memory_type(0b100, LOCAL).unwrap(), 2);
    }

    #[test]
    fn test_empty_requirements_take_first_allowed_type() {
        let caps = capabilities_with_memory_types(&[HOST, LOCAL]);
        assert_eq!(
            caps.select_memory_type(0b10, vk::MemoryPropertyFlags::empty()).unwrap(),
            1
        );
    }

    #[test]
    fn test_no_eligible_type_is_an_error() {
        let caps = capabilities_with_memory_types(&[HOST, LOCAL]);

        let result = caps.select_memory_type(0b01, LOCAL);
        assert!(matches!(
            result,
            Err(VulkanError::NoSuitableMemoryType { type_bits: 0b01, required }) if required == LOCAL
        ));
    }

    #[test]
    fn test_bits_past_table_end_are_ignored() {
        let caps = capabilities_with_memory_types(&[HOST]);
        assert!(caps
            .select_memory_type(0b10, vk::MemoryPropertyFlags::empty())
            .is_err());
    }

    #[test]
    fn test_memory_type_flags_lookup() {
        let caps = capabilities_with_memory_types(&[HOST, LOCAL]);
        assert_eq!(caps.memory_type_flags(1), Some(LOCAL));
        assert_eq!(caps.memory_type_flags(2), None);
    }

    #[test]
    fn test_feature_accessors_follow_flags() {
        let caps = DeviceCapabilities::new(
            vk::PhysicalDeviceMemoryProperties::default(),
            vk::PhysicalDeviceProperties::default(),
            vk::PhysicalDeviceFeatures::default(),
            DeviceFeatures::DEBUG_UTILS | DeviceFeatures::MAINTENANCE_2,
            vk::Format::X8_D24_UNORM_PACK32,
        );

        assert!(caps.is_debug_utils_supported());
        assert!(caps.is_maintenance2_supported());
        assert!(!caps.is_debug_markers_supported());
        assert!(!caps.is_maintenance1_supported());
        assert!(!caps.is_image_cube_array_supported());
        assert_eq!(caps.depth_format(), vk::Format::X8_D24_UNORM_PACK32);
        assert!(!caps.supports_timestamps());
    }
}
