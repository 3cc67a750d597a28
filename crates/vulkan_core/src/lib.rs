//! # Vulkan Core
//!
//! The low-level bookkeeping underneath the engine's Vulkan renderer.
//!
//! ## Features
//!
//! - **Device Capabilities**: Immutable adapter snapshot resolved once at device setup,
//!   including first-match memory type selection and the chosen depth format
//! - **Timer Queries**: Fixed-capacity, thread-safe pool of GPU timestamp slot pairs
//! - **Attachments**: Render-target bindings over either swapchain-owned or
//!   reference-counted textures, with on-demand view properties
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vulkan_core::prelude::*;
//! # fn run(entry: &ash::Entry, instance: &ash::Instance, physical: ash::vk::PhysicalDevice, device: ash::Device) -> VulkanResult<()> {
//! let config = BackendConfig::default();
//! let caps = Arc::new(platform::query_capabilities(entry, instance, physical, &config)?);
//!
//! let index = caps.select_memory_type(0b1011, ash::vk::MemoryPropertyFlags::DEVICE_LOCAL)?;
//! log::info!("device-local allocations use memory type {}", index);
//!
//! let timers = TimerQueryPool::new(Arc::new(device), config.timer_query_capacity)?;
//! let query = timers.allocate()?;
//! timers.free(query);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod vulkan;

pub use vulkan::platform;

/// Common imports for backend users
pub mod prelude {
    pub use crate::{
        config::{BackendConfig, Config, ConfigError, DepthFormat},
        vulkan::{
            platform, Attachment, DeviceCapabilities, DeviceDispatch, DeviceFeatures, Texture,
            TextureDesc, TextureHandle, TimerQuery, TimerQueryPool, TimerQueryResult, VulkanError,
            VulkanResult,
        },
    };
}
