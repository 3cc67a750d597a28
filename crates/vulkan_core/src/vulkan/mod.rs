//! Vulkan backend core
//!
//! Organized into initialization, resources, and state modules.

/// Vulkan initialization types (errors, capabilities, platform setup)
pub mod initialization;

/// Device entry points used by this crate
pub mod device;

/// Vulkan resource types (textures, attachments)
pub mod resources;

/// Vulkan state management (timer queries)
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

// Re-export core initialization types
pub use initialization::context::{DeviceCapabilities, DeviceFeatures, VulkanError, VulkanResult};
pub use initialization::platform;

pub use device::DeviceDispatch;

// Re-export resource types
pub use resources::attachment::{Attachment, TextureHandle};
pub use resources::texture::{Texture, TextureDesc};

// Re-export state types
pub use state::timer_query::{TimerQuery, TimerQueryPool, TimerQueryResult};
