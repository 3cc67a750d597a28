// Vulkan initialization

pub mod context;
pub mod platform;
