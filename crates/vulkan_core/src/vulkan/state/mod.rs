// Vulkan state management

pub mod timer_query;

pub use timer_query::*;
