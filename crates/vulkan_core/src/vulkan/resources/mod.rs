//! Vulkan resource types
//!
//! Textures and the attachments that bind them to render targets.

/// Texture images with layout tracking and cached views
pub mod texture;

/// Ownership-agnostic texture handles and render-target attachments
pub mod attachment;

pub use attachment::{Attachment, TextureHandle};
pub use texture::{Texture, TextureDesc};
