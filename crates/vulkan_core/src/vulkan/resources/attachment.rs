//! Render-target attachments
//!
//! An attachment names one mip level and array layer of a texture. The
//! texture is reached through a [`TextureHandle`], which either borrows a
//! texture someone else keeps alive (swapchain images) or shares ownership of
//! a pool texture. Reading through the handle looks the same either way.

use ash::vk;
use std::ops::Deref;
use std::sync::Arc;

use super::texture::Texture;
use crate::vulkan::VulkanResult;

/// Either a borrowed texture or a shared, reference-counted one.
///
/// Borrowing costs nothing and the borrow checker keeps the owner alive for
/// as long as the handle exists. Sharing keeps the texture alive until the
/// last `Arc` goes away.
#[derive(Clone)]
pub enum TextureHandle<'a> {
    /// Texture owned elsewhere, e.g. by the swapchain
    Borrowed(&'a Texture),
    /// Texture kept alive by this handle and any clones of it
    Shared(Arc<Texture>),
}

impl<'a> TextureHandle<'a> {
    /// Non-owning handle
    pub const fn borrowed(texture: &'a Texture) -> Self {
        Self::Borrowed(texture)
    }

    /// Owning handle
    pub const fn shared(texture: Arc<Texture>) -> Self {
        Self::Shared(texture)
    }

    /// Whether this handle holds a reference count
    pub const fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }

    /// The shared reference, if this handle owns one
    pub const fn as_shared(&self) -> Option<&Arc<Texture>> {
        match self {
            Self::Shared(texture) => Some(texture),
            Self::Borrowed(_) => None,
        }
    }

    /// Take a new owning reference to the texture.
    ///
    /// # Panics
    ///
    /// If the handle is borrowed. Only code that built the handle from a
    /// pool texture may ask for ownership.
    pub fn to_shared(&self) -> Arc<Texture> {
        match self {
            Self::Shared(texture) => Arc::clone(texture),
            Self::Borrowed(texture) => panic!(
                "texture {:?} is borrowed; only shared handles can hand out ownership",
                texture.image()
            ),
        }
    }

    /// The texture, regardless of ownership mode
    pub fn texture(&self) -> &Texture {
        match self {
            Self::Borrowed(texture) => *texture,
            Self::Shared(texture) => texture.as_ref(),
        }
    }
}

impl Deref for TextureHandle<'_> {
    type Target = Texture;

    fn deref(&self) -> &Texture {
        self.texture()
    }
}

impl<'a> From<&'a Texture> for TextureHandle<'a> {
    fn from(texture: &'a Texture) -> Self {
        Self::Borrowed(texture)
    }
}

impl From<Arc<Texture>> for TextureHandle<'_> {
    fn from(texture: Arc<Texture>) -> Self {
        Self::Shared(texture)
    }
}

impl std::fmt::Debug for TextureHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = if self.is_shared() { "Shared" } else { "Borrowed" };
        f.debug_tuple(mode).field(&self.image()).finish()
    }
}

/// One mip level and array layer of a texture bound as a render target.
///
/// Everything besides the handle and indices is read from the texture on
/// each call, so layout changes made elsewhere show up immediately.
#[derive(Clone, Debug)]
pub struct Attachment<'a> {
    texture: TextureHandle<'a>,
    level: u8,
    layer: u16,
}

impl<'a> Attachment<'a> {
    /// Bind `level`/`layer` of a texture.
    ///
    /// Indices are checked against the texture in debug builds only.
    pub fn new(texture: impl Into<TextureHandle<'a>>, level: u8, layer: u16) -> Self {
        let texture = texture.into();
        debug_assert!(
            u32::from(level) < texture.mip_levels(),
            "attachment level {level} outside {} mip levels",
            texture.mip_levels()
        );
        debug_assert!(
            u32::from(layer) < texture.array_layers(),
            "attachment layer {layer} outside {} array layers",
            texture.array_layers()
        );

        Self {
            texture,
            level,
            layer,
        }
    }

    /// Level 0, layer 0
    pub fn base(texture: impl Into<TextureHandle<'a>>) -> Self {
        Self::new(texture, 0, 0)
    }

    /// The texture handle
    pub const fn texture(&self) -> &TextureHandle<'a> {
        &self.texture
    }

    /// Selected mip level
    pub const fn level(&self) -> u8 {
        self.level
    }

    /// Selected array layer
    pub const fn layer(&self) -> u16 {
        self.layer
    }

    /// Image handle of the texture
    pub fn image(&self) -> vk::Image {
        self.texture.image()
    }

    /// Pixel format of the texture
    pub fn format(&self) -> vk::Format {
        self.texture.format()
    }

    /// Current layout of the selected subresource
    pub fn layout(&self) -> vk::ImageLayout {
        self.texture
            .layout(u32::from(self.level), u32::from(self.layer))
    }

    /// Size of the selected mip level
    pub fn extent_2d(&self) -> vk::Extent2D {
        self.texture.extent_at(u32::from(self.level))
    }

    /// View of the selected subresource for `aspect`
    ///
    /// # Errors
    ///
    /// Passes through view creation failures.
    pub fn image_view(&self, aspect: vk::ImageAspectFlags) -> VulkanResult<vk::ImageView> {
        self.texture
            .attachment_view(aspect, u32::from(self.level), u32::from(self.layer))
    }

    /// Subresource range covering exactly the selected level and layer
    pub fn subresource_range(&self, aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: u32::from(self.level),
            level_count: 1,
            base_array_layer: u32::from(self.layer),
            layer_count: 1,
        }
    }
}
