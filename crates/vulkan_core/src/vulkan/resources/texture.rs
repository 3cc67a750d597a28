//! Vulkan texture management
//!
//! A [`Texture`] wraps a `VkImage` that either belongs to someone else (a
//! swapchain image) or was allocated by the texture pool and is destroyed
//! with the texture. Both kinds track the current layout of every
//! subresource and lazily create single-subresource views for attachments.

use ash::vk;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::vulkan::device::DeviceDispatch;
use crate::vulkan::{VulkanError, VulkanResult};

/// Shape of a texture image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    /// Pixel format
    pub format: vk::Format,
    /// Size of mip level 0
    pub extent: vk::Extent2D,
    /// Number of mip levels
    pub mip_levels: u32,
    /// Number of array layers
    pub array_layers: u32,
}

impl TextureDesc {
    /// Single level, single layer 2D image
    pub const fn new_2d(format: vk::Format, extent: vk::Extent2D) -> Self {
        Self {
            format,
            extent,
            mip_levels: 1,
            array_layers: 1,
        }
    }

    /// Set the mip level count
    #[must_use]
    pub const fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    /// Set the array layer count
    #[must_use]
    pub const fn with_array_layers(mut self, array_layers: u32) -> Self {
        self.array_layers = array_layers;
        self
    }

    const fn subresource_count(&self) -> usize {
        (self.mip_levels * self.array_layers) as usize
    }
}

/// Size of `level` for an image whose level 0 is `base`: halved per level, never below 1
pub fn mip_extent(base: vk::Extent2D, level: u32) -> vk::Extent2D {
    let shrink = |size: u32| size.checked_shr(level).unwrap_or(0).max(1);
    vk::Extent2D {
        width: shrink(base.width),
        height: shrink(base.height),
    }
}

#[derive(Debug)]
enum ImageBacking {
    /// Image lifetime is managed elsewhere (swapchain)
    External,
    /// Image and memory are released with the texture
    Owned { memory: vk::DeviceMemory },
}

type ViewKey = (vk::ImageAspectFlags, u32, u32);

/// Vulkan image with per-subresource layout tracking and cached views
pub struct Texture {
    device: Arc<dyn DeviceDispatch>,
    image: vk::Image,
    desc: TextureDesc,
    backing: ImageBacking,
    layouts: RwLock<Vec<vk::ImageLayout>>,
    views: Mutex<HashMap<ViewKey, vk::ImageView>>,
}

impl Texture {
    /// Wrap an image owned by someone else, e.g. a swapchain image.
    ///
    /// Dropping the texture destroys only the views it created.
    pub fn external(
        device: Arc<dyn DeviceDispatch>,
        image: vk::Image,
        desc: TextureDesc,
        layout: vk::ImageLayout,
    ) -> Self {
        Self::with_backing(device, image, desc, layout, ImageBacking::External)
    }

    /// Take ownership of an image and the memory bound to it.
    ///
    /// Dropping the texture destroys the views, the image and frees the memory.
    pub fn owned(
        device: Arc<dyn DeviceDispatch>,
        image: vk::Image,
        memory: vk::DeviceMemory,
        desc: TextureDesc,
        layout: vk::ImageLayout,
    ) -> Self {
        Self::with_backing(device, image, desc, layout, ImageBacking::Owned { memory })
    }

    fn with_backing(
        device: Arc<dyn DeviceDispatch>,
        image: vk::Image,
        desc: TextureDesc,
        layout: vk::ImageLayout,
        backing: ImageBacking,
    ) -> Self {
        assert!(
            desc.mip_levels > 0 && desc.array_layers > 0,
            "texture needs at least one mip level and one array layer"
        );

        Self {
            device,
            image,
            desc,
            backing,
            layouts: RwLock::new(vec![layout; desc.subresource_count()]),
            views: Mutex::new(HashMap::new()),
        }
    }

    /// The image handle
    pub const fn image(&self) -> vk::Image {
        self.image
    }

    /// Pixel format
    pub const fn format(&self) -> vk::Format {
        self.desc.format
    }

    /// Size of mip level 0
    pub const fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    /// Size of a given mip level
    pub fn extent_at(&self, level: u32) -> vk::Extent2D {
        mip_extent(self.desc.extent, level)
    }

    /// Number of mip levels
    pub const fn mip_levels(&self) -> u32 {
        self.desc.mip_levels
    }

    /// Number of array layers
    pub const fn array_layers(&self) -> u32 {
        self.desc.array_layers
    }

    /// Image shape
    pub const fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    /// Whether dropping this texture destroys the image
    pub const fn owns_image(&self) -> bool {
        matches!(self.backing, ImageBacking::Owned { .. })
    }

    /// Current layout of one subresource
    ///
    /// # Panics
    ///
    /// If `level` or `layer` is out of range.
    pub fn layout(&self, level: u32, layer: u32) -> vk::ImageLayout {
        let index = self.subresource_index(level, layer);
        self.layouts.read().unwrap_or_else(PoisonError::into_inner)[index]
    }

    /// Record that a transition moved one subresource to `layout`
    pub fn set_layout(&self, level: u32, layer: u32, layout: vk::ImageLayout) {
        let index = self.subresource_index(level, layer);
        self.layouts.write().unwrap_or_else(PoisonError::into_inner)[index] = layout;
    }

    /// Record that a transition moved every subresource in `range` to `layout`.
    ///
    /// Honors `vk::REMAINING_MIP_LEVELS` and `vk::REMAINING_ARRAY_LAYERS`.
    pub fn set_range_layout(&self, range: &vk::ImageSubresourceRange, layout: vk::ImageLayout) {
        let level_end = Self::range_end(range.base_mip_level, range.level_count, self.desc.mip_levels);
        let layer_end = Self::range_end(
            range.base_array_layer,
            range.layer_count,
            self.desc.array_layers,
        );

        let mut layouts = self.layouts.write().unwrap_or_else(PoisonError::into_inner);
        for layer in range.base_array_layer..layer_end {
            for level in range.base_mip_level..level_end {
                layouts[self.subresource_index(level, layer)] = layout;
            }
        }
    }

    /// View of exactly one level and layer, created on first use and cached.
    ///
    /// # Errors
    ///
    /// Passes through `vkCreateImageView` failures.
    pub fn attachment_view(
        &self,
        aspect: vk::ImageAspectFlags,
        level: u32,
        layer: u32,
    ) -> VulkanResult<vk::ImageView> {
        debug_assert!(level < self.desc.mip_levels && layer < self.desc.array_layers);

        let mut views = self.views.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(view) = views.get(&(aspect, level, layer)) {
            return Ok(*view);
        }

        let create_info = vk::ImageViewCreateInfo::builder()
            .image(self.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.desc.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: level,
                level_count: 1,
                base_array_layer: layer,
                layer_count: 1,
            });

        let view = self
            .device
            .create_image_view(&create_info)
            .map_err(VulkanError::Api)?;

        log::debug!(
            "Created {:?} view of image {:?} (level {}, layer {})",
            aspect,
            self.image,
            level,
            layer
        );
        views.insert((aspect, level, layer), view);
        Ok(view)
    }

    fn subresource_index(&self, level: u32, layer: u32) -> usize {
        assert!(
            level < self.desc.mip_levels && layer < self.desc.array_layers,
            "subresource (level {level}, layer {layer}) outside {}x{} texture",
            self.desc.mip_levels,
            self.desc.array_layers
        );
        (layer * self.desc.mip_levels + level) as usize
    }

    fn range_end(base: u32, count: u32, total: u32) -> u32 {
        base.saturating_add(count).min(total)
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("image", &self.image)
            .field("desc", &self.desc)
            .field("backing", &self.backing)
            .finish_non_exhaustive()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        let views = self.views.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, view) in views.drain() {
            self.device.destroy_image_view(view);
        }

        if let ImageBacking::Owned { memory } = self.backing {
            log::debug!("Releasing texture image {:?}", self.image);
            self.device.destroy_image(self.image);
            self.device.free_memory(memory);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vulkan::testing::{DeviceCall, RecordingDevice};
    use ash::vk::Handle;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_mip_extent_halves_and_floors_at_one() {
        let base = extent(256, 64);
        assert_eq!(mip_extent(base, 0), extent(256, 64));
        assert_eq!(mip_extent(base, 1), extent(128, 32));
        assert_eq!(mip_extent(base, 6), extent(4, 1));
        assert_eq!(mip_extent(base, 9), extent(1, 1));
        assert_eq!(mip_extent(base, 40), extent(1, 1));
    }

    #[test]
    fn test_layout_tracking_per_subresource() {
        let device = Arc::new(RecordingDevice::new());
        let desc = TextureDesc::new_2d(vk::Format::R8G8B8A8_UNORM, extent(64, 64))
            .with_mip_levels(3)
            .with_array_layers(2);
        let texture = Texture::external(
            device,
            vk::Image::from_raw(7),
            desc,
            vk::ImageLayout::UNDEFINED,
        );

        texture.set_layout(2, 1, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        assert_eq!(texture.layout(2, 1), vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(texture.layout(2, 0), vk::ImageLayout::UNDEFINED);
        assert_eq!(texture.layout(0, 1), vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn test_range_layout_with_remaining() {
        let device = Arc::new(RecordingDevice::new());
        let desc = TextureDesc::new_2d(vk::Format::R8G8B8A8_UNORM, extent(64, 64))
            .with_mip_levels(4)
            .with_array_layers(2);
        let texture = Texture::external(
            device,
            vk::Image::from_raw(7),
            desc,
            vk::ImageLayout::UNDEFINED,
        );

        let range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 1,
            level_count: vk::REMAINING_MIP_LEVELS,
            base_array_layer: 1,
            layer_count: 1,
        };
        texture.set_range_layout(&range, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

        assert_eq!(texture.layout(0, 1), vk::ImageLayout::UNDEFINED);
        for level in 1..4 {
            assert_eq!(texture.layout(level, 1), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
            assert_eq!(texture.layout(level, 0), vk::ImageLayout::UNDEFINED);
        }
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn test_layout_out_of_range_panics() {
        let device = Arc::new(RecordingDevice::new());
        let texture = Texture::external(
            device,
            vk::Image::from_raw(7),
            TextureDesc::new_2d(vk::Format::R8G8B8A8_UNORM, extent(8, 8)),
            vk::ImageLayout::UNDEFINED,
        );
        let _ = texture.layout(1, 0);
    }

    #[test]
    fn test_views_are_cached_per_subresource() {
        let device = Arc::new(RecordingDevice::new());
        let desc = TextureDesc::new_2d(vk::Format::D32_SFLOAT, extent(32, 32)).with_mip_levels(2);
        let texture = Texture::external(
            device.clone(),
            vk::Image::from_raw(7),
            desc,
            vk::ImageLayout::UNDEFINED,
        );

        let depth = texture.attachment_view(vk::ImageAspectFlags::DEPTH, 1, 0).unwrap();
        let again = texture.attachment_view(vk::ImageAspectFlags::DEPTH, 1, 0).unwrap();
        let level0 = texture.attachment_view(vk::ImageAspectFlags::DEPTH, 0, 0).unwrap();

        assert_eq!(depth, again);
        assert_ne!(depth, level0);
        assert_eq!(
            device.count(|call| matches!(call, DeviceCall::CreateImageView { .. })),
            2
        );
    }

    #[test]
    fn test_external_drop_keeps_image() {
        let device = Arc::new(RecordingDevice::new());
        let image = vk::Image::from_raw(7);
        let texture = Texture::external(
            device.clone(),
            image,
            TextureDesc::new_2d(vk::Format::B8G8R8A8_SRGB, extent(800, 600)),
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
        let view = texture.attachment_view(vk::ImageAspectFlags::COLOR, 0, 0).unwrap();
        assert!(!texture.owns_image());

        drop(texture);

        assert_eq!(device.count(|call| *call == DeviceCall::DestroyImageView(view)), 1);
        assert_eq!(device.count(|call| *call == DeviceCall::DestroyImage(image)), 0);
    }

    #[test]
    fn test_owned_drop_releases_image_and_memory() {
        let device = Arc::new(RecordingDevice::new());
        let image = vk::Image::from_raw(7);
        let memory = vk::DeviceMemory::from_raw(9);
        let texture = Texture::owned(
            device.clone(),
            image,
            memory,
            TextureDesc::new_2d(vk::Format::R16G16B16A16_SFLOAT, extent(128, 128)),
            vk::ImageLayout::UNDEFINED,
        );
        assert!(texture.owns_image());

        drop(texture);

        assert_eq!(device.count(|call| *call == DeviceCall::DestroyImage(image)), 1);
        assert_eq!(device.count(|call| *call == DeviceCall::FreeMemory(memory)), 1);
    }
}
