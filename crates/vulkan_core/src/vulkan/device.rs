//! Device entry points
//!
//! The handful of `VkDevice` calls this crate makes, behind a trait so the
//! query pool and textures can be driven by something other than a live
//! driver. `ash::Device` is the production implementation.

use ash::vk;

/// Device functions used by timer queries and textures.
///
/// Implementations must be callable from any thread. Command recording calls
/// (`cmd_*`) follow the usual Vulkan rule that one command buffer is recorded
/// by one thread at a time.
pub trait DeviceDispatch: Send + Sync {
    /// `vkCreateImageView`
    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> Result<vk::ImageView, vk::Result>;

    /// `vkDestroyImageView`
    fn destroy_image_view(&self, view: vk::ImageView);

    /// `vkDestroyImage`
    fn destroy_image(&self, image: vk::Image);

    /// `vkFreeMemory`
    fn free_memory(&self, memory: vk::DeviceMemory);

    /// `vkCreateQueryPool`
    fn create_query_pool(&self, info: &vk::QueryPoolCreateInfo) -> Result<vk::QueryPool, vk::Result>;

    /// `vkDestroyQueryPool`
    fn destroy_query_pool(&self, pool: vk::QueryPool);

    /// `vkCmdResetQueryPool`
    fn cmd_reset_query_pool(
        &self,
        command_buffer: vk::CommandBuffer,
        pool: vk::QueryPool,
        first_query: u32,
        query_count: u32,
    );

    /// `vkCmdWriteTimestamp`
    fn cmd_write_timestamp(
        &self,
        command_buffer: vk::CommandBuffer,
        stage: vk::PipelineStageFlags,
        pool: vk::QueryPool,
        query: u32,
    );

    /// `vkGetQueryPoolResults` for `data.len()` consecutive queries, each
    /// written as a value followed by its availability word.
    fn get_query_pool_results(
        &self,
        pool: vk::QueryPool,
        first_query: u32,
        data: &mut [[u64; 2]],
        flags: vk::QueryResultFlags,
    ) -> Result<(), vk::Result>;
}

impl DeviceDispatch for ash::Device {
    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> Result<vk::ImageView, vk::Result> {
        unsafe { ash::Device::create_image_view(self, info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { ash::Device::destroy_image_view(self, view, None) }
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { ash::Device::destroy_image(self, image, None) }
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { ash::Device::free_memory(self, memory, None) }
    }

    fn create_query_pool(&self, info: &vk::QueryPoolCreateInfo) -> Result<vk::QueryPool, vk::Result> {
        unsafe { ash::Device::create_query_pool(self, info, None) }
    }

    fn destroy_query_pool(&self, pool: vk::QueryPool) {
        unsafe { ash::Device::destroy_query_pool(self, pool, None) }
    }

    fn cmd_reset_query_pool(
        &self,
        command_buffer: vk::CommandBuffer,
        pool: vk::QueryPool,
        first_query: u32,
        query_count: u32,
    ) {
        unsafe {
            ash::Device::cmd_reset_query_pool(self, command_buffer, pool, first_query, query_count);
        }
    }

    fn cmd_write_timestamp(
        &self,
        command_buffer: vk::CommandBuffer,
        stage: vk::PipelineStageFlags,
        pool: vk::QueryPool,
        query: u32,
    ) {
        unsafe {
            ash::Device::cmd_write_timestamp(self, command_buffer, stage, pool, query);
        }
    }

    fn get_query_pool_results(
        &self,
        pool: vk::QueryPool,
        first_query: u32,
        data: &mut [[u64; 2]],
        flags: vk::QueryResultFlags,
    ) -> Result<(), vk::Result> {
        let query_count = data.len() as u32;
        unsafe { ash::Device::get_query_pool_results(self, pool, first_query, query_count, data, flags) }
    }
}
