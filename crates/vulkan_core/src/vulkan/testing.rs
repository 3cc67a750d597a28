//! Recording device used by unit tests

use ash::vk::{self, Handle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::device::DeviceDispatch;

/// One device call as seen by [`RecordingDevice`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DeviceCall {
    CreateImageView {
        view: vk::ImageView,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        level: u32,
        layer: u32,
    },
    DestroyImageView(vk::ImageView),
    DestroyImage(vk::Image),
    FreeMemory(vk::DeviceMemory),
    CreateQueryPool {
        pool: vk::QueryPool,
        query_count: u32,
    },
    DestroyQueryPool(vk::QueryPool),
    ResetQueryPool {
        first_query: u32,
        query_count: u32,
    },
    WriteTimestamp {
        stage: vk::PipelineStageFlags,
        query: u32,
    },
}

/// Hands out increasing fake handles and remembers every call
#[derive(Default)]
pub(crate) struct RecordingDevice {
    next_handle: AtomicU64,
    calls: Mutex<Vec<DeviceCall>>,
    /// Values returned by `get_query_pool_results`, indexed by query
    pub(crate) query_values: Mutex<Vec<[u64; 2]>>,
    /// Error returned by `get_query_pool_results`, if any
    pub(crate) query_error: Mutex<Option<vk::Result>>,
}

impl RecordingDevice {
    pub(crate) fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, matches: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|call| matches(call)).count()
    }

    fn record(&self, call: DeviceCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }
}

impl DeviceDispatch for RecordingDevice {
    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> Result<vk::ImageView, vk::Result> {
        let view = vk::ImageView::from_raw(self.handle());
        self.record(DeviceCall::CreateImageView {
            view,
            image: info.image,
            aspect: info.subresource_range.aspect_mask,
            level: info.subresource_range.base_mip_level,
            layer: info.subresource_range.base_array_layer,
        });
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.record(DeviceCall::DestroyImageView(view));
    }

    fn destroy_image(&self, image: vk::Image) {
        self.record(DeviceCall::DestroyImage(image));
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        self.record(DeviceCall::FreeMemory(memory));
    }

    fn create_query_pool(&self, info: &vk::QueryPoolCreateInfo) -> Result<vk::QueryPool, vk::Result> {
        let pool = vk::QueryPool::from_raw(self.handle());
        *self.query_values.lock().unwrap() = vec![[0, 0]; info.query_count as usize];
        self.record(DeviceCall::CreateQueryPool {
            pool,
            query_count: info.query_count,
        });
        Ok(pool)
    }

    fn destroy_query_pool(&self, pool: vk::QueryPool) {
        self.record(DeviceCall::DestroyQueryPool(pool));
    }

    fn cmd_reset_query_pool(
        &self,
        _command_buffer: vk::CommandBuffer,
        _pool: vk::QueryPool,
        first_query: u32,
        query_count: u32,
    ) {
        self.record(DeviceCall::ResetQueryPool {
            first_query,
            query_count,
        });
    }

    fn cmd_write_timestamp(
        &self,
        _command_buffer: vk::CommandBuffer,
        stage: vk::PipelineStageFlags,
        _pool: vk::QueryPool,
        query: u32,
    ) {
        self.record(DeviceCall::WriteTimestamp { stage, query });
    }

    fn get_query_pool_results(
        &self,
        _pool: vk::QueryPool,
        first_query: u32,
        data: &mut [[u64; 2]],
        _flags: vk::QueryResultFlags,
    ) -> Result<(), vk::Result> {
        let values = self.query_values.lock().unwrap();
        let first = first_query as usize;
        data.copy_from_slice(&values[first..first + data.len()]);

        match *self.query_error.lock().unwrap() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
