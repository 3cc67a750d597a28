//! GPU timer queries
//!
//! A fixed pool of `TIMESTAMP` queries handed out in adjacent pairs: the
//! first slot is written when the measured work begins, the second when it
//! ends. Allocation state is a bitmap behind a mutex so any thread may
//! allocate or free; recording and reading follow the owning command
//! buffer's thread.
//!
//! The pool never waits on the GPU. Freeing a query whose timestamps are
//! still pending, or reading one before its submission has completed, gives
//! stale or zero values rather than an error. Callers fence first.

use ash::vk;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::vulkan::device::DeviceDispatch;
use crate::vulkan::{VulkanError, VulkanResult};

/// Default number of timestamp slots (16 concurrent queries)
pub const DEFAULT_TIMER_QUERY_CAPACITY: u32 = 32;

/// Widest pool the presence bitmap can track
pub const MAX_TIMER_QUERY_CAPACITY: u32 = u64::BITS;

/// Raw results for one query: `[begin, begin_available, end, end_available]`
pub type TimerQueryResult = [u64; 4];

/// A begin/end pair of timestamp slots owned by one measurement.
///
/// Not `Clone`: [`TimerQueryPool::free`] consumes it, so a pair cannot be
/// released twice.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TimerQuery {
    begin: u32,
    end: u32,
}

impl TimerQuery {
    const fn from_base(base: u32) -> Self {
        Self {
            begin: base,
            end: base + 1,
        }
    }

    /// Slot receiving the starting timestamp
    pub const fn begin_index(&self) -> u32 {
        self.begin
    }

    /// Slot receiving the ending timestamp
    pub const fn end_index(&self) -> u32 {
        self.end
    }

    /// GPU time between the two timestamps in nanoseconds.
    ///
    /// `None` until both availability words are set. `timestamp_period` is
    /// the device's nanoseconds-per-tick limit.
    pub fn elapsed_nanos(result: &TimerQueryResult, timestamp_period: f32) -> Option<u64> {
        let [begin, begin_available, end, end_available] = *result;
        if begin_available == 0 || end_available == 0 {
            return None;
        }

        let ticks = end.saturating_sub(begin);
        Some((ticks as f64 * f64::from(timestamp_period)) as u64)
    }
}

/// Presence bitmap, one bit per slot
#[derive(Debug)]
pub(crate) struct SlotBitmap {
    used: u64,
    capacity: u32,
}

impl SlotBitmap {
    pub(crate) const fn new(capacity: u32) -> Self {
        Self { used: 0, capacity }
    }

    /// Claim the lowest free even/odd pair and return its first index
    pub(crate) fn acquire_pair(&mut self) -> Option<u32> {
        let base = (0..self.capacity)
            .step_by(2)
            .find(|&base| self.used & (0b11 << base) == 0)?;
        self.used |= 0b11 << base;
        Some(base)
    }

    /// Clear both bits of the pair starting at `base`, returning whether it was held
    pub(crate) fn release_pair(&mut self, base: u32) -> bool {
        let mask = 0b11 << base;
        let held = self.used & mask == mask;
        self.used &= !mask;
        held
    }

    pub(crate) const fn used_slots(&self) -> u32 {
        self.used.count_ones()
    }
}

/// Fixed-capacity pool of timestamp query pairs
pub struct TimerQueryPool {
    device: Arc<dyn DeviceDispatch>,
    pool: vk::QueryPool,
    capacity: u32,
    slots: Mutex<SlotBitmap>,
}

impl TimerQueryPool {
    /// Create a timestamp query pool with `capacity` slots.
    ///
    /// # Errors
    ///
    /// `capacity` must be even and between 2 and [`MAX_TIMER_QUERY_CAPACITY`];
    /// anything else is rejected before touching the device. Query pool
    /// creation failures are passed through.
    pub fn new(device: Arc<dyn DeviceDispatch>, capacity: u32) -> VulkanResult<Self> {
        if capacity < 2 || capacity > MAX_TIMER_QUERY_CAPACITY || capacity % 2 != 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "timer query capacity {capacity} must be even and within 2..={MAX_TIMER_QUERY_CAPACITY}"
                ),
            });
        }

        let create_info = vk::QueryPoolCreateInfo::builder()
            .query_type(vk::QueryType::TIMESTAMP)
            .query_count(capacity);

        let pool = device
            .create_query_pool(&create_info)
            .map_err(VulkanError::Api)?;

        log::debug!("Created timer query pool with {} slots", capacity);

        Ok(Self {
            device,
            pool,
            capacity,
            slots: Mutex::new(SlotBitmap::new(capacity)),
        })
    }

    /// Claim a free begin/end slot pair.
    ///
    /// # Errors
    ///
    /// [`VulkanError::QueryPoolExhausted`] when every pair is in use. The
    /// caller decides whether to wait for queries to retire or skip timing
    /// this frame.
    pub fn allocate(&self) -> VulkanResult<TimerQuery> {
        let base = self.lock_slots().acquire_pair();

        match base {
            Some(base) => Ok(TimerQuery::from_base(base)),
            None => {
                log::warn!("Timer query pool exhausted ({} slots in use)", self.capacity);
                Err(VulkanError::QueryPoolExhausted {
                    capacity: self.capacity,
                })
            }
        }
    }

    /// Return a query's slots to the pool.
    ///
    /// The GPU must be done writing both timestamps and any result must have
    /// been read; the pool does not check.
    pub fn free(&self, query: TimerQuery) {
        let held = self.lock_slots().release_pair(query.begin);
        debug_assert!(held, "timer query {query:?} was not allocated from this pool");
    }

    /// Record the starting timestamp into `command_buffer`.
    ///
    /// Both slots are reset first so a reused pair never reports the
    /// previous measurement as available.
    pub fn begin_query(&self, command_buffer: vk::CommandBuffer, query: &TimerQuery) {
        self.device
            .cmd_reset_query_pool(command_buffer, self.pool, query.begin, 2);
        self.device.cmd_write_timestamp(
            command_buffer,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            self.pool,
            query.begin,
        );
    }

    /// Record the ending timestamp into `command_buffer`
    pub fn end_query(&self, command_buffer: vk::CommandBuffer, query: &TimerQuery) {
        self.device.cmd_write_timestamp(
            command_buffer,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            self.pool,
            query.end,
        );
    }

    /// Read both timestamps and their availability words without waiting.
    ///
    /// # Errors
    ///
    /// Device errors other than `NOT_READY` are returned; `NOT_READY` just
    /// means the availability words are still zero.
    pub fn result(&self, query: &TimerQuery) -> VulkanResult<TimerQueryResult> {
        let mut data = [[0u64; 2]; 2];
        let flags = vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WITH_AVAILABILITY;

        match self
            .device
            .get_query_pool_results(self.pool, query.begin, &mut data, flags)
        {
            Ok(()) | Err(vk::Result::NOT_READY) => Ok(bytemuck::cast(data)),
            Err(error) => Err(VulkanError::Api(error)),
        }
    }

    /// Total number of timestamp slots
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of queries currently allocated
    pub fn active_queries(&self) -> u32 {
        self.lock_slots().used_slots() / 2
    }

    /// The underlying query pool handle
    pub const fn handle(&self) -> vk::QueryPool {
        self.pool
    }

    fn lock_slots(&self) -> MutexGuard<'_, SlotBitmap> {
        // The bitmap is never left half-updated, so a poisoned lock is still usable.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TimerQueryPool {
    fn drop(&mut self) {
        let active = self.active_queries();
        if active > 0 {
            log::warn!("Destroying timer query pool with {} queries still allocated", active);
        }
        self.device.destroy_query_pool(self.pool);
    }
}
