//! Device probe
//!
//! Headless bring-up that prints what the backend resolved for each step of
//! device setup and times an empty submission with a timer query.
//!
//! Usage: `device_probe [config.toml|config.ron]`

use ash::{vk, Device, Entry, Instance};
use std::ffi::CString;
use std::sync::Arc;

use vulkan_core::prelude::*;

type ProbeResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() -> ProbeResult<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading backend config from {}", path);
            BackendConfig::load_from_file(&path)?
        }
        None => BackendConfig::default(),
    };
    config.validate()?;

    let entry = unsafe { Entry::load() }
        .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e)))?;

    let app_name = CString::new("device_probe")?;
    let app_info = vk::ApplicationInfo::builder()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_0);
    let create_info = vk::InstanceCreateInfo::builder().application_info(&app_info);

    let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(VulkanError::Api)?;

    let outcome = probe(&entry, &instance, &config);

    unsafe { instance.destroy_instance(None) };
    outcome
}

fn probe(entry: &Entry, instance: &Instance, config: &BackendConfig) -> ProbeResult<()> {
    let (physical_device, queue_family) = select_physical_device(instance)?;

    let capabilities = platform::query_capabilities(entry, instance, physical_device, config)?;
    report_capabilities(&capabilities);

    let priorities = [1.0_f32];
    let queue_infos = [vk::DeviceQueueCreateInfo::builder()
        .queue_family_index(queue_family)
        .queue_priorities(&priorities)
        .build()];
    let device_info = vk::DeviceCreateInfo::builder().queue_create_infos(&queue_infos);

    let device = unsafe { instance.create_device(physical_device, &device_info, None) }
        .map_err(VulkanError::Api)?;

    let timestamp_bits = unsafe {
        instance.get_physical_device_queue_family_properties(physical_device)
    }[queue_family as usize]
        .timestamp_valid_bits;

    let outcome = if capabilities.supports_timestamps() && timestamp_bits > 0 {
        time_empty_submission(&device, queue_family, &capabilities, config)
    } else {
        log::warn!("Queue family {} cannot write timestamps, skipping timing", queue_family);
        Ok(())
    };

    unsafe {
        let _ = device.device_wait_idle();
        device.destroy_device(None);
    }
    outcome
}

/// Discrete GPUs first, then anything with a graphics queue
fn select_physical_device(instance: &Instance) -> VulkanResult<(vk::PhysicalDevice, u32)> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(VulkanError::Api)?;

    let mut candidates: Vec<(vk::PhysicalDevice, u32, bool)> = devices
        .into_iter()
        .filter_map(|device| {
            let families =
                unsafe { instance.get_physical_device_queue_family_properties(device) };
            let graphics = families
                .iter()
                .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))?;
            let properties = unsafe { instance.get_physical_device_properties(device) };
            let discrete = properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU;
            Some((device, graphics as u32, discrete))
        })
        .collect();

    candidates.sort_by_key(|&(_, _, discrete)| !discrete);
    candidates
        .first()
        .map(|&(device, family, _)| (device, family))
        .ok_or_else(|| VulkanError::InitializationFailed("No GPU with a graphics queue found".to_string()))
}

fn report_capabilities(capabilities: &DeviceCapabilities) {
    println!("Device:          {}", capabilities.device_name());
    println!("Vendor id:       {:#06x}", capabilities.vendor_id());
    println!("Depth format:    {:?}", capabilities.depth_format());
    println!(
        "Max 2D image:    {}",
        capabilities.limits().max_image_dimension2_d
    );
    println!("Features:        {:?}", capabilities.supported_features());

    for index in 0..capabilities.memory_type_count() {
        if let Some(flags) = capabilities.memory_type_flags(index) {
            println!("Memory type {:2}:  {:?}", index, flags);
        }
    }

    let requests = [
        ("device local", vk::MemoryPropertyFlags::DEVICE_LOCAL),
        (
            "staging",
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ),
        (
            "lazily allocated",
            vk::MemoryPropertyFlags::LAZILY_ALLOCATED,
        ),
    ];
    for (name, flags) in requests {
        match capabilities.select_memory_type(u32::MAX, flags) {
            Ok(index) => println!("{:<16} -> memory type {}", name, index),
            Err(e) => println!("{:<16} -> {}", name, e),
        }
    }
}

fn time_empty_submission(
    device: &Device,
    queue_family: u32,
    capabilities: &DeviceCapabilities,
    config: &BackendConfig,
) -> ProbeResult<()> {
    let timers = TimerQueryPool::new(Arc::new(device.clone()), config.timer_query_capacity)?;

    let pool_info = vk::CommandPoolCreateInfo::builder().queue_family_index(queue_family);
    let command_pool =
        unsafe { device.create_command_pool(&pool_info, None) }.map_err(VulkanError::Api)?;

    let outcome = record_and_submit(device, queue_family, command_pool, &timers);

    unsafe { device.destroy_command_pool(command_pool, None) };

    let (query, result) = outcome?;
    match TimerQuery::elapsed_nanos(&result, capabilities.timestamp_period()) {
        Some(nanos) => println!("Empty submission: {} ns on the GPU", nanos),
        None => println!("Empty submission: timestamps not available"),
    }
    timers.free(query);

    Ok(())
}

fn record_and_submit(
    device: &Device,
    queue_family: u32,
    command_pool: vk::CommandPool,
    timers: &TimerQueryPool,
) -> ProbeResult<(TimerQuery, TimerQueryResult)> {
    let allocate_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);
    let command_buffer =
        unsafe { device.allocate_command_buffers(&allocate_info) }.map_err(VulkanError::Api)?[0];

    let query = timers.allocate()?;

    let begin_info =
        vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    unsafe { device.begin_command_buffer(command_buffer, &begin_info) }.map_err(VulkanError::Api)?;
    timers.begin_query(command_buffer, &query);
    timers.end_query(command_buffer, &query);
    unsafe { device.end_command_buffer(command_buffer) }.map_err(VulkanError::Api)?;

    let command_buffers = [command_buffer];
    let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
    unsafe {
        let queue = device.get_device_queue(queue_family, 0);
        device
            .queue_submit(queue, &[submit_info.build()], vk::Fence::null())
            .map_err(VulkanError::Api)?;
        device.queue_wait_idle(queue).map_err(VulkanError::Api)?;
    }

    let result = timers.result(&query)?;
    Ok((query, result))
}
