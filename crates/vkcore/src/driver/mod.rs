//! Driver seam - "The Loader"
//!
//! The bootstrap, selection and submission logic talk to Vulkan only through
//! these three traits. [`ash_driver`] implements them over `ash`; tests drive
//! the same logic through in-memory fakes.

pub mod ash_driver;

use ash::prelude::VkResult;
use ash::vk;
use std::ffi::{CStr, CString};
use std::rc::Rc;

use crate::diagnostics::DiagnosticSink;

pub use ash_driver::AshLoader;

/// Instance creation parameters, already validated by the bootstrapper.
#[derive(Debug, Clone)]
pub struct InstanceRequest {
    pub app_name: CString,
    pub api_version: u32,
    pub layers: Vec<CString>,
    pub extensions: Vec<CString>,
}

/// Logical device creation parameters built by the context factory.
#[derive(Debug, Clone)]
pub struct DeviceRequest {
    pub queue_family_index: u32,
    pub queue_priority: f32,
    pub features: vk::PhysicalDeviceFeatures,
    pub extensions: Vec<CString>,
}

/// Loader-level (global scope) functions.
pub trait LoaderApi {
    /// `vkGetInstanceProcAddr`. A null `instance` resolves global functions.
    fn proc_addr(&self, instance: vk::Instance, name: &CStr) -> vk::PFN_vkVoidFunction;

    fn instance_layers(&self) -> VkResult<Vec<String>>;

    /// Instance extensions, optionally restricted to those a layer provides.
    fn instance_extensions(&self, layer: Option<&CStr>) -> VkResult<Vec<String>>;

    fn create_instance(&self, request: &InstanceRequest) -> VkResult<Box<dyn InstanceApi>>;

    /// Wrap an instance created by the host. The wrapper never destroys it
    /// unless asked to.
    fn adopt_instance(&self, instance: vk::Instance) -> Box<dyn InstanceApi>;
}

/// Instance and physical-device functions.
pub trait InstanceApi {
    fn handle(&self) -> vk::Instance;

    fn enumerate_physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>>;

    fn features(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures;

    fn device_extensions(&self, physical_device: vk::PhysicalDevice) -> VkResult<Vec<String>>;

    fn queue_families(&self, physical_device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties>;

    fn properties(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties;

    fn memory_properties(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceMemoryProperties;

    fn create_device(
        &self,
        physical_device: vk::PhysicalDevice,
        request: &DeviceRequest,
    ) -> VkResult<Rc<dyn DeviceApi>>;

    fn adopt_device(&self, device: vk::Device) -> Rc<dyn DeviceApi>;

    /// Register `sink` as the receiver of validation messages.
    ///
    /// # Safety
    /// `sink` must stay at the same address and outlive the returned
    /// messenger.
    unsafe fn create_debug_messenger(&self, sink: &DiagnosticSink) -> VkResult<vk::DebugUtilsMessengerEXT>;

    fn destroy_debug_messenger(&self, messenger: vk::DebugUtilsMessengerEXT);

    fn destroy_instance(&self);
}

/// Logical-device functions used by pools and units of work.
pub trait DeviceApi {
    fn handle(&self) -> vk::Device;

    fn queue(&self, queue_family_index: u32, queue_index: u32) -> vk::Queue;

    fn create_command_pool(
        &self,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> VkResult<vk::CommandPool>;

    fn destroy_command_pool(&self, pool: vk::CommandPool);

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VkResult<vk::CommandBuffer>;

    fn free_command_buffer(&self, pool: vk::CommandPool, command_buffer: vk::CommandBuffer);

    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        usage: vk::CommandBufferUsageFlags,
    ) -> VkResult<()>;

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()>;

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()>;

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;

    fn destroy_fence(&self, fence: vk::Fence);

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;

    /// Wait until `fence` signals. `Err(vk::Result::TIMEOUT)` when
    /// `timeout_ns` elapses first.
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()>;

    fn queue_submit(
        &self,
        queue: vk::Queue,
        command_buffer: vk::CommandBuffer,
        fence: vk::Fence,
    ) -> VkResult<()>;

    fn wait_idle(&self) -> VkResult<()>;

    fn destroy_device(&self);
}
