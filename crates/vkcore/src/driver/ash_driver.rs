//! `ash`-backed implementation of the driver seam.
//!
//! Every call here is a thin unsafe wrapper. Handle lifetimes are tracked by
//! the owners in `bootstrap`, `context` and `command`, never here.

use ash::prelude::VkResult;
use ash::vk;
use std::ffi::{c_char, c_void, CStr};
use std::rc::Rc;

use super::{DeviceApi, DeviceRequest, InstanceApi, InstanceRequest, LoaderApi};
use crate::diagnostics::{debug_utils_callback, DiagnosticSink};
use crate::error::{Result, VkCoreError};

const ENGINE_NAME: &CStr = c"rayos-vkcore";

fn names_of<'a>(raw: impl Iterator<Item = &'a [c_char; vk::MAX_EXTENSION_NAME_SIZE]>) -> Vec<String> {
    raw.map(|name| {
        let cstr = unsafe { CStr::from_ptr(name.as_ptr()) };
        cstr.to_string_lossy().into_owned()
    })
    .collect()
}

/// Loader bound to a `vkGetInstanceProcAddr`.
#[derive(Clone)]
pub struct AshLoader {
    entry: ash::Entry,
}

impl AshLoader {
    /// Load the system Vulkan library.
    pub fn load() -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }.map_err(|err| VkCoreError::LoaderUnavailable {
            reason: err.to_string(),
        })?;
        Ok(Self { entry })
    }

    /// Bind to a resolver supplied by the host (for example one exported by
    /// a windowing library).
    ///
    /// # Safety
    /// `get_instance_proc_addr` must be a valid `vkGetInstanceProcAddr`.
    pub unsafe fn from_resolver(get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr) -> Self {
        let entry = ash::Entry::from_static_fn(ash::StaticFn { get_instance_proc_addr });
        Self { entry }
    }

    pub fn from_entry(entry: ash::Entry) -> Self {
        Self { entry }
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }
}

impl LoaderApi for AshLoader {
    fn proc_addr(&self, instance: vk::Instance, name: &CStr) -> vk::PFN_vkVoidFunction {
        unsafe { (self.entry.static_fn().get_instance_proc_addr)(instance, name.as_ptr()) }
    }

    fn instance_layers(&self) -> VkResult<Vec<String>> {
        let layers = unsafe { self.entry.enumerate_instance_layer_properties()? };
        Ok(names_of(layers.iter().map(|l| &l.layer_name)))
    }

    fn instance_extensions(&self, layer: Option<&CStr>) -> VkResult<Vec<String>> {
        let extensions = unsafe { self.entry.enumerate_instance_extension_properties(layer)? };
        Ok(names_of(extensions.iter().map(|e| &e.extension_name)))
    }

    fn create_instance(&self, request: &InstanceRequest) -> VkResult<Box<dyn InstanceApi>> {
        let app_info = vk::ApplicationInfo::default()
            .application_name(&request.app_name)
            .application_version(0)
            .engine_name(ENGINE_NAME)
            .engine_version(0)
            .api_version(request.api_version);

        let layer_ptrs: Vec<*const c_char> = request.layers.iter().map(|l| l.as_ptr()).collect();
        let ext_ptrs: Vec<*const c_char> = request.extensions.iter().map(|e| e.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&ext_ptrs);

        let instance = unsafe { self.entry.create_instance(&create_info, None)? };
        Ok(Box::new(AshInstance {
            entry: self.entry.clone(),
            instance,
        }))
    }

    fn adopt_instance(&self, instance: vk::Instance) -> Box<dyn InstanceApi> {
        let instance = unsafe { ash::Instance::load(self.entry.static_fn(), instance) };
        Box::new(AshInstance {
            entry: self.entry.clone(),
            instance,
        })
    }
}

pub struct AshInstance {
    entry: ash::Entry,
    instance: ash::Instance,
}

impl AshInstance {
    fn debug_utils(&self) -> ash::ext::debug_utils::Instance {
        ash::ext::debug_utils::Instance::new(&self.entry, &self.instance)
    }
}

impl InstanceApi for AshInstance {
    fn handle(&self) -> vk::Instance {
        self.instance.handle()
    }

    fn enumerate_physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        unsafe { self.instance.enumerate_physical_devices() }
    }

    fn features(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures {
        unsafe { self.instance.get_physical_device_features(physical_device) }
    }

    fn device_extensions(&self, physical_device: vk::PhysicalDevice) -> VkResult<Vec<String>> {
        let extensions = unsafe { self.instance.enumerate_device_extension_properties(physical_device)? };
        Ok(names_of(extensions.iter().map(|e| &e.extension_name)))
    }

    fn queue_families(&self, physical_device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        unsafe { self.instance.get_physical_device_queue_family_properties(physical_device) }
    }

    fn properties(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties {
        unsafe { self.instance.get_physical_device_properties(physical_device) }
    }

    fn memory_properties(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceMemoryProperties {
        unsafe { self.instance.get_physical_device_memory_properties(physical_device) }
    }

    fn create_device(
        &self,
        physical_device: vk::PhysicalDevice,
        request: &DeviceRequest,
    ) -> VkResult<Rc<dyn DeviceApi>> {
        let priorities = [request.queue_priority];
        let queue_info = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(request.queue_family_index)
            .queue_priorities(&priorities)];

        let ext_ptrs: Vec<*const c_char> = request.extensions.iter().map(|e| e.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_info)
            .enabled_extension_names(&ext_ptrs)
            .enabled_features(&request.features);

        let device = unsafe { self.instance.create_device(physical_device, &create_info, None)? };
        Ok(Rc::new(AshDevice { device }))
    }

    fn adopt_device(&self, device: vk::Device) -> Rc<dyn DeviceApi> {
        let device = unsafe { ash::Device::load(self.instance.fp_v1_0(), device) };
        Rc::new(AshDevice { device })
    }

    unsafe fn create_debug_messenger(&self, sink: &DiagnosticSink) -> VkResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(DiagnosticSink::severity_mask())
            .message_type(DiagnosticSink::type_mask())
            .pfn_user_callback(Some(debug_utils_callback))
            .user_data(sink as *const DiagnosticSink as *mut c_void);

        self.debug_utils().create_debug_utils_messenger(&create_info, None)
    }

    fn destroy_debug_messenger(&self, messenger: vk::DebugUtilsMessengerEXT) {
        unsafe { self.debug_utils().destroy_debug_utils_messenger(messenger, None) };
    }

    fn destroy_instance(&self) {
        unsafe { self.instance.destroy_instance(None) };
    }
}

pub struct AshDevice {
    device: ash::Device,
}

impl DeviceApi for AshDevice {
    fn handle(&self) -> vk::Device {
        self.device.handle()
    }

    fn queue(&self, queue_family_index: u32, queue_index: u32) -> vk::Queue {
        unsafe { self.device.get_device_queue(queue_family_index, queue_index) }
    }

    fn create_command_pool(
        &self,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> VkResult<vk::CommandPool> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(flags);
        unsafe { self.device.create_command_pool(&create_info, None) }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) };
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VkResult<vk::CommandBuffer> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.device.allocate_command_buffers(&allocate_info)? };
        buffers.first().copied().ok_or(vk::Result::ERROR_UNKNOWN)
    }

    fn free_command_buffer(&self, pool: vk::CommandPool, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.free_command_buffers(pool, &[command_buffer]) };
    }

    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        usage: vk::CommandBufferUsageFlags,
    ) -> VkResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default().flags(usage);
        unsafe { self.device.begin_command_buffer(command_buffer, &begin_info) }
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(command_buffer) }
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
        }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        unsafe { self.device.create_fence(&create_info, None) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) }
    }

    fn queue_submit(
        &self,
        queue: vk::Queue,
        command_buffer: vk::CommandBuffer,
        fence: vk::Fence,
    ) -> VkResult<()> {
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe { self.device.queue_submit(queue, &[submit_info], fence) }
    }

    fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }

    fn destroy_device(&self) {
        unsafe { self.device.destroy_device(None) };
    }
}
