//! In-memory driver used by the integration tests.
//!
//! Every handle is a counter value; live objects are tracked per kind so
//! tests can assert nothing leaked.

#![allow(dead_code)]

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::{HashMap, VecDeque};
use std::ffi::{c_char, CStr};
use std::rc::Rc;

use rayos_vkcore::capability::requested_features;
use rayos_vkcore::diagnostics::{Diagnostic, DiagnosticSink, Severity};
use rayos_vkcore::driver::{DeviceApi, DeviceRequest, InstanceApi, InstanceRequest, LoaderApi};
use rayos_vkcore::types::{DEBUG_UTILS_EXTENSION, KHRONOS_VALIDATION_LAYER};
use rayos_vkcore::Capability;

unsafe extern "system" fn stub() {}

/// What a fence wait reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceBehavior {
    Signal,
    Never,
    Fail(vk::Result),
}

#[derive(Debug, Clone)]
pub struct FakePhysicalDevice {
    pub raw: u64,
    pub name: String,
    pub features: vk::PhysicalDeviceFeatures,
    /// `None` makes the extension query fail.
    pub extensions: Option<Vec<String>>,
    pub queue_families: Vec<vk::QueueFlags>,
}

impl FakePhysicalDevice {
    pub fn new(raw: u64, name: &str) -> Self {
        Self {
            raw,
            name: name.to_string(),
            features: vk::PhysicalDeviceFeatures::default(),
            extensions: Some(Vec::new()),
            queue_families: vec![vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE],
        }
    }

    pub fn with_capabilities(mut self, caps: &[Capability]) -> Self {
        self.features = requested_features(caps);
        self
    }

    pub fn with_extensions(mut self, exts: &[&str]) -> Self {
        self.extensions = Some(exts.iter().map(|e| e.to_string()).collect());
        self
    }

    pub fn with_failing_extension_query(mut self) -> Self {
        self.extensions = None;
        self
    }

    pub fn with_families(mut self, families: &[vk::QueueFlags]) -> Self {
        self.queue_families = families.to_vec();
        self
    }
}

#[derive(Debug, Default)]
pub struct Live {
    pub instances: i64,
    pub messengers: i64,
    pub devices: i64,
    pub pools: i64,
    pub buffers: i64,
    pub fences: i64,
}

pub struct FakeState {
    pub layers: Vec<String>,
    pub layer_extensions: HashMap<String, Vec<String>>,
    pub missing_entry_points: Vec<String>,
    pub devices: Vec<FakePhysicalDevice>,
    pub fence_default: FenceBehavior,
    pub fence_script: VecDeque<FenceBehavior>,
    /// Driver calls forced to fail, keyed by Vulkan function name.
    pub failures: HashMap<&'static str, vk::Result>,
    pub null_queue: bool,

    pub live: Live,
    pub next_handle: u64,
    pub instance_requests: Vec<InstanceRequest>,
    pub device_requests: Vec<DeviceRequest>,
    pub pool_flags: Vec<vk::CommandPoolCreateFlags>,
    pub begin_flags: Vec<vk::CommandBufferUsageFlags>,
    pub extension_queries: Vec<u64>,
    pub destroyed_instances: Vec<u64>,
    pub destroyed_devices: Vec<u64>,
    pub submits: usize,
    pub waits: Vec<u64>,
    pub buffer_resets: usize,
    pub sink: Option<*const DiagnosticSink>,
}

impl Default for FakeState {
    fn default() -> Self {
        let mut layer_extensions = HashMap::new();
        layer_extensions.insert(
            KHRONOS_VALIDATION_LAYER.to_string(),
            vec![DEBUG_UTILS_EXTENSION.to_string()],
        );

        Self {
            layers: vec![KHRONOS_VALIDATION_LAYER.to_string()],
            layer_extensions,
            missing_entry_points: Vec::new(),
            devices: vec![FakePhysicalDevice::new(0xA0, "Fake Accelerator")],
            fence_default: FenceBehavior::Signal,
            fence_script: VecDeque::new(),
            failures: HashMap::new(),
            null_queue: false,
            live: Live::default(),
            next_handle: 0x1000,
            instance_requests: Vec::new(),
            device_requests: Vec::new(),
            pool_flags: Vec::new(),
            begin_flags: Vec::new(),
            extension_queries: Vec::new(),
            destroyed_instances: Vec::new(),
            destroyed_devices: Vec::new(),
            submits: 0,
            waits: Vec::new(),
            buffer_resets: 0,
            sink: None,
        }
    }
}

impl FakeState {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn check(&self, call: &'static str) -> VkResult<()> {
        match self.failures.get(call) {
            Some(result) => Err(*result),
            None => Ok(()),
        }
    }

    fn device(&self, physical_device: vk::PhysicalDevice) -> Option<&FakePhysicalDevice> {
        self.devices.iter().find(|d| d.raw == physical_device.as_raw())
    }
}

type Shared = Rc<RefCell<FakeState>>;

#[derive(Clone, Default)]
pub struct FakeDriver {
    state: Shared,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(self, devices: Vec<FakePhysicalDevice>) -> Self {
        self.state.borrow_mut().devices = devices;
        self
    }

    pub fn with_layers(self, layers: &[(&str, Vec<&str>)]) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.layers = layers.iter().map(|(name, _)| name.to_string()).collect();
            state.layer_extensions = layers
                .iter()
                .map(|(name, exts)| (name.to_string(), exts.iter().map(|e| e.to_string()).collect()))
                .collect();
        }
        self
    }

    pub fn without_entry_point(self, name: &str) -> Self {
        self.state.borrow_mut().missing_entry_points.push(name.to_string());
        self
    }

    pub fn with_fence(self, behavior: FenceBehavior) -> Self {
        self.state.borrow_mut().fence_default = behavior;
        self
    }

    pub fn failing(self, call: &'static str, result: vk::Result) -> Self {
        self.state.borrow_mut().failures.insert(call, result);
        self
    }

    pub fn with_null_queue(self) -> Self {
        self.state.borrow_mut().null_queue = true;
        self
    }

    /// Queue one-shot fence results ahead of the default.
    pub fn script_fence(&self, behaviors: &[FenceBehavior]) {
        self.state.borrow_mut().fence_script.extend(behaviors.iter().copied());
    }

    pub fn set_fence(&self, behavior: FenceBehavior) {
        self.state.borrow_mut().fence_default = behavior;
    }

    pub fn state(&self) -> Ref<'_, FakeState> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> RefMut<'_, FakeState> {
        self.state.borrow_mut()
    }

    /// Deliver a validation message to the installed sink, if any.
    pub fn emit_validation_message(&self, severity: Severity, message: &str) -> bool {
        let sink = self.state.borrow().sink;
        match sink {
            Some(ptr) => {
                let sink = unsafe { &*ptr };
                sink.emit(&Diagnostic {
                    severity,
                    source: "fake-layer",
                    message,
                });
                true
            }
            None => false,
        }
    }
}

impl LoaderApi for FakeDriver {
    fn proc_addr(&self, _instance: vk::Instance, name: &CStr) -> vk::PFN_vkVoidFunction {
        let name = name.to_string_lossy();
        let state = self.state.borrow();
        if state.missing_entry_points.iter().any(|missing| *missing == name) {
            None
        } else {
            Some(stub)
        }
    }

    fn instance_layers(&self) -> VkResult<Vec<String>> {
        let state = self.state.borrow();
        state.check("vkEnumerateInstanceLayerProperties")?;
        Ok(state.layers.clone())
    }

    fn instance_extensions(&self, layer: Option<&CStr>) -> VkResult<Vec<String>> {
        let state = self.state.borrow();
        state.check("vkEnumerateInstanceExtensionProperties")?;
        let exts = match layer {
            Some(layer) => state
                .layer_extensions
                .get(&*layer.to_string_lossy())
                .cloned()
                .unwrap_or_default(),
            None => Vec::new(),
        };
        Ok(exts)
    }

    fn create_instance(&self, request: &InstanceRequest) -> VkResult<Box<dyn InstanceApi>> {
        let mut state = self.state.borrow_mut();
        state.check("vkCreateInstance")?;
        state.instance_requests.push(request.clone());
        state.live.instances += 1;
        let handle = vk::Instance::from_raw(state.handle());
        Ok(Box::new(FakeInstance {
            state: Rc::clone(&self.state),
            handle,
        }))
    }

    fn adopt_instance(&self, instance: vk::Instance) -> Box<dyn InstanceApi> {
        Box::new(FakeInstance {
            state: Rc::clone(&self.state),
            handle: instance,
        })
    }
}

pub struct FakeInstance {
    state: Shared,
    handle: vk::Instance,
}

impl InstanceApi for FakeInstance {
    fn handle(&self) -> vk::Instance {
        self.handle
    }

    fn enumerate_physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        let state = self.state.borrow();
        state.check("vkEnumeratePhysicalDevices")?;
        Ok(state
            .devices
            .iter()
            .map(|d| vk::PhysicalDevice::from_raw(d.raw))
            .collect())
    }

    fn features(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures {
        self.state
            .borrow()
            .device(physical_device)
            .map(|d| d.features)
            .unwrap_or_default()
    }

    fn device_extensions(&self, physical_device: vk::PhysicalDevice) -> VkResult<Vec<String>> {
        let mut state = self.state.borrow_mut();
        state.extension_queries.push(physical_device.as_raw());
        match state.device(physical_device).and_then(|d| d.extensions.clone()) {
            Some(exts) => Ok(exts),
            None => Err(vk::Result::ERROR_INITIALIZATION_FAILED),
        }
    }

    fn queue_families(&self, physical_device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        self.state
            .borrow()
            .device(physical_device)
            .map(|d| {
                d.queue_families
                    .iter()
                    .map(|flags| vk::QueueFamilyProperties {
                        queue_flags: *flags,
                        queue_count: 1,
                        ..Default::default()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn properties(&self, physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties {
        let mut props = vk::PhysicalDeviceProperties::default();
        if let Some(device) = self.state.borrow().device(physical_device) {
            for (dst, src) in props
                .device_name
                .iter_mut()
                .zip(device.name.bytes().take(vk::MAX_PHYSICAL_DEVICE_NAME_SIZE - 1))
            {
                *dst = src as c_char;
            }
        }
        props
    }

    fn memory_properties(&self, _physical_device: vk::PhysicalDevice) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            memory_heap_count: 1,
            ..Default::default()
        };
        props.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        props
    }

    fn create_device(
        &self,
        _physical_device: vk::PhysicalDevice,
        request: &DeviceRequest,
    ) -> VkResult<Rc<dyn DeviceApi>> {
        let mut state = self.state.borrow_mut();
        state.check("vkCreateDevice")?;
        state.device_requests.push(request.clone());
        state.live.devices += 1;
        let handle = vk::Device::from_raw(state.handle());
        Ok(Rc::new(FakeDevice {
            state: Rc::clone(&self.state),
            handle,
        }))
    }

    fn adopt_device(&self, device: vk::Device) -> Rc<dyn DeviceApi> {
        Rc::new(FakeDevice {
            state: Rc::clone(&self.state),
            handle: device,
        })
    }

    unsafe fn create_debug_messenger(&self, sink: &DiagnosticSink) -> VkResult<vk::DebugUtilsMessengerEXT> {
        let mut state = self.state.borrow_mut();
        state.check("vkCreateDebugUtilsMessengerEXT")?;
        state.live.messengers += 1;
        state.sink = Some(sink as *const DiagnosticSink);
        Ok(vk::DebugUtilsMessengerEXT::from_raw(state.handle()))
    }

    fn destroy_debug_messenger(&self, _messenger: vk::DebugUtilsMessengerEXT) {
        let mut state = self.state.borrow_mut();
        state.live.messengers -= 1;
        state.sink = None;
    }

    fn destroy_instance(&self) {
        let mut state = self.state.borrow_mut();
        state.live.instances -= 1;
        state.destroyed_instances.push(self.handle.as_raw());
    }
}

pub struct FakeDevice {
    state: Shared,
    handle: vk::Device,
}

impl DeviceApi for FakeDevice {
    fn handle(&self) -> vk::Device {
        self.handle
    }

    fn queue(&self, _queue_family_index: u32, _queue_index: u32) -> vk::Queue {
        let mut state = self.state.borrow_mut();
        if state.null_queue {
            vk::Queue::null()
        } else {
            vk::Queue::from_raw(state.handle())
        }
    }

    fn create_command_pool(
        &self,
        _queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> VkResult<vk::CommandPool> {
        let mut state = self.state.borrow_mut();
        state.check("vkCreateCommandPool")?;
        state.pool_flags.push(flags);
        state.live.pools += 1;
        Ok(vk::CommandPool::from_raw(state.handle()))
    }

    fn destroy_command_pool(&self, _pool: vk::CommandPool) {
        self.state.borrow_mut().live.pools -= 1;
    }

    fn allocate_command_buffer(&self, _pool: vk::CommandPool) -> VkResult<vk::CommandBuffer> {
        let mut state = self.state.borrow_mut();
        state.check("vkAllocateCommandBuffers")?;
        state.live.buffers += 1;
        Ok(vk::CommandBuffer::from_raw(state.handle()))
    }

    fn free_command_buffer(&self, _pool: vk::CommandPool, _command_buffer: vk::CommandBuffer) {
        self.state.borrow_mut().live.buffers -= 1;
    }

    fn begin_command_buffer(
        &self,
        _command_buffer: vk::CommandBuffer,
        usage: vk::CommandBufferUsageFlags,
    ) -> VkResult<()> {
        let mut state = self.state.borrow_mut();
        state.check("vkBeginCommandBuffer")?;
        state.begin_flags.push(usage);
        Ok(())
    }

    fn end_command_buffer(&self, _command_buffer: vk::CommandBuffer) -> VkResult<()> {
        self.state.borrow().check("vkEndCommandBuffer")
    }

    fn reset_command_buffer(&self, _command_buffer: vk::CommandBuffer) -> VkResult<()> {
        let mut state = self.state.borrow_mut();
        state.check("vkResetCommandBuffer")?;
        state.buffer_resets += 1;
        Ok(())
    }

    fn create_fence(&self, _signaled: bool) -> VkResult<vk::Fence> {
        let mut state = self.state.borrow_mut();
        state.check("vkCreateFence")?;
        state.live.fences += 1;
        Ok(vk::Fence::from_raw(state.handle()))
    }

    fn destroy_fence(&self, _fence: vk::Fence) {
        self.state.borrow_mut().live.fences -= 1;
    }

    fn reset_fence(&self, _fence: vk::Fence) -> VkResult<()> {
        self.state.borrow().check("vkResetFences")
    }

    fn wait_for_fence(&self, _fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        let mut state = self.state.borrow_mut();
        state.waits.push(timeout_ns);
        let behavior = state.fence_script.pop_front().unwrap_or(state.fence_default);
        match behavior {
            FenceBehavior::Signal => Ok(()),
            FenceBehavior::Never => Err(vk::Result::TIMEOUT),
            FenceBehavior::Fail(result) => Err(result),
        }
    }

    fn queue_submit(
        &self,
        _queue: vk::Queue,
        _command_buffer: vk::CommandBuffer,
        _fence: vk::Fence,
    ) -> VkResult<()> {
        let mut state = self.state.borrow_mut();
        state.check("vkQueueSubmit")?;
        state.submits += 1;
        Ok(())
    }

    fn wait_idle(&self) -> VkResult<()> {
        Ok(())
    }

    fn destroy_device(&self) {
        let mut state = self.state.borrow_mut();
        state.live.devices -= 1;
        state.destroyed_devices.push(self.handle.as_raw());
    }
}
