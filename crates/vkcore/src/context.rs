//! Execution context: one logical device, one queue, resolved entry points.
//!
//! Built either by self-bootstrapping an instance ([`ExecutionContext::bootstrap`])
//! or around handles the host already created ([`ExecutionContext::adopt`]).
//! Capability and extension negotiation happens once, here.

use ash::vk;
use std::ffi::CStr;
use std::ops::Deref;
use std::rc::Rc;

use crate::bootstrap::{ContextBootstrapper, OwnedInstance};
use crate::capability::{requested_features, Capability};
use crate::command::{UnitOfWork, WorkPool};
use crate::diagnostics::DiagnosticSink;
use crate::dispatch::{DispatchTable, Scope};
use crate::driver::{DeviceApi, DeviceRequest, InstanceApi, LoaderApi};
use crate::error::{Result, VkCoreError};
use crate::selector::{check_adopted, choose_physical_device};
use crate::types::{c_strings, ContextConfig};

/// Handles created and owned by the host application.
#[derive(Debug, Clone)]
pub struct AdoptedHandles {
    pub instance: vk::Instance,
    pub physical_device: vk::PhysicalDevice,
    /// Features the host reports for `physical_device`.
    pub features: vk::PhysicalDeviceFeatures,
    /// Device extensions the host reports for `physical_device`.
    pub extensions: Vec<String>,
    pub queue_family_index: u32,
    pub device: vk::Device,
    pub queue: vk::Queue,
}

/// Who destroys the instance and device.
pub enum Ownership {
    /// Created here; destroyed once the context and every pool and unit
    /// created from it are gone.
    Owned(Rc<OwnedInstance>),
    /// Borrowed from the host; never destroyed here.
    Adopted(Box<dyn InstanceApi>),
}

impl Ownership {
    fn instance(&self) -> &dyn InstanceApi {
        match self {
            Ownership::Owned(owned) => owned.api(),
            Ownership::Adopted(api) => api.as_ref(),
        }
    }
}

/// Logical device shared by a context and the pools and units created from it.
///
/// The last holder destroys an owned device, then releases the instance it was
/// created from. Adopted devices are never destroyed.
pub struct LogicalDevice {
    api: Rc<dyn DeviceApi>,
    // Some for owned devices; released after the device is destroyed.
    instance: Option<Rc<OwnedInstance>>,
}

impl LogicalDevice {
    fn owned(api: Rc<dyn DeviceApi>, instance: Rc<OwnedInstance>) -> Self {
        Self {
            api,
            instance: Some(instance),
        }
    }

    fn adopted(api: Rc<dyn DeviceApi>) -> Self {
        Self { api, instance: None }
    }

    pub fn is_owned(&self) -> bool {
        self.instance.is_some()
    }
}

impl Deref for LogicalDevice {
    type Target = dyn DeviceApi;

    fn deref(&self) -> &Self::Target {
        self.api.as_ref()
    }
}

impl std::fmt::Debug for LogicalDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicalDevice")
            .field("handle", &self.api.handle())
            .field("owned", &self.is_owned())
            .finish()
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        if self.instance.is_none() {
            return;
        }
        if let Err(err) = self.api.wait_idle() {
            log::warn!("vkDeviceWaitIdle failed during shutdown: {err}");
        }
        self.api.destroy_device();
        log::info!("logical device destroyed");
    }
}

pub struct ExecutionContext {
    device: Rc<LogicalDevice>,
    queue: vk::Queue,
    queue_family_index: u32,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    enabled_capabilities: Vec<Capability>,
    enabled_extensions: Vec<String>,
    dispatch: DispatchTable,
    fence_timeout_ms: u32,
    ownership: Ownership,
}

/// Create the logical device with exactly one queue from `queue_family_index`.
///
/// Only `capabilities` are enabled, even if the device offers more.
pub fn create_logical_device(
    instance: &dyn InstanceApi,
    physical_device: vk::PhysicalDevice,
    queue_family_index: u32,
    capabilities: &[Capability],
    extensions: &[String],
) -> Result<(Rc<dyn DeviceApi>, vk::Queue)> {
    let request = DeviceRequest {
        queue_family_index,
        queue_priority: 1.0,
        features: requested_features(capabilities),
        extensions: c_strings("required_extensions", extensions)?,
    };

    let device = instance
        .create_device(physical_device, &request)
        .map_err(|result| VkCoreError::DeviceCreationFailed { result })?;

    let queue = device.queue(queue_family_index, 0);
    if queue == vk::Queue::null() {
        device.destroy_device();
        return Err(VkCoreError::QueueUnavailable { queue_family_index });
    }

    Ok((device, queue))
}

fn resolve_global(loader: &dyn LoaderApi) -> Result<DispatchTable> {
    let mut dispatch = DispatchTable::new();
    dispatch.resolve_scope(Scope::Global, |name| loader.proc_addr(vk::Instance::null(), name))?;
    Ok(dispatch)
}

impl ExecutionContext {
    /// Create instance, select a device and create the logical device.
    pub fn bootstrap(loader: &dyn LoaderApi, config: &ContextConfig, sink: DiagnosticSink) -> Result<Self> {
        let mut dispatch = resolve_global(loader)?;

        let owned = ContextBootstrapper::new(loader, config).bootstrap(&mut dispatch, sink)?;

        let selection = choose_physical_device(
            owned.api(),
            &config.required_capabilities,
            &config.required_extensions,
        )?;
        let physical_device = selection.candidate.handle;
        let queue_family_index = selection.queue_family_index;

        let (device, queue) = create_logical_device(
            owned.api(),
            physical_device,
            queue_family_index,
            &config.required_capabilities,
            &config.required_extensions,
        )?;

        let owned = Rc::new(owned);
        let device = Rc::new(LogicalDevice::owned(device, Rc::clone(&owned)));
        let context = Self::assemble(
            Ownership::Owned(owned),
            device,
            queue,
            physical_device,
            queue_family_index,
            dispatch,
            config,
        );
        log::info!(
            "execution context ready on '{}' (queue family {})",
            context.device_name(),
            queue_family_index
        );
        Ok(context)
    }

    /// Wrap handles created by the host. Nothing adopted is ever destroyed.
    ///
    /// # Safety
    /// Every handle in `handles` must be valid, belong together, and outlive
    /// the returned context.
    pub unsafe fn adopt(loader: &dyn LoaderApi, handles: AdoptedHandles, config: &ContextConfig) -> Result<Self> {
        let mut dispatch = resolve_global(loader)?;
        dispatch.resolve_scope(Scope::Instance, |name| loader.proc_addr(handles.instance, name))?;

        check_adopted(
            &handles.features,
            &handles.extensions,
            &config.required_capabilities,
            &config.required_extensions,
        )?;

        if handles.queue == vk::Queue::null() {
            return Err(VkCoreError::QueueUnavailable {
                queue_family_index: handles.queue_family_index,
            });
        }

        let instance = loader.adopt_instance(handles.instance);
        let device = Rc::new(LogicalDevice::adopted(instance.adopt_device(handles.device)));

        let context = Self::assemble(
            Ownership::Adopted(instance),
            device,
            handles.queue,
            handles.physical_device,
            handles.queue_family_index,
            dispatch,
            config,
        );
        log::info!(
            "adopted execution context on '{}' (queue family {})",
            context.device_name(),
            handles.queue_family_index
        );
        Ok(context)
    }

    fn assemble(
        ownership: Ownership,
        device: Rc<LogicalDevice>,
        queue: vk::Queue,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
        dispatch: DispatchTable,
        config: &ContextConfig,
    ) -> Self {
        let instance = ownership.instance();
        let properties = instance.properties(physical_device);
        let memory_properties = instance.memory_properties(physical_device);

        Self {
            device,
            queue,
            queue_family_index,
            physical_device,
            properties,
            memory_properties,
            enabled_capabilities: config.required_capabilities.clone(),
            enabled_extensions: config.required_extensions.clone(),
            dispatch,
            fence_timeout_ms: config.fence_timeout_ms,
            ownership,
        }
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn device(&self) -> &Rc<LogicalDevice> {
        &self.device
    }

    pub fn instance(&self) -> &dyn InstanceApi {
        self.ownership.instance()
    }

    pub fn dispatch(&self) -> &DispatchTable {
        &self.dispatch
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    pub fn enabled_capabilities(&self) -> &[Capability] {
        &self.enabled_capabilities
    }

    pub fn enabled_extensions(&self) -> &[String] {
        &self.enabled_extensions
    }

    pub fn fence_timeout_ms(&self) -> u32 {
        self.fence_timeout_ms
    }

    pub fn is_owned(&self) -> bool {
        matches!(self.ownership, Ownership::Owned(_))
    }

    pub fn device_name(&self) -> String {
        let name = unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) };
        name.to_string_lossy().into_owned()
    }

    /// First memory type allowed by `type_bits` that has all of `flags`.
    pub fn memory_type_index(&self, type_bits: u32, flags: vk::MemoryPropertyFlags) -> Option<u32> {
        let count = self.memory_properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);
        (0..count).find(|&idx| {
            type_bits & (1 << idx) != 0
                && self.memory_properties.memory_types[idx as usize]
                    .property_flags
                    .contains(flags)
        })
    }

    /// Pool on this context's queue family.
    pub fn create_work_pool(&self) -> Result<WorkPool> {
        let mut pool = WorkPool::new(Rc::clone(&self.device));
        pool.initialize(self.queue_family_index)?;
        Ok(pool)
    }

    /// Initialized unit allocated from `pool`, submitting to this context's
    /// queue.
    pub fn create_unit_of_work(&self, pool: &WorkPool) -> Result<UnitOfWork> {
        let mut unit = UnitOfWork::new(pool, self.queue);
        unit.initialize()?;
        Ok(unit)
    }

    /// Release this context's hold on the device and instance. Pools and
    /// units still alive keep both until they are dropped.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("device_name", &self.device_name())
            .field("physical_device", &self.physical_device)
            .field("queue", &self.queue)
            .field("queue_family_index", &self.queue_family_index)
            .field("owned", &self.is_owned())
            .field("dispatch", &self.dispatch)
            .finish_non_exhaustive()
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        let outstanding = Rc::strong_count(&self.device) - 1;
        if outstanding > 0 {
            log::debug!("execution context dropped; {outstanding} other holder(s) keep the device alive");
        }
    }
}
