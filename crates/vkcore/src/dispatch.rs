//! Entry-point dispatch table.
//!
//! Every Vulkan function the engine calls is listed once in [`ENTRY_POINTS`].
//! Resolution walks the table against a host-supplied resolver and reports
//! every missing required name in a single error.

use ash::vk;
use std::collections::BTreeMap;
use std::ffi::CStr;

use crate::error::{Result, VkCoreError};

/// Which handle an entry point is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Resolved with a null instance, before any instance exists.
    Global,
    /// Resolved with the live instance handle.
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Optional,
}

#[derive(Debug, Clone, Copy)]
pub struct EntryPoint {
    pub name: &'static CStr,
    pub scope: Scope,
    pub requirement: Requirement,
}

const fn global(name: &'static CStr) -> EntryPoint {
    EntryPoint { name, scope: Scope::Global, requirement: Requirement::Required }
}

const fn required(name: &'static CStr) -> EntryPoint {
    EntryPoint { name, scope: Scope::Instance, requirement: Requirement::Required }
}

const fn optional(name: &'static CStr) -> EntryPoint {
    EntryPoint { name, scope: Scope::Instance, requirement: Requirement::Optional }
}

pub const CREATE_DEBUG_MESSENGER: &CStr = c"vkCreateDebugUtilsMessengerEXT";
pub const DESTROY_DEBUG_MESSENGER: &CStr = c"vkDestroyDebugUtilsMessengerEXT";

pub static ENTRY_POINTS: &[EntryPoint] = &[
    global(c"vkCreateInstance"),
    global(c"vkEnumerateInstanceExtensionProperties"),
    global(c"vkEnumerateInstanceLayerProperties"),
    // Instance and physical device
    required(c"vkDestroyInstance"),
    required(c"vkEnumeratePhysicalDevices"),
    required(c"vkGetPhysicalDeviceFeatures"),
    required(c"vkGetPhysicalDeviceProperties"),
    required(c"vkGetPhysicalDeviceMemoryProperties"),
    required(c"vkGetPhysicalDeviceQueueFamilyProperties"),
    required(c"vkEnumerateDeviceExtensionProperties"),
    required(c"vkGetDeviceProcAddr"),
    required(c"vkCreateDevice"),
    required(c"vkDestroyDevice"),
    required(c"vkGetDeviceQueue"),
    required(c"vkDeviceWaitIdle"),
    // Command pools, buffers and fences
    required(c"vkCreateCommandPool"),
    required(c"vkDestroyCommandPool"),
    required(c"vkAllocateCommandBuffers"),
    required(c"vkFreeCommandBuffers"),
    required(c"vkBeginCommandBuffer"),
    required(c"vkEndCommandBuffer"),
    required(c"vkResetCommandBuffer"),
    required(c"vkCreateFence"),
    required(c"vkDestroyFence"),
    required(c"vkResetFences"),
    required(c"vkWaitForFences"),
    required(c"vkQueueSubmit"),
    // Used by resource and pipeline collaborators
    required(c"vkAllocateMemory"),
    required(c"vkFreeMemory"),
    required(c"vkMapMemory"),
    required(c"vkUnmapMemory"),
    required(c"vkCreateBuffer"),
    required(c"vkDestroyBuffer"),
    required(c"vkBindBufferMemory"),
    required(c"vkGetBufferMemoryRequirements"),
    required(c"vkCreateImage"),
    required(c"vkDestroyImage"),
    required(c"vkBindImageMemory"),
    required(c"vkGetImageMemoryRequirements"),
    required(c"vkCreateImageView"),
    required(c"vkDestroyImageView"),
    required(c"vkCreateShaderModule"),
    required(c"vkDestroyShaderModule"),
    required(c"vkCreateDescriptorSetLayout"),
    required(c"vkDestroyDescriptorSetLayout"),
    required(c"vkCreateDescriptorPool"),
    required(c"vkDestroyDescriptorPool"),
    required(c"vkAllocateDescriptorSets"),
    required(c"vkUpdateDescriptorSets"),
    required(c"vkCreatePipelineLayout"),
    required(c"vkDestroyPipelineLayout"),
    required(c"vkCreateComputePipelines"),
    required(c"vkCreateGraphicsPipelines"),
    required(c"vkDestroyPipeline"),
    required(c"vkCreateRenderPass"),
    required(c"vkDestroyRenderPass"),
    required(c"vkCreateFramebuffer"),
    required(c"vkDestroyFramebuffer"),
    required(c"vkCmdBindPipeline"),
    required(c"vkCmdBindDescriptorSets"),
    required(c"vkCmdBindVertexBuffers"),
    required(c"vkCmdDispatch"),
    required(c"vkCmdDraw"),
    required(c"vkCmdBeginRenderPass"),
    required(c"vkCmdEndRenderPass"),
    required(c"vkCmdCopyBuffer"),
    required(c"vkCmdCopyBufferToImage"),
    required(c"vkCmdCopyImageToBuffer"),
    required(c"vkCmdPipelineBarrier"),
    required(c"vkCmdPushConstants"),
    // Validation callback; mandatory only when validation is enabled.
    optional(CREATE_DEBUG_MESSENGER),
    optional(DESTROY_DEBUG_MESSENGER),
];

/// Resolved entry points, keyed by name.
///
/// Populated once during context creation and read-only afterwards.
#[derive(Default, Clone)]
pub struct DispatchTable {
    resolved: BTreeMap<&'static CStr, unsafe extern "system" fn()>,
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("resolved", &self.resolved.len())
            .finish()
    }
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every entry point of `scope` through `resolve`.
    ///
    /// Optional names that fail to resolve are skipped. If any required name
    /// fails, nothing is recorded and all missing names are returned.
    pub fn resolve_scope<F>(&mut self, scope: Scope, mut resolve: F) -> Result<()>
    where
        F: FnMut(&CStr) -> vk::PFN_vkVoidFunction,
    {
        let mut found = Vec::new();
        let mut missing = Vec::new();

        for entry in ENTRY_POINTS.iter().filter(|entry| entry.scope == scope) {
            match resolve(entry.name) {
                Some(func) => found.push((entry.name, func)),
                None if entry.requirement == Requirement::Required => {
                    missing.push(entry.name.to_string_lossy().into_owned());
                }
                None => {
                    log::debug!("optional entry point {:?} not available", entry.name);
                }
            }
        }

        if !missing.is_empty() {
            return Err(VkCoreError::MissingEntryPoints { names: missing });
        }

        self.resolved.extend(found);
        Ok(())
    }

    pub fn get(&self, name: &CStr) -> vk::PFN_vkVoidFunction {
        self.resolved.get(name).copied()
    }

    pub fn contains(&self, name: &CStr) -> bool {
        self.resolved.contains_key(name)
    }

    /// Fail with every name in `names` that did not resolve.
    pub fn require(&self, names: &[&CStr]) -> Result<()> {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| !self.contains(name))
            .map(|name| name.to_string_lossy().into_owned())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(VkCoreError::MissingEntryPoints { names: missing })
        }
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}
