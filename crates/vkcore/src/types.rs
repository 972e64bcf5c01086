//! Configuration for context bootstrap and submission.

use ash::vk;
use std::ffi::CString;

use crate::capability::Capability;
use crate::error::{Result, VkCoreError};

pub const KHRONOS_VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";
pub const DEBUG_UTILS_EXTENSION: &str = "VK_EXT_debug_utils";

/// Configuration for an execution context
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Application name reported to the driver
    pub app_name: String,
    /// Vulkan API version requested at instance creation
    pub api_version: u32,
    /// Device features that must be present and are the only ones enabled
    pub required_capabilities: Vec<Capability>,
    /// Device extensions that must be present, enabled verbatim
    pub required_extensions: Vec<String>,
    /// Enable validation layers and the diagnostic callback
    pub enable_validation: bool,
    /// Layers that must be available when validation is on
    pub validation_layers: Vec<String>,
    /// Instance extension carrying validation messages
    pub diagnostic_extension: String,
    /// Default bound on a submission wait (milliseconds)
    pub fence_timeout_ms: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            app_name: "rayos-vkcore".to_string(),
            api_version: vk::API_VERSION_1_0,
            required_capabilities: Vec::new(),
            required_extensions: Vec::new(),
            enable_validation: cfg!(debug_assertions),
            validation_layers: vec![KHRONOS_VALIDATION_LAYER.to_string()],
            diagnostic_extension: DEBUG_UTILS_EXTENSION.to_string(),
            fence_timeout_ms: 1000,
        }
    }
}

impl ContextConfig {
    /// Defaults overlaid with `VKCORE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay settings read through `lookup`.
    ///
    /// Recognised keys: `VKCORE_VALIDATION`, `VKCORE_FENCE_TIMEOUT_MS`,
    /// `VKCORE_REQUIRED_FEATURES`, `VKCORE_REQUIRED_EXTENSIONS` and
    /// `VKCORE_VALIDATION_LAYERS`. Lists are comma separated.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("VKCORE_VALIDATION") {
            self.enable_validation = parse_switch("VKCORE_VALIDATION", &value)?;
        }

        if let Some(value) = lookup("VKCORE_FENCE_TIMEOUT_MS") {
            self.fence_timeout_ms = value.trim().parse().map_err(|err| VkCoreError::InvalidConfig {
                key: "VKCORE_FENCE_TIMEOUT_MS".to_string(),
                reason: format!("{err}"),
            })?;
        }

        if let Some(value) = lookup("VKCORE_REQUIRED_FEATURES") {
            self.required_capabilities = split_list(&value)
                .map(|name| {
                    name.parse::<Capability>().map_err(|_| VkCoreError::InvalidConfig {
                        key: "VKCORE_REQUIRED_FEATURES".to_string(),
                        reason: format!("unknown capability name '{name}'"),
                    })
                })
                .collect::<Result<_>>()?;
        }

        if let Some(value) = lookup("VKCORE_REQUIRED_EXTENSIONS") {
            self.required_extensions = split_list(&value).map(str::to_string).collect();
        }

        if let Some(value) = lookup("VKCORE_VALIDATION_LAYERS") {
            self.validation_layers = split_list(&value).map(str::to_string).collect();
        }

        Ok(self)
    }
}

fn parse_switch(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" | "" => Ok(false),
        other => Err(VkCoreError::InvalidConfig {
            key: key.to_string(),
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

/// Names converted for the driver; an interior NUL is a configuration error.
pub(crate) fn c_strings(key: &str, names: &[String]) -> Result<Vec<CString>> {
    names
        .iter()
        .map(|name| {
            CString::new(name.as_str()).map_err(|_| VkCoreError::InvalidConfig {
                key: key.to_string(),
                reason: format!("'{}' contains a NUL byte", name.escape_debug()),
            })
        })
        .collect()
}
