//! Self-bootstrap of the Vulkan instance.
//!
//! Only used when the host does not hand over its own handles. Each step is
//! independently fallible; anything created before a failure is released
//! before the error is returned.

use ash::vk;

use crate::diagnostics::DiagnosticSink;
use crate::dispatch::{DispatchTable, Scope, CREATE_DEBUG_MESSENGER, DESTROY_DEBUG_MESSENGER};
use crate::driver::{InstanceApi, InstanceRequest, LoaderApi};
use crate::error::{Result, VkCoreError};
use crate::types::{c_strings, ContextConfig};

/// Instance created by this crate, with its optional debug messenger.
///
/// Dropping it destroys the messenger, then the instance.
pub struct OwnedInstance {
    api: Box<dyn InstanceApi>,
    messenger: Option<vk::DebugUtilsMessengerEXT>,
    // Callback user data; must outlive `messenger`.
    sink: Option<Box<DiagnosticSink>>,
}

impl OwnedInstance {
    pub fn new(api: Box<dyn InstanceApi>) -> Self {
        Self {
            api,
            messenger: None,
            sink: None,
        }
    }

    pub fn api(&self) -> &dyn InstanceApi {
        self.api.as_ref()
    }

    pub fn has_messenger(&self) -> bool {
        self.messenger.is_some()
    }
}

impl Drop for OwnedInstance {
    fn drop(&mut self) {
        if let Some(messenger) = self.messenger.take() {
            self.api.destroy_debug_messenger(messenger);
        }
        self.api.destroy_instance();
        self.sink = None;
        log::info!("vulkan instance destroyed");
    }
}

pub struct ContextBootstrapper<'a> {
    loader: &'a dyn LoaderApi,
    config: &'a ContextConfig,
}

impl<'a> ContextBootstrapper<'a> {
    pub fn new(loader: &'a dyn LoaderApi, config: &'a ContextConfig) -> Self {
        Self { loader, config }
    }

    /// Every configured validation layer must be available.
    pub fn verify_layers(&self) -> Result<()> {
        let available = self
            .loader
            .instance_layers()
            .map_err(|result| VkCoreError::EnumerationFailed {
                call: "vkEnumerateInstanceLayerProperties",
                result,
            })?;

        let missing: Vec<String> = self
            .config
            .validation_layers
            .iter()
            .filter(|layer| !available.contains(layer))
            .cloned()
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(VkCoreError::MissingLayer { layers: missing })
        }
    }

    /// At least one validation layer must expose the diagnostic extension.
    pub fn verify_diagnostic_extension(&self) -> Result<()> {
        let wanted = &self.config.diagnostic_extension;
        let layers = c_strings("validation_layers", &self.config.validation_layers)?;

        for layer in &layers {
            let extensions = self
                .loader
                .instance_extensions(Some(layer.as_c_str()))
                .map_err(|result| VkCoreError::EnumerationFailed {
                    call: "vkEnumerateInstanceExtensionProperties",
                    result,
                })?;
            if extensions.iter().any(|ext| ext == wanted) {
                log::debug!("{wanted} provided by {}", layer.to_string_lossy());
                return Ok(());
            }
        }

        Err(VkCoreError::MissingDiagnosticExtension {
            extension: wanted.clone(),
        })
    }

    pub fn create_instance(&self) -> Result<OwnedInstance> {
        let (layers, extensions) = if self.config.enable_validation {
            (
                c_strings("validation_layers", &self.config.validation_layers)?,
                c_strings(
                    "diagnostic_extension",
                    std::slice::from_ref(&self.config.diagnostic_extension),
                )?,
            )
        } else {
            (Vec::new(), Vec::new())
        };

        let app_name = c_strings("app_name", std::slice::from_ref(&self.config.app_name))?
            .into_iter()
            .next()
            .unwrap_or_default();

        let request = InstanceRequest {
            app_name,
            api_version: self.config.api_version,
            layers,
            extensions,
        };

        let api = self
            .loader
            .create_instance(&request)
            .map_err(|result| VkCoreError::ContextCreationFailed { result })?;
        log::info!(
            "vulkan instance created ({} layer(s), validation {})",
            request.layers.len(),
            if self.config.enable_validation { "on" } else { "off" }
        );
        Ok(OwnedInstance::new(api))
    }

    /// Register `sink` with a debug messenger on `instance`.
    pub fn install_callback(
        instance: &mut OwnedInstance,
        dispatch: &DispatchTable,
        sink: DiagnosticSink,
    ) -> Result<()> {
        dispatch.require(&[CREATE_DEBUG_MESSENGER, DESTROY_DEBUG_MESSENGER])?;

        let sink = Box::new(sink);
        // The boxed sink keeps its address when moved into `instance` below.
        let messenger = unsafe { instance.api.create_debug_messenger(&sink) }.map_err(|result| {
            VkCoreError::CallbackInstallFailed {
                call: "vkCreateDebugUtilsMessengerEXT",
                result,
            }
        })?;

        instance.messenger = Some(messenger);
        instance.sink = Some(sink);
        log::debug!("validation callback installed");
        Ok(())
    }

    /// Run every step and resolve the instance-scope entry points.
    ///
    /// `dispatch` must already hold the global-scope entry points.
    pub fn bootstrap(&self, dispatch: &mut DispatchTable, sink: DiagnosticSink) -> Result<OwnedInstance> {
        if self.config.enable_validation {
            self.verify_layers()?;
            self.verify_diagnostic_extension()?;
        }

        let mut instance = self.create_instance()?;

        let handle = instance.api().handle();
        dispatch.resolve_scope(Scope::Instance, |name| self.loader.proc_addr(handle, name))?;

        if self.config.enable_validation {
            Self::install_callback(&mut instance, dispatch, sink)?;
        }

        Ok(instance)
    }
}
