//! RayOS Vulkan execution core
//!
//! Bootstraps (or adopts) a Vulkan execution context with one work queue and
//! provides the reusable unit of work used to record, submit and wait on
//! GPU commands.
//!
//! ```no_run
//! use rayos_vkcore::{AshLoader, Capability, ExecutionContextBuilder};
//!
//! # fn main() -> rayos_vkcore::Result<()> {
//! let loader = AshLoader::load()?;
//! let context = ExecutionContextBuilder::new()
//!     .with_capability(Capability::ShaderInt64)
//!     .build(&loader)?;
//!
//! let pool = context.create_work_pool()?;
//! let mut unit = context.create_unit_of_work(&pool)?;
//! unit.begin_if_not_in_recording()?;
//! // record commands into unit.command_buffer() ...
//! unit.end()?;
//! unit.submit_and_reset(context.fence_timeout_ms())?;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod capability;
pub mod command;
pub mod context;
pub mod diagnostics;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod selector;
pub mod types;

pub use capability::{all_required_supported, Capability};
pub use command::{UnitOfWork, UnitState, WorkPool};
pub use context::{AdoptedHandles, ExecutionContext, LogicalDevice, Ownership};
pub use diagnostics::{Diagnostic, DiagnosticSink, Severity};
pub use dispatch::DispatchTable;
pub use driver::{AshLoader, DeviceApi, InstanceApi, LoaderApi};
pub use error::{ErrorKind, Result, VkCoreError};
pub use types::ContextConfig;

/// Builder for ExecutionContext with custom configuration
pub struct ExecutionContextBuilder {
    config: ContextConfig,
    sink: Option<DiagnosticSink>,
}

impl ExecutionContextBuilder {
    pub fn new() -> Self {
        Self::from_config(ContextConfig::default())
    }

    pub fn from_config(config: ContextConfig) -> Self {
        Self { config, sink: None }
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.config.app_name = name.into();
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.config.required_capabilities.push(capability);
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.config.required_extensions.push(extension.into());
        self
    }

    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.config.enable_validation = enabled;
        self
    }

    pub fn with_fence_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.config.fence_timeout_ms = timeout_ms;
        self
    }

    /// Route validation messages to `handler` instead of the `log` crate.
    pub fn with_diagnostic_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&Diagnostic<'_>) + Send + 'static,
    {
        self.sink = Some(DiagnosticSink::new(Box::new(handler)));
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn build(self, loader: &dyn LoaderApi) -> Result<ExecutionContext> {
        let sink = self.sink.unwrap_or_default();
        ExecutionContext::bootstrap(loader, &self.config, sink)
    }

    /// # Safety
    /// See [`ExecutionContext::adopt`].
    pub unsafe fn adopt(self, loader: &dyn LoaderApi, handles: AdoptedHandles) -> Result<ExecutionContext> {
        ExecutionContext::adopt(loader, handles, &self.config)
    }
}

impl Default for ExecutionContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
