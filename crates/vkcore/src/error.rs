//! Error taxonomy for context bootstrap and command submission.
//!
//! Every variant names the operation that failed. Nothing in this crate
//! retries on its own; the only recoverable case is [`VkCoreError::SubmissionTimeout`],
//! after which the caller may wait again with [`crate::UnitOfWork::wait_pending`].

use ash::vk;

use crate::capability::Capability;
use crate::command::UnitState;

pub type Result<T> = std::result::Result<T, VkCoreError>;

/// Coarse classification of a [`VkCoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required entry point could not be resolved.
    Resolution,
    /// A layer, capability or extension is unsupported.
    Negotiation,
    /// An underlying creation or driver call failed.
    Creation,
    /// The unit-of-work state machine was misused.
    State,
    /// Submit, wait or reset failed (including timeout).
    Submission,
    /// A configuration value could not be parsed.
    Configuration,
}

#[derive(Debug, thiserror::Error)]
pub enum VkCoreError {
    #[error("unable to resolve required entry points: {}", .names.join(", "))]
    MissingEntryPoints { names: Vec<String> },

    #[error("vulkan loader unavailable: {reason}")]
    LoaderUnavailable { reason: String },

    #[error("missing validation layers: {}", .layers.join(", "))]
    MissingLayer { layers: Vec<String> },

    #[error("no validation layer exposes {extension}")]
    MissingDiagnosticExtension { extension: String },

    #[error("accelerator does not support required capabilities: {}", join_display(.missing))]
    UnsupportedCapability { missing: Vec<Capability> },

    #[error("accelerator does not support required extensions: {}", .missing.join(", "))]
    UnsupportedExtension { missing: Vec<String> },

    #[error("no physical device satisfies the required capabilities, extensions and queue family")]
    NoSuitableDevice,

    #[error("{call} failed: {result}")]
    EnumerationFailed { call: &'static str, result: vk::Result },

    #[error("vkCreateInstance failed: {result}")]
    ContextCreationFailed { result: vk::Result },

    #[error("{call} failed: {result}")]
    CallbackInstallFailed { call: &'static str, result: vk::Result },

    #[error("vkCreateDevice failed: {result}")]
    DeviceCreationFailed { result: vk::Result },

    #[error("vkGetDeviceQueue returned a null queue for family {queue_family_index}")]
    QueueUnavailable { queue_family_index: u32 },

    #[error("vkCreateCommandPool failed: {result}")]
    PoolCreationFailed { result: vk::Result },

    #[error("vkAllocateCommandBuffers failed: {result}")]
    AllocationFailed { result: vk::Result },

    #[error("vkCreateFence failed: {result}")]
    SignalCreationFailed { result: vk::Result },

    #[error("vkBeginCommandBuffer failed: {result}")]
    BeginFailed { result: vk::Result },

    #[error("vkEndCommandBuffer failed: {result}")]
    FinalizationFailed { result: vk::Result },

    #[error("cannot begin recording from {state:?} state")]
    InvalidStateForBegin { state: UnitState },

    #[error("cannot end recording from {state:?} state")]
    InvalidStateForEnd { state: UnitState },

    #[error("cannot submit from {state:?} state")]
    InvalidStateForSubmit { state: UnitState },

    #[error("previous submission is still in flight; wait for it before resubmitting")]
    SubmissionPending,

    #[error("{what} used before initialize")]
    NotInitialized { what: &'static str },

    #[error("vkWaitForFences timed out after {timeout_ms} ms")]
    SubmissionTimeout { timeout_ms: u32 },

    #[error("{call} failed: {result}")]
    SubmissionFailed { call: &'static str, result: vk::Result },

    #[error("invalid value for {key}: {reason}")]
    InvalidConfig { key: String, reason: String },
}

impl VkCoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingEntryPoints { .. } | Self::LoaderUnavailable { .. } => ErrorKind::Resolution,
            Self::MissingLayer { .. }
            | Self::MissingDiagnosticExtension { .. }
            | Self::UnsupportedCapability { .. }
            | Self::UnsupportedExtension { .. }
            | Self::NoSuitableDevice => ErrorKind::Negotiation,
            Self::EnumerationFailed { .. }
            | Self::ContextCreationFailed { .. }
            | Self::CallbackInstallFailed { .. }
            | Self::DeviceCreationFailed { .. }
            | Self::QueueUnavailable { .. }
            | Self::PoolCreationFailed { .. }
            | Self::AllocationFailed { .. }
            | Self::SignalCreationFailed { .. }
            | Self::BeginFailed { .. }
            | Self::FinalizationFailed { .. } => ErrorKind::Creation,
            Self::InvalidStateForBegin { .. }
            | Self::InvalidStateForEnd { .. }
            | Self::InvalidStateForSubmit { .. }
            | Self::SubmissionPending
            | Self::NotInitialized { .. } => ErrorKind::State,
            Self::SubmissionTimeout { .. } | Self::SubmissionFailed { .. } => ErrorKind::Submission,
            Self::InvalidConfig { .. } => ErrorKind::Configuration,
        }
    }

    /// True only for the wait-expired case, which the caller may retry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::SubmissionTimeout { .. })
    }
}

fn join_display<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
