//! Validation diagnostics channel.
//!
//! The bootstrapper installs a debug messenger whose callback classifies each
//! message and hands it to a [`DiagnosticSink`]. The sink owns the injected
//! handler; by default messages go to the `log` crate.

use ash::vk;
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::ffi::{c_void, CStr};
use std::panic::{self, AssertUnwindSafe};

/// Classification of a validation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Unknown,
}

impl Severity {
    pub fn classify(flags: vk::DebugUtilsMessageSeverityFlagsEXT) -> Self {
        if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            Severity::Error
        } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            Severity::Warning
        } else {
            Severity::Unknown
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Error => "[ERROR]",
            Severity::Warning => "[WARNING]",
            Severity::Unknown => "[UNKNOWN]",
        }
    }
}

/// One message reported by a validation layer.
#[derive(Debug, Clone, Copy)]
pub struct Diagnostic<'a> {
    pub severity: Severity,
    /// Message id name reported by the layer, if any.
    pub source: &'a str,
    pub message: &'a str,
}

pub type DiagnosticHandler = Box<dyn FnMut(&Diagnostic<'_>) + Send>;

/// Holder of the injected handler.
///
/// Its address is handed to the driver as callback user data, so it must stay
/// boxed and outlive the messenger it was registered with.
///
/// A panic in the handler is caught and logged. Messages raised while the
/// handler is running on the same thread (a handler that calls back into the
/// driver) go to [`log_diagnostic`] instead.
pub struct DiagnosticSink {
    handler: ReentrantMutex<RefCell<DiagnosticHandler>>,
}

impl DiagnosticSink {
    pub fn new(handler: DiagnosticHandler) -> Self {
        Self {
            handler: ReentrantMutex::new(RefCell::new(handler)),
        }
    }

    /// Sink that forwards to the `log` crate.
    pub fn logging() -> Self {
        Self::new(Box::new(log_diagnostic))
    }

    pub fn emit(&self, diagnostic: &Diagnostic<'_>) {
        let guard = self.handler.lock();
        let Ok(mut handler) = guard.try_borrow_mut() else {
            log_diagnostic(diagnostic);
            return;
        };

        // Must not unwind into the driver's callback frame.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (&mut **handler)(diagnostic)));
        if outcome.is_err() {
            log::error!(
                "diagnostic handler panicked on {} message: {}",
                diagnostic.severity.label(),
                diagnostic.message
            );
        }
    }

    /// Severities the messenger subscribes to.
    pub fn severity_mask() -> vk::DebugUtilsMessageSeverityFlagsEXT {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
    }

    pub fn type_mask() -> vk::DebugUtilsMessageTypeFlagsEXT {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
    }
}

impl std::fmt::Debug for DiagnosticSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticSink").finish_non_exhaustive()
    }
}

impl Default for DiagnosticSink {
    fn default() -> Self {
        Self::logging()
    }
}

pub fn log_diagnostic(diagnostic: &Diagnostic<'_>) {
    let label = diagnostic.severity.label();
    match diagnostic.severity {
        Severity::Error => log::error!("{label} validation layer ({}): {}", diagnostic.source, diagnostic.message),
        Severity::Warning => log::warn!("{label} validation layer ({}): {}", diagnostic.source, diagnostic.message),
        Severity::Unknown => log::info!("{label} validation layer ({}): {}", diagnostic.source, diagnostic.message),
    }
}

/// Messenger callback registered with `VK_EXT_debug_utils`.
///
/// `user_data` must point at a live [`DiagnosticSink`].
pub(crate) unsafe extern "system" fn debug_utils_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    user_data: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || user_data.is_null() {
        return vk::FALSE;
    }

    let data = &*data;
    let sink = &*(user_data as *const DiagnosticSink);

    let source = lossy(data.p_message_id_name);
    let message = lossy(data.p_message);

    sink.emit(&Diagnostic {
        severity: Severity::classify(severity),
        source: &source,
        message: &message,
    });

    // Never abort the call that triggered the message.
    vk::FALSE
}

unsafe fn lossy(ptr: *const std::ffi::c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}
