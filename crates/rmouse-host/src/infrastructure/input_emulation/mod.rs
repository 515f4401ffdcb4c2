//! Platform input sinks.
//!
//! Exactly one sink is built at startup by [`platform_sink`] and shared by
//! every session.  The native sink is selected at compile time via
//! `#[cfg(target_os = ...)]`; `--dry-run` swaps in the logging sink.

use std::sync::Arc;

use tracing::info;

use crate::application::translate_input::{EmulationError, InputSink};

pub mod headless;
pub mod mock;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(all(target_os = "linux", feature = "xtest"))]
pub mod linux;

#[cfg(target_os = "macos")]
pub mod macos;

pub use headless::TracingInputSink;
pub use mock::{RecordingInputSink, SinkEvent};

/// Builds the input sink for this process.
///
/// # Errors
///
/// Returns [`EmulationError::Unavailable`] when the native sink cannot be
/// opened (no X display, missing Accessibility permission), or when this
/// build has no native sink at all.
pub fn platform_sink(dry_run: bool) -> Result<Arc<dyn InputSink>, EmulationError> {
    if dry_run {
        info!("dry run: input actions are logged, not injected");
        return Ok(Arc::new(TracingInputSink::new()));
    }
    native_sink()
}

#[cfg(target_os = "windows")]
fn native_sink() -> Result<Arc<dyn InputSink>, EmulationError> {
    info!("using SendInput sink");
    Ok(Arc::new(windows::WindowsInputSink::new()))
}

#[cfg(target_os = "macos")]
fn native_sink() -> Result<Arc<dyn InputSink>, EmulationError> {
    info!("using CoreGraphics sink");
    Ok(Arc::new(macos::MacosInputSink::new()?))
}

#[cfg(all(target_os = "linux", feature = "xtest"))]
fn native_sink() -> Result<Arc<dyn InputSink>, EmulationError> {
    info!("using XTest sink");
    Ok(Arc::new(linux::XTestInputSink::open()?))
}

#[cfg(not(any(
    target_os = "windows",
    target_os = "macos",
    all(target_os = "linux", feature = "xtest")
)))]
fn native_sink() -> Result<Arc<dyn InputSink>, EmulationError> {
    Err(EmulationError::Unavailable(
        "this build has no native input sink (enable the `xtest` feature on Linux) \
         and --dry-run was not given"
            .to_string(),
    ))
}
