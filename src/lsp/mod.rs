//! LSP protocol surface.
//!
//! This module provides:
//! - The server capabilities advertised on `initialize`
//! - A debounced, per-document diagnostics publisher

mod capabilities;
mod diagnostics;

pub use capabilities::{server_capabilities, COMPLETION_TRIGGERS};
pub use diagnostics::{DiagnosticsScheduler, DiagnosticsSink, DEFAULT_DELAY};
