//! Async entry points for a transport layer (HTTP handlers, IPC).
//!
//! Each call moves the blocking pipeline onto tokio's blocking pool so a
//! slow OCR or LLM request never stalls the async runtime.

pub mod prescription;

use crate::config;

/// Name and version, for liveness probes.
pub fn health_check() -> String {
    format!("{} v{} is running", config::APP_NAME, config::APP_VERSION)
}
