//! A [`DebugSink`] that forwards to the ambient `tracing` subscriber.

use crate::traits::{DebugLevel, DebugSink};

/// Bridges session diagnostics into `tracing`, under the `val_transport`
/// target. Embedders who already run a `tracing` subscriber can pass this
/// in as a session's [`DebugSink`] without writing their own.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDebugSink;

impl DebugSink for TracingDebugSink {
    fn log(&self, level: DebugLevel, message: &str) {
        match level {
            DebugLevel::Trace => tracing::trace!(target: "val_transport::session", "{message}"),
            DebugLevel::Debug => tracing::debug!(target: "val_transport::session", "{message}"),
            DebugLevel::Warn => tracing::warn!(target: "val_transport::session", "{message}"),
            DebugLevel::Error => tracing::error!(target: "val_transport::session", "{message}"),
        }
    }
}
