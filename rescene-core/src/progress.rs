//! Progress reporting for long-running operations.

/// A progress snapshot handed to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub current: u64,
    pub total: u64,
    pub message: String,
}

impl Progress {
    pub fn new(current: u64, total: u64, message: impl Into<String>) -> Self {
        Self {
            current,
            total,
            message: message.into(),
        }
    }
}

/// Host-injected progress channel.
///
/// Sinks are invoked synchronously on the operation's thread and must not
/// block or panic.
pub trait ProgressSink {
    fn report(&self, progress: &Progress);
}

/// Sink that discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&self, _progress: &Progress) {}
}
