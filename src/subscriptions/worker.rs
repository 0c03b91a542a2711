//! Worker handles: what a subscription runs for each delivered event.
//!
//! The relay core only stores and passes these around. Queue adapters read the
//! worker's [`name`](Worker::name) to namespace destinations; worker pools
//! (outside this crate) execute them.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::types::Envelope;

/// Error returned by a worker's job body.
#[derive(Debug, Error)]
#[error("job failed: {0}")]
pub struct JobError(pub String);

/// An opaque worker definition.
pub trait Worker: Send + Sync + 'static {
    /// Stable worker name, e.g. `"ComExampleAdminWorker"`.
    fn name(&self) -> &str;

    /// Queue this worker consumes by default, if it declares one.
    fn queue(&self) -> Option<&str> {
        None
    }
}

/// Shared worker handle.
pub type WorkerRef = Arc<dyn Worker>;

/// Derives a worker name from a channel.
///
/// The channel is split on non-word characters; each segment is lowercased and
/// capitalized, and `Worker` is appended:
/// `"com.example.admin"` → `"ComExampleAdminWorker"`.
pub fn worker_name(channel: &str) -> String {
    let mut name: String = channel
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let lower = segment.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();
    name.push_str("Worker");
    name
}

/// A worker known only by name (and optionally its queue).
///
/// For worker types defined elsewhere, e.g. by a job framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedWorker {
    name: String,
    queue: Option<String>,
}

impl NamedWorker {
    pub fn new(name: impl Into<String>) -> Self {
        NamedWorker {
            name: name.into(),
            queue: None,
        }
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn arc(name: impl Into<String>) -> WorkerRef {
        Arc::new(Self::new(name))
    }
}

impl Worker for NamedWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn queue(&self) -> Option<&str> {
        self.queue.as_deref()
    }
}

/// Function-backed worker built from a channel and a callable.
///
/// Its name is derived from the channel with [`worker_name`].
pub struct WorkerFn<F> {
    name: String,
    queue: Option<String>,
    f: F,
}

impl<F> WorkerFn<F>
where
    F: Fn(&Envelope) -> Result<(), JobError> + Send + Sync + 'static,
{
    pub fn new(channel: &str, f: F) -> Self {
        WorkerFn {
            name: worker_name(channel),
            queue: None,
            f,
        }
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Runs the job body for one event.
    pub fn perform(&self, envelope: &Envelope) -> Result<(), JobError> {
        (self.f)(envelope)
    }
}

impl<F> Worker for WorkerFn<F>
where
    F: Fn(&Envelope) -> Result<(), JobError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn queue(&self) -> Option<&str> {
        self.queue.as_deref()
    }
}

impl<F> fmt::Debug for WorkerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerFn")
            .field("name", &self.name)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
