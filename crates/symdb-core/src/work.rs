//! # Background Work
//!
//! Where the kernel bootstrap runs when it is started asynchronously.
//!
//! The database hands a single boxed job to a [`WorkQueue`] and then waits a
//! bounded time for the job to report that it has started. Hosts that already
//! own a thread pool implement the trait over it; the crate ships a
//! thread-per-job queue and, with the `tokio` feature, a queue over tokio's
//! blocking pool.

use std::thread;

use crate::error::{SymbolError, SymbolResult};

/// Unit of background work
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs off the calling thread
pub trait WorkQueue: Send + Sync
{
    /// Schedule `job`. Failing to schedule is reported immediately.
    fn submit(&self, job: Job) -> SymbolResult<()>;
}

/// Runs every job on a fresh named thread
#[derive(Debug, Clone, Default)]
pub struct ThreadWorkQueue
{
    name: Option<String>,
}

impl ThreadWorkQueue
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Use `name` for the worker threads.
    pub fn with_name(name: impl Into<String>) -> Self
    {
        Self { name: Some(name.into()) }
    }
}

impl WorkQueue for ThreadWorkQueue
{
    fn submit(&self, job: Job) -> SymbolResult<()>
    {
        let name = self.name.clone().unwrap_or_else(|| "symdb-worker".to_string());
        thread::Builder::new()
            .name(name)
            .spawn(job)
            .map(drop)
            .map_err(|e| SymbolError::Bootstrap(format!("Failed to spawn worker thread: {e}")))
    }
}

#[cfg(feature = "tokio")]
pub use self::tokio_queue::TokioWorkQueue;

#[cfg(feature = "tokio")]
mod tokio_queue
{
    use super::{Job, WorkQueue};
    use crate::error::SymbolResult;

    /// Runs jobs on a tokio runtime's blocking pool
    #[derive(Debug, Clone)]
    pub struct TokioWorkQueue
    {
        handle: tokio::runtime::Handle,
    }

    impl TokioWorkQueue
    {
        pub fn new(handle: tokio::runtime::Handle) -> Self
        {
            Self { handle }
        }

        /// Queue on the runtime the caller is running inside.
        ///
        /// Panics outside a tokio runtime, like [`tokio::runtime::Handle::current`].
        pub fn current() -> Self
        {
            Self::new(tokio::runtime::Handle::current())
        }
    }

    impl WorkQueue for TokioWorkQueue
    {
        fn submit(&self, job: Job) -> SymbolResult<()>
        {
            // The join handle is dropped; the job still runs to completion.
            drop(self.handle.spawn_blocking(job));
            Ok(())
        }
    }
}
