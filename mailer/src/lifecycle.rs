//! Process-wide setup and teardown.
//!
//! Blocking sends run on a tokio runtime owned by the library. The host
//! application brackets all use of [`Client::send`](crate::Client::send) with
//! [`initialize`] and [`terminate`].

use std::future::Future;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::{Builder, Handle, Runtime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("mailer is already initialized")]
    AlreadyInitialized,

    #[error("mailer is not initialized")]
    NotInitialized,

    #[error("failed to start the mailer runtime: {0}")]
    Runtime(std::io::ErrorKind),
}

/// Owner of the runtime that drives blocking sends.
pub(crate) struct Lifecycle {
    runtime: Mutex<Option<Runtime>>,
}

impl Lifecycle {
    pub(crate) const fn new() -> Self {
        Self {
            runtime: Mutex::new(None),
        }
    }

    pub(crate) fn initialize(&self) -> Result<(), LifecycleError> {
        let mut runtime = self.runtime.lock();
        if runtime.is_some() {
            return Err(LifecycleError::AlreadyInitialized);
        }

        *runtime = Some(
            Builder::new_multi_thread()
                .thread_name("mailer")
                .enable_all()
                .build()
                .map_err(|e| LifecycleError::Runtime(e.kind()))?,
        );
        tracing::debug!("Mailer runtime started");

        Ok(())
    }

    pub(crate) fn terminate(&self) -> Result<(), LifecycleError> {
        let runtime = self
            .runtime
            .lock()
            .take()
            .ok_or(LifecycleError::NotInitialized)?;

        // Dropping a runtime blocks, which is not allowed from async context.
        runtime.shutdown_background();
        tracing::debug!("Mailer runtime stopped");

        Ok(())
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.runtime.lock().is_some()
    }

    /// A handle to the runtime, if one is running.
    pub(crate) fn handle(&self) -> Option<Handle> {
        self.runtime.lock().as_ref().map(|rt| rt.handle().clone())
    }

    /// Runs `future` to completion on the runtime, blocking the caller.
    ///
    /// # Panics
    ///
    /// Panics if the runtime is not running, or if called from within an
    /// async context.
    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        let Some(handle) = self.handle() else {
            panic!("mailer::initialize() must be called before sending");
        };
        handle.block_on(future)
    }
}

static LIFECYCLE: Lifecycle = Lifecycle::new();

pub(crate) fn global() -> &'static Lifecycle {
    &LIFECYCLE
}

/// Starts the runtime used by blocking sends.
///
/// Call once at start-up, before the first [`Client::send`](crate::Client::send).
///
/// # Errors
///
/// [`LifecycleError::AlreadyInitialized`] if called twice without an
/// intervening [`terminate`], or [`LifecycleError::Runtime`] if the runtime
/// could not be started.
pub fn initialize() -> Result<(), LifecycleError> {
    LIFECYCLE.initialize()
}

/// Shuts the runtime down. Sends still in flight are abandoned.
///
/// # Errors
///
/// [`LifecycleError::NotInitialized`] if [`initialize`] has not been called.
pub fn terminate() -> Result<(), LifecycleError> {
    LIFECYCLE.terminate()
}

pub fn is_initialized() -> bool {
    LIFECYCLE.is_initialized()
}
