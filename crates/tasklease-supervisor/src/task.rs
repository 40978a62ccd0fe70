//! Named background threads with cooperative stop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crate::error::{SupervisorError, SupervisorResult};

/// A spawned thread that polls a stop flag.
///
/// Dropping the task requests a stop without waiting for the thread.
#[derive(Debug)]
pub struct BackgroundTask<T> {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> BackgroundTask<T> {
    /// Spawn `body` on a thread called `name`.
    ///
    /// `body` receives the stop flag and should return soon after it is set.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::TimerInit`] if the thread cannot be spawned.
    pub(crate) fn spawn<F>(name: &str, body: F) -> SupervisorResult<Self>
    where
        F: FnOnce(&AtomicBool) -> T + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(&thread_stop))
            .map_err(|e| SupervisorError::timer_init(format!("failed to spawn {name}: {e}")))?;
        Ok(Self {
            name: name.to_string(),
            stop,
            handle: Some(handle),
        })
    }

    /// Thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the thread to stop without waiting for it.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Whether the thread has returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the thread and wait for its result.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::TaskPanicked`] if the thread panicked.
    pub fn stop(self) -> SupervisorResult<T> {
        self.request_stop();
        self.join()
    }

    /// Wait for the thread to return on its own.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::TaskPanicked`] if the thread panicked.
    pub fn join(mut self) -> SupervisorResult<T> {
        let name = std::mem::take(&mut self.name);
        let handle = self
            .handle
            .take()
            .ok_or_else(|| SupervisorError::TaskPanicked(name.clone()))?;
        handle
            .join()
            .map_err(|_payload| SupervisorError::TaskPanicked(name))
    }
}

impl<T> Drop for BackgroundTask<T> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop.store(true, Ordering::Release);
        }
    }
}

pub(crate) fn stop_requested(stop: &AtomicBool) -> bool {
    stop.load(Ordering::Acquire)
}
