//! Module for handling the background task that drains a stream's command queue.

use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use tokio::{task::JoinHandle, sync::Notify};

/// A handle for managing the background task that executes stream commands.
///
/// The task is handed a running flag and a notifier; it is expected to loop
/// while the flag is set and to wake up whenever the notifier fires.
///
/// # Example
///
/// ```ignore
/// let worker = StreamWorkerHandle::new(|running, notifier| {
///     tokio::spawn(async move {
///         while running.load(Ordering::SeqCst) {
///             notifier.notified().await;
///             // drain and execute queued commands
///         }
///     })
/// });
///
/// // Wake the worker after enqueuing a command
/// worker.notify();
/// ```
pub(crate) struct StreamWorkerHandle {
    /// Flag indicating whether the background task should continue running
    running: Arc<AtomicBool>,

    /// Handle to the spawned background task, becomes `None` after shutdown is initiated
    handle: Option<JoinHandle<()>>,

    /// Notification mechanism to wake up the background task
    notifier: Arc<Notify>,
}

impl StreamWorkerHandle {
    /// Creates a new `StreamWorkerHandle` by spawning a background task.
    ///
    /// # Parameters
    ///
    /// * `task` - A function that takes a running flag and a notifier, and returns a `JoinHandle`.
    ///   This function is responsible for creating and spawning the actual background task.
    pub(crate) fn new<F>(task: F) -> Self
    where
        F: FnOnce(Arc<AtomicBool>, Arc<Notify>) -> JoinHandle<()>,
    {
        let running = Arc::new(AtomicBool::new(true));
        let notifier = Arc::new(Notify::new());
        let handle = task(running.clone(), notifier.clone());

        Self {
            running,
            handle: Some(handle),
            notifier,
        }
    }

    /// Wakes the background task so it drains newly queued commands.
    pub(crate) fn notify(&self) {
        self.notifier.notify_one();
    }

    #[cfg(test)]
    pub(crate) fn running(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Initiates shutdown of the background task.
    ///
    /// Clears the running flag and wakes the task so it observes the change.
    /// The task is detached rather than joined; it exits on its next check.
    pub(crate) fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.notifier.notify_one();
        self.handle.take();
    }
}

impl Drop for StreamWorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
