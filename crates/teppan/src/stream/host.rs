use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio::time::error::Elapsed;
use uuid::Uuid;
use crate::error::{Error, Result};
use crate::memory::{Buffer, MemoryLocation, MemorySpace};
use super::fence::Fence;
use super::worker::StreamWorkerHandle;
use super::{HostTask, StreamId, StreamProvider};

enum Command {
    Copy { src: Buffer, dst: Buffer },
    Host(HostTask),
    Fence(oneshot::Sender<Result<()>>),
}

/// # HostStream
///
/// A stream whose memory spaces are all simulated in host memory, executed by
/// a background tokio task.
///
/// Device memory is accepted for device ids below `device_count`; allocating
/// on any other device fails. Commands run strictly in submission order.
/// A failed command (a panicking host task, or a copy that cannot be applied)
/// does not stop the stream; its error is reported by the next fence.
///
/// The stream counts the copies, launches and synchronizations it has seen so
/// tests can observe how much work a batch issued.
///
/// Must be created from within a tokio runtime.
pub struct HostStream {
    id: StreamId,
    device_count: usize,
    pending: Arc<Mutex<Vec<Command>>>,
    worker: StreamWorkerHandle,
    copies: AtomicUsize,
    launches: AtomicUsize,
    synchronizations: AtomicUsize,
}

impl HostStream {
    /// Creates a stream with `device_count` simulated devices.
    pub fn new(device_count: usize) -> Self {
        let pending = Arc::new(Mutex::new(vec![]));
        let worker = StreamWorkerHandle::new({
            let pending = pending.clone();
            move |running, notifier| {
                tokio::spawn(async move {
                    command_loop(running, notifier, pending).await;
                })
            }
        });

        Self {
            id: Uuid::new_v4(),
            device_count,
            pending,
            worker,
            copies: AtomicUsize::new(0),
            launches: AtomicUsize::new(0),
            synchronizations: AtomicUsize::new(0),
        }
    }

    /// Number of copies enqueued over the stream's lifetime
    pub fn copies_enqueued(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }

    /// Number of host tasks enqueued over the stream's lifetime
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Number of completed calls to [`StreamProvider::synchronize`]
    pub fn synchronizations(&self) -> usize {
        self.synchronizations.load(Ordering::SeqCst)
    }

    /// Enqueues a fence that resolves once prior work has executed.
    pub fn fence(&self) -> Fence {
        let (tx, rx) = oneshot::channel();
        self.push(Command::Fence(tx));
        Fence::new(rx)
    }

    fn push(&self, command: Command) {
        self.pending.lock().push(command);
        self.worker.notify();
    }
}

#[async_trait]
impl StreamProvider for HostStream {
    fn id(&self) -> StreamId {
        self.id
    }

    fn allocate(&self, len: usize, location: MemoryLocation) -> Result<Buffer> {
        if location.space == MemorySpace::Device && location.device >= self.device_count {
            return Err(Error::AllocationFailure(format!(
                "cannot allocate {} bytes on {}: stream has {} device(s)",
                len, location, self.device_count
            )));
        }
        Ok(Buffer::allocate(len, location).with_stream(self.id))
    }

    fn enqueue_copy(&self, src: &Buffer, dst: &Buffer) -> Result<()> {
        if src.len() != dst.len() {
            return Err(Error::SizeMismatch {
                name: "copy".to_string(),
                expected: dst.len(),
                found: src.len(),
            });
        }
        self.copies.fetch_add(1, Ordering::SeqCst);
        self.push(Command::Copy { src: src.clone(), dst: dst.clone() });
        Ok(())
    }

    fn launch(&self, task: HostTask) -> Result<()> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.push(Command::Host(task));
        Ok(())
    }

    async fn synchronize(&self) -> Result<()> {
        let outcome = self.fence().await;
        self.synchronizations.fetch_add(1, Ordering::SeqCst);
        outcome
    }
}

async fn command_loop(
    running: Arc<AtomicBool>,
    notifier: Arc<Notify>,
    pending: Arc<Mutex<Vec<Command>>>,
) {
    let mut failure: Option<String> = None;

    loop {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let commands = std::mem::take(&mut *pending.lock());
        if commands.is_empty() {
            // Timeout or wakeup, loop back and check again
            let _ = timeout_await_notifier(&notifier).await;
            continue;
        }

        for command in commands {
            match command {
                Command::Copy { src, dst } => {
                    tracing::trace!(bytes = src.len(), from = %src.location(), to = %dst.location(), "stream copy");
                    if let Err(e) = dst.copy_from(&src) {
                        tracing::error!(error = %e, "stream copy failed");
                        failure.get_or_insert(e.to_string());
                    }
                }
                Command::Host(task) => {
                    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                        tracing::error!("host task panicked on stream");
                        failure.get_or_insert("host task panicked".to_string());
                    }
                }
                Command::Fence(sender) => {
                    let outcome = match failure.take() {
                        None => Ok(()),
                        Some(message) => Err(Error::Stream(message)),
                    };
                    // The waiter may have given up; nothing to report to.
                    let _ = sender.send(outcome);
                }
            }
        }
    }
}

#[inline]
async fn timeout_await_notifier(notifier: &Notify) -> std::result::Result<(), Elapsed> {
    tokio::time::timeout(
        Duration::from_millis(100),
        notifier.notified(),
    ).await
}
