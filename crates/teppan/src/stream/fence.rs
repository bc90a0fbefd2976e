use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use crate::error::{Error, Result};

/// # Fence
///
/// Resolves once every command queued on a stream ahead of it has executed.
///
/// The stream worker answers a fence with the outcome of the work since the
/// previous fence. If the worker goes away before answering, the fence
/// resolves to [`Error::Stream`].
pub struct Fence {
    receiver: oneshot::Receiver<Result<()>>,
}

impl Fence {
    pub(crate) fn new(receiver: oneshot::Receiver<Result<()>>) -> Self {
        Self { receiver }
    }
}

impl Future for Fence {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().receiver).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Stream(
                "stream worker stopped before reaching fence".to_string(),
            ))),
        }
    }
}
