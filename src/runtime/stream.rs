//! Streaming a turn as step events

use super::{failure_text, AgentError, TurnRuntime};
use crate::state_machine::StepEvent;
use futures::{FutureExt, Stream};
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Steps buffered ahead of a slow consumer before the producer waits
pub const STEP_CHANNEL_CAPACITY: usize = 32;

/// Steps of one turn. Ends after the first final step.
///
/// Dropping the stream cancels the producing turn.
pub struct StepStream {
    rx: mpsc::Receiver<StepEvent>,
    finished: bool,
    _cancel_on_drop: DropGuard,
}

impl StepStream {
    pub fn new(rx: mpsc::Receiver<StepEvent>, cancel: CancellationToken) -> Self {
        Self {
            rx,
            finished: false,
            _cancel_on_drop: cancel.drop_guard(),
        }
    }

    /// A stream holding just `step`
    pub fn single(step: StepEvent) -> Self {
        let (tx, rx) = mpsc::channel(1);
        // Capacity 1 and a fresh channel: cannot be full or closed
        let _ = tx.try_send(step);
        Self::new(rx, CancellationToken::new())
    }
}

impl Stream for StepStream {
    type Item = StepEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StepEvent>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(step)) => {
                this.finished = step.is_final;
                Poll::Ready(Some(step))
            }
            other => other,
        }
    }
}

/// Run `question` on a background task, publishing its steps.
///
/// A turn that fails before its final answer publishes exactly one error step.
pub fn stream_turn(runtime: Arc<TurnRuntime>, question: String) -> StepStream {
    let (tx, rx) = mpsc::channel(STEP_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    let producer_cancel = cancel.clone();

    tokio::spawn(async move {
        let outcome = AssertUnwindSafe(runtime.run_turn(&question, Some(&tx), &producer_cancel))
            .catch_unwind()
            .await;

        let failure = match outcome {
            Ok(Ok(_) | Err(AgentError::Cancelled)) => return,
            Ok(Err(e)) => failure_text(&e),
            Err(_) => {
                tracing::error!("Turn task panicked");
                failure_text(&"internal error")
            }
        };
        let _ = tx.send(StepEvent::error(failure)).await;
    });

    StepStream::new(rx, cancel)
}
