//! Server-Sent Events support

use crate::runtime::StepStream;
use crate::state_machine::StepEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::StreamExt;

/// Convert a turn's steps to an SSE stream of `step` events
pub fn sse_stream(steps: StepStream) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = steps.map(|step| Ok(step_to_event(&step)));

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn step_to_event(step: &StepEvent) -> Event {
    match Event::default().event("step").json_data(step) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize step");
            Event::default().event("step").data(step.content.clone())
        }
    }
}
