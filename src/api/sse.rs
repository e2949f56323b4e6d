//! Server-Sent Events support

use crate::runtime::{SessionEvent, SessionSnapshot};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Convert a session subscription into an SSE stream, starting with the snapshot
pub fn sse_stream(
    init: SessionSnapshot,
    broadcast_rx: tokio::sync::broadcast::Receiver<SessionEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init = futures::stream::once(async move {
        Ok(to_axum_event("init", json!({ "type": "init", "snapshot": init })))
    });

    let broadcasts = BroadcastStream::new(broadcast_rx).filter_map(|result| match result {
        Ok(event) => {
            let (event_type, data) = event_payload(event);
            Some(Ok(to_axum_event(event_type, data)))
        }
        Err(e) => {
            // Lagged receivers lose events; the client re-syncs from the next snapshot
            tracing::warn!(error = %e, "SSE subscriber lagged");
            None
        }
    });

    Sse::new(init.chain(broadcasts)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn to_axum_event(event_type: &str, data: Value) -> Event {
    Event::default().event(event_type).data(data.to_string())
}

/// Event name and JSON body for one session event
fn event_payload(event: SessionEvent) -> (&'static str, Value) {
    match event {
        SessionEvent::Message { message } => (
            "message",
            json!({
                "type": "message",
                "message": message
            }),
        ),
        SessionEvent::Delta { message_id, text } => (
            "delta",
            json!({
                "type": "delta",
                "message_id": message_id,
                "text": text
            }),
        ),
        SessionEvent::StepChanged { from, to } => (
            "step_changed",
            json!({
                "type": "step_changed",
                "from": from,
                "to": to
            }),
        ),
        SessionEvent::AnswersChanged { answers } => (
            "answers_changed",
            json!({
                "type": "answers_changed",
                "answers": answers
            }),
        ),
        SessionEvent::ReplyDone {
            message_id,
            affordance,
        } => (
            "reply_done",
            json!({
                "type": "reply_done",
                "message_id": message_id,
                "affordance": affordance
            }),
        ),
        SessionEvent::ReplyFailed {
            message,
            kind,
            step,
        } => (
            "reply_failed",
            json!({
                "type": "reply_failed",
                "message": message,
                "kind": kind,
                "step": step
            }),
        ),
        SessionEvent::Reset { snapshot } => (
            "reset",
            json!({
                "type": "reset",
                "snapshot": snapshot
            }),
        ),
    }
}
