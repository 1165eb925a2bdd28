//! `GET /api/events` (spec §4.5, §6): every [`HubEvent`] fanned out as an
//! SSE event whose `event:` field is the event's own tag.

use super::idle::ConnectionGuard;
use super::state::AppState;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tracing::warn;

pub async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.coordinator.subscribe_events();
    let tracker = state.connections.clone();
    let initial_state = state.coordinator.hub_state().await;

    let stream = async_stream::stream! {
        let _guard = ConnectionGuard::register(tracker).await;

        let hub_state_event = mcp_hub_core::HubEvent::HubStateChanged { state: initial_state };
        if let Ok(data) = serde_json::to_string(&mcp_hub_core::HubEventEnvelope::new(hub_state_event)) {
            yield Ok(Event::default().event("hub_state").data(data));
        }

        loop {
            match rx.recv().await {
                Some(envelope) => {
                    let event_name = serde_json::to_value(&envelope.event)
                        .ok()
                        .and_then(|v| v.get("event").and_then(|e| e.as_str()).map(str::to_string))
                        .unwrap_or_else(|| "event".to_string());
                    match serde_json::to_string(&envelope) {
                        Ok(data) => yield Ok(Event::default().event(event_name).data(data)),
                        Err(err) => warn!(%err, "failed to serialize hub event for sse"),
                    }
                }
                None => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
