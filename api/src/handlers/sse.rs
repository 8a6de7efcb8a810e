use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use uuid::Uuid;

use crate::handlers::ErrorResponse;
use crate::state::AppState;
use common::models::JobEvent;

fn to_sse_event(event: &JobEvent) -> Event {
    let json = serde_json::to_string(event).unwrap_or_default();
    Event::default()
        .event(event.kind.name())
        .id(event.sequence.to_string())
        .data(json)
}

/// Server-Sent Events for one migration: replays the log, follows live
/// events and closes after the terminal state change
#[tracing::instrument(skip(state))]
pub async fn migration_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ErrorResponse> {
    let subscription = state
        .dispatcher
        .subscribe(id)
        .ok_or_else(|| ErrorResponse::not_found(id))?;
    tracing::debug!(job_id = %subscription.job_id(), "Event stream opened");

    let stream = subscription
        .into_stream()
        .map(|event| Ok(to_sse_event(&event)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
