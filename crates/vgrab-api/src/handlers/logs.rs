//! Server-sent event stream of gateway events.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::stream::Stream;
use tracing::debug;

use crate::state::AppState;

/// Heartbeat interval for idle streams.
const HEARTBEAT: Duration = Duration::from_secs(30);

/// `GET /admin/api/logs/stream`
///
/// The subscriber first receives a `connected` event, then the bus's
/// replay buffer, then live events. Disconnected clients are detected by
/// failed writes and evicted from the bus.
pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let subscription = state.bus.subscribe();
    let subscriber_id = subscription.id;
    debug!(subscriber_id, "log stream connected");

    let stream = async_stream(state, subscription);

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT)
            .text("heartbeat"),
    )
}

fn async_stream(
    state: AppState,
    mut subscription: vgrab_events::Subscription,
) -> impl Stream<Item = Result<SseEvent, Infallible>> {
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<SseEvent, Infallible>>(64);

    tokio::spawn(async move {
        let connected = SseEvent::default()
            .event("connected")
            .data(serde_json::json!({ "subscriber": subscription.id }).to_string());
        if tx.send(Ok(connected)).await.is_err() {
            state.bus.unsubscribe(subscription.id);
            return;
        }

        while let Some(event) = subscription.rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(_) => continue,
            };
            let sse = SseEvent::default().event("message").data(payload);
            if tx.send(Ok(sse)).await.is_err() {
                break;
            }
        }

        state.bus.unsubscribe(subscription.id);
        debug!(subscriber = subscription.id, "log stream closed");
    });

    tokio_stream::wrappers::ReceiverStream::new(rx)
}
