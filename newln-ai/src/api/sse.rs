//! Server-Sent Events for material generation progress

use crate::AppState;
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use newln_common::ProgressEvent;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info, warn};

/// GET /materials/:key/events - SSE stream of progress events
///
/// Each broadcaster message becomes one `data:` frame carrying the JSON
/// event. The first frame is the material's current status. The stream ends
/// after a terminal status; dropping the stream unsubscribes.
pub async fn material_event_stream(
    State(state): State<AppState>,
    Path(material_key): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(material_key = %material_key, "SSE client connected");

    // Subscribe before reading the snapshot so no transition is missed
    let mut subscription = state.broadcaster.subscribe(&material_key);
    let snapshot = match state.store.get_material_status(&material_key).await {
        Ok(status) => status,
        Err(e) => {
            warn!(material_key = %material_key, error = %e, "SSE: status snapshot failed");
            None
        }
    };

    let stream = async_stream::stream! {
        if let Some(status) = snapshot {
            yield Ok(Event::default().data(ProgressEvent::status(status).to_message()));
            if status.is_terminal() {
                debug!(material_key = %subscription.key(), "SSE: material already finished");
                return;
            }
        }

        while let Some(message) = subscription.recv().await {
            let terminal = matches!(
                ProgressEvent::from_message(&message),
                Ok(ProgressEvent::Status { status }) if status.is_terminal()
            );
            yield Ok(Event::default().data(message));
            if terminal {
                break;
            }
        }

        debug!(material_key = %subscription.key(), "SSE: stream finished");
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
