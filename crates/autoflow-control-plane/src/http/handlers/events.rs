//! Server-sent status events.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::poller::StatusUpdate;
use crate::state::AppState;

/// Stream every status update published by the poller.
///
/// Lagging clients skip the updates they missed.
pub async fn status_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("Status event subscriber connected");
    let stream = BroadcastStream::new(state.poller.subscribe()).filter_map(to_event);
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_event(
    msg: Result<StatusUpdate, BroadcastStreamRecvError>,
) -> Option<Result<Event, Infallible>> {
    match msg {
        Ok(update) => match Event::default().event(update.kind()).json_data(&update) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                warn!(error = %e, "Failed to encode status event");
                None
            }
        },
        Err(e) => {
            debug!(error = %e, "Status event subscriber lagged");
            None
        }
    }
}
