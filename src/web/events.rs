//! Server-Sent Events for axis devices.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::Utc;
use futures_core::stream::Stream;
use tracing::debug;

use crate::axis::AxisDevice;
use crate::web::models::AxisEvent;

async fn sample(axis: &AxisDevice) -> AxisEvent {
    let position = axis.position().await.ok();
    AxisEvent {
        address: axis.address().to_string(),
        state: axis.state().await,
        status: axis.status().await,
        position,
        timestamp: Utc::now(),
    }
}

/// Poll the axis every `interval` and emit a `change` event whenever its
/// state, status or position differs from the last emitted one. The first
/// sample is always sent.
pub fn axis_change_stream(
    axis: Arc<AxisDevice>,
    interval: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    stream! {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last: Option<AxisEvent> = None;
        loop {
            ticker.tick().await;
            let event = sample(&axis).await;
            if last.as_ref().is_some_and(|l| !l.differs_from(&event)) {
                continue;
            }
            match serde_json::to_string(&event) {
                Ok(json) => {
                    yield Ok(Event::default().event("change").data(json));
                }
                Err(e) => debug!("Cannot encode axis event: {}", e),
            }
            last = Some(event);
        }
    }
}

pub fn axis_events(
    axis: Arc<AxisDevice>,
    interval: Duration,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send> {
    Sse::new(axis_change_stream(axis, interval)).keep_alive(
        KeepAlive::default()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}
