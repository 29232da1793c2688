use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Error, Result};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{error, info, warn};

use crate::models::event::{
    Channel, DeliveryStatus, EVENT_TYPE_FIELD, RETRIES_FIELD, RetryCounter, StatusUpdate,
};
use crate::tasks::Dependencies;

/// Appends a terminal delivery outcome to the bus so UI consumers always get
/// a signal. Flows without an addressable subject are silently skipped.
pub async fn send_status_update(
    deps: &Dependencies,
    appointment_id: Option<i64>,
    channel: Channel,
    status: DeliveryStatus,
) {
    let Some(appointment_id) = appointment_id else {
        return;
    };

    let update = StatusUpdate {
        appointment_id,
        channel,
        status,
    };

    match deps
        .bus
        .add(&deps.config.events_stream, &update.into_fields())
        .await
    {
        Some(_) => {
            info!(appointment_id, channel = %channel, status = %status, "Status update sent");
        }
        None => {
            error!(appointment_id, channel = %channel, "Failed to send status update");
        }
    }
}

/// The ceiling decision for one more delivery attempt: the incremented
/// counter when the event may go back on the bus, `None` when it is spent.
pub fn next_requeue(counter: RetryCounter, ceiling: u32) -> Option<RetryCounter> {
    let next = counter.incremented();
    if next.get() > ceiling { None } else { Some(next) }
}

/// Re-appends a failed business event with an incremented retry counter.
/// Past the ceiling the event is dropped for good; there is no dead-letter
/// store.
pub async fn requeue_event(
    deps: &Dependencies,
    stream: &str,
    mut payload: HashMap<String, JsonValue>,
) {
    let counter = RetryCounter::parse(
        payload
            .get(RETRIES_FIELD)
            .and_then(JsonValue::as_str),
    );

    let Some(retries) = next_requeue(counter, deps.config.requeue_ceiling) else {
        let event_type = payload
            .get(EVENT_TYPE_FIELD)
            .and_then(JsonValue::as_str)
            .unwrap_or("unknown");
        error!(event_type, "Max retries reached, dropping event");
        return;
    };

    payload.insert(
        RETRIES_FIELD.to_string(),
        JsonValue::String(retries.to_wire()),
    );

    match deps.bus.add(stream, &payload).await {
        Some(id) => {
            info!(stream, retry = retries.get(), id = %id, "Event requeued");
        }
        None => {
            error!(stream, "Failed to requeue event");
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RequeueArgs {
    pub stream_name: String,
    pub payload: HashMap<String, JsonValue>,
}

pub async fn requeue_to_stream(deps: Arc<Dependencies>, args: JsonValue) -> Result<(), Error> {
    let args: RequeueArgs = serde_json::from_value(args)?;

    if args.payload.is_empty() {
        warn!(stream = %args.stream_name, "Refusing to requeue empty payload");
        return Ok(());
    }

    requeue_event(&deps, &args.stream_name, args.payload).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_events_get_their_first_retry() {
        let next = next_requeue(RetryCounter::parse(None), 5).expect("should requeue");
        assert_eq!(next.get(), 1);
        assert_eq!(next.to_wire(), "1");
    }

    #[test]
    fn fifth_requeue_is_allowed_sixth_is_dropped() {
        let at_four = RetryCounter::parse(Some("4"));
        let next = next_requeue(at_four, 5).expect("fifth attempt still allowed");
        assert_eq!(next.get(), 5);

        let at_five = RetryCounter::parse(Some("5"));
        assert!(next_requeue(at_five, 5).is_none(), "sixth attempt must drop");
    }

    #[test]
    fn malformed_counters_restart_the_budget() {
        let next = next_requeue(RetryCounter::parse(Some("many")), 5).expect("should requeue");
        assert_eq!(next.get(), 1);
    }
}
