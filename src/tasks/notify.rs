use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Error, Result};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use tracing::{error, info, warn};

use crate::models::event::{EVENT_NEW_APPOINTMENT, EVENT_NEW_CONTACT_REQUEST, EVENT_TYPE_FIELD};
use crate::tasks::Dependencies;

#[derive(Debug, Deserialize)]
pub struct BookingNotificationArgs {
    pub appointment_id: i64,

    #[serde(default)]
    pub admin_id: Option<i64>,
}

/// Turns a cached booking payload into a `new_appointment` event on the bus.
pub async fn send_booking_notification_task(
    deps: Arc<Dependencies>,
    args: JsonValue,
) -> Result<(), Error> {
    let args: BookingNotificationArgs = serde_json::from_value(args)?;

    let cache_key = format!("notifications:cache:{}", args.appointment_id);
    let Some(payload) = deps.store.get_json(&cache_key).await else {
        warn!(
            appointment_id = args.appointment_id,
            "No cached payload for appointment, skipping booking notification"
        );
        return Ok(());
    };

    let mut fields = object_fields(&payload);
    fields.insert(EVENT_TYPE_FIELD.to_string(), json!(EVENT_NEW_APPOINTMENT));
    fields.insert("appointment_id".to_string(), json!(args.appointment_id));
    if let Some(admin_id) = args.admin_id {
        fields.insert("admin_id".to_string(), json!(admin_id));
    }

    match deps.bus.add(&deps.config.events_stream, &fields).await {
        Some(id) => {
            info!(
                appointment_id = args.appointment_id,
                id = %id,
                "Booking notification sent to stream"
            );
        }
        None => {
            error!(
                appointment_id = args.appointment_id,
                "Failed to send booking notification to stream"
            );
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ContactNotificationArgs {
    pub request_id: i64,
}

/// Turns a cached contact-form payload into a `new_contact_request` event.
pub async fn send_contact_notification_task(
    deps: Arc<Dependencies>,
    args: JsonValue,
) -> Result<(), Error> {
    let args: ContactNotificationArgs = serde_json::from_value(args)?;

    let cache_key = format!("notifications:contact_cache:{}", args.request_id);
    let Some(payload) = deps.store.get_json(&cache_key).await else {
        warn!(
            request_id = args.request_id,
            "No cached payload for contact request, skipping notification"
        );
        return Ok(());
    };

    let mut fields = object_fields(&payload);
    fields.insert(
        EVENT_TYPE_FIELD.to_string(),
        json!(EVENT_NEW_CONTACT_REQUEST),
    );
    fields.insert("request_id".to_string(), json!(args.request_id.to_string()));

    match deps.bus.add(&deps.config.events_stream, &fields).await {
        Some(id) => {
            info!(request_id = args.request_id, id = %id, "Contact notification sent to stream");
        }
        None => {
            error!(
                request_id = args.request_id,
                "Failed to send contact notification to stream"
            );
        }
    }
    Ok(())
}

fn object_fields(payload: &JsonValue) -> HashMap<String, JsonValue> {
    payload
        .as_object()
        .map(|object| object.clone().into_iter().collect())
        .unwrap_or_default()
}
