use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tracing::warn;

pub const EVENT_TYPE_FIELD: &str = "type";
pub const RETRIES_FIELD: &str = "_retries";

pub const EVENT_NEW_APPOINTMENT: &str = "new_appointment";
pub const EVENT_NEW_CONTACT_REQUEST: &str = "new_contact_request";
pub const EVENT_NOTIFICATION_STATUS: &str = "notification_status";

/// One entry read from the event bus: a bus-assigned id plus a flat map of
/// string fields. The id never changes; semantics live in `type` and fields.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
}

impl StreamEntry {
    pub fn event_type(&self) -> Option<&str> {
        self.fields.get(EVENT_TYPE_FIELD).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Success,
    Failed,
}

impl Display for DeliveryStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Success => write!(f, "success"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Email,
    Twilio,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Twilio => "twilio",
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal delivery outcome appended to the bus for UI consumers.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub appointment_id: i64,
    pub channel: Channel,
    pub status: DeliveryStatus,
}

impl StatusUpdate {
    pub fn into_fields(self) -> HashMap<String, JsonValue> {
        let mut fields = HashMap::new();
        fields.insert(EVENT_TYPE_FIELD.to_string(), json!(EVENT_NOTIFICATION_STATUS));
        fields.insert("appointment_id".to_string(), json!(self.appointment_id));
        fields.insert("channel".to_string(), json!(self.channel.as_str()));
        fields.insert("status".to_string(), json!(self.status.to_string()));
        fields
    }
}

/// Business-level retry counter carried on the wire as a stringified integer
/// in the `_retries` field. Parsed defensively at the boundary: malformed
/// values count as zero instead of failing the requeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryCounter(u32);

impl RetryCounter {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => Self(0),
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(count) => Self(count),
                Err(_) => {
                    warn!(raw, "Malformed retry counter, treating as zero");
                    Self(0)
                }
            },
        }
    }

    pub fn incremented(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn to_wire(self) -> String {
        self.0.to_string()
    }
}
