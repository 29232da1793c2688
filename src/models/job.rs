use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// A named job plus its arguments, as serialized onto the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub id: String,
    pub function: String,

    #[serde(default)]
    pub args: JsonValue,

    pub enqueued_at: DateTime<Utc>,
}

impl JobPayload {
    pub fn new(function: &str, args: JsonValue) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            function: function.to_string(),
            args,
            enqueued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    FailedRetryable,
    FailedTerminal,
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::FailedRetryable => write!(f, "failed_retryable"),
            JobStatus::FailedTerminal => write!(f, "failed_terminal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_round_trips_through_json() {
        let payload = JobPayload::new("send_email_task", json!({"recipient_email": "a@b.com"}));
        let encoded = serde_json::to_string(&payload).unwrap();
        let decoded: JobPayload = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded.id, payload.id);
        assert_eq!(decoded.function, "send_email_task");
        assert_eq!(decoded.args["recipient_email"], "a@b.com");
    }

    #[test]
    fn payload_ids_are_unique() {
        let a = JobPayload::new("noop", JsonValue::Null);
        let b = JobPayload::new("noop", JsonValue::Null);
        assert_ne!(a.id, b.id);
    }
}
