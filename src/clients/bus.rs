use std::collections::HashMap;

use anyhow::{Error, Result, anyhow};
use redis::{
    AsyncCommands, Client,
    aio::MultiplexedConnection,
    streams::{StreamReadOptions, StreamReadReply},
};
use serde_json::Value as JsonValue;
use tracing::{debug, error, info};

use crate::models::event::StreamEntry;

/// Append-only event log over Redis streams with consumer-group semantics.
///
/// Like the state store, the bus never propagates transport errors: a failed
/// append surfaces as `None`, a failed read as an empty Vec. Callers must
/// treat empty results as "nothing available now", not proof of absence.
#[derive(Clone)]
pub struct EventBus {
    connection: MultiplexedConnection,
}

impl EventBus {
    pub async fn connect(redis_url: &str) -> Result<Self, Error> {
        let client = Client::open(redis_url)
            .map_err(|e| anyhow!("Failed to create redis client: {}", e))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| anyhow!("Failed to connect to redis: {}", e))?;

        info!("Event bus connection established");

        Ok(Self { connection })
    }

    pub fn from_connection(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }

    /// Appends an entry and returns its bus-assigned id.
    ///
    /// The wire only carries scalars: booleans are stringified and null
    /// fields dropped before the append.
    pub async fn add(&self, stream: &str, fields: &HashMap<String, JsonValue>) -> Option<String> {
        let sanitized = sanitize_fields(fields);
        if sanitized.is_empty() {
            error!(stream, "Refusing to append entry with no usable fields");
            return None;
        }

        let mut conn = self.connection.clone();
        match conn.xadd::<_, _, _, _, String>(stream, "*", &sanitized).await {
            Ok(id) => {
                debug!(stream, id = %id, "Entry appended to stream");
                Some(id)
            }
            Err(e) => {
                error!(error = %e, stream, "Failed to append entry to stream");
                None
            }
        }
    }

    /// Creates the consumer group (and the stream, if absent) starting at the
    /// beginning of the log. An already existing group is success.
    pub async fn create_group(&self, stream: &str, group: &str) {
        let mut conn = self.connection.clone();
        match conn
            .xgroup_create_mkstream::<_, _, _, String>(stream, group, "0")
            .await
        {
            Ok(_) => {
                debug!(stream, group, "Consumer group created");
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(stream, group, "Consumer group exists");
            }
            Err(e) => {
                error!(error = %e, stream, group, "Failed to create consumer group");
            }
        }
    }

    /// Reads entries not yet claimed by another consumer in the group.
    pub async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Vec<StreamEntry> {
        let options = StreamReadOptions::default()
            .group(group, consumer)
            .count(count);

        let mut conn = self.connection.clone();
        let reply: StreamReadReply = match conn
            .xread_options(&[stream], &[">"], &options)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %e, stream, group, "Failed to read from stream");
                return Vec::new();
            }
        };

        let mut entries = Vec::new();
        for key in reply.keys {
            for id in key.ids {
                let mut fields = HashMap::new();
                for (name, value) in id.map {
                    let value: String = redis::from_redis_value(&value).unwrap_or_default();
                    fields.insert(name, value);
                }
                entries.push(StreamEntry { id: id.id, fields });
            }
        }

        if !entries.is_empty() {
            debug!(stream, group, count = entries.len(), "Entries read from stream");
        }
        entries
    }

    /// Marks an entry processed for the group. A missed ack leaves the entry
    /// pending for redelivery, so handlers must be retry-tolerant.
    pub async fn ack(&self, stream: &str, group: &str, id: &str) {
        let mut conn = self.connection.clone();
        match conn.xack::<_, _, _, i64>(stream, group, &[id]).await {
            Ok(_) => {
                debug!(stream, group, id, "Entry acknowledged");
            }
            Err(e) => {
                error!(error = %e, stream, group, id, "Failed to acknowledge entry");
            }
        }
    }
}

fn sanitize_fields(fields: &HashMap<String, JsonValue>) -> Vec<(String, String)> {
    fields
        .iter()
        .filter_map(|(key, value)| {
            let rendered = match value {
                JsonValue::Null => return None,
                JsonValue::Bool(b) => b.to_string(),
                JsonValue::Number(n) => n.to_string(),
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((key.clone(), rendered))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sanitize_drops_nulls_and_stringifies_booleans() {
        let mut fields = HashMap::new();
        fields.insert("type".to_string(), json!("new_appointment"));
        fields.insert("confirmed".to_string(), json!(true));
        fields.insert("appointment_id".to_string(), json!(42));
        fields.insert("reason".to_string(), JsonValue::Null);

        let sanitized: HashMap<_, _> = sanitize_fields(&fields).into_iter().collect();

        assert_eq!(sanitized.len(), 3);
        assert_eq!(sanitized["type"], "new_appointment");
        assert_eq!(sanitized["confirmed"], "true");
        assert_eq!(sanitized["appointment_id"], "42");
        assert!(!sanitized.contains_key("reason"));
    }

    #[test]
    fn sanitize_encodes_structured_values_as_json() {
        let mut fields = HashMap::new();
        fields.insert("payload".to_string(), json!({"a": 1}));

        let sanitized = sanitize_fields(&fields);
        assert_eq!(sanitized[0].1, "{\"a\":1}");
    }
}
