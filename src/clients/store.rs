use std::collections::{HashMap, HashSet};

use anyhow::{Error, Result, anyhow};
use redis::{AsyncCommands, Client, Pipeline, aio::MultiplexedConnection};
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};

/// Typed operations over the shared Redis state store.
///
/// Every method catches transport-level errors, logs them, and returns a safe
/// default instead of propagating. Callers therefore cannot tell "key absent"
/// from "backend unreachable" by return value alone; the log stream is the
/// diagnostic channel for that distinction.
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, Error> {
        info!("Connecting to Redis");

        let client = Client::open(redis_url)
            .map_err(|e| anyhow!("Failed to create redis client: {}", e))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| anyhow!("Failed to connect to redis: {}", e))?;

        info!("Redis connection established");

        Ok(Self { connection })
    }

    pub fn connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }

    pub async fn ping(&self) -> bool {
        let mut conn = self.connection.clone();
        match conn.ping::<String>().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Redis ping failed");
                false
            }
        }
    }

    /// Runs a caller-built command sequence atomically; an empty Vec means
    /// the whole batch failed.
    pub async fn execute_batch<F>(&self, build: F) -> Vec<redis::Value>
    where
        F: FnOnce(&mut Pipeline),
    {
        let mut pipe = redis::pipe();
        pipe.atomic();
        build(&mut pipe);

        let mut conn = self.connection.clone();
        match pipe.query_async::<Vec<redis::Value>>(&mut conn).await {
            Ok(results) => {
                debug!(commands = results.len(), "Pipeline executed");
                results
            }
            Err(e) => {
                error!(error = %e, "Pipeline execution failed");
                Vec::new()
            }
        }
    }

    // --- Hash operations ---

    pub async fn set_hash_field(&self, key: &str, field: &str, value: &str) {
        let mut conn = self.connection.clone();
        if let Err(e) = conn.hset::<_, _, _, ()>(key, field, value).await {
            error!(error = %e, key, field, "Failed to set hash field");
        }
    }

    pub async fn set_hash_fields(&self, key: &str, entries: &[(String, String)]) {
        let mut conn = self.connection.clone();
        if let Err(e) = conn.hset_multiple::<_, _, _, ()>(key, entries).await {
            error!(error = %e, key, "Failed to set hash fields");
        }
    }

    pub async fn get_hash_field(&self, key: &str, field: &str) -> Option<String> {
        let mut conn = self.connection.clone();
        match conn.hget::<_, _, Option<String>>(key, field).await {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, key, field, "Failed to get hash field");
                None
            }
        }
    }

    pub async fn get_all_hash(&self, key: &str) -> HashMap<String, String> {
        let mut conn = self.connection.clone();
        match conn.hgetall::<_, HashMap<String, String>>(key).await {
            Ok(map) => map,
            Err(e) => {
                error!(error = %e, key, "Failed to get hash");
                HashMap::new()
            }
        }
    }

    /// Serializes a JSON value into a hash field.
    pub async fn set_hash_json(&self, key: &str, field: &str, value: &JsonValue) {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(error = %e, key, field, "Failed to serialize hash value");
                return;
            }
        };
        self.set_hash_field(key, field, &encoded).await;
    }

    pub async fn get_hash_json(&self, key: &str, field: &str) -> Option<JsonValue> {
        let raw = self.get_hash_field(key, field).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                error!(error = %e, key, field, "Failed to deserialize hash value");
                None
            }
        }
    }

    // --- Set operations ---

    pub async fn add_to_set(&self, key: &str, member: &str) {
        let mut conn = self.connection.clone();
        if let Err(e) = conn.sadd::<_, _, ()>(key, member).await {
            error!(error = %e, key, "Failed to add set member");
        }
    }

    pub async fn get_set_members(&self, key: &str) -> HashSet<String> {
        let mut conn = self.connection.clone();
        match conn.smembers::<_, HashSet<String>>(key).await {
            Ok(members) => members,
            Err(e) => {
                error!(error = %e, key, "Failed to read set members");
                HashSet::new()
            }
        }
    }

    pub async fn is_set_member(&self, key: &str, member: &str) -> bool {
        let mut conn = self.connection.clone();
        match conn.sismember::<_, _, bool>(key, member).await {
            Ok(is_member) => is_member,
            Err(e) => {
                error!(error = %e, key, "Failed to check set membership");
                false
            }
        }
    }

    pub async fn remove_from_set(&self, key: &str, member: &str) {
        let mut conn = self.connection.clone();
        if let Err(e) = conn.srem::<_, _, ()>(key, member).await {
            error!(error = %e, key, "Failed to remove set member");
        }
    }

    // --- List operations ---

    pub async fn push_to_list(&self, key: &str, value: &str) {
        let mut conn = self.connection.clone();
        if let Err(e) = conn.rpush::<_, _, ()>(key, value).await {
            error!(error = %e, key, "Failed to push list value");
        }
    }

    pub async fn pop_from_list_left(&self, key: &str) -> Option<String> {
        let mut conn = self.connection.clone();
        match conn.lpop::<_, Option<String>>(key, None).await {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, key, "Failed to pop list value");
                None
            }
        }
    }

    pub async fn get_list_range(&self, key: &str, start: isize, stop: isize) -> Vec<String> {
        let mut conn = self.connection.clone();
        match conn.lrange::<_, Vec<String>>(key, start, stop).await {
            Ok(values) => values,
            Err(e) => {
                error!(error = %e, key, "Failed to read list range");
                Vec::new()
            }
        }
    }

    pub async fn get_list_length(&self, key: &str) -> usize {
        let mut conn = self.connection.clone();
        match conn.llen::<_, usize>(key).await {
            Ok(len) => len,
            Err(e) => {
                error!(error = %e, key, "Failed to read list length");
                0
            }
        }
    }

    // --- String / JSON scalar operations ---

    pub async fn set_value(&self, key: &str, value: &str, ttl_seconds: Option<u64>) {
        let mut conn = self.connection.clone();
        let result = match ttl_seconds {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl).await,
            None => conn.set::<_, _, ()>(key, value).await,
        };
        if let Err(e) = result {
            error!(error = %e, key, "Failed to set value");
        }
    }

    pub async fn get_value(&self, key: &str) -> Option<String> {
        let mut conn = self.connection.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, key, "Failed to get value");
                None
            }
        }
    }

    pub async fn set_json(&self, key: &str, value: &JsonValue, ttl_seconds: Option<u64>) {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(error = %e, key, "Failed to serialize value");
                return;
            }
        };
        self.set_value(key, &encoded, ttl_seconds).await;
    }

    pub async fn get_json(&self, key: &str) -> Option<JsonValue> {
        let raw = self.get_value(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                error!(error = %e, key, "Failed to deserialize value");
                None
            }
        }
    }

    pub async fn key_exists(&self, key: &str) -> bool {
        let mut conn = self.connection.clone();
        match conn.exists::<_, bool>(key).await {
            Ok(exists) => exists,
            Err(e) => {
                error!(error = %e, key, "Failed to check key existence");
                false
            }
        }
    }

    pub async fn expire(&self, key: &str, ttl_seconds: i64) -> bool {
        let mut conn = self.connection.clone();
        match conn.expire::<_, bool>(key, ttl_seconds).await {
            Ok(set) => set,
            Err(e) => {
                error!(error = %e, key, "Failed to set key expiry");
                false
            }
        }
    }

    pub async fn delete_key(&self, key: &str) {
        let mut conn = self.connection.clone();
        if let Err(e) = conn.del::<_, ()>(key).await {
            error!(error = %e, key, "Failed to delete key");
        }
    }
}
