use anyhow::{Error, Result, anyhow};
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::models::job::{JobPayload, JobStatus};

/// Redis-list-backed dispatcher for named background jobs.
///
/// The connection is created lazily on first use; `init` is an idempotent
/// no-op once connected and `close` is safe when never initialized. Enqueue
/// failures are logged and surface as `None`, never as an error.
pub struct JobQueue {
    redis_url: String,
    queue_key: String,
    result_ttl_seconds: u64,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl JobQueue {
    pub fn new(config: &Config) -> Self {
        Self {
            redis_url: config.redis_url.clone(),
            queue_key: config.queue_key.clone(),
            result_ttl_seconds: config.keep_result_seconds,
            connection: Mutex::new(None),
        }
    }

    pub async fn init(&self) -> Result<(), Error> {
        let mut guard = self.connection.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let client = Client::open(self.redis_url.as_str())
            .map_err(|e| anyhow!("Failed to create redis client: {}", e))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| anyhow!("Failed to connect to redis: {}", e))?;

        info!("Job queue connection established");
        *guard = Some(connection);
        Ok(())
    }

    pub async fn close(&self) {
        let mut guard = self.connection.lock().await;
        if guard.take().is_some() {
            info!("Job queue connection released");
        }
    }

    /// Enqueues a named job; returns its id, or `None` when the queue is
    /// unreachable or the payload cannot be serialized.
    pub async fn enqueue_job(&self, function: &str, args: JsonValue) -> Option<String> {
        let payload = JobPayload::new(function, args);
        let encoded = match serde_json::to_string(&payload) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(error = %e, function, "Failed to serialize job payload");
                return None;
            }
        };

        let Some(mut conn) = self.connection().await else {
            error!(function, "Job queue unavailable, dropping enqueue");
            return None;
        };

        if let Err(e) = conn.lpush::<_, _, ()>(&self.queue_key, &encoded).await {
            error!(error = %e, function, "Failed to enqueue job");
            return None;
        }

        self.record_result(&payload.id, JobStatus::Queued).await;
        debug!(function, job_id = %payload.id, "Job enqueued");
        Some(payload.id)
    }

    /// Pulls the oldest queued job, if any.
    pub async fn dequeue_job(&self) -> Option<JobPayload> {
        let Some(mut conn) = self.connection().await else {
            return None;
        };

        let raw: Option<String> = match conn.rpop(&self.queue_key, None).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = %e, "Failed to dequeue job");
                return None;
            }
        };

        let raw = raw?;
        match serde_json::from_str::<JobPayload>(&raw) {
            Ok(payload) => Some(payload),
            Err(e) => {
                error!(error = %e, "Discarding malformed job payload");
                None
            }
        }
    }

    /// Records the job's lifecycle state under a short-lived result key.
    pub async fn record_result(&self, job_id: &str, status: JobStatus) {
        let Some(mut conn) = self.connection().await else {
            warn!(job_id, "Job queue unavailable, result not recorded");
            return;
        };

        let key = format!("{}:result:{}", self.queue_key, job_id);
        if let Err(e) = conn
            .set_ex::<_, _, ()>(&key, status.to_string(), self.result_ttl_seconds)
            .await
        {
            error!(error = %e, job_id, "Failed to record job result");
        }
    }

    pub async fn job_result(&self, job_id: &str) -> Option<JobStatus> {
        let mut conn = self.connection().await?;
        let key = format!("{}:result:{}", self.queue_key, job_id);
        let raw: Option<String> = match conn.get(&key).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = %e, job_id, "Failed to read job result");
                return None;
            }
        };
        let raw = raw?;
        serde_json::from_value(JsonValue::String(raw)).ok()
    }

    pub async fn queue_depth(&self) -> Option<usize> {
        let mut conn = self.connection().await?;
        match conn.llen::<_, usize>(&self.queue_key).await {
            Ok(depth) => Some(depth),
            Err(e) => {
                error!(error = %e, "Failed to read queue depth");
                None
            }
        }
    }

    async fn connection(&self) -> Option<MultiplexedConnection> {
        {
            let guard = self.connection.lock().await;
            if let Some(conn) = guard.as_ref() {
                return Some(conn.clone());
            }
        }

        if let Err(e) = self.init().await {
            error!(error = %e, "Job queue initialization failed");
            return None;
        }

        let guard = self.connection.lock().await;
        guard.as_ref().cloned()
    }
}
