use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use serde_json::{Value as JsonValue, json};
use tokio::sync::Semaphore;
use tokio::time::{Duration, sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::models::event::{EVENT_NEW_APPOINTMENT, EVENT_NOTIFICATION_STATUS, StreamEntry};
use crate::models::job::{JobPayload, JobStatus};
use crate::tasks::{Dependencies, TaskHandler, dispatch::STATUS_CONFIRMED, registry, requeue};

/// Bounded pool pulling jobs off the queue. Each job runs under the global
/// concurrency cap with a hard per-job timeout and a fixed-delay retry
/// budget; exhausting the budget is terminal.
pub struct WorkerPool {
    deps: Arc<Dependencies>,
    handlers: HashMap<&'static str, TaskHandler>,
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(deps: Arc<Dependencies>) -> Self {
        let semaphore = Arc::new(Semaphore::new(deps.config.max_jobs));
        Self {
            deps,
            handlers: registry(),
            semaphore,
        }
    }

    pub async fn run(&self) -> Result<(), Error> {
        info!(
            max_jobs = self.deps.config.max_jobs,
            timeout_seconds = self.deps.config.job_timeout_seconds,
            "Worker pool started"
        );

        let poll_interval = Duration::from_millis(self.deps.config.poll_interval_ms);

        loop {
            let Some(job) = self.deps.queue.dequeue_job().await else {
                sleep(poll_interval).await;
                continue;
            };

            let Some(handler) = self.handlers.get(job.function.as_str()).copied() else {
                error!(function = %job.function, job_id = %job.id, "Unknown job function");
                self.deps
                    .queue
                    .record_result(&job.id, JobStatus::FailedTerminal)
                    .await;
                continue;
            };

            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| anyhow!("Worker semaphore closed"))?;

            let deps = self.deps.clone();
            tokio::spawn(async move {
                let _permit = permit;
                execute_job(deps, handler, job).await;
            });
        }
    }
}

async fn execute_job(deps: Arc<Dependencies>, handler: TaskHandler, job: JobPayload) {
    let job_timeout = Duration::from_secs(deps.config.job_timeout_seconds);
    let retry_delay = Duration::from_secs(deps.config.retry_delay_seconds);
    let max_attempts = deps.config.max_retries.max(1);

    deps.queue.record_result(&job.id, JobStatus::Running).await;

    let mut attempt = 0u32;
    loop {
        attempt += 1;

        let outcome = match timeout(job_timeout, handler(deps.clone(), job.args.clone())).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "Job timed out after {}s",
                job_timeout.as_secs()
            )),
        };

        match outcome {
            Ok(()) => {
                if attempt > 1 {
                    info!(function = %job.function, job_id = %job.id, attempt, "Job retry succeeded");
                } else {
                    debug!(function = %job.function, job_id = %job.id, "Job succeeded");
                }
                deps.queue.record_result(&job.id, JobStatus::Succeeded).await;
                return;
            }
            Err(e) => {
                if attempt >= max_attempts {
                    error!(
                        function = %job.function,
                        job_id = %job.id,
                        attempt,
                        error = %e,
                        "Job failed after exhausting all attempts"
                    );
                    deps.queue
                        .record_result(&job.id, JobStatus::FailedTerminal)
                        .await;
                    return;
                }

                warn!(
                    function = %job.function,
                    job_id = %job.id,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Job attempt failed, retrying after fixed delay"
                );
                deps.queue
                    .record_result(&job.id, JobStatus::FailedRetryable)
                    .await;
                sleep(retry_delay).await;
            }
        }
    }
}

/// Reads inbound business events through the consumer group and expands each
/// into a dispatcher job. Entries are acked after handling; an entry lost to
/// a crash before its ack stays pending for redelivery.
pub async fn run_event_consumer(deps: Arc<Dependencies>) -> Result<(), Error> {
    let stream = deps.config.events_stream.clone();
    let group = deps.config.events_group.clone();
    let consumer = deps.config.consumer_name();

    deps.bus.create_group(&stream, &group).await;
    info!(stream = %stream, group = %group, consumer = %consumer, "Event consumer started");

    let poll_interval = Duration::from_millis(deps.config.poll_interval_ms);

    loop {
        let entries = deps
            .bus
            .read_group(&stream, &group, &consumer, deps.config.events_read_count)
            .await;

        if entries.is_empty() {
            sleep(poll_interval).await;
            continue;
        }

        for entry in entries {
            handle_event(&deps, &stream, &entry).await;
            deps.bus.ack(&stream, &group, &entry.id).await;
        }
    }
}

async fn handle_event(deps: &Dependencies, stream: &str, entry: &StreamEntry) {
    let Some(event_type) = entry.event_type() else {
        warn!(id = %entry.id, "Entry without type field, ignoring");
        return;
    };

    match event_type {
        EVENT_NEW_APPOINTMENT => {
            let Some(appointment_id) = entry
                .fields
                .get("appointment_id")
                .and_then(|raw| raw.parse::<i64>().ok())
            else {
                warn!(id = %entry.id, "Appointment event without usable appointment_id");
                return;
            };

            let status = entry
                .fields
                .get("status")
                .cloned()
                .unwrap_or_else(|| STATUS_CONFIRMED.to_string());

            let enqueued = deps
                .queue
                .enqueue_job(
                    "send_appointment_notification",
                    json!({
                        "appointment_id": appointment_id,
                        "status": status,
                    }),
                )
                .await;

            match enqueued {
                Some(job_id) => {
                    debug!(appointment_id, job_id = %job_id, "Dispatcher job enqueued");
                }
                None => {
                    // Queue unreachable: push the event back with its retry
                    // counter bumped so it is not silently lost.
                    warn!(appointment_id, "Enqueue failed, requeueing event");
                    let payload: HashMap<String, JsonValue> = entry
                        .fields
                        .iter()
                        .map(|(key, value)| (key.clone(), JsonValue::String(value.clone())))
                        .collect();
                    requeue::requeue_event(deps, stream, payload).await;
                }
            }
        }
        EVENT_NOTIFICATION_STATUS => {
            // Status events are for UI consumers in their own group.
            debug!(id = %entry.id, "Skipping status event");
        }
        other => {
            debug!(event_type = other, id = %entry.id, "No handler for event type");
        }
    }
}
