//! Integration tests against a real Redis instance.
//!
//! Run with `cargo test -- --ignored` when redis is listening on
//! 127.0.0.1:6379.

use std::collections::HashMap;

use anyhow::Result;
use notification_worker::clients::bus::EventBus;
use notification_worker::clients::queue::JobQueue;
use notification_worker::clients::store::RedisStore;
use notification_worker::config::Config;
use notification_worker::models::job::JobStatus;
use serde_json::json;
use uuid::Uuid;

const REDIS_URL: &str = "redis://127.0.0.1:6379";

fn queue_config(queue_key: &str) -> Config {
    Config {
        redis_url: REDIS_URL.to_string(),
        events_stream: "bot_events".to_string(),
        events_group: "notification_group".to_string(),
        consumer_prefix: "notification_instance_".to_string(),
        events_read_count: 10,
        queue_key: queue_key.to_string(),
        max_jobs: 10,
        job_timeout_seconds: 60,
        keep_result_seconds: 60,
        max_retries: 5,
        retry_delay_seconds: 10,
        poll_interval_ms: 500,
        requeue_ceiling: 5,
        smtp_host: "127.0.0.1".to_string(),
        smtp_port: 2525,
        smtp_user: None,
        smtp_password: None,
        smtp_from_email: "noreply@example.com".to_string(),
        smtp_use_tls: false,
        email_timeout_seconds: 2,
        sendgrid_api_key: None,
        sendgrid_url: "https://api.sendgrid.com/v3/mail/send".to_string(),
        twilio_account_sid: None,
        twilio_auth_token: None,
        twilio_phone_number: None,
        twilio_whatsapp_template_sid: None,
        twilio_base_url: "https://api.twilio.com".to_string(),
        default_country_code: "49".to_string(),
        templates_dir: "templates".to_string(),
        site_settings_key: "site_settings".to_string(),
        server_port: 8080,
    }
}

/// Test: Entries appended to a stream come back through the consumer group
#[tokio::test]
#[ignore = "requires a local redis"]
async fn test_stream_round_trip_through_consumer_group() -> Result<()> {
    let bus = EventBus::connect(REDIS_URL).await?;
    let stream = format!("test_events_{}", Uuid::new_v4().simple());
    let group = "test_group";

    bus.create_group(&stream, group).await;

    let mut fields = HashMap::new();
    fields.insert("type".to_string(), json!("new_appointment"));
    fields.insert("appointment_id".to_string(), json!(42));

    let id = bus.add(&stream, &fields).await.expect("append should work");

    let entries = bus.read_group(&stream, group, "test_consumer", 10).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, id);
    assert_eq!(entries[0].fields["type"], "new_appointment");
    assert_eq!(entries[0].fields["appointment_id"], "42");

    bus.ack(&stream, group, &id).await;

    // Acked entries are no longer delivered as new.
    let entries = bus.read_group(&stream, group, "test_consumer", 10).await;
    assert!(entries.is_empty());

    let store = RedisStore::connect(REDIS_URL).await?;
    store.delete_key(&stream).await;
    Ok(())
}

/// Test: Creating an existing consumer group is treated as success
#[tokio::test]
#[ignore = "requires a local redis"]
async fn test_group_creation_is_idempotent() -> Result<()> {
    let bus = EventBus::connect(REDIS_URL).await?;
    let stream = format!("test_events_{}", Uuid::new_v4().simple());

    bus.create_group(&stream, "test_group").await;
    bus.create_group(&stream, "test_group").await;

    // The stream must still be usable after the duplicate create.
    let mut fields = HashMap::new();
    fields.insert("type".to_string(), json!("probe"));
    assert!(bus.add(&stream, &fields).await.is_some());

    let store = RedisStore::connect(REDIS_URL).await?;
    store.delete_key(&stream).await;
    Ok(())
}

/// Test: Jobs pass through the queue in FIFO order with status tracking
#[tokio::test]
#[ignore = "requires a local redis"]
async fn test_queue_round_trip_and_status() -> Result<()> {
    let queue_key = format!("test_jobs_{}", Uuid::new_v4().simple());
    let config = queue_config(&queue_key);
    let queue = JobQueue::new(&config);
    queue.init().await?;

    let first = queue
        .enqueue_job("send_email_task", json!({"recipient_email": "a@b.com"}))
        .await
        .expect("enqueue should work");
    let second = queue
        .enqueue_job("send_twilio_task", json!({"phone_number": "+491761234567"}))
        .await
        .expect("enqueue should work");

    assert_eq!(queue.queue_depth().await, Some(2));
    assert_eq!(queue.job_result(&first).await, Some(JobStatus::Queued));

    let job = queue.dequeue_job().await.expect("job available");
    assert_eq!(job.id, first, "oldest job comes out first");
    assert_eq!(job.function, "send_email_task");

    queue.record_result(&first, JobStatus::Succeeded).await;
    assert_eq!(queue.job_result(&first).await, Some(JobStatus::Succeeded));

    let job = queue.dequeue_job().await.expect("job available");
    assert_eq!(job.id, second);
    assert!(queue.dequeue_job().await.is_none());

    let store = RedisStore::connect(REDIS_URL).await?;
    store.delete_key(&queue_key).await;
    queue.close().await;
    Ok(())
}

/// Test: A pipelined batch runs as one unit and yields one value per command
#[tokio::test]
#[ignore = "requires a local redis"]
async fn test_batch_executes_grouped_commands_atomically() -> Result<()> {
    let store = RedisStore::connect(REDIS_URL).await?;
    let key_a = format!("test_batch_a_{}", Uuid::new_v4().simple());
    let key_b = format!("test_batch_b_{}", Uuid::new_v4().simple());

    let results = store
        .execute_batch(|pipe| {
            pipe.set(&key_a, "one");
            pipe.set(&key_b, "two");
            pipe.get(&key_a);
        })
        .await;

    assert_eq!(results.len(), 3, "one result per batched command");
    assert_eq!(store.get_value(&key_a).await.as_deref(), Some("one"));
    assert_eq!(store.get_value(&key_b).await.as_deref(), Some("two"));

    store.delete_key(&key_a).await;
    store.delete_key(&key_b).await;
    Ok(())
}

/// Test: The store swallows read misses instead of failing
#[tokio::test]
#[ignore = "requires a local redis"]
async fn test_store_misses_are_none() -> Result<()> {
    let store = RedisStore::connect(REDIS_URL).await?;
    let key = format!("test_missing_{}", Uuid::new_v4().simple());

    assert!(store.get_value(&key).await.is_none());
    assert!(store.get_json(&key).await.is_none());
    assert!(!store.key_exists(&key).await);
    Ok(())
}
