use std::time::Duration;

use anyhow::Result;
use notification_worker::clients::email::EmailClient;
use notification_worker::config::Config;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(sendgrid_url: &str, sendgrid_api_key: Option<&str>) -> Config {
    Config {
        redis_url: "redis://127.0.0.1:6379".to_string(),
        events_stream: "bot_events".to_string(),
        events_group: "notification_group".to_string(),
        consumer_prefix: "notification_instance_".to_string(),
        events_read_count: 10,
        queue_key: "notifications:jobs".to_string(),
        max_jobs: 10,
        job_timeout_seconds: 60,
        keep_result_seconds: 60,
        max_retries: 5,
        retry_delay_seconds: 10,
        poll_interval_ms: 500,
        requeue_ceiling: 5,
        // Nothing listens here, so every SMTP submission fails fast.
        smtp_host: "127.0.0.1".to_string(),
        smtp_port: 2525,
        smtp_user: None,
        smtp_password: None,
        smtp_from_email: "noreply@example.com".to_string(),
        smtp_use_tls: false,
        email_timeout_seconds: 2,
        sendgrid_api_key: sendgrid_api_key.map(String::from),
        sendgrid_url: sendgrid_url.to_string(),
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

/// Test: SMTP failure falls back to the SendGrid API and succeeds on 202
#[tokio::test]
async fn test_smtp_failure_falls_back_to_sendgrid() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .and(header("authorization", "Bearer SG.test-key"))
        .and(body_partial_json(serde_json::json!({
            "personalizations": [{"to": [{"email": "client@example.com"}]}],
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(
        &format!("{}/v3/mail/send", server.uri()),
        Some("SG.test-key"),
    );
    let client = EmailClient::new(&config, "Lily Beauty Salon")?;

    client
        .send_email(
            "client@example.com",
            "Appointment Confirmation",
            "<p>Hallo</p>",
            Duration::from_secs(2),
        )
        .await?;

    Ok(())
}

/// Test: SendGrid rejections surface as errors
#[tokio::test]
async fn test_sendgrid_rejection_is_an_error() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(
        &format!("{}/v3/mail/send", server.uri()),
        Some("SG.bad-key"),
    );
    let client = EmailClient::new(&config, "Lily Beauty Salon")?;

    let result = client
        .send_email(
            "client@example.com",
            "Appointment Confirmation",
            "<p>Hallo</p>",
            Duration::from_secs(2),
        )
        .await;

    assert!(result.is_err(), "401 from the API must not be swallowed");
    Ok(())
}

/// Test: Without an API key the SMTP error is returned and no HTTP call made
#[tokio::test]
async fn test_no_api_key_means_no_fallback() -> Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&server)
        .await;

    let config = test_config(&format!("{}/v3/mail/send", server.uri()), None);
    let client = EmailClient::new(&config, "Lily Beauty Salon")?;

    let result = client
        .send_email(
            "client@example.com",
            "Appointment Confirmation",
            "<p>Hallo</p>",
            Duration::from_secs(2),
        )
        .await;

    assert!(result.is_err(), "SMTP error must surface unchanged");
    Ok(())
}

/// Test: Missing core SMTP settings fail client construction
#[test]
fn test_missing_smtp_host_fails_fast() {
    let mut config = test_config("https://api.sendgrid.com/v3/mail/send", None);
    config.smtp_host = String::new();

    assert!(EmailClient::new(&config, "Lily Beauty Salon").is_err());
}
