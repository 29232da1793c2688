use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub redis_url: String,

    #[serde(default = "default_events_stream")]
    pub events_stream: String,
    #[serde(default = "default_events_group")]
    pub events_group: String,
    #[serde(default = "default_consumer_prefix")]
    pub consumer_prefix: String,
    #[serde(default = "default_events_read_count")]
    pub events_read_count: usize,

    #[serde(default = "default_queue_key")]
    pub queue_key: String,
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,
    #[serde(default = "default_job_timeout")]
    pub job_timeout_seconds: u64,
    #[serde(default = "default_keep_result")]
    pub keep_result_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_requeue_ceiling")]
    pub requeue_ceiling: u32,

    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_user: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default = "default_from_email")]
    pub smtp_from_email: String,
    #[serde(default = "default_smtp_use_tls")]
    pub smtp_use_tls: bool,
    #[serde(default = "default_email_timeout")]
    pub email_timeout_seconds: u64,

    #[serde(default)]
    pub sendgrid_api_key: Option<String>,
    #[serde(default = "default_sendgrid_url")]
    pub sendgrid_url: String,

    #[serde(default)]
    pub twilio_account_sid: Option<String>,
    #[serde(default)]
    pub twilio_auth_token: Option<String>,
    #[serde(default)]
    pub twilio_phone_number: Option<String>,
    #[serde(default)]
    pub twilio_whatsapp_template_sid: Option<String>,
    #[serde(default = "default_twilio_base_url")]
    pub twilio_base_url: String,
    #[serde(default = "default_country_code")]
    pub default_country_code: String,

    #[serde(default = "default_templates_dir")]
    pub templates_dir: String,
    #[serde(default = "default_site_settings_key")]
    pub site_settings_key: String,

    #[serde(default = "default_server_port")]
    pub server_port: u16,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environment variable: {}", e))?;
        Ok(config)
    }

    /// Per-instance consumer name, so horizontally scaled workers never
    /// collide inside the consumer group.
    pub fn consumer_name(&self) -> String {
        format!("{}{}", self.consumer_prefix, Uuid::new_v4().simple())
    }

    /// SMTP credentials are attached only when both halves are configured.
    pub fn smtp_credentials(&self) -> Option<(String, String)> {
        match (&self.smtp_user, &self.smtp_password) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some((user.clone(), password.clone()))
            }
            _ => None,
        }
    }
}

fn default_events_stream() -> String {
    "bot_events".to_string()
}

fn default_events_group() -> String {
    "notification_group".to_string()
}

fn default_consumer_prefix() -> String {
    "notification_instance_".to_string()
}

fn default_events_read_count() -> usize {
    10
}

fn default_queue_key() -> String {
    "notifications:jobs".to_string()
}

fn default_max_jobs() -> usize {
    10
}

fn default_job_timeout() -> u64 {
    60
}

fn default_keep_result() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    500
}

fn default_requeue_ceiling() -> u32 {
    5
}

fn default_smtp_port() -> u16 {
    465
}

fn default_from_email() -> String {
    "noreply@example.com".to_string()
}

fn default_smtp_use_tls() -> bool {
    true
}

fn default_email_timeout() -> u64 {
    15
}

fn default_sendgrid_url() -> String {
    "https://api.sendgrid.com/v3/mail/send".to_string()
}

fn default_twilio_base_url() -> String {
    "https://api.twilio.com".to_string()
}

fn default_country_code() -> String {
    "49".to_string()
}

fn default_templates_dir() -> String {
    "templates".to_string()
}

fn default_site_settings_key() -> String {
    "site_settings".to_string()
}

fn default_server_port() -> u16 {
    8080
}
