use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::Config;

/// Email delivery with a two-step cascade: direct SMTP submission first, the
/// SendGrid HTTP API second. There is no third step; a failure past the
/// fallback is terminal for the calling job.
pub struct EmailClient {
    smtp_host: String,
    smtp_port: u16,
    smtp_use_tls: bool,
    credentials: Option<(String, String)>,
    from_email: String,
    from_name: String,
    sendgrid_api_key: Option<String>,
    sendgrid_url: String,
    http_client: Client,
}

impl EmailClient {
    pub fn new(config: &Config, from_name: &str) -> Result<Self, Error> {
        if config.smtp_host.is_empty() || config.smtp_from_email.is_empty() {
            return Err(anyhow!("Core SMTP settings are missing"));
        }

        if config.sendgrid_api_key.is_none() {
            warn!("No SendGrid API key configured, SMTP failures will be terminal");
        }

        info!(host = %config.smtp_host, port = config.smtp_port, "Email client initialized");

        Ok(Self {
            smtp_host: config.smtp_host.clone(),
            smtp_port: config.smtp_port,
            smtp_use_tls: config.smtp_use_tls,
            credentials: config.smtp_credentials(),
            from_email: config.smtp_from_email.clone(),
            from_name: from_name.to_string(),
            sendgrid_api_key: config.sendgrid_api_key.clone(),
            sendgrid_url: config.sendgrid_url.clone(),
            http_client: Client::new(),
        })
    }

    /// Sends formatted HTML email, falling back to the HTTP API only when a
    /// key is configured. Without a key the original SMTP error is returned
    /// and no HTTP call is attempted.
    pub async fn send_email(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        timeout: Duration,
    ) -> Result<(), Error> {
        match self.send_via_smtp(to, subject, html_body, timeout).await {
            Ok(()) => Ok(()),
            Err(smtp_error) => {
                warn!(error = %smtp_error, "SMTP failed, switching to SendGrid API");

                match &self.sendgrid_api_key {
                    Some(api_key) => {
                        self.send_via_api(api_key, to, subject, html_body, timeout)
                            .await
                    }
                    None => {
                        error!("SendGrid API key is missing, cannot fall back");
                        Err(smtp_error)
                    }
                }
            }
        }
    }

    async fn send_via_smtp(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        timeout: Duration,
    ) -> Result<(), Error> {
        let from: Mailbox = self
            .from_email
            .parse()
            .map_err(|e| anyhow!("Invalid sender address: {}", e))?;
        let to: Mailbox = to
            .parse()
            .map_err(|e| anyhow!("Invalid recipient address: {}", e))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(
                "Please enable HTML to view this email.".to_string(),
                html_body.to_string(),
            ))?;

        // Port 465 means implicit TLS, 587 opportunistic STARTTLS.
        let mut builder = if self.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.smtp_host)?
        } else if self.smtp_port == 587 || self.smtp_use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.smtp_host)
        };

        builder = builder.port(self.smtp_port).timeout(Some(timeout));

        if let Some((user, password)) = &self.credentials {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        let transport = builder.build();

        debug!(host = %self.smtp_host, "Submitting email over SMTP");
        transport.send(message).await?;
        info!("Email sent over SMTP");

        Ok(())
    }

    async fn send_via_api(
        &self,
        api_key: &str,
        to: &str,
        subject: &str,
        html_body: &str,
        timeout: Duration,
    ) -> Result<(), Error> {
        let payload = json!({
            "personalizations": [{"to": [{"email": to}], "subject": subject}],
            "from": {"email": self.from_email, "name": self.from_name},
            "content": [{"type": "text/html", "value": html_body}],
        });

        let response = self
            .http_client
            .post(&self.sendgrid_url)
            .bearer_auth(api_key)
            .json(&payload)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        if matches!(status, 200 | 201 | 202) {
            info!("Email sent via SendGrid API");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            error!(status, body = %body, "SendGrid rejected the request");
            Err(anyhow!("SendGrid API failed with status {}", status))
        }
    }
}
