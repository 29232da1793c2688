use std::collections::HashMap;

use anyhow::{Error, Result, anyhow};
use reqwest::Client;
use tracing::{debug, error, info, warn};

use crate::config::Config;

/// Hostnames Twilio can never fetch media from: our own service names.
const INTERNAL_HOSTS: [&str; 2] = ["localhost", "backend"];

/// Chat/SMS delivery over the Twilio REST API.
///
/// Constructed only when the account is fully configured; an unconfigured
/// account disables the messaging channel instead of failing the worker.
pub struct TwilioClient {
    http_client: Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    base_url: String,
    country_code: String,
}

/// One delivery surface the cascade can try.
pub trait MessageSender {
    fn send_template(
        &self,
        to: &str,
        content_sid: &str,
        variables: &HashMap<String, String>,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn send_freeform(
        &self,
        to: &str,
        body: &str,
        media_url: Option<&str>,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn send_sms(&self, to: &str, body: &str) -> impl Future<Output = Result<(), Error>> + Send;
}

impl TwilioClient {
    /// Returns `None` (with a warning) when credentials are incomplete.
    pub fn from_config(config: &Config) -> Option<Self> {
        let (account_sid, auth_token, from_number) = match (
            &config.twilio_account_sid,
            &config.twilio_auth_token,
            &config.twilio_phone_number,
        ) {
            (Some(sid), Some(token), Some(number))
                if !sid.is_empty() && !token.is_empty() && !number.is_empty() =>
            {
                (sid.clone(), token.clone(), number.clone())
            }
            _ => {
                warn!("Twilio settings are missing, messaging channel disabled");
                return None;
            }
        };

        info!("Twilio client initialized");

        Some(Self {
            http_client: Client::new(),
            account_sid,
            auth_token,
            from_number,
            base_url: config.twilio_base_url.trim_end_matches('/').to_string(),
            country_code: config.default_country_code.clone(),
        })
    }

    pub fn format_phone(&self, phone: &str) -> String {
        normalize_phone(phone, &self.country_code)
    }

    async fn post_message(&self, params: Vec<(&'static str, String)>) -> Result<(), Error> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!("Twilio accepted the message");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "Twilio rejected the message");
            Err(anyhow!("Twilio request failed with status {}", status))
        }
    }
}

impl MessageSender for TwilioClient {
    /// WhatsApp delivery through a pre-approved content template.
    async fn send_template(
        &self,
        to: &str,
        content_sid: &str,
        variables: &HashMap<String, String>,
    ) -> Result<(), Error> {
        let to_wa = format!("whatsapp:{}", self.format_phone(to));
        let from_wa = format!("whatsapp:{}", self.from_number);

        debug!(content_sid, to = %to_wa, "Sending WhatsApp template");

        let params = vec![
            ("From", from_wa),
            ("To", to_wa),
            ("ContentSid", content_sid.to_string()),
            ("ContentVariables", serde_json::to_string(variables)?),
        ];
        self.post_message(params).await
    }

    /// Free-form WhatsApp message, with media attached only when the URL is
    /// publicly reachable.
    async fn send_freeform(
        &self,
        to: &str,
        body: &str,
        media_url: Option<&str>,
    ) -> Result<(), Error> {
        let to_wa = format!("whatsapp:{}", self.format_phone(to));
        let from_wa = format!("whatsapp:{}", self.from_number);

        let mut params = vec![
            ("From", from_wa),
            ("To", to_wa),
            ("Body", body.to_string()),
        ];

        if let Some(url) = media_url {
            if is_public_media_url(url) {
                params.push(("MediaUrl", url.to_string()));
            } else {
                warn!(url, "Skipping invalid media URL");
            }
        }

        self.post_message(params).await
    }

    async fn send_sms(&self, to: &str, body: &str) -> Result<(), Error> {
        let to_formatted = self.format_phone(to);

        debug!(to = %to_formatted, "Sending SMS");

        let params = vec![
            ("From", self.from_number.clone()),
            ("To", to_formatted),
            ("Body", body.to_string()),
        ];
        self.post_message(params).await
    }
}

/// E.164 normalization: strip separators, keep an existing `+`, replace a
/// leading trunk `0` with the country calling code, otherwise prefix `+`.
pub fn normalize_phone(phone: &str, country_code: &str) -> String {
    let clean: String = phone
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')'))
        .collect();

    if clean.starts_with('+') {
        clean
    } else if let Some(rest) = clean.strip_prefix('0') {
        format!("+{}{}", country_code, rest)
    } else {
        format!("+{}", clean)
    }
}

/// Twilio needs an absolute URL it can reach from outside; anything pointing
/// at our internal hostnames is unusable.
pub fn is_public_media_url(url: &str) -> bool {
    url.starts_with("http") && !INTERNAL_HOSTS.iter().any(|host| url.contains(host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_handles_separators_and_trunk_prefix() {
        assert_eq!(normalize_phone("0176 123-45 67", "49"), "+491761234567");
        assert_eq!(normalize_phone("(0176) 1234567", "49"), "+491761234567");
        assert_eq!(normalize_phone("491761234567", "49"), "+491761234567");
    }

    #[test]
    fn normalization_is_idempotent_on_e164() {
        let once = normalize_phone("0176 1234567", "49");
        assert_eq!(normalize_phone(&once, "49"), once);
        assert_eq!(normalize_phone("+491761234567", "49"), "+491761234567");
    }

    #[test]
    fn media_urls_referencing_internal_hosts_are_rejected() {
        assert!(!is_public_media_url("http://backend/img.png"));
        assert!(!is_public_media_url("http://localhost/img.png"));
        assert!(!is_public_media_url("/static/img/logo.png"));
        assert!(is_public_media_url("https://cdn.example.com/img.png"));
    }
}
