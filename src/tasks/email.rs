use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Error, Result};
use chrono::{Duration as ChronoDuration, NaiveDateTime};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use tracing::{error, info};

use crate::models::event::{Channel, DeliveryStatus};
use crate::models::settings::SiteSettings;
use crate::tasks::{Dependencies, requeue::send_status_update};

#[derive(Debug, Deserialize)]
pub struct SendEmailArgs {
    pub recipient_email: String,
    pub subject: String,
    pub template_name: String,

    #[serde(default)]
    pub data: JsonValue,
}

/// Renders and delivers one email. Delivery failures are terminal here: the
/// outcome, success or failed, always leaves as a status event and never as
/// an error past the job boundary.
pub async fn send_email_task(deps: Arc<Dependencies>, args: JsonValue) -> Result<(), Error> {
    let args: SendEmailArgs = serde_json::from_value(args)?;
    let appointment_id = args.data.get("id").and_then(JsonValue::as_i64);

    info!(
        recipient = %args.recipient_email,
        template = %args.template_name,
        "Sending email"
    );

    let context = enrich_email_context(&args.data, &deps.site);

    let html = match deps.renderer.render(&args.template_name, &context) {
        Ok(html) => html,
        Err(e) => {
            error!(error = %e, template = %args.template_name, "Template rendering failed");
            send_status_update(&deps, appointment_id, Channel::Email, DeliveryStatus::Failed)
                .await;
            return Ok(());
        }
    };

    let timeout = Duration::from_secs(deps.config.email_timeout_seconds);
    match deps
        .email
        .send_email(&args.recipient_email, &args.subject, &html, timeout)
        .await
    {
        Ok(()) => {
            info!(recipient = %args.recipient_email, "Email sent");
            send_status_update(&deps, appointment_id, Channel::Email, DeliveryStatus::Success)
                .await;
        }
        Err(e) => {
            error!(error = %e, recipient = %args.recipient_email, "Email delivery failed");
            send_status_update(&deps, appointment_id, Channel::Email, DeliveryStatus::Failed)
                .await;
        }
    }

    Ok(())
}

/// Builds the full template context from the raw snapshot: display date and
/// time, site fields, action links, and a visit-count-based greeting.
pub fn enrich_email_context(
    data: &JsonValue,
    site: &SiteSettings,
) -> HashMap<String, JsonValue> {
    let mut context: HashMap<String, JsonValue> = data
        .as_object()
        .map(|object| object.clone().into_iter().collect())
        .unwrap_or_default();

    let raw_datetime = context
        .get("datetime")
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_string();
    let (date, time) = display_date_time(&raw_datetime);
    context.insert("date".to_string(), json!(date));
    context.insert("time".to_string(), json!(time));

    context.insert("site_url".to_string(), json!(site.site_url()));
    context.insert("site_name".to_string(), json!(site.company_name));
    context.insert("address".to_string(), json!(site.address));
    context.insert("logo_url".to_string(), json!(site.absolute_logo_url()));
    context.insert("contact_form_url".to_string(), json!(site.contact_form_url()));
    context.insert(
        "calendar_url".to_string(),
        json!(google_calendar_url(data, site)),
    );

    if let Some(name) = context.get("name").and_then(JsonValue::as_str).map(String::from) {
        if !context.contains_key("greeting") {
            let visits = context
                .get("visits_count")
                .and_then(JsonValue::as_i64)
                .unwrap_or(0);
            let greeting = match visits {
                0 => format!("Sehr geehrte/r {},", name),
                1..=4 => format!("Liebe/r {},", name),
                _ => format!("Hallo {},", name),
            };
            context.insert("greeting".to_string(), json!(greeting));
        }
    }

    let action_token = data.get("action_token").and_then(JsonValue::as_str);
    context.insert(
        "link_confirm".to_string(),
        json!(action_link(site, &site.url_path_confirm, action_token)),
    );
    context.insert(
        "link_cancel".to_string(),
        json!(action_link(site, &site.url_path_cancel, action_token)),
    );
    context.insert("link_reschedule".to_string(), json!(site.reschedule_url()));
    context.insert("link_calendar".to_string(), json!(site.reschedule_url()));

    context
}

/// Display date and time for the email body. A timestamp that does not parse
/// is shown whole in the date slot with an empty time.
fn display_date_time(raw: &str) -> (String, String) {
    match NaiveDateTime::parse_from_str(raw, "%d.%m.%Y %H:%M") {
        Ok(parsed) => (
            parsed.format("%d.%m.%Y").to_string(),
            parsed.format("%H:%M").to_string(),
        ),
        Err(_) => (raw.to_string(), String::new()),
    }
}

fn action_link(site: &SiteSettings, path_template: &str, token: Option<&str>) -> String {
    match token {
        Some(token) if !path_template.is_empty() => {
            format!("{}{}", site.site_url(), path_template.replace("{token}", token))
        }
        _ => "#".to_string(),
    }
}

/// Prefilled Google-Calendar link for the appointment; empty when the
/// snapshot has no parseable start time.
fn google_calendar_url(data: &JsonValue, site: &SiteSettings) -> String {
    let Some(raw) = data.get("datetime").and_then(JsonValue::as_str) else {
        return String::new();
    };
    let Ok(start) = NaiveDateTime::parse_from_str(raw, "%d.%m.%Y %H:%M") else {
        return String::new();
    };

    let duration = data
        .get("duration_minutes")
        .and_then(JsonValue::as_i64)
        .unwrap_or(30);
    let end = start + ChronoDuration::minutes(duration);

    let service_name = data
        .get("service_name")
        .and_then(JsonValue::as_str)
        .unwrap_or("Termin");

    let fmt = "%Y%m%dT%H%M%S";
    let dates = format!("{}/{}", start.format(fmt), end.format(fmt));

    let params = [
        ("text", format!("{}: {}", site.company_name, service_name)),
        ("dates", dates),
        (
            "details",
            format!("Ihr Termin bei {}. Web: {}", site.company_name, site.site_url()),
        ),
        ("location", site.address.clone()),
        ("sf", "true".to_string()),
        ("output", "xml".to_string()),
    ];

    let query: Vec<String> = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencode(value)))
        .collect();

    format!(
        "https://www.google.com/calendar/render?action=TEMPLATE&{}",
        query.join("&")
    )
}

fn urlencode(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' | b':' => {
                encoded.push(byte as char)
            }
            b' ' => encoded.push_str("%20"),
            other => encoded.push_str(&format!("%{:02X}", other)),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn site() -> SiteSettings {
        SiteSettings {
            company_name: "Lily Beauty Salon".to_string(),
            site_base_url: "https://example.com/".to_string(),
            ..SiteSettings::default()
        }
    }

    #[test]
    fn context_carries_date_time_and_site_fields() {
        let data = json!({
            "datetime": "25.10.2023 14:30",
            "client_email": "a@b.com",
        });

        let context = enrich_email_context(&data, &site());
        assert_eq!(context["date"], "25.10.2023");
        assert_eq!(context["time"], "14:30");
        assert_eq!(context["site_name"], "Lily Beauty Salon");
        assert_eq!(context["site_url"], "https://example.com");
        assert_eq!(context["client_email"], "a@b.com");
    }

    #[test]
    fn unparseable_datetime_is_shown_whole_as_the_date() {
        let context = enrich_email_context(&json!({"datetime": "tomorrow afternoon"}), &site());
        assert_eq!(context["date"], "tomorrow afternoon");
        assert_eq!(context["time"], "");
    }

    #[test]
    fn greeting_depends_on_visit_count() {
        let first_visit = enrich_email_context(&json!({"name": "Anna", "visits_count": 0}), &site());
        assert_eq!(first_visit["greeting"], "Sehr geehrte/r Anna,");

        let returning = enrich_email_context(&json!({"name": "Anna", "visits_count": 3}), &site());
        assert_eq!(returning["greeting"], "Liebe/r Anna,");

        let regular = enrich_email_context(&json!({"name": "Anna", "visits_count": 9}), &site());
        assert_eq!(regular["greeting"], "Hallo Anna,");
    }

    #[test]
    fn action_links_need_a_token() {
        let with_token = enrich_email_context(&json!({"action_token": "tok123"}), &site());
        assert_eq!(
            with_token["link_confirm"],
            "https://example.com/booking/confirm/tok123/"
        );
        assert_eq!(
            with_token["link_cancel"],
            "https://example.com/booking/cancel/tok123/"
        );

        let without = enrich_email_context(&json!({}), &site());
        assert_eq!(without["link_confirm"], "#");
        assert_eq!(without["link_cancel"], "#");
    }

    #[test]
    fn calendar_url_spans_the_appointment_duration() {
        let data = json!({
            "datetime": "25.10.2023 14:30",
            "duration_minutes": 45,
            "service_name": "Haircut",
        });

        let url = google_calendar_url(&data, &site());
        assert!(url.contains("20231025T143000/20231025T151500"));
        assert!(url.contains("Haircut"));

        assert_eq!(google_calendar_url(&json!({}), &site()), "");
    }
}
