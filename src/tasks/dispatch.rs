use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Error, Result};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, error, warn};

use crate::models::settings::SiteSettings;
use crate::models::snapshot::AppointmentSnapshot;
use crate::tasks::Dependencies;
use crate::utils::{split_datetime, transliterate};

pub const STATUS_CONFIRMED: &str = "confirmed";

#[derive(Debug, Deserialize)]
pub struct DispatchArgs {
    pub appointment_id: i64,
    pub status: String,

    #[serde(default)]
    pub reason_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedEmail {
    pub recipient: String,
    pub subject: String,
    pub template_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedMessage {
    pub phone: String,
    pub sms_text: String,
    pub variables: HashMap<String, String>,
    pub media_url: Option<String>,
}

/// The channel jobs one business event expands into.
#[derive(Debug, Clone, Default)]
pub struct DispatchPlan {
    pub email: Option<PlannedEmail>,
    pub message: Option<PlannedMessage>,
}

/// Pure channel-selection step: which jobs to enqueue, with what arguments.
pub fn plan_dispatch(
    appointment_id: i64,
    status: &str,
    snapshot: &AppointmentSnapshot,
    site: &SiteSettings,
) -> DispatchPlan {
    let mut plan = DispatchPlan::default();

    if let Some(email) = snapshot.usable_email() {
        let (subject, template_name) = if status == STATUS_CONFIRMED {
            (
                format!("Appointment Confirmation - {}", site.company_name),
                "confirmation.html".to_string(),
            )
        } else {
            (
                format!("Appointment Cancellation - {}", site.company_name),
                "cancellation.html".to_string(),
            )
        };
        plan.email = Some(PlannedEmail {
            recipient: email.to_string(),
            subject,
            template_name,
        });
    }

    if status == STATUS_CONFIRMED {
        if let Some(phone) = snapshot.usable_phone() {
            let raw_datetime = snapshot.datetime.clone().unwrap_or_default();
            let (date, time) = split_datetime(&raw_datetime);
            let first_name = snapshot.first_name.as_deref().unwrap_or("Guest");
            let clean_name = transliterate(first_name);

            let mut variables = HashMap::new();
            variables.insert("1".to_string(), clean_name.clone());
            variables.insert("2".to_string(), date.clone());
            variables.insert("3".to_string(), time.clone());
            variables.insert("4".to_string(), appointment_id.to_string());

            let sms_text = format!(
                "Hallo {}, Ihr Termin am {} um {} bei {} ist bestätigt. Wir freuen uns auf Sie!",
                clean_name, date, time, site.company_name
            );

            plan.message = Some(PlannedMessage {
                phone: phone.to_string(),
                sms_text,
                variables,
                media_url: Some(site.absolute_logo_url()),
            });
        }
    }

    plan
}

/// Expands one business event into channel jobs, using the payload snapshot
/// the producer cached beforehand. Both enqueues are fire-and-forget: a
/// channel job's failure never reaches back here.
pub async fn send_appointment_notification(
    deps: Arc<Dependencies>,
    args: JsonValue,
) -> Result<(), Error> {
    let args: DispatchArgs = serde_json::from_value(args)?;

    let cache_key = format!("notifications:cache:{}", args.appointment_id);
    let Some(raw) = deps.store.get_value(&cache_key).await else {
        // The snapshot TTL is owned by the producer; absence means the data
        // is no longer guaranteed, so this is a permanent skip.
        warn!(
            appointment_id = args.appointment_id,
            "No cached payload for appointment, skipping notification"
        );
        return Ok(());
    };

    let payload: JsonValue = match serde_json::from_str(&raw) {
        Ok(payload) => payload,
        Err(e) => {
            error!(
                error = %e,
                appointment_id = args.appointment_id,
                "Failed to parse cached payload, skipping notification"
            );
            return Ok(());
        }
    };

    let snapshot = AppointmentSnapshot::from_json(&payload);
    let plan = plan_dispatch(args.appointment_id, &args.status, &snapshot, &deps.site);

    if plan.email.is_none() && plan.message.is_none() {
        debug!(
            appointment_id = args.appointment_id,
            status = %args.status,
            "No applicable channels for appointment"
        );
        return Ok(());
    }

    if let Some(email) = plan.email {
        let mut data = payload.clone();
        if let Some(object) = data.as_object_mut() {
            object.insert("id".to_string(), json!(args.appointment_id));
            object.insert("site_name".to_string(), json!(deps.site.company_name));
            if let Some(reason) = &args.reason_text {
                object.insert("reason_text".to_string(), json!(reason));
            }
        }

        let enqueued = deps
            .queue
            .enqueue_job(
                "send_email_task",
                json!({
                    "recipient_email": email.recipient,
                    "subject": email.subject,
                    "template_name": email.template_name,
                    "data": data,
                }),
            )
            .await;
        if enqueued.is_none() {
            error!(
                appointment_id = args.appointment_id,
                "Failed to enqueue email job"
            );
        }
    }

    if let Some(message) = plan.message {
        let enqueued = deps
            .queue
            .enqueue_job(
                "send_twilio_task",
                json!({
                    "phone_number": message.phone,
                    "message": message.sms_text,
                    "appointment_id": args.appointment_id,
                    "media_url": message.media_url,
                    "variables": message.variables,
                }),
            )
            .await;
        if enqueued.is_none() {
            error!(
                appointment_id = args.appointment_id,
                "Failed to enqueue messaging job"
            );
        }
    }

    Ok(())
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
    fn confirmed_appointment_plans_both_channels() {
        let snapshot = AppointmentSnapshot::from_json(&json!({
            "client_email": "a@b.com",
            "client_phone": "+491761234567",
            "datetime": "25.10.2023 14:30",
            "first_name": "Anna",
        }));

        let plan = plan_dispatch(7, STATUS_CONFIRMED, &snapshot, &site());

        let email = plan.email.expect("email job planned");
        assert_eq!(email.recipient, "a@b.com");
        assert_eq!(email.template_name, "confirmation.html");
        assert_eq!(email.subject, "Appointment Confirmation - Lily Beauty Salon");

        let message = plan.message.expect("messaging job planned");
        assert_eq!(message.phone, "+491761234567");
        assert!(message.sms_text.contains("Anna"));
        assert!(message.sms_text.contains("25.10.2023"));
        assert!(message.sms_text.contains("14:30"));
        assert_eq!(message.variables["1"], "Anna");
        assert_eq!(message.variables["2"], "25.10.2023");
        assert_eq!(message.variables["3"], "14:30");
        assert_eq!(message.variables["4"], "7");
    }

    #[test]
    fn cyrillic_first_name_is_transliterated() {
        let snapshot = AppointmentSnapshot::from_json(&json!({
            "client_phone": "+491761234567",
            "datetime": "25.10.2023 14:30",
            "first_name": "Анна",
        }));

        let plan = plan_dispatch(7, STATUS_CONFIRMED, &snapshot, &site());
        let message = plan.message.unwrap();
        assert!(message.sms_text.contains("Anna"));
        assert_eq!(message.variables["1"], "Anna");
    }

    #[test]
    fn cancelled_appointment_plans_email_only() {
        let snapshot = AppointmentSnapshot::from_json(&json!({
            "client_email": "a@b.com",
            "client_phone": "+491761234567",
            "datetime": "25.10.2023 14:30",
        }));

        let plan = plan_dispatch(7, "cancelled", &snapshot, &site());

        let email = plan.email.expect("email job planned");
        assert_eq!(email.template_name, "cancellation.html");
        assert_eq!(email.subject, "Appointment Cancellation - Lily Beauty Salon");
        assert!(plan.message.is_none());
    }

    #[test]
    fn placeholder_email_skips_the_email_channel() {
        let snapshot = AppointmentSnapshot::from_json(&json!({
            "client_email": "Не указан",
            "client_phone": "+491761234567",
            "datetime": "25.10.2023 14:30",
        }));

        let plan = plan_dispatch(7, STATUS_CONFIRMED, &snapshot, &site());
        assert!(plan.email.is_none());
        assert!(plan.message.is_some());
    }

    #[test]
    fn unparseable_datetime_falls_back_to_raw_split() {
        let snapshot = AppointmentSnapshot::from_json(&json!({
            "client_phone": "+491761234567",
            "datetime": "tomorrow 14:30",
            "first_name": "Anna",
        }));

        let plan = plan_dispatch(7, STATUS_CONFIRMED, &snapshot, &site());
        let message = plan.message.unwrap();
        assert_eq!(message.variables["2"], "tomorrow");
        assert_eq!(message.variables["3"], "14:30");
    }

    #[test]
    fn empty_snapshot_plans_nothing() {
        let snapshot = AppointmentSnapshot::from_json(&json!({}));
        let plan = plan_dispatch(7, STATUS_CONFIRMED, &snapshot, &site());
        assert!(plan.email.is_none());
        assert!(plan.message.is_none());
    }
}
