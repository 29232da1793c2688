use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Error, Result};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{error, info, warn};

use crate::clients::twilio::{MessageSender, is_public_media_url};
use crate::models::event::{Channel, DeliveryStatus};
use crate::tasks::{Dependencies, requeue::send_status_update};

#[derive(Debug, Deserialize)]
pub struct SendTwilioArgs {
    pub phone_number: String,
    pub message: String,

    #[serde(default)]
    pub appointment_id: Option<i64>,

    #[serde(default)]
    pub media_url: Option<String>,

    #[serde(default)]
    pub variables: Option<HashMap<String, String>>,
}

/// The delivery surfaces, in the order the cascade tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeStep {
    WhatsAppTemplate,
    WhatsAppFreeform,
    Sms,
}

impl CascadeStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            CascadeStep::WhatsAppTemplate => "whatsapp_template",
            CascadeStep::WhatsAppFreeform => "whatsapp_freeform",
            CascadeStep::Sms => "sms",
        }
    }
}

/// One delivery try. Transient by design; only the aggregated outcome leaves
/// the job as a status event.
#[derive(Debug, Clone)]
pub struct ChannelAttempt {
    pub step: CascadeStep,
    pub recipient: String,
    pub success: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CascadeResult {
    pub attempts: Vec<ChannelAttempt>,
    pub delivered: bool,
}

/// The deterministic step order for one send: the template step only when
/// both template variables and a configured content-template id exist.
pub fn cascade_steps(has_variables: bool, template_sid: Option<&str>) -> Vec<CascadeStep> {
    let mut steps = Vec::with_capacity(3);
    if has_variables && template_sid.is_some_and(|sid| !sid.is_empty()) {
        steps.push(CascadeStep::WhatsAppTemplate);
    }
    steps.push(CascadeStep::WhatsAppFreeform);
    steps.push(CascadeStep::Sms);
    steps
}

/// Walks the cascade until the first successful step. Step failures are
/// results, not errors: each one is recorded and the next step tried.
pub async fn run_cascade<S: MessageSender>(
    sender: &S,
    args: &SendTwilioArgs,
    template_sid: Option<&str>,
) -> CascadeResult {
    let variables = args.variables.clone().unwrap_or_default();
    let media_url = args
        .media_url
        .as_deref()
        .filter(|url| is_public_media_url(url));

    let steps = cascade_steps(!variables.is_empty(), template_sid);
    let mut attempts = Vec::with_capacity(steps.len());

    for step in steps {
        let outcome = match step {
            CascadeStep::WhatsAppTemplate => {
                // Checked in cascade_steps.
                let sid = template_sid.unwrap_or_default();
                sender
                    .send_template(&args.phone_number, sid, &variables)
                    .await
            }
            CascadeStep::WhatsAppFreeform => {
                sender
                    .send_freeform(&args.phone_number, &args.message, media_url)
                    .await
            }
            CascadeStep::Sms => sender.send_sms(&args.phone_number, &args.message).await,
        };

        match outcome {
            Ok(()) => {
                info!(step = step.as_str(), "Message delivered");
                attempts.push(ChannelAttempt {
                    step,
                    recipient: args.phone_number.clone(),
                    success: true,
                    reason: None,
                });
                return CascadeResult {
                    attempts,
                    delivered: true,
                };
            }
            Err(e) => {
                warn!(step = step.as_str(), error = %e, "Delivery step failed, falling through");
                attempts.push(ChannelAttempt {
                    step,
                    recipient: args.phone_number.clone(),
                    success: false,
                    reason: Some(e.to_string()),
                });
            }
        }
    }

    CascadeResult {
        attempts,
        delivered: false,
    }
}

/// Chat/SMS delivery job: template chat, then free-form chat, then SMS. The
/// terminal outcome always leaves as a status event.
pub async fn send_twilio_task(deps: Arc<Dependencies>, args: JsonValue) -> Result<(), Error> {
    let args: SendTwilioArgs = serde_json::from_value(args)?;

    let Some(twilio) = &deps.twilio else {
        error!("Messaging channel is disabled, cannot deliver");
        send_status_update(
            &deps,
            args.appointment_id,
            Channel::Twilio,
            DeliveryStatus::Failed,
        )
        .await;
        return Ok(());
    };

    let template_sid = deps.config.twilio_whatsapp_template_sid.as_deref();
    let result = run_cascade(twilio, &args, template_sid).await;

    let status = if result.delivered {
        DeliveryStatus::Success
    } else {
        error!(
            attempts = result.attempts.len(),
            "All delivery steps failed"
        );
        DeliveryStatus::Failed
    };

    send_status_update(&deps, args.appointment_id, Channel::Twilio, status).await;
    Ok(())
}
