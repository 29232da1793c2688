pub mod dispatch;
pub mod email;
pub mod messaging;
pub mod notify;
pub mod requeue;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Error, Result};
use futures_util::future::BoxFuture;
use serde_json::Value as JsonValue;
use tracing::info;

use crate::clients::bus::EventBus;
use crate::clients::email::EmailClient;
use crate::clients::queue::JobQueue;
use crate::clients::render::TemplateRenderer;
use crate::clients::store::RedisStore;
use crate::clients::twilio::TwilioClient;
use crate::config::Config;
use crate::models::settings::SiteSettings;

/// Everything a job handler needs, resolved once at worker startup.
///
/// Required dependencies fail construction fast; the only optional one is the
/// Twilio client, whose absence disables the messaging channel rather than
/// the pipeline.
pub struct Dependencies {
    pub config: Config,
    pub store: RedisStore,
    pub bus: EventBus,
    pub queue: JobQueue,
    pub email: EmailClient,
    pub twilio: Option<TwilioClient>,
    pub renderer: TemplateRenderer,
    pub site: SiteSettings,
}

impl Dependencies {
    pub async fn build(config: Config) -> Result<Self, Error> {
        let store = RedisStore::connect(&config.redis_url).await?;
        let bus = EventBus::from_connection(store.connection());
        let queue = JobQueue::new(&config);
        let site = SiteSettings::load(&store, &config.site_settings_key).await;
        let email = EmailClient::new(&config, &site.company_name)?;
        let twilio = TwilioClient::from_config(&config);
        let renderer = TemplateRenderer::new(&config.templates_dir)?;

        info!("Worker dependencies initialized");

        Ok(Self {
            config,
            store,
            bus,
            queue,
            email,
            twilio,
            renderer,
            site,
        })
    }
}

pub type TaskFuture = BoxFuture<'static, Result<(), Error>>;
pub type TaskHandler = fn(Arc<Dependencies>, JsonValue) -> TaskFuture;

/// Maps wire function names to handlers. Unknown names are terminal at the
/// worker, never retried.
pub fn registry() -> HashMap<&'static str, TaskHandler> {
    let mut handlers: HashMap<&'static str, TaskHandler> = HashMap::new();

    handlers.insert("send_email_task", |deps, args| {
        Box::pin(email::send_email_task(deps, args))
    });
    handlers.insert("send_twilio_task", |deps, args| {
        Box::pin(messaging::send_twilio_task(deps, args))
    });
    handlers.insert("send_appointment_notification", |deps, args| {
        Box::pin(dispatch::send_appointment_notification(deps, args))
    });
    handlers.insert("send_booking_notification_task", |deps, args| {
        Box::pin(notify::send_booking_notification_task(deps, args))
    });
    handlers.insert("send_contact_notification_task", |deps, args| {
        Box::pin(notify::send_contact_notification_task(deps, args))
    });
    handlers.insert("requeue_to_stream", |deps, args| {
        Box::pin(requeue::requeue_to_stream(deps, args))
    });

    handlers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_the_job_surface() {
        let handlers = registry();
        for name in [
            "send_email_task",
            "send_twilio_task",
            "send_appointment_notification",
            "send_booking_notification_task",
            "send_contact_notification_task",
            "requeue_to_stream",
        ] {
            assert!(handlers.contains_key(name), "missing handler: {}", name);
        }
    }
}
