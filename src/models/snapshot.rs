use serde_json::Value as JsonValue;

/// The payload snapshot the producer caches under
/// `notifications:cache:{appointment_id}` before emitting the business event.
///
/// The blob is produced by another system, so extraction is lenient: missing
/// fields become `None` and numeric values are accepted where the producer
/// sometimes writes numbers instead of strings.
#[derive(Debug, Clone, Default)]
pub struct AppointmentSnapshot {
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub datetime: Option<String>,
    pub first_name: Option<String>,
}

impl AppointmentSnapshot {
    pub fn from_json(value: &JsonValue) -> Self {
        Self {
            client_email: scalar_field(value, "client_email"),
            client_phone: scalar_field(value, "client_phone"),
            datetime: scalar_field(value, "datetime"),
            first_name: scalar_field(value, "first_name"),
        }
    }

    /// A usable recipient address is present and not the producer's
    /// "unspecified" placeholder.
    pub fn usable_email(&self) -> Option<&str> {
        let email = self.client_email.as_deref()?;
        let trimmed = email.trim();
        if trimmed.is_empty() || trimmed.to_lowercase() == "не указан" {
            return None;
        }
        Some(trimmed)
    }

    pub fn usable_phone(&self) -> Option<&str> {
        let phone = self.client_phone.as_deref()?;
        let trimmed = phone.trim();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    }
}

fn scalar_field(value: &JsonValue, key: &str) -> Option<String> {
    match value.get(key)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
