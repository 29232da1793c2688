use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use crate::clients::store::RedisStore;

/// Site-wide configuration staged in a Redis hash by the producing system.
/// Values arrive as flat strings and are coerced back into typed fields;
/// missing keys fall back to defaults so the worker can start without the
/// producer having written anything yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSettings {
    #[serde(default = "default_company_name")]
    pub company_name: String,

    #[serde(default = "default_site_base_url")]
    pub site_base_url: String,

    #[serde(default = "default_logo_url")]
    pub logo_url: String,

    #[serde(default)]
    pub address: String,

    #[serde(default = "default_url_path_confirm")]
    pub url_path_confirm: String,

    #[serde(default = "default_url_path_cancel")]
    pub url_path_cancel: String,

    #[serde(default = "default_url_path_reschedule")]
    pub url_path_reschedule: String,

    #[serde(default = "default_url_path_contact_form")]
    pub url_path_contact_form: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            company_name: default_company_name(),
            site_base_url: default_site_base_url(),
            logo_url: default_logo_url(),
            address: String::new(),
            url_path_confirm: default_url_path_confirm(),
            url_path_cancel: default_url_path_cancel(),
            url_path_reschedule: default_url_path_reschedule(),
            url_path_contact_form: default_url_path_contact_form(),
        }
    }
}

impl SiteSettings {
    pub async fn load(store: &RedisStore, key: &str) -> Self {
        let raw = store.get_all_hash(key).await;
        if raw.is_empty() {
            warn!(key, "No site settings in store, using defaults");
            return Self::default();
        }
        debug!(key, fields = raw.len(), "Site settings loaded");
        Self::from_flat(raw)
    }

    /// Coerces the flat string hash back into typed settings. Unknown fields
    /// are ignored; a shape mismatch falls back to defaults with a warning.
    pub fn from_flat(raw: HashMap<String, String>) -> Self {
        let mut coerced = Map::new();
        for (key, value) in raw {
            coerced.insert(key, coerce_value(&value));
        }

        match serde_json::from_value(JsonValue::Object(coerced)) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Malformed site settings, using defaults");
                Self::default()
            }
        }
    }

    pub fn site_url(&self) -> &str {
        self.site_base_url.trim_end_matches('/')
    }

    /// The logo as an absolute URL, resolving store-relative paths against
    /// the site base.
    pub fn absolute_logo_url(&self) -> String {
        if self.logo_url.is_empty() {
            return format!("{}/static/img/logo.png", self.site_url());
        }
        if self.logo_url.starts_with("http") {
            return self.logo_url.clone();
        }
        let path = if self.logo_url.starts_with('/') {
            self.logo_url.clone()
        } else {
            format!("/{}", self.logo_url)
        };
        format!("{}{}", self.site_url(), path)
    }

    pub fn contact_form_url(&self) -> String {
        absolute_path_url(self.site_url(), &self.url_path_contact_form)
    }

    pub fn reschedule_url(&self) -> String {
        absolute_path_url(self.site_url(), &self.url_path_reschedule)
    }
}

fn absolute_path_url(site_url: &str, path: &str) -> String {
    if path.is_empty() {
        return "#".to_string();
    }
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    format!("{}{}", site_url, path)
}

fn coerce_value(value: &str) -> JsonValue {
    let lowered = value.to_lowercase();
    if lowered == "true" || lowered == "false" {
        return JsonValue::Bool(lowered == "true");
    }
    if let Ok(n) = value.parse::<i64>() {
        return JsonValue::Number(n.into());
    }
    if value.starts_with('{') || value.starts_with('[') {
        if let Ok(parsed) = serde_json::from_str(value) {
            return parsed;
        }
    }
    JsonValue::String(value.to_string())
}

fn default_company_name() -> String {
    "My Project".to_string()
}

fn default_site_base_url() -> String {
    "http://localhost:8000/".to_string()
}

fn default_logo_url() -> String {
    "/static/img/logo.webp".to_string()
}

fn default_url_path_confirm() -> String {
    "/booking/confirm/{token}/".to_string()
}

fn default_url_path_cancel() -> String {
    "/booking/cancel/{token}/".to_string()
}

fn default_url_path_reschedule() -> String {
    "/booking/reschedule/".to_string()
}

fn default_url_path_contact_form() -> String {
    "/contacts/".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_flat_coerces_and_defaults() {
        let mut raw = HashMap::new();
        raw.insert("company_name".to_string(), "Lily Beauty Salon".to_string());
        raw.insert("site_base_url".to_string(), "https://example.com/".to_string());
        raw.insert("working_hours".to_string(), "Mo-Fr: 09:00 - 18:00".to_string());

        let settings = SiteSettings::from_flat(raw);
        assert_eq!(settings.company_name, "Lily Beauty Salon");
        assert_eq!(settings.site_url(), "https://example.com");
        assert_eq!(settings.url_path_reschedule, "/booking/reschedule/");
    }

    #[test]
    fn logo_url_is_made_absolute() {
        let settings = SiteSettings {
            site_base_url: "https://example.com/".to_string(),
            logo_url: "static/img/logo.webp".to_string(),
            ..SiteSettings::default()
        };
        assert_eq!(
            settings.absolute_logo_url(),
            "https://example.com/static/img/logo.webp"
        );

        let settings = SiteSettings {
            logo_url: "https://cdn.example.com/logo.png".to_string(),
            ..SiteSettings::default()
        };
        assert_eq!(settings.absolute_logo_url(), "https://cdn.example.com/logo.png");
    }
}
