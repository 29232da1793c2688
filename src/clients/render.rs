use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Error, Result, anyhow};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

/// File-backed template rendering: `{{variable}}` placeholders substituted
/// from a flat context. Rendering is best-effort; a placeholder with no
/// context value is logged and stripped, so a cosmetic gap never drops a
/// notification and raw `{{var}}` text never reaches a recipient.
pub struct TemplateRenderer {
    templates_dir: PathBuf,
}

impl TemplateRenderer {
    pub fn new(templates_dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let templates_dir = templates_dir.into();
        if !templates_dir.is_dir() {
            return Err(anyhow!(
                "Templates directory not found: {}",
                templates_dir.display()
            ));
        }

        info!(dir = %templates_dir.display(), "Template renderer initialized");
        Ok(Self { templates_dir })
    }

    pub fn render(
        &self,
        template_name: &str,
        context: &HashMap<String, JsonValue>,
    ) -> Result<String, Error> {
        let path = self.templates_dir.join(template_name);
        let raw = fs::read_to_string(&path)
            .map_err(|e| anyhow!("Failed to read template {}: {}", path.display(), e))?;

        debug!(template_name, variables = context.len(), "Rendering template");
        Ok(replace_variables(&raw, context))
    }
}

fn replace_variables(template: &str, context: &HashMap<String, JsonValue>) -> String {
    let mut result = template.to_string();

    for (key, value) in context {
        let placeholder = format!("{{{{{}}}}}", key);
        let replacement = match value {
            JsonValue::String(s) => s.clone(),
            JsonValue::Number(n) => n.to_string(),
            JsonValue::Bool(b) => b.to_string(),
            JsonValue::Null => String::new(),
            other => other.to_string(),
        };
        result = result.replace(&placeholder, &replacement);
    }

    // Optional fields the payload never carried render empty, as a template
    // engine would treat an undefined variable.
    while let Some(start) = result.find("{{") {
        let Some(end) = result[start..].find("}}") else {
            break;
        };
        let missing = result[start..start + end + 2].to_string();
        warn!(placeholder = %missing, "Template variable missing from context, stripping");
        result.replace_range(start..start + end + 2, "");
    }

    result
}
