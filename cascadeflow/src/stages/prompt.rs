//! Prompt templates filled from context fields.

use crate::context::Context;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*(?:\|[A-Za-z_][A-Za-z0-9_]*)*)\}")
        .unwrap_or_else(|e| panic!("invalid placeholder pattern: {e}"))
});

/// A prompt with `{field}` placeholders.
///
/// A placeholder may list alternatives, `{docs|fallback_docs}`, in which
/// case the first field with content is used. Absent fields render as the
/// empty string. Arrays render one item per line, taking the `document` or
/// `content` text of object items when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Creates a template.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Returns the raw template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Returns every field name referenced by the template, in order.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        PLACEHOLDER
            .captures_iter(&self.template)
            .filter_map(|c| c.get(1))
            .flat_map(|m| m.as_str().split('|'))
            .collect()
    }

    /// Fills the placeholders from the context.
    #[must_use]
    pub fn render(&self, ctx: &Context) -> String {
        PLACEHOLDER
            .replace_all(&self.template, |caps: &regex::Captures<'_>| {
                let alternatives = caps.get(1).map_or("", |m| m.as_str());
                alternatives
                    .split('|')
                    .find(|field| ctx.has_content(field))
                    .map(|field| render_value(ctx.get(field)))
                    .unwrap_or_default()
            })
            .into_owned()
    }
}

impl From<&str> for PromptTemplate {
    fn from(template: &str) -> Self {
        Self::new(template)
    }
}

impl From<String> for PromptTemplate {
    fn from(template: String) -> Self {
        Self::new(template)
    }
}

/// Renders a JSON value as prompt text.
#[must_use]
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(render_item).collect::<Vec<_>>().join("\n"),
        other => other.to_string(),
    }
}

pub(crate) fn render_item(item: &Value) -> String {
    match item {
        Value::Object(map) => ["document", "content"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map_or_else(|| item.to_string(), str::to_string),
        other => render_value(other),
    }
}
