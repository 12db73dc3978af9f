//! The field bag threaded through a pipeline run.

use super::RunIdentity;
use crate::errors::DataConflictError;
use serde::de::DeserializeOwned;
use std::collections::HashSet;

/// Reserved field holding the final answer of a run.
pub const ANSWER_KEY: &str = "answer";

static EMPTY: serde_json::Value = serde_json::Value::Null;

/// Ordered mapping of named fields to JSON values.
///
/// Within one run each field is written at most once; writing it again
/// returns a `DataConflictError`. Reading an absent field yields
/// `Value::Null` rather than an error.
#[derive(Debug, Clone, Default)]
pub struct Context {
    fields: serde_json::Map<String, serde_json::Value>,
    written: HashSet<String>,
    identity: RunIdentity,
}

impl Context {
    /// Creates a new empty context with a fresh run identity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fields: serde_json::Map::new(),
            written: HashSet::new(),
            identity: RunIdentity::new(),
        }
    }

    /// Creates a context from existing fields.
    ///
    /// The supplied fields count as written for this run.
    #[must_use]
    pub fn from_fields(fields: serde_json::Map<String, serde_json::Value>) -> Self {
        let written = fields.keys().cloned().collect();
        Self {
            fields,
            written,
            identity: RunIdentity::new(),
        }
    }

    /// Adds an initial field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        let key = key.into();
        self.written.insert(key.clone());
        self.fields.insert(key, value.into());
        self
    }

    /// Sets the run identity.
    #[must_use]
    pub fn with_identity(mut self, identity: RunIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Returns the run identity.
    #[must_use]
    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Gets a field, or `Value::Null` if absent.
    #[must_use]
    pub fn get(&self, key: &str) -> &serde_json::Value {
        self.fields.get(key).unwrap_or(&EMPTY)
    }

    /// Gets a string field, or `""` if absent or not a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> &str {
        self.get(key).as_str().unwrap_or_default()
    }

    /// Gets an array field, or an empty slice if absent or not an array.
    #[must_use]
    pub fn get_array(&self, key: &str) -> &[serde_json::Value] {
        self.get(key).as_array().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Deserializes a field into `T`.
    ///
    /// Returns `None` if the field is absent or has a different shape.
    #[must_use]
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.fields
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Checks whether a field is present (even if null).
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Checks whether a field holds something worth reasoning about.
    ///
    /// Null, empty strings, empty arrays and empty objects count as empty.
    #[must_use]
    pub fn has_content(&self, key: &str) -> bool {
        match self.get(key) {
            serde_json::Value::Null => false,
            serde_json::Value::String(s) => !s.trim().is_empty(),
            serde_json::Value::Array(a) => !a.is_empty(),
            serde_json::Value::Object(o) => !o.is_empty(),
            _ => true,
        }
    }

    /// Writes a field.
    ///
    /// # Errors
    ///
    /// Returns `DataConflictError` if the field was already written in this run.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Result<(), DataConflictError> {
        let key = key.into();
        if self.written.contains(&key) {
            return Err(DataConflictError::new(key));
        }
        self.written.insert(key.clone());
        self.fields.insert(key, value.into());
        Ok(())
    }

    /// Writes a field the caller owns, overwriting a value left by an earlier run.
    pub fn set_owned(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        let key = key.into();
        self.written.insert(key.clone());
        self.fields.insert(key, value.into());
    }

    /// Starts a new run on the same field values.
    ///
    /// Fields are kept; the write-once tracking and identity are reset.
    pub fn reset_run(&mut self) {
        self.written.clear();
        self.identity = RunIdentity::new();
    }

    /// Returns the final answer, if one was written.
    #[must_use]
    pub fn answer(&self) -> Option<&serde_json::Value> {
        self.fields.get(ANSWER_KEY)
    }

    /// Returns field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the fields as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(self.fields.clone())
    }

    /// Consumes the context, returning its fields.
    #[must_use]
    pub fn into_fields(self) -> serde_json::Map<String, serde_json::Value> {
        self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get() {
        let mut ctx = Context::new();
        ctx.set("query", "fd rates").unwrap();

        assert_eq!(ctx.get("query"), &json!("fd rates"));
        assert_eq!(ctx.get_str("query"), "fd rates");
        assert!(ctx.contains_key("query"));
    }

    #[test]
    fn test_absent_field_is_null() {
        let ctx = Context::new();
        assert!(ctx.get("missing").is_null());
        assert_eq!(ctx.get_str("missing"), "");
        assert!(ctx.get_array("missing").is_empty());
        assert!(!ctx.has_content("missing"));
    }

    #[test]
    fn test_write_once_per_run() {
        let mut ctx = Context::new();
        ctx.set("docs", json!([1])).unwrap();

        let err = ctx.set("docs", json!([2])).unwrap_err();
        assert_eq!(err.key, "docs");
        assert_eq!(ctx.get("docs"), &json!([1]));
    }

    #[test]
    fn test_initial_fields_are_protected() {
        let mut ctx = Context::new().with_field("input", "topic");
        assert!(ctx.set("input", "other").is_err());
    }

    #[test]
    fn test_reset_run_allows_rewrite() {
        let mut ctx = Context::new();
        ctx.set("history", json!([])).unwrap();
        let first_run = ctx.identity().run_id;

        ctx.reset_run();
        ctx.set("history", json!(["hi"])).unwrap();

        assert_eq!(ctx.get("history"), &json!(["hi"]));
        assert_ne!(ctx.identity().run_id, first_run);
    }

    #[test]
    fn test_set_owned_overwrites() {
        let mut ctx = Context::new();
        ctx.set("session", 1).unwrap();
        ctx.set_owned("session", 2);
        assert_eq!(ctx.get("session"), &json!(2));
    }

    #[test]
    fn test_has_content() {
        let mut ctx = Context::new();
        ctx.set("empty_list", json!([])).unwrap();
        ctx.set("blank", "  ").unwrap();
        ctx.set("empty_obj", json!({})).unwrap();
        ctx.set("zero", 0).unwrap();
        ctx.set("docs", json!(["a"])).unwrap();

        assert!(!ctx.has_content("empty_list"));
        assert!(!ctx.has_content("blank"));
        assert!(!ctx.has_content("empty_obj"));
        assert!(ctx.has_content("zero"));
        assert!(ctx.has_content("docs"));
    }

    #[test]
    fn test_insertion_order_preserved() {
        let ctx = Context::new()
            .with_field("z", 1)
            .with_field("a", 2)
            .with_field("m", 3);

        let keys: Vec<_> = ctx.keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_get_as() {
        let ctx = Context::new().with_field("k", 5);
        assert_eq!(ctx.get_as::<u32>("k"), Some(5));
        assert_eq!(ctx.get_as::<String>("k"), None);
        assert_eq!(ctx.get_as::<u32>("missing"), None);
    }
}
