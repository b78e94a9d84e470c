//! Run options resolution
//!
//! A run mode names a document in the `options` collection. The document may
//! pull in other documents through an `includes` list; the per-run override
//! from the arm command is merged last.

use crate::store::{CoordinationStore, StoreError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Deepest `includes` chain followed before giving up
const MAX_INCLUDE_DEPTH: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("no options document for mode '{0}'")]
    UnknownMode(String),
    #[error("include chain too deep or cyclic at '{0}'")]
    IncludeDepth(String),
    #[error("invalid override document: {0}")]
    InvalidOverride(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Fully resolved configuration for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    mode: String,
    doc: Value,
}

impl RunOptions {
    pub fn new(mode: impl Into<String>, doc: Value) -> Self {
        Self { mode: mode.into(), doc }
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.doc.get(key)
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(Value::as_i64).unwrap_or(default)
    }

    pub fn as_json(&self) -> &Value {
        &self.doc
    }
}

/// Turns a mode name plus an optional override into [`RunOptions`]
#[async_trait]
pub trait OptionsResolver: Send + Sync {
    /// `override_json` is the serialized `options_override` sub-document
    async fn resolve(&self, mode: &str, override_json: Option<&str>) -> Result<RunOptions, OptionsError>;
}

/// Resolver reading mode documents from the coordination store
pub struct StoreOptionsResolver {
    store: Arc<dyn CoordinationStore>,
}

impl StoreOptionsResolver {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    async fn load_with_includes(&self, name: &str) -> Result<Value, OptionsError> {
        // Iterative expansion: each entry is (document name, depth).
        let mut merged = Value::Object(Map::new());
        let mut pending = vec![(name.to_string(), 0usize)];
        let mut ordered = Vec::new();

        while let Some((current, depth)) = pending.pop() {
            if depth > MAX_INCLUDE_DEPTH {
                return Err(OptionsError::IncludeDepth(current));
            }
            let mut doc = self
                .store
                .find_options(&current)
                .await?
                .ok_or_else(|| OptionsError::UnknownMode(current.clone()))?;

            let includes: Vec<String> = doc
                .as_object_mut()
                .and_then(|obj| obj.remove("includes"))
                .and_then(|v| v.as_array().cloned())
                .unwrap_or_default()
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();

            // Included documents are merged before the including one;
            // later entries win over earlier ones.
            for include in includes {
                pending.push((include, depth + 1));
            }
            ordered.push(doc);
        }

        for doc in ordered.into_iter().rev() {
            merge(&mut merged, doc);
        }
        Ok(merged)
    }
}

#[async_trait]
impl OptionsResolver for StoreOptionsResolver {
    async fn resolve(&self, mode: &str, override_json: Option<&str>) -> Result<RunOptions, OptionsError> {
        let mut doc = self.load_with_includes(mode).await?;
        if let Some(json) = override_json {
            let overlay: Value = serde_json::from_str(json)?;
            debug!("Applying options override to mode {}", mode);
            merge(&mut doc, overlay);
        }
        if let Some(obj) = doc.as_object_mut() {
            obj.remove("name");
        }
        Ok(RunOptions::new(mode, doc))
    }
}

/// Recursively merge `overlay` into `base`. Objects merge key by key,
/// everything else is replaced.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
