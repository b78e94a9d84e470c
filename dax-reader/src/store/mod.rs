//! Coordination store seam
//!
//! The store is shared by every reader in the cluster and holds:
//! - `control`: command documents addressed to readers
//! - `status`: one heartbeat per reader
//! - `options`: run mode documents
//! - `dac_values`: one DAC snapshot per run identifier
//!
//! `mongodb://` URIs select [`MongoStore`]; `memory://` selects an in-process
//! [`MemoryStore`] for dry runs.

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use crate::command::CommandDocument;
use crate::config::ReaderConfig;
use crate::controller::DacValues;
use crate::heartbeat::Heartbeat;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub const MEMORY_URI: &str = "memory://";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid store URI '{0}'")]
    InvalidUri(String),
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("bson encoding error: {0}")]
    Encode(#[from] mongodb::bson::ser::Error),
}

/// DAC values written during one successful arm, keyed by run identifier
#[derive(Debug, Clone, PartialEq)]
pub struct DacSnapshot {
    pub run: String,
    pub values: DacValues,
}

impl DacSnapshot {
    pub fn new(run: impl Into<String>, values: DacValues) -> Self {
        Self { run: run.into(), values }
    }
}

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// At most one command addressed to `host` that `host` has not acknowledged
    async fn find_command(&self, host: &str) -> Result<Option<CommandDocument>, StoreError>;

    /// Record that `host` has seen the command. Repeating it is harmless.
    async fn acknowledge(&self, command_id: &str, host: &str) -> Result<(), StoreError>;

    /// Replace this host's heartbeat record
    async fn publish_heartbeat(&self, heartbeat: &Heartbeat) -> Result<(), StoreError>;

    /// `$set`-style upsert keyed by run identifier
    async fn upsert_dac_snapshot(&self, snapshot: &DacSnapshot) -> Result<(), StoreError>;

    /// Options document with the given `name`
    async fn find_options(&self, name: &str) -> Result<Option<Value>, StoreError>;
}

/// Open the store named by `uri`
pub async fn connect(uri: &str, config: &ReaderConfig) -> Result<Arc<dyn CoordinationStore>, StoreError> {
    if uri == MEMORY_URI {
        return Ok(Arc::new(MemoryStore::new()));
    }
    if uri.starts_with("mongodb://") || uri.starts_with("mongodb+srv://") {
        let store = MongoStore::connect(uri, config).await?;
        return Ok(Arc::new(store));
    }
    Err(StoreError::InvalidUri(uri.to_string()))
}
