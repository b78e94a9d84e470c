//! In-process coordination store with the same semantics as the MongoDB
//! backend. Used for `memory://` dry runs and by tests.

use super::{CoordinationStore, DacSnapshot, StoreError};
use crate::command::CommandDocument;
use crate::controller::DacValues;
use crate::heartbeat::Heartbeat;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Collections {
    control: Vec<(String, Value)>,
    status: HashMap<String, Heartbeat>,
    heartbeat_writes: usize,
    dac_values: BTreeMap<String, DacValues>,
    options: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a control document, returning its id. An `acknowledged`
    /// list is added if the body has none.
    pub fn insert_command(&self, mut body: Value) -> String {
        if let Some(obj) = body.as_object_mut() {
            obj.entry("acknowledged").or_insert_with(|| json!([]));
        }
        let id = Uuid::new_v4().simple().to_string();
        self.inner.lock().control.push((id.clone(), body));
        id
    }

    /// Insert or replace an options document, keyed by its `name` field
    pub fn insert_options(&self, doc: Value) {
        let name = doc
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.inner.lock().options.insert(name, doc);
    }

    pub fn acknowledgments(&self, command_id: &str) -> Vec<String> {
        self.inner
            .lock()
            .control
            .iter()
            .find(|(id, _)| id == command_id)
            .and_then(|(_, body)| body.get("acknowledged").and_then(Value::as_array).cloned())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    pub fn heartbeat(&self, host: &str) -> Option<Heartbeat> {
        self.inner.lock().status.get(host).cloned()
    }

    pub fn heartbeat_count(&self) -> usize {
        self.inner.lock().status.len()
    }

    /// Total heartbeat writes, including overwrites
    pub fn heartbeat_writes(&self) -> usize {
        self.inner.lock().heartbeat_writes
    }

    pub fn dac_snapshot(&self, run: &str) -> Option<DacValues> {
        self.inner.lock().dac_values.get(run).cloned()
    }

    pub fn dac_snapshot_count(&self) -> usize {
        self.inner.lock().dac_values.len()
    }
}

fn acknowledged_by(body: &Value, host: &str) -> bool {
    body.get("acknowledged")
        .and_then(Value::as_array)
        .map(|acks| acks.iter().any(|a| a.as_str() == Some(host)))
        .unwrap_or(false)
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn find_command(&self, host: &str) -> Result<Option<CommandDocument>, StoreError> {
        let inner = self.inner.lock();
        let found = inner
            .control
            .iter()
            .find(|(_, body)| {
                body.get("host").and_then(Value::as_str) == Some(host) && !acknowledged_by(body, host)
            })
            .map(|(id, body)| CommandDocument::new(id.clone(), body.clone()));
        Ok(found)
    }

    async fn acknowledge(&self, command_id: &str, host: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let (_, body) = inner
            .control
            .iter_mut()
            .find(|(id, _)| id == command_id)
            .ok_or_else(|| StoreError::Malformed(format!("no control document {command_id}")))?;

        if acknowledged_by(body, host) {
            return Ok(());
        }
        let obj = body
            .as_object_mut()
            .ok_or_else(|| StoreError::Malformed(format!("control document {command_id} is not an object")))?;
        match obj.get_mut("acknowledged").and_then(Value::as_array_mut) {
            Some(acks) => acks.push(json!(host)),
            None => {
                obj.insert("acknowledged".into(), json!([host]));
            }
        }
        Ok(())
    }

    async fn publish_heartbeat(&self, heartbeat: &Heartbeat) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.status.insert(heartbeat.host.clone(), heartbeat.clone());
        inner.heartbeat_writes += 1;
        Ok(())
    }

    async fn upsert_dac_snapshot(&self, snapshot: &DacSnapshot) -> Result<(), StoreError> {
        // $set semantics: links in the new snapshot replace stored ones,
        // other links of the same run are kept.
        let mut inner = self.inner.lock();
        inner
            .dac_values
            .entry(snapshot.run.clone())
            .or_default()
            .extend(snapshot.values.iter().map(|(link, values)| (*link, values.clone())));
        Ok(())
    }

    async fn find_options(&self, name: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.inner.lock().options.get(name).cloned())
    }
}
