use super::{CoordinationStore, DacSnapshot, StoreError};
use crate::command::CommandDocument;
use crate::config::ReaderConfig;
use crate::heartbeat::Heartbeat;
use async_trait::async_trait;
use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::options::{ReplaceOptions, UpdateOptions};
use mongodb::{Client, Collection};
use serde_json::Value;
use tracing::info;

/// MongoDB-backed coordination store
pub struct MongoStore {
    control: Collection<Document>,
    status: Collection<Document>,
    options: Collection<Document>,
    dac_values: Collection<Document>,
}

impl MongoStore {
    /// Parses the URI and prepares collection handles. The driver connects
    /// lazily, so an unreachable server only surfaces on the first operation.
    pub async fn connect(uri: &str, config: &ReaderConfig) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;
        let db = client.database(&config.database);
        let names = &config.collections;
        info!("Using coordination database '{}'", config.database);

        Ok(Self {
            control: db.collection(&names.control),
            status: db.collection(&names.status),
            options: db.collection(&names.options),
            dac_values: db.collection(&names.dac_values),
        })
    }
}

/// Control documents normally carry ObjectIds or strings. Any other `_id`
/// travels as canonical extended JSON so it can still be acknowledged.
fn command_id(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.clone().into_canonical_extjson().to_string(),
    }
}

fn id_filter(command_id: &str) -> Document {
    if let Ok(oid) = ObjectId::parse_str(command_id) {
        return doc! { "_id": oid };
    }
    match encoded_id(command_id) {
        Some(raw) => doc! { "_id": { "$in": [command_id, raw] } },
        None => doc! { "_id": command_id },
    }
}

fn encoded_id(command_id: &str) -> Option<Bson> {
    let structured = command_id.starts_with('{') || matches!(command_id, "true" | "false" | "null");
    if !structured {
        return None;
    }
    let value: Value = serde_json::from_str(command_id).ok()?;
    Bson::try_from(value).ok()
}

fn into_json(mut document: Document) -> Value {
    document.remove("_id");
    Bson::Document(document).into_relaxed_extjson()
}

fn dac_update(snapshot: &DacSnapshot) -> Document {
    let mut fields = doc! { "run": snapshot.run.as_str() };
    for (link, values) in &snapshot.values {
        let values: Vec<Bson> = values.iter().map(|v| Bson::Int32(i32::from(*v))).collect();
        fields.insert(link.to_string(), values);
    }
    doc! { "$set": fields }
}

#[async_trait]
impl CoordinationStore for MongoStore {
    async fn find_command(&self, host: &str) -> Result<Option<CommandDocument>, StoreError> {
        let filter = doc! { "host": host, "acknowledged": { "$ne": host } };
        let Some(document) = self.control.find_one(filter, None).await? else {
            return Ok(None);
        };

        let id = document
            .get("_id")
            .map(command_id)
            .ok_or_else(|| StoreError::Malformed("control document without _id".into()))?;
        Ok(Some(CommandDocument::new(id, into_json(document))))
    }

    async fn acknowledge(&self, command_id: &str, host: &str) -> Result<(), StoreError> {
        let update = doc! { "$addToSet": { "acknowledged": host } };
        self.control.update_one(id_filter(command_id), update, None).await?;
        Ok(())
    }

    async fn publish_heartbeat(&self, heartbeat: &Heartbeat) -> Result<(), StoreError> {
        let record = mongodb::bson::to_document(heartbeat)?;
        let options = ReplaceOptions::builder().upsert(true).build();
        self.status
            .replace_one(doc! { "host": heartbeat.host.as_str() }, record, options)
            .await?;
        Ok(())
    }

    async fn upsert_dac_snapshot(&self, snapshot: &DacSnapshot) -> Result<(), StoreError> {
        let options = UpdateOptions::builder().upsert(true).build();
        self.dac_values
            .update_one(doc! { "run": snapshot.run.as_str() }, dac_update(snapshot), options)
            .await?;
        Ok(())
    }

    async fn find_options(&self, name: &str) -> Result<Option<Value>, StoreError> {
        let found = self.options.find_one(doc! { "name": name }, None).await?;
        Ok(found.map(into_json))
    }
}
