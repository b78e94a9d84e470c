/*!
Coordination store stub with failure injection

Wraps a [`MemoryStore`] so tests can make individual operations fail as if
the database were unreachable, and journals every successful write.
*/

use crate::journal::Journal;
use async_trait::async_trait;
use dax_reader::command::CommandDocument;
use dax_reader::heartbeat::Heartbeat;
use dax_reader::store::{CoordinationStore, DacSnapshot, MemoryStore, StoreError};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct Faults {
    find: AtomicBool,
    acknowledge: AtomicBool,
    heartbeat: AtomicBool,
    dac: AtomicBool,
}

pub struct FlakyStore {
    memory: MemoryStore,
    journal: Journal,
    faults: Faults,
}

impl FlakyStore {
    pub fn new(memory: MemoryStore, journal: Journal) -> Self {
        Self {
            memory,
            journal,
            faults: Faults::default(),
        }
    }

    /// The backing store, for seeding and inspection
    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn fail_find(&self, fail: bool) {
        self.faults.find.store(fail, Ordering::SeqCst);
    }

    pub fn fail_acknowledge(&self, fail: bool) {
        self.faults.acknowledge.store(fail, Ordering::SeqCst);
    }

    pub fn fail_heartbeat(&self, fail: bool) {
        self.faults.heartbeat.store(fail, Ordering::SeqCst);
    }

    pub fn fail_dac(&self, fail: bool) {
        self.faults.dac.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(format!("injected {what} failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CoordinationStore for FlakyStore {
    async fn find_command(&self, host: &str) -> Result<Option<CommandDocument>, StoreError> {
        Self::check(&self.faults.find, "find")?;
        self.memory.find_command(host).await
    }

    async fn acknowledge(&self, command_id: &str, host: &str) -> Result<(), StoreError> {
        Self::check(&self.faults.acknowledge, "acknowledge")?;
        self.memory.acknowledge(command_id, host).await?;
        self.journal.record(format!("store:ack:{command_id}"));
        Ok(())
    }

    async fn publish_heartbeat(&self, heartbeat: &Heartbeat) -> Result<(), StoreError> {
        Self::check(&self.faults.heartbeat, "heartbeat")?;
        self.memory.publish_heartbeat(heartbeat).await
    }

    async fn upsert_dac_snapshot(&self, snapshot: &DacSnapshot) -> Result<(), StoreError> {
        Self::check(&self.faults.dac, "dac snapshot")?;
        self.memory.upsert_dac_snapshot(snapshot).await?;
        self.journal.record(format!("store:dac:{}", snapshot.run));
        Ok(())
    }

    async fn find_options(&self, name: &str) -> Result<Option<Value>, StoreError> {
        self.memory.find_options(name).await
    }
}
