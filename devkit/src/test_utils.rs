/*!
Test harness for the run-control loop

Wires a [`RunControl`] to a [`FlakyStore`] and a [`MockController`] that
share one [`Journal`], and drives the loop one cycle at a time.
*/

use crate::command_builders::CommandBuilder;
use crate::controller_stub::MockController;
use crate::journal::Journal;
use crate::store_stub::FlakyStore;
use anyhow::Result;
use dax_reader::config::ReaderConfig;
use dax_reader::heartbeat::Heartbeat;
use dax_reader::options::StoreOptionsResolver;
use dax_reader::store::{CoordinationStore, MemoryStore};
use dax_reader::RunControl;
use serde_json::{json, Value};
use std::sync::Arc;

pub const TEST_HOST: &str = "testnode_reader_0";

/// Mode seeded into every harness
pub const TEST_MODE: &str = "test";

pub struct TestHarness {
    pub store: Arc<FlakyStore>,
    pub controller: Arc<MockController>,
    pub journal: Journal,
    run_control: RunControl,
}

impl TestHarness {
    pub fn new() -> Self {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();

        let journal = Journal::new();
        let store = Arc::new(FlakyStore::new(MemoryStore::new(), journal.clone()));
        store.memory().insert_options(json!({"name": TEST_MODE, "run_identifier": "default"}));

        let controller = Arc::new(MockController::new(journal.clone()));
        let shared: Arc<dyn CoordinationStore> = store.clone();
        let resolver = Arc::new(StoreOptionsResolver::new(Arc::clone(&shared)));

        let config = ReaderConfig {
            poll_interval_ms: 0,
            join_warn_secs: 1,
            ..ReaderConfig::default()
        };
        let run_control = RunControl::new(TEST_HOST, config, shared, controller.clone(), resolver);

        Self {
            store,
            controller,
            journal,
            run_control,
        }
    }

    pub fn memory(&self) -> &MemoryStore {
        self.store.memory()
    }

    pub fn run_control(&self) -> &RunControl {
        &self.run_control
    }

    pub fn add_options(&self, doc: Value) {
        self.memory().insert_options(doc);
    }

    /// Queue a command addressed to this reader, returning its id
    pub fn send(&self, command: CommandBuilder) -> String {
        self.memory().insert_command(command.build_for(TEST_HOST))
    }

    pub async fn cycle(&mut self) {
        self.run_control.cycle().await;
    }

    pub async fn send_and_cycle(&mut self, command: CommandBuilder) -> String {
        let id = self.send(command);
        self.cycle().await;
        id
    }

    pub fn heartbeat(&self) -> Option<Heartbeat> {
        self.memory().heartbeat(TEST_HOST)
    }

    pub fn assert_acknowledged(&self, command_id: &str) -> Result<()> {
        let acks = self.memory().acknowledgments(command_id);
        match acks.iter().filter(|a| *a == TEST_HOST).count() {
            1 => Ok(()),
            0 => anyhow::bail!("command {} was never acknowledged", command_id),
            n => anyhow::bail!("command {} acknowledged {} times", command_id, n),
        }
    }

    /// Assert that journal entry `first` was recorded before `second`
    pub fn assert_before(&self, first: &str, second: &str) -> Result<()> {
        let a = self
            .journal
            .position(first)
            .ok_or_else(|| anyhow::anyhow!("'{}' not in journal", first))?;
        let b = self
            .journal
            .position(second)
            .ok_or_else(|| anyhow::anyhow!("'{}' not in journal", second))?;
        if a < b {
            Ok(())
        } else {
            anyhow::bail!("'{}' (#{}) recorded after '{}' (#{})", first, a, second, b)
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
