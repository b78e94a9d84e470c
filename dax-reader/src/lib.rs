//! DAX Reader - run-control agent for digitizer readout nodes
//!
//! Each readout node runs one agent which:
//! - Polls the coordination store for commands addressed to this node
//! - Drives the controller's run-state machine (idle, arming, armed, running)
//! - Supervises one readout thread per hardware link
//! - Publishes a heartbeat and persists DAC snapshots

pub mod command;
pub mod config;
pub mod controller;
pub mod heartbeat;
pub mod identity;
pub mod options;
pub mod readout;
pub mod run_control;
pub mod store;

pub use command::{Command, CommandDocument, CommandError};
pub use config::ReaderConfig;
pub use controller::{ControllerError, DacValues, Electronics, HardwareController, LinkId, RunState};
pub use heartbeat::Heartbeat;
pub use options::{OptionsError, OptionsResolver, RunOptions, StoreOptionsResolver};
pub use readout::ReadoutPool;
pub use run_control::RunControl;
pub use store::{CoordinationStore, DacSnapshot, MemoryStore, StoreError};
