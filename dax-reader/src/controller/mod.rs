//! Hardware controller seam
//!
//! The controller owns the board drivers and the run-state machine. The
//! run-control loop only reads its state and requests transitions through
//! `start`, `stop`, `end` and `initialize_electronics`.

mod simulated;

pub use simulated::SimulatedController;

use crate::options::RunOptions;
use serde::Serialize;
use std::collections::BTreeMap;

/// Identifier of one physical optical link
pub type LinkId = i32;

/// DAC register values written per link during initialization
pub type DacValues = BTreeMap<LinkId, Vec<u16>>;

/// Run state as reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Arming,
    Armed,
    Running,
    Error,
}

impl RunState {
    pub fn ordinal(self) -> i32 {
        match self {
            RunState::Idle => 0,
            RunState::Arming => 1,
            RunState::Armed => 2,
            RunState::Running => 3,
            RunState::Error => 4,
        }
    }

    pub fn from_ordinal(value: i32) -> Self {
        match value {
            0 => RunState::Idle,
            1 => RunState::Arming,
            2 => RunState::Armed,
            3 => RunState::Running,
            _ => RunState::Error,
        }
    }

    /// Arming is only allowed from idle, arming or armed
    pub fn can_arm(self) -> bool {
        matches!(self, RunState::Idle | RunState::Arming | RunState::Armed)
    }
}

/// Result of a successful electronics initialization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Electronics {
    pub links: Vec<LinkId>,
    pub dacs: DacValues,
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("electronics initialization failed: {0}")]
    Initialization(String),
    #[error("readout on link {link} failed: {reason}")]
    Readout { link: LinkId, reason: String },
    #[error("board error: {0}")]
    Board(String),
}

/// Board driver contract.
///
/// Implementations must tolerate `status`, `data_size` and friends being
/// called from the control thread while readout threads sit in `read_link`.
pub trait HardwareController: Send + Sync + 'static {
    fn status(&self) -> RunState;

    /// Program the boards for a run. Blocks until done.
    fn initialize_electronics(&self, options: &RunOptions) -> Result<Electronics, ControllerError>;

    fn start(&self) -> Result<(), ControllerError>;

    /// Signal readout loops to return. Must precede joining readout threads.
    fn stop(&self) -> Result<(), ControllerError>;

    /// Release resources held for the current configuration
    fn end(&self) -> Result<(), ControllerError>;

    fn check_errors(&self) -> Result<(), ControllerError>;

    /// Bytes read since the previous call
    fn data_size(&self) -> u64;

    fn buffer_length(&self) -> u64;

    fn run_mode(&self) -> String;

    /// Blocking readout loop for one link; returns once `stop` is signalled.
    fn read_link(&self, link: LinkId) -> Result<(), ControllerError>;
}
