//! Board-less controller used for dry runs of the agent.

use super::{ControllerError, DacValues, Electronics, HardwareController, LinkId, RunState};
use crate::options::RunOptions;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

const READ_PERIOD: Duration = Duration::from_millis(50);
const BYTES_PER_READ: u64 = 64 * 1024;
const CHANNELS_PER_BOARD: usize = 8;

/// Simulated controller.
///
/// Links come from the `links` option (default `[0]`), DAC values from
/// `dac_baseline` (default 16000) on every channel.
pub struct SimulatedController {
    state: Mutex<RunState>,
    run_mode: Mutex<String>,
    reading: AtomicBool,
    bytes_read: AtomicU64,
    buffered: AtomicU64,
}

impl SimulatedController {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RunState::Idle),
            run_mode: Mutex::new(String::new()),
            reading: AtomicBool::new(false),
            bytes_read: AtomicU64::new(0),
            buffered: AtomicU64::new(0),
        }
    }

    fn links_from(options: &RunOptions) -> Vec<LinkId> {
        options
            .get("links")
            .and_then(|v| v.as_array())
            .map(|links| {
                links
                    .iter()
                    .filter_map(|l| l.as_i64())
                    .filter_map(|l| LinkId::try_from(l).ok())
                    .collect()
            })
            .unwrap_or_else(|| vec![0])
    }
}

impl Default for SimulatedController {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareController for SimulatedController {
    fn status(&self) -> RunState {
        *self.state.lock()
    }

    fn initialize_electronics(&self, options: &RunOptions) -> Result<Electronics, ControllerError> {
        *self.state.lock() = RunState::Arming;

        let links = Self::links_from(options);
        if links.is_empty() {
            *self.state.lock() = RunState::Idle;
            return Err(ControllerError::Initialization("no links configured".into()));
        }

        let baseline = options.get_int("dac_baseline", 16000);
        let baseline = u16::try_from(baseline)
            .map_err(|_| ControllerError::Initialization(format!("dac_baseline {baseline} out of range")))?;

        let dacs: DacValues = links
            .iter()
            .map(|&link| (link, vec![baseline; CHANNELS_PER_BOARD]))
            .collect();

        *self.run_mode.lock() = options.mode().to_string();
        self.reading.store(true, Ordering::SeqCst);
        *self.state.lock() = RunState::Armed;

        info!("Simulated electronics armed on {} links", links.len());
        Ok(Electronics { links, dacs })
    }

    fn start(&self) -> Result<(), ControllerError> {
        let mut state = self.state.lock();
        if *state == RunState::Armed {
            *state = RunState::Running;
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), ControllerError> {
        self.reading.store(false, Ordering::SeqCst);
        *self.state.lock() = RunState::Idle;
        Ok(())
    }

    fn end(&self) -> Result<(), ControllerError> {
        self.reading.store(false, Ordering::SeqCst);
        self.buffered.store(0, Ordering::Relaxed);
        self.run_mode.lock().clear();
        *self.state.lock() = RunState::Idle;
        Ok(())
    }

    fn check_errors(&self) -> Result<(), ControllerError> {
        Ok(())
    }

    fn data_size(&self) -> u64 {
        self.bytes_read.swap(0, Ordering::Relaxed)
    }

    fn buffer_length(&self) -> u64 {
        self.buffered.load(Ordering::Relaxed)
    }

    fn run_mode(&self) -> String {
        self.run_mode.lock().clone()
    }

    fn read_link(&self, link: LinkId) -> Result<(), ControllerError> {
        debug!("Simulated readout started on link {}", link);
        while self.reading.load(Ordering::SeqCst) {
            // Data only flows while running; armed links idle.
            if self.status() == RunState::Running {
                self.bytes_read.fetch_add(BYTES_PER_READ, Ordering::Relaxed);
                self.buffered.store(BYTES_PER_READ, Ordering::Relaxed);
            }
            std::thread::sleep(READ_PERIOD);
        }
        debug!("Simulated readout finished on link {}", link);
        Ok(())
    }
}
