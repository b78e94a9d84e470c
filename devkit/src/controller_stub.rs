/*!
Mock hardware controller

Behaves like a well-mannered board driver without any boards:
- `initialize_electronics` returns the configured links and DAC values, or
  fails once when asked to
- `read_link` blocks until `stop` is signalled
- every call is recorded, both locally and in the shared [`Journal`]

Readout threads are counted so tests can check that two generations of
workers never overlap.
*/

use crate::journal::Journal;
use dax_reader::controller::{ControllerError, DacValues, Electronics, HardwareController, LinkId, RunState};
use dax_reader::options::RunOptions;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerCall {
    Initialize(String),
    Start,
    Stop,
    End,
    CheckErrors,
}

pub struct MockController {
    state: Mutex<RunState>,
    pinned_state: Mutex<Option<RunState>>,
    links: Mutex<Vec<LinkId>>,
    run_mode: Mutex<String>,
    calls: Mutex<Vec<ControllerCall>>,
    journal: Journal,
    fail_next_init: AtomicBool,
    stopped: Mutex<bool>,
    stop_signal: Condvar,
    generation: AtomicUsize,
    live_generations: Mutex<Vec<usize>>,
    generations_overlapped: AtomicBool,
    readers_at_initialize: Mutex<Vec<usize>>,
    data_size: AtomicUsize,
    buffer_length: AtomicUsize,
}

impl MockController {
    pub fn new(journal: Journal) -> Self {
        Self {
            state: Mutex::new(RunState::Idle),
            pinned_state: Mutex::new(None),
            links: Mutex::new(vec![0, 1]),
            run_mode: Mutex::new(String::new()),
            calls: Mutex::new(Vec::new()),
            journal,
            fail_next_init: AtomicBool::new(false),
            stopped: Mutex::new(false),
            stop_signal: Condvar::new(),
            generation: AtomicUsize::new(0),
            live_generations: Mutex::new(Vec::new()),
            generations_overlapped: AtomicBool::new(false),
            readers_at_initialize: Mutex::new(Vec::new()),
            data_size: AtomicUsize::new(0),
            buffer_length: AtomicUsize::new(0),
        }
    }

    /// Links returned by the next successful initialization
    pub fn set_links(&self, links: Vec<LinkId>) {
        *self.links.lock() = links;
    }

    pub fn fail_next_initialize(&self) {
        self.fail_next_init.store(true, Ordering::SeqCst);
    }

    /// Report `state` from `status()` regardless of transitions, until unpinned
    pub fn pin_state(&self, state: Option<RunState>) {
        *self.pinned_state.lock() = state;
    }

    /// Bytes reported by the next `data_size()` call
    pub fn set_data_size(&self, bytes: usize) {
        self.data_size.store(bytes, Ordering::SeqCst);
    }

    /// Bytes buffered but not yet written, as seen by every heartbeat
    pub fn set_buffer_length(&self, bytes: usize) {
        self.buffer_length.store(bytes, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ControllerCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &ControllerCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Readout threads currently inside `read_link`
    pub fn live_readers(&self) -> usize {
        self.live_generations.lock().len()
    }

    /// True if a reader ever entered while a reader from an earlier arm was still live
    pub fn generations_overlapped(&self) -> bool {
        self.generations_overlapped.load(Ordering::SeqCst)
    }

    /// Live readers observed at each `initialize_electronics` call
    pub fn readers_at_initialize(&self) -> Vec<usize> {
        self.readers_at_initialize.lock().clone()
    }

    /// DAC values handed out for a link
    pub fn dac_values_for(generation: usize, link: LinkId) -> Vec<u16> {
        let base = 1000 * generation as u16 + link as u16;
        vec![base, base + 1, base + 2]
    }

    fn record(&self, call: ControllerCall, entry: &str) {
        self.calls.lock().push(call);
        self.journal.record(entry);
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock() = state;
    }
}

impl HardwareController for MockController {
    fn status(&self) -> RunState {
        match *self.pinned_state.lock() {
            Some(state) => state,
            None => *self.state.lock(),
        }
    }

    fn initialize_electronics(&self, options: &RunOptions) -> Result<Electronics, ControllerError> {
        self.record(ControllerCall::Initialize(options.mode().to_string()), "controller:initialize");
        self.readers_at_initialize.lock().push(self.live_readers());
        self.set_state(RunState::Arming);

        if self.fail_next_init.swap(false, Ordering::SeqCst) {
            return Err(ControllerError::Initialization("injected failure".into()));
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let links = self.links.lock().clone();
        let dacs: DacValues = links
            .iter()
            .map(|&link| (link, Self::dac_values_for(generation, link)))
            .collect();

        *self.stopped.lock() = false;
        *self.run_mode.lock() = options.mode().to_string();
        self.set_state(RunState::Armed);
        Ok(Electronics { links, dacs })
    }

    fn start(&self) -> Result<(), ControllerError> {
        self.record(ControllerCall::Start, "controller:start");
        let mut state = self.state.lock();
        if *state == RunState::Armed {
            *state = RunState::Running;
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), ControllerError> {
        self.record(ControllerCall::Stop, "controller:stop");
        *self.stopped.lock() = true;
        self.stop_signal.notify_all();
        self.set_state(RunState::Idle);
        Ok(())
    }

    fn end(&self) -> Result<(), ControllerError> {
        self.record(ControllerCall::End, "controller:end");
        self.run_mode.lock().clear();
        self.set_state(RunState::Idle);
        Ok(())
    }

    fn check_errors(&self) -> Result<(), ControllerError> {
        self.calls.lock().push(ControllerCall::CheckErrors);
        Ok(())
    }

    fn data_size(&self) -> u64 {
        self.data_size.swap(0, Ordering::SeqCst) as u64
    }

    fn buffer_length(&self) -> u64 {
        self.buffer_length.load(Ordering::SeqCst) as u64
    }

    fn run_mode(&self) -> String {
        self.run_mode.lock().clone()
    }

    fn read_link(&self, link: LinkId) -> Result<(), ControllerError> {
        let generation = self.generation.load(Ordering::SeqCst);
        {
            let mut live = self.live_generations.lock();
            if live.iter().any(|g| *g != generation) {
                self.generations_overlapped.store(true, Ordering::SeqCst);
            }
            live.push(generation);
        }
        self.journal.record(format!("reader:enter:{link}"));

        let mut stopped = self.stopped.lock();
        while !*stopped {
            self.stop_signal.wait(&mut stopped);
        }
        drop(stopped);

        {
            let mut live = self.live_generations.lock();
            if let Some(pos) = live.iter().position(|g| *g == generation) {
                live.remove(pos);
            }
        }
        self.journal.record(format!("reader:exit:{link}"));
        Ok(())
    }
}
