//! Run-control loop
//!
//! Every cycle:
//! 1. Fetch at most one unacknowledged command addressed to this reader
//! 2. Acknowledge it, then dispatch `start`, `stop` or `arm`
//! 3. Check controller errors and publish a heartbeat
//! 4. Sleep for the poll interval
//!
//! Transitions are gated on the state the controller reports, never on
//! what this loop last asked for. Nothing in here terminates the process:
//! every failing boundary call is logged and the loop carries on.

use crate::command::{Command, CommandDocument, MALFORMED_RUN, NO_RUN};
use crate::config::ReaderConfig;
use crate::controller::{Electronics, HardwareController, RunState};
use crate::heartbeat::Heartbeat;
use crate::options::{OptionsResolver, RunOptions};
use crate::readout::ReadoutPool;
use crate::store::{CoordinationStore, DacSnapshot};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Log a failed boundary call and carry on without its result
fn attempt<T, E: Display>(what: &str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{} failed: {}", what, e);
            None
        }
    }
}

pub struct RunControl {
    host: String,
    config: ReaderConfig,
    store: Arc<dyn CoordinationStore>,
    controller: Arc<dyn HardwareController>,
    resolver: Arc<dyn OptionsResolver>,
    options: Option<RunOptions>,
    readout: ReadoutPool,
    current_run_id: String,
}

impl RunControl {
    pub fn new(
        host: impl Into<String>,
        config: ReaderConfig,
        store: Arc<dyn CoordinationStore>,
        controller: Arc<dyn HardwareController>,
        resolver: Arc<dyn OptionsResolver>,
    ) -> Self {
        let readout = ReadoutPool::new(config.join_warn_interval());
        Self {
            host: host.into(),
            config,
            store,
            controller,
            resolver,
            options: None,
            readout,
            current_run_id: NO_RUN.to_string(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn current_run_id(&self) -> &str {
        &self.current_run_id
    }

    pub fn readout(&self) -> &ReadoutPool {
        &self.readout
    }

    /// Options resolved by the last successful arm
    pub fn options(&self) -> Option<&RunOptions> {
        self.options.as_ref()
    }

    /// Poll forever
    pub async fn run(&mut self) {
        info!("Reader starting with ID: {}", self.host);
        let span = info_span!("reader", host = %self.host);
        loop {
            self.cycle().instrument(span.clone()).await;
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    /// One poll/dispatch/heartbeat pass, without the trailing sleep
    pub async fn cycle(&mut self) {
        if let Some(doc) = self.poll_command().await {
            self.handle_document(&doc).await;
        }
        self.publish_heartbeat().await;
    }

    async fn poll_command(&self) -> Option<CommandDocument> {
        match self.store.find_command(&self.host).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Can't reach the store for commands, continuing with current state: {}", e);
                None
            }
        }
    }

    /// Acknowledge first, then dispatch. A document whose acknowledgment
    /// could not be written is left pending and not applied this cycle.
    pub async fn handle_document(&mut self, doc: &CommandDocument) {
        debug!("Found control document {}", doc.id);
        if let Err(e) = self.store.acknowledge(&doc.id, &self.host).await {
            warn!("Acknowledging command {} failed, deferring it: {}", doc.id, e);
            return;
        }

        match doc.command() {
            Ok(command) => {
                info!("Processing {} command", command);
                self.dispatch(command, doc).await;
            }
            Err(e) => warn!("Received malformed command ({}): {}", e, doc.body),
        }
    }

    async fn dispatch(&mut self, command: Command, doc: &CommandDocument) {
        match command {
            Command::Start => self.start(doc),
            Command::Stop => self.stop(doc).await,
            Command::Arm => self.arm(doc).await,
        }
    }

    fn log_user(&self, command: Command, doc: &CommandDocument) {
        match doc.user() {
            Ok(user) => info!("Received {} command from user {}", command, user),
            Err(e) => warn!("{} command without a usable user: {}", command, e),
        }
    }

    fn start(&mut self, doc: &CommandDocument) {
        let state = self.controller.status();
        if state != RunState::Armed {
            debug!("Cannot start DAQ since not in ARMED state (state {:?})", state);
            return;
        }

        attempt("Controller start", self.controller.start());
        self.current_run_id = doc.run_identifier();
        if self.current_run_id == MALFORMED_RUN {
            warn!("Start command carries no usable run_identifier: {}", doc.body);
        }
        self.log_user(Command::Start, doc);
    }

    /// Universal reset; valid in any state.
    async fn stop(&mut self, doc: &CommandDocument) {
        self.log_user(Command::Stop, doc);
        attempt("Controller stop", self.controller.stop());
        self.current_run_id = NO_RUN.to_string();

        if !self.readout.is_empty() {
            let joined = self.readout.join_all().await;
            info!("Joined {} readout threads", joined);
        }
        attempt("Controller end", self.controller.end());
    }

    async fn arm(&mut self, doc: &CommandDocument) {
        // Clean slate: stop and join whatever an earlier arm left behind.
        attempt("Controller stop", self.controller.stop());
        if !self.readout.is_empty() {
            info!("Joining {} orphaned readout threads", self.readout.len());
            self.readout.join_all().await;
        }

        let state = self.controller.status();
        if !state.can_arm() {
            warn!("Cannot arm DAQ while not 'Idle' (state {:?})", state);
            return;
        }
        if state != RunState::Idle {
            attempt("Controller end", self.controller.end());
        }

        let override_json = match doc.options_override() {
            Some(overrides) => attempt("Serializing options override", serde_json::to_string(overrides)),
            None => {
                debug!("No override options provided, continue without.");
                None
            }
        };

        let initialized = self.initialize(doc, override_json.as_deref()).await;

        if !self.readout.is_empty() {
            info!("Cannot start DAQ while readout thread from previous run active. Please perform a reset");
            return;
        }
        let Some(electronics) = initialized else {
            info!("Skipping readout configuration since init failed");
            return;
        };
        if let Err(e) = self.readout.spawn(&self.controller, &electronics.links) {
            error!("Failed to start readout: {}", e);
        }
    }

    /// Resolve options, initialize the boards and persist the DAC snapshot.
    /// On any failure the controller is ended and `None` returned.
    async fn initialize(&mut self, doc: &CommandDocument, override_json: Option<&str>) -> Option<Electronics> {
        self.options = None;

        let mode = match doc.mode() {
            Ok(mode) => mode.to_string(),
            Err(e) => {
                error!("Arm command without a usable mode: {}", e);
                attempt("Controller end", self.controller.end());
                return None;
            }
        };

        let options = match self.resolver.resolve(&mode, override_json).await {
            Ok(options) => options,
            Err(e) => {
                error!("Failed to resolve options for mode {}: {}", mode, e);
                attempt("Controller end", self.controller.end());
                return None;
            }
        };

        let controller = Arc::clone(&self.controller);
        let init_options = options.clone();
        let result = tokio::task::spawn_blocking(move || controller.initialize_electronics(&init_options)).await;

        let electronics = match result {
            Ok(Ok(electronics)) => electronics,
            Ok(Err(e)) => {
                error!("Failed to initialize electronics: {}", e);
                attempt("Controller end", self.controller.end());
                return None;
            }
            Err(e) => {
                error!("Electronics initialization aborted: {}", e);
                attempt("Controller end", self.controller.end());
                return None;
            }
        };

        let snapshot = DacSnapshot::new(
            options.get_string("run_identifier", "default"),
            electronics.dacs.clone(),
        );
        attempt(
            "Writing DAC snapshot",
            self.store.upsert_dac_snapshot(&snapshot).await,
        );
        debug!("Initialized electronics on {} links", electronics.links.len());

        self.options = Some(options);
        Some(electronics)
    }

    async fn publish_heartbeat(&self) {
        attempt("Controller error check", self.controller.check_errors());

        let heartbeat = Heartbeat::sample(
            &self.host,
            self.controller.as_ref(),
            &self.current_run_id,
            self.config.rate_scale,
        );
        if let Err(e) = self.store.publish_heartbeat(&heartbeat).await {
            warn!("Can't connect to DB to update status: {}", e);
        }
    }
}
