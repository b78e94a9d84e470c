//! Readout thread pool
//!
//! One OS thread per link, each parked inside the controller's blocking
//! readout loop. The pool only spawns and joins; it never looks inside a
//! worker. Callers must signal `stop` on the controller before joining.

use crate::controller::{HardwareController, LinkId};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ReadoutError {
    #[error("{0} readout threads from a previous arm are still active")]
    StillActive(usize),
    #[error("failed to spawn readout thread for link {link}: {source}")]
    Spawn {
        link: LinkId,
        #[source]
        source: std::io::Error,
    },
}

struct ReadoutWorker {
    link: LinkId,
    handle: JoinHandle<()>,
}

/// Ordered set of live readout threads
pub struct ReadoutPool {
    workers: Vec<ReadoutWorker>,
    join_warn: Duration,
}

impl ReadoutPool {
    /// `join_warn` is how long a join may block before a warning is logged
    /// (and repeated at the same interval).
    pub fn new(join_warn: Duration) -> Self {
        Self {
            workers: Vec::new(),
            join_warn,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn links(&self) -> Vec<LinkId> {
        self.workers.iter().map(|w| w.link).collect()
    }

    /// Spawn one readout thread per link. Refuses while any thread from a
    /// previous batch is still tracked.
    pub fn spawn(
        &mut self,
        controller: &Arc<dyn HardwareController>,
        links: &[LinkId],
    ) -> Result<(), ReadoutError> {
        if !self.workers.is_empty() {
            return Err(ReadoutError::StillActive(self.workers.len()));
        }

        for &link in links {
            let controller = Arc::clone(controller);
            let handle = std::thread::Builder::new()
                .name(format!("readout-link-{link}"))
                .spawn(move || {
                    if let Err(e) = controller.read_link(link) {
                        error!("Readout on link {} ended with error: {}", link, e);
                    }
                })
                .map_err(|source| ReadoutError::Spawn { link, source })?;

            info!("Starting readout thread for link {}", link);
            self.workers.push(ReadoutWorker { link, handle });
        }
        Ok(())
    }

    /// Join every tracked thread in spawn order, then leave the pool empty.
    /// Returns how many threads were joined.
    pub async fn join_all(&mut self) -> usize {
        let mut joined = 0;
        for worker in self.workers.drain(..) {
            let link = worker.link;
            let handle = worker.handle;
            let mut join = tokio::task::spawn_blocking(move || handle.join());

            let outcome = loop {
                match tokio::time::timeout(self.join_warn, &mut join).await {
                    Ok(outcome) => break outcome,
                    Err(_) => warn!(
                        "Still waiting for readout thread on link {} after {:?}",
                        link, self.join_warn
                    ),
                }
            };

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(_)) => error!("Readout thread for link {} panicked", link),
                Err(e) => error!("Failed to join readout thread for link {}: {}", link, e),
            }
            joined += 1;
        }
        joined
    }
}
