use std::thread;

use anyhow::{Context, Result};
use pkgcycle_core::CancellationToken;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use tracing::{info, warn};

/// Turns SIGTERM/SIGINT into a cancelled [`CancellationToken`].
///
/// The installed handler only writes to a self-pipe; a listener thread reads
/// it and cancels the token. Nothing else happens on signal delivery.
pub struct SignalCoordinator {
    token: CancellationToken,
    handle: Option<Handle>,
    listener: Option<thread::JoinHandle<()>>,
}

impl SignalCoordinator {
    pub fn install(token: CancellationToken) -> Result<Self> {
        let mut signals =
            Signals::new([SIGTERM, SIGINT]).context("failed to register signal listeners")?;
        let handle = signals.handle();

        let listener_token = token.clone();
        let listener = thread::Builder::new()
            .name("pkgcycle-signals".to_string())
            .spawn(move || {
                for signal in signals.forever() {
                    if listener_token.cancel() {
                        info!(signal, "received signal, initiating graceful shutdown");
                    }
                }
            })
            .context("failed to start signal listener thread")?;

        Ok(Self {
            token,
            handle: Some(handle),
            listener: Some(listener),
        })
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
        if let Some(listener) = self.listener.take() {
            if listener.join().is_err() {
                warn!("signal listener thread panicked while stopping");
            }
        }
    }
}

impl Drop for SignalCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
