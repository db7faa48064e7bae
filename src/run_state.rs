//! The assistant's "should continue running" flag.
//!
//! [`RunController`] is owned by the orchestrator and is the only way to set
//! the flag. Components below it receive a cloneable [`RunSignal`] that can
//! read the flag and await its transition to stopped.

use tokio::sync::watch;

/// Owner of the run flag. Deliberately not `Clone`.
#[derive(Debug)]
pub struct RunController {
    tx: watch::Sender<bool>,
}

impl RunController {
    /// Create a controller in the stopped state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Set the flag. Returns `true` if the value changed.
    pub fn set_running(&self, running: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == running {
                false
            } else {
                *current = running;
                true
            }
        })
    }

    /// Current value of the flag.
    pub fn is_running(&self) -> bool {
        *self.tx.borrow()
    }

    /// Hand out a read-only observer.
    pub fn signal(&self) -> RunSignal {
        RunSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for RunController {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of the run flag.
#[derive(Debug, Clone)]
pub struct RunSignal {
    rx: watch::Receiver<bool>,
}

impl RunSignal {
    /// Current value of the flag.
    pub fn is_running(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the flag is (or becomes) false.
    ///
    /// Also resolves if the controller has been dropped.
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|running| !*running).await;
    }

    /// Sleep for `delay` unless the flag clears first.
    ///
    /// Returns `true` if the full delay elapsed while still running.
    pub async fn sleep_while_running(&self, delay: std::time::Duration) -> bool {
        tokio::select! {
            () = self.stopped() => false,
            () = tokio::time::sleep(delay) => self.is_running(),
        }
    }
}
