//! Cancellation for background loops.

use std::sync::Arc;

use tokio::sync::watch;

/// Fires the shutdown signal for every [`Shutdown`] handle cloned from the
/// same channel. Dropping the trigger also counts as a shutdown.
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

/// Cheap, cloneable view of the shutdown signal.
#[derive(Clone, Debug)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
    // set only for handles that own their sender, see `never`
    _sender: Option<Arc<watch::Sender<bool>>>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), Shutdown { rx, _sender: None })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // no receivers left means nobody is waiting
        let _ = self.0.send(true);
    }
}

impl Shutdown {
    /// A handle that never fires.
    pub fn never() -> Shutdown {
        let (tx, rx) = watch::channel(false);
        Shutdown {
            rx,
            _sender: Some(Arc::new(tx)),
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        // an error means the trigger is gone, treated as shutdown
        let _ = rx.wait_for(|stop| *stop).await;
    }
}
