use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;

/// Hands every run its own cancellation channel. Cancelling is a single
/// broadcast send keyed by the caller-chosen run id.
#[derive(Default)]
pub struct CancelRegistry {
    senders: Mutex<HashMap<String, broadcast::Sender<()>>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, run_id: &str) -> broadcast::Receiver<()> {
        let (tx, rx) = broadcast::channel(1);
        self.senders.lock().unwrap().insert(run_id.to_string(), tx);
        rx
    }

    pub fn cancel(&self, run_id: &str) -> bool {
        if let Some(tx) = self.senders.lock().unwrap().remove(run_id) {
            let _ = tx.send(());
            return true;
        }
        false
    }

    pub fn remove(&self, run_id: &str) {
        self.senders.lock().unwrap().remove(run_id);
    }
}

/// Non-blocking check used between pipeline stages. A dropped sender counts
/// as cancelled, matching the registry's remove-on-cancel behavior.
pub fn cancel_requested(rx: &mut broadcast::Receiver<()>) -> bool {
    use tokio::sync::broadcast::error::TryRecvError;

    match rx.try_recv() {
        Ok(()) => true,
        Err(TryRecvError::Lagged(_)) | Err(TryRecvError::Closed) => true,
        Err(TryRecvError::Empty) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_fires_registered_receiver() {
        let registry = CancelRegistry::new();
        let mut rx = registry.register("run-1");

        assert!(!cancel_requested(&mut rx));
        assert!(registry.cancel("run-1"));
        assert!(cancel_requested(&mut rx));
    }

    #[test]
    fn cancel_of_unknown_run_is_a_no_op() {
        let registry = CancelRegistry::new();
        assert!(!registry.cancel("missing"));
    }

    #[test]
    fn removed_runs_read_as_cancelled() {
        let registry = CancelRegistry::new();
        let mut rx = registry.register("run-2");
        registry.remove("run-2");
        assert!(cancel_requested(&mut rx));
    }
}
