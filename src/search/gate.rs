use tokio::sync::oneshot;

/// Coordinator side of a per-repository one-shot release signal.
///
/// Firing tells the probe worker that nothing will read its payload any more
/// and it may release the repository's search resources. Dropping an unfired
/// gate has the same effect, so a gate lost on an error path cannot leak.
#[derive(Debug)]
pub struct CleanupGate {
    tx: Option<oneshot::Sender<()>>,
}

/// Worker side of a [`CleanupGate`].
#[derive(Debug)]
pub struct GateWaiter {
    rx: oneshot::Receiver<()>,
}

pub fn cleanup_gate() -> (CleanupGate, GateWaiter) {
    let (tx, rx) = oneshot::channel();
    (CleanupGate { tx: Some(tx) }, GateWaiter { rx })
}

impl CleanupGate {
    /// Fire the gate. Returns `true` only for the call that actually fired.
    pub fn fire(&mut self) -> bool {
        match self.tx.take() {
            Some(tx) => {
                // The waiter may already be gone if its task panicked.
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    pub fn is_fired(&self) -> bool {
        self.tx.is_none()
    }
}

impl GateWaiter {
    /// Suspend until the gate fires or is dropped.
    pub async fn wait(self) {
        let _ = self.rx.await;
    }
}
