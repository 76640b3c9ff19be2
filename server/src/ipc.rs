//! Inter-process control channel abstraction: named endpoints per role,
//! carrying request kinds like `DBCONFIG_WORKER_REQUEST`, plus a global
//! `SHUTDOWN` command recognized by all long-lived tasks.
//!
//! The real transport (a Unix-domain-socket IPC service in the original) is
//! an out-of-scope collaborator; what's modeled here is the shape every
//! long-lived task actually consumes: a non-blocking shutdown broadcast
//! plus a named mailbox for role-specific request payloads.

use tokio::sync::{broadcast, mpsc};

/// Global shutdown broadcast. Cloning a `ShutdownRx` via `subscribe()` gives
/// every long-lived task (each AHP worker, DCW) its own receiver, matching
/// "all long-lived tasks poll an `is_running` predicate and respond to
/// `SHUTDOWN`".
#[derive(Clone)]
pub struct ShutdownTx(broadcast::Sender<()>);

pub struct ShutdownRx(broadcast::Receiver<()>);

pub fn shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = broadcast::channel(1);
    (ShutdownTx(tx), ShutdownRx(rx))
}

impl ShutdownTx {
    pub fn signal(&self) {
        // A send error just means every receiver already dropped.
        let _ = self.0.send(());
    }

    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

impl ShutdownRx {
    /// Non-blocking poll of the control channel.
    pub fn try_recv(&mut self) -> bool {
        matches!(
            self.0.try_recv(),
            Ok(()) | Err(broadcast::error::TryRecvError::Lagged(_))
        )
    }

    /// Blocking wait, used by tasks whose steady state is "wait for the
    /// next signal" rather than "poll while doing other work" (DCW).
    pub async fn recv(&mut self) -> bool {
        self.0.recv().await.is_ok()
    }
}

impl Clone for ShutdownRx {
    fn clone(&self) -> Self {
        ShutdownRx(self.0.resubscribe())
    }
}

/// Named endpoint carrying `DBCONFIG_WORKER_REQUEST` payloads: a host-ids
/// list to re-resolve macros for. In the original this arrives serialized
/// over the `DBCONFIG_WORKER` IPC service; here it's already the
/// deserialized `Vec<u64>` since (de)serialization across the wire is the
/// out-of-scope transport's concern.
pub struct DbConfigWorkerEndpoint {
    rx: mpsc::Receiver<Vec<u64>>,
}

#[derive(Clone)]
pub struct DbConfigWorkerSender {
    tx: mpsc::Sender<Vec<u64>>,
}

pub const DBCONFIG_WORKER_ENDPOINT_NAME: &str = "DBCONFIG_WORKER";

pub fn dbconfig_worker_endpoint() -> (DbConfigWorkerSender, DbConfigWorkerEndpoint) {
    let (tx, rx) = mpsc::channel(64);
    (DbConfigWorkerSender { tx }, DbConfigWorkerEndpoint { rx })
}

impl DbConfigWorkerSender {
    pub async fn send_request(&self, host_ids: Vec<u64>) -> Result<(), anyhow::Error> {
        self.tx
            .send(host_ids)
            .await
            .map_err(|_| anyhow::anyhow!("{} endpoint closed", DBCONFIG_WORKER_ENDPOINT_NAME))
    }
}

impl DbConfigWorkerEndpoint {
    pub async fn recv(&mut self) -> Option<Vec<u64>> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_broadcasts_to_every_subscriber() {
        let (tx, mut rx1) = shutdown_channel();
        let mut rx2 = tx.subscribe();

        assert!(!rx1.try_recv());
        assert!(!rx2.try_recv());

        tx.signal();

        assert!(rx1.recv().await);
        assert!(rx2.recv().await);
    }

    #[tokio::test]
    async fn dbconfig_worker_endpoint_round_trips_host_ids() {
        let (tx, mut endpoint) = dbconfig_worker_endpoint();
        tx.send_request(vec![1, 2, 3]).await.unwrap();
        assert_eq!(endpoint.recv().await, Some(vec![1, 2, 3]));
    }
}
