//! Background snapshot writer
//!
//! Part completions must not wait on storage I/O, so the coordinator hands
//! snapshots to a single writer task. Commands are applied in order; a run
//! of queued saves collapses into the last one.

use super::{ResumeSnapshot, ResumeStore};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

enum Command {
    Save(ResumeSnapshot),
    Clear(String),
}

/// Handle to the writer task
pub struct ResumeWriter {
    tx: mpsc::UnboundedSender<Command>,
    handle: JoinHandle<()>,
}

impl ResumeWriter {
    /// Spawn the writer task on the current runtime
    pub fn spawn(store: ResumeStore) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(write_pump(store, rx));
        Self { tx, handle }
    }

    /// Queue a snapshot write
    pub fn save(&self, snapshot: ResumeSnapshot) {
        if self.tx.send(Command::Save(snapshot)).is_err() {
            warn!("Resume writer stopped; dropping snapshot");
        }
    }

    /// Queue removal of the snapshot for `object_key`
    pub fn clear(&self, object_key: impl Into<String>) {
        if self.tx.send(Command::Clear(object_key.into())).is_err() {
            warn!("Resume writer stopped; dropping clear");
        }
    }

    /// Flush every queued command and stop the task
    pub async fn close(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Resume writer task failed");
        }
    }
}

async fn write_pump(store: ResumeStore, mut rx: mpsc::UnboundedReceiver<Command>) {
    while let Some(mut command) = rx.recv().await {
        // Collapse consecutive saves; clears are never skipped
        while let Command::Save(_) = command {
            match rx.try_recv() {
                Ok(next @ Command::Save(_)) => command = next,
                Ok(next) => {
                    apply(&store, command).await;
                    command = next;
                    break;
                }
                Err(_) => break,
            }
        }
        apply(&store, command).await;
    }
    debug!("Resume writer drained");
}

async fn apply(store: &ResumeStore, command: Command) {
    match command {
        Command::Save(snapshot) => {
            if let Err(e) = store.save(&snapshot).await {
                warn!(upload_id = %snapshot.upload_id, error = %e, "Failed to persist resume snapshot");
            }
        }
        Command::Clear(object_key) => {
            if let Err(e) = store.clear(&object_key).await {
                warn!(object_key = %object_key, error = %e, "Failed to clear resume snapshot");
            }
        }
    }
}
