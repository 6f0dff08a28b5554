// Event loop that serializes host events onto the engine and forwards the
// resulting updates to the presentation layer.

use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::engine::SyncEngine;
use crate::events::{EngineUpdate, HostEvent};

pub struct EngineHost {
    engine: SyncEngine,
    update_tx: mpsc::Sender<EngineUpdate>,
}

impl EngineHost {
    pub fn new(engine: SyncEngine) -> (Self, mpsc::Receiver<EngineUpdate>) {
        let (update_tx, update_rx) = mpsc::channel(100);
        (EngineHost { engine, update_tx }, update_rx)
    }

    /// Apply events one at a time until the sender side closes, then hand
    /// the engine back.
    pub async fn run(mut self, mut events: mpsc::Receiver<HostEvent>) -> SyncEngine {
        let mut observer_gone = false;
        while let Some(event) = events.recv().await {
            debug!("Host event: {:?}", event);
            for update in self.engine.apply(event) {
                if observer_gone {
                    continue;
                }
                if self.update_tx.send(update).await.is_err() {
                    warn!("Update receiver dropped, continuing without an observer");
                    observer_gone = true;
                }
            }
        }
        debug!("Host event channel closed");
        self.engine
    }

    pub fn spawn(self, events: mpsc::Receiver<HostEvent>) -> JoinHandle<SyncEngine> {
        tokio::spawn(self.run(events))
    }
}
