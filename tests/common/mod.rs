// Shared helpers for the integration tests
#![allow(dead_code)]

use std::sync::Once;

use anyhow::{anyhow, Result};
use log::{info, LevelFilter};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use kestrel_chat::{EngineUpdate, HostEvent, SyncEngine};

static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

/// Bob's engine with four messages from Alice, ids 10 through 13.
pub fn bob_with_four_from_alice() -> SyncEngine {
    let mut engine = SyncEngine::with_message_base("Bob", 9);
    for (i, ts) in [100.0, 110.0, 120.0, 130.0].iter().enumerate() {
        engine
            .receive("Alice", &format!("message {}", i), *ts)
            .expect("receive");
    }
    engine
}

pub fn plain_message(sender: &str, content: &str, timestamp: f64) -> HostEvent {
    HostEvent::PlainMessageReceived {
        sender_id: sender.to_string(),
        content: content.to_string(),
        timestamp,
    }
}

pub fn visible(user_id: &str, message_id: u64, timestamp: f64) -> HostEvent {
    HostEvent::MessageVisible {
        user_id: user_id.to_string(),
        message_id: message_id.to_string(),
        timestamp: timestamp.to_string(),
    }
}

/// Wait for an update matching the predicate, skipping the others.
pub async fn wait_for_update(
    update_rx: &mut mpsc::Receiver<EngineUpdate>,
    predicate: impl Fn(&EngineUpdate) -> bool,
    timeout_secs: u64,
) -> Result<EngineUpdate> {
    info!("Waiting for update...");
    match timeout(Duration::from_secs(timeout_secs), async {
        while let Some(update) = update_rx.recv().await {
            if predicate(&update) {
                return Ok(update);
            }
        }
        Err(anyhow!("Update channel closed"))
    })
    .await
    {
        Ok(result) => result,
        Err(_) => Err(anyhow!("Timed out waiting for update")),
    }
}
