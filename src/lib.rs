pub mod codec;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod events;
pub mod host;
pub mod message_log;
pub mod models;

// Re-export main types for convenience
pub use directory::ContactDirectory;
pub use engine::{Snapshot, SyncEngine};
pub use error::{Result, SyncError};
pub use events::{EngineUpdate, HostEvent, VisibilityNotice};
pub use host::EngineHost;
pub use message_log::MessageLog;
pub use models::*;
