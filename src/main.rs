#![deny(dead_code)]
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use std::fs::File;
use std::path::{Path, PathBuf};

mod utils;

use kestrel_chat::codec;
use kestrel_chat::config::{self, EngineConfig};
use kestrel_chat::{EngineUpdate, HostEvent, LookupStatus, SyncEngine};

/// Command line arguments for kestrel-chat
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Identity slugs and contact/message sync for the Kestrel client."
)]
struct Args {
    /// Config file to use instead of the one in the user config directory
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    /// Log at debug level regardless of config
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode an identity as a slug
    Encode {
        /// Identity text, or hex bytes with --hex
        input: String,
        #[arg(long)]
        hex: bool,
    },
    /// Decode a slug back into an identity
    Decode {
        slug: String,
        /// Print the raw bytes as hex instead of display text
        #[arg(long)]
        hex: bool,
    },
    /// Feed a JSON array of host events through the engine and print the
    /// resulting contact list
    Replay {
        events: PathBuf,
        /// Write the final engine state here
        #[arg(long, value_name = "PATH")]
        snapshot: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(ref path) = args.config {
        config::set_config_path_override(path.clone());
    }
    let config = EngineConfig::load()?;

    let level = if args.verbose { LevelFilter::Debug } else { config.level_filter() };
    let log_file = args.log_file.clone().or_else(|| config.log_file.clone());
    utils::setup_logging(log_file.as_deref(), level)?;

    match args.command {
        Command::Encode { input, hex } => {
            let bytes = if hex {
                hex::decode(input.trim()).context("Input is not valid hex")?
            } else {
                input.into_bytes()
            };
            println!("{}", codec::encode(&bytes));
        }

        Command::Decode { slug, hex } => {
            let bytes = codec::decode(&slug);
            if hex {
                println!("{}", hex::encode(&bytes));
            } else {
                println!("{}", codec::display(&bytes));
            }
        }

        Command::Replay { events, snapshot } => {
            replay(&config, &events, snapshot)?;
        }
    }

    Ok(())
}

fn replay(config: &EngineConfig, events_path: &Path, snapshot_path: Option<PathBuf>) -> Result<()> {
    let file = File::open(events_path)
        .with_context(|| format!("Could not open {}", events_path.display()))?;
    let events: Vec<HostEvent> = serde_json::from_reader(file)
        .with_context(|| format!("Could not parse events in {}", events_path.display()))?;
    info!("Replaying {} events from {}", events.len(), events_path.display());

    let mut engine = SyncEngine::from_config(config);
    for event in events {
        for update in engine.apply(event) {
            match update {
                EngineUpdate::Outgoing(msg) => {
                    println!("-> {} #{}: {}", msg.recipient_id, msg.id, msg.content);
                }
                EngineUpdate::Rejected { reason } => {
                    eprintln!("rejected: {}", reason);
                }
                _ => {}
            }
        }
    }

    println!("Signed in as {}", engine.local_id());
    for summary in engine.contact_summaries() {
        let contact = &summary.contact;
        let (name, detail) = match contact.lookup_status {
            LookupStatus::Bootstrapping => (
                format!("Bootstrappee: {}", contact.bootstrap_id.as_deref().unwrap_or("?")),
                "Currently bootstrapping".to_string(),
            ),
            LookupStatus::Incoming => (
                contact.user_id.clone().unwrap_or_default(),
                "Wants to chat with you".to_string(),
            ),
            LookupStatus::Ready => (
                contact.user_id.clone().unwrap_or_default(),
                utils::format_timestamp(contact.last_message_timestamp),
            ),
        };
        if summary.unread > 0 {
            println!("{:<24} [{}] {}", name, summary.unread, detail);
        } else {
            println!("{:<24} {}", name, detail);
        }
    }

    if let Some(path) = snapshot_path {
        engine
            .snapshot()
            .save(&path)
            .with_context(|| format!("Could not write snapshot to {}", path.display()))?;
        info!("Snapshot written to {}", path.display());
    }

    Ok(())
}
