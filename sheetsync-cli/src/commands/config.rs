//! `sheetsync config show|set`

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};

use sheetsync_daemon::SyncSettings;

use super::print_json;
use crate::client::ApiClient;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the current scheduler settings.
    Show,
    /// Change the full-sync interval or the auto-start flag.
    Set(SetArgs),
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Full-sync interval in milliseconds (at least 10000).
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Start the scheduler when the daemon boots.
    #[arg(long)]
    pub auto_start: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    auto_start: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfigReply {
    #[serde(flatten)]
    settings: SyncSettings,
    message: String,
}

pub fn run(client: &ApiClient, command: ConfigCommand, json: bool) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let settings: SyncSettings = client.get("/api/sync/config")?;
            if json {
                return print_json(&settings);
            }
            print_settings(&settings);
        }
        ConfigCommand::Set(args) => {
            if args.interval_ms.is_none() && args.auto_start.is_none() {
                bail!("nothing to change: pass --interval-ms and/or --auto-start");
            }
            let update = ConfigUpdate {
                interval: args.interval_ms,
                auto_start: args.auto_start,
            };
            let reply: ConfigReply = client.post_json("/api/sync/config", &update)?;
            if json {
                return print_json(&reply);
            }
            println!("✓ {}", reply.message);
            print_settings(&reply.settings);
        }
    }
    Ok(())
}

fn print_settings(settings: &SyncSettings) {
    println!("interval:   {} ms", settings.interval);
    println!("auto start: {}", settings.auto_start);
}
