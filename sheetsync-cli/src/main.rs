//! sheetsync: spreadsheet mirroring daemon and admin client.
//!
//! # Usage
//!
//! ```text
//! sheetsync serve [--port <port>]
//! sheetsync status
//! sheetsync start|stop|trigger
//! sheetsync config show
//! sheetsync config set [--interval-ms <ms>] [--auto-start <bool>]
//! sheetsync mappings list|add|update|remove
//! sheetsync push --sheet-name <tab> --range <A1> --values '[["a","b"]]'
//! sheetsync cache reset
//! ```
//!
//! Every command except `serve` talks to a running daemon at `--server`.

mod client;
mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use client::ApiClient;
use commands::{
    cache::CacheCommand, config::ConfigCommand, mappings::MappingsCommand, push::PushArgs,
    serve::ServeArgs, sync::ControlAction,
};

#[derive(Parser, Debug)]
#[command(
    name = "sheetsync",
    version,
    about = "Mirror Google Sheets tabs from source to destination spreadsheets",
    long_about = None,
)]
struct Cli {
    /// Base URL of the sheetsync daemon.
    #[arg(
        long,
        global = true,
        env = "SHEETSYNC_SERVER",
        default_value = "http://localhost:3000"
    )]
    server: String,

    /// Emit the daemon's JSON response instead of a table.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the sync daemon in the foreground.
    Serve(ServeArgs),

    /// Show scheduler state and sync counters.
    Status,

    /// Start the periodic full sync and run one cycle immediately.
    Start,

    /// Stop the periodic full sync.
    Stop,

    /// Run one full sync cycle now.
    Trigger,

    /// Show or change scheduler settings.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Manage source → destination mappings.
    Mappings {
        #[command(subcommand)]
        command: MappingsCommand,
    },

    /// Send a single-range edit the way the spreadsheet trigger does.
    Push(PushArgs),

    /// Manage the daemon's checksum cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = ApiClient::new(&cli.server);
    let json = cli.json;

    match cli.command {
        Commands::Serve(args) => args.run(),
        Commands::Status => commands::sync::status(&client, json),
        Commands::Start => commands::sync::control(&client, ControlAction::Start, json),
        Commands::Stop => commands::sync::control(&client, ControlAction::Stop, json),
        Commands::Trigger => commands::sync::control(&client, ControlAction::Trigger, json),
        Commands::Config { command } => commands::config::run(&client, command, json),
        Commands::Mappings { command } => commands::mappings::run(&client, command, json),
        Commands::Push(args) => args.run(&client, json),
        Commands::Cache { command } => commands::cache::run(&client, command, json),
    }
}
