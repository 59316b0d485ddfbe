use anyhow::Result;
use clap::Subcommand;
use serde_json::Value;

use super::print_json;
use crate::client::ApiClient;

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Forget every stored checksum; the next cycle re-copies all mappings.
    Reset,
}

pub fn run(client: &ApiClient, command: CacheCommand, json: bool) -> Result<()> {
    match command {
        CacheCommand::Reset => {
            let reply: Value = client.post("/api/cache/reset")?;
            if json {
                return print_json(&reply);
            }
            println!("✓ {}", reply["message"].as_str().unwrap_or("Checksum cache reset"));
        }
    }
    Ok(())
}
