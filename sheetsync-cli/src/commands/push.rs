//! `sheetsync push`: deliver a webhook payload by hand.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use serde::Serialize;
use serde_json::Value;

use sheetsync_core::Table;

use super::print_json;
use crate::client::ApiClient;

#[derive(Args, Debug)]
pub struct PushArgs {
    /// Source tab the edit happened in.
    #[arg(long)]
    pub sheet_name: String,

    /// A1 range of the edit, relative to the tab (e.g. `B2:C3`).
    #[arg(long)]
    pub range: String,

    /// Cell values as a JSON array of rows, e.g. `[["a","b"]]`.
    #[arg(long)]
    pub values: String,

    /// Source spreadsheet id, logged by the daemon.
    #[arg(long)]
    pub sheet_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    sheet_id: Option<String>,
    sheet_name: String,
    range: String,
    values: Table,
    timestamp: String,
    change_type: &'static str,
}

impl PushArgs {
    pub fn run(self, client: &ApiClient, json: bool) -> Result<()> {
        let values: Table = serde_json::from_str(&self.values)
            .context("--values must be a JSON array of rows")?;
        let payload = WebhookPayload {
            sheet_id: self.sheet_id,
            sheet_name: self.sheet_name,
            range: self.range,
            values,
            timestamp: Utc::now().to_rfc3339(),
            change_type: "EDIT",
        };

        let reply: Value = client.post_json("/webhook", &payload)?;
        if json {
            return print_json(&reply);
        }

        let result = &reply["result"];
        match result["outcome"].as_str() {
            Some("applied") => println!(
                "✓ Pushed to {} {}",
                result["destSheetId"].as_str().unwrap_or_default(),
                result["destRange"].as_str().unwrap_or_default(),
            ),
            Some("no-mapping") => println!("No mapping has source tab '{}'", payload.sheet_name),
            Some("rate-limited") => println!("Rate limit reached, push dropped"),
            _ => println!("{}", reply["message"].as_str().unwrap_or("Webhook delivered")),
        }
        Ok(())
    }
}
