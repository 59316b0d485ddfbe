pub mod cache;
pub mod config;
pub mod mappings;
pub mod push;
pub mod serve;
pub mod sync;

use anyhow::{Context, Result};
use serde::Serialize;

/// Pretty-print a response body for `--json`.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize response JSON")?
    );
    Ok(())
}
