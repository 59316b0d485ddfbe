//! Remote sheet gateway: batched read/write primitives and fingerprints.
//!
//! [`SheetGateway`] is the transport seam: one call reads many ranges of a
//! sheet, one call overwrites many ranges of a sheet. [`batch_read`] and
//! [`batch_write`] add the deduplication and empty-input rules on top, so
//! every backend behaves the same.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use sheetsync_core::{Fingerprint, SheetId, Table};

use crate::error::SyncError;

/// One range overwrite inside a batched write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeUpdate {
    pub range: String,
    pub values: Table,
}

#[async_trait]
pub trait SheetGateway: Send + Sync {
    /// Read `ranges` of `sheet` in one request.
    ///
    /// The result is positional: entry `i` belongs to `ranges[i]`. Backends
    /// may return fewer entries than requested.
    async fn read_ranges(&self, sheet: &SheetId, ranges: &[String]) -> Result<Vec<Table>, SyncError>;

    /// Overwrite every range in `updates` in one request.
    async fn write_ranges(&self, sheet: &SheetId, updates: &[RangeUpdate]) -> Result<(), SyncError>;
}

/// Read `ranges` of `sheet`, deduplicated, as `range → Table`.
///
/// Ranges missing from the response resolve to an empty table.
pub async fn batch_read<G>(
    gateway: &G,
    sheet: &SheetId,
    ranges: &[String],
) -> Result<HashMap<String, Table>, SyncError>
where
    G: SheetGateway + ?Sized,
{
    let mut seen = HashSet::new();
    let unique: Vec<String> = ranges
        .iter()
        .filter(|r| seen.insert(r.as_str()))
        .cloned()
        .collect();
    if unique.is_empty() {
        return Ok(HashMap::new());
    }

    let mut tables = gateway.read_ranges(sheet, &unique).await?.into_iter();
    Ok(unique
        .into_iter()
        .map(|range| (range, tables.next().unwrap_or_default()))
        .collect())
}

/// Overwrite `updates` on `sheet`. No request is issued for an empty list.
pub async fn batch_write<G>(
    gateway: &G,
    sheet: &SheetId,
    updates: &[RangeUpdate],
) -> Result<(), SyncError>
where
    G: SheetGateway + ?Sized,
{
    if updates.is_empty() {
        return Ok(());
    }
    gateway.write_ranges(sheet, updates).await
}

/// SHA-256 over the compact JSON encoding of the table's rows.
///
/// An empty table hashes `[]`, which is also what an absent range reads as.
pub fn fingerprint(table: &Table) -> Fingerprint {
    let encoded = serde_json::to_vec(table.rows()).unwrap_or_else(|_| b"[]".to_vec());
    let mut h = Sha256::new();
    h.update(&encoded);
    Fingerprint(hex::encode(h.finalize()))
}
