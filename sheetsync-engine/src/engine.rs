//! Sync orchestrator and push handler.
//!
//! A full cycle reads every mapped tab (one batched read per sheet),
//! fingerprints both sides of each mapping, decides per mapping whether the
//! source must be copied over the destination, and writes the queued copies
//! (one batched write per destination sheet). The source always wins.
//!
//! Quota: one rate-limiter token per phase (read, write), one per push.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use sheetsync_core::types::tab_range;
use sheetsync_core::{Fingerprint, Mapping, MappingId, RangeKey, SheetId, Table};

use crate::checksum_store::ChecksumStore;
use crate::error::SyncError;
use crate::gateway::{batch_read, batch_write, fingerprint, RangeUpdate, SheetGateway};
use crate::rate_limiter::RateLimiter;
use crate::retry::{with_retry, RetryPolicy};

// ---------------------------------------------------------------------------
// Decision policy
// ---------------------------------------------------------------------------

/// Why a source table is copied over its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// At least one side has never been observed.
    Initial,
    /// Only the source changed since the last cycle.
    Forward,
    /// Only the destination changed; it is overwritten.
    ForcedForward,
    /// Both sides changed; the source wins.
    ConflictResolved,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Initial => "initial",
            Direction::Forward => "forward",
            Direction::ForcedForward => "forced-forward",
            Direction::ConflictResolved => "conflict-resolved",
        }
    }
}

/// Decide whether `source` must be pushed over `dest`.
///
/// `cached_*` are the fingerprints recorded by the previous cycle. Equal
/// current fingerprints never push.
pub fn decide(
    source: &Fingerprint,
    dest: &Fingerprint,
    cached_source: Option<&Fingerprint>,
    cached_dest: Option<&Fingerprint>,
) -> Option<Direction> {
    if source == dest {
        return None;
    }
    let source_changed = cached_source.is_some_and(|c| c != source);
    let dest_changed = cached_dest.is_some_and(|c| c != dest);

    if source_changed && dest_changed {
        Some(Direction::ConflictResolved)
    } else if source_changed {
        Some(Direction::Forward)
    } else if cached_source.is_none() || cached_dest.is_none() {
        Some(Direction::Initial)
    } else if dest_changed {
        Some(Direction::ForcedForward)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleOutcome {
    NoMappings,
    RateLimited,
    AlreadyRunning,
    Completed,
}

/// One queued source → destination copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub mapping_id: MappingId,
    pub mapping_name: String,
    pub direction: Direction,
    pub applied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub started_at: DateTime<Utc>,
    pub mappings_checked: usize,
    /// Mappings not evaluated because one of their sheets could not be read.
    pub mappings_skipped: usize,
    pub decisions: Vec<Decision>,
    pub updates_applied: usize,
    pub sheets_failed: Vec<SheetId>,
    pub writes_failed: Vec<SheetId>,
    /// The write phase was denied a rate-limiter token.
    pub writes_deferred: bool,
}

impl CycleReport {
    fn new(outcome: CycleOutcome) -> Self {
        Self {
            outcome,
            started_at: Utc::now(),
            mappings_checked: 0,
            mappings_skipped: 0,
            decisions: Vec::new(),
            updates_applied: 0,
            sheets_failed: Vec::new(),
            writes_failed: Vec::new(),
            writes_deferred: false,
        }
    }

    /// Any sheet read or write failed during the cycle.
    pub fn has_failures(&self) -> bool {
        !self.sheets_failed.is_empty() || !self.writes_failed.is_empty()
    }
}

/// Webhook-delivered edit of a source tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushUpdate {
    pub sheet_name: String,
    pub range: String,
    pub values: Table,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "outcome")]
pub enum PushOutcome {
    NoMapping,
    RateLimited,
    #[serde(rename_all = "camelCase")]
    Applied {
        mapping_id: MappingId,
        dest_sheet_id: SheetId,
        dest_range: String,
    },
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct PendingWrite<'a> {
    mapping: &'a Mapping,
    decision: usize,
    update: RangeUpdate,
    source_fp: Fingerprint,
}

pub struct SyncEngine {
    gateway: Arc<dyn SheetGateway>,
    limiter: Arc<RateLimiter>,
    checksums: Mutex<ChecksumStore>,
    retry: RetryPolicy,
    cycle_lock: Mutex<()>,
    push_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(gateway: Arc<dyn SheetGateway>, limiter: Arc<RateLimiter>, checksums: ChecksumStore) -> Self {
        Self {
            gateway,
            limiter,
            checksums: Mutex::new(checksums),
            retry: RetryPolicy::default(),
            cycle_lock: Mutex::new(()),
            push_lock: Mutex::new(()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Cached fingerprint for `key`, if any.
    pub async fn checksum(&self, key: &RangeKey) -> Option<Fingerprint> {
        self.checksums.lock().await.get(key).cloned()
    }

    /// Write the checksum store to disk off the async runtime.
    pub async fn persist_checksums(&self) -> bool {
        let snapshot = self.checksums.lock().await.clone();
        match tokio::task::spawn_blocking(move || snapshot.persist()).await {
            Ok(saved) => saved,
            Err(err) => {
                tracing::error!(error = %err, "checksum persist task failed");
                false
            }
        }
    }

    /// Forget every cached fingerprint and persist the empty store.
    pub async fn reset_checksums(&self) -> bool {
        self.checksums.lock().await.clear();
        tracing::info!("checksum store reset");
        self.persist_checksums().await
    }

    /// Run one full sync cycle over `mappings`.
    ///
    /// Returns immediately with [`CycleOutcome::AlreadyRunning`] while another
    /// cycle is in flight.
    pub async fn run_cycle(&self, mappings: &[Mapping]) -> CycleReport {
        let Ok(_running) = self.cycle_lock.try_lock() else {
            tracing::info!("sync cycle already running, skipping");
            return CycleReport::new(CycleOutcome::AlreadyRunning);
        };

        if mappings.is_empty() {
            tracing::debug!("no mappings configured");
            return CycleReport::new(CycleOutcome::NoMappings);
        }
        if !self.limiter.try_consume(1) {
            tracing::warn!("rate limit reached, skipping sync cycle");
            return CycleReport::new(CycleOutcome::RateLimited);
        }

        let mut report = CycleReport::new(CycleOutcome::Completed);
        report.mappings_checked = mappings.len();

        // --- read phase ---------------------------------------------------
        let (tables, failed_reads) = self.read_all(mappings).await;
        report.sheets_failed = failed_reads.iter().cloned().collect();

        // --- decide -------------------------------------------------------
        let mut previous: HashMap<RangeKey, Option<Fingerprint>> = HashMap::new();
        let mut pending = Vec::new();
        {
            let mut store = self.checksums.lock().await;
            for mapping in mappings {
                if failed_reads.contains(&mapping.source_sheet_id)
                    || failed_reads.contains(&mapping.dest_sheet_id)
                {
                    tracing::warn!(mapping = %mapping.name, "skipping mapping, sheet read failed");
                    report.mappings_skipped += 1;
                    continue;
                }

                let source_key = mapping.source_key();
                let dest_key = mapping.dest_key();
                let source = lookup(&tables, &mapping.source_sheet_id, &mapping.source_range());
                let dest = lookup(&tables, &mapping.dest_sheet_id, &mapping.dest_range());
                let source_fp = fingerprint(&source);
                let dest_fp = fingerprint(&dest);

                let cached_source = store.get(&source_key).cloned();
                let cached_dest = store.get(&dest_key).cloned();
                previous.entry(source_key.clone()).or_insert_with(|| cached_source.clone());
                previous.entry(dest_key.clone()).or_insert_with(|| cached_dest.clone());

                let direction = decide(&source_fp, &dest_fp, cached_source.as_ref(), cached_dest.as_ref());
                store.set(source_key, Some(source_fp.clone()));
                store.set(dest_key, Some(dest_fp));

                if let Some(direction) = direction {
                    tracing::info!(
                        mapping = %mapping.name,
                        direction = direction.as_str(),
                        "queueing update",
                    );
                    report.decisions.push(Decision {
                        mapping_id: mapping.id.clone(),
                        mapping_name: mapping.name.clone(),
                        direction,
                        applied: false,
                    });
                    pending.push(PendingWrite {
                        mapping,
                        decision: report.decisions.len() - 1,
                        update: RangeUpdate {
                            range: tab_range(&mapping.dest_tab, "A1"),
                            values: source.padded_to(dest.row_count(), dest.column_count()),
                        },
                        source_fp,
                    });
                }
            }
        }

        if pending.is_empty() {
            self.finish(&report).await;
            return report;
        }

        // --- write phase --------------------------------------------------
        if !self.limiter.try_consume(1) {
            tracing::warn!(updates = pending.len(), "rate limit reached, deferring writes");
            report.writes_deferred = true;
            let mut store = self.checksums.lock().await;
            for write in &pending {
                restore(&mut store, &previous, write.mapping);
            }
            drop(store);
            self.finish(&report).await;
            return report;
        }

        let mut by_sheet: BTreeMap<SheetId, Vec<&PendingWrite<'_>>> = BTreeMap::new();
        for write in &pending {
            by_sheet
                .entry(write.mapping.dest_sheet_id.clone())
                .or_default()
                .push(write);
        }

        for (sheet, writes) in by_sheet {
            let updates: Vec<RangeUpdate> = writes.iter().map(|w| w.update.clone()).collect();
            let gateway = self.gateway.as_ref();
            let result = with_retry(self.retry, || batch_write(gateway, &sheet, &updates)).await;

            let mut store = self.checksums.lock().await;
            match result {
                Ok(()) => {
                    for write in &writes {
                        store.set(write.mapping.dest_key(), Some(write.source_fp.clone()));
                        report.decisions[write.decision].applied = true;
                    }
                    report.updates_applied += writes.len();
                    tracing::info!(sheet = %sheet, updates = writes.len(), "batch write applied");
                }
                Err(err) => {
                    tracing::error!(sheet = %sheet, error = %err, "batch write failed");
                    for write in &writes {
                        restore(&mut store, &previous, write.mapping);
                    }
                    report.writes_failed.push(sheet);
                }
            }
        }

        self.finish(&report).await;
        report
    }

    /// Copy a webhook-delivered edit straight to the destination of the first
    /// mapping whose source tab is `update.sheet_name`.
    pub async fn apply_push(&self, mappings: &[Mapping], update: PushUpdate) -> Result<PushOutcome, SyncError> {
        let _serial = self.push_lock.lock().await;

        let Some(mapping) = mappings
            .iter()
            .find(|m| m.source_tab.as_str() == update.sheet_name)
        else {
            tracing::warn!(sheet_name = %update.sheet_name, "no mapping for pushed tab");
            return Ok(PushOutcome::NoMapping);
        };
        if !self.limiter.try_consume(1) {
            tracing::warn!(mapping = %mapping.name, "rate limit reached, dropping push update");
            return Ok(PushOutcome::RateLimited);
        }

        let dest_range = tab_range(&mapping.dest_tab, &update.range);
        let updates = [RangeUpdate {
            range: dest_range.clone(),
            values: update.values,
        }];
        let gateway = self.gateway.as_ref();
        with_retry(self.retry, || batch_write(gateway, &mapping.dest_sheet_id, &updates)).await?;

        self.checksums.lock().await.set(mapping.dest_key(), None);
        tracing::info!(mapping = %mapping.name, range = %dest_range, "push update applied");

        Ok(PushOutcome::Applied {
            mapping_id: mapping.id.clone(),
            dest_sheet_id: mapping.dest_sheet_id.clone(),
            dest_range,
        })
    }

    async fn read_all(&self, mappings: &[Mapping]) -> (HashMap<(SheetId, String), Table>, BTreeSet<SheetId>) {
        let mut plan: BTreeMap<SheetId, Vec<String>> = BTreeMap::new();
        for mapping in mappings {
            for (sheet, range) in [
                (&mapping.source_sheet_id, mapping.source_range()),
                (&mapping.dest_sheet_id, mapping.dest_range()),
            ] {
                let ranges = plan.entry(sheet.clone()).or_default();
                if !ranges.contains(&range) {
                    ranges.push(range);
                }
            }
        }

        let mut tables = HashMap::new();
        let mut failed = BTreeSet::new();
        let gateway = self.gateway.as_ref();
        for (sheet, ranges) in plan {
            match with_retry(self.retry, || batch_read(gateway, &sheet, &ranges)).await {
                Ok(read) => {
                    tracing::debug!(sheet = %sheet, ranges = read.len(), "sheet read");
                    tables.extend(read.into_iter().map(|(range, table)| ((sheet.clone(), range), table)));
                }
                Err(err) => {
                    tracing::error!(sheet = %sheet, error = %err, "batch read failed");
                    failed.insert(sheet);
                }
            }
        }
        (tables, failed)
    }

    async fn finish(&self, report: &CycleReport) {
        self.persist_checksums().await;
        tracing::info!(
            mappings = report.mappings_checked,
            queued = report.decisions.len(),
            applied = report.updates_applied,
            failed_reads = report.sheets_failed.len(),
            failed_writes = report.writes_failed.len(),
            "sync cycle completed",
        );
    }
}

fn lookup(tables: &HashMap<(SheetId, String), Table>, sheet: &SheetId, range: &str) -> Table {
    tables
        .get(&(sheet.clone(), range.to_string()))
        .cloned()
        .unwrap_or_default()
}

fn restore(store: &mut ChecksumStore, previous: &HashMap<RangeKey, Option<Fingerprint>>, mapping: &Mapping) {
    for key in [mapping.source_key(), mapping.dest_key()] {
        if let Some(before) = previous.get(&key) {
            store.set(key, before.clone());
        }
    }
}
