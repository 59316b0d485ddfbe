//! Shared daemon state: engine, mapping registry, scheduler, status counters.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use sheetsync_core::{registry, Mapping, MappingPatch, MappingRegistry, NewMapping};
use sheetsync_engine::{CycleOutcome, CycleReport, PushOutcome, PushUpdate, SyncEngine, SyncError};

use crate::error::DaemonError;
use crate::scheduler::Scheduler;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_running: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub next_sync: Option<DateTime<Utc>>,
    pub total_syncs: u64,
    /// Cycles that finished with at least one failed sheet.
    pub errors: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_report: Option<CycleReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// Full-sync interval in milliseconds.
    pub interval: u64,
    pub auto_start: bool,
}

impl SyncSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval)
    }
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
    pub engine: SyncEngine,
    pub registry: RwLock<MappingRegistry>,
    pub status: RwLock<SyncStatus>,
    pub settings: RwLock<SyncSettings>,
    pub scheduler: Scheduler,
    pub data_dir: PathBuf,
}

impl std::ops::Deref for AppState {
    type Target = AppStateInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl AppState {
    pub fn new(
        engine: SyncEngine,
        registry: MappingRegistry,
        settings: SyncSettings,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                engine,
                registry: RwLock::new(registry),
                status: RwLock::new(SyncStatus::default()),
                settings: RwLock::new(settings),
                scheduler: Scheduler::new(),
                data_dir: data_dir.into(),
            }),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.inner.data_dir
    }

    pub async fn mappings(&self) -> Vec<Mapping> {
        self.registry.read().await.snapshot()
    }

    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    pub async fn settings(&self) -> SyncSettings {
        *self.settings.read().await
    }

    // -----------------------------------------------------------------------
    // Sync
    // -----------------------------------------------------------------------

    /// Run one full cycle over the current mapping snapshot and record it.
    pub async fn run_sync(&self) -> CycleReport {
        let mappings = self.mappings().await;
        let report = self.engine.run_cycle(&mappings).await;

        let interval = self.scheduler.interval();
        let mut status = self.status.write().await;
        if matches!(report.outcome, CycleOutcome::Completed | CycleOutcome::NoMappings) {
            let now = Utc::now();
            status.last_sync = Some(now);
            status.total_syncs += 1;
            if let Some(interval) = interval {
                status.next_sync = Some(next_after(now, interval));
            }
        }
        if report.has_failures() {
            status.errors += 1;
        }
        status.last_report = Some(report.clone());
        report
    }

    pub async fn apply_push(&self, update: PushUpdate) -> Result<PushOutcome, SyncError> {
        let mappings = self.mappings().await;
        self.engine.apply_push(&mappings, update).await
    }

    // -----------------------------------------------------------------------
    // Scheduler
    // -----------------------------------------------------------------------

    /// Start the periodic timer. Returns `false` when it is already running.
    pub async fn start_scheduler(&self) -> bool {
        let interval = self.settings().await.interval();
        let state = self.clone();
        if !self.scheduler.start(interval, move || {
            let state = state.clone();
            async move {
                state.run_sync().await;
            }
        }) {
            return false;
        }

        let mut status = self.status.write().await;
        status.is_running = true;
        status.next_sync = Some(next_after(Utc::now(), interval));
        true
    }

    /// Stop the periodic timer and persist checksums. Returns `false` when it
    /// was not running.
    pub async fn stop_scheduler(&self) -> bool {
        if !self.scheduler.stop() {
            return false;
        }
        {
            let mut status = self.status.write().await;
            status.is_running = false;
            status.next_sync = None;
        }
        self.engine.persist_checksums().await;
        true
    }

    /// Apply a settings change. Returns the new settings and whether a running
    /// timer was restarted with a new interval.
    pub async fn update_settings(&self, interval: Option<u64>, auto_start: Option<bool>) -> (SyncSettings, bool) {
        let (settings, interval_changed) = {
            let mut settings = self.settings.write().await;
            let old = settings.interval;
            if let Some(interval) = interval {
                settings.interval = interval;
            }
            if let Some(auto_start) = auto_start {
                settings.auto_start = auto_start;
            }
            (*settings, settings.interval != old)
        };

        let mut restarted = false;
        if interval_changed {
            let state = self.clone();
            restarted = self.scheduler.restart(settings.interval(), move || {
                let state = state.clone();
                async move {
                    state.run_sync().await;
                }
            });
            if restarted {
                self.status.write().await.next_sync = Some(next_after(Utc::now(), settings.interval()));
                tracing::info!(interval_ms = settings.interval, "sync interval restarted");
            }
        }
        (settings, restarted)
    }

    // -----------------------------------------------------------------------
    // Registry
    // -----------------------------------------------------------------------

    pub async fn create_mapping(&self, new: NewMapping) -> Result<Mapping, DaemonError> {
        let mut registry = self.registry.write().await;
        let mut next = registry.clone();
        let mapping = next.create(new)?;
        self.persist_registry(&next).await?;
        *registry = next;
        tracing::info!(id = %mapping.id, name = %mapping.name, "mapping created");
        Ok(mapping)
    }

    pub async fn update_mapping(&self, id: &str, patch: MappingPatch) -> Result<Mapping, DaemonError> {
        let mut registry = self.registry.write().await;
        let mut next = registry.clone();
        let mapping = next.update(id, patch)?;
        self.persist_registry(&next).await?;
        *registry = next;
        tracing::info!(id = %mapping.id, "mapping updated");
        Ok(mapping)
    }

    pub async fn delete_mapping(&self, id: &str) -> Result<Mapping, DaemonError> {
        let mut registry = self.registry.write().await;
        let mut next = registry.clone();
        let mapping = next.delete(id)?;
        self.persist_registry(&next).await?;
        *registry = next;
        tracing::info!(id = %mapping.id, "mapping deleted");
        Ok(mapping)
    }

    /// Writes `next` to disk; callers swap it in only once this succeeds.
    async fn persist_registry(&self, next: &MappingRegistry) -> Result<(), DaemonError> {
        let snapshot = next.clone();
        let data_dir = self.inner.data_dir.clone();
        tokio::task::spawn_blocking(move || registry::save_at(&data_dir, &snapshot))
            .await
            .map_err(|err| DaemonError::Task {
                task: "registry save",
                message: err.to_string(),
            })??;
        Ok(())
    }
}

fn next_after(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    now + chrono::Duration::milliseconds(interval.as_millis() as i64)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use sheetsync_engine::rate_limiter::DEFAULT_WINDOW;
    use sheetsync_engine::{store_path_at, ChecksumStore, MemorySheets, RateLimiter};
    use tempfile::TempDir;

    use super::*;

    pub(crate) fn test_state(sheets: &Arc<MemorySheets>) -> (AppState, TempDir) {
        let tmp = TempDir::new().expect("tmp");
        let engine = SyncEngine::new(
            sheets.clone(),
            Arc::new(RateLimiter::new(80, DEFAULT_WINDOW)),
            ChecksumStore::new(store_path_at(tmp.path())),
        );
        let state = AppState::new(
            engine,
            MappingRegistry::default(),
            SyncSettings {
                interval: 300_000,
                auto_start: false,
            },
            tmp.path(),
        );
        (state, tmp)
    }
}
