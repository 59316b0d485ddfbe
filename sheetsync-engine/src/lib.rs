//! # sheetsync-engine
//!
//! Checksum-driven one-way sheet synchronization.
//!
//! [`SyncEngine::run_cycle`] mirrors every mapping's source tab into its
//! destination tab; [`SyncEngine::apply_push`] applies a single webhook edit.
//! Remote access goes through a [`SheetGateway`]: [`GoogleSheetsClient`] in
//! production, [`MemorySheets`] in tests.

pub mod auth;
pub mod checksum_store;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod rate_limiter;
pub mod retry;
pub mod sheets_api;

pub use auth::{ServiceAccountAuth, ServiceAccountKey};
pub use checksum_store::{store_path_at, ChecksumStore};
pub use engine::{
    decide, CycleOutcome, CycleReport, Decision, Direction, PushOutcome, PushUpdate, SyncEngine,
};
pub use error::SyncError;
pub use gateway::{batch_read, batch_write, fingerprint, RangeUpdate, SheetGateway};
pub use memory::MemorySheets;
pub use rate_limiter::RateLimiter;
pub use retry::{with_retry, RetryPolicy};
pub use sheets_api::{GoogleSheetsClient, TokenSource};
