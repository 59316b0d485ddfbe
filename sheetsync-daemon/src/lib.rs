//! Sync daemon: HTTP admin API, webhook ingress and the periodic full-sync
//! scheduler around a [`sheetsync_engine::SyncEngine`].

pub mod api;
pub mod config;
mod error;
pub mod paths;
mod runtime;
pub mod scheduler;
pub mod state;

pub use api::router;
pub use config::{DaemonConfig, LogFormat};
pub use error::DaemonError;
pub use runtime::{build_state, run, start_blocking};
pub use scheduler::Scheduler;
pub use state::{AppState, SyncSettings, SyncStatus};
