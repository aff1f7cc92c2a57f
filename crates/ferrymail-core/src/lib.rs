//! Core of FerryMail
//!
//! Provides storage, live queries, the sync service and preferences.

mod account;
mod config;
mod connectivity;
mod database;
mod error;
mod live;
mod prefs;
mod sync;

pub use account::{Account, ConnectionState, Folder, FolderSummary};
pub use config::Config;
pub use connectivity::{Connectivity, FixedConnectivity, ProbeConnectivity};
pub use database::{Database, DbTransaction, FolderScope, OPERATION_SYNC};
pub use error::{CoreError, CoreResult};
pub use live::{LiveEvent, Observer, Subscription};
pub use prefs::Preferences;
pub use sync::{SyncCommand, SyncEngine, SyncEvent, SyncHandle, SyncService};

/// Re-export models for convenience
pub mod models {
    pub use crate::database::DbOperation;
}
