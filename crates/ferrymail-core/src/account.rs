//! Account and folder entities

use serde::{Deserialize, Serialize};

/// Connection state reported by the sync service for an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Closing,
    Closed,
}

/// Represents an email account
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Account {
    /// Unique identifier
    pub id: i64,
    /// Display name
    pub name: String,
    /// Whether the account is enabled at all
    pub synchronize: bool,
    /// Synchronize only when explicitly asked to, instead of keeping a connection open
    pub on_demand: bool,
    /// Last connection state, `None` if the service never touched the account
    pub state: Option<ConnectionState>,
}

impl Account {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            synchronize: true,
            on_demand: false,
            state: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == Some(ConnectionState::Connected)
    }
}

/// Folder record
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Folder {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
    pub folder_type: String,
    /// Excluded from the default folder list
    pub hide: bool,
    /// Eligible for synchronization (on-demand accounts sync exactly these)
    pub synchronize: bool,
    /// Participates in the unified inbox
    pub unified: bool,
    pub message_count: i64,
    pub unread_count: i64,
    pub sync_state: Option<String>,
    /// Unix timestamp in milliseconds
    pub last_sync: Option<i64>,
}

impl Folder {
    pub fn new(account_id: i64, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: 0,
            account_id,
            folder_type: guess_folder_type(&name),
            unified: name.eq_ignore_ascii_case("inbox"),
            name,
            hide: false,
            synchronize: true,
            message_count: 0,
            unread_count: 0,
            sync_state: None,
            last_sync: None,
        }
    }
}

/// Folder plus the derived fields the folder list displays
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct FolderSummary {
    #[sqlx(flatten)]
    pub folder: Folder,
    pub account_name: String,
    /// Queued operations not yet processed by the sync service
    pub pending_operations: i64,
}

/// Guess folder type from its name
pub fn guess_folder_type(name: &str) -> String {
    let lower = name.to_lowercase();
    if lower == "inbox" {
        "inbox".to_string()
    } else if lower.contains("sent") {
        "sent".to_string()
    } else if lower.contains("draft") {
        "drafts".to_string()
    } else if lower.contains("trash") || lower.contains("deleted") {
        "trash".to_string()
    } else if lower.contains("spam") || lower.contains("junk") {
        "spam".to_string()
    } else if lower.contains("archive") {
        "archive".to_string()
    } else {
        "other".to_string()
    }
}
