//! Sync service
//!
//! The [`SyncEngine`] runs in a background tokio task and drains the operation
//! queue; callers talk to it through a [`SyncHandle`].

use crate::account::ConnectionState;
use crate::{CoreError, CoreResult, Database};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Requests the folder list can make of the sync service
#[async_trait]
pub trait SyncService: Send + Sync {
    /// Synchronize one folder right away
    async fn sync_folder(&self, folder_id: i64) -> CoreResult<()>;

    /// Restart synchronization of all continuously synchronized accounts
    async fn reload(&self, reason: &str) -> CoreResult<()>;
}

/// Commands sent to the sync engine
#[derive(Debug, Clone)]
pub enum SyncCommand {
    /// Sync a specific folder
    SyncFolder { folder_id: i64 },
    /// Reconnect every continuously synchronized account
    Reload { reason: String },
    /// Stop the sync engine
    Shutdown,
}

/// Events sent from sync engine to UI
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Sync started for a folder
    SyncStarted { folder_id: i64 },
    /// Sync completed for a folder
    SyncCompleted { folder_id: i64, operations: u64 },
    /// Sync failed for a folder
    SyncFailed { folder_id: i64, error: String },
    /// Reload finished
    Reloaded { reason: String, accounts: usize },
    /// Error occurred
    Error { message: String },
}

/// Sync engine that runs in a background tokio task
pub struct SyncEngine {
    database: Arc<Database>,
    command_rx: mpsc::Receiver<SyncCommand>,
    event_tx: mpsc::Sender<SyncEvent>,
}

impl SyncEngine {
    /// Create a new sync engine
    pub fn new(
        database: Arc<Database>,
        command_rx: mpsc::Receiver<SyncCommand>,
        event_tx: mpsc::Sender<SyncEvent>,
    ) -> Self {
        Self {
            database,
            command_rx,
            event_tx,
        }
    }

    /// Spawn an engine on the current runtime
    ///
    /// Returns the handle to talk to it, its event stream and the task handle.
    pub fn spawn(
        database: Arc<Database>,
    ) -> (SyncHandle, mpsc::Receiver<SyncEvent>, JoinHandle<()>) {
        let (cmd_tx, cmd_rx, evt_tx, evt_rx) = create_sync_channels();
        let engine = Self::new(database, cmd_rx, evt_tx);
        let task = tokio::spawn(engine.run());
        (SyncHandle::new(cmd_tx), evt_rx, task)
    }

    /// Run the sync engine
    pub async fn run(mut self) {
        info!("Sync engine started");

        while let Some(command) = self.command_rx.recv().await {
            match command {
                SyncCommand::Shutdown => {
                    info!("Sync engine shutting down");
                    break;
                }
                cmd => {
                    if let Err(e) = self.handle_command(cmd).await {
                        error!("Error handling sync command: {}", e);
                        self.emit(SyncEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                    }
                }
            }
        }

        info!("Sync engine stopped");
    }

    /// Handle a sync command
    async fn handle_command(&mut self, command: SyncCommand) -> CoreResult<()> {
        match command {
            SyncCommand::SyncFolder { folder_id } => {
                self.sync_folder(folder_id).await?;
            }
            SyncCommand::Reload { reason } => {
                self.reload(&reason).await?;
            }
            SyncCommand::Shutdown => unreachable!(),
        }

        Ok(())
    }

    async fn emit(&self, event: SyncEvent) {
        // Nobody listening is fine
        let _ = self.event_tx.send(event).await;
    }

    /// Sync a specific folder
    async fn sync_folder(&mut self, folder_id: i64) -> CoreResult<()> {
        let folder = self
            .database
            .get_folder(folder_id)
            .await?
            .ok_or(CoreError::FolderNotFound(folder_id))?;

        debug!("Syncing folder {} ({})", folder.name, folder_id);
        self.emit(SyncEvent::SyncStarted { folder_id }).await;

        match self.sync_folder_internal(folder_id).await {
            Ok(operations) => {
                self.emit(SyncEvent::SyncCompleted {
                    folder_id,
                    operations,
                })
                .await;
                Ok(())
            }
            Err(e) => {
                self.emit(SyncEvent::SyncFailed {
                    folder_id,
                    error: e.to_string(),
                })
                .await;
                Err(e)
            }
        }
    }

    /// Drain queued operations and record the sync time
    async fn sync_folder_internal(&mut self, folder_id: i64) -> CoreResult<u64> {
        self.database
            .set_folder_sync_state(folder_id, Some("syncing"))
            .await?;

        let operations = self.database.take_operations(folder_id).await?;
        let now = chrono::Utc::now().timestamp_millis();
        self.database.mark_folder_synced(folder_id, now).await?;

        debug!(
            "Folder sync completed: {} ({} operations)",
            folder_id, operations
        );
        Ok(operations)
    }

    /// Reconnect all continuously synchronized accounts
    async fn reload(&mut self, reason: &str) -> CoreResult<()> {
        info!("Reloading synchronization: {}", reason);

        let accounts = self.database.get_accounts().await?;
        let mut reloaded = 0;

        for account in accounts.iter().filter(|a| a.synchronize && !a.on_demand) {
            self.database
                .set_account_state(account.id, Some(ConnectionState::Connecting))
                .await?;

            for folder in self.database.get_folders(account.id).await? {
                if !folder.synchronize {
                    continue;
                }
                if let Err(e) = self.sync_folder(folder.id).await {
                    warn!("Sync of folder {} failed during reload: {}", folder.id, e);
                }
            }

            self.database
                .set_account_state(account.id, Some(ConnectionState::Connected))
                .await?;
            reloaded += 1;
        }

        self.emit(SyncEvent::Reloaded {
            reason: reason.to_string(),
            accounts: reloaded,
        })
        .await;

        Ok(())
    }
}

/// Cloneable handle that forwards requests to a running [`SyncEngine`]
#[derive(Debug, Clone)]
pub struct SyncHandle {
    command_tx: mpsc::Sender<SyncCommand>,
}

impl SyncHandle {
    pub fn new(command_tx: mpsc::Sender<SyncCommand>) -> Self {
        Self { command_tx }
    }

    async fn send(&self, command: SyncCommand) -> CoreResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| CoreError::SyncError("sync engine stopped".to_string()))
    }

    /// Ask the engine to stop
    pub async fn shutdown(&self) -> CoreResult<()> {
        self.send(SyncCommand::Shutdown).await
    }
}

#[async_trait]
impl SyncService for SyncHandle {
    async fn sync_folder(&self, folder_id: i64) -> CoreResult<()> {
        self.send(SyncCommand::SyncFolder { folder_id }).await
    }

    async fn reload(&self, reason: &str) -> CoreResult<()> {
        self.send(SyncCommand::Reload {
            reason: reason.to_string(),
        })
        .await
    }
}

/// Create sync engine channels
/// Returns (command_sender, command_receiver, event_sender, event_receiver)
pub fn create_sync_channels() -> (
    mpsc::Sender<SyncCommand>,
    mpsc::Receiver<SyncCommand>,
    mpsc::Sender<SyncEvent>,
    mpsc::Receiver<SyncEvent>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<SyncCommand>(100);
    let (evt_tx, evt_rx) = mpsc::channel::<SyncEvent>(100);
    (cmd_tx, cmd_rx, evt_tx, evt_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Account, Folder};

    #[tokio::test]
    async fn test_sync_folder_drains_operations() {
        let db = Arc::new(Database::open_memory().await.unwrap());
        let account = db.upsert_account(&Account::new(0, "Work")).await.unwrap();
        let inbox = db.upsert_folder(&Folder::new(account, "INBOX")).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        tx.enqueue_sync(inbox).await.unwrap();
        tx.commit().await.unwrap();

        let (handle, mut events, task) = SyncEngine::spawn(Arc::clone(&db));
        handle.sync_folder(inbox).await.unwrap();

        assert_eq!(
            events.recv().await,
            Some(SyncEvent::SyncStarted { folder_id: inbox })
        );
        assert_eq!(
            events.recv().await,
            Some(SyncEvent::SyncCompleted {
                folder_id: inbox,
                operations: 1
            })
        );

        let folder = db.get_folder(inbox).await.unwrap().unwrap();
        assert!(folder.last_sync.is_some());
        assert_eq!(folder.sync_state, None);
        assert!(db.get_operations(inbox).await.unwrap().is_empty());

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_sync_unknown_folder_reports_error() {
        let db = Arc::new(Database::open_memory().await.unwrap());
        let (handle, mut events, _task) = SyncEngine::spawn(db);

        handle.sync_folder(42).await.unwrap();
        match events.recv().await {
            Some(SyncEvent::Error { message }) => assert!(message.contains("42")),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reload_connects_continuous_accounts() {
        let db = Arc::new(Database::open_memory().await.unwrap());
        let work = db.upsert_account(&Account::new(0, "Work")).await.unwrap();
        let mut home = Account::new(0, "Home");
        home.on_demand = true;
        let home = db.upsert_account(&home).await.unwrap();
        db.upsert_folder(&Folder::new(work, "INBOX")).await.unwrap();

        let (handle, mut events, _task) = SyncEngine::spawn(Arc::clone(&db));
        handle.reload("test").await.unwrap();

        loop {
            match events.recv().await {
                Some(SyncEvent::Reloaded { reason, accounts }) => {
                    assert_eq!(reason, "test");
                    assert_eq!(accounts, 1);
                    break;
                }
                Some(_) => continue,
                None => panic!("engine stopped"),
            }
        }

        assert!(db.get_account(work).await.unwrap().unwrap().is_connected());
        assert_eq!(db.get_account(home).await.unwrap().unwrap().state, None);
    }

    #[tokio::test]
    async fn test_stopped_engine_is_an_error() {
        let (cmd_tx, cmd_rx, _evt_tx, _evt_rx) = create_sync_channels();
        drop(cmd_rx);

        let handle = SyncHandle::new(cmd_tx);
        assert!(matches!(
            handle.reload("test").await,
            Err(CoreError::SyncError(_))
        ));
    }
}
