//! Database storage using SQLite

use crate::account::{Account, ConnectionState, Folder, FolderSummary};
use crate::{CoreError, CoreResult};
use sqlx::{sqlite::SqlitePoolOptions, Executor, Pool, Sqlite, Transaction};
use std::path::Path;
use tokio::sync::watch;
use tracing::{debug, info};

const FOLDER_COLUMNS: &str = "f.id, f.account_id, f.name, f.folder_type, f.hide, f.synchronize, \
     f.unified, f.message_count, f.unread_count, f.sync_state, f.last_sync";

const ACCOUNT_COLUMNS: &str = "id, name, synchronize, on_demand, state";

/// Name of the queued operation that asks the sync service to synchronize a folder
pub const OPERATION_SYNC: &str = "sync";

/// Which folders a folder list shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderScope {
    /// Folders of all accounts
    Unified,
    /// Folders of one account
    Account(i64),
}

impl FolderScope {
    /// Scope from a raw account id, where a negative id selects the unified view
    pub fn from_account_id(id: i64) -> Self {
        if id < 0 {
            FolderScope::Unified
        } else {
            FolderScope::Account(id)
        }
    }

    pub fn account_id(&self) -> Option<i64> {
        match self {
            FolderScope::Unified => None,
            FolderScope::Account(id) => Some(*id),
        }
    }
}

/// Queued operation record
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DbOperation {
    pub id: i64,
    pub folder_id: i64,
    pub name: String,
    /// Unix timestamp in milliseconds
    pub created: i64,
}

/// Database connection pool
pub struct Database {
    pool: Pool<Sqlite>,
    /// Bumped after every committed write, drives live queries
    changes: watch::Sender<u64>,
}

impl Database {
    /// Open or create a database at the given path
    pub async fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", path.display());
        info!("Opening database at {}", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        let db = Self::with_pool(pool);
        db.initialize().await?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub async fn open_memory() -> CoreResult<Self> {
        // A single connection that never expires, otherwise the memory database vanishes
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let db = Self::with_pool(pool);
        db.initialize().await?;

        Ok(db)
    }

    fn with_pool(pool: Pool<Sqlite>) -> Self {
        let (changes, _) = watch::channel(0);
        Self { pool, changes }
    }

    /// Initialize the database schema
    async fn initialize(&self) -> CoreResult<()> {
        debug!("Initializing database schema");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                synchronize INTEGER NOT NULL DEFAULT 1,
                on_demand INTEGER NOT NULL DEFAULT 0,
                state TEXT,
                created_at TEXT DEFAULT (datetime('now')),
                updated_at TEXT DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                folder_type TEXT NOT NULL DEFAULT 'other',
                hide INTEGER NOT NULL DEFAULT 0,
                synchronize INTEGER NOT NULL DEFAULT 1,
                unified INTEGER NOT NULL DEFAULT 0,
                message_count INTEGER NOT NULL DEFAULT 0,
                unread_count INTEGER NOT NULL DEFAULT 0,
                sync_state TEXT,
                last_sync INTEGER,
                created_at TEXT DEFAULT (datetime('now')),
                updated_at TEXT DEFAULT (datetime('now')),
                UNIQUE(account_id, name)
            );

            CREATE TABLE IF NOT EXISTS operations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                folder_id INTEGER NOT NULL REFERENCES folders(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                created INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_folders_account ON folders(account_id);
            CREATE INDEX IF NOT EXISTS idx_operations_folder ON operations(folder_id);
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Database schema initialized");
        Ok(())
    }

    /// Receiver that observes every committed write
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify_changed(&self) {
        self.changes.send_modify(|generation| *generation += 1);
    }

    /// Start a transaction; dropping it without [`DbTransaction::commit`] rolls back
    pub async fn begin(&self) -> CoreResult<DbTransaction<'_>> {
        let tx = self.pool.begin().await?;
        Ok(DbTransaction { db: self, tx })
    }

    /// Insert or update an account, returning its id
    ///
    /// An id of `0` lets the database assign one.
    pub async fn upsert_account(&self, account: &Account) -> CoreResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO accounts (id, name, synchronize, on_demand, state)
            VALUES (NULLIF(?, 0), ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                synchronize = excluded.synchronize,
                on_demand = excluded.on_demand,
                state = excluded.state,
                updated_at = datetime('now')
            RETURNING id
            "#,
        )
        .bind(account.id)
        .bind(&account.name)
        .bind(account.synchronize)
        .bind(account.on_demand)
        .bind(account.state)
        .fetch_one(&self.pool)
        .await?;

        self.notify_changed();
        Ok(id)
    }

    /// Get an account by id
    pub async fn get_account(&self, id: i64) -> CoreResult<Option<Account>> {
        fetch_account(&self.pool, id).await
    }

    /// Get all accounts
    pub async fn get_accounts(&self) -> CoreResult<Vec<Account>> {
        let accounts = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts ORDER BY name COLLATE NOCASE",
            ACCOUNT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(accounts)
    }

    /// Delete an account together with its folders and operations
    pub async fn delete_account(&self, account_id: i64) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM operations WHERE folder_id IN (SELECT id FROM folders WHERE account_id = ?)",
        )
        .bind(account_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM folders WHERE account_id = ?")
            .bind(account_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(account_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Deleted account {}", account_id);
        self.notify_changed();
        Ok(())
    }

    /// Update the connection state of an account
    pub async fn set_account_state(
        &self,
        account_id: i64,
        state: Option<ConnectionState>,
    ) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE accounts SET state = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(state)
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::AccountNotFound(account_id));
        }

        self.notify_changed();
        Ok(())
    }

    /// Insert or update a folder, returning its id
    ///
    /// Folders are unique per account and name; the id of `folder` is ignored.
    pub async fn upsert_folder(&self, folder: &Folder) -> CoreResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO folders (
                account_id, name, folder_type, hide, synchronize, unified,
                message_count, unread_count
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(account_id, name) DO UPDATE SET
                folder_type = excluded.folder_type,
                hide = excluded.hide,
                synchronize = excluded.synchronize,
                unified = excluded.unified,
                message_count = excluded.message_count,
                unread_count = excluded.unread_count,
                updated_at = datetime('now')
            RETURNING id
            "#,
        )
        .bind(folder.account_id)
        .bind(&folder.name)
        .bind(&folder.folder_type)
        .bind(folder.hide)
        .bind(folder.synchronize)
        .bind(folder.unified)
        .bind(folder.message_count)
        .bind(folder.unread_count)
        .fetch_one(&self.pool)
        .await?;

        self.notify_changed();
        Ok(id)
    }

    /// Get a folder by id
    pub async fn get_folder(&self, folder_id: i64) -> CoreResult<Option<Folder>> {
        let folder = sqlx::query_as::<_, Folder>(&format!(
            "SELECT {} FROM folders f WHERE f.id = ?",
            FOLDER_COLUMNS
        ))
        .bind(folder_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(folder)
    }

    /// Get folders for an account
    pub async fn get_folders(&self, account_id: i64) -> CoreResult<Vec<Folder>> {
        let folders = sqlx::query_as::<_, Folder>(&format!(
            "SELECT {} FROM folders f WHERE f.account_id = ? ORDER BY f.name COLLATE NOCASE",
            FOLDER_COLUMNS
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(folders)
    }

    /// Hide or unhide a folder in the default folder list
    pub async fn set_folder_hidden(&self, folder_id: i64, hide: bool) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE folders SET hide = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(hide)
        .bind(folder_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::FolderNotFound(folder_id));
        }

        self.notify_changed();
        Ok(())
    }

    /// Update the transient sync state of a folder (e.g. "syncing")
    pub async fn set_folder_sync_state(
        &self,
        folder_id: i64,
        sync_state: Option<&str>,
    ) -> CoreResult<()> {
        sqlx::query("UPDATE folders SET sync_state = ? WHERE id = ?")
            .bind(sync_state)
            .bind(folder_id)
            .execute(&self.pool)
            .await?;

        self.notify_changed();
        Ok(())
    }

    /// Record a completed synchronization and clear the sync state
    pub async fn mark_folder_synced(&self, folder_id: i64, last_sync: i64) -> CoreResult<()> {
        sqlx::query(
            r#"
            UPDATE folders SET
                sync_state = NULL,
                last_sync = ?,
                updated_at = datetime('now')
            WHERE id = ?
            "#,
        )
        .bind(last_sync)
        .bind(folder_id)
        .execute(&self.pool)
        .await?;

        self.notify_changed();
        Ok(())
    }

    /// Folder summaries for a folder list, in display order
    ///
    /// Returns `None` when the scope names an account that does not exist.
    pub async fn folder_summaries(
        &self,
        scope: FolderScope,
    ) -> CoreResult<Option<Vec<FolderSummary>>> {
        if let FolderScope::Account(id) = scope {
            if self.get_account(id).await?.is_none() {
                return Ok(None);
            }
        }

        let summaries = sqlx::query_as::<_, FolderSummary>(&format!(
            r#"
            SELECT {},
                   a.name AS account_name,
                   (SELECT COUNT(*) FROM operations o WHERE o.folder_id = f.id) AS pending_operations
            FROM folders f
            JOIN accounts a ON a.id = f.account_id
            WHERE ?1 IS NULL OR f.account_id = ?1
            ORDER BY a.name COLLATE NOCASE, f.name COLLATE NOCASE
            "#,
            FOLDER_COLUMNS
        ))
        .bind(scope.account_id())
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(summaries))
    }

    /// Queued operations of a folder, oldest first
    pub async fn get_operations(&self, folder_id: i64) -> CoreResult<Vec<DbOperation>> {
        let operations = sqlx::query_as::<_, DbOperation>(
            "SELECT id, folder_id, name, created FROM operations WHERE folder_id = ? ORDER BY id",
        )
        .bind(folder_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(operations)
    }

    /// Remove and count the queued operations of a folder
    pub async fn take_operations(&self, folder_id: i64) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM operations WHERE folder_id = ?")
            .bind(folder_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            self.notify_changed();
        }
        Ok(result.rows_affected())
    }
}

/// A unit of work against the database
///
/// Rolled back on drop unless committed.
pub struct DbTransaction<'a> {
    db: &'a Database,
    tx: Transaction<'static, Sqlite>,
}

impl DbTransaction<'_> {
    /// Get an account by id
    pub async fn get_account(&mut self, id: i64) -> CoreResult<Option<Account>> {
        fetch_account(&mut *self.tx, id).await
    }

    /// Folders that take part in unified synchronization, across enabled accounts
    pub async fn folders_synchronizing_unified(&mut self) -> CoreResult<Vec<Folder>> {
        let folders = sqlx::query_as::<_, Folder>(&format!(
            r#"
            SELECT {}
            FROM folders f
            JOIN accounts a ON a.id = f.account_id
            WHERE a.synchronize AND f.synchronize AND f.unified
            ORDER BY f.account_id, f.name COLLATE NOCASE
            "#,
            FOLDER_COLUMNS
        ))
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(folders)
    }

    /// Folders of an account that an on-demand sync covers
    pub async fn folders_on_demand_sync(&mut self, account_id: i64) -> CoreResult<Vec<Folder>> {
        let folders = sqlx::query_as::<_, Folder>(&format!(
            r#"
            SELECT {}
            FROM folders f
            WHERE f.account_id = ? AND f.synchronize
            ORDER BY f.name COLLATE NOCASE
            "#,
            FOLDER_COLUMNS
        ))
        .bind(account_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(folders)
    }

    /// Queue a sync operation for a folder unless one is already pending
    ///
    /// Returns whether an operation was added.
    pub async fn enqueue_sync(&mut self, folder_id: i64) -> CoreResult<bool> {
        let created = chrono::Utc::now().timestamp_millis();
        let result = sqlx::query(
            r#"
            INSERT INTO operations (folder_id, name, created)
            SELECT ?1, ?2, ?3
            WHERE NOT EXISTS (
                SELECT 1 FROM operations WHERE folder_id = ?1 AND name = ?2
            )
            "#,
        )
        .bind(folder_id)
        .bind(OPERATION_SYNC)
        .bind(created)
        .execute(&mut *self.tx)
        .await?;

        let queued = result.rows_affected() > 0;
        if queued {
            debug!("Queued sync operation for folder {}", folder_id);
        }
        Ok(queued)
    }

    /// Commit and notify live queries
    pub async fn commit(self) -> CoreResult<()> {
        self.tx.commit().await?;
        self.db.notify_changed();
        Ok(())
    }
}

async fn fetch_account<'e, E>(executor: E, id: i64) -> CoreResult<Option<Account>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let account = sqlx::query_as::<_, Account>(&format!(
        "SELECT {} FROM accounts WHERE id = ?",
        ACCOUNT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(account)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (Database, i64, i64) {
        let db = Database::open_memory().await.unwrap();

        let work = db.upsert_account(&Account::new(0, "Work")).await.unwrap();
        let mut home = Account::new(0, "Home");
        home.on_demand = true;
        let home = db.upsert_account(&home).await.unwrap();

        db.upsert_folder(&Folder::new(work, "INBOX")).await.unwrap();
        db.upsert_folder(&Folder::new(work, "Archive")).await.unwrap();
        db.upsert_folder(&Folder::new(home, "INBOX")).await.unwrap();
        let mut spam = Folder::new(home, "Spam");
        spam.synchronize = false;
        db.upsert_folder(&spam).await.unwrap();

        (db, work, home)
    }

    #[tokio::test]
    async fn test_account_roundtrip() {
        let (db, work, home) = seeded().await;

        let account = db.get_account(home).await.unwrap().unwrap();
        assert_eq!(account.name, "Home");
        assert!(account.on_demand);
        assert_eq!(account.state, None);

        db.set_account_state(work, Some(ConnectionState::Connected))
            .await
            .unwrap();
        let account = db.get_account(work).await.unwrap().unwrap();
        assert!(account.is_connected());

        assert!(db.get_account(999).await.unwrap().is_none());
        assert!(matches!(
            db.set_account_state(999, None).await,
            Err(CoreError::AccountNotFound(999))
        ));

        let names: Vec<_> = db
            .get_accounts()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["Home", "Work"]);
    }

    #[tokio::test]
    async fn test_upsert_folder_keeps_id() {
        let (db, work, _) = seeded().await;

        let mut inbox = Folder::new(work, "INBOX");
        let first = db.upsert_folder(&inbox).await.unwrap();
        inbox.unread_count = 7;
        let second = db.upsert_folder(&inbox).await.unwrap();
        assert_eq!(first, second);

        let stored = db.get_folder(first).await.unwrap().unwrap();
        assert_eq!(stored.unread_count, 7);
        assert_eq!(db.get_folders(work).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_folder_summaries_scope() {
        let (db, work, _) = seeded().await;

        let unified = db.folder_summaries(FolderScope::Unified).await.unwrap().unwrap();
        let labels: Vec<_> = unified
            .iter()
            .map(|s| format!("{}/{}", s.account_name, s.folder.name))
            .collect();
        assert_eq!(
            labels,
            vec!["Home/INBOX", "Home/Spam", "Work/Archive", "Work/INBOX"]
        );

        let single = db
            .folder_summaries(FolderScope::Account(work))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(single.len(), 2);
        assert!(single.iter().all(|s| s.folder.account_id == work));

        assert!(db
            .folder_summaries(FolderScope::Account(999))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_sync_queries() {
        let (db, work, home) = seeded().await;
        let mut tx = db.begin().await.unwrap();

        let unified = tx.folders_synchronizing_unified().await.unwrap();
        assert_eq!(unified.len(), 2);
        assert!(unified.iter().all(|f| f.name == "INBOX"));

        let on_demand = tx.folders_on_demand_sync(home).await.unwrap();
        assert_eq!(on_demand.len(), 1);
        assert_eq!(on_demand[0].name, "INBOX");

        assert_eq!(tx.folders_on_demand_sync(work).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_enqueue_sync_is_idempotent() {
        let (db, work, _) = seeded().await;
        let inbox = db.get_folders(work).await.unwrap()[1].id;

        let mut tx = db.begin().await.unwrap();
        assert!(tx.enqueue_sync(inbox).await.unwrap());
        assert!(!tx.enqueue_sync(inbox).await.unwrap());
        tx.commit().await.unwrap();

        let operations = db.get_operations(inbox).await.unwrap();
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].name, OPERATION_SYNC);

        let summaries = db
            .folder_summaries(FolderScope::Account(work))
            .await
            .unwrap()
            .unwrap();
        let summary = summaries.iter().find(|s| s.folder.id == inbox).unwrap();
        assert_eq!(summary.pending_operations, 1);

        assert_eq!(db.take_operations(inbox).await.unwrap(), 1);
        assert!(db.get_operations(inbox).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_drop() {
        let (db, work, _) = seeded().await;
        let inbox = db.get_folders(work).await.unwrap()[1].id;

        {
            let mut tx = db.begin().await.unwrap();
            tx.enqueue_sync(inbox).await.unwrap();
        }

        assert!(db.get_operations(inbox).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_account_removes_folders() {
        let (db, _, home) = seeded().await;
        db.delete_account(home).await.unwrap();

        assert!(db.get_account(home).await.unwrap().is_none());
        assert!(db.get_folders(home).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_writes_bump_changes() {
        let (db, work, _) = seeded().await;
        let mut changes = db.subscribe_changes();
        changes.borrow_and_update();

        let inbox = db.get_folders(work).await.unwrap()[1].id;
        db.set_folder_hidden(inbox, true).await.unwrap();
        assert!(changes.has_changed().unwrap());
    }

    #[test]
    fn test_scope_from_account_id() {
        assert_eq!(FolderScope::from_account_id(-1), FolderScope::Unified);
        assert_eq!(FolderScope::from_account_id(3), FolderScope::Account(3));
        assert_eq!(FolderScope::Account(3).account_id(), Some(3));
    }
}
