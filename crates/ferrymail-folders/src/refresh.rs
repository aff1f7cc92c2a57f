//! Pull-to-refresh of a folder list
//!
//! The whole refresh is planned inside one transaction. Reachability is decided
//! before anything is committed: if any folder needs the network and it is not
//! reachable, the transaction is rolled back and nothing is dispatched.

use crate::RefreshError;
use ferrymail_core::{
    Connectivity, CoreError, CoreResult, Database, DbTransaction, FolderScope, SyncService,
};
use tracing::{debug, info};

/// Reason given to the sync service when a refresh reloads it
pub const REFRESH_REASON: &str = "refresh folders";

/// What a refresh is going to do
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshPlan {
    /// At least one folder is synchronized right away
    pub now: bool,
    /// Some folder needed the network and it was not reachable
    pub no_internet: bool,
    /// Folders to sync immediately, after commit
    pub sync_now: Vec<i64>,
    /// Folders that got a queued sync operation
    pub queued: Vec<i64>,
    /// Reload the whole sync service, after commit
    pub reload: bool,
}

/// Refresh the folders of `scope`
///
/// Returns whether synchronization happens now (`false`: deferred until the
/// account connects).
pub async fn refresh_folders(
    db: &Database,
    sync: &dyn SyncService,
    connectivity: &dyn Connectivity,
    scope: FolderScope,
) -> Result<bool, RefreshError> {
    let internet = connectivity.is_reachable().await;

    let mut tx = db.begin().await?;
    let plan = plan_refresh(&mut tx, scope, internet).await?;

    if plan.no_internet {
        info!("Refresh of {:?} needs the network, which is unreachable", scope);
        return Err(RefreshError::NoInternet);
    }

    tx.commit().await?;

    for folder_id in &plan.sync_now {
        sync.sync_folder(*folder_id).await?;
    }
    if plan.reload {
        sync.reload(REFRESH_REASON).await?;
    }

    debug!(
        "Refreshed {:?}: now={} immediate={} queued={} reload={}",
        scope,
        plan.now,
        plan.sync_now.len(),
        plan.queued.len(),
        plan.reload
    );
    Ok(plan.now)
}

/// Decide per folder how it gets synchronized, queueing operations in `tx`
pub async fn plan_refresh(
    tx: &mut DbTransaction<'_>,
    scope: FolderScope,
    internet: bool,
) -> CoreResult<RefreshPlan> {
    let mut plan = RefreshPlan::default();

    match scope {
        FolderScope::Unified => {
            for folder in tx.folders_synchronizing_unified().await? {
                let account = tx
                    .get_account(folder.account_id)
                    .await?
                    .ok_or(CoreError::AccountNotFound(folder.account_id))?;

                if account.on_demand {
                    if internet {
                        plan.now = true;
                        plan.sync_now.push(folder.id);
                    } else {
                        plan.no_internet = true;
                    }
                } else {
                    if account.is_connected() {
                        plan.now = true;
                    }
                    tx.enqueue_sync(folder.id).await?;
                    plan.queued.push(folder.id);
                }
            }
        }
        FolderScope::Account(account_id) => {
            let account = tx
                .get_account(account_id)
                .await?
                .ok_or(CoreError::AccountNotFound(account_id))?;

            if !internet {
                plan.no_internet = true;
            } else if account.on_demand {
                plan.now = true;
                plan.sync_now = tx
                    .folders_on_demand_sync(account_id)
                    .await?
                    .into_iter()
                    .map(|folder| folder.id)
                    .collect();
            } else {
                plan.now = true;
                plan.reload = true;
            }
        }
    }

    Ok(plan)
}
