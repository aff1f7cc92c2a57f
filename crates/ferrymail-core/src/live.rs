//! Live queries
//!
//! A live query runs once on subscription and again after every committed write,
//! pushing the result to an [`Observer`] until the [`Subscription`] is dropped.

use crate::account::{Account, FolderSummary};
use crate::database::{Database, FolderScope};
use crate::CoreResult;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Notification delivered to an observer
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent<T> {
    /// The query produced a new value
    Changed(T),
    /// The observed data went away; no further events follow
    Closed,
}

/// Receiver of live query notifications
pub trait Observer<T>: Send + 'static {
    fn on_event(&mut self, event: LiveEvent<T>);
}

impl<T, F> Observer<T> for F
where
    F: FnMut(LiveEvent<T>) + Send + 'static,
{
    fn on_event(&mut self, event: LiveEvent<T>) {
        self(event)
    }
}

/// Disposal token of a live query; dropping it stops delivery
#[must_use = "the live query stops when the subscription is dropped"]
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Whether the query still delivers events
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl Database {
    /// Observe one account; `Changed(None)` while it does not exist
    pub fn live_account<O>(self: &Arc<Self>, account_id: i64, observer: O) -> Subscription
    where
        O: Observer<Option<Account>>,
    {
        spawn_live(
            Arc::clone(self),
            move |db| async move { db.get_account(account_id).await.map(Some) },
            observer,
        )
    }

    /// Observe the folder summaries of a scope
    ///
    /// Closes when the scoped account is deleted.
    pub fn live_folders<O>(self: &Arc<Self>, scope: FolderScope, observer: O) -> Subscription
    where
        O: Observer<Vec<FolderSummary>>,
    {
        spawn_live(
            Arc::clone(self),
            move |db| async move { db.folder_summaries(scope).await },
            observer,
        )
    }
}

/// Run `query` now and after every change; `Ok(None)` closes the subscription
fn spawn_live<T, Q, Fut, O>(db: Arc<Database>, query: Q, mut observer: O) -> Subscription
where
    T: Clone + PartialEq + Send + 'static,
    Q: Fn(Arc<Database>) -> Fut + Send + 'static,
    Fut: Future<Output = CoreResult<Option<T>>> + Send,
    O: Observer<T>,
{
    let handle = tokio::spawn(async move {
        let mut changes = db.subscribe_changes();
        let mut last: Option<T> = None;

        loop {
            changes.borrow_and_update();

            match query(Arc::clone(&db)).await {
                Ok(Some(value)) => {
                    if last.as_ref() != Some(&value) {
                        last = Some(value.clone());
                        observer.on_event(LiveEvent::Changed(value));
                    }
                }
                Ok(None) => {
                    debug!("Live query target went away");
                    observer.on_event(LiveEvent::Closed);
                    break;
                }
                Err(e) => {
                    warn!("Live query failed: {}", e);
                    observer.on_event(LiveEvent::Closed);
                    break;
                }
            }

            if changes.changed().await.is_err() {
                observer.on_event(LiveEvent::Closed);
                break;
            }
        }
    });

    Subscription { handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Folder;
    use tokio::sync::mpsc;

    fn channel_observer<T: Send + 'static>() -> (
        impl Observer<T>,
        mpsc::UnboundedReceiver<LiveEvent<T>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let observer = move |event: LiveEvent<T>| {
            let _ = tx.send(event);
        };
        (observer, rx)
    }

    #[tokio::test]
    async fn test_live_folders_follows_writes() {
        let db = Arc::new(Database::open_memory().await.unwrap());
        let account = db.upsert_account(&Account::new(0, "Work")).await.unwrap();

        let (observer, mut rx) = channel_observer();
        let _subscription = db.live_folders(FolderScope::Account(account), observer);

        assert_eq!(rx.recv().await, Some(LiveEvent::Changed(vec![])));

        db.upsert_folder(&Folder::new(account, "INBOX")).await.unwrap();
        match rx.recv().await {
            Some(LiveEvent::Changed(folders)) => {
                assert_eq!(folders.len(), 1);
                assert_eq!(folders[0].account_name, "Work");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_live_folders_closes_when_account_deleted() {
        let db = Arc::new(Database::open_memory().await.unwrap());
        let account = db.upsert_account(&Account::new(0, "Work")).await.unwrap();

        let (observer, mut rx) = channel_observer();
        let subscription = db.live_folders(FolderScope::Account(account), observer);
        assert!(matches!(rx.recv().await, Some(LiveEvent::Changed(_))));

        db.delete_account(account).await.unwrap();
        assert_eq!(rx.recv().await, Some(LiveEvent::Closed));

        tokio::task::yield_now().await;
        assert_eq!(rx.recv().await, None);
        assert!(!subscription.is_active());
    }

    #[tokio::test]
    async fn test_live_account_reports_absence() {
        let db = Arc::new(Database::open_memory().await.unwrap());

        let (observer, mut rx) = channel_observer();
        let _subscription = db.live_account(1, observer);
        assert_eq!(rx.recv().await, Some(LiveEvent::Changed(None)));

        db.upsert_account(&Account::new(1, "Work")).await.unwrap();
        match rx.recv().await {
            Some(LiveEvent::Changed(Some(account))) => assert_eq!(account.name, "Work"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_subscription_stops_delivery() {
        let db = Arc::new(Database::open_memory().await.unwrap());

        let (observer, mut rx) = channel_observer();
        let subscription = db.live_folders(FolderScope::Unified, observer);
        assert!(matches!(rx.recv().await, Some(LiveEvent::Changed(_))));

        drop(subscription);
        let account = db.upsert_account(&Account::new(0, "Work")).await.unwrap();
        db.upsert_folder(&Folder::new(account, "INBOX")).await.unwrap();

        // The observer went down with the aborted task, closing the channel
        assert_eq!(rx.recv().await, None);
    }
}
