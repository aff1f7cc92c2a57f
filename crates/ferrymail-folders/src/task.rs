//! Background task runner
//!
//! Runs work off the screen loop and posts its outcome back as a message.

use crate::TaskError;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Spawns keyed tasks whose completions are delivered as messages of type `M`
pub struct TaskRunner<M> {
    tx: mpsc::UnboundedSender<M>,
    running: HashMap<&'static str, JoinHandle<()>>,
}

impl<M: Send + 'static> TaskRunner<M> {
    pub fn new(tx: mpsc::UnboundedSender<M>) -> Self {
        Self {
            tx,
            running: HashMap::new(),
        }
    }

    /// A key stays busy until its completion has been handled with [`finished`]
    ///
    /// [`finished`]: TaskRunner::finished
    pub fn is_running(&self, key: &str) -> bool {
        self.running.contains_key(key)
    }

    /// Run `work` and send `complete(result)` when it is done
    ///
    /// Returns `false` without starting anything if `key` is already running.
    pub fn execute<T, E, Fut, C>(&mut self, key: &'static str, work: Fut, complete: C) -> bool
    where
        T: Send + 'static,
        E: Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        C: FnOnce(Result<T, TaskError<E>>) -> M + Send + 'static,
    {
        if self.is_running(key) {
            debug!("Task {} already running", key);
            return false;
        }

        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            debug!("Task {} started", key);

            // The work runs in its own task so a panic is reported instead of lost
            let result = match tokio::spawn(work).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(TaskError::Failed(e)),
                Err(e) if e.is_panic() => {
                    error!("Task {} panicked", key);
                    Err(TaskError::Panicked(key))
                }
                Err(_) => Err(TaskError::Cancelled(key)),
            };

            debug!("Task {} finished", key);
            if tx.send(complete(result)).is_err() {
                debug!("Task {} completed after its receiver went away", key);
            }
        });

        self.running.insert(key, handle);
        true
    }

    /// Release `key` once its completion message has been handled
    pub fn finished(&mut self, key: &str) {
        self.running.remove(key);
    }

    /// Drop the completions of all in-flight tasks
    pub fn cancel_all(&mut self) {
        for (key, handle) in self.running.drain() {
            if !handle.is_finished() {
                debug!("Cancelling task {}", key);
                handle.abort();
            }
        }
    }
}

impl<M> Drop for TaskRunner<M> {
    fn drop(&mut self) {
        for handle in self.running.values() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[derive(Debug)]
    enum Msg {
        Done(Result<u32, TaskError<String>>),
    }

    #[tokio::test]
    async fn test_completion_is_delivered() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut runner = TaskRunner::new(tx);

        assert!(runner.execute("test:ok", async { Ok::<_, String>(7) }, Msg::Done));
        match rx.recv().await {
            Some(Msg::Done(Ok(7))) => {}
            other => panic!("unexpected message {:?}", other),
        }

        assert!(runner.execute(
            "test:err",
            async { Err::<u32, _>("boom".to_string()) },
            Msg::Done
        ));
        match rx.recv().await {
            Some(Msg::Done(Err(TaskError::Failed(e)))) => assert_eq!(e, "boom"),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_same_key_runs_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut runner = TaskRunner::new(tx);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let work = async move {
            let _ = release_rx.await;
            Ok::<_, String>(1)
        };
        assert!(runner.execute("test:slow", work, Msg::Done));
        assert!(runner.is_running("test:slow"));
        assert!(!runner.execute("test:slow", async { Ok::<_, String>(2) }, Msg::Done));

        release_tx.send(()).unwrap();
        assert!(matches!(rx.recv().await, Some(Msg::Done(Ok(1)))));

        // Completed but not yet handled: still busy
        assert!(runner.is_running("test:slow"));
        assert!(!runner.execute("test:slow", async { Ok::<_, String>(2) }, Msg::Done));

        runner.finished("test:slow");
        assert!(!runner.is_running("test:slow"));
        assert!(runner.execute("test:slow", async { Ok::<_, String>(3) }, Msg::Done));
        assert!(matches!(rx.recv().await, Some(Msg::Done(Ok(3)))));
    }

    #[tokio::test]
    async fn test_panic_is_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut runner = TaskRunner::new(tx);

        let work = async {
            if true {
                panic!("worker failed");
            }
            Ok::<u32, String>(0)
        };
        runner.execute("test:panic", work, Msg::Done);
        match rx.recv().await {
            Some(Msg::Done(Err(TaskError::Panicked(key)))) => assert_eq!(key, "test:panic"),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_completion_is_dropped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut runner = TaskRunner::new(tx);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let work = async move {
            let _ = release_rx.await;
            Ok::<_, String>(1)
        };
        runner.execute("test:cancel", work, Msg::Done);
        runner.cancel_all();
        assert!(!runner.is_running("test:cancel"));

        let _ = release_tx.send(());
        drop(runner);
        assert!(rx.recv().await.is_none());
    }
}
