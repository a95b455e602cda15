//! Dedicated thread owning a [`HistoryDatabase`].
//!
//! The database is opened, used and dropped on the worker thread. Callers
//! submit closures over a `crossbeam-channel` queue; jobs run in submission
//! order.

use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Sender};

use super::{HistoryDatabase, HistoryDatabaseBuilder};
use crate::observability::spans;
use crate::{Error, Result};

type Job = Box<dyn FnOnce(&mut HistoryDatabase) + Send + 'static>;

/// Handle to the history thread. Dropping it drains queued jobs, closes
/// the database and joins the thread.
#[derive(Debug)]
pub struct HistoryThread {
    job_tx: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl HistoryThread {
    /// Spawn the thread and initialize the database at `path` on it.
    ///
    /// # Errors
    ///
    /// Returns the init error, or an internal error if the thread cannot be
    /// spawned.
    pub fn start(builder: HistoryDatabaseBuilder, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (job_tx, job_rx) = unbounded::<Job>();
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);

        let handle = thread::Builder::new()
            .name("history-thread".to_string())
            .spawn(move || {
                let mut db = match builder.init(&path) {
                    Ok(db) => {
                        let _ = ready_tx.send(Ok(()));
                        db
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                for job in job_rx {
                    let span = spans::job_span("job");
                    let _guard = span.enter();
                    job(&mut db);
                }
                tracing::debug!(path = %db.path(), "History thread shutting down");
            })
            .map_err(|e| Error::internal(format!("failed to spawn history thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                job_tx: Some(job_tx),
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(Error::internal("history thread exited during init"))
            }
        }
    }

    /// Queue `job` without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread is no longer running.
    pub fn post<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce(&mut HistoryDatabase) + Send + 'static,
    {
        self.job_tx
            .as_ref()
            .ok_or_else(|| Error::internal("history thread stopped"))?
            .send(Box::new(job))
            .map_err(|_| Error::internal("history thread stopped"))
    }

    /// Run `job` on the thread and wait for its result.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread stopped before replying.
    pub fn call<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut HistoryDatabase) -> T + Send + 'static,
    {
        let (reply_tx, reply_rx) = bounded(1);
        self.post(move |db| {
            let _ = reply_tx.send(job(db));
        })?;
        reply_rx
            .recv()
            .map_err(|_| Error::internal("history thread dropped the reply"))
    }
}

impl Drop for HistoryThread {
    fn drop(&mut self) {
        // Closing the queue ends the worker loop once it is drained.
        self.job_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("History thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::UrlRow;
    use crate::InitStatus;
    use tempfile::TempDir;

    #[test]
    fn test_call_and_post_run_in_order() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("History");
        let worker = HistoryThread::start(HistoryDatabase::builder(), &path).unwrap();

        for i in 0..3 {
            worker
                .post(move |db| {
                    db.urls()
                        .add_url(&UrlRow::new(format!("http://example.com/{i}")))
                        .unwrap();
                })
                .unwrap();
        }
        let count = worker.call(|db| db.urls().url_count()).unwrap().unwrap();
        assert_eq!(count, 3);

        let name = worker
            .call(|_| thread::current().name().map(str::to_string))
            .unwrap();
        assert_eq!(name.as_deref(), Some("history-thread"));

        drop(worker);
        let db = HistoryDatabase::builder().init(&path).unwrap();
        assert_eq!(db.urls().url_count().unwrap(), 3);
    }

    #[test]
    fn test_start_reports_init_failure() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("History");
        {
            let raw = rusqlite::Connection::open(&path).unwrap();
            raw.execute_batch(
                "CREATE TABLE meta (key LONGVARCHAR NOT NULL UNIQUE PRIMARY KEY, value LONGVARCHAR);
                 INSERT INTO meta VALUES ('version', '99'), ('last_compatible_version', '99');",
            )
            .unwrap();
        }

        let err = HistoryThread::start(HistoryDatabase::builder(), &path).unwrap_err();
        assert_eq!(err.init_status(), InitStatus::TooNew);
    }
}
