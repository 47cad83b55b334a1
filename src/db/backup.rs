use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::DatabaseName;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rusqlite::Connection;

/// Completion report for one backup run. Only ever logged.
#[derive(Debug)]
pub struct BackupOutcome {
    pub operation: &'static str,
    /// `None` for bulk operations.
    pub entry_id: Option<i64>,
    pub path: PathBuf,
    pub finished_at: DateTime<Utc>,
    pub result: std::result::Result<(), String>,
}

/// Rolling single-file snapshot of the store.
#[derive(Clone)]
pub struct Backup {
    conn: Connection,
    path: PathBuf,
    events: mpsc::UnboundedSender<BackupOutcome>,
}

impl Backup {
    pub fn new(
        conn: Connection,
        path: PathBuf,
        events: mpsc::UnboundedSender<BackupOutcome>,
    ) -> Self {
        Self { conn, path, events }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy the whole database over the previous snapshot.
    ///
    /// Runs on the connection thread, so it is ordered after every write
    /// that was queued before it.
    pub async fn run(&self) -> std::result::Result<(), tokio_rusqlite::Error> {
        let path = self.path.clone();
        self.conn.call(move |conn| write_snapshot(conn, &path)).await
    }

    /// Fire-and-forget backup after a committed mutation. The outcome goes to
    /// the completion channel; the caller never waits on it.
    pub fn spawn(&self, operation: &'static str, entry_id: Option<i64>) {
        let backup = self.clone();
        tokio::spawn(async move {
            let result = backup.run().await.map_err(|e| e.to_string());
            let outcome = BackupOutcome {
                operation,
                entry_id,
                path: backup.path.clone(),
                finished_at: Utc::now(),
                result,
            };
            // Receiver gone means nobody is logging; nothing else to do.
            let _ = backup.events.send(outcome);
        });
    }
}

fn write_snapshot(conn: &rusqlite::Connection, path: &Path) -> tokio_rusqlite::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }

    let staging = staging_path(path);
    if staging.exists() {
        // leftover from an interrupted run
        std::fs::remove_file(&staging).map_err(io_error)?;
    }

    conn.backup(DatabaseName::Main, &staging, None)?;
    std::fs::rename(&staging, path).map_err(io_error)?;
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

fn io_error(e: std::io::Error) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Other(Box::new(e))
}

fn log_outcome(outcome: &BackupOutcome) {
    match &outcome.result {
        Ok(()) => tracing::debug!(
            operation = outcome.operation,
            entry_id = outcome.entry_id,
            path = %outcome.path.display(),
            finished_at = %outcome.finished_at,
            "Backup snapshot written"
        ),
        Err(e) => tracing::warn!(
            operation = outcome.operation,
            entry_id = outcome.entry_id,
            path = %outcome.path.display(),
            "Backup failed: {}",
            e
        ),
    }
}

/// Drain the completion channel into the log until every sender is gone.
pub fn spawn_outcome_logger(mut rx: mpsc::UnboundedReceiver<BackupOutcome>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(outcome) = rx.recv().await {
            log_outcome(&outcome);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_file_sits_next_to_backup() {
        let staging = staging_path(Path::new("/var/backups/entries.db"));
        assert_eq!(staging, PathBuf::from("/var/backups/entries.db.partial"));
    }
}
