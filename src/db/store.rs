use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tokio::sync::mpsc;
use tokio_rusqlite::Connection;

use crate::error::{StoreError, StoreResult};
use crate::models::{Entry, EntryUpdate, NewEntry, UnpublishedCount, CHESS_KIND, TEXT_KIND};

use super::backup::{Backup, BackupOutcome};
use super::schema::{ADDED_COLUMNS, ENTRY_COLUMNS, SCHEMA, SCHEMA_VERSION};

/// Unpublished work first, newest first within each group.
const LIST_ORDER: &str =
    "ORDER BY COALESCE(uploadedToYoutube, 0) != 0 ASC, COALESCE(uploadedToYoutube, 0) DESC, id DESC";

/// Durable CRUD over the `entries` table with a rolling backup after every
/// mutation.
///
/// Cloning is cheap and every clone talks to the same background connection,
/// which is what serializes writes.
#[derive(Clone)]
pub struct EntryStore {
    conn: Connection,
    backup: Backup,
}

impl EntryStore {
    /// Open (or create) the store and hand the backup completion channel to
    /// the caller, who is expected to log what arrives on it.
    pub async fn open_with_backup_events(
        db_path: impl AsRef<Path>,
        backup_path: impl Into<PathBuf>,
    ) -> StoreResult<(Self, mpsc::UnboundedReceiver<BackupOutcome>)> {
        let conn = Connection::open(db_path.as_ref())
            .await
            .map_err(StoreError::StorageInit)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let backup = Backup::new(conn.clone(), backup_path.into(), tx);
        let store = Self { conn, backup };
        store.initialize().await?;

        Ok((store, rx))
    }

    /// Create the table if absent and add any columns an older table lacks.
    /// Safe to call on every start.
    pub async fn initialize(&self) -> StoreResult<()> {
        let (previous, added) = self
            .conn
            .call(|conn| {
                let tx = conn.transaction()?;
                tx.execute_batch(SCHEMA)?;

                let existing = existing_columns(&tx)?;
                let mut added = Vec::new();
                for column in ADDED_COLUMNS.iter().filter(|c| !existing.contains(c.name)) {
                    tx.execute_batch(&format!(
                        "ALTER TABLE entries ADD COLUMN \"{}\" {}",
                        column.name, column.definition
                    ))?;
                    added.push(format!("{} (v{})", column.name, column.version));
                }

                let previous: i64 = tx.query_row("PRAGMA user_version", [], |row| row.get(0))?;
                if previous < SCHEMA_VERSION {
                    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
                }
                tx.commit()?;
                Ok((previous, added))
            })
            .await
            .map_err(StoreError::StorageInit)?;

        if !added.is_empty() {
            tracing::info!(
                from = previous,
                to = SCHEMA_VERSION,
                "Upgraded entries table, added columns: {}",
                added.join(", ")
            );
        }
        Ok(())
    }

    pub async fn schema_version(&self) -> StoreResult<i64> {
        self.conn
            .call(|conn| Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?))
            .await
            .map_err(StoreError::StorageRead)
    }

    pub fn backup_path(&self) -> &Path {
        self.backup.path()
    }

    // Mutations

    pub async fn submit(&self, entry: NewEntry) -> StoreResult<Entry> {
        if let Some(field) = entry.missing_field() {
            return Err(StoreError::Validation(format!("{field} is required")));
        }

        let created = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO entries (audioPath, title, description, thumbnailText, answer,
                                           generatedVideoPath, generatedThumbnailPath,
                                           uploadedToYoutube, uploadedToX, type, chess_meta, chess_fen,
                                           addedToLongForm)
                       VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, 0, 0, ?6, ?7, ?8, ?9)"#,
                    params![
                        entry.audio_path,
                        entry.title,
                        entry.description,
                        entry.thumbnail_text,
                        entry.answer,
                        entry.kind,
                        entry.chess_meta,
                        entry.chess_fen,
                        entry.added_to_long_form,
                    ],
                )?;
                let id = conn.last_insert_rowid();
                let created = conn.query_row(
                    &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?1"),
                    params![id],
                    entry_from_row,
                )?;
                Ok(created)
            })
            .await
            .map_err(StoreError::StorageWrite)?;

        tracing::info!(id = created.id, "Entry submitted: {}", created.title);
        self.backup.spawn("submit", Some(created.id));
        Ok(created)
    }

    /// Replace every mutable field of an entry. Fields the caller did not set
    /// are written as their defaults.
    pub async fn update(&self, id: i64, update: EntryUpdate) -> StoreResult<()> {
        let values: Vec<Value> = vec![
            update.audio_path.into(),
            update.title.into(),
            update.description.into(),
            update.thumbnail_text.into(),
            update.answer.into(),
            update.generated_video_path.into(),
            update.generated_thumbnail_path.into(),
            update.uploaded_to_youtube.into(),
            update.uploaded_to_x.into(),
            update.youtube_video_id.into(),
            update.tweet_id.into(),
            update.kind.into(),
            update.chess_meta.into(),
            update.chess_fen.into(),
            update.added_to_long_form.into(),
            update
                .uploaded_to_youtube_at
                .map(|at| at.timestamp_millis())
                .into(),
            id.into(),
        ];

        self.update_entry(
            "update",
            id,
            r#"UPDATE entries SET
                   audioPath = ?1, title = ?2, description = ?3, thumbnailText = ?4, answer = ?5,
                   generatedVideoPath = ?6, generatedThumbnailPath = ?7,
                   uploadedToYoutube = ?8, uploadedToX = ?9,
                   youtubeVideoId = ?10, tweetId = ?11,
                   type = ?12, chess_meta = ?13, chess_fen = ?14,
                   addedToLongForm = ?15, uploadedToYoutubeAt = ?16
               WHERE id = ?17"#,
            values,
        )
        .await
    }

    /// Remove an entry. Deleting an id that does not exist is not an error.
    pub async fn delete(&self, id: i64) -> StoreResult<()> {
        let removed = self
            .conn
            .call(move |conn| Ok(conn.execute("DELETE FROM entries WHERE id = ?1", params![id])?))
            .await
            .map_err(StoreError::StorageWrite)?;

        if removed == 0 {
            tracing::debug!(id, "Delete matched no entry");
        } else {
            tracing::info!(id, "Entry deleted");
        }
        self.backup.spawn("delete", Some(id));
        Ok(())
    }

    /// Remove every entry of `kind` that has no generated video yet, returning
    /// how many went. Used to clear half-built compilations before a rebuild.
    pub async fn delete_pending_of_type(&self, kind: impl Into<String>) -> StoreResult<usize> {
        let kind = kind.into();
        let removed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM entries
                     WHERE (generatedVideoPath IS NULL OR generatedVideoPath = '')
                       AND type = ?1",
                    params![kind],
                )?)
            })
            .await
            .map_err(StoreError::StorageWrite)?;

        tracing::info!(removed, "Pending entries pruned");
        self.backup.spawn("delete_pending_of_type", None);
        Ok(removed)
    }

    // Status updates reported by the generation and publishing steps

    pub async fn mark_generated(
        &self,
        id: i64,
        video_path: impl Into<String>,
        thumbnail_path: impl Into<String>,
    ) -> StoreResult<()> {
        self.update_entry(
            "mark_generated",
            id,
            "UPDATE entries SET generatedVideoPath = ?1, generatedThumbnailPath = ?2 WHERE id = ?3",
            vec![
                Value::Text(video_path.into()),
                Value::Text(thumbnail_path.into()),
                id.into(),
            ],
        )
        .await
    }

    pub async fn mark_uploaded_to_youtube(
        &self,
        id: i64,
        video_id: impl Into<String>,
    ) -> StoreResult<()> {
        self.update_entry(
            "mark_uploaded_to_youtube",
            id,
            "UPDATE entries SET uploadedToYoutube = 1, uploadedToYoutubeAt = ?1, youtubeVideoId = ?2
             WHERE id = ?3",
            vec![
                Utc::now().timestamp_millis().into(),
                Value::Text(video_id.into()),
                id.into(),
            ],
        )
        .await
    }

    pub async fn mark_uploaded_to_x(&self, id: i64, tweet_id: impl Into<String>) -> StoreResult<()> {
        self.update_entry(
            "mark_uploaded_to_x",
            id,
            "UPDATE entries SET uploadedToX = 1, tweetId = ?1 WHERE id = ?2",
            vec![Value::Text(tweet_id.into()), id.into()],
        )
        .await
    }

    pub async fn set_audio_path(&self, id: i64, audio_path: impl Into<String>) -> StoreResult<()> {
        let audio_path: String = audio_path.into();
        if audio_path.trim().is_empty() {
            return Err(StoreError::Validation("audioPath is required".to_string()));
        }

        self.update_entry(
            "set_audio_path",
            id,
            "UPDATE entries SET audioPath = ?1 WHERE id = ?2",
            vec![Value::Text(audio_path), id.into()],
        )
        .await
    }

    /// Run a single-row UPDATE, failing with `NotFound` when it matched
    /// nothing, and back up after it committed.
    async fn update_entry(
        &self,
        operation: &'static str,
        id: i64,
        sql: &'static str,
        values: Vec<Value>,
    ) -> StoreResult<()> {
        let changed = self
            .conn
            .call(move |conn| Ok(conn.execute(sql, params_from_iter(values))?))
            .await
            .map_err(StoreError::StorageWrite)?;

        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }

        tracing::info!(id, operation, "Entry updated");
        self.backup.spawn(operation, Some(id));
        Ok(())
    }

    /// Take a snapshot right now and wait for it. Unlike the automatic
    /// backups, failures are returned to the caller.
    pub async fn backup_now(&self) -> StoreResult<()> {
        self.backup.run().await.map_err(StoreError::StorageWrite)?;
        tracing::info!(path = %self.backup.path().display(), "Manual backup written");
        Ok(())
    }

    // Queries

    pub async fn get(&self, id: i64) -> StoreResult<Option<Entry>> {
        self.conn
            .call(move |conn| {
                let entry = conn
                    .query_row(
                        &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?1"),
                        params![id],
                        entry_from_row,
                    )
                    .optional()?;
                Ok(entry)
            })
            .await
            .map_err(StoreError::StorageRead)
    }

    /// Every entry, unpublished work first. Recomputed on each call.
    pub async fn list_all(&self) -> StoreResult<Vec<Entry>> {
        self.query_entries(format!("SELECT {ENTRY_COLUMNS} FROM entries {LIST_ORDER}"), Vec::new())
            .await
    }

    /// Entries still waiting for a generated video, oldest first.
    pub async fn pending_generation(&self, kind: Option<String>) -> StoreResult<Vec<Entry>> {
        self.query_entries(
            format!(
                "SELECT {ENTRY_COLUMNS} FROM entries
                 WHERE (generatedVideoPath IS NULL OR generatedVideoPath = '')
                   AND (?1 IS NULL OR type = ?1)
                 ORDER BY id ASC"
            ),
            vec![kind.into()],
        )
        .await
    }

    /// Generated entries not yet on YouTube. Chess puzzles are left out.
    pub async fn ready_for_youtube(&self) -> StoreResult<Vec<Entry>> {
        self.query_entries(
            format!(
                "SELECT {ENTRY_COLUMNS} FROM entries
                 WHERE COALESCE(generatedVideoPath, '') != ''
                   AND COALESCE(generatedThumbnailPath, '') != ''
                   AND COALESCE(uploadedToYoutube, 0) = 0
                   AND COALESCE(type, '') != ?1
                 ORDER BY id ASC"
            ),
            vec![CHESS_KIND.to_string().into()],
        )
        .await
    }

    /// Entries on YouTube for at least `min_age` and not yet posted to X.
    ///
    /// Rows without a recorded upload time fall back to the flag itself,
    /// which older rows used to hold the time in milliseconds. A bare `1`
    /// therefore always counts as old enough.
    pub async fn ready_for_x(&self, min_age: Duration) -> StoreResult<Vec<Entry>> {
        let cutoff = Utc::now()
            .checked_sub_signed(min_age)
            .map_or(i64::MIN, |at| at.timestamp_millis());
        self.query_entries(
            format!(
                "SELECT {ENTRY_COLUMNS} FROM entries
                 WHERE COALESCE(uploadedToYoutube, 0) != 0
                   AND COALESCE(uploadedToX, 0) = 0
                   AND COALESCE(generatedThumbnailPath, '') != ''
                   AND COALESCE(uploadedToYoutubeAt, uploadedToYoutube) <= ?1
                 ORDER BY id ASC"
            ),
            vec![cutoff.into()],
        )
        .await
    }

    /// Generated text entries not yet folded into a long-form compilation,
    /// newest first.
    pub async fn long_form_candidates(&self, limit: i64) -> StoreResult<Vec<Entry>> {
        self.query_entries(
            format!(
                "SELECT {ENTRY_COLUMNS} FROM entries
                 WHERE type = ?1
                   AND COALESCE(generatedVideoPath, '') != ''
                   AND (addedToLongForm IS NULL OR addedToLongForm = '')
                 ORDER BY id DESC
                 LIMIT ?2"
            ),
            vec![TEXT_KIND.to_string().into(), limit.into()],
        )
        .await
    }

    /// Answers already used, optionally for one type, so producers can avoid
    /// repeating themselves.
    pub async fn answers(&self, kind: Option<String>) -> StoreResult<Vec<String>> {
        self.conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT answer FROM entries WHERE (?1 IS NULL OR type = ?1) ORDER BY id")?;
                let answers = stmt
                    .query_map(params![kind], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(answers)
            })
            .await
            .map_err(StoreError::StorageRead)
    }

    pub async fn find_by_chess_fen(&self, fen: impl Into<String>) -> StoreResult<Option<Entry>> {
        let fen = fen.into();
        let mut found = self
            .query_entries(
                format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries
                     WHERE type = ?1 AND chess_fen = ?2
                     ORDER BY id ASC LIMIT 1"
                ),
                vec![CHESS_KIND.to_string().into(), fen.into()],
            )
            .await?;
        Ok(found.pop())
    }

    pub async fn unpublished_counts_by_type(&self) -> StoreResult<Vec<UnpublishedCount>> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT type, COUNT(*) FROM entries
                       WHERE COALESCE(uploadedToYoutube, 0) = 0
                       GROUP BY type
                       ORDER BY type"#,
                )?;
                let counts = stmt
                    .query_map([], |row| {
                        Ok(UnpublishedCount {
                            kind: row.get(0)?,
                            count: row.get(1)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(counts)
            })
            .await
            .map_err(StoreError::StorageRead)
    }

    async fn query_entries(&self, sql: String, values: Vec<Value>) -> StoreResult<Vec<Entry>> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let entries = stmt
                    .query_map(params_from_iter(values), entry_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await
            .map_err(StoreError::StorageRead)
    }
}

fn existing_columns(conn: &rusqlite::Connection) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare("PRAGMA table_info(entries)")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(names)
}

/// Upload flags are 0/1, but older rows hold the upload time in
/// milliseconds. Anything non-zero counts as uploaded.
fn flag(row: &Row, idx: usize) -> rusqlite::Result<bool> {
    Ok(row.get::<_, Option<i64>>(idx)?.unwrap_or(0) != 0)
}

/// The recorded upload time, or for older rows the millisecond value the
/// flag column itself held.
fn uploaded_at(row: &Row) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let millis = match row.get::<_, Option<i64>>(16)? {
        Some(at) => Some(at),
        None => row.get::<_, Option<i64>>(8)?.filter(|flag| *flag > 1),
    };
    Ok(millis.and_then(DateTime::from_timestamp_millis))
}

fn entry_from_row(row: &Row) -> rusqlite::Result<Entry> {
    Ok(Entry {
        id: row.get(0)?,
        audio_path: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        thumbnail_text: row.get(4)?,
        answer: row.get(5)?,
        generated_video_path: row.get(6)?,
        generated_thumbnail_path: row.get(7)?,
        uploaded_to_youtube: flag(row, 8)?,
        uploaded_to_x: flag(row, 9)?,
        kind: row.get(10)?,
        youtube_video_id: row.get(11)?,
        tweet_id: row.get(12)?,
        chess_meta: row.get(13)?,
        chess_fen: row.get(14)?,
        added_to_long_form: row.get(15)?,
        uploaded_to_youtube_at: uploaded_at(row)?,
    })
}
