use chrono::Duration;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::db::{spawn_outcome_logger, EntryStore};
use crate::error::{AppError, Result, StoreError};
use crate::models::{EntryUpdate, NewEntry};

pub const USAGE: &str = "usage: entry-store <command>

commands:
  init                                    create or upgrade the database
  list                                    all entries, unpublished first
  get <id>
  submit <audioPath> <title> <description> <thumbnailText> <answer> [type]
  update <id> <json>                      replace all mutable fields
  delete <id>
  mark-generated <id> <videoPath> <thumbnailPath>
  mark-youtube <id> <videoId>
  mark-x <id> <tweetId>
  set-audio <id> <audioPath>
  pending [type]                          entries without a generated video
  ready-youtube                           generated, not yet on YouTube
  ready-x [minutes]                       on YouTube for a while (default 5), not yet on X
  long-form [limit]                       generated text entries for the next compilation
  prune-pending <type>                    delete entries of a type with no video yet
  counts                                  unpublished entries per type
  answers [type]                          answers already used
  backup                                  write a snapshot now";

/// How long a YouTube upload settles before it is posted to X.
const DEFAULT_X_DELAY_MINUTES: i64 = 5;
const DEFAULT_LONG_FORM_LIMIT: i64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Init,
    List,
    Get(i64),
    Submit(NewEntry),
    Update(i64, EntryUpdate),
    Delete(i64),
    MarkGenerated {
        id: i64,
        video_path: String,
        thumbnail_path: String,
    },
    MarkYoutube { id: i64, video_id: String },
    MarkX { id: i64, tweet_id: String },
    SetAudio { id: i64, audio_path: String },
    Pending(Option<String>),
    ReadyYoutube,
    ReadyX { min_age_minutes: i64 },
    LongForm { limit: i64 },
    PrunePending(String),
    Counts,
    Answers(Option<String>),
    Backup,
}

impl Command {
    /// Parse command-line arguments, excluding the program name.
    pub fn parse(args: &[String]) -> Result<Self> {
        let Some((name, rest)) = args.split_first() else {
            return Err(AppError::Usage("missing command".to_string()));
        };
        let rest: Vec<&str> = rest.iter().map(String::as_str).collect();

        let command = match (name.as_str(), rest.as_slice()) {
            ("init", []) => Command::Init,
            ("list", []) => Command::List,
            ("get", [id]) => Command::Get(parse_id(id)?),
            ("submit", [audio, title, description, thumbnail, answer, kind @ ..]) if kind.len() <= 1 => {
                let entry = NewEntry::new(*audio, *title, *description, *thumbnail, *answer);
                match kind.first() {
                    Some(kind) => Command::Submit(entry.with_kind(*kind)),
                    None => Command::Submit(entry),
                }
            }
            ("update", [id, body]) => Command::Update(parse_id(id)?, serde_json::from_str(body)?),
            ("delete", [id]) => Command::Delete(parse_id(id)?),
            ("mark-generated", [id, video, thumbnail]) => Command::MarkGenerated {
                id: parse_id(id)?,
                video_path: video.to_string(),
                thumbnail_path: thumbnail.to_string(),
            },
            ("mark-youtube", [id, video_id]) => Command::MarkYoutube {
                id: parse_id(id)?,
                video_id: video_id.to_string(),
            },
            ("mark-x", [id, tweet_id]) => Command::MarkX {
                id: parse_id(id)?,
                tweet_id: tweet_id.to_string(),
            },
            ("set-audio", [id, path]) => Command::SetAudio {
                id: parse_id(id)?,
                audio_path: path.to_string(),
            },
            ("pending", []) => Command::Pending(None),
            ("pending", [kind]) => Command::Pending(Some(kind.to_string())),
            ("ready-youtube", []) => Command::ReadyYoutube,
            ("ready-x", []) => Command::ReadyX {
                min_age_minutes: DEFAULT_X_DELAY_MINUTES,
            },
            ("ready-x", [minutes]) => Command::ReadyX {
                min_age_minutes: parse_count(minutes)?,
            },
            ("long-form", []) => Command::LongForm {
                limit: DEFAULT_LONG_FORM_LIMIT,
            },
            ("long-form", [limit]) => Command::LongForm {
                limit: parse_count(limit)?,
            },
            ("prune-pending", [kind]) => Command::PrunePending(kind.to_string()),
            ("counts", []) => Command::Counts,
            ("answers", []) => Command::Answers(None),
            ("answers", [kind]) => Command::Answers(Some(kind.to_string())),
            ("backup", []) => Command::Backup,
            (other, _) => {
                return Err(AppError::Usage(format!(
                    "unknown command or wrong arguments: {other}"
                )))
            }
        };
        Ok(command)
    }
}

fn parse_id(raw: &str) -> Result<i64> {
    raw.parse()
        .map_err(|_| AppError::Usage(format!("invalid entry id: {raw}")))
}

fn parse_count(raw: &str) -> Result<i64> {
    match raw.parse::<i64>() {
        Ok(n) if n >= 0 => Ok(n),
        _ => Err(AppError::Usage(format!("expected a non-negative number: {raw}"))),
    }
}

pub struct App {
    store: EntryStore,
    backup_logger: JoinHandle<()>,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        config.ensure_data_dir()?;
        let (store, backup_events) =
            EntryStore::open_with_backup_events(&config.db_path, config.backup_path.clone()).await?;
        Ok(Self {
            store,
            backup_logger: spawn_outcome_logger(backup_events),
        })
    }

    /// Run one command against the store and return its JSON output.
    pub async fn handle_command(&self, command: Command) -> Result<Value> {
        let output = match command {
            Command::Init => json!({ "schemaVersion": self.store.schema_version().await? }),
            Command::List => serde_json::to_value(self.store.list_all().await?)?,
            Command::Get(id) => match self.store.get(id).await? {
                Some(entry) => serde_json::to_value(entry)?,
                None => return Err(StoreError::NotFound(id).into()),
            },
            Command::Submit(entry) => serde_json::to_value(self.store.submit(entry).await?)?,
            Command::Update(id, update) => {
                self.store.update(id, update).await?;
                json!({ "updated": id })
            }
            Command::Delete(id) => {
                self.store.delete(id).await?;
                json!({ "deleted": id })
            }
            Command::MarkGenerated {
                id,
                video_path,
                thumbnail_path,
            } => {
                self.store.mark_generated(id, video_path, thumbnail_path).await?;
                json!({ "updated": id })
            }
            Command::MarkYoutube { id, video_id } => {
                self.store.mark_uploaded_to_youtube(id, video_id).await?;
                json!({ "updated": id })
            }
            Command::MarkX { id, tweet_id } => {
                self.store.mark_uploaded_to_x(id, tweet_id).await?;
                json!({ "updated": id })
            }
            Command::SetAudio { id, audio_path } => {
                self.store.set_audio_path(id, audio_path).await?;
                json!({ "updated": id })
            }
            Command::Pending(kind) => serde_json::to_value(self.store.pending_generation(kind).await?)?,
            Command::ReadyYoutube => serde_json::to_value(self.store.ready_for_youtube().await?)?,
            Command::ReadyX { min_age_minutes } => {
                let min_age = Duration::try_minutes(min_age_minutes)
                    .ok_or_else(|| AppError::Usage(format!("delay too large: {min_age_minutes}")))?;
                serde_json::to_value(self.store.ready_for_x(min_age).await?)?
            }
            Command::LongForm { limit } => {
                serde_json::to_value(self.store.long_form_candidates(limit).await?)?
            }
            Command::PrunePending(kind) => {
                json!({ "deleted": self.store.delete_pending_of_type(kind).await? })
            }
            Command::Counts => serde_json::to_value(self.store.unpublished_counts_by_type().await?)?,
            Command::Answers(kind) => serde_json::to_value(self.store.answers(kind).await?)?,
            Command::Backup => {
                self.store.backup_now().await?;
                json!({ "backup": self.store.backup_path() })
            }
        };
        Ok(output)
    }

    /// Close the store and wait for in-flight backups so the process does
    /// not exit halfway through a snapshot.
    pub async fn shutdown(self) {
        let Self {
            store,
            backup_logger,
        } = self;
        drop(store);

        if let Err(e) = backup_logger.await {
            tracing::warn!("Backup logger stopped unexpectedly: {}", e);
        }
    }
}
