use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Category tag for daily chess puzzles. These are published to YouTube by a
/// separate flow and are excluded from the regular upload queue.
pub const CHESS_KIND: &str = "chess";

/// Riddle shorts; the raw material for long-form compilations.
pub const TEXT_KIND: &str = "text";

/// One content-production work item as persisted in the `entries` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: i64,
    pub audio_path: String,
    pub title: String,
    pub description: String,
    pub thumbnail_text: String,
    pub answer: String,
    pub generated_video_path: Option<String>,
    pub generated_thumbnail_path: Option<String>,
    pub uploaded_to_youtube: bool,
    pub uploaded_to_x: bool,
    pub youtube_video_id: Option<String>,
    pub tweet_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub chess_meta: Option<String>,
    pub chess_fen: Option<String>,
    pub added_to_long_form: Option<String>,
    pub uploaded_to_youtube_at: Option<DateTime<Utc>>,
}

/// Fields accepted when submitting a new entry.
///
/// The five strings are required and must be non-blank. Everything else an
/// entry carries starts out null/false; only the category tag, the opaque
/// chess puzzle data and the long-form marker may be supplied up front.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewEntry {
    pub audio_path: String,
    pub title: String,
    pub description: String,
    pub thumbnail_text: String,
    pub answer: String,
    pub kind: Option<String>,
    pub chess_meta: Option<String>,
    pub chess_fen: Option<String>,
    pub added_to_long_form: Option<String>,
}

impl NewEntry {
    pub fn new(
        audio_path: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        thumbnail_text: impl Into<String>,
        answer: impl Into<String>,
    ) -> Self {
        Self {
            audio_path: audio_path.into(),
            title: title.into(),
            description: description.into(),
            thumbnail_text: thumbnail_text.into(),
            answer: answer.into(),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Name of the first required field that is empty or whitespace-only.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("audioPath", &self.audio_path),
            ("title", &self.title),
            ("description", &self.description),
            ("thumbnailText", &self.thumbnail_text),
            ("answer", &self.answer),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

/// The complete desired state of an entry's mutable fields.
///
/// Updates replace the whole row: any field the caller leaves out, or sends
/// as `null`, is written as its default (`""` for the text columns, null for
/// optional columns, false for the upload flags).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EntryUpdate {
    #[serde(deserialize_with = "null_as_empty")]
    pub audio_path: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub thumbnail_text: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub answer: String,
    pub generated_video_path: Option<String>,
    pub generated_thumbnail_path: Option<String>,
    pub uploaded_to_youtube: bool,
    pub uploaded_to_x: bool,
    pub youtube_video_id: Option<String>,
    pub tweet_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub chess_meta: Option<String>,
    pub chess_fen: Option<String>,
    pub added_to_long_form: Option<String>,
    pub uploaded_to_youtube_at: Option<DateTime<Utc>>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl From<Entry> for EntryUpdate {
    fn from(entry: Entry) -> Self {
        Self {
            audio_path: entry.audio_path,
            title: entry.title,
            description: entry.description,
            thumbnail_text: entry.thumbnail_text,
            answer: entry.answer,
            generated_video_path: entry.generated_video_path,
            generated_thumbnail_path: entry.generated_thumbnail_path,
            uploaded_to_youtube: entry.uploaded_to_youtube,
            uploaded_to_x: entry.uploaded_to_x,
            youtube_video_id: entry.youtube_video_id,
            tweet_id: entry.tweet_id,
            kind: entry.kind,
            chess_meta: entry.chess_meta,
            chess_fen: entry.chess_fen,
            added_to_long_form: entry.added_to_long_form,
            uploaded_to_youtube_at: entry.uploaded_to_youtube_at,
        }
    }
}

/// Number of entries of one category still waiting for a YouTube upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpublishedCount {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_reports_first_blank_required_field() {
        let entry = NewEntry::new("audio/a.wav", "Title", "  ", "", "42");
        assert_eq!(entry.missing_field(), Some("description"));

        let complete = NewEntry::new("audio/a.wav", "Title", "Desc", "Thumb", "42");
        assert_eq!(complete.missing_field(), None);
    }

    #[test]
    fn update_json_fills_omitted_fields_with_defaults() {
        let update: EntryUpdate =
            serde_json::from_str(r#"{"title":"Only title","uploadedToYoutube":true}"#).unwrap();

        assert_eq!(update.title, "Only title");
        assert_eq!(update.audio_path, "");
        assert!(update.uploaded_to_youtube);
        assert!(!update.uploaded_to_x);
        assert_eq!(update.generated_video_path, None);
        assert_eq!(update.kind, None);
    }

    #[test]
    fn update_json_treats_null_text_as_empty() {
        let update: EntryUpdate =
            serde_json::from_str(r#"{"title":null,"answer":"42","addedToLongForm":null}"#).unwrap();

        assert_eq!(update.title, "");
        assert_eq!(update.answer, "42");
        assert_eq!(update.added_to_long_form, None);
    }

    #[test]
    fn entry_serializes_with_camel_case_keys() {
        let entry = Entry {
            id: 7,
            audio_path: "audio/a.wav".into(),
            title: "T".into(),
            description: "D".into(),
            thumbnail_text: "Th".into(),
            answer: "A".into(),
            generated_video_path: None,
            generated_thumbnail_path: None,
            uploaded_to_youtube: false,
            uploaded_to_x: false,
            youtube_video_id: None,
            tweet_id: None,
            kind: Some(CHESS_KIND.into()),
            chess_meta: None,
            chess_fen: Some("8/8/8/8/8/8/8/8 w - - 0 1".into()),
            added_to_long_form: None,
            uploaded_to_youtube_at: None,
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["audioPath"], "audio/a.wav");
        assert_eq!(json["uploadedToYoutube"], false);
        assert_eq!(json["type"], "chess");
        assert_eq!(json["chessFen"], "8/8/8/8/8/8/8/8 w - - 0 1");
        assert!(json["generatedVideoPath"].is_null());
    }
}
