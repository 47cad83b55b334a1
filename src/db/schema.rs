/// Current schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 4;

pub const SCHEMA: &str = r#"
-- entries table (full current column set)
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    audioPath TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    thumbnailText TEXT NOT NULL,
    answer TEXT NOT NULL,
    generatedVideoPath TEXT,
    generatedThumbnailPath TEXT,
    uploadedToYoutube INTEGER DEFAULT 0,
    uploadedToX INTEGER DEFAULT 0,
    type TEXT,
    youtubeVideoId TEXT,
    tweetId TEXT,
    chess_meta TEXT,
    chess_fen TEXT,
    addedToLongForm TEXT,
    uploadedToYoutubeAt INTEGER
);

CREATE INDEX IF NOT EXISTS idx_entries_uploaded_to_youtube ON entries(uploadedToYoutube);
"#;

/// A nullable column introduced after the first schema version.
pub struct AddedColumn {
    pub version: i64,
    pub name: &'static str,
    pub definition: &'static str,
}

/// Columns added since v1, in the order they were introduced. Existing
/// tables only ever gain these; nothing is dropped or retyped.
pub const ADDED_COLUMNS: &[AddedColumn] = &[
    AddedColumn { version: 2, name: "type", definition: "TEXT" },
    AddedColumn { version: 2, name: "youtubeVideoId", definition: "TEXT" },
    AddedColumn { version: 2, name: "tweetId", definition: "TEXT" },
    AddedColumn { version: 3, name: "chess_meta", definition: "TEXT" },
    AddedColumn { version: 3, name: "chess_fen", definition: "TEXT" },
    AddedColumn { version: 4, name: "addedToLongForm", definition: "TEXT" },
    // upload time in Unix milliseconds
    AddedColumn { version: 4, name: "uploadedToYoutubeAt", definition: "INTEGER" },
];

/// Column list shared by every query that materialises an `Entry`.
pub const ENTRY_COLUMNS: &str = "id, audioPath, title, description, thumbnailText, answer, \
     generatedVideoPath, generatedThumbnailPath, uploadedToYoutube, uploadedToX, \
     type, youtubeVideoId, tweetId, chess_meta, chess_fen, addedToLongForm, uploadedToYoutubeAt";

/// First-version table layout, before categories, upload ids and chess data.
#[cfg(test)]
pub const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    audioPath TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    thumbnailText TEXT NOT NULL,
    answer TEXT NOT NULL,
    generatedVideoPath TEXT,
    generatedThumbnailPath TEXT,
    uploadedToYoutube INTEGER DEFAULT 0,
    uploadedToX INTEGER DEFAULT 0
);
"#;

/// Layout after the chess columns arrived, before long-form tracking.
#[cfg(test)]
pub const SCHEMA_V3: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    audioPath TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    thumbnailText TEXT NOT NULL,
    answer TEXT NOT NULL,
    generatedVideoPath TEXT,
    generatedThumbnailPath TEXT,
    uploadedToYoutube INTEGER DEFAULT 0,
    uploadedToX INTEGER DEFAULT 0,
    type TEXT,
    youtubeVideoId TEXT,
    tweetId TEXT,
    chess_meta TEXT,
    chess_fen TEXT
);
PRAGMA user_version = 3;
"#;
