mod entry;

pub use entry::{Entry, EntryUpdate, NewEntry, UnpublishedCount, CHESS_KIND, TEXT_KIND};
