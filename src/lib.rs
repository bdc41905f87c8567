//! Bounded-memory streaming record engine over large JSON documents:
//! containers of shape `{"<arrayKey>":[...]}` are written, streamed,
//! concatenated and external-sorted one record at a time.

pub mod constants;
pub mod content;
pub mod error;

// Re-export main types for easier access
pub use content::{
    convert_record, merge_readers, merge_sorted_readers, sort_by_calculated_key,
    sort_by_calculated_key_with, sort_reader, sort_reader_with, ContentReader, ContentWriter,
    Record, SortEnvelope, SortOptions, SortableRecord,
};
pub use error::{Error, Result};
