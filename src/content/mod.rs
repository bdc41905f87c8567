mod decode;
pub mod merge;
pub mod reader;
pub mod record;
pub mod sort;
pub mod writer;


pub use merge::merge_readers;
pub use reader::ContentReader;
pub use record::{convert_record, Record, SortEnvelope, SortableRecord};
pub use sort::{
    merge_sorted_readers, sort_by_calculated_key, sort_by_calculated_key_with, sort_reader,
    sort_reader_with, SortOptions,
};
pub use writer::ContentWriter;
