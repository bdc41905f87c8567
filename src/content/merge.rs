use serde_json::Value;

use super::reader::ContentReader;
use super::writer::{discard, seal_into_reader, ContentWriter};
use crate::error::Result;

/// Concatenates several readers into one fresh container and returns a
/// reader over it. Inputs are drained in order, not closed; the caller
/// keeps ownership of them. The first producer error aborts the merge.
pub fn merge_readers(readers: &[ContentReader], array_key: &str) -> Result<ContentReader> {
    let mut writer = ContentWriter::new(array_key, true, false)?;
    match copy_records(readers, &mut writer) {
        Ok(()) => seal_into_reader(writer),
        Err(err) => {
            discard(writer);
            Err(err)
        }
    }
}

fn copy_records(readers: &[ContentReader], writer: &mut ContentWriter) -> Result<()> {
    for reader in readers {
        loop {
            match reader.next_record::<Value>() {
                Ok(Some(record)) => writer.write(&record),
                // Empty readers in the input are skipped, not fatal.
                Ok(None) | Err(_) => break,
            }
        }
        if let Some(err) = reader.error() {
            return Err(err);
        }
    }
    Ok(())
}
