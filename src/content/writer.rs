use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;

use super::reader::ContentReader;
use crate::constants::{
    BYTES_PER_KB, IO_BUFFER_SIZE_KB, TEMP_FILE_EXTENSION, TEMP_FILE_EXTENSION_GZ, TEMP_FILE_PREFIX,
};
use crate::error::{Error, Result};

/// Append-only writer for an on-disk container `{"<arrayKey>":[...]}`.
///
/// The document is syntactically invalid until [`ContentWriter::close`]
/// seals it. Dropping the writer seals it as well, but only an explicit
/// close surfaces deferred write errors. Non-array containers
/// (`is_array == false`) hold a single value under the key.
pub struct ContentWriter {
    file_path: PathBuf,
    array_key: String,
    is_array: bool,
    sink: Option<Sink>,
    record_written: bool,
    deferred: Option<Error>,
}

enum Sink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Sink {
    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Sink::Plain(out) => out,
            Sink::Gzip(out) => out,
        }
    }

    fn finish(self) -> io::Result<()> {
        match self {
            Sink::Plain(mut out) => out.flush(),
            Sink::Gzip(encoder) => encoder.finish()?.flush(),
        }
    }
}

impl ContentWriter {
    /// Opens a fresh container in the OS temp directory and writes the
    /// document prefix. With `compressed`, output is gzip and readers
    /// detect it transparently.
    pub fn new(array_key: &str, is_array: bool, compressed: bool) -> Result<Self> {
        let suffix = if compressed {
            TEMP_FILE_EXTENSION_GZ
        } else {
            TEMP_FILE_EXTENSION
        };
        let (file, file_path) = tempfile::Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .suffix(suffix)
            .tempfile()?
            .keep()
            .map_err(|err| Error::Io(err.error))?;
        let buffered = BufWriter::with_capacity(IO_BUFFER_SIZE_KB * BYTES_PER_KB, file);
        let mut sink = if compressed {
            Sink::Gzip(GzEncoder::new(buffered, Compression::default()))
        } else {
            Sink::Plain(buffered)
        };
        let out = sink.writer();
        out.write_all(b"{")?;
        serde_json::to_writer(&mut *out, array_key).map_err(Error::serialization)?;
        out.write_all(b":")?;
        if is_array {
            out.write_all(b"[")?;
        }
        Ok(Self {
            file_path,
            array_key: array_key.to_string(),
            is_array,
            sink: Some(sink),
            record_written: false,
            deferred: None,
        })
    }

    /// Serializes one record into the container. Failures are remembered
    /// and surfaced by [`ContentWriter::close`]; once a write fails,
    /// further writes are dropped.
    pub fn write<T: Serialize>(&mut self, record: &T) {
        if self.deferred.is_some() || self.sink.is_none() {
            return;
        }
        if let Err(err) = self.write_record(record) {
            tracing::error!("container write failed: {err}");
            self.deferred = Some(err);
        }
    }

    fn write_record<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        let out = sink.writer();
        if self.record_written {
            out.write_all(b",")?;
        }
        serde_json::to_writer(&mut *out, record).map_err(Error::serialization)?;
        self.record_written = true;
        Ok(())
    }

    /// Seals the container and flushes it to disk. Idempotent; a second
    /// close is a no-op. Returns the first deferred write error, if any.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut sink) = self.sink.take() {
            let out = sink.writer();
            if !self.is_array && !self.record_written {
                out.write_all(b"null")?;
            }
            let footer: &[u8] = if self.is_array { b"]}" } else { b"}" };
            out.write_all(footer)?;
            sink.finish()?;
        }
        match self.deferred.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn array_key(&self) -> &str {
        &self.array_key
    }
}

impl Drop for ContentWriter {
    fn drop(&mut self) {
        if self.sink.is_some() {
            if let Err(err) = self.close() {
                tracing::warn!("sealing container on drop failed: {err}");
            }
        }
    }
}

/// Seals `writer` and hands the finished container to a new reader,
/// which takes over the file for cleanup.
pub(crate) fn seal_into_reader(mut writer: ContentWriter) -> Result<ContentReader> {
    match writer.close() {
        Ok(()) => Ok(ContentReader::new(
            writer.file_path().to_path_buf(),
            writer.array_key(),
        )),
        Err(err) => {
            discard(writer);
            Err(err)
        }
    }
}

/// Seals and unlinks a container that will never reach a reader.
pub(crate) fn discard(mut writer: ContentWriter) {
    if let Err(err) = writer.close() {
        tracing::warn!("sealing abandoned container failed: {err}");
    }
    if let Err(err) = std::fs::remove_file(writer.file_path()) {
        tracing::warn!(
            "removing abandoned container {} failed: {err}",
            writer.file_path().display()
        );
    }
}
