use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use flate2::read::MultiGzDecoder;
use parking_lot::Mutex;
use serde::de::{DeserializeOwned, DeserializeSeed};
use serde_json::Value;

use super::decode::ArrayStream;
use super::record::{convert_record, Record};
use crate::constants::{
    BYTES_PER_KB, GZIP_MAGIC, IO_BUFFER_SIZE_KB, MAX_BUFFER_SIZE, REMOVE_RETRY_ATTEMPTS,
    REMOVE_RETRY_DELAY_MS,
};
use crate::error::{Error, Result};

/// FIFO of errors hit by the producer task. Pushed by the producer,
/// popped by consumers; bounded so a pathological input cannot grow it
/// without limit.
#[derive(Default)]
struct ErrorSink {
    queue: Mutex<VecDeque<Error>>,
}

impl ErrorSink {
    fn push(&self, err: Error) {
        let mut queue = self.queue.lock();
        if queue.len() < MAX_BUFFER_SIZE {
            queue.push_back(err);
        }
    }

    fn pop(&self) -> Option<Error> {
        self.queue.lock().pop_front()
    }
}

/// Streams the records of one or more JSON containers without loading
/// any document into memory whole.
///
/// The first [`ContentReader::next_record`] call spawns a single
/// producer task that decodes array elements into a bounded channel;
/// consumers pull from the channel and convert each generic record into
/// their own shape. `next_record` is safe to call from several threads
/// at once; each caller then sees a disjoint share of the stream.
/// `reset`, `close` and `length` are not.
pub struct ContentReader {
    files_paths: Vec<PathBuf>,
    array_key: String,
    records: Receiver<Record>,
    handoff: Mutex<Option<Sender<Record>>>,
    start: Once,
    errors: Arc<ErrorSink>,
    length: AtomicUsize,
    empty: bool,
}

impl ContentReader {
    /// Reader over a single container. An empty path yields an empty
    /// reader.
    pub fn new(file_path: impl Into<PathBuf>, array_key: &str) -> Self {
        let file_path = file_path.into();
        let empty = file_path.as_os_str().is_empty();
        let mut reader = Self::multi_source(vec![file_path], array_key);
        reader.empty = empty;
        reader
    }

    /// Reader over several containers, streamed in the given order.
    pub fn multi_source(files_paths: Vec<PathBuf>, array_key: &str) -> Self {
        let empty = files_paths.is_empty();
        let (handoff, records) = channel::bounded(MAX_BUFFER_SIZE);
        Self {
            files_paths,
            array_key: array_key.to_string(),
            records,
            handoff: Mutex::new(Some(handoff)),
            start: Once::new(),
            errors: Arc::new(ErrorSink::default()),
            length: AtomicUsize::new(0),
            empty,
        }
    }

    /// Reader with no sources at all.
    pub fn empty(array_key: &str) -> Self {
        Self::new("", array_key)
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Pulls the next record and converts it into `T`. `Ok(None)`
    /// signals end of stream.
    ///
    /// Conversion failures are returned to the caller and also recorded
    /// in the error sink; iteration may continue past them. Producer
    /// failures never surface here directly, check [`ContentReader::error`].
    pub fn next_record<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        if self.empty {
            return Err(Error::Empty);
        }
        self.start.call_once(|| {
            self.length.store(0, Ordering::SeqCst);
            if let Some(handoff) = self.handoff.lock().take() {
                let files_paths = self.files_paths.clone();
                let array_key = self.array_key.clone();
                let errors = Arc::clone(&self.errors);
                thread::spawn(move || produce(files_paths, array_key, handoff, errors));
            }
        });
        match self.records.recv() {
            Ok(record) => match convert_record::<T>(record) {
                Ok(out) => {
                    self.length.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(out))
                }
                Err(Error::Conversion { message }) => {
                    self.errors.push(Error::Conversion {
                        message: message.clone(),
                    });
                    Err(Error::Conversion { message })
                }
                Err(err) => Err(err),
            },
            Err(_) => Ok(None),
        }
    }

    /// Re-arms the reader so the next `next_record` starts the stream
    /// over. Not safe while another thread is inside `next_record`.
    pub fn reset(&mut self) {
        let (handoff, records) = channel::bounded(MAX_BUFFER_SIZE);
        self.records = records;
        self.handoff = Mutex::new(Some(handoff));
        self.start = Once::new();
    }

    /// Number of records in the stream. When uncached this drains the
    /// reader, then resets it, so callers observe no consumption.
    pub fn length(&mut self) -> Result<usize> {
        if self.empty {
            return Ok(0);
        }
        if self.length.load(Ordering::SeqCst) == 0 {
            loop {
                match self.next_record::<Value>() {
                    Ok(Some(_)) => {}
                    Ok(None) | Err(_) => break,
                }
            }
            self.reset();
            if let Some(err) = self.errors.pop() {
                return Err(err);
            }
        }
        Ok(self.length.load(Ordering::SeqCst))
    }

    /// Unlinks every file the reader references and clears the list.
    ///
    /// This includes paths supplied by the caller at construction, not
    /// just containers the engine created; hand the reader a copy if the
    /// file must survive. Missing files are tolerated, removal is
    /// retried before giving up. Closing also disconnects the handoff
    /// channel, so a producer blocked on a full buffer exits instead of
    /// leaking.
    pub fn close(&mut self) -> Result<()> {
        let (_, records) = channel::bounded(0);
        self.records = records;
        *self.handoff.lock() = None;
        for file_path in &self.files_paths {
            if file_path.as_os_str().is_empty() {
                continue;
            }
            remove_file_with_retry(file_path)?;
        }
        self.files_paths.clear();
        Ok(())
    }

    pub fn files_paths(&self) -> &[PathBuf] {
        &self.files_paths
    }

    /// Pops the oldest producer-side error, if any.
    pub fn error(&self) -> Option<Error> {
        self.errors.pop()
    }
}

fn remove_file_with_retry(file_path: &Path) -> Result<()> {
    if !file_path.exists() {
        tracing::debug!("file already gone: {}", file_path.display());
        return Ok(());
    }
    let mut attempt = 1;
    loop {
        match fs::remove_file(file_path) {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                if attempt >= REMOVE_RETRY_ATTEMPTS {
                    return Err(Error::Remove {
                        path: file_path.to_path_buf(),
                        source: err,
                    });
                }
                tracing::debug!(
                    "removing {} failed on attempt {attempt}: {err}",
                    file_path.display()
                );
                attempt += 1;
                thread::sleep(Duration::from_millis(REMOVE_RETRY_DELAY_MS));
            }
        }
    }
}

/// Producer task: streams every source file into the handoff channel in
/// order. Errors are recorded in the sink and the file abandoned; the
/// task keeps going with the next file. Dropping the sender on exit
/// closes the channel exactly once.
fn produce(
    files_paths: Vec<PathBuf>,
    array_key: String,
    handoff: Sender<Record>,
    errors: Arc<ErrorSink>,
) {
    for file_path in &files_paths {
        if stream_file(file_path, &array_key, &handoff, &errors).is_break() {
            // Consumers hung up; no point touching the remaining files.
            break;
        }
    }
}

fn stream_file(
    file_path: &Path,
    array_key: &str,
    handoff: &Sender<Record>,
    errors: &ErrorSink,
) -> ControlFlow<()> {
    let file = match File::open(file_path) {
        Ok(file) => file,
        Err(err) => {
            tracing::error!("opening {} failed: {err}", file_path.display());
            errors.push(Error::Io(err));
            return ControlFlow::Continue(());
        }
    };
    let source = match container_source(file) {
        Ok(source) => source,
        Err(err) => {
            errors.push(err);
            return ControlFlow::Continue(());
        }
    };
    let mut decoder = serde_json::Deserializer::from_reader(source);
    let mut disconnected = false;
    let stream = ArrayStream::new(array_key, |record| {
        if handoff.send(record).is_err() {
            disconnected = true;
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    match stream.deserialize(&mut decoder) {
        Ok(true) => ControlFlow::Continue(()),
        Ok(false) => {
            errors.push(Error::KeyNotFound {
                key: array_key.to_string(),
            });
            ControlFlow::Continue(())
        }
        Err(_) if disconnected => ControlFlow::Break(()),
        Err(err) => {
            tracing::error!("decoding {} failed: {err}", file_path.display());
            errors.push(Error::decode(err));
            ControlFlow::Continue(())
        }
    }
}

/// Opens a container for reading, transparently unwrapping gzip.
fn container_source(file: File) -> Result<Box<dyn Read + Send>> {
    let mut buffered = BufReader::with_capacity(IO_BUFFER_SIZE_KB * BYTES_PER_KB, file);
    let head = buffered.fill_buf()?;
    let source: Box<dyn Read + Send> = if head.starts_with(GZIP_MAGIC) {
        Box::new(BufReader::with_capacity(
            IO_BUFFER_SIZE_KB * BYTES_PER_KB,
            MultiGzDecoder::new(buffered),
        ))
    } else {
        Box::new(buffered)
    };
    Ok(source)
}
