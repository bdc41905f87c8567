/// Capacity shared by the record handoff channel and the sort-run buffer.
/// Bounds peak resident records regardless of input size.
pub const MAX_BUFFER_SIZE: usize = 50_000;

/// Array key used for containers the engine creates itself.
pub const DEFAULT_ARRAY_KEY: &str = "results";

pub const IO_BUFFER_SIZE_KB: usize = 64;
pub const BYTES_PER_KB: usize = 1024;

/// Temp-file naming for engine-created containers.
pub const TEMP_FILE_PREFIX: &str = "silt_";
pub const TEMP_FILE_EXTENSION: &str = ".json";
pub const TEMP_FILE_EXTENSION_GZ: &str = ".json.gz";

/// Retry policy for unlinking container files on reader close.
pub const REMOVE_RETRY_ATTEMPTS: usize = 5;
pub const REMOVE_RETRY_DELAY_MS: u64 = 100;

pub const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
