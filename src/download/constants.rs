//! Constants for the HTTP layer (timeouts, sniff size).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large media files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Leading bytes fetched to identify a resource by magic number.
pub const SNIFF_BYTES: usize = 32;
