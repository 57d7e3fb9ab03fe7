//! HTTP layer: probing, sniffing, text fetches and streaming downloads.
//!
//! # Features
//!
//! - HEAD probes for size, type and range support
//! - Ranged prefix fetches for magic-number sniffing
//! - Streaming downloads (memory-efficient for large media)
//! - Filenames from Content-Disposition or the URL path, never overwriting
//! - Configurable timeouts (30s connect, 5min read by default)

mod client;
mod constants;
mod error;
mod filename;

pub use client::{DownloadFileResult, HttpClient, ProbeInfo, TextResponse};
pub use constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, SNIFF_BYTES};
pub use error::DownloadError;
