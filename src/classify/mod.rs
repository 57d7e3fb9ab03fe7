//! URL and content classification.
//!
//! Pure functions that infer media types from URLs (extension tables) and
//! from leading bytes (magic numbers), detect streaming manifests, resolve
//! relative references against a base URL, and derive filenames.
//!
//! Nothing in this module performs I/O.

mod extension;
mod link;
mod magic;

pub use extension::{
    StreamingKind, extension_of, mime_from_url, resource_type_from_url, streaming_kind,
};
pub use link::{filename_from_url, is_excluded_scheme, resolve_url};
pub use magic::{OCTET_STREAM, mime_from_bytes};
