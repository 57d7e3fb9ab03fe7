//! Media Scout Core Library
//!
//! Discovers downloadable media on a web page, merges what several
//! independent detectors find into one deduplicated resource set, grades
//! each resource's quality and farms expensive follow-up work (probing,
//! manifest expansion, downloads) out to a bounded, priority-ordered pool.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`classify`] - URL/MIME classification, manifest detection, URL resolution
//! - [`document`] - Document tree consumed by detectors, built from HTML
//! - [`detect`] - DOM, CSS, Shadow DOM, attribute and streaming detectors
//! - [`manifest`] - HLS/DASH manifest expansion into ordered segments
//! - [`aggregate`] - Deduplicated resource set and change notifications
//! - [`quality`] - HD/SD/LD estimation from dimensions or size
//! - [`scheduler`] - Bounded-concurrency priority task scheduler
//! - [`jobs`] - Analyze, validate and download job kinds
//! - [`pipeline`] - Scan sessions tying detection to scheduling
//! - [`download`] - HTTP client with streaming downloads

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod aggregate;
pub mod classify;
pub mod detect;
pub mod document;
pub mod download;
pub mod jobs;
pub mod manifest;
pub mod pipeline;
pub mod quality;
pub mod resource;
pub mod scheduler;
pub mod user_agent;

// Re-export commonly used types
pub use aggregate::{Aggregator, ChannelSink, ResourceSink, SinkEvent};
pub use detect::{
    Detection, DetectionContext, DetectionError, Detector, DetectorSet, NetworkMonitor,
    Observation, ObservedRequest,
};
pub use document::{Document, Element, ShadowRoot, ShadowRootMode, Stylesheet, Tree};
pub use download::{DownloadError, HttpClient};
pub use manifest::{ManifestError, ManifestFetcher, ManifestResolver};
pub use pipeline::{DownloadSummary, RescanReport, ScanSession, SessionConfig, load_page};
pub use quality::Measurement;
pub use resource::{Quality, QualityBasis, Resource, ResourceSource, ResourceType};
pub use scheduler::{
    JobHandler, Scheduler, SchedulerConfig, SchedulerStatus, TaskError, TaskId, TaskPriority,
    TaskStatus,
};
