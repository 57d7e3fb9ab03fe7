//! Manifest resolver: expands HLS/DASH manifests into ordered segments.
//!
//! The resolver fetches a manifest through a [`ManifestFetcher`], decides
//! its format (URL suffix first, response content type second) and returns
//! one [`Resource`] per segment, each carrying the manifest URL as
//! `parent_url` and its playback position as `index`.
//!
//! [`ManifestResolver::resolve`] never fails: any fetch or parse problem is
//! logged and yields an empty sequence. Callers that need to tell "failed"
//! from "no segments" use [`ManifestResolver::try_resolve`].

mod dash;
mod hls;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::classify::{self, StreamingKind};
use crate::download::HttpClient;
use crate::resource::{Resource, ResourceSource, ResourceType, now_millis};

/// Errors raised while resolving a manifest.
#[derive(Debug, Clone, Error)]
pub enum ManifestError {
    /// The manifest URL is not an absolute HTTP(S) URL.
    #[error("invalid manifest URL: {url}")]
    InvalidUrl { url: String },

    /// The manifest could not be fetched.
    #[error("failed to fetch manifest {url}: {message}")]
    Fetch { url: String, message: String },

    /// The manifest body could not be parsed.
    #[error("failed to parse manifest {url}: {message}")]
    Parse { url: String, message: String },

    /// Neither the URL nor the content type identify a manifest format.
    #[error("not a streaming manifest: {url}")]
    NotAManifest { url: String },
}

impl ManifestError {
    pub fn fetch(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn parse(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// A fetched manifest body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedText {
    pub body: String,
    /// Response `Content-Type`, when known.
    pub content_type: Option<String>,
}

/// Network collaborator used to fetch manifests.
///
/// This trait uses `async_trait` so resolvers can hold `Arc<dyn ManifestFetcher>`.
#[async_trait]
pub trait ManifestFetcher: Send + Sync {
    /// Fetches `url` as text.
    async fn fetch_text(&self, url: &str) -> Result<FetchedText, ManifestError>;
}

#[async_trait]
impl ManifestFetcher for HttpClient {
    async fn fetch_text(&self, url: &str) -> Result<FetchedText, ManifestError> {
        let response = HttpClient::fetch_text(self, url)
            .await
            .map_err(|e| ManifestError::fetch(url, e.to_string()))?;
        Ok(FetchedText {
            body: response.body,
            content_type: response.content_type,
        })
    }
}

/// Expands manifests into segment resources.
#[derive(Clone)]
pub struct ManifestResolver {
    fetcher: Arc<dyn ManifestFetcher>,
}

impl std::fmt::Debug for ManifestResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestResolver").finish_non_exhaustive()
    }
}

impl ManifestResolver {
    #[must_use]
    pub fn new(fetcher: Arc<dyn ManifestFetcher>) -> Self {
        Self { fetcher }
    }

    /// Resolver backed by an [`HttpClient`].
    #[must_use]
    pub fn http(client: HttpClient) -> Self {
        Self::new(Arc::new(client))
    }

    /// Returns the segments of `manifest_url`, or an empty sequence on any
    /// failure.
    #[instrument(skip(self), fields(url = %manifest_url))]
    pub async fn resolve(&self, manifest_url: &str) -> Vec<Resource> {
        match self.try_resolve(manifest_url).await {
            Ok(segments) => segments,
            Err(error) => {
                warn!(error = %error, "manifest resolution failed; treating as no segments");
                Vec::new()
            }
        }
    }

    /// Returns the segments of `manifest_url`, distinguishing failures from
    /// an empty manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] when the URL is invalid, the fetch fails,
    /// the format cannot be determined or a DASH document is malformed.
    pub async fn try_resolve(&self, manifest_url: &str) -> Result<Vec<Resource>, ManifestError> {
        let base = Url::parse(manifest_url)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| ManifestError::InvalidUrl {
                url: manifest_url.to_string(),
            })?;

        let fetched = self.fetcher.fetch_text(manifest_url).await?;
        let kind = classify::streaming_kind(manifest_url, fetched.content_type.as_deref())
            .ok_or_else(|| ManifestError::NotAManifest {
                url: manifest_url.to_string(),
            })?;

        let references: Vec<String> = match kind {
            StreamingKind::Hls => hls::segment_references(&fetched.body)
                .into_iter()
                .map(str::to_string)
                .collect(),
            StreamingKind::Dash => dash::segment_references(manifest_url, &fetched.body)?,
        };

        let timestamp = now_millis();
        let segments: Vec<Resource> = references
            .iter()
            .filter_map(|raw| classify::resolve_url(raw, &base))
            .enumerate()
            .map(|(index, url)| {
                Resource::new(
                    url.as_str(),
                    ResourceType::StreamingSegment,
                    ResourceSource::Streaming,
                    timestamp,
                )
                .as_segment(manifest_url, index)
            })
            .collect();

        debug!(kind = ?kind, count = segments.len(), "manifest resolved");
        Ok(segments)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    /// In-memory fetcher keyed by URL.
    #[derive(Default)]
    struct StaticFetcher {
        bodies: HashMap<String, FetchedText>,
    }

    impl StaticFetcher {
        fn with(mut self, url: &str, body: &str, content_type: Option<&str>) -> Self {
            self.bodies.insert(
                url.to_string(),
                FetchedText {
                    body: body.to_string(),
                    content_type: content_type.map(str::to_string),
                },
            );
            self
        }
    }

    #[async_trait]
    impl ManifestFetcher for StaticFetcher {
        async fn fetch_text(&self, url: &str) -> Result<FetchedText, ManifestError> {
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| ManifestError::fetch(url, "404"))
        }
    }

    fn resolver(fetcher: StaticFetcher) -> ManifestResolver {
        ManifestResolver::new(Arc::new(fetcher))
    }

    #[tokio::test]
    async fn test_hls_segments_in_order_with_parent() {
        let url = "https://cdn.example.com/live/index.m3u8";
        let resolver = resolver(StaticFetcher::default().with(
            url,
            "#EXTM3U\n#EXTINF:10,\nseg0.ts\n#EXTINF:10,\nseg1.ts\n#EXTINF:10,\n/abs/seg2.ts\n",
            None,
        ));

        let segments = resolver.resolve(url).await;
        assert_eq!(segments.len(), 3);
        let urls: Vec<&str> = segments.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://cdn.example.com/live/seg0.ts",
                "https://cdn.example.com/live/seg1.ts",
                "https://cdn.example.com/abs/seg2.ts",
            ]
        );
        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(segment.index, Some(i));
            assert_eq!(segment.parent_url.as_deref(), Some(url));
            assert_eq!(segment.resource_type, ResourceType::StreamingSegment);
            assert_eq!(segment.content_type, "video/mp2t");
            assert!(segment.is_stream_segment);
        }
    }

    #[tokio::test]
    async fn test_dash_detected_by_content_type() {
        let url = "https://cdn.example.com/api/manifest?id=9";
        let resolver = resolver(StaticFetcher::default().with(
            url,
            r#"<MPD><Period><SegmentTemplate media="v/$Number$.m4s"/></Period></MPD>"#,
            Some("application/dash+xml"),
        ));

        let segments = resolver.try_resolve(url).await.unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].url, "https://cdn.example.com/api/v/$Number$.m4s");
        assert_eq!(segments[0].index, Some(0));
    }

    #[tokio::test]
    async fn test_failures_are_empty_for_resolve_but_distinct_for_try_resolve() {
        let resolver = resolver(StaticFetcher::default());
        let url = "https://cdn.example.com/missing.m3u8";

        assert!(resolver.resolve(url).await.is_empty());
        assert!(matches!(
            resolver.try_resolve(url).await,
            Err(ManifestError::Fetch { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_format_is_not_a_manifest() {
        let url = "https://cdn.example.com/page";
        let resolver = resolver(StaticFetcher::default().with(url, "<html></html>", Some("text/html")));
        assert!(matches!(
            resolver.try_resolve(url).await,
            Err(ManifestError::NotAManifest { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_before_fetch() {
        let resolver = resolver(StaticFetcher::default());
        assert!(matches!(
            resolver.try_resolve("blob:https://example.com/x.m3u8").await,
            Err(ManifestError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_playlist_is_ok_and_empty() {
        let url = "https://cdn.example.com/empty.m3u8";
        let resolver = resolver(StaticFetcher::default().with(url, "#EXTM3U\n#EXT-X-ENDLIST\n", None));
        assert!(resolver.try_resolve(url).await.unwrap().is_empty());
    }
}
