//! Integration tests: page fetch → scan session → background jobs → write-back.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use media_scout_core::detect::ObservedRequest;
use media_scout_core::{
    Aggregator, ChannelSink, HttpClient, NetworkMonitor, Quality, QualityBasis, ResourceType,
    ScanSession, Scheduler, SchedulerConfig, SessionConfig, SinkEvent, jobs, load_page,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn scheduler() -> Scheduler {
    Scheduler::new(SchedulerConfig {
        max_workers: 3,
        parallelism_hint: Some(3),
    })
    .unwrap()
}

async fn mount_get(server: &MockServer, route: &str, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(template)
        .mount(server)
        .await;
}

async fn mount_head(server: &MockServer, route: &str, content_length: u64, content_type: &str) {
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-length", content_length.to_string().as_str())
                .insert_header("content-type", content_type),
        )
        .mount(server)
        .await;
}

const PLAYLIST: &str = "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXTINF:6,\nchunk-0.ts\n#EXTINF:6,\nchunk-1.ts\n#EXTINF:6,\nchunk-2.ts\n#EXT-X-ENDLIST\n";

// ==================== Feedback Tests ====================

#[tokio::test]
async fn test_scan_analyzes_images_and_expands_manifests() {
    let server = MockServer::start().await;
    mount_get(
        &server,
        "/watch",
        ResponseTemplate::new(200).set_body_string(
            r#"<html><head><link rel="stylesheet" href="/site.css"></head><body>
                <img src="/big.jpg">
                <video src="/hls/index.m3u8"></video>
                <div class="banner"></div>
            </body></html>"#,
        ),
    )
    .await;
    mount_get(
        &server,
        "/site.css",
        ResponseTemplate::new(200).set_body_string(".banner { background: url(img/banner.webp) }"),
    )
    .await;
    mount_get(
        &server,
        "/hls/index.m3u8",
        ResponseTemplate::new(200).set_body_string(PLAYLIST),
    )
    .await;
    mount_head(&server, "/big.jpg", 800 * 1024, "image/jpeg").await;
    mount_head(&server, "/img/banner.webp", 50 * 1024, "image/webp").await;

    let client = HttpClient::new().unwrap();
    let scheduler = scheduler();
    jobs::register_standard_jobs(&scheduler, &client);
    let (sink, mut events) = ChannelSink::new();
    let session = ScanSession::new(
        scheduler,
        Aggregator::with_sink(Arc::new(sink)),
        SessionConfig::default(),
    );

    let document = load_page(&client, &format!("{}/watch", server.uri()))
        .await
        .unwrap();
    let report = session.rescan(&document);
    assert_eq!(report.added.len(), 3);
    assert_eq!(report.scheduled.len(), 3);

    session.scheduler().wait_idle().await;

    let base = server.uri();
    session.with_aggregator(|aggregator| {
        let big = aggregator.get(&format!("{base}/big.jpg")).unwrap();
        assert_eq!(big.size, 800 * 1024);
        assert_eq!(big.quality, Quality::Hd);
        assert_eq!(big.quality_basis, QualityBasis::Size);

        let banner = aggregator.get(&format!("{base}/img/banner.webp")).unwrap();
        assert_eq!(banner.quality, Quality::Ld);

        let segments = aggregator.segments_of(&format!("{base}/hls/index.m3u8"));
        let indexed: Vec<(Option<usize>, &str)> = segments
            .iter()
            .map(|s| (s.index, s.filename.as_str()))
            .collect();
        assert_eq!(
            indexed,
            vec![
                (Some(0), "chunk-0.ts"),
                (Some(1), "chunk-1.ts"),
                (Some(2), "chunk-2.ts")
            ]
        );
        assert!(segments.iter().all(|s| s.resource_type == ResourceType::StreamingSegment));
    });

    let mut streaming = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SinkEvent::Streaming(_)) {
            streaming += 1;
        }
    }
    // One manifest plus three segments.
    assert_eq!(streaming, 4);
}

#[tokio::test]
async fn test_analysis_does_not_downgrade_dimension_quality() {
    let server = MockServer::start().await;
    mount_get(
        &server,
        "/page",
        ResponseTemplate::new(200)
            .set_body_string(r#"<img src="/poster.jpg" width="1920" height="1080">"#),
    )
    .await;
    mount_head(&server, "/poster.jpg", 20 * 1024, "image/jpeg").await;

    let client = HttpClient::new().unwrap();
    let session = ScanSession::http(scheduler(), &client, SessionConfig::default());
    let document = load_page(&client, &format!("{}/page", server.uri()))
        .await
        .unwrap();
    session.rescan(&document);
    session.scheduler().wait_idle().await;

    let poster = session
        .with_aggregator(|a| a.get(&format!("{}/poster.jpg", server.uri())).cloned())
        .unwrap();
    assert_eq!(poster.size, 20 * 1024);
    assert_eq!(poster.quality, Quality::Hd);
    assert_eq!(poster.quality_basis, QualityBasis::Dimensions);
}

// ==================== Network Observation Tests ====================

#[tokio::test]
async fn test_observed_manifest_requests_are_validated() {
    let server = MockServer::start().await;
    mount_get(
        &server,
        "/live/stream",
        ResponseTemplate::new(200)
            .insert_header("content-type", "application/vnd.apple.mpegurl")
            .set_body_string(PLAYLIST),
    )
    .await;

    let client = HttpClient::new().unwrap();
    let session = ScanSession::http(scheduler(), &client, SessionConfig::default());
    let monitor = NetworkMonitor::new();
    let observation = session.observe_network(&monitor);

    let manifest_url = format!("{}/live/stream", server.uri());
    monitor.publish(
        &ObservedRequest::new(manifest_url.clone())
            .with_content_type("application/vnd.apple.mpegurl"),
    );
    monitor.publish(&ObservedRequest::new(format!("{}/api/config.json", server.uri())));
    session.scheduler().wait_idle().await;

    assert_eq!(session.with_aggregator(|a| a.segments_of(&manifest_url).len()), 3);
    assert_eq!(session.resources().len(), 4);

    assert!(observation.cancel());
    monitor.publish(&ObservedRequest::new(format!("{}/other.m3u8", server.uri())));
    assert_eq!(session.resources().len(), 4);
}

// ==================== Download Tests ====================

#[tokio::test]
async fn test_download_all_reports_each_resource() {
    let server = MockServer::start().await;
    mount_get(
        &server,
        "/page",
        ResponseTemplate::new(200)
            .set_body_string(r#"<img src="/ok.png"><img src="/gone.png">"#),
    )
    .await;
    mount_get(
        &server,
        "/ok.png",
        ResponseTemplate::new(200)
            .insert_header("content-type", "image/png")
            .set_body_bytes(vec![0x89, b'P', b'N', b'G']),
    )
    .await;
    mount_get(&server, "/gone.png", ResponseTemplate::new(410)).await;

    let client = HttpClient::new().unwrap();
    let session = ScanSession::http(
        scheduler(),
        &client,
        SessionConfig {
            analyze: false,
            validate_streams: false,
        },
    );
    let document = load_page(&client, &format!("{}/page", server.uri()))
        .await
        .unwrap();
    session.rescan(&document);

    let dir = tempfile::tempdir().unwrap();
    let summary = session.download_all(dir.path()).await;

    assert_eq!(summary.succeeded.len(), 1);
    assert_eq!(summary.succeeded[0].path, dir.path().join("ok.png"));
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].url, format!("{}/gone.png", server.uri()));
    assert!(summary.failed[0].error.contains("410"), "{}", summary.failed[0].error);
}
