//! Integration tests for the download pipeline.
//!
//! These tests drive the public API against an in-memory server with
//! injected faults, covering planning, wave coordination, both
//! verification passes, merging, resumption and the single-stream resumer.
//!
//! Run with: `cargo test --test pipeline_integration`

mod common;

use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use common::{commit_segments, payload, shared, test_config, TestServer};
use partfetch::download::{SegmentDownloader, SegmentOutcome};
use partfetch::merge::MergeEngine;
use partfetch::probe::can_resume;
use partfetch::segment::{plan, AssetDirectory, SegmentLayout};
use partfetch::source::{select_target, DirectoryListing, StaticSource};
use partfetch::stream::{StreamOutcome, StreamSession};
use partfetch::transport::{AlwaysOnline, ByteRange};
use partfetch::{DownloadError, Pipeline, RunOutcome};

const URL: &str = "http://mirror.test/dumps/dump.rar";

// =============================================================================
// Helper Functions
// =============================================================================

fn pipeline(server: &Arc<TestServer>, temp: &TempDir) -> Pipeline {
    Pipeline::new(
        Arc::clone(server) as _,
        Arc::new(AlwaysOnline),
        test_config(),
        AssetDirectory::new(temp.path().join("assets")),
    )
    .with_sentinel(temp.path().join("state").join("downloaded"))
}

fn layout(temp: &TempDir) -> SegmentLayout {
    AssetDirectory::new(temp.path().join("assets")).layout("dump.rar")
}

// =============================================================================
// Integration Tests
// =============================================================================

#[test]
fn test_plan_covers_target() {
    let segments = plan(1000, 300);

    let spans: Vec<(u64, u64)> = segments
        .values()
        .map(|segment| (segment.start, segment.length))
        .collect();
    assert_eq!(spans, vec![(0, 300), (300, 300), (600, 300), (900, 100)]);
}

/// A segment that fails once is picked up by the next wave and the run
/// still produces a byte-exact output.
#[tokio::test]
async fn test_end_to_end_with_transient_failure() {
    let temp = TempDir::new().unwrap();
    let data = payload(1000);
    let server = shared(TestServer::new(data.clone()).fail_range(300, 1));

    let report = pipeline(&server, &temp)
        .run_once(URL, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.waves.waves <= 2);
    assert_eq!(report.waves.downloaded, 4);
    assert_eq!(report.verified, 4);
    assert_eq!(report.merge.bytes, 1000);

    let layout = layout(&temp);
    assert_eq!(std::fs::read(layout.output_path()).unwrap(), data);
    assert!(layout.discover().unwrap().is_empty());
}

/// Committed parts survive an interrupted run and are never fetched again;
/// a stale temporary file is discarded.
#[tokio::test]
async fn test_interrupted_run_resumes_from_committed_parts() {
    let temp = TempDir::new().unwrap();
    let data = payload(1000);
    let layout = layout(&temp);
    std::fs::create_dir_all(layout.dir()).unwrap();
    commit_segments(&layout, &data, &[1, 3]);
    std::fs::write(layout.temp_path(2), b"half written").unwrap();
    let server = shared(TestServer::new(data.clone()));

    let report = pipeline(&server, &temp)
        .run_once(URL, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.waves.already_committed, 2);
    assert_eq!(report.waves.downloaded, 2);
    // header request + two segments + four verification samples
    assert_eq!(server.requests(), 7);
    // committed parts are only touched by the verification sample
    let requests_at = |start: u64| {
        server
            .ranges()
            .into_iter()
            .flatten()
            .filter(|r| r.start == start)
            .count()
    };
    assert_eq!(requests_at(0), 1);
    assert_eq!(requests_at(300), 2);
    assert_eq!(requests_at(600), 1);
    assert_eq!(requests_at(900), 2);
    assert!(!layout.temp_path(2).exists());
    assert_eq!(std::fs::read(layout.output_path()).unwrap(), data);
}

/// A committed part that differs from the server is rejected by the network
/// check and replaced on the next run.
#[tokio::test]
async fn test_corrupt_segment_is_replaced() {
    let temp = TempDir::new().unwrap();
    let data = payload(1000);
    let layout = layout(&temp);
    std::fs::create_dir_all(layout.dir()).unwrap();
    commit_segments(&layout, &data, &[1, 2, 3, 4]);
    std::fs::write(layout.part_path(2), vec![0u8; 300]).unwrap();
    let server = shared(TestServer::new(data.clone()));
    let pipeline = pipeline(&server, &temp);

    let err = pipeline
        .run_once(URL, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::Rejected { ref parts } if parts == &vec![2]));
    assert!(!layout.part_path(2).exists());

    let outcome = pipeline
        .run_until_complete(
            &StaticSource::new(vec![URL.to_string()]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Completed(_)));
    assert_eq!(std::fs::read(layout.output_path()).unwrap(), data);
    assert!(temp.path().join("state").join("downloaded").exists());
}

#[tokio::test]
async fn test_run_until_complete_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let server = shared(TestServer::new(payload(1000)));
    let pipeline = pipeline(&server, &temp);
    let source = StaticSource::new(vec![URL.to_string()]);

    let first = pipeline
        .run_until_complete(&source, &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(first, RunOutcome::Completed(_)));
    let requests = server.requests();

    let second = pipeline
        .run_until_complete(&source, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second, RunOutcome::AlreadyComplete);
    assert_eq!(server.requests(), requests);
}

#[tokio::test]
async fn test_merge_detects_gap() {
    let temp = TempDir::new().unwrap();
    let data = payload(1000);
    let layout = SegmentLayout::new(temp.path(), "dump.rar");
    commit_segments(&layout, &data, &[1, 2, 4]);

    let err = MergeEngine::new(&test_config())
        .merge(&layout, 1000)
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Gap { part: 3 }));
    assert!(!layout.output_path().exists());
    assert_eq!(layout.discover().unwrap().len(), 3);
}

#[tokio::test]
async fn test_committed_segment_is_not_fetched_again() {
    let temp = TempDir::new().unwrap();
    let data = payload(1000);
    let layout = SegmentLayout::new(temp.path(), "dump.rar");
    commit_segments(&layout, &data, &[2]);
    let server = shared(TestServer::new(data));
    let segments = plan(1000, 300);
    let downloader = SegmentDownloader::new(
        Arc::clone(&server) as _,
        Arc::new(AlwaysOnline),
        URL,
        layout,
        &test_config(),
    );

    let outcome = downloader
        .fetch_segment(&segments[&1], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, SegmentOutcome::AlreadyCommitted);
    assert_eq!(server.requests(), 0);
}

#[tokio::test]
async fn test_resumability_detection() {
    let ranged = TestServer::new(payload(4096));
    assert!(can_resume(&ranged, URL).await);
    assert_eq!(ranged.ranges(), vec![None, Some(ByteRange::from(1024))]);

    let plain = TestServer::new(payload(4096)).ignoring_ranges();
    assert!(!can_resume(&plain, URL).await);
}

/// Stopping a stream keeps a step-aligned temp file that a later session
/// resumes with a ranged request.
#[tokio::test]
async fn test_stream_stop_then_resume() {
    let temp = TempDir::new().unwrap();
    let data = payload(4000);
    let cancel = CancellationToken::new();
    let config = test_config();

    let stopping = shared(TestServer::new(data.clone()).cancelling_at(3, cancel.clone()));
    let session = StreamSession::new(stopping as _, Arc::new(AlwaysOnline), URL, &config);
    let outcome = session
        .download_with_cancel(temp.path(), None, &cancel)
        .await
        .unwrap();

    let StreamOutcome::Stopped { temp: partial, bytes } = outcome else {
        panic!("expected a stopped download");
    };
    assert!(bytes > 0 && bytes < 4000);
    assert_eq!(bytes % 64, 0);
    assert_eq!(std::fs::metadata(&partial).unwrap().len(), bytes);
    assert!(!temp.path().join("dump.rar").exists());

    let server = shared(TestServer::new(data.clone()));
    let session = StreamSession::new(
        Arc::clone(&server) as _,
        Arc::new(AlwaysOnline),
        URL,
        &config,
    );
    let outcome = session.download(temp.path(), None).await.unwrap();

    assert!(matches!(outcome, StreamOutcome::Completed { .. }));
    assert!(server.ranges().contains(&Some(ByteRange::from(bytes))));
    assert_eq!(std::fs::read(temp.path().join("dump.rar")).unwrap(), data);
    assert!(!partial.exists());
}

/// The listing prefers the artifact already tracked in the asset directory
/// over a newer one.
#[tokio::test]
async fn test_listing_resumes_tracked_artifact() {
    let temp = TempDir::new().unwrap();
    let data = payload(1000);
    let index = "http://mirror.test/dumps/";
    let html = r#"<a href="dump-2024-01.rar">jan</a> <a href="dump-2024-02.rar">feb</a>
        <a href="notes.txt">notes</a>"#;
    let server = shared(TestServer::new(data.clone()).with_page(index, html));
    let assets = AssetDirectory::new(temp.path().join("assets"));
    let tracked = assets.layout("dump-2024-01.rar");
    std::fs::create_dir_all(tracked.dir()).unwrap();
    commit_segments(&tracked, &data, &[1]);

    let listing = DirectoryListing::new(
        Arc::clone(&server) as _,
        Arc::new(AlwaysOnline),
        index,
        ".rar",
    );
    let url = select_target(&listing, &assets, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(url, "http://mirror.test/dumps/dump-2024-01.rar");

    let outcome = pipeline(&server, &temp)
        .run_until_complete(&listing, &CancellationToken::new())
        .await
        .unwrap();

    let RunOutcome::Completed(report) = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(report.target.name, "dump-2024-01.rar");
    assert_eq!(report.waves.already_committed, 1);
    assert_eq!(std::fs::read(tracked.output_path()).unwrap(), data);
}

/// Parts named after a server-supplied file name that differs from the URL
/// are resumed, not cleared, when the run selects the same URL again.
#[tokio::test]
async fn test_resume_when_served_name_differs_from_url() {
    let data = payload(1000);
    let cases = [
        (
            "http://mirror.test/get/dump-2024",
            TestServer::new(data.clone())
                .with_content_disposition(r#"attachment; filename="libgen.rar""#),
            "libgen.rar",
        ),
        (
            URL,
            TestServer::new(data.clone()).with_content_type("application/octet-stream"),
            "dump.rar.bin",
        ),
    ];

    for (url, server, name) in cases {
        let temp = TempDir::new().unwrap();
        let server = shared(server);
        let source = StaticSource::new(vec![url.to_string()]);
        let assets = AssetDirectory::new(temp.path().join("assets"));
        assert_eq!(
            select_target(&source, &assets, &CancellationToken::new())
                .await
                .unwrap(),
            url
        );
        let layout = assets.layout(name);
        commit_segments(&layout, &data, &[1, 2]);

        let outcome = pipeline(&server, &temp)
            .run_until_complete(&source, &CancellationToken::new())
            .await
            .unwrap();

        let RunOutcome::Completed(report) = outcome else {
            panic!("expected a completed run");
        };
        assert_eq!(report.target.name, name);
        assert_eq!(report.waves.already_committed, 2);
        assert_eq!(report.waves.downloaded, 2);
        assert_eq!(std::fs::read(layout.output_path()).unwrap(), data);
    }
}

/// A single-URL fetch leaves the segments of the recorded target alone.
#[tokio::test]
async fn test_fetch_keeps_recorded_target_segments() {
    let temp = TempDir::new().unwrap();
    let data = payload(1000);
    let server = shared(TestServer::new(data.clone()));
    let assets = AssetDirectory::new(temp.path().join("assets"));
    let listed = StaticSource::new(vec!["http://mirror.test/dumps/other.rar".to_string()]);
    select_target(&listed, &assets, &CancellationToken::new())
        .await
        .unwrap();
    let other = assets.layout("other.rar");
    commit_segments(&other, &data, &[1]);

    let outcome = pipeline(&server, &temp)
        .fetch_until_complete(URL, &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Completed(_)));
    assert_eq!(std::fs::read(layout(&temp).output_path()).unwrap(), data);
    assert!(other.part_path(1).exists());
}

