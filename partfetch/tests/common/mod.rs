//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use partfetch::retry::RetryPolicy;
use partfetch::segment::{plan, SegmentLayout};
use partfetch::FetchConfig;

pub use partfetch::transport::mock::{payload, MemoryTransport as TestServer};

/// Engine configuration scaled down for tests: 300-byte segments,
/// concurrency 2, no in-wave retries, millisecond pauses.
pub fn test_config() -> FetchConfig {
    FetchConfig::default()
        .with_segment_length(300)
        .with_concurrency(2)
        .with_copy_step(64)
        .with_stream_copy_step(64)
        .with_wave_pause(Duration::from_millis(1))
        .with_run_retry_delay(Duration::from_millis(1))
        .with_connectivity_poll(Duration::from_millis(1))
        .with_segment_retry(RetryPolicy::None)
        .with_probe_retry(RetryPolicy::fixed(2, Duration::from_millis(1)))
}

/// Write every planned segment of `data` as a committed file.
pub fn commit_segments(layout: &SegmentLayout, data: &[u8], parts: &[u32]) {
    for segment in plan(data.len() as u64, 300).values() {
        if parts.contains(&segment.part()) {
            let bytes = &data[segment.start as usize..segment.end() as usize];
            std::fs::write(layout.part_path(segment.part()), bytes).unwrap();
        }
    }
}

pub fn shared(server: TestServer) -> Arc<TestServer> {
    Arc::new(server)
}
