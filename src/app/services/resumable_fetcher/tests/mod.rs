//! Shared test utilities for resumable fetcher tests

use crate::app::adapters::http::HttpResponse;
use crate::app::adapters::http::testing::ScriptedTransport;
use crate::app::services::resumable_fetcher::ResumableFetcher;
use std::sync::Arc;


pub const SOURCE_URL: &str = "http://source.example/stations/alpha.csv";
pub const LAST_MODIFIED: &str = "Wed, 01 Jan 2020 00:00:00 GMT";

/// Fetcher over a fresh scripted transport
pub fn create_fetcher() -> (Arc<ScriptedTransport>, ResumableFetcher) {
    let transport = Arc::new(ScriptedTransport::new());
    let fetcher = ResumableFetcher::new(transport.clone());
    (transport, fetcher)
}

/// HEAD response advertising a length
pub fn head_response(length: u64) -> HttpResponse {
    HttpResponse::new(200)
        .with_header("Content-Length", length.to_string())
        .with_header("Last-Modified", LAST_MODIFIED)
}
