//! Tests for metadata loading and resumable data file sync

use super::*;
use crate::app::adapters::http::Method;
use chrono::TimeZone;
use tempfile::TempDir;

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, d, 0, 0, 0).unwrap()
}

#[tokio::test]
async fn test_metadata_fetched_once_then_served_from_cache() {
    let temp_dir = TempDir::new().unwrap();
    let (_transport, mut sync) = open_sync(temp_dir.path());
    let adapter = CsvAdapter::new(provider_metadata());

    let first = sync.load_or_fetch_metadata(&adapter).await.unwrap();
    let second = sync.load_or_fetch_metadata(&adapter).await.unwrap();

    assert_eq!(adapter.calls(), 1);
    assert_eq!(first, second);
    assert_eq!(first.name(), Some("Alpha Ridge"));
    assert_eq!(first.longitude(), Some(-1.25));
}

#[tokio::test]
async fn test_first_sync_downloads_in_full_and_advances_cursor() {
    let temp_dir = TempDir::new().unwrap();
    let (transport, mut sync) = open_sync(temp_dir.path());
    let adapter = CsvAdapter::new(provider_metadata());
    sync.load_or_fetch_metadata(&adapter).await.unwrap();

    let file = format!("{}{}", HEADER_LINE, FIRST_ROWS);
    transport.respond(HttpResponse::new(200).with_body(file.clone()));

    let report = sync.sync_data_files(&adapter).await.unwrap();

    assert_eq!(transport.methods(), vec![Method::Get]);
    assert_eq!(report.files_fetched, 1);
    assert_eq!(report.stats.inserted, 4);

    let cursor = &sync.metadata().data_files().unwrap()[0];
    assert_eq!(cursor.last_byte_length, Some(file.len() as u64));
    assert_eq!(cursor.parsed_column_headers, vec!["time", "temp", "humidity"]);

    let cached = sync
        .observation_store()
        .get_all_in_range(day(1), day(2))
        .unwrap();
    assert_eq!(cached.len(), 4);
}

#[tokio::test]
async fn test_growth_fetches_only_the_tail() {
    let temp_dir = TempDir::new().unwrap();
    let (transport, mut sync) = open_sync(temp_dir.path());
    let adapter = CsvAdapter::new(provider_metadata());
    sync.load_or_fetch_metadata(&adapter).await.unwrap();

    let first = format!("{}{}", HEADER_LINE, FIRST_ROWS);
    transport.respond(HttpResponse::new(200).with_body(first.clone()));
    sync.sync_data_files(&adapter).await.unwrap();

    transport
        .respond(head_response(first.len() + NEXT_ROWS.len()))
        .respond(HttpResponse::new(206).with_body(NEXT_ROWS));
    let report = sync.sync_data_files(&adapter).await.unwrap();

    let range = &transport.requests()[2];
    assert_eq!(range.header("range"), Some(format!("bytes={}-", first.len()).as_str()));
    assert_eq!(report.stats.inserted, 2);
    assert_eq!(report.refetched, 0);

    let cursor = &sync.metadata().data_files().unwrap()[0];
    assert_eq!(
        cursor.last_byte_length,
        Some((first.len() + NEXT_ROWS.len()) as u64)
    );
    assert_eq!(cursor.parsed_column_headers.len(), 3);
}

#[tokio::test]
async fn test_unchanged_file_issues_no_get() {
    let temp_dir = TempDir::new().unwrap();
    let (transport, mut sync) = open_sync(temp_dir.path());
    let adapter = CsvAdapter::new(provider_metadata());
    sync.load_or_fetch_metadata(&adapter).await.unwrap();

    let first = format!("{}{}", HEADER_LINE, FIRST_ROWS);
    transport.respond(
        HttpResponse::new(200)
            .with_header("Last-Modified", "Wed, 01 Jan 2020 00:00:00 GMT")
            .with_body(first.clone()),
    );
    sync.sync_data_files(&adapter).await.unwrap();

    transport.respond(
        head_response(first.len()).with_header("Last-Modified", "Thu, 02 Jan 2020 00:00:00 GMT"),
    );
    let report = sync.sync_data_files(&adapter).await.unwrap();

    assert_eq!(transport.count(Method::Get), 1);
    assert_eq!(report.files_fetched, 0);

    let cursor = &sync.metadata().data_files().unwrap()[0];
    assert_eq!(
        cursor.last_modified.as_deref(),
        Some("Thu, 02 Jan 2020 00:00:00 GMT")
    );
    assert_eq!(cursor.last_byte_length, Some(first.len() as u64));
    assert_eq!(cursor.parsed_column_headers, vec!["time", "temp", "humidity"]);
}

#[tokio::test]
async fn test_unparseable_partial_body_forces_full_refetch() {
    let temp_dir = TempDir::new().unwrap();
    let (transport, mut sync) = open_sync(temp_dir.path());

    // A cursor that knows its length but lost its headers
    let mut metadata = provider_metadata();
    metadata["data_files"] = json!([{
        "url": SOURCE_URL,
        "filename": "alpha.csv",
        "last_byte_length": HEADER_LINE.len() + FIRST_ROWS.len()
    }]);
    let adapter = CsvAdapter::new(metadata);
    sync.load_or_fetch_metadata(&adapter).await.unwrap();

    let whole = format!("{}{}{}", HEADER_LINE, FIRST_ROWS, NEXT_ROWS);
    transport
        .respond(head_response(whole.len()))
        .respond(HttpResponse::new(206).with_body(NEXT_ROWS))
        .respond(HttpResponse::new(200).with_body(whole.clone()));

    let report = sync.sync_data_files(&adapter).await.unwrap();

    assert_eq!(report.refetched, 1);
    assert_eq!(report.stats.inserted, 6);
    assert_eq!(
        transport.methods(),
        vec![Method::Head, Method::Get, Method::Get]
    );
    assert!(transport.requests()[2].header("range").is_none());

    let cursor = &sync.metadata().data_files().unwrap()[0];
    assert_eq!(cursor.last_byte_length, Some(whole.len() as u64));
    assert_eq!(cursor.parsed_column_headers.len(), 3);
}

#[tokio::test]
async fn test_failed_fetch_leaves_cursor_unchanged() {
    let temp_dir = TempDir::new().unwrap();
    let (transport, mut sync) = open_sync(temp_dir.path());
    let adapter = CsvAdapter::new(provider_metadata());
    sync.load_or_fetch_metadata(&adapter).await.unwrap();

    let first = format!("{}{}", HEADER_LINE, FIRST_ROWS);
    transport.respond(HttpResponse::new(200).with_body(first.clone()));
    sync.sync_data_files(&adapter).await.unwrap();
    let before = sync.metadata().data_files().unwrap();

    transport
        .respond(head_response(first.len() + 10))
        .respond(HttpResponse::new(503));
    let err = sync.sync_data_files(&adapter).await.unwrap_err();

    assert!(matches!(err, Error::RangeFetch { status: 503, .. }));
    assert!(err.is_retryable());
    assert_eq!(sync.metadata().data_files().unwrap(), before);
}

#[tokio::test]
async fn test_refresh_keeps_remote_links_and_resume_state() {
    let temp_dir = TempDir::new().unwrap();
    let (transport, mut sync) = open_sync(temp_dir.path());
    let adapter = CsvAdapter::new(provider_metadata());
    sync.load_or_fetch_metadata(&adapter).await.unwrap();

    transport.respond(HttpResponse::new(200).with_body(format!("{}{}", HEADER_LINE, FIRST_ROWS)));
    sync.sync_data_files(&adapter).await.unwrap();

    let mut linked = sync.metadata().datastreams().unwrap();
    linked[0].remote = Some(crate::app::models::RemoteRef {
        id: json!(11),
        self_link: format!("{}/Datastreams(11)", STORE_URL),
    });
    sync.metadata.merge_datastreams(linked).unwrap();

    let refreshed = sync.refresh_metadata(&adapter).await.unwrap();

    assert_eq!(adapter.calls(), 2);
    let datastreams = refreshed.datastreams().unwrap();
    assert_eq!(datastreams[0].remote.as_ref().unwrap().id, json!(11));
    assert!(refreshed.data_files().unwrap()[0].last_byte_length.is_some());
}

#[tokio::test]
async fn test_cache_only_station_reads_cache_but_cannot_fetch() {
    let temp_dir = TempDir::new().unwrap();
    let adapter = CsvAdapter::new(provider_metadata());
    {
        let (_transport, mut sync) = open_sync(temp_dir.path());
        sync.load_or_fetch_metadata(&adapter).await.unwrap();
    }

    let mut sync =
        StationSync::open_cached(temp_dir.path(), station_key(), MatchRule::Exact).unwrap();
    assert!(sync.metadata_store().is_cached());
    assert_eq!(sync.metadata().name(), Some("Alpha Ridge"));

    let err = sync.sync_data_files(&adapter).await.unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert!(sync.metadata().data_files().unwrap()[0].last_byte_length.is_none());
}
