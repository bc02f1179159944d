//! Resumable downloads of append-only source files
//!
//! Source files grow monotonically, so after the first download only the
//! unseen tail needs fetching. Each call decides between three branches from
//! the caller's prior length and a HEAD probe:
//!
//! - **full**: no prior length, the file shrank (rotated/truncated), or the
//!   source gives no length; the whole resource is downloaded
//! - **unchanged**: remote length equals the prior length; no GET is issued
//! - **partial**: the remote grew; bytes `[prior, end)` are requested with a
//!   `Range` header
//!
//! Every request asks for identity encoding, so `Content-Length` and range
//! offsets count the same bytes the caller has stored.
//!
//! The fetcher never touches the cache. Callers advance their
//! [`DataFileCursor`](crate::app::models::DataFileCursor) only after parsing
//! the returned body, so a crash or failed parse retries the same range.

use crate::app::adapters::http::{HttpRequest, HttpResponse, HttpTransport, Method};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{Instrument, debug, info, warn};

pub use crate::app::models::{FetchKind, FetchOutcome};

#[cfg(test)]
pub mod tests;

const STATUS_OK: u16 = 200;
const STATUS_PARTIAL_CONTENT: u16 = 206;
const STATUS_RANGE_NOT_SATISFIABLE: u16 = 416;

/// What a HEAD probe reported about the remote file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileInfo {
    pub content_length: Option<u64>,
    pub last_modified: Option<String>,
}

/// Byte-range aware downloader
#[derive(Clone)]
pub struct ResumableFetcher {
    transport: Arc<dyn HttpTransport>,
    span: tracing::Span,
}

impl ResumableFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            span: tracing::Span::current(),
        }
    }

    /// Replace the logging span events are emitted in
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    /// Fetch whatever `url` holds beyond `prior_length` bytes
    ///
    /// `None` for `prior_length` downloads the whole file.
    pub async fn fetch(&self, url: &str, prior_length: Option<u64>) -> Result<FetchOutcome> {
        self.resume(url, prior_length)
            .instrument(self.span.clone())
            .await
    }

    /// Download the whole resource
    pub async fn fetch_full(&self, url: &str) -> Result<FetchOutcome> {
        self.download_full(url).instrument(self.span.clone()).await
    }

    async fn resume(&self, url: &str, prior_length: Option<u64>) -> Result<FetchOutcome> {
        let Some(prior) = prior_length else {
            return self.download_full(url).await;
        };

        let info = self.probe(url).await?;

        let Some(remote_length) = info.content_length else {
            warn!("{} reported no Content-Length; downloading in full", url);
            return self.download_full(url).await;
        };

        if remote_length < prior {
            warn!(
                "{} shrank from {} to {} bytes; treating as rotated and downloading in full",
                url, prior, remote_length
            );
            return self.download_full(url).await;
        }

        if remote_length == prior {
            debug!("{} unchanged at {} bytes", url, prior);
            return Ok(unchanged(prior, info.last_modified));
        }

        self.download_range(url, prior, info.last_modified).await
    }

    async fn download_full(&self, url: &str) -> Result<FetchOutcome> {
        let response = self.transport.send(identity(HttpRequest::get(url))).await?;

        if response.status != STATUS_OK {
            return Err(Error::remote_protocol(
                Method::Get.to_string(),
                url,
                response.status,
                response.body_excerpt(),
            ));
        }

        let last_modified = response.header("last-modified").map(str::to_string);
        let body = response.body;
        info!("Downloaded {} in full ({} bytes)", url, body.len());

        Ok(FetchOutcome {
            content_length: body.len() as u64,
            body: Some(body),
            last_modified,
            full_file: true,
        })
    }

    /// Read length and modification time with a HEAD request
    pub async fn probe(&self, url: &str) -> Result<RemoteFileInfo> {
        let response = self.transport.send(identity(HttpRequest::head(url))).await?;
        if !response.is_success() {
            return Err(Error::remote_protocol(
                Method::Head.to_string(),
                url,
                response.status,
                response.body_excerpt(),
            ));
        }

        Ok(RemoteFileInfo {
            content_length: response
                .header("content-length")
                .and_then(|v| v.trim().parse().ok()),
            last_modified: response.header("last-modified").map(str::to_string),
        })
    }

    async fn download_range(
        &self,
        url: &str,
        prior: u64,
        probed_last_modified: Option<String>,
    ) -> Result<FetchOutcome> {
        let request =
            identity(HttpRequest::get(url)).with_header("Range", format!("bytes={}-", prior));
        let response = self.transport.send(request).await?;

        match response.status {
            STATUS_PARTIAL_CONTENT => {
                let last_modified = last_modified_of(&response).or(probed_last_modified);
                let delta = response.body;
                info!(
                    "Downloaded {} new bytes of {} from offset {}",
                    delta.len(),
                    url,
                    prior
                );
                Ok(FetchOutcome {
                    content_length: prior + delta.len() as u64,
                    body: Some(delta),
                    last_modified,
                    full_file: false,
                })
            }
            STATUS_RANGE_NOT_SATISFIABLE => {
                debug!("{} has no bytes beyond offset {}", url, prior);
                Ok(unchanged(prior, probed_last_modified))
            }
            STATUS_OK => {
                // Range ignored by the server: the body starts at byte 0
                let last_modified = last_modified_of(&response).or(probed_last_modified);
                let body = response.body;
                warn!(
                    "{} ignored the range request; received the full {} bytes",
                    url,
                    body.len()
                );
                Ok(FetchOutcome {
                    content_length: body.len() as u64,
                    body: Some(body),
                    last_modified,
                    full_file: true,
                })
            }
            status => {
                warn!(
                    "Range request for {} from offset {} failed with status {}",
                    url, prior, status
                );
                Err(Error::range_fetch(url, status))
            }
        }
    }
}

/// Lengths and range offsets only agree on uncompressed bytes
fn identity(request: HttpRequest) -> HttpRequest {
    request.with_header("Accept-Encoding", "identity")
}

fn unchanged(length: u64, last_modified: Option<String>) -> FetchOutcome {
    FetchOutcome {
        body: None,
        content_length: length,
        last_modified,
        full_file: false,
    }
}

fn last_modified_of(response: &HttpResponse) -> Option<String> {
    response.header("last-modified").map(str::to_string)
}
