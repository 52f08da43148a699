//! Part transport
//!
//! Moves one part's bytes to a signed URL and extracts the integrity tag
//! the storage service assigns to it.
//!
//! # Cancellation
//!
//! The request future is raced against a [`CancellationToken`]. Losing the
//! race drops the future, which closes the underlying connection instead of
//! leaving the transfer running in the background.

use crate::backend::RequestError;
use crate::upload::progress::{PartProgress, PartProgressCallback};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::CONTENT_LENGTH;
use tokio_util::sync::CancellationToken;

/// Size of the body chunks handed to the HTTP stack; progress is reported per chunk
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Response header carrying the integrity tag
pub const DEFAULT_TAG_HEADER: &str = "ETag";

/// Half-open byte range `[start, end)` within the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// One part transfer request
#[derive(Debug, Clone)]
pub struct PartUpload {
    pub part_number: u32,
    pub url: String,
    pub range: ByteRange,
    pub body: Bytes,
}

/// Performs single part transfers
#[async_trait]
pub trait PartTransport: Send + Sync {
    /// Upload `part.body` to `part.url`, returning the integrity tag.
    ///
    /// Must return [`RequestError::Cancelled`] promptly once `cancel` fires,
    /// aborting the underlying I/O.
    async fn upload_part(
        &self,
        part: PartUpload,
        progress: PartProgressCallback,
        cancel: CancellationToken,
    ) -> Result<String, RequestError>;
}

/// reqwest-based [`PartTransport`]
pub struct HttpPartTransport {
    http_client: reqwest::Client,
    tag_header: String,
}

impl HttpPartTransport {
    /// Create a transport
    ///
    /// No client-wide timeout is set; the coordinator bounds each part.
    pub fn new() -> Result<Self, RequestError> {
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| RequestError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            tag_header: DEFAULT_TAG_HEADER.to_string(),
        })
    }

    /// Read the integrity tag from a different response header
    pub fn with_tag_header(mut self, header: impl Into<String>) -> Self {
        self.tag_header = header.into();
        self
    }

    pub fn tag_header(&self) -> &str {
        &self.tag_header
    }
}

/// Split a part body into chunks that report progress as they are consumed
fn progress_stream(
    part_number: u32,
    body: Bytes,
    progress: PartProgressCallback,
) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let part_bytes = body.len() as u64;
    let len = body.len();
    let mut bytes_sent = 0u64;

    let chunks = (0..len)
        .step_by(STREAM_CHUNK_SIZE)
        .map(move |start| body.slice(start..(start + STREAM_CHUNK_SIZE).min(len)));

    futures::stream::iter(chunks).map(move |chunk| {
        bytes_sent += chunk.len() as u64;
        progress(PartProgress {
            part_number,
            bytes_sent,
            part_bytes,
        });
        Ok(chunk)
    })
}

#[async_trait]
impl PartTransport for HttpPartTransport {
    #[tracing::instrument(
        name = "transport.upload_part",
        skip(self, part, progress, cancel),
        fields(
            part_number = part.part_number,
            upload.bytes = part.body.len(),
            http.status_code = tracing::field::Empty
        )
    )]
    async fn upload_part(
        &self,
        part: PartUpload,
        progress: PartProgressCallback,
        cancel: CancellationToken,
    ) -> Result<String, RequestError> {
        let content_length = part.body.len() as u64;
        let body = reqwest::Body::wrap_stream(progress_stream(part.part_number, part.body, progress));

        let request = self
            .http_client
            .put(&part.url)
            .header(CONTENT_LENGTH, content_length)
            .body(body)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Part transfer cancelled");
                return Err(RequestError::Cancelled);
            }
            response = request => response?,
        };

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RequestError::from_status(status.as_u16(), message));
        }

        let tag = response
            .headers()
            .get(self.tag_header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                RequestError::InvalidResponse(format!(
                    "response for part {} has no {} header",
                    part.part_number, self.tag_header
                ))
            })?;

        Ok(tag.to_string())
    }
}
