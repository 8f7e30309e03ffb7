//! Chunked media upload: INIT, APPEND x N, FINALIZE, and an optional STATUS poll.
//!
//! # Design
//! The uploader is a caller of `Client`, not a transport of its own: every
//! step goes through the client's URL resolution, auth and logging. Steps run
//! strictly in order. The first unsuccessful step ends the upload and its
//! `Response` is the overall result, so the caller always sees which step
//! failed and why.
//!
//! - INIT and FINALIZE are POSTs with the command in the query string.
//! - APPEND is a form POST carrying the base64 chunk and its zero-based
//!   `segment_index`.
//! - The number of APPEND calls is `ceil(total / chunk)`, and at least one.

use std::io::Read;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::json;

use crate::auth::AuthStrategy;
use crate::body::{append_query, params, Payload};
use crate::client::Client;
use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::{ConfigError, ResponseError};
use crate::http::{Headers, Part};
use crate::response::Response;
use crate::types::MediaResponse;

/// Used when `upload_url` is not configured.
pub const DEFAULT_UPLOAD_PATH: &str = "/media/upload.json";

/// A readable, sized, typed byte stream.
#[derive(Debug)]
pub struct UploadSource<R> {
    pub reader: R,
    pub size: u64,
    pub content_type: String,
}

impl<R: Read> UploadSource<R> {
    pub fn new(reader: R, size: u64, content_type: impl Into<String>) -> Self {
        Self {
            reader,
            size,
            content_type: content_type.into(),
        }
    }
}

impl UploadSource<std::io::Cursor<Vec<u8>>> {
    pub fn from_bytes(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        let size = bytes.len() as u64;
        Self::new(std::io::Cursor::new(bytes), size, content_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Initialized,
    Appending,
    Finalizing,
    Completed,
    Failed,
}

/// Progress of one upload. Lives only for the duration of the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub media_id: String,
    pub total_bytes: u64,
    pub chunk_size: usize,
    /// Index of the next segment to send.
    pub segment_index: u64,
    pub state: UploadState,
}

impl UploadSession {
    pub fn appends_required(&self) -> u64 {
        appends_required(self.total_bytes, self.chunk_size)
    }

    fn advance(&mut self, state: UploadState) {
        tracing::debug!(media_id = %self.media_id, from = ?self.state, to = ?state, "upload state");
        self.state = state;
    }
}

/// `ceil(total / chunk)`, never less than one.
pub fn appends_required(total_bytes: u64, chunk_size: usize) -> u64 {
    let chunk = chunk_size.max(1) as u64;
    total_bytes.div_ceil(chunk).max(1)
}

/// Outcome of `ChunkedUploader::run`.
#[derive(Debug)]
pub struct UploadOutcome {
    /// The failing step's response, or FINALIZE's.
    pub response: Response,
    /// `None` when INIT failed before a media id was known.
    pub session: Option<UploadSession>,
}

pub struct ChunkedUploader<'a, A: AuthStrategy> {
    client: &'a Client<A>,
    endpoint: String,
    chunk_size: usize,
}

impl<'a, A: AuthStrategy> ChunkedUploader<'a, A> {
    /// Endpoint and chunk size come from the client's configuration.
    pub fn new(client: &'a Client<A>) -> Self {
        let config = client.config();
        Self {
            client,
            endpoint: config
                .upload_url
                .clone()
                .filter(|url| !url.is_empty())
                .unwrap_or_else(|| DEFAULT_UPLOAD_PATH.to_string()),
            chunk_size: config.chunk_size(),
        }
    }

    /// Relative to the client's site, or absolute for a separate upload host.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = if chunk_size == 0 { DEFAULT_CHUNK_SIZE } else { chunk_size };
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Upload `source` and return the FINALIZE response, or the response of
    /// the first step that failed.
    pub fn upload<R: Read>(
        &self,
        source: UploadSource<R>,
        media_category: Option<&str>,
    ) -> Result<Response, ConfigError> {
        Ok(self.run(source, media_category)?.response)
    }

    /// Like `upload`, but also hands back the session.
    pub fn run<R: Read>(
        &self,
        mut source: UploadSource<R>,
        media_category: Option<&str>,
    ) -> Result<UploadOutcome, ConfigError> {
        let init = self.init(source.size, &source.content_type, media_category)?;
        if !init.is_successful() {
            return Ok(UploadOutcome {
                response: init,
                session: None,
            });
        }
        let Some(media_id) = media_id(&init) else {
            return Ok(UploadOutcome {
                response: init.into_failure(ResponseError::Upload("INIT response carried no media id".into())),
                session: None,
            });
        };

        let mut session = UploadSession {
            media_id,
            total_bytes: source.size,
            chunk_size: self.chunk_size,
            segment_index: 0,
            state: UploadState::Initialized,
        };
        tracing::debug!(
            media_id = %session.media_id,
            total_bytes = session.total_bytes,
            appends = session.appends_required(),
            "upload initialized"
        );

        session.advance(UploadState::Appending);
        for index in 0..session.appends_required() {
            let mut chunk = Vec::new();
            let read = (&mut source.reader)
                .take(self.chunk_size as u64)
                .read_to_end(&mut chunk);
            if let Err(err) = read {
                session.advance(UploadState::Failed);
                return Ok(UploadOutcome {
                    response: Response::failure(ResponseError::Upload(format!(
                        "reading segment {index}: {err}"
                    ))),
                    session: Some(session),
                });
            }
            let offset = index * self.chunk_size as u64;
            let expected = (self.chunk_size as u64).min(session.total_bytes - offset);
            if chunk.len() as u64 != expected {
                session.advance(UploadState::Failed);
                return Ok(UploadOutcome {
                    response: Response::failure(ResponseError::Upload(format!(
                        "source ended early: segment {index} has {} of {expected} bytes",
                        chunk.len()
                    ))),
                    session: Some(session),
                });
            }

            let response = self.append(&session.media_id, index, &chunk)?;
            if !response.is_successful() {
                session.advance(UploadState::Failed);
                return Ok(UploadOutcome {
                    response,
                    session: Some(session),
                });
            }
            session.segment_index = index + 1;
        }

        session.advance(UploadState::Finalizing);
        let response = self.finalize(&session.media_id)?;
        session.advance(if response.is_successful() {
            UploadState::Completed
        } else {
            UploadState::Failed
        });
        Ok(UploadOutcome {
            response,
            session: Some(session),
        })
    }

    pub fn init(
        &self,
        total_bytes: u64,
        media_type: &str,
        media_category: Option<&str>,
    ) -> Result<Response, ConfigError> {
        let mut query = vec![
            ("command".to_string(), "INIT".to_string()),
            ("total_bytes".to_string(), total_bytes.to_string()),
            ("media_type".to_string(), media_type.to_string()),
        ];
        if let Some(category) = media_category {
            query.push(("media_category".to_string(), category.to_string()));
        }
        self.client
            .post(&append_query(&self.endpoint, &query), Payload::None, &Headers::new())
    }

    /// Always a form body, whatever the service's `transform_body` does.
    pub fn append(&self, media_id: &str, segment_index: u64, chunk: &[u8]) -> Result<Response, ConfigError> {
        let parts = vec![
            Part::text("command", "APPEND"),
            Part::text("media_id", media_id),
            Part::text("media_data", STANDARD.encode(chunk)),
            Part::text("segment_index", segment_index.to_string()),
        ];
        self.client.post(&self.endpoint, parts, &Headers::new())
    }

    pub fn finalize(&self, media_id: &str) -> Result<Response, ConfigError> {
        let query = [
            ("command".to_string(), "FINALIZE".to_string()),
            ("media_id".to_string(), media_id.to_string()),
        ];
        self.client
            .post(&append_query(&self.endpoint, &query), Payload::None, &Headers::new())
    }

    /// Processing status after FINALIZE. Never called by `upload`.
    pub fn status(&self, media_id: &str) -> Result<Response, ConfigError> {
        self.client.get(
            &self.endpoint,
            params(json!({"command": "STATUS", "media_id": media_id})),
            &Headers::new(),
        )
    }
}

fn media_id(response: &Response) -> Option<String> {
    let body = response.json()?.clone();
    serde_json::from_value::<MediaResponse>(body).ok()?.media_id()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_count_rounds_up_and_is_at_least_one() {
        let mib = 1024 * 1024;
        assert_eq!(appends_required(5 * mib as u64, 3 * mib), 2);
        assert_eq!(appends_required(6 * mib as u64, 3 * mib), 2);
        assert_eq!(appends_required(6 * mib as u64 + 1, 3 * mib), 3);
        assert_eq!(appends_required(10, 3 * mib), 1);
        assert_eq!(appends_required(0, 3 * mib), 1);
    }

    #[test]
    fn session_reports_required_appends() {
        let session = UploadSession {
            media_id: "42".into(),
            total_bytes: 7,
            chunk_size: 2,
            segment_index: 0,
            state: UploadState::Initialized,
        };
        assert_eq!(session.appends_required(), 4);
    }
}
