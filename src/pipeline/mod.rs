//! Import pipeline
//!
//! Drives one invocation through
//! `Validating → Connecting → Transferring → Closing → Done/Failed`
//! and turns the result into a response. The transfer session is closed
//! exactly once per invocation, whichever state the invocation failed in.

use std::time::Instant;

use bytes::Bytes;
use futures::StreamExt;
use hyper::{Method, StatusCode};
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn, Instrument};

use crate::error::{ImportError, Result};
use crate::ftp::{ReadStream, SessionFactory, TransferSession};
use crate::request::TransferRequest;
use crate::storage::{ObjectSink, SinkHandle};

/// Bytes read from the remote stream per chunk
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Result of piping the remote stream into the sink
#[derive(Debug)]
pub enum TransferOutcome {
    Success { bytes: u64 },
    Failed(ImportError),
}

/// Pipe `source` into `sink` until the source ends or either side fails.
///
/// The first error ends the pipe; nothing more is written to the sink after
/// it. The sink is left uncommitted either way, and the source is dropped
/// before this returns.
pub async fn pipe(source: ReadStream, sink: &mut dyn SinkHandle, chunk_size: usize) -> TransferOutcome {
    let mut chunks = ReaderStream::with_capacity(source, chunk_size);
    let mut bytes = 0u64;

    while let Some(next) = chunks.next().await {
        let chunk: Bytes = match next {
            Ok(chunk) => chunk,
            Err(e) => {
                return TransferOutcome::Failed(ImportError::transfer(format!(
                    "Reading remote file failed: {}",
                    e
                )))
            }
        };
        bytes += chunk.len() as u64;
        if let Err(e) = sink.write(chunk).await {
            return TransferOutcome::Failed(e);
        }
    }

    TransferOutcome::Success { bytes }
}

/// Commit the object only once the remote side has confirmed the download
async fn commit<S: TransferSession>(session: &mut S, sink: &mut dyn SinkHandle) -> Result<u64> {
    session.finish().await?;
    sink.finish().await
}

/// Status and JSON body produced by one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ImportResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl ImportResponse {
    pub fn success() -> Self {
        Self {
            status: StatusCode::OK,
            body: json!({ "message": "success" }),
        }
    }

    pub fn from_error(err: &ImportError) -> Self {
        let status = err.status();
        let classification = err.classification();
        let mut body = json!({
            "message": err.to_string(),
            "code": status.as_u16(),
            "classification": classification.as_str(),
        });
        if let Some(remote) = err.remote_code() {
            body["remoteCode"] = json!(remote);
        }
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn body_bytes(&self) -> Bytes {
        Bytes::from(self.body.to_string())
    }
}

/// Parse the raw request body. An empty body means "no payload".
fn parse_body(body: &[u8]) -> Result<Option<Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|_| ImportError::validation("Request body is not valid JSON"))
}

/// Wires validation, the transfer session, and the sink together
pub struct Pipeline<F, K> {
    sessions: F,
    sink: K,
    chunk_size: usize,
}

impl<F, K> Pipeline<F, K>
where
    F: SessionFactory,
    K: ObjectSink,
{
    pub fn new(sessions: F, sink: K) -> Self {
        Self {
            sessions,
            sink,
            chunk_size: READ_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Run one invocation. Never fails: every error becomes a response.
    pub async fn handle(&self, method: &Method, body: &[u8]) -> ImportResponse {
        let span = tracing::info_span!(
            "import",
            bucket = tracing::field::Empty,
            host = tracing::field::Empty,
            file = tracing::field::Empty,
        );

        async move {
            let started = Instant::now();
            let mut session = self.sessions.create();

            let result = self.run(&mut session, method, body).await;

            debug!("state_closing");
            if let Err(e) = session.close().await {
                warn!(error = %e, "session_close_failed");
            }

            match result {
                Ok(bytes) => {
                    info!(
                        bytes = bytes,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "import_complete"
                    );
                    ImportResponse::success()
                }
                Err(e) => {
                    let response = ImportResponse::from_error(&e);
                    if response.status.is_client_error() {
                        warn!(
                            classification = %e.classification(),
                            status = response.status.as_u16(),
                            error = %e,
                            "import_rejected"
                        );
                    } else {
                        error!(
                            classification = %e.classification(),
                            status = response.status.as_u16(),
                            duration_ms = started.elapsed().as_millis() as u64,
                            error = %e,
                            "import_failed"
                        );
                    }
                    response
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, session: &mut F::Session, method: &Method, body: &[u8]) -> Result<u64> {
        if *method != Method::POST {
            return Err(ImportError::InvalidMethod);
        }

        debug!("state_validating");
        let payload = parse_body(body)?;
        let request = TransferRequest::from_payload(payload.as_ref())?;

        let span = tracing::Span::current();
        span.record("bucket", request.bucket_name.as_str());
        span.record("host", request.host.as_str());
        span.record("file", request.file_name.as_str());

        debug!("state_connecting");
        let stream = session
            .open(
                &request.host,
                &request.file_name,
                request.user.as_deref(),
                request.password.as_deref(),
            )
            .await?;

        debug!("state_transferring");
        let mut sink = self
            .sink
            .open_sink(&request.bucket_name, &request.file_name)
            .await?;

        let committed = match pipe(stream, sink.as_mut(), self.chunk_size).await {
            TransferOutcome::Success { bytes } => {
                debug!(bytes = bytes, "state_committing");
                commit(session, sink.as_mut()).await
            }
            TransferOutcome::Failed(e) => Err(e),
        };

        if committed.is_err() {
            sink.abort().await;
        }
        committed
    }
}
