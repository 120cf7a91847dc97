//! Writable object sinks
//!
//! A [`SinkHandle`] accepts chunks in order and commits them as one object.
//! `write` only returns once the sink can take more data, which is the only
//! flow control between the remote file and the bucket.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::error::ImportError;
use crate::storage::client::StorageClient;
use crate::storage::types::CompletedPart;

/// Opens write handles for objects
#[async_trait]
pub trait ObjectSink: Send + Sync {
    /// Bind a handle to `bucket`/`object`. Fails when the bucket cannot be reached.
    async fn open_sink(&self, bucket: &str, object: &str) -> Result<Box<dyn SinkHandle>, ImportError>;
}

/// Write side of one object upload
#[async_trait]
pub trait SinkHandle: Send {
    async fn write(&mut self, chunk: Bytes) -> Result<(), ImportError>;

    /// Commit everything written so far. Returns the object size.
    async fn finish(&mut self) -> Result<u64, ImportError>;

    /// Discard the upload after a failure (best-effort)
    async fn abort(&mut self);
}

/// Sink backed by an S3-compatible bucket
#[derive(Debug, Clone)]
pub struct S3Sink {
    client: StorageClient,
    part_size: usize,
}

impl S3Sink {
    pub fn new(client: StorageClient, part_size: usize) -> Self {
        Self { client, part_size }
    }
}

#[async_trait]
impl ObjectSink for S3Sink {
    async fn open_sink(&self, bucket: &str, object: &str) -> Result<Box<dyn SinkHandle>, ImportError> {
        self.client.head_bucket(bucket).await?;
        debug!(bucket = %bucket, object = %object, "sink_opened");

        Ok(Box::new(S3SinkHandle {
            client: self.client.clone(),
            bucket: bucket.to_string(),
            key: object.to_string(),
            part_size: self.part_size,
            buffer: BytesMut::with_capacity(self.part_size),
            upload_id: None,
            parts: Vec::new(),
            written: 0,
        }))
    }
}

/// Buffers one part at a time. Small objects go up as a single PUT; anything
/// larger than a part becomes a multipart upload.
pub struct S3SinkHandle {
    client: StorageClient,
    bucket: String,
    key: String,
    part_size: usize,
    buffer: BytesMut,
    upload_id: Option<String>,
    parts: Vec<CompletedPart>,
    written: u64,
}

impl S3SinkHandle {
    async fn upload_id(&mut self) -> Result<String, ImportError> {
        if let Some(id) = &self.upload_id {
            return Ok(id.clone());
        }
        let upload_id = self
            .client
            .create_multipart_upload(&self.bucket, &self.key)
            .await?;
        debug!(key = %self.key, upload_id = %upload_id, "multipart_created");
        self.upload_id = Some(upload_id.clone());
        Ok(upload_id)
    }

    async fn flush_part(&mut self, data: Bytes) -> Result<(), ImportError> {
        let upload_id = self.upload_id().await?;
        let part_number = self.parts.len() as u32 + 1;
        let part = self
            .client
            .upload_part(&self.bucket, &self.key, &upload_id, part_number, data)
            .await?;
        self.parts.push(part);
        Ok(())
    }
}

#[async_trait]
impl SinkHandle for S3SinkHandle {
    async fn write(&mut self, chunk: Bytes) -> Result<(), ImportError> {
        self.written += chunk.len() as u64;
        self.buffer.extend_from_slice(&chunk);

        while self.buffer.len() >= self.part_size {
            let part = self.buffer.split_to(self.part_size).freeze();
            self.flush_part(part).await?;
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<u64, ImportError> {
        let rest = self.buffer.split().freeze();

        let Some(upload_id) = self.upload_id.clone() else {
            self.client.put_object(&self.bucket, &self.key, rest).await?;
            return Ok(self.written);
        };

        // The last part may be smaller than the minimum
        if !rest.is_empty() {
            self.flush_part(rest).await?;
        }

        self.client
            .complete_multipart_upload(&self.bucket, &self.key, &upload_id, &self.parts)
            .await?;
        self.upload_id = None;
        debug!(key = %self.key, parts = self.parts.len(), "multipart_completed");

        Ok(self.written)
    }

    async fn abort(&mut self) {
        self.buffer.clear();
        if let Some(upload_id) = self.upload_id.take() {
            if let Err(e) = self
                .client
                .abort_multipart_upload(&self.bucket, &self.key, &upload_id)
                .await
            {
                warn!(key = %self.key, upload_id = %upload_id, error = %e, "multipart_abort_failed");
            }
        }
    }
}
