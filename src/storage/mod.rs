//! Object storage sink with AWS SigV4 signing
//!
//! This module provides:
//! - SigV4 request signing (accepted by S3 and by GCS with HMAC keys)
//! - A storage client for bucket checks, PUT, and multipart uploads
//! - The [`ObjectSink`] / [`SinkHandle`] seam the pipeline writes through

pub mod client;
pub mod signer;
pub mod sink;
pub mod types;

pub use client::{Result, S3Error, StorageClient};
pub use signer::SigV4Signer;
pub use sink::{ObjectSink, S3Sink, S3SinkHandle, SinkHandle};
pub use types::{CompletedPart, MIN_PART_SIZE};
