//! Transfer session client
//!
//! This module provides:
//! - The [`TransferSession`] seam the pipeline drives
//! - An async FTP implementation of it ([`FtpSession`])
//! - Reply parsing for the FTP control channel

pub mod client;
pub mod reply;

pub use client::{split_host_port, FtpConnector, FtpSession};
pub use reply::Reply;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::error::ImportError;

/// Readable byte stream of the remote file
pub type ReadStream = Box<dyn AsyncRead + Send + Unpin>;

/// FTP client errors
#[derive(Error, Debug)]
pub enum FtpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FTP {code}: {message}")]
    Reply { code: u16, message: String },

    #[error("Malformed reply: {0}")]
    Malformed(String),

    #[error("Invalid host: {0}")]
    InvalidHost(String),

    #[error("Not connected")]
    NotConnected,

    #[error("No transfer in progress")]
    NoTransfer,
}

/// A session against a remote file server, used for exactly one download.
///
/// `close` is called once per session whatever happened before it, including
/// when `open` was never called or failed.
#[async_trait]
pub trait TransferSession: Send {
    /// Connect with the given credentials and start reading `file_name`
    async fn open(
        &mut self,
        host: &str,
        file_name: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<ReadStream, ImportError>;

    /// Confirm with the server that the download completed
    async fn finish(&mut self) -> Result<(), ImportError>;

    /// Best-effort teardown
    async fn close(&mut self) -> Result<(), ImportError>;
}

/// Builds one session per invocation
pub trait SessionFactory: Send + Sync {
    type Session: TransferSession;

    fn create(&self) -> Self::Session;
}
