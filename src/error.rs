//! Failure taxonomy for a single import invocation
//!
//! Every failure the pipeline can produce is one of the [`ImportError`]
//! variants. The variant decides the [`Classification`], and the
//! classification decides the response status through [`Classification::status`].

use hyper::StatusCode;
use thiserror::Error;

use crate::ftp::FtpError;
use crate::storage::S3Error;

/// FTP reply code for "requested action not taken, file unavailable"
pub const FTP_FILE_UNAVAILABLE: u16 = 550;

/// FTP reply code for "not logged in"
pub const FTP_NOT_LOGGED_IN: u16 = 530;

/// Closed vocabulary describing the kind of failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    MethodNotAllowed,
    BadRequest,
    NotFound,
    Unauthorized,
    TransferError,
    StorageError,
}

impl Classification {
    /// Map a classification to its response status.
    ///
    /// Storage failures report the status attached by the storage service
    /// when one is known; see [`ImportError::status`].
    pub fn status(self) -> StatusCode {
        match self {
            Classification::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Classification::BadRequest => StatusCode::BAD_REQUEST,
            Classification::NotFound => StatusCode::NOT_FOUND,
            Classification::Unauthorized => StatusCode::UNAUTHORIZED,
            Classification::TransferError => StatusCode::INTERNAL_SERVER_ERROR,
            Classification::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable label used in response bodies and log fields
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::MethodNotAllowed => "method_not_allowed",
            Classification::BadRequest => "bad_request",
            Classification::NotFound => "not_found",
            Classification::Unauthorized => "unauthorized",
            Classification::TransferError => "transfer_error",
            Classification::StorageError => "storage_error",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Import pipeline errors
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Only POST requests are accepted.")]
    InvalidMethod,

    #[error("{0}")]
    Validation(String),

    #[error("Remote file not found: {message}")]
    NotFound { code: Option<u16>, message: String },

    #[error("Remote server rejected credentials: {message}")]
    Unauthorized { code: Option<u16>, message: String },

    #[error("Transfer failed: {message}")]
    Transfer { code: Option<u16>, message: String },

    #[error("Storage error: {message}")]
    Storage { status: Option<u16>, message: String },
}

impl ImportError {
    pub fn validation(message: impl Into<String>) -> Self {
        ImportError::Validation(message.into())
    }

    pub fn transfer(message: impl Into<String>) -> Self {
        ImportError::Transfer {
            code: None,
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        ImportError::Storage {
            status: None,
            message: message.into(),
        }
    }

    /// Classify a failure reported by the remote FTP server by its reply code
    pub fn from_remote_reply(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            FTP_FILE_UNAVAILABLE => ImportError::NotFound {
                code: Some(code),
                message,
            },
            FTP_NOT_LOGGED_IN => ImportError::Unauthorized {
                code: Some(code),
                message,
            },
            _ => ImportError::Transfer {
                code: Some(code),
                message,
            },
        }
    }

    pub fn classification(&self) -> Classification {
        match self {
            ImportError::InvalidMethod => Classification::MethodNotAllowed,
            ImportError::Validation(_) => Classification::BadRequest,
            ImportError::NotFound { .. } => Classification::NotFound,
            ImportError::Unauthorized { .. } => Classification::Unauthorized,
            ImportError::Transfer { .. } => Classification::TransferError,
            ImportError::Storage { .. } => Classification::StorageError,
        }
    }

    /// Response status for this failure.
    ///
    /// Remote FTP reply codes never leak into the status; they are
    /// normalized through the classification table. Storage statuses are
    /// already HTTP statuses and pass through when they are error statuses.
    pub fn status(&self) -> StatusCode {
        match self {
            ImportError::Storage {
                status: Some(status),
                ..
            } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            other => other.classification().status(),
        }
    }

    /// Numeric code reported by the remote side, if any
    pub fn remote_code(&self) -> Option<u16> {
        match self {
            ImportError::NotFound { code, .. }
            | ImportError::Unauthorized { code, .. }
            | ImportError::Transfer { code, .. } => *code,
            ImportError::Storage { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<FtpError> for ImportError {
    fn from(err: FtpError) -> Self {
        match err {
            FtpError::Reply { code, message } => ImportError::from_remote_reply(code, message),
            other => ImportError::transfer(other.to_string()),
        }
    }
}

impl From<S3Error> for ImportError {
    fn from(err: S3Error) -> Self {
        match err {
            S3Error::S3Response { status, message } => ImportError::Storage {
                status: Some(status.as_u16()),
                message,
            },
            other => ImportError::storage(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
