//! ftp-import - stream one file from an FTP server into an object storage bucket

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod ftp;
pub mod pipeline;
pub mod request;
pub mod server;
pub mod storage;

pub use config::Config;
pub use core::Core;
pub use error::{Classification, ImportError};
pub use pipeline::{ImportResponse, Pipeline, TransferOutcome};
pub use request::TransferRequest;
