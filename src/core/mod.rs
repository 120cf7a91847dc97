use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::ftp::FtpConnector;
use crate::pipeline::Pipeline;
use crate::storage::{S3Sink, StorageClient};

/// The pipeline wired to the real FTP client and storage sink
pub type ImportPipeline = Pipeline<FtpConnector, S3Sink>;

/// Process-wide state shared by the server and the one-shot command
///
/// The storage client is created once here; every invocation shares its HTTP
/// connection pool. Nothing in `Core` is mutated after construction.
#[derive(Clone)]
pub struct Core {
    pub config: Arc<Config>,
    pipeline: Arc<ImportPipeline>,
}

impl Core {
    pub fn new(config: Config) -> Result<Self> {
        let storage = StorageClient::new(&config.storage)
            .context("Failed to build storage client")?;

        tracing::debug!(
            endpoint = %storage.endpoint(),
            part_size = config.storage.effective_part_size(),
            ftp_port = config.ftp.port,
            "core_initialized"
        );

        let sink = S3Sink::new(storage, config.storage.effective_part_size());
        let sessions = FtpConnector::new(config.ftp.clone());

        Ok(Self {
            config: Arc::new(config),
            pipeline: Arc::new(Pipeline::new(sessions, sink)),
        })
    }

    pub fn pipeline(&self) -> &ImportPipeline {
        &self.pipeline
    }
}
