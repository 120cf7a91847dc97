//! Multipart upload types

/// Smallest part size accepted by S3-compatible services (except the last part)
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Part information for CompleteMultipartUpload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// Part number (1-10000)
    pub part_number: u32,
    /// ETag returned from UploadPart, without quotes
    pub etag: String,
}

impl CompletedPart {
    pub fn new(part_number: u32, etag: String) -> Self {
        Self { part_number, etag }
    }
}

/// Error document returned by the storage service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
}

impl StorageErrorBody {
    /// Human-readable summary, falling back to the raw body
    pub fn describe(&self, raw: &str) -> String {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (Some(code), None) => code.clone(),
            (None, Some(message)) => message.clone(),
            (None, None) => raw.trim().to_string(),
        }
    }
}
