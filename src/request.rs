//! Inbound transfer request and its validation

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ImportError, Result};

/// Required payload fields, in the order they are checked
pub const REQUIRED_FIELDS: [&str; 3] = ["bucketName", "host", "fileName"];

/// A validated transfer request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub bucket_name: String,
    pub host: String,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip)]
    pub password: Option<String>,
}

impl TransferRequest {
    /// Validate a raw payload and build the request from it.
    ///
    /// Stops at the first required field that is missing, not a string, or
    /// empty, and reports only that field.
    pub fn from_payload(payload: Option<&Value>) -> Result<Self> {
        let body = match payload {
            Some(Value::Object(map)) => map,
            _ => return Err(ImportError::validation("Body required")),
        };

        for field in REQUIRED_FIELDS {
            if non_empty_str(body, field).is_none() {
                return Err(ImportError::validation(format!(
                    "Required property: {} not found",
                    field
                )));
            }
        }

        Ok(Self {
            bucket_name: required(body, "bucketName"),
            host: required(body, "host"),
            file_name: required(body, "fileName"),
            user: optional(body, "user"),
            password: optional(body, "password"),
        })
    }
}

fn non_empty_str<'a>(body: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn required(body: &Map<String, Value>, field: &str) -> String {
    non_empty_str(body, field).unwrap_or_default().to_string()
}

fn optional(body: &Map<String, Value>, field: &str) -> Option<String> {
    body.get(field).and_then(Value::as_str).map(str::to_string)
}
