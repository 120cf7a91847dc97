use anyhow::Result;
use hyper::Method;
use serde_json::{json, Map, Value};

use crate::core::Core;
use crate::pipeline::ImportResponse;

/// Transfer parameters given on the command line
#[derive(Debug, Clone, Default)]
pub struct ImportArgs {
    pub bucket: String,
    pub host: String,
    pub file: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl ImportArgs {
    /// The JSON payload an HTTP caller would send for the same transfer
    pub fn to_payload(&self) -> Value {
        let mut body = Map::new();
        body.insert("bucketName".to_string(), json!(self.bucket));
        body.insert("host".to_string(), json!(self.host));
        body.insert("fileName".to_string(), json!(self.file));
        if let Some(user) = &self.user {
            body.insert("user".to_string(), json!(user));
        }
        if let Some(password) = &self.password {
            body.insert("password".to_string(), json!(password));
        }
        Value::Object(body)
    }
}

/// Run one import through the same pipeline the server uses and print the
/// response body to stdout.
pub async fn cmd_import(core: &Core, args: &ImportArgs) -> Result<ImportResponse> {
    let body = serde_json::to_vec(&args.to_payload())?;
    let response = core.pipeline().handle(&Method::POST, &body).await;

    println!("{}", response.body);
    Ok(response)
}
