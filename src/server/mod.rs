//! HTTP endpoint
//!
//! Accepts the invocation contract over plain HTTP/1.1: a POST with a JSON
//! transfer request, answered with a JSON status body.

mod server;

pub use server::{into_http, ImportServer, MAX_BODY_BYTES};

use anyhow::Result;
use crate::core::Core;

/// Run the HTTP server with the given core and listen address
pub async fn run_server(core: &Core, listen: &str) -> Result<()> {
    let server = ImportServer::new(core.clone(), listen.to_string());
    server.run().await
}
