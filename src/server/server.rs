use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{body::Incoming, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::core::Core;
use crate::error::ImportError;
use crate::pipeline::ImportResponse;

/// Largest request body read; a transfer request is a few short strings
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// HTTP body type for responses
type BoxBody = http_body_util::combinators::BoxBody<Bytes, Infallible>;

/// HTTP front end: every request is one import invocation
pub struct ImportServer {
    core: Core,
    listen: String,
}

impl ImportServer {
    pub fn new(core: Core, listen: String) -> Self {
        Self { core, listen }
    }

    /// Bind and serve until the process is stopped
    pub async fn run(self) -> Result<()> {
        let addr: SocketAddr = self
            .listen
            .parse()
            .context(format!("Invalid listen address: {}", self.listen))?;

        let listener = TcpListener::bind(addr)
            .await
            .context(format!("Failed to bind to {}", addr))?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        info!(
            "ftp-import listening on {} (storage endpoint {})",
            addr, self.core.config.storage.endpoint
        );

        let server = Arc::new(self);

        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let server = Arc::clone(&server);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);

                let service = service_fn(move |req| {
                    let server = Arc::clone(&server);
                    async move { Ok::<_, Infallible>(server.handle_request(req).await) }
                });

                if let Err(e) = http1::Builder::new()
                    .keep_alive(true)
                    .serve_connection(io, service)
                    .await
                {
                    // Filter out benign connection reset errors
                    let err_str = format!("{}", e);
                    if !err_str.contains("connection reset") && !err_str.contains("broken pipe") {
                        error!("Error serving connection from {}: {}", remote_addr, e);
                    }
                }
            });
        }
    }

    async fn handle_request(&self, req: Request<Incoming>) -> Response<BoxBody> {
        let method = req.method().clone();
        debug!("{} {}", method, req.uri());

        let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(error = %e, limit = MAX_BODY_BYTES, "request_body_rejected");
                let err = ImportError::validation(format!("Failed to read request body: {}", e));
                return into_http(ImportResponse::from_error(&err));
            }
        };

        let response = self.core.pipeline().handle(&method, &body).await;
        into_http(response)
    }
}

/// Convert a pipeline response into an HTTP response
pub fn into_http(response: ImportResponse) -> Response<BoxBody> {
    json_response(response.status, response.body_bytes())
}

fn json_response(status: StatusCode, body: Bytes) -> Response<BoxBody> {
    let mut response = Response::new(Full::new(body).boxed());
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}
