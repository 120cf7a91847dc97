//! S3-compatible storage client
//!
//! Path-style requests (`{endpoint}/{bucket}/{key}`) signed with SigV4.
//! Only the operations a streamed upload needs are implemented:
//! bucket check, single PUT, and the multipart upload cycle.

use crate::config::StorageConfig;
use crate::storage::signer::{uri_encode, SigV4Signer};
use crate::storage::types::{CompletedPart, StorageErrorBody};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use native_tls::TlsConnector;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::time::Duration;
use thiserror::Error;

/// Storage client errors
#[derive(Error, Debug)]
pub enum S3Error {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("Hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("Request failed: {0}")]
    Client(#[from] hyper_util::client::legacy::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("Storage error: {status} - {message}")]
    S3Response { status: StatusCode, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<quick_xml::Error> for S3Error {
    fn from(err: quick_xml::Error) -> Self {
        S3Error::XmlParse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, S3Error>;

/// Storage client
///
/// Clone is cheap - the underlying HTTP client uses Arc internally.
#[derive(Clone)]
pub struct StorageClient {
    client: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    signer: SigV4Signer,
    endpoint: String,
}

impl std::fmt::Debug for StorageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageClient")
            .field("endpoint", &self.endpoint)
            .field("signer", &self.signer)
            .finish()
    }
}

impl StorageClient {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.enforce_http(false);
        http.set_connect_timeout(Some(Duration::from_secs(10)));
        http.set_keepalive(Some(Duration::from_secs(90)));

        let tls = if config.insecure_tls {
            tracing::warn!("INSECURE TLS MODE ENABLED: Certificate verification is disabled!");
            TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()?
        } else {
            TlsConnector::new()?
        };

        let https = HttpsConnector::from((http, tls.into()));

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .set_host(true)
            .build(https);

        Ok(Self {
            client,
            signer: SigV4Signer::new(&config.access_key, &config.secret_key, &config.region),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `{endpoint}/{bucket}` or `{endpoint}/{bucket}/{key}`
    pub fn object_url(&self, bucket: &str, key: Option<&str>) -> String {
        let mut url = String::with_capacity(self.endpoint.len() + bucket.len() + 64);
        url.push_str(&self.endpoint);
        url.push('/');
        url.push_str(&uri_encode(bucket, true));
        if let Some(key) = key {
            url.push('/');
            url.push_str(&uri_encode(key, false));
        }
        url
    }

    /// Send one signed request and collect the response.
    ///
    /// Bodies are signed as UNSIGNED-PAYLOAD unless `sign_body` is set.
    async fn send(
        &self,
        method: Method,
        url: &str,
        mut headers: BTreeMap<String, String>,
        body: Bytes,
        sign_body: bool,
    ) -> Result<(StatusCode, hyper::HeaderMap, Bytes)> {
        if !body.is_empty() || method == Method::PUT {
            headers.insert("content-length".to_string(), body.len().to_string());
        }
        let signed_headers = if body.is_empty() || sign_body {
            self.signer.sign(method.as_str(), url, headers, &body)
        } else {
            self.signer.sign_unsigned_payload(method.as_str(), url, headers)
        };

        let mut req = Request::builder().method(method).uri(url);
        for (key, value) in signed_headers.iter() {
            req = req.header(key, value);
        }

        let request = req.body(Full::new(body))?;
        let response = self.client.request(request).await?;
        let status = response.status();
        let resp_headers = response.headers().clone();
        let body_bytes = response.collect().await?.to_bytes();

        Ok((status, resp_headers, body_bytes))
    }

    fn error_from(status: StatusCode, body: &[u8]) -> S3Error {
        let raw = String::from_utf8_lossy(body);
        let message = parse_error_body(body).describe(&raw);
        let message = if message.is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_string()
        } else {
            message
        };
        S3Error::S3Response { status, message }
    }

    /// Check that a bucket exists and the credentials can reach it
    pub async fn head_bucket(&self, bucket: &str) -> Result<()> {
        let url = self.object_url(bucket, None);
        let (status, _, body) = self
            .send(Method::HEAD, &url, BTreeMap::new(), Bytes::new(), false)
            .await?;

        if !status.is_success() {
            return Err(Self::error_from(status, &body));
        }
        Ok(())
    }

    /// Upload a whole object with one PUT. Returns the ETag.
    pub async fn put_object(&self, bucket: &str, key: &str, data: Bytes) -> Result<String> {
        let url = self.object_url(bucket, Some(key));

        let mut headers = BTreeMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/octet-stream".to_string(),
        );

        let (status, resp_headers, body) =
            self.send(Method::PUT, &url, headers, data, false).await?;

        if !status.is_success() {
            return Err(Self::error_from(status, &body));
        }

        Ok(etag_header(&resp_headers))
    }

    /// Initiate a multipart upload. Returns the upload ID.
    pub async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
        let url = format!("{}?uploads", self.object_url(bucket, Some(key)));

        let mut headers = BTreeMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/octet-stream".to_string(),
        );

        let (status, _, body) = self
            .send(Method::POST, &url, headers, Bytes::new(), false)
            .await?;

        if !status.is_success() {
            return Err(Self::error_from(status, &body));
        }

        parse_upload_id(&body)
    }

    /// Upload one part (1-indexed). Returns the part with its ETag.
    pub async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<CompletedPart> {
        let mut url = self.object_url(bucket, Some(key));
        let _ = write!(
            url,
            "?partNumber={}&uploadId={}",
            part_number,
            uri_encode(upload_id, true)
        );

        let (status, resp_headers, body) = self
            .send(Method::PUT, &url, BTreeMap::new(), data, false)
            .await?;

        if !status.is_success() {
            return Err(Self::error_from(status, &body));
        }

        Ok(CompletedPart::new(part_number, etag_header(&resp_headers)))
    }

    /// Complete a multipart upload. Parts must be sorted by part number.
    pub async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let mut url = self.object_url(bucket, Some(key));
        let _ = write!(url, "?uploadId={}", uri_encode(upload_id, true));

        let xml = Bytes::from(complete_multipart_body(parts));

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/xml".to_string());

        let (status, _, body) = self.send(Method::POST, &url, headers, xml, true).await?;

        // S3 can report a failed completion inside a 200 response
        if !status.is_success() || body_is_error(&body) {
            return Err(Self::error_from(status, &body));
        }
        Ok(())
    }

    /// Abort a multipart upload and discard its parts
    pub async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<()> {
        let mut url = self.object_url(bucket, Some(key));
        let _ = write!(url, "?uploadId={}", uri_encode(upload_id, true));

        let (status, _, body) = self
            .send(Method::DELETE, &url, BTreeMap::new(), Bytes::new(), false)
            .await?;

        if !status.is_success() {
            return Err(Self::error_from(status, &body));
        }
        Ok(())
    }
}

fn etag_header(headers: &hyper::HeaderMap) -> String {
    headers
        .get("etag")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim_matches('"').to_string())
        .unwrap_or_default()
}

/// Build the CompleteMultipartUpload XML document
pub fn complete_multipart_body(parts: &[CompletedPart]) -> String {
    let mut xml = String::with_capacity(parts.len() * 100 + 100);
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    xml.push_str("<CompleteMultipartUpload>");
    for part in parts {
        let _ = write!(
            xml,
            "<Part><PartNumber>{}</PartNumber><ETag>\"{}\"</ETag></Part>",
            part.part_number,
            part.etag.trim_matches('"')
        );
    }
    xml.push_str("</CompleteMultipartUpload>");
    xml
}

/// Collect the text of the named elements of a small XML document
fn collect_elements(xml_data: &[u8], names: &[&[u8]]) -> Result<BTreeMap<Vec<u8>, String>> {
    let mut reader = Reader::from_reader(xml_data);
    reader.config_mut().trim_text_start = true;
    reader.config_mut().trim_text_end = true;

    let mut found = BTreeMap::new();
    let mut current_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) => current_text.clear(),
            Ok(Event::Text(e)) => {
                current_text.push_str(&e.unescape()?);
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if names.contains(&name.as_ref()) {
                    found
                        .entry(name.as_ref().to_vec())
                        .or_insert_with(|| std::mem::take(&mut current_text));
                }
                current_text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(S3Error::XmlParse(e.to_string())),
            _ => {}
        }
    }

    Ok(found)
}

/// Upload ID from an InitiateMultipartUploadResult document
pub fn parse_upload_id(xml_data: &[u8]) -> Result<String> {
    collect_elements(xml_data, &[b"UploadId"])?
        .remove(b"UploadId".as_slice())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| S3Error::InvalidResponse("Missing UploadId in response".to_string()))
}

/// Parse an `<Error><Code/><Message/></Error>` document; tolerant of junk
pub fn parse_error_body(xml_data: &[u8]) -> StorageErrorBody {
    match collect_elements(xml_data, &[b"Code", b"Message"]) {
        Ok(mut found) => StorageErrorBody {
            code: found.remove(b"Code".as_slice()),
            message: found.remove(b"Message".as_slice()),
        },
        Err(_) => StorageErrorBody::default(),
    }
}

fn body_is_error(xml_data: &[u8]) -> bool {
    let mut reader = Reader::from_reader(xml_data);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => return e.local_name().as_ref() == b"Error",
            Ok(Event::Eof) | Err(_) => return false,
            _ => {}
        }
    }
}
