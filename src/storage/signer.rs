//! AWS Signature Version 4 for S3-compatible object storage
//!
//! GCS accepts the same scheme through its XML API when HMAC keys are used,
//! so one signer covers both.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Mutex;

type HmacSha256 = Hmac<Sha256>;

static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// SHA256 of the empty payload
const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Request signer holding the HMAC credentials
pub struct SigV4Signer {
    access_key: String,
    region: String,
    service: String,
    /// "AWS4" + secret key
    aws4_key: Vec<u8>,
    /// Signing key for the current day: (date_stamp, key)
    cached_signing_key: Mutex<Option<(String, [u8; 32])>>,
}

impl Clone for SigV4Signer {
    fn clone(&self) -> Self {
        Self {
            access_key: self.access_key.clone(),
            region: self.region.clone(),
            service: self.service.clone(),
            aws4_key: self.aws4_key.clone(),
            cached_signing_key: Mutex::new(None),
        }
    }
}

impl std::fmt::Debug for SigV4Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigV4Signer")
            .field("access_key", &self.access_key)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl SigV4Signer {
    pub fn new(access_key: &str, secret_key: &str, region: &str) -> Self {
        Self {
            access_key: access_key.to_string(),
            region: region.to_string(),
            service: "s3".to_string(),
            aws4_key: format!("AWS4{}", secret_key).into_bytes(),
            cached_signing_key: Mutex::new(None),
        }
    }

    /// Sign a request whose body is fully known
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        headers: BTreeMap<String, String>,
        payload: &[u8],
    ) -> BTreeMap<String, String> {
        if payload.is_empty() {
            self.sign_with_hash(method, url, headers, EMPTY_SHA256, Utc::now())
        } else {
            let hash = hex::encode(Sha256::digest(payload));
            self.sign_with_hash(method, url, headers, &hash, Utc::now())
        }
    }

    /// Sign with UNSIGNED-PAYLOAD so part bodies are not hashed twice
    pub fn sign_unsigned_payload(
        &self,
        method: &str,
        url: &str,
        headers: BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        self.sign_with_hash(method, url, headers, "UNSIGNED-PAYLOAD", Utc::now())
    }

    fn sign_with_hash(
        &self,
        method: &str,
        url: &str,
        mut headers: BTreeMap<String, String>,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> BTreeMap<String, String> {
        let (host, path, query) = split_url(url);

        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();

        headers.insert("host".to_string(), host.to_string());
        headers.insert("x-amz-date".to_string(), amz_date.clone());
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.to_string());

        let canonical_query = canonical_query_string(query);
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
            .collect();
        let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

        // Path is already percent-encoded by the client
        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, path, canonical_query, canonical_headers, signed_headers, payload_hash
        );
        tracing::trace!(canonical_request = %canonical_request, "sigv4_canonical_request");

        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            credential_scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signature = self.calculate_signature(&date_stamp, &string_to_sign);

        headers.insert(
            "authorization".to_string(),
            format!(
                "{} Credential={}/{}, SignedHeaders={}, Signature={}",
                ALGORITHM, self.access_key, credential_scope, signed_headers, signature
            ),
        );

        headers
    }

    fn calculate_signature(&self, date_stamp: &str, string_to_sign: &str) -> String {
        let signing_key = {
            let mut cache = self
                .cached_signing_key
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match cache.as_ref() {
                Some((cached_date, key)) if cached_date == date_stamp => *key,
                _ => {
                    let key = self.derive_signing_key(date_stamp);
                    *cache = Some((date_stamp.to_string(), key));
                    key
                }
            }
        };

        hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()))
    }

    fn derive_signing_key(&self, date_stamp: &str) -> [u8; 32] {
        let k_date = hmac_sha256(&self.aws4_key, date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        hmac_sha256(&k_service, b"aws4_request")
    }
}

fn hmac_sha256(key: &[u8], msg: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(msg);
    let mut output = [0u8; 32];
    output.copy_from_slice(&mac.finalize().into_bytes());
    output
}

/// Split a URL into (host, path, query), dropping default ports from the host
fn split_url(url: &str) -> (&str, &str, &str) {
    let (https, rest) = match url.strip_prefix("https://") {
        Some(rest) => (true, rest),
        None => (false, url.strip_prefix("http://").unwrap_or(url)),
    };

    let (authority, path_and_query) = match rest.find('/') {
        Some(pos) => (&rest[..pos], &rest[pos..]),
        None => (rest, "/"),
    };

    let (path, query) = path_and_query
        .split_once('?')
        .unwrap_or((path_and_query, ""));

    let host = if https {
        authority.strip_suffix(":443").unwrap_or(authority)
    } else {
        authority.strip_suffix(":80").unwrap_or(authority)
    };

    (host, path, query)
}

/// Canonical query string: decoded, re-encoded, sorted, every key with `=`
fn canonical_query_string(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }

    let mut params: Vec<(String, String)> = query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(key).unwrap_or_else(|_| key.into());
            let value = urlencoding::decode(value).unwrap_or_else(|_| value.into());
            (uri_encode(&key, true), uri_encode(&value, true))
        })
        .collect();

    params.sort_unstable();

    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// RFC 3986 percent-encoding; `/` is kept when `encode_slash` is false
pub fn uri_encode(s: &str, encode_slash: bool) -> String {
    let mut result = String::with_capacity(s.len() + 16);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            b'/' if !encode_slash => result.push('/'),
            _ => {
                result.push('%');
                result.push(HEX_UPPER[(byte >> 4) as usize] as char);
                result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
            }
        }
    }
    result
}
