//! AWS Signature Version 4 request signing.
//!
//! The blob-store control endpoints (ApplyImageUpload / CommitImageUpload)
//! authenticate with `AWS4-HMAC-SHA256` over the canonical request form,
//! using the temporary credentials from the upload token. Signed headers
//! are always `host`, `x-amz-date`, and `x-amz-security-token`; GET
//! requests sign the empty-body hash, POST requests the SHA-256 of the
//! body.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Signing algorithm identifier.
const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Header set covered by the signature, in canonical order.
const SIGNED_HEADERS: &str = "host;x-amz-date;x-amz-security-token";

/// Inputs for signing one request.
#[derive(Debug, Clone, Copy)]
pub struct SigningParams<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub session_token: &'a str,
    /// SigV4 region name, e.g. `cn-north-1`.
    pub region: &'a str,
    /// SigV4 service name; the blob store signs as `imagex`.
    pub service: &'a str,
    /// Host header value, no scheme.
    pub host: &'a str,
    /// Timestamp in `YYYYMMDDTHHMMSSZ` form; must match the `x-amz-date`
    /// header sent with the request.
    pub amz_date: &'a str,
}

/// Formats a timestamp in the `x-amz-date` wire form.
pub fn amz_date(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Builds the canonical query string: keys sorted, RFC 3986 encoding.
pub fn canonical_query(params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect();
    encoded.sort();
    encoded
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Signs a GET request (empty body hash).
///
/// Returns the `Authorization` header value.
pub fn sign_get(params: &SigningParams<'_>, path: &str, query: &str) -> String {
    sign(params, "GET", path, query, b"")
}

/// Signs a POST request over the SHA-256 of `body`.
///
/// Returns the `Authorization` header value.
pub fn sign_post(params: &SigningParams<'_>, path: &str, query: &str, body: &[u8]) -> String {
    sign(params, "POST", path, query, body)
}

fn sign(params: &SigningParams<'_>, method: &str, path: &str, query: &str, body: &[u8]) -> String {
    let payload_hash = hex_sha256(body);

    let canonical_headers = format!(
        "host:{}\nx-amz-date:{}\nx-amz-security-token:{}\n",
        params.host, params.amz_date, params.session_token
    );
    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method, path, query, canonical_headers, SIGNED_HEADERS, payload_hash
    );

    let date = &params.amz_date[..8];
    let scope = format!(
        "{}/{}/{}/aws4_request",
        date, params.region, params.service
    );
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        params.amz_date,
        scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_key(params.secret_key, date, params.region, params.service);
    let signature = hex(&hmac(&signing_key, string_to_sign.as_bytes()));

    format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, params.access_key, scope, SIGNED_HEADERS, signature
    )
}

/// HMAC key chain: AWS4+secret → date → region → service → aws4_request.
fn derive_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{}", secret_key).as_bytes(), date.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, service.as_bytes());
    hmac(&k_service, b"aws4_request")
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_sha256(data: &[u8]) -> String {
    hex(&Sha256::digest(data))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// RFC 3986 percent-encoding with SigV4's unreserved set.
fn uri_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
