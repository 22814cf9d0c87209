//! Credential selection and the Basic→Bearer challenge/token-exchange dance.

use super::RegistryError;
use serde::Deserialize;
use std::collections::HashMap;

/// A single `auths` map entry. Only the `auth` field is recognized; all others
/// (`email`, `identitytoken`, ...) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthEntry {
    pub auth: Option<String>,
}

/// The read-only credentials map passed into every registry operation:
/// `{"auths": {"<registry-prefix>": {"auth": "<base64 user:pass>"}}}`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    pub auths: HashMap<String, AuthEntry>,
}

impl AuthConfig {
    /// An auth config with no credentials, for unauthenticated access.
    pub fn empty() -> Self {
        AuthConfig::default()
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Longest-prefix match of `auths` keys against `reference_str`, returning
    /// the Base64 `user:pass` string to send as `Authorization: Basic <..>`.
    /// Fails with `MalformedAuth` if the longest-matching entry has no `auth`
    /// field; returns `None` if no key is a prefix of `reference_str`.
    pub fn select(&self, reference_str: &str) -> Result<Option<&str>, RegistryError> {
        let best = self
            .auths
            .iter()
            .filter(|(prefix, _)| reference_str.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len());

        match best {
            None => Ok(None),
            Some((prefix, entry)) => entry
                .auth
                .as_deref()
                .ok_or_else(|| RegistryError::MalformedAuth(prefix.clone())),
        }
    }
}

/// A parsed `Www-Authenticate: Bearer realm="...",service="...",scope="..."`
/// challenge.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub scheme: String,
    pub realm: String,
    pub params: Vec<(String, String)>,
}

/// Parses a `Www-Authenticate` header value as `<scheme> k=v,k=v,...`,
/// unquoting values, and pulls out `realm`. The remaining key/value pairs are
/// kept in order to be re-encoded as the token endpoint's querystring.
pub fn parse_challenge(header: &str) -> Result<Challenge, RegistryError> {
    let (scheme, rest) = header
        .split_once(' ')
        .ok_or_else(|| RegistryError::AuthChallengeMalformed(header.to_string()))?;

    let mut realm = None;
    let mut params = Vec::new();
    for pair in split_challenge_params(rest) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| RegistryError::AuthChallengeMalformed(header.to_string()))?;
        let key = key.trim();
        let value = value.trim().trim_matches('"');
        if key == "realm" {
            realm = Some(value.to_string());
        } else {
            params.push((key.to_string(), value.to_string()));
        }
    }

    Ok(Challenge {
        scheme: scheme.to_string(),
        realm: realm.ok_or_else(|| RegistryError::AuthChallengeMalformed(header.to_string()))?,
        params,
    })
}

/// Splits challenge parameters on commas that are not inside a quoted value.
fn split_challenge_params(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in s.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

/// For compatibility with OAuth 2.0, some registries return `access_token`
/// instead of `token`; we accept either but always surface `token()`.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
    #[allow(dead_code)]
    expires_in: Option<u64>,
    #[allow(dead_code)]
    issued_at: Option<chrono::DateTime<chrono::Utc>>,
    #[allow(dead_code)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    fn token(self) -> Option<String> {
        self.token.or(self.access_token)
    }
}

/// Exchanges a parsed challenge for a bearer token, sending Basic auth with
/// `reg_auth` if credentials were available for this request.
pub async fn fetch_token(
    http: &reqwest::Client,
    challenge: &Challenge,
    reg_auth: Option<&str>,
) -> Result<String, RegistryError> {
    let qs: String = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(challenge.params.iter())
        .finish();
    let token_url = if qs.is_empty() {
        challenge.realm.clone()
    } else {
        format!("{}?{}", challenge.realm, qs)
    };

    let mut request = http.get(&token_url);
    if let Some(reg_auth) = reg_auth {
        request = request.header(reqwest::header::AUTHORIZATION, format!("Basic {}", reg_auth));
    }

    let response = request.send().await.map_err(RegistryError::Request)?;
    if !response.status().is_success() {
        return Err(RegistryError::CouldNotGetToken(response.status()));
    }

    let body: TokenResponse = response.json().await.map_err(RegistryError::Request)?;
    body.token()
        .ok_or_else(|| RegistryError::AuthChallengeMalformed("token response carried neither `token` nor `access_token`".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_longest_prefix() {
        let mut auths = HashMap::new();
        auths.insert("quay.io".to_string(), AuthEntry { auth: Some("a".into()) });
        auths.insert("quay.io/ibm".to_string(), AuthEntry { auth: Some("b".into()) });
        auths.insert(
            "quay.io/ibm/software/cloudpak".to_string(),
            AuthEntry { auth: Some("c".into()) },
        );
        auths.insert("not.my/registry".to_string(), AuthEntry { auth: Some("d".into()) });
        let cfg = AuthConfig { auths };

        let selected = cfg
            .select("quay.io/ibm/software/cloudpak/hello-world:latest")
            .unwrap();
        assert_eq!(selected, Some("c"));
    }

    #[test]
    fn no_matching_prefix_returns_none() {
        let cfg = AuthConfig::empty();
        assert_eq!(cfg.select("quay.io/foo:latest").unwrap(), None);
    }

    #[test]
    fn missing_auth_field_is_malformed() {
        let mut auths = HashMap::new();
        auths.insert("quay.io".to_string(), AuthEntry { auth: None });
        let cfg = AuthConfig { auths };
        assert!(cfg.select("quay.io/foo:latest").is_err());
    }

    #[test]
    fn parses_bearer_challenge() {
        let header = r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/alpine:pull""#;
        let challenge = parse_challenge(header).unwrap();
        assert_eq!(challenge.scheme, "Bearer");
        assert_eq!(challenge.realm, "https://auth.docker.io/token");
        assert!(challenge
            .params
            .contains(&("service".to_string(), "registry.docker.io".to_string())));
    }

    #[test]
    fn rejects_challenge_without_space() {
        assert!(parse_challenge("Bearer").is_err());
    }
}
