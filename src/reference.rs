//! Parsing and validation of registry reference strings into their constituent
//! parts: registry, path, short name, name, and identifier (tag or digest).

use crate::regex::{DIGEST_PAT, DOMAIN_PAT, NAME_PAT, REFERENCE_PAT, TAG_PAT};
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("invalid reference name: {0}")]
    InvalidName(String),

    #[error("invalid registry domain: {0}")]
    InvalidDomain(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("invalid tag: {0}")]
    InvalidTag(String),
}

/// Whether a reference's identifier is a tag or a content digest. When both are
/// present in the source string, the reference is a digest-ref: the digest wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Tag,
    Digest,
}

/// An immutable, validated registry reference, decomposed into registry, path,
/// short name, and identifier (tag and/or digest).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    registry: String,
    explicit_registry: bool,
    path: Vec<String>,
    short_name: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl Reference {
    /// Registry domain, possibly with a port, e.g. `quay.io`. Defaults to
    /// `docker.io` when the source string carried no explicit registry segment.
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Slash-separated path components excluding registry and short name.
    pub fn path(&self) -> String {
        self.path.join("/")
    }

    /// Final path component, the repository's local name.
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// `registry/path.../short-name`, with no tag or digest. Omits the registry
    /// segment when the source string carried none, so that `Display` round-trips.
    pub fn name(&self) -> String {
        let mut parts = Vec::new();
        if self.explicit_registry {
            parts.push(self.registry.clone());
        }
        parts.extend(self.path.iter().cloned());
        parts.push(self.short_name.clone());
        parts.join("/")
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// The tag if there is no digest, else the digest; falls back to `latest`
    /// when neither is present in the source string.
    pub fn identifier(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or("latest")
    }

    /// A digest-ref if a digest is present (even alongside a tag), else a tag-ref.
    pub fn kind(&self) -> ReferenceKind {
        if self.digest.is_some() {
            ReferenceKind::Digest
        } else {
            ReferenceKind::Tag
        }
    }

    /// Base API URL for this reference's repository, rewriting `docker.io` to
    /// `registry-1.docker.io` per the distribution spec's canonical endpoint.
    pub fn base_url(&self) -> String {
        let registry = if self.registry == "docker.io" {
            "registry-1.docker.io"
        } else {
            &self.registry
        };
        let mut parts = vec![registry.to_string()];
        parts.extend(self.path.iter().cloned());
        parts.push(self.short_name.clone());
        format!("https://{}/v2/{}", registry, parts[1..].join("/"))
    }
}

impl FromStr for Reference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !REFERENCE_PAT.is_match(s) {
            return Err(ReferenceError::InvalidReference(s.to_string()));
        }

        // Split digest suffix first, then tag suffix, then registry/path/name.
        let (head, digest) = match s.split_once('@') {
            Some((h, d)) => (h, Some(d.to_string())),
            None => (s, None),
        };
        if let Some(d) = &digest {
            if !DIGEST_PAT.is_match(d) {
                return Err(ReferenceError::InvalidDigest(d.clone()));
            }
        }

        let (head, tag) = match head.rsplit_once(':') {
            // Only split on ':' if what follows looks like a tag, not a port
            // inside the domain (a ':' before any '/' belongs to the domain).
            Some((h, t)) if !t.contains('/') && head.contains('/') => (h, Some(t.to_string())),
            Some((h, t)) if !t.contains('/') && !head.contains('/') => (h, Some(t.to_string())),
            _ => (head, None),
        };
        if let Some(t) = &tag {
            if !TAG_PAT.is_match(t) {
                return Err(ReferenceError::InvalidTag(t.clone()));
            }
        }

        if !NAME_PAT.is_match(head) {
            return Err(ReferenceError::InvalidName(head.to_string()));
        }

        let mut components: Vec<&str> = head.split('/').collect();
        let short_name = components
            .pop()
            .ok_or_else(|| ReferenceError::InvalidName(head.to_string()))?
            .to_string();

        let looks_like_domain = !components.is_empty()
            && (components[0].contains('.')
                || components[0].contains(':')
                || components[0] == "localhost");

        let (registry, explicit_registry, path): (String, bool, Vec<String>) =
            if looks_like_domain {
                let registry = components[0].to_string();
                if !DOMAIN_PAT.is_match(&registry) {
                    return Err(ReferenceError::InvalidDomain(registry));
                }
                (
                    registry,
                    true,
                    components[1..].iter().map(|s| s.to_string()).collect(),
                )
            } else {
                // No explicit registry: default to docker.io for transport
                // purposes, but remember that the source string carried none so
                // Display can round-trip it exactly.
                (
                    "docker.io".to_string(),
                    false,
                    components.iter().map(|s| s.to_string()).collect(),
                )
            };

        Ok(Reference {
            registry,
            explicit_registry,
            path,
            short_name,
            tag,
            digest,
        })
    }
}

impl TryFrom<&str> for Reference {
    type Error = ReferenceError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<String> for Reference {
    type Error = ReferenceError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        if let Some(t) = &self.tag {
            write!(f, ":{}", t)?;
        }
        if let Some(d) = &self.digest {
            write!(f, "@{}", d)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // S1 — Parse a tag ref.
    #[test]
    fn parses_tag_reference() {
        let r: Reference = "quay.io/ibm/software/cloudpak/hello-world:latest"
            .parse()
            .unwrap();
        assert_eq!(r.registry(), "quay.io");
        assert_eq!(r.path(), "ibm/software/cloudpak");
        assert_eq!(r.short_name(), "hello-world");
        assert_eq!(r.name(), "quay.io/ibm/software/cloudpak/hello-world");
        assert_eq!(r.identifier(), "latest");
        assert_eq!(r.kind(), ReferenceKind::Tag);
    }

    // S2 — Parse a digest ref with tag: digest wins for identifier and kind.
    #[test]
    fn parses_digest_reference_with_tag() {
        let input = "this.is/a/valid/image:v1.2.3@sha256:f5d2c6a1e0c86e4234ea601552dbabb4ced0e013a1efcbfb439f1f6a7a9275b0";
        let r: Reference = input.parse().unwrap();
        assert_eq!(
            r.identifier(),
            "sha256:f5d2c6a1e0c86e4234ea601552dbabb4ced0e013a1efcbfb439f1f6a7a9275b0"
        );
        assert_eq!(r.kind(), ReferenceKind::Digest);
        assert_eq!(r.tag(), Some("v1.2.3"));
    }

    // S3 — Registry URL, including the docker.io rewrite.
    #[test]
    fn base_url_rewrites_docker_io() {
        let r: Reference = "docker.io/library/alpine:3".parse().unwrap();
        assert_eq!(
            r.base_url(),
            "https://registry-1.docker.io/v2/library/alpine"
        );
    }

    #[test]
    fn display_round_trips() {
        for input in [
            "quay.io/ibm/software/cloudpak/hello-world:latest",
            "docker.io/library/alpine:3",
            "this.is/a/valid/image:v1.2.3@sha256:f5d2c6a1e0c86e4234ea601552dbabb4ced0e013a1efcbfb439f1f6a7a9275b0",
        ] {
            let r: Reference = input.parse().unwrap();
            assert_eq!(r.to_string(), input);
        }
    }

    #[test]
    fn rejects_invalid_reference() {
        assert!(Reference::from_str("UPPERCASE/not/allowed").is_err());
    }

    #[test]
    fn no_explicit_registry_defaults_to_docker_io() {
        let r: Reference = "alpine:3".parse().unwrap();
        assert_eq!(r.registry(), "docker.io");
        assert_eq!(r.short_name(), "alpine");
    }
}
