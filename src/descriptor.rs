//! Content descriptor: `{mediaType, size, digest, urls?, annotations?}`, used
//! identically for v2s2 layers/configs and OCI descriptors.

use crate::regex::DIGEST_PAT;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::TryFrom;

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("descriptor missing required field `{0}`")]
    MissingField(&'static str),

    #[error("descriptor digest does not match the anchored digest pattern: {0}")]
    InvalidDigest(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DescriptorDoc {
    #[serde(rename = "mediaType")]
    media_type: Option<String>,
    size: Option<u64>,
    digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    annotations: Option<HashMap<String, String>>,
}

/// A schema-validated content descriptor. Construction validates required fields
/// and re-validates the digest against the anchored digest pattern.
#[derive(Debug, Clone, Serialize)]
#[serde(into = "DescriptorDoc")]
pub struct Descriptor {
    media_type: String,
    size: u64,
    digest: String,
    urls: Option<Vec<String>>,
    annotations: Option<HashMap<String, String>>,
}

impl Descriptor {
    pub fn new(media_type: impl Into<String>, size: u64, digest: impl Into<String>) -> Result<Self, DescriptorError> {
        let digest = digest.into();
        if !DIGEST_PAT.is_match(&digest) {
            return Err(DescriptorError::InvalidDigest(digest));
        }
        Ok(Descriptor {
            media_type: media_type.into(),
            size,
            digest,
            urls: None,
            annotations: None,
        })
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn urls(&self) -> Option<&[String]> {
        self.urls.as_deref()
    }

    pub fn annotations(&self) -> Option<&HashMap<String, String>> {
        self.annotations.as_ref()
    }
}

impl From<Descriptor> for DescriptorDoc {
    fn from(d: Descriptor) -> Self {
        DescriptorDoc {
            media_type: Some(d.media_type),
            size: Some(d.size),
            digest: Some(d.digest),
            urls: d.urls,
            annotations: d.annotations,
        }
    }
}

impl<'de> Deserialize<'de> for Descriptor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let doc = DescriptorDoc::deserialize(deserializer)?;
        Descriptor::try_from(doc).map_err(serde::de::Error::custom)
    }
}

impl TryFrom<DescriptorDoc> for Descriptor {
    type Error = DescriptorError;

    fn try_from(doc: DescriptorDoc) -> Result<Self, Self::Error> {
        let digest = doc.digest.ok_or(DescriptorError::MissingField("digest"))?;
        if !DIGEST_PAT.is_match(&digest) {
            return Err(DescriptorError::InvalidDigest(digest));
        }
        Ok(Descriptor {
            media_type: doc
                .media_type
                .ok_or(DescriptorError::MissingField("mediaType"))?,
            size: doc.size.ok_or(DescriptorError::MissingField("size"))?,
            digest,
            urls: doc.urls,
            annotations: doc.annotations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "sha256:f5d2c6a1e0c86e4234ea601552dbabb4ced0e013a1efcbfb439f1f6a7a9275b0";

    #[test]
    fn constructs_valid_descriptor() {
        let d = Descriptor::new("application/vnd.oci.image.layer.v1.tar+gzip", 1024, DIGEST).unwrap();
        assert_eq!(d.size(), 1024);
        assert_eq!(d.digest(), DIGEST);
        assert!(d.urls().is_none());
    }

    #[test]
    fn rejects_invalid_digest() {
        assert!(Descriptor::new("application/octet-stream", 1, "sha256:short").is_err());
    }

    #[test]
    fn deserializes_and_validates_roundtrip() {
        let json = serde_json::json!({
            "mediaType": "application/vnd.oci.image.config.v1+json",
            "size": 42,
            "digest": DIGEST,
        });
        let d: Descriptor = serde_json::from_value(json.clone()).unwrap();
        let back = serde_json::to_value(&d).unwrap();
        let d2: Descriptor = serde_json::from_value(back).unwrap();
        assert_eq!(d.digest(), d2.digest());
        assert_eq!(d.size(), d2.size());
    }

    #[test]
    fn missing_required_field_fails() {
        let json = serde_json::json!({"mediaType": "application/octet-stream", "size": 1});
        let result: Result<Descriptor, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }
}
