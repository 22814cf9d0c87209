//! End-user facade composing a [`Reference`] with a [`RegistryClient`]:
//! exists, digest, manifest, platforms, size, inspect, delete, config, tags.

use crate::config::Config;
use crate::distribution::{AuthConfig, RegistryClient};
use crate::manifest::ManifestKind;
use crate::platform::Platform;
use crate::reference::{Reference, ReferenceKind};
use crate::Error;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::convert::TryFrom;

/// A single layer entry in an [`Inspect`] summary.
#[derive(Debug, Clone, Serialize)]
pub struct InspectLayer {
    #[serde(rename = "MIMEType")]
    pub mime_type: String,
    #[serde(rename = "Digest")]
    pub digest: String,
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "Annotations", skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

/// A flattened summary of a container image, `skopeo inspect`-shaped.
#[derive(Debug, Clone, Serialize)]
pub struct Inspect {
    #[serde(rename = "Name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "Tag", skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(rename = "Digest")]
    pub digest: String,
    #[serde(rename = "Created")]
    pub created: Option<String>,
    #[serde(rename = "DockerVersion")]
    pub docker_version: String,
    #[serde(rename = "Labels")]
    pub labels: HashMap<String, String>,
    #[serde(rename = "Architecture")]
    pub architecture: String,
    #[serde(rename = "Variant", skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(rename = "Os")]
    pub os: String,
    #[serde(rename = "Layers")]
    pub layers: Vec<String>,
    #[serde(rename = "LayersData")]
    pub layers_data: Vec<InspectLayer>,
    #[serde(rename = "Env")]
    pub env: Vec<String>,
    #[serde(rename = "Author", skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl Inspect {
    /// Renders with 2-space indentation, insertion order preserved — matching
    /// the `json.dumps(inspect, indent=2, sort_keys=False)` convention this
    /// output format is modeled on. Distinct from the registry client's
    /// 3-space digest-canonicalization formatter.
    pub fn to_pretty_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A reference plus the operations to introspect the image it names.
#[derive(Debug, Clone)]
pub struct Image {
    reference: Reference,
    client: RegistryClient,
}

impl Image {
    pub fn new(reference: Reference) -> Self {
        Image {
            reference,
            client: RegistryClient::new(),
        }
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    fn identifier(&self) -> &str {
        self.reference.identifier()
    }

    /// True iff the manifest GET succeeds; false iff the final response is a
    /// 404; any other error propagates.
    pub async fn exists(&self, auth: &AuthConfig) -> Result<bool, Error> {
        Ok(self
            .client
            .manifest_exists(
                &self.reference.base_url(),
                &self.reference.to_string(),
                self.identifier(),
                auth,
            )
            .await?)
    }

    /// Identifier if this is already a digest-ref, else the digest reported
    /// (or computed) by the registry.
    pub async fn digest(&self, auth: &AuthConfig) -> Result<String, Error> {
        if self.reference.kind() == ReferenceKind::Digest {
            return Ok(self.reference.identifier().to_string());
        }
        let (value, header) = self
            .client
            .get_manifest(
                &self.reference.base_url(),
                &self.reference.to_string(),
                self.identifier(),
                auth,
            )
            .await?;
        Ok(header.unwrap_or_else(|| RegistryClient::compute_digest(&value)))
    }

    /// Fetches and discriminates this image's manifest document.
    pub async fn manifest(&self, auth: &AuthConfig) -> Result<ManifestKind, Error> {
        let (value, _) = self
            .client
            .get_manifest(
                &self.reference.base_url(),
                &self.reference.to_string(),
                self.identifier(),
                auth,
            )
            .await?;
        Ok(ManifestKind::from_value(&value)?)
    }

    /// Fetches a manifest addressed by an arbitrary digest under this image's
    /// repository — used when walking a fat manifest's entries.
    pub async fn child_manifest(
        &self,
        digest: &str,
        auth: &AuthConfig,
    ) -> Result<ManifestKind, Error> {
        let (value, _) = self
            .client
            .get_manifest(&self.reference.base_url(), &self.reference.to_string(), digest, auth)
            .await?;
        Ok(ManifestKind::from_value(&value)?)
    }

    pub async fn is_manifest_list(&self, auth: &AuthConfig) -> Result<bool, Error> {
        Ok(self.manifest(auth).await?.is_manifest_list())
    }

    pub async fn is_oci(&self, auth: &AuthConfig) -> Result<bool, Error> {
        Ok(self.manifest(auth).await?.is_oci())
    }

    pub async fn media_type(&self, auth: &AuthConfig) -> Result<Option<String>, Error> {
        Ok(self
            .manifest(auth)
            .await?
            .media_type()
            .map(|s| s.to_string()))
    }

    /// `GET /v2/.../tags/list`.
    pub async fn tags(&self, auth: &AuthConfig) -> Result<Vec<String>, Error> {
        Ok(self
            .client
            .get_tags(&self.reference.base_url(), &self.reference.to_string(), auth)
            .await?)
    }

    /// For a single-arch image: its config's single platform. For a fat
    /// manifest: the platform of every entry.
    pub async fn platforms(&self, auth: &AuthConfig) -> Result<Vec<Platform>, Error> {
        match self.manifest(auth).await? {
            ManifestKind::V2S2Manifest(_) | ManifestKind::OciManifest(_) => {
                Ok(vec![self.config(auth).await?.platform()])
            }
            ManifestKind::V2S2List(list) | ManifestKind::OciIndex(list) => Ok(list
                .entries()
                .iter()
                .filter_map(|e| e.platform().cloned())
                .collect()),
        }
    }

    /// Single-arch manifest size, or fat-manifest aggregate (entry sizes
    /// verbatim, child configs/layers deduplicated by digest across arches).
    pub async fn size(&self, auth: &AuthConfig) -> Result<u64, Error> {
        match self.manifest(auth).await? {
            ManifestKind::V2S2Manifest(m) | ManifestKind::OciManifest(m) => Ok(m.size()),
            ManifestKind::V2S2List(list) | ManifestKind::OciIndex(list) => {
                let children = futures::future::try_join_all(
                    list.entries()
                        .iter()
                        .map(|entry| self.child_manifest(entry.digest(), auth)),
                )
                .await?;
                Ok(crate::manifest::aggregate_fat_manifest_size(
                    &list,
                    &children,
                    &mut HashSet::new(),
                    &mut HashSet::new(),
                ))
            }
        }
    }

    /// If fat, the single-arch manifest for the entry matching the host
    /// platform; otherwise this image's own manifest.
    pub async fn host_platform_manifest(
        &self,
        auth: &AuthConfig,
    ) -> Result<crate::manifest::Manifest, Error> {
        match self.manifest(auth).await? {
            ManifestKind::V2S2Manifest(m) | ManifestKind::OciManifest(m) => Ok(m),
            ManifestKind::V2S2List(list) | ManifestKind::OciIndex(list) => {
                let host = Platform::host_platform();
                let entry = list
                    .entry_for_platform(&host)
                    .ok_or_else(|| Error::NoMatchingPlatform(host.to_string()))?;
                let (value, _) = self
                    .client
                    .get_manifest(
                        &self.reference.base_url(),
                        &self.reference.to_string(),
                        entry.digest(),
                        auth,
                    )
                    .await?;
                match ManifestKind::from_value(&value)? {
                    ManifestKind::V2S2Manifest(m) | ManifestKind::OciManifest(m) => Ok(m),
                    _ => Err(Error::NoMatchingPlatform(host.to_string())),
                }
            }
        }
    }

    /// Fetches the host-platform manifest's config descriptor as a blob and
    /// parses it.
    pub async fn config(&self, auth: &AuthConfig) -> Result<Config, Error> {
        let manifest = self.host_platform_manifest(auth).await?;
        let bytes = self
            .client
            .get_blob(
                &self.reference.base_url(),
                &self.reference.to_string(),
                manifest.config_descriptor().digest(),
                auth,
            )
            .await?;
        Ok(Config::from_bytes(&bytes)?)
    }

    /// A flattened summary built from the host-platform manifest and config.
    pub async fn inspect(&self, auth: &AuthConfig) -> Result<Inspect, Error> {
        let manifest = self.host_platform_manifest(auth).await?;
        let config = self.config(auth).await?;
        let digest = self.digest(auth).await?;
        let platform = config.platform();

        let layers_data: Vec<InspectLayer> = manifest
            .layer_descriptors()
            .iter()
            .map(|l| InspectLayer {
                mime_type: l.media_type().to_string(),
                digest: l.digest().to_string(),
                size: l.size(),
                annotations: l.annotations().cloned(),
            })
            .collect();

        Ok(Inspect {
            name: Some(self.reference.name()),
            tag: self.reference.tag().map(|t| t.to_string()),
            digest,
            created: config.created().map(|s| s.to_string()),
            docker_version: String::new(),
            labels: config.labels(),
            architecture: platform.architecture().to_string(),
            variant: platform.variant().map(|s| s.to_string()),
            os: platform.os().to_string(),
            layers: layers_data.iter().map(|l| l.digest.clone()).collect(),
            layers_data,
            env: config.env(),
            author: config.author().map(|s| s.to_string()),
        })
    }

    /// `DELETE` against this reference's identifier URL.
    pub async fn delete(&self, auth: &AuthConfig) -> Result<(), Error> {
        Ok(self
            .client
            .delete_manifest(
                &self.reference.base_url(),
                &self.reference.to_string(),
                self.identifier(),
                auth,
            )
            .await?)
    }
}

impl TryFrom<&str> for Image {
    type Error = crate::reference::ReferenceError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Ok(Image::new(s.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_from_str_parses_the_underlying_reference() {
        let image = Image::try_from("docker.io/library/alpine:3").unwrap();
        assert_eq!(image.reference().short_name(), "alpine");
        assert_eq!(image.identifier(), "3");
    }

    #[test]
    fn try_from_str_rejects_invalid_reference() {
        assert!(Image::try_from("UPPERCASE/not/allowed").is_err());
    }
}
