//! Manifest and manifest-list types for both the Docker v2s2 and OCI formats,
//! plus the factory that discriminates a raw JSON document among the four.

use crate::descriptor::{Descriptor, DescriptorError};
use crate::media_types;
use crate::platform::{Platform, PlatformError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::convert::TryFrom;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest missing required field `{0}`")]
    MissingField(&'static str),

    #[error("unexpected schemaVersion {0}, expected 2")]
    InvalidSchemaVersion(u64),

    #[error("mediaType {0} is not permitted on this manifest variant")]
    UnsupportedMediaType(String),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("document matches none of the known manifest schemas: {0}")]
    InvalidManifest(Value),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Shared accessors over the four manifest/list variants.
pub trait ManifestAccessors {
    fn media_type(&self) -> Option<&str>;
    fn schema_version(&self) -> u64;
}

fn dedup_size<'a, I: Iterator<Item = &'a Descriptor>>(descriptors: I) -> u64 {
    let mut seen = HashSet::new();
    let mut total = 0u64;
    for d in descriptors {
        if seen.insert(d.digest().to_string()) {
            total += d.size();
        }
    }
    total
}

/// Aggregates a fat manifest's size: the list's own entry sizes taken
/// verbatim, plus each fetched child's config and layers, deduplicated by
/// digest against `seen_configs`/`seen_layers`. Callers share those sets
/// across multiple lists (e.g. an `ImageSet`) to dedup across images too.
pub fn aggregate_fat_manifest_size(
    list: &ManifestList,
    children: &[ManifestKind],
    seen_configs: &mut HashSet<String>,
    seen_layers: &mut HashSet<String>,
) -> u64 {
    let mut total = list.entry_sizes_total();
    for child in children {
        if let Some(m) = child.as_manifest() {
            if seen_configs.insert(m.config_descriptor().digest().to_string()) {
                total += m.config_descriptor().size();
            }
            for layer in m.layer_descriptors() {
                if seen_layers.insert(layer.digest().to_string()) {
                    total += layer.size();
                }
            }
        }
    }
    total
}

// ---------------------------------------------------------------------------
// Single-architecture manifest (v2s2 / OCI)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestDoc {
    #[serde(rename = "schemaVersion")]
    schema_version: Option<u64>,
    #[serde(rename = "mediaType", skip_serializing_if = "Option::is_none")]
    media_type: Option<String>,
    config: Option<Descriptor>,
    layers: Option<Vec<Descriptor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    annotations: Option<HashMap<String, String>>,
}

/// A single-architecture manifest: `{schemaVersion, mediaType?, config, layers}`.
#[derive(Debug, Clone, Serialize)]
#[serde(into = "ManifestDoc")]
pub struct Manifest {
    schema_version: u64,
    media_type: Option<String>,
    config: Descriptor,
    layers: Vec<Descriptor>,
    annotations: Option<HashMap<String, String>>,
}

impl Manifest {
    pub fn config_descriptor(&self) -> &Descriptor {
        &self.config
    }

    pub fn layer_descriptors(&self) -> &[Descriptor] {
        &self.layers
    }

    pub fn annotations(&self) -> Option<&HashMap<String, String>> {
        self.annotations.as_ref()
    }

    /// `size(config) + Σ size(unique layers by digest)`.
    pub fn size(&self) -> u64 {
        self.config.size() + dedup_size(self.layers.iter())
    }
}

impl ManifestAccessors for Manifest {
    fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }
    fn schema_version(&self) -> u64 {
        self.schema_version
    }
}

impl From<Manifest> for ManifestDoc {
    fn from(m: Manifest) -> Self {
        ManifestDoc {
            schema_version: Some(m.schema_version),
            media_type: m.media_type,
            config: Some(m.config),
            layers: Some(m.layers),
            annotations: m.annotations,
        }
    }
}

fn manifest_from_doc(doc: ManifestDoc) -> Result<Manifest, ManifestError> {
    let schema_version = doc
        .schema_version
        .ok_or(ManifestError::MissingField("schemaVersion"))?;
    if schema_version != 2 {
        return Err(ManifestError::InvalidSchemaVersion(schema_version));
    }
    Ok(Manifest {
        schema_version,
        media_type: doc.media_type,
        config: doc.config.ok_or(ManifestError::MissingField("config"))?,
        layers: doc.layers.ok_or(ManifestError::MissingField("layers"))?,
        annotations: doc.annotations,
    })
}

/// v2s2 manifest: `mediaType` is required; OCI manifest mediaType is forbidden.
pub fn validate_v2s2_manifest(value: &Value) -> Result<Manifest, ManifestError> {
    let doc: ManifestDoc = serde_json::from_value(value.clone())?;
    if doc.media_type.is_none() {
        return Err(ManifestError::MissingField("mediaType"));
    }
    let manifest = manifest_from_doc(doc)?;
    if manifest.media_type.as_deref() == Some(media_types::OCI_MANIFEST) {
        return Err(ManifestError::UnsupportedMediaType(
            media_types::OCI_MANIFEST.to_string(),
        ));
    }
    Ok(manifest)
}

/// OCI manifest: `mediaType` optional; v2s2 manifest mediaType is forbidden.
pub fn validate_oci_manifest(value: &Value) -> Result<Manifest, ManifestError> {
    let doc: ManifestDoc = serde_json::from_value(value.clone())?;
    let manifest = manifest_from_doc(doc)?;
    if manifest.media_type.as_deref() == Some(media_types::DOCKER_V2S2_MANIFEST) {
        return Err(ManifestError::UnsupportedMediaType(
            media_types::DOCKER_V2S2_MANIFEST.to_string(),
        ));
    }
    Ok(manifest)
}

// ---------------------------------------------------------------------------
// Manifest list / image index entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryDoc {
    #[serde(rename = "mediaType", skip_serializing_if = "Option::is_none")]
    media_type: Option<String>,
    size: Option<u64>,
    digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    platform: Option<Platform>,
}

/// One entry of a manifest list / image index: points at a single-arch manifest.
#[derive(Debug, Clone, Serialize)]
#[serde(into = "EntryDoc")]
pub struct ManifestListEntry {
    media_type: Option<String>,
    size: u64,
    digest: String,
    platform: Option<Platform>,
}

impl ManifestListEntry {
    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }
    pub fn size(&self) -> u64 {
        self.size
    }
    pub fn digest(&self) -> &str {
        &self.digest
    }
    pub fn platform(&self) -> Option<&Platform> {
        self.platform.as_ref()
    }
}

impl From<ManifestListEntry> for EntryDoc {
    fn from(e: ManifestListEntry) -> Self {
        EntryDoc {
            media_type: e.media_type,
            size: Some(e.size),
            digest: Some(e.digest),
            platform: e.platform,
        }
    }
}

fn entry_from_doc(
    doc: EntryDoc,
    require_media_type: bool,
    require_platform: bool,
    forbidden_media_type: &str,
) -> Result<ManifestListEntry, ManifestError> {
    if require_media_type && doc.media_type.is_none() {
        return Err(ManifestError::MissingField("mediaType"));
    }
    if require_platform && doc.platform.is_none() {
        return Err(ManifestError::MissingField("platform"));
    }
    let entry = ManifestListEntry {
        media_type: doc.media_type,
        size: doc.size.ok_or(ManifestError::MissingField("size"))?,
        digest: doc.digest.ok_or(ManifestError::MissingField("digest"))?,
        platform: doc.platform,
    };
    if entry.media_type.as_deref() == Some(forbidden_media_type) {
        return Err(ManifestError::UnsupportedMediaType(
            entry.media_type.clone().unwrap_or_default(),
        ));
    }
    Ok(entry)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestListDoc {
    #[serde(rename = "schemaVersion")]
    schema_version: Option<u64>,
    #[serde(rename = "mediaType", skip_serializing_if = "Option::is_none")]
    media_type: Option<String>,
    manifests: Option<Vec<EntryDoc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    annotations: Option<HashMap<String, String>>,
}

/// A manifest list / image index: `{schemaVersion, mediaType?, manifests[]}`.
#[derive(Debug, Clone, Serialize)]
#[serde(into = "ManifestListDoc")]
pub struct ManifestList {
    schema_version: u64,
    media_type: Option<String>,
    entries: Vec<ManifestListEntry>,
    annotations: Option<HashMap<String, String>>,
}

impl ManifestList {
    pub fn entries(&self) -> &[ManifestListEntry] {
        &self.entries
    }

    pub fn annotations(&self) -> Option<&HashMap<String, String>> {
        self.annotations.as_ref()
    }

    /// Sum of every entry's own `size`, with no deduplication: each entry is a
    /// distinct manifest blob.
    pub fn entry_sizes_total(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// The entry whose platform string-form matches `platform`, if any.
    pub fn entry_for_platform(&self, platform: &Platform) -> Option<&ManifestListEntry> {
        self.entries
            .iter()
            .find(|e| e.platform.as_ref() == Some(platform))
    }
}

impl ManifestAccessors for ManifestList {
    fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }
    fn schema_version(&self) -> u64 {
        self.schema_version
    }
}

impl From<ManifestList> for ManifestListDoc {
    fn from(l: ManifestList) -> Self {
        ManifestListDoc {
            schema_version: Some(l.schema_version),
            media_type: l.media_type,
            manifests: Some(l.entries.into_iter().map(EntryDoc::from).collect()),
            annotations: l.annotations,
        }
    }
}

fn manifest_list_from_doc(
    doc: ManifestListDoc,
    require_media_type: bool,
    require_entry_media_type: bool,
    require_entry_platform: bool,
    forbidden_entry_media_type: &str,
) -> Result<ManifestList, ManifestError> {
    let schema_version = doc
        .schema_version
        .ok_or(ManifestError::MissingField("schemaVersion"))?;
    if schema_version != 2 {
        return Err(ManifestError::InvalidSchemaVersion(schema_version));
    }
    if require_media_type && doc.media_type.is_none() {
        return Err(ManifestError::MissingField("mediaType"));
    }
    let raw_entries = doc.manifests.ok_or(ManifestError::MissingField("manifests"))?;
    let mut entries = Vec::with_capacity(raw_entries.len());
    for entry_doc in raw_entries {
        entries.push(entry_from_doc(
            entry_doc,
            require_entry_media_type,
            require_entry_platform,
            forbidden_entry_media_type,
        )?);
    }
    Ok(ManifestList {
        schema_version,
        media_type: doc.media_type,
        entries,
        annotations: doc.annotations,
    })
}

/// v2s2 manifest list: list-level `mediaType` required; every entry requires
/// `mediaType` and `platform`. Rejects the OCI index mediaType at the list level
/// and the OCI manifest mediaType at the entry level (per the original source's
/// stricter dual-level check, see DESIGN.md).
pub fn validate_v2s2_list(value: &Value) -> Result<ManifestList, ManifestError> {
    let doc: ManifestListDoc = serde_json::from_value(value.clone())?;
    let list = manifest_list_from_doc(doc, true, true, true, media_types::OCI_MANIFEST)?;
    if list.media_type.as_deref() == Some(media_types::OCI_INDEX) {
        return Err(ManifestError::UnsupportedMediaType(
            media_types::OCI_INDEX.to_string(),
        ));
    }
    Ok(list)
}

/// OCI image index: list-level `mediaType` optional; entry `platform` optional,
/// entry `mediaType` required. Rejects the v2s2 manifest-list mediaType at the
/// list level and the v2s2 manifest mediaType at the entry level.
pub fn validate_oci_index(value: &Value) -> Result<ManifestList, ManifestError> {
    let doc: ManifestListDoc = serde_json::from_value(value.clone())?;
    let list = manifest_list_from_doc(doc, false, true, false, media_types::DOCKER_V2S2_MANIFEST)?;
    if list.media_type.as_deref() == Some(media_types::DOCKER_V2S2_LIST) {
        return Err(ManifestError::UnsupportedMediaType(
            media_types::DOCKER_V2S2_LIST.to_string(),
        ));
    }
    Ok(list)
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// A manifest document discriminated into one of the four supported variants.
#[derive(Debug, Clone)]
pub enum ManifestKind {
    V2S2Manifest(Manifest),
    V2S2List(ManifestList),
    OciManifest(Manifest),
    OciIndex(ManifestList),
}

impl ManifestKind {
    pub fn is_manifest_list(&self) -> bool {
        matches!(self, ManifestKind::V2S2List(_) | ManifestKind::OciIndex(_))
    }

    pub fn is_oci(&self) -> bool {
        matches!(self, ManifestKind::OciManifest(_) | ManifestKind::OciIndex(_))
    }

    pub fn media_type(&self) -> Option<&str> {
        match self {
            ManifestKind::V2S2Manifest(m) | ManifestKind::OciManifest(m) => m.media_type(),
            ManifestKind::V2S2List(l) | ManifestKind::OciIndex(l) => l.media_type(),
        }
    }

    pub fn as_manifest(&self) -> Option<&Manifest> {
        match self {
            ManifestKind::V2S2Manifest(m) | ManifestKind::OciManifest(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ManifestList> {
        match self {
            ManifestKind::V2S2List(l) | ManifestKind::OciIndex(l) => Some(l),
            _ => None,
        }
    }

    /// Probes the four variants in the fixed order v2s2 manifest, v2s2 list,
    /// OCI manifest, OCI index, returning the first that validates. The
    /// mediaType-exclusion checks on each variant guarantee disjointness
    /// between the v2s2 and OCI shapes, so probe order matters only for which
    /// label an ambiguous document receives, not for correctness.
    pub fn from_value(value: &Value) -> Result<ManifestKind, ManifestError> {
        if let Ok(m) = validate_v2s2_manifest(value) {
            return Ok(ManifestKind::V2S2Manifest(m));
        }
        if let Ok(l) = validate_v2s2_list(value) {
            return Ok(ManifestKind::V2S2List(l));
        }
        if let Ok(m) = validate_oci_manifest(value) {
            return Ok(ManifestKind::OciManifest(m));
        }
        if let Ok(l) = validate_oci_index(value) {
            return Ok(ManifestKind::OciIndex(l));
        }
        Err(ManifestError::InvalidManifest(value.clone()))
    }
}

impl TryFrom<&Value> for ManifestKind {
    type Error = ManifestError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        ManifestKind::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v2s2_manifest_fixture() -> Value {
        serde_json::json!({
            "schemaVersion": 2,
            "mediaType": media_types::DOCKER_V2S2_MANIFEST,
            "config": {
                "mediaType": "application/vnd.docker.container.image.v1+json",
                "size": 1512,
                "digest": "sha256:f5d2c6a1e0c86e4234ea601552dbabb4ced0e013a1efcbfb439f1f6a7a9275b0"
            },
            "layers": [{
                "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
                "size": 977,
                "digest": "sha256:a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d2"
            }]
        })
    }

    fn oci_index_fixture(n: usize) -> Value {
        let manifests: Vec<Value> = (0..n)
            .map(|i| {
                serde_json::json!({
                    "mediaType": media_types::OCI_MANIFEST,
                    "size": 500 + i as u64,
                    "digest": format!("sha256:{:064x}", i + 1),
                    "platform": {"architecture": "amd64", "os": "linux"}
                })
            })
            .collect();
        serde_json::json!({"schemaVersion": 2, "manifests": manifests})
    }

    // S5 — Factory dispatch.
    #[test]
    fn factory_dispatches_v2s2_manifest() {
        let kind = ManifestKind::from_value(&v2s2_manifest_fixture()).unwrap();
        assert!(matches!(kind, ManifestKind::V2S2Manifest(_)));
    }

    #[test]
    fn factory_dispatches_oci_index_with_four_entries() {
        let kind = ManifestKind::from_value(&oci_index_fixture(4)).unwrap();
        match kind {
            ManifestKind::OciIndex(list) => assert_eq!(list.entries().len(), 4),
            other => panic!("expected OciIndex, got {:?}", other),
        }
    }

    #[test]
    fn factory_rejects_empty_object() {
        let err = ManifestKind::from_value(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidManifest(_)));
    }

    // S4/invariant 4 — layer dedup by digest does not change manifest size.
    #[test]
    fn manifest_size_dedups_duplicate_layers() {
        let mut fixture = v2s2_manifest_fixture();
        let layer = fixture["layers"][0].clone();
        fixture["layers"].as_array_mut().unwrap().push(layer);

        let single = manifest_from_doc(serde_json::from_value(v2s2_manifest_fixture()).unwrap()).unwrap();
        let duped = manifest_from_doc(serde_json::from_value(fixture).unwrap()).unwrap();
        assert_eq!(single.size(), duped.size());
    }

    #[test]
    fn unsupported_media_type_rejected_on_oci_manifest() {
        let mut fixture = v2s2_manifest_fixture();
        fixture["mediaType"] = serde_json::json!(media_types::OCI_MANIFEST);
        assert!(validate_oci_manifest(&fixture).is_err());
    }

    #[test]
    fn unsupported_media_type_rejected_at_entry_level() {
        let mut fixture = oci_index_fixture(1);
        fixture["manifests"][0]["mediaType"] =
            serde_json::json!(media_types::DOCKER_V2S2_MANIFEST);
        assert!(validate_oci_index(&fixture).is_err());
    }

    fn child_manifest(config_digest: &str, layer_digest: &str, layer_size: u64) -> ManifestKind {
        let value = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": media_types::DOCKER_V2S2_MANIFEST,
            "config": {
                "mediaType": "application/vnd.docker.container.image.v1+json",
                "size": 200,
                "digest": config_digest
            },
            "layers": [{
                "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
                "size": layer_size,
                "digest": layer_digest
            }]
        });
        ManifestKind::from_value(&value).unwrap()
    }

    // S6 — Fat-manifest size: entry sizes verbatim, plus deduplicated child
    // configs/layers. Sharing one layer digest across two entries must only
    // count that layer's size once.
    #[test]
    fn fat_manifest_size_dedups_shared_layer_across_entries() {
        let list = match ManifestKind::from_value(&oci_index_fixture(4)).unwrap() {
            ManifestKind::OciIndex(l) => l,
            other => panic!("expected OciIndex, got {:?}", other),
        };
        let shared_layer = format!("sha256:{:064x}", 999);
        let children = vec![
            child_manifest(&format!("sha256:{:064x}", 1), &shared_layer, 100),
            child_manifest(&format!("sha256:{:064x}", 2), &shared_layer, 100),
            child_manifest(&format!("sha256:{:064x}", 3), &format!("sha256:{:064x}", 3), 50),
            child_manifest(&format!("sha256:{:064x}", 4), &format!("sha256:{:064x}", 4), 50),
        ];

        let mut seen_configs = HashSet::new();
        let mut seen_layers = HashSet::new();
        let total = aggregate_fat_manifest_size(&list, &children, &mut seen_configs, &mut seen_layers);

        let entries_total = list.entry_sizes_total();
        let configs_total = 200 * 4;
        let layers_total = 100 + 50 + 50; // shared_layer counted once
        assert_eq!(total, entries_total + configs_total + layers_total);
    }
}
