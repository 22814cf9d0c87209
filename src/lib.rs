//! Client library for the OCI Distribution Registry HTTP API, specialized for
//! introspecting container images: resolving references, fetching and validating
//! manifests and image indices in both the Docker v2s2 and OCI formats, walking
//! multi-architecture image graphs, and reporting aggregated metadata.

pub mod regex;

pub mod reference;
pub use reference::{Reference, ReferenceError, ReferenceKind};

pub mod platform;
pub use platform::{Platform, PlatformError};

pub mod descriptor;
pub use descriptor::{Descriptor, DescriptorError};

pub mod manifest;
pub use manifest::{ManifestError, ManifestKind};

pub mod config;
pub use config::{Config, ConfigError};

pub mod distribution;
pub use distribution::{AuthConfig, RegistryClient, RegistryError};

pub mod image;
pub use image::{Image, Inspect};

pub mod image_set;
pub use image_set::{Diff, ImageSet};

/// Media type constants recognized by the registry client and manifest factory.
pub mod media_types {
    pub const DOCKER_V2S2_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
    pub const DOCKER_V2S2_LIST: &str =
        "application/vnd.docker.distribution.manifest.list.v2+json";
    pub const DOCKER_V2S1_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v1+json";
    pub const DOCKER_V2S1_SIGNED: &str =
        "application/vnd.docker.distribution.manifest.v1+prettyjws";
    pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
    pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
}

/// Unified error type returned by the [`Image`] and [`ImageSet`] facades.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("no manifest entry matches platform {0}")]
    NoMatchingPlatform(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
