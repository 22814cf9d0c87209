//! Platform tuple (os/architecture/variant/os.version/os.features) used by
//! manifest-list entries and image configs, plus host-platform detection.

use once_cell::sync::Lazy;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("platform missing required field `{0}`")]
    MissingField(&'static str),
}

/// Maps `platform.machine()`-style values onto GOARCH-style architecture names,
/// matching the table `ContainerImagePlatform` in the source system builds from.
fn normalize_arch(machine: &str) -> String {
    match machine {
        "x86_64" | "amd64" => "amd64",
        "i386" | "i686" => "386",
        "arm64" | "aarch64" => "arm64",
        "armv7l" | "armv6l" => "arm",
        other => return other.to_string(),
    }
    .to_string()
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

static DEFAULT_HOST_OS: Lazy<String> = Lazy::new(|| std::env::consts::OS.to_string());
static DEFAULT_HOST_ARCH: Lazy<String> = Lazy::new(|| normalize_arch(std::env::consts::ARCH));

/// `HOST_OS`/`HOST_ARCH` environment overrides, re-read on every access so tests
/// can set them with `std::env::set_var` and immediately observe the effect —
/// the detected default is still computed lazily, once, to avoid repeated syscalls.
fn host_os() -> String {
    env_or("HOST_OS", DEFAULT_HOST_OS.clone())
}

fn host_arch() -> String {
    env_or("HOST_ARCH", DEFAULT_HOST_ARCH.clone())
}

/// A validated `{os, architecture, variant?, os.version?, os.features?, features?}`
/// tuple. Equality is defined by string form, per the OCI image-index schema's own
/// notion of platform identity.
#[derive(Debug, Clone)]
pub struct Platform {
    os: String,
    architecture: String,
    variant: Option<String>,
    os_version: Option<String>,
    os_features: Option<Vec<String>>,
    features: Option<Vec<String>>,
}

impl Platform {
    pub fn new(os: impl Into<String>, architecture: impl Into<String>) -> Self {
        Platform {
            os: os.into(),
            architecture: architecture.into(),
            variant: None,
            os_version: None,
            os_features: None,
            features: None,
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    pub fn os(&self) -> &str {
        &self.os
    }

    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    pub fn os_version(&self) -> Option<&str> {
        self.os_version.as_deref()
    }

    pub fn os_features(&self) -> Option<&[String]> {
        self.os_features.as_deref()
    }

    pub fn features(&self) -> Option<&[String]> {
        self.features.as_deref()
    }

    /// The platform of the host machine, honoring `HOST_OS`/`HOST_ARCH` overrides.
    pub fn host_platform() -> Platform {
        Platform::new(host_os(), host_arch())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(v) = &self.variant {
            write!(f, "/{}", v)?;
        }
        Ok(())
    }
}

impl PartialEq for Platform {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
impl Eq for Platform {}

impl serde::Serialize for Platform {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        PlatformDoc::from(self).serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Platform {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let doc = PlatformDoc::deserialize(deserializer)?;
        Platform::try_from(doc).map_err(serde::de::Error::custom)
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct PlatformDoc {
    os: Option<String>,
    architecture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    variant: Option<String>,
    #[serde(rename = "os.version", skip_serializing_if = "Option::is_none")]
    os_version: Option<String>,
    #[serde(rename = "os.features", skip_serializing_if = "Option::is_none")]
    os_features: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    features: Option<Vec<String>>,
}

impl From<&Platform> for PlatformDoc {
    fn from(p: &Platform) -> Self {
        PlatformDoc {
            os: Some(p.os.clone()),
            architecture: Some(p.architecture.clone()),
            variant: p.variant.clone(),
            os_version: p.os_version.clone(),
            os_features: p.os_features.clone(),
            features: p.features.clone(),
        }
    }
}

impl std::convert::TryFrom<PlatformDoc> for Platform {
    type Error = PlatformError;

    fn try_from(doc: PlatformDoc) -> Result<Self, Self::Error> {
        Ok(Platform {
            os: doc.os.ok_or(PlatformError::MissingField("os"))?,
            architecture: doc
                .architecture
                .ok_or(PlatformError::MissingField("architecture"))?,
            variant: doc.variant,
            os_version: doc.os_version,
            os_features: doc.os_features,
            features: doc.features,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_os_arch() {
        let p = Platform::new("linux", "amd64");
        assert_eq!(p.to_string(), "linux/amd64");
    }

    #[test]
    fn displays_with_variant() {
        let p = Platform::new("linux", "arm").with_variant("v7");
        assert_eq!(p.to_string(), "linux/arm/v7");
    }

    #[test]
    fn equality_is_string_form() {
        let a = Platform::new("linux", "amd64");
        let b = Platform::new("linux", "amd64");
        assert_eq!(a, b);
        let c = Platform::new("linux", "arm64");
        assert_ne!(a, c);
    }

    #[test]
    fn host_arch_override_takes_precedence() {
        std::env::set_var("HOST_OS", "windows");
        std::env::set_var("HOST_ARCH", "arm64");
        let p = Platform::host_platform();
        assert_eq!(p.os(), "windows");
        assert_eq!(p.architecture(), "arm64");
        std::env::remove_var("HOST_OS");
        std::env::remove_var("HOST_ARCH");
    }

    #[test]
    fn normalizes_known_machine_names() {
        assert_eq!(normalize_arch("x86_64"), "amd64");
        assert_eq!(normalize_arch("aarch64"), "arm64");
        assert_eq!(normalize_arch("armv7l"), "arm");
        assert_eq!(normalize_arch("riscv64"), "riscv64");
    }

    #[test]
    fn round_trips_through_json() {
        let p = Platform::new("linux", "amd64").with_variant("v8");
        let json = serde_json::to_value(&p).unwrap();
        let back: Platform = serde_json::from_value(json).unwrap();
        assert_eq!(p, back);
    }
}
