//! Image runtime configuration document: `{architecture, os, rootfs, config?,
//! history?, created?, author?}`. Derives a [`Platform`] and exposes labels/env.

use crate::platform::Platform;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config missing required field `{0}`")]
    MissingField(&'static str),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Empty {}

/// The nested execution-parameters object of an image config, e.g.
/// `{User, ExposedPorts, Env, Entrypoint, Cmd, Volumes, WorkingDir, Labels,
/// StopSignal}`, matching the image-spec's own PascalCase field names.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    #[serde(rename = "User")]
    pub user: Option<String>,
    #[serde(rename = "ExposedPorts")]
    pub exposed_ports: Option<HashMap<String, Empty>>,
    #[serde(rename = "Env")]
    pub env: Option<Vec<String>>,
    #[serde(rename = "Entrypoint")]
    pub entrypoint: Option<Vec<String>>,
    #[serde(rename = "Cmd")]
    pub cmd: Option<Vec<String>>,
    #[serde(rename = "Volumes")]
    pub volumes: Option<HashMap<String, Empty>>,
    #[serde(rename = "WorkingDir")]
    pub working_dir: Option<String>,
    #[serde(rename = "Labels")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(rename = "StopSignal")]
    pub stop_signal: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootFs {
    #[serde(rename = "type")]
    pub fs_type: String,
    pub diff_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct History {
    pub created: Option<String>,
    pub author: Option<String>,
    pub created_by: Option<String>,
    pub comment: Option<String>,
    pub empty_layer: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfigDoc {
    created: Option<String>,
    author: Option<String>,
    architecture: Option<String>,
    os: Option<String>,
    variant: Option<String>,
    config: Option<RuntimeConfig>,
    rootfs: Option<RootFs>,
    history: Option<Vec<History>>,
}

/// A validated image runtime configuration document.
#[derive(Debug, Clone)]
pub struct Config {
    created: Option<String>,
    author: Option<String>,
    architecture: String,
    os: String,
    variant: Option<String>,
    config: RuntimeConfig,
    rootfs: RootFs,
    history: Vec<History>,
}

impl Config {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let doc: ConfigDoc = serde_json::from_slice(bytes)?;
        Config::try_from_doc(doc)
    }

    fn try_from_doc(doc: ConfigDoc) -> Result<Self, ConfigError> {
        Ok(Config {
            created: doc.created,
            author: doc.author,
            architecture: doc
                .architecture
                .ok_or(ConfigError::MissingField("architecture"))?,
            os: doc.os.ok_or(ConfigError::MissingField("os"))?,
            variant: doc.variant,
            config: doc.config.unwrap_or_default(),
            rootfs: doc.rootfs.ok_or(ConfigError::MissingField("rootfs"))?,
            history: doc.history.unwrap_or_default(),
        })
    }

    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    pub fn os(&self) -> &str {
        &self.os
    }

    pub fn rootfs(&self) -> &RootFs {
        &self.rootfs
    }

    pub fn history(&self) -> &[History] {
        &self.history
    }

    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// `{os, architecture, variant?}` wrapped as a [`Platform`].
    pub fn platform(&self) -> Platform {
        let mut p = Platform::new(self.os.clone(), self.architecture.clone());
        if let Some(v) = &self.variant {
            p = p.with_variant(v.clone());
        }
        p
    }

    /// Labels from the nested runtime config, defaulting to an empty map.
    pub fn labels(&self) -> HashMap<String, String> {
        self.config.labels.clone().unwrap_or_default()
    }

    /// Env entries from the nested runtime config, defaulting to an empty vec.
    pub fn env(&self) -> Vec<String> {
        self.config.env.clone().unwrap_or_default()
    }

    pub fn created(&self) -> Option<&str> {
        self.created.as_deref()
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "created": "2023-01-01T00:00:00Z",
        "author": "Example Maintainers <maintainers@example.com>",
        "architecture": "amd64",
        "os": "linux",
        "config": {
            "Env": ["PATH=/usr/bin"],
            "Labels": {"maintainer": "example"}
        },
        "rootfs": {
            "type": "layers",
            "diff_ids": ["sha256:abc"]
        },
        "history": [{"created": "2023-01-01T00:00:00Z", "created_by": "/bin/sh -c echo hi"}]
    }"#;

    #[test]
    fn parses_platform_and_labels() {
        let cfg = Config::from_bytes(FIXTURE.as_bytes()).unwrap();
        assert_eq!(cfg.platform(), Platform::new("linux", "amd64"));
        assert_eq!(cfg.labels().get("maintainer").unwrap(), "example");
        assert_eq!(cfg.env(), vec!["PATH=/usr/bin".to_string()]);
        assert_eq!(cfg.author(), Some("Example Maintainers <maintainers@example.com>"));
    }

    #[test]
    fn labels_default_to_empty_map_when_absent() {
        let fixture = r#"{"architecture":"amd64","os":"linux","rootfs":{"type":"layers","diff_ids":[]}}"#;
        let cfg = Config::from_bytes(fixture.as_bytes()).unwrap();
        assert!(cfg.labels().is_empty());
        assert!(cfg.env().is_empty());
    }

    #[test]
    fn missing_required_field_fails() {
        let fixture = r#"{"os":"linux","rootfs":{"type":"layers","diff_ids":[]}}"#;
        assert!(Config::from_bytes(fixture.as_bytes()).is_err());
    }
}
