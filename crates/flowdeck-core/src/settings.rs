use crate::error::Result;
use crate::params::Param;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const SETTINGS_FILE: &str = "flowdeck.yaml";

pub fn settings_path(root: &Path) -> PathBuf {
    root.join(SETTINGS_FILE)
}

/// Optional project settings. Values here sit between the environment and
/// the static defaults.
///
/// ```yaml
/// params:
///   NAMESPACE: prefect-staging
///   WORK_POOL: k8s-pool
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Settings {
    /// Load settings from `path`. A missing file yields empty settings.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(&data)?;
        Ok(settings)
    }

    /// Parameter values keyed by [`Param`]. Unknown names are an error.
    pub fn values(&self) -> Result<BTreeMap<Param, String>> {
        self.params
            .iter()
            .map(|(name, value)| -> Result<(Param, String)> {
                Ok((name.parse::<Param>()?, value.clone()))
            })
            .collect()
    }
}
