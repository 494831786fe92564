//! Default overlay files for the chart-backed components.

use crate::error::Result;
use crate::io;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_REPLICAS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    Server,
    Worker,
}

impl OverlayKind {
    /// Top-level chart key the replica count lives under.
    pub fn chart_key(self) -> &'static str {
        match self {
            OverlayKind::Server => "server",
            OverlayKind::Worker => "worker",
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Replicas {
    replica_count: u32,
}

/// `<chart_key>: { replicaCount: 1 }` as YAML.
pub fn default_overlay(kind: OverlayKind) -> Result<String> {
    let mut doc = BTreeMap::new();
    doc.insert(
        kind.chart_key(),
        Replicas {
            replica_count: DEFAULT_REPLICAS,
        },
    );
    Ok(serde_yaml::to_string(&doc)?)
}

/// Write the default overlay unless `path` already exists. Returns true if
/// the file was created.
pub fn write_default_overlay(path: &Path, kind: OverlayKind) -> Result<bool> {
    let written = io::write_if_missing(path, default_overlay(kind)?.as_bytes())?;
    if written {
        tracing::info!(path = %path.display(), "wrote default overlay");
    } else {
        tracing::info!(path = %path.display(), "overlay exists, leaving it untouched");
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_documents() {
        assert_eq!(
            default_overlay(OverlayKind::Server).unwrap(),
            "server:\n  replicaCount: 1\n"
        );
        assert_eq!(
            default_overlay(OverlayKind::Worker).unwrap(),
            "worker:\n  replicaCount: 1\n"
        );
    }

    #[test]
    fn never_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("values/worker.yaml");
        assert!(write_default_overlay(&path, OverlayKind::Worker).unwrap());

        std::fs::write(&path, "worker:\n  replicaCount: 5\n").unwrap();
        assert!(!write_default_overlay(&path, OverlayKind::Worker).unwrap());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "worker:\n  replicaCount: 5\n"
        );
    }
}
