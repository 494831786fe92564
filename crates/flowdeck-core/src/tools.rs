//! Capability interfaces over the release manager (`helm`) and the cluster
//! control CLI (`kubectl`), plus their command-line implementations.

use crate::error::Result;
use crate::overlay;
use crate::params::{Param, Params};
use crate::runner::{CommandRunner, Invocation};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// ReleaseSpec
// ---------------------------------------------------------------------------

/// Desired state of one chart release.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReleaseSpec {
    pub release: String,
    pub chart: String,
    pub namespace: String,
    pub version: Option<String>,
    /// Overlay file; only passed when it exists at command-build time.
    pub values: Option<PathBuf>,
    pub set: Vec<(String, String)>,
    /// Like `set`, but masked in echoed command lines.
    pub set_secret: Vec<(String, String)>,
    pub set_file: Vec<(String, PathBuf)>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

pub trait ReleaseManager {
    fn add_repo(&self, name: &str, url: &str) -> Result<()>;
    fn update_repos(&self) -> Result<()>;
    /// Strict install: fails when the release already exists.
    fn install(&self, spec: &ReleaseSpec) -> Result<()>;
    /// Succeeds whether or not the release exists.
    fn upgrade_or_install(&self, spec: &ReleaseSpec) -> Result<()>;
    fn uninstall(&self, release: &str, namespace: &str) -> Result<()>;
    fn list(&self, namespace: &str) -> Result<()>;
}

pub trait ClusterClient {
    fn apply_namespace(&self, name: &str) -> Result<()>;
    fn apply_file(&self, path: &Path, namespace: Option<&str>) -> Result<()>;
    fn delete_file(&self, path: &Path, namespace: Option<&str>) -> Result<()>;
    fn get(&self, kinds: &str, namespace: &str) -> Result<()>;
    /// Blocks until the forward is interrupted.
    fn port_forward(&self, target: &str, ports: &str, namespace: &str) -> Result<()>;
    fn logs(&self, target: &str, namespace: &str, tail: u32) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Helm
// ---------------------------------------------------------------------------

pub struct Helm {
    binary: String,
    kube_context: Option<String>,
    runner: Arc<dyn CommandRunner>,
}

impl Helm {
    pub fn new(
        binary: impl Into<String>,
        kube_context: Option<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            binary: binary.into(),
            kube_context,
            runner,
        }
    }

    pub fn from_params(params: &Params, runner: Arc<dyn CommandRunner>) -> Self {
        Self::new(
            params.get(Param::Helm),
            params.optional(Param::KubeContext).map(str::to_string),
            runner,
        )
    }

    fn command(&self) -> Invocation {
        let inv = Invocation::new(&self.binary);
        match &self.kube_context {
            Some(ctx) => inv.arg("--kube-context").arg(ctx),
            None => inv,
        }
    }

    fn release_command(&self, mode: &[&str], spec: &ReleaseSpec) -> Invocation {
        let mut inv = self
            .command()
            .args(mode.iter().copied())
            .arg(&spec.release)
            .arg(&spec.chart)
            .args(["--namespace", spec.namespace.as_str()]);
        if let Some(version) = &spec.version {
            inv = inv.args(["--version", version.as_str()]);
        }
        if let Some(values) = &spec.values {
            inv = inv.args(overlay::values_args(values));
        }
        for (key, value) in &spec.set {
            inv = inv.arg("--set").arg(format!("{key}={value}"));
        }
        for (key, value) in &spec.set_secret {
            inv = inv.secret_set("--set", key, value);
        }
        for (key, path) in &spec.set_file {
            inv = inv
                .arg("--set-file")
                .arg(format!("{key}={}", path.display()));
        }
        inv
    }

    pub fn install_command(&self, spec: &ReleaseSpec) -> Invocation {
        self.release_command(&["install"], spec)
    }

    pub fn upgrade_command(&self, spec: &ReleaseSpec) -> Invocation {
        self.release_command(&["upgrade", "--install"], spec)
    }
}

impl ReleaseManager for Helm {
    fn add_repo(&self, name: &str, url: &str) -> Result<()> {
        let inv = self.command().args(["repo", "add", "--force-update", name, url]);
        self.runner.run(&inv)
    }

    fn update_repos(&self) -> Result<()> {
        self.runner.run(&self.command().args(["repo", "update"]))
    }

    fn install(&self, spec: &ReleaseSpec) -> Result<()> {
        self.runner.run(&self.install_command(spec))
    }

    fn upgrade_or_install(&self, spec: &ReleaseSpec) -> Result<()> {
        self.runner.run(&self.upgrade_command(spec))
    }

    fn uninstall(&self, release: &str, namespace: &str) -> Result<()> {
        let inv = self
            .command()
            .args(["uninstall", release, "--namespace", namespace]);
        self.runner.run(&inv)
    }

    fn list(&self, namespace: &str) -> Result<()> {
        self.runner
            .run(&self.command().args(["list", "--namespace", namespace]))
    }
}

// ---------------------------------------------------------------------------
// Kubectl
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceDoc<'a> {
    api_version: &'a str,
    kind: &'a str,
    metadata: Metadata<'a>,
}

#[derive(Serialize)]
struct Metadata<'a> {
    name: &'a str,
}

/// A `v1/Namespace` manifest for declarative apply.
pub fn namespace_manifest(name: &str) -> Result<String> {
    let doc = NamespaceDoc {
        api_version: "v1",
        kind: "Namespace",
        metadata: Metadata { name },
    };
    Ok(serde_yaml::to_string(&doc)?)
}

pub struct Kubectl {
    binary: String,
    context: Option<String>,
    runner: Arc<dyn CommandRunner>,
}

impl Kubectl {
    pub fn new(
        binary: impl Into<String>,
        context: Option<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            binary: binary.into(),
            context,
            runner,
        }
    }

    pub fn from_params(params: &Params, runner: Arc<dyn CommandRunner>) -> Self {
        Self::new(
            params.get(Param::Kubectl),
            params.optional(Param::KubeContext).map(str::to_string),
            runner,
        )
    }

    fn command(&self, namespace: Option<&str>) -> Invocation {
        let mut inv = Invocation::new(&self.binary);
        if let Some(ctx) = &self.context {
            inv = inv.arg("--context").arg(ctx);
        }
        if let Some(ns) = namespace {
            inv = inv.args(["--namespace", ns]);
        }
        inv
    }
}

impl ClusterClient for Kubectl {
    fn apply_namespace(&self, name: &str) -> Result<()> {
        let inv = self
            .command(None)
            .args(["apply", "-f", "-"])
            .stdin(namespace_manifest(name)?);
        self.runner.run(&inv)
    }

    fn apply_file(&self, path: &Path, namespace: Option<&str>) -> Result<()> {
        let inv = self
            .command(namespace)
            .args(["apply", "-f"])
            .arg(path.display().to_string());
        self.runner.run(&inv)
    }

    fn delete_file(&self, path: &Path, namespace: Option<&str>) -> Result<()> {
        let inv = self
            .command(namespace)
            .args(["delete", "--ignore-not-found", "-f"])
            .arg(path.display().to_string());
        self.runner.run(&inv)
    }

    fn get(&self, kinds: &str, namespace: &str) -> Result<()> {
        self.runner
            .run(&self.command(Some(namespace)).args(["get", kinds]))
    }

    fn port_forward(&self, target: &str, ports: &str, namespace: &str) -> Result<()> {
        let inv = self
            .command(Some(namespace))
            .args(["port-forward", target, ports]);
        self.runner.run(&inv)
    }

    fn logs(&self, target: &str, namespace: &str, tail: u32) -> Result<()> {
        let inv = self
            .command(Some(namespace))
            .args(["logs", target])
            .arg(format!("--tail={tail}"));
        self.runner.run(&inv)
    }
}
