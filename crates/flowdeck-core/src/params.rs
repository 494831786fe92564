//! Named parameters and their resolution.
//!
//! Every parameter has a static default, so resolution is total. Sources are
//! consulted in this order:
//!
//! 1. explicit overrides given on the command line (`NAME=value`, `--set`)
//! 2. the process environment, under the same name
//! 3. the optional `flowdeck.yaml` settings file
//! 4. the static default
//!
//! The environment is read once, when [`Params::resolve`] runs; the returned
//! record is immutable and handed to every step.

use crate::error::{FlowdeckError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Param
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Param {
    Namespace,
    CertManagerNamespace,
    KubeContext,
    Helm,
    Kubectl,
    PrefectRepoUrl,
    Oauth2ProxyRepoUrl,
    ServerRelease,
    WorkerRelease,
    Oauth2ProxyRelease,
    ServerChart,
    WorkerChart,
    Oauth2ProxyChart,
    ChartVersion,
    ServerValues,
    WorkerValues,
    Oauth2ProxyValues,
    BaseJobTemplate,
    WorkPool,
    RbacManifest,
    ClusterIssuerManifest,
    ServerIngressManifest,
    Oauth2IngressManifest,
    Oauth2ClientId,
    Oauth2ClientSecret,
    Oauth2CookieSecret,
    ServerService,
    LocalPort,
    ServerPort,
}

/// Static description of one parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: &'static str,
    pub description: &'static str,
    /// An empty value omits the corresponding flag entirely.
    pub optional: bool,
}

const fn required(
    name: &'static str,
    default: &'static str,
    description: &'static str,
) -> ParamSpec {
    ParamSpec {
        name,
        default,
        description,
        optional: false,
    }
}

const fn optional(name: &'static str, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        default: "",
        description,
        optional: true,
    }
}

impl Param {
    pub fn all() -> &'static [Param] {
        &[
            Param::Namespace,
            Param::CertManagerNamespace,
            Param::KubeContext,
            Param::Helm,
            Param::Kubectl,
            Param::PrefectRepoUrl,
            Param::Oauth2ProxyRepoUrl,
            Param::ServerRelease,
            Param::WorkerRelease,
            Param::Oauth2ProxyRelease,
            Param::ServerChart,
            Param::WorkerChart,
            Param::Oauth2ProxyChart,
            Param::ChartVersion,
            Param::ServerValues,
            Param::WorkerValues,
            Param::Oauth2ProxyValues,
            Param::BaseJobTemplate,
            Param::WorkPool,
            Param::RbacManifest,
            Param::ClusterIssuerManifest,
            Param::ServerIngressManifest,
            Param::Oauth2IngressManifest,
            Param::Oauth2ClientId,
            Param::Oauth2ClientSecret,
            Param::Oauth2CookieSecret,
            Param::ServerService,
            Param::LocalPort,
            Param::ServerPort,
        ]
    }

    pub fn spec(self) -> ParamSpec {
        match self {
            Param::Namespace => required("NAMESPACE", "prefect", "Cluster namespace"),
            Param::CertManagerNamespace => required(
                "CERT_MANAGER_NAMESPACE",
                "cert-manager",
                "Namespace of the certificate manager",
            ),
            Param::KubeContext => optional("KUBE_CONTEXT", "Cluster context to target"),
            Param::Helm => required("HELM", "helm", "Release manager binary"),
            Param::Kubectl => required("KUBECTL", "kubectl", "Cluster control binary"),
            Param::PrefectRepoUrl => required(
                "PREFECT_REPO_URL",
                "https://prefecthq.github.io/prefect-helm",
                "Chart repository for server and worker",
            ),
            Param::Oauth2ProxyRepoUrl => required(
                "OAUTH2_PROXY_REPO_URL",
                "https://oauth2-proxy.github.io/manifests",
                "Chart repository for the auth proxy",
            ),
            Param::ServerRelease => {
                required("SERVER_RELEASE", "prefect-server", "Server release name")
            }
            Param::WorkerRelease => {
                required("WORKER_RELEASE", "prefect-worker", "Worker release name")
            }
            Param::Oauth2ProxyRelease => required(
                "OAUTH2_PROXY_RELEASE",
                "oauth2-proxy",
                "Auth proxy release name",
            ),
            Param::ServerChart => {
                required("SERVER_CHART", "prefect/prefect-server", "Server chart")
            }
            Param::WorkerChart => {
                required("WORKER_CHART", "prefect/prefect-worker", "Worker chart")
            }
            Param::Oauth2ProxyChart => required(
                "OAUTH2_PROXY_CHART",
                "oauth2-proxy/oauth2-proxy",
                "Auth proxy chart",
            ),
            Param::ChartVersion => optional("CHART_VERSION", "Server and worker chart version"),
            Param::ServerValues => {
                required("SERVER_VALUES", "values/server.yaml", "Server overlay file")
            }
            Param::WorkerValues => {
                required("WORKER_VALUES", "values/worker.yaml", "Worker overlay file")
            }
            Param::Oauth2ProxyValues => required(
                "OAUTH2_PROXY_VALUES",
                "values/oauth2-proxy.yaml",
                "Auth proxy overlay file",
            ),
            Param::BaseJobTemplate => required(
                "BASE_JOB_TEMPLATE",
                "base-job-template.json",
                "Worker base job template",
            ),
            Param::WorkPool => required("WORK_POOL", "kubernetes", "Work pool the worker polls"),
            Param::RbacManifest => {
                required("RBAC_MANIFEST", "k8s/worker-rbac.yaml", "Worker RBAC manifest")
            }
            Param::ClusterIssuerManifest => required(
                "CLUSTER_ISSUER_MANIFEST",
                "k8s/cluster-issuer.yaml",
                "Certificate issuer manifest",
            ),
            Param::ServerIngressManifest => required(
                "SERVER_INGRESS_MANIFEST",
                "k8s/server-ingress.yaml",
                "Server ingress manifest",
            ),
            Param::Oauth2IngressManifest => required(
                "OAUTH2_INGRESS_MANIFEST",
                "k8s/oauth2-ingress.yaml",
                "Auth proxy ingress manifest",
            ),
            Param::Oauth2ClientId => optional("OAUTH2_CLIENT_ID", "OAuth client id"),
            Param::Oauth2ClientSecret => optional("OAUTH2_CLIENT_SECRET", "OAuth client secret"),
            Param::Oauth2CookieSecret => optional("OAUTH2_COOKIE_SECRET", "Proxy cookie secret"),
            Param::ServerService => {
                required("SERVER_SERVICE", "prefect-server", "Server service name")
            }
            Param::LocalPort => required("LOCAL_PORT", "4200", "Local port for port-forward"),
            Param::ServerPort => required("SERVER_PORT", "4200", "Server service port"),
        }
    }

    pub fn as_str(self) -> &'static str {
        self.spec().name
    }

    pub fn default_value(self) -> &'static str {
        self.spec().default
    }

    pub fn is_optional(self) -> bool {
        self.spec().optional
    }

    /// Whether values are redacted in listings.
    pub fn is_secret(self) -> bool {
        matches!(self, Param::Oauth2ClientSecret | Param::Oauth2CookieSecret)
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Param {
    type Err = FlowdeckError;

    fn from_str(s: &str) -> Result<Self> {
        Param::all()
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| FlowdeckError::UnknownParam(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

pub type Overrides = BTreeMap<Param, String>;

/// Parse a single `NAME=VALUE` pair. An empty value is kept as an explicit
/// empty override.
pub fn parse_override(raw: &str) -> Result<(Param, String)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| FlowdeckError::InvalidOverride(raw.to_string()))?;
    if name.is_empty() {
        return Err(FlowdeckError::InvalidOverride(raw.to_string()));
    }
    let param: Param = name.parse()?;
    Ok((param, value.to_string()))
}

/// True when a command-line token looks like `NAME=VALUE` rather than a step.
pub fn looks_like_override(token: &str) -> bool {
    token
        .split_once('=')
        .map(|(name, _)| {
            !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        })
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Params
// ---------------------------------------------------------------------------

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Override,
    Env,
    Settings,
    Default,
}

#[derive(Debug, Clone)]
pub struct Params {
    root: PathBuf,
    values: BTreeMap<Param, (String, Source)>,
}

impl Params {
    /// Resolve every parameter. `env` is the environment lookup; pass
    /// `|k| std::env::var(k).ok()` in production.
    pub fn resolve<F>(
        root: &Path,
        overrides: &Overrides,
        settings: &BTreeMap<Param, String>,
        env: F,
    ) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let values = Param::all()
            .iter()
            .map(|&p| {
                let resolved = if let Some(v) = overrides.get(&p) {
                    (v.clone(), Source::Override)
                } else if let Some(v) = env(p.as_str()) {
                    (v, Source::Env)
                } else if let Some(v) = settings.get(&p) {
                    (v.clone(), Source::Settings)
                } else {
                    (p.default_value().to_string(), Source::Default)
                };
                (p, resolved)
            })
            .collect();
        Self {
            root: root.to_path_buf(),
            values,
        }
    }

    /// Static defaults only, rooted at `root`.
    pub fn defaults(root: &Path) -> Self {
        Self::resolve(root, &Overrides::new(), &BTreeMap::new(), |_| None)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, param: Param) -> &str {
        self.values
            .get(&param)
            .map(|(v, _)| v.as_str())
            .unwrap_or_else(|| param.default_value())
    }

    /// `None` when the resolved value is empty, so the caller omits the flag.
    pub fn optional(&self, param: Param) -> Option<&str> {
        Some(self.get(param)).filter(|v| !v.is_empty())
    }

    pub fn source(&self, param: Param) -> Source {
        self.values
            .get(&param)
            .map(|(_, s)| *s)
            .unwrap_or(Source::Default)
    }

    /// A file parameter resolved against the project root.
    pub fn path(&self, param: Param) -> PathBuf {
        let raw = Path::new(self.get(param));
        if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.root.join(raw)
        }
    }
}
