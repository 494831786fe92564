//! The deployment step catalog.

use crate::error::Result;
use crate::graph::{Component, Guard, Step, StepContext, StepGraph};
use crate::params::{Param, Params};
use crate::scaffold;
use crate::tools::ReleaseSpec;

pub const PREFECT_REPO: &str = "prefect";
pub const OAUTH2_PROXY_REPO: &str = "oauth2-proxy";

pub const WORK_POOL_KEY: &str = "worker.config.workPool";
pub const BASE_JOB_TEMPLATE_KEY: &str = "worker.config.baseJobTemplate.configuration";
pub const CLIENT_ID_KEY: &str = "config.clientID";
pub const CLIENT_SECRET_KEY: &str = "config.clientSecret";
pub const COOKIE_SECRET_KEY: &str = "config.cookieSecret";

pub const LOG_TAIL: u32 = 100;

/// Every named operation and its prerequisites.
pub fn catalog() -> Vec<Step> {
    vec![
        // Cluster preparation
        Step::new("add-repos", "Register the chart repositories")
            .component(Component::Cluster)
            .action(add_repos),
        Step::new("create-namespace", "Create or update the target namespace")
            .component(Component::Cluster)
            .action(create_namespace),
        Step::new("add-rbac", "Grant the worker its cluster permissions")
            .after(&["create-namespace"])
            .component(Component::Worker)
            .action(add_rbac),
        Step::new("create-cluster-issuer", "Apply the TLS certificate issuer")
            .component(Component::Ingress)
            .action(create_cluster_issuer),
        // Upgrade-or-install
        Step::new("upgrade-server", "Install or upgrade the workflow server")
            .after(&["add-repos", "create-namespace"])
            .component(Component::Server)
            .action(upgrade_server),
        Step::new("upgrade-worker", "Install or upgrade the worker")
            .after(&["add-repos", "create-namespace", "add-rbac"])
            .component(Component::Worker)
            .action(upgrade_worker),
        Step::new("upgrade-oauth-proxy", "Install or upgrade the OAuth2 proxy")
            .after(&["add-repos", "create-namespace"])
            .component(Component::OauthProxy)
            .action(upgrade_oauth_proxy),
        Step::new("upgrade-server-ingress", "Apply the server ingress")
            .after(&["upgrade-server"])
            .component(Component::Ingress)
            .action(upgrade_server_ingress),
        Step::new("upgrade-oauth2-ingress", "Apply the OAuth2 proxy ingress")
            .after(&["upgrade-oauth-proxy", "create-cluster-issuer"])
            .component(Component::Ingress)
            .action(upgrade_oauth2_ingress),
        Step::new("upgrade", "Install or upgrade everything").after(&[
            "upgrade-server",
            "upgrade-worker",
            "upgrade-oauth-proxy",
            "upgrade-server-ingress",
            "upgrade-oauth2-ingress",
        ]),
        // Strict install
        Step::new("install-server", "Install the workflow server (fails if present)")
            .after(&["add-repos", "create-namespace"])
            .component(Component::Server)
            .action(install_server),
        Step::new("install-worker", "Install the worker (fails if present)")
            .after(&["add-repos", "create-namespace", "add-rbac"])
            .component(Component::Worker)
            .action(install_worker),
        Step::new("install-oauth-proxy", "Install the OAuth2 proxy (fails if present)")
            .after(&["add-repos", "create-namespace"])
            .component(Component::OauthProxy)
            .action(install_oauth_proxy),
        // Uninstall
        Step::new("uninstall-server", "Remove the workflow server release")
            .component(Component::Server)
            .action(uninstall_server),
        Step::new("uninstall-worker", "Remove the worker release")
            .component(Component::Worker)
            .action(uninstall_worker),
        Step::new("uninstall-oauth-proxy", "Remove the OAuth2 proxy release")
            .component(Component::OauthProxy)
            .action(uninstall_oauth_proxy),
        Step::new("uninstall-server-ingress", "Delete the server ingress")
            .component(Component::Ingress)
            .action(uninstall_server_ingress),
        Step::new("uninstall-oauth2-ingress", "Delete the OAuth2 proxy ingress")
            .component(Component::Ingress)
            .action(uninstall_oauth2_ingress),
        Step::new("uninstall", "Remove everything").after(&[
            "uninstall-oauth2-ingress",
            "uninstall-server-ingress",
            "uninstall-oauth-proxy",
            "uninstall-worker",
            "uninstall-server",
        ]),
        // Operations
        Step::new("port-forward", "Forward the server UI to localhost")
            .component(Component::Server)
            .action(port_forward),
        Step::new("status", "Show releases and workloads in the namespace").action(status),
        Step::new("logs", "Tail the worker logs")
            .component(Component::Worker)
            .action(logs),
        // Scaffolding
        Step::new("create-server-values", "Write the default server overlay")
            .component(Component::Server)
            .guard(Guard::SkipIfExists(Param::ServerValues))
            .action(create_server_values),
        Step::new("create-worker-values", "Write the default worker overlay")
            .component(Component::Worker)
            .guard(Guard::SkipIfExists(Param::WorkerValues))
            .action(create_worker_values),
        Step::new("create-values", "Write both default overlays")
            .after(&["create-server-values", "create-worker-values"]),
        Step::new("help", "List available operations"),
    ]
}

pub fn graph() -> Result<StepGraph> {
    StepGraph::new(catalog())
}

// ---------------------------------------------------------------------------
// Release specs
// ---------------------------------------------------------------------------

pub fn server_release(params: &Params) -> ReleaseSpec {
    ReleaseSpec {
        release: params.get(Param::ServerRelease).to_string(),
        chart: params.get(Param::ServerChart).to_string(),
        namespace: params.get(Param::Namespace).to_string(),
        version: params.optional(Param::ChartVersion).map(str::to_string),
        values: Some(params.path(Param::ServerValues)),
        ..Default::default()
    }
}

/// The base job template is attached unconditionally; the overlay is not.
pub fn worker_release(params: &Params) -> ReleaseSpec {
    ReleaseSpec {
        release: params.get(Param::WorkerRelease).to_string(),
        chart: params.get(Param::WorkerChart).to_string(),
        namespace: params.get(Param::Namespace).to_string(),
        version: params.optional(Param::ChartVersion).map(str::to_string),
        values: Some(params.path(Param::WorkerValues)),
        set: vec![(
            WORK_POOL_KEY.to_string(),
            params.get(Param::WorkPool).to_string(),
        )],
        set_file: vec![(
            BASE_JOB_TEMPLATE_KEY.to_string(),
            params.path(Param::BaseJobTemplate),
        )],
        ..Default::default()
    }
}

/// OAuth credentials are passed only when set; empty ones are left to the
/// chart's defaults and are not validated here.
pub fn oauth_proxy_release(params: &Params) -> ReleaseSpec {
    let mut spec = ReleaseSpec {
        release: params.get(Param::Oauth2ProxyRelease).to_string(),
        chart: params.get(Param::Oauth2ProxyChart).to_string(),
        namespace: params.get(Param::Namespace).to_string(),
        values: Some(params.path(Param::Oauth2ProxyValues)),
        ..Default::default()
    };
    if let Some(id) = params.optional(Param::Oauth2ClientId) {
        spec.set.push((CLIENT_ID_KEY.to_string(), id.to_string()));
    }
    for (param, key) in [
        (Param::Oauth2ClientSecret, CLIENT_SECRET_KEY),
        (Param::Oauth2CookieSecret, COOKIE_SECRET_KEY),
    ] {
        if let Some(value) = params.optional(param) {
            spec.set_secret.push((key.to_string(), value.to_string()));
        }
    }
    spec
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

fn namespace<'a>(ctx: &StepContext<'a>) -> &'a str {
    ctx.params.get(Param::Namespace)
}

fn add_repos(ctx: &StepContext<'_>) -> Result<()> {
    ctx.releases
        .add_repo(PREFECT_REPO, ctx.params.get(Param::PrefectRepoUrl))?;
    ctx.releases
        .add_repo(OAUTH2_PROXY_REPO, ctx.params.get(Param::Oauth2ProxyRepoUrl))?;
    ctx.releases.update_repos()
}

fn create_namespace(ctx: &StepContext<'_>) -> Result<()> {
    ctx.cluster.apply_namespace(namespace(ctx))
}

fn add_rbac(ctx: &StepContext<'_>) -> Result<()> {
    ctx.cluster
        .apply_file(&ctx.params.path(Param::RbacManifest), Some(namespace(ctx)))
}

fn create_cluster_issuer(ctx: &StepContext<'_>) -> Result<()> {
    ctx.cluster.apply_file(
        &ctx.params.path(Param::ClusterIssuerManifest),
        Some(ctx.params.get(Param::CertManagerNamespace)),
    )
}

fn upgrade_server(ctx: &StepContext<'_>) -> Result<()> {
    ctx.releases.upgrade_or_install(&server_release(ctx.params))
}

fn upgrade_worker(ctx: &StepContext<'_>) -> Result<()> {
    ctx.releases.upgrade_or_install(&worker_release(ctx.params))
}

fn upgrade_oauth_proxy(ctx: &StepContext<'_>) -> Result<()> {
    ctx.releases
        .upgrade_or_install(&oauth_proxy_release(ctx.params))
}

fn upgrade_server_ingress(ctx: &StepContext<'_>) -> Result<()> {
    ctx.cluster.apply_file(
        &ctx.params.path(Param::ServerIngressManifest),
        Some(namespace(ctx)),
    )
}

fn upgrade_oauth2_ingress(ctx: &StepContext<'_>) -> Result<()> {
    ctx.cluster.apply_file(
        &ctx.params.path(Param::Oauth2IngressManifest),
        Some(namespace(ctx)),
    )
}

fn install_server(ctx: &StepContext<'_>) -> Result<()> {
    ctx.releases.install(&server_release(ctx.params))
}

fn install_worker(ctx: &StepContext<'_>) -> Result<()> {
    ctx.releases.install(&worker_release(ctx.params))
}

fn install_oauth_proxy(ctx: &StepContext<'_>) -> Result<()> {
    ctx.releases.install(&oauth_proxy_release(ctx.params))
}

fn uninstall_server(ctx: &StepContext<'_>) -> Result<()> {
    ctx.releases
        .uninstall(ctx.params.get(Param::ServerRelease), namespace(ctx))
}

fn uninstall_worker(ctx: &StepContext<'_>) -> Result<()> {
    ctx.releases
        .uninstall(ctx.params.get(Param::WorkerRelease), namespace(ctx))
}

fn uninstall_oauth_proxy(ctx: &StepContext<'_>) -> Result<()> {
    ctx.releases
        .uninstall(ctx.params.get(Param::Oauth2ProxyRelease), namespace(ctx))
}

fn uninstall_server_ingress(ctx: &StepContext<'_>) -> Result<()> {
    ctx.cluster.delete_file(
        &ctx.params.path(Param::ServerIngressManifest),
        Some(namespace(ctx)),
    )
}

fn uninstall_oauth2_ingress(ctx: &StepContext<'_>) -> Result<()> {
    ctx.cluster.delete_file(
        &ctx.params.path(Param::Oauth2IngressManifest),
        Some(namespace(ctx)),
    )
}

fn port_forward(ctx: &StepContext<'_>) -> Result<()> {
    let target = format!("svc/{}", ctx.params.get(Param::ServerService));
    let ports = format!(
        "{}:{}",
        ctx.params.get(Param::LocalPort),
        ctx.params.get(Param::ServerPort)
    );
    ctx.cluster.port_forward(&target, &ports, namespace(ctx))
}

fn status(ctx: &StepContext<'_>) -> Result<()> {
    ctx.releases.list(namespace(ctx))?;
    ctx.cluster.get("pods,svc,ingress", namespace(ctx))
}

fn logs(ctx: &StepContext<'_>) -> Result<()> {
    let target = format!("deployment/{}", ctx.params.get(Param::WorkerRelease));
    ctx.cluster.logs(&target, namespace(ctx), LOG_TAIL)
}

fn create_server_values(ctx: &StepContext<'_>) -> Result<()> {
    write_overlay(ctx, Param::ServerValues, scaffold::OverlayKind::Server)
}

fn create_worker_values(ctx: &StepContext<'_>) -> Result<()> {
    write_overlay(ctx, Param::WorkerValues, scaffold::OverlayKind::Worker)
}

fn write_overlay(ctx: &StepContext<'_>, param: Param, kind: scaffold::OverlayKind) -> Result<()> {
    let path = ctx.params.path(param);
    if ctx.dry_run {
        println!("would write {}", path.display());
        return Ok(());
    }
    scaffold::write_default_overlay(&path, kind).map(|_| ())
}
