#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// The binary with a scrubbed environment rooted at `dir`, so parameters
/// from the developer's shell cannot leak into assertions.
fn flowdeck(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("flowdeck").unwrap();
    cmd.current_dir(dir.path())
        .env_clear()
        .env("PATH", std::env::var("PATH").unwrap_or_default())
        .env("FLOWDECK_ROOT", dir.path());
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let out = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(out).unwrap()
}

// ---------------------------------------------------------------------------
// help
// ---------------------------------------------------------------------------

#[test]
fn no_target_prints_help() {
    let dir = TempDir::new().unwrap();
    flowdeck(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("upgrade-oauth2-ingress"))
        .stdout(predicate::str::contains("PARAMETER"))
        .stdout(predicate::str::contains("NAMESPACE"));
}

#[test]
fn help_json_lists_operations_and_redacts_secrets() {
    let dir = TempDir::new().unwrap();
    let out = stdout_of(
        flowdeck(&dir)
            .args(["help", "--json"])
            .env("OAUTH2_COOKIE_SECRET", "do-not-print"),
    );
    assert!(!out.contains("do-not-print"));
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    let ops = value["operations"].as_array().unwrap();
    assert!(ops.iter().any(|o| o["name"] == "create-values"));
    let cookie = value["parameters"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["name"] == "OAUTH2_COOKIE_SECRET")
        .unwrap();
    assert_eq!(cookie["value"], "****");
    assert_eq!(cookie["source"], "env");
}

#[test]
fn unknown_target_fails() {
    let dir = TempDir::new().unwrap();
    flowdeck(&dir)
        .args(["--dry-run", "deploy-everything"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown step 'deploy-everything'"));
}

#[test]
fn unknown_override_fails() {
    let dir = TempDir::new().unwrap();
    flowdeck(&dir)
        .args(["--dry-run", "status", "NAMESPCE=x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown parameter: NAMESPCE"));
}

// ---------------------------------------------------------------------------
// dry runs
// ---------------------------------------------------------------------------

#[test]
fn worker_upgrade_in_staging_without_overlay() {
    let dir = TempDir::new().unwrap();
    let out = stdout_of(
        flowdeck(&dir)
            .args(["--dry-run", "upgrade-worker"])
            .env("NAMESPACE", "staging"),
    );
    let worker = out
        .lines()
        .find(|l| l.starts_with("helm upgrade --install prefect-worker"))
        .expect("worker upgrade line");
    assert!(worker.contains("--namespace staging"));
    assert!(!worker.contains("--values"));
    assert!(worker.contains("--set-file worker.config.baseJobTemplate.configuration="));
    assert!(worker.contains("base-job-template.json"));
}

#[test]
fn positional_override_beats_env() {
    let dir = TempDir::new().unwrap();
    flowdeck(&dir)
        .args(["--dry-run", "status", "NAMESPACE=prod"])
        .env("NAMESPACE", "staging")
        .assert()
        .success()
        .stdout(predicate::str::contains("helm list --namespace prod"))
        .stdout(predicate::str::contains("staging").not());
}

#[test]
fn settings_file_sits_below_env() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("flowdeck.yaml"),
        "params:\n  NAMESPACE: from-file\n  WORK_POOL: gpu-pool\n",
    )
    .unwrap();
    let out = stdout_of(
        flowdeck(&dir)
            .args(["--dry-run", "upgrade-worker"])
            .env("NAMESPACE", "from-env"),
    );
    assert!(out.contains("--namespace from-env"));
    assert!(out.contains("worker.config.workPool=gpu-pool"));
    assert!(!out.contains("from-file"));
}

#[test]
fn upgrade_order_in_dry_run() {
    let dir = TempDir::new().unwrap();
    let out = stdout_of(flowdeck(&dir).args(["--dry-run", "upgrade"]));
    let pos = |needle: &str| {
        out.find(needle)
            .unwrap_or_else(|| panic!("missing '{needle}' in:\n{out}"))
    };
    let issuer = pos("cluster-issuer.yaml");
    let oauth_ingress = pos("oauth2-ingress.yaml");
    let server_ingress = pos("server-ingress.yaml");
    for release in ["prefect-server", "prefect-worker", "oauth2-proxy"] {
        let at = pos(&format!("helm upgrade --install {release}"));
        assert!(at < server_ingress && at < oauth_ingress);
    }
    assert!(issuer < oauth_ingress);
    assert_eq!(out.matches("helm repo update").count(), 1);
}

#[test]
fn oauth_secrets_masked_and_omitted() {
    let dir = TempDir::new().unwrap();
    let out = stdout_of(flowdeck(&dir).args(["--dry-run", "upgrade-oauth-proxy"]));
    assert!(!out.contains("config.client"));

    let out = stdout_of(
        flowdeck(&dir)
            .args(["--dry-run", "upgrade-oauth-proxy"])
            .env("OAUTH2_CLIENT_ID", "my-client")
            .env("OAUTH2_CLIENT_SECRET", "hunter2"),
    );
    assert!(out.contains("--set config.clientID=my-client"));
    assert!(out.contains("--set config.clientSecret=****"));
    assert!(!out.contains("hunter2"));
    assert!(!out.contains("config.cookieSecret"));
}

// ---------------------------------------------------------------------------
// create-values
// ---------------------------------------------------------------------------

#[test]
fn create_values_writes_once() {
    let dir = TempDir::new().unwrap();
    flowdeck(&dir).arg("create-values").assert().success();

    let server = dir.path().join("values/server.yaml");
    let worker = dir.path().join("values/worker.yaml");
    assert_eq!(
        std::fs::read_to_string(&server).unwrap(),
        "server:\n  replicaCount: 1\n"
    );
    assert_eq!(
        std::fs::read_to_string(&worker).unwrap(),
        "worker:\n  replicaCount: 1\n"
    );

    std::fs::write(&worker, "worker:\n  replicaCount: 4\n").unwrap();
    flowdeck(&dir).arg("create-values").assert().success();
    assert_eq!(
        std::fs::read_to_string(&worker).unwrap(),
        "worker:\n  replicaCount: 4\n"
    );
}

#[test]
fn dry_run_create_values_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let out = stdout_of(flowdeck(&dir).args(["--dry-run", "create-values"]));
    let server = dir.path().join("values/server.yaml");
    let worker = dir.path().join("values/worker.yaml");
    assert!(out.contains(&format!("would write {}", server.display())));
    assert!(out.contains(&format!("would write {}", worker.display())));
    assert!(!server.exists());
    assert!(!worker.exists());
}

#[test]
fn created_overlay_is_picked_up() {
    let dir = TempDir::new().unwrap();
    flowdeck(&dir).arg("create-server-values").assert().success();
    let out = stdout_of(flowdeck(&dir).args(["--dry-run", "upgrade-server"]));
    let expected = dir.path().join("values/server.yaml");
    assert!(out.contains(&format!("--values {}", expected.display())));
}

#[test]
fn run_report_as_json() {
    let dir = TempDir::new().unwrap();
    let out = stdout_of(flowdeck(&dir).args(["--json", "create-values"]));
    let report: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(
        report["executed"],
        serde_json::json!(["create-server-values", "create-worker-values"])
    );
}

// ---------------------------------------------------------------------------
// logging
// ---------------------------------------------------------------------------

#[test]
fn rust_log_raises_level() {
    let dir = TempDir::new().unwrap();
    flowdeck(&dir)
        .args(["--dry-run", "status"])
        .env("RUST_LOG", "info")
        .assert()
        .success()
        .stderr(predicate::str::contains("running"));
}

#[test]
fn quiet_by_default() {
    let dir = TempDir::new().unwrap();
    flowdeck(&dir)
        .args(["--dry-run", "status"])
        .assert()
        .success()
        .stderr(predicate::str::contains("running").not());
}

// ---------------------------------------------------------------------------
// real process execution with stand-in tools
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn fake_tool(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.path().join(name);
    std::fs::write(&path, format!("#!/bin/sh\necho \"{name} $*\" >> \"$FAKE_LOG\"\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
#[test]
fn failing_server_upgrade_stops_upgrade_and_returns_its_status() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("calls.log");
    let helm = fake_tool(
        &dir,
        "helm",
        "case \"$*\" in \"upgrade --install prefect-server\"*) exit 3 ;; esac\nexit 0",
    );
    let kubectl = fake_tool(&dir, "kubectl", "cat > /dev/null\nexit 0");

    flowdeck(&dir)
        .arg("upgrade")
        .arg(format!("HELM={}", helm.display()))
        .arg(format!("KUBECTL={}", kubectl.display()))
        .env("FAKE_LOG", &log)
        .env("RUST_LOG", "info")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("error:").count(1))
        .stderr(predicate::str::contains("step failed").not());

    let calls = std::fs::read_to_string(&log).unwrap();
    assert!(calls.contains("helm upgrade --install prefect-server"));
    assert!(!calls.contains("prefect-worker"));
    assert!(!calls.contains("ingress"));
    assert!(calls.lines().last().unwrap().contains("prefect-server"));
}

#[cfg(unix)]
#[test]
fn namespace_manifest_is_piped_to_kubectl() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("calls.log");
    let captured = dir.path().join("stdin.yaml");
    let kubectl = fake_tool(
        &dir,
        "kubectl",
        &format!("cat > \"{}\"\nexit 0", captured.display()),
    );

    flowdeck(&dir)
        .arg("create-namespace")
        .arg("NAMESPACE=staging")
        .arg(format!("KUBECTL={}", kubectl.display()))
        .env("FAKE_LOG", &log)
        .assert()
        .success();

    let doc = std::fs::read_to_string(&captured).unwrap();
    assert!(doc.contains("kind: Namespace"));
    assert!(doc.contains("name: staging"));
}

#[test]
fn missing_tool_is_reported() {
    let dir = TempDir::new().unwrap();
    flowdeck(&dir)
        .args(["status", "HELM=flowdeck-test-no-such-helm"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "'flowdeck-test-no-such-helm' not found on PATH",
        ));
}
