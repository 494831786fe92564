use crate::cmd::help;
use crate::output::print_json;
use anyhow::Context;
use flowdeck_core::graph::{Executor, RunReport, StepContext};
use flowdeck_core::params::{looks_like_override, parse_override, Overrides, Params};
use flowdeck_core::runner::{CommandRunner, DryRunRunner, ProcessRunner};
use flowdeck_core::settings::{settings_path, Settings};
use flowdeck_core::steps;
use flowdeck_core::tools::{Helm, Kubectl};
use flowdeck_core::FlowdeckError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const HELP: &str = "help";

pub struct RunArgs {
    pub tokens: Vec<String>,
    pub set: Vec<String>,
    pub config: Option<PathBuf>,
    pub dry_run: bool,
    pub json: bool,
}

/// Split positional tokens into targets and `NAME=VALUE` overrides. Later
/// overrides win; `--set` values are applied after positional ones.
fn split_tokens(tokens: &[String], set: &[String]) -> anyhow::Result<(Vec<String>, Overrides)> {
    let mut targets = Vec::new();
    let mut overrides = Overrides::new();
    for token in tokens {
        if looks_like_override(token) {
            let (param, value) = parse_override(token)?;
            overrides.insert(param, value);
        } else {
            targets.push(token.clone());
        }
    }
    for raw in set {
        let (param, value) = parse_override(raw).with_context(|| format!("invalid --set '{raw}'"))?;
        overrides.insert(param, value);
    }
    Ok((targets, overrides))
}

pub fn run(root: &Path, args: RunArgs) -> anyhow::Result<()> {
    let (mut targets, overrides) = split_tokens(&args.tokens, &args.set)?;
    if targets.is_empty() {
        targets.push(HELP.to_string());
    }

    let config_path = args.config.unwrap_or_else(|| settings_path(root));
    let settings = Settings::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let file_values = settings
        .values()
        .with_context(|| format!("invalid params in {}", config_path.display()))?;

    // The environment is read exactly once, here.
    let params = Params::resolve(root, &overrides, &file_values, |k| std::env::var(k).ok());

    let graph = steps::graph().context("invalid step catalog")?;
    if let Some(unknown) = targets.iter().find(|t| !graph.contains(t)) {
        return Err(FlowdeckError::UnknownStep(unknown.clone()).into());
    }

    let runner: Arc<dyn CommandRunner> = if args.dry_run {
        Arc::new(DryRunRunner)
    } else {
        Arc::new(ProcessRunner)
    };
    let helm = Helm::from_params(&params, runner.clone());
    let kubectl = Kubectl::from_params(&params, runner);
    let ctx = StepContext {
        params: &params,
        releases: &helm,
        cluster: &kubectl,
        dry_run: args.dry_run,
    };

    let mut executor = Executor::new(&graph);
    let mut report = RunReport::default();
    for target in &targets {
        if target == HELP {
            help::run(&graph, &params, args.json)?;
            continue;
        }
        tracing::info!(operation = %target, "resolving");
        report.merge(executor.run(target, &ctx)?);
    }

    if args.json && targets.iter().any(|t| t != HELP) {
        print_json(&report)?;
    }
    Ok(())
}
