//! Step graph and sequential executor.
//!
//! A [`StepGraph`] is validated once when built: names are unique, every
//! prerequisite exists, and the prerequisite relation is acyclic. The
//! [`Executor`] then runs a target's transitive prerequisites depth-first in
//! declared order, each step at most once per executor, stopping at the first
//! failure.

use crate::error::{FlowdeckError, Result};
use crate::params::{Param, Params};
use crate::tools::{ClusterClient, ReleaseManager};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Component {
    Cluster,
    Server,
    Worker,
    OauthProxy,
    Ingress,
}

impl Component {
    pub fn as_str(self) -> &'static str {
        match self {
            Component::Cluster => "cluster",
            Component::Server => "server",
            Component::Worker => "worker",
            Component::OauthProxy => "oauth-proxy",
            Component::Ingress => "ingress",
        }
    }

    /// Overlay file parameter for chart-backed components.
    pub fn overlay(self) -> Option<Param> {
        match self {
            Component::Server => Some(Param::ServerValues),
            Component::Worker => Some(Param::WorkerValues),
            Component::OauthProxy => Some(Param::Oauth2ProxyValues),
            Component::Cluster | Component::Ingress => None,
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// Everything an action may touch. Built once per invocation.
pub struct StepContext<'a> {
    pub params: &'a Params,
    pub releases: &'a dyn ReleaseManager,
    pub cluster: &'a dyn ClusterClient,
    /// Local side effects (scaffolded files) are reported instead of performed.
    pub dry_run: bool,
}

pub type Action = fn(&StepContext<'_>) -> Result<()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// The step is already satisfied when the file named by the parameter exists.
    SkipIfExists(Param),
}

impl Guard {
    fn satisfied(self, params: &Params) -> bool {
        match self {
            Guard::SkipIfExists(param) => {
                let path = params.path(param);
                if path.exists() && !path.is_file() {
                    tracing::warn!(
                        param = %param,
                        path = %path.display(),
                        "path exists but is not a regular file; it will not be used as an overlay"
                    );
                }
                path.exists()
            }
        }
    }
}

pub struct Step {
    pub name: &'static str,
    pub description: &'static str,
    pub prerequisites: Vec<&'static str>,
    pub component: Option<Component>,
    pub guard: Option<Guard>,
    /// `None` for aggregates, which only pull in their prerequisites.
    pub action: Option<Action>,
}

impl Step {
    pub fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            prerequisites: Vec::new(),
            component: None,
            guard: None,
            action: None,
        }
    }

    pub fn after(mut self, prerequisites: &[&'static str]) -> Self {
        self.prerequisites.extend_from_slice(prerequisites);
        self
    }

    pub fn component(mut self, component: Component) -> Self {
        self.component = Some(component);
        self
    }

    pub fn guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    pub fn is_aggregate(&self) -> bool {
        self.action.is_none()
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("prerequisites", &self.prerequisites)
            .field("component", &self.component)
            .field("guard", &self.guard)
            .field("aggregate", &self.is_aggregate())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// StepGraph
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct StepGraph {
    steps: Vec<Step>,
    index: HashMap<&'static str, usize>,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

impl StepGraph {
    pub fn new(steps: Vec<Step>) -> Result<Self> {
        let mut index = HashMap::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            if index.insert(step.name, i).is_some() {
                return Err(FlowdeckError::DuplicateStep(step.name.to_string()));
            }
        }
        for step in &steps {
            if let Some(missing) = step
                .prerequisites
                .iter()
                .find(|p| !index.contains_key(*p))
            {
                return Err(FlowdeckError::UnknownPrerequisite {
                    step: step.name.to_string(),
                    prerequisite: missing.to_string(),
                });
            }
        }
        let graph = Self { steps, index };
        graph.check_acyclic()?;
        Ok(graph)
    }

    fn check_acyclic(&self) -> Result<()> {
        let mut marks: HashMap<&'static str, Mark> = HashMap::new();
        let mut stack: Vec<&'static str> = Vec::new();
        for step in &self.steps {
            self.visit_for_cycle(step.name, &mut marks, &mut stack)?;
        }
        Ok(())
    }

    fn visit_for_cycle(
        &self,
        name: &'static str,
        marks: &mut HashMap<&'static str, Mark>,
        stack: &mut Vec<&'static str>,
    ) -> Result<()> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|s| *s == name).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(name.to_string());
                return Err(FlowdeckError::Cycle(cycle));
            }
            None => {}
        }
        marks.insert(name, Mark::Visiting);
        stack.push(name);
        for &prereq in &self.steps[self.index[name]].prerequisites {
            self.visit_for_cycle(prereq, marks, stack)?;
        }
        stack.pop();
        marks.insert(name, Mark::Done);
        Ok(())
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn get(&self, name: &str) -> Option<&Step> {
        self.index.get(name).map(|&i| &self.steps[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Execution order for `target`: every transitive prerequisite before its
    /// dependant, in declared order, each once, ending with `target`.
    pub fn plan(&self, target: &str) -> Result<Vec<&Step>> {
        let step = self
            .get(target)
            .ok_or_else(|| FlowdeckError::UnknownStep(target.to_string()))?;
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        self.collect(step, &mut seen, &mut order);
        Ok(order)
    }

    fn collect<'g>(
        &'g self,
        step: &'g Step,
        seen: &mut HashSet<&'static str>,
        order: &mut Vec<&'g Step>,
    ) {
        if !seen.insert(step.name) {
            return;
        }
        for prereq in &step.prerequisites {
            // Validated in `new`.
            if let Some(dep) = self.get(prereq) {
                self.collect(dep, seen, order);
            }
        }
        order.push(step);
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Steps whose action ran, in order.
    pub executed: Vec<&'static str>,
    /// Steps whose guard was already satisfied.
    pub skipped: Vec<&'static str>,
}

impl RunReport {
    pub fn merge(&mut self, other: RunReport) {
        self.executed.extend(other.executed);
        self.skipped.extend(other.skipped);
    }
}

/// Runs targets against a graph, remembering completed steps for the
/// lifetime of the executor.
pub struct Executor<'g> {
    graph: &'g StepGraph,
    completed: HashSet<&'static str>,
}

impl<'g> Executor<'g> {
    pub fn new(graph: &'g StepGraph) -> Self {
        Self {
            graph,
            completed: HashSet::new(),
        }
    }

    pub fn is_completed(&self, name: &str) -> bool {
        self.completed.contains(name)
    }

    /// Run `target` and its prerequisites. The first failing action's error
    /// is returned as-is and nothing after it runs.
    pub fn run(&mut self, target: &str, ctx: &StepContext<'_>) -> Result<RunReport> {
        let mut report = RunReport::default();
        for step in self.graph.plan(target)? {
            if self.completed.contains(step.name) {
                tracing::debug!(step = step.name, "already completed in this run");
                continue;
            }
            if let Some(guard) = step.guard {
                if guard.satisfied(ctx.params) {
                    tracing::info!(step = step.name, "already satisfied, skipping");
                    self.completed.insert(step.name);
                    report.skipped.push(step.name);
                    continue;
                }
            }
            if let Some(action) = step.action {
                tracing::info!(step = step.name, "running");
                if let Err(e) = action(ctx) {
                    tracing::debug!(step = step.name, error = %e, "step failed");
                    return Err(e);
                }
                report.executed.push(step.name);
            }
            self.completed.insert(step.name);
        }
        Ok(report)
    }
}
