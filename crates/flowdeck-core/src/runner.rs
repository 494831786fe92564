//! External command execution.
//!
//! Tools never call `std::process` directly. They build an [`Invocation`] and
//! hand it to a [`CommandRunner`]:
//!
//! - [`ProcessRunner`] runs it, blocking, with stdout/stderr inherited so the
//!   tool's own output reaches the caller unmodified.
//! - [`DryRunRunner`] prints it and reports success.
//! - [`RecordingRunner`] keeps it in memory for assertions.

use crate::error::{FlowdeckError, Result};
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Document piped to the process on stdin (`kubectl apply -f -`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
    /// Indices into `args` whose value part is masked when displayed.
    #[serde(skip)]
    redacted: Vec<usize>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            redacted: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Push `flag key=value`, masking `value` in displayed output.
    pub fn secret_set(mut self, flag: &str, key: &str, value: &str) -> Self {
        self.args.push(flag.to_string());
        self.redacted.push(self.args.len());
        self.args.push(format!("{key}={value}"));
        self
    }

    pub fn stdin(mut self, document: impl Into<String>) -> Self {
        self.stdin = Some(document.into());
        self
    }

    /// True when `args` starts with `prefix`.
    pub fn starts_with(&self, prefix: &[&str]) -> bool {
        self.args.len() >= prefix.len() && self.args.iter().zip(prefix).all(|(a, p)| a == p)
    }

    /// Number of occurrences of `flag` in `args`.
    pub fn count_flag(&self, flag: &str) -> usize {
        self.args.iter().filter(|a| *a == flag).count()
    }

    /// Value following the first occurrence of `flag`.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

fn quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,@+".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&quote(&self.program))?;
        for (i, arg) in self.args.iter().enumerate() {
            if self.redacted.contains(&i) {
                let key = arg.split_once('=').map(|(k, _)| k).unwrap_or(arg);
                write!(f, " {}=****", quote(key))?;
            } else {
                write!(f, " {}", quote(arg))?;
            }
        }
        if self.stdin.is_some() {
            f.write_str(" <<EOF")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CommandRunner
// ---------------------------------------------------------------------------

pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<()>;
}

/// Blocking execution of the real binaries.
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<()> {
        let program = which::which(&invocation.program)
            .map_err(|_| FlowdeckError::ToolNotFound(invocation.program.clone()))?;

        eprintln!("+ {invocation}");
        tracing::debug!(program = %program.display(), args = ?invocation.args, "spawning");

        let mut cmd = Command::new(&program);
        cmd.args(&invocation.args)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if invocation.stdin.is_some() {
            cmd.stdin(Stdio::piped());
        }

        let mut child = cmd.spawn().map_err(|e| FlowdeckError::Spawn {
            program: invocation.program.clone(),
            reason: e.to_string(),
        })?;

        // A child that exits early closes its end of the pipe; its exit status
        // takes precedence over the resulting write error.
        let mut write_result = Ok(());
        if let Some(document) = &invocation.stdin {
            // Dropping the handle closes the pipe so the child sees EOF.
            if let Some(mut stdin) = child.stdin.take() {
                write_result = stdin.write_all(document.as_bytes());
            }
        }

        let status = child.wait()?;
        if !status.success() {
            return Err(FlowdeckError::CommandFailed {
                program: invocation.program.clone(),
                code: status.code().unwrap_or(1),
            });
        }
        write_result?;
        Ok(())
    }
}

/// Prints each invocation to stdout instead of executing it.
#[derive(Debug, Default)]
pub struct DryRunRunner;

impl CommandRunner for DryRunRunner {
    fn run(&self, invocation: &Invocation) -> Result<()> {
        println!("{invocation}");
        if let Some(document) = &invocation.stdin {
            print!("{document}");
            if !document.ends_with('\n') {
                println!();
            }
            println!("EOF");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingRunner
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Failure {
    program: String,
    prefix: Vec<String>,
    code: i32,
}

/// In-memory runner for tests: records every invocation and fails the ones
/// matching a registered program + argument prefix.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Invocation>>,
    failures: Mutex<Vec<Failure>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make invocations of `program` whose args start with `prefix` exit
    /// with `code`. The failing call is still recorded.
    pub fn fail_when(&self, program: &str, prefix: &[&str], code: i32) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(Failure {
                program: program.to_string(),
                prefix: prefix.iter().map(|s| s.to_string()).collect(),
                code,
            });
        }
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.clone());
        }
        let failures = match self.failures.lock() {
            Ok(f) => f,
            Err(_) => return Ok(()),
        };
        let hit = failures.iter().find(|f| {
            f.program == invocation.program
                && invocation.starts_with(&f.prefix.iter().map(String::as_str).collect::<Vec<_>>())
        });
        match hit {
            Some(f) => Err(FlowdeckError::CommandFailed {
                program: invocation.program.clone(),
                code: f.code,
            }),
            None => Ok(()),
        }
    }
}
