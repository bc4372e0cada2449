// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution payloads and locality variants.

use crate::args::CallArgs;
use crate::resources::Resources;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Where user code runs. Tag-only view of [`Work`] for records and
/// display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locality {
    Local,
    Thread,
    Process,
    Webapp,
}

crate::simple_display! {
    Locality {
        Local => "local",
        Thread => "thread",
        Process => "process",
        Webapp => "webapp",
    }
}

/// Boxed future returned by [`JobFn::call`].
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<Value, String>> + Send>>;
type SyncFn = Arc<dyn Fn(CallArgs) -> Result<Value, String> + Send + Sync>;
type AsyncFn = Arc<dyn Fn(CallArgs) -> TaskFuture + Send + Sync>;

/// A named in-process callable.
///
/// Function-like callables expose their name directly; there is no
/// reflection fallback, so constructors take the name explicitly.
#[derive(Clone)]
pub struct JobFn {
    name: String,
    kind: FnKind,
}

#[derive(Clone)]
enum FnKind {
    Sync(SyncFn),
    Task(AsyncFn),
}

impl JobFn {
    /// A synchronous callable. Runs inline for local jobs and on the
    /// blocking pool for thread jobs.
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CallArgs) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self { name: name.into(), kind: FnKind::Sync(Arc::new(f)) }
    }

    /// An async callable, polled as a cooperative task. Use with local
    /// jobs; the blocking pool rejects it.
    pub fn task<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        let wrapped = move |args: CallArgs| -> TaskFuture { Box::pin(f(args)) };
        Self {
            name: name.into(),
            kind: FnKind::Task(Arc::new(wrapped)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke as a future. Sync callables run at first poll.
    pub fn call(&self, args: CallArgs) -> TaskFuture {
        match &self.kind {
            FnKind::Sync(f) => {
                let f = Arc::clone(f);
                Box::pin(async move { f(args) })
            }
            FnKind::Task(f) => f(args),
        }
    }

    /// Invoke on the current (worker) thread. Async callables cannot
    /// run here and fail the job with a clear message.
    pub fn call_blocking(&self, args: CallArgs) -> Result<Value, String> {
        match &self.kind {
            FnKind::Sync(f) => f(args),
            FnKind::Task(_) => Err(format!(
                "async callable '{}' cannot run on a worker thread",
                self.name
            )),
        }
    }
}

impl fmt::Debug for JobFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FnKind::Sync(_) => "sync",
            FnKind::Task(_) => "task",
        };
        write!(f, "JobFn({}, {})", self.name, kind)
    }
}

/// An external command run in a child process.
///
/// Resolved positional job args append to `args`; keyword args render
/// as `--key=value`. Exit status 0 completes the job with trimmed
/// stdout as its result.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Program basename, used as the job's derived name.
    pub fn name(&self) -> &str {
        self.program
            .rsplit(std::path::MAIN_SEPARATOR)
            .next()
            .unwrap_or(&self.program)
    }

    /// Full argv with resolved job arguments appended.
    pub fn argv(&self, call: &CallArgs) -> Vec<String> {
        let mut argv = self.args.clone();
        for value in &call.positional {
            argv.push(value_to_arg(value));
        }
        for (key, value) in &call.keyword {
            argv.push(format!("--{}={}", key, value_to_arg(value)));
        }
        argv
    }
}

fn value_to_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A long-running service process watched through periodic TCP probes
/// against `host:port`. Never completes; it fails when the child exits
/// or the port stops answering, and otherwise runs until cancelled.
#[derive(Debug, Clone)]
pub struct WebAppSpec {
    pub command: CommandSpec,
    pub host: String,
    pub port: u16,
    /// Interval between liveness probes.
    pub check_delta: Duration,
    /// Consecutive failed probes tolerated before the job fails. The
    /// same allowance covers service startup.
    pub max_missed_probes: u32,
}

impl WebAppSpec {
    pub fn new(command: CommandSpec, host: impl Into<String>, port: u16) -> Self {
        Self {
            command,
            host: host.into(),
            port,
            check_delta: Duration::from_secs(1),
            max_missed_probes: 3,
        }
    }

    crate::setters! {
        set {
            check_delta: Duration,
            max_missed_probes: u32,
        }
    }
}

/// The closed set of execution variants. Dispatch and cancellation are
/// realized per variant by the engine; everything else about a job is
/// variant-independent.
#[derive(Debug, Clone)]
pub enum Work {
    /// Cooperative task on the engine's runtime.
    Local(JobFn),
    /// Blocking callable on the worker-thread pool.
    Thread(JobFn),
    /// Child process.
    Process(CommandSpec),
    /// Child process hosting a network listener.
    WebApp(WebAppSpec),
}

impl Work {
    pub fn locality(&self) -> Locality {
        match self {
            Work::Local(_) => Locality::Local,
            Work::Thread(_) => Locality::Thread,
            Work::Process(_) => Locality::Process,
            Work::WebApp(_) => Locality::Webapp,
        }
    }

    /// Derived callable name: function name, or program basename for
    /// the process-backed variants (the webapp wrapper exposes its
    /// inner command's name).
    pub fn callable_name(&self) -> &str {
        match self {
            Work::Local(f) | Work::Thread(f) => f.name(),
            Work::Process(cmd) => cmd.name(),
            Work::WebApp(app) => app.command.name(),
        }
    }

    /// Default slot requirements when the job spec does not override
    /// them: in-process variants are free, process-backed variants
    /// take one CPU slot.
    pub fn default_resources(&self) -> Resources {
        match self {
            Work::Local(_) | Work::Thread(_) => Resources::NONE,
            Work::Process(_) | Work::WebApp(_) => Resources::cpu(1),
        }
    }
}

#[cfg(test)]
#[path = "work_tests.rs"]
mod tests;
