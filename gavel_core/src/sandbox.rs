//! Resource-limited execution through the external `sandbox` program.
//!
//! Every execution happens inside a *box*: a directory named after a unique id
//! under the box root, holding a `home/` working directory and the `in`, `out`
//! and `err` files wired to the standard streams of the boxed process. The
//! box is provisioned with `--init`, used with `--run` and released with
//! `--del`; [`Sandbox`] ties that lifecycle to a Rust value so that a box is
//! deleted on every exit path.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::Arc,
};

use log::{debug, error};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Limits handed to a single run. A limit left as `None` is not passed to the
/// sandbox at all, which leaves that resource unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Limits {
    pub cpu_time_ms: Option<u64>,
    pub real_time_ms: Option<u64>,
    pub memory_kb: Option<u64>,
    pub max_output_bytes: Option<u64>,
    pub max_processes: Option<u32>,
}

impl Limits {
    /// Limits for one test case: the wall clock gets twice the cpu budget so
    /// that a program sleeping or blocking forever is still stopped.
    pub fn for_case(time_limit_ms: u64, memory_limit_kb: u64) -> Self {
        Self {
            cpu_time_ms: Some(time_limit_ms),
            real_time_ms: Some(time_limit_ms.saturating_mul(2)),
            memory_kb: Some(memory_limit_kb),
            ..Self::default()
        }
    }

    /// Default profile for compilations, bounded against compiler bombs.
    pub fn compile_profile() -> Self {
        Self {
            cpu_time_ms: Some(5000),
            real_time_ms: Some(5000),
            memory_kb: Some(1024 * 1024),
            max_output_bytes: Some(64 * 1024),
            max_processes: Some(1024),
        }
    }

    pub fn with_output_cap(mut self, bytes: u64) -> Self {
        self.max_output_bytes = Some(bytes);
        self
    }

    pub fn with_process_cap(mut self, processes: u32) -> Self {
        self.max_processes = Some(processes);
        self
    }

    /// Translate the limits into the sandbox flags. The sandbox counts file
    /// sizes in KiB, so the output cap is rounded up.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(ms) = self.cpu_time_ms {
            args.push(format!("--cpu-time-limit={}", ms));
        }
        if let Some(ms) = self.real_time_ms {
            args.push(format!("--real-time-limit={}", ms));
        }
        if let Some(kb) = self.memory_kb {
            args.push(format!("--memory-limit={}", kb));
        }
        if let Some(bytes) = self.max_output_bytes {
            args.push(format!("--max-fsize={}", (bytes + 1023) / 1024));
        }
        if let Some(pids) = self.max_processes {
            args.push(format!("--max-pids={}", pids));
        }
        args
    }
}

/// Measured outcome of one boxed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub cpu_time_ns: u64,
    pub real_time_ns: u64,
    pub memory_kb: u64,
    pub timed_out: bool,
    pub memory_killed: bool,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExecutionResult {
    /// Parse the `key: value` report printed by `sandbox --run`. A value of
    /// `-1` for `exitcode` or `signal` means the field is absent.
    pub fn parse(report: &str) -> Result<Self> {
        let mut fields = HashMap::new();
        for line in report.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| Error::SandboxOutput(format!("bad line `{}`", line)))?;
            let value: i64 = value
                .trim()
                .parse()
                .map_err(|_| Error::SandboxOutput(format!("bad value in `{}`", line)))?;
            fields.insert(key.trim(), value);
        }

        let field = |key: &str| {
            fields
                .get(key)
                .copied()
                .ok_or_else(|| Error::SandboxOutput(format!("missing `{}`", key)))
        };
        let optional = |value: i64| (value >= 0).then(|| value as i32);

        Ok(Self {
            cpu_time_ns: field("cpu_time_ns")?.max(0) as u64,
            real_time_ns: field("real_time_ns")?.max(0) as u64,
            memory_kb: field("memory_kb")?.max(0) as u64,
            timed_out: field("timeout")? != 0,
            memory_killed: field("oom_kill")? != 0,
            exit_code: optional(field("exitcode")?),
            signal: optional(field("signal")?),
        })
    }
}

/// The isolation boundary. Implementations provision, run in and delete named
/// boxes; limit violations are reported in [`ExecutionResult`], while `Err` is
/// kept for infrastructure faults.
pub trait Isolator: Send + Sync {
    /// Provision the box `name` and return its root directory.
    fn init(&self, name: &str) -> Result<PathBuf>;
    fn run(&self, name: &str, command: &[String], limits: &Limits) -> Result<ExecutionResult>;
    fn delete(&self, name: &str) -> Result<()>;
}

/// [`Isolator`] backed by the external `sandbox` executable.
#[derive(Debug, Clone)]
pub struct SandboxCommand {
    program: PathBuf,
    box_root: PathBuf,
}

impl SandboxCommand {
    pub fn new(program: impl Into<PathBuf>, box_root: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            box_root: box_root.into(),
        }
    }

    /// Locate `sandbox` through `PATH`.
    pub fn from_path(box_root: impl Into<PathBuf>) -> Result<Self> {
        let program = which::which("sandbox")
            .map_err(|_| Error::Environment("missing sandbox executable".into()))?;
        Ok(Self::new(program, box_root))
    }

    fn invoke(&self, name: &str, args: &[String]) -> Result<Vec<u8>> {
        let output = Command::new(&self.program)
            .arg(format!("--box-name={}", name))
            .arg(format!("--box-root={}", self.box_root.display()))
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        if !output.status.success() {
            return Err(Error::sandbox(
                name,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(output.stdout)
    }
}

impl Isolator for SandboxCommand {
    fn init(&self, name: &str) -> Result<PathBuf> {
        self.invoke(name, &["--init".to_string()])?;
        Ok(self.box_root.join(name))
    }

    fn run(&self, name: &str, command: &[String], limits: &Limits) -> Result<ExecutionResult> {
        let mut args = vec!["--run".to_string()];
        args.extend(limits.to_args());
        args.push("--".to_string());
        args.extend(command.iter().cloned());

        let stdout = self.invoke(name, &args)?;
        ExecutionResult::parse(&String::from_utf8(stdout)?)
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.invoke(name, &["--del".to_string()])?;
        Ok(())
    }
}

/// A provisioned box. Dropping it deletes the box; [`Sandbox::close`] does the
/// same but reports a failed teardown to the caller.
pub struct Sandbox {
    isolator: Arc<dyn Isolator>,
    name: String,
    root: PathBuf,
    released: bool,
}

impl Sandbox {
    /// Provision a fresh box whose name starts with `prefix`.
    pub fn create(isolator: Arc<dyn Isolator>, prefix: &str) -> Result<Self> {
        let name = format!("{}-{}", prefix, Uuid::new_v4().simple());
        let root = isolator.init(&name)?;
        debug!("provisioned box {}", name);
        Ok(Self {
            isolator,
            name,
            root,
            released: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn home_path(&self) -> PathBuf {
        self.root.join("home")
    }

    pub fn stdin_path(&self) -> PathBuf {
        self.root.join("in")
    }

    pub fn stdout_path(&self) -> PathBuf {
        self.root.join("out")
    }

    pub fn stderr_path(&self) -> PathBuf {
        self.root.join("err")
    }

    pub fn run(&self, command: &[String], limits: &Limits) -> Result<ExecutionResult> {
        debug!("box {} runs {:?} with {:?}", self.name, command, limits);
        self.isolator.run(&self.name, command, limits)
    }

    /// Captured standard output of the last run.
    pub fn stdout(&self) -> Result<Vec<u8>> {
        Ok(fs::read(self.stdout_path())?)
    }

    /// Captured standard error of the last run.
    pub fn stderr(&self) -> Result<Vec<u8>> {
        Ok(fs::read(self.stderr_path())?)
    }

    pub fn close(mut self) -> Result<()> {
        self.released = true;
        self.isolator.delete(&self.name)?;
        debug!("released box {}", self.name);
        Ok(())
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.isolator.delete(&self.name) {
            error!("failed to release box {}: {}", self.name, err);
        } else {
            debug!("released box {}", self.name);
        }
    }
}
