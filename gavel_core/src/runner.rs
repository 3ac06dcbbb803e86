//! The per-submission build/execute state machine.
//!
//! A [`Runner`] is created for one submission, [`prepare`](Runner::prepare)d
//! once (compiling inside a build box when the language needs it) and then
//! [`run`](Runner::run) once per test case, each case in a fresh box. Boxes
//! are released when the runner is closed or dropped, whatever state it
//! stopped in.

use std::{
    fs::{self, File},
    os::unix::fs::MetadataExt,
    path::Path,
    sync::Arc,
};

use log::debug;
use nix::sys::signal::Signal;

use crate::{
    compare::Comparator,
    error::{Error, Result},
    lang::{Artifact, Build, Diagnostics, Language},
    problem::{CaseArchive, Problem, TestCase},
    sandbox::{ExecutionResult, Isolator, Limits, Sandbox},
    verdict::{Status, Verdict},
};

/// Convert line endings to `\n` and force the source into UTF-8.
pub fn normalize_source(source: &[u8]) -> String {
    let mut normalized = Vec::with_capacity(source.len());
    let mut bytes = source.iter().copied().peekable();
    while let Some(byte) = bytes.next() {
        if byte == b'\r' {
            bytes.next_if_eq(&b'\n');
            normalized.push(b'\n');
        } else {
            normalized.push(byte);
        }
    }
    String::from_utf8_lossy(&normalized).into_owned()
}

/// Classify a finished run. A verdict left as [`Status::J`] still needs its
/// output compared against the answer.
pub fn score(case: &TestCase, result: &ExecutionResult) -> Verdict {
    let mut verdict = Verdict {
        case: case.clone(),
        status: Status::J,
        message: String::new(),
        cpu_time_ns: Some(result.cpu_time_ns),
        real_time_ns: Some(result.real_time_ns),
        memory_kb: Some(result.memory_kb),
    };

    if result.timed_out {
        verdict.status = Status::TLE;
        verdict.cpu_time_ns = None;
        verdict.real_time_ns = None;
    } else if result.memory_killed {
        verdict.status = Status::MLE;
        verdict.memory_kb = None;
    } else if let Some(signal) = result.signal {
        verdict.status = Status::RE;
        verdict.message = describe_signal(signal);
    } else if let Some(code) = result.exit_code.filter(|&code| code != 0) {
        verdict.status = Status::NZE;
        verdict.message = format!("exitcode {}", code);
    }

    verdict
}

fn describe_signal(signal: i32) -> String {
    match Signal::try_from(signal) {
        Ok(name) => format!("signal {} ({})", signal, name.as_str()),
        Err(_) => format!("signal {}", signal),
    }
}

pub struct Runner {
    language: Language,
    problem: Problem,
    archive: Box<dyn CaseArchive>,
    comparator: Arc<dyn Comparator>,
    isolator: Arc<dyn Isolator>,
    compile_limits: Limits,
    source: String,
    /// Build box, held from a successful compilation until the runner closes.
    build: Option<Sandbox>,
    /// Files copied into every case box; the first one is the entry point.
    executables: Vec<String>,
}

impl Runner {
    pub fn new(
        language: Language,
        problem: Problem,
        comparator: Arc<dyn Comparator>,
        isolator: Arc<dyn Isolator>,
        compile_limits: Limits,
        source: &[u8],
    ) -> Result<Self> {
        let archive = problem.open_archive()?;
        Ok(Self {
            language,
            problem,
            archive,
            comparator,
            isolator,
            compile_limits,
            source: normalize_source(source),
            build: None,
            executables: Vec::new(),
        })
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    /// Compile the source if the language needs it. A failed build is
    /// reported as [`Error::Compile`].
    pub fn prepare(&mut self) -> Result<()> {
        let build = match self.language.build {
            Some(build) => build,
            None => {
                self.executables = vec![self.language.source_name.to_string()];
                return Ok(());
            }
        };

        let sandbox = Sandbox::create(self.isolator.clone(), "cbox")?;
        fs::write(
            sandbox.home_path().join(self.language.source_name),
            &self.source,
        )?;

        let command = (build.command)(self.language.source_name);
        let result = sandbox.run(&command, &self.compile_limits)?;

        if result.timed_out {
            return Err(Error::Compile("compilation took too long".into()));
        }
        if result.exit_code != Some(0) {
            let diagnostics = match build.diagnostics {
                Diagnostics::Stdout => sandbox.stdout()?,
                Diagnostics::Stderr => sandbox.stderr()?,
            };
            let diagnostics = String::from_utf8_lossy(&diagnostics).trim_end().to_string();
            if diagnostics.is_empty() {
                return Err(Error::Compile(match result.signal {
                    Some(signal) => format!("compiler killed by {}", describe_signal(signal)),
                    None => "compilation failed".into(),
                }));
            }
            return Err(Error::Compile(diagnostics));
        }

        self.executables = find_artifacts(&sandbox.home_path(), &build, &self.language)?;
        if self.executables.is_empty() {
            return Err(Error::Compile(format!(
                "{} produced no output",
                command.first().map(String::as_str).unwrap_or("compiler")
            )));
        }
        debug!("compiled {:?}", self.executables);

        self.build = Some(sandbox);
        Ok(())
    }

    /// Execute one test case and score it.
    pub fn run(&mut self, case: &TestCase) -> Result<Verdict> {
        let entry = self
            .executables
            .first()
            .cloned()
            .ok_or_else(|| Error::Environment("runner used before prepare".into()))?;

        let sandbox = Sandbox::create(self.isolator.clone(), "box")?;
        self.stage(&sandbox, case)?;

        let limits = Limits::for_case(case.time_limit_ms, case.memory_limit_kb)
            .with_output_cap(self.language.max_output_bytes)
            .with_process_cap(self.language.max_processes);
        let result = sandbox.run(&self.language.execute_command(&entry), &limits)?;

        let mut verdict = score(case, &result);
        if verdict.status == Status::J {
            let mut actual = File::open(sandbox.stdout_path())?;
            let mut expected = self.archive.open(&case.output)?;
            verdict.status = if self.comparator.compare(&mut actual, &mut expected)? {
                Status::AC
            } else {
                Status::WA
            };
        }
        debug!(
            "problem {} case {}: {}",
            self.problem.code, case.ordinal, verdict.status
        );

        sandbox.close()?;
        Ok(verdict)
    }

    /// Release the build box, reporting a failed teardown.
    pub fn close(mut self) -> Result<()> {
        if let Some(build) = self.build.take() {
            build.close()?;
        }
        Ok(())
    }

    /// Copy the program and the case input into a case box.
    fn stage(&mut self, sandbox: &Sandbox, case: &TestCase) -> Result<()> {
        let home = sandbox.home_path();
        match &self.build {
            Some(build) => {
                for name in &self.executables {
                    copy_preserving(&build.home_path().join(name), &home.join(name))?;
                }
            }
            None => fs::write(home.join(self.language.source_name), &self.source)?,
        }
        self.archive.extract(&case.input, &sandbox.stdin_path())
    }
}

/// Names of the compiled files in `home`, entry point first.
fn find_artifacts(home: &Path, build: &Build, language: &Language) -> Result<Vec<String>> {
    match build.artifact {
        Artifact::Named(name) => Ok(if home.join(name).is_file() {
            vec![name.to_string()]
        } else {
            vec![]
        }),
        Artifact::Extension(ext) => {
            let mut names = Vec::new();
            for entry in fs::read_dir(home)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str() {
                    if name.ends_with(ext) {
                        names.push(name.to_string());
                    }
                }
            }
            names.sort();

            let stem = language.source_name.trim_end_matches(language.source_extension());
            let main = format!("{}{}", stem, ext);
            if let Some(pos) = names.iter().position(|n| *n == main) {
                let entry = names.remove(pos);
                names.insert(0, entry);
            }
            Ok(names)
        }
    }
}

/// Copy a file keeping its permissions and ownership.
fn copy_preserving(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to)?;
    let meta = fs::metadata(from)?;
    std::os::unix::fs::chown(to, Some(meta.uid()), Some(meta.gid()))?;
    Ok(())
}
