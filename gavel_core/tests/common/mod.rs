//! An in-process stand-in for the `sandbox` program.
//!
//! `FakeSandbox` lays boxes out the way the real program does and "runs" a
//! handful of canned programs recognised by keywords in their text, so the
//! runner and the judge can be driven end to end without root.

#![allow(dead_code)]

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use gavel_core::{
    error::{Error, Result},
    judge::{Judge, Submission},
    problem::{DirectoryLoader, DESCRIPTOR},
    sandbox::{ExecutionResult, Isolator, Limits},
};
use tempfile::TempDir;

#[derive(Debug, Clone)]
pub struct Run {
    pub box_name: String,
    pub command: Vec<String>,
    pub limits: Limits,
    /// Files in `home` when the run started.
    pub home_files: Vec<String>,
}

pub struct FakeSandbox {
    root: TempDir,
    live: Mutex<HashSet<String>>,
    runs: Mutex<Vec<Run>>,
}

impl FakeSandbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            root: tempfile::tempdir().unwrap(),
            live: Mutex::new(HashSet::new()),
            runs: Mutex::new(Vec::new()),
        })
    }

    pub fn live_boxes(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    pub fn runs(&self) -> Vec<Run> {
        self.runs.lock().unwrap().clone()
    }

    fn box_root(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }
}

impl Isolator for FakeSandbox {
    fn init(&self, name: &str) -> Result<PathBuf> {
        let root = self.box_root(name);
        fs::create_dir_all(root.join("home"))?;
        self.live.lock().unwrap().insert(name.to_string());
        Ok(root)
    }

    fn run(&self, name: &str, command: &[String], limits: &Limits) -> Result<ExecutionResult> {
        let root = self.box_root(name);
        let home = root.join("home");

        let mut home_files: Vec<String> = fs::read_dir(&home)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        home_files.sort();
        self.runs.lock().unwrap().push(Run {
            box_name: name.to_string(),
            command: command.to_vec(),
            limits: limits.clone(),
            home_files,
        });

        fs::write(root.join("out"), "")?;
        fs::write(root.join("err"), "")?;

        if is_compile(command) {
            compile(&root, command)
        } else {
            execute(name, &root, command)
        }
    }

    fn delete(&self, name: &str) -> Result<()> {
        fs::remove_dir_all(self.box_root(name))?;
        self.live.lock().unwrap().remove(name);
        Ok(())
    }
}

fn exited(code: i32) -> ExecutionResult {
    ExecutionResult {
        cpu_time_ns: 1_000_000,
        real_time_ns: 1_500_000,
        memory_kb: 1024,
        exit_code: Some(code),
        ..ExecutionResult::default()
    }
}

fn killed(signal: i32) -> ExecutionResult {
    ExecutionResult {
        exit_code: None,
        signal: Some(signal),
        ..exited(0)
    }
}

fn is_compile(command: &[String]) -> bool {
    let tool = command[0].as_str();
    tool.ends_with("gcc")
        || tool.ends_with("g++")
        || tool.ends_with("javac")
        || command.iter().any(|arg| arg == "compileall")
}

fn compile(root: &Path, command: &[String]) -> Result<ExecutionResult> {
    let home = root.join("home");
    let source_name = command
        .iter()
        .rev()
        .find(|arg| home.join(arg).is_file())
        .ok_or_else(|| Error::Environment("no source in build box".into()))?;
    let source = fs::read_to_string(home.join(source_name))?;
    let python = command.iter().any(|arg| arg == "compileall");

    if source.contains("slow compile") {
        return Ok(ExecutionResult {
            timed_out: true,
            ..killed(9)
        });
    }
    if source.contains("syntax error") {
        let message = format!("{}:1:1: error: expected ';'\n", source_name);
        fs::write(root.join(if python { "out" } else { "err" }), message)?;
        return Ok(exited(1));
    }

    if python {
        fs::write(home.join("main.pyc"), &source)?;
    } else if command[0].ends_with("javac") {
        if !source.trim().is_empty() {
            fs::write(home.join("Main.class"), &source)?;
        }
        if source.contains("class Helper") {
            fs::write(home.join("Helper.class"), "")?;
        }
    } else if !source.contains("no artifact") {
        fs::write(home.join("main"), &source)?;
    }
    Ok(exited(0))
}

fn execute(name: &str, root: &Path, command: &[String]) -> Result<ExecutionResult> {
    let entry = match command[0].as_str() {
        "/usr/bin/java" => format!("{}.class", command[command.len() - 1]),
        "/usr/bin/python3" | "/usr/bin/ruby" => command[1].clone(),
        other => other.trim_start_matches("./").to_string(),
    };
    let program = fs::read_to_string(root.join("home").join(entry))?;
    let input = fs::read_to_string(root.join("in"))?;

    let (result, output) = if program.contains("sandbox fault") {
        return Err(Error::Sandbox {
            name: name.to_string(),
            message: "cgroup vanished".into(),
        });
    } else if program.contains("loop") {
        (
            ExecutionResult {
                timed_out: true,
                ..killed(9)
            },
            String::new(),
        )
    } else if program.contains("alloc") {
        (
            ExecutionResult {
                memory_killed: true,
                ..killed(9)
            },
            String::new(),
        )
    } else if program.contains("kill") {
        (killed(9), String::new())
    } else if program.contains("exit 3") {
        (exited(3), String::new())
    } else if program.contains("print(-1)") {
        (exited(0), "-1\n".to_string())
    } else if program.contains("sum") {
        let sum: i64 = input
            .split_whitespace()
            .filter_map(|n| n.parse::<i64>().ok())
            .sum();
        (exited(0), format!("{}\n", sum))
    } else {
        (exited(0), String::new())
    };

    fs::write(root.join("out"), output)?;
    Ok(result)
}

/// A problem root holding one problem, `code`, whose case `i` is
/// `cases[i - 1]` as an (input, expected output) pair.
pub fn problem_root(code: &str, checker: Option<&str>, cases: &[(&str, &str)]) -> TempDir {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join(code);
    fs::create_dir_all(dir.join("data")).unwrap();

    let mut descriptor = String::from("archive: data\n");
    if let Some(checker) = checker {
        descriptor.push_str(&format!("checker: {}\n", checker));
    }
    descriptor.push_str("cases:\n");
    for (index, (input, output)) in cases.iter().enumerate() {
        let ordinal = index + 1;
        descriptor.push_str(&format!("  - in: {0}.in\n    out: {0}.out\n", ordinal));
        fs::write(dir.join(format!("data/{}.in", ordinal)), input).unwrap();
        fs::write(dir.join(format!("data/{}.out", ordinal)), output).unwrap();
    }
    fs::write(dir.join(DESCRIPTOR), descriptor).unwrap();
    root
}

/// The two-case "sum" problem. The second answer carries trailing blanks.
pub fn sum_problem() -> TempDir {
    problem_root("sum", None, &[("1 2\n", "3\n"), ("5 7\n", "12  \n\n")])
}

pub fn judge(problems: &TempDir, sandbox: &Arc<FakeSandbox>) -> Judge {
    Judge::new(
        Arc::new(DirectoryLoader::new(problems.path())),
        sandbox.clone(),
    )
}

pub fn submission(problem_code: &str, language: &str, source: &str) -> Submission {
    Submission {
        id: 42,
        problem_code: problem_code.to_string(),
        language: language.to_string(),
        source: source.as_bytes().to_vec(),
        time_limit_ms: 1000,
        memory_limit_kb: 65536,
    }
}
