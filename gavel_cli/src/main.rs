use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    process,
    sync::Arc,
};

use clap::{Parser, Subcommand};
use gavel_core::{
    compare::Comparators,
    error::{Error, Result},
    judge::{Judge, Submission},
    lang::Languages,
    problem::{DirectoryLoader, ProblemLoader},
    protocol::Response,
    sandbox::SandboxCommand,
};
use log::info;

#[derive(Parser)]
#[command(
    version,
    name = "Gavel",
    author = "Kanari",
    about = "Judge solutions locally and check problem data."
)]
struct Opts {
    #[command(subcommand)]
    subcmd: SubCommand,
}

#[derive(Subcommand)]
enum SubCommand {
    #[command(about = "Judge a source file against a problem")]
    Judge(JudgeConfig),
    #[command(about = "Check that a problem's data is complete")]
    Check(CheckConfig),
    #[command(about = "Compare two output files")]
    Compare(CompareConfig),
}

#[derive(clap::Args, Debug)]
struct JudgeConfig {
    #[arg(help = "path of code")]
    src_path: PathBuf,
    #[arg(short, long, help = "problem code")]
    problem: String,
    #[arg(short = 'r', long, help = "directory holding the problems")]
    problem_root: PathBuf,
    #[arg(short, long, help = "directory for sandbox boxes")]
    box_root: PathBuf,
    #[arg(long, help = "path of the sandbox program, looked up in PATH by default")]
    sandbox: Option<PathBuf>,
    #[arg(short, long, help = "language tag, guessed from the file extension when absent")]
    language: Option<String>,
    #[arg(short, long, default_value = "1000", help = "time limit(MS)")]
    time_limit: u64,
    #[arg(short, long, default_value = "65536", help = "memory limit(KB)")]
    memory_limit: u64,
}

#[derive(clap::Args, Debug)]
struct CheckConfig {
    #[arg(help = "directory holding the problems")]
    problem_root: PathBuf,
    #[arg(help = "problem code")]
    problem: String,
}

#[derive(clap::Args, Debug)]
struct CompareConfig {
    actual: PathBuf,
    expected: PathBuf,
    #[arg(short, long, default_value = "standard", help = "comparator name")]
    comparator: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opts = Opts::parse();

    match opts.subcmd {
        SubCommand::Judge(config) => judge(config),
        SubCommand::Check(config) => {
            let issues = check(&config.problem_root, &config.problem)?;
            if issues.is_empty() {
                println!("problem `{}` is ok", config.problem);
                return Ok(());
            }
            for issue in &issues {
                println!("{}", issue);
            }
            Err(Error::Data(format!("{} issue(s) found", issues.len())))
        }
        SubCommand::Compare(config) => {
            let same = compare(&config.comparator, &config.actual, &config.expected)?;
            println!("{}", if same { "same" } else { "different" });
            if !same {
                process::exit(1);
            }
            Ok(())
        }
    }
}

fn judge(config: JudgeConfig) -> Result<()> {
    let language = match config.language {
        Some(language) => language,
        None => Languages::with_builtins()
            .by_path(&config.src_path)
            .map(|language| language.tag.to_string())
            .ok_or_else(|| Error::UnknownLanguage(config.src_path.display().to_string()))?,
    };

    let isolator = match config.sandbox {
        Some(program) => SandboxCommand::new(program, config.box_root),
        None => SandboxCommand::from_path(config.box_root)?,
    };
    let judge = Judge::new(
        Arc::new(DirectoryLoader::new(config.problem_root)),
        Arc::new(isolator),
    );

    let submission = Submission {
        id: 0,
        problem_code: config.problem,
        language,
        source: fs::read(&config.src_path)?,
        time_limit_ms: config.time_limit,
        memory_limit_kb: config.memory_limit,
    };
    info!(
        "judging {} as {}",
        config.src_path.display(),
        submission.language
    );

    for event in judge.judge(submission) {
        println!("{}", serde_json::to_string(&Response::from(&event))?);
    }
    Ok(())
}

/// Problems with the data of `code`, one line each.
fn check(problem_root: &Path, code: &str) -> Result<Vec<String>> {
    let problem = DirectoryLoader::new(problem_root).load(code, 0, 0)?;
    let mut issues = problem.verify()?;
    if !Comparators::with_builtins().contains(&problem.comparator) {
        issues.push(format!("unknown checker `{}`", problem.comparator));
    }
    if problem.cases.is_empty() {
        issues.push("no test cases".to_string());
    }
    Ok(issues)
}

fn compare(name: &str, actual: &Path, expected: &Path) -> Result<bool> {
    let comparator = Comparators::with_builtins().get(name)?;
    let mut actual = File::open(actual)?;
    let mut expected = File::open(expected)?;
    Ok(comparator.compare(&mut actual, &mut expected)?)
}
