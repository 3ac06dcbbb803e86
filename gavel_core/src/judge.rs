//! Submission judging as a demand-driven event sequence.

use std::{mem, sync::Arc};

use log::{debug, error};
use serde_json::{json, Map, Value};

use crate::{
    compare::Comparators,
    error::{Error, Result},
    lang::Languages,
    problem::{ProblemLoader, TestCase},
    runner::Runner,
    sandbox::{Isolator, Limits},
    verdict::Verdict,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: u64,
    pub problem_code: String,
    pub language: String,
    pub source: Vec<u8>,
    pub time_limit_ms: u64,
    pub memory_limit_kb: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    CaseBegin,
    CaseVerdict(Verdict),
    CaseEnd,
    CompileError(String),
    InternalError(String),
}

impl Event {
    /// Name of the event on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::CaseBegin => "case-begin",
            Event::CaseVerdict(_) => "case-verdict",
            Event::CaseEnd => "case-end",
            Event::CompileError(_) => "compile-error",
            Event::InternalError(_) => "internal-error",
        }
    }

    pub fn payload(&self) -> Map<String, Value> {
        match self {
            Event::CaseBegin | Event::CaseEnd => Map::new(),
            Event::CaseVerdict(verdict) => match serde_json::to_value(verdict) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            },
            Event::CompileError(message) | Event::InternalError(message) => {
                match json!({ "error": message }) {
                    Value::Object(map) => map,
                    _ => Map::new(),
                }
            }
        }
    }

    /// Whether no event follows this one.
    /// Report for a fault of the judging machinery. The cause is only
    /// logged, it may name boxes and host paths.
    pub fn internal_error(submission_id: u64) -> Self {
        Event::InternalError(format!(
            "internal error while judging submission {}",
            submission_id
        ))
    }

    pub fn is_last(&self) -> bool {
        matches!(
            self,
            Event::CaseEnd | Event::CompileError(_) | Event::InternalError(_)
        )
    }
}

/// Shared judging context. Cloning is cheap; every clone sees the same
/// registries.
#[derive(Clone)]
pub struct Judge {
    languages: Arc<Languages>,
    comparators: Arc<Comparators>,
    loader: Arc<dyn ProblemLoader>,
    isolator: Arc<dyn Isolator>,
    compile_limits: Limits,
}

impl Judge {
    pub fn new(loader: Arc<dyn ProblemLoader>, isolator: Arc<dyn Isolator>) -> Self {
        Self {
            languages: Arc::new(Languages::with_builtins()),
            comparators: Arc::new(Comparators::with_builtins()),
            loader,
            isolator,
            compile_limits: Limits::compile_profile(),
        }
    }

    pub fn with_languages(mut self, languages: Languages) -> Self {
        self.languages = Arc::new(languages);
        self
    }

    pub fn with_comparators(mut self, comparators: Comparators) -> Self {
        self.comparators = Arc::new(comparators);
        self
    }

    pub fn with_compile_limits(mut self, limits: Limits) -> Self {
        self.compile_limits = limits;
        self
    }

    pub fn languages(&self) -> &Languages {
        &self.languages
    }

    pub fn comparators(&self) -> &Comparators {
        &self.comparators
    }

    /// Events of judging `submission`. Nothing happens until the first
    /// event is pulled, and each pull does only the work for that event.
    pub fn judge(&self, submission: Submission) -> JudgeEvents {
        JudgeEvents {
            judge: self.clone(),
            id: submission.id,
            state: State::Pending(submission),
        }
    }

    fn start(&self, submission: &Submission) -> Result<Runner> {
        let language = *self.languages.get(&submission.language)?;
        let problem = self.loader.load(
            &submission.problem_code,
            submission.time_limit_ms,
            submission.memory_limit_kb,
        )?;
        let comparator = self.comparators.get(&problem.comparator)?;

        let mut runner = Runner::new(
            language,
            problem,
            comparator,
            self.isolator.clone(),
            self.compile_limits.clone(),
            &submission.source,
        )?;
        runner.prepare()?;
        Ok(runner)
    }
}

enum State {
    Pending(Submission),
    Judging {
        runner: Runner,
        cases: Vec<TestCase>,
        next: usize,
    },
    Finished,
}

/// Single-pass event sequence of one submission. Dropping it early releases
/// every box still held.
pub struct JudgeEvents {
    judge: Judge,
    id: u64,
    state: State,
}

impl JudgeEvents {
    pub fn submission_id(&self) -> u64 {
        self.id
    }

    fn fail(&self, err: Error) -> Event {
        if err.is_compile_failure() {
            debug!("submission {} failed to compile", self.id);
            return Event::CompileError(err.to_string());
        }
        error!("internal error while judging submission {}: {:?}", self.id, err);
        Event::internal_error(self.id)
    }
}

impl Iterator for JudgeEvents {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        match mem::replace(&mut self.state, State::Finished) {
            State::Pending(submission) => match self.judge.start(&submission) {
                Ok(runner) => {
                    debug!(
                        "submission {} prepared for problem {}",
                        self.id,
                        runner.problem().code
                    );
                    let cases = runner.problem().cases.clone();
                    self.state = State::Judging {
                        runner,
                        cases,
                        next: 0,
                    };
                    Some(Event::CaseBegin)
                }
                Err(err) => Some(self.fail(err)),
            },
            State::Judging {
                mut runner,
                cases,
                next,
            } => match cases.get(next) {
                Some(case) => match runner.run(case) {
                    Ok(verdict) => {
                        self.state = State::Judging {
                            runner,
                            cases,
                            next: next + 1,
                        };
                        Some(Event::CaseVerdict(verdict))
                    }
                    Err(err) => Some(self.fail(err)),
                },
                None => match runner.close() {
                    Ok(()) => Some(Event::CaseEnd),
                    Err(err) => Some(self.fail(err)),
                },
            },
            State::Finished => None,
        }
    }
}
