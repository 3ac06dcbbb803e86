use std::fmt;

use serde::{Serialize, Serializer};

use crate::problem::TestCase;

/// Judging status. The first six are per-case outcomes; the rest describe a
/// whole submission to callers displaying progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Accepted.
    AC,
    /// Wrong answer.
    WA,
    /// Time limit exceeded.
    TLE,
    /// Memory limit exceeded.
    MLE,
    /// Non-zero exit code.
    NZE,
    /// Runtime error: killed by a signal.
    RE,
    /// Compile error.
    CE,
    /// Internal error.
    IE,
    /// Queued.
    Q,
    /// Judging.
    J,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::AC => "AC",
            Status::WA => "WA",
            Status::TLE => "TLE",
            Status::MLE => "MLE",
            Status::NZE => "NZE",
            Status::RE => "RE",
            Status::CE => "CE",
            Status::IE => "IE",
            Status::Q => "Q",
            Status::J => "J",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Outcome of one test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub case: TestCase,
    pub status: Status,
    pub message: String,
    pub cpu_time_ns: Option<u64>,
    pub real_time_ns: Option<u64>,
    pub memory_kb: Option<u64>,
}

/// Wire shape of a verdict.
#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct VerdictPayload<'a> {
    case_num: usize,
    input: &'a str,
    output: &'a str,
    status: Status,
    message: &'a str,
    cpu_time: Option<u64>,
    real_time: Option<u64>,
    memory: Option<u64>,
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        VerdictPayload {
            case_num: self.case.ordinal,
            input: &self.case.input,
            output: &self.case.output,
            status: self.status,
            message: &self.message,
            cpu_time: self.cpu_time_ns,
            real_time: self.real_time_ns,
            memory: self.memory_kb,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialize_verdict() {
        let verdict = Verdict {
            case: TestCase {
                ordinal: 3,
                input: "3.in".into(),
                output: "3.out".into(),
                time_limit_ms: 1000,
                memory_limit_kb: 8192,
            },
            status: Status::TLE,
            message: String::new(),
            cpu_time_ns: None,
            real_time_ns: None,
            memory_kb: Some(1024),
        };

        assert_eq!(
            serde_json::to_value(&verdict).unwrap(),
            json!({
                "case-num": 3,
                "input": "3.in",
                "output": "3.out",
                "status": "TLE",
                "message": "",
                "cpu-time": null,
                "real-time": null,
                "memory": 1024,
            })
        );
    }
}
