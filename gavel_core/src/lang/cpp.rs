use super::{args, Artifact, Build, Diagnostics, Language, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_MAX_PROCESSES};

#[derive(Debug, Clone, Copy)]
pub enum GPPStandard {
    CPP11,
    CPP17,
}

impl GPPStandard {
    pub fn flag(self) -> &'static str {
        match self {
            GPPStandard::CPP11 => "-std=c++11",
            GPPStandard::CPP17 => "-std=c++17",
        }
    }
}

pub const CPP: Language = Language {
    tag: "cpp",
    source_name: "main.cpp",
    build: Some(Build {
        command: compile,
        artifact: Artifact::Named("main"),
        diagnostics: Diagnostics::Stderr,
    }),
    execute,
    max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
    max_processes: DEFAULT_MAX_PROCESSES,
};

fn compile(source: &str) -> Vec<String> {
    args(&[
        "/usr/bin/g++",
        "-O2",
        "-Wall",
        GPPStandard::CPP17.flag(),
        "-o",
        "main",
        source,
        "-lm",
    ])
}

fn execute(entry: &str) -> Vec<String> {
    vec![format!("./{}", entry)]
}
