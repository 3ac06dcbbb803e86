use super::{args, Artifact, Build, Diagnostics, Language, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_MAX_PROCESSES};

pub const C: Language = Language {
    tag: "c",
    source_name: "main.c",
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
    args(&["/usr/bin/gcc", "-O2", "-Wall", "-std=c99", "-o", "main", source, "-lm"])
}

fn execute(entry: &str) -> Vec<String> {
    vec![format!("./{}", entry)]
}
