use super::{args, Artifact, Build, Diagnostics, Language, DEFAULT_MAX_OUTPUT_BYTES};

/// `javac` writes one class file per class, and nothing at all for an empty
/// source while still exiting with 0.
pub const JAVA: Language = Language {
    tag: "java",
    source_name: "Main.java",
    build: Some(Build {
        command: compile,
        artifact: Artifact::Extension(".class"),
        diagnostics: Diagnostics::Stderr,
    }),
    execute,
    max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
    // the JVM starts its own threads
    max_processes: 32,
};

fn compile(source: &str) -> Vec<String> {
    args(&["/usr/bin/javac", source])
}

fn execute(entry: &str) -> Vec<String> {
    let class = entry.strip_suffix(".class").unwrap_or(entry);
    args(&["/usr/bin/java", "-cp", ".", class])
}
