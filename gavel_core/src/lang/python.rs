use super::{args, Artifact, Build, Diagnostics, Language, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_MAX_PROCESSES};

/// Python is byte-compiled up front so that syntax errors surface as compile
/// errors. `compileall` reports them on stdout.
pub const PYTHON3: Language = Language {
    tag: "python3",
    source_name: "main.py",
    build: Some(Build {
        command: compile,
        artifact: Artifact::Named("main.pyc"),
        diagnostics: Diagnostics::Stdout,
    }),
    execute,
    max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
    max_processes: DEFAULT_MAX_PROCESSES,
};

fn compile(source: &str) -> Vec<String> {
    args(&["/usr/bin/python3", "-m", "compileall", "-b", source])
}

fn execute(entry: &str) -> Vec<String> {
    args(&["/usr/bin/python3", entry])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands() {
        assert_eq!(
            PYTHON3.compile_command().unwrap(),
            vec!["/usr/bin/python3", "-m", "compileall", "-b", "main.py"]
        );
        assert_eq!(
            PYTHON3.execute_command("main.pyc"),
            vec!["/usr/bin/python3", "main.pyc"]
        );
    }
}
