use super::{args, Language, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_MAX_PROCESSES};

pub const RUBY: Language = Language {
    tag: "ruby",
    source_name: "main.rb",
    build: None,
    execute,
    max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
    max_processes: DEFAULT_MAX_PROCESSES,
};

fn execute(entry: &str) -> Vec<String> {
    args(&["/usr/bin/ruby", entry])
}
