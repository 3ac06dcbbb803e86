//! Supported languages.
//!
//! A language is a plain table entry: file names, resource caps and two
//! command builders. Adding a language means adding a module with one
//! [`Language`] constant and registering it in [`Languages::with_builtins`].

use std::{collections::HashMap, fmt, path::Path};

use crate::error::{Error, Result};

pub mod c;
pub mod cpp;
pub mod java;
pub mod python;
pub mod ruby;

/// Builds a command line from the name of the file it operates on.
pub type CommandBuilder = fn(&str) -> Vec<String>;

pub const DEFAULT_MAX_OUTPUT_BYTES: u64 = 256 * 1024 * 1024;
pub const DEFAULT_MAX_PROCESSES: u32 = 1;

/// Where a compiled language leaves its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    /// A file with a fixed name.
    Named(&'static str),
    /// Every file with this extension. The one named after the source stem is
    /// the entry point when present.
    Extension(&'static str),
}

/// Which captured stream holds the compiler's complaints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostics {
    Stdout,
    Stderr,
}

#[derive(Clone, Copy)]
pub struct Build {
    /// Called with the source file name.
    pub command: CommandBuilder,
    pub artifact: Artifact,
    pub diagnostics: Diagnostics,
}

#[derive(Clone, Copy)]
pub struct Language {
    pub tag: &'static str,
    pub source_name: &'static str,
    /// `None` for interpreted languages.
    pub build: Option<Build>,
    /// Called with the entry file: the artifact, or the source itself for
    /// interpreted languages.
    pub execute: CommandBuilder,
    pub max_output_bytes: u64,
    pub max_processes: u32,
}

impl Language {
    pub fn is_compiled(&self) -> bool {
        self.build.is_some()
    }

    /// Extension of the source file, including the leading dot.
    pub fn source_extension(&self) -> &'static str {
        let name = self.source_name;
        name.rfind('.').map(|i| &name[i..]).unwrap_or("")
    }

    /// Extension of the compiled artifact, if the language is compiled. Empty
    /// for native executables.
    pub fn compiled_extension(&self) -> Option<&'static str> {
        self.build.map(|build| match build.artifact {
            Artifact::Named(name) => name.rfind('.').map(|i| &name[i..]).unwrap_or(""),
            Artifact::Extension(ext) => ext,
        })
    }

    pub fn compile_command(&self) -> Option<Vec<String>> {
        self.build.map(|build| (build.command)(self.source_name))
    }

    pub fn execute_command(&self, entry: &str) -> Vec<String> {
        (self.execute)(entry)
    }
}

impl fmt::Debug for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Language")
            .field("tag", &self.tag)
            .field("source_name", &self.source_name)
            .field("compiled", &self.is_compiled())
            .field("max_output_bytes", &self.max_output_bytes)
            .field("max_processes", &self.max_processes)
            .finish()
    }
}

pub(crate) fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Languages by tag, built once at start-up and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct Languages {
    map: HashMap<&'static str, Language>,
}

impl Languages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut languages = Self::new();
        for language in [c::C, cpp::CPP, java::JAVA, python::PYTHON3, ruby::RUBY] {
            languages.register(language);
        }
        languages
    }

    pub fn register(&mut self, language: Language) -> &mut Self {
        self.map.insert(language.tag, language);
        self
    }

    pub fn get(&self, tag: &str) -> Result<&Language> {
        self.map
            .get(tag)
            .ok_or_else(|| Error::UnknownLanguage(tag.to_string()))
    }

    /// Guess the language of a source file from its extension.
    pub fn by_path(&self, path: &Path) -> Option<&Language> {
        let ext = path.extension()?.to_str()?;
        let mut matches: Vec<&Language> = self
            .map
            .values()
            .filter(|l| l.source_extension().trim_start_matches('.') == ext)
            .collect();
        matches.sort_by_key(|l| l.tag);
        matches.into_iter().next()
    }

    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags: Vec<&'static str> = self.map.keys().copied().collect();
        tags.sort_unstable();
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table() {
        let languages = Languages::with_builtins();
        assert_eq!(languages.tags(), vec!["c", "cpp", "java", "python3", "ruby"]);
        assert!(matches!(
            languages.get("brainfuck"),
            Err(Error::UnknownLanguage(_))
        ));
    }

    #[test]
    fn extensions() -> Result<()> {
        let languages = Languages::with_builtins();

        let c = languages.get("c")?;
        assert_eq!(c.source_extension(), ".c");
        assert_eq!(c.compiled_extension(), Some(""));

        let java = languages.get("java")?;
        assert_eq!(java.source_extension(), ".java");
        assert_eq!(java.compiled_extension(), Some(".class"));

        let python = languages.get("python3")?;
        assert_eq!(python.compiled_extension(), Some(".pyc"));

        let ruby = languages.get("ruby")?;
        assert_eq!(ruby.source_extension(), ".rb");
        assert_eq!(ruby.compiled_extension(), None);
        assert!(ruby.compile_command().is_none());
        Ok(())
    }

    #[test]
    fn guess_by_path() {
        let languages = Languages::with_builtins();
        let tag = |p: &str| languages.by_path(Path::new(p)).map(|l| l.tag);
        assert_eq!(tag("sol.cpp"), Some("cpp"));
        assert_eq!(tag("a/b/Main.java"), Some("java"));
        assert_eq!(tag("x.py"), Some("python3"));
        assert_eq!(tag("x.pas"), None);
        assert_eq!(tag("Makefile"), None);
    }

    #[test]
    fn caps() -> Result<()> {
        let languages = Languages::with_builtins();
        assert_eq!(languages.get("java")?.max_processes, 32);
        assert_eq!(languages.get("cpp")?.max_processes, DEFAULT_MAX_PROCESSES);
        assert_eq!(
            languages.get("ruby")?.max_output_bytes,
            DEFAULT_MAX_OUTPUT_BYTES
        );
        Ok(())
    }
}
