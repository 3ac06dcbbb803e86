use std::{fs, path::{Path, PathBuf}};

use gavel_core::sandbox::{Limits, SandboxCommand};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Overrides the access token given in the config file.
pub const ACCESS_TOKEN_ENV: &str = "GAVEL_ACCESS_TOKEN";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default)]
    pub access_token: String,
    /// Holds one directory per problem code.
    pub problem_root: PathBuf,
    /// Where the sandbox program creates its boxes.
    pub box_root: PathBuf,
    /// Path of the sandbox program; looked up in `PATH` when absent.
    pub sandbox: Option<PathBuf>,
    #[serde(default)]
    pub compile: CompileLimits,
}

fn default_address() -> String {
    "127.0.0.1:1337".to_string()
}

/// Partial override of the compile profile.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct CompileLimits {
    pub cpu_time_ms: Option<u64>,
    pub real_time_ms: Option<u64>,
    pub memory_kb: Option<u64>,
    pub max_output_bytes: Option<u64>,
    pub max_processes: Option<u32>,
}

impl CompileLimits {
    pub fn apply(&self, base: Limits) -> Limits {
        Limits {
            cpu_time_ms: self.cpu_time_ms.or(base.cpu_time_ms),
            real_time_ms: self.real_time_ms.or(base.real_time_ms),
            memory_kb: self.memory_kb.or(base.memory_kb),
            max_output_bytes: self.max_output_bytes.or(base.max_output_bytes),
            max_processes: self.max_processes.or(base.max_processes),
        }
    }
}

impl ServerConfig {
    pub fn from_string(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_string(&fs::read_to_string(path)?)
    }

    /// Take the access token from the environment when it is set.
    pub fn with_env_token(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.access_token = token;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.access_token.is_empty() {
            return Err(Error::Invalid(format!(
                "no access token: set `access-token` or {}",
                ACCESS_TOKEN_ENV
            )));
        }
        if !self.problem_root.is_dir() {
            return Err(Error::Invalid(format!(
                "problem root {} is not a directory",
                self.problem_root.display()
            )));
        }
        Ok(())
    }

    pub fn compile_limits(&self) -> Limits {
        self.compile.apply(Limits::compile_profile())
    }

    pub fn isolator(&self) -> Result<SandboxCommand> {
        Ok(match &self.sandbox {
            Some(program) => SandboxCommand::new(program, &self.box_root),
            None => SandboxCommand::from_path(&self.box_root)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "problem-root: /var/local/lib/gavel/problems\nbox-root: /var/local/lib/gavel/boxes\n";

    #[test]
    fn defaults() -> Result<()> {
        let config = ServerConfig::from_string(MINIMAL)?;
        assert_eq!(config.address, "127.0.0.1:1337");
        assert_eq!(config.access_token, "");
        assert_eq!(config.sandbox, None);
        assert_eq!(config.compile_limits(), Limits::compile_profile());
        Ok(())
    }

    #[test]
    fn compile_override() -> Result<()> {
        let content = format!("{}compile:\n  cpu-time-ms: 10000\n  max-processes: 64\n", MINIMAL);
        let limits = ServerConfig::from_string(&content)?.compile_limits();
        assert_eq!(limits.cpu_time_ms, Some(10000));
        assert_eq!(limits.max_processes, Some(64));
        assert_eq!(limits.real_time_ms, Limits::compile_profile().real_time_ms);
        Ok(())
    }

    #[test]
    fn environment_token_wins() -> Result<()> {
        let content = format!("{}access-token: from-file\n", MINIMAL);
        let config = ServerConfig::from_string(&content)?;

        let config = config.with_env_token(None);
        assert_eq!(config.access_token, "from-file");
        let config = config.with_env_token(Some(String::new()));
        assert_eq!(config.access_token, "from-file");
        let config = config.with_env_token(Some("from-env".into()));
        assert_eq!(config.access_token, "from-env");
        Ok(())
    }

    #[test]
    fn empty_token_is_rejected() -> Result<()> {
        let root = tempfile::tempdir()?;
        let content = format!(
            "problem-root: {}\nbox-root: /tmp\n",
            root.path().display()
        );
        let config = ServerConfig::from_string(&content)?;
        assert!(matches!(config.validate(), Err(Error::Invalid(_))));
        assert!(config.with_env_token(Some("secret".into())).validate().is_ok());
        Ok(())
    }

    #[test]
    fn missing_roots_are_errors() {
        assert!(matches!(
            ServerConfig::from_string("address: 0.0.0.0:1337\n"),
            Err(Error::Config(_))
        ));
    }
}
