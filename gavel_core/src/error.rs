use std::string;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The build step of a compiled language did not succeed. Carries the
    /// diagnostics reported back to the submitter.
    #[error("{0}")]
    Compile(String),
    #[error("entity `{0}` not found")]
    NotFound(String),
    #[error("unknown language `{0}`")]
    UnknownLanguage(String),
    #[error("unknown comparator `{0}`")]
    UnknownComparator(String),
    #[error("sandbox `{name}` failed: {message}")]
    Sandbox { name: String, message: String },
    #[error("sandbox reported malformed result: {0}")]
    SandboxOutput(String),
    #[error("problem data error: {0}")]
    Data(String),
    #[error("environment error: {0}")]
    Environment(String),
    #[error("failed in IO: {0}")]
    IO(#[from] std::io::Error),
    #[error("bytes is not in UTF8")]
    FromUtf8(#[from] string::FromUtf8Error),
    #[error("invalid problem descriptor: {0}")]
    Descriptor(#[from] serde_yaml::Error),
    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl Error {
    /// Whether this error ends judging as a compile error rather than an
    /// internal fault.
    pub fn is_compile_failure(&self) -> bool {
        matches!(self, Error::Compile(_))
    }

    pub(crate) fn sandbox(name: &str, message: impl Into<String>) -> Self {
        Error::Sandbox {
            name: name.into(),
            message: message.into(),
        }
    }
}
