use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed in IO: {0}")]
    IO(#[from] io::Error),
    #[error("invalid config: {0}")]
    Config(#[from] serde_yaml::Error),
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Judge(#[from] gavel_core::Error),
}
