pub mod byte_scanner;
pub mod compare;
pub mod error;
pub mod judge;
pub mod lang;
pub mod problem;
pub mod protocol;
pub mod runner;
pub mod sandbox;
pub mod verdict;

pub use error::{Error, Result};
pub use judge::{Event, Judge, JudgeEvents, Submission};
