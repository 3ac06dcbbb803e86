use std::{
    fs::{self, File},
    io::{self, Read},
    path::{Component, Path, PathBuf},
};

use log::debug;
use serde::{Deserialize, Serialize};
use zip::{result::ZipError, ZipArchive};

use crate::{
    compare::STANDARD,
    error::{Error, Result},
};

/// Name of the descriptor inside each problem directory.
pub const DESCRIPTOR: &str = "config.yml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// 1-based position; cases run in this order.
    pub ordinal: usize,
    /// Name of the input file inside the archive.
    pub input: String,
    /// Name of the expected output file inside the archive.
    pub output: String,
    pub time_limit_ms: u64,
    pub memory_limit_kb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseConfig {
    #[serde(rename = "in")]
    pub input: String,
    #[serde(rename = "out")]
    pub output: String,
}

/// The per-problem descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemConfig {
    pub archive: String,
    #[serde(default = "default_checker")]
    pub checker: String,
    pub cases: Vec<CaseConfig>,
}

fn default_checker() -> String {
    STANDARD.to_string()
}

impl ProblemConfig {
    pub fn from_string(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotFound(path.display().to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        Self::from_string(&content)
    }
}

#[derive(Debug, Clone)]
pub struct Problem {
    pub code: String,
    pub time_limit_ms: u64,
    pub memory_limit_kb: u64,
    /// Zip file or directory holding the case files.
    pub archive: PathBuf,
    pub comparator: String,
    pub cases: Vec<TestCase>,
}

impl Problem {
    /// Build a problem out of its descriptor. Relative archive names are
    /// resolved against `dir`; every case inherits the submission limits.
    pub fn from_config(
        code: &str,
        dir: &Path,
        config: ProblemConfig,
        time_limit_ms: u64,
        memory_limit_kb: u64,
    ) -> Self {
        let cases = config
            .cases
            .into_iter()
            .enumerate()
            .map(|(index, case)| TestCase {
                ordinal: index + 1,
                input: case.input,
                output: case.output,
                time_limit_ms,
                memory_limit_kb,
            })
            .collect();

        Self {
            code: code.to_string(),
            time_limit_ms,
            memory_limit_kb,
            archive: dir.join(config.archive),
            comparator: config.checker,
            cases,
        }
    }

    pub fn open_archive(&self) -> Result<Box<dyn CaseArchive>> {
        if self.archive.is_dir() {
            return Ok(Box::new(DirArchive::new(&self.archive)));
        }
        let file = match File::open(&self.archive) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotFound(self.archive.display().to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Box::new(ZipCaseArchive::new(file)?))
    }

    /// List the case files named by the descriptor but absent from the
    /// archive.
    pub fn verify(&self) -> Result<Vec<String>> {
        let mut archive = self.open_archive()?;
        let mut missing = Vec::new();
        for case in &self.cases {
            for name in [&case.input, &case.output] {
                if !archive.contains(name) {
                    missing.push(format!("case {}: missing `{}`", case.ordinal, name));
                }
            }
        }
        Ok(missing)
    }
}

/// Read access to the raw case files of a problem.
pub trait CaseArchive: Send {
    fn open(&mut self, name: &str) -> Result<Box<dyn Read + '_>>;

    fn contains(&mut self, name: &str) -> bool;

    /// Copy the file `name` to `dest`.
    fn extract(&mut self, name: &str, dest: &Path) -> Result<()> {
        let mut src = self.open(name)?;
        let mut dst = File::create(dest)?;
        io::copy(&mut src, &mut dst)?;
        Ok(())
    }
}

pub struct ZipCaseArchive {
    zip: ZipArchive<File>,
}

impl ZipCaseArchive {
    pub fn new(file: File) -> Result<Self> {
        Ok(Self {
            zip: ZipArchive::new(file)?,
        })
    }
}

impl CaseArchive for ZipCaseArchive {
    fn open(&mut self, name: &str) -> Result<Box<dyn Read + '_>> {
        match self.zip.by_name(name) {
            Ok(entry) => Ok(Box::new(entry)),
            Err(ZipError::FileNotFound) => Err(Error::NotFound(name.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    fn contains(&mut self, name: &str) -> bool {
        self.zip.file_names().any(|entry| entry == name)
    }
}

/// Case files stored unpacked in a directory.
pub struct DirArchive {
    root: PathBuf,
}

impl DirArchive {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(Error::Data(format!("case file `{}` escapes the archive", name)));
        }
        Ok(self.root.join(relative))
    }
}

impl CaseArchive for DirArchive {
    fn open(&mut self, name: &str) -> Result<Box<dyn Read + '_>> {
        match File::open(self.resolve(name)?) {
            Ok(file) => Ok(Box::new(file)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(Error::NotFound(name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn contains(&mut self, name: &str) -> bool {
        self.resolve(name).map(|p| p.is_file()).unwrap_or(false)
    }
}

/// Source of problems for the judge.
pub trait ProblemLoader: Send + Sync {
    fn load(&self, code: &str, time_limit_ms: u64, memory_limit_kb: u64) -> Result<Problem>;
}

/// Loads `<root>/<code>/config.yml`.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ProblemLoader for DirectoryLoader {
    fn load(&self, code: &str, time_limit_ms: u64, memory_limit_kb: u64) -> Result<Problem> {
        let mut components = Path::new(code).components();
        if !matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        ) {
            return Err(Error::NotFound(format!("problem `{}`", code)));
        }

        let dir = self.root.join(code);
        let config = ProblemConfig::from_file(&dir.join(DESCRIPTOR))?;
        debug!("loaded problem {} with {} cases", code, config.cases.len());
        Ok(Problem::from_config(
            code,
            &dir,
            config,
            time_limit_ms,
            memory_limit_kb,
        ))
    }
}
