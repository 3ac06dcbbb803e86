//! Output comparison.
//!
//! A comparator decides whether the output of a submission is equivalent to
//! the expected answer. Comparators are looked up by the name a problem
//! declares in its descriptor, so new ones can be registered without touching
//! the judging code.

use std::{
    collections::HashMap,
    fmt,
    io::{self, BufRead, BufReader, Read},
    sync::Arc,
};

use crate::{
    byte_scanner::ByteScanner,
    error::{Error, Result},
};

pub const IDENTICAL: &str = "identical";
pub const STANDARD: &str = "standard";

pub trait Comparator: Send + Sync {
    fn compare(&self, actual: &mut dyn Read, expected: &mut dyn Read) -> io::Result<bool>;
}

impl<F> Comparator for F
where
    F: Fn(&mut dyn Read, &mut dyn Read) -> io::Result<bool> + Send + Sync,
{
    fn compare(&self, actual: &mut dyn Read, expected: &mut dyn Read) -> io::Result<bool> {
        self(actual, expected)
    }
}

/// Byte-for-byte equality.
pub struct IdenticalCompare;

impl Comparator for IdenticalCompare {
    fn compare(&self, actual: &mut dyn Read, expected: &mut dyn Read) -> io::Result<bool> {
        let mut actual = BufReader::new(actual);
        let mut expected = BufReader::new(expected);

        loop {
            let a = actual.fill_buf()?;
            let b = expected.fill_buf()?;
            if a.is_empty() || b.is_empty() {
                return Ok(a.is_empty() && b.is_empty());
            }

            let len = a.len().min(b.len());
            if a[..len] != b[..len] {
                return Ok(false);
            }
            actual.consume(len);
            expected.consume(len);
        }
    }
}

/// Whitespace-tolerant equality.
///
/// Spaces and tabs before a line feed are ignored, as is any whitespace at the
/// very end of the stream. Every other whitespace byte has to match exactly.
/// `\r` is not whitespace here.
pub struct StandardCompare;

impl Comparator for StandardCompare {
    fn compare(&self, actual: &mut dyn Read, expected: &mut dyn Read) -> io::Result<bool> {
        let mut actual = ByteScanner::new(BufReader::new(actual));
        let mut expected = ByteScanner::new(BufReader::new(expected));

        loop {
            match (actual.peek()?, expected.peek()?) {
                (None, None) => return Ok(true),
                (Some(a), Some(b)) if !is_space(a) && !is_space(b) => {
                    if a != b {
                        return Ok(false);
                    }
                    actual.read_byte()?;
                    expected.read_byte()?;
                }
                _ => {
                    if !same_gap(&mut actual, &mut expected)? {
                        return Ok(false);
                    }
                }
            }
        }
    }
}

fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n')
}

/// One side of a whitespace gap: the line feeds read so far and the unread
/// part of the blank run under the cursor.
struct GapSide<'a, R> {
    scanner: &'a mut ByteScanner<R>,
    newlines: u64,
    blank: Option<(u8, u64)>,
}

impl<'a, R: BufRead> GapSide<'a, R> {
    fn new(scanner: &'a mut ByteScanner<R>) -> Self {
        Self {
            scanner,
            newlines: 0,
            blank: None,
        }
    }

    fn blank(&mut self) -> io::Result<Option<(u8, u64)>> {
        if self.blank.is_none() {
            if let Some(byte @ (b' ' | b'\t')) = self.scanner.peek()? {
                self.blank = Some((byte, self.scanner.read_run(byte)?));
            }
        }
        Ok(self.blank)
    }

    fn take(&mut self, len: u64) {
        if let Some((byte, run)) = self.blank {
            self.blank = (run > len).then(|| (byte, run - len));
        }
    }

    /// Drop the blanks of the current line and read the line feeds ending
    /// it. False if the gap ends here instead.
    fn next_line(&mut self) -> io::Result<bool> {
        self.blank = None;
        while let Some(byte @ (b' ' | b'\t')) = self.scanner.peek()? {
            self.scanner.read_run(byte)?;
        }
        if self.scanner.peek()? != Some(b'\n') {
            return Ok(false);
        }
        self.newlines += self.scanner.read_run(b'\n')?;
        Ok(true)
    }

    fn at_eof(&mut self) -> io::Result<bool> {
        Ok(self.blank.is_none() && self.scanner.expect_eof()?)
    }

    /// Whether only whitespace is left in the stream.
    fn rest_is_space(&mut self) -> io::Result<bool> {
        self.blank = None;
        while let Some(byte) = self.scanner.peek()? {
            if !is_space(byte) {
                return Ok(false);
            }
            self.scanner.read_run(byte)?;
        }
        Ok(true)
    }
}

/// Both sides ended a gap but only `done` ended it for good. They are still
/// equal if that was the end of the stream and the rest of `other` is
/// trailing whitespace.
fn trailing<A: BufRead, B: BufRead>(
    done: &mut GapSide<'_, A>,
    other: &mut GapSide<'_, B>,
) -> io::Result<bool> {
    Ok(done.at_eof()? && other.rest_is_space()?)
}

/// Consume the whitespace gaps both scanners are at and tell whether they
/// are equal. Two gaps are equal when they hold as many line feeds and the
/// same blanks after the last of them. A gap running into the end of the
/// stream is ignored.
///
/// The gaps are walked in lockstep, a blank run at a time, so memory use does
/// not depend on their length.
fn same_gap<A: BufRead, B: BufRead>(
    actual: &mut ByteScanner<A>,
    expected: &mut ByteScanner<B>,
) -> io::Result<bool> {
    let mut actual = GapSide::new(actual);
    let mut expected = GapSide::new(expected);

    loop {
        // the side with fewer line feeds has to reach another one
        if actual.newlines < expected.newlines {
            if !actual.next_line()? {
                return trailing(&mut actual, &mut expected);
            }
            continue;
        }
        if expected.newlines < actual.newlines {
            if !expected.next_line()? {
                return trailing(&mut expected, &mut actual);
            }
            continue;
        }

        let mut diverged = false;
        loop {
            match (actual.blank()?, expected.blank()?) {
                (Some((a, m)), Some((b, n))) if a == b => {
                    let len = m.min(n);
                    actual.take(len);
                    expected.take(len);
                }
                (None, None) => break,
                _ => {
                    diverged = true;
                    break;
                }
            }
        }

        match (actual.next_line()?, expected.next_line()?) {
            (true, true) => {}
            (true, false) => return trailing(&mut expected, &mut actual),
            (false, true) => return trailing(&mut actual, &mut expected),
            (false, false) => {
                let actual_eof = actual.at_eof()?;
                let expected_eof = expected.at_eof()?;
                if actual_eof || expected_eof {
                    return Ok(actual_eof && expected_eof);
                }
                return Ok(!diverged);
            }
        }
    }
}

/// Named comparators, built once at start-up and shared read-only.
#[derive(Clone, Default)]
pub struct Comparators {
    map: HashMap<String, Arc<dyn Comparator>>,
}

impl Comparators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `identical` and `standard`.
    pub fn with_builtins() -> Self {
        let mut comparators = Self::new();
        comparators
            .register(IDENTICAL, IdenticalCompare)
            .register(STANDARD, StandardCompare);
        comparators
    }

    pub fn register<C>(&mut self, name: &str, comparator: C) -> &mut Self
    where
        C: Comparator + 'static,
    {
        self.map.insert(name.to_string(), Arc::new(comparator));
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Comparator>> {
        self.map
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownComparator(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.map.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Comparators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Comparators")
            .field("names", &self.names())
            .finish()
    }
}
