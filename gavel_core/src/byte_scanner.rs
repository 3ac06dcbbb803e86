use std::io::{self, BufRead};

/// Byte-level cursor over a buffered stream. Only the reader's buffer is held
/// in memory, so arbitrarily large outputs can be scanned.
#[derive(Debug)]
pub struct ByteScanner<R> {
    reader: R,
}

impl<R: BufRead> ByteScanner<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn peek(&mut self) -> io::Result<Option<u8>> {
        Ok(self.reader.fill_buf()?.first().copied())
    }

    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let res = self.peek()?;
        if res.is_some() {
            self.reader.consume(1);
        }
        Ok(res)
    }

    /// Consume a run of consecutive `byte`s and return its length. Stops at
    /// the first other byte, which is left unread.
    pub fn read_run(&mut self, byte: u8) -> io::Result<u64> {
        let mut count = 0;
        loop {
            let buf = self.reader.fill_buf()?;
            let available = buf.len();
            let run = buf.iter().take_while(|&&b| b == byte).count();
            self.reader.consume(run);
            count += run as u64;

            // the run continues only if it ate the whole (non-empty) buffer
            if run == 0 || run < available {
                return Ok(count);
            }
        }
    }

    pub fn expect_byte(&mut self, test: u8) -> io::Result<bool> {
        Ok(self.read_byte()? == Some(test))
    }

    pub fn expect_eof(&mut self) -> io::Result<bool> {
        Ok(self.peek()?.is_none())
    }
}
