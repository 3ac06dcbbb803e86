//! The session wire protocol.
//!
//! Every message is a JSON object preceded by its length as a 4-byte
//! big-endian integer. A client sends one request per connection; the server
//! answers a submission with `judging-begin`, one message per judge event and
//! `judging-end`.

use std::io;

use bytes::{Bytes, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    error::Result,
    judge::{Event, Submission},
};

/// Maximum frame size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Read a length-delimited frame. A connection closed before the length
/// prefix yields `None`.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<Bytes>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {} bytes", len),
        ));
    }

    let mut buf = BytesMut::with_capacity(len);
    buf.resize(len, 0);
    reader.read_exact(&mut buf).await?;

    Ok(Some(buf.freeze()))
}

/// Write a length-delimited frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame too large: {} bytes", data.len()),
        ));
    }

    let len = data.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;

    Ok(())
}

/// Read one JSON message. End of stream and empty frames yield `None`.
pub async fn read_message<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match read_frame(reader).await? {
        Some(frame) if !frame.is_empty() => Ok(Some(serde_json::from_slice(&frame)?)),
        _ => Ok(None),
    }
}

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = serde_json::to_vec(message)?;
    write_frame(writer, &data).await?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "header")]
pub enum Request {
    #[serde(rename = "submit")]
    Submit(SubmitRequest),
    /// Any header this server does not know.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SubmitRequest {
    pub access_token: String,
    pub id: u64,
    pub problem_code: String,
    pub language: String,
    pub source: String,
    /// Milliseconds.
    pub time_limit: u64,
    /// KiB.
    pub memory_limit: u64,
}

impl SubmitRequest {
    pub fn into_submission(self) -> Submission {
        Submission {
            id: self.id,
            problem_code: self.problem_code,
            language: self.language,
            source: self.source.into_bytes(),
            time_limit_ms: self.time_limit,
            memory_limit_kb: self.memory_limit,
        }
    }
}

/// A server message: a header plus the fields of its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub header: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Response {
    pub const JUDGING_BEGIN: &'static str = "judging-begin";
    pub const JUDGING_END: &'static str = "judging-end";

    pub fn new(header: &str) -> Self {
        Self {
            header: header.to_string(),
            payload: Map::new(),
        }
    }

    pub fn judging_begin() -> Self {
        Self::new(Self::JUDGING_BEGIN)
    }

    pub fn judging_end() -> Self {
        Self::new(Self::JUDGING_END)
    }

    pub fn is_judging_end(&self) -> bool {
        self.header == Self::JUDGING_END
    }
}

impl From<&Event> for Response {
    fn from(event: &Event) -> Self {
        Self {
            header: event.kind().to_string(),
            payload: event.payload(),
        }
    }
}
