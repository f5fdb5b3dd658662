//! Length-prefixed framing between the node and VM workers.
//!
//! ```text
//! frame   = u32_le len || payload
//! payload = u32_le n || (u32_le len || bytes) * n
//! ```

use bytes::{Buf, BufMut, BytesMut};
use std::io::{self, ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Instant;
use thiserror::Error;

/// Upper bound on a single frame.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("contract timeout during vm execution")]
    Timeout,

    #[error("connection closed by vm")]
    Closed,

    #[error("vm connection error: {0}")]
    Io(String),

    #[error("malformed message: {0}")]
    Malformed(String),
}

impl From<io::Error> for WireError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => WireError::Timeout,
            ErrorKind::UnexpectedEof => WireError::Closed,
            _ => WireError::Io(e.to_string()),
        }
    }
}

/// Serializes a list of byte strings.
pub fn encode_list<T: AsRef<[u8]>>(items: &[T]) -> BytesMut {
    let size = 4 + items.iter().map(|i| 4 + i.as_ref().len()).sum::<usize>();
    let mut buf = BytesMut::with_capacity(size);
    buf.put_u32_le(items.len() as u32);
    for item in items {
        let item = item.as_ref();
        buf.put_u32_le(item.len() as u32);
        buf.put_slice(item);
    }
    buf
}

pub fn decode_list(payload: &[u8]) -> Result<Vec<Vec<u8>>, WireError> {
    let mut buf = payload;
    if buf.remaining() < 4 {
        return Err(WireError::Malformed("missing item count".into()));
    }
    let count = buf.get_u32_le() as usize;
    // every item carries at least its length prefix
    if count > buf.remaining() / 4 {
        return Err(WireError::Malformed(format!("invalid item count {}", count)));
    }
    let mut items = Vec::with_capacity(count);
    for i in 0..count {
        if buf.remaining() < 4 {
            return Err(WireError::Malformed(format!("truncated length of item {}", i)));
        }
        let len = buf.get_u32_le() as usize;
        if buf.remaining() < len {
            return Err(WireError::Malformed(format!("truncated item {}", i)));
        }
        items.push(buf[..len].to_vec());
        buf.advance(len);
    }
    if buf.has_remaining() {
        return Err(WireError::Malformed("trailing bytes".into()));
    }
    Ok(items)
}

/// Decodes a list whose items must be UTF-8 text.
pub fn decode_strings(payload: &[u8]) -> Result<Vec<String>, WireError> {
    decode_list(payload)?
        .into_iter()
        .map(|item| String::from_utf8(item).map_err(|e| WireError::Malformed(e.to_string())))
        .collect()
}

pub fn write_frame(mut stream: &UnixStream, payload: &[u8]) -> Result<(), WireError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(WireError::Malformed(format!("frame too large: {}", payload.len())));
    }
    let mut frame = BytesMut::with_capacity(4 + payload.len());
    frame.put_u32_le(payload.len() as u32);
    frame.put_slice(payload);
    stream.write_all(&frame)?;
    Ok(())
}

/// Reads one frame, failing with [`WireError::Timeout`] once `deadline`
/// passes. A stream closed before the length prefix is [`WireError::Closed`].
pub fn read_frame(stream: &UnixStream, deadline: Option<Instant>) -> Result<Vec<u8>, WireError> {
    let mut header = [0u8; 4];
    read_exact_until(stream, &mut header, deadline)?;
    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(WireError::Malformed(format!("frame too large: {}", len)));
    }
    let mut payload = vec![0u8; len];
    read_exact_until(stream, &mut payload, deadline)?;
    Ok(payload)
}

fn read_exact_until(
    mut stream: &UnixStream,
    buf: &mut [u8],
    deadline: Option<Instant>,
) -> Result<(), WireError> {
    let mut filled = 0;
    while filled < buf.len() {
        let timeout = match deadline {
            Some(d) => {
                let left = d.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return Err(WireError::Timeout);
                }
                Some(left)
            }
            None => None,
        };
        stream.set_read_timeout(timeout)?;
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return Err(WireError::Closed),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

pub fn send_message<T: AsRef<[u8]>>(stream: &UnixStream, items: &[T]) -> Result<(), WireError> {
    write_frame(stream, &encode_list(items))
}

pub fn read_message(stream: &UnixStream, deadline: Option<Instant>) -> Result<Vec<Vec<u8>>, WireError> {
    decode_list(&read_frame(stream, deadline)?)
}
