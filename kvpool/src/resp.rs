//! # RESP2 Wire Format
//!
//! Purpose: Encode commands and read replies over a buffered async stream.
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: Replies are parsed top-down with minimal state.
//! 2. **Buffer Reuse**: The caller provides the line buffer, so steady-state
//!    reads allocate only for reply payloads.
//! 3. **Binary-Safe**: Bulk strings are raw bytes end to end.
//! 4. **Fail Fast**: Invalid framing surfaces a protocol error immediately.

use std::future::Future;
use std::io;
use std::pin::Pin;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::{PoolError, PoolResult};

/// A single RESP2 reply value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `+OK` style simple strings.
    Simple(Vec<u8>),
    /// `-ERR ...` replies.
    Error(Vec<u8>),
    /// `:123` integers.
    Integer(i64),
    /// `$...` bulk strings, `None` for the null bulk.
    Bulk(Option<Vec<u8>>),
    /// `*...` arrays, `None` for the null array.
    Array(Option<Vec<Value>>),
}

/// Encodes one command as a RESP2 array of bulk strings.
pub(crate) fn encode_command(args: &[&[u8]], out: &mut Vec<u8>) {
    out.push(b'*');
    out.extend_from_slice(args.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    for arg in args {
        out.push(b'$');
        out.extend_from_slice(arg.len().to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

/// Reads one reply value from the buffered stream.
pub(crate) async fn read_value<R>(reader: &mut R, line: &mut Vec<u8>) -> PoolResult<Value>
where
    R: AsyncBufRead + Unpin + Send,
{
    read_line(reader, line).await?;
    if line.is_empty() {
        return Err(PoolError::Protocol);
    }

    match line[0] {
        b'+' => Ok(Value::Simple(line[1..].to_vec())),
        b'-' => Ok(Value::Error(line[1..].to_vec())),
        b':' => Ok(Value::Integer(parse_i64(&line[1..])?)),
        b'$' => {
            let len = parse_i64(&line[1..])?;
            read_bulk(reader, len).await
        }
        b'*' => {
            let len = parse_i64(&line[1..])?;
            read_array(reader, line, len).await
        }
        _ => Err(PoolError::Protocol),
    }
}

async fn read_bulk<R>(reader: &mut R, len: i64) -> PoolResult<Value>
where
    R: AsyncBufRead + Unpin + Send,
{
    if len < 0 {
        return Ok(Value::Bulk(None));
    }

    let mut data = vec![0u8; len as usize];
    reader.read_exact(&mut data).await?;

    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf).await?;
    if crlf != *b"\r\n" {
        return Err(PoolError::Protocol);
    }
    Ok(Value::Bulk(Some(data)))
}

async fn read_array<R>(reader: &mut R, line: &mut Vec<u8>, len: i64) -> PoolResult<Value>
where
    R: AsyncBufRead + Unpin + Send,
{
    if len < 0 {
        return Ok(Value::Array(None));
    }

    let mut items = Vec::with_capacity(len as usize);
    for _ in 0..len {
        items.push(read_value_boxed(reader, line).await?);
    }
    Ok(Value::Array(Some(items)))
}

// Arrays nest, so the recursive read goes through a boxed future.
fn read_value_boxed<'a, R>(
    reader: &'a mut R,
    line: &'a mut Vec<u8>,
) -> Pin<Box<dyn Future<Output = PoolResult<Value>> + Send + 'a>>
where
    R: AsyncBufRead + Unpin + Send,
{
    Box::pin(read_value(reader, line))
}

async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> PoolResult<()>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let bytes = reader.read_until(b'\n', buf).await?;
    if bytes == 0 {
        // Peer closed the stream mid-conversation.
        return Err(PoolError::Connection(io::ErrorKind::UnexpectedEof.into()));
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(PoolError::Protocol);
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_i64(data: &[u8]) -> PoolResult<i64> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(PoolError::Protocol)
}
