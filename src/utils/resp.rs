//! RESP (Redis Serialization Protocol) encoder and decoder
//!
//! Disque speaks RESP2. Commands are encoded into a reusable buffer and
//! replies are decoded from any tokio `AsyncBufRead`.

use std::io;

use futures::future::{BoxFuture, FutureExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// RESP value types
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple string (+OK\r\n)
    SimpleString(String),
    /// Error (-ERR message\r\n)
    Error(String),
    /// Integer (:1000\r\n)
    Integer(i64),
    /// Bulk string ($6\r\nfoobar\r\n)
    BulkString(Vec<u8>),
    /// Null bulk string ($-1\r\n)
    Null,
    /// Array (*2\r\n...)
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Check if this is an error response
    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Get as string (for simple string or bulk string)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Get as integer, accepting numeric strings as well
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RespValue::Integer(i) => Some(*i),
            other => other.as_str().and_then(|s| s.trim().parse().ok()),
        }
    }

    /// Get as array
    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Short type name, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            RespValue::SimpleString(_) => "simple string",
            RespValue::Error(_) => "error",
            RespValue::Integer(_) => "integer",
            RespValue::BulkString(_) => "bulk string",
            RespValue::Null => "null",
            RespValue::Array(_) => "array",
        }
    }
}

/// RESP encoder with pre-allocated buffer
pub struct RespEncoder {
    buf: Vec<u8>,
}

impl RespEncoder {
    /// Create new encoder with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Clear buffer for reuse
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Get encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Encode a command as RESP array
    /// Each argument is encoded as a bulk string
    pub fn encode_command(&mut self, args: &[&[u8]]) {
        // Array header: *<count>\r\n
        self.buf.push(b'*');
        self.write_int(args.len() as i64);
        self.buf.extend_from_slice(b"\r\n");

        // Each argument as bulk string: $<len>\r\n<data>\r\n
        for arg in args {
            self.buf.push(b'$');
            self.write_int(arg.len() as i64);
            self.buf.extend_from_slice(b"\r\n");
            self.buf.extend_from_slice(arg);
            self.buf.extend_from_slice(b"\r\n");
        }
    }

    /// Encode a command from string slices
    pub fn encode_command_str(&mut self, args: &[&str]) {
        let byte_args: Vec<&[u8]> = args.iter().map(|s| s.as_bytes()).collect();
        self.encode_command(&byte_args);
    }

    /// Encode a named command followed by its arguments.
    ///
    /// Multi-word names ("CLUSTER NODES") are split into separate tokens.
    pub fn encode_named(&mut self, name: &str, args: &[String]) {
        let mut parts: Vec<&str> = name.split_whitespace().collect();
        parts.extend(args.iter().map(String::as_str));
        self.encode_command_str(&parts);
    }

    /// Write integer using fast itoa
    #[inline]
    fn write_int(&mut self, value: i64) {
        let mut buffer = itoa::Buffer::new();
        let s = buffer.format(value);
        self.buf.extend_from_slice(s.as_bytes());
    }
}

/// Largest bulk string accepted from a server (Redis `proto-max-bulk-len`)
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Array elements preallocated up front; longer arrays grow as they decode
const MAX_ARRAY_PREALLOC: usize = 1024;

/// RESP decoder for streaming reads
pub struct RespDecoder<R> {
    reader: R,
    line_buf: String,
}

impl<R> RespDecoder<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_buf: String::with_capacity(256),
        }
    }

    /// Access the underlying reader
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Decode next RESP value from stream
    ///
    /// Boxed because arrays decode their elements recursively.
    pub fn decode(&mut self) -> BoxFuture<'_, io::Result<RespValue>> {
        async move {
            // Read type byte
            self.line_buf.clear();
            self.reader.read_line(&mut self.line_buf).await?;

            if self.line_buf.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Connection closed",
                ));
            }

            let line = self.line_buf.trim_end_matches(&['\r', '\n'][..]);
            if line.is_empty() {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "Empty RESP line"));
            }

            let type_byte = line.as_bytes()[0];
            if !type_byte.is_ascii() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Invalid RESP type byte: 0x{:02x}", type_byte),
                ));
            }
            let content = line[1..].to_string();

            match type_byte {
                b'+' => Ok(RespValue::SimpleString(content)),
                b'-' => Ok(RespValue::Error(content)),
                b':' => {
                    let value: i64 = content.parse().map_err(|_| {
                        io::Error::new(io::ErrorKind::InvalidData, "Invalid integer")
                    })?;
                    Ok(RespValue::Integer(value))
                }
                b'$' => {
                    let len: i64 = content.parse().map_err(|_| {
                        io::Error::new(io::ErrorKind::InvalidData, "Invalid bulk string length")
                    })?;

                    if len < 0 {
                        return Ok(RespValue::Null);
                    }
                    if len > MAX_BULK_LEN {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("Bulk string length {} exceeds limit", len),
                        ));
                    }

                    let mut data = vec![0u8; len as usize];
                    self.reader.read_exact(&mut data).await?;

                    // Read trailing \r\n
                    let mut crlf = [0u8; 2];
                    self.reader.read_exact(&mut crlf).await?;

                    Ok(RespValue::BulkString(data))
                }
                b'*' => {
                    let count: i64 = content.parse().map_err(|_| {
                        io::Error::new(io::ErrorKind::InvalidData, "Invalid array length")
                    })?;

                    if count < 0 {
                        return Ok(RespValue::Null);
                    }

                    let mut elements =
                        Vec::with_capacity((count as usize).min(MAX_ARRAY_PREALLOC));
                    for _ in 0..count {
                        elements.push(self.decode().await?);
                    }

                    Ok(RespValue::Array(elements))
                }
                _ => Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Invalid RESP type byte: {}", type_byte as char),
                )),
            }
        }
        .boxed()
    }
}
