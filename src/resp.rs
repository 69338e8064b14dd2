//! Redis Serialization Protocol (RESP2) encoding and decoding.
//!
//! Values are decoded incrementally out of a `BytesMut` read buffer: a frame is
//! only consumed once it is complete, so callers can keep reading from the
//! socket into the same buffer until `decode` yields a value.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

/// Largest bulk string a server will send (Redis' `proto-max-bulk-len`).
pub const MAX_BULK_LENGTH: usize = 512 * 1024 * 1024;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RespError {
    #[error("invalid UTF-8 sequence")]
    InvalidUtf8,
    #[error("unknown RESP type")]
    UnknownRespType,
    #[error("failed to parse integer")]
    FailedToParseInteger,
    #[error("invalid bulk string")]
    InvalidBulkString,
    #[error("invalid array")]
    InvalidArray,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Array(Vec<RespValue>),
    Null,
}

impl RespValue {
    /// Builds a bulk string from anything that can be turned into bytes.
    pub fn bulk<B: Into<Bytes>>(data: B) -> Self {
        RespValue::BulkString(data.into())
    }

    /// Textual view of simple and bulk strings. Returns `None` for every other
    /// type and for bulk strings that are not valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s.as_str()),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RespValue::SimpleString(_) => "simple string",
            RespValue::Error(_) => "error",
            RespValue::Integer(_) => "integer",
            RespValue::BulkString(_) => "bulk string",
            RespValue::Array(_) => "array",
            RespValue::Null => "nil",
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    /// Lossy textual form of `encode`, handy for logging and error lines.
    pub fn encode_string(&self) -> String {
        String::from_utf8_lossy(&self.encode()).into_owned()
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => {
                out.extend_from_slice(format!("+{}\r\n", s).as_bytes());
            }
            RespValue::Error(e) => {
                out.extend_from_slice(format!("-{}\r\n", e).as_bytes());
            }
            RespValue::Integer(i) => {
                out.extend_from_slice(format!(":{}\r\n", i).as_bytes());
            }
            RespValue::BulkString(b) => {
                out.extend_from_slice(format!("${}\r\n", b.len()).as_bytes());
                out.extend_from_slice(b);
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Array(elements) => {
                out.extend_from_slice(format!("*{}\r\n", elements.len()).as_bytes());
                for element in elements {
                    element.encode_into(out);
                }
            }
            RespValue::Null => out.extend_from_slice(b"$-1\r\n"),
        }
    }

    /// Decodes one complete frame from the front of `bytes`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(value))` - A frame was decoded and removed from the buffer
    /// * `Ok(None)` - The buffer does not hold a complete frame yet; nothing was consumed
    /// * `Err(RespError)` - The buffer holds bytes that are not valid RESP
    pub fn decode(bytes: &mut BytesMut) -> Result<Option<RespValue>, RespError> {
        match Self::parse_frame(bytes, 0)? {
            Some((value, consumed)) => {
                bytes.advance(consumed);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Decodes every complete frame currently held in `bytes`.
    pub fn parse(bytes: &mut BytesMut) -> Result<Vec<RespValue>, RespError> {
        let mut vec = Vec::new();

        while let Some(value) = Self::decode(bytes)? {
            vec.push(value);
        }

        Ok(vec)
    }

    fn parse_frame(bytes: &[u8], start: usize) -> Result<Option<(RespValue, usize)>, RespError> {
        let Some((line, next)) = Self::parse_line(bytes, start) else {
            return Ok(None);
        };

        let Some((&prefix, rest)) = line.split_first() else {
            return Err(RespError::UnknownRespType);
        };

        match prefix {
            b'+' => {
                let content = std::str::from_utf8(rest).map_err(|_| RespError::InvalidUtf8)?;
                Ok(Some((RespValue::SimpleString(content.to_string()), next)))
            }
            b'-' => {
                let content = std::str::from_utf8(rest).map_err(|_| RespError::InvalidUtf8)?;
                Ok(Some((RespValue::Error(content.to_string()), next)))
            }
            b':' => {
                let value = Self::parse_integer(rest)?;
                Ok(Some((RespValue::Integer(value), next)))
            }
            b'$' => {
                let length = Self::parse_integer(rest).map_err(|_| RespError::InvalidBulkString)?;

                if length == -1 {
                    return Ok(Some((RespValue::Null, next)));
                }

                let length = usize::try_from(length)
                    .ok()
                    .filter(|length| *length <= MAX_BULK_LENGTH)
                    .ok_or(RespError::InvalidBulkString)?;
                let end = next + length;

                if bytes.len() < end + 2 {
                    return Ok(None);
                }

                if &bytes[end..end + 2] != b"\r\n" {
                    return Err(RespError::InvalidBulkString);
                }

                let data = Bytes::copy_from_slice(&bytes[next..end]);
                Ok(Some((RespValue::BulkString(data), end + 2)))
            }
            b'*' => {
                let length = Self::parse_integer(rest).map_err(|_| RespError::InvalidArray)?;

                if length == -1 {
                    return Ok(Some((RespValue::Null, next)));
                }

                let length = usize::try_from(length).map_err(|_| RespError::InvalidArray)?;
                // Every element takes at least one buffered byte.
                let mut array_elements: Vec<RespValue> =
                    Vec::with_capacity(length.min(bytes.len().saturating_sub(next)));
                let mut cursor = next;

                while array_elements.len() < length {
                    match Self::parse_frame(bytes, cursor)? {
                        Some((element, after)) => {
                            array_elements.push(element);
                            cursor = after;
                        }
                        None => return Ok(None),
                    }
                }

                Ok(Some((RespValue::Array(array_elements), cursor)))
            }
            _ => Err(RespError::UnknownRespType),
        }
    }

    /// Returns the line starting at `start` (without its `\r\n`) and the offset
    /// right after the terminator.
    fn parse_line(bytes: &[u8], start: usize) -> Option<(&[u8], usize)> {
        let remaining = bytes.get(start..)?;
        let pos = remaining.windows(2).position(|window| window == b"\r\n")?;

        Some((&remaining[..pos], start + pos + 2))
    }

    fn parse_integer(digits: &[u8]) -> Result<i64, RespError> {
        std::str::from_utf8(digits)
            .map_err(|_| RespError::InvalidUtf8)?
            .parse::<i64>()
            .map_err(|_| RespError::FailedToParseInteger)
    }
}

impl From<&str> for RespValue {
    fn from(value: &str) -> Self {
        RespValue::BulkString(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<String> for RespValue {
    fn from(value: String) -> Self {
        RespValue::BulkString(Bytes::from(value))
    }
}

impl From<i64> for RespValue {
    fn from(value: i64) -> Self {
        RespValue::Integer(value)
    }
}

impl From<Vec<RespValue>> for RespValue {
    fn from(value: Vec<RespValue>) -> Self {
        RespValue::Array(value)
    }
}
