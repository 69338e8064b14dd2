//! Coercion of untyped replies into the types the façade hands back.

use crate::{
    error::{RedisError, RedisResult},
    resp::RespValue,
};

pub trait FromReply: Sized {
    fn from_reply(reply: RespValue) -> RedisResult<Self>;
}

/// Converts a reply, turning an error reply into `RedisError::Server` first.
pub fn from_reply<T: FromReply>(reply: RespValue) -> RedisResult<T> {
    match reply {
        RespValue::Error(msg) => Err(RedisError::Server(msg)),
        reply => T::from_reply(reply),
    }
}

fn unexpected(expected: &str, reply: &RespValue) -> RedisError {
    RedisError::UnexpectedReply(format!(
        "cannot convert {} to {}",
        reply.type_name(),
        expected
    ))
}

impl FromReply for RespValue {
    fn from_reply(reply: RespValue) -> RedisResult<Self> {
        Ok(reply)
    }
}

impl FromReply for () {
    fn from_reply(_reply: RespValue) -> RedisResult<Self> {
        Ok(())
    }
}

impl FromReply for i64 {
    fn from_reply(reply: RespValue) -> RedisResult<Self> {
        match reply {
            RespValue::Integer(i) => Ok(i),
            RespValue::Null => Err(RedisError::Nil),
            ref text @ (RespValue::BulkString(_) | RespValue::SimpleString(_)) => text
                .as_str()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| unexpected("integer", text)),
            other => Err(unexpected("integer", &other)),
        }
    }
}

impl FromReply for bool {
    fn from_reply(reply: RespValue) -> RedisResult<Self> {
        match reply {
            RespValue::Integer(i) => Ok(i != 0),
            RespValue::Null => Err(RedisError::Nil),
            ref text @ (RespValue::BulkString(_) | RespValue::SimpleString(_)) => {
                match text.as_str() {
                    Some("1") | Some("true") => Ok(true),
                    Some("0") | Some("false") => Ok(false),
                    _ => Err(unexpected("bool", text)),
                }
            }
            other => Err(unexpected("bool", &other)),
        }
    }
}

impl FromReply for String {
    fn from_reply(reply: RespValue) -> RedisResult<Self> {
        match reply {
            RespValue::SimpleString(s) => Ok(s),
            RespValue::BulkString(b) => {
                String::from_utf8(b.to_vec()).map_err(|_| RedisError::UnexpectedReply(
                    "bulk string is not valid UTF-8".to_string(),
                ))
            }
            RespValue::Integer(i) => Ok(i.to_string()),
            RespValue::Null => Err(RedisError::Nil),
            other => Err(unexpected("string", &other)),
        }
    }
}

impl FromReply for Vec<u8> {
    fn from_reply(reply: RespValue) -> RedisResult<Self> {
        match reply {
            RespValue::BulkString(b) => Ok(b.to_vec()),
            RespValue::SimpleString(s) => Ok(s.into_bytes()),
            RespValue::Integer(i) => Ok(i.to_string().into_bytes()),
            RespValue::Null => Err(RedisError::Nil),
            other => Err(unexpected("bytes", &other)),
        }
    }
}

impl FromReply for Vec<String> {
    fn from_reply(reply: RespValue) -> RedisResult<Self> {
        match reply {
            RespValue::Array(elements) => elements.into_iter().map(from_reply::<String>).collect(),
            RespValue::Null => Ok(Vec::new()),
            other => Err(unexpected("list of strings", &other)),
        }
    }
}

impl<T: FromReply> FromReply for Option<T> {
    fn from_reply(reply: RespValue) -> RedisResult<Self> {
        match reply {
            RespValue::Null => Ok(None),
            reply => from_reply(reply).map(Some),
        }
    }
}
