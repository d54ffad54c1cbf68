use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;

use crate::proto::frame::Frame;
use crate::Error;

/// A command ready to be sent to Redis.
///
/// ```
/// use alauda_redis_client::core::command::{incr, Cmd};
///
/// let cmd = Cmd::new("SET").arg("key").arg("value");
/// assert_eq!(cmd.name(), "SET");
/// assert_eq!(incr("counter").key(), Some("counter"));
/// ```
#[derive(Debug, Clone)]
pub struct Cmd {
    args: Vec<Bytes>,
}

impl Cmd {
    /// Creates a new command with the given name.
    #[inline]
    pub fn new(name: impl Into<Bytes>) -> Self {
        Self {
            args: vec![name.into()],
        }
    }

    /// Appends an argument to the command.
    #[inline]
    pub fn arg<T: Into<Bytes>>(mut self, arg: T) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Upper-case command name.
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.args[0]).to_ascii_uppercase()
    }

    /// First argument after the command name, which is the key for every
    /// keyed command built in this module.
    pub fn key(&self) -> Option<&str> {
        self.args.get(1).and_then(|k| std::str::from_utf8(k).ok())
    }

    /// Converts the command to a RESP Array frame.
    #[inline]
    pub fn into_frame(self) -> Frame {
        Frame::Array(
            self.args
                .into_iter()
                .map(|b| Frame::BulkString(Some(b)))
                .collect(),
        )
    }
}

fn key_bytes(key: &str) -> Bytes {
    Bytes::copy_from_slice(key.as_bytes())
}

/// Creates a PING command.
#[inline]
pub fn ping() -> Cmd {
    Cmd::new("PING")
}

/// Creates an ECHO command.
#[inline]
pub fn echo(msg: &str) -> Cmd {
    Cmd::new("ECHO").arg(key_bytes(msg))
}

/// Creates a GET command.
#[inline]
pub fn get(key: &str) -> Cmd {
    Cmd::new("GET").arg(key_bytes(key))
}

/// Creates a SET command.
#[inline]
pub fn set(key: &str, value: impl Into<Bytes>) -> Cmd {
    Cmd::new("SET").arg(key_bytes(key)).arg(value)
}

/// Creates a `SET key value EX seconds` command.
#[inline]
pub fn set_with_expiry(key: &str, value: impl Into<Bytes>, expiry: Duration) -> Cmd {
    Cmd::new("SET")
        .arg(key_bytes(key))
        .arg(value)
        .arg("EX")
        .arg(expiry.as_secs().max(1).to_string())
}

/// Creates a SETNX command.
#[inline]
pub fn setnx(key: &str, value: impl Into<Bytes>) -> Cmd {
    Cmd::new("SETNX").arg(key_bytes(key)).arg(value)
}

/// Creates a DEL command.
#[inline]
pub fn del(key: &str) -> Cmd {
    Cmd::new("DEL").arg(key_bytes(key))
}

/// Creates an EXISTS command for one key.
#[inline]
pub fn exists(key: &str) -> Cmd {
    Cmd::new("EXISTS").arg(key_bytes(key))
}

/// Creates an EXPIRE command.
#[inline]
pub fn expire(key: &str, seconds: u64) -> Cmd {
    Cmd::new("EXPIRE").arg(key_bytes(key)).arg(seconds.to_string())
}

/// Creates a TTL command.
#[inline]
pub fn ttl(key: &str) -> Cmd {
    Cmd::new("TTL").arg(key_bytes(key))
}

/// Creates an INCR command.
#[inline]
pub fn incr(key: &str) -> Cmd {
    Cmd::new("INCR").arg(key_bytes(key))
}

/// Creates an INCRBY command.
#[inline]
pub fn incr_by(key: &str, amount: i64) -> Cmd {
    Cmd::new("INCRBY").arg(key_bytes(key)).arg(amount.to_string())
}

/// Creates a DECR command.
#[inline]
pub fn decr(key: &str) -> Cmd {
    Cmd::new("DECR").arg(key_bytes(key))
}

/// Creates a DECRBY command.
#[inline]
pub fn decr_by(key: &str, amount: i64) -> Cmd {
    Cmd::new("DECRBY").arg(key_bytes(key)).arg(amount.to_string())
}

/// Creates an HGET command.
#[inline]
pub fn hget(key: &str, field: &str) -> Cmd {
    Cmd::new("HGET").arg(key_bytes(key)).arg(key_bytes(field))
}

/// Creates an HSET command for a single field.
#[inline]
pub fn hset(key: &str, field: &str, value: impl Into<Bytes>) -> Cmd {
    Cmd::new("HSET")
        .arg(key_bytes(key))
        .arg(key_bytes(field))
        .arg(value)
}

/// Creates an HDEL command.
#[inline]
pub fn hdel(key: &str, fields: &[&str]) -> Cmd {
    fields
        .iter()
        .fold(Cmd::new("HDEL").arg(key_bytes(key)), |cmd, field| {
            cmd.arg(key_bytes(field))
        })
}

/// Creates an HGETALL command.
#[inline]
pub fn hgetall(key: &str) -> Cmd {
    Cmd::new("HGETALL").arg(key_bytes(key))
}

/// Creates an AUTH command, ACL style when a username is given.
#[inline]
pub fn auth(username: Option<&str>, password: &str) -> Cmd {
    let cmd = Cmd::new("AUTH");
    let cmd = match username {
        Some(user) => cmd.arg(key_bytes(user)),
        None => cmd,
    };
    cmd.arg(key_bytes(password))
}

/// Creates a SELECT command.
#[inline]
pub fn select(db: u8) -> Cmd {
    Cmd::new("SELECT").arg(db.to_string())
}

/// Creates a CLIENT SETNAME command.
#[inline]
pub fn client_setname(name: &str) -> Cmd {
    Cmd::new("CLIENT").arg("SETNAME").arg(key_bytes(name))
}

/// Creates a READONLY command, enabling replica reads on a cluster node.
#[inline]
pub fn readonly() -> Cmd {
    Cmd::new("READONLY")
}

fn server_error(e: &[u8]) -> Error {
    Error::Server {
        message: String::from_utf8_lossy(e).into_owned(),
    }
}

/// Turns a server error frame into [`Error::Server`].
#[inline]
pub fn parse_frame_response(frame: Frame) -> Result<Frame, Error> {
    match frame {
        Frame::Error(e) => Err(server_error(&e)),
        _ => Ok(frame),
    }
}

/// Converts a reply to optional bytes; nil replies become `None`.
#[inline]
pub fn frame_to_bytes(frame: Frame) -> Result<Option<Bytes>, Error> {
    match frame {
        Frame::BulkString(b) => Ok(b),
        Frame::SimpleString(s) => Ok(Some(Bytes::from(s))),
        Frame::Null => Ok(None),
        Frame::Error(e) => Err(server_error(&e)),
        _ => Err(Error::protocol("unexpected frame type")),
    }
}

/// Converts an integer reply.
#[inline]
pub fn frame_to_int(frame: Frame) -> Result<i64, Error> {
    match frame {
        Frame::Integer(i) => Ok(i),
        Frame::BulkString(Some(b)) => std::str::from_utf8(&b)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| Error::protocol("invalid integer")),
        Frame::Error(e) => Err(server_error(&e)),
        _ => Err(Error::protocol("unexpected frame type")),
    }
}

/// Converts an integer or status reply to a boolean.
#[inline]
pub fn frame_to_bool(frame: Frame) -> Result<bool, Error> {
    match frame {
        Frame::Integer(i) => Ok(i != 0),
        Frame::SimpleString(_) => Ok(true),
        Frame::BulkString(b) => Ok(b.is_some_and(|bytes| !bytes.is_empty())),
        Frame::Null => Ok(false),
        Frame::Error(e) => Err(server_error(&e)),
        _ => Err(Error::protocol("unexpected frame type")),
    }
}

/// Converts an HGETALL reply into a map.
#[inline]
pub fn frame_to_hashmap(frame: Frame) -> Result<HashMap<String, Bytes>, Error> {
    let items = match frame {
        Frame::Array(items) => items,
        Frame::Null => return Ok(HashMap::new()),
        Frame::Error(e) => return Err(server_error(&e)),
        _ => return Err(Error::protocol("expected array frame for HGETALL")),
    };
    if items.len() % 2 != 0 {
        return Err(Error::protocol(
            "HGETALL response must have even number of elements",
        ));
    }

    let mut map = HashMap::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
        let field = field
            .as_text()
            .ok_or_else(|| Error::protocol("unexpected field frame type"))?;
        let value = frame_to_bytes(value)?.unwrap_or_default();
        map.insert(field, value);
    }
    Ok(map)
}
