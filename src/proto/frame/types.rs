use bytes::Bytes;

/// A RESP2 frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Simple string (+OK).
    SimpleString(Vec<u8>),
    /// Error (-ERR).
    Error(Vec<u8>),
    /// Integer (:1000).
    Integer(i64),
    /// Bulk string ($6\r\nfoobar).
    BulkString(Option<Bytes>),
    /// Array (*2\r\n...).
    Array(Vec<Frame>),
    /// Null array (*-1).
    Null,
}

impl Frame {
    /// Builds a bulk string frame.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Frame::BulkString(Some(data.into()))
    }

    /// Builds a simple string frame.
    pub fn simple(s: &str) -> Self {
        Frame::SimpleString(s.as_bytes().to_vec())
    }

    /// Builds an error frame.
    pub fn error(message: &str) -> Self {
        Frame::Error(message.as_bytes().to_vec())
    }

    /// Returns true for `Null` and null bulk strings.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null | Frame::BulkString(None))
    }

    /// Returns true if the server answered with an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }

    /// Reads the frame as UTF-8 text when it carries a string payload.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Frame::SimpleString(s) | Frame::Error(s) => Some(String::from_utf8_lossy(s).into_owned()),
            Frame::BulkString(Some(b)) => Some(String::from_utf8_lossy(b).into_owned()),
            Frame::Integer(i) => Some(i.to_string()),
            _ => None,
        }
    }
}
