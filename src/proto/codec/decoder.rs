use bytes::{Buf, Bytes, BytesMut};

use crate::proto::frame::Frame;

const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024; // 512 MB default

/// Streaming RESP decoder.
///
/// Feed network data with [`append`](Decoder::append) and pull frames with
/// [`decode`](Decoder::decode). Bytes are only consumed once a whole frame,
/// including every nested element, is available.
///
/// ```
/// use alauda_redis_client::proto::codec::Decoder;
/// use alauda_redis_client::proto::frame::Frame;
///
/// let mut decoder = Decoder::new();
/// decoder.append(b":4");
/// assert!(decoder.decode().unwrap().is_none());
/// decoder.append(b"2\r\n");
/// assert_eq!(decoder.decode().unwrap(), Some(Frame::Integer(42)));
/// ```
#[derive(Debug)]
pub struct Decoder {
    buf: BytesMut,
    max_frame_size: usize,
}

impl Decoder {
    /// Creates a new decoder with an empty buffer.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Creates a new decoder with a custom maximum frame size in bytes.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame_size,
        }
    }

    /// Appends raw bytes received from the network.
    pub fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Attempts to decode one frame.
    ///
    /// Returns `Ok(None)` when more data is needed, in which case the buffer
    /// is left untouched.
    pub fn decode(&mut self) -> Result<Option<Frame>, String> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        if self.buf.len() > self.max_frame_size {
            return Err("Buffer size exceeded maximum frame size".to_string());
        }

        let mut pos = 0;
        match self.parse(&mut pos)? {
            Some(frame) => {
                self.buf.advance(pos);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    fn parse(&self, pos: &mut usize) -> Result<Option<Frame>, String> {
        let prefix = match self.buf.get(*pos) {
            Some(b) => *b,
            None => return Ok(None),
        };
        let (line, next) = match self.line(*pos + 1) {
            Some(found) => found,
            None => return Ok(None),
        };

        let frame = match prefix {
            b'+' => Frame::SimpleString(line.to_vec()),
            b'-' => Frame::Error(line.to_vec()),
            b':' => Frame::Integer(parse_int(line)?),
            b'$' => {
                let len = parse_int(line)?;
                if len == -1 {
                    *pos = next;
                    return Ok(Some(Frame::BulkString(None)));
                }
                let len = checked_len(len)?;
                if len > self.max_frame_size {
                    return Err("Bulk string length exceeds maximum frame size".to_string());
                }
                if self.buf.len() < next + len + 2 {
                    return Ok(None);
                }
                if &self.buf[next + len..next + len + 2] != b"\r\n" {
                    return Err("bulk string is not terminated by CRLF".to_string());
                }
                let data = Bytes::copy_from_slice(&self.buf[next..next + len]);
                *pos = next + len + 2;
                return Ok(Some(Frame::BulkString(Some(data))));
            }
            b'*' => {
                let len = parse_int(line)?;
                if len == -1 {
                    *pos = next;
                    return Ok(Some(Frame::Null));
                }
                let len = checked_len(len)?;
                // Assume minimum 16 bytes per item
                if len > self.max_frame_size / 16 {
                    return Err("Array length exceeds reasonable maximum".to_string());
                }
                let mut cursor = next;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    match self.parse(&mut cursor)? {
                        Some(item) => items.push(item),
                        None => return Ok(None),
                    }
                }
                *pos = cursor;
                return Ok(Some(Frame::Array(items)));
            }
            other => return Err(format!("unknown frame type: {}", other as char)),
        };

        *pos = next;
        Ok(Some(frame))
    }

    /// Returns the line starting at `start` (without CRLF) and the offset
    /// just past its CRLF.
    fn line(&self, start: usize) -> Option<(&[u8], usize)> {
        let rest = self.buf.get(start..)?;
        let end = rest.windows(2).position(|w| w == b"\r\n")?;
        Some((&rest[..end], start + end + 2))
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_int(line: &[u8]) -> Result<i64, String> {
    std::str::from_utf8(line)
        .map_err(|e| e.to_string())?
        .parse::<i64>()
        .map_err(|e| e.to_string())
}

fn checked_len(len: i64) -> Result<usize, String> {
    usize::try_from(len).map_err(|_| format!("invalid length: {}", len))
}
