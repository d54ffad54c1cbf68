use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use crate::proto::codec::{Decoder, Encoder};
use crate::proto::frame::Frame;
use crate::{Error, Result};

const READ_CHUNK: usize = 4096;

/// A framed connection to a Redis server over any async stream.
pub struct Connection<S> {
    stream: S,
    decoder: Decoder,
    encoder: Encoder,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection with no timeouts configured.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            decoder: Decoder::new(),
            encoder: Encoder::new(),
            read_timeout: None,
            write_timeout: None,
        }
    }

    /// Configures read and write timeouts for this connection.
    pub fn with_timeouts(
        mut self,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
    ) -> Self {
        self.read_timeout = read_timeout;
        self.write_timeout = write_timeout;
        self
    }

    /// Writes a frame to the connection.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        write_frame(&mut self.stream, &mut self.encoder, frame, self.write_timeout).await
    }

    /// Reads one complete frame, pulling more data from the stream as needed.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        read_frame(&mut self.stream, &mut self.decoder, self.read_timeout).await
    }

    /// Sends a command and waits for its reply, turning `-ERR` replies into
    /// [`Error::Server`].
    pub async fn request(&mut self, frame: &Frame) -> Result<Frame> {
        self.write_frame(frame).await?;
        let reply = self.read_frame().await?;
        crate::core::command::parse_frame_response(reply)
    }

    /// Splits the connection into independently owned read and write halves.
    pub fn split(self) -> (ConnectionReader<S>, ConnectionWriter<S>) {
        let (read, write) = tokio::io::split(self.stream);
        (
            ConnectionReader {
                stream: read,
                decoder: self.decoder,
                read_timeout: self.read_timeout,
            },
            ConnectionWriter {
                stream: write,
                encoder: self.encoder,
                write_timeout: self.write_timeout,
            },
        )
    }
}

impl<S> fmt::Debug for Connection<S>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("stream", &self.stream)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}

/// Read half of a split [`Connection`].
pub struct ConnectionReader<S> {
    stream: ReadHalf<S>,
    decoder: Decoder,
    read_timeout: Option<Duration>,
}

impl<S> ConnectionReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Reads one complete frame.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        read_frame(&mut self.stream, &mut self.decoder, self.read_timeout).await
    }
}

/// Write half of a split [`Connection`].
pub struct ConnectionWriter<S> {
    stream: WriteHalf<S>,
    encoder: Encoder,
    write_timeout: Option<Duration>,
}

impl<S> ConnectionWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Writes a frame.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        write_frame(&mut self.stream, &mut self.encoder, frame, self.write_timeout).await
    }
}

async fn with_timeout<F, T>(limit: Option<Duration>, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout)?,
        None => fut.await,
    }
}

async fn write_frame<W>(
    stream: &mut W,
    encoder: &mut Encoder,
    frame: &Frame,
    limit: Option<Duration>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    encoder.encode(frame);
    let data = encoder.take();
    with_timeout(limit, async {
        stream.write_all(&data).await?;
        stream.flush().await?;
        Ok(())
    })
    .await
}

async fn read_frame<R>(
    stream: &mut R,
    decoder: &mut Decoder,
    limit: Option<Duration>,
) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    with_timeout(limit, async {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            if let Some(frame) = decoder.decode().map_err(Error::protocol)? {
                return Ok(frame);
            }
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Err(Error::closed());
            }
            decoder.append(&buf[..n]);
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_connection_ping_pong() {
        let (client, server) = duplex(1024);
        let mut server = Connection::new(server);
        let mut client = Connection::new(client);

        let server_task = tokio::spawn(async move {
            let frame = server.read_frame().await.unwrap();
            assert_eq!(frame, Frame::Array(vec![Frame::bulk("PING")]));
            server.write_frame(&Frame::simple("PONG")).await.unwrap();
        });

        let reply = client
            .request(&Frame::Array(vec![Frame::bulk("PING")]))
            .await
            .unwrap();
        assert_eq!(reply, Frame::simple("PONG"));
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_request_maps_server_error() {
        let (client, server) = duplex(1024);
        let mut server = Connection::new(server);
        let mut client = Connection::new(client);

        tokio::spawn(async move {
            let _ = server.read_frame().await.unwrap();
            server.write_frame(&Frame::error("ERR invalid DB index")).await.unwrap();
        });

        let err = client
            .request(&Frame::Array(vec![Frame::bulk("SELECT"), Frame::bulk("99")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Server { message } if message == "ERR invalid DB index"));
    }

    #[tokio::test]
    async fn test_read_frame_on_closed_stream() {
        let (client, server) = duplex(64);
        drop(server);
        let mut client = Connection::new(client);
        let err = client.read_frame().await.unwrap_err();
        assert!(err.is_connection_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout() {
        let (client, _server) = duplex(64);
        let mut client =
            Connection::new(client).with_timeouts(Some(Duration::from_millis(50)), None);
        let err = client.read_frame().await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[tokio::test]
    async fn test_split_halves() {
        let (client, server) = duplex(1024);
        let (mut reader, mut writer) = Connection::new(client).split();
        let mut server = Connection::new(server);

        writer.write_frame(&Frame::Array(vec![Frame::bulk("INCR"), Frame::bulk("k")])).await.unwrap();
        let got = server.read_frame().await.unwrap();
        assert_eq!(got, Frame::Array(vec![Frame::bulk("INCR"), Frame::bulk("k")]));

        server.write_frame(&Frame::Integer(1)).await.unwrap();
        assert_eq!(reader.read_frame().await.unwrap(), Frame::Integer(1));
    }
}
