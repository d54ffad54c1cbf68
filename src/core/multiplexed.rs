use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, instrument};

use crate::core::connection::{Connection, ConnectionReader, ConnectionWriter};
use crate::proto::frame::Frame;
use crate::{Error, Result};

type Waiter = oneshot::Sender<Result<Frame>>;

/// Frames written back to back, one waiter per frame.
struct Request {
    frames: Vec<Frame>,
    waiters: Vec<Waiter>,
}

/// A cheap-to-clone handle to a connection shared by many tasks.
///
/// A writer task sends requests in arrival order and a reader task hands
/// replies back in the same order, so concurrent callers never wait for each
/// other's round trips.
///
/// The reader also watches the socket while no reply is pending, so a
/// connection the server closed while idle reports [`is_closed`] before the
/// next command is sent.
///
/// [`is_closed`]: MultiplexedConnection::is_closed
#[derive(Clone)]
pub struct MultiplexedConnection {
    sender: mpsc::Sender<Request>,
    response_timeout: Option<Duration>,
}

impl MultiplexedConnection {
    /// Creates a new multiplexed connection.
    ///
    /// # Arguments
    ///
    /// * `connection` - The underlying connection to multiplex. Its own read
    ///   and write timeouts stay in effect on the split halves.
    /// * `queue_size` - The maximum number of pending requests.
    pub fn new<S>(connection: Connection<S>, queue_size: usize) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (reader, writer) = connection.split();
        let (request_tx, request_rx) = mpsc::channel(queue_size);
        let (waiter_tx, waiter_rx) = mpsc::channel(queue_size);

        tokio::spawn(run_writer(writer, request_rx, waiter_tx));
        tokio::spawn(run_reader(reader, waiter_rx));

        Self {
            sender: request_tx,
            response_timeout: None,
        }
    }

    /// Fails requests whose reply does not arrive within `timeout`.
    ///
    /// A timed-out request only fails its caller; the late reply is read and
    /// discarded so the connection stays usable.
    pub fn with_response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Returns true once the background tasks have stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Sends a command to the server and awaits the raw reply frame.
    #[instrument(skip(self), level = "debug")]
    pub async fn send_command(&self, frame: Frame) -> Result<Frame> {
        let mut replies = self.send_pipeline(vec![frame]).await?;
        replies
            .pop()
            .ok_or_else(|| Error::protocol("missing reply"))
    }

    /// Writes `frames` back to back and returns their replies in order.
    ///
    /// No other caller's command can be interleaved between them, which is
    /// what `ASKING` needs.
    pub async fn send_pipeline(&self, frames: Vec<Frame>) -> Result<Vec<Frame>> {
        let mut receivers = Vec::with_capacity(frames.len());
        let mut waiters = Vec::with_capacity(frames.len());
        for _ in &frames {
            let (tx, rx) = oneshot::channel();
            waiters.push(tx);
            receivers.push(rx);
        }

        self.sender
            .send(Request { frames, waiters })
            .await
            .map_err(|_| Error::closed())?;

        let replies = async {
            let mut replies = Vec::with_capacity(receivers.len());
            for rx in receivers {
                replies.push(rx.await.map_err(|_| Error::closed())??);
            }
            Ok(replies)
        };
        match self.response_timeout {
            Some(limit) => tokio::time::timeout(limit, replies)
                .await
                .map_err(|_| Error::Timeout)?,
            None => replies.await,
        }
    }
}

impl fmt::Debug for MultiplexedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiplexedConnection")
            .field("closed", &self.sender.is_closed())
            .field("response_timeout", &self.response_timeout)
            .finish()
    }
}

async fn run_writer<S>(
    mut writer: ConnectionWriter<S>,
    mut request_rx: mpsc::Receiver<Request>,
    waiter_tx: mpsc::Sender<Waiter>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let req = tokio::select! {
            req = request_rx.recv() => match req {
                Some(req) => req,
                None => return,
            },
            // Reader stopped, so the connection is unusable.
            _ = waiter_tx.closed() => return,
        };

        // Waiters are queued before the bytes go out, so the reader never
        // sees a reply it has no waiter for.
        for waiter in req.waiters {
            if waiter_tx.send(waiter).await.is_err() {
                return;
            }
        }

        for frame in &req.frames {
            debug!(?frame, "sending frame");
            if let Err(e) = writer.write_frame(frame).await {
                // The queued waiters fail once the reader hits the broken socket.
                error!(error = %e, "failed to write frame");
                return;
            }
        }
    }
}

async fn run_reader<S>(mut reader: ConnectionReader<S>, mut waiter_rx: mpsc::Receiver<Waiter>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let tx = tokio::select! {
            biased;
            tx = waiter_rx.recv() => match tx {
                Some(tx) => tx,
                None => return,
            },
            read = reader.read_frame() => match (read, waiter_rx.try_recv()) {
                (Ok(frame), Ok(tx)) => {
                    debug!(?frame, "received frame");
                    let _ = tx.send(Ok(frame));
                    continue;
                }
                (Err(e), Ok(tx)) => {
                    let _ = tx.send(Err(e));
                    fail_pending(&mut waiter_rx).await;
                    return;
                }
                (Ok(frame), Err(_)) => {
                    error!(?frame, "unexpected frame with no pending request");
                    return;
                }
                (Err(e), Err(_)) => {
                    debug!(error = %e, "idle connection closed");
                    return;
                }
            },
        };

        match reader.read_frame().await {
            Ok(frame) => {
                debug!(?frame, "received frame");
                let _ = tx.send(Ok(frame));
            }
            Err(e) => {
                error!(error = %e, "failed to read frame");
                let _ = tx.send(Err(e));
                fail_pending(&mut waiter_rx).await;
                return;
            }
        }
    }
}

/// Fails everything still queued behind a broken read.
async fn fail_pending(waiter_rx: &mut mpsc::Receiver<Waiter>) {
    waiter_rx.close();
    while let Some(tx) = waiter_rx.recv().await {
        let _ = tx.send(Err(Error::closed()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn spawn_echo_server(stream: tokio::io::DuplexStream) {
        tokio::spawn(async move {
            let mut conn = Connection::new(stream);
            while let Ok(frame) = conn.read_frame().await {
                let reply = match frame {
                    Frame::Array(mut args) => args.pop().unwrap_or(Frame::Null),
                    other => other,
                };
                if conn.write_frame(&reply).await.is_err() {
                    return;
                }
            }
        });
    }

    #[tokio::test]
    async fn test_concurrent_requests_keep_order() {
        let (client, server) = duplex(64 * 1024);
        spawn_echo_server(server);
        let conn = MultiplexedConnection::new(Connection::new(client), 128);

        let mut handles = Vec::new();
        for i in 0..100 {
            let conn = conn.clone();
            handles.push(tokio::spawn(async move {
                let reply = conn
                    .send_command(Frame::Array(vec![
                        Frame::bulk("ECHO"),
                        Frame::bulk(i.to_string()),
                    ]))
                    .await
                    .unwrap();
                assert_eq!(reply, Frame::bulk(i.to_string()));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_closed_connection_reports_io_error() {
        let (client, server) = duplex(1024);
        drop(server);
        let conn = MultiplexedConnection::new(Connection::new(client), 8);
        let err = conn
            .send_command(Frame::Array(vec![Frame::bulk("PING")]))
            .await
            .unwrap_err();
        assert!(err.is_connection_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_timeout() {
        let (client, _server) = duplex(1024);
        let conn = MultiplexedConnection::new(Connection::new(client), 8)
            .with_response_timeout(Some(Duration::from_millis(100)));
        let err = conn
            .send_command(Frame::Array(vec![Frame::bulk("PING")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_does_not_close_connection() {
        let (client, server) = duplex(1024);
        tokio::spawn(async move {
            let mut conn = Connection::new(server);
            let mut delay = Some(Duration::from_millis(300));
            while let Ok(frame) = conn.read_frame().await {
                if let Some(delay) = delay.take() {
                    tokio::time::sleep(delay).await;
                }
                let reply = match frame {
                    Frame::Array(mut args) => args.pop().unwrap_or(Frame::Null),
                    other => other,
                };
                conn.write_frame(&reply).await.unwrap();
            }
        });
        let conn = MultiplexedConnection::new(Connection::new(client), 8)
            .with_response_timeout(Some(Duration::from_millis(100)));

        let err = conn
            .send_command(Frame::Array(vec![Frame::bulk("ECHO"), Frame::bulk("slow")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout));

        tokio::time::sleep(Duration::from_millis(300)).await;
        let reply = conn
            .send_command(Frame::Array(vec![Frame::bulk("ECHO"), Frame::bulk("fast")]))
            .await
            .unwrap();
        assert_eq!(reply, Frame::bulk("fast"));
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn test_idle_close_is_detected() {
        let (client, server) = duplex(1024);
        let conn = MultiplexedConnection::new(Connection::new(client), 8);
        assert!(!conn.is_closed());

        drop(server);
        for _ in 0..100 {
            if conn.is_closed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_pipeline_replies_in_order() {
        let (client, server) = duplex(1024);
        spawn_echo_server(server);
        let conn = MultiplexedConnection::new(Connection::new(client), 8);

        let replies = conn
            .send_pipeline(vec![
                Frame::Array(vec![Frame::bulk("ECHO"), Frame::bulk("first")]),
                Frame::Array(vec![Frame::bulk("ECHO"), Frame::bulk("second")]),
            ])
            .await
            .unwrap();
        assert_eq!(replies, vec![Frame::bulk("first"), Frame::bulk("second")]);
    }
}
