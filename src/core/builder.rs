use std::time::Duration;

use crate::core::ConnectOptions;
use crate::{Client, Error};

/// Builder for configuring and creating a [`Client`] connection.
///
/// # Example
///
/// ```no_run
/// use alauda_redis_client::ClientBuilder;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ClientBuilder::new()
///     .address("redis://localhost:6379")
///     .password("secret")
///     .database(0)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ClientBuilder {
    address: Option<String>,
    options: ConnectOptions,
}

impl ClientBuilder {
    /// Creates a new [`ClientBuilder`] instance.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the Redis server address.
    ///
    /// # Arguments
    ///
    /// * `address` - Redis address in format `redis://host:port[/db]`
    #[inline]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Sets the password for authentication.
    ///
    /// # Arguments
    ///
    /// * `password` - Password sent with `AUTH` on every (re)connect
    #[inline]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.options.password = Some(password.into());
        self
    }

    /// Sets the username for ACL authentication.
    ///
    /// # Arguments
    ///
    /// * `username` - ACL user; only used together with a password
    #[inline]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.options.username = Some(username.into());
        self
    }

    /// Sets the database number to select after connecting.
    ///
    /// Takes precedence over a database given in the address path.
    ///
    /// # Arguments
    ///
    /// * `database` - Database number (0-15 on a default server)
    #[inline]
    pub fn database(mut self, database: u8) -> Self {
        self.options.database = Some(database);
        self
    }

    /// Sets the client connection name.
    ///
    /// # Arguments
    ///
    /// * `name` - Client name displayed in `CLIENT LIST`
    #[inline]
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.options.client_name = Some(name.into());
        self
    }

    /// Sends `READONLY` after connecting.
    #[inline]
    pub fn readonly(mut self, readonly: bool) -> Self {
        self.options.readonly = readonly;
        self
    }

    /// Sets the connection timeout.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Maximum time to wait for the TCP connection
    #[inline]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.options.connection_timeout = Some(timeout);
        self
    }

    /// Sets the response timeout for commands.
    ///
    /// Also bounds each handshake reply while connecting.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Maximum time to wait for each reply, `None` to wait forever
    #[inline]
    pub fn response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.response_timeout = timeout;
        self
    }

    /// Sets the maximum number of pending requests in the queue.
    ///
    /// # Arguments
    ///
    /// * `size` - Queue capacity (default: 1024)
    #[inline]
    pub fn queue_size(mut self, size: usize) -> Self {
        self.options.queue_size = size;
        self
    }

    /// Builds the [`Client`] connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if address is not set or malformed,
    /// [`Error::Io`] or [`Error::Timeout`] if the connection fails and
    /// [`Error::Auth`] if the password is rejected.
    pub async fn build(self) -> Result<Client, Error> {
        let address = self.address.ok_or_else(|| Error::InvalidArgument {
            message: "address is required".to_string(),
        })?;

        Client::connect_inner(&address, self.options).await
    }
}
