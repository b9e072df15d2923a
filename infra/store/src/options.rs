use crate::error::StoreError;
use crate::segment::validate_partition_name;
use serde::Deserialize;
use std::fmt;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_NAMESPACE: &str = "cachet";
const DEFAULT_POOL_SIZE: usize = 5;

/// Immutable connection settings of a [`Connection`](crate::Connection).
///
/// Created through [`ConnectionOptions::builder`], which validates the partition
/// name so that a reserved one is rejected before `start` is ever called.
#[derive(Clone)]
pub struct ConnectionOptions {
    host: String,
    port: u16,
    partition: String,
    namespace: String,
    endpoint: Option<String>,
    username: Option<String>,
    password: Option<String>,
    pool_size: usize,
}

impl ConnectionOptions {
    /// Creates a [`ConnectionOptionsBuilder`] for the given partition (database name).
    pub fn builder(partition: impl Into<String>) -> ConnectionOptionsBuilder {
        ConnectionOptionsBuilder::new(partition)
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn partition(&self) -> &str {
        &self.partition
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub const fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Username and password, when an authentication step is configured.
    ///
    /// A username without a password authenticates with an empty password.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.username.as_deref().map(|user| (user, self.password.as_deref().unwrap_or_default()))
    }

    /// Connection URL: the explicit endpoint if set, `ws://{host}:{port}` otherwise.
    #[must_use]
    pub fn url(&self) -> String {
        self.endpoint.clone().unwrap_or_else(|| format!("ws://{}:{}", self.host, self.port))
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("url", &self.url())
            .field("partition", &self.partition)
            .field("namespace", &self.namespace)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

/// A fluent builder for [`ConnectionOptions`].
#[must_use = "builders do nothing unless you call .build()"]
#[derive(Debug)]
pub struct ConnectionOptionsBuilder {
    options: ConnectionOptions,
}

impl ConnectionOptionsBuilder {
    fn new(partition: impl Into<String>) -> Self {
        Self {
            options: ConnectionOptions {
                host: DEFAULT_HOST.to_owned(),
                port: DEFAULT_PORT,
                partition: partition.into(),
                namespace: DEFAULT_NAMESPACE.to_owned(),
                endpoint: None,
                username: None,
                password: None,
                pool_size: DEFAULT_POOL_SIZE,
            },
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.options.host = host.into();
        self
    }

    pub const fn port(mut self, port: u16) -> Self {
        self.options.port = port;
        self
    }

    /// Sets the backend namespace that holds the partition database.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.options.namespace = namespace.into();
        self
    }

    /// Overrides the `ws://{host}:{port}` URL (e.g. `mem://`, `http://db:8000`).
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.options.endpoint = Some(endpoint.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.options.username = Some(username.into());
        self
    }

    /// Adds root credentials; `start` will sign in with them.
    pub fn auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.options.username = Some(username.into());
        self.options.password = Some(password.into());
        self
    }

    /// Concurrent backend operation budget.
    pub const fn pool_size(mut self, size: usize) -> Self {
        self.options.pool_size = size;
        self
    }

    /// Validates and freezes the options.
    ///
    /// # Errors
    /// * [`StoreError::InvalidPartition`] for an empty or reserved partition name.
    /// * [`StoreError::Internal`] for a zero pool size or an empty namespace.
    pub fn build(self) -> Result<ConnectionOptions, StoreError> {
        validate_partition_name(&self.options.partition)?;

        if self.options.pool_size == 0 {
            return Err("pool_size must be greater than zero".into());
        }

        if self.options.namespace.trim().is_empty() {
            return Err("namespace cannot be empty".into());
        }

        Ok(self.options)
    }
}

/// Serde-friendly store configuration, e.g. the `[store]` table of a config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub partition: String,
    pub namespace: String,
    pub endpoint: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            partition: DEFAULT_NAMESPACE.to_owned(),
            namespace: DEFAULT_NAMESPACE.to_owned(),
            endpoint: None,
            username: None,
            password: None,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl TryFrom<StoreConfig> for ConnectionOptions {
    type Error = StoreError;

    fn try_from(cfg: StoreConfig) -> Result<Self, StoreError> {
        let mut builder = Self::builder(cfg.partition)
            .host(cfg.host)
            .port(cfg.port)
            .namespace(cfg.namespace)
            .pool_size(cfg.pool_size);

        if let Some(endpoint) = cfg.endpoint {
            builder = builder.endpoint(endpoint);
        }

        match (cfg.username, cfg.password) {
            (Some(user), Some(pass)) => builder = builder.auth(user, pass),
            (Some(user), None) => builder = builder.username(user),
            (None, _) => {},
        }

        builder.build()
    }
}
