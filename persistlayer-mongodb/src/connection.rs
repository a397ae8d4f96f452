//! MongoDB connection lifecycle.
//!
//! A [`MongoDbConnection`] owns one driver client and the database handle derived
//! from the resolved URI. Sharing one connection between several persistence
//! components keeps the number of pooled sockets down: register it as an
//! `Arc<MongoDbConnection>` under a `*:connection:mongodb:*:*` descriptor and every
//! persistence that receives those references borrows it instead of creating its own.
//!
//! # Configuration
//!
//! - `connection(s)`: `discovery_key`, `host`, `port`, `database`, `uri`
//! - `credential(s)`: `store_key`, `username`, `password`
//! - `options`:
//!   - `max_pool_size` - maximum connection pool size (default 2)
//!   - `keep_alive` - idle time of pooled connections in ms, 0 keeps them indefinitely (default 0)
//!   - `connect_timeout` - connect and server selection timeout in ms (default 5000)
//!   - `socket_timeout` - accepted for compatibility, the driver has no socket timeout (default 360000)
//!   - `max_page_size` - maximum page size (default 100)
//!   - `replica_set` - name of the replica set
//!   - `ssl` - accepted, not applied
//!   - `auth_source`, `auth_user`, `auth_password` - credential applied only when all three are set
//!
//! # References
//!
//! - `*:logger:*:*:*` (optional) logger
//! - `*:discovery:*:*:*` (optional) discovery services
//! - `*:credential-store:*:*:*` (optional) credential stores

use bson::doc;
use mea::rwlock::RwLock;
use mongodb::{
    Client, Database,
    options::{ClientOptions, Credential},
};
use std::{fmt, sync::Arc, time::Duration};

use persistlayer_core::{
    config::ConfigParams,
    error::{BoxError, PersistenceError, PersistenceResult},
    log::{Logger, NullLogger},
    refer::{Descriptor, References},
};

use crate::resolver::MongoDbConnectionResolver;

/// Live handles held by an open connection.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionState {
    pub(crate) client: Client,
    pub(crate) database: Database,
    pub(crate) database_name: String,
}

/// Connection to a MongoDB database through the official driver.
///
/// # Example
///
/// ```ignore
/// let mut connection = MongoDbConnection::new();
/// connection.configure(&ConfigParams::from_tuples([
///     ("connection.host", "localhost"),
///     ("connection.port", "27017"),
///     ("connection.database", "test"),
/// ]));
///
/// connection.open(Some("123")).await?;
/// let database = connection.database().await;
/// connection.close(Some("123")).await?;
/// ```
pub struct MongoDbConnection {
    options: ConfigParams,
    resolver: MongoDbConnectionResolver,
    logger: Arc<dyn Logger>,
    state: RwLock<Option<ConnectionState>>,
}

impl MongoDbConnection {
    pub fn new() -> Self {
        Self {
            options: Self::default_config().get_section("options"),
            resolver: MongoDbConnectionResolver::new(),
            logger: Arc::new(NullLogger),
            state: RwLock::new(None),
        }
    }

    fn default_config() -> ConfigParams {
        ConfigParams::from_tuples([
            ("options.max_pool_size", "2"),
            ("options.keep_alive", "0"),
            ("options.connect_timeout", "5000"),
            ("options.socket_timeout", "360000"),
            ("options.max_page_size", "100"),
        ])
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Applies configuration over the defaults.
    pub fn configure(&mut self, config: &ConfigParams) {
        let config = config.set_defaults(&Self::default_config());

        self.resolver.configure(&config);
        self.options = self.options.override_with(&config.get_section("options"));
    }

    /// Picks up the logger, discovery services and credential stores.
    pub fn set_references(&mut self, references: &References) {
        if let Some(logger) = references.get_one_optional::<Arc<dyn Logger>>(&Descriptor::new("*", "logger", "*", "*", "*")) {
            self.logger = logger;
        }
        self.resolver.set_references(references);
    }

    /// The merged `options` section.
    pub fn options(&self) -> &ConfigParams {
        &self.options
    }

    pub async fn is_open(&self) -> bool {
        self.state.read().await.is_some()
    }

    pub async fn client(&self) -> Option<Client> {
        self.state.read().await.as_ref().map(|state| state.client.clone())
    }

    pub async fn database(&self) -> Option<Database> {
        self.state.read().await.as_ref().map(|state| state.database.clone())
    }

    pub async fn database_name(&self) -> Option<String> {
        self.state.read().await.as_ref().map(|state| state.database_name.clone())
    }

    pub(crate) async fn state(&self) -> Option<ConnectionState> {
        (*self.state.read().await).clone()
    }

    fn compose_settings(&self, settings: &mut ClientOptions) {
        if let Some(max_pool_size) = self
            .options
            .get_as_nullable_integer("max_pool_size")
            .and_then(|size| u32::try_from(size).ok())
        {
            settings.max_pool_size = Some(max_pool_size);
        }

        settings.max_idle_time = match self.options.get_as_integer_with_default("keep_alive", 0) {
            keep_alive if keep_alive > 0 => Some(Duration::from_millis(keep_alive as u64)),
            _ => None,
        };

        if let Some(connect_timeout) = self
            .options
            .get_as_nullable_integer("connect_timeout")
            .filter(|timeout| *timeout > 0)
        {
            let connect_timeout = Duration::from_millis(connect_timeout as u64);
            settings.connect_timeout = Some(connect_timeout);
            settings.server_selection_timeout = Some(connect_timeout);
        }

        if let Some(replica_set) = self.options.get_as_nullable_string("replica_set") {
            settings.repl_set_name = Some(replica_set);
        }

        let auth_source = self.options.get_as_nullable_string("auth_source");
        let auth_user = self.options.get_as_nullable_string("auth_user");
        let auth_password = self.options.get_as_nullable_string("auth_password");

        if let (Some(source), Some(username), Some(password)) = (auth_source, auth_user, auth_password) {
            let mut credential = Credential::default();
            credential.source = Some(source);
            credential.username = Some(username);
            credential.password = Some(password);
            settings.credential = Some(credential);
        }
    }

    fn connect_failed(correlation_id: Option<&str>, message: &str, cause: impl Into<BoxError>) -> PersistenceError {
        PersistenceError::connection(correlation_id, "CONNECT_FAILED", message).with_cause(cause)
    }

    async fn connect(&self, correlation_id: Option<&str>) -> PersistenceResult<ConnectionState> {
        let uri = self.resolver.resolve(correlation_id).await.map_err(|err| {
            self.logger
                .error(correlation_id, Some(&err), format_args!("Failed to resolve MongoDb connection"));
            Self::connect_failed(correlation_id, "Failed to resolve MongoDb connection", err)
        })?;

        self.logger.debug(correlation_id, format_args!("Connecting to mongodb"));

        let mut settings = ClientOptions::parse(&uri)
            .await
            .map_err(|e| Self::connect_failed(correlation_id, "Connection string for mongodb is invalid", e))?;
        self.compose_settings(&mut settings);

        let database_name = settings.default_database.clone().ok_or_else(|| {
            Self::connect_failed(
                correlation_id,
                "Connection to mongodb failed",
                PersistenceError::config(correlation_id, "NO_DATABASE", "Connection database is not set"),
            )
        })?;

        let client = Client::with_options(settings)
            .map_err(|e| Self::connect_failed(correlation_id, "Create client for mongodb failed", e))?;
        let database = client.database(&database_name);

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| Self::connect_failed(correlation_id, "Connection to mongodb failed", e))?;

        Ok(ConnectionState {
            client,
            database,
            database_name,
        })
    }

    /// Opens the connection. Does nothing when it is already open.
    ///
    /// # Errors
    ///
    /// Returns a connection error with code `CONNECT_FAILED` whose source is the
    /// resolution, client construction or ping failure. Nothing is kept on failure.
    pub async fn open(&self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        let mut state = self.state.write().await;
        if state.is_some() {
            return Ok(());
        }

        let connected = self.connect(correlation_id).await?;
        self.logger.debug(
            correlation_id,
            format_args!("Connected to mongodb database {}", connected.database_name),
        );
        *state = Some(connected);

        Ok(())
    }

    /// Closes the connection. Does nothing when it is not open.
    pub async fn close(&self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        let mut state = self.state.write().await;
        let Some(closed) = state.take() else {
            return Ok(());
        };

        closed.client.shutdown().await;
        self.logger.debug(
            correlation_id,
            format_args!("Disconnected from mongodb database {}", closed.database_name),
        );

        Ok(())
    }
}

impl Default for MongoDbConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MongoDbConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoDbConnection")
            .field("options", &self.options)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

/// Connection shared by another component. Readable, but cannot be opened or closed.
#[derive(Debug, Clone)]
pub struct SharedConnection(Arc<MongoDbConnection>);

impl SharedConnection {
    pub fn new(connection: Arc<MongoDbConnection>) -> Self {
        Self(connection)
    }

    pub fn options(&self) -> &ConfigParams {
        self.0.options()
    }

    pub async fn is_open(&self) -> bool {
        self.0.is_open().await
    }

    pub async fn client(&self) -> Option<Client> {
        self.0.client().await
    }

    pub async fn database(&self) -> Option<Database> {
        self.0.database().await
    }

    pub async fn database_name(&self) -> Option<String> {
        self.0.database_name().await
    }
}

/// Connection used by a persistence component, either created by it or borrowed.
#[derive(Debug)]
pub enum ConnectionHandle {
    Owned(MongoDbConnection),
    Borrowed(SharedConnection),
}

impl ConnectionHandle {
    pub fn is_owned(&self) -> bool {
        matches!(self, ConnectionHandle::Owned(_))
    }

    fn connection(&self) -> &MongoDbConnection {
        match self {
            ConnectionHandle::Owned(connection) => connection,
            ConnectionHandle::Borrowed(shared) => &shared.0,
        }
    }

    pub async fn is_open(&self) -> bool {
        self.connection().is_open().await
    }

    pub(crate) async fn state(&self) -> Option<ConnectionState> {
        self.connection().state().await
    }

    /// Opens an owned connection. A borrowed connection is left to its owner.
    pub async fn open_owned(&self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        match self {
            ConnectionHandle::Owned(connection) => connection.open(correlation_id).await,
            ConnectionHandle::Borrowed(_) => Ok(()),
        }
    }

    /// Closes an owned connection. A borrowed connection is left to its owner.
    pub async fn close_owned(&self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        match self {
            ConnectionHandle::Owned(connection) => connection.close(correlation_id).await,
            ConnectionHandle::Borrowed(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    fn cause_code(err: &PersistenceError) -> Option<String> {
        err.source()
            .and_then(|source| source.downcast_ref::<PersistenceError>())
            .and_then(|cause| cause.code().map(str::to_string))
    }

    #[test]
    fn configuration_overrides_defaults() {
        let mut connection = MongoDbConnection::new();
        connection.configure(&ConfigParams::from_tuples([
            ("options.max_pool_size", "10"),
            ("options.replica_set", "rs0"),
        ]));

        let options = connection.options();
        assert_eq!(options.get("max_pool_size"), Some("10"));
        assert_eq!(options.get("connect_timeout"), Some("5000"));
        assert_eq!(options.get("max_page_size"), Some("100"));
        assert_eq!(options.get("replica_set"), Some("rs0"));
    }

    #[test]
    fn settings_follow_options() {
        let mut connection = MongoDbConnection::new();
        connection.configure(&ConfigParams::from_tuples([
            ("options.keep_alive", "1000"),
            ("options.replica_set", "rs0"),
            ("options.auth_source", "admin"),
            ("options.auth_user", "user"),
            ("options.auth_password", "pass"),
        ]));

        let mut settings = ClientOptions::default();
        connection.compose_settings(&mut settings);

        assert_eq!(settings.max_pool_size, Some(2));
        assert_eq!(settings.max_idle_time, Some(Duration::from_millis(1000)));
        assert_eq!(settings.connect_timeout, Some(Duration::from_millis(5000)));
        assert_eq!(settings.server_selection_timeout, Some(Duration::from_millis(5000)));
        assert_eq!(settings.repl_set_name.as_deref(), Some("rs0"));

        let credential = settings.credential.unwrap();
        assert_eq!(credential.source.as_deref(), Some("admin"));
        assert_eq!(credential.username.as_deref(), Some("user"));
    }

    #[test]
    fn partial_auth_options_are_ignored() {
        let mut connection = MongoDbConnection::new();
        connection.configure(&ConfigParams::from_tuples([
            ("options.auth_user", "user"),
            ("options.auth_password", "pass"),
        ]));

        let mut settings = ClientOptions::default();
        connection.compose_settings(&mut settings);

        assert!(settings.credential.is_none());
        assert_eq!(settings.max_idle_time, None);
    }

    #[tokio::test]
    async fn close_before_open_is_a_no_op() {
        let connection = MongoDbConnection::new();

        connection.close(None).await.unwrap();

        assert!(!connection.is_open().await);
        assert!(connection.client().await.is_none());
    }

    #[tokio::test]
    async fn resolution_failures_are_connect_failures() {
        let connection = MongoDbConnection::new();

        let err = connection.open(Some("123")).await.unwrap_err();

        assert_eq!(err.code(), Some("CONNECT_FAILED"));
        assert_eq!(err.correlation_id(), Some("123"));
        assert_eq!(cause_code(&err).as_deref(), Some("NO_CONNECTION"));
        assert!(!connection.is_open().await);
    }

    #[tokio::test]
    async fn uri_without_database_is_rejected() {
        let mut connection = MongoDbConnection::new();
        connection.configure(&ConfigParams::from_tuples([("connection.uri", "mongodb://localhost:27017")]));

        let err = connection.open(None).await.unwrap_err();

        assert_eq!(err.code(), Some("CONNECT_FAILED"));
        assert_eq!(cause_code(&err).as_deref(), Some("NO_DATABASE"));
        assert!(connection.database_name().await.is_none());
    }

    #[tokio::test]
    async fn unreachable_server_leaves_connection_closed() {
        let mut connection = MongoDbConnection::new();
        connection.configure(&ConfigParams::from_tuples([
            ("connection.host", "127.0.0.1"),
            ("connection.port", "1"),
            ("connection.database", "test"),
            ("options.connect_timeout", "200"),
        ]));

        let err = connection.open(None).await.unwrap_err();

        assert_eq!(err.code(), Some("CONNECT_FAILED"));
        assert!(err.source().is_some());
        assert!(!connection.is_open().await);
    }

    #[tokio::test]
    async fn borrowed_handles_never_open_or_close() {
        let handle = ConnectionHandle::Borrowed(SharedConnection::new(Arc::new(MongoDbConnection::new())));

        handle.open_owned(None).await.unwrap();
        handle.close_owned(None).await.unwrap();

        assert!(!handle.is_owned());
        assert!(!handle.is_open().await);
    }
}
