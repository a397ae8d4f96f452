//! Connection parameters and their resolution.
//!
//! Connection fragments are read from the `connection` section of a configuration
//! (or from the `connections.<name>` sections for several cluster nodes). A fragment
//! may carry a `discovery_key` instead of concrete values, in which case the
//! [`ConnectionResolver`] asks the [`Discovery`] services registered in
//! [`References`] for the concrete fragments.

use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

use crate::{
    config::ConfigParams,
    error::{PersistenceError, PersistenceResult},
    refer::{Descriptor, References},
};

/// One connection fragment: `uri`, `host`, `port`, `database`, `discovery_key`
/// and any extra driver parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionParams(ConfigParams);

impl ConnectionParams {
    pub fn new(config: ConfigParams) -> Self {
        Self(config)
    }

    /// Creates a fragment from key/value pairs.
    pub fn from_tuples<K, V>(tuples: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(ConfigParams::from_tuples(tuples))
    }

    /// Reads all fragments from `connections.<name>.*` and `connection.*`.
    pub fn many_from_config(config: &ConfigParams) -> Vec<ConnectionParams> {
        let mut result = Vec::new();

        let connections = config.get_section("connections");
        for name in connections.section_names() {
            result.push(Self(connections.get_section(&name)));
        }

        let connection = config.get_section("connection");
        if !connection.is_empty() {
            result.push(Self(connection));
        }

        result
    }

    pub fn uri(&self) -> Option<String> {
        self.0.get_as_nullable_string("uri")
    }

    pub fn host(&self) -> Option<String> {
        self.0.get_as_nullable_string("host")
    }

    /// Port number, or 0 when it is missing or not a valid port.
    pub fn port(&self) -> u16 {
        self.0
            .get_as_nullable_integer("port")
            .and_then(|port| u16::try_from(port).ok())
            .unwrap_or(0)
    }

    pub fn database(&self) -> Option<String> {
        self.0.get_as_nullable_string("database")
    }

    pub fn discovery_key(&self) -> Option<String> {
        self.0.get_as_nullable_string("discovery_key")
    }

    pub fn as_config(&self) -> &ConfigParams {
        &self.0
    }

    pub fn into_config(self) -> ConfigParams {
        self.0
    }

    /// Returns a copy of this fragment with `other` laid over it.
    pub fn override_with(&self, other: &ConnectionParams) -> ConnectionParams {
        Self(self.0.override_with(&other.0))
    }
}

impl From<ConfigParams> for ConnectionParams {
    fn from(config: ConfigParams) -> Self {
        Self(config)
    }
}

/// Discovery service resolving symbolic keys into concrete connection fragments.
#[async_trait]
pub trait Discovery: Send + Sync + Debug {
    /// Returns every fragment registered under `key`. An unknown key yields an empty list.
    async fn resolve_all(
        &self,
        correlation_id: Option<&str>,
        key: &str,
    ) -> PersistenceResult<Vec<ConnectionParams>>;
}

/// Discovery service backed by a static list of registrations.
///
/// Configured either by [`register`](Self::register) or from a configuration
/// where each section name is a discovery key:
///
/// ```ignore
/// let discovery = MemoryDiscovery::from_config(&ConfigParams::from_tuples([
///     ("main.host", "mongo1"),
///     ("main.port", "27017"),
/// ]));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDiscovery {
    items: Vec<(String, ConnectionParams)>,
}

impl MemoryDiscovery {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn from_config(config: &ConfigParams) -> Self {
        let mut discovery = Self::new();
        for key in config.section_names() {
            discovery.register(&key, ConnectionParams(config.get_section(&key)));
        }
        discovery
    }

    pub fn register(&mut self, key: &str, connection: ConnectionParams) -> &mut Self {
        self.items.push((key.to_string(), connection));
        self
    }
}

#[async_trait]
impl Discovery for MemoryDiscovery {
    async fn resolve_all(
        &self,
        _correlation_id: Option<&str>,
        key: &str,
    ) -> PersistenceResult<Vec<ConnectionParams>> {
        Ok(self
            .items
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, connection)| connection.clone())
            .collect())
    }
}

/// Resolves configured connection fragments, following discovery keys.
#[derive(Debug, Clone, Default)]
pub struct ConnectionResolver {
    connections: Vec<ConnectionParams>,
    references: References,
}

impl ConnectionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configured fragments with those found in `config`.
    pub fn configure(&mut self, config: &ConfigParams) {
        self.connections = ConnectionParams::many_from_config(config);
    }

    /// Keeps the references used to locate `*:discovery:*:*:*` services.
    pub fn set_references(&mut self, references: &References) {
        self.references = references.clone();
    }

    pub fn add(&mut self, connection: ConnectionParams) {
        self.connections.push(connection);
    }

    pub fn connections(&self) -> &[ConnectionParams] {
        &self.connections
    }

    /// Resolves every configured fragment.
    ///
    /// A fragment with a `discovery_key` is replaced by the discovered fragments,
    /// each laid over the configured one so that keys the discovery does not
    /// provide (for example `database`) are kept.
    pub async fn resolve_all(&self, correlation_id: Option<&str>) -> PersistenceResult<Vec<ConnectionParams>> {
        let mut resolved = Vec::with_capacity(self.connections.len());

        for connection in &self.connections {
            match connection.discovery_key() {
                Some(key) => {
                    let mut base = connection.clone();
                    base.0.remove("discovery_key");

                    resolved.extend(
                        self.resolve_in_discovery(correlation_id, &key)
                            .await?
                            .iter()
                            .map(|discovered| base.override_with(discovered)),
                    );
                }
                None => resolved.push(connection.clone()),
            }
        }

        Ok(resolved)
    }

    async fn resolve_in_discovery(
        &self,
        correlation_id: Option<&str>,
        key: &str,
    ) -> PersistenceResult<Vec<ConnectionParams>> {
        let discoveries: Vec<Arc<dyn Discovery>> = self
            .references
            .get_optional(&Descriptor::new("*", "discovery", "*", "*", "*"));

        if discoveries.is_empty() {
            return Err(PersistenceError::config(
                correlation_id,
                "CANNOT_RESOLVE",
                format!("Discovery wasn't found to resolve connection {key}"),
            ));
        }

        let mut result = Vec::new();
        for discovery in discoveries {
            result.extend(discovery.resolve_all(correlation_id, key).await?);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovery_references(discovery: MemoryDiscovery) -> References {
        References::new().with(
            Descriptor::new("test", "discovery", "memory", "default", "1.0"),
            Arc::new(discovery) as Arc<dyn Discovery>,
        )
    }

    #[test]
    fn fragments_are_read_from_both_section_forms() {
        let config = ConfigParams::from_tuples([
            ("connections.node1.host", "mongo1"),
            ("connections.node1.port", "27017"),
            ("connections.node2.host", "mongo2"),
            ("connections.node2.port", "27018"),
            ("connection.uri", "mongodb://mongo3/test"),
        ]);

        let connections = ConnectionParams::many_from_config(&config);

        assert_eq!(connections.len(), 3);
        assert_eq!(connections[0].host().as_deref(), Some("mongo1"));
        assert_eq!(connections[1].port(), 27018);
        assert_eq!(connections[2].uri().as_deref(), Some("mongodb://mongo3/test"));
    }

    #[test]
    fn invalid_ports_read_as_zero() {
        assert_eq!(ConnectionParams::from_tuples([("port", "70000")]).port(), 0);
        assert_eq!(ConnectionParams::from_tuples([("port", "abc")]).port(), 0);
        assert_eq!(ConnectionParams::default().port(), 0);
    }

    #[tokio::test]
    async fn plain_fragments_resolve_to_themselves() {
        let mut resolver = ConnectionResolver::new();
        resolver.configure(&ConfigParams::from_tuples([
            ("connection.host", "localhost"),
            ("connection.port", "27017"),
        ]));

        let resolved = resolver.resolve_all(None).await.unwrap();

        assert_eq!(resolved, resolver.connections().to_vec());
    }

    #[tokio::test]
    async fn discovery_keys_are_replaced_by_discovered_fragments() {
        let mut discovery = MemoryDiscovery::new();
        discovery
            .register("main", ConnectionParams::from_tuples([("host", "mongo1"), ("port", "27017")]))
            .register("main", ConnectionParams::from_tuples([("host", "mongo2"), ("port", "27017")]))
            .register("other", ConnectionParams::from_tuples([("host", "elsewhere")]));

        let mut resolver = ConnectionResolver::new();
        resolver.configure(&ConfigParams::from_tuples([
            ("connection.discovery_key", "main"),
            ("connection.database", "test"),
        ]));
        resolver.set_references(&discovery_references(discovery));

        let resolved = resolver.resolve_all(Some("123")).await.unwrap();

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[1].host().as_deref(), Some("mongo2"));
        assert_eq!(resolved[1].database().as_deref(), Some("test"));
        assert!(resolved.iter().all(|c| c.discovery_key().is_none()));
    }

    #[tokio::test]
    async fn discovery_keys_without_discovery_fail() {
        let mut resolver = ConnectionResolver::new();
        resolver.configure(&ConfigParams::from_tuples([("connection.discovery_key", "main")]));

        let err = resolver.resolve_all(Some("123")).await.unwrap_err();

        assert_eq!(err.code(), Some("CANNOT_RESOLVE"));
        assert_eq!(err.correlation_id(), Some("123"));
    }

    #[tokio::test]
    async fn memory_discovery_reads_sections_as_keys() {
        let discovery = MemoryDiscovery::from_config(&ConfigParams::from_tuples([
            ("main.host", "mongo1"),
            ("main.port", "27017"),
        ]));

        let found = discovery.resolve_all(None, "main").await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].port(), 27017);
        assert!(discovery.resolve_all(None, "missing").await.unwrap().is_empty());
    }
}
