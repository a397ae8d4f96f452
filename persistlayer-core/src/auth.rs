//! Credential parameters and their resolution.
//!
//! Credentials come from the `credential` section of a configuration (or from
//! `credentials.<name>` sections). A credential with a `store_key` is looked up in
//! the [`CredentialStore`] services registered in [`References`].

use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

use crate::{
    config::ConfigParams,
    error::{PersistenceError, PersistenceResult},
    refer::{Descriptor, References},
};

/// One credential: `username`, `password`, `store_key` and any extra parameters
/// (for example `auth_source`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialParams(ConfigParams);

impl CredentialParams {
    pub fn new(config: ConfigParams) -> Self {
        Self(config)
    }

    pub fn from_tuples<K, V>(tuples: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(ConfigParams::from_tuples(tuples))
    }

    /// Reads all credentials from `credentials.<name>.*` and `credential.*`.
    pub fn many_from_config(config: &ConfigParams) -> Vec<CredentialParams> {
        let mut result = Vec::new();

        let credentials = config.get_section("credentials");
        for name in credentials.section_names() {
            result.push(Self(credentials.get_section(&name)));
        }

        let credential = config.get_section("credential");
        if !credential.is_empty() {
            result.push(Self(credential));
        }

        result
    }

    /// Login name, read from `username` or its `user` alias.
    pub fn username(&self) -> Option<String> {
        self.0
            .get_as_nullable_string("username")
            .or_else(|| self.0.get_as_nullable_string("user"))
    }

    /// Password, read from `password` or its `pass` alias.
    pub fn password(&self) -> Option<String> {
        self.0
            .get_as_nullable_string("password")
            .or_else(|| self.0.get_as_nullable_string("pass"))
    }

    pub fn store_key(&self) -> Option<String> {
        self.0.get_as_nullable_string("store_key")
    }

    pub fn as_config(&self) -> &ConfigParams {
        &self.0
    }

    pub fn into_config(self) -> ConfigParams {
        self.0
    }
}

impl From<ConfigParams> for CredentialParams {
    fn from(config: ConfigParams) -> Self {
        Self(config)
    }
}

/// Secure store holding credentials under symbolic keys.
#[async_trait]
pub trait CredentialStore: Send + Sync + Debug {
    /// Looks up the credential stored under `key`.
    async fn lookup(
        &self,
        correlation_id: Option<&str>,
        key: &str,
    ) -> PersistenceResult<Option<CredentialParams>>;
}

/// Credential store backed by an in-memory list.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    items: Vec<(String, CredentialParams)>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Reads credentials where each section name is a store key.
    pub fn from_config(config: &ConfigParams) -> Self {
        let mut store = Self::new();
        for key in config.section_names() {
            store.store(&key, CredentialParams(config.get_section(&key)));
        }
        store
    }

    /// Stores a credential, replacing any previous one under the same key.
    pub fn store(&mut self, key: &str, credential: CredentialParams) -> &mut Self {
        match self.items.iter_mut().find(|(k, _)| k == key) {
            Some(item) => item.1 = credential,
            None => self.items.push((key.to_string(), credential)),
        }
        self
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn lookup(
        &self,
        _correlation_id: Option<&str>,
        key: &str,
    ) -> PersistenceResult<Option<CredentialParams>> {
        Ok(self
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, credential)| credential.clone()))
    }
}

/// Resolves configured credentials, following store keys.
#[derive(Debug, Clone, Default)]
pub struct CredentialResolver {
    credentials: Vec<CredentialParams>,
    references: References,
}

impl CredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&mut self, config: &ConfigParams) {
        self.credentials = CredentialParams::many_from_config(config);
    }

    pub fn set_references(&mut self, references: &References) {
        self.references = references.clone();
    }

    pub fn add(&mut self, credential: CredentialParams) {
        self.credentials.push(credential);
    }

    pub fn credentials(&self) -> &[CredentialParams] {
        &self.credentials
    }

    /// Returns the first usable credential.
    ///
    /// A credential without `store_key` wins immediately. Otherwise every
    /// credential is looked up in the stores and the first hit is returned.
    /// No configured credentials resolve to `None`.
    pub async fn lookup(&self, correlation_id: Option<&str>) -> PersistenceResult<Option<CredentialParams>> {
        if self.credentials.is_empty() {
            return Ok(None);
        }

        if let Some(local) = self.credentials.iter().find(|c| c.store_key().is_none()) {
            return Ok(Some(local.clone()));
        }

        for credential in &self.credentials {
            if let Some(key) = credential.store_key() {
                if let Some(found) = self.lookup_in_stores(correlation_id, &key).await? {
                    return Ok(Some(found));
                }
            }
        }

        Ok(None)
    }

    async fn lookup_in_stores(
        &self,
        correlation_id: Option<&str>,
        key: &str,
    ) -> PersistenceResult<Option<CredentialParams>> {
        let stores: Vec<Arc<dyn CredentialStore>> = self
            .references
            .get_optional(&Descriptor::new("*", "credential-store", "*", "*", "*"));

        if stores.is_empty() {
            return Err(PersistenceError::config(
                correlation_id,
                "CANNOT_RESOLVE",
                format!("Credential store wasn't found to look up credential {key}"),
            ));
        }

        for store in stores {
            if let Some(found) = store.lookup(correlation_id, key).await? {
                return Ok(Some(found));
            }
        }

        Ok(None)
    }
}
