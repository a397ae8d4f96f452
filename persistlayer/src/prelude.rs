//! Convenient re-exports of commonly used types from persistlayer.
//!
//! ```ignore
//! use persistlayer::prelude::*;
//! ```
//!
//! This provides access to:
//! - Configuration and component references
//! - Connection and credential resolution
//! - Paging, identity mapping and logging
//! - Error types
//! - MongoDB components when the `mongodb` feature is enabled

pub use persistlayer_core::{
    auth::{CredentialParams, CredentialResolver, CredentialStore, MemoryCredentialStore},
    config::ConfigParams,
    connect::{ConnectionParams, ConnectionResolver, Discovery, MemoryDiscovery},
    error::{PersistenceError, PersistenceResult},
    identity::{DefaultIdGenerator, IdGenerator, Identifier},
    log::{LogLevel, Logger, NullLogger, TracingLogger},
    mapping::{DocumentMapping, RawMapping, SerdeMapping},
    page::{Page, PagingParams},
    refer::{Descriptor, References},
};

#[cfg(feature = "mongodb")]
pub use persistlayer_mongodb::{
    IdentifiableMongoDbPersistence, MongoDbConnection, MongoDbConnectionResolver, MongoDbPersistence,
};
