//! Main persistlayer crate providing persistence components for document databases.
//!
//! This crate is the primary entry point for users of the persistlayer framework.
//! It re-exports the core types from `persistlayer-core` and the MongoDB components
//! from `persistlayer-mongodb`.
//!
//! # Features
//!
//! - **Connection resolution** - Compose connection URIs from host, port, credential
//!   and discovery configuration
//! - **Connection lifecycle** - Owned or shared connections with idempotent open and close
//! - **Generic CRUD** - Paged, listed, random and counted reads, inserts and deletes by filter
//! - **Identifiable documents** - Reads, upserts, updates and deletes by id with id generation
//!
//! # Quick Start
//!
//! ```ignore
//! use persistlayer::{prelude::*, bson::doc};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     pub id: String,
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> PersistenceResult<()> {
//!     let mut users = IdentifiableMongoDbPersistence::<User, String>::new("users");
//!     users.configure(&ConfigParams::from_tuples([
//!         ("connection.host", "localhost"),
//!         ("connection.port", "27017"),
//!         ("connection.database", "app"),
//!     ]));
//!     users.ensure_index(doc! { "name": 1 }, None);
//!     users.open(Some("startup")).await?;
//!
//!     // An empty id is replaced by a generated one
//!     let alice = users
//!         .create(None, &User { id: String::new(), name: "Alice".to_string() })
//!         .await?;
//!
//!     let page = users
//!         .get_page_by_filter(
//!             None,
//!             doc! { "name": "Alice" },
//!             &PagingParams::builder().with_take(10).with_total(true).build(),
//!             None,
//!             None,
//!         )
//!         .await?;
//!     println!("Found {:?} users", page.total);
//!
//!     users.delete_by_id(None, &alice.id).await?;
//!     users.close(Some("shutdown")).await
//! }
//! ```
//!
//! # Sharing a connection
//!
//! Persistences that receive a `*:connection:mongodb:*:*` reference borrow that
//! connection instead of creating one. The owner opens and closes it.
//!
//! ```ignore
//! use std::sync::Arc;
//! use persistlayer::prelude::*;
//!
//! let mut connection = MongoDbConnection::new();
//! connection.configure(&config);
//! let connection = Arc::new(connection);
//! connection.open(None).await?;
//!
//! let references = References::new()
//!     .with(Descriptor::new("app", "connection", "mongodb", "default", "1.0"), connection.clone());
//!
//! let mut users = IdentifiableMongoDbPersistence::<User, String>::new("users");
//! users.set_references(&references);
//! users.open(None).await?;
//! ```
//!
//! # Backends
//!
//! - [`mongodb`] - MongoDB components (requires the `mongodb` feature, enabled by default)

pub mod prelude;

pub use persistlayer_core::{auth, config, connect, error, identity, log, mapping, page, refer};

// Re-export BSON types for convenience
pub use bson;

/// MongoDB persistence components.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use persistlayer_mongodb::{
        ConnectionHandle, IdentifiableMongoDbPersistence, MongoDbConnection, MongoDbConnectionResolver,
        MongoDbPersistence, SharedConnection,
    };
}
