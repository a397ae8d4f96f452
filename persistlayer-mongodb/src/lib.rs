//! MongoDB persistence components for persistlayer.
//!
//! This crate builds on `persistlayer-core` and the official `mongodb` driver:
//!
//! - [`MongoDbConnectionResolver`] composes a connection URI from connection and
//!   credential fragments
//! - [`MongoDbConnection`] owns a driver client and can be shared between persistences
//! - [`MongoDbPersistence`] stores documents of any shape with paging, filtering,
//!   random reads, inserts, deletes and counts
//! - [`IdentifiableMongoDbPersistence`] adds per-id reads, upserts, updates and deletes
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! persistlayer = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use persistlayer::{config::ConfigParams, mongodb::IdentifiableMongoDbPersistence};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut persistence = IdentifiableMongoDbPersistence::<User, String>::new("users");
//!     persistence.configure(&ConfigParams::from_tuples([
//!         ("connection.uri", "mongodb://localhost:27017/my_database"),
//!     ]));
//!     persistence.open(None).await?;
//!
//!     let user = persistence.get_one_by_id(None, &"1".to_string()).await?;
//!
//!     persistence.close(None).await?;
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as persistlayer_mongodb;

pub mod connection;
pub mod identifiable;
pub mod persistence;
pub mod resolver;

pub use connection::{ConnectionHandle, MongoDbConnection, SharedConnection};
pub use identifiable::IdentifiableMongoDbPersistence;
pub use persistence::MongoDbPersistence;
pub use resolver::MongoDbConnectionResolver;
