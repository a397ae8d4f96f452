//! Driver-independent building blocks for document database persistence components.
//!
//! This crate is the core of the persistlayer project and provides:
//!
//! - **Error handling** ([`error`]) - Categorized error type with codes and correlation ids
//! - **Configuration** ([`config`]) - Flat key-value configuration with dotted sections
//! - **References** ([`refer`]) - Descriptor-keyed container for optional collaborators
//! - **Connection resolution** ([`connect`]) - Connection fragments and discovery services
//! - **Credential resolution** ([`auth`]) - Credentials and credential stores
//! - **Paging** ([`page`]) - Paging parameters and result pages
//! - **Identity mapping** ([`mapping`], [`identity`]) - Public/stored id conversion and id generation
//! - **Logging** ([`log`]) - Injected logger collaborator
//!
//! # Example
//!
//! ```ignore
//! use persistlayer_core::{config::ConfigParams, connect::ConnectionResolver};
//!
//! let mut resolver = ConnectionResolver::new();
//! resolver.configure(&ConfigParams::from_tuples([
//!     ("connection.host", "localhost"),
//!     ("connection.port", "27017"),
//!     ("connection.database", "test"),
//! ]));
//!
//! let connections = resolver.resolve_all(Some("123")).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as persistlayer_core;

pub mod auth;
pub mod config;
pub mod connect;
pub mod error;
pub mod identity;
pub mod log;
pub mod mapping;
pub mod page;
pub mod refer;
