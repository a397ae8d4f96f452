//! Identifier types and identifier generation.

use bson::{Bson, Document, Uuid, oid::ObjectId};
use std::fmt::Debug;

use crate::mapping::STORAGE_ID_FIELD;

/// Type usable as a document identifier.
///
/// Implemented for `String`, `i32`, `i64`, [`ObjectId`] and [`bson::Uuid`].
pub trait Identifier: Clone + Debug + Into<Bson> + Send + Sync + 'static {}

impl Identifier for String {}
impl Identifier for i32 {}
impl Identifier for i64 {}
impl Identifier for ObjectId {}
impl Identifier for Uuid {}

/// Produces identifiers for documents created without one.
pub trait IdGenerator<K>: Send + Sync + Debug {
    /// Returns a fresh identifier, or `None` when this generator cannot produce one for `K`.
    fn next_id(&self) -> Option<K>;
}

/// Generator used unless another one is configured.
///
/// Strings get a random UUID in simple hex form, [`ObjectId`] and [`bson::Uuid`]
/// get new values. Integer keys have no sensible default and must be supplied by
/// the caller or by a custom generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultIdGenerator;

impl IdGenerator<String> for DefaultIdGenerator {
    fn next_id(&self) -> Option<String> {
        Some(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl IdGenerator<ObjectId> for DefaultIdGenerator {
    fn next_id(&self) -> Option<ObjectId> {
        Some(ObjectId::new())
    }
}

impl IdGenerator<Uuid> for DefaultIdGenerator {
    fn next_id(&self) -> Option<Uuid> {
        Some(Uuid::new())
    }
}

impl IdGenerator<i32> for DefaultIdGenerator {
    fn next_id(&self) -> Option<i32> {
        None
    }
}

impl IdGenerator<i64> for DefaultIdGenerator {
    fn next_id(&self) -> Option<i64> {
        None
    }
}

/// Checks whether a stored document lacks a usable `_id`: missing, `null` or an empty string.
pub fn is_missing_id(document: &Document) -> bool {
    match document.get(STORAGE_ID_FIELD) {
        None | Some(Bson::Null) => true,
        Some(Bson::String(id)) => id.is_empty(),
        Some(_) => false,
    }
}
