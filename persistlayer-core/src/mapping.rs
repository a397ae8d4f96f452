//! Conversion between public documents and their stored form.
//!
//! Public documents carry their identifier in a field such as `id`; the store
//! keeps it in `_id`. A [`DocumentMapping`] performs that rename in both
//! directions and converts between the caller's type and [`bson::Document`].
//! Every persistence instance uses exactly one mapping.

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{PersistenceError, PersistenceResult};

/// Default name of the identifier field in public documents.
pub const PUBLIC_ID_FIELD: &str = "id";

/// Name of the identifier field in stored documents.
pub const STORAGE_ID_FIELD: &str = "_id";

/// Converts documents of type `T` to and from their stored form.
pub trait DocumentMapping<T>: Send + Sync {
    /// Converts a public document into the stored form.
    ///
    /// # Errors
    ///
    /// Returns an error if `item` does not serialize to a BSON document.
    fn to_storage(&self, item: &T) -> PersistenceResult<Document>;

    /// Converts a stored document into the public form.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be decoded into `T`.
    fn to_public(&self, document: Document) -> PersistenceResult<T>;

    /// Converts a set of public field values (a partial update) into stored field names.
    fn to_storage_partial(&self, fields: Document) -> Document;
}

/// Renames `from` to `to`, keeping the field's position. An existing `to` field is dropped.
pub fn rename_field(document: Document, from: &str, to: &str) -> Document {
    if from == to || !document.contains_key(from) {
        return document;
    }

    document
        .into_iter()
        .filter(|(key, _)| key != to)
        .map(|(key, value)| {
            if key == from {
                (to.to_string(), value)
            } else {
                (key, value)
            }
        })
        .collect()
}

/// Mapping for structured records that go through serde.
///
/// # Example
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Dummy {
///     id: String,
///     key: String,
/// }
///
/// let mapping = SerdeMapping::new();
/// let stored = mapping.to_storage(&Dummy { id: "1".into(), key: "k".into() })?;
/// assert_eq!(stored.get_str("_id")?, "1");
/// ```
#[derive(Debug, Clone)]
pub struct SerdeMapping {
    public_field: String,
}

impl SerdeMapping {
    pub fn new() -> Self {
        Self {
            public_field: PUBLIC_ID_FIELD.to_string(),
        }
    }

    /// Uses another public identifier field, for example `"Id"`.
    pub fn with_public_field(mut self, field: impl Into<String>) -> Self {
        self.public_field = field.into();
        self
    }

    pub fn public_field(&self) -> &str {
        &self.public_field
    }
}

impl Default for SerdeMapping {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DocumentMapping<T> for SerdeMapping
where
    T: Serialize + DeserializeOwned,
{
    fn to_storage(&self, item: &T) -> PersistenceResult<Document> {
        match serialize_to_bson(item)? {
            Bson::Document(document) => Ok(rename_field(document, &self.public_field, STORAGE_ID_FIELD)),
            other => Err(PersistenceError::InvalidDocument(format!(
                "Expected a document, got BSON {:?}",
                other.element_type()
            ))),
        }
    }

    fn to_public(&self, document: Document) -> PersistenceResult<T> {
        let document = rename_field(document, STORAGE_ID_FIELD, &self.public_field);
        Ok(deserialize_from_bson(Bson::Document(document))?)
    }

    fn to_storage_partial(&self, fields: Document) -> Document {
        rename_field(fields, &self.public_field, STORAGE_ID_FIELD)
    }
}

/// Mapping for dynamic documents that are already [`bson::Document`]s.
#[derive(Debug, Clone)]
pub struct RawMapping {
    public_field: String,
}

impl RawMapping {
    pub fn new() -> Self {
        Self {
            public_field: PUBLIC_ID_FIELD.to_string(),
        }
    }

    pub fn with_public_field(mut self, field: impl Into<String>) -> Self {
        self.public_field = field.into();
        self
    }
}

impl Default for RawMapping {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentMapping<Document> for RawMapping {
    fn to_storage(&self, item: &Document) -> PersistenceResult<Document> {
        Ok(rename_field(item.clone(), &self.public_field, STORAGE_ID_FIELD))
    }

    fn to_public(&self, document: Document) -> PersistenceResult<Document> {
        Ok(rename_field(document, STORAGE_ID_FIELD, &self.public_field))
    }

    fn to_storage_partial(&self, fields: Document) -> Document {
        rename_field(fields, &self.public_field, STORAGE_ID_FIELD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Dummy {
        id: String,
        key: String,
        content: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct PascalDummy {
        id: String,
        key: String,
    }

    #[test]
    fn rename_keeps_position_and_drops_existing_target() {
        let renamed = rename_field(doc! { "a": 1, "id": "x", "_id": "stale", "b": 2 }, "id", "_id");

        assert_eq!(renamed, doc! { "a": 1, "_id": "x", "b": 2 });
        assert_eq!(rename_field(doc! { "a": 1 }, "id", "_id"), doc! { "a": 1 });
    }

    #[test]
    fn serde_mapping_moves_identifier_both_ways() {
        let mapping = SerdeMapping::new();
        let dummy = Dummy {
            id: "1".to_string(),
            key: "Key 1".to_string(),
            content: "Content 1".to_string(),
        };

        let stored = DocumentMapping::<Dummy>::to_storage(&mapping, &dummy).unwrap();
        assert_eq!(stored.get_str("_id").unwrap(), "1");
        assert!(!stored.contains_key("id"));

        let restored: Dummy = mapping.to_public(stored).unwrap();
        assert_eq!(restored, dummy);
    }

    #[test]
    fn serde_mapping_supports_another_public_field() {
        let mapping = SerdeMapping::new().with_public_field("Id");
        let dummy = PascalDummy {
            id: "7".to_string(),
            key: "Key".to_string(),
        };

        let stored = DocumentMapping::<PascalDummy>::to_storage(&mapping, &dummy).unwrap();
        assert_eq!(stored, doc! { "_id": "7", "Key": "Key" });

        let partial = DocumentMapping::<PascalDummy>::to_storage_partial(&mapping, doc! { "Id": "8", "Key": "k" });
        assert_eq!(partial, doc! { "_id": "8", "Key": "k" });
    }

    #[test]
    fn non_document_values_are_rejected() {
        let err = DocumentMapping::<String>::to_storage(&SerdeMapping::new(), &"plain".to_string()).unwrap_err();

        assert!(matches!(err, PersistenceError::InvalidDocument(_)));
    }

    #[test]
    fn undecodable_documents_are_serialization_errors() {
        let err = DocumentMapping::<Dummy>::to_public(&SerdeMapping::new(), doc! { "_id": 1 }).unwrap_err();

        assert!(matches!(err, PersistenceError::Serialization(_)));
    }

    #[test]
    fn raw_mapping_renames_only() {
        let mapping = RawMapping::new();

        let stored = mapping.to_storage(&doc! { "id": "1", "key": "k" }).unwrap();
        assert_eq!(stored, doc! { "_id": "1", "key": "k" });
        assert_eq!(mapping.to_public(stored).unwrap(), doc! { "id": "1", "key": "k" });
    }
}
