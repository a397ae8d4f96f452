//! MongoDB persistence for documents with a unique identifier.

use bson::{Bson, Document, doc};
use mongodb::options::{IndexOptions, ReturnDocument};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;

use persistlayer_core::{
    config::ConfigParams,
    error::{PersistenceError, PersistenceResult},
    identity::{DefaultIdGenerator, IdGenerator, Identifier, is_missing_id},
    log::Logger,
    mapping::{DocumentMapping, STORAGE_ID_FIELD},
    page::{Page, PagingParams},
    refer::References,
};

use crate::persistence::MongoDbPersistence;

/// Persistence for documents of type `T` identified by keys of type `K`.
///
/// Adds per-id operations to [`MongoDbPersistence`] and forwards its lifecycle and
/// filter operations. The public identifier field (`id` by default) is stored in
/// `_id`. Documents created or set without an identifier get one from the
/// configured [`IdGenerator`].
///
/// # Example
///
/// ```ignore
/// let mut persistence = IdentifiableMongoDbPersistence::<Dummy, String>::new("dummies");
/// persistence.configure(&config);
/// persistence.open(None).await?;
///
/// let created = persistence.create(None, &dummy).await?;
/// let found = persistence.get_one_by_id(None, &created.id).await?;
/// let deleted = persistence.delete_by_id(None, &created.id).await?;
/// ```
#[derive(Debug)]
pub struct IdentifiableMongoDbPersistence<T, K> {
    base: MongoDbPersistence<T>,
    id_generator: Arc<dyn IdGenerator<K>>,
}

impl<T, K> IdentifiableMongoDbPersistence<T, K>
where
    T: Send + Sync + 'static,
    K: Identifier,
{
    /// Creates a persistence for serde-compatible records using the `id` public field.
    pub fn new(collection: &str) -> Self
    where
        T: Serialize + DeserializeOwned,
        DefaultIdGenerator: IdGenerator<K>,
    {
        Self::from_base(MongoDbPersistence::new(collection), Arc::new(DefaultIdGenerator))
    }

    /// Creates a persistence converting documents with `mapping`.
    pub fn with_mapping(collection: &str, mapping: Arc<dyn DocumentMapping<T>>) -> Self
    where
        DefaultIdGenerator: IdGenerator<K>,
    {
        Self::from_base(MongoDbPersistence::with_mapping(collection, mapping), Arc::new(DefaultIdGenerator))
    }

    pub fn from_base(base: MongoDbPersistence<T>, id_generator: Arc<dyn IdGenerator<K>>) -> Self {
        Self { base, id_generator }
    }

    pub fn with_id_generator(mut self, id_generator: Arc<dyn IdGenerator<K>>) -> Self {
        self.id_generator = id_generator;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.base = self.base.with_logger(logger);
        self
    }

    pub fn base(&self) -> &MongoDbPersistence<T> {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut MongoDbPersistence<T> {
        &mut self.base
    }

    pub fn configure(&mut self, config: &ConfigParams) {
        self.base.configure(config);
    }

    pub fn set_references(&mut self, references: &References) {
        self.base.set_references(references);
    }

    pub fn unset_references(&mut self) {
        self.base.unset_references();
    }

    pub fn ensure_index(&mut self, keys: Document, options: Option<IndexOptions>) {
        self.base.ensure_index(keys, options);
    }

    pub fn is_open(&self) -> bool {
        self.base.is_open()
    }

    pub fn collection_name(&self) -> &str {
        self.base.collection_name()
    }

    pub fn max_page_size(&self) -> u64 {
        self.base.max_page_size()
    }

    pub async fn open(&mut self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        self.base.open(correlation_id).await
    }

    pub async fn close(&mut self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        self.base.close(correlation_id).await
    }

    pub async fn clear(&self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        self.base.clear(correlation_id).await
    }

    pub async fn get_page_by_filter(
        &self,
        correlation_id: Option<&str>,
        filter: Document,
        paging: &PagingParams,
        sort: Option<Document>,
        projection: Option<Document>,
    ) -> PersistenceResult<Page<T>> {
        self.base
            .get_page_by_filter(correlation_id, filter, paging, sort, projection)
            .await
    }

    pub async fn get_list_by_filter(
        &self,
        correlation_id: Option<&str>,
        filter: Document,
        sort: Option<Document>,
        projection: Option<Document>,
    ) -> PersistenceResult<Vec<T>> {
        self.base
            .get_list_by_filter(correlation_id, filter, sort, projection)
            .await
    }

    pub async fn get_one_random(&self, correlation_id: Option<&str>, filter: Document) -> PersistenceResult<Option<T>> {
        self.base.get_one_random(correlation_id, filter).await
    }

    pub async fn delete_by_filter(&self, correlation_id: Option<&str>, filter: Document) -> PersistenceResult<()> {
        self.base.delete_by_filter(correlation_id, filter).await
    }

    pub async fn get_count_by_filter(&self, correlation_id: Option<&str>, filter: Document) -> PersistenceResult<u64> {
        self.base.get_count_by_filter(correlation_id, filter).await
    }

    fn ids_filter(ids: &[K]) -> Document {
        let ids: Vec<Bson> = ids.iter().cloned().map(Into::into).collect();
        doc! { STORAGE_ID_FIELD: { "$in": ids } }
    }

    fn id_filter(id: &K) -> Document {
        let id: Bson = id.clone().into();
        doc! { STORAGE_ID_FIELD: id }
    }

    /// Puts a generated identifier into a stored document that has none.
    fn assign_id(&self, document: &mut Document) -> PersistenceResult<()> {
        if !is_missing_id(document) {
            return Ok(());
        }

        let id = self.id_generator.next_id().ok_or_else(|| {
            PersistenceError::InvalidDocument(
                "Document has no identifier and none can be generated for its key type".to_string(),
            )
        })?;
        document.insert(STORAGE_ID_FIELD, id.into());

        Ok(())
    }

    fn to_public(&self, document: Option<Document>) -> PersistenceResult<Option<T>> {
        document
            .map(|document| self.base.convert_to_public(document))
            .transpose()
    }

    /// Gets a document by its identifier. A missing document is `Ok(None)`.
    pub async fn get_one_by_id(&self, correlation_id: Option<&str>, id: &K) -> PersistenceResult<Option<T>> {
        let document = self
            .base
            .opened_collection(correlation_id)?
            .find_one(Self::id_filter(id))
            .await
            .map_err(PersistenceError::driver)?;

        match &document {
            Some(_) => self.base.logger().trace(
                correlation_id,
                format_args!("Retrieved from {} by id = {:?}", self.collection_name(), id),
            ),
            None => self.base.logger().trace(
                correlation_id,
                format_args!("Nothing found from {} with id = {:?}", self.collection_name(), id),
            ),
        }

        self.to_public(document)
    }

    /// Gets the documents whose identifiers are in `ids`, in the order the store returns them.
    pub async fn get_list_by_ids(&self, correlation_id: Option<&str>, ids: &[K]) -> PersistenceResult<Vec<T>> {
        self.base
            .get_list_by_filter(correlation_id, Self::ids_filter(ids), None, None)
            .await
    }

    /// Inserts a document, generating its identifier when it has none.
    pub async fn create(&self, correlation_id: Option<&str>, item: &T) -> PersistenceResult<T> {
        let collection = self.base.opened_collection(correlation_id)?;

        let mut document = self.base.convert_from_public(item)?;
        self.assign_id(&mut document)?;

        collection
            .insert_one(&document)
            .await
            .map_err(PersistenceError::driver)?;

        self.base.logger().trace(
            correlation_id,
            format_args!(
                "Created in {} with id = {}",
                self.collection_name(),
                document.get(STORAGE_ID_FIELD).unwrap_or(&Bson::Null)
            ),
        );

        self.base.convert_to_public(document)
    }

    /// Replaces the document with the same identifier, inserting it when it does not exist.
    pub async fn set(&self, correlation_id: Option<&str>, item: &T) -> PersistenceResult<Option<T>> {
        let collection = self.base.opened_collection(correlation_id)?;

        let mut document = self.base.convert_from_public(item)?;
        self.assign_id(&mut document)?;
        let id = document.get(STORAGE_ID_FIELD).cloned().unwrap_or(Bson::Null);

        let result = collection
            .find_one_and_replace(doc! { STORAGE_ID_FIELD: id.clone() }, &document)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(PersistenceError::driver)?;

        self.base.logger().trace(
            correlation_id,
            format_args!("Set in {} with id = {}", self.collection_name(), id),
        );

        self.to_public(result)
    }

    /// Updates every field of an existing document. A missing document is `Ok(None)`.
    ///
    /// An item carrying nothing but its identifier returns the current document.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::InvalidDocument`] when `item` has no identifier.
    pub async fn update(&self, correlation_id: Option<&str>, item: &T) -> PersistenceResult<Option<T>> {
        let collection = self.base.opened_collection(correlation_id)?;

        let mut document = self.base.convert_from_public(item)?;
        if is_missing_id(&document) {
            return Err(PersistenceError::InvalidDocument(
                "Cannot update a document without an identifier".to_string(),
            ));
        }
        let id = document.remove(STORAGE_ID_FIELD).unwrap_or(Bson::Null);

        if document.is_empty() {
            let current = collection
                .find_one(doc! { STORAGE_ID_FIELD: id })
                .await
                .map_err(PersistenceError::driver)?;
            return self.to_public(current);
        }

        let result = collection
            .find_one_and_update(doc! { STORAGE_ID_FIELD: id.clone() }, doc! { "$set": document })
            .return_document(ReturnDocument::After)
            .await
            .map_err(PersistenceError::driver)?;

        self.base.logger().trace(
            correlation_id,
            format_args!("Updated in {} with id = {}", self.collection_name(), id),
        );

        self.to_public(result)
    }

    /// Updates only the given public fields of a document. A missing document is `Ok(None)`.
    ///
    /// The identifier field is never changed. With no fields left to set the
    /// current document is returned unchanged.
    pub async fn update_partially(
        &self,
        correlation_id: Option<&str>,
        id: &K,
        fields: Document,
    ) -> PersistenceResult<Option<T>> {
        let collection = self.base.opened_collection(correlation_id)?;

        let mut fields = self.base.convert_from_public_partial(fields);
        fields.remove(STORAGE_ID_FIELD);

        if fields.is_empty() {
            return self.get_one_by_id(correlation_id, id).await;
        }

        let result = collection
            .find_one_and_update(Self::id_filter(id), doc! { "$set": fields })
            .return_document(ReturnDocument::After)
            .await
            .map_err(PersistenceError::driver)?;

        self.base.logger().trace(
            correlation_id,
            format_args!("Updated partially in {} with id = {:?}", self.collection_name(), id),
        );

        self.to_public(result)
    }

    /// Deletes a document by its identifier and returns it. A missing document is `Ok(None)`.
    pub async fn delete_by_id(&self, correlation_id: Option<&str>, id: &K) -> PersistenceResult<Option<T>> {
        let result = self
            .base
            .opened_collection(correlation_id)?
            .find_one_and_delete(Self::id_filter(id))
            .await
            .map_err(PersistenceError::driver)?;

        self.base.logger().trace(
            correlation_id,
            format_args!("Deleted from {} with id = {:?}", self.collection_name(), id),
        );

        self.to_public(result)
    }

    /// Deletes every document whose identifier is in `ids`.
    pub async fn delete_by_ids(&self, correlation_id: Option<&str>, ids: &[K]) -> PersistenceResult<()> {
        self.base
            .delete_by_filter(correlation_id, Self::ids_filter(ids))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Dummy {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        id: String,
        key: String,
        content: String,
    }

    #[derive(Debug)]
    struct FixedIdGenerator;

    impl IdGenerator<i64> for FixedIdGenerator {
        fn next_id(&self) -> Option<i64> {
            Some(42)
        }
    }

    #[test]
    fn missing_string_ids_are_generated() {
        let persistence = IdentifiableMongoDbPersistence::<Dummy, String>::new("dummies");
        let mut document = doc! { "key": "Key 1" };

        persistence.assign_id(&mut document).unwrap();

        assert_eq!(document.get_str("_id").unwrap().len(), 32);
    }

    #[test]
    fn existing_ids_are_kept() {
        let persistence = IdentifiableMongoDbPersistence::<Dummy, ObjectId>::new("dummies");
        let mut document = doc! { "_id": "given", "key": "Key 1" };

        persistence.assign_id(&mut document).unwrap();

        assert_eq!(document.get_str("_id").unwrap(), "given");
    }

    #[test]
    fn integer_keys_need_a_generator() {
        let persistence = IdentifiableMongoDbPersistence::<Dummy, i64>::new("dummies");
        let err = persistence.assign_id(&mut doc! { "_id": Bson::Null }).unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidDocument(_)));

        let persistence = persistence.with_id_generator(Arc::new(FixedIdGenerator));
        let mut document = doc! { "_id": Bson::Null, "key": "k" };
        persistence.assign_id(&mut document).unwrap();
        assert_eq!(document, doc! { "_id": 42_i64, "key": "k" });
    }

    #[test]
    fn id_filters_use_the_storage_field() {
        assert_eq!(
            IdentifiableMongoDbPersistence::<Dummy, String>::id_filter(&"1".to_string()),
            doc! { "_id": "1" }
        );
        assert_eq!(
            IdentifiableMongoDbPersistence::<Dummy, i32>::ids_filter(&[1, 2]),
            doc! { "_id": { "$in": [1, 2] } }
        );
    }

    #[tokio::test]
    async fn per_id_operations_before_open_fail_with_invalid_state() {
        let persistence = IdentifiableMongoDbPersistence::<Dummy, String>::new("dummies");
        let id = "1".to_string();
        let dummy = Dummy {
            id: id.clone(),
            key: "Key 1".to_string(),
            content: "Content 1".to_string(),
        };

        let errors = [
            persistence.get_one_by_id(None, &id).await.unwrap_err(),
            persistence.get_list_by_ids(None, &[id.clone()]).await.unwrap_err(),
            persistence.create(None, &dummy).await.unwrap_err(),
            persistence.set(None, &dummy).await.unwrap_err(),
            persistence.update(None, &dummy).await.unwrap_err(),
            persistence.update_partially(None, &id, doc! { "content": "x" }).await.unwrap_err(),
            persistence.delete_by_id(None, &id).await.unwrap_err(),
            persistence.delete_by_ids(None, &[id.clone()]).await.unwrap_err(),
        ];

        for err in errors {
            assert_eq!(err.code(), Some("NO_CONNECTION"));
        }
    }
}
