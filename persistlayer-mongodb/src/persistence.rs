//! Base MongoDB persistence for documents of any shape.

use bson::{Bson, Document};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection, Cursor, Database, IndexModel,
    options::{FindOptions, IndexOptions},
};
use rand::Rng;
use serde::{Serialize, de::DeserializeOwned};
use std::{fmt, sync::Arc};

use persistlayer_core::{
    config::ConfigParams,
    error::{PersistenceError, PersistenceResult},
    identity::{DefaultIdGenerator, IdGenerator, is_missing_id},
    log::{Logger, NullLogger},
    mapping::{DocumentMapping, STORAGE_ID_FIELD, SerdeMapping},
    page::{Page, PagingParams},
    refer::{Descriptor, References},
};

use crate::connection::{ConnectionHandle, MongoDbConnection, SharedConnection};

/// Handles bound by a successful [`MongoDbPersistence::open`].
#[derive(Debug, Clone)]
struct BoundCollection {
    client: Client,
    database: Database,
    database_name: String,
    collection: Collection<Document>,
}

/// Persistence component storing documents of type `T` in one MongoDB collection.
///
/// It is able to store items of any type through its [`DocumentMapping`]. Operations
/// specific to a data type are built on top of it with [`collection`](Self::collection)
/// and the conversion helpers.
///
/// # Configuration
///
/// - `collection` - (optional) collection name
/// - `connection(s)`, `credential(s)` and `options` - as for [`MongoDbConnection`]
///
/// # References
///
/// - `*:connection:mongodb:*:*` (optional) shared `Arc<MongoDbConnection>`; when it is
///   missing the persistence creates, opens and closes its own connection
/// - `*:logger:*:*:*` (optional) logger
/// - `*:discovery:*:*:*`, `*:credential-store:*:*:*` (optional) used by an owned connection
///
/// # Example
///
/// ```ignore
/// let mut persistence = MongoDbPersistence::<Dummy>::new("dummies");
/// persistence.configure(&ConfigParams::from_tuples([
///     ("connection.host", "localhost"),
///     ("connection.port", "27017"),
///     ("connection.database", "test"),
/// ]));
///
/// persistence.open(Some("123")).await?;
/// let page = persistence
///     .get_page_by_filter(Some("123"), doc! { "key": "Key 1" }, &PagingParams::default(), None, None)
///     .await?;
/// ```
pub struct MongoDbPersistence<T> {
    config: ConfigParams,
    references: Option<References>,
    connection: Option<ConnectionHandle>,
    logger: Arc<dyn Logger>,
    mapping: Arc<dyn DocumentMapping<T>>,
    collection_name: String,
    indexes: Vec<IndexModel>,
    max_page_size: u64,
    bound: Option<BoundCollection>,
}

impl<T> MongoDbPersistence<T>
where
    T: Send + Sync + 'static,
{
    /// Creates a persistence for serde-compatible records using the `id` public field.
    pub fn new(collection: &str) -> Self
    where
        T: Serialize + DeserializeOwned,
    {
        Self::with_mapping(collection, Arc::new(SerdeMapping::new()))
    }

    /// Creates a persistence converting documents with `mapping`.
    pub fn with_mapping(collection: &str, mapping: Arc<dyn DocumentMapping<T>>) -> Self {
        Self {
            config: Self::default_config(),
            references: None,
            connection: None,
            logger: Arc::new(NullLogger),
            mapping,
            collection_name: collection.to_string(),
            indexes: Vec::new(),
            max_page_size: 100,
            bound: None,
        }
    }

    fn default_config() -> ConfigParams {
        ConfigParams::from_tuples([
            ("options.max_pool_size", "2"),
            ("options.keep_alive", "1000"),
            ("options.connect_timeout", "5000"),
            ("options.max_page_size", "100"),
        ])
    }

    fn connection_descriptor() -> Descriptor {
        Descriptor::new("*", "connection", "mongodb", "*", "*")
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Applies configuration over the defaults.
    ///
    /// `collection` replaces the collection name given at construction and
    /// `options.max_page_size` the page limit. The whole configuration is kept
    /// for a connection this persistence may create.
    pub fn configure(&mut self, config: &ConfigParams) {
        let config = config.set_defaults(&Self::default_config());

        if let Some(collection) = config.get_as_nullable_string("collection") {
            self.collection_name = collection;
        }
        if let Some(max_page_size) = config
            .get_as_nullable_integer("options.max_page_size")
            .and_then(|size| u64::try_from(size).ok())
            .filter(|size| *size > 0)
        {
            self.max_page_size = max_page_size;
        }

        self.config = config;
    }

    /// Looks up the logger and a shared connection.
    ///
    /// A shared connection found under `*:connection:mongodb:*:*` is borrowed.
    /// Otherwise an owned connection is created unless one is already held.
    /// While the persistence is open the bound connection is kept.
    pub fn set_references(&mut self, references: &References) {
        self.references = Some(references.clone());

        if let Some(logger) = references.get_one_optional::<Arc<dyn Logger>>(&Descriptor::new("*", "logger", "*", "*", "*")) {
            self.logger = logger;
        }

        if self.bound.is_some() {
            self.logger.debug(
                None,
                format_args!("Keeping the open connection of {}", self.collection_name),
            );
            return;
        }

        match references.get_one_optional::<Arc<MongoDbConnection>>(&Self::connection_descriptor()) {
            Some(shared) => {
                self.connection = Some(ConnectionHandle::Borrowed(SharedConnection::new(shared)));
            }
            None if self.connection.is_none() => {
                self.connection = Some(ConnectionHandle::Owned(self.create_connection()));
            }
            None => {}
        }
    }

    /// Drops the connection handle.
    pub fn unset_references(&mut self) {
        self.connection = None;
    }

    fn create_connection(&self) -> MongoDbConnection {
        let mut connection = MongoDbConnection::new().with_logger(self.logger.clone());
        connection.configure(&self.config);
        if let Some(references) = &self.references {
            connection.set_references(references);
        }
        connection
    }

    /// Declares an index created on every [`open`](Self::open). Empty keys are ignored.
    ///
    /// # Arguments
    ///
    /// * `keys` - Index keys, for example `doc! { "key": 1 }`
    /// * `options` - Driver index options such as uniqueness
    pub fn ensure_index(&mut self, keys: Document, options: Option<IndexOptions>) {
        if keys.is_empty() {
            return;
        }

        self.indexes.push(IndexModel::builder().keys(keys).options(options).build());
    }

    pub fn indexes(&self) -> &[IndexModel] {
        &self.indexes
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn max_page_size(&self) -> u64 {
        self.max_page_size
    }

    pub fn connection(&self) -> Option<&ConnectionHandle> {
        self.connection.as_ref()
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    pub fn is_open(&self) -> bool {
        self.bound.is_some()
    }

    pub fn client(&self) -> Option<&Client> {
        self.bound.as_ref().map(|bound| &bound.client)
    }

    pub fn database(&self) -> Option<&Database> {
        self.bound.as_ref().map(|bound| &bound.database)
    }

    pub fn database_name(&self) -> Option<&str> {
        self.bound.as_ref().map(|bound| bound.database_name.as_str())
    }

    pub fn collection(&self) -> Option<&Collection<Document>> {
        self.bound.as_ref().map(|bound| &bound.collection)
    }

    /// Returns the bound collection or an `InvalidState("NO_CONNECTION")` error.
    pub fn opened_collection(&self, correlation_id: Option<&str>) -> PersistenceResult<&Collection<Document>> {
        self.collection().ok_or_else(|| {
            PersistenceError::invalid_state(
                correlation_id,
                "NO_CONNECTION",
                format!("MongoDB persistence for {} is not opened", self.collection_name),
            )
        })
    }

    pub fn convert_from_public(&self, item: &T) -> PersistenceResult<Document> {
        self.mapping.to_storage(item)
    }

    pub fn convert_to_public(&self, document: Document) -> PersistenceResult<T> {
        self.mapping.to_public(document)
    }

    pub fn convert_from_public_partial(&self, fields: Document) -> Document {
        self.mapping.to_storage_partial(fields)
    }

    /// Opens the persistence. Does nothing when it is already open.
    ///
    /// An owned connection is opened first; a borrowed one must already be open.
    /// Declared indexes are created in one batch.
    ///
    /// # Errors
    ///
    /// Returns `CONNECT_FAILED` when the connection cannot be opened or is not open,
    /// and `CREATE_IDX_FAILED` when index creation fails. Nothing is bound on failure.
    pub async fn open(&mut self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        if self.bound.is_some() {
            return Ok(());
        }

        if self.connection.is_none() {
            self.connection = Some(ConnectionHandle::Owned(self.create_connection()));
        }
        let Some(connection) = &self.connection else {
            return Err(PersistenceError::invalid_state(
                correlation_id,
                "NO_CONNECTION",
                "MongoDB connection is missing",
            ));
        };

        connection.open_owned(correlation_id).await?;

        let Some(state) = connection.state().await else {
            return Err(PersistenceError::connection(
                correlation_id,
                "CONNECT_FAILED",
                "MongoDB connection is not opened",
            ));
        };

        let collection = state.database.collection::<Document>(&self.collection_name);

        if !self.indexes.is_empty() {
            let created = collection
                .create_indexes(self.indexes.clone())
                .await
                .map_err(|e| {
                    PersistenceError::connection(correlation_id, "CREATE_IDX_FAILED", "Recreate indexes failed")
                        .with_cause(e)
                })?;

            for name in created.index_names {
                self.logger.debug(
                    correlation_id,
                    format_args!("Created index {} for collection {}", name, self.collection_name),
                );
            }
        }

        self.logger.debug(
            correlation_id,
            format_args!(
                "Connected to mongodb database {}, collection {}",
                state.database_name, self.collection_name
            ),
        );

        self.bound = Some(BoundCollection {
            client: state.client,
            database: state.database,
            database_name: state.database_name,
            collection,
        });

        Ok(())
    }

    /// Closes the persistence. Does nothing when it is not open.
    ///
    /// Only an owned connection is closed. On error the persistence stays open so
    /// that closing can be retried.
    pub async fn close(&mut self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        if self.bound.is_none() {
            return Ok(());
        }

        let Some(connection) = &self.connection else {
            return Err(PersistenceError::invalid_state(
                correlation_id,
                "NO_CONNECTION",
                "MongoDB connection is missing",
            ));
        };

        connection.close_owned(correlation_id).await?;
        self.bound = None;

        Ok(())
    }

    /// Drops the collection.
    pub async fn clear(&self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        if self.collection_name.is_empty() {
            return Err(PersistenceError::config(
                correlation_id,
                "NO_COLLECTION",
                "Collection name is not defined",
            ));
        }

        self.opened_collection(correlation_id)?
            .drop()
            .await
            .map_err(|e| {
                PersistenceError::connection(correlation_id, "CLEAR_FAILED", "Clear collection failed").with_cause(e)
            })?;

        Ok(())
    }

    async fn collect_public(&self, cursor: Cursor<Document>) -> PersistenceResult<Vec<T>> {
        Ok(cursor
            .try_collect::<Vec<Document>>()
            .await
            .map_err(PersistenceError::driver)?
            .into_iter()
            .filter_map(|document| self.mapping.to_public(document).ok())
            .collect())
    }

    /// Gets a page of documents matching `filter`.
    ///
    /// The page holds at most [`max_page_size`](Self::max_page_size) items. The total
    /// is counted only when `paging.total` is set. Documents that cannot be decoded
    /// are skipped.
    ///
    /// # Arguments
    ///
    /// * `filter` - Query filter, `doc! {}` for all documents
    /// * `paging` - Skip, take and total flag
    /// * `sort` - Optional sort document
    /// * `projection` - Optional projection document
    pub async fn get_page_by_filter(
        &self,
        correlation_id: Option<&str>,
        filter: Document,
        paging: &PagingParams,
        sort: Option<Document>,
        projection: Option<Document>,
    ) -> PersistenceResult<Page<T>> {
        let collection = self.opened_collection(correlation_id)?;

        let mut options = FindOptions::default();
        options.skip = paging.get_skip();
        options.limit = Some(i64::try_from(paging.get_take(self.max_page_size)).unwrap_or(i64::MAX));
        options.sort = sort;
        options.projection = projection;

        let cursor = collection
            .find(filter.clone())
            .with_options(options)
            .await
            .map_err(PersistenceError::driver)?;
        let items = self.collect_public(cursor).await?;

        self.logger.trace(
            correlation_id,
            format_args!("Retrieved {} from {}", items.len(), self.collection_name),
        );

        let total = if paging.has_total() {
            Some(
                collection
                    .count_documents(filter)
                    .await
                    .map_err(PersistenceError::driver)?,
            )
        } else {
            None
        };

        Ok(Page::builder(items).with_total_opt(total).build())
    }

    /// Gets every document matching `filter`, without paging.
    pub async fn get_list_by_filter(
        &self,
        correlation_id: Option<&str>,
        filter: Document,
        sort: Option<Document>,
        projection: Option<Document>,
    ) -> PersistenceResult<Vec<T>> {
        let collection = self.opened_collection(correlation_id)?;

        let mut options = FindOptions::default();
        options.sort = sort;
        options.projection = projection;

        let cursor = collection
            .find(filter)
            .with_options(options)
            .await
            .map_err(PersistenceError::driver)?;
        let items = self.collect_public(cursor).await?;

        self.logger.trace(
            correlation_id,
            format_args!("Retrieved {} from {}", items.len(), self.collection_name),
        );

        Ok(items)
    }

    /// Gets a random document matching `filter`, or `None` when nothing matches.
    ///
    /// The document is read at a random offset of the filtered scan, so the choice
    /// is only as uniform as the scan order is stable.
    pub async fn get_one_random(&self, correlation_id: Option<&str>, filter: Document) -> PersistenceResult<Option<T>> {
        let collection = self.opened_collection(correlation_id)?;

        let count = collection
            .count_documents(filter.clone())
            .await
            .map_err(PersistenceError::driver)?;

        let skip = if count > 0 { rand::rng().random_range(0..count) } else { 0 };

        let mut options = FindOptions::default();
        options.skip = Some(skip);
        options.limit = Some(1);

        let document = collection
            .find(filter)
            .with_options(options)
            .await
            .map_err(PersistenceError::driver)?
            .try_next()
            .await
            .map_err(PersistenceError::driver)?;

        document.map(|document| self.mapping.to_public(document)).transpose()
    }

    /// Converts `item` for insertion, filling in a missing identifier.
    ///
    /// An empty string identifier is replaced by a generated string. A `null` one is
    /// removed so that the server assigns an `ObjectId`.
    fn to_insertable(&self, item: &T) -> PersistenceResult<Document> {
        let mut document = self.mapping.to_storage(item)?;

        if is_missing_id(&document) {
            if let Some(Bson::String(_)) = document.remove(STORAGE_ID_FIELD) {
                let id: Option<String> = DefaultIdGenerator.next_id();
                if let Some(id) = id {
                    document.insert(STORAGE_ID_FIELD, id);
                }
            }
        }

        Ok(document)
    }

    /// Inserts a document and returns it with the identifier assigned by the store.
    ///
    /// An empty string identifier is replaced by a generated string. A missing or
    /// `null` one is left to the server, which assigns an `ObjectId`.
    pub async fn create(&self, correlation_id: Option<&str>, item: &T) -> PersistenceResult<T> {
        let collection = self.opened_collection(correlation_id)?;

        let mut document = self.to_insertable(item)?;

        let result = collection
            .insert_one(&document)
            .await
            .map_err(PersistenceError::driver)?;

        self.logger.trace(
            correlation_id,
            format_args!("Created in {} with id = {}", self.collection_name, result.inserted_id),
        );

        document.insert(STORAGE_ID_FIELD, result.inserted_id);
        self.mapping.to_public(document)
    }

    /// Deletes every document matching `filter`.
    pub async fn delete_by_filter(&self, correlation_id: Option<&str>, filter: Document) -> PersistenceResult<()> {
        let result = self
            .opened_collection(correlation_id)?
            .delete_many(filter)
            .await
            .map_err(PersistenceError::driver)?;

        self.logger.trace(
            correlation_id,
            format_args!("Deleted {} items from {}", result.deleted_count, self.collection_name),
        );

        Ok(())
    }

    /// Counts the documents matching `filter`.
    pub async fn get_count_by_filter(&self, correlation_id: Option<&str>, filter: Document) -> PersistenceResult<u64> {
        let count = self
            .opened_collection(correlation_id)?
            .count_documents(filter)
            .await
            .map_err(PersistenceError::driver)?;

        self.logger.trace(
            correlation_id,
            format_args!("Counted {} items in {}", count, self.collection_name),
        );

        Ok(count)
    }
}

impl<T> fmt::Debug for MongoDbPersistence<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoDbPersistence")
            .field("collection_name", &self.collection_name)
            .field("max_page_size", &self.max_page_size)
            .field("connection", &self.connection)
            .field("indexes", &self.indexes.len())
            .field("open", &self.bound.is_some())
            .finish_non_exhaustive()
    }
}
