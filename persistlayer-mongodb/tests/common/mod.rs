#![allow(dead_code)]

use std::{collections::BTreeSet, env, sync::Arc};

use bson::doc;
use persistlayer_core::{config::ConfigParams, log::TracingLogger, page::PagingParams};
use persistlayer_mongodb::IdentifiableMongoDbPersistence;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dummy {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Dummy {
    pub fn new(id: &str, key: &str, content: &str) -> Self {
        Self {
            id: id.to_string(),
            key: key.to_string(),
            content: content.to_string(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }
}

pub type DummyPersistence = IdentifiableMongoDbPersistence<Dummy, String>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Connection configuration from `MONGO_URI`, or `MONGO_HOST`, `MONGO_PORT` and `MONGO_DB`.
/// `None` when no server is configured.
pub fn config_from_env() -> Option<ConfigParams> {
    if let Ok(uri) = env::var("MONGO_URI") {
        if !uri.is_empty() {
            return Some(ConfigParams::from_tuples([("connection.uri", uri)]));
        }
    }

    let host = env::var("MONGO_HOST").ok().filter(|host| !host.is_empty())?;
    let port = env::var("MONGO_PORT").unwrap_or_else(|_| "27017".to_string());
    let database = env::var("MONGO_DB").unwrap_or_else(|_| "test".to_string());

    Some(ConfigParams::from_tuples([
        ("connection.host", host),
        ("connection.port", port),
        ("connection.database", database),
    ]))
}

/// Opens an empty persistence over `collection`, or `None` when no server is configured.
pub async fn open_persistence(collection: &str, extra: &[(&str, &str)]) -> Option<DummyPersistence> {
    init_tracing();

    let Some(config) = config_from_env() else {
        eprintln!("MONGO_URI or MONGO_HOST is not set, skipping");
        return None;
    };
    let config = config.override_with(&ConfigParams::from_tuples(extra.iter().copied()));

    let mut persistence = DummyPersistence::new(collection).with_logger(Arc::new(TracingLogger));
    persistence.configure(&config);
    persistence.open(Some("test")).await.unwrap();
    persistence.clear(Some("test")).await.unwrap();

    Some(persistence)
}

pub async fn test_crud_operations(persistence: &DummyPersistence) {
    // Create with generated ids
    let dummy1 = persistence
        .create(None, &Dummy::new("", "Key 1", "Content 1"))
        .await
        .unwrap();
    assert!(!dummy1.id.is_empty());
    assert_eq!(dummy1.key, "Key 1");
    assert_eq!(dummy1.content, "Content 1");

    let dummy2 = persistence
        .create(None, &Dummy::new("", "Key 2", "Content 2"))
        .await
        .unwrap();
    assert_ne!(dummy1.id, dummy2.id);

    // Page with and without total
    let page = persistence
        .get_page_by_filter(None, doc! {}, &PagingParams::builder().with_total(true).build(), None, None)
        .await
        .unwrap();
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.total, Some(2));

    let page = persistence
        .get_page_by_filter(None, doc! {}, &PagingParams::default(), Some(doc! { "key": -1 }), None)
        .await
        .unwrap();
    assert_eq!(page.total, None);
    assert_eq!(page.data[0].key, "Key 2");

    // Update every field
    let mut changed = dummy1.clone();
    changed.content = "Updated Content 1".to_string();
    let updated = persistence.update(None, &changed).await.unwrap().unwrap();
    assert_eq!(updated.id, dummy1.id);
    assert_eq!(updated.key, dummy1.key);
    assert_eq!(updated.content, "Updated Content 1");

    // Upsert inserts, then replaces the whole document
    let set = persistence
        .set(None, &Dummy::new("set-1", "Key 3", "Content 3").with_note("first"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(set.id, "set-1");
    assert_eq!(set.note.as_deref(), Some("first"));

    let set = persistence
        .set(None, &Dummy::new("set-1", "Key 3", "Content 3 again"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(set.content, "Content 3 again");
    assert_eq!(set.note, None);
    assert_eq!(persistence.get_one_by_id(None, &set.id).await.unwrap(), Some(set.clone()));

    // Upsert without an id behaves like create
    let generated = persistence
        .set(None, &Dummy::new("", "Key 4", "Content 4"))
        .await
        .unwrap()
        .unwrap();
    assert!(!generated.id.is_empty());
    assert_ne!(generated.id, set.id);
    assert_eq!(persistence.get_one_by_id(None, &generated.id).await.unwrap(), Some(generated.clone()));
    persistence.delete_by_id(None, &generated.id).await.unwrap();

    // Partial update leaves other fields alone
    let partial = persistence
        .update_partially(None, &dummy2.id, doc! { "content": "Partially Updated Content 2" })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(partial.id, dummy2.id);
    assert_eq!(partial.key, dummy2.key);
    assert_eq!(partial.content, "Partially Updated Content 2");

    // Read by id
    let found = persistence.get_one_by_id(None, &dummy2.id).await.unwrap().unwrap();
    assert_eq!(found, partial);

    // Delete by id, then it is gone
    let deleted = persistence.delete_by_id(None, &dummy1.id).await.unwrap().unwrap();
    assert_eq!(deleted.id, dummy1.id);
    assert!(persistence.get_one_by_id(None, &dummy1.id).await.unwrap().is_none());
    assert!(persistence.delete_by_id(None, &dummy1.id).await.unwrap().is_none());
    assert!(persistence.update(None, &dummy1).await.unwrap().is_none());

    // Count and random reads
    assert_eq!(persistence.get_count_by_filter(None, doc! {}).await.unwrap(), 2);

    let random = persistence
        .get_one_random(None, doc! { "key": "Key 2" })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(random.id, dummy2.id);
    assert!(persistence
        .get_one_random(None, doc! { "key": "missing" })
        .await
        .unwrap()
        .is_none());
}

pub async fn test_batch_operations(persistence: &DummyPersistence) {
    let mut ids = BTreeSet::new();
    for n in 1..=3 {
        let created = persistence
            .create(None, &Dummy::new("", &format!("Key {n}"), &format!("Content {n}")))
            .await
            .unwrap();
        ids.insert(created.id);
    }
    let ids: Vec<String> = ids.into_iter().collect();

    // Order of the result is up to the store
    let found: BTreeSet<String> = persistence
        .get_list_by_ids(None, &ids)
        .await
        .unwrap()
        .into_iter()
        .map(|dummy| dummy.id)
        .collect();
    assert_eq!(found.into_iter().collect::<Vec<_>>(), ids);

    persistence.delete_by_ids(None, &ids).await.unwrap();

    assert!(persistence.get_list_by_ids(None, &ids).await.unwrap().is_empty());
    assert_eq!(persistence.get_count_by_filter(None, doc! {}).await.unwrap(), 0);
}
