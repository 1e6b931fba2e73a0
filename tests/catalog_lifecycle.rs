//! Catalog lifecycle over a file store: introduce, restart, load, batch.
//!
//! Run with:
//!   cargo test --test catalog_lifecycle

use std::sync::{Arc, Mutex};
use std::thread;

use gridsync::codec::{MetadataRecord, DESCRIPTOR_FIELD};
use gridsync::index::{IndexBuilder, IndexDeriver, IndexError};
use gridsync::store::{CollectionHandle, Durability, FileStore, StoreFacade};
use gridsync::types::ID_FIELD;
use gridsync::{
    AddIndexRequest, CatalogConfig, CatalogError, DataSyncOperation, Document, IndexDescriptor,
    MetadataCatalog, OperationKind, TypeDescriptor, TypeIntroduction, Value,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Counts derivation requests, then forwards to a real `IndexBuilder`.
struct CountingDeriver {
    inner: IndexBuilder,
    seen: Mutex<Vec<TypeDescriptor>>,
}

impl CountingDeriver {
    fn new(store: Arc<dyn StoreFacade>) -> Self {
        Self {
            inner: IndexBuilder::new(store),
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl IndexDeriver for CountingDeriver {
    fn ensure_indexes(&self, descriptor: &TypeDescriptor) -> Result<(), IndexError> {
        self.seen.lock().unwrap().push(descriptor.clone());
        self.inner.ensure_indexes(descriptor)
    }

    fn ensure_added(&self, request: &AddIndexRequest) -> Result<(), IndexError> {
        self.inner.ensure_added(request)
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn order_type() -> TypeDescriptor {
    TypeDescriptor::new("Order")
        .with_property("id", "int64")
        .with_property("status", "string")
        .with_id_property("id")
        .with_index(IndexDescriptor::equality("status"))
}

/// Store key of a document whose id is the integer `id`.
fn int_key(id: i64) -> String {
    Value::int(id).as_key().unwrap()
}

fn open_catalog(dir: &std::path::Path) -> (Arc<FileStore>, MetadataCatalog) {
    let store = Arc::new(FileStore::open(dir).unwrap());
    let catalog = MetadataCatalog::new(store.clone(), CatalogConfig::default());
    (store, catalog)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn introduced_type_survives_restart() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();

    {
        let (_store, catalog) = open_catalog(dir.path());
        catalog
            .introduce_type(&TypeIntroduction::new(order_type()))
            .unwrap();
        assert_eq!(catalog.get_types().len(), 1);
        catalog.close().unwrap();
    }

    let (store, catalog) = open_catalog(dir.path());
    assert!(catalog.get_types().is_empty());

    let loaded = catalog.load_metadata().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(*loaded[0], order_type());
    assert_eq!(catalog.get_type("Order").as_deref(), Some(&order_type()));

    // Loading re-derives indexes; they were already there, so nothing is duplicated.
    let indexes = store.collection("Order").unwrap().indexes().unwrap();
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].name, "status_hashed");
}

#[test]
fn order_scenario() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn StoreFacade> = Arc::new(FileStore::open(dir.path()).unwrap());
    let deriver = Arc::new(CountingDeriver::new(Arc::clone(&store)));
    let catalog = MetadataCatalog::new(Arc::clone(&store), CatalogConfig::default())
        .with_index_deriver(deriver.clone());

    catalog
        .introduce_type(&TypeIntroduction::new(order_type()))
        .unwrap();

    assert!(catalog.get_type("Order").is_some());
    assert_eq!(*deriver.seen.lock().unwrap(), vec![order_type()]);

    let ops = vec![
        DataSyncOperation::create("Order", Document::new().with("id", 1).with("status", "open")),
        DataSyncOperation::delete("Order", Document::new().with("id", 1)),
    ];
    let units = gridsync::translate(&ops).unwrap();
    assert_eq!(units.len(), 2);
    assert_eq!(units[0].kind, OperationKind::Create);
    assert_eq!(units[1].kind, OperationKind::Delete);
    assert_eq!(Some(&units[0].document), ops[0].document.as_ref());
    assert_eq!(Some(&units[1].document), ops[1].document.as_ref());

    let result = catalog.perform_batch(&ops).unwrap();
    assert_eq!(result.applied, 2);
    assert!(store.collection("Order").unwrap().find_one(&int_key(1)).unwrap().is_none());
}

#[test]
fn corrupt_record_leaves_catalog_empty() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let (store, catalog) = open_catalog(dir.path());

    store
        .collection("metadata")
        .unwrap()
        .save(
            Document::new()
                .with(ID_FIELD, "Order")
                .with(DESCRIPTOR_FIELD, vec![0xde_u8, 0xad, 0xbe, 0xef]),
            Durability::Acknowledged,
        )
        .unwrap();

    assert!(matches!(catalog.load_metadata(), Err(CatalogError::Decode(_))));
    assert!(catalog.get_types().is_empty());
    assert!(!catalog.is_loaded());
    assert!(store.types().is_empty());
}

#[test]
fn ensure_indexes_twice_is_harmless() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let (store, catalog) = open_catalog(dir.path());
    catalog
        .introduce_type(&TypeIntroduction::new(order_type()))
        .unwrap();

    let request = AddIndexRequest::new(
        "Order",
        vec![IndexDescriptor::compound(["status", "id"]).unique()],
    );
    catalog.ensure_indexes(&request).unwrap();
    catalog.ensure_indexes(&request).unwrap();

    let names: Vec<String> = store
        .collection("Order")
        .unwrap()
        .indexes()
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(names, vec!["status_hashed", "status_1_id_1"]);
    assert_eq!(catalog.get_type("Order").unwrap().indexes.len(), 1);
}

#[test]
fn last_introduction_wins() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    {
        let (_store, catalog) = open_catalog(dir.path());
        catalog
            .introduce_type(&TypeIntroduction::new(order_type()))
            .unwrap();
        catalog
            .introduce_type(&TypeIntroduction::new(
                order_type().with_property("total", "float64"),
            ))
            .unwrap();
    }

    let (store, catalog) = open_catalog(dir.path());
    catalog.load_metadata().unwrap();
    let order = catalog.get_type("Order").unwrap();
    assert!(order.has_property("total"));

    let records: Vec<Document> = store
        .collection("metadata")
        .unwrap()
        .find()
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 1);
    let record = MetadataRecord::from_document(&records[0]).unwrap();
    assert_eq!(record.type_name, "Order");
}

#[test]
fn readers_see_whole_descriptors_during_introduction() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let (_store, catalog) = open_catalog(dir.path());
    let catalog = Arc::new(catalog);

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let catalog = Arc::clone(&catalog);
            thread::spawn(move || {
                for i in 0..10 {
                    let descriptor = TypeDescriptor::new(format!("T{}_{}", w, i))
                        .with_property("id", "int64")
                        .with_property("label", "string")
                        .with_index(IndexDescriptor::equality("label"));
                    catalog
                        .introduce_type(&TypeIntroduction::new(descriptor))
                        .unwrap();
                }
            })
        })
        .collect();

    let reader = {
        let catalog = Arc::clone(&catalog);
        thread::spawn(move || {
            for _ in 0..50 {
                for t in catalog.get_types() {
                    assert_eq!(t.properties.len(), 2);
                    assert_eq!(t.indexes.len(), 1);
                }
            }
        })
    };

    for w in writers {
        w.join().unwrap();
    }
    reader.join().unwrap();

    assert_eq!(catalog.get_types().len(), 40);
}

#[test]
fn batch_with_keyless_document_fails_whole_batch() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let (store, catalog) = open_catalog(dir.path());
    catalog
        .introduce_type(&TypeIntroduction::new(order_type()))
        .unwrap();

    let ops = vec![
        DataSyncOperation::create("Order", Document::new().with("id", 1)),
        DataSyncOperation::update("Order", Document::new().with("status", Value::Null)),
    ];
    assert!(matches!(
        catalog.perform_batch(&ops),
        Err(CatalogError::Batch(_))
    ));
    assert!(store.collection("Order").unwrap().find_one(&int_key(1)).unwrap().is_none());
}

#[test]
fn long_type_names_survive_restart() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let name = format!("com.example.grid.model.{}Order", "Deeply".repeat(20));
    let descriptor = TypeDescriptor::new(name.as_str())
        .with_property("id", "int64")
        .with_id_property("id");

    {
        let (_store, catalog) = open_catalog(dir.path());
        catalog
            .introduce_type(&TypeIntroduction::new(descriptor.clone()))
            .unwrap();
        let ops = vec![DataSyncOperation::create(
            name.as_str(),
            Document::new().with("id", 7),
        )];
        catalog.perform_batch(&ops).unwrap();
    }

    let (store, catalog) = open_catalog(dir.path());
    catalog.load_metadata().unwrap();
    assert_eq!(catalog.get_type(&name).as_deref(), Some(&descriptor));
    assert!(store.collection(&name).unwrap().find_one(&int_key(7)).unwrap().is_some());
}

#[test]
fn load_runs_alongside_introductions_and_readers() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let (store, seed) = open_catalog(dir.path());

    let labelled = |name: String| {
        TypeDescriptor::new(name)
            .with_property("id", "int64")
            .with_property("label", "string")
            .with_index(IndexDescriptor::equality("label"))
    };
    for i in 0..10 {
        seed.introduce_type(&TypeIntroduction::new(labelled(format!("Seed{}", i))))
            .unwrap();
    }

    let catalog = Arc::new(MetadataCatalog::new(store, CatalogConfig::default()));

    let loader = {
        let catalog = Arc::clone(&catalog);
        thread::spawn(move || {
            for _ in 0..5 {
                let loaded = catalog.load_metadata().unwrap();
                assert!(loaded.len() >= 10);
            }
        })
    };

    let writer = {
        let catalog = Arc::clone(&catalog);
        thread::spawn(move || {
            for i in 0..20 {
                catalog
                    .introduce_type(&TypeIntroduction::new(labelled(format!("Live{}", i))))
                    .unwrap();
            }
        })
    };

    let reader = {
        let catalog = Arc::clone(&catalog);
        thread::spawn(move || {
            for _ in 0..100 {
                let types = catalog.get_types();
                for t in &types {
                    assert_eq!(t.properties.len(), 2);
                    assert_eq!(t.indexes.len(), 1);
                }
                assert!(types.windows(2).all(|w| w[0].type_name < w[1].type_name));
            }
        })
    };

    loader.join().unwrap();
    writer.join().unwrap();
    reader.join().unwrap();

    assert!(catalog.is_loaded());
    assert_eq!(catalog.get_types().len(), 30);
}
