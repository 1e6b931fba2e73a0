//! Directory-backed store facade
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<name(collection)>/<name(key)>.cbor   one document per file
//! <root>/<name(collection)>/_indexes.cbor      index specs of the collection
//! ```
//!
//! `name(x)` is the hex encoding of `x`, or `h` followed by the hex SHA-256
//! of `x` when the hex form would be longer than `MAX_HEX_NAME`. Both forms
//! stay well within common file name limits and never collide with each
//! other, since hex output has no `h`.
//!
//! Documents are CBOR-encoded. Replacing a document writes a temporary
//! file and renames it over the old one. Reopening the same root yields
//! the same documents and indexes; the type cache is rebuilt by the
//! catalog's load.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use sha2::{Digest, Sha256};

use super::{
    apply_write, plan_batch, BatchResult, CollectionHandle, Cursor, Durability, IndexSpec,
    StoreError, StoreFacade, TypeCache, WriteResult,
};
use crate::batch::BatchUnit;
use crate::types::{Document, TypeDescriptor, ID_FIELD};

const DOCUMENT_EXT: &str = "cbor";
const INDEX_FILE: &str = "_indexes.cbor";

/// Longest hex name used verbatim for a collection directory or document file.
const MAX_HEX_NAME: usize = 200;
const DIGEST_PREFIX: &str = "h";

fn entry_name(name: &str) -> String {
    let encoded = hex::encode(name);
    if encoded.len() <= MAX_HEX_NAME {
        return encoded;
    }
    format!("{}{}", DIGEST_PREFIX, hex::encode(Sha256::digest(name.as_bytes())))
}

fn encode_cbor<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| StoreError::SerializationError(e.to_string()))?;
    Ok(buf)
}

fn decode_cbor<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(data).map_err(|e| StoreError::DeserializationError(e.to_string()))
}

/// Write `data` to `path` through a temporary sibling file.
fn write_atomic(path: &Path, data: &[u8], durability: Durability) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        if durability == Durability::Journaled {
            file.sync_all()?;
        }
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_document(path: &Path) -> Result<Document, StoreError> {
    let data = fs::read(path)?;
    decode_cbor(&data)
}

pub struct FileCollection {
    name: String,
    dir: PathBuf,
    indexes: RwLock<Vec<IndexSpec>>,
    // Serializes writers; readers go straight to the files.
    write_lock: Mutex<()>,
    closed: Arc<AtomicBool>,
}

impl FileCollection {
    fn open(root: &Path, name: &str, closed: Arc<AtomicBool>) -> Result<Self, StoreError> {
        let dir = root.join(entry_name(name));
        fs::create_dir_all(&dir)?;

        let index_path = dir.join(INDEX_FILE);
        let indexes = if index_path.exists() {
            decode_cbor(&fs::read(&index_path)?)?
        } else {
            Vec::new()
        };

        Ok(Self {
            name: name.to_string(),
            dir,
            indexes: RwLock::new(indexes),
            write_lock: Mutex::new(()),
            closed,
        })
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn document_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", entry_name(key), DOCUMENT_EXT))
    }

    fn read_key(&self, key: &str) -> Result<Option<Document>, StoreError> {
        let path = self.document_path(key);
        if !path.exists() {
            return Ok(None);
        }
        read_document(&path).map(Some)
    }

    fn write_key(&self, key: &str, document: &Document, durability: Durability) -> Result<(), StoreError> {
        write_atomic(&self.document_path(key), &encode_cbor(document)?, durability)
    }

    fn remove_key(&self, key: &str) -> Result<(), StoreError> {
        let path = self.document_path(key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Document files sorted by name, so iteration order is stable.
    fn document_paths(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_document = path.extension().and_then(|ext| ext.to_str()) == Some(DOCUMENT_EXT)
                && path.file_name().and_then(|n| n.to_str()) != Some(INDEX_FILE);
            if is_document {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

impl CollectionHandle for FileCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn save(&self, document: Document, durability: Durability) -> Result<WriteResult, StoreError> {
        self.check_open()?;
        let key = document
            .key(ID_FIELD)
            .ok_or_else(|| StoreError::MissingKey(self.name.clone()))?;

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let inserted = !self.document_path(&key).exists();
        self.write_key(&key, &document, durability)?;

        Ok(WriteResult {
            key,
            inserted,
            durability,
        })
    }

    fn find(&self) -> Result<Cursor, StoreError> {
        self.check_open()?;
        let paths = self.document_paths()?;
        Ok(Box::new(paths.into_iter().map(|path| read_document(&path))))
    }

    fn find_one(&self, key: &str) -> Result<Option<Document>, StoreError> {
        self.check_open()?;
        self.read_key(key)
    }

    fn ensure_index(&self, spec: &IndexSpec) -> Result<bool, StoreError> {
        self.check_open()?;
        let mut indexes = self.indexes.write().unwrap_or_else(PoisonError::into_inner);
        match indexes.iter().find(|i| i.name == spec.name) {
            Some(existing) if existing == spec => return Ok(false),
            Some(existing) => {
                return Err(StoreError::IndexConflict(format!(
                    "{} on '{}' already defined as {:?}",
                    spec.name, self.name, existing.keys
                )))
            }
            None => {}
        }

        indexes.push(spec.clone());
        write_atomic(
            &self.dir.join(INDEX_FILE),
            &encode_cbor(&*indexes)?,
            Durability::Journaled,
        )?;
        Ok(true)
    }

    fn indexes(&self) -> Result<Vec<IndexSpec>, StoreError> {
        self.check_open()?;
        Ok(self.indexes.read().unwrap_or_else(PoisonError::into_inner).clone())
    }
}

/// Store facade persisting collections as directories of CBOR files
pub struct FileStore {
    root: PathBuf,
    collections: RwLock<HashMap<String, Arc<FileCollection>>>,
    types: TypeCache,
    batch_durability: Durability,
    closed: Arc<AtomicBool>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            collections: RwLock::new(HashMap::new()),
            types: TypeCache::new(),
            batch_durability: Durability::Acknowledged,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Durability applied to every document written by `perform_batch`.
    pub fn with_batch_durability(mut self, durability: Durability) -> Self {
        self.batch_durability = durability;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_collection(&self, name: &str) -> Result<Arc<FileCollection>, StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        if let Some(collection) = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(Arc::clone(collection));
        }

        let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(collection) = collections.get(name) {
            return Ok(Arc::clone(collection));
        }
        let collection = Arc::new(FileCollection::open(&self.root, name, Arc::clone(&self.closed))?);
        collections.insert(name.to_string(), Arc::clone(&collection));
        Ok(collection)
    }
}

impl StoreFacade for FileStore {
    fn collection(&self, name: &str) -> Result<Arc<dyn CollectionHandle>, StoreError> {
        let collection: Arc<dyn CollectionHandle> = self.file_collection(name)?;
        Ok(collection)
    }

    fn cache_type_descriptor(&self, descriptor: TypeDescriptor) {
        self.types.insert(descriptor);
    }

    fn type_descriptor(&self, type_name: &str) -> Option<TypeDescriptor> {
        self.types.get(type_name)
    }

    fn types(&self) -> Vec<TypeDescriptor> {
        self.types.all()
    }

    fn perform_batch(&self, units: Vec<BatchUnit>) -> Result<BatchResult, StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        let planned = plan_batch(&units, &self.types)?;

        let mut targets = HashMap::new();
        for write in &planned {
            if !targets.contains_key(write.collection) {
                targets.insert(write.collection, self.file_collection(write.collection)?);
            }
        }

        // Not crash-atomic: a failure midway leaves earlier units applied.
        for (index, write) in planned.iter().enumerate() {
            let collection = &targets[write.collection];
            let _guard = collection
                .write_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            let existing = collection.read_key(&write.key);
            let outcome = existing.and_then(|existing| match apply_write(existing, write) {
                Some(document) => collection.write_key(&write.key, &document, self.batch_durability),
                None => collection.remove_key(&write.key),
            });
            outcome.map_err(|e| StoreError::Batch {
                index,
                reason: e.to_string(),
            })?;
        }

        Ok(BatchResult::new(planned.len()))
    }

    fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::OperationKind;
    use crate::store::{IndexKey, IndexOrder};
    use crate::types::Value;

    #[test]
    fn test_documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            let coll = store.collection("metadata").unwrap();
            coll.save(
                Document::new().with("_id", "Order").with("value", vec![1u8, 2, 3]),
                Durability::Journaled,
            )
            .unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        let coll = store.collection("metadata").unwrap();
        let docs: Vec<Document> = coll.find().unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("value"), Some(&Value::Bytes(vec![1, 2, 3])));
    }

    #[test]
    fn test_indexes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let spec = IndexSpec {
            name: "price_1".into(),
            keys: vec![IndexKey {
                path: "price".into(),
                order: IndexOrder::Ascending,
            }],
            unique: false,
        };
        {
            let store = FileStore::open(dir.path()).unwrap();
            let coll = store.collection("Order").unwrap();
            assert!(coll.ensure_index(&spec).unwrap());
        }

        let store = FileStore::open(dir.path()).unwrap();
        let coll = store.collection("Order").unwrap();
        assert!(!coll.ensure_index(&spec).unwrap());
        assert_eq!(coll.indexes().unwrap(), vec![spec]);
    }

    #[test]
    fn test_keys_with_path_separators() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let coll = store.collection("com.example/Order").unwrap();

        coll.save(Document::new().with("_id", "a/../b"), Durability::Acknowledged)
            .unwrap();
        assert!(coll.find_one("a/../b").unwrap().is_some());
        assert!(coll.find_one("b").unwrap().is_none());
    }

    #[test]
    fn test_long_names_fit_in_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let collection = format!("com.example.grid.{}", "Nested".repeat(30));
        let key = "k".repeat(200);
        {
            let store = FileStore::open(dir.path()).unwrap();
            let coll = store.collection(&collection).unwrap();
            coll.save(Document::new().with("_id", key.as_str()), Durability::Acknowledged)
                .unwrap();
            coll.save(Document::new().with("_id", "short"), Durability::Acknowledged)
                .unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        let coll = store.collection(&collection).unwrap();
        assert!(coll.find_one(&key).unwrap().is_some());
        assert!(coll.find_one(&"k".repeat(199)).unwrap().is_none());
        assert_eq!(coll.find().unwrap().count(), 2);

        for entry in fs::read_dir(dir.path()).unwrap() {
            assert!(entry.unwrap().file_name().len() < 255);
        }
    }

    #[test]
    fn test_entry_name_forms() {
        assert_eq!(entry_name("Order"), hex::encode("Order"));
        let long = entry_name(&"x".repeat(101));
        assert!(long.starts_with(DIGEST_PREFIX));
        assert_eq!(long.len(), 65);
        assert_ne!(long, entry_name(&"x".repeat(102)));
    }

    #[test]
    fn test_batch_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let units = vec![
            BatchUnit::new("Order", OperationKind::Create, Document::new().with("_id", "1").with("status", "open")),
            BatchUnit::new("Order", OperationKind::Change, Document::new().with("_id", "1").with("qty", 5)),
            BatchUnit::new("Order", OperationKind::Create, Document::new().with("_id", "2")),
            BatchUnit::new("Order", OperationKind::DeleteById, Document::new().with("_id", "2")),
        ];
        assert_eq!(store.perform_batch(units).unwrap().applied, 4);

        let coll = store.collection("Order").unwrap();
        let doc = coll.find_one("1").unwrap().unwrap();
        assert_eq!(doc.get("status"), Some(&Value::string("open")));
        assert_eq!(doc.get("qty"), Some(&Value::int(5)));
        assert!(coll.find_one("2").unwrap().is_none());
    }

    #[test]
    fn test_closed_store_rejects_work() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.close().unwrap();
        store.close().unwrap();
        assert!(matches!(store.collection("x"), Err(StoreError::Closed)));
        assert!(matches!(store.perform_batch(Vec::new()), Err(StoreError::Closed)));
    }
}
