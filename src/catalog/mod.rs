use std::sync::Mutex;

use tracing::{info, warn};

use self::error::{CatalogError, Result};
use self::index::CatalogIndex;
use self::schema::{Attribute, Schema};
use self::store::CatalogStore;
use crate::storage::BlockStore;

pub mod codec;
pub mod error;
pub mod index;
pub mod schema;
pub mod store;

/// The directory of all tables.
///
/// Every mutation is written to the catalog file first and reaches the in-memory index
/// only once the writes succeeded, so the index never shows a state that a restart
/// could not rebuild. Mutations are serialized by the store lock, lookups never take it.
pub struct Catalog<'a> {
    store: Mutex<CatalogStore<'a>>,
    index: CatalogIndex,
}

impl<'a> Catalog<'a> {
    /// Opens the catalog file, creating it if needed, and rebuilds the index from it.
    pub fn init(block_store: &'a dyn BlockStore) -> Result<Self> {
        let store = CatalogStore::open(block_store)?;
        let index = CatalogIndex::new();

        let contents = store.load()?;
        for (block_no, schema) in contents.tables {
            let table_name = schema.table_name().to_owned();
            if !index.insert_back(schema, block_no) {
                return Err(CatalogError::CorruptCatalog(format!(
                    "table '{table_name}' is stored more than once"
                )));
            }
        }
        info!(
            tables = index.len(),
            dropped = contents.dropped,
            "loaded catalog"
        );

        Ok(Self {
            store: Mutex::new(store),
            index,
        })
    }

    /// Shuts the catalog down. All writes are already durable, only the index is released.
    pub fn exit(self) {
        let tables = self.index.len();
        self.index.clear();
        info!(tables, "closed catalog");
    }

    pub fn has_table(&self, table_name: &str) -> bool {
        self.index.contains(table_name)
    }

    pub fn get_schema(&self, table_name: &str) -> Result<Schema> {
        self.index
            .get(table_name)
            .ok_or_else(|| CatalogError::TableNotFound(table_name.to_owned()))
    }

    /// Table names, most recently created first.
    pub fn list_tables(&self) -> Vec<String> {
        self.index.table_names()
    }

    pub fn create_table(
        &self,
        table_name: &str,
        primary_key: &str,
        attributes: Vec<Attribute>,
    ) -> Result<()> {
        let store = self.store.lock().unwrap();
        if self.index.contains(table_name) {
            return Err(CatalogError::TableAlreadyExists(table_name.to_owned()));
        }
        let schema = Schema::new(table_name, primary_key, attributes);
        schema.validate()?;

        let block_no = store.append(&schema).map_err(|e| {
            warn!(table = table_name, error = %e, "failed to persist table");
            e
        })?;
        self.index.insert_front(schema, block_no);
        info!(table = table_name, block_no, "created table");

        Ok(())
    }

    pub fn drop_table(&self, table_name: &str) -> Result<()> {
        let store = self.store.lock().unwrap();
        let block_no = self
            .index
            .offset(table_name)
            .ok_or_else(|| CatalogError::TableNotFound(table_name.to_owned()))?;

        store.tombstone(block_no).map_err(|e| {
            warn!(table = table_name, error = %e, "failed to drop table");
            e
        })?;
        self.index.remove(table_name);
        info!(table = table_name, block_no, "dropped table");

        Ok(())
    }

    pub fn create_index(
        &self,
        _index_name: &str,
        _table_name: &str,
        _attr_name: &str,
    ) -> Result<()> {
        Err(CatalogError::NotImplemented("create index"))
    }

    pub fn drop_index(&self, _index_name: &str) -> Result<()> {
        Err(CatalogError::NotImplemented("drop index"))
    }
}

#[cfg(test)]
mod tests {

    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::{Error, Result};
    use tempfile::tempdir;

    use super::error::CatalogError;
    use super::schema::{Attribute, DataType, Schema};
    use super::Catalog;
    use crate::buffer::buffer_manager::BufferManager;
    use crate::common::CATALOG_FILE_NAME;
    use crate::storage::file_manager::FileManager;
    use crate::storage::{Block, BlockId, BlockStore, FileKind};

    fn open(data_dir: &Path) -> Result<BufferManager> {
        Ok(BufferManager::new(FileManager::new(data_dir)?, 4))
    }

    fn attributes() -> Vec<Attribute> {
        vec![
            Attribute::new("id", DataType::Int, true),
            Attribute::new("name", DataType::Char(40), false),
            Attribute::new("email", DataType::Char(64), true),
            Attribute::new("balance", DataType::Float, false),
        ]
    }

    fn sorted(mut names: Vec<String>) -> Vec<String> {
        names.sort();
        names
    }

    /// Passes everything through, but fails every write once `writes_left` reaches zero.
    struct FaultyStore {
        inner: BufferManager,
        writes_left: AtomicUsize,
    }

    impl FaultyStore {
        fn new(inner: BufferManager) -> Self {
            Self {
                inner,
                writes_left: AtomicUsize::new(usize::MAX),
            }
        }

        fn fail_after(&self, writes: usize) {
            self.writes_left.store(writes, Ordering::SeqCst);
        }
    }

    impl BlockStore for FaultyStore {
        fn file_exists(&self, file: &str) -> bool {
            self.inner.file_exists(file)
        }

        fn create_file(&self, file: &str, kind: FileKind) -> Result<()> {
            self.inner.create_file(file, kind)
        }

        fn read_block(&self, block_id: &BlockId) -> Result<Block> {
            self.inner.read_block(block_id)
        }

        fn write_block(&self, block_id: &BlockId, bytes: &[u8], offset: usize) -> Result<()> {
            let allowed = self
                .writes_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if !allowed {
                return Err(Error::msg(format!("injected write failure on {block_id}")));
            }
            self.inner.write_block(block_id, bytes, offset)
        }
    }

    #[test]
    fn can_create_and_look_up_a_table() -> Result<()> {
        let data_dir = tempdir()?;
        let buffer_manager = open(data_dir.path())?;
        let catalog = Catalog::init(&buffer_manager)?;

        assert!(!catalog.has_table("accounts"));
        catalog.create_table("accounts", "id", attributes())?;

        assert!(catalog.has_table("accounts"));
        assert_eq!(
            catalog.get_schema("accounts")?,
            Schema::new("accounts", "id", attributes())
        );
        assert!(matches!(
            catalog.get_schema("orders"),
            Err(CatalogError::TableNotFound(_))
        ));

        Ok(())
    }

    #[test]
    fn rejects_duplicate_tables() -> Result<()> {
        let data_dir = tempdir()?;
        let buffer_manager = open(data_dir.path())?;
        let catalog = Catalog::init(&buffer_manager)?;
        catalog.create_table("t", "id", attributes())?;

        let other = vec![Attribute::new("id", DataType::Float, false)];
        assert!(matches!(
            catalog.create_table("t", "id", other),
            Err(CatalogError::TableAlreadyExists(_))
        ));
        assert_eq!(catalog.get_schema("t")?, Schema::new("t", "id", attributes()));
        assert_eq!(catalog.list_tables(), vec!["t"]);

        Ok(())
    }

    #[test]
    fn tables_survive_a_restart() -> Result<()> {
        let data_dir = tempdir()?;
        {
            let buffer_manager = open(data_dir.path())?;
            let catalog = Catalog::init(&buffer_manager)?;
            catalog.create_table("a", "id", attributes())?;
            catalog.create_table("b", "id", attributes()[..1].to_vec())?;
            catalog.create_table("c", "name", attributes())?;
            catalog.exit();
        }

        let buffer_manager = open(data_dir.path())?;
        let catalog = Catalog::init(&buffer_manager)?;
        assert_eq!(sorted(catalog.list_tables()), vec!["a", "b", "c"]);
        assert_eq!(catalog.get_schema("a")?, Schema::new("a", "id", attributes()));
        assert_eq!(
            catalog.get_schema("b")?,
            Schema::new("b", "id", attributes()[..1].to_vec())
        );
        assert_eq!(catalog.get_schema("c")?, Schema::new("c", "name", attributes()));

        Ok(())
    }

    #[test]
    fn table_order_matches_across_restarts() -> Result<()> {
        let data_dir = tempdir()?;
        let before = {
            let buffer_manager = open(data_dir.path())?;
            let catalog = Catalog::init(&buffer_manager)?;
            for name in ["a", "b", "c", "d"] {
                catalog.create_table(name, "id", attributes())?;
            }
            catalog.drop_table("b")?;
            catalog.list_tables()
        };
        assert_eq!(before, vec!["d", "c", "a"]);

        let buffer_manager = open(data_dir.path())?;
        let catalog = Catalog::init(&buffer_manager)?;
        assert_eq!(catalog.list_tables(), before);

        Ok(())
    }

    #[test]
    fn dropped_tables_stay_dropped() -> Result<()> {
        let data_dir = tempdir()?;
        {
            let buffer_manager = open(data_dir.path())?;
            let catalog = Catalog::init(&buffer_manager)?;
            catalog.create_table("a", "id", attributes())?;
            catalog.create_table("b", "id", attributes())?;
            catalog.drop_table("a")?;
            assert!(!catalog.has_table("a"));
            assert!(catalog.has_table("b"));
        }

        let buffer_manager = open(data_dir.path())?;
        let catalog = Catalog::init(&buffer_manager)?;
        assert_eq!(catalog.list_tables(), vec!["b"]);
        assert!(!catalog.has_table("a"));

        Ok(())
    }

    #[test]
    fn dropping_every_table_leaves_a_walkable_list() -> Result<()> {
        let data_dir = tempdir()?;
        {
            let buffer_manager = open(data_dir.path())?;
            let catalog = Catalog::init(&buffer_manager)?;
            catalog.create_table("a", "id", attributes())?;
            catalog.create_table("b", "id", attributes())?;
            catalog.drop_table("b")?;
            catalog.drop_table("a")?;
        }

        let buffer_manager = open(data_dir.path())?;
        let catalog = Catalog::init(&buffer_manager)?;
        assert!(catalog.list_tables().is_empty());

        Ok(())
    }

    #[test]
    fn a_dropped_name_can_be_reused() -> Result<()> {
        let data_dir = tempdir()?;
        let replacement = vec![Attribute::new("key", DataType::Char(8), true)];
        {
            let buffer_manager = open(data_dir.path())?;
            let catalog = Catalog::init(&buffer_manager)?;
            catalog.create_table("t", "id", attributes())?;
            catalog.drop_table("t")?;
            catalog.create_table("t", "key", replacement.clone())?;
        }

        let buffer_manager = open(data_dir.path())?;
        let catalog = Catalog::init(&buffer_manager)?;
        assert_eq!(catalog.list_tables(), vec!["t"]);
        assert_eq!(catalog.get_schema("t")?, Schema::new("t", "key", replacement));

        Ok(())
    }

    #[test]
    fn dropping_a_missing_table_fails() -> Result<()> {
        let data_dir = tempdir()?;
        let buffer_manager = open(data_dir.path())?;
        let catalog = Catalog::init(&buffer_manager)?;
        assert!(matches!(
            catalog.drop_table("ghost"),
            Err(CatalogError::TableNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn invalid_schemas_are_rejected_before_writing() -> Result<()> {
        let data_dir = tempdir()?;
        let store = FaultyStore::new(open(data_dir.path())?);
        let catalog = Catalog::init(&store)?;
        store.fail_after(0);

        let wide = (0..33)
            .map(|i| Attribute::new(format!("c{i}"), DataType::Int, false))
            .collect();
        assert!(matches!(
            catalog.create_table("wide", "c0", wide),
            Err(CatalogError::TooManyAttributes)
        ));
        assert!(matches!(
            catalog.create_table("t", "missing", attributes()),
            Err(CatalogError::PrimaryKeyNotFound(_))
        ));
        assert!(matches!(
            catalog.create_table(&"t".repeat(33), "id", attributes()),
            Err(CatalogError::NameTooLong(_))
        ));
        assert!(catalog.list_tables().is_empty());

        Ok(())
    }

    #[test]
    fn index_operations_are_not_implemented() -> Result<()> {
        let data_dir = tempdir()?;
        let buffer_manager = open(data_dir.path())?;
        let catalog = Catalog::init(&buffer_manager)?;
        catalog.create_table("t", "id", attributes())?;

        assert!(matches!(
            catalog.create_index("t_name", "t", "name"),
            Err(CatalogError::NotImplemented(_))
        ));
        assert!(matches!(
            catalog.drop_index("t_name"),
            Err(CatalogError::NotImplemented(_))
        ));

        Ok(())
    }

    #[test]
    fn failed_descriptor_write_changes_nothing() -> Result<()> {
        let data_dir = tempdir()?;
        {
            let store = FaultyStore::new(open(data_dir.path())?);
            let catalog = Catalog::init(&store)?;
            catalog.create_table("a", "id", attributes())?;

            store.fail_after(0);
            assert!(matches!(
                catalog.create_table("b", "id", attributes()),
                Err(CatalogError::Storage(_))
            ));
            assert!(!catalog.has_table("b"));

            store.fail_after(usize::MAX);
            catalog.create_table("c", "id", attributes())?;
        }

        let buffer_manager = open(data_dir.path())?;
        let catalog = Catalog::init(&buffer_manager)?;
        assert_eq!(catalog.list_tables(), vec!["c", "a"]);

        Ok(())
    }

    #[test]
    fn failed_header_write_orphans_the_descriptor() -> Result<()> {
        let data_dir = tempdir()?;
        {
            let store = FaultyStore::new(open(data_dir.path())?);
            let catalog = Catalog::init(&store)?;
            catalog.create_table("a", "id", attributes())?;

            // the descriptor write succeeds, the header write does not
            store.fail_after(1);
            assert!(catalog.create_table("b", "id", attributes()).is_err());
            assert!(!catalog.has_table("b"));
            assert_eq!(catalog.list_tables(), vec!["a"]);
        }

        let buffer_manager = open(data_dir.path())?;
        let catalog = Catalog::init(&buffer_manager)?;
        assert_eq!(catalog.list_tables(), vec!["a"]);
        catalog.create_table("b", "id", attributes())?;
        assert_eq!(catalog.list_tables(), vec!["b", "a"]);

        Ok(())
    }

    #[test]
    fn failed_drop_keeps_the_table() -> Result<()> {
        let data_dir = tempdir()?;
        let store = FaultyStore::new(open(data_dir.path())?);
        let catalog = Catalog::init(&store)?;
        catalog.create_table("a", "id", attributes())?;

        store.fail_after(0);
        assert!(matches!(
            catalog.drop_table("a"),
            Err(CatalogError::Storage(_))
        ));
        assert!(catalog.has_table("a"));

        store.fail_after(usize::MAX);
        catalog.drop_table("a")?;
        assert!(!catalog.has_table("a"));

        Ok(())
    }

    #[test]
    fn recovers_from_an_interrupted_file_creation() -> Result<()> {
        let data_dir = tempdir()?;
        std::fs::write(data_dir.path().join(CATALOG_FILE_NAME), b"")?;
        {
            let buffer_manager = open(data_dir.path())?;
            let catalog = Catalog::init(&buffer_manager)?;
            assert!(catalog.list_tables().is_empty());
            catalog.create_table("a", "id", attributes())?;
        }

        let buffer_manager = open(data_dir.path())?;
        let catalog = Catalog::init(&buffer_manager)?;
        assert_eq!(catalog.list_tables(), vec!["a"]);

        Ok(())
    }

    #[test]
    fn catalog_file_is_reused_not_recreated() -> Result<()> {
        let data_dir = tempdir()?;
        let buffer_manager = open(data_dir.path())?;
        {
            let catalog = Catalog::init(&buffer_manager)?;
            catalog.create_table("a", "id", attributes())?;
        }
        let catalog = Catalog::init(&buffer_manager)?;
        assert_eq!(catalog.list_tables(), vec!["a"]);

        Ok(())
    }
}
