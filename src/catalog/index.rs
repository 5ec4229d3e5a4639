use std::sync::RwLock;

use dashmap::DashMap;

use super::schema::Schema;
use crate::common::BlockNo;

/// In-memory view of the live tables in the catalog file.
///
/// `schemas` is the only owner of each schema. The block offsets and the
/// table order are tracked by name next to it.
#[derive(Default)]
pub struct CatalogIndex {
    schemas: DashMap<String, Schema>,
    offsets: DashMap<String, BlockNo>,
    /// most recently created first, the same order as the list on disk
    order: RwLock<Vec<String>>,
}

impl CatalogIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, table_name: &str) -> bool {
        self.schemas.contains_key(table_name)
    }

    pub fn get(&self, table_name: &str) -> Option<Schema> {
        self.schemas.get(table_name).map(|kv| kv.value().clone())
    }

    pub fn offset(&self, table_name: &str) -> Option<BlockNo> {
        self.offsets.get(table_name).map(|kv| *kv.value())
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.order.read().unwrap().clone()
    }

    /// Adds a newly created table in front of all others.
    /// Returns false and leaves the index untouched if the name is taken.
    pub fn insert_front(&self, schema: Schema, block_no: BlockNo) -> bool {
        self.insert(schema, block_no, true)
    }

    /// Adds a table behind all others, used while replaying the list from disk.
    pub fn insert_back(&self, schema: Schema, block_no: BlockNo) -> bool {
        self.insert(schema, block_no, false)
    }

    fn insert(&self, schema: Schema, block_no: BlockNo, front: bool) -> bool {
        let mut order = self.order.write().unwrap();
        let name = schema.table_name().to_owned();
        if self.schemas.contains_key(&name) {
            return false;
        }
        self.offsets.insert(name.clone(), block_no);
        self.schemas.insert(name.clone(), schema);
        if front {
            order.insert(0, name);
        } else {
            order.push(name);
        }
        true
    }

    pub fn remove(&self, table_name: &str) -> Option<(Schema, BlockNo)> {
        let mut order = self.order.write().unwrap();
        let (_, schema) = self.schemas.remove(table_name)?;
        let (_, block_no) = self.offsets.remove(table_name)?;
        order.retain(|name| name != table_name);
        Some((schema, block_no))
    }

    pub fn clear(&self) {
        let mut order = self.order.write().unwrap();
        self.schemas.clear();
        self.offsets.clear();
        order.clear();
    }
}

#[cfg(test)]
mod tests {

    use super::CatalogIndex;
    use crate::catalog::schema::{Attribute, DataType, Schema};

    fn schema(name: &str) -> Schema {
        Schema::new(name, "id", vec![Attribute::new("id", DataType::Int, true)])
    }

    #[test]
    fn keeps_lookups_in_sync() {
        let index = CatalogIndex::new();
        assert!(index.insert_back(schema("b"), 2));
        assert!(index.insert_back(schema("a"), 1));
        assert!(index.insert_front(schema("c"), 3));
        assert!(!index.insert_front(schema("a"), 4));

        assert_eq!(index.len(), 3);
        assert_eq!(index.table_names(), vec!["c", "b", "a"]);
        assert_eq!(index.offset("a"), Some(1));
        assert_eq!(index.get("c"), Some(schema("c")));

        assert_eq!(index.remove("b"), Some((schema("b"), 2)));
        assert!(!index.contains("b"));
        assert_eq!(index.offset("b"), None);
        assert_eq!(index.table_names(), vec!["c", "a"]);
        assert_eq!(index.remove("b"), None);

        index.clear();
        assert_eq!(index.len(), 0);
        assert!(index.table_names().is_empty());
    }
}
