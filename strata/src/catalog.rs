//! The table registry.

use crate::errors::StorageError;
use crate::heap_file::HeapFile;
use crate::tuple::TupleDesc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

struct TableEntry {
    file: Arc<HeapFile>,
    name: String,
}

/// Maps table ids to their heap files and schemas. The buffer pool consults
/// this to locate the backing file for a page.
#[derive(Default)]
pub struct Catalog {
    tables: RwLock<HashMap<u32, TableEntry>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table under its file's id and returns that id.
    /// Re-registering the same id replaces the previous entry.
    pub fn add_table(&self, file: Arc<HeapFile>, name: &str) -> u32 {
        let table_id = file.id();
        crate::strata_debug_log!("[Catalog::add_table] '{name}' registered as table {table_id}");
        self.tables.write().insert(
            table_id,
            TableEntry {
                file,
                name: name.to_string(),
            },
        );
        table_id
    }

    pub fn db_file(&self, table_id: u32) -> Result<Arc<HeapFile>, StorageError> {
        self.tables
            .read()
            .get(&table_id)
            .map(|entry| Arc::clone(&entry.file))
            .ok_or(StorageError::UnknownTable(table_id))
    }

    pub fn tuple_desc(&self, table_id: u32) -> Result<TupleDesc, StorageError> {
        self.tables
            .read()
            .get(&table_id)
            .map(|entry| entry.file.tuple_desc().clone())
            .ok_or(StorageError::UnknownTable(table_id))
    }

    pub fn table_id(&self, name: &str) -> Option<u32> {
        self.tables
            .read()
            .iter()
            .find(|(_, entry)| entry.name == name)
            .map(|(id, _)| *id)
    }
}
