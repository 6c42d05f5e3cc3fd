#![allow(dead_code)]

use basalt::{Cursor, Database, SeqScan};
use std::sync::Arc;
use strata::{Field, FieldType, HeapFile, TransactionId, Tuple, TupleDesc};
use tempfile::TempDir;

/// One engine instance over its own scratch directory.
pub struct TestDb {
    pub db: Arc<Database>,
    dir: TempDir,
}

pub fn setup(pool_pages: usize) -> TestDb {
    TestDb {
        db: Arc::new(Database::new(pool_pages)),
        dir: tempfile::tempdir().unwrap(),
    }
}

impl TestDb {
    /// Creates an empty heap file in the scratch directory and registers it.
    pub fn create_table(&self, name: &str, desc: TupleDesc) -> u32 {
        let path = self.dir.path().join(format!("{name}.dat"));
        let file = Arc::new(HeapFile::open(path, desc).unwrap());
        self.db.catalog().add_table(file, name)
    }

    /// The path of a table file, for reopening against a second engine.
    pub fn table_path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(format!("{name}.dat"))
    }
}

pub fn int_desc(names: &[&str]) -> TupleDesc {
    TupleDesc::new(
        vec![FieldType::Int; names.len()],
        names.iter().map(|n| Some(n.to_string())).collect(),
    )
}

pub fn int_tuple(desc: &TupleDesc, values: &[i32]) -> Tuple {
    Tuple::new(desc.clone(), values.iter().map(|v| Field::Int(*v)).collect()).unwrap()
}

/// Inserts the rows through the buffer pool in one committed transaction.
pub fn load_rows(tdb: &TestDb, table_id: u32, rows: &[Vec<i32>]) {
    let desc = tdb.db.catalog().tuple_desc(table_id).unwrap();
    let tid = tdb.db.begin();
    for row in rows {
        tdb.db
            .buffer_pool()
            .insert_tuple(tid, table_id, int_tuple(&desc, row))
            .unwrap();
    }
    tdb.db.commit(tid).unwrap();
}

/// Full scan under the given transaction; the transaction stays open so
/// the scanned tuples' record ids remain usable by the caller.
pub fn scan_with(db: &Arc<Database>, tid: TransactionId, table_id: u32) -> Vec<Tuple> {
    let scan = SeqScan::new(Arc::clone(db), tid, table_id).unwrap();
    let mut cursor = Cursor::new(Box::new(scan));
    cursor.open().unwrap();
    let mut tuples = Vec::new();
    while cursor.has_next().unwrap() {
        tuples.push(cursor.next().unwrap());
    }
    cursor.close();
    tuples
}

/// Full scan in its own committed transaction; returns just the field
/// values.
pub fn scan_rows(tdb: &TestDb, table_id: u32) -> Vec<Vec<Field>> {
    let tid = tdb.db.begin();
    let rows = scan_with(&tdb.db, tid, table_id)
        .into_iter()
        .map(|t| t.fields().to_vec())
        .collect();
    tdb.db.commit(tid).unwrap();
    rows
}
