//! Directory of tables and indexes shared by concurrent transactions.

use std::{
    collections::HashMap,
    fs,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use parking_lot::RwLock;

use crate::{
    concurrency::LockManager,
    error::{DatabaseError, DatabaseResult},
    query,
    storage::{
        TransactionId, btree::BPlusTree, file_system_manager::FileSystemManager, heap::Table,
        schema::Schema,
    },
};

pub mod config;
pub mod transaction;

pub use config::DatabaseConfig;
pub use transaction::Transaction;

type IndexKey = (String, String);

pub struct Database {
    config: DatabaseConfig,
    fs: FileSystemManager,
    tables: RwLock<HashMap<String, Arc<Table>>>,
    indexes: RwLock<HashMap<IndexKey, Arc<BPlusTree>>>,
    lock_manager: LockManager,
    next_transaction: AtomicU32,
}

fn check_name(name: &str) -> DatabaseResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(DatabaseError::InvalidName(name.to_string()))
    }
}

impl Database {
    /// Opens the data directory of `config`, creating it if needed, and
    /// reopens every table and index found there. Leftover temporary tables
    /// are removed.
    pub fn open(config: DatabaseConfig) -> DatabaseResult<Self> {
        config.validate()?;

        let fs = FileSystemManager::new(&config.data_dir);
        fs.create_base_dir()?;

        let mut tables = HashMap::new();
        for name in fs.table_names()? {
            let table = Table::open(fs.base_dir(), &name)?;
            tables.insert(name, Arc::new(table));
        }

        let mut indexes = HashMap::new();
        for (table, column) in fs.index_names()? {
            let known = tables
                .get(&table)
                .is_some_and(|t| t.schema().index_of(&column).is_some());
            if !known {
                log::warn!("ignoring index {table}.{column}, no such table column");
                continue;
            }
            let tree = BPlusTree::open(fs.index_path(&table, &column))?;
            indexes.insert((table, column), Arc::new(tree));
        }

        // every table file is locked now, so nobody else uses the directory
        let temp_root = fs.temp_root();
        if temp_root.exists() {
            log::debug!("removing stale temporary tables in {temp_root:?}");
            fs::remove_dir_all(&temp_root)?;
        }

        log::info!(
            "opened database at {:?} with {} tables and {} indexes",
            fs.base_dir(),
            tables.len(),
            indexes.len()
        );

        Ok(Self {
            config,
            fs,
            tables: RwLock::new(tables),
            indexes: RwLock::new(indexes),
            lock_manager: LockManager::new(),
            next_transaction: AtomicU32::new(1),
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn file_system(&self) -> &FileSystemManager {
        &self.fs
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    /// Creates an empty table. Table and column names end up in file names,
    /// so only ASCII letters, digits, `_` and `-` are allowed.
    pub fn create_table(&self, name: &str, schema: Schema) -> DatabaseResult<Arc<Table>> {
        check_name(name)?;
        for column in schema.field_names() {
            check_name(column)?;
        }

        let mut tables = self.tables.write();
        if tables.contains_key(name) {
            return Err(DatabaseError::TableExists(name.to_string()));
        }

        let table = Arc::new(Table::create(self.fs.base_dir(), name, schema)?);
        tables.insert(name.to_string(), Arc::clone(&table));
        Ok(table)
    }

    pub fn table(&self, name: &str) -> DatabaseResult<Arc<Table>> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DatabaseError::TableNotFound(name.to_string()))
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Builds an index over `column` of `table` from the records currently
    /// stored. Returns the existing index if there is one already.
    ///
    /// Records added by other transactions while the index is built may be
    /// missed, hold an exclusive lock on the table to prevent that.
    pub fn create_index(&self, table: &str, column: &str) -> DatabaseResult<Arc<BPlusTree>> {
        let heap = self.table(table)?;
        let position = heap
            .schema()
            .index_of(column)
            .ok_or_else(|| query::Error::ColumnNotFound(column.to_string()))?;
        let key_type = heap.schema().columns()[position].data_type;

        let mut indexes = self.indexes.write();
        let key = (table.to_string(), column.to_string());
        if let Some(index) = indexes.get(&key) {
            return Ok(Arc::clone(index));
        }

        let tree = BPlusTree::create(
            self.fs.index_path(table, column),
            key_type,
            Some(self.config.index_order_for(key_type)),
        )?;
        let mut entries = 0;
        for entry in heap.iter_with_ids() {
            let (rid, record) = entry?;
            if let Some(value) = record.get(position) {
                tree.insert_key(value.clone(), rid)?;
                entries += 1;
            }
        }

        log::info!("indexed {entries} records of {table}.{column}");

        let tree = Arc::new(tree);
        indexes.insert(key, Arc::clone(&tree));
        Ok(tree)
    }

    pub fn index(&self, table: &str, column: &str) -> DatabaseResult<Arc<BPlusTree>> {
        self.indexes
            .read()
            .get(&(table.to_string(), column.to_string()))
            .cloned()
            .ok_or_else(|| DatabaseError::IndexNotFound {
                table: table.to_string(),
                column: column.to_string(),
            })
    }

    /// Indexes of `table` with the schema position of their column.
    pub(crate) fn indexes_of(&self, table: &Table) -> Vec<(usize, Arc<BPlusTree>)> {
        self.indexes
            .read()
            .iter()
            .filter(|((name, _), _)| name == table.name())
            .filter_map(|((_, column), tree)| {
                table
                    .schema()
                    .index_of(column)
                    .map(|position| (position, Arc::clone(tree)))
            })
            .collect()
    }

    pub fn begin_transaction(&self) -> Transaction<'_> {
        let id: TransactionId = self.next_transaction.fetch_add(1, Ordering::Relaxed);
        log::debug!("began transaction {id}");
        Transaction::new(self, id, self.fs.temp_dir(id))
    }

    /// Flushes every table and index file.
    pub fn sync(&self) -> DatabaseResult<()> {
        for table in self.tables.read().values() {
            table.sync()?;
        }
        for index in self.indexes.read().values() {
            index.sync()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{storage::schema::DataType, types::Value};

    fn schema() -> Schema {
        Schema::from_fields([("id", DataType::Int), ("name", DataType::String(8))])
    }

    #[test]
    fn test_create_and_lookup_tables() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let db = Database::open(DatabaseConfig::new(dir.path()))?;

        db.create_table("users", schema())?;
        db.create_table("orders", schema())?;
        assert_eq!(db.table_names(), vec!["orders", "users"]);

        assert!(matches!(
            db.create_table("users", schema()),
            Err(DatabaseError::TableExists(_))
        ));
        assert!(matches!(
            db.create_table("../escape", schema()),
            Err(DatabaseError::InvalidName(_))
        ));
        let dotted = Schema::from_fields([("a.b", DataType::Int)]);
        assert!(matches!(
            db.create_table("dotted", dotted),
            Err(DatabaseError::InvalidName(name)) if name == "a.b"
        ));
        let slashed = Schema::from_fields([("../x", DataType::Int)]);
        assert!(matches!(
            db.create_table("slashed", slashed),
            Err(DatabaseError::InvalidName(_))
        ));
        assert!(matches!(
            db.table("missing"),
            Err(DatabaseError::TableNotFound(_))
        ));
        assert!(matches!(
            db.index("users", "id"),
            Err(DatabaseError::IndexNotFound { .. })
        ));

        Ok(())
    }

    #[test]
    fn test_index_is_built_from_existing_records() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let db = Database::open(DatabaseConfig::new(dir.path()).with_index_order(2))?;

        let table = db.create_table("users", schema())?;
        for id in [5, 3, 9, 3, 1, 7, 3] {
            table.add_record(vec![Value::Int(id), Value::from(format!("u{id}"))])?;
        }

        let index = db.create_index("users", "id")?;
        assert_eq!(index.order(), 2);
        assert_eq!(index.lookup_key(&Value::Int(3))?.len(), 3);

        let keys = index
            .scan()?
            .map(|entry| entry.map(|e| e.key))
            .collect::<Result<Vec<_>, _>>()?;
        let ids: Vec<_> = [1, 3, 3, 3, 5, 7, 9].map(Value::Int).into();
        assert_eq!(keys, ids);

        // second call returns the same tree
        assert!(Arc::ptr_eq(&index, &db.create_index("users", "id")?));
        assert!(matches!(
            db.create_index("users", "age"),
            Err(DatabaseError::Query(query::Error::ColumnNotFound(_)))
        ));

        Ok(())
    }
}
