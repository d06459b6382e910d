use std::{
    fs,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use parking_lot::Mutex;

use super::Database;
use crate::{
    concurrency::LockMode,
    error::DatabaseResult,
    query::{self, SequentialScan},
    storage::{self, TransactionId, heap::Table, record::Record, record::RecordId, schema::Schema},
    types::Value,
};

/// Unit of work against a [`Database`].
///
/// Table locks are taken on first access and held until [`Transaction::end`]
/// or drop, together with the temporary tables created by queries.
pub struct Transaction<'db> {
    db: &'db Database,
    id: TransactionId,
    temp_dir: PathBuf,
    temp_counter: AtomicUsize,
    temp_tables: Mutex<Vec<Arc<Table>>>,
    ended: bool,
}

impl<'db> Transaction<'db> {
    pub(super) fn new(db: &'db Database, id: TransactionId, temp_dir: PathBuf) -> Self {
        Self {
            db,
            id,
            temp_dir,
            temp_counter: AtomicUsize::new(0),
            temp_tables: Mutex::new(Vec::new()),
            ended: false,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn database(&self) -> &'db Database {
        self.db
    }

    /// Blocks until this transaction holds `table` in `mode`.
    pub fn lock(&self, table: &str, mode: LockMode) -> DatabaseResult<()> {
        self.db.table(table)?;
        self.db.lock_manager().acquire(table, self.id, mode)?;
        Ok(())
    }

    fn locked_table(&self, table: &str, mode: LockMode) -> DatabaseResult<Arc<Table>> {
        let heap = self.db.table(table)?;
        self.db.lock_manager().acquire(table, self.id, mode)?;
        Ok(heap)
    }

    pub fn sequential_scan(&self, table: &str) -> DatabaseResult<SequentialScan> {
        let heap = self.locked_table(table, LockMode::Shared)?;
        Ok(SequentialScan::new(heap))
    }

    /// Inserts a record and every index entry for it.
    pub fn add_record(&self, table: &str, values: Vec<Value>) -> DatabaseResult<RecordId> {
        let heap = self.locked_table(table, LockMode::Exclusive)?;
        let indexes = self.db.indexes_of(&heap);

        let keys: Vec<_> = indexes
            .iter()
            .filter_map(|(position, _)| values.get(*position).cloned())
            .collect();
        let rid = heap.add_record(values)?;

        for ((_, index), key) in indexes.iter().zip(keys) {
            index.insert_key(key, rid)?;
        }

        Ok(rid)
    }

    pub fn get_record(&self, table: &str, rid: RecordId) -> DatabaseResult<Record> {
        let heap = self.locked_table(table, LockMode::Shared)?;
        Ok(heap.get_record(rid)?)
    }

    /// Records whose `column` equals `key`, found through the index on it.
    pub fn lookup(&self, table: &str, column: &str, key: &Value) -> DatabaseResult<Vec<Record>> {
        let heap = self.locked_table(table, LockMode::Shared)?;
        let index = self.db.index(table, column)?;

        let mut records = Vec::new();
        for rid in index.lookup_key(key)? {
            records.push(heap.get_record(rid)?);
        }
        Ok(records)
    }

    pub fn num_temp_tables(&self) -> usize {
        self.temp_tables.lock().len()
    }

    /// Releases every lock and removes the temporary tables.
    pub fn end(mut self) -> DatabaseResult<()> {
        self.finish()
    }

    fn finish(&mut self) -> DatabaseResult<()> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;

        self.db.lock_manager().release_all(self.id);
        self.temp_tables.lock().clear();
        if self.temp_dir.exists() {
            fs::remove_dir_all(&self.temp_dir)?;
        }

        log::debug!("ended transaction {}", self.id);
        Ok(())
    }
}

impl query::Transaction for Transaction<'_> {
    fn num_memory_pages(&self) -> usize {
        self.db.config().num_memory_pages
    }

    fn create_temp_table(&self, schema: Schema, prefix: &str) -> storage::Result<Arc<Table>> {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let table = Arc::new(Table::create(&self.temp_dir, &format!("{prefix}_{n}"), schema)?);
        self.temp_tables.lock().push(Arc::clone(&table));
        Ok(table)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            log::error!("failed to clean up transaction {}: {err}", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;
    use crate::{
        concurrency,
        database::DatabaseConfig,
        error::DatabaseError,
        query::{QueryOperator, Transaction as _},
        storage::schema::DataType,
    };

    fn open() -> anyhow::Result<(tempfile::TempDir, Database)> {
        let dir = tempfile::tempdir()?;
        let db = Database::open(DatabaseConfig::new(dir.path()).with_index_order(2))?;
        db.create_table(
            "users",
            Schema::from_fields([("id", DataType::Int), ("name", DataType::String(8))]),
        )?;
        Ok((dir, db))
    }

    #[test]
    fn test_add_record_updates_indexes() -> anyhow::Result<()> {
        let (_dir, db) = open()?;
        db.create_index("users", "id")?;

        let txn = db.begin_transaction();
        for id in 0..40 {
            txn.add_record("users", vec![Value::Int(id % 10), Value::from("x")])?;
        }
        assert!(db.lock_manager().holds("users", txn.id(), LockMode::Exclusive));

        let found = txn.lookup("users", "id", &Value::Int(4))?;
        assert_eq!(found.len(), 4);
        assert!(found.iter().all(|r| r.get(0) == Some(&Value::Int(4))));

        let scan = txn.sequential_scan("users")?;
        assert_eq!(scan.iter()?.count(), 40);

        let id = txn.id();
        txn.end()?;
        assert!(!db.lock_manager().holds("users", id, LockMode::Exclusive));

        Ok(())
    }

    #[test]
    fn test_rejected_records_are_not_indexed() -> anyhow::Result<()> {
        let (_dir, db) = open()?;
        let index = db.create_index("users", "id")?;

        let txn = db.begin_transaction();
        let result = txn.add_record("users", vec![Value::Int(1), Value::from("too long name")]);
        assert!(matches!(result, Err(DatabaseError::Storage(_))));
        assert!(!index.contains_key(&Value::Int(1))?);

        Ok(())
    }

    #[test]
    fn test_temp_tables_removed_on_drop() -> anyhow::Result<()> {
        let (_dir, db) = open()?;

        let temp_dir = {
            let txn = db.begin_transaction();
            let schema = Schema::from_fields([("k", DataType::Int)]);
            let a = txn.create_temp_table(schema.clone(), "scratch")?;
            let b = txn.create_temp_table(schema, "scratch")?;
            assert_ne!(a.name(), b.name());
            assert_eq!(txn.num_temp_tables(), 2);

            let temp_dir = db.file_system().temp_dir(txn.id());
            assert!(temp_dir.exists());
            temp_dir
        };
        assert!(!temp_dir.exists());

        Ok(())
    }

    #[test]
    fn test_unknown_table() -> anyhow::Result<()> {
        let (_dir, db) = open()?;
        let txn = db.begin_transaction();

        assert!(matches!(
            txn.lock("missing", LockMode::Shared),
            Err(DatabaseError::TableNotFound(_))
        ));
        assert!(matches!(
            txn.sequential_scan("missing"),
            Err(DatabaseError::TableNotFound(_))
        ));

        Ok(())
    }

    #[test]
    fn test_writer_waits_for_reader() -> anyhow::Result<()> {
        let (_dir, db) = open()?;
        let reader = db.begin_transaction();
        reader.lock("users", LockMode::Shared)?;

        thread::scope(|scope| -> anyhow::Result<()> {
            let writer = scope.spawn(|| -> DatabaseResult<TransactionId> {
                let txn = db.begin_transaction();
                txn.add_record("users", vec![Value::Int(1), Value::from("w")])?;
                Ok(txn.id())
            });

            for _ in 0..1000 {
                if db.lock_manager().graph().edge_exists(2, reader.id()) {
                    break;
                }
                thread::sleep(Duration::from_millis(2));
            }
            assert_eq!(db.table("users")?.num_records(), 0);

            let reader_id = reader.id();
            reader.end()?;
            let writer_id = writer.join().expect("writer panicked")?;
            assert_ne!(writer_id, reader_id);

            Ok(())
        })?;

        assert_eq!(db.table("users")?.num_records(), 1);

        Ok(())
    }

    #[test]
    fn test_deadlock_between_transactions() -> anyhow::Result<()> {
        let (_dir, db) = open()?;
        db.create_table("orders", Schema::from_fields([("id", DataType::Int)]))?;

        let first = db.begin_transaction();
        let second = db.begin_transaction();
        first.lock("users", LockMode::Exclusive)?;
        second.lock("orders", LockMode::Exclusive)?;

        thread::scope(|scope| -> anyhow::Result<()> {
            let waiter = scope.spawn(|| first.lock("orders", LockMode::Exclusive));

            for _ in 0..1000 {
                if db.lock_manager().graph().edge_exists(first.id(), second.id()) {
                    break;
                }
                thread::sleep(Duration::from_millis(2));
            }

            let result = second.lock("users", LockMode::Shared);
            assert!(matches!(
                result,
                Err(DatabaseError::Concurrency(concurrency::Error::Deadlock { .. }))
            ));

            db.lock_manager().release_all(second.id());
            waiter.join().expect("waiter panicked")?;

            Ok(())
        })?;

        assert!(db.lock_manager().holds("orders", first.id(), LockMode::Exclusive));

        Ok(())
    }
}
