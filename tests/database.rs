use hermitdb::{
    concurrency::LockMode,
    database::{Database, DatabaseConfig},
    error::DatabaseError,
    query::{QueryOperator, Transaction as _},
    types::Value,
};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

mod common;

use common::fixture;

#[test]
fn test_reopen_keeps_tables_and_indexes() -> anyhow::Result<()> {
    let f = fixture(4, 99)?;
    f.db.create_index("people", "id")?;
    f.db.create_index("orders", "person")?;

    {
        let txn = f.db.begin_transaction();
        txn.add_record("people", vec![Value::Int(500), Value::from("late"), Value::Int(1)])?;
        txn.end()?;
    }
    f.db.sync()?;

    let dir = f.dir;
    let expected_people = f.people.len() + 1;
    drop(f.db);

    let db = Database::open(DatabaseConfig::new(dir.path()))?;
    assert_eq!(db.table_names(), vec!["cities", "orders", "people"]);
    assert_eq!(db.table("people")?.num_records(), expected_people);

    let txn = db.begin_transaction();
    let late = txn.lookup("people", "id", &Value::Int(500))?;
    assert_eq!(late.len(), 1);
    assert_eq!(late[0].get(1), Some(&Value::from("late")));

    let wanted = f
        .orders
        .iter()
        .filter(|row| row[0] == Value::Int(42))
        .count();
    assert_eq!(txn.lookup("orders", "person", &Value::Int(42))?.len(), wanted);

    // sorted scan of the index visits every record once, in key order
    let index = db.index("people", "id")?;
    let keys = index
        .scan()?
        .map(|entry| entry.map(|e| e.key))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(keys.len(), expected_people);
    assert!(keys.windows(2).all(|w| w[0] <= w[1]));

    Ok(())
}

#[test]
fn test_deletes_survive_reopen() -> anyhow::Result<()> {
    let f = fixture(4, 1)?;
    let people = f.db.table("people")?;

    let mut rids = people
        .iter_with_ids()
        .map(|entry| entry.map(|(rid, _)| rid))
        .collect::<Result<Vec<_>, _>>()?;
    rids.shuffle(&mut StdRng::seed_from_u64(1));
    for rid in &rids[..300] {
        people.delete_record(*rid)?;
    }
    let free = people.free_pages();
    assert!(!free.is_empty());
    drop(people);

    let dir = f.dir;
    drop(f.db);

    let db = Database::open(DatabaseConfig::new(dir.path()))?;
    let people = db.table("people")?;
    assert_eq!(people.num_records(), f.people.len() - 300);
    assert_eq!(people.free_pages(), free);

    let txn = db.begin_transaction();
    assert_eq!(txn.sequential_scan("people")?.iter()?.count(), f.people.len() - 300);

    // freed slots are reused before new pages are allocated
    let pages = people.num_data_pages();
    txn.add_record("people", vec![Value::Int(1), Value::from("again"), Value::Int(2)])?;
    assert_eq!(people.num_data_pages(), pages);

    Ok(())
}

#[test]
fn test_second_open_of_directory_fails() -> anyhow::Result<()> {
    let f = fixture(4, 2)?;

    let txn = f.db.begin_transaction();
    let scratch = txn.create_temp_table(common::cities_schema(), "scratch")?;
    scratch.add_record(vec![Value::Int(1), Value::from("kept")])?;
    let temp_dir = f.db.file_system().temp_dir(txn.id());

    let second = Database::open(DatabaseConfig::new(f.dir.path()));
    assert!(matches!(second, Err(DatabaseError::Storage(_))));

    // the failed open leaves temporary tables of the live database alone
    assert!(temp_dir.exists());
    assert!(scratch.path().exists());
    assert_eq!(scratch.iter().count(), 1);

    Ok(())
}

#[test]
fn test_shared_readers_exclusive_writer() -> anyhow::Result<()> {
    let f = fixture(4, 3)?;

    let first = f.db.begin_transaction();
    let second = f.db.begin_transaction();
    first.sequential_scan("cities")?;
    second.sequential_scan("cities")?;

    let locks = f.db.lock_manager();
    assert!(locks.holds("cities", first.id(), LockMode::Shared));
    assert!(locks.holds("cities", second.id(), LockMode::Shared));

    second.end()?;
    // sole owner may upgrade
    first.add_record("cities", vec![Value::Int(99), Value::from("new")])?;
    assert!(locks.holds("cities", first.id(), LockMode::Exclusive));

    Ok(())
}
