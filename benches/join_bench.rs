use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use rand::{Rng, SeedableRng, rngs::StdRng};

use hermitdb::{
    database::{Database, DatabaseConfig, Transaction},
    query::{BlockNestedLoopJoin, GraceHashJoin, PageNestedLoopJoin, QueryOperator},
    storage::schema::{DataType, Schema},
    types::Value,
};

fn setup(dir: &std::path::Path) -> anyhow::Result<Database> {
    let db = Database::open(DatabaseConfig::new(dir).with_memory_pages(8))?;
    let schema = Schema::from_fields([("key", DataType::Int), ("payload", DataType::String(16))]);
    db.create_table("left", schema.clone())?;
    db.create_table("right", schema)?;

    let mut rng = StdRng::seed_from_u64(42);
    let txn = db.begin_transaction();
    for (table, rows) in [("left", 2_000), ("right", 3_000)] {
        for i in 0..rows {
            txn.add_record(
                table,
                vec![
                    Value::Int(rng.random_range(0..1_000)),
                    Value::from(format!("{table}-{i}")),
                ],
            )?;
        }
    }
    txn.end()?;

    Ok(db)
}

fn scans<'t>(
    txn: &'t Transaction<'_>,
) -> anyhow::Result<(Box<dyn QueryOperator + 't>, Box<dyn QueryOperator + 't>)> {
    Ok((
        Box::new(txn.sequential_scan("left")?),
        Box::new(txn.sequential_scan("right")?),
    ))
}

fn bench_joins(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let db = setup(dir.path()).unwrap();

    let mut group = c.benchmark_group("equi_join");
    group.sample_size(10);

    group.bench_function("pnlj", |b| {
        b.iter(|| {
            let txn = db.begin_transaction();
            let (left, right) = scans(&txn).unwrap();
            let join = PageNestedLoopJoin::new(left, right, "key", "key", &txn).unwrap();
            black_box(join.iter().unwrap().count());
        });
    });

    group.bench_function("bnlj", |b| {
        b.iter(|| {
            let txn = db.begin_transaction();
            let (left, right) = scans(&txn).unwrap();
            let join = BlockNestedLoopJoin::new(left, right, "key", "key", &txn).unwrap();
            black_box(join.iter().unwrap().count());
        });
    });

    group.bench_function("grace_hash", |b| {
        b.iter(|| {
            let txn = db.begin_transaction();
            let (left, right) = scans(&txn).unwrap();
            let join = GraceHashJoin::new(left, right, "key", "key", &txn).unwrap();
            black_box(join.iter().unwrap().count());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_joins);
criterion_main!(benches);
