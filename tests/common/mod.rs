use hermitdb::{
    database::{Database, DatabaseConfig},
    storage::schema::{DataType, Schema},
    types::Value,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

pub type Rows = Vec<Vec<Value>>;

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub db: Database,
    pub people: Rows,
    pub orders: Rows,
    pub cities: Rows,
}

pub fn people_schema() -> Schema {
    Schema::from_fields([
        ("id", DataType::Int),
        ("name", DataType::String(10)),
        ("city", DataType::Int),
    ])
}

pub fn orders_schema() -> Schema {
    Schema::from_fields([
        ("person", DataType::Int),
        ("amount", DataType::Float),
        ("paid", DataType::Bool),
    ])
}

pub fn cities_schema() -> Schema {
    Schema::from_fields([("city_id", DataType::Int), ("city_name", DataType::String(12))])
}

/// Database with three tables filled from a seeded generator. `people` and
/// `orders` span several pages each.
pub fn fixture(memory_pages: usize, seed: u64) -> anyhow::Result<Fixture> {
    let dir = tempfile::tempdir()?;
    let db = Database::open(DatabaseConfig::new(dir.path()).with_memory_pages(memory_pages))?;
    let mut rng = StdRng::seed_from_u64(seed);

    db.create_table("people", people_schema())?;
    db.create_table("orders", orders_schema())?;
    db.create_table("cities", cities_schema())?;

    let people: Rows = (0..700)
        .map(|i| {
            vec![
                Value::Int(rng.random_range(0..120)),
                Value::from(format!("p{i}")),
                Value::Int(rng.random_range(0..15)),
            ]
        })
        .collect();
    let orders: Rows = (0..900)
        .map(|_| {
            vec![
                Value::Int(rng.random_range(0..150)),
                Value::Float(rng.random_range(0..10_000) as f32 / 100.0),
                Value::Bool(rng.random_bool(0.5)),
            ]
        })
        .collect();
    let cities: Rows = (0..12)
        .map(|i| vec![Value::Int(i), Value::from(format!("city-{i}"))])
        .collect();

    {
        let txn = db.begin_transaction();
        for (table, rows) in [("people", &people), ("orders", &orders), ("cities", &cities)] {
            for row in rows {
                txn.add_record(table, row.clone())?;
            }
        }
        txn.end()?;
    }

    Ok(Fixture {
        dir,
        db,
        people,
        orders,
        cities,
    })
}

/// Every concatenated pair of rows with equal join keys, sorted.
pub fn naive_join(left: &[Vec<Value>], right: &[Vec<Value>], li: usize, ri: usize) -> Rows {
    let mut out = Vec::new();
    for l in left {
        for r in right {
            if l[li] == r[ri] {
                out.push(l.iter().chain(r).cloned().collect());
            }
        }
    }
    out.sort();
    out
}
