use std::{fmt, ops::Range, sync::Arc};

use super::{Error, QueryOperator, Result, Transaction};
use crate::{
    storage::{
        PageNumber, heap, heap::Table, record::Record, schema::Schema, stats::TableStats,
    },
    types::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    PageNestedLoop,
    BlockNestedLoop,
    GraceHash,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PageNestedLoop => "pnlj",
            Self::BlockNestedLoop => "bnlj",
            Self::GraceHash => "grace_hash",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "left",
            Self::Right => "right",
        })
    }
}

/// State shared by every equi-join: the two inputs, the resolved join
/// columns and the transaction that owns temporary tables.
pub struct JoinBase<'t> {
    kind: JoinKind,
    left: Box<dyn QueryOperator + 't>,
    right: Box<dyn QueryOperator + 't>,
    left_column: String,
    right_column: String,
    left_index: usize,
    right_index: usize,
    output_schema: Schema,
    stats: TableStats,
    transaction: &'t dyn Transaction,
}

fn resolve(schema: &Schema, column: &str) -> Result<usize> {
    schema
        .index_of(column)
        .ok_or_else(|| Error::ColumnNotFound(column.to_string()))
}

/// Output records are estimated as `|L| * |R| / max(|L|, |R|)`, the result
/// size of a key/foreign key join.
fn estimate_stats(left: TableStats, right: TableStats, output_schema: &Schema) -> TableStats {
    let (l, r) = (left.num_records(), right.num_records());
    let num_records = (l * r) / l.max(r).max(1);
    let entries_per_page = heap::page_layout(output_schema.size())
        .map(|(_, entries)| entries)
        .unwrap_or(1);
    TableStats::with_records(num_records, entries_per_page)
}

impl<'t> JoinBase<'t> {
    pub fn new(
        kind: JoinKind,
        left: Box<dyn QueryOperator + 't>,
        right: Box<dyn QueryOperator + 't>,
        left_column: &str,
        right_column: &str,
        transaction: &'t dyn Transaction,
    ) -> Result<Self> {
        let left_index = resolve(left.output_schema(), left_column)?;
        let right_index = resolve(right.output_schema(), right_column)?;

        let left_type = left.output_schema().columns()[left_index].data_type;
        let right_type = right.output_schema().columns()[right_index].data_type;
        if left_type != right_type {
            return Err(Error::ColumnTypeMismatch {
                left: left_column.to_string(),
                left_type,
                right: right_column.to_string(),
                right_type,
            });
        }

        let output_schema = left.output_schema().concat(right.output_schema());
        let stats = estimate_stats(left.stats(), right.stats(), &output_schema);

        Ok(Self {
            kind,
            left,
            right,
            left_column: left_column.to_string(),
            right_column: right_column.to_string(),
            left_index,
            right_index,
            output_schema,
            stats,
            transaction,
        })
    }

    pub fn kind(&self) -> JoinKind {
        self.kind
    }

    pub fn left(&self) -> &dyn QueryOperator {
        self.left.as_ref()
    }

    pub fn right(&self) -> &dyn QueryOperator {
        self.right.as_ref()
    }

    pub fn side(&self, side: Side) -> &dyn QueryOperator {
        match side {
            Side::Left => self.left(),
            Side::Right => self.right(),
        }
    }

    pub fn left_index(&self) -> usize {
        self.left_index
    }

    pub fn right_index(&self) -> usize {
        self.right_index
    }

    pub fn output_schema(&self) -> &Schema {
        &self.output_schema
    }

    pub fn stats(&self) -> TableStats {
        self.stats
    }

    pub fn transaction(&self) -> &'t dyn Transaction {
        self.transaction
    }

    pub fn memory_pages(&self) -> usize {
        self.transaction.num_memory_pages()
    }

    fn column(&self, side: Side) -> &str {
        match side {
            Side::Left => &self.left_column,
            Side::Right => &self.right_column,
        }
    }

    /// Prefix for temporary tables created by this join. Characters of the
    /// column name that are not allowed in file names become `_`.
    pub fn temp_prefix(&self, side: Side, suffix: &str) -> String {
        let column: String = self
            .column(side)
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' => c,
                _ => '_',
            })
            .collect();
        format!("{}_{column}_{side}{suffix}", self.kind)
    }

    /// Table holding every record of `side`. Plain table scans are read in
    /// place, anything else is written to a temporary table first.
    pub fn materialize(&self, side: Side) -> Result<Arc<Table>> {
        let source = self.side(side);
        if source.is_sequential_scan() {
            if let Some(table) = source.source_table() {
                return Ok(Arc::clone(table));
            }
        }

        let table = self
            .transaction
            .create_temp_table(source.output_schema().clone(), &self.temp_prefix(side, ""))?;
        for record in source.iter()? {
            table.add_record(record.into_values())?;
        }

        log::debug!(
            "{} join materialized {side} input into {} ({} records)",
            self.kind,
            table.name(),
            table.num_records()
        );

        Ok(table)
    }
}

/// Whether both records carry the same join key.
pub fn keys_match(left: &Record, left_index: usize, right: &Record, right_index: usize) -> bool {
    match (left.get(left_index), right.get(right_index)) {
        (Some(l), Some(r)) => l == r,
        _ => false,
    }
}

pub fn join_key(record: &Record, index: usize) -> Option<&Value> {
    record.get(index)
}

/// Nested loop over two tables: for every block of `block_pages` left pages,
/// every right page is read once and each left record of the block is
/// compared with each right record of that page.
pub struct NestedLoopIter {
    name: &'static str,
    left: Arc<Table>,
    right: Arc<Table>,
    left_index: usize,
    right_index: usize,
    block_pages: usize,
    left_pages: Range<PageNumber>,
    right_pages: Range<PageNumber>,
    block: Vec<Record>,
    right_records: Vec<Record>,
    block_cursor: usize,
    right_cursor: usize,
    done: bool,
}

impl NestedLoopIter {
    pub fn new(
        name: &'static str,
        left: Arc<Table>,
        right: Arc<Table>,
        left_index: usize,
        right_index: usize,
        block_pages: usize,
    ) -> Self {
        let left_pages = left.data_pages();
        Self {
            name,
            left,
            right,
            left_index,
            right_index,
            block_pages: block_pages.max(1),
            left_pages,
            right_pages: 0..0,
            block: Vec::new(),
            right_records: Vec::new(),
            block_cursor: 0,
            right_cursor: 0,
            done: false,
        }
    }

    /// Loads next non empty block of left pages. False once left is exhausted.
    fn next_block(&mut self) -> crate::storage::Result<bool> {
        self.block.clear();
        while self.block.is_empty() {
            let mut loaded = 0;
            while loaded < self.block_pages {
                let Some(page) = self.left_pages.next() else {
                    break;
                };
                self.block.extend(self.left.data_page_records(page)?);
                loaded += 1;
            }
            if loaded == 0 {
                return Ok(false);
            }
        }
        self.right_pages = self.right.data_pages();
        Ok(true)
    }

    fn advance(&mut self) -> crate::storage::Result<Option<Record>> {
        loop {
            while self.block_cursor < self.block.len() {
                let left = &self.block[self.block_cursor];
                while self.right_cursor < self.right_records.len() {
                    let right = &self.right_records[self.right_cursor];
                    self.right_cursor += 1;
                    if keys_match(left, self.left_index, right, self.right_index) {
                        return Ok(Some(left.concat(right)));
                    }
                }
                self.right_cursor = 0;
                self.block_cursor += 1;
            }

            self.block_cursor = 0;
            self.right_cursor = 0;

            match self.right_pages.next() {
                Some(page) => self.right_records = self.right.data_page_records(page)?,
                None => {
                    self.right_records.clear();
                    if !self.next_block()? {
                        return Ok(None);
                    }
                }
            }
        }
    }
}

impl Iterator for NestedLoopIter {
    type Item = Record;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.advance() {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                log::error!("{}: stopping after storage error: {err}", self.name);
                self.done = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        query::{GraceHashJoin, SequentialScan},
        storage::{self, schema::DataType},
    };

    struct ScratchTransaction {
        dir: tempfile::TempDir,
        counter: AtomicUsize,
    }

    impl Transaction for ScratchTransaction {
        fn num_memory_pages(&self) -> usize {
            4
        }

        fn create_temp_table(&self, schema: Schema, prefix: &str) -> storage::Result<Arc<Table>> {
            let n = self.counter.fetch_add(1, Ordering::Relaxed);
            Ok(Arc::new(Table::create(
                self.dir.path(),
                &format!("{prefix}_{n}"),
                schema,
            )?))
        }
    }

    #[test]
    fn test_temp_tables_for_odd_column_names() -> anyhow::Result<()> {
        let txn = ScratchTransaction {
            dir: tempfile::tempdir()?,
            counter: AtomicUsize::new(0),
        };

        let left = Arc::new(Table::create(
            txn.dir.path(),
            "left",
            Schema::from_fields([("a.b", DataType::Int)]),
        )?);
        let right = Arc::new(Table::create(
            txn.dir.path(),
            "right",
            Schema::from_fields([("../c", DataType::Int)]),
        )?);
        for i in 0..20 {
            left.add_record(vec![Value::Int(i % 5)])?;
            right.add_record(vec![Value::Int(i)])?;
        }

        let base = JoinBase::new(
            JoinKind::GraceHash,
            Box::new(SequentialScan::new(Arc::clone(&left))),
            Box::new(SequentialScan::new(Arc::clone(&right))),
            "a.b",
            "../c",
            &txn,
        )?;
        assert_eq!(base.temp_prefix(Side::Left, ""), "grace_hash_a_b_left");
        assert_eq!(base.temp_prefix(Side::Right, "_p"), "grace_hash____c_right_p");

        let join = GraceHashJoin::new(
            Box::new(SequentialScan::new(left)),
            Box::new(SequentialScan::new(right)),
            "a.b",
            "../c",
            &txn,
        )?;
        assert_eq!(join.iter()?.count(), 20);
        assert_eq!(txn.counter.load(Ordering::Relaxed), 2 * join.partitions());

        Ok(())
    }
}
