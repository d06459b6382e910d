use std::{
    collections::{HashMap, VecDeque},
    hash::{DefaultHasher, Hash, Hasher},
    ops::Range,
    sync::Arc,
};

use super::{
    Error, QueryOperator, RecordStream, Result, Transaction,
    join::{JoinBase, JoinKind, Side, join_key},
};
use crate::{
    storage::{self, PageNumber, heap::Table, record::Record, schema::Schema, stats::TableStats},
    types::Value,
};

/// Partition of `value` among `partitions` buckets. Computed on the unsigned
/// hash so the index is never negative.
pub fn partition_of(value: &Value, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    (hasher.finish() % partitions as u64) as usize
}

/// Grace hash join. Both inputs are split into `B - 1` partitions on disk by
/// the hash of their join key, then each left partition is loaded into an in
/// memory hash table and probed with the matching right partition.
///
/// Every left partition must fit in memory, partitions are never split
/// recursively.
pub struct GraceHashJoin<'t> {
    base: JoinBase<'t>,
    partitions: usize,
    cost: usize,
}

impl<'t> GraceHashJoin<'t> {
    pub fn new(
        left: Box<dyn QueryOperator + 't>,
        right: Box<dyn QueryOperator + 't>,
        left_column: &str,
        right_column: &str,
        transaction: &'t dyn Transaction,
    ) -> Result<Self> {
        let base = JoinBase::new(
            JoinKind::GraceHash,
            left,
            right,
            left_column,
            right_column,
            transaction,
        )?;

        let available = base.memory_pages();
        if available < 2 {
            return Err(Error::InsufficientMemory {
                join: JoinKind::GraceHash,
                required: 2,
                available,
            });
        }

        // 3 * (L + R)
        let left_pages = base.left().stats().num_pages();
        let right_pages = base.right().stats().num_pages();
        let cost = 3 * (left_pages + right_pages);

        Ok(Self {
            base,
            partitions: available - 1,
            cost,
        })
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Writes every record of `side` into its partition table.
    fn partition(&self, side: Side) -> Result<Vec<Arc<Table>>> {
        let source = self.base.side(side);
        let index = match side {
            Side::Left => self.base.left_index(),
            Side::Right => self.base.right_index(),
        };

        let tables = (0..self.partitions)
            .map(|i| {
                self.base.transaction().create_temp_table(
                    source.output_schema().clone(),
                    &self.base.temp_prefix(side, &format!("_partition_{i}")),
                )
            })
            .collect::<storage::Result<Vec<_>>>()?;

        for record in source.iter()? {
            let bucket =
                join_key(&record, index).map_or(0, |key| partition_of(key, self.partitions));
            tables[bucket].add_record(record.into_values())?;
        }

        log::debug!(
            "grace hash join partitioned {side} input into {} partitions",
            self.partitions
        );

        Ok(tables)
    }
}

impl QueryOperator for GraceHashJoin<'_> {
    fn output_schema(&self) -> &Schema {
        self.base.output_schema()
    }

    fn stats(&self) -> TableStats {
        self.base.stats()
    }

    fn estimate_io_cost(&self) -> usize {
        self.cost
    }

    fn iter(&self) -> Result<RecordStream<'_>> {
        let left = self.partition(Side::Left)?;
        let right = self.partition(Side::Right)?;

        Ok(Box::new(GraceHashIter {
            partitions: left.into_iter().zip(right).collect(),
            left_index: self.base.left_index(),
            right_index: self.base.right_index(),
            hash_table: HashMap::new(),
            right: None,
            right_pages: 0..0,
            right_records: VecDeque::new(),
            pending: VecDeque::new(),
            done: false,
        }))
    }
}

struct GraceHashIter {
    partitions: VecDeque<(Arc<Table>, Arc<Table>)>,
    left_index: usize,
    right_index: usize,
    hash_table: HashMap<Value, Vec<Record>>,
    right: Option<Arc<Table>>,
    right_pages: Range<PageNumber>,
    right_records: VecDeque<Record>,
    pending: VecDeque<Record>,
    done: bool,
}

impl GraceHashIter {
    /// Builds the hash table of the next left partition.
    fn next_partition(&mut self) -> storage::Result<bool> {
        let Some((left, right)) = self.partitions.pop_front() else {
            return Ok(false);
        };

        self.hash_table.clear();
        for record in left.iter() {
            let record = record?;
            if let Some(key) = join_key(&record, self.left_index) {
                self.hash_table.entry(key.clone()).or_default().push(record);
            }
        }

        self.right_pages = right.data_pages();
        self.right = Some(right);
        Ok(true)
    }

    fn advance(&mut self) -> storage::Result<Option<Record>> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }

            if let Some(right) = self.right_records.pop_front() {
                let matches = join_key(&right, self.right_index)
                    .and_then(|key| self.hash_table.get(key));
                if let Some(matches) = matches {
                    self.pending
                        .extend(matches.iter().map(|left| left.concat(&right)));
                }
                continue;
            }

            if let Some(right) = &self.right {
                if let Some(page) = self.right_pages.next() {
                    self.right_records.extend(right.data_page_records(page)?);
                    continue;
                }
            }

            if !self.next_partition()? {
                return Ok(None);
            }
        }
    }
}

impl Iterator for GraceHashIter {
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
                log::error!("grace hash join: stopping after storage error: {err}");
                self.done = true;
                None
            }
        }
    }
}
