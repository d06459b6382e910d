use super::{
    Error, QueryOperator, RecordStream, Result, Transaction,
    join::{JoinBase, JoinKind, NestedLoopIter, Side},
};
use crate::storage::{schema::Schema, stats::TableStats};

/// One page buffers the right input and one the output, the rest hold a
/// block of the left input.
const RESERVED_PAGES: usize = 2;

/// Block nested loop join. The left input is read in blocks of `B - 2` pages
/// and the right input is scanned once per block.
pub struct BlockNestedLoopJoin<'t> {
    base: JoinBase<'t>,
    block_pages: usize,
    cost: usize,
}

impl<'t> BlockNestedLoopJoin<'t> {
    pub fn new(
        left: Box<dyn QueryOperator + 't>,
        right: Box<dyn QueryOperator + 't>,
        left_column: &str,
        right_column: &str,
        transaction: &'t dyn Transaction,
    ) -> Result<Self> {
        let base = JoinBase::new(
            JoinKind::BlockNestedLoop,
            left,
            right,
            left_column,
            right_column,
            transaction,
        )?;

        let available = base.memory_pages();
        if available <= RESERVED_PAGES {
            return Err(Error::InsufficientMemory {
                join: JoinKind::BlockNestedLoop,
                required: RESERVED_PAGES + 1,
                available,
            });
        }
        let block_pages = available - RESERVED_PAGES;

        // ceil(L / (B - 2)) * R + L
        let left_pages = base.left().stats().num_pages();
        let right_pages = base.right().stats().num_pages();
        let cost = left_pages.div_ceil(block_pages) * right_pages + left_pages;

        Ok(Self {
            base,
            block_pages,
            cost,
        })
    }

    pub fn block_pages(&self) -> usize {
        self.block_pages
    }
}

impl QueryOperator for BlockNestedLoopJoin<'_> {
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
        let left = self.base.materialize(Side::Left)?;
        let right = self.base.materialize(Side::Right)?;

        Ok(Box::new(NestedLoopIter::new(
            "bnlj",
            left,
            right,
            self.base.left_index(),
            self.base.right_index(),
            self.block_pages,
        )))
    }
}
