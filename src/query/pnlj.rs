use super::{
    QueryOperator, RecordStream, Result, Transaction,
    join::{JoinBase, JoinKind, NestedLoopIter, Side},
};
use crate::storage::{schema::Schema, stats::TableStats};

/// Page nested loop join. Every pair of (left page, right page) is read and
/// joined record by record.
pub struct PageNestedLoopJoin<'t> {
    base: JoinBase<'t>,
    cost: usize,
}

impl<'t> PageNestedLoopJoin<'t> {
    pub fn new(
        left: Box<dyn QueryOperator + 't>,
        right: Box<dyn QueryOperator + 't>,
        left_column: &str,
        right_column: &str,
        transaction: &'t dyn Transaction,
    ) -> Result<Self> {
        let base = JoinBase::new(
            JoinKind::PageNestedLoop,
            left,
            right,
            left_column,
            right_column,
            transaction,
        )?;

        // L * R + L
        let left_pages = base.left().stats().num_pages();
        let right_pages = base.right().stats().num_pages();
        let cost = left_pages * right_pages + left_pages;

        Ok(Self { base, cost })
    }
}

impl QueryOperator for PageNestedLoopJoin<'_> {
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
            "pnlj",
            left,
            right,
            self.base.left_index(),
            self.base.right_index(),
            1,
        )))
    }
}
