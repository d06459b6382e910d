use std::sync::Arc;

use super::{QueryOperator, RecordStream, Result, until_error};
use crate::storage::{heap::Table, schema::Schema, stats::TableStats};

/// Streams every live record of a table in `(page, slot)` order.
#[derive(Debug, Clone)]
pub struct SequentialScan {
    table: Arc<Table>,
}

impl SequentialScan {
    pub fn new(table: Arc<Table>) -> Self {
        Self { table }
    }

    pub fn table_name(&self) -> &str {
        self.table.name()
    }
}

impl QueryOperator for SequentialScan {
    fn output_schema(&self) -> &Schema {
        self.table.schema()
    }

    fn stats(&self) -> TableStats {
        self.table.stats()
    }

    fn estimate_io_cost(&self) -> usize {
        self.table.num_data_pages()
    }

    fn is_sequential_scan(&self) -> bool {
        true
    }

    fn source_table(&self) -> Option<&Arc<Table>> {
        Some(&self.table)
    }

    fn iter(&self) -> Result<RecordStream<'_>> {
        Ok(Box::new(until_error(self.table.name(), self.table.iter())))
    }
}
