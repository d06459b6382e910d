/// Incrementally maintained statistics of a table. Join operators only need
/// the page count estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableStats {
    num_records: usize,
    entries_per_page: usize,
}

impl TableStats {
    pub fn new(entries_per_page: usize) -> Self {
        Self::with_records(0, entries_per_page)
    }

    pub fn with_records(num_records: usize, entries_per_page: usize) -> Self {
        Self {
            num_records,
            entries_per_page: entries_per_page.max(1),
        }
    }

    pub fn num_records(&self) -> usize {
        self.num_records
    }

    pub fn entries_per_page(&self) -> usize {
        self.entries_per_page
    }

    /// Number of pages needed to hold all records if they were packed.
    pub fn num_pages(&self) -> usize {
        self.num_records.div_ceil(self.entries_per_page)
    }

    pub fn add_record(&mut self) {
        self.num_records += 1;
    }

    pub fn remove_record(&mut self) {
        self.num_records = self.num_records.saturating_sub(1);
    }
}
