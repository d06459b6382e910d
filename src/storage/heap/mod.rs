//! Heap file tables.
//!
//! Page 0 of a table file holds the serialized [`Schema`]. Every other page is
//! a data page: a slot bitmap of [`Table::header_bytes`] bytes followed by
//! [`Table::entries_per_page`] fixed width record slots.

use std::{
    collections::{BTreeSet, VecDeque},
    ops::Range,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;

use super::{
    Error, PAGE_SIZE, PageNumber, Result, SlotNumber,
    allocator::PageAllocator,
    page::Page,
    record::{Record, RecordId},
    schema::Schema,
    stats::TableStats,
};
use crate::types::Value;

mod bitmap;

pub const TABLE_EXTENSION: &str = "table";

const HEADER_PAGE: PageNumber = 0;

pub fn table_path(dir: impl AsRef<Path>, name: &str) -> PathBuf {
    dir.as_ref().join(format!("{name}.{TABLE_EXTENSION}"))
}

#[derive(Debug)]
struct TableState {
    /// Data pages with at least one empty slot.
    free_pages: BTreeSet<PageNumber>,
    stats: TableStats,
}

/// Schema typed record storage on top of a [`PageAllocator`].
///
/// All methods take `&self`. Free space bookkeeping sits behind a mutex so the
/// table can be shared between threads, logical isolation is up to the
/// callers through table locks.
#[derive(Debug)]
pub struct Table {
    name: String,
    schema: Schema,
    allocator: PageAllocator,
    header_bytes: usize,
    entries_per_page: usize,
    state: Mutex<TableState>,
}

/// Bitmap bytes and slots per data page for records of `record_size` bytes.
/// Each bitmap byte covers 8 slots.
pub fn page_layout(record_size: usize) -> Result<(usize, usize)> {
    let header_bytes = PAGE_SIZE / (8 * record_size + 1);
    if header_bytes == 0 {
        return Err(Error::RecordTooLarge(record_size));
    }
    Ok((header_bytes, header_bytes * 8))
}

impl Table {
    /// Creates new empty table file `<dir>/<name>.table`.
    pub fn create(dir: impl AsRef<Path>, name: &str, schema: Schema) -> Result<Self> {
        let (header_bytes, entries_per_page) = page_layout(schema.size())?;

        let header = schema.to_header_bytes();
        if header.len() > PAGE_SIZE {
            return Err(Error::SchemaMismatch(format!(
                "schema of {} fields does not fit in the header page",
                schema.len()
            )));
        }

        let allocator = PageAllocator::create(table_path(dir, name))?;
        let header_page = allocator.allocate()?;
        allocator.fetch(header_page)?.write(0, &header)?;

        log::info!(
            "created table {name} ({} byte records, {entries_per_page} per page)",
            schema.size()
        );

        Ok(Self {
            name: name.to_string(),
            schema,
            allocator,
            header_bytes,
            entries_per_page,
            state: Mutex::new(TableState {
                free_pages: BTreeSet::new(),
                stats: TableStats::new(entries_per_page),
            }),
        })
    }

    /// Opens existing table and rebuilds free space and statistics by
    /// scanning every data page bitmap once.
    pub fn open(dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        let allocator = PageAllocator::open(table_path(dir, name))?;
        if allocator.page_count() == 0 {
            return Err(Error::CorruptHeader(format!("table {name} has no header page")));
        }

        let schema = Schema::from_header_bytes(&allocator.fetch(HEADER_PAGE)?.read_all()?)?;
        let (header_bytes, entries_per_page) = page_layout(schema.size())?;

        let mut free_pages = BTreeSet::new();
        let mut num_records = 0;
        for page_number in 1..allocator.page_count() {
            let bitmap = allocator.fetch(page_number)?.read(0, header_bytes)?;
            let used = bitmap::occupied(&bitmap, entries_per_page).count();
            num_records += used;
            if used < entries_per_page {
                free_pages.insert(page_number);
            }
        }

        log::info!("opened table {name} with {num_records} records");

        Ok(Self {
            name: name.to_string(),
            schema,
            allocator,
            header_bytes,
            entries_per_page,
            state: Mutex::new(TableState {
                free_pages,
                stats: TableStats::with_records(num_records, entries_per_page),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn path(&self) -> &Path {
        self.allocator.path()
    }

    pub fn header_bytes(&self) -> usize {
        self.header_bytes
    }

    pub fn entries_per_page(&self) -> usize {
        self.entries_per_page
    }

    pub fn num_records(&self) -> usize {
        self.state.lock().stats.num_records()
    }

    pub fn stats(&self) -> TableStats {
        self.state.lock().stats
    }

    /// Data pages currently allocated, in order.
    pub fn data_pages(&self) -> Range<PageNumber> {
        1..self.allocator.page_count()
    }

    pub fn num_data_pages(&self) -> usize {
        self.data_pages().len()
    }

    /// Snapshot of data pages with free slots.
    pub fn free_pages(&self) -> Vec<PageNumber> {
        self.state.lock().free_pages.iter().copied().collect()
    }

    fn slot_offset(&self, slot: usize) -> usize {
        self.header_bytes + slot * self.schema.size()
    }

    /// Fetches data page of `rid` and its bitmap byte after checking that the
    /// slot is occupied.
    fn occupied_slot(&self, rid: RecordId) -> Result<(Page, u8)> {
        let slot = rid.slot as usize;
        if slot >= self.entries_per_page || !self.data_pages().contains(&rid.page) {
            return Err(Error::InvalidRecordId(rid));
        }

        let page = self.allocator.fetch(rid.page)?;
        let byte = page.read_u8(slot / 8)?;
        if !bitmap::is_set(&[byte], slot % 8) {
            return Err(Error::InvalidRecordId(rid));
        }

        Ok((page, byte))
    }

    fn read_slot(&self, page: &Page, slot: usize) -> Result<Record> {
        let bytes = page.read(self.slot_offset(slot), self.schema.size())?;
        self.schema.decode(&bytes)
    }

    /// Stores `values` in the lowest free slot of the lowest page with free
    /// space, allocating a new page if every page is full.
    pub fn add_record(&self, values: Vec<Value>) -> Result<RecordId> {
        let record = self.schema.verify(values)?;
        let bytes = self.schema.encode(&record);

        let mut state = self.state.lock();

        let page_number = match state.free_pages.first() {
            Some(page_number) => *page_number,
            None => {
                let page_number = self.allocator.allocate()?;
                state.free_pages.insert(page_number);
                log::debug!("table {} grew to data page {page_number}", self.name);
                page_number
            }
        };

        let page = self.allocator.fetch(page_number)?;
        let mut bits = page.read(0, self.header_bytes)?;
        let slot = bitmap::first_free(&bits, self.entries_per_page).ok_or_else(|| {
            Error::CorruptHeader(format!(
                "data page {page_number} of {} is tracked as free but full",
                self.name
            ))
        })?;

        page.write(self.slot_offset(slot), &bytes)?;
        bitmap::set(&mut bits, slot);
        page.write_u8(slot / 8, bits[slot / 8])?;

        if bitmap::first_free(&bits, self.entries_per_page).is_none() {
            state.free_pages.remove(&page_number);
        }
        state.stats.add_record();

        let rid = RecordId::new(page_number, slot as SlotNumber);
        log::trace!("added record {rid} to {}", self.name);

        Ok(rid)
    }

    pub fn get_record(&self, rid: RecordId) -> Result<Record> {
        let (page, _) = self.occupied_slot(rid)?;
        self.read_slot(&page, rid.slot as usize)
    }

    /// Overwrites record at `rid` in place and returns the old one.
    pub fn update_record(&self, values: Vec<Value>, rid: RecordId) -> Result<Record> {
        let record = self.schema.verify(values)?;

        let _state = self.state.lock();
        let (page, _) = self.occupied_slot(rid)?;
        let old = self.read_slot(&page, rid.slot as usize)?;
        page.write(
            self.slot_offset(rid.slot as usize),
            &self.schema.encode(&record),
        )?;

        Ok(old)
    }

    /// Frees slot at `rid` and returns the record that was stored there.
    pub fn delete_record(&self, rid: RecordId) -> Result<Record> {
        let mut state = self.state.lock();
        let (page, mut byte) = self.occupied_slot(rid)?;
        let slot = rid.slot as usize;
        let old = self.read_slot(&page, slot)?;

        let mut bits = [byte];
        bitmap::clear(&mut bits, slot % 8);
        byte = bits[0];
        page.write_u8(slot / 8, byte)?;

        state.free_pages.insert(rid.page);
        state.stats.remove_record();

        log::trace!("deleted record {rid} from {}", self.name);

        Ok(old)
    }

    /// Every live record of data page `page_number` with its id, read with a
    /// single page read.
    pub fn data_page_entries(&self, page_number: PageNumber) -> Result<Vec<(RecordId, Record)>> {
        if !self.data_pages().contains(&page_number) {
            return Err(Error::PageOutOfRange {
                page: page_number,
                page_count: self.allocator.page_count(),
            });
        }

        let raw = self.allocator.fetch(page_number)?.read_all()?;
        let size = self.schema.size();

        bitmap::occupied(&raw[..self.header_bytes], self.entries_per_page)
            .map(|slot| {
                let offset = self.slot_offset(slot);
                let record = self.schema.decode(&raw[offset..offset + size])?;
                Ok((RecordId::new(page_number, slot as SlotNumber), record))
            })
            .collect()
    }

    pub fn data_page_records(&self, page_number: PageNumber) -> Result<Vec<Record>> {
        Ok(self
            .data_page_entries(page_number)?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    /// Iterates over live records and their ids in `(page, slot)` order.
    pub fn iter_with_ids(&self) -> TableIter<'_> {
        TableIter {
            table: self,
            pages: self.data_pages(),
            buffered: VecDeque::new(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<Record>> + '_ {
        self.iter_with_ids()
            .map(|entry| entry.map(|(_, record)| record))
    }

    pub fn sync(&self) -> Result<()> {
        self.allocator.sync()
    }
}

/// Lazy pass over a table, one data page at a time.
pub struct TableIter<'t> {
    table: &'t Table,
    pages: Range<PageNumber>,
    buffered: VecDeque<(RecordId, Record)>,
}

impl Iterator for TableIter<'_> {
    type Item = Result<(RecordId, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.buffered.pop_front() {
                return Some(Ok(entry));
            }

            let page_number = self.pages.next()?;
            match self.table.data_page_entries(page_number) {
                Ok(entries) => self.buffered.extend(entries),
                Err(err) => {
                    self.pages = 0..0;
                    return Some(Err(err));
                }
            }
        }
    }
}
