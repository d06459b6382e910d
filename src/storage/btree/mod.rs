//! Disk backed B+ tree mapping keys to [`RecordId`]s.
//!
//! Page 0 is the tree header (root page, order, key type), every other page
//! is an inner or leaf node. A node with order `d` is split as soon as it
//! holds `2d` entries. Leaves are chained in both directions so scans never
//! go back up the tree.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;

use super::{
    Error, PageNumber, Result,
    allocator::PageAllocator,
    record::RecordId,
    schema::DataType,
};
use crate::types::Value;

pub mod node;

pub use node::{BPlusNode, InnerEntry, InnerNode, LeafEntry, LeafNode};

pub const INDEX_EXTENSION: &str = "index";

const HEADER_PAGE: PageNumber = 0;
const ROOT_OFFSET: usize = 0;
const ORDER_OFFSET: usize = 4;
const KEY_TAG_OFFSET: usize = 8;
const KEY_LENGTH_OFFSET: usize = 12;

/// Path of the index over `column` of `table`.
pub fn index_path(dir: impl AsRef<Path>, table: &str, column: &str) -> PathBuf {
    dir.as_ref().join(format!("{table}.{column}.{INDEX_EXTENSION}"))
}

/// Largest order whose full nodes still fit into a page.
pub fn max_order(key_type: DataType) -> usize {
    let size = key_type.size();
    node::inner_capacity(size).min(node::leaf_capacity(size)) / 2
}

#[derive(Debug)]
pub struct BPlusTree {
    allocator: PageAllocator,
    key_type: DataType,
    order: usize,
    /// Root page. Locked while descending and for whole inserts, so a descent
    /// never sees a half finished split.
    root: Mutex<PageNumber>,
}

impl BPlusTree {
    /// Creates empty tree at `path`. Without `order` the largest order that
    /// fits a page is used.
    pub fn create(
        path: impl AsRef<Path>,
        key_type: DataType,
        order: Option<usize>,
    ) -> Result<Self> {
        let max = max_order(key_type);
        let order = order.unwrap_or(max);
        if order == 0 || order > max {
            return Err(Error::InvalidOrder { order, max });
        }

        let allocator = PageAllocator::create(path)?;
        let header_page = allocator.allocate()?;
        let root = allocator.allocate()?;

        let tree = Self {
            allocator,
            key_type,
            order,
            root: Mutex::new(root),
        };

        let header = tree.allocator.fetch(header_page)?;
        header.write_i32(ORDER_OFFSET, order as i32)?;
        header.write_i32(KEY_TAG_OFFSET, key_type.tag())?;
        header.write_i32(KEY_LENGTH_OFFSET, key_type.size() as i32)?;
        tree.write_root(root)?;
        LeafNode::new(root, None).store(&tree)?;

        log::info!(
            "created index {} on {key_type} keys with order {order}",
            tree.allocator.path().display()
        );

        Ok(tree)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let allocator = PageAllocator::open(path)?;
        let header = allocator.fetch(HEADER_PAGE)?;

        let corrupt = |what: &str| Error::CorruptHeader(format!("index header has invalid {what}"));

        let root = PageNumber::try_from(header.read_i32(ROOT_OFFSET)?)
            .map_err(|_| corrupt("root"))?;
        let order = usize::try_from(header.read_i32(ORDER_OFFSET)?)
            .map_err(|_| corrupt("order"))?;
        let key_length = usize::try_from(header.read_i32(KEY_LENGTH_OFFSET)?)
            .map_err(|_| corrupt("key length"))?;
        let key_type = DataType::from_tag(header.read_i32(KEY_TAG_OFFSET)?, key_length)
            .ok_or_else(|| corrupt("key type"))?;

        if order == 0 || order > max_order(key_type) {
            return Err(corrupt("order"));
        }

        log::info!(
            "opened index {} rooted at page {root}",
            allocator.path().display()
        );

        Ok(Self {
            allocator,
            key_type,
            order,
            root: Mutex::new(root),
        })
    }

    pub fn key_type(&self) -> DataType {
        self.key_type
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn root(&self) -> PageNumber {
        *self.root.lock()
    }

    pub fn path(&self) -> &Path {
        self.allocator.path()
    }

    pub fn sync(&self) -> Result<()> {
        self.allocator.sync()
    }

    fn check_key(&self, key: &Value) -> Result<()> {
        if !self.key_type.accepts(key) {
            return Err(Error::KeyMismatch {
                key: key.clone(),
                expected: self.key_type,
            });
        }
        Ok(())
    }

    fn write_root(&self, root: PageNumber) -> Result<()> {
        self.allocator
            .fetch(HEADER_PAGE)?
            .write_i32(ROOT_OFFSET, root as i32)
    }

    /// Rewrites only the parent pointer of node `page`.
    pub(crate) fn set_parent(&self, page: PageNumber, parent: PageNumber) -> Result<()> {
        self.allocator
            .fetch(page)?
            .write_i32(node::PARENT_OFFSET, parent as i32)
    }

    /// Adds `entry` pointing at the new right sibling of `left` to `parent`,
    /// growing a new root when `left` was the root.
    pub(crate) fn insert_into_parent(
        &self,
        root: &mut PageNumber,
        left: PageNumber,
        parent: Option<PageNumber>,
        entry: InnerEntry,
    ) -> Result<()> {
        let Some(parent) = parent else {
            let new_root = self.allocator.allocate()?;
            let right = entry.child;

            let mut node = InnerNode::new(new_root, None, left);
            node.entries.push(entry);
            node.store(self)?;

            self.set_parent(left, new_root)?;
            self.set_parent(right, new_root)?;
            self.write_root(new_root)?;
            *root = new_root;

            log::debug!("tree {} grew new root {new_root}", self.path().display());

            return Ok(());
        };

        let mut node = InnerNode::load(self, parent)?;
        node.insert_after(left, entry);

        if node.entries.len() >= 2 * self.order {
            BPlusNode::Inner(node).split(self, root)
        } else {
            node.store(self)
        }
    }

    /// Leaf that holds `key`. See [`BPlusNode::locate_leaf`].
    pub fn locate_leaf(&self, key: &Value, find_first: bool) -> Result<LeafNode> {
        self.check_key(key)?;
        let root = self.root.lock();
        BPlusNode::load(self, *root)?.locate_leaf(self, key, find_first)
    }

    pub fn insert_key(&self, key: Value, rid: RecordId) -> Result<()> {
        self.check_key(&key)?;

        let mut root = self.root.lock();
        let mut leaf = BPlusNode::load(self, *root)?.locate_leaf(self, &key, false)?;

        log::trace!("inserting {key} -> {rid} into leaf {}", leaf.page);
        leaf.insert(LeafEntry { key, rid });

        if leaf.entries.len() >= 2 * self.order {
            BPlusNode::Leaf(leaf).split(self, &mut root)
        } else {
            leaf.store(self)
        }
    }

    /// Every record id stored under `key`, in insertion order.
    pub fn lookup_key(&self, key: &Value) -> Result<Vec<RecordId>> {
        let mut rids = Vec::new();
        for entry in self.scan_from(key)? {
            let entry = entry?;
            if entry.key != *key {
                break;
            }
            rids.push(entry.rid);
        }
        Ok(rids)
    }

    pub fn contains_key(&self, key: &Value) -> Result<bool> {
        Ok(match self.scan_from(key)?.next() {
            Some(entry) => entry?.key == *key,
            None => false,
        })
    }

    /// All entries in key order.
    pub fn scan(&self) -> Result<LeafScan<'_>> {
        let root = self.root.lock();
        let mut node = BPlusNode::load(self, *root)?;
        let leaf = loop {
            match node {
                BPlusNode::Inner(inner) => node = BPlusNode::load(self, inner.first_child)?,
                BPlusNode::Leaf(leaf) => break leaf,
            }
        };
        Ok(LeafScan::new(self, leaf, None))
    }

    /// Entries with keys greater than or equal to `key`, in key order.
    pub fn scan_from(&self, key: &Value) -> Result<LeafScan<'_>> {
        let leaf = self.locate_leaf(key, true)?;
        Ok(LeafScan::new(self, leaf, Some(key.clone())))
    }

    /// Record ids of all entries in key order.
    pub fn sorted_scan(&self) -> Result<impl Iterator<Item = Result<RecordId>> + '_> {
        Ok(self.scan()?.map(|entry| entry.map(|e| e.rid)))
    }
}

/// Walks the leaf chain left to right, reading one leaf at a time.
///
/// Each leaf is read when the scan reaches it, so entries inserted into
/// later leaves while scanning are visible.
pub struct LeafScan<'t> {
    tree: &'t BPlusTree,
    buffered: VecDeque<LeafEntry>,
    next: Option<PageNumber>,
    lower_bound: Option<Value>,
}

impl<'t> LeafScan<'t> {
    fn new(tree: &'t BPlusTree, leaf: LeafNode, lower_bound: Option<Value>) -> Self {
        let mut scan = Self {
            tree,
            buffered: VecDeque::new(),
            next: leaf.next,
            lower_bound,
        };
        scan.buffer(leaf);
        scan
    }

    fn buffer(&mut self, leaf: LeafNode) {
        let entries = leaf.entries.into_iter();
        match &self.lower_bound {
            Some(bound) => self
                .buffered
                .extend(entries.filter(|entry| entry.key >= *bound)),
            None => self.buffered.extend(entries),
        }
    }
}

impl Iterator for LeafScan<'_> {
    type Item = Result<LeafEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.buffered.pop_front() {
                return Some(Ok(entry));
            }

            let page = self.next.take()?;
            match LeafNode::load(self.tree, page) {
                Ok(leaf) => {
                    self.next = leaf.next;
                    self.buffer(leaf);
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
