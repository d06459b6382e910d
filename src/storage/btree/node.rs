//! On disk B+ tree nodes.
//!
//! ```text
//! inner: tag(0) | parent i32 | first child i32 | count i32 | (key, child i32) * count
//! leaf:  tag(1) | parent i32 | prev i32 | next i32 | count i32 | (key, page i32, slot i32) * count
//! ```
//!
//! Missing pointers are stored as `-1`.

use bytes::BufMut;

use super::BPlusTree;
use crate::{
    storage::{Error, PAGE_NUMBER_SIZE, PAGE_SIZE, PageNumber, Result, SlotNumber, record::RecordId},
    types::Value,
    utils,
};

pub const INNER_TAG: u8 = 0;
pub const LEAF_TAG: u8 = 1;

pub(super) const PARENT_OFFSET: usize = 1;
const INNER_HEADER_SIZE: usize = 1 + 2 * PAGE_NUMBER_SIZE;
const LEAF_HEADER_SIZE: usize = 1 + 3 * PAGE_NUMBER_SIZE;
const COUNT_SIZE: usize = 4;

/// How many entries fit into an inner node page.
pub fn inner_capacity(key_size: usize) -> usize {
    (PAGE_SIZE - INNER_HEADER_SIZE - COUNT_SIZE) / (key_size + PAGE_NUMBER_SIZE)
}

/// How many entries fit into a leaf node page.
pub fn leaf_capacity(key_size: usize) -> usize {
    (PAGE_SIZE - LEAF_HEADER_SIZE - COUNT_SIZE) / (key_size + 2 * PAGE_NUMBER_SIZE)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerEntry {
    pub key: Value,
    pub child: PageNumber,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafEntry {
    pub key: Value,
    pub rid: RecordId,
}

#[derive(Debug, Clone)]
pub struct InnerNode {
    pub page: PageNumber,
    pub parent: Option<PageNumber>,
    pub first_child: PageNumber,
    pub entries: Vec<InnerEntry>,
}

#[derive(Debug, Clone)]
pub struct LeafNode {
    pub page: PageNumber,
    pub parent: Option<PageNumber>,
    pub prev: Option<PageNumber>,
    pub next: Option<PageNumber>,
    pub entries: Vec<LeafEntry>,
}

/// Node stored in a tree page, dispatched on the tag byte.
#[derive(Debug, Clone)]
pub enum BPlusNode {
    Inner(InnerNode),
    Leaf(LeafNode),
}

fn get_pointer(src: &mut &[u8]) -> Result<Option<PageNumber>> {
    Ok(utils::bytes::get_page_pointer(src)?)
}

fn get_count(
    src: &mut &[u8],
    capacity: usize,
    page: PageNumber,
    expected: &'static str,
) -> Result<usize> {
    match usize::try_from(utils::bytes::get_i32(src)?) {
        Ok(count) if count <= capacity => Ok(count),
        _ => Err(Error::CorruptIndexNode { page, expected }),
    }
}

fn get_page_number(
    src: &mut &[u8],
    page: PageNumber,
    expected: &'static str,
) -> Result<PageNumber> {
    get_pointer(src)?.ok_or(Error::CorruptIndexNode { page, expected })
}

impl BPlusNode {
    pub fn load(tree: &BPlusTree, page: PageNumber) -> Result<Self> {
        let raw = tree.allocator.fetch(page)?.read_all()?;
        match raw[0] {
            INNER_TAG => Ok(Self::Inner(InnerNode::decode(tree, page, &raw)?)),
            LEAF_TAG => Ok(Self::Leaf(LeafNode::decode(tree, page, &raw)?)),
            _ => Err(Error::CorruptIndexNode {
                page,
                expected: "inner or leaf",
            }),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    pub fn page(&self) -> PageNumber {
        match self {
            Self::Inner(node) => node.page,
            Self::Leaf(node) => node.page,
        }
    }

    pub fn parent(&self) -> Option<PageNumber> {
        match self {
            Self::Inner(node) => node.parent,
            Self::Leaf(node) => node.parent,
        }
    }

    /// Finds the leaf where `key` lives. With `find_first` the result is the
    /// leftmost leaf that may hold `key`, otherwise the rightmost one.
    pub fn locate_leaf(self, tree: &BPlusTree, key: &Value, find_first: bool) -> Result<LeafNode> {
        let mut node = self;
        loop {
            match node {
                Self::Inner(inner) => node = Self::load(tree, inner.child_for(key))?,
                Self::Leaf(leaf) => return leaf.locate_leaf(tree, key, find_first),
            }
        }
    }

    /// Splits full node, pushing a separator into its parent.
    pub fn split(self, tree: &BPlusTree, root: &mut PageNumber) -> Result<()> {
        match self {
            Self::Inner(node) => node.split(tree, root),
            Self::Leaf(node) => node.split(tree, root),
        }
    }
}

impl InnerNode {
    pub fn new(page: PageNumber, parent: Option<PageNumber>, first_child: PageNumber) -> Self {
        Self {
            page,
            parent,
            first_child,
            entries: Vec::new(),
        }
    }

    pub fn load(tree: &BPlusTree, page: PageNumber) -> Result<Self> {
        match BPlusNode::load(tree, page)? {
            BPlusNode::Inner(node) => Ok(node),
            BPlusNode::Leaf(_) => Err(Error::CorruptIndexNode {
                page,
                expected: "inner",
            }),
        }
    }

    fn decode(tree: &BPlusTree, page: PageNumber, raw: &[u8]) -> Result<Self> {
        const EXPECTED: &str = "inner";

        let mut src = &raw[1..];
        let parent = get_pointer(&mut src)?;
        let first_child = get_page_number(&mut src, page, EXPECTED)?;
        let count = get_count(&mut src, inner_capacity(tree.key_type.size()), page, EXPECTED)?;

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let key = tree.key_type.decode(&mut src)?;
            let child = get_page_number(&mut src, page, EXPECTED)?;
            entries.push(InnerEntry { key, child });
        }

        Ok(Self {
            page,
            parent,
            first_child,
            entries,
        })
    }

    pub fn store(&self, tree: &BPlusTree) -> Result<()> {
        let mut buf = Vec::with_capacity(PAGE_SIZE);
        buf.put_u8(INNER_TAG);
        utils::bytes::put_page_pointer(&mut buf, self.parent);
        buf.put_i32(self.first_child as i32);
        buf.put_i32(self.entries.len() as i32);
        for entry in &self.entries {
            tree.key_type.encode(&entry.key, &mut buf);
            buf.put_i32(entry.child as i32);
        }
        tree.allocator.fetch(self.page)?.write(0, &buf)
    }

    /// Child to the left of the first entry whose key exceeds `key`, or the
    /// last child if there is none.
    pub fn child_for(&self, key: &Value) -> PageNumber {
        match self.entries.iter().position(|entry| entry.key > *key) {
            Some(0) => self.first_child,
            Some(i) => self.entries[i - 1].child,
            None => self.entries.last().map_or(self.first_child, |entry| entry.child),
        }
    }

    pub fn children(&self) -> impl Iterator<Item = PageNumber> + '_ {
        std::iter::once(self.first_child).chain(self.entries.iter().map(|entry| entry.child))
    }

    /// Inserts `entry` directly after the pointer to `left`, so the new child
    /// ends up next to the node it was split from.
    pub fn insert_after(&mut self, left: PageNumber, entry: InnerEntry) {
        let index = if self.first_child == left {
            0
        } else {
            self.entries
                .iter()
                .position(|e| e.child == left)
                .map_or_else(
                    || self.entries.partition_point(|e| e.key <= entry.key),
                    |i| i + 1,
                )
        };
        self.entries.insert(index, entry);
    }

    /// Keeps `d` entries, moves `d - 1` to a new right sibling and pushes the
    /// middle key up into the parent.
    fn split(mut self, tree: &BPlusTree, root: &mut PageNumber) -> Result<()> {
        let d = tree.order;
        self.entries.sort_by(|a, b| a.key.cmp(&b.key));

        let mut right_entries = self.entries.split_off(d);
        let middle = right_entries.remove(0);

        let right_page = tree.allocator.allocate()?;
        let mut right = InnerNode::new(right_page, self.parent, middle.child);
        right.entries = right_entries;

        for child in right.children() {
            tree.set_parent(child, right_page)?;
        }

        self.store(tree)?;
        right.store(tree)?;

        log::debug!(
            "split inner node {} with new sibling {right_page}, pushed up {}",
            self.page,
            middle.key
        );

        tree.insert_into_parent(
            root,
            self.page,
            self.parent,
            InnerEntry {
                key: middle.key,
                child: right_page,
            },
        )
    }
}

impl LeafNode {
    pub fn new(page: PageNumber, parent: Option<PageNumber>) -> Self {
        Self {
            page,
            parent,
            prev: None,
            next: None,
            entries: Vec::new(),
        }
    }

    pub fn load(tree: &BPlusTree, page: PageNumber) -> Result<Self> {
        match BPlusNode::load(tree, page)? {
            BPlusNode::Leaf(node) => Ok(node),
            BPlusNode::Inner(_) => Err(Error::CorruptIndexNode {
                page,
                expected: "leaf",
            }),
        }
    }

    fn decode(tree: &BPlusTree, page: PageNumber, raw: &[u8]) -> Result<Self> {
        const EXPECTED: &str = "leaf";

        let mut src = &raw[1..];
        let parent = get_pointer(&mut src)?;
        let prev = get_pointer(&mut src)?;
        let next = get_pointer(&mut src)?;
        let count = get_count(&mut src, leaf_capacity(tree.key_type.size()), page, EXPECTED)?;

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let key = tree.key_type.decode(&mut src)?;
            let rid_page = get_page_number(&mut src, page, EXPECTED)?;
            let slot = SlotNumber::try_from(utils::bytes::get_i32(&mut src)?)
                .map_err(|_| Error::CorruptIndexNode { page, expected: EXPECTED })?;
            entries.push(LeafEntry {
                key,
                rid: RecordId::new(rid_page, slot),
            });
        }

        Ok(Self {
            page,
            parent,
            prev,
            next,
            entries,
        })
    }

    pub fn store(&self, tree: &BPlusTree) -> Result<()> {
        let mut buf = Vec::with_capacity(PAGE_SIZE);
        buf.put_u8(LEAF_TAG);
        utils::bytes::put_page_pointer(&mut buf, self.parent);
        utils::bytes::put_page_pointer(&mut buf, self.prev);
        utils::bytes::put_page_pointer(&mut buf, self.next);
        buf.put_i32(self.entries.len() as i32);
        for entry in &self.entries {
            tree.key_type.encode(&entry.key, &mut buf);
            buf.put_i32(entry.rid.page as i32);
            buf.put_i32(entry.rid.slot as i32);
        }
        tree.allocator.fetch(self.page)?.write(0, &buf)
    }

    pub fn first_key(&self) -> Option<&Value> {
        self.entries.first().map(|entry| &entry.key)
    }

    pub fn last_key(&self) -> Option<&Value> {
        self.entries.last().map(|entry| &entry.key)
    }

    fn locate_leaf(self, tree: &BPlusTree, key: &Value, find_first: bool) -> Result<LeafNode> {
        let mut leaf = self;

        if find_first {
            while let Some(prev_page) = leaf.prev {
                let prev = LeafNode::load(tree, prev_page)?;
                if !prev.last_key().is_some_and(|last| last >= key) {
                    break;
                }
                leaf = prev;
            }
        } else {
            while let Some(next_page) = leaf.next {
                let next = LeafNode::load(tree, next_page)?;
                if !next.first_key().is_some_and(|first| first <= key) {
                    break;
                }
                leaf = next;
            }
        }

        Ok(leaf)
    }

    /// Inserts entry after every entry with an equal key.
    pub fn insert(&mut self, entry: LeafEntry) {
        let index = self.entries.partition_point(|e| e.key <= entry.key);
        self.entries.insert(index, entry);
    }

    /// Keeps `d` entries, moves the other `d` to a new right sibling and copies
    /// the smallest key of the right sibling into the parent.
    fn split(mut self, tree: &BPlusTree, root: &mut PageNumber) -> Result<()> {
        let d = tree.order;
        self.entries.sort_by(|a, b| a.key.cmp(&b.key));

        let right_page = tree.allocator.allocate()?;
        let mut right = LeafNode::new(right_page, self.parent);
        right.entries = self.entries.split_off(d);
        right.prev = Some(self.page);
        right.next = self.next;

        if let Some(next_page) = self.next {
            let mut next = LeafNode::load(tree, next_page)?;
            next.prev = Some(right_page);
            next.store(tree)?;
        }
        self.next = Some(right_page);

        let separator = right.entries[0].key.clone();

        self.store(tree)?;
        right.store(tree)?;

        log::debug!(
            "split leaf {} with new sibling {right_page}, separator {separator}",
            self.page
        );

        tree.insert_into_parent(
            root,
            self.page,
            self.parent,
            InnerEntry {
                key: separator,
                child: right_page,
            },
        )
    }
}
