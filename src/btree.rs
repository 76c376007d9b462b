//! The index B-Tree (§4.2, §4.3, §4.6): insert, delete, point lookup and
//! half-open range query over on-disk nodes addressed by file offset.
//!
//! Grounded on the CLRS-style split-on-descent / merge-on-descent algorithm
//! from `examples/other_examples/.../btree-node.rs` and
//! `.../internal_node.rs`, and on the arena/opaque-handle framing from
//! Design Notes §9 ("every node reference is a file address, not a
//! pointer"). Operations are free functions over a [`NodeStore`] rather
//! than methods on a `BTree` struct: a method-per-node-handle design here
//! would need every node to hold a live borrow of the store for its
//! lifetime, which does not fit a disk-backed tree where handles are
//! released mid-traversal (§4.5).

use std::fs::File;

use crate::alloc::Allocator;
use crate::error::CompioError;
use crate::handle::NodeHandle;
use crate::serializer::{Key, Node, Value};

/// Everything a B-Tree operation needs to materialize and persist nodes:
/// the backing file, the bump allocator, and the tree's fixed degree.
pub struct NodeStore<'a> {
    pub file: &'a mut File,
    pub alloc: &'a mut Allocator,
    pub degree: usize,
}

impl<'a> NodeStore<'a> {
    fn load(&mut self, addr: u64) -> Result<NodeHandle, CompioError> {
        Ok(NodeHandle::load_at(self.file, addr, self.degree)?)
    }

    fn new_node(&mut self, node: Node) -> Result<NodeHandle, CompioError> {
        let addr = self.alloc.allocate(Node::encoded_size(self.degree) as u64);
        Ok(NodeHandle::new_at(addr, node))
    }

    fn release(&mut self, handle: NodeHandle) -> Result<(), CompioError> {
        Ok(handle.release(self.file, self.degree)?)
    }
}

fn max_keys(degree: usize) -> usize {
    2 * degree - 1
}

/// Point lookup (§4.2): exact `(hash, pos)` match.
pub fn search(store: &mut NodeStore, root: u64, key: &Key) -> Result<Option<Value>, CompioError> {
    if root == 0 {
        return Ok(None);
    }
    let handle = store.load(root)?;
    let node = handle.node();
    let mut i = 0;
    while i < node.keys.len() && *key > node.keys[i] {
        i += 1;
    }
    if i < node.keys.len() && node.keys[i] == *key {
        let value = node.values[i];
        store.release(handle)?;
        return Ok(Some(value));
    }
    if node.is_leaf {
        store.release(handle)?;
        return Ok(None);
    }
    let child = node.children[i];
    store.release(handle)?;
    search(store, child, key)
}

/// Insert `(key, value)`, splitting full nodes on the way down (§4.3).
/// Returns the new root address (unchanged unless the old root itself
/// split).
pub fn insert(store: &mut NodeStore, root: u64, key: Key, value: Value) -> Result<u64, CompioError> {
    if root == 0 {
        let mut leaf = Node::new_leaf();
        leaf.keys.push(key);
        leaf.values.push(value);
        let handle = store.new_node(leaf)?;
        let addr = handle.addr();
        store.release(handle)?;
        return Ok(addr);
    }

    let root_handle = store.load(root)?;
    if root_handle.node().keys.len() == max_keys(store.degree) {
        let old_root_addr = root_handle.addr();
        store.release(root_handle)?;
        let new_root = Node { is_leaf: false, keys: Vec::new(), values: Vec::new(), children: vec![old_root_addr] };
        let new_root_handle = store.new_node(new_root)?;
        let new_root_addr = new_root_handle.addr();
        store.release(new_root_handle)?;

        split_child(store, new_root_addr, 0)?;
        insert_nonfull(store, new_root_addr, key, value)?;
        Ok(new_root_addr)
    } else {
        let addr = root_handle.addr();
        store.release(root_handle)?;
        insert_nonfull(store, addr, key, value)?;
        Ok(addr)
    }
}

/// Split the full child at `child_index` of the node at `parent_addr` into
/// two nodes, promoting the median key into the parent (§4.3).
fn split_child(store: &mut NodeStore, parent_addr: u64, child_index: usize) -> Result<(), CompioError> {
    let d = store.degree;
    let mut parent = store.load(parent_addr)?;
    let child_addr = parent.node().children[child_index];
    let mut child = store.load(child_addr)?;

    let mid_key = child.node().keys[d - 1];
    let mid_value = child.node().values[d - 1];

    let right = Node {
        is_leaf: child.node().is_leaf,
        keys: child.node().keys[d..].to_vec(),
        values: child.node().values[d..].to_vec(),
        children: if child.node().is_leaf { Vec::new() } else { child.node().children[d..].to_vec() },
    };

    {
        let child_node = child.node_mut();
        child_node.keys.truncate(d - 1);
        child_node.values.truncate(d - 1);
        if !child_node.is_leaf {
            child_node.children.truncate(d);
        }
    }

    let right_handle = store.new_node(right)?;
    let right_addr = right_handle.addr();
    store.release(right_handle)?;

    {
        let parent_node = parent.node_mut();
        parent_node.keys.insert(child_index, mid_key);
        parent_node.values.insert(child_index, mid_value);
        parent_node.children.insert(child_index + 1, right_addr);
    }

    store.release(child)?;
    store.release(parent)?;
    Ok(())
}

fn insert_nonfull(store: &mut NodeStore, addr: u64, key: Key, value: Value) -> Result<(), CompioError> {
    let mut handle = store.load(addr)?;
    let is_leaf = handle.node().is_leaf;

    if is_leaf {
        let node = handle.node_mut();
        let mut i = node.keys.len();
        node.keys.push(key);
        node.values.push(value);
        while i > 0 && node.keys[i] < node.keys[i - 1] {
            node.keys.swap(i, i - 1);
            node.values.swap(i, i - 1);
            i -= 1;
        }
        store.release(handle)?;
        return Ok(());
    }

    let mut i = handle.node().keys.len();
    while i > 0 && key < handle.node().keys[i - 1] {
        i -= 1;
    }
    let child_addr = handle.node().children[i];
    let child_full = {
        let child = store.load(child_addr)?;
        let full = child.node().keys.len() == max_keys(store.degree);
        store.release(child)?;
        full
    };
    store.release(handle)?;

    if child_full {
        split_child(store, addr, i)?;
        let reloaded = store.load(addr)?;
        let promoted = reloaded.node().keys[i];
        store.release(reloaded)?;
        if key > promoted {
            let reloaded = store.load(addr)?;
            let next_child = reloaded.node().children[i + 1];
            store.release(reloaded)?;
            return insert_nonfull(store, next_child, key, value);
        }
    }

    let reloaded = store.load(addr)?;
    let child_addr = reloaded.node().children[i];
    store.release(reloaded)?;
    insert_nonfull(store, child_addr, key, value)
}

/// Overwrite the value for `key` in place if present; never restructures
/// the tree (§4.6 `Update`). Returns whether `key` was found.
pub fn update(store: &mut NodeStore, root: u64, key: &Key, value: Value) -> Result<bool, CompioError> {
    if root == 0 {
        return Ok(false);
    }
    let mut handle = store.load(root)?;
    let mut i = 0;
    while i < handle.node().keys.len() && *key > handle.node().keys[i] {
        i += 1;
    }
    if i < handle.node().keys.len() && handle.node().keys[i] == *key {
        handle.node_mut().values[i] = value;
        store.release(handle)?;
        return Ok(true);
    }
    if handle.node().is_leaf {
        store.release(handle)?;
        return Ok(false);
    }
    let child = handle.node().children[i];
    store.release(handle)?;
    update(store, child, key, value)
}

/// Remove `key` if present. `root` may change (e.g. the root collapses
/// when its last key is pulled down into a merge) — the caller must store
/// the returned address back into the header.
pub fn remove(store: &mut NodeStore, root: u64, key: &Key) -> Result<u64, CompioError> {
    if root == 0 {
        return Ok(0);
    }
    remove_from(store, root, key)?;

    let handle = store.load(root)?;
    if !handle.node().is_leaf && handle.node().keys.is_empty() {
        let only_child = handle.node().children[0];
        store.remove_and_release(handle)?;
        Ok(only_child)
    } else if handle.node().is_leaf && handle.node().keys.is_empty() {
        store.remove_and_release(handle)?;
        Ok(0)
    } else {
        store.release(handle)?;
        Ok(root)
    }
}

impl<'a> NodeStore<'a> {
    fn remove_and_release(&mut self, mut handle: NodeHandle) -> Result<(), CompioError> {
        handle.remove();
        self.release(handle)
    }
}

/// CLRS `B-TREE-DELETE` on the node at `addr` (§4.3 / §4.6): borrow from a
/// sibling or merge whenever a child would otherwise underflow below
/// `d-1` keys, predecessor/successor promotion for internal-node deletes.
fn remove_from(store: &mut NodeStore, addr: u64, key: &Key) -> Result<(), CompioError> {
    let d = store.degree;
    let mut handle = store.load(addr)?;
    let node = handle.node().clone_shallow();
    let mut i = 0;
    while i < node.keys.len() && *key > node.keys[i] {
        i += 1;
    }
    let found = i < node.keys.len() && node.keys[i] == *key;

    if found && node.is_leaf {
        let n = handle.node_mut();
        n.keys.remove(i);
        n.values.remove(i);
        store.release(handle)?;
        return Ok(());
    }

    if found {
        // Internal-node delete: replace with predecessor or successor,
        // then recurse to remove that key from the subtree it came from.
        let left_addr = node.children[i];
        let right_addr = node.children[i + 1];
        let left_keys = {
            let h = store.load(left_addr)?;
            let n = h.node().keys.len();
            store.release(h)?;
            n
        };
        let right_keys = {
            let h = store.load(right_addr)?;
            let n = h.node().keys.len();
            store.release(h)?;
            n
        };

        if left_keys >= d {
            let (pred_key, pred_value) = max_key(store, left_addr)?;
            {
                let n = handle.node_mut();
                n.keys[i] = pred_key;
                n.values[i] = pred_value;
            }
            store.release(handle)?;
            remove_from(store, left_addr, &pred_key)?;
        } else if right_keys >= d {
            let (succ_key, succ_value) = min_key(store, right_addr)?;
            {
                let n = handle.node_mut();
                n.keys[i] = succ_key;
                n.values[i] = succ_value;
            }
            store.release(handle)?;
            remove_from(store, right_addr, &succ_key)?;
        } else {
            store.release(handle)?;
            let merged_addr = merge_children(store, addr, i)?;
            remove_from(store, merged_addr, key)?;
        }
        return Ok(());
    }

    // Not found here; descend. First ensure children[i] has >= d keys.
    if node.is_leaf {
        store.release(handle)?;
        return Ok(());
    }

    let child_addr = node.children[i];
    let child_keys = {
        let h = store.load(child_addr)?;
        let n = h.node().keys.len();
        store.release(h)?;
        n
    };

    if child_keys < d {
        store.release(handle)?;
        let (new_addr, new_index) = fix_underflow(store, addr, i)?;
        let reloaded = store.load(new_addr)?;
        let target = reloaded.node().children[new_index];
        store.release(reloaded)?;
        remove_from(store, target, key)
    } else {
        store.release(handle)?;
        remove_from(store, child_addr, key)
    }
}

fn max_key(store: &mut NodeStore, addr: u64) -> Result<(Key, Value), CompioError> {
    let handle = store.load(addr)?;
    if handle.node().is_leaf {
        let n = handle.node().keys.len();
        let key = handle.node().keys[n - 1];
        let value = handle.node().values[n - 1];
        store.release(handle)?;
        Ok((key, value))
    } else {
        let last_child = *handle.node().children.last().unwrap();
        store.release(handle)?;
        max_key(store, last_child)
    }
}

fn min_key(store: &mut NodeStore, addr: u64) -> Result<(Key, Value), CompioError> {
    let handle = store.load(addr)?;
    if handle.node().is_leaf {
        let key = handle.node().keys[0];
        let value = handle.node().values[0];
        store.release(handle)?;
        Ok((key, value))
    } else {
        let first_child = handle.node().children[0];
        store.release(handle)?;
        min_key(store, first_child)
    }
}

/// Ensure `parent.children[i]` holds at least `d` keys before descending
/// into it, by borrowing from a sibling or merging (CLRS case 3). Returns
/// the (possibly new, if `parent` itself collapsed) address to look up
/// `children[i]` on, and the index to use there.
fn fix_underflow(store: &mut NodeStore, parent_addr: u64, i: usize) -> Result<(u64, usize), CompioError> {
    let d = store.degree;
    let parent = store.load(parent_addr)?;
    let num_children = parent.node().children.len();

    let left_sib_keys = if i > 0 {
        let h = store.load(parent.node().children[i - 1])?;
        let n = h.node().keys.len();
        store.release(h)?;
        Some(n)
    } else {
        None
    };
    let right_sib_keys = if i + 1 < num_children {
        let h = store.load(parent.node().children[i + 1])?;
        let n = h.node().keys.len();
        store.release(h)?;
        Some(n)
    } else {
        None
    };

    if left_sib_keys.is_some_and(|n| n >= d) {
        store.release(parent)?;
        borrow_from_left(store, parent_addr, i)?;
        Ok((parent_addr, i))
    } else if right_sib_keys.is_some_and(|n| n >= d) {
        store.release(parent)?;
        borrow_from_right(store, parent_addr, i)?;
        Ok((parent_addr, i))
    } else {
        store.release(parent)?;
        let merge_index = if i > 0 { i - 1 } else { i };
        let new_parent = merge_children(store, parent_addr, merge_index)?;
        // After a merge, children[i] and children[i+1] collapse into a
        // single node at `merge_index` — descend there.
        Ok((new_parent, merge_index))
    }
}

fn borrow_from_left(store: &mut NodeStore, parent_addr: u64, i: usize) -> Result<(), CompioError> {
    let mut parent = store.load(parent_addr)?;
    let left_addr = parent.node().children[i - 1];
    let child_addr = parent.node().children[i];

    let mut left = store.load(left_addr)?;
    let mut child = store.load(child_addr)?;

    let left_last_key = *left.node().keys.last().unwrap();
    let left_last_value = *left.node().values.last().unwrap();
    let separator_key = parent.node().keys[i - 1];
    let separator_value = parent.node().values[i - 1];

    {
        let c = child.node_mut();
        c.keys.insert(0, separator_key);
        c.values.insert(0, separator_value);
        if !c.is_leaf {
            let moved_child = left.node_mut().children.pop().unwrap();
            c.children.insert(0, moved_child);
        }
    }
    {
        let l = left.node_mut();
        l.keys.pop();
        l.values.pop();
    }
    {
        let p = parent.node_mut();
        p.keys[i - 1] = left_last_key;
        p.values[i - 1] = left_last_value;
    }

    store.release(left)?;
    store.release(child)?;
    store.release(parent)?;
    Ok(())
}

fn borrow_from_right(store: &mut NodeStore, parent_addr: u64, i: usize) -> Result<(), CompioError> {
    let mut parent = store.load(parent_addr)?;
    let right_addr = parent.node().children[i + 1];
    let child_addr = parent.node().children[i];

    let mut right = store.load(right_addr)?;
    let mut child = store.load(child_addr)?;

    let right_first_key = right.node().keys[0];
    let right_first_value = right.node().values[0];
    let separator_key = parent.node().keys[i];
    let separator_value = parent.node().values[i];

    {
        let c = child.node_mut();
        c.keys.push(separator_key);
        c.values.push(separator_value);
        if !c.is_leaf {
            let moved_child = right.node_mut().children.remove(0);
            c.children.push(moved_child);
        }
    }
    {
        let r = right.node_mut();
        r.keys.remove(0);
        r.values.remove(0);
    }
    {
        let p = parent.node_mut();
        p.keys[i] = right_first_key;
        p.values[i] = right_first_value;
    }

    store.release(right)?;
    store.release(child)?;
    store.release(parent)?;
    Ok(())
}

/// Merge `parent.children[i]` and `parent.children[i+1]` (plus the
/// separator key at `parent.keys[i]`) into a single node, freeing the
/// right sibling's storage. Returns `parent_addr` unchanged — callers that
/// need the (possibly-root-collapsed) tree shape check separately.
fn merge_children(store: &mut NodeStore, parent_addr: u64, i: usize) -> Result<u64, CompioError> {
    let mut parent = store.load(parent_addr)?;
    let left_addr = parent.node().children[i];
    let right_addr = parent.node().children[i + 1];

    let mut left = store.load(left_addr)?;
    let right = store.load(right_addr)?;

    let sep_key = parent.node().keys[i];
    let sep_value = parent.node().values[i];

    {
        let l = left.node_mut();
        l.keys.push(sep_key);
        l.values.push(sep_value);
        l.keys.extend_from_slice(&right.node().keys);
        l.values.extend_from_slice(&right.node().values);
        if !l.is_leaf {
            l.children.extend_from_slice(&right.node().children);
        }
    }

    {
        let p = parent.node_mut();
        p.keys.remove(i);
        p.values.remove(i);
        p.children.remove(i + 1);
    }

    store.remove_and_release(right)?;
    store.release(left)?;
    store.release(parent)?;
    Ok(parent_addr)
}

/// Half-open range query `[lo, hi)` (§4.6): returns every `(key, value)`
/// pair with `lo <= key < hi`, pruning subtrees whose key range cannot
/// intersect the query.
pub fn range_query(
    store: &mut NodeStore,
    root: u64,
    lo: &Key,
    hi: &Key,
    out: &mut Vec<(Key, Value)>,
) -> Result<(), CompioError> {
    if root == 0 {
        return Ok(());
    }
    let handle = store.load(root)?;
    let node = handle.node().clone_shallow();
    store.release(handle)?;

    let num_keys = node.keys.len();
    for i in 0..=num_keys {
        if !node.is_leaf {
            let subtree_lo = if i == 0 { None } else { Some(node.keys[i - 1]) };
            let subtree_hi = if i == num_keys { None } else { Some(node.keys[i]) };
            let could_intersect = subtree_hi.map_or(true, |h| h > *lo) && subtree_lo.map_or(true, |l| l < *hi);
            if could_intersect {
                range_query(store, node.children[i], lo, hi, out)?;
            }
        }
        if i < num_keys {
            let k = node.keys[i];
            if k >= *lo && k < *hi {
                out.push((k, node.values[i]));
            }
        }
    }
    Ok(())
}

/// The greatest key `<= k`, if any (§4.7's range-derivation probe).
pub fn predecessor_or_eq(store: &mut NodeStore, root: u64, k: &Key) -> Result<Option<(Key, Value)>, CompioError> {
    if root == 0 {
        return Ok(None);
    }
    let handle = store.load(root)?;
    let node = handle.node().clone_shallow();
    store.release(handle)?;

    let mut i = 0;
    while i < node.keys.len() && *k >= node.keys[i] {
        i += 1;
    }
    // node.keys[0..i] are all <= k; i is the child index to descend into
    // for anything smaller than node.keys[i].
    if !node.is_leaf {
        if let Some(found) = predecessor_or_eq(store, node.children[i], k)? {
            return Ok(Some(found));
        }
    }
    if i > 0 {
        Ok(Some((node.keys[i - 1], node.values[i - 1])))
    } else {
        Ok(None)
    }
}

impl Node {
    /// Cheap clone used by read-only traversals that need to release the
    /// handle before recursing (keys/values/children are small `Copy`/u64
    /// vectors, so this is not a deep-data clone in the storage-block
    /// sense).
    fn clone_shallow(&self) -> Node {
        self.clone()
    }
}
