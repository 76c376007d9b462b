//! Scenario F (§8): a larger randomized B-Tree stress test than the
//! in-module unit tests in `src/btree.rs`, checked against a ground-truth
//! `BTreeMap`.

use std::collections::BTreeMap;

use compio::btree::{self, NodeStore};
use compio::serializer::{Key, Value};

fn lcg_next(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    *state
}

#[test]
fn ten_thousand_random_keys_match_ground_truth() {
    let degree = 8;
    let mut file = tempfile::tempfile().unwrap();
    let mut alloc = compio::alloc::Allocator::new(0, false);
    let mut store = NodeStore { file: &mut file, alloc: &mut alloc, degree };

    let mut truth: BTreeMap<(u64, u64), (u64, u64)> = BTreeMap::new();
    let mut root = 0u64;
    let mut rng = 0xC0FFEEu64;

    for i in 0..10_000u64 {
        let pos = lcg_next(&mut rng) % 1_000_000;
        let key = Key { hash: 1, pos };
        let value = Value { addr: i * 64, size: 64 };
        root = btree::insert(&mut store, root, key, value).unwrap();
        truth.insert((key.hash, key.pos), (value.addr, value.size));
    }

    assert_invariants(&mut store, root, degree);

    let k_min = Key { hash: 1, pos: 200_000 };
    let k_max = Key { hash: 1, pos: 400_000 };
    let mut found = Vec::new();
    btree::range_query(&mut store, root, &k_min, &k_max, &mut found).unwrap();

    let expected: Vec<(u64, u64)> = truth
        .range((1, 200_000)..(1, 400_000))
        .map(|(k, _)| *k)
        .collect();
    let actual: Vec<(u64, u64)> = found.iter().map(|(k, _)| (k.hash, k.pos)).collect();
    assert_eq!(actual, expected);

    // Interleave removes of every third key and re-check against the
    // ground truth.
    let to_remove: Vec<(u64, u64)> = truth.keys().step_by(3).cloned().collect();
    for (hash, pos) in &to_remove {
        root = btree::remove(&mut store, root, &Key { hash: *hash, pos: *pos }).unwrap();
        truth.remove(&(*hash, *pos));
    }

    for ((hash, pos), (addr, size)) in &truth {
        let found = btree::search(&mut store, root, &Key { hash: *hash, pos: *pos }).unwrap();
        assert_eq!(found, Some(Value { addr: *addr, size: *size }));
    }
    for (hash, pos) in &to_remove {
        let found = btree::search(&mut store, root, &Key { hash: *hash, pos: *pos }).unwrap();
        assert_eq!(found, None);
    }

    assert_invariants(&mut store, root, degree);
}

/// Walk the tree checking §3's structural invariants: same-depth leaves,
/// `d-1..2d-1` keys per non-root node, strictly ordered keys.
fn assert_invariants(store: &mut NodeStore, root: u64, degree: usize) {
    if root == 0 {
        return;
    }
    let mut leaf_depths = Vec::new();
    walk(store, root, degree, true, 0, &mut leaf_depths);
    let first = leaf_depths[0];
    assert!(leaf_depths.iter().all(|&d| d == first), "all leaves must sit at the same depth");
}

fn walk(store: &mut NodeStore, addr: u64, degree: usize, is_root: bool, depth: usize, leaf_depths: &mut Vec<usize>) {
    use std::io::{Seek, SeekFrom};
    store.file.seek(SeekFrom::Start(addr)).unwrap();
    let node = compio::serializer::Node::read(store.file, degree).unwrap();
    let min_keys = if is_root { 0 } else { degree - 1 };
    assert!(node.keys.len() >= min_keys, "node below minimum key count");
    assert!(node.keys.len() <= 2 * degree - 1, "node above maximum key count");
    for w in node.keys.windows(2) {
        assert!(w[0] < w[1], "keys must be strictly increasing within a node");
    }
    if node.is_leaf {
        leaf_depths.push(depth);
    } else {
        for &child in &node.children {
            walk(store, child, degree, false, depth + 1, leaf_depths);
        }
    }
}
