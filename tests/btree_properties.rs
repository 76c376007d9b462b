//! Property-based checks for §8 items 4-7: random `insert`/`update`/
//! `remove`/`range` interleavings preserve the B-Tree's structural
//! invariants and agree with a `BTreeMap` ground truth.

use std::collections::BTreeMap;

use compio::alloc::Allocator;
use compio::btree::{self, NodeStore};
use compio::serializer::{Key, Value};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Insert(u64, u64),
    Update(u64, u64),
    Remove(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u64..200, any::<u64>()).prop_map(|(pos, v)| Op::Insert(pos, v)),
        (0u64..200, any::<u64>()).prop_map(|(pos, v)| Op::Update(pos, v)),
        (0u64..200).prop_map(Op::Remove),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_op_sequence_matches_ground_truth(ops in prop::collection::vec(op_strategy(), 0..200)) {
        let degree = 3;
        let mut file = tempfile::tempfile().unwrap();
        let mut alloc = Allocator::new(0, false);
        let mut store = NodeStore { file: &mut file, alloc: &mut alloc, degree };

        let mut root = 0u64;
        let mut truth: BTreeMap<u64, u64> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(pos, v) => {
                    if !truth.contains_key(&pos) {
                        let key = Key { hash: 0, pos };
                        root = btree::insert(&mut store, root, key, Value { addr: v, size: 1 }).unwrap();
                        truth.insert(pos, v);
                    }
                }
                Op::Update(pos, v) => {
                    let key = Key { hash: 0, pos };
                    let found = btree::update(&mut store, root, &key, Value { addr: v, size: 1 }).unwrap();
                    prop_assert_eq!(found, truth.contains_key(&pos));
                    if found {
                        truth.insert(pos, v);
                    }
                }
                Op::Remove(pos) => {
                    let key = Key { hash: 0, pos };
                    root = btree::remove(&mut store, root, &key).unwrap();
                    truth.remove(&pos);
                }
            }
        }

        for (&pos, &v) in &truth {
            let found = btree::search(&mut store, root, &Key { hash: 0, pos }).unwrap();
            prop_assert_eq!(found, Some(Value { addr: v, size: 1 }));
        }

        let mut out = Vec::new();
        btree::range_query(&mut store, root, &Key { hash: 0, pos: 0 }, &Key { hash: 0, pos: 200 }, &mut out).unwrap();
        let actual: Vec<(u64, u64)> = out.iter().map(|(k, v)| (k.pos, v.addr)).collect();
        let expected: Vec<(u64, u64)> = truth.iter().map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(actual, expected);
    }
}
