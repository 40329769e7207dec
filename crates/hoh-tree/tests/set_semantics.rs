//! Single-threaded set semantics of `LockCoupledTree` under every lock kind.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use hoh_tree::{AnyLock, Insertion, LockCoupledTree, LockKind, TreeConfig};

fn tree(lock: LockKind) -> LockCoupledTree<AnyLock> {
    LockCoupledTree::from_config(&TreeConfig::with_lock(lock))
}

#[test]
fn test_matches_model_after_every_mutation() {
    for lock in LockKind::ALL {
        let tree = tree(lock);
        let mut model = BTreeSet::new();
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for step in 0..2_000 {
            let key = rng.gen_range(0..200);
            if rng.gen_bool(0.6) {
                assert!(tree.insert(key));
                model.insert(key);
                assert!(tree.contains(key), "{lock} step {step}: insert({key}) not visible");
            } else {
                let removed = tree.remove(key);
                assert_eq!(removed, model.remove(&key), "{lock} step {step}: remove({key})");
                assert!(!tree.contains(key), "{lock} step {step}: remove({key}) still visible");
            }

            let audit = tree.audit();
            assert!(audit.is_valid(), "{lock} step {step}: {:?}", audit.violations);
            assert_eq!(audit.keys, model.iter().copied().collect::<Vec<_>>());
            assert_eq!(tree.len(), model.len());
        }
    }
}

#[test]
fn test_insert_is_idempotent() {
    for lock in LockKind::ALL {
        let tree = tree(lock);
        for v in [10, 5, 15] {
            tree.insert(v);
        }
        let before = tree.keys();

        assert!(tree.insert(5));
        assert_eq!(tree.try_insert(15), Insertion::AlreadyPresent);
        assert_eq!(tree.keys(), before);
        assert_eq!(tree.len(), 3);
    }
}

#[test]
fn test_remove_absent_is_a_no_op() {
    for lock in LockKind::ALL {
        let tree = tree(lock);
        assert!(!tree.remove(1), "{lock}: remove on empty tree");

        for v in [10, 5, 15] {
            tree.insert(v);
        }
        assert!(tree.remove(5));
        assert!(!tree.remove(5));
        assert!(!tree.remove(7));
        assert_eq!(tree.keys(), vec![10, 15]);
    }
}

#[test]
fn test_two_child_removal_promotes_successor() {
    for lock in LockKind::ALL {
        let tree = tree(lock);
        for v in [5, 2, 8, 1, 3, 7, 9] {
            tree.insert(v);
        }

        assert!(tree.remove(5));
        assert_eq!(tree.keys(), vec![1, 2, 3, 7, 8, 9], "{lock}");
        assert_eq!(tree.root_value(), Some(7), "{lock}");
        assert_eq!(tree.height(), 3);
    }
}

#[test]
fn test_extreme_values() {
    let tree = tree(LockKind::ReaderWriter);
    for v in [0, i64::MIN, i64::MAX, -1, 1] {
        tree.insert(v);
    }
    assert_eq!(tree.keys(), vec![i64::MIN, -1, 0, 1, i64::MAX]);
    assert!(tree.remove(i64::MIN));
    assert!(tree.remove(0));
    assert_eq!(tree.keys(), vec![-1, 1, i64::MAX]);
    assert!(tree.audit().is_valid());
}

#[test]
fn test_drain_in_random_order() {
    let tree = tree(LockKind::Exclusive);
    let mut values: Vec<i64> = (0..500).collect();
    let mut rng = StdRng::seed_from_u64(7);

    values.shuffle(&mut rng);
    for &v in &values {
        tree.insert(v);
    }
    assert_eq!(tree.keys(), (0..500).collect::<Vec<_>>());

    values.shuffle(&mut rng);
    for &v in &values {
        assert!(tree.remove(v));
    }
    assert!(tree.is_empty());
    assert_eq!(tree.root_value(), None);
}
