//! Exhaustive model checking of the lock-coupling protocol.
//!
//! Every test explores all schedules of a few concurrent operations and
//! asserts MutualExclusion, NoUseAfterFree, SearchOrder, Serializable and
//! AllComplete (deadlock-freedom), under each lock kind.

use hoh_stateright::{CouplingModel, SetOp};
use hoh_tree::LockKind;
use stateright::{Checker, Model};

fn check(initial: &[i8], ops: &[SetOp]) {
    for lock in LockKind::ALL {
        let model = CouplingModel::new(lock, initial.to_vec(), ops.to_vec());
        let checker = model.checker().threads(2).spawn_bfs().join();
        println!("{} {:?}: {} states", lock, ops, checker.unique_state_count());
        checker.assert_properties();
    }
}

#[test]
fn test_model_concurrent_first_inserts() {
    check(&[], &[SetOp::Insert(1), SetOp::Insert(2)]);
}

#[test]
fn test_model_duplicate_inserts() {
    check(&[], &[SetOp::Insert(3), SetOp::Insert(3)]);
}

#[test]
fn test_model_two_child_remove_with_insert() {
    check(&[5, 2, 8], &[SetOp::Remove(5), SetOp::Insert(7)]);
}

#[test]
fn test_model_two_child_remove_with_lookup_of_successor() {
    check(&[5, 2, 8, 7], &[SetOp::Remove(5), SetOp::Contains(7)]);
}

#[test]
fn test_model_competing_removes() {
    check(&[2, 1, 3], &[SetOp::Remove(2), SetOp::Remove(2)]);
}

#[test]
fn test_model_remove_parent_and_child() {
    check(&[4, 2, 6, 1, 3], &[SetOp::Remove(2), SetOp::Remove(3)]);
}

#[test]
fn test_model_remove_last_key_with_insert() {
    check(&[1], &[SetOp::Remove(1), SetOp::Insert(2)]);
}

#[test]
fn test_model_remove_on_empty_tree() {
    check(&[], &[SetOp::Remove(1), SetOp::Insert(1)]);
}

#[test]
fn test_model_three_threads() {
    check(
        &[4, 2, 6],
        &[SetOp::Remove(4), SetOp::Insert(5), SetOp::Contains(6)],
    );
}

#[test]
fn test_model_deep_successor_spine() {
    check(&[2, 1, 8, 6, 4, 5], &[SetOp::Remove(2), SetOp::Insert(3)]);
}
