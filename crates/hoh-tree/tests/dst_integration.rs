//! DST integration tests for the lock-coupled tree.
//!
//! Runs `LockCoupledTree` through the DST runner with boundary fault
//! injection and through the interleaving harness, and verifies the
//! ordered-set invariants from hoh-core.
//!
//! Reproduce a failure with `DST_SEED=<seed> cargo test -p hoh-tree`.

#![cfg(not(loom))]

use std::cell::RefCell;
use std::collections::BTreeSet;

use hoh_core::{PropertyChecker, SetPropertyChecker};
use hoh_dst::{
    get_or_generate_seed, iterations_from_env, run_dst_scenario, DeterministicRng, DstHarness, DstOp,
    DstRunner, FaultConfig, HarnessConfig,
};
use hoh_tree::{AnyLock, LockCoupledTree, LockKind, TreeConfig};

fn tree(lock: LockKind) -> LockCoupledTree<AnyLock> {
    LockCoupledTree::from_config(&TreeConfig::with_lock(lock))
}

fn apply(tree: &LockCoupledTree<AnyLock>, model: &mut BTreeSet<i64>, op: DstOp) -> Result<bool, String> {
    let (actual, expected) = match op {
        DstOp::Insert(v) => (tree.try_insert(v).is_inserted(), model.insert(v)),
        DstOp::Remove(v) => (tree.remove(v), model.remove(&v)),
        DstOp::Contains(v) => (tree.contains(v), model.contains(&v)),
    };
    if actual != expected {
        return Err(format!("{:?} returned {} but model expected {}", op, actual, expected));
    }
    Ok(actual)
}

fn check_against(tree: &LockCoupledTree<AnyLock>, model: &BTreeSet<i64>) -> Result<(), String> {
    let audit = tree.audit();
    if let Some(issue) = audit.violations.first() {
        return Err(issue.to_string());
    }
    let expected: Vec<i64> = model.iter().copied().collect();
    if audit.keys != expected {
        return Err(format!("In-order keys {:?} differ from model {:?}", audit.keys, expected));
    }
    Ok(())
}

#[test]
fn test_tree_with_dst_runner() {
    let seed = get_or_generate_seed().unwrap();

    for lock in LockKind::ALL {
        let mut runner = DstRunner::new(seed, tree(lock));
        let mut rng = DeterministicRng::new(seed);

        for _ in 0..1_000 {
            // Faults are expected: an abandoned operation is simply skipped.
            let _ = match DstOp::random(&mut rng, 64) {
                DstOp::Insert(v) => runner.insert(v),
                DstOp::Remove(v) => runner.remove(v),
                DstOp::Contains(v) => runner.contains(v),
            };
        }

        let stats = runner.stats();
        println!("{}: {}", lock, stats.format());
        assert!(stats.operations_count > 0, "Should have run some operations");
        assert!(runner.mismatches().is_empty(), "{:?}", runner.mismatches());

        let checker = SetPropertyChecker::new(&runner).with_seed(seed);
        for result in checker.check_all() {
            assert!(result.holds, "{}", result);
        }
    }
}

#[test]
fn test_tree_with_aggressive_faults() {
    let seed = get_or_generate_seed().unwrap();
    let mut runner = DstRunner::with_fault_config(seed, tree(LockKind::Exclusive), FaultConfig::aggressive());
    let mut rng = DeterministicRng::new(seed);

    for _ in 0..500 {
        let _ = match DstOp::random(&mut rng, 16) {
            DstOp::Insert(v) => runner.insert(v),
            DstOp::Remove(v) => runner.remove(v),
            DstOp::Contains(v) => runner.contains(v),
        };
    }

    println!("{}", runner.stats().format());
    assert!(runner.check_contents_match());
    assert!(runner.check_sorted());
    assert!(SetPropertyChecker::new(&runner).all_hold());
}

#[test]
fn test_scenario_replay() {
    let seed = 12345u64;
    let ops = vec![
        DstOp::Insert(5),
        DstOp::Insert(2),
        DstOp::Insert(8),
        DstOp::Insert(7),
        DstOp::Insert(9),
        DstOp::Remove(5),
        DstOp::Contains(7),
        DstOp::Remove(5),
        DstOp::Insert(5),
        DstOp::Remove(8),
    ];

    for lock in LockKind::ALL {
        let result = run_dst_scenario(seed, tree(lock), ops.clone());
        println!("{}", result.format());
        assert!(result.passed, "{}", result.format());
    }
}

#[test]
fn test_random_scenarios() {
    let seed = get_or_generate_seed().unwrap();
    let iterations = iterations_from_env(20).unwrap();
    let mut rng = DeterministicRng::new(seed);

    for i in 0..iterations {
        let lock = *rng.choose(&LockKind::ALL).unwrap();
        let scenario_seed = rng.gen::<u64>().max(1);
        let ops: Vec<DstOp> = (0..200).map(|_| DstOp::random(&mut rng, 32)).collect();

        let result = run_dst_scenario(scenario_seed, tree(lock), ops);
        assert!(
            result.passed,
            "iteration {} ({}) failed:\n{}",
            i,
            lock,
            result.format()
        );
    }
}

#[test]
fn test_interleaved_harness() {
    let seed = get_or_generate_seed().unwrap();

    for lock in LockKind::ALL {
        let tree = tree(lock);
        let model = RefCell::new(BTreeSet::new());
        let mut harness = DstHarness::new(seed, HarnessConfig::default()).unwrap();

        let result = harness.run_interleaved(
            |env, _thread, _step| Some(DstOp::random(env.rng(), 48)),
            |_env, _thread, op| apply(&tree, &mut model.borrow_mut(), op),
            || check_against(&tree, &model.borrow()),
        );

        println!("{}: {}", lock, result.format());
        assert!(result.all_invariants_held, "{}", result.format());
        assert!(result.invariant_checks_count > 0);
    }
}

#[test]
fn test_interleaved_harness_reports_counterexample() {
    let mut harness = DstHarness::new(99, HarnessConfig::quick()).unwrap();
    let tree = tree(LockKind::ReaderWriter);

    // A model that forgets every insert makes the first insert look wrong.
    let result = harness.run_interleaved(
        |_env, thread, step| Some(DstOp::Insert(thread as i64 * 100 + step as i64)),
        |_env, _thread, op| apply(&tree, &mut BTreeSet::from([0, 100]), op),
        || Ok(()),
    );

    assert!(!result.all_invariants_held);
    let ce = result.counterexample.expect("Violation should carry a counterexample");
    assert_eq!(ce.dst_seed, Some(99));
}

#[test]
fn test_parallel_harness_partitioned_keys() {
    let seed = get_or_generate_seed().unwrap();
    let config = HarnessConfig {
        threads_count: 8,
        operations_per_thread: 2_000,
        ..HarnessConfig::default()
    };

    for lock in LockKind::ALL {
        let tree = tree(lock);
        let mut harness = DstHarness::new(seed, config.clone()).unwrap();

        // Each thread owns the keys congruent to its index, so the final
        // contents are the union of per-thread models.
        let models: Vec<std::sync::Mutex<BTreeSet<i64>>> =
            (0..config.threads_count).map(|_| Default::default()).collect();

        let result = harness.run_parallel(
            |thread, rng| {
                let key = rng.gen_range(0..256_i64) * config.threads_count as i64 + thread as i64;
                let op = match rng.gen_range(0..3_u8) {
                    0 => DstOp::Insert(key),
                    1 => DstOp::Remove(key),
                    _ => DstOp::Contains(key),
                };
                let mut model = models[thread].lock().unwrap();
                apply(&tree, &mut model, op)
            },
            || {
                let union: BTreeSet<i64> = models
                    .iter()
                    .flat_map(|m| m.lock().unwrap().clone())
                    .collect();
                check_against(&tree, &union)
            },
        );

        println!("{}: {}", lock, result.format());
        assert!(result.all_invariants_held, "{}", result.format());
        assert_eq!(
            result.operations_count,
            config.threads_count as u64 * config.operations_per_thread
        );
    }
}
