//! Lock-coupled binary search tree.
//!
//! Every traversal is strictly hand-over-hand: the child's guard is taken
//! before the parent's guard is dropped, and locks are only ever taken in
//! root-to-leaf order. The root link lives in a sentinel anchor node, so an
//! insert into an empty tree and a removal of the root are ordinary child
//! edits under the anchor's lock.
//!
//! # Reclamation
//!
//! A thread can only wait on a node's lock while holding that node's
//! parent. Unlinking takes the parent in write mode, so once a node is
//! unlinked and its own guard is dropped nobody can reach it and it is
//! freed on the spot.

use std::cmp::Ordering as KeyOrdering;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use hoh_core::TreeIssue;
use hoh_dst::DstTestableSet;
use tracing::{debug, trace};

use crate::config::{LockKind, TreeConfig};
use crate::lock::{AnyLock, LockStrategy};
use crate::node::{Node, ReadGuard, Side, WriteGuard};

/// Outcome of [`LockCoupledTree::try_insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Inserted,
    AlreadyPresent,
}

impl Insertion {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Insertion::Inserted)
    }
}

/// Result of a read-coupled search: whether the value was found, and the
/// value of the last node visited before it (or before the search fell off
/// the tree).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Located {
    pub(crate) found: bool,
    pub(crate) parent: Option<i64>,
}

/// In-order snapshot of a tree with its structural problems.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Audit {
    /// Keys in in-order traversal order
    pub keys: Vec<i64>,
    /// Nodes on the longest root-to-leaf path (0 when empty)
    pub height: usize,
    /// Nodes whose value lies outside the interval their ancestors imply
    pub violations: Vec<TreeIssue>,
}

impl Audit {
    /// Whether the keys strictly increase and no bound is violated.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty() && self.keys.windows(2).all(|w| w[0] < w[1])
    }
}

struct AuditFrame<'a, L: LockStrategy> {
    guard: ReadGuard<'a, L>,
    depth: usize,
    high: Option<i64>,
}

/// Concurrent ordered set of `i64` with one lock per node.
pub struct LockCoupledTree<L: LockStrategy> {
    /// Right link is the root; the value is never read.
    anchor: Node<L>,
    /// Mints the lock of every new node.
    prototype: L,
    len: AtomicUsize,
}

// SAFETY: node slots are only touched through guards on their lock, and
// nodes are freed only once unreachable (see module docs).
unsafe impl<L: LockStrategy> Send for LockCoupledTree<L> {}
// SAFETY: as above.
unsafe impl<L: LockStrategy> Sync for LockCoupledTree<L> {}

impl<L: LockStrategy> LockCoupledTree<L> {
    pub fn new(lock: L) -> Self {
        debug!(lock = %lock.kind(), "creating lock-coupled tree");
        Self {
            anchor: Node::new(0, lock.derive()),
            prototype: lock,
            len: AtomicUsize::new(0),
        }
    }

    pub fn lock_kind(&self) -> LockKind {
        self.prototype.kind()
    }

    /// Number of keys, exact when no operation is in flight.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert `value`. Returns `true` whether it was added or already present.
    pub fn insert(&self, value: i64) -> bool {
        self.try_insert(value);
        true
    }

    /// Insert `value`, reporting whether it was already present.
    pub fn try_insert(&self, value: i64) -> Insertion {
        let mut parent = self.anchor.write();
        let mut side = Side::Right;

        loop {
            let Some(child) = parent.child(side) else {
                *parent.child_mut(side) = Some(Node::alloc(value, self.prototype.derive()));
                self.len.fetch_add(1, Ordering::Relaxed);
                trace!(value, "inserted");
                return Insertion::Inserted;
            };

            // SAFETY: `child` is linked from `parent`, which is write-locked.
            let current = unsafe { self.node(child) }.write();
            parent = current;

            side = match value.cmp(&parent.value) {
                KeyOrdering::Equal => return Insertion::AlreadyPresent,
                KeyOrdering::Less => Side::Left,
                KeyOrdering::Greater => Side::Right,
            };
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        self.locate(value).found
    }

    pub(crate) fn locate(&self, value: i64) -> Located {
        let mut holder = self.anchor.read();
        let mut next = holder.right;
        let mut parent = None;

        while let Some(ptr) = next {
            // SAFETY: `ptr` is linked from `holder`, which is read-locked.
            let current = unsafe { self.node(ptr) }.read();
            holder = current;

            next = match value.cmp(&holder.value) {
                KeyOrdering::Equal => return Located { found: true, parent },
                KeyOrdering::Less => holder.left,
                KeyOrdering::Greater => holder.right,
            };
            parent = Some(holder.value);
        }

        Located {
            found: false,
            parent,
        }
    }

    /// Remove `value`. Returns `true` if a node was removed.
    pub fn remove(&self, value: i64) -> bool {
        let mut parent = self.anchor.write();
        if parent.right.is_none() {
            return false;
        }
        let mut side = Side::Right;

        loop {
            let Some(child) = parent.child(side) else {
                return false;
            };

            // SAFETY: `child` is linked from `parent`, which is write-locked.
            let current = unsafe { self.node(child) }.write();

            side = match value.cmp(&current.value) {
                KeyOrdering::Equal => {
                    self.unlink(parent, side, current);
                    self.len.fetch_sub(1, Ordering::Relaxed);
                    return true;
                }
                KeyOrdering::Less => Side::Left,
                KeyOrdering::Greater => Side::Right,
            };
            parent = current;
        }
    }

    /// Remove the node held by `target`, the `side` child of `parent`.
    fn unlink<'a>(&'a self, mut parent: WriteGuard<'a, L>, side: Side, mut target: WriteGuard<'a, L>) {
        let (left, right) = (target.left, target.right);

        let Some(right) = right.filter(|_| left.is_some()) else {
            *parent.child_mut(side) = left.or(right);
            let doomed = target.node_ptr();
            drop(target);
            drop(parent);
            // SAFETY: unlinked under the parent's write lock and no guard remains.
            unsafe { Node::free(doomed) };
            return;
        };

        let removed = target.value;
        let successor = self.detach_successor(&mut target, right);
        target.value = successor;
        trace!(removed, successor, "replaced by in-order successor");
        drop(target);
        drop(parent);
    }

    /// Unlink the leftmost node under `right` (the right child of `target`)
    /// and return its value. Write-coupled, top-down from `target`.
    fn detach_successor<'a>(
        &'a self,
        target: &mut WriteGuard<'a, L>,
        right: NonNull<Node<L>>,
    ) -> i64 {
        // SAFETY: `right` is linked from `target`, which is write-locked.
        let first = unsafe { self.node(right) }.write();
        let first_left = first.left;

        let Some(mut next) = first_left else {
            target.right = first.right;
            let value = first.value;
            let doomed = first.node_ptr();
            drop(first);
            // SAFETY: unlinked under `target`'s write lock and no guard remains.
            unsafe { Node::free(doomed) };
            return value;
        };

        let mut prev = first;
        loop {
            // SAFETY: `next` is linked from `prev`, which is write-locked.
            let successor = unsafe { self.node(next) }.write();
            let left = successor.left;

            match left {
                Some(left) => {
                    next = left;
                    prev = successor;
                }
                None => {
                    prev.left = successor.right;
                    let value = successor.value;
                    let doomed = successor.node_ptr();
                    drop(successor);
                    drop(prev);
                    // SAFETY: unlinked under `prev`'s write lock and no guard remains.
                    unsafe { Node::free(doomed) };
                    return value;
                }
            }
        }
    }

    /// Read-coupled in-order walk that records keys, height and bound
    /// violations. Exact only while no writer is active.
    pub fn audit(&self) -> Audit {
        let mut audit = Audit::default();
        let mut stack: Vec<AuditFrame<'_, L>> = Vec::new();

        let mut holder = Some(self.anchor.read());
        let mut next = holder.as_ref().and_then(|anchor| anchor.right);
        let (mut low, mut high, mut depth) = (None, None, 1);

        loop {
            while let Some(ptr) = next {
                // SAFETY: `ptr` is linked from `holder` or from the top of
                // `stack`, both read-locked.
                let guard = unsafe { self.node(ptr) }.read();
                drop(holder.take());

                let value = guard.value;
                if low.is_some_and(|l| value <= l) || high.is_some_and(|h| value >= h) {
                    audit.violations.push(TreeIssue::OutOfBounds { value, low, high });
                }
                audit.height = audit.height.max(depth);

                next = guard.left;
                stack.push(AuditFrame { guard, depth, high });
                high = Some(value);
                depth += 1;
            }

            let Some(frame) = stack.pop() else {
                break;
            };
            let value = frame.guard.value;
            audit.keys.push(value);

            next = frame.guard.right;
            low = Some(value);
            high = frame.high;
            depth = frame.depth + 1;
            holder = Some(frame.guard);
        }

        audit
    }

    /// Keys in ascending order; see [`audit`](Self::audit).
    pub fn keys(&self) -> Vec<i64> {
        self.audit().keys
    }

    pub fn height(&self) -> usize {
        self.audit().height
    }

    pub fn root_value(&self) -> Option<i64> {
        let anchor = self.anchor.read();
        let root = anchor.right?;
        // SAFETY: `root` is linked from the anchor, which is read-locked.
        let value = unsafe { self.node(root) }.read().value;
        Some(value)
    }

    /// # Safety
    ///
    /// `ptr` must be linked from a node whose guard the caller holds.
    unsafe fn node(&self, ptr: NonNull<Node<L>>) -> &Node<L> {
        ptr.as_ref()
    }
}

impl LockCoupledTree<AnyLock> {
    pub fn from_config(config: &TreeConfig) -> Self {
        Self::new(AnyLock::new(config.lock))
    }
}

impl<L: LockStrategy + Default> Default for LockCoupledTree<L> {
    fn default() -> Self {
        Self::new(L::default())
    }
}

impl<L: LockStrategy> Drop for LockCoupledTree<L> {
    fn drop(&mut self) {
        let mut pending: Vec<NonNull<Node<L>>> =
            self.anchor.slot_mut().right.take().into_iter().collect();

        while let Some(ptr) = pending.pop() {
            // SAFETY: `&mut self` rules out live guards, and every node is
            // popped exactly once after its link was taken.
            let children = unsafe { Node::free(ptr) };
            pending.extend(children.into_iter().flatten());
        }
    }
}

impl<L: LockStrategy> fmt::Debug for LockCoupledTree<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockCoupledTree")
            .field("lock", &self.lock_kind())
            .field("len", &self.len())
            .finish()
    }
}

impl<L: LockStrategy> DstTestableSet for LockCoupledTree<L> {
    fn insert_new(&self, value: i64) -> bool {
        self.try_insert(value).is_inserted()
    }

    fn contains(&self, value: i64) -> bool {
        LockCoupledTree::contains(self, value)
    }

    fn remove(&self, value: i64) -> bool {
        LockCoupledTree::remove(self, value)
    }

    fn keys(&self) -> Vec<i64> {
        LockCoupledTree::keys(self)
    }

    fn bound_violations(&self) -> Vec<TreeIssue> {
        self.audit().violations
    }
}


/// Loom tests - these exhaustively check interleavings of the coupling protocol
#[cfg(loom)]
mod loom_tests {
    use super::*;
    use crate::lock::LoomSpinLock;
    use loom::sync::Arc;
    use loom::thread;

    fn tree(values: &[i64]) -> Arc<LockCoupledTree<LoomSpinLock>> {
        let tree = LockCoupledTree::new(LoomSpinLock::new());
        for &v in values {
            tree.insert(v);
        }
        Arc::new(tree)
    }

    #[test]
    fn test_concurrent_first_inserts() {
        loom::model(|| {
            let tree = tree(&[]);

            let t1 = Arc::clone(&tree);
            let t2 = Arc::clone(&tree);
            let h1 = thread::spawn(move || t1.try_insert(1));
            let h2 = thread::spawn(move || t2.try_insert(2));

            assert!(h1.join().unwrap().is_inserted());
            assert!(h2.join().unwrap().is_inserted());
            assert_eq!(tree.keys(), vec![1, 2]);
        });
    }

    #[test]
    fn test_insert_during_two_child_remove() {
        loom::model(|| {
            let tree = tree(&[5, 2, 8]);

            let t1 = Arc::clone(&tree);
            let t2 = Arc::clone(&tree);
            let h1 = thread::spawn(move || t1.remove(5));
            let h2 = thread::spawn(move || t2.insert(7));

            assert!(h1.join().unwrap());
            h2.join().unwrap();

            let audit = tree.audit();
            assert!(audit.is_valid());
            assert_eq!(audit.keys, vec![2, 7, 8]);
        });
    }

    #[test]
    fn test_contains_during_remove() {
        loom::model(|| {
            let tree = tree(&[5, 3]);

            let t1 = Arc::clone(&tree);
            let t2 = Arc::clone(&tree);
            let h1 = thread::spawn(move || t1.remove(3));
            let h2 = thread::spawn(move || (t2.contains(5), t2.contains(3)));

            assert!(h1.join().unwrap());
            let (five, _three) = h2.join().unwrap();
            assert!(five);
            assert_eq!(tree.keys(), vec![5]);
        });
    }

    #[test]
    fn test_competing_removes() {
        loom::model(|| {
            let tree = tree(&[2, 1, 3]);

            let t1 = Arc::clone(&tree);
            let t2 = Arc::clone(&tree);
            let h1 = thread::spawn(move || t1.remove(2));
            let h2 = thread::spawn(move || t2.remove(2));

            let removed = [h1.join().unwrap(), h2.join().unwrap()];
            assert_eq!(removed.iter().filter(|r| **r).count(), 1);
            assert_eq!(tree.keys(), vec![1, 3]);
        });
    }
}
