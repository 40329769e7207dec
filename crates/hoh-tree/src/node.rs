//! Tree nodes and their scoped lock guards.
//!
//! A node's slot (value and child links) may only be touched through a
//! guard on that node's lock. Guards release on drop, so every exit path
//! of a traversal releases what it acquired.
//!
//! A thread never holds two guards on the same node, even where the lock
//! would admit a nested entry.
//!
//! Links are raw pointers owned by exactly one parent slot. A node is
//! allocated when first linked and freed by whoever unlinks it, after its
//! own guard has been dropped.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use crate::lock::LockStrategy;

/// Owning edge from a parent slot to a child node.
pub(crate) type Link<L> = Option<NonNull<Node<L>>>;

/// Which child edge of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Left,
    Right,
}

/// The lock-protected part of a node.
pub(crate) struct Slot<L> {
    pub(crate) value: i64,
    pub(crate) left: Link<L>,
    pub(crate) right: Link<L>,
}

impl<L> Slot<L> {
    pub(crate) fn child(&self, side: Side) -> Link<L> {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    pub(crate) fn child_mut(&mut self, side: Side) -> &mut Link<L> {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

pub(crate) struct Node<L> {
    lock: L,
    slot: UnsafeCell<Slot<L>>,
}

impl<L: LockStrategy> Node<L> {
    pub(crate) fn new(value: i64, lock: L) -> Self {
        Self {
            lock,
            slot: UnsafeCell::new(Slot {
                value,
                left: None,
                right: None,
            }),
        }
    }

    /// Heap-allocate a node for linking into a parent slot.
    pub(crate) fn alloc(value: i64, lock: L) -> NonNull<Self> {
        NonNull::from(Box::leak(Box::new(Self::new(value, lock))))
    }

    /// Free an unlinked node and hand back its children.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `alloc`, must already be unlinked from its
    /// parent, and no guard or reference to it may be alive.
    pub(crate) unsafe fn free(ptr: NonNull<Self>) -> [Link<L>; 2] {
        let node = Box::from_raw(ptr.as_ptr());
        let slot = node.slot.into_inner();
        [slot.left, slot.right]
    }

    pub(crate) fn read(&self) -> ReadGuard<'_, L> {
        self.lock.enter_read();
        ReadGuard { node: self }
    }

    pub(crate) fn write(&self) -> WriteGuard<'_, L> {
        self.lock.enter_write();
        WriteGuard { node: self }
    }

    /// Slot access for an exclusively borrowed node; no lock needed.
    pub(crate) fn slot_mut(&mut self) -> &mut Slot<L> {
        self.slot.get_mut()
    }

    #[cfg(test)]
    pub(crate) fn lock(&self) -> &L {
        &self.lock
    }
}

/// Read mode on one node, released on drop.
pub(crate) struct ReadGuard<'a, L: LockStrategy> {
    node: &'a Node<L>,
}

impl<L: LockStrategy> Deref for ReadGuard<'_, L> {
    type Target = Slot<L>;

    fn deref(&self) -> &Slot<L> {
        // SAFETY: read mode excludes writers of this node.
        unsafe { &*self.node.slot.get() }
    }
}

impl<L: LockStrategy> Drop for ReadGuard<'_, L> {
    fn drop(&mut self) {
        // SAFETY: the guard exists only while read mode is held.
        unsafe { self.node.lock.leave_read() }
    }
}

/// Write mode on one node, released on drop.
pub(crate) struct WriteGuard<'a, L: LockStrategy> {
    node: &'a Node<L>,
}

impl<L: LockStrategy> WriteGuard<'_, L> {
    /// The guarded node, for freeing it once this guard is gone.
    pub(crate) fn node_ptr(&self) -> NonNull<Node<L>> {
        NonNull::from(self.node)
    }
}

impl<L: LockStrategy> Deref for WriteGuard<'_, L> {
    type Target = Slot<L>;

    fn deref(&self) -> &Slot<L> {
        // SAFETY: write mode excludes every other guard on this node.
        unsafe { &*self.node.slot.get() }
    }
}

impl<L: LockStrategy> DerefMut for WriteGuard<'_, L> {
    fn deref_mut(&mut self) -> &mut Slot<L> {
        // SAFETY: write mode excludes every other guard on this node.
        unsafe { &mut *self.node.slot.get() }
    }
}

impl<L: LockStrategy> Drop for WriteGuard<'_, L> {
    fn drop(&mut self) {
        // SAFETY: the guard exists only while write mode is held.
        unsafe { self.node.lock.leave_write() }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::lock::{ExclusiveLock, SharedExclusiveLock};

    #[test]
    fn test_slot_sides() {
        let mut node = Node::new(5, ExclusiveLock::new());
        let child = Node::alloc(3, ExclusiveLock::new());
        *node.slot_mut().child_mut(Side::Left) = Some(child);

        {
            let guard = node.read();
            assert_eq!(guard.value, 5);
            assert_eq!(guard.child(Side::Left), Some(child));
            assert_eq!(guard.child(Side::Right), None);
        }

        // SAFETY: `child` is unlinked below before being freed and has no guards.
        *node.slot_mut().child_mut(Side::Left) = None;
        let children = unsafe { Node::free(child) };
        assert_eq!(children, [None, None]);
    }

    #[test]
    fn test_guards_release_on_drop() {
        let node = Node::new(1, ExclusiveLock::new());
        {
            let mut guard = node.write();
            guard.value = 2;
        }
        // Would deadlock if the write guard had leaked its lock.
        assert_eq!(node.read().value, 2);
    }

    #[test]
    fn test_shared_lock_couples_with_itself() {
        let lock = SharedExclusiveLock::new();
        let parent = Node::new(1, lock.derive());
        let child = Node::new(2, lock.derive());

        let parent_guard = parent.write();
        let child_guard = child.write();
        drop(parent_guard);
        assert_eq!(child_guard.value, 2);
        drop(child_guard);

        assert!(parent.lock().shares_with(child.lock()));
    }
}
