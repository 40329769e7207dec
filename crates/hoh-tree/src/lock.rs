//! Per-node locking strategies.
//!
//! A tree node does not embed a `RwLock<T>`: the lock and the data it
//! protects are separate, so one lock may guard many nodes
//! (`SharedExclusiveLock`). Tree code never calls `leave_*` directly; it goes
//! through the RAII guards in `node.rs`, which release on every exit path.
//!
//! | Strategy | Read | Write | `derive` |
//! |----------|------|-------|----------|
//! | `ReaderWriterLock` | shared, re-entrant | exclusive, re-entrant | fresh lock |
//! | `ExclusiveLock` | exclusive | exclusive | fresh lock |
//! | `SharedExclusiveLock` | exclusive, re-entrant | exclusive, re-entrant | same lock |

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lock_api::{GetThreadId, RawMutex as _, RawReentrantMutex, RawRwLock as _, RawRwLockRecursive as _};

use crate::config::LockKind;

/// Lock capability consulted by the tree for every node.
///
/// Callers must pair every `enter_read`/`enter_write` with exactly one
/// `leave_read`/`leave_write` on the same thread.
///
/// # Safety
///
/// The tree hands out unsynchronized access to a node's slot on the
/// strength of this lock, so an implementation must really exclude:
///
/// - `enter_write` returns only once no other thread holds the lock in
///   either mode, and no other thread enters until the matching leave
/// - `enter_read` returns only once no other thread holds it in write mode
/// - a lock and whatever `derive` returns either never exclude each other
///   or are the same lock, which must then admit nested entries from the
///   thread holding it
///
/// A lock that does nothing does not compile without `unsafe`:
///
/// ```compile_fail
/// use hoh_tree::{LockKind, LockStrategy};
///
/// struct NoLock;
///
/// impl LockStrategy for NoLock {
///     fn enter_read(&self) {}
///     fn enter_write(&self) {}
///     unsafe fn leave_read(&self) {}
///     unsafe fn leave_write(&self) {}
///     fn derive(&self) -> Self {
///         NoLock
///     }
///     fn kind(&self) -> LockKind {
///         LockKind::Exclusive
///     }
/// }
/// ```
pub unsafe trait LockStrategy: Send + Sync + Sized + 'static {
    /// Block until the lock is held in read mode.
    fn enter_read(&self);

    /// Block until the lock is held in write mode.
    fn enter_write(&self);

    /// Release read mode.
    ///
    /// # Safety
    ///
    /// The calling thread must hold this lock in read mode.
    unsafe fn leave_read(&self);

    /// Release write mode.
    ///
    /// # Safety
    ///
    /// The calling thread must hold this lock in write mode.
    unsafe fn leave_write(&self);

    /// Lock for a newly created node.
    fn derive(&self) -> Self;

    fn kind(&self) -> LockKind;
}

/// Any number of readers, or one writer.
///
/// The writer may enter again in either mode; its entries nest and the
/// lock opens to other threads when the last one leaves. A reader asking
/// for write mode blocks on itself: there is no upgrade.
pub struct ReaderWriterLock {
    raw: parking_lot::RawRwLock,
    /// Thread id of the writer, 0 when there is none
    owner: AtomicUsize,
    /// Entries held by the writer, the first one included
    depth: AtomicUsize,
}

fn current_thread() -> usize {
    parking_lot::RawThreadId.nonzero_thread_id().get()
}

impl ReaderWriterLock {
    pub fn new() -> Self {
        Self {
            raw: <parking_lot::RawRwLock as lock_api::RawRwLock>::INIT,
            owner: AtomicUsize::new(0),
            depth: AtomicUsize::new(0),
        }
    }

    /// Nested entry by the writer; `false` if this thread is not it.
    fn reenter(&self) -> bool {
        // Only the writer itself can observe its own id here.
        if self.owner.load(Ordering::Relaxed) != current_thread() {
            return false;
        }
        self.depth.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// # Safety
    ///
    /// The calling thread must be the writer.
    unsafe fn leave_writer(&self) {
        if self.depth.fetch_sub(1, Ordering::Relaxed) == 1 {
            self.owner.store(0, Ordering::Relaxed);
            self.raw.unlock_exclusive();
        }
    }
}

impl Default for ReaderWriterLock {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: backed by a parking_lot rwlock; nested entries are only
// granted to the thread that already holds write mode.
unsafe impl LockStrategy for ReaderWriterLock {
    fn enter_read(&self) {
        if self.reenter() {
            return;
        }
        // Recursive read: a queued writer does not block a thread that
        // already reads.
        self.raw.lock_shared_recursive();
    }

    fn enter_write(&self) {
        if self.reenter() {
            return;
        }
        self.raw.lock_exclusive();
        self.owner.store(current_thread(), Ordering::Relaxed);
        self.depth.store(1, Ordering::Relaxed);
    }

    unsafe fn leave_read(&self) {
        if self.owner.load(Ordering::Relaxed) == current_thread() {
            self.leave_writer();
        } else {
            self.raw.unlock_shared();
        }
    }

    unsafe fn leave_write(&self) {
        debug_assert_eq!(
            self.owner.load(Ordering::Relaxed),
            current_thread(),
            "Write mode left by a thread that does not hold it"
        );
        self.leave_writer();
    }

    fn derive(&self) -> Self {
        Self::new()
    }

    fn kind(&self) -> LockKind {
        LockKind::ReaderWriter
    }
}

/// Mutual exclusion; readers block each other.
pub struct ExclusiveLock {
    raw: parking_lot::RawMutex,
}

impl ExclusiveLock {
    pub fn new() -> Self {
        Self {
            raw: <parking_lot::RawMutex as lock_api::RawMutex>::INIT,
        }
    }
}

impl Default for ExclusiveLock {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: both modes take the same parking_lot mutex.
unsafe impl LockStrategy for ExclusiveLock {
    fn enter_read(&self) {
        self.raw.lock();
    }

    fn enter_write(&self) {
        self.raw.lock();
    }

    unsafe fn leave_read(&self) {
        self.raw.unlock();
    }

    unsafe fn leave_write(&self) {
        self.raw.unlock();
    }

    fn derive(&self) -> Self {
        Self::new()
    }

    fn kind(&self) -> LockKind {
        LockKind::Exclusive
    }
}

type RawShared = RawReentrantMutex<parking_lot::RawMutex, parking_lot::RawThreadId>;

/// One mutex for the whole tree.
///
/// Re-entrant: hand-over-hand takes the child's lock before releasing the
/// parent's, and here both are the same lock.
#[derive(Clone)]
pub struct SharedExclusiveLock {
    raw: Arc<RawShared>,
}

impl SharedExclusiveLock {
    pub fn new() -> Self {
        Self {
            raw: Arc::new(RawShared::INIT),
        }
    }

    /// Whether `other` is the very same lock.
    pub fn shares_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.raw, &other.raw)
    }
}

impl Default for SharedExclusiveLock {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: both modes take the same re-entrant mutex, which `derive` shares.
unsafe impl LockStrategy for SharedExclusiveLock {
    fn enter_read(&self) {
        self.raw.lock();
    }

    fn enter_write(&self) {
        self.raw.lock();
    }

    unsafe fn leave_read(&self) {
        self.raw.unlock();
    }

    unsafe fn leave_write(&self) {
        self.raw.unlock();
    }

    fn derive(&self) -> Self {
        self.clone()
    }

    fn kind(&self) -> LockKind {
        LockKind::SharedExclusive
    }
}

/// Strategy chosen at runtime from a `LockKind`.
pub enum AnyLock {
    ReaderWriter(ReaderWriterLock),
    Exclusive(ExclusiveLock),
    SharedExclusive(SharedExclusiveLock),
}

impl AnyLock {
    pub fn new(kind: LockKind) -> Self {
        match kind {
            LockKind::ReaderWriter => AnyLock::ReaderWriter(ReaderWriterLock::new()),
            LockKind::Exclusive => AnyLock::Exclusive(ExclusiveLock::new()),
            LockKind::SharedExclusive => AnyLock::SharedExclusive(SharedExclusiveLock::new()),
        }
    }
}

// SAFETY: forwards to the wrapped strategy, and `derive` keeps the variant.
unsafe impl LockStrategy for AnyLock {
    fn enter_read(&self) {
        match self {
            AnyLock::ReaderWriter(l) => l.enter_read(),
            AnyLock::Exclusive(l) => l.enter_read(),
            AnyLock::SharedExclusive(l) => l.enter_read(),
        }
    }

    fn enter_write(&self) {
        match self {
            AnyLock::ReaderWriter(l) => l.enter_write(),
            AnyLock::Exclusive(l) => l.enter_write(),
            AnyLock::SharedExclusive(l) => l.enter_write(),
        }
    }

    unsafe fn leave_read(&self) {
        match self {
            AnyLock::ReaderWriter(l) => l.leave_read(),
            AnyLock::Exclusive(l) => l.leave_read(),
            AnyLock::SharedExclusive(l) => l.leave_read(),
        }
    }

    unsafe fn leave_write(&self) {
        match self {
            AnyLock::ReaderWriter(l) => l.leave_write(),
            AnyLock::Exclusive(l) => l.leave_write(),
            AnyLock::SharedExclusive(l) => l.leave_write(),
        }
    }

    fn derive(&self) -> Self {
        match self {
            AnyLock::ReaderWriter(l) => AnyLock::ReaderWriter(l.derive()),
            AnyLock::Exclusive(l) => AnyLock::Exclusive(l.derive()),
            AnyLock::SharedExclusive(l) => AnyLock::SharedExclusive(l.derive()),
        }
    }

    fn kind(&self) -> LockKind {
        match self {
            AnyLock::ReaderWriter(l) => l.kind(),
            AnyLock::Exclusive(l) => l.kind(),
            AnyLock::SharedExclusive(l) => l.kind(),
        }
    }
}

impl fmt::Debug for AnyLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AnyLock").field(&self.kind()).finish()
    }
}

/// Spin lock on loom atomics, so loom can explore the coupling protocol.
#[cfg(loom)]
pub struct LoomSpinLock {
    state: loom::sync::atomic::AtomicUsize,
}

#[cfg(loom)]
const LOOM_WRITER: usize = usize::MAX;

#[cfg(loom)]
impl LoomSpinLock {
    pub fn new() -> Self {
        Self {
            state: loom::sync::atomic::AtomicUsize::new(0),
        }
    }
}

// SAFETY: a writer swaps 0 for `LOOM_WRITER`; readers count up from 0
// and never past a writer.
#[cfg(loom)]
unsafe impl LockStrategy for LoomSpinLock {
    fn enter_read(&self) {
        use loom::sync::atomic::Ordering;
        loop {
            let readers = self.state.load(Ordering::Acquire);
            if readers != LOOM_WRITER
                && self
                    .state
                    .compare_exchange(readers, readers + 1, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                return;
            }
            loom::thread::yield_now();
        }
    }

    fn enter_write(&self) {
        use loom::sync::atomic::Ordering;
        while self
            .state
            .compare_exchange(0, LOOM_WRITER, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            loom::thread::yield_now();
        }
    }

    unsafe fn leave_read(&self) {
        self.state.fetch_sub(1, loom::sync::atomic::Ordering::Release);
    }

    unsafe fn leave_write(&self) {
        self.state.store(0, loom::sync::atomic::Ordering::Release);
    }

    fn derive(&self) -> Self {
        Self::new()
    }

    fn kind(&self) -> LockKind {
        LockKind::ReaderWriter
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_reader_writer_allows_concurrent_readers() {
        let lock = ReaderWriterLock::new();
        lock.enter_read();
        lock.enter_read();
        // SAFETY: both reads were entered above on this thread.
        unsafe {
            lock.leave_read();
            lock.leave_read();
        }
        lock.enter_write();
        // SAFETY: write mode was entered above.
        unsafe { lock.leave_write() };
    }

    #[test]
    fn test_reader_writer_writer_excludes_reader() {
        let lock = Arc::new(ReaderWriterLock::new());
        let entered = Arc::new(AtomicBool::new(false));

        lock.enter_write();
        let reader = {
            let lock = Arc::clone(&lock);
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                lock.enter_read();
                entered.store(true, Ordering::SeqCst);
                // SAFETY: read mode was entered above on this thread.
                unsafe { lock.leave_read() };
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!entered.load(Ordering::SeqCst), "Reader ran while writer held the lock");
        // SAFETY: write mode was entered above on this thread.
        unsafe { lock.leave_write() };
        reader.join().unwrap();
        assert!(entered.load(Ordering::SeqCst));
    }

    #[test]
    fn test_exclusive_readers_block_each_other() {
        let lock = Arc::new(ExclusiveLock::new());
        let entered = Arc::new(AtomicBool::new(false));

        lock.enter_read();
        let other = {
            let lock = Arc::clone(&lock);
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                lock.enter_read();
                entered.store(true, Ordering::SeqCst);
                // SAFETY: read mode was entered above on this thread.
                unsafe { lock.leave_read() };
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!entered.load(Ordering::SeqCst), "Second reader entered an exclusive lock");
        // SAFETY: read mode was entered above on this thread.
        unsafe { lock.leave_read() };
        other.join().unwrap();
    }

    #[test]
    fn test_derive_fresh_or_shared() {
        let rw = ReaderWriterLock::new();
        let child = rw.derive();
        rw.enter_write();
        // A fresh lock is independent of its prototype.
        child.enter_write();
        // SAFETY: both were entered above on this thread.
        unsafe {
            child.leave_write();
            rw.leave_write();
        }

        let shared = SharedExclusiveLock::new();
        let derived = shared.derive();
        assert!(shared.shares_with(&derived));
        assert!(!shared.shares_with(&SharedExclusiveLock::new()));
    }

    #[test]
    fn test_shared_exclusive_is_reentrant() {
        let lock = SharedExclusiveLock::new();
        let child = lock.derive();
        lock.enter_write();
        child.enter_write();
        child.enter_read();
        // SAFETY: three entries were made above on this thread.
        unsafe {
            child.leave_read();
            lock.leave_write();
            child.leave_write();
        }
    }

    #[test]
    fn test_reader_writer_writer_reenters_in_either_mode() {
        let lock = Arc::new(ReaderWriterLock::new());
        let (done, finished) = mpsc::channel();
        {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                lock.enter_write();
                lock.enter_write();
                lock.enter_read();
                // SAFETY: three entries were made above on this thread.
                unsafe {
                    lock.leave_read();
                    lock.leave_write();
                    lock.leave_write();
                }
                done.send(()).unwrap();
            });
        }

        finished
            .recv_timeout(Duration::from_secs(2))
            .expect("Nested entries by the writer deadlocked");
        // Fully released: a writer on another thread gets in.
        lock.enter_write();
        // SAFETY: write mode was entered above on this thread.
        unsafe { lock.leave_write() };
    }

    #[test]
    fn test_reader_writer_nested_writer_holds_until_last_leave() {
        let lock = Arc::new(ReaderWriterLock::new());
        let entered = Arc::new(AtomicBool::new(false));

        lock.enter_write();
        lock.enter_write();
        let reader = {
            let lock = Arc::clone(&lock);
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                lock.enter_read();
                entered.store(true, Ordering::SeqCst);
                // SAFETY: read mode was entered above on this thread.
                unsafe { lock.leave_read() };
            })
        };

        // SAFETY: write mode was entered twice above on this thread.
        unsafe { lock.leave_write() };
        thread::sleep(Duration::from_millis(20));
        assert!(!entered.load(Ordering::SeqCst), "Reader ran while the writer was still nested");

        // SAFETY: the outer write entry is still held.
        unsafe { lock.leave_write() };
        reader.join().unwrap();
        assert!(entered.load(Ordering::SeqCst));
    }

    #[test]
    fn test_any_lock_reports_kind() {
        for kind in LockKind::ALL {
            let lock = AnyLock::new(kind);
            assert_eq!(lock.kind(), kind);
            assert_eq!(lock.derive().kind(), kind);
        }
    }
}
