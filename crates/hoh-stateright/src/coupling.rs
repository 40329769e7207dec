//! Lock-coupling state machine.
//!
//! Mirrors `hoh_tree::LockCoupledTree` at the granularity of lock
//! acquisitions: every step of a thread takes at most one lock, and the
//! work it does between two acquisitions is atomic. Node 0 is the anchor
//! whose right link is the root.
//!
//! # Invariants
//!
//! 1. `MutualExclusion`: a writer never shares its lock
//! 2. `NoUseAfterFree`: no thread holds or points at a freed node, and no
//!    live link leads to one
//! 3. `SearchOrder`: the in-order keys strictly increase
//! 4. `AllComplete` (eventually): every operation finishes, so no schedule
//!    deadlocks
//! 5. `Serializable`: once every thread is done, results and final keys
//!    match some serial order of the operations

use std::cmp::Ordering;
use std::collections::BTreeSet;

use hoh_tree::LockKind;
use stateright::{Model, Property};

/// Index into `CouplingState::threads`.
pub type ThreadId = u8;

/// Index into `CouplingState::nodes`.
pub type NodeId = u8;

/// The sentinel whose right link is the root.
pub const ANCHOR: NodeId = 0;

/// Maximum concurrent operations in one model.
pub const THREADS_COUNT_MAX: usize = 4;

/// One operation per modelled thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SetOp {
    Insert(i8),
    Remove(i8),
    Contains(i8),
}

impl SetOp {
    pub fn key(&self) -> i8 {
        match *self {
            SetOp::Insert(k) | SetOp::Remove(k) | SetOp::Contains(k) => k,
        }
    }

    /// Whether the operation couples with write locks.
    pub fn writes(&self) -> bool {
        !matches!(self, SetOp::Contains(_))
    }

    /// Sequential semantics: `Insert` reports whether the key was new.
    fn apply(&self, keys: &mut BTreeSet<i8>) -> bool {
        match *self {
            SetOp::Insert(k) => keys.insert(k),
            SetOp::Remove(k) => keys.remove(&k),
            SetOp::Contains(k) => keys.contains(&k),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeState {
    pub value: i8,
    pub left: Option<NodeId>,
    pub right: Option<NodeId>,
    pub freed: bool,
}

impl NodeState {
    fn new(value: i8) -> Self {
        Self {
            value,
            left: None,
            right: None,
            freed: false,
        }
    }

    pub fn child(&self, side: Side) -> Option<NodeId> {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    fn child_mut(&mut self, side: Side) -> &mut Option<NodeId> {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LockState {
    /// Threads in read mode (one entry per acquisition)
    pub readers: Vec<ThreadId>,
    pub writer: Option<ThreadId>,
    /// Re-entrant write depth of `writer`
    pub depth: u8,
}

/// Where a thread is in its operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pc {
    /// About to lock the anchor.
    Begin,
    /// Holding `parent`; about to lock its `side` child.
    Descend { parent: NodeId, side: Side },
    /// Removing `target` (with `parent` held); about to lock `next` on the
    /// way to the in-order successor, `prev` being the last spine node held.
    Successor {
        parent: NodeId,
        target: NodeId,
        prev: Option<NodeId>,
        next: NodeId,
    },
    /// Finished with this result.
    Done(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadState {
    pub op: SetOp,
    pub pc: Pc,
    /// Nodes this thread has locked, with whether the mode is exclusive
    pub held: Vec<(NodeId, bool)>,
}

impl ThreadState {
    pub fn result(&self) -> Option<bool> {
        match self.pc {
            Pc::Done(result) => Some(result),
            _ => None,
        }
    }
}

/// Global state of the modelled tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CouplingState {
    pub nodes: Vec<NodeState>,
    pub locks: Vec<LockState>,
    pub threads: Vec<ThreadState>,
}

impl CouplingState {
    fn node(&self, id: NodeId) -> &NodeState {
        &self.nodes[id as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut NodeState {
        &mut self.nodes[id as usize]
    }

    pub fn root(&self) -> Option<NodeId> {
        self.node(ANCHOR).right
    }

    pub fn root_value(&self) -> Option<i8> {
        self.root().map(|root| self.node(root).value)
    }

    /// Live nodes reachable from the root, in in-order order.
    pub fn in_order(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = Vec::new();
        let mut next = self.root();
        loop {
            while let Some(id) = next {
                stack.push(id);
                next = self.node(id).left;
            }
            let Some(id) = stack.pop() else {
                break;
            };
            order.push(id);
            next = self.node(id).right;
        }
        order
    }

    pub fn keys(&self) -> Vec<i8> {
        self.in_order().into_iter().map(|id| self.node(id).value).collect()
    }

    pub fn all_done(&self) -> bool {
        self.threads.iter().all(|t| t.result().is_some())
    }

    pub fn results(&self) -> Vec<Option<bool>> {
        self.threads.iter().map(ThreadState::result).collect()
    }

    /// Nodes a thread holds or will follow without re-reading a link.
    fn referenced(&self, thread: &ThreadState) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = thread.held.iter().map(|&(id, _)| id).collect();
        match thread.pc {
            Pc::Descend { parent, .. } => ids.push(parent),
            Pc::Successor {
                parent,
                target,
                prev,
                next,
            } => {
                ids.extend([parent, target, next]);
                ids.extend(prev);
            }
            Pc::Begin | Pc::Done(_) => {}
        }
        ids
    }
}

/// Stateright model of concurrent operations on one small tree.
#[derive(Debug, Clone)]
pub struct CouplingModel {
    pub lock: LockKind,
    /// Keys inserted, in order, before the threads start
    pub initial_keys: Vec<i8>,
    /// One operation per thread
    pub ops: Vec<SetOp>,
}

impl CouplingModel {
    pub fn new(lock: LockKind, initial_keys: Vec<i8>, ops: Vec<SetOp>) -> Self {
        debug_assert!(
            !ops.is_empty() && ops.len() <= THREADS_COUNT_MAX,
            "Model needs 1..={} operations, got {}",
            THREADS_COUNT_MAX,
            ops.len()
        );
        Self {
            lock,
            initial_keys,
            ops,
        }
    }

    pub fn initial_state(&self) -> CouplingState {
        let mut state = CouplingState {
            nodes: vec![NodeState::new(0)],
            locks: vec![LockState::default()],
            threads: self
                .ops
                .iter()
                .map(|&op| ThreadState {
                    op,
                    pc: Pc::Begin,
                    held: Vec::new(),
                })
                .collect(),
        };

        for &key in &self.initial_keys {
            let mut parent = ANCHOR;
            let mut side = Side::Right;
            while let Some(child) = state.node(parent).child(side) {
                side = match key.cmp(&state.node(child).value) {
                    Ordering::Less => Side::Left,
                    Ordering::Greater => Side::Right,
                    Ordering::Equal => break,
                };
                parent = child;
            }
            if state.node(parent).child(side).is_none() {
                let id = self.alloc(&mut state, key);
                *state.node_mut(parent).child_mut(side) = Some(id);
            }
        }

        state
    }

    /// Results and final keys of every serial order of the operations.
    pub fn serial_outcomes(&self) -> BTreeSet<(Vec<bool>, Vec<i8>)> {
        let initial: BTreeSet<i8> = self.initial_state().keys().into_iter().collect();
        let mut outcomes = BTreeSet::new();
        let mut order: Vec<usize> = (0..self.ops.len()).collect();
        self.permute(&mut order, 0, &initial, &mut outcomes);
        outcomes
    }

    fn permute(
        &self,
        order: &mut Vec<usize>,
        k: usize,
        initial: &BTreeSet<i8>,
        outcomes: &mut BTreeSet<(Vec<bool>, Vec<i8>)>,
    ) {
        if k == order.len() {
            let mut keys = initial.clone();
            let mut results = vec![false; self.ops.len()];
            for &t in order.iter() {
                results[t] = self.ops[t].apply(&mut keys);
            }
            outcomes.insert((results, keys.into_iter().collect()));
            return;
        }
        for i in k..order.len() {
            order.swap(k, i);
            self.permute(order, k + 1, initial, outcomes);
            order.swap(k, i);
        }
    }

    fn lock_index(&self, node: NodeId) -> usize {
        if self.lock.is_coarse() {
            0
        } else {
            node as usize
        }
    }

    fn exclusive(&self, write: bool) -> bool {
        write || self.lock != LockKind::ReaderWriter
    }

    fn can_acquire(&self, state: &CouplingState, thread: ThreadId, node: NodeId, write: bool) -> bool {
        let lock = &state.locks[self.lock_index(node)];
        if self.lock.is_coarse() && lock.writer == Some(thread) {
            return true;
        }
        if self.exclusive(write) {
            lock.writer.is_none() && lock.readers.is_empty()
        } else {
            lock.writer.is_none()
        }
    }

    fn acquire(&self, state: &mut CouplingState, thread: ThreadId, node: NodeId, write: bool) {
        debug_assert!(self.can_acquire(state, thread, node, write));
        let exclusive = self.exclusive(write);
        let lock = &mut state.locks[self.lock_index(node)];
        if exclusive {
            lock.writer = Some(thread);
            lock.depth += 1;
        } else {
            lock.readers.push(thread);
        }
        state.threads[thread as usize].held.push((node, exclusive));
    }

    fn release(&self, state: &mut CouplingState, thread: ThreadId, node: NodeId) {
        let held = &mut state.threads[thread as usize].held;
        let Some(pos) = held.iter().position(|&(id, _)| id == node) else {
            debug_assert!(false, "Thread {} released unheld node {}", thread, node);
            return;
        };
        let (_, exclusive) = held.remove(pos);

        let lock = &mut state.locks[self.lock_index(node)];
        if exclusive {
            lock.depth -= 1;
            if lock.depth == 0 {
                lock.writer = None;
            }
        } else if let Some(pos) = lock.readers.iter().position(|&r| r == thread) {
            lock.readers.remove(pos);
        }
    }

    fn alloc(&self, state: &mut CouplingState, value: i8) -> NodeId {
        let id = state.nodes.len() as NodeId;
        state.nodes.push(NodeState::new(value));
        if !self.lock.is_coarse() {
            state.locks.push(LockState::default());
        }
        id
    }

    /// Whether `thread` can take its next step now.
    pub fn enabled(&self, state: &CouplingState, thread: ThreadId) -> bool {
        let t = &state.threads[thread as usize];
        match t.pc {
            Pc::Begin => self.can_acquire(state, thread, ANCHOR, t.op.writes()),
            Pc::Descend { parent, side } => match state.node(parent).child(side) {
                None => true,
                Some(child) => self.can_acquire(state, thread, child, t.op.writes()),
            },
            Pc::Successor { next, .. } => self.can_acquire(state, thread, next, true),
            Pc::Done(_) => false,
        }
    }

    /// Advance `thread` by one step. The caller checks `enabled` first.
    pub fn step(&self, state: &mut CouplingState, thread: ThreadId) {
        let ti = thread as usize;
        let op = state.threads[ti].op;
        let write = op.writes();

        match state.threads[ti].pc {
            Pc::Begin => {
                self.acquire(state, thread, ANCHOR, write);
                state.threads[ti].pc = if matches!(op, SetOp::Remove(_)) && state.root().is_none() {
                    self.release(state, thread, ANCHOR);
                    Pc::Done(false)
                } else {
                    Pc::Descend {
                        parent: ANCHOR,
                        side: Side::Right,
                    }
                };
            }

            Pc::Descend { parent, side } => {
                let Some(child) = state.node(parent).child(side) else {
                    let result = match op {
                        SetOp::Insert(key) => {
                            let id = self.alloc(state, key);
                            *state.node_mut(parent).child_mut(side) = Some(id);
                            true
                        }
                        SetOp::Remove(_) | SetOp::Contains(_) => false,
                    };
                    self.release(state, thread, parent);
                    state.threads[ti].pc = Pc::Done(result);
                    return;
                };

                self.acquire(state, thread, child, write);
                let next_side = match op.key().cmp(&state.node(child).value) {
                    Ordering::Less => Side::Left,
                    Ordering::Greater => Side::Right,
                    Ordering::Equal => {
                        state.threads[ti].pc = self.found(state, thread, parent, side, child);
                        return;
                    }
                };
                self.release(state, thread, parent);
                state.threads[ti].pc = Pc::Descend {
                    parent: child,
                    side: next_side,
                };
            }

            Pc::Successor {
                parent,
                target,
                prev,
                next,
            } => {
                self.acquire(state, thread, next, true);

                if let Some(left) = state.node(next).left {
                    if let Some(prev) = prev {
                        self.release(state, thread, prev);
                    }
                    state.threads[ti].pc = Pc::Successor {
                        parent,
                        target,
                        prev: Some(next),
                        next: left,
                    };
                    return;
                }

                let orphan = state.node(next).right;
                match prev {
                    None => state.node_mut(target).right = orphan,
                    Some(prev) => state.node_mut(prev).left = orphan,
                }
                state.node_mut(target).value = state.node(next).value;

                self.release(state, thread, next);
                state.node_mut(next).freed = true;
                if let Some(prev) = prev {
                    self.release(state, thread, prev);
                }
                self.release(state, thread, target);
                self.release(state, thread, parent);
                state.threads[ti].pc = Pc::Done(true);
            }

            Pc::Done(_) => {}
        }
    }

    /// The key sits in `child`, the `side` child of `parent`; both are held.
    fn found(&self, state: &mut CouplingState, thread: ThreadId, parent: NodeId, side: Side, child: NodeId) -> Pc {
        let op = state.threads[thread as usize].op;
        if !matches!(op, SetOp::Remove(_)) {
            self.release(state, thread, parent);
            self.release(state, thread, child);
            return Pc::Done(matches!(op, SetOp::Contains(_)));
        }

        let node = state.node(child);
        if let (Some(_), Some(right)) = (node.left, node.right) {
            return Pc::Successor {
                parent,
                target: child,
                prev: None,
                next: right,
            };
        }

        let splice = node.left.or(node.right);
        *state.node_mut(parent).child_mut(side) = splice;
        self.release(state, thread, child);
        self.release(state, thread, parent);
        state.node_mut(child).freed = true;
        Pc::Done(true)
    }

    /// Run `schedule` step by step; `None` if a step is not enabled.
    pub fn run_schedule(&self, schedule: &[ThreadId]) -> Option<CouplingState> {
        let mut state = self.initial_state();
        for &thread in schedule {
            if !self.enabled(&state, thread) {
                return None;
            }
            self.step(&mut state, thread);
        }
        Some(state)
    }

    fn mutual_exclusion(state: &CouplingState) -> bool {
        state
            .locks
            .iter()
            .all(|lock| lock.writer.is_none() || lock.readers.is_empty())
    }

    fn no_use_after_free(state: &CouplingState) -> bool {
        let live = |id: NodeId| !state.node(id).freed;
        state.in_order().into_iter().all(live)
            && state
                .threads
                .iter()
                .all(|t| state.referenced(t).into_iter().all(live))
    }

    fn search_order(state: &CouplingState) -> bool {
        state.keys().windows(2).all(|w| w[0] < w[1])
    }

    fn serializable(&self, state: &CouplingState) -> bool {
        if !state.all_done() {
            return true;
        }
        let results: Vec<bool> = state.results().into_iter().flatten().collect();
        self.serial_outcomes().contains(&(results, state.keys()))
    }
}

/// Action: let one thread take its next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Step(pub ThreadId);

impl Model for CouplingModel {
    type State = CouplingState;
    type Action = Step;

    fn init_states(&self) -> Vec<Self::State> {
        vec![self.initial_state()]
    }

    fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
        for thread in 0..state.threads.len() as ThreadId {
            if self.enabled(state, thread) {
                actions.push(Step(thread));
            }
        }
    }

    fn next_state(&self, last_state: &Self::State, action: Self::Action) -> Option<Self::State> {
        let mut next = last_state.clone();
        self.step(&mut next, action.0);
        Some(next)
    }

    fn properties(&self) -> Vec<Property<Self>> {
        vec![
            Property::always("MutualExclusion", |_, state| CouplingModel::mutual_exclusion(state)),
            Property::always("NoUseAfterFree", |_, state| CouplingModel::no_use_after_free(state)),
            Property::always("SearchOrder", |_, state| CouplingModel::search_order(state)),
            Property::always("Serializable", |model, state| model.serializable(state)),
            Property::eventually("AllComplete", |_, state: &CouplingState| state.all_done()),
            Property::sometimes("LockContention", |model: &CouplingModel, state: &CouplingState| {
                (0..state.threads.len() as ThreadId)
                    .any(|t| state.threads[t as usize].result().is_none() && !model.enabled(state, t))
            }),
        ]
    }
}
