//! Thread control blocks and the registry that owns them.
//!
//! The registry is an arena keyed by [`ThreadId`]. Parent and child links are
//! plain ids, so there is no ownership cycle between a thread and the threads
//! it started.

use std::collections::HashMap;
use std::mem;

use futures::future::LocalBoxFuture;

use super::error::ThreadError;
use super::thread::{ThreadId, ThreadState};

/// A started thread body, suspended or about to be polled
pub(crate) type ThreadBody = LocalBoxFuture<'static, anyhow::Result<()>>;

/// The entry point of a thread, turned into a [`ThreadBody`] on first run
pub(crate) type ThreadAction = Box<dyn FnOnce() -> ThreadBody>;

/// Per-thread bookkeeping
pub(crate) struct ThreadControlBlock {
    pub daemon: bool,
    pub state: ThreadState,
    pub parent: Option<ThreadId>,
    /// Live threads started by this thread, in start order
    pub children: Vec<ThreadId>,
    pub pause_requested: bool,
    pub kill_requested: bool,
    /// Daemon whose parent terminated while this thread was on the call stack
    pub orphaned: bool,
    /// True while the body is on the call stack (being polled)
    pub executing: bool,
    /// Set when the body returned an error or panicked
    pub fault: Option<String>,
    pub action: Option<ThreadAction>,
    pub body: Option<ThreadBody>,
    /// Threads blocked in `wait_for` on this one
    pub waiters: Vec<ThreadId>,
}

impl ThreadControlBlock {
    fn new(parent: Option<ThreadId>, daemon: bool, action: ThreadAction) -> Self {
        Self {
            daemon,
            state: ThreadState::Created,
            parent,
            children: Vec::new(),
            pause_requested: false,
            kill_requested: false,
            orphaned: false,
            executing: false,
            fault: None,
            action: Some(action),
            body: None,
            waiters: Vec::new(),
        }
    }

    /// Started and not yet terminated
    pub fn is_live(&self) -> bool {
        matches!(self.state, ThreadState::Running | ThreadState::Paused)
    }
}

/// Everything released by a teardown.
///
/// Bodies and actions are handed back to the caller so they can be dropped
/// after the registry borrow is released; dropping a body runs arbitrary
/// destructors from script code.
#[derive(Default)]
pub(crate) struct Teardown {
    pub bodies: Vec<ThreadBody>,
    pub actions: Vec<ThreadAction>,
    /// Waiters to resume, in the order they started waiting
    pub woken: Vec<ThreadId>,
    /// Daemon children killed by the cascade
    pub killed: Vec<ThreadId>,
    /// Daemon children that were on the call stack and get killed at their next tick
    pub deferred: Vec<ThreadId>,
    /// Non-daemon children that lost their parent
    pub detached: Vec<ThreadId>,
}

/// Arena of all thread control blocks plus the "currently executing" slot
pub(crate) struct ThreadRegistry {
    threads: HashMap<ThreadId, ThreadControlBlock>,
    next_id: u64,
    current: Option<ThreadId>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self {
            threads: HashMap::new(),
            next_id: 1,
            current: None,
        }
    }

    /// Register a new thread in the `Created` state
    pub fn insert(
        &mut self,
        parent: Option<ThreadId>,
        daemon: bool,
        action: ThreadAction,
    ) -> ThreadId {
        let id = ThreadId(self.next_id);
        self.next_id += 1;
        self.threads
            .insert(id, ThreadControlBlock::new(parent, daemon, action));
        id
    }

    pub fn get(&self, id: ThreadId) -> Result<&ThreadControlBlock, ThreadError> {
        self.threads.get(&id).ok_or(ThreadError::UnknownThread(id))
    }

    pub fn get_mut(&mut self, id: ThreadId) -> Result<&mut ThreadControlBlock, ThreadError> {
        self.threads
            .get_mut(&id)
            .ok_or(ThreadError::UnknownThread(id))
    }

    pub fn current(&self) -> Option<ThreadId> {
        self.current
    }

    /// Replace the currently executing thread, returning the previous one
    pub fn swap_current(&mut self, id: Option<ThreadId>) -> Option<ThreadId> {
        mem::replace(&mut self.current, id)
    }

    pub fn children(&self, id: ThreadId) -> Result<Vec<ThreadId>, ThreadError> {
        Ok(self.get(id)?.children.clone())
    }

    /// Whether `id` names a live thread
    pub fn is_live(&self, id: ThreadId) -> bool {
        self.threads.get(&id).is_some_and(|tcb| tcb.is_live())
    }

    pub fn count_in_state(&self, state: ThreadState) -> usize {
        self.threads.values().filter(|tcb| tcb.state == state).count()
    }

    pub fn live_count(&self) -> usize {
        self.threads.values().filter(|tcb| tcb.is_live()).count()
    }

    pub fn faulted_count(&self) -> usize {
        self.threads.values().filter(|tcb| tcb.fault.is_some()).count()
    }

    /// Drop every finished or killed thread from the arena
    pub fn prune_terminated(&mut self) -> usize {
        let before = self.threads.len();
        self.threads.retain(|_, tcb| !tcb.state.is_terminal());
        before - self.threads.len()
    }

    /// Move `id` into a terminal state and cascade to its children.
    ///
    /// Live daemon children are killed depth-first; a daemon child that is on
    /// the call stack cannot be dropped here, so it is detached and marked for
    /// a kill at its next tick, or when its body returns. Non-daemon children
    /// are detached.
    /// Does nothing if `id` is unknown or already terminal.
    pub fn tear_down(
        &mut self,
        id: ThreadId,
        state: ThreadState,
        fault: Option<String>,
    ) -> Teardown {
        let mut out = Teardown::default();
        self.tear_down_into(id, state, fault, &mut out);
        out
    }

    fn tear_down_into(
        &mut self,
        id: ThreadId,
        state: ThreadState,
        fault: Option<String>,
        out: &mut Teardown,
    ) {
        debug_assert!(state.is_terminal());

        let Some(tcb) = self.threads.get_mut(&id) else {
            return;
        };
        if tcb.state.is_terminal() {
            return;
        }

        tcb.state = state;
        tcb.fault = fault;
        tcb.pause_requested = false;
        tcb.kill_requested = false;
        out.bodies.extend(tcb.body.take());
        out.actions.extend(tcb.action.take());
        out.woken.append(&mut tcb.waiters);

        let parent = tcb.parent.take();
        let children = mem::take(&mut tcb.children);

        // Reap from the parent
        if let Some(parent) = parent.and_then(|p| self.threads.get_mut(&p)) {
            parent.children.retain(|&child| child != id);
        }

        for child_id in children {
            let Some(child) = self.threads.get_mut(&child_id) else {
                continue;
            };
            if child.state.is_terminal() {
                continue;
            }

            child.parent = None;
            if !child.daemon {
                out.detached.push(child_id);
            } else if child.executing {
                child.kill_requested = true;
                child.orphaned = true;
                out.deferred.push(child_id);
            } else {
                out.killed.push(child_id);
                self.tear_down_into(child_id, ThreadState::Killed, None, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn noop_action() -> ThreadAction {
        Box::new(|| async { Ok(()) }.boxed_local())
    }

    fn start(registry: &mut ThreadRegistry, parent: Option<ThreadId>, daemon: bool) -> ThreadId {
        let id = registry.insert(parent, daemon, noop_action());
        registry.get_mut(id).unwrap().state = ThreadState::Running;
        if let Some(parent) = parent {
            registry.get_mut(parent).unwrap().children.push(id);
        }
        id
    }

    #[test]
    fn test_ids_are_unique_and_lookups_fail_for_unknown() {
        let mut registry = ThreadRegistry::new();
        let a = registry.insert(None, true, noop_action());
        let b = registry.insert(None, true, noop_action());
        assert_ne!(a, b);
        assert_eq!(registry.get(a).unwrap().state, ThreadState::Created);

        let missing = ThreadId(999);
        assert_eq!(
            registry.get(missing).err(),
            Some(ThreadError::UnknownThread(missing))
        );
    }

    #[test]
    fn test_teardown_kills_daemon_children_depth_first() {
        let mut registry = ThreadRegistry::new();
        let root = start(&mut registry, None, false);
        let child = start(&mut registry, Some(root), true);
        let grandchild = start(&mut registry, Some(child), true);
        let sibling = start(&mut registry, Some(root), true);

        let teardown = registry.tear_down(root, ThreadState::Finished, None);

        assert_eq!(teardown.killed, vec![child, grandchild, sibling]);
        for id in [child, grandchild, sibling] {
            assert_eq!(registry.get(id).unwrap().state, ThreadState::Killed);
        }
        assert!(registry.children(root).unwrap().is_empty());
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_teardown_detaches_persistent_children() {
        let mut registry = ThreadRegistry::new();
        let root = start(&mut registry, None, false);
        let persistent = start(&mut registry, Some(root), false);
        let daemon_under_persistent = start(&mut registry, Some(persistent), true);

        let teardown = registry.tear_down(root, ThreadState::Killed, None);

        assert_eq!(teardown.detached, vec![persistent]);
        assert!(teardown.killed.is_empty());
        let tcb = registry.get(persistent).unwrap();
        assert_eq!(tcb.state, ThreadState::Running);
        assert_eq!(tcb.parent, None);
        // The cascade stops at the detached thread
        assert_eq!(
            registry.get(daemon_under_persistent).unwrap().state,
            ThreadState::Running
        );
    }

    #[test]
    fn test_teardown_defers_executing_daemon_child() {
        let mut registry = ThreadRegistry::new();
        let root = start(&mut registry, None, false);
        let child = start(&mut registry, Some(root), true);
        registry.get_mut(child).unwrap().executing = true;

        let teardown = registry.tear_down(root, ThreadState::Killed, None);

        assert_eq!(teardown.deferred, vec![child]);
        let tcb = registry.get(child).unwrap();
        assert_eq!(tcb.state, ThreadState::Running);
        assert!(tcb.kill_requested);
        assert!(tcb.orphaned);
        assert_eq!(tcb.parent, None);
    }

    #[test]
    fn test_teardown_reaps_from_parent_and_wakes_waiters() {
        let mut registry = ThreadRegistry::new();
        let root = start(&mut registry, None, false);
        let child = start(&mut registry, Some(root), true);
        let waiter = start(&mut registry, None, false);
        registry.get_mut(child).unwrap().waiters.push(waiter);

        let teardown = registry.tear_down(child, ThreadState::Finished, Some("boom".into()));

        assert_eq!(teardown.woken, vec![waiter]);
        assert!(registry.children(root).unwrap().is_empty());
        assert_eq!(registry.faulted_count(), 1);

        // Already terminal: second teardown is a no-op
        let again = registry.tear_down(child, ThreadState::Killed, None);
        assert!(again.woken.is_empty());
        assert_eq!(registry.get(child).unwrap().state, ThreadState::Finished);
    }

    #[test]
    fn test_prune_terminated_keeps_live_and_created() {
        let mut registry = ThreadRegistry::new();
        let done = start(&mut registry, None, false);
        let live = start(&mut registry, None, false);
        let created = registry.insert(None, true, noop_action());
        registry.tear_down(done, ThreadState::Finished, None);

        assert_eq!(registry.prune_terminated(), 1);
        assert!(registry.get(done).is_err());
        assert!(registry.get(live).is_ok());
        assert!(registry.get(created).is_ok());
    }
}
