//! Cooperative scheduler for script threads.
//!
//! Thread bodies are futures polled with a no-op waker. Exactly one body is
//! polled at any time; it runs until it awaits a suspension point (see
//! [`suspend`](super::suspend)) or returns. A round is one host tick followed
//! by resuming, in FIFO order, every thread that yielded during the previous
//! round. Threads woken by `wait_for` join the tail of the round in progress.
//!
//! Pause and kill requests are only acted on at a suspension point. A thread
//! that is parked (queued, paused, or waiting) is already at one, so killing it
//! tears it down on the spot; a thread on the call stack is marked and torn
//! down when it next yields.

use std::any::Any;
use std::cell::{Cell, RefCell, RefMut};
use std::collections::VecDeque;
use std::future::Future;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::task::noop_waker_ref;
use tracing::{debug, trace, warn};

use super::context::ScriptContext;
use super::error::ThreadError;
use super::suspend::{Suspension, YieldSignal};
use super::tcb::{Teardown, ThreadAction, ThreadBody, ThreadControlBlock, ThreadRegistry};
use super::thread::{bind_action, Thread, ThreadId, ThreadState};
use crate::host::Host;

/// State shared between the scheduler and every [`ScriptContext`]
pub(crate) struct Shared<H: Host> {
    registry: RefCell<ThreadRegistry>,
    host: RefCell<H>,
    signal: YieldSignal,
    /// Threads left to resume in the round being drained
    current_round: RefCell<VecDeque<ThreadId>>,
    /// Threads that yielded and resume after the next host tick
    next_round: RefCell<VecDeque<ThreadId>>,
    ticks: Cell<u64>,
}

enum Work {
    Start(ThreadAction),
    Resume(ThreadBody),
}

impl<H: Host> Shared<H> {
    fn new(host: H) -> Self {
        Self {
            registry: RefCell::new(ThreadRegistry::new()),
            host: RefCell::new(host),
            signal: YieldSignal::default(),
            current_round: RefCell::new(VecDeque::new()),
            next_round: RefCell::new(VecDeque::new()),
            ticks: Cell::new(0),
        }
    }

    pub fn current(&self) -> Option<ThreadId> {
        self.registry.borrow().current()
    }

    pub fn signal(&self) -> YieldSignal {
        self.signal.clone()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.get()
    }

    pub fn host_mut(&self) -> Result<RefMut<'_, H>, ThreadError> {
        self.host.try_borrow_mut().map_err(|_| ThreadError::HostBusy)
    }

    pub fn inspect<T>(
        &self,
        id: ThreadId,
        f: impl FnOnce(&ThreadControlBlock) -> T,
    ) -> Result<T, ThreadError> {
        let registry = self.registry.borrow();
        let tcb = registry.get(id)?;
        Ok(f(tcb))
    }

    pub fn children(&self, id: ThreadId) -> Result<Vec<ThreadId>, ThreadError> {
        self.registry.borrow().children(id)
    }

    pub fn create_thread(
        &self,
        parent: Option<ThreadId>,
        daemon: bool,
        action: ThreadAction,
    ) -> ThreadId {
        let id = self.registry.borrow_mut().insert(parent, daemon, action);
        match parent {
            Some(parent) => {
                debug!(target: "scripting", "Created {} (daemon: {}) under {}", id, daemon, parent)
            }
            None => debug!(target: "scripting", "Created {} (daemon: {})", id, daemon),
        }
        id
    }

    /// `Thread::run`: start a created thread and drive it to its first yield
    pub fn start(&self, id: ThreadId) -> Result<(), ThreadError> {
        let orphaned = {
            let mut registry = self.registry.borrow_mut();
            let tcb = registry.get(id)?;
            if tcb.state != ThreadState::Created {
                return Ok(());
            }
            let (parent, daemon) = (tcb.parent, tcb.daemon);

            match parent {
                Some(parent) if registry.is_live(parent) => {
                    registry.get_mut(parent)?.children.push(id);
                    registry.get_mut(id)?.state = ThreadState::Running;
                    false
                }
                // The creator terminated before this thread was started
                Some(_) if daemon => true,
                _ => {
                    let tcb = registry.get_mut(id)?;
                    tcb.parent = None;
                    tcb.state = ThreadState::Running;
                    false
                }
            }
        };

        if orphaned {
            debug!(target: "scripting", "{} not started, its parent already terminated", id);
            self.terminate(id, ThreadState::Killed, None);
            return Ok(());
        }

        debug!(target: "scripting", "Starting {}", id);
        if self.current().is_some() {
            self.drive(id);
            return Ok(());
        }

        // Threads already woken belong to the next round, not to this start
        let woken = mem::take(&mut *self.current_round.borrow_mut());
        self.drive(id);
        self.drain_current_round();
        *self.current_round.borrow_mut() = woken;
        Ok(())
    }

    pub fn request_pause(&self, id: ThreadId) -> Result<(), ThreadError> {
        let mut registry = self.registry.borrow_mut();
        let tcb = registry.get_mut(id)?;
        if !tcb.state.is_terminal() && !tcb.pause_requested {
            tcb.pause_requested = true;
            trace!(target: "scripting", "Pause requested for {}", id);
        }
        Ok(())
    }

    pub fn unpause(&self, id: ThreadId) -> Result<(), ThreadError> {
        let readmit = {
            let mut registry = self.registry.borrow_mut();
            let tcb = registry.get_mut(id)?;
            if tcb.state.is_terminal() {
                return Ok(());
            }
            tcb.pause_requested = false;
            if tcb.state == ThreadState::Paused {
                tcb.state = ThreadState::Running;
                true
            } else {
                false
            }
        };

        if readmit {
            debug!(target: "scripting", "Unpaused {}", id);
            self.next_round.borrow_mut().push_back(id);
        }
        Ok(())
    }

    pub fn request_kill(&self, id: ThreadId) -> Result<(), ThreadError> {
        {
            let mut registry = self.registry.borrow_mut();
            let tcb = registry.get_mut(id)?;
            if tcb.state.is_terminal() {
                return Ok(());
            }
            if tcb.executing {
                tcb.kill_requested = true;
                debug!(target: "scripting", "Kill requested for {}, applied at its next tick", id);
                return Ok(());
            }
        }

        self.terminate(id, ThreadState::Killed, None);
        Ok(())
    }

    /// Resume a queued thread, applying any pending kill or pause first
    fn resume(&self, id: ThreadId) {
        let kill = {
            let mut registry = self.registry.borrow_mut();
            let Ok(tcb) = registry.get_mut(id) else {
                return;
            };
            if tcb.state != ThreadState::Running || tcb.executing || tcb.body.is_none() {
                return;
            }
            if !tcb.kill_requested && tcb.pause_requested {
                tcb.state = ThreadState::Paused;
                debug!(target: "scripting", "Paused {}", id);
                return;
            }
            tcb.kill_requested
        };

        if kill {
            self.terminate(id, ThreadState::Killed, None);
        } else {
            self.drive(id);
        }
    }

    /// Poll a thread body once with `id` as the current thread
    fn drive(&self, id: ThreadId) {
        let (work, previous) = {
            let mut registry = self.registry.borrow_mut();
            let Ok(tcb) = registry.get_mut(id) else {
                return;
            };
            let work = if let Some(body) = tcb.body.take() {
                Work::Resume(body)
            } else if let Some(action) = tcb.action.take() {
                Work::Start(action)
            } else {
                return;
            };
            tcb.executing = true;
            (work, registry.swap_current(Some(id)))
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut body = match work {
                Work::Start(action) => action(),
                Work::Resume(body) => body,
            };
            let mut cx = Context::from_waker(noop_waker_ref());
            let poll = body.as_mut().poll(&mut cx);
            (body, poll)
        }));
        let suspension = self.signal.take();

        let orphaned = {
            let mut registry = self.registry.borrow_mut();
            registry.swap_current(previous);
            registry.get_mut(id).is_ok_and(|tcb| {
                tcb.executing = false;
                tcb.orphaned
            })
        };

        // A daemon that lost its parent mid-body is killed even if it returns
        let ended = if orphaned {
            ThreadState::Killed
        } else {
            ThreadState::Finished
        };

        match outcome {
            Ok((body, Poll::Pending)) => {
                self.suspend(id, body, suspension.unwrap_or(Suspension::Tick));
            }
            Ok((_, Poll::Ready(Ok(())))) => {
                self.terminate(id, ended, None);
            }
            Ok((_, Poll::Ready(Err(error)))) => {
                warn!(target: "scripting", "{} failed: {:#}", id, error);
                self.terminate(id, ended, Some(format!("{:#}", error)));
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(target: "scripting", "{} panicked: {}", id, message);
                self.terminate(id, ended, Some(message));
            }
        }
    }

    /// Park a body that just yielded
    fn suspend(&self, id: ThreadId, body: ThreadBody, suspension: Suspension) {
        let mut registry = self.registry.borrow_mut();
        let Ok(tcb) = registry.get_mut(id) else {
            return;
        };
        tcb.body = Some(body);

        if tcb.kill_requested {
            drop(registry);
            debug!(target: "scripting", "Killing {} at its tick", id);
            self.terminate(id, ThreadState::Killed, None);
            return;
        }

        match suspension {
            Suspension::Tick => {
                if tcb.pause_requested {
                    tcb.state = ThreadState::Paused;
                    debug!(target: "scripting", "Paused {}", id);
                } else {
                    self.next_round.borrow_mut().push_back(id);
                }
            }
            Suspension::Wait(target) => match registry.get_mut(target) {
                Ok(awaited) if !awaited.state.is_terminal() => awaited.waiters.push(id),
                _ => self.current_round.borrow_mut().push_back(id),
            },
        }
    }

    /// Tear a thread down and cascade to its children.
    ///
    /// Released bodies are dropped here, after the registry borrow ends.
    fn terminate(&self, id: ThreadId, state: ThreadState, fault: Option<String>) {
        let Teardown {
            bodies,
            actions,
            woken,
            killed,
            deferred,
            detached,
        } = self.registry.borrow_mut().tear_down(id, state, fault);
        debug!(target: "scripting", "{} {}", id, state);

        for child in &killed {
            debug!(target: "scripting", "Killed daemon {} with its parent {}", child, id);
        }
        for child in &deferred {
            debug!(
                target: "scripting",
                "Daemon {} lost its parent {}, killing at its next tick",
                child,
                id
            );
        }
        for child in &detached {
            debug!(target: "scripting", "Detached {} from its parent {}", child, id);
        }

        self.current_round.borrow_mut().extend(woken);
        drop((bodies, actions));
    }

    fn drain_current_round(&self) {
        loop {
            let next = self.current_round.borrow_mut().pop_front();
            let Some(id) = next else {
                break;
            };
            self.resume(id);
        }
    }

    fn run_round(&self) -> Result<(), ThreadError> {
        if self.current().is_some() {
            return Err(ThreadError::ReentrantRound);
        }

        let tick = self.ticks.get() + 1;
        self.ticks.set(tick);
        self.host_mut()?.tick();

        let resuming = {
            let mut next = self.next_round.borrow_mut();
            let mut current = self.current_round.borrow_mut();
            current.extend(next.drain(..));
            current.len()
        };
        trace!(target: "scripting", "Round {}: resuming {} thread(s)", tick, resuming);

        self.drain_current_round();
        Ok(())
    }

    fn queued(&self) -> usize {
        let registry = self.registry.borrow();
        self.next_round
            .borrow()
            .iter()
            .chain(self.current_round.borrow().iter())
            .filter(|&&id| {
                registry
                    .get(id)
                    .is_ok_and(|tcb| tcb.state == ThreadState::Running)
            })
            .count()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "script thread panicked".to_string()
    }
}

/// Counts of threads by lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadStats {
    pub created: usize,
    pub running: usize,
    pub paused: usize,
    pub finished: usize,
    pub killed: usize,
    /// Finished threads whose action failed
    pub faulted: usize,
}

/// Owns the thread registry and the host, and advances both in lock-step
pub struct Scheduler<H: Host> {
    shared: Rc<Shared<H>>,
}

impl<H: Host> Scheduler<H> {
    pub fn new(host: H) -> Self {
        Self {
            shared: Rc::new(Shared::new(host)),
        }
    }

    /// A context for creating threads from outside any thread body
    pub fn context(&self) -> ScriptContext<H> {
        ScriptContext::new(&self.shared)
    }

    /// Register and start a root thread for a top-level script.
    ///
    /// Root threads have no parent and are never daemons. Like `Thread::run`,
    /// this returns once the script first ticks or finishes.
    pub fn spawn_root<F, Fut>(&self, action: F) -> Result<Thread<H>, ThreadError>
    where
        F: FnOnce(ScriptContext<H>) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        let ctx = self.context();
        let id = self
            .shared
            .create_thread(None, false, bind_action(&ctx, action));
        self.shared.start(id)?;
        Ok(Thread::from_id(ctx, id))
    }

    /// Advance the host one tick, then resume every thread queued for this round
    pub fn run_round(&self) -> Result<(), ThreadError> {
        self.shared.run_round()
    }

    /// Host ticks advanced so far
    pub fn ticks(&self) -> u64 {
        self.shared.ticks()
    }

    pub fn thread(&self, id: ThreadId) -> Result<Thread<H>, ThreadError> {
        self.context().thread_by_id(id)
    }

    pub fn current(&self) -> Option<ThreadId> {
        self.shared.current()
    }

    /// Threads that have started and not terminated
    pub fn live_threads(&self) -> usize {
        self.shared.registry.borrow().live_count()
    }

    /// Threads queued to resume
    pub fn runnable_threads(&self) -> usize {
        self.shared.queued()
    }

    /// No thread is live
    pub fn is_idle(&self) -> bool {
        self.live_threads() == 0
    }

    /// Live threads remain but none can make progress on its own: every one
    /// is paused or waiting on a thread that is.
    pub fn is_stalled(&self) -> bool {
        self.live_threads() > 0 && self.runnable_threads() == 0
    }

    pub fn stats(&self) -> ThreadStats {
        let registry = self.shared.registry.borrow();
        ThreadStats {
            created: registry.count_in_state(ThreadState::Created),
            running: registry.count_in_state(ThreadState::Running),
            paused: registry.count_in_state(ThreadState::Paused),
            finished: registry.count_in_state(ThreadState::Finished),
            killed: registry.count_in_state(ThreadState::Killed),
            faulted: registry.faulted_count(),
        }
    }

    /// Forget finished and killed threads. Handles to them report
    /// [`ThreadError::UnknownThread`] afterwards.
    pub fn prune_terminated(&self) -> usize {
        let pruned = self.shared.registry.borrow_mut().prune_terminated();
        if pruned > 0 {
            debug!(target: "scripting", "Pruned {} terminated thread(s)", pruned);
        }
        pruned
    }

    pub fn with_host<R>(&self, f: impl FnOnce(&mut H) -> R) -> Result<R, ThreadError> {
        let mut host = self.shared.host_mut()?;
        let result = f(&mut host);
        Ok(result)
    }
}
