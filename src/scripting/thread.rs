use std::fmt;
use std::future::Future;

use futures::FutureExt;

use super::context::ScriptContext;
use super::error::ThreadError;
use super::tcb::ThreadAction;
use crate::host::Host;

/// Unique identifier for a script thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub(crate) u64);

impl ThreadId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread-{}", self.0)
    }
}

/// Lifecycle state of a script thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Constructed, `run()` not called yet
    Created,
    /// Started and eligible to execute
    Running,
    /// Withheld from scheduling until unpaused
    Paused,
    /// The action returned, normally or with a fault
    Finished,
    /// Torn down by `kill()` or by its parent terminating
    Killed,
}

impl ThreadState {
    /// Finished or killed
    pub fn is_terminal(&self) -> bool {
        matches!(self, ThreadState::Finished | ThreadState::Killed)
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThreadState::Created => "created",
            ThreadState::Running => "running",
            ThreadState::Paused => "paused",
            ThreadState::Finished => "finished",
            ThreadState::Killed => "killed",
        };
        f.write_str(name)
    }
}

/// Handle to a script thread.
///
/// Only one script thread executes at a time. A thread gives up control by
/// awaiting [`ScriptContext::tick`], which lets every other runnable thread
/// run and the game advance one tick. Handles are cheap to clone and compare
/// equal when they name the same thread.
pub struct Thread<H: Host> {
    id: ThreadId,
    ctx: ScriptContext<H>,
}

impl<H: Host> Thread<H> {
    /// Create a daemon thread, killed automatically when the thread that
    /// created it terminates. It does not start until [`Thread::run`].
    pub fn new<F, Fut>(ctx: &ScriptContext<H>, action: F) -> Result<Self, ThreadError>
    where
        F: FnOnce(ScriptContext<H>) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        Self::with_daemon(ctx, action, true)
    }

    /// Create a non-daemon thread, which may outlive the thread that created it
    pub fn new_persistent<F, Fut>(ctx: &ScriptContext<H>, action: F) -> Result<Self, ThreadError>
    where
        F: FnOnce(ScriptContext<H>) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        Self::with_daemon(ctx, action, false)
    }

    /// Create a thread parented to the currently executing thread
    pub fn with_daemon<F, Fut>(
        ctx: &ScriptContext<H>,
        action: F,
        daemon: bool,
    ) -> Result<Self, ThreadError>
    where
        F: FnOnce(ScriptContext<H>) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        let shared = ctx.shared()?;
        let parent = shared.current();
        let id = shared.create_thread(parent, daemon, bind_action(ctx, action));
        Ok(Self::from_id(ctx.clone(), id))
    }

    pub(crate) fn from_id(ctx: ScriptContext<H>, id: ThreadId) -> Self {
        Self { id, ctx }
    }

    /// The currently executing thread, if any
    pub fn current(ctx: &ScriptContext<H>) -> Option<Self> {
        ctx.current()
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Start the thread. Control transfers to it immediately and this call
    /// returns once it reaches its first tick or finishes. Does nothing if the
    /// thread was already started.
    pub fn run(&self) -> Result<(), ThreadError> {
        self.ctx.shared()?.start(self.id)
    }

    /// Pause the thread at its next tick. A thread that pauses itself keeps
    /// running until it ticks.
    pub fn pause(&self) -> Result<(), ThreadError> {
        self.ctx.shared()?.request_pause(self.id)
    }

    /// Cancel a pending pause, or make a paused thread runnable from the next round
    pub fn unpause(&self) -> Result<(), ThreadError> {
        self.ctx.shared()?.unpause(self.id)
    }

    /// Kill the thread. A thread that is mid-body (itself, or one waiting on
    /// a `run()` further up the call stack) keeps running until its next tick.
    pub fn kill(&self) -> Result<(), ThreadError> {
        self.ctx.shared()?.request_kill(self.id)
    }

    /// Block the current thread until this thread has finished or been killed.
    ///
    /// Fails immediately when a thread waits for itself, or when called
    /// outside of any thread body.
    pub async fn wait_for(&self) -> Result<(), ThreadError> {
        let waiter = self.ctx.shared()?.current().ok_or(ThreadError::NotInThread)?;
        if waiter == self.id {
            return Err(ThreadError::SelfWait(self.id));
        }

        while !self.state()?.is_terminal() {
            self.ctx.rendezvous(self.id)?.await;
        }
        Ok(())
    }

    pub fn state(&self) -> Result<ThreadState, ThreadError> {
        self.ctx.shared()?.inspect(self.id, |tcb| tcb.state)
    }

    /// Started and not yet finished or killed. This does not mean the thread
    /// is the one executing right now; compare with [`Thread::current`] for that.
    pub fn is_running(&self) -> Result<bool, ThreadError> {
        Ok(matches!(
            self.state()?,
            ThreadState::Running | ThreadState::Paused
        ))
    }

    pub fn is_paused(&self) -> Result<bool, ThreadError> {
        Ok(self.state()? == ThreadState::Paused)
    }

    pub fn is_daemon(&self) -> Result<bool, ThreadError> {
        self.ctx.shared()?.inspect(self.id, |tcb| tcb.daemon)
    }

    /// The thread that created this one. `None` for root threads and for
    /// threads whose parent has already terminated.
    pub fn parent(&self) -> Result<Option<Self>, ThreadError> {
        let parent = self.ctx.shared()?.inspect(self.id, |tcb| tcb.parent)?;
        Ok(parent.map(|id| Self::from_id(self.ctx.clone(), id)))
    }

    /// Live threads started by this thread, in start order
    pub fn children(&self) -> Result<Vec<Self>, ThreadError> {
        let children = self.ctx.shared()?.children(self.id)?;
        Ok(children
            .into_iter()
            .map(|id| Self::from_id(self.ctx.clone(), id))
            .collect())
    }

    /// The error or panic message if the action failed
    pub fn fault(&self) -> Result<Option<String>, ThreadError> {
        self.ctx.shared()?.inspect(self.id, |tcb| tcb.fault.clone())
    }
}

pub(crate) fn bind_action<H, F, Fut>(ctx: &ScriptContext<H>, action: F) -> ThreadAction
where
    H: Host,
    F: FnOnce(ScriptContext<H>) -> Fut + 'static,
    Fut: Future<Output = anyhow::Result<()>> + 'static,
{
    let ctx = ctx.clone();
    Box::new(move || action(ctx).boxed_local())
}

impl<H: Host> Clone for Thread<H> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            ctx: self.ctx.clone(),
        }
    }
}

impl<H: Host> PartialEq for Thread<H> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<H: Host> Eq for Thread<H> {}

impl<H: Host> fmt::Debug for Thread<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread").field("id", &self.id).finish()
    }
}

impl<H: Host> fmt::Display for Thread<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.id.fmt(f)
    }
}
