use std::future::Future;
use std::rc::{Rc, Weak};

use super::error::ThreadError;
use super::scheduler::Shared;
use super::suspend::{Rendezvous, Tick};
use super::thread::{Thread, ThreadId};
use crate::host::Host;

/// Context handed to every script thread body.
///
/// This is the script's only way to reach the scheduler and the host. It holds
/// a weak reference so that suspended bodies, which own their context, never
/// keep the scheduler alive.
pub struct ScriptContext<H: Host> {
    shared: Weak<Shared<H>>,
}

impl<H: Host> ScriptContext<H> {
    pub(crate) fn new(shared: &Rc<Shared<H>>) -> Self {
        Self {
            shared: Rc::downgrade(shared),
        }
    }

    pub(crate) fn shared(&self) -> Result<Rc<Shared<H>>, ThreadError> {
        self.shared.upgrade().ok_or(ThreadError::RuntimeDropped)
    }

    pub(crate) fn rendezvous(&self, target: ThreadId) -> Result<Rendezvous, ThreadError> {
        Ok(Rendezvous::new(self.shared()?.signal(), target))
    }

    // ===== Suspension =====

    /// Let the game run a tick. The current thread does not resume until every
    /// other runnable thread has had its turn and the host has advanced.
    ///
    /// This is also the only point at which a pending `pause()` or `kill()`
    /// aimed at this thread takes effect.
    pub fn tick(&self) -> Tick {
        match self.shared() {
            Ok(shared) if shared.current().is_some() => Tick::new(shared.signal()),
            _ => {
                tracing::warn!(target: "scripting", "tick() called outside of a script thread");
                Tick::ready()
            }
        }
    }

    /// Tick `ticks` times
    pub async fn sleep_ticks(&self, ticks: u32) {
        for _ in 0..ticks {
            self.tick().await;
        }
    }

    // ===== Threads =====

    /// The currently executing thread
    pub fn current(&self) -> Option<Thread<H>> {
        self.current_id()
            .map(|id| Thread::from_id(self.clone(), id))
    }

    pub fn current_id(&self) -> Option<ThreadId> {
        self.shared().ok().and_then(|shared| shared.current())
    }

    /// Create a daemon thread without starting it
    pub fn thread<F, Fut>(&self, action: F) -> Result<Thread<H>, ThreadError>
    where
        F: FnOnce(ScriptContext<H>) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        Thread::new(self, action)
    }

    /// Create a daemon thread and run it straight away
    pub fn spawn<F, Fut>(&self, action: F) -> Result<Thread<H>, ThreadError>
    where
        F: FnOnce(ScriptContext<H>) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        let thread = Thread::new(self, action)?;
        thread.run()?;
        Ok(thread)
    }

    /// Look up a thread by id
    pub fn thread_by_id(&self, id: ThreadId) -> Result<Thread<H>, ThreadError> {
        self.shared()?.inspect(id, |_| ())?;
        Ok(Thread::from_id(self.clone(), id))
    }

    // ===== Host Access =====

    /// Run `f` against the host. Host calls are synchronous and never yield.
    pub fn with_host<R>(&self, f: impl FnOnce(&mut H) -> R) -> Result<R, ThreadError> {
        let shared = self.shared()?;
        let mut host = shared.host_mut()?;
        let result = f(&mut host);
        Ok(result)
    }

    /// Print a line to the client chat
    pub fn print(&self, message: impl AsRef<str>) -> Result<(), ThreadError> {
        self.with_host(|host| host.print(message.as_ref()))
    }

    /// Run a client command, returning its integer result
    pub fn execute(&self, command: impl AsRef<str>) -> anyhow::Result<i64> {
        self.with_host(|host| host.execute_command(command.as_ref()))?
    }

    /// Number of host ticks advanced by the scheduler so far
    pub fn tick_count(&self) -> u64 {
        self.shared().map(|shared| shared.ticks()).unwrap_or(0)
    }
}

impl<H: Host> Clone for ScriptContext<H> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}
