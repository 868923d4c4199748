//! Suspension points.
//!
//! A thread body yields by awaiting one of the futures here. Each one raises a
//! [`Suspension`] on the shared [`YieldSignal`] and returns `Pending` exactly
//! once; the scheduler reads the signal to decide where the thread goes next.
//! The second poll, which only happens when the scheduler resumes the thread,
//! completes the future.

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use super::thread::ThreadId;

/// Why a thread body returned `Pending`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Suspension {
    /// Yield until the next round
    Tick,
    /// Park until the given thread terminates
    Wait(ThreadId),
}

/// Slot through which a yielding body tells the scheduler why it yielded
#[derive(Debug, Clone, Default)]
pub(crate) struct YieldSignal(Rc<Cell<Option<Suspension>>>);

impl YieldSignal {
    pub fn raise(&self, suspension: Suspension) {
        self.0.set(Some(suspension));
    }

    pub fn take(&self) -> Option<Suspension> {
        self.0.take()
    }
}

/// Future returned by [`ScriptContext::tick`](super::ScriptContext::tick)
#[must_use = "ticks do nothing unless awaited"]
#[derive(Debug)]
pub struct Tick {
    signal: Option<YieldSignal>,
    yielded: bool,
}

impl Tick {
    pub(crate) fn new(signal: YieldSignal) -> Self {
        Self {
            signal: Some(signal),
            yielded: false,
        }
    }

    /// A tick that completes immediately, used outside of any thread body
    pub(crate) fn ready() -> Self {
        Self {
            signal: None,
            yielded: true,
        }
    }
}

impl Future for Tick {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        if let Some(signal) = &self.signal {
            signal.raise(Suspension::Tick);
        }
        Poll::Pending
    }
}

/// One parking step of `Thread::wait_for`
#[derive(Debug)]
pub(crate) struct Rendezvous {
    signal: YieldSignal,
    target: ThreadId,
    yielded: bool,
}

impl Rendezvous {
    pub fn new(signal: YieldSignal, target: ThreadId) -> Self {
        Self {
            signal,
            target,
            yielded: false,
        }
    }
}

impl Future for Rendezvous {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        self.signal.raise(Suspension::Wait(self.target));
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::noop_waker_ref;

    fn poll_once<F: Future + Unpin>(future: &mut F) -> Poll<F::Output> {
        let mut cx = Context::from_waker(noop_waker_ref());
        Pin::new(future).poll(&mut cx)
    }

    #[test]
    fn test_tick_yields_once_then_completes() {
        let signal = YieldSignal::default();
        let mut tick = Tick::new(signal.clone());

        assert!(poll_once(&mut tick).is_pending());
        assert_eq!(signal.take(), Some(Suspension::Tick));

        assert!(poll_once(&mut tick).is_ready());
        assert_eq!(signal.take(), None);
    }

    #[test]
    fn test_ready_tick_never_yields() {
        let mut tick = Tick::ready();
        assert!(poll_once(&mut tick).is_ready());
    }

    #[test]
    fn test_rendezvous_names_its_target() {
        let signal = YieldSignal::default();
        let target = ThreadId(7);
        let mut rendezvous = Rendezvous::new(signal.clone(), target);

        assert!(poll_once(&mut rendezvous).is_pending());
        assert_eq!(signal.take(), Some(Suspension::Wait(target)));
        assert!(poll_once(&mut rendezvous).is_ready());
    }
}
