use thiserror::Error;

use super::thread::ThreadId;

/// Usage errors reported synchronously by thread operations.
///
/// Lifecycle races (starting a thread twice, pausing or killing a thread that
/// already terminated) are not errors; those calls are no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThreadError {
    /// The registry has no entry for this id (pruned, or from another scheduler)
    #[error("unknown script thread {0}")]
    UnknownThread(ThreadId),

    /// A thread attempted to wait for itself
    #[error("script thread {0} cannot wait for itself")]
    SelfWait(ThreadId),

    /// The operation needs a currently executing thread
    #[error("no script thread is currently executing")]
    NotInThread,

    /// A round was requested from inside a thread body
    #[error("cannot advance the scheduler from inside a script thread")]
    ReentrantRound,

    /// The host is already borrowed further up the call stack
    #[error("host is already in use by the current script thread")]
    HostBusy,

    /// The scheduler that owned this handle has been dropped
    #[error("the scheduler for this script thread no longer exists")]
    RuntimeDropped,
}
