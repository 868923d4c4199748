//! Cooperative script threads for the game client
//!
//! Scripts are Rust modules compiled directly into the binary. Each launched
//! script becomes a root thread, and any thread can start more. Threads take
//! turns on a single OS thread: one runs until it awaits a tick, and a round
//! of the scheduler advances the game once and gives every runnable thread
//! one turn.

pub mod context;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod script;
pub mod script_runner;
pub mod suspend;
pub(crate) mod tcb;
pub mod thread;

// Re-export commonly used types
pub use context::ScriptContext;
pub use error::ThreadError;
pub use registry::{ScriptFactory, ScriptRegistry};
pub use scheduler::{Scheduler, ThreadStats};
pub use script::{Script, ScriptBody};
pub use script_runner::{RunSummary, ScriptRunner, SessionEnd};
pub use suspend::Tick;
pub use thread::{Thread, ThreadId, ThreadState};
