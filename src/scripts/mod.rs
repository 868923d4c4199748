//! Built-in scripts
//!
//! This module contains example scripts that demonstrate the thread API
//! and provide useful functionality out of the box.

pub mod heartbeat;
pub mod hello_world;
pub mod patrol;

use crate::host::Host;
use crate::register_scripts;
use crate::scripting::ScriptRegistry;

/// Create a registry with all built-in scripts
pub fn create_registry<H: Host>() -> ScriptRegistry<H> {
    let mut registry = ScriptRegistry::new();

    register_scripts!(
        registry,
        hello_world::HelloWorldScript,
        heartbeat::HeartbeatScript,
        patrol::PatrolScript,
    );

    registry
}
