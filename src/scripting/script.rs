use futures::future::LocalBoxFuture;

use super::context::ScriptContext;
use crate::host::Host;

/// Body of a script's root thread
pub type ScriptBody = LocalBoxFuture<'static, anyhow::Result<()>>;

/// Trait that all scripts must implement.
///
/// A script is a named top-level program. When launched it becomes a root
/// thread, and it can start as many child threads as it likes from there.
pub trait Script<H: Host>: 'static {
    /// Unique identifier for this script (e.g., "hello_world")
    fn id(&self) -> &'static str;

    /// Human-readable name for this script
    fn name(&self) -> &'static str;

    /// Description of what this script does
    fn description(&self) -> &'static str;

    /// Apply the script's table from `[scripting.config]`, if there is one
    fn configure(&mut self, _config: &toml::Value) -> anyhow::Result<()> {
        Ok(())
    }

    /// Consume the script and produce the body of its root thread
    fn main(self: Box<Self>, ctx: ScriptContext<H>) -> ScriptBody;
}
