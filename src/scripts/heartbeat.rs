use anyhow::{bail, Context as _};
use futures::FutureExt;

use crate::host::Host;
use crate::scripting::{Script, ScriptBody, ScriptContext};

/// Prints a numbered beat every `interval` ticks.
///
/// Configured from `[scripting.config.heartbeat]`:
///
/// ```toml
/// [scripting.config.heartbeat]
/// interval = 20  # ticks between beats
/// beats = 3      # stop after this many beats, 0 for never
/// ```
pub struct HeartbeatScript {
    interval: u32,
    beats: u32,
}

impl Default for HeartbeatScript {
    fn default() -> Self {
        Self {
            interval: 20,
            beats: 3,
        }
    }
}

fn read_u32(config: &toml::Value, key: &str) -> anyhow::Result<Option<u32>> {
    let Some(value) = config.get(key) else {
        return Ok(None);
    };
    let value = value
        .as_integer()
        .with_context(|| format!("'{}' must be an integer", key))?;
    let value = u32::try_from(value).with_context(|| format!("'{}' is out of range", key))?;
    Ok(Some(value))
}

impl<H: Host> Script<H> for HeartbeatScript {
    fn id(&self) -> &'static str {
        "heartbeat"
    }

    fn name(&self) -> &'static str {
        "Heartbeat"
    }

    fn description(&self) -> &'static str {
        "Prints a numbered beat at a fixed tick interval"
    }

    fn configure(&mut self, config: &toml::Value) -> anyhow::Result<()> {
        if let Some(interval) = read_u32(config, "interval")? {
            if interval == 0 {
                bail!("'interval' must be at least 1");
            }
            self.interval = interval;
        }
        if let Some(beats) = read_u32(config, "beats")? {
            self.beats = beats;
        }
        Ok(())
    }

    fn main(self: Box<Self>, ctx: ScriptContext<H>) -> ScriptBody {
        self.beat(ctx).boxed_local()
    }
}

impl HeartbeatScript {
    async fn beat<H: Host>(self: Box<Self>, ctx: ScriptContext<H>) -> anyhow::Result<()> {
        let mut beat = 0;
        while self.beats == 0 || beat < self.beats {
            ctx.sleep_ticks(self.interval).await;
            beat += 1;
            ctx.print(format!("beat {} (tick {})", beat, ctx.tick_count()))?;
        }
        Ok(())
    }
}
