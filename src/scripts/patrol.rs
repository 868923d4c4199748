use futures::FutureExt;
use tracing::info;

use crate::host::Host;
use crate::scripting::{Script, ScriptBody, ScriptContext, Thread};

/// One lap around a 2x2 square
const LAP: [(i64, i64); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

/// Walks the player around a square while a reporter thread prints the
/// position. Takes a short break halfway through by pausing the walker.
#[derive(Default)]
pub struct PatrolScript;

/// Daemon body: one move per tick
async fn walk<H: Host>(ctx: ScriptContext<H>, laps: u32) -> anyhow::Result<()> {
    for lap in 1..=laps {
        for (dx, dz) in LAP {
            ctx.execute(format!("move {} 0 {}", dx, dz))?;
            ctx.tick().await;
        }
        info!(target: "scripts", "PatrolScript: lap {} done", lap);
    }
    Ok(())
}

/// Reports the position every few ticks until killed
async fn report<H: Host>(ctx: ScriptContext<H>, every: u32) -> anyhow::Result<()> {
    loop {
        ctx.sleep_ticks(every).await;
        ctx.execute("pos")?;
    }
}

impl<H: Host> Script<H> for PatrolScript {
    fn id(&self) -> &'static str {
        "patrol"
    }

    fn name(&self) -> &'static str {
        "Patrol"
    }

    fn description(&self) -> &'static str {
        "Walks a square with a position reporter running alongside"
    }

    fn main(self: Box<Self>, ctx: ScriptContext<H>) -> ScriptBody {
        patrol(ctx).boxed_local()
    }
}

async fn patrol<H: Host>(ctx: ScriptContext<H>) -> anyhow::Result<()> {
    ctx.print("Starting patrol")?;

    let walker = ctx.spawn(|ctx| walk(ctx, 2))?;
    let reporter = Thread::new_persistent(&ctx, |ctx| report(ctx, 3))?;
    reporter.run()?;

    ctx.sleep_ticks(4).await;
    walker.pause()?;
    ctx.print("Taking a break")?;
    ctx.sleep_ticks(3).await;
    walker.unpause()?;

    walker.wait_for().await?;
    reporter.kill()?;

    ctx.print("Patrol complete")?;
    Ok(())
}
