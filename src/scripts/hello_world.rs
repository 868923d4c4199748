use futures::FutureExt;
use tracing::info;

use crate::host::Host;
use crate::scripting::{Script, ScriptBody, ScriptContext};

/// Example script that sends a greeting, waits a few ticks and says goodbye
#[derive(Default)]
pub struct HelloWorldScript;

impl<H: Host> Script<H> for HelloWorldScript {
    fn id(&self) -> &'static str {
        "hello_world"
    }

    fn name(&self) -> &'static str {
        "Hello World"
    }

    fn description(&self) -> &'static str {
        "Sends a greeting, then a farewell five ticks later"
    }

    fn main(self: Box<Self>, ctx: ScriptContext<H>) -> ScriptBody {
        greet(ctx).boxed_local()
    }
}

async fn greet<H: Host>(ctx: ScriptContext<H>) -> anyhow::Result<()> {
    info!(target: "scripts", "HelloWorldScript started at tick {}", ctx.tick_count());
    ctx.print("Hello, world!")?;

    ctx.sleep_ticks(5).await;

    ctx.print(format!("Goodbye after {} ticks!", ctx.tick_count()))?;
    Ok(())
}
