//! The game client as seen by scripts.
//!
//! World queries, inventory and input simulation all live behind [`Host`].
//! The scheduler only needs [`Host::tick`]; everything else is reached by
//! script code through [`ScriptContext::with_host`](crate::scripting::ScriptContext::with_host).

use anyhow::{anyhow, bail, Context as _};
use tracing::info;

/// External collaborator driven by the scheduler.
///
/// Host calls are synchronous and must not call back into the scheduler.
pub trait Host: 'static {
    /// Advance the game by one step
    fn tick(&mut self);

    /// Print a line to the client chat
    fn print(&mut self, message: &str) {
        info!(target: "chat", "{}", message);
    }

    /// Run a client command and return its integer result
    fn execute_command(&mut self, command: &str) -> anyhow::Result<i64> {
        bail!("unsupported command: {}", command)
    }
}

/// Block position of the player
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

/// In-memory stand-in for a connected client.
///
/// Keeps a tick counter, a chat log and a player position, and understands a
/// handful of commands:
///
/// - `tick`: the current game tick
/// - `echo <text>`: prints `text`, returns its length
/// - `pos`: prints the player position, returns its x coordinate
/// - `move <dx> <dy> <dz>`: moves the player, returns 1
#[derive(Debug, Default)]
pub struct SimulatedHost {
    ticks: u64,
    chat: Vec<String>,
    position: Position,
    echo_chat: bool,
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log every chat line through `tracing`
    pub fn with_chat_logging(mut self) -> Self {
        self.echo_chat = true;
        self
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn chat(&self) -> &[String] {
        &self.chat
    }

    pub fn position(&self) -> Position {
        self.position
    }

    fn parse_coord(arg: Option<&str>, axis: &str) -> anyhow::Result<i64> {
        let arg = arg.ok_or_else(|| anyhow!("move: missing {} offset", axis))?;
        arg.parse()
            .with_context(|| format!("move: invalid {} offset '{}'", axis, arg))
    }
}

impl Host for SimulatedHost {
    fn tick(&mut self) {
        self.ticks += 1;
    }

    fn print(&mut self, message: &str) {
        if self.echo_chat {
            info!(target: "chat", "{}", message);
        }
        self.chat.push(message.to_string());
    }

    fn execute_command(&mut self, command: &str) -> anyhow::Result<i64> {
        let command = command.trim().trim_start_matches('/');
        let (name, rest) = command.split_once(' ').unwrap_or((command, ""));

        match name {
            "tick" => Ok(self.ticks as i64),
            "echo" => {
                self.print(rest);
                Ok(rest.len() as i64)
            }
            "pos" => {
                let Position { x, y, z } = self.position;
                self.print(&format!("{} {} {}", x, y, z));
                Ok(x)
            }
            "move" => {
                let mut args = rest.split_whitespace();
                let dx = Self::parse_coord(args.next(), "x")?;
                let dy = Self::parse_coord(args.next(), "y")?;
                let dz = Self::parse_coord(args.next(), "z")?;
                self.position.x += dx;
                self.position.y += dy;
                self.position.z += dz;
                Ok(1)
            }
            "" => bail!("empty command"),
            other => bail!("unknown command: {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands() {
        let mut host = SimulatedHost::new();
        host.tick();
        host.tick();

        assert_eq!(host.execute_command("tick").unwrap(), 2);
        assert_eq!(host.execute_command("/echo hello").unwrap(), 5);
        assert_eq!(host.execute_command("move 3 0 -2").unwrap(), 1);
        assert_eq!(host.execute_command("pos").unwrap(), 3);

        assert_eq!(host.position(), Position { x: 3, y: 0, z: -2 });
        assert_eq!(host.chat(), ["hello", "3 0 -2"]);
    }

    #[test]
    fn test_bad_commands() {
        let mut host = SimulatedHost::new();
        assert!(host.execute_command("").is_err());
        assert!(host.execute_command("fly").is_err());

        let err = host.execute_command("move 1 two 3").unwrap_err();
        assert!(format!("{:#}", err).contains("invalid y offset"));
        assert_eq!(host.position(), Position::default());
    }
}
