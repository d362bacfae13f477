//! Operator (GM) commands executed inside the world service.

use anyhow::{anyhow, bail, Context};
use server_engine::{Clock, Millis, Module, OffsetClock, ServiceContext};
use std::any::Any;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Replies kept for inspection.
const HISTORY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GmCommand {
    /// Replies with the given text.
    Echo(String),
    /// Reports the current game time and clock offset.
    Now,
    /// Moves game time by the given number of milliseconds.
    Shift(Millis),
    /// Jumps game time to an absolute millisecond timestamp.
    SetTime(Millis),
    /// Returns game time to the system clock.
    ResetTime,
}

impl FromStr for GmCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        let millis = |what: &str| -> anyhow::Result<Millis> {
            rest.parse::<Millis>()
                .with_context(|| format!("{what} expects milliseconds, got {rest:?}"))
        };

        match name.to_ascii_lowercase().as_str() {
            "echo" => Ok(Self::Echo(rest.to_string())),
            "now" => Ok(Self::Now),
            "shift" => Ok(Self::Shift(millis("shift")?)),
            "set_time" => Ok(Self::SetTime(millis("set_time")?)),
            "reset_time" => Ok(Self::ResetTime),
            "" => bail!("empty GM command"),
            other => Err(anyhow!("unknown GM command: {other}")),
        }
    }
}

/// Executes GM commands. Owns the authority to move game time.
pub struct GmModule {
    clock: Arc<OffsetClock>,
    executed: u64,
    history: VecDeque<String>,
}

impl GmModule {
    pub fn new(clock: Arc<OffsetClock>) -> Self {
        Self {
            clock,
            executed: 0,
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Most recent replies, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    pub fn execute(&mut self, command: GmCommand) -> String {
        let reply = match command {
            GmCommand::Echo(text) => text,
            GmCommand::Now => format!(
                "now {} (offset {}ms)",
                self.clock.now_millis(),
                self.clock.offset_millis()
            ),
            GmCommand::Shift(delta) => {
                let offset = self.clock.offset_millis().saturating_add(delta);
                self.clock.set_offset(offset);
                format!("game time shifted by {delta}ms (offset {offset}ms)")
            }
            GmCommand::SetTime(target) => {
                self.clock.update_time_to(target);
                format!("game time set to {target} (offset {}ms)", self.clock.offset_millis())
            }
            GmCommand::ResetTime => {
                self.clock.set_offset(0);
                "game time reset to system time".to_string()
            }
        };

        self.executed += 1;
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(reply.clone());
        info!("🛠️  GM: {}", reply);
        reply
    }
}

impl Module for GmModule {
    fn name(&self) -> &'static str {
        "gm"
    }

    fn tick(&mut self, _ctx: &ServiceContext, _now: Millis) -> anyhow::Result<()> {
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
