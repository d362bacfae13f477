//! Time sources and pacing primitives.

mod clock;
mod ticker;

pub use clock::{system_millis, Clock, ManualClock, Millis, OffsetClock};
pub use ticker::{TimeTicker, DEFAULT_TICK_INTERVAL_MS};
