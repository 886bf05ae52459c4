//! In-process event bus for progress and log fan-out.
//!
//! Workers publish lifecycle and log events; streaming subscribers (the SSE
//! endpoint) receive them through bounded per-subscriber channels. A ring
//! buffer of recent non-progress events is replayed to new subscribers.

mod bus;
mod event;

pub use bus::{EventBus, Subscription, DEFAULT_BUFFER_SIZE};
pub use event::{Event, EventKind, LogLevel};
