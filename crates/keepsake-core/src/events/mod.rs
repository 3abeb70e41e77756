//! Version lifecycle events.
//!
//! The version history emits an event for every capture attempt and deletion.
//! Subscribers are optional; nothing in the store waits on them.

mod bus;
mod event;

pub use bus::{EventBus, EventSubscriber};
pub use event::VersionEvent;
