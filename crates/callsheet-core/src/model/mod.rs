//! Domain types: users with their counters, and the rows they own.

pub mod user;
pub mod work_item;

pub use user::{CounterDelta, Counters, User};
pub use work_item::{Outcome, ParseEnumError, Payload, Priority, Status, WorkItem};
