//! Pure transformations and shared counters for HTTP fetching.
//!
//! Nothing in here performs I/O; the async parts of the spider live in
//! [`crate::effects`].

mod retry;
mod slots;
mod status;

pub use retry::retry_delay;
pub use slots::{HostSlotGuard, HostSlots, SlotGuard, SlotPool};
pub use status::{host_key, is_success_status, is_terminal_status};
