//! Eviction Scheduler
//!
//! A cancellable periodic loop that scans one list, ages each record against
//! the configured timeout, and removes expired or orphaned records in one
//! batched delete. Per-record problems never abort a cycle; a failed cycle
//! halts the loop until it is started again.

pub mod clock;
mod cycle;
mod scheduler;

pub use clock::{Clock, FixedClock, SystemClock};
pub use cycle::{CycleReport, EvictionCycle, EvictionError, EvictionSkip};
pub use scheduler::{EvictionScheduler, Transition, DEFAULT_INTERVAL};
