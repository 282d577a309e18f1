pub mod collab;
pub mod config;
pub mod confirm;
pub mod eviction;
pub mod observability;
pub mod roster;
pub mod sheets;
pub mod store;
pub mod worker;

pub use collab::{Directory, Notice, Notifier, SummaryRefresher};
pub use config::{ConfigDocument, ConfigError, ConfigFile, ServiceConfig};
pub use confirm::{ConfirmationGate, Outcome, Responder};
pub use eviction::{CycleReport, EvictionCycle, EvictionError, EvictionScheduler};
pub use roster::{Member, Roster, RosterError};
pub use sheets::{Cell, InMemorySheets, Key, Record, SheetRange, SheetTransport};
pub use store::{StoreError, TableStore};
pub use worker::{spawn_serial_worker, WorkerHandle};
