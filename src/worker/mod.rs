//! Single-Worker Serializer
//!
//! Every store operation runs on one actor task, one job at a time, in the
//! order jobs were submitted:
//!
//! ```text
//! Caller 1 ──┐
//! Caller 2 ──┤──► SerialWorker ──► job ──► job ──► job
//! Caller 3 ──┘         (FIFO, concurrency 1)
//! ```
//!
//! A job that submits another job to the same worker runs it inline instead of
//! queueing it behind itself. Ownership is checked against a task-local worker
//! id that is only set while the worker is polling one of its own jobs.

mod actor;

pub use actor::{spawn_serial_worker, SerialWorker, WorkerError, WorkerHandle, WorkerId};
