//! Sheet Transport Abstraction
//!
//! The remote store only understands three range-addressed calls: read a
//! range, append rows after a table's content, and overwrite a range. There is
//! no per-row insert or delete.
//!
//! Implementations:
//! - `InMemorySheets`: For unit tests and local runs
//! - `SimulatedSheets`: Fault-injecting wrapper for failure tests
//! - `HttpSheets`: REST client (feature `sheets-http`)

use crate::sheets::range::SheetRange;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Raw rows as exchanged with the store
pub type Rows = Vec<Vec<Value>>;

/// Boxed future returned by transport calls
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Error type for transport calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The named table does not exist
    UnknownTable(String),
    /// The range is malformed or does not fit the payload
    InvalidRange(String),
    /// Network, HTTP or authorization failure
    Unavailable(String),
    /// The store answered with something we could not interpret
    Protocol(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::UnknownTable(t) => write!(f, "unknown table: {}", t),
            TransportError::InvalidRange(msg) => write!(f, "invalid range: {}", msg),
            TransportError::Unavailable(msg) => write!(f, "sheet store unavailable: {}", msg),
            TransportError::Protocol(msg) => write!(f, "sheet store protocol error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

/// Range-addressed sheet store
pub trait SheetTransport: Send + Sync + 'static {
    /// Read a range with unformatted values. Trailing empty rows and cells
    /// are omitted by the store.
    fn get<'a>(&'a self, range: &'a SheetRange) -> TransportFuture<'a, Rows>;

    /// Append rows after the existing content of the range's table. The store
    /// picks the destination rows.
    fn append<'a>(&'a self, range: &'a SheetRange, rows: Rows) -> TransportFuture<'a, ()>;

    /// Overwrite a range, starting at its first row. Cells outside the
    /// written values are left untouched.
    fn update<'a>(&'a self, range: &'a SheetRange, rows: Rows) -> TransportFuture<'a, ()>;
}

impl<T: SheetTransport + ?Sized> SheetTransport for Arc<T> {
    fn get<'a>(&'a self, range: &'a SheetRange) -> TransportFuture<'a, Rows> {
        (**self).get(range)
    }

    fn append<'a>(&'a self, range: &'a SheetRange, rows: Rows) -> TransportFuture<'a, ()> {
        (**self).append(range, rows)
    }

    fn update<'a>(&'a self, range: &'a SheetRange, rows: Rows) -> TransportFuture<'a, ()> {
        (**self).update(range, rows)
    }
}

// ============================================================================
// InMemorySheets - For tests and local runs
// ============================================================================

/// Per-call counters, used by tests to assert which remote calls were issued
#[derive(Debug, Default)]
pub struct CallCounts {
    pub gets: AtomicU64,
    pub appends: AtomicU64,
    pub updates: AtomicU64,
}

/// In-memory sheet store that mimics the remote store's trimming behavior
#[derive(Debug, Clone, Default)]
pub struct InMemorySheets {
    tables: Arc<RwLock<HashMap<String, Rows>>>,
    calls: Arc<CallCounts>,
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn trim_row(row: &[Value]) -> Vec<Value> {
    let len = row.iter().rposition(|v| !is_blank(v)).map_or(0, |i| i + 1);
    row[..len].to_vec()
}

fn trim_rows(rows: &[Vec<Value>]) -> Rows {
    let mut out: Rows = rows.iter().map(|r| trim_row(r)).collect();
    while out.last().is_some_and(|r| r.is_empty()) {
        out.pop();
    }
    out
}

impl InMemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or reset) a table containing only a header row
    pub fn create_table(&self, name: &str, header: &[&str]) {
        let header = header.iter().map(|h| Value::String(h.to_string())).collect();
        self.tables.write().insert(name.to_string(), vec![header]);
    }

    /// Builder form of [`create_table`](Self::create_table)
    pub fn with_table(self, name: &str, header: &[&str]) -> Self {
        self.create_table(name, header);
        self
    }

    /// Raw stored rows including the header, untrimmed (for testing)
    pub fn raw_rows(&self, name: &str) -> Option<Rows> {
        self.tables.read().get(name).cloned()
    }

    pub fn get_count(&self) -> u64 {
        self.calls.gets.load(Ordering::Relaxed)
    }

    pub fn append_count(&self) -> u64 {
        self.calls.appends.load(Ordering::Relaxed)
    }

    pub fn update_count(&self) -> u64 {
        self.calls.updates.load(Ordering::Relaxed)
    }

    fn read_range(&self, range: &SheetRange) -> Result<Rows, TransportError> {
        let tables = self.tables.read();
        let rows = tables
            .get(range.table_name())
            .ok_or_else(|| TransportError::UnknownTable(range.table_name().to_string()))?;

        let slice = match range.row_bounds() {
            None => &rows[..],
            Some((start, end)) => {
                let lo = (start as usize - 1).min(rows.len());
                let hi = (end as usize).min(rows.len());
                &rows[lo..hi]
            }
        };
        Ok(trim_rows(slice))
    }

    fn append_rows(&self, range: &SheetRange, new_rows: Rows) -> Result<(), TransportError> {
        let mut tables = self.tables.write();
        let rows = tables
            .get_mut(range.table_name())
            .ok_or_else(|| TransportError::UnknownTable(range.table_name().to_string()))?;

        // Trailing blank rows are reused, as the remote store does.
        while rows.last().is_some_and(|r| r.iter().all(is_blank)) {
            rows.pop();
        }
        rows.extend(new_rows);
        Ok(())
    }

    fn overwrite(&self, range: &SheetRange, new_rows: Rows) -> Result<(), TransportError> {
        if let Some(height) = range.height() {
            if new_rows.len() > height {
                return Err(TransportError::InvalidRange(format!(
                    "{} rows do not fit in {}",
                    new_rows.len(),
                    range
                )));
            }
        }

        let mut tables = self.tables.write();
        let rows = tables
            .get_mut(range.table_name())
            .ok_or_else(|| TransportError::UnknownTable(range.table_name().to_string()))?;

        let start = range.row_bounds().map_or(0, |(start, _)| start as usize - 1);
        for (offset, new_row) in new_rows.into_iter().enumerate() {
            let index = start + offset;
            if rows.len() <= index {
                rows.resize(index + 1, Vec::new());
            }
            let row = &mut rows[index];
            if row.len() < new_row.len() {
                row.resize(new_row.len(), Value::String(String::new()));
            }
            for (col, value) in new_row.into_iter().enumerate() {
                row[col] = value;
            }
        }
        Ok(())
    }
}

impl SheetTransport for InMemorySheets {
    fn get<'a>(&'a self, range: &'a SheetRange) -> TransportFuture<'a, Rows> {
        Box::pin(async move {
            self.calls.gets.fetch_add(1, Ordering::Relaxed);
            self.read_range(range)
        })
    }

    fn append<'a>(&'a self, range: &'a SheetRange, rows: Rows) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.calls.appends.fetch_add(1, Ordering::Relaxed);
            self.append_rows(range, rows)
        })
    }

    fn update<'a>(&'a self, range: &'a SheetRange, rows: Rows) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.calls.updates.fetch_add(1, Ordering::Relaxed);
            self.overwrite(range, rows)
        })
    }
}
