//! One scan-age-act pass over a list.

use crate::collab::{AllPresent, Directory, LogNotifier, Notice, Notifier, SummaryRefresher};
use crate::config::{ConfigDocument, ConfigError, ConfigFile};
use crate::eviction::clock::{age_in_days, parse_timestamp, Clock, SystemClock};
use crate::sheets::{Cell, Key, Record, SheetTransport};
use crate::store::{StoreError, TableStore};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Error that ends a whole cycle
#[derive(Debug, Clone, PartialEq)]
pub enum EvictionError {
    Store(StoreError),
    Config(ConfigError),
    /// The cycle panicked
    Aborted(String),
}

impl std::fmt::Display for EvictionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictionError::Store(e) => write!(f, "store error: {}", e),
            EvictionError::Config(e) => write!(f, "{}", e),
            EvictionError::Aborted(msg) => write!(f, "eviction cycle aborted: {}", msg),
        }
    }
}

impl std::error::Error for EvictionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EvictionError::Store(e) => Some(e),
            EvictionError::Config(e) => Some(e),
            EvictionError::Aborted(_) => None,
        }
    }
}

impl From<StoreError> for EvictionError {
    fn from(e: StoreError) -> Self {
        EvictionError::Store(e)
    }
}

impl From<ConfigError> for EvictionError {
    fn from(e: ConfigError) -> Self {
        EvictionError::Config(e)
    }
}

/// A record left in place this cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictionSkip {
    /// The timestamp field is missing or unparsable
    BadTimestamp { key: Key, value: String },
    /// Field 0 is not an integer key
    NoKey { value: String },
    /// Existence of the entity could not be checked
    DirectoryUnavailable { key: Key, error: String },
}

/// What one cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub scanned: usize,
    /// Keys removed because their entity is gone
    pub missing: Vec<Key>,
    /// Keys removed because they aged out
    pub expired: Vec<Key>,
    pub skipped: Vec<EvictionSkip>,
    /// Candidates whose rows changed while the cycle ran, left alone
    pub superseded: Vec<Key>,
    /// Rows removed by the batched delete
    pub removed: usize,
    /// Best-effort notices that could not be delivered
    pub notify_failures: usize,
}

impl CycleReport {
    pub fn is_idle(&self) -> bool {
        self.missing.is_empty() && self.expired.is_empty()
    }
}

/// Eviction logic bound to one table and its collaborators
pub struct EvictionCycle<T: SheetTransport> {
    store: TableStore<T>,
    config: ConfigFile,
    table: String,
    directory: Arc<dyn Directory>,
    notifier: Arc<dyn Notifier>,
    summary: Arc<dyn SummaryRefresher>,
    clock: Arc<dyn Clock>,
}

impl<T: SheetTransport> EvictionCycle<T> {
    /// Every key is treated as present and notices only go to the log until
    /// real collaborators are supplied.
    pub fn new(store: TableStore<T>, config: ConfigFile, table: impl Into<String>) -> Self {
        EvictionCycle {
            store,
            config,
            table: table.into(),
            directory: Arc::new(AllPresent),
            notifier: Arc::new(LogNotifier),
            summary: Arc::new(LogNotifier),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_directory(mut self, directory: impl Directory) -> Self {
        self.directory = Arc::new(directory);
        self
    }

    pub fn with_notifier(mut self, notifier: impl Notifier) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    pub fn with_summary(mut self, summary: impl SummaryRefresher) -> Self {
        self.summary = Arc::new(summary);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Run one cycle. Per-record problems are logged and recorded in the
    /// report; only store and configuration failures end the cycle early.
    ///
    /// The scan and its collaborator calls run off the worker. The removal is
    /// a single worker job that re-reads the table and only drops rows still
    /// identical to the ones scanned, so a row rewritten in the meantime
    /// survives and its owner hears nothing.
    pub async fn run_once(&self) -> Result<CycleReport, EvictionError> {
        let records = self.store.get_all(&self.table).await?;
        let doc = self.config.read()?;
        let timeout_days = doc.requests_timeout;
        let now = self.clock.now();

        let mut report = CycleReport {
            scanned: records.len(),
            ..CycleReport::default()
        };
        let mut audits: Vec<(Key, Notice)> = Vec::new();

        for record in &records {
            let Some(key) = record.key() else {
                let value = record.field(0).map(Cell::encode).unwrap_or_default();
                warn!(table = %self.table, %value, "skipping record without an integer key");
                report.skipped.push(EvictionSkip::NoKey { value });
                continue;
            };
            if report.missing.contains(&key) || report.expired.contains(&key) {
                continue;
            }
            let name = display_name(record);

            match self.directory.exists(key).await {
                Ok(true) => {}
                Ok(false) => {
                    let notice = Notice::MissingRemoved {
                        table: self.table.clone(),
                        key,
                        name,
                    };
                    audits.push((key, notice));
                    report.missing.push(key);
                    continue;
                }
                Err(e) => {
                    warn!(table = %self.table, key, error = %e, "skipping record, directory unavailable");
                    report.skipped.push(EvictionSkip::DirectoryUnavailable {
                        key,
                        error: e.to_string(),
                    });
                    continue;
                }
            }

            let stamp = record.last().map(Cell::encode).unwrap_or_default();
            let Some(added) = parse_timestamp(&stamp) else {
                warn!(table = %self.table, key, value = %stamp, "skipping record with invalid timestamp");
                report.skipped.push(EvictionSkip::BadTimestamp { key, value: stamp });
                continue;
            };

            let age = age_in_days(now, added);
            if age >= i64::from(timeout_days) {
                let notice = Notice::AgedRemoved {
                    table: self.table.clone(),
                    key,
                    name,
                    timeout_days,
                };
                audits.push((key, notice));
                report.expired.push(key);
            } else {
                debug!(table = %self.table, key, age, "record within timeout");
            }
        }

        if report.is_idle() {
            return Ok(report);
        }

        let doomed: HashSet<Key> = report.missing.iter().chain(&report.expired).copied().collect();
        let scanned: Vec<Record> = records
            .into_iter()
            .filter(|r| r.key().is_some_and(|k| doomed.contains(&k)))
            .collect();
        let removed = self
            .store
            .delete_where(&self.table, move |r| scanned.contains(r))
            .await?;
        report.removed = removed.len();

        let gone: HashSet<Key> = removed.iter().filter_map(Record::key).collect();
        let mut superseded: Vec<Key> = report
            .missing
            .iter()
            .chain(&report.expired)
            .copied()
            .filter(|k| !gone.contains(k))
            .collect();
        superseded.sort_unstable();
        if !superseded.is_empty() {
            info!(table = %self.table, keys = ?superseded, "records changed during the cycle, keeping them");
        }
        report.missing.retain(|k| gone.contains(k));
        report.expired.retain(|k| gone.contains(k));
        report.superseded = superseded;

        for (key, notice) in audits {
            if gone.contains(&key) {
                self.audit(&doc, notice, &mut report).await;
            }
        }
        if report.removed > 0 {
            self.refresh_summary(&doc, &mut report).await;
        }

        for &key in &report.expired {
            let notice = Notice::Evicted {
                table: self.table.clone(),
                timeout_days,
            };
            if let Err(e) = self.notifier.notify_entity(key, notice).await {
                info!(key, error = %e, "unable to notify evicted user");
                report.notify_failures += 1;
            }
        }

        info!(
            table = %self.table,
            removed = report.removed,
            missing = report.missing.len(),
            expired = report.expired.len(),
            superseded = report.superseded.len(),
            skipped = report.skipped.len(),
            "eviction cycle complete"
        );
        Ok(report)
    }

    /// Tell the operator channel, if one is configured. Best effort.
    pub async fn alert_operator(&self, notice: Notice) {
        let channel = match self.config.operator_channel() {
            Ok(channel) => channel,
            Err(e) => {
                warn!(error = %e, %notice, "cannot read operator channel");
                return;
            }
        };
        if let Some(channel) = channel {
            if let Err(e) = self.notifier.notify_channel(channel, notice).await {
                warn!(channel, error = %e, "unable to alert operator");
            }
        }
    }

    async fn audit(&self, doc: &ConfigDocument, notice: Notice, report: &mut CycleReport) {
        info!(table = %self.table, %notice, "evicting record");
        if let Some(channel) = doc.terminal {
            if let Err(e) = self.notifier.notify_channel(channel, notice).await {
                warn!(channel, error = %e, "unable to post audit message");
                report.notify_failures += 1;
            }
        }
    }

    async fn refresh_summary(&self, doc: &ConfigDocument, report: &mut CycleReport) {
        let Err(e) = self.summary.refresh(&self.table).await else {
            return;
        };
        warn!(table = %self.table, error = %e, "unable to refresh list summary");
        report.notify_failures += 1;
        if let Some(locator) = doc.requests_message() {
            let notice = Notice::SummaryStale {
                table: self.table.clone(),
                error: e.to_string(),
            };
            if let Err(e) = self.notifier.notify_channel(locator.channel_id, notice).await {
                warn!(channel = locator.channel_id, error = %e, "unable to report stale summary");
            }
        }
    }
}

fn display_name(record: &Record) -> String {
    record.field(1).map(Cell::encode).unwrap_or_default()
}
