//! Injected collaborator capabilities.
//!
//! The chat surface that owns real users and channels lives outside this
//! crate. It hands the core three capabilities: an entity directory, a
//! notification sink, and a refresher for the displayed list summary.

use crate::sheets::Key;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::info;

pub type CollabFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Something to tell an entity or a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Sent to the owner of an evicted record
    Evicted { table: String, timeout_days: u32 },
    /// Audit: the record's entity no longer exists
    MissingRemoved { table: String, key: Key, name: String },
    /// Audit: the record outlived the timeout
    AgedRemoved {
        table: String,
        key: Key,
        name: String,
        timeout_days: u32,
    },
    /// The eviction loop stopped after a failed cycle
    LoopHalted { error: String },
    /// The displayed summary of `table` could not be refreshed
    SummaryStale { table: String, error: String },
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::Evicted {
                table,
                timeout_days,
            } => write!(
                f,
                "You were automatically removed from {} because you were not screened within {} days.",
                table, timeout_days
            ),
            Notice::MissingRemoved { table, key, name } => {
                write!(f, "Removing missing user `{}` ({}) from {}.", name, key, table)
            }
            Notice::AgedRemoved {
                table,
                key,
                name,
                timeout_days,
            } => write!(
                f,
                "Removing `{}` ({}) who has been on {} for more than {} days.",
                name, key, table, timeout_days
            ),
            Notice::LoopHalted { error } => write!(
                f,
                "Eviction loop failed: {}. Once resolved, start the loop again.",
                error
            ),
            Notice::SummaryStale { table, error } => {
                write!(f, "Could not refresh the {} list message: {}", table, error)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    Unavailable(String),
}

impl std::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectoryError::Unavailable(msg) => write!(f, "directory unavailable: {}", msg),
        }
    }
}

impl std::error::Error for DirectoryError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The recipient cannot be reached (left, blocked messages, ...)
    Undeliverable(String),
    Unavailable(String),
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyError::Undeliverable(msg) => write!(f, "notice undeliverable: {}", msg),
            NotifyError::Unavailable(msg) => write!(f, "notifier unavailable: {}", msg),
        }
    }
}

impl std::error::Error for NotifyError {}

/// Does a key still correspond to a live entity
pub trait Directory: Send + Sync + 'static {
    fn exists(&self, key: Key) -> CollabFuture<'_, Result<bool, DirectoryError>>;
}

/// Message delivery
pub trait Notifier: Send + Sync + 'static {
    fn notify_entity(&self, key: Key, notice: Notice) -> CollabFuture<'_, Result<(), NotifyError>>;

    fn notify_channel(
        &self,
        channel: u64,
        notice: Notice,
    ) -> CollabFuture<'_, Result<(), NotifyError>>;
}

/// Re-renders the externally displayed summary of a table
pub trait SummaryRefresher: Send + Sync + 'static {
    fn refresh<'a>(&'a self, table: &'a str) -> CollabFuture<'a, Result<(), NotifyError>>;
}

impl<T: Directory> Directory for Arc<T> {
    fn exists(&self, key: Key) -> CollabFuture<'_, Result<bool, DirectoryError>> {
        (**self).exists(key)
    }
}

impl<T: Notifier> Notifier for Arc<T> {
    fn notify_entity(&self, key: Key, notice: Notice) -> CollabFuture<'_, Result<(), NotifyError>> {
        (**self).notify_entity(key, notice)
    }

    fn notify_channel(
        &self,
        channel: u64,
        notice: Notice,
    ) -> CollabFuture<'_, Result<(), NotifyError>> {
        (**self).notify_channel(channel, notice)
    }
}

impl<T: SummaryRefresher> SummaryRefresher for Arc<T> {
    fn refresh<'a>(&'a self, table: &'a str) -> CollabFuture<'a, Result<(), NotifyError>> {
        (**self).refresh(table)
    }
}

/// Directory in which every key is present
#[derive(Debug, Clone, Copy, Default)]
pub struct AllPresent;

impl Directory for AllPresent {
    fn exists(&self, _key: Key) -> CollabFuture<'_, Result<bool, DirectoryError>> {
        Box::pin(async { Ok(true) })
    }
}

/// Directory backed by an explicit, mutable key set
#[derive(Debug, Clone, Default)]
pub struct KnownKeys {
    keys: Arc<Mutex<HashSet<Key>>>,
}

impl KnownKeys {
    pub fn new(keys: impl IntoIterator<Item = Key>) -> Self {
        KnownKeys {
            keys: Arc::new(Mutex::new(keys.into_iter().collect())),
        }
    }

    pub fn insert(&self, key: Key) {
        self.keys.lock().insert(key);
    }

    pub fn remove(&self, key: Key) {
        self.keys.lock().remove(&key);
    }
}

impl Directory for KnownKeys {
    fn exists(&self, key: Key) -> CollabFuture<'_, Result<bool, DirectoryError>> {
        let present = self.keys.lock().contains(&key);
        Box::pin(async move { Ok(present) })
    }
}

/// Writes every notice to the log and reports success
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_entity(&self, key: Key, notice: Notice) -> CollabFuture<'_, Result<(), NotifyError>> {
        info!(key, %notice, "notice to entity");
        Box::pin(async { Ok(()) })
    }

    fn notify_channel(
        &self,
        channel: u64,
        notice: Notice,
    ) -> CollabFuture<'_, Result<(), NotifyError>> {
        info!(channel, %notice, "notice to channel");
        Box::pin(async { Ok(()) })
    }
}

impl SummaryRefresher for LogNotifier {
    fn refresh<'a>(&'a self, table: &'a str) -> CollabFuture<'a, Result<(), NotifyError>> {
        info!(table, "summary refresh requested");
        Box::pin(async { Ok(()) })
    }
}

/// Where a recorded notice was sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Entity(Key),
    Channel(u64),
}

/// Notifier + refresher that records what it was asked to do. Keys listed
/// with `fail_for` get `Undeliverable`; `fail_refresh` makes every refresh
/// fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    inner: Arc<Mutex<Recorded>>,
}

#[derive(Debug, Default)]
struct Recorded {
    sent: Vec<(Recipient, Notice)>,
    refreshed: Vec<String>,
    unreachable: HashSet<Key>,
    fail_refresh: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, key: Key) {
        self.inner.lock().unreachable.insert(key);
    }

    pub fn fail_refresh(&self, fail: bool) {
        self.inner.lock().fail_refresh = fail;
    }

    pub fn sent(&self) -> Vec<(Recipient, Notice)> {
        self.inner.lock().sent.clone()
    }

    pub fn sent_to(&self, recipient: &Recipient) -> Vec<Notice> {
        self.inner
            .lock()
            .sent
            .iter()
            .filter(|(r, _)| r == recipient)
            .map(|(_, n)| n.clone())
            .collect()
    }

    pub fn refreshed(&self) -> Vec<String> {
        self.inner.lock().refreshed.clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_entity(&self, key: Key, notice: Notice) -> CollabFuture<'_, Result<(), NotifyError>> {
        let mut inner = self.inner.lock();
        let result = if inner.unreachable.contains(&key) {
            Err(NotifyError::Undeliverable(format!("{} does not accept messages", key)))
        } else {
            inner.sent.push((Recipient::Entity(key), notice));
            Ok(())
        };
        Box::pin(async move { result })
    }

    fn notify_channel(
        &self,
        channel: u64,
        notice: Notice,
    ) -> CollabFuture<'_, Result<(), NotifyError>> {
        self.inner.lock().sent.push((Recipient::Channel(channel), notice));
        Box::pin(async { Ok(()) })
    }
}

impl SummaryRefresher for RecordingNotifier {
    fn refresh<'a>(&'a self, table: &'a str) -> CollabFuture<'a, Result<(), NotifyError>> {
        let mut inner = self.inner.lock();
        let result = if inner.fail_refresh {
            Err(NotifyError::Unavailable("summary message missing".to_string()))
        } else {
            inner.refreshed.push(table.to_string());
            Ok(())
        };
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_known_keys() {
        let dir = KnownKeys::new([1, 2]);
        assert!(dir.exists(1).await.unwrap());
        dir.remove(1);
        assert!(!dir.exists(1).await.unwrap());
        assert!(AllPresent.exists(999).await.unwrap());
    }

    #[tokio::test]
    async fn test_recording_notifier_failures() {
        let notifier = RecordingNotifier::new();
        notifier.fail_for(7);
        let notice = Notice::Evicted {
            table: "Requests".into(),
            timeout_days: 5,
        };
        assert!(notifier.notify_entity(7, notice.clone()).await.is_err());
        notifier.notify_entity(8, notice.clone()).await.unwrap();
        assert_eq!(notifier.sent(), vec![(Recipient::Entity(8), notice)]);

        notifier.fail_refresh(true);
        assert!(notifier.refresh("Requests").await.is_err());
        assert!(notifier.refreshed().is_empty());
    }

    #[test]
    fn test_notice_text() {
        let notice = Notice::Evicted {
            table: "Requests".into(),
            timeout_days: 5,
        };
        assert!(notice.to_string().contains("within 5 days"));
        let halted = Notice::LoopHalted {
            error: "remote store unavailable".into(),
        };
        assert!(halted.to_string().contains("start the loop again"));
    }
}
