//! Call-list workflows.
//!
//! Each workflow is a check-then-mutate sequence across several tables. The
//! whole sequence is submitted to the store's worker as one unit, so another
//! workflow cannot slip in between the check and the write.

use crate::collab::{LogNotifier, SummaryRefresher};
use crate::confirm::{ConfirmationGate, Outcome, Responder, DEFAULT_CONFIRMATION_TIMEOUT};
use crate::eviction::clock::{sheet_time, Clock, SystemClock};
use crate::record;
use crate::sheets::{Key, Record, SheetTransport};
use crate::store::{StoreError, TableStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Table names
pub mod tables {
    pub const REQUESTS: &str = "Requests";
    pub const NEW_CALLERS: &str = "New Callers";
    pub const REPEAT_CALLERS: &str = "Repeat Callers";
    pub const CALLER_HISTORY: &str = "Caller History";
    pub const DENIED_REQUESTS: &str = "Denied Requests";

    /// Lists a user can only be on one of at a time
    pub const ACTIVE: [&str; 3] = [REQUESTS, NEW_CALLERS, REPEAT_CALLERS];
}

const CALLER_LISTS: [&str; 2] = [tables::NEW_CALLERS, tables::REPEAT_CALLERS];

/// The person a workflow acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: Key,
    pub name: String,
}

impl Member {
    pub fn new(id: Key, name: impl Into<String>) -> Self {
        Member {
            id,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RosterError {
    Store(StoreError),
    /// The member is already on `table`
    AlreadyListed { table: &'static str },
    /// The member is not on `table`
    NotListed { table: &'static str },
    /// On neither caller list
    NotACaller,
    /// Approval of someone who never asked, without a confirmation
    NotRequested,
    /// A required confirmation did not come back yes
    Unconfirmed(Outcome),
}

impl std::fmt::Display for RosterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RosterError::Store(e) => write!(f, "{}", e),
            RosterError::AlreadyListed { table } => write!(f, "already on the {} list", table),
            RosterError::NotListed { table } => write!(f, "not on the {} list", table),
            RosterError::NotACaller => write!(f, "not on either callers list"),
            RosterError::NotRequested => write!(f, "not on the requests list"),
            RosterError::Unconfirmed(outcome) => write!(f, "not confirmed: {:?}", outcome),
        }
    }
}

impl std::error::Error for RosterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RosterError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for RosterError {
    fn from(e: StoreError) -> Self {
        RosterError::Store(e)
    }
}

type RosterResult<T> = Result<T, RosterError>;

/// Call-list workflows over a shared [`TableStore`]
pub struct Roster<T: SheetTransport> {
    store: TableStore<T>,
    clock: Arc<dyn Clock>,
    summary: Arc<dyn SummaryRefresher>,
    confirmation_timeout: Duration,
}

impl<T: SheetTransport> Clone for Roster<T> {
    fn clone(&self) -> Self {
        Roster {
            store: self.store.clone(),
            clock: self.clock.clone(),
            summary: self.summary.clone(),
            confirmation_timeout: self.confirmation_timeout,
        }
    }
}

impl<T: SheetTransport> Roster<T> {
    pub fn new(store: TableStore<T>) -> Self {
        Roster {
            store,
            clock: Arc::new(SystemClock),
            summary: Arc::new(LogNotifier),
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_summary(mut self, summary: impl SummaryRefresher) -> Self {
        self.summary = Arc::new(summary);
        self
    }

    pub fn store(&self) -> &TableStore<T> {
        &self.store
    }

    /// A fresh gate for approving someone who never requested, bounded by
    /// the roster's confirmation timeout
    pub fn confirmation(&self) -> (ConfirmationGate, Responder) {
        ConfirmationGate::new(self.confirmation_timeout)
    }

    /// Put a member on the requests list
    pub async fn request_screening(&self, member: &Member) -> RosterResult<()> {
        let row = record![member.id, member.name.as_str(), self.now()];
        let key = member.id;
        self.run(move |s| async move {
            if let Some(table) = listed_on(&s, key, &tables::ACTIVE).await? {
                return Err(RosterError::AlreadyListed { table });
            }
            s.append(tables::REQUESTS, row).await?;
            Ok(())
        })
        .await?;
        info!(key, "added to requests");
        self.refresh(&[tables::REQUESTS]).await;
        Ok(())
    }

    /// Move a member from requests to a callers list. Returns the list they
    /// landed on. Members who never requested need a confirmation that comes
    /// back yes.
    pub async fn approve(
        &self,
        member: &Member,
        european: bool,
        confirmation: Option<ConfirmationGate>,
    ) -> RosterResult<&'static str> {
        let key = member.id;
        let requested = self
            .run(move |s| async move {
                if let Some(table) = listed_on(&s, key, &CALLER_LISTS).await? {
                    return Err(RosterError::AlreadyListed { table });
                }
                Ok(s.find(tables::REQUESTS, key).await?.is_some())
            })
            .await?;

        let mut confirmed = false;
        if !requested {
            let Some(gate) = confirmation else {
                return Err(RosterError::NotRequested);
            };
            // Waited on outside the worker so a slow answer blocks nobody.
            let outcome = gate.wait().await;
            if !outcome.said_yes() {
                return Err(RosterError::Unconfirmed(outcome));
            }
            confirmed = true;
        }

        // Anything may have changed while the check's answer was in flight.
        let row = record![member.id, member.name.as_str(), european, self.now()];
        let (list, was_requested) = self
            .run(move |s| async move {
                if let Some(table) = listed_on(&s, key, &CALLER_LISTS).await? {
                    return Err(RosterError::AlreadyListed { table });
                }
                let on_requests = s.find(tables::REQUESTS, key).await?.is_some();
                if !on_requests && !confirmed {
                    return Err(RosterError::NotRequested);
                }
                let list = callers_list_for(&s, key).await?;
                s.append(list, row).await?;
                if on_requests {
                    s.delete(tables::REQUESTS, &[key]).await?;
                }
                Ok((list, on_requests))
            })
            .await?;
        info!(key, list, "approved");
        if was_requested {
            self.refresh(&[tables::REQUESTS, list]).await;
        } else {
            self.refresh(&[list]).await;
        }
        Ok(list)
    }

    /// Record a rejection and drop the request
    pub async fn deny(&self, member: &Member, reason: &str) -> RosterResult<()> {
        let row = record![member.id, member.name.as_str(), reason, self.now()];
        let key = member.id;
        self.run(move |s| async move {
            require_on(&s, tables::REQUESTS, key).await?;
            s.append(tables::DENIED_REQUESTS, row).await?;
            s.delete(tables::REQUESTS, &[key]).await?;
            Ok(())
        })
        .await?;
        info!(key, "denied");
        self.refresh(&[tables::REQUESTS]).await;
        Ok(())
    }

    pub async fn remove_request(&self, member: &Member) -> RosterResult<()> {
        let key = member.id;
        self.run(move |s| async move {
            require_on(&s, tables::REQUESTS, key).await?;
            s.delete(tables::REQUESTS, &[key]).await?;
            Ok(())
        })
        .await?;
        self.refresh(&[tables::REQUESTS]).await;
        Ok(())
    }

    /// Put a member straight on a callers list, skipping screening
    pub async fn add_caller(&self, member: &Member, european: bool) -> RosterResult<&'static str> {
        let row = record![member.id, member.name.as_str(), european, self.now()];
        let key = member.id;
        let list = self
            .run(move |s| async move {
                if let Some(table) = listed_on(&s, key, &tables::ACTIVE).await? {
                    return Err(RosterError::AlreadyListed { table });
                }
                let list = callers_list_for(&s, key).await?;
                s.append(list, row).await?;
                Ok(list)
            })
            .await?;
        self.refresh(&[list]).await;
        Ok(list)
    }

    /// Take a member off whichever callers list they are on
    pub async fn remove_caller(&self, member: &Member) -> RosterResult<&'static str> {
        let key = member.id;
        let list = self
            .run(move |s| async move {
                for list in CALLER_LISTS {
                    if s.find(list, key).await?.is_some() {
                        s.delete(list, &[key]).await?;
                        return Ok(list);
                    }
                }
                Err(RosterError::NotACaller)
            })
            .await?;
        self.refresh(&[list]).await;
        Ok(list)
    }

    /// The member made it on air: log them in the history and clear them
    /// from both callers lists
    pub async fn record_connected(&self, member: &Member) -> RosterResult<()> {
        let row = record![member.id, member.name.as_str(), self.now()];
        let key = member.id;
        self.run(move |s| async move {
            s.append(tables::CALLER_HISTORY, row).await?;
            s.delete(tables::NEW_CALLERS, &[key]).await?;
            s.delete(tables::REPEAT_CALLERS, &[key]).await?;
            Ok(())
        })
        .await?;
        info!(key, "connected");
        self.refresh(&[tables::NEW_CALLERS, tables::REPEAT_CALLERS]).await;
        Ok(())
    }

    /// Add a member to the caller history unless already there
    pub async fn chronicle(&self, member: &Member) -> RosterResult<()> {
        let row = record![member.id, member.name.as_str(), self.now()];
        let key = member.id;
        self.run(move |s| async move {
            if s.find(tables::CALLER_HISTORY, key).await?.is_some() {
                return Err(RosterError::AlreadyListed {
                    table: tables::CALLER_HISTORY,
                });
            }
            s.append(tables::CALLER_HISTORY, row).await?;
            Ok(())
        })
        .await
    }

    pub async fn list(&self, table: &str) -> RosterResult<Vec<Record>> {
        Ok(self.store.get_all(table).await?)
    }

    fn now(&self) -> String {
        sheet_time(self.clock.as_ref())
    }

    /// Run `f` as one serialized unit, keeping roster errors intact
    async fn run<F, Fut, R>(&self, f: F) -> RosterResult<R>
    where
        F: FnOnce(TableStore<T>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = RosterResult<R>> + Send + 'static,
        R: Send + 'static,
    {
        self.store
            .serialized(move |s| async move { Ok(f(s).await) })
            .await?
    }

    async fn refresh(&self, tables: &[&str]) {
        for table in tables {
            if let Err(e) = self.summary.refresh(table).await {
                warn!(table, error = %e, "unable to refresh list summary");
            }
        }
    }
}

async fn listed_on<T: SheetTransport>(
    store: &TableStore<T>,
    key: Key,
    lists: &[&'static str],
) -> Result<Option<&'static str>, StoreError> {
    for &list in lists {
        if store.find(list, key).await?.is_some() {
            return Ok(Some(list));
        }
    }
    Ok(None)
}

async fn require_on<T: SheetTransport>(
    store: &TableStore<T>,
    table: &'static str,
    key: Key,
) -> RosterResult<()> {
    match store.find(table, key).await? {
        Some(_) => Ok(()),
        None => Err(RosterError::NotListed { table }),
    }
}

/// Returning callers go to Repeat Callers, first-timers to New Callers
async fn callers_list_for<T: SheetTransport>(
    store: &TableStore<T>,
    key: Key,
) -> Result<&'static str, StoreError> {
    if store.find(tables::CALLER_HISTORY, key).await?.is_some() {
        Ok(tables::REPEAT_CALLERS)
    } else {
        Ok(tables::NEW_CALLERS)
    }
}
