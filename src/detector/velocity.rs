use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::types::Transaction;

type AccountHistory = Arc<Mutex<Vec<DateTime<Utc>>>>;

/// Longest window kept; `now - window` must stay inside chrono's range.
pub const MAX_WINDOW_SECS: i64 = 100 * 365 * 24 * 3600;

/// Per-account sliding window of transaction timestamps.
///
/// The account map lock is only held to find or create an account's history;
/// each history has its own lock so unrelated accounts never contend.
pub struct VelocityTracker {
    window: Duration,
    accounts: RwLock<HashMap<String, AccountHistory>>,
}

impl VelocityTracker {
    /// Windows longer than [`MAX_WINDOW_SECS`] are capped.
    pub fn new(window: Duration) -> Self {
        Self {
            window: window.min(Duration::seconds(MAX_WINDOW_SECS)),
            accounts: RwLock::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record `tx` for its account. Entries older than `now - window` are
    /// dropped first, measured against the wall clock rather than the
    /// transaction's own timestamp.
    pub fn track(&self, tx: &Transaction) {
        let history = self.history_for(&tx.account_id);
        let mut timestamps = history.lock().unwrap_or_else(PoisonError::into_inner);

        let cutoff = Utc::now() - self.window;
        timestamps.retain(|t| *t > cutoff);
        timestamps.push(tx.timestamp.with_timezone(&Utc));
    }

    /// Number of recorded timestamps still inside the window. Re-filtered on
    /// every call, so a count never includes entries that expired since the
    /// last `track`.
    pub fn count(&self, account_id: &str) -> usize {
        let history = {
            let accounts = self.accounts.read().unwrap_or_else(PoisonError::into_inner);
            match accounts.get(account_id) {
                Some(history) => Arc::clone(history),
                None => return 0,
            }
        };

        let timestamps = history.lock().unwrap_or_else(PoisonError::into_inner);
        let cutoff = Utc::now() - self.window;
        timestamps.iter().filter(|t| **t > cutoff).count()
    }

    pub fn tracked_accounts(&self) -> usize {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn history_for(&self, account_id: &str) -> AccountHistory {
        {
            let accounts = self.accounts.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(history) = accounts.get(account_id) {
                return Arc::clone(history);
            }
        }

        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(accounts.entry(account_id.to_string()).or_default())
    }
}
