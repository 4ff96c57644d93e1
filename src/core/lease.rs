//! In-memory per-case exclusive lease.
//!
//! A single-winner token whose `Drop` impl releases it on every exit path
//! (success, error, or unwind) — the same shape as a file-based lockfile
//! guard, but deliberately kept in memory only: a lease that outlived a
//! process crash would be wrong, since crash recovery depends on the lease
//! table being empty on restart so the reconciliation pass can find a stale
//! `CASE_STATUS|PROCESSING` line with no live job behind it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct LeaseTable {
    held: Arc<Mutex<HashSet<String>>>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to acquire the lease for `case_id`. Returns `None` if a
    /// lease is already held (caller maps this to `AlreadyRunning`/409).
    pub fn acquire(&self, case_id: &str) -> Option<CaseLeaseGuard> {
        let mut held = self.held.lock().expect("lease table mutex poisoned");
        if held.contains(case_id) {
            return None;
        }
        held.insert(case_id.to_string());
        Some(CaseLeaseGuard {
            table: self.held.clone(),
            case_id: case_id.to_string(),
        })
    }

    pub fn is_held(&self, case_id: &str) -> bool {
        self.held
            .lock()
            .expect("lease table mutex poisoned")
            .contains(case_id)
    }
}

/// Scoped guard releasing the lease on drop, regardless of how the holding
/// task exits (returns normally, returns an error, or panics).
pub struct CaseLeaseGuard {
    table: Arc<Mutex<HashSet<String>>>,
    case_id: String,
}

impl Drop for CaseLeaseGuard {
    fn drop(&mut self) {
        if let Ok(mut held) = self.table.lock() {
            held.remove(&self.case_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_first_is_held() {
        let table = LeaseTable::new();
        let _first = table.acquire("alpha").expect("first acquire succeeds");
        assert!(table.acquire("alpha").is_none());
    }

    #[test]
    fn lease_releases_on_drop() {
        let table = LeaseTable::new();
        {
            let _guard = table.acquire("alpha").unwrap();
            assert!(table.is_held("alpha"));
        }
        assert!(!table.is_held("alpha"));
        assert!(table.acquire("alpha").is_some());
    }

    #[test]
    fn distinct_cases_do_not_contend() {
        let table = LeaseTable::new();
        let _a = table.acquire("alpha").unwrap();
        assert!(table.acquire("beta").is_some());
    }

    #[test]
    fn lease_releases_even_when_holder_panics() {
        let table = LeaseTable::new();
        let table_clone = table.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = table_clone.acquire("alpha").unwrap();
            panic!("simulated worker panic mid-job");
        });
        assert!(result.is_err());
        assert!(!table.is_held("alpha"));
    }
}
