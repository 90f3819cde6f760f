//! In-process mutual exclusion per repository.
//!
//! Every mutating chain (commit, ledger finalize, revert, rollback) runs
//! while holding a [`RepoLease`] for its repository, so two chains against
//! the same working copy never interleave.

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};
use tracing::debug;

#[derive(Debug, Default)]
pub struct RepoLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl RepoLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Block until `repo_id` is free, then hold it until the lease drops.
    pub fn acquire(locks: &Arc<Self>, repo_id: &str) -> Result<RepoLease> {
        let mut held = locks.held.lock().map_err(poisoned)?;
        while held.contains(repo_id) {
            debug!(repo = repo_id, "waiting for repository lock");
            held = locks.released.wait(held).map_err(poisoned)?;
        }
        held.insert(repo_id.to_string());
        Ok(RepoLease {
            locks: Arc::clone(locks),
            repo_id: repo_id.to_string(),
        })
    }

    /// `None` when another lease for `repo_id` is outstanding.
    pub fn try_acquire(locks: &Arc<Self>, repo_id: &str) -> Result<Option<RepoLease>> {
        let mut held = locks.held.lock().map_err(poisoned)?;
        if !held.insert(repo_id.to_string()) {
            return Ok(None);
        }
        Ok(Some(RepoLease {
            locks: Arc::clone(locks),
            repo_id: repo_id.to_string(),
        }))
    }

    pub fn is_held(&self, repo_id: &str) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(repo_id))
            .unwrap_or(false)
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Lock("repository lock registry poisoned".into())
}

/// Exclusive hold on one repository. Released on drop.
#[derive(Debug)]
pub struct RepoLease {
    locks: Arc<RepoLocks>,
    repo_id: String,
}

impl RepoLease {
    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }
}

impl Drop for RepoLease {
    fn drop(&mut self) {
        if let Ok(mut held) = self.locks.held.lock() {
            held.remove(&self.repo_id);
        }
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_lease_is_exclusive_per_repo() {
        let locks = RepoLocks::new();
        let lease = RepoLocks::acquire(&locks, "/repo/a").unwrap();

        assert!(RepoLocks::try_acquire(&locks, "/repo/a").unwrap().is_none());
        assert!(RepoLocks::try_acquire(&locks, "/repo/b").unwrap().is_some());
        assert!(locks.is_held("/repo/a"));

        drop(lease);
        assert!(!locks.is_held("/repo/a"));
        assert!(RepoLocks::try_acquire(&locks, "/repo/a").unwrap().is_some());
    }

    #[test]
    fn test_acquire_waits_for_release() {
        let locks = RepoLocks::new();
        let lease = RepoLocks::acquire(&locks, "repo").unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                let lease = RepoLocks::acquire(&locks, "repo").unwrap();
                tx.send(lease.repo_id().to_string()).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(lease);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "repo");
        waiter.join().unwrap();
    }
}
