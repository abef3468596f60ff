//! Round-robin credential assignment.

use super::CredentialPool;
use fediload_types::Credential;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// A credential handed to a session, together with the cursor value that
/// produced it.
#[derive(Debug, Clone)]
pub struct Assignment {
    /// Cursor value consumed by this assignment (0-based, never repeats
    /// between resets).
    pub cursor: u64,

    /// The assigned credential, `pool[cursor mod N]`.
    pub credential: Credential,
}

/// Shared cursor into the credential pool.
///
/// Every session start calls [`next`](Self::next) exactly once. Concurrent
/// callers are serialized on a single lock whose critical section is the
/// read-modify-write of one integer, so each call consumes a distinct cursor
/// value and credentials come out in pool order, wrapping around once the pool
/// is exhausted. [`reset`](Self::reset) runs at test stop so the next run
/// starts again from `pool[0]`.
#[derive(Debug)]
pub struct UserAssigner {
    pool: Arc<CredentialPool>,
    cursor: Mutex<u64>,
}

impl UserAssigner {
    /// Create an assigner over a shared pool with the cursor at zero.
    pub fn new(pool: Arc<CredentialPool>) -> Self {
        Self {
            pool,
            cursor: Mutex::new(0),
        }
    }

    /// Hand out the next credential.
    pub fn next(&self) -> Result<Credential, AssignError> {
        self.next_assignment().map(|a| a.credential)
    }

    /// Hand out the next credential along with the cursor value it consumed.
    pub fn next_assignment(&self) -> Result<Assignment, AssignError> {
        let len = self.pool.len() as u64;
        if len == 0 {
            return Err(AssignError::EmptyPool);
        }

        let cursor = {
            let mut guard = self.cursor.lock();
            let cursor = *guard;
            *guard += 1;
            cursor
        };

        // The pool is immutable, so the lookup can happen outside the lock.
        let credential = self.pool.credentials()[(cursor % len) as usize].clone();
        debug!(cursor, account_id = %credential.account_id, "Assigned credential");

        Ok(Assignment { cursor, credential })
    }

    /// Rewind the cursor to zero.
    pub fn reset(&self) {
        let mut guard = self.cursor.lock();
        debug!(previous = *guard, "Resetting assignment cursor");
        *guard = 0;
    }

    /// Current cursor value, i.e. the number of assignments since the last
    /// reset.
    pub fn cursor(&self) -> u64 {
        *self.cursor.lock()
    }

    /// The pool this assigner hands out from.
    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }
}

/// Errors from credential assignment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssignError {
    #[error("Cannot assign a credential from an empty pool")]
    EmptyPool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn assigner_with(n: usize) -> UserAssigner {
        let pool = CredentialPool::new((1..=n).map(Credential::numbered).collect());
        UserAssigner::new(Arc::new(pool))
    }

    fn ids(creds: &[Credential]) -> Vec<&str> {
        creds.iter().map(|c| c.account_id.as_str()).collect()
    }

    #[test]
    fn test_one_pass_returns_pool_order() {
        let assigner = assigner_with(5);
        let handed: Vec<_> = (0..5).map(|_| assigner.next().unwrap()).collect();
        assert_eq!(handed.as_slice(), assigner.pool().credentials());
    }

    #[test]
    fn test_k_passes_cycle_in_order() {
        let n = 4;
        let k = 3;
        let assigner = assigner_with(n);
        let handed: Vec<_> = (0..n * k).map(|_| assigner.next().unwrap()).collect();

        for (i, cred) in handed.iter().enumerate() {
            assert_eq!(cred, &assigner.pool().credentials()[i % n]);
        }
        for expected in assigner.pool().credentials() {
            assert_eq!(handed.iter().filter(|c| *c == expected).count(), k);
        }
    }

    #[test]
    fn test_two_account_wraparound() {
        let pool = CredentialPool::new(vec![Credential::new("1", "a"), Credential::new("2", "b")]);
        let assigner = UserAssigner::new(Arc::new(pool));

        let handed: Vec<_> = (0..3).map(|_| assigner.next().unwrap()).collect();
        assert_eq!(ids(&handed), vec!["1", "2", "1"]);
        assert_eq!(handed[0].access_token, "a");
        assert_eq!(handed[1].access_token, "b");
    }

    #[test]
    fn test_reset_restarts_from_first() {
        let assigner = assigner_with(3);
        for _ in 0..7 {
            assigner.next().unwrap();
        }
        assert_eq!(assigner.cursor(), 7);

        assigner.reset();
        assert_eq!(assigner.cursor(), 0);
        assert_eq!(assigner.next().unwrap().account_id.as_str(), "1");
    }

    #[test]
    fn test_empty_pool_is_an_error() {
        let assigner = UserAssigner::new(Arc::new(CredentialPool::default()));
        assert_eq!(assigner.next().unwrap_err(), AssignError::EmptyPool);
        // Cursor is not consumed by a failed assignment.
        assert_eq!(assigner.cursor(), 0);
    }

    #[test]
    fn test_concurrent_callers_consume_distinct_cursors() {
        let threads = 8;
        let per_thread = 250;
        let assigner = Arc::new(assigner_with(7));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let assigner = Arc::clone(&assigner);
                std::thread::spawn(move || {
                    (0..per_thread)
                        .map(|_| assigner.next_assignment().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut cursors = HashSet::new();
        for handle in handles {
            for assignment in handle.join().unwrap() {
                let expected = &assigner.pool().credentials()[(assignment.cursor % 7) as usize];
                assert_eq!(&assignment.credential, expected);
                assert!(cursors.insert(assignment.cursor), "cursor reused");
            }
        }

        let total = (threads * per_thread) as u64;
        assert_eq!(cursors, (0..total).collect::<HashSet<_>>());
        assert_eq!(assigner.cursor(), total);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_session_starts_on_runtime() {
        let assigner = Arc::new(assigner_with(3));
        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let assigner = Arc::clone(&assigner);
                tokio::spawn(async move { assigner.next_assignment().unwrap().cursor })
            })
            .collect();

        let mut cursors = Vec::new();
        for task in tasks {
            cursors.push(task.await.unwrap());
        }
        cursors.sort_unstable();
        assert_eq!(cursors, (0..64).collect::<Vec<_>>());
    }
}
