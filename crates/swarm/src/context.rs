//! Shared state handed to every session.

use crate::accounts::{CredentialPool, UserAssigner};
use std::sync::Arc;
use tracing::info;

/// Everything sessions share: the read-only pool and the assignment cursor.
///
/// Built once per process and passed to each session at start, so tests can
/// create as many independent contexts as they like.
#[derive(Debug, Clone)]
pub struct SwarmContext {
    pool: Arc<CredentialPool>,
    assigner: Arc<UserAssigner>,
}

impl SwarmContext {
    /// Create a context with the cursor at zero.
    pub fn new(pool: CredentialPool) -> Self {
        let pool = Arc::new(pool);
        let assigner = Arc::new(UserAssigner::new(Arc::clone(&pool)));
        Self { pool, assigner }
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    pub fn assigner(&self) -> &UserAssigner {
        &self.assigner
    }

    /// Test-stop hook: rewind the cursor so the next run starts at `pool[0]`.
    pub fn on_test_stop(&self) {
        let assigned = self.assigner.cursor();
        self.assigner.reset();
        info!(assigned, "Test stopped, assignment cursor reset");
    }
}
