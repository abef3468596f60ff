//! Pre-flight checks for a credential file.

use crate::accounts::CredentialPool;
use crate::client::MastodonClient;
use fediload_types::AccountId;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

/// Concurrent `verify_credentials` calls.
const VERIFY_CONCURRENCY: usize = 8;

/// Findings about a credential pool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckReport {
    /// Rows in the pool.
    pub accounts: usize,

    /// Account ids that appear more than once.
    pub duplicates: Vec<AccountId>,

    /// Accounts verified, if the server was asked.
    pub verified: Option<usize>,

    /// Accounts whose token the server rejected.
    pub rejected: Vec<AccountId>,

    /// Accounts whose token belongs to a different account id, with the id
    /// the server reported.
    pub mismatched: Vec<(AccountId, String)>,

    /// Accounts that could not be checked because the request failed.
    pub unreachable: Vec<AccountId>,
}

impl CheckReport {
    /// No duplicates and nothing the server objected to.
    pub fn is_clean(&self) -> bool {
        self.duplicates.is_empty()
            && self.rejected.is_empty()
            && self.mismatched.is_empty()
            && self.unreachable.is_empty()
    }

    pub fn print(&self) {
        println!("Accounts:     {}", self.accounts);
        println!("Duplicates:   {}", self.duplicates.len());
        for id in &self.duplicates {
            println!("  duplicate account_id {}", id);
        }

        let Some(verified) = self.verified else {
            return;
        };
        println!("Verified:     {}", verified);
        println!("Rejected:     {}", self.rejected.len());
        for id in &self.rejected {
            println!("  account {} token rejected", id);
        }
        for (id, actual) in &self.mismatched {
            println!("  account {} token belongs to account {}", id, actual);
        }
        for id in &self.unreachable {
            println!("  account {} could not be checked", id);
        }
    }
}

/// Inspect a pool locally and, with a client, ask the server about each token.
pub async fn check_pool(pool: &CredentialPool, client: Option<&MastodonClient>) -> CheckReport {
    let mut report = CheckReport {
        accounts: pool.len(),
        duplicates: pool.duplicate_account_ids(),
        ..Default::default()
    };
    if !report.duplicates.is_empty() {
        warn!(count = report.duplicates.len(), "Duplicate account ids in pool");
    }

    let Some(client) = client else {
        return report;
    };

    let results: Vec<_> = stream::iter(pool.credentials())
        .map(|credential| async move {
            (credential, client.verify_credentials(credential).await)
        })
        .buffered(VERIFY_CONCURRENCY)
        .collect()
        .await;

    let mut verified = 0;
    for (credential, result) in results {
        let id = credential.account_id.clone();
        match result {
            Ok(Some(account)) if account.id == id.as_str() => verified += 1,
            Ok(Some(account)) => report.mismatched.push((id, account.id)),
            Ok(None) => report.rejected.push(id),
            Err(e) => {
                warn!(account_id = %id, error = %e, "Could not verify credential");
                report.unreachable.push(id);
            }
        }
    }
    report.verified = Some(verified);

    info!(
        accounts = report.accounts,
        verified,
        rejected = report.rejected.len(),
        "Credential check finished"
    );
    report
}
