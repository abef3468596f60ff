//! Credential pool for simulated users.
//!
//! The pool is loaded once from the CSV written by the server-side
//! provisioning script and shared read-only by every session. Handing out
//! credentials is the job of [`UserAssigner`].

mod assigner;

pub use assigner::{AssignError, Assignment, UserAssigner};

use fediload_types::{AccountId, Credential};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Column holding the server-side account id.
pub const ACCOUNT_ID_COLUMN: &str = "account_id";

/// Column holding the OAuth bearer token.
pub const ACCESS_TOKEN_COLUMN: &str = "access_token";

const USERNAME_COLUMN: &str = "username";
const EMAIL_COLUMN: &str = "email";

/// Ordered, immutable sequence of test account credentials.
#[derive(Debug, Clone, Default)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
}

impl CredentialPool {
    /// Create a pool from already-built credentials, preserving order.
    ///
    /// An empty pool is representable here; [`UserAssigner::next`] reports it
    /// as an error instead of dividing by zero.
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self { credentials }
    }

    /// Load credentials from a CSV file.
    ///
    /// The header row must name `account_id` and `access_token`. Other columns
    /// are ignored except `username` and `email`, which are kept when present.
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self, AccountPoolError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| AccountPoolError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let pool = Self::from_reader(file)?;
        info!(
            path = %path.display(),
            accounts = pool.len(),
            "Loaded credential pool"
        );
        Ok(pool)
    }

    /// Parse credentials from any CSV source.
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self, AccountPoolError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let column = |name: &'static str| headers.iter().position(|h| h == name);
        let account_idx = column(ACCOUNT_ID_COLUMN).ok_or(AccountPoolError::MissingColumn {
            column: ACCOUNT_ID_COLUMN,
        })?;
        let token_idx = column(ACCESS_TOKEN_COLUMN).ok_or(AccountPoolError::MissingColumn {
            column: ACCESS_TOKEN_COLUMN,
        })?;
        let username_idx = column(USERNAME_COLUMN);
        let email_idx = column(EMAIL_COLUMN);

        let mut credentials = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record?;
            // Row numbers are 1-based and count the header as row 1.
            let row = i + 2;

            let required = |idx: usize, column: &'static str| {
                record
                    .get(idx)
                    .filter(|value| !value.is_empty())
                    .ok_or(AccountPoolError::EmptyField { row, column })
            };
            let optional = |idx: Option<usize>| {
                idx.and_then(|idx| record.get(idx))
                    .filter(|value| !value.is_empty())
                    .map(str::to_owned)
            };

            let account_id = required(account_idx, ACCOUNT_ID_COLUMN)?;
            let access_token = required(token_idx, ACCESS_TOKEN_COLUMN)?;

            credentials.push(Credential {
                account_id: AccountId::new(account_id),
                access_token: access_token.to_owned(),
                username: optional(username_idx),
                email: optional(email_idx),
            });
        }

        if credentials.is_empty() {
            return Err(AccountPoolError::Empty);
        }

        Ok(Self { credentials })
    }

    /// Credential at a position, if in range.
    pub fn get(&self, index: usize) -> Option<&Credential> {
        self.credentials.get(index)
    }

    /// All credentials in load order.
    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    /// Number of accounts in the pool.
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Check if the pool has no accounts.
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Every account id in the pool except `own`, in pool order.
    ///
    /// This is the list of accounts a session may follow.
    pub fn peers_of(&self, own: &AccountId) -> Vec<AccountId> {
        self.credentials
            .iter()
            .map(|c| &c.account_id)
            .filter(|id| *id != own)
            .cloned()
            .collect()
    }

    /// Account ids that appear more than once, in first-seen order.
    ///
    /// Duplicates are legal (the provisioning script can be re-run into the
    /// same file) but they make two sessions act as the same account.
    pub fn duplicate_account_ids(&self) -> Vec<AccountId> {
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        let mut duplicates = Vec::new();

        for credential in &self.credentials {
            let id = &credential.account_id;
            if !seen.insert(id) && reported.insert(id) {
                duplicates.push(id.clone());
            }
        }

        duplicates
    }
}

/// Errors that can occur while loading the credential pool.
#[derive(Debug, thiserror::Error)]
pub enum AccountPoolError {
    #[error("Could not read credential file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed credential CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Credential CSV has no `{column}` column")]
    MissingColumn { column: &'static str },

    #[error("Credential CSV row {row} has an empty `{column}` field")]
    EmptyField { row: usize, column: &'static str },

    #[error("Credential CSV contains no accounts")]
    Empty,
}
