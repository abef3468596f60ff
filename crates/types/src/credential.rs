//! Test account credentials.

use crate::AccountId;
use std::fmt;

/// One pre-provisioned test account.
///
/// Loaded once at startup and never mutated afterwards. Cloning is cheap
/// enough for the handful of clones a session makes.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Server-side account id, used in `/api/v1/accounts/{id}/...` paths.
    pub account_id: AccountId,

    /// OAuth bearer token for this account.
    pub access_token: String,

    /// Local username, when the credential file carries it.
    pub username: Option<String>,

    /// Login email, when the credential file carries it.
    pub email: Option<String>,
}

impl Credential {
    /// Create a credential from an account id and token.
    pub fn new(account_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            account_id: AccountId::new(account_id),
            access_token: access_token.into(),
            username: None,
            email: None,
        }
    }

    /// Attach a username.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// Deterministic fixture credential: account `"{n}"`, token `"token-{n}"`,
    /// username `testuserNNNN`.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn numbered(n: usize) -> Self {
        Self::new(n.to_string(), format!("token-{}", n)).with_username(format!("testuser{:04}", n))
    }
}

// Tokens must never end up in logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("account_id", &self.account_id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
