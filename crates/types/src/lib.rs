//! Core types shared across the fediload crates.
//!
//! Identifiers handed out by the server under test are opaque strings. They are
//! wrapped in newtypes so a post id can never be passed where an account id is
//! expected.

mod credential;
mod identifiers;

pub use credential::Credential;
pub use identifiers::{AccountId, StatusId};
