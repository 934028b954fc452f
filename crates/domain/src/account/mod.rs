//! Account aggregate and related types.

mod aggregate;
mod events;
mod profile;
mod service;

pub use aggregate::{Account, AccountData, NewAccount};
pub use events::{AccountActivated, AccountPasswordChanged, AccountProfileUpdated, AccountRegistered};
pub use profile::{Profile, Role};
pub use service::AccountService;

use common::AccountId;
use thiserror::Error;

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
    /// A required field is empty.
    #[error("Account {field} must not be blank")]
    BlankField { field: &'static str },

    #[error("Invalid email address: {email}")]
    InvalidEmail { email: String },

    #[error("Account {account_id} is already active")]
    AlreadyActive { account_id: AccountId },

    #[error("Activation code does not match")]
    InvalidActivationCode,

    #[error("Account {account_id} was already announced")]
    AlreadyAnnounced { account_id: AccountId },
}
