//! Account domain events.
//!
//! No event carries the password hash, and the activation code never
//! leaves the process in a serialized payload.

use chrono::{DateTime, Utc};
use common::AccountId;
use serde::{Deserialize, Serialize};

use super::{Profile, Role};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRegistered {
    pub account_id: AccountId,
    pub username: String,
    pub email: String,
    pub role: Role,

    /// Code the holder must present to activate; None when created active.
    /// Only in-process handlers see it.
    #[serde(default, skip_serializing)]
    pub activation_code: Option<String>,

    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountActivated {
    pub account_id: AccountId,
    pub activated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountPasswordChanged {
    pub account_id: AccountId,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountProfileUpdated {
    pub account_id: AccountId,
    pub old: Profile,
    pub new: Profile,
    pub updated_at: DateTime<Utc>,
}

crate::domain_event!(AccountRegistered, "Account", id = account_id, at = registered_at);
crate::domain_event!(AccountActivated, "Account", id = account_id, at = activated_at);
crate::domain_event!(AccountPasswordChanged, "Account", id = account_id, at = changed_at);
crate::domain_event!(AccountProfileUpdated, "Account", id = account_id, at = updated_at);
