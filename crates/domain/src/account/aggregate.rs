//! Account aggregate implementation.

use chrono::{DateTime, Utc};
use common::AccountId;
use serde::{Deserialize, Serialize};
use storage::{AggregateKey, WriteOp};

use crate::aggregate::{
    AggregateRoot, EventBuffer, TrackedAggregate, impl_has_domain_events, key_of, update_op,
};

use super::{
    AccountError, Profile, Role,
    events::{AccountActivated, AccountPasswordChanged, AccountProfileUpdated, AccountRegistered},
};

/// Persisted state of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountData {
    username: String,
    email: String,

    /// Opaque hash produced outside this crate.
    password_hash: String,

    role: Role,
    activation_code: Option<String>,
    enabled: bool,

    #[serde(default)]
    profile: Profile,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    #[serde(default)]
    announced: bool,
}

fn required(field: &'static str, value: String) -> Result<String, AccountError> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(AccountError::BlankField { field });
    }
    Ok(value)
}

/// An account that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewAccount {
    data: AccountData,
}

impl NewAccount {
    /// Registers a customer account.
    ///
    /// With an activation code the account starts disabled until
    /// [`Account::activate`] is called with the same code.
    pub fn register(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        activation_code: Option<String>,
    ) -> Result<Self, AccountError> {
        let username = required("username", username.into())?;
        let email = required("email", email.into())?;
        if !email.contains('@') {
            return Err(AccountError::InvalidEmail { email });
        }
        let password_hash = required("password hash", password_hash.into())?;
        let activation_code = activation_code.filter(|code| !code.trim().is_empty());

        let now = Utc::now();
        Ok(Self {
            data: AccountData {
                username,
                email,
                password_hash,
                role: Role::Customer,
                enabled: activation_code.is_none(),
                activation_code,
                profile: Profile::default(),
                created_at: now,
                updated_at: now,
                announced: false,
            },
        })
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.data.role = role;
        self
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.data.profile = profile;
        self
    }

    pub fn username(&self) -> &str {
        &self.data.username
    }

    pub fn data(&self) -> &AccountData {
        &self.data
    }

    pub fn materialize(self, id: AccountId) -> Account {
        Account {
            id,
            data: self.data,
            events: EventBuffer::new(),
        }
    }
}

/// Account aggregate root.
#[derive(Debug, Clone)]
pub struct Account {
    id: AccountId,
    data: AccountData,
    events: EventBuffer,
}

impl_has_domain_events!(Account);

impl TrackedAggregate for Account {
    fn key(&self) -> AggregateKey {
        key_of(self)
    }

    fn write_op(&self) -> Result<WriteOp, serde_json::Error> {
        update_op(self)
    }
}

impl AggregateRoot for Account {
    type Id = AccountId;
    type Data = AccountData;

    const KIND: &'static str = "Account";

    fn id(&self) -> AccountId {
        self.id
    }

    fn data(&self) -> &AccountData {
        &self.data
    }

    fn restore(id: AccountId, data: AccountData) -> Self {
        Self {
            id,
            data,
            events: EventBuffer::new(),
        }
    }
}

// Query methods
impl Account {
    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.data.username
    }

    pub fn email(&self) -> &str {
        &self.data.email
    }

    pub fn password_hash(&self) -> &str {
        &self.data.password_hash
    }

    pub fn role(&self) -> Role {
        self.data.role
    }

    pub fn is_enabled(&self) -> bool {
        self.data.enabled
    }

    pub fn profile(&self) -> &Profile {
        &self.data.profile
    }
}

// Transitions
impl Account {
    /// Records `AccountRegistered`. Call once, after the account is persisted.
    pub fn raise_registered_event(&mut self) -> Result<(), AccountError> {
        if self.data.announced {
            return Err(AccountError::AlreadyAnnounced { account_id: self.id });
        }

        self.data.announced = true;
        self.events.record(AccountRegistered {
            account_id: self.id,
            username: self.data.username.clone(),
            email: self.data.email.clone(),
            role: self.data.role,
            activation_code: self.data.activation_code.clone(),
            registered_at: self.data.created_at,
        });
        Ok(())
    }

    /// Enables the account if `code` matches the issued activation code.
    pub fn activate(&mut self, code: &str) -> Result<(), AccountError> {
        if self.data.enabled {
            return Err(AccountError::AlreadyActive { account_id: self.id });
        }

        if self.data.activation_code.as_deref() != Some(code) {
            return Err(AccountError::InvalidActivationCode);
        }

        self.data.enabled = true;
        self.data.activation_code = None;
        let activated_at = self.touch();
        self.events.record(AccountActivated {
            account_id: self.id,
            activated_at,
        });
        Ok(())
    }

    pub fn change_password(&mut self, password_hash: impl Into<String>) -> Result<(), AccountError> {
        self.data.password_hash = required("password hash", password_hash.into())?;
        let changed_at = self.touch();
        self.events.record(AccountPasswordChanged {
            account_id: self.id,
            changed_at,
        });
        Ok(())
    }

    pub fn update_profile(&mut self, profile: Profile) -> Result<(), AccountError> {
        let old = std::mem::replace(&mut self.data.profile, profile.clone());
        let updated_at = self.touch();
        self.events.record(AccountProfileUpdated {
            account_id: self.id,
            old,
            new: profile,
            updated_at,
        });
        Ok(())
    }

    fn touch(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        self.data.updated_at = now;
        now
    }
}
