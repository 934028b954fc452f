//! Account service.

use std::sync::Arc;

use common::AccountId;
use storage::StorageBackend;
use tokio_util::sync::CancellationToken;

use crate::dispatch::EventRouter;
use crate::error::DomainError;
use crate::repository::Repository;

use super::{Account, NewAccount, Profile};

/// Service for registering and maintaining accounts.
pub struct AccountService<S: StorageBackend> {
    repository: Repository<S, Account>,
}

impl<S: StorageBackend> AccountService<S> {
    pub fn new(storage: Arc<S>, router: EventRouter) -> Self {
        Self {
            repository: Repository::new(storage, router),
        }
    }

    /// Persists a registration and announces it.
    #[tracing::instrument(skip(self, account, cancel), fields(username = account.username()))]
    pub async fn register(
        &self,
        account: NewAccount,
        cancel: &CancellationToken,
    ) -> Result<Account, DomainError> {
        if cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }

        let id = self.repository.insert(account.data()).await?;
        let mut account = account.materialize(id);
        account.raise_registered_event()?;
        let account = self.repository.commit_created(account, cancel).await?;

        tracing::info!(account_id = %account.id(), "account registered");
        Ok(account)
    }

    #[tracing::instrument(skip(self, code, cancel))]
    pub async fn activate(
        &self,
        account_id: AccountId,
        code: String,
        cancel: &CancellationToken,
    ) -> Result<Account, DomainError> {
        self.repository
            .execute(account_id, cancel, |account| account.activate(&code))
            .await
    }

    #[tracing::instrument(skip(self, password_hash, cancel))]
    pub async fn change_password(
        &self,
        account_id: AccountId,
        password_hash: String,
        cancel: &CancellationToken,
    ) -> Result<Account, DomainError> {
        self.repository
            .execute(account_id, cancel, |account| {
                account.change_password(password_hash)
            })
            .await
    }

    #[tracing::instrument(skip(self, profile, cancel))]
    pub async fn update_profile(
        &self,
        account_id: AccountId,
        profile: Profile,
        cancel: &CancellationToken,
    ) -> Result<Account, DomainError> {
        self.repository
            .execute(account_id, cancel, |account| account.update_profile(profile))
            .await
    }

    pub async fn get_account(&self, account_id: AccountId) -> Result<Account, DomainError> {
        self.repository.load(account_id).await
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<Account>, DomainError> {
        let accounts = self.repository.list().await?;
        Ok(accounts
            .into_iter()
            .find(|account| account.username() == username))
    }
}
