//! Loading and committing aggregates.

use std::marker::PhantomData;
use std::sync::Arc;

use storage::{AggregateKey, StorageBackend, StoredAggregate};
use tokio_util::sync::CancellationToken;

use crate::aggregate::AggregateRoot;
use crate::dispatch::EventRouter;
use crate::error::DomainError;
use crate::unit_of_work::{CommitReceipt, UnitOfWork};

/// Loads aggregates of one kind and commits changes through a unit of work.
///
/// The repository is responsible for:
/// 1. Inserting new aggregate state to obtain an identity
/// 2. Loading an aggregate and rebuilding it from its stored state
/// 3. Running a transition against it
/// 4. Committing the result, which persists state and dispatches events
pub struct Repository<S, A>
where
    S: StorageBackend,
    A: AggregateRoot,
{
    storage: Arc<S>,
    router: EventRouter,
    _phantom: PhantomData<fn() -> A>,
}

impl<S, A> Clone for Repository<S, A>
where
    S: StorageBackend,
    A: AggregateRoot,
{
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            router: self.router.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<S, A> Repository<S, A>
where
    S: StorageBackend,
    A: AggregateRoot,
{
    pub fn new(storage: Arc<S>, router: EventRouter) -> Self {
        Self {
            storage,
            router,
            _phantom: PhantomData,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Persists the state of a new aggregate and returns its identity.
    pub async fn insert(&self, data: &A::Data) -> Result<A::Id, DomainError> {
        let state = serde_json::to_value(data)?;
        let id = self.storage.insert(A::KIND, state).await?;
        Ok(A::Id::try_from(id)?)
    }

    /// Loads an aggregate, failing with `NotFound` if it does not exist.
    pub async fn load(&self, id: A::Id) -> Result<A, DomainError> {
        let key = AggregateKey::new(A::KIND, id.into());
        let row = self
            .storage
            .load(&key)
            .await?
            .ok_or_else(|| DomainError::NotFound {
                kind: A::KIND.to_string(),
                id: key.id,
            })?;
        Self::restore(row)
    }

    /// Loads an aggregate, returning None if it does not exist.
    pub async fn find(&self, id: A::Id) -> Result<Option<A>, DomainError> {
        let key = AggregateKey::new(A::KIND, id.into());
        self.storage
            .load(&key)
            .await?
            .map(Self::restore)
            .transpose()
    }

    /// Loads every aggregate of this kind, ordered by identity.
    pub async fn list(&self) -> Result<Vec<A>, DomainError> {
        self.storage
            .list(A::KIND)
            .await?
            .into_iter()
            .map(Self::restore)
            .collect()
    }

    /// Counts aggregates of this kind whose state field references `id`.
    pub async fn count_references(&self, field: &str, id: i64) -> Result<u64, DomainError> {
        Ok(self.storage.count_references(A::KIND, field, id).await?)
    }

    /// Commits one aggregate in its own unit of work.
    ///
    /// A dispatch failure carries the receipt as its committed value.
    pub async fn commit(
        &self,
        aggregate: &mut A,
        cancel: &CancellationToken,
    ) -> Result<CommitReceipt, DomainError> {
        let mut uow = UnitOfWork::new(self.storage.as_ref(), &self.router);
        uow.track(aggregate);
        Ok(uow.commit(cancel).await?)
    }

    /// Commits an aggregate whose row was just inserted, typically to
    /// announce it.
    ///
    /// The row already exists, so the write happens even if cancellation
    /// was requested meanwhile; only dispatch observes the token. A
    /// dispatch failure carries the committed aggregate.
    pub async fn commit_created(
        &self,
        mut aggregate: A,
        cancel: &CancellationToken,
    ) -> Result<A, DomainError> {
        let result = {
            let mut uow = UnitOfWork::new(self.storage.as_ref(), &self.router);
            uow.write_despite_cancellation().track(&mut aggregate);
            uow.commit(cancel).await
        };

        match result {
            Ok(_) => Ok(aggregate),
            Err(e) => Err(DomainError::from(e).with_committed(aggregate)),
        }
    }

    /// Loads an aggregate, runs `transition` on it and commits the result.
    ///
    /// A failing transition commits nothing. A dispatch failure carries the
    /// committed aggregate.
    pub async fn execute<F, E>(
        &self,
        id: A::Id,
        cancel: &CancellationToken,
        transition: F,
    ) -> Result<A, DomainError>
    where
        F: FnOnce(&mut A) -> Result<(), E>,
        DomainError: From<E>,
    {
        let mut aggregate = self.load(id).await?;
        transition(&mut aggregate)?;

        match self.commit(&mut aggregate, cancel).await {
            Ok(_) => Ok(aggregate),
            Err(e) => Err(e.with_committed(aggregate)),
        }
    }

    fn restore(row: StoredAggregate) -> Result<A, DomainError> {
        let id = A::Id::try_from(row.key.id)?;
        let data: A::Data = serde_json::from_value(row.state)?;
        Ok(A::restore(id, data))
    }
}
