//! Genre service.

use std::sync::Arc;

use common::GenreId;
use storage::StorageBackend;
use tokio_util::sync::CancellationToken;

use crate::aggregate::AggregateRoot;
use crate::book::Book;
use crate::dispatch::EventRouter;
use crate::error::DomainError;
use crate::repository::Repository;
use crate::unit_of_work::CommitReceipt;

use super::{Genre, NewGenre};

/// Service for managing genres.
pub struct GenreService<S: StorageBackend> {
    repository: Repository<S, Genre>,
}

impl<S: StorageBackend> GenreService<S> {
    pub fn new(storage: Arc<S>, router: EventRouter) -> Self {
        Self {
            repository: Repository::new(storage, router),
        }
    }

    /// Creates a genre and announces it.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn create_genre(
        &self,
        name: String,
        cancel: &CancellationToken,
    ) -> Result<Genre, DomainError> {
        let draft = NewGenre::create(name)?;
        if cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }

        let id = self.repository.insert(draft.data()).await?;
        let mut genre = draft.materialize(id);
        genre.raise_created_event()?;
        let genre = self.repository.commit_created(genre, cancel).await?;

        tracing::info!(genre_id = %genre.id(), "genre created");
        Ok(genre)
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn rename_genre(
        &self,
        genre_id: GenreId,
        name: String,
        cancel: &CancellationToken,
    ) -> Result<Genre, DomainError> {
        self.repository
            .execute(genre_id, cancel, |genre| genre.rename(name))
            .await
    }

    /// Deletes a genre no book is filed under.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn delete_genre(
        &self,
        genre_id: GenreId,
        cancel: &CancellationToken,
    ) -> Result<CommitReceipt, DomainError> {
        let mut genre = self.repository.load(genre_id).await?;
        let dependents = self
            .repository
            .storage()
            .count_references(Book::KIND, "genre_ids", genre_id.into())
            .await?;

        genre.mark_for_deletion(dependents)?;
        self.repository.commit(&mut genre, cancel).await
    }

    pub async fn get_genre(&self, genre_id: GenreId) -> Result<Genre, DomainError> {
        self.repository.load(genre_id).await
    }

    pub async fn list_genres(&self) -> Result<Vec<Genre>, DomainError> {
        self.repository.list().await
    }
}
