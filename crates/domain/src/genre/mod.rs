//! Genre aggregate and related types.

mod aggregate;
mod events;
mod service;

pub use aggregate::{Genre, GenreData, NewGenre};
pub use events::{GenreCreated, GenreDeleted, GenreUpdated};
pub use service::GenreService;

use common::GenreId;
use thiserror::Error;

/// Errors that can occur during genre operations.
#[derive(Debug, Error)]
pub enum GenreError {
    #[error("Genre name must not be blank")]
    BlankName,

    /// Books still reference the genre.
    #[error("Genre {genre_id} is used by {count} book(s)")]
    HasDependents { genre_id: GenreId, count: u64 },

    #[error("Genre {genre_id} was already announced")]
    AlreadyAnnounced { genre_id: GenreId },

    /// The genre is about to be deleted and accepts no further changes.
    #[error("Genre {genre_id} is marked for deletion")]
    MarkedForDeletion { genre_id: GenreId },
}
