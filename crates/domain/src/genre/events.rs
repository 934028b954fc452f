//! Genre domain events.

use chrono::{DateTime, Utc};
use common::GenreId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreCreated {
    pub genre_id: GenreId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// The genre was renamed. Raised even when the name did not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreUpdated {
    pub genre_id: GenreId,
    pub old_name: String,
    pub new_name: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreDeleted {
    pub genre_id: GenreId,

    /// Name at the time of deletion.
    pub name: String,

    pub deleted_at: DateTime<Utc>,
}

crate::domain_event!(GenreCreated, "Genre", id = genre_id, at = created_at);
crate::domain_event!(GenreUpdated, "Genre", id = genre_id, at = updated_at);
crate::domain_event!(GenreDeleted, "Genre", id = genre_id, at = deleted_at);
