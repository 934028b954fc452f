//! Book domain events.

use chrono::{DateTime, Utc};
use common::BookId;
use serde::{Deserialize, Serialize};

use super::BookDetails;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookCreated {
    pub book_id: BookId,
    pub details: BookDetails,
    pub created_at: DateTime<Utc>,
}

/// The catalog entry changed. Carries both snapshots for auditing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookUpdated {
    pub book_id: BookId,
    pub old: BookDetails,
    pub new: BookDetails,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookDeleted {
    pub book_id: BookId,
    pub title: String,
    pub deleted_at: DateTime<Utc>,
}

crate::domain_event!(BookCreated, "Book", id = book_id, at = created_at);
crate::domain_event!(BookUpdated, "Book", id = book_id, at = updated_at);
crate::domain_event!(BookDeleted, "Book", id = book_id, at = deleted_at);
