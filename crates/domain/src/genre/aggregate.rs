//! Genre aggregate implementation.

use chrono::{DateTime, Utc};
use common::GenreId;
use serde::{Deserialize, Serialize};
use storage::{AggregateKey, WriteOp};

use crate::aggregate::{
    AggregateRoot, EventBuffer, TrackedAggregate, delete_op, impl_has_domain_events, key_of,
    update_op,
};

use super::{
    GenreError,
    events::{GenreCreated, GenreDeleted, GenreUpdated},
};

/// Persisted state of a genre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreData {
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    #[serde(default)]
    announced: bool,
}

fn validate_name(name: String) -> Result<String, GenreError> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(GenreError::BlankName);
    }
    Ok(name)
}

/// A genre that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewGenre {
    data: GenreData,
}

impl NewGenre {
    pub fn create(name: impl Into<String>) -> Result<Self, GenreError> {
        let name = validate_name(name.into())?;
        let now = Utc::now();

        Ok(Self {
            data: GenreData {
                name,
                created_at: now,
                updated_at: now,
                announced: false,
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn data(&self) -> &GenreData {
        &self.data
    }

    pub fn materialize(self, id: GenreId) -> Genre {
        Genre {
            id,
            data: self.data,
            events: EventBuffer::new(),
            deleted: false,
        }
    }
}

/// Genre aggregate root.
#[derive(Debug, Clone)]
pub struct Genre {
    id: GenreId,
    data: GenreData,
    events: EventBuffer,

    /// When set, the unit of work deletes the row instead of updating it.
    deleted: bool,
}

impl_has_domain_events!(Genre);

impl TrackedAggregate for Genre {
    fn key(&self) -> AggregateKey {
        key_of(self)
    }

    fn write_op(&self) -> Result<WriteOp, serde_json::Error> {
        if self.deleted {
            Ok(delete_op(self))
        } else {
            update_op(self)
        }
    }
}

impl AggregateRoot for Genre {
    type Id = GenreId;
    type Data = GenreData;

    const KIND: &'static str = "Genre";

    fn id(&self) -> GenreId {
        self.id
    }

    fn data(&self) -> &GenreData {
        &self.data
    }

    fn restore(id: GenreId, data: GenreData) -> Self {
        Self {
            id,
            data,
            events: EventBuffer::new(),
            deleted: false,
        }
    }
}

impl Genre {
    pub fn id(&self) -> GenreId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.data.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.data.updated_at
    }

    pub fn is_marked_for_deletion(&self) -> bool {
        self.deleted
    }

    /// Records `GenreCreated`. Call once, after the genre is persisted.
    pub fn raise_created_event(&mut self) -> Result<(), GenreError> {
        if self.data.announced {
            return Err(GenreError::AlreadyAnnounced { genre_id: self.id });
        }

        self.data.announced = true;
        self.events.record(GenreCreated {
            genre_id: self.id,
            name: self.data.name.clone(),
            created_at: self.data.created_at,
        });
        Ok(())
    }

    /// Renames the genre and records `GenreUpdated` with both names.
    pub fn rename(&mut self, new_name: impl Into<String>) -> Result<(), GenreError> {
        self.ensure_live()?;
        let new_name = validate_name(new_name.into())?;

        let old_name = std::mem::replace(&mut self.data.name, new_name.clone());
        let now = Utc::now();
        self.data.updated_at = now;
        self.events.record(GenreUpdated {
            genre_id: self.id,
            old_name,
            new_name,
            updated_at: now,
        });
        Ok(())
    }

    /// Flags the genre for deletion and records `GenreDeleted`.
    ///
    /// `dependent_books` is the number of books still filed under the genre;
    /// any dependent blocks the deletion.
    pub fn mark_for_deletion(&mut self, dependent_books: u64) -> Result<(), GenreError> {
        self.ensure_live()?;
        if dependent_books > 0 {
            return Err(GenreError::HasDependents {
                genre_id: self.id,
                count: dependent_books,
            });
        }

        self.deleted = true;
        self.events.record(GenreDeleted {
            genre_id: self.id,
            name: self.data.name.clone(),
            deleted_at: Utc::now(),
        });
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), GenreError> {
        if self.deleted {
            return Err(GenreError::MarkedForDeletion { genre_id: self.id });
        }
        Ok(())
    }
}
