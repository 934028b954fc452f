//! Book aggregate implementation.

use chrono::{DateTime, Utc};
use common::{BookId, GenreId};
use serde::{Deserialize, Serialize};
use storage::{AggregateKey, WriteOp};

use crate::aggregate::{
    AggregateRoot, EventBuffer, TrackedAggregate, delete_op, impl_has_domain_events, key_of,
    update_op,
};
use crate::order::Money;

use super::{
    BookError,
    events::{BookCreated, BookDeleted, BookUpdated},
};

/// Editable catalog fields of a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookDetails {
    pub title: String,
    pub author: String,
    pub description: String,
    pub list_price: Money,

    /// Discounted price; zero means the list price applies.
    #[serde(default)]
    pub sell_price: Money,

    pub stock: u32,

    /// Genres the book is filed under.
    #[serde(default)]
    pub genre_ids: Vec<GenreId>,
}

impl BookDetails {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        description: impl Into<String>,
        list_price: Money,
        stock: u32,
    ) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            description: description.into(),
            list_price,
            sell_price: Money::zero(),
            stock,
            genre_ids: Vec::new(),
        }
    }

    pub fn with_sell_price(mut self, sell_price: Money) -> Self {
        self.sell_price = sell_price;
        self
    }

    pub fn with_genres(mut self, genre_ids: impl IntoIterator<Item = GenreId>) -> Self {
        self.genre_ids = genre_ids.into_iter().collect();
        self
    }

    fn validated(mut self) -> Result<Self, BookError> {
        for (field, value) in [
            ("title", &mut self.title),
            ("author", &mut self.author),
            ("description", &mut self.description),
        ] {
            *value = value.trim().to_string();
            if value.is_empty() {
                return Err(BookError::BlankField { field });
            }
        }

        for (field, price) in [("list price", self.list_price), ("sell price", self.sell_price)] {
            if price.is_negative() {
                return Err(BookError::InvalidPrice {
                    field,
                    price: price.cents(),
                });
            }
        }

        self.genre_ids.sort();
        self.genre_ids.dedup();
        Ok(self)
    }
}

/// Persisted state of a book.
///
/// Details are flattened so `genre_ids` sits at the top of the stored
/// state, where reference counting looks for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookData {
    #[serde(flatten)]
    details: BookDetails,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    #[serde(default)]
    announced: bool,
}

/// A book that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewBook {
    data: BookData,
}

impl NewBook {
    /// Validates the details: text fields non-blank, price non-negative.
    pub fn create(details: BookDetails) -> Result<Self, BookError> {
        let details = details.validated()?;
        let now = Utc::now();

        Ok(Self {
            data: BookData {
                details,
                created_at: now,
                updated_at: now,
                announced: false,
            },
        })
    }

    pub fn details(&self) -> &BookDetails {
        &self.data.details
    }

    pub fn data(&self) -> &BookData {
        &self.data
    }

    pub fn materialize(self, id: BookId) -> Book {
        Book {
            id,
            data: self.data,
            events: EventBuffer::new(),
            deleted: false,
        }
    }
}

/// Book aggregate root.
#[derive(Debug, Clone)]
pub struct Book {
    id: BookId,
    data: BookData,
    events: EventBuffer,
    deleted: bool,
}

impl_has_domain_events!(Book);

impl TrackedAggregate for Book {
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

impl AggregateRoot for Book {
    type Id = BookId;
    type Data = BookData;

    const KIND: &'static str = "Book";

    fn id(&self) -> BookId {
        self.id
    }

    fn data(&self) -> &BookData {
        &self.data
    }

    fn restore(id: BookId, data: BookData) -> Self {
        Self {
            id,
            data,
            events: EventBuffer::new(),
            deleted: false,
        }
    }
}

impl Book {
    pub fn id(&self) -> BookId {
        self.id
    }

    pub fn details(&self) -> &BookDetails {
        &self.data.details
    }

    pub fn title(&self) -> &str {
        &self.data.details.title
    }

    pub fn list_price(&self) -> Money {
        self.data.details.list_price
    }

    pub fn sell_price(&self) -> Money {
        self.data.details.sell_price
    }

    /// Price charged when ordering: the sell price if set, else the list price.
    pub fn effective_price(&self) -> Money {
        if self.data.details.sell_price.cents() > 0 {
            self.data.details.sell_price
        } else {
            self.data.details.list_price
        }
    }

    pub fn stock(&self) -> u32 {
        self.data.details.stock
    }

    pub fn genre_ids(&self) -> &[GenreId] {
        &self.data.details.genre_ids
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.data.updated_at
    }

    pub fn is_marked_for_deletion(&self) -> bool {
        self.deleted
    }

    /// Records `BookCreated`. Call once, after the book is persisted.
    pub fn raise_created_event(&mut self) -> Result<(), BookError> {
        if self.data.announced {
            return Err(BookError::AlreadyAnnounced { book_id: self.id });
        }

        self.data.announced = true;
        self.events.record(BookCreated {
            book_id: self.id,
            details: self.data.details.clone(),
            created_at: self.data.created_at,
        });
        Ok(())
    }

    /// Replaces the catalog details and records `BookUpdated`.
    pub fn update_details(&mut self, details: BookDetails) -> Result<(), BookError> {
        self.ensure_live()?;
        let details = details.validated()?;

        let old = std::mem::replace(&mut self.data.details, details.clone());
        let now = Utc::now();
        self.data.updated_at = now;
        self.events.record(BookUpdated {
            book_id: self.id,
            old,
            new: details,
            updated_at: now,
        });
        Ok(())
    }

    /// Flags the book for deletion and records `BookDeleted`.
    ///
    /// `referencing_orders` is the number of orders with a line for this
    /// book; any reference blocks the deletion.
    pub fn mark_for_deletion(&mut self, referencing_orders: u64) -> Result<(), BookError> {
        self.ensure_live()?;
        if referencing_orders > 0 {
            return Err(BookError::InUse {
                book_id: self.id,
                count: referencing_orders,
            });
        }

        self.deleted = true;
        self.events.record(BookDeleted {
            book_id: self.id,
            title: self.data.details.title.clone(),
            deleted_at: Utc::now(),
        });
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), BookError> {
        if self.deleted {
            return Err(BookError::MarkedForDeletion { book_id: self.id });
        }
        Ok(())
    }
}
