//! Catalog store: per-title copy availability.
//!
//! Books are keyed by exact title. The available counter is the single gate
//! the loan ledger consults before lending; it can never drop below zero.

use crate::{Book, Error, NewBook, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// The complete set of books the library can lend
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    books: BTreeMap<String, Book>,
    next_id: u64,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of lendable copies; 0 for an unknown title.
    pub fn get_available(&self, title: &str) -> u32 {
        self.books.get(title).map(|b| b.available).unwrap_or(0)
    }

    pub fn find(&self, title: &str) -> Option<&Book> {
        self.books.get(title)
    }

    pub fn contains(&self, title: &str) -> bool {
        self.books.contains_key(title)
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// All books, ordered by title
    pub fn books(&self) -> impl Iterator<Item = &Book> {
        self.books.values()
    }

    /// Take one copy off the shelf. Returns the remaining count.
    ///
    /// Fails with `Unavailable` when no copy is left (including unknown
    /// titles) and leaves the catalog untouched.
    pub fn decrement(&mut self, title: &str) -> Result<u32> {
        match self.books.get_mut(title) {
            Some(book) if book.available > 0 => {
                book.available -= 1;
                tracing::debug!("'{}' now has {} copies available", title, book.available);
                Ok(book.available)
            }
            _ => Err(Error::Unavailable {
                title: title.to_string(),
            }),
        }
    }

    /// Put one copy back. Returns the new count.
    ///
    /// No upper bound is enforced; only the ledger calls this, and only when
    /// closing a loan that took a copy out.
    pub fn increment(&mut self, title: &str) -> Result<u32> {
        let book = self
            .books
            .get_mut(title)
            .ok_or_else(|| Error::UnknownTitle(title.to_string()))?;
        book.available = book.available.saturating_add(1);
        tracing::debug!("'{}' now has {} copies available", title, book.available);
        Ok(book.available)
    }

    /// Add a new title, or restock an existing one by its copy count.
    pub fn add_book(&mut self, new: NewBook) -> Result<Book> {
        let title = new.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::Validation("book title must not be empty".into()));
        }

        if let Some(book) = self.books.get_mut(&title) {
            book.available = book.available.saturating_add(new.copies);
            tracing::info!(
                "Restocked '{}' with {} copies ({} available)",
                title,
                new.copies,
                book.available
            );
            return Ok(book.clone());
        }

        self.next_id += 1;
        let book = Book {
            id: self.next_id,
            title: title.clone(),
            author: new.author,
            price: new.price,
            available: new.copies,
            genre: new.genre,
            isbn: new.isbn,
            publisher: new.publisher,
            year: new.year,
            shelf: new.shelf,
        };
        tracing::info!("Added '{}' with {} copies", title, book.available);
        self.books.insert(title, book.clone());
        Ok(book)
    }

    /// Overwrite the available count of an existing title.
    pub fn set_available(&mut self, title: &str, available: u32) -> Result<()> {
        let book = self
            .books
            .get_mut(title)
            .ok_or_else(|| Error::UnknownTitle(title.to_string()))?;
        book.available = available;
        tracing::info!("Set '{}' to {} copies available", title, available);
        Ok(())
    }

    /// Replace every book with a freshly imported set.
    ///
    /// Rows repeating a title are merged by adding their copies. Ids keep
    /// counting up from the previous catalog so they are never reused.
    /// Returns the number of distinct titles now in the catalog.
    pub fn replace_all(&mut self, rows: Vec<NewBook>) -> Result<usize> {
        let mut fresh = Catalog {
            books: BTreeMap::new(),
            next_id: self.next_id,
        };
        for row in rows {
            if fresh.contains(row.title.trim()) {
                tracing::warn!("Duplicate title '{}' in import, merging copies", row.title.trim());
            }
            fresh.add_book(row)?;
        }
        *self = fresh;
        Ok(self.books.len())
    }

    /// Validate the catalog for consistency
    ///
    /// Returns a list of problems, or empty Vec if valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let mut seen_ids = HashSet::new();

        for (title, book) in &self.books {
            if title.is_empty() || book.title.is_empty() {
                errors.push("Book has empty title".to_string());
            }
            if title != &book.title {
                errors.push(format!(
                    "Catalog key '{}' doesn't match book.title '{}'",
                    title, book.title
                ));
            }
            if !seen_ids.insert(book.id) {
                errors.push(format!("Book id {} is used more than once", book.id));
            }
            if book.id > self.next_id {
                errors.push(format!(
                    "Book '{}' has id {} beyond the id counter {}",
                    title, book.id, self.next_id
                ));
            }
        }

        errors
    }
}
