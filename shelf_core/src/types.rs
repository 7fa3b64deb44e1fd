//! Core domain types for the Shelf library system.
//!
//! This module defines the fundamental types used throughout the system:
//! - Books and catalog input rows
//! - Loan records and their status
//! - Borrower filters for listings
//! - Accounts and roles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Book Types
// ============================================================================

/// A catalog entry. `available` is the only thing consulted to decide
/// whether a copy can be lent right now.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Book {
    pub id: u64,
    pub title: String,
    pub author: Option<String>,
    pub price: Option<f64>,
    pub available: u32,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub shelf: Option<String>,
}

/// Book data supplied by an admin or an import, before an id is assigned
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub author: Option<String>,
    pub price: Option<f64>,
    pub copies: u32,
    pub genre: Option<String>,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub year: Option<i32>,
    pub shelf: Option<String>,
}

impl NewBook {
    /// Shorthand for a title with a number of copies and nothing else
    pub fn new(title: impl Into<String>, copies: u32) -> Self {
        Self {
            title: title.into(),
            copies,
            ..Self::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

// ============================================================================
// Loan Types
// ============================================================================

/// One borrow of one title by one borrower.
///
/// Created open with no return timestamp and a zero fine; closed exactly
/// once; never modified or removed after that.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoanRecord {
    pub id: u64,
    pub borrower: String,
    pub title: String,
    pub book_id: u64,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub fine: u64,
}

impl LoanRecord {
    pub fn is_open(&self) -> bool {
        self.returned_at.is_none()
    }

    /// Case-insensitive borrower comparison
    pub fn is_held_by(&self, borrower: &str) -> bool {
        same_borrower(&self.borrower, borrower)
    }
}

/// Borrower names compare case-insensitively everywhere in the ledger.
pub fn same_borrower(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// An open loan past its due timestamp, with the fine accrued so far
#[derive(Clone, Debug, PartialEq)]
pub struct OverdueLoan {
    pub loan: LoanRecord,
    pub days_late: i64,
    pub accrued_fine: u64,
}

/// Selects whose loans a listing returns
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BorrowerFilter {
    All,
    Borrower(String),
}

impl BorrowerFilter {
    /// `"all"` (any case) selects every borrower; anything else is a name.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            BorrowerFilter::All
        } else {
            BorrowerFilter::Borrower(s.to_string())
        }
    }

    pub fn matches(&self, loan: &LoanRecord) -> bool {
        match self {
            BorrowerFilter::All => true,
            BorrowerFilter::Borrower(name) => loan.is_held_by(name),
        }
    }
}

// ============================================================================
// Account Types
// ============================================================================

/// Account role
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

/// A registered library user
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub registered_at: DateTime<Utc>,
}
