//! Loan ledger: the borrow/return state machine.
//!
//! Each (borrower, title) pair has at most one open loan. Borrowing takes a
//! copy out of the catalog and returning puts it back, and both either fully
//! apply or leave the ledger and catalog exactly as they were.

use crate::{
    BorrowerFilter, Catalog, Error, FinePolicy, LoanRecord, OverdueLoan, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only record of every loan
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Ledger {
    loans: Vec<LoanRecord>,
    next_id: u64,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.loans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loans.is_empty()
    }

    /// Every record in insertion order
    pub fn records(&self) -> &[LoanRecord] {
        &self.loans
    }

    /// The open loan for this borrower (any case) and exact title
    pub fn find_open(&self, borrower: &str, title: &str) -> Option<&LoanRecord> {
        let borrower = borrower.trim();
        self.loans
            .iter()
            .find(|l| l.is_open() && l.title == title && l.is_held_by(borrower))
    }

    fn find_open_index(&self, borrower: &str, title: &str) -> Option<usize> {
        let borrower = borrower.trim();
        self.loans
            .iter()
            .position(|l| l.is_open() && l.title == title && l.is_held_by(borrower))
    }

    /// Lend a copy of `title` to `borrower`.
    ///
    /// Checks run before anything is touched: a blank borrower yields
    /// `Validation`, a duplicate open loan yields `AlreadyBorrowed`, an empty
    /// shelf yields `Unavailable`.
    pub fn borrow(
        &mut self,
        catalog: &mut Catalog,
        borrower: &str,
        title: &str,
        now: DateTime<Utc>,
        policy: &FinePolicy,
    ) -> Result<LoanRecord> {
        let borrower = borrower_name(borrower)?;
        if self.find_open(borrower, title).is_some() {
            return Err(Error::AlreadyBorrowed {
                borrower: borrower.to_string(),
                title: title.to_string(),
            });
        }

        let due_at = policy.due_at(now)?;

        // The catalog counter is the only gate; it fails without mutating.
        catalog.decrement(title)?;
        let book_id = catalog.find(title).map(|b| b.id).unwrap_or_default();

        self.next_id += 1;
        let loan = LoanRecord {
            id: self.next_id,
            borrower: borrower.to_string(),
            title: title.to_string(),
            book_id,
            borrowed_at: now,
            due_at,
            returned_at: None,
            fine: 0,
        };
        self.loans.push(loan.clone());

        tracing::info!(
            "Loan {} opened: {} borrowed '{}', due {}",
            loan.id,
            loan.borrower,
            loan.title,
            loan.due_at.format("%Y-%m-%d")
        );
        Ok(loan)
    }

    /// Close the borrower's open loan for `title` and charge the late fine.
    pub fn return_loan(
        &mut self,
        catalog: &mut Catalog,
        borrower: &str,
        title: &str,
        now: DateTime<Utc>,
        policy: &FinePolicy,
    ) -> Result<LoanRecord> {
        let borrower = borrower_name(borrower)?;
        let idx = self
            .find_open_index(borrower, title)
            .ok_or_else(|| Error::NoActiveLoan {
                borrower: borrower.to_string(),
                title: title.to_string(),
            })?;

        // Fails with UnknownTitle before the loan is touched.
        catalog.increment(title)?;

        let loan = &mut self.loans[idx];
        loan.fine = policy.fine_for(loan.borrowed_at, now);
        loan.returned_at = Some(now);

        tracing::info!(
            "Loan {} closed: {} returned '{}' with fine {}",
            loan.id,
            loan.borrower,
            loan.title,
            loan.fine
        );
        Ok(loan.clone())
    }

    /// The fine `return_loan` would charge right now, without closing anything
    pub fn quote_fine(
        &self,
        borrower: &str,
        title: &str,
        now: DateTime<Utc>,
        policy: &FinePolicy,
    ) -> Result<u64> {
        let borrower = borrower_name(borrower)?;
        self.find_open(borrower, title)
            .map(|l| policy.fine_for(l.borrowed_at, now))
            .ok_or_else(|| Error::NoActiveLoan {
                borrower: borrower.to_string(),
                title: title.to_string(),
            })
    }

    /// Loans matching the filter, newest borrow first
    pub fn list_loans(&self, filter: &BorrowerFilter) -> Vec<LoanRecord> {
        let mut loans: Vec<_> = self
            .loans
            .iter()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        sort_newest_first(&mut loans);
        loans
    }

    /// The borrower's unreturned loans, newest borrow first
    pub fn list_open_loans(&self, borrower: &str) -> Vec<LoanRecord> {
        let borrower = borrower.trim();
        let mut loans: Vec<_> = self
            .loans
            .iter()
            .filter(|l| l.is_open() && l.is_held_by(borrower))
            .cloned()
            .collect();
        sort_newest_first(&mut loans);
        loans
    }

    /// Open loans past their due timestamp, most overdue first
    pub fn list_overdue(&self, now: DateTime<Utc>, policy: &FinePolicy) -> Vec<OverdueLoan> {
        let mut overdue: Vec<_> = self
            .loans
            .iter()
            .filter(|l| l.is_open() && l.due_at < now)
            .map(|l| OverdueLoan {
                loan: l.clone(),
                days_late: policy.days_late(l.borrowed_at, now),
                accrued_fine: policy.fine_for(l.borrowed_at, now),
            })
            .collect();
        overdue.sort_by(|a, b| a.loan.due_at.cmp(&b.loan.due_at));
        overdue
    }

    /// Number of loans currently out
    pub fn open_count(&self) -> usize {
        self.loans.iter().filter(|l| l.is_open()).count()
    }

    /// Distinct titles that have at least one loan out
    pub fn open_titles(&self) -> Vec<&str> {
        let mut titles: Vec<_> = self
            .loans
            .iter()
            .filter(|l| l.is_open())
            .map(|l| l.title.as_str())
            .collect();
        titles.sort_unstable();
        titles.dedup();
        titles
    }
}

/// Borrower names are stored and compared trimmed; blank names are rejected.
fn borrower_name(borrower: &str) -> Result<&str> {
    let name = borrower.trim();
    if name.is_empty() {
        return Err(Error::Validation("borrower name must not be empty".into()));
    }
    Ok(name)
}

fn sort_newest_first(loans: &mut [LoanRecord]) {
    loans.sort_by(|a, b| {
        b.borrowed_at
            .cmp(&a.borrowed_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
