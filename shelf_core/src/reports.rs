//! Admin dashboard figures derived from the library state.

use crate::{LibraryState, LoanRecord, Role};
use std::collections::HashMap;

/// Headline numbers for the admin dashboard
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LibraryStats {
    pub total_users: usize,
    pub total_books: usize,
    pub borrowed_books: usize,
    pub total_fines: u64,
}

pub fn stats(state: &LibraryState) -> LibraryStats {
    LibraryStats {
        total_users: state.accounts.count_role(Role::User),
        total_books: state.catalog.len(),
        borrowed_books: state.ledger.open_count(),
        total_fines: state.ledger.records().iter().map(|l| l.fine).sum(),
    }
}

/// Titles by number of loans ever made, most borrowed first
pub fn top_borrowed(state: &LibraryState, limit: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for loan in state.ledger.records() {
        *counts.entry(loan.title.as_str()).or_default() += 1;
    }

    let mut ranked: Vec<_> = counts
        .into_iter()
        .map(|(title, count)| (title.to_string(), count))
        .collect();
    // ties broken by title so output is stable
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

/// Most recently borrowed loans across all borrowers
pub fn recent_activity(state: &LibraryState, limit: usize) -> Vec<LoanRecord> {
    let mut loans = state.ledger.list_loans(&crate::BorrowerFilter::All);
    loans.truncate(limit);
    loans
}
