//! The library store: the one object callers use to borrow, return and query.
//!
//! A store is opened once at startup on a data directory and closed on
//! shutdown. Every state change runs as a transaction: the store lock is
//! taken (an in-process mutex plus an exclusive `fs2` lock on
//! `library.lock`, so separate processes serialize too), the state is
//! loaded, the change is applied, and the state is saved only if the change
//! succeeded. Reads take a shared lock.

use crate::{
    csv_io, journal, reports, Account, Book, BorrowerFilter, Error, EventSink, FinePolicy,
    JsonlJournal, LibraryState, LibraryStats, LoanEvent, LoanEventKind, LoanRecord, NewBook,
    OverdueLoan, Result, Role,
};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const STATE_FILE: &str = "library.json";
pub const LOCK_FILE: &str = "library.lock";
pub const JOURNAL_FILE: &str = "loans.journal";

pub struct LibraryStore {
    data_dir: PathBuf,
    state_path: PathBuf,
    journal_path: PathBuf,
    policy: FinePolicy,
    lock: Mutex<File>,
}

impl std::fmt::Debug for LibraryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryStore")
            .field("data_dir", &self.data_dir)
            .field("policy", &self.policy)
            .finish()
    }
}

impl LibraryStore {
    /// Open the store in `data_dir`, creating the directory if needed.
    ///
    /// Fails if an existing state file cannot be read, so a damaged library
    /// is reported at startup rather than on the first borrow.
    pub fn open(data_dir: impl Into<PathBuf>, policy: FinePolicy) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(data_dir.join(LOCK_FILE))?;

        let store = Self {
            state_path: data_dir.join(STATE_FILE),
            journal_path: data_dir.join(JOURNAL_FILE),
            data_dir,
            policy,
            lock: Mutex::new(lock_file),
        };

        let (books, loans) = store.read(|state| (state.catalog.len(), state.ledger.len()))?;
        tracing::info!(
            "Opened library at {:?} ({} books, {} loans)",
            store.data_dir,
            books,
            loans
        );
        Ok(store)
    }

    /// Release the store. Every transaction is already on disk.
    pub fn close(self) -> Result<()> {
        let lock_file = self
            .lock
            .into_inner()
            .map_err(|_| Error::State("store lock poisoned".into()))?;
        lock_file.sync_all()?;
        tracing::info!("Closed library at {:?}", self.data_dir);
        Ok(())
    }

    pub fn policy(&self) -> FinePolicy {
        self.policy
    }

    // ------------------------------------------------------------------------
    // Locking
    // ------------------------------------------------------------------------

    fn with_lock<T>(&self, exclusive: bool, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock_file = self
            .lock
            .lock()
            .map_err(|_| Error::State("store lock poisoned".into()))?;

        if exclusive {
            lock_file.lock_exclusive()?;
        } else {
            lock_file.lock_shared()?;
        }

        let result = f();
        let unlocked = FileExt::unlock(&*lock_file);
        let value = result?;
        unlocked?;
        Ok(value)
    }

    /// Load, change, save. Nothing is written if `f` fails.
    fn apply<T>(&self, f: impl FnOnce(&mut LibraryState) -> Result<T>) -> Result<T> {
        let mut state = LibraryState::load(&self.state_path)?;
        let value = f(&mut state)?;
        state.save(&self.state_path)?;
        Ok(value)
    }

    fn transaction<T>(&self, f: impl FnOnce(&mut LibraryState) -> Result<T>) -> Result<T> {
        self.with_lock(true, || self.apply(f))
    }

    /// A transaction that produces a loan change, journaled under the same lock
    fn loan_transaction(
        &self,
        kind: LoanEventKind,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut LibraryState) -> Result<LoanRecord>,
    ) -> Result<LoanRecord> {
        self.with_lock(true, || {
            let loan = self.apply(f)?;
            self.record_event(kind, &loan, now);
            Ok(loan)
        })
    }

    fn read<T>(&self, f: impl FnOnce(&LibraryState) -> T) -> Result<T> {
        self.with_lock(false, || {
            let state = LibraryState::load(&self.state_path)?;
            Ok(f(&state))
        })
    }

    fn record_event(&self, kind: LoanEventKind, loan: &LoanRecord, now: DateTime<Utc>) {
        let event = LoanEvent::new(kind, loan.clone(), now);
        if let Err(e) = JsonlJournal::new(&self.journal_path).append(&event) {
            // The state file is the source of truth; the loan stands.
            tracing::warn!("Loan {} committed but not journaled: {}", loan.id, e);
        }
    }

    // ------------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------------

    /// Lendable copies of `title`; 0 when the title is unknown
    pub fn get_available(&self, title: &str) -> Result<u32> {
        self.read(|state| state.catalog.get_available(title))
    }

    pub fn find_book(&self, title: &str) -> Result<Option<Book>> {
        self.read(|state| state.catalog.find(title).cloned())
    }

    /// All books, ordered by title
    pub fn list_books(&self) -> Result<Vec<Book>> {
        self.read(|state| state.catalog.books().cloned().collect())
    }

    pub fn add_book(&self, book: NewBook) -> Result<Book> {
        self.transaction(|state| state.catalog.add_book(book))
    }

    pub fn set_available(&self, title: &str, available: u32) -> Result<()> {
        self.transaction(|state| state.catalog.set_available(title, available))
    }

    /// Replace the catalog with the rows of a CSV file. Returns the number
    /// of distinct titles imported.
    pub fn import_books_csv(&self, path: &Path) -> Result<usize> {
        let rows = csv_io::read_books_csv(path)?;
        self.transaction(|state| {
            let count = state.catalog.replace_all(rows)?;
            for title in state.ledger.open_titles() {
                if !state.catalog.contains(title) {
                    tracing::warn!(
                        "'{}' has loans out but is not in the imported catalog",
                        title
                    );
                }
            }
            Ok(count)
        })
    }

    pub fn export_books_csv(&self, path: &Path) -> Result<usize> {
        let books = self.list_books()?;
        csv_io::write_books_csv(path, &books)
    }

    pub fn export_loans_csv(&self, path: &Path) -> Result<usize> {
        let loans = self.list_loans(&BorrowerFilter::All)?;
        csv_io::write_loans_csv(path, &loans)
    }

    // ------------------------------------------------------------------------
    // Loans
    // ------------------------------------------------------------------------

    /// Lend `title` to `borrower` at `now`
    pub fn borrow(&self, borrower: &str, title: &str, now: DateTime<Utc>) -> Result<LoanRecord> {
        let policy = self.policy;
        self.loan_transaction(LoanEventKind::Borrowed, now, |state| {
            state
                .ledger
                .borrow(&mut state.catalog, borrower, title, now, &policy)
        })
    }

    /// Close `borrower`'s open loan of `title` at `now`, charging the fine
    pub fn return_loan(
        &self,
        borrower: &str,
        title: &str,
        now: DateTime<Utc>,
    ) -> Result<LoanRecord> {
        let policy = self.policy;
        self.loan_transaction(LoanEventKind::Returned, now, |state| {
            state
                .ledger
                .return_loan(&mut state.catalog, borrower, title, now, &policy)
        })
    }

    /// The fine a return at `now` would charge
    pub fn quote_fine(&self, borrower: &str, title: &str, now: DateTime<Utc>) -> Result<u64> {
        let policy = self.policy;
        self.read(|state| state.ledger.quote_fine(borrower, title, now, &policy))?
    }

    /// Loans for one borrower or everyone, newest borrow first
    pub fn list_loans(&self, filter: &BorrowerFilter) -> Result<Vec<LoanRecord>> {
        self.read(|state| state.ledger.list_loans(filter))
    }

    pub fn list_open_loans(&self, borrower: &str) -> Result<Vec<LoanRecord>> {
        self.read(|state| state.ledger.list_open_loans(borrower))
    }

    pub fn list_overdue(&self, now: DateTime<Utc>) -> Result<Vec<OverdueLoan>> {
        let policy = self.policy;
        self.read(|state| state.ledger.list_overdue(now, &policy))
    }

    pub fn journal_events(&self) -> Result<Vec<LoanEvent>> {
        journal::read_events(&self.journal_path)
    }

    // ------------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------------

    pub fn register_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<Account> {
        self.transaction(|state| state.accounts.register(name, email, password, Role::User, now))
    }

    pub fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<Account>> {
        self.read(|state| state.accounts.verify(email, password).cloned())
    }

    pub fn ensure_admin(
        &self,
        email: &str,
        password: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Account> {
        self.transaction(|state| state.accounts.ensure_admin(email, password, name, now))
    }

    pub fn list_users(&self) -> Result<Vec<Account>> {
        self.read(|state| state.accounts.users().to_vec())
    }

    // ------------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------------

    pub fn stats(&self) -> Result<LibraryStats> {
        self.read(reports::stats)
    }

    pub fn top_borrowed(&self, limit: usize) -> Result<Vec<(String, usize)>> {
        self.read(|state| reports::top_borrowed(state, limit))
    }

    pub fn recent_activity(&self, limit: usize) -> Result<Vec<LoanRecord>> {
        self.read(|state| reports::recent_activity(state, limit))
    }

    /// Catalog problems plus open loans whose title has left the catalog
    pub fn validate(&self) -> Result<Vec<String>> {
        self.read(|state| {
            let mut errors = state.catalog.validate();
            for title in state.ledger.open_titles() {
                if !state.catalog.contains(title) {
                    errors.push(format!("Open loan for '{}' which is not in the catalog", title));
                }
            }
            errors
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn day0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap()
    }

    fn open_store(dir: &Path) -> LibraryStore {
        crate::logging::init_test();
        LibraryStore::open(dir, FinePolicy::default()).unwrap()
    }

    fn stocked_store(dir: &Path, copies: u32) -> LibraryStore {
        let store = open_store(dir);
        store
            .add_book(NewBook::new("Dune", copies).with_author("Frank Herbert"))
            .unwrap();
        store
    }

    #[test]
    fn test_open_creates_directory_and_starts_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let data_dir = temp_dir.path().join("nested").join("library");

        let store = open_store(&data_dir);

        assert!(data_dir.join(LOCK_FILE).exists());
        assert!(store.list_books().unwrap().is_empty());
        assert_eq!(store.get_available("Dune").unwrap(), 0);
        store.close().unwrap();
    }

    #[test]
    fn test_open_rejects_corrupt_state() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join(STATE_FILE), "not json").unwrap();

        let result = LibraryStore::open(temp_dir.path(), FinePolicy::default());
        assert!(matches!(result, Err(Error::State(_))));
    }

    #[test]
    fn test_state_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = stocked_store(temp_dir.path(), 2);
        store.borrow("alice", "Dune", day0()).unwrap();
        store.close().unwrap();

        let store = open_store(temp_dir.path());
        assert_eq!(store.get_available("Dune").unwrap(), 1);
        assert_eq!(store.list_open_loans("Alice").unwrap().len(), 1);
    }

    #[test]
    fn test_borrow_and_return_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = stocked_store(temp_dir.path(), 1);

        let loan = store.borrow("Alice", "Dune", day0()).unwrap();
        assert_eq!(store.get_available("Dune").unwrap(), 0);
        assert!(loan.is_open());

        let closed = store.return_loan("ALICE", "Dune", day0()).unwrap();
        assert_eq!(closed.id, loan.id);
        assert_eq!(closed.fine, 0);
        assert_eq!(closed.returned_at, Some(day0()));
        assert_eq!(store.get_available("Dune").unwrap(), 1);
    }

    #[test]
    fn test_failed_borrow_writes_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = stocked_store(temp_dir.path(), 0);
        let before = std::fs::read(temp_dir.path().join(STATE_FILE)).unwrap();

        let result = store.borrow("alice", "Dune", day0());

        assert!(matches!(result, Err(Error::Unavailable { .. })));
        let after = std::fs::read(temp_dir.path().join(STATE_FILE)).unwrap();
        assert_eq!(before, after);
        assert!(store.list_loans(&BorrowerFilter::All).unwrap().is_empty());
        assert!(store.journal_events().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_borrow_and_empty_return() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = stocked_store(temp_dir.path(), 3);
        store.borrow("alice", "Dune", day0()).unwrap();

        let again = store.borrow("alice", "Dune", day0() + Duration::days(1));
        assert!(matches!(again, Err(Error::AlreadyBorrowed { .. })));
        assert_eq!(store.get_available("Dune").unwrap(), 2);

        let nothing = store.return_loan("bob", "Dune", day0());
        assert!(matches!(nothing, Err(Error::NoActiveLoan { .. })));
    }

    #[test]
    fn test_late_return_charges_and_quotes_match() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = stocked_store(temp_dir.path(), 1);
        store.borrow("alice", "Dune", day0()).unwrap();

        let back = day0() + Duration::days(14);
        let quoted = store.quote_fine("alice", "Dune", back).unwrap();
        let overdue = store.list_overdue(back).unwrap();
        let closed = store.return_loan("alice", "Dune", back).unwrap();

        assert_eq!(quoted, 7);
        assert_eq!(overdue[0].accrued_fine, 7);
        assert_eq!(closed.fine, 7);
        assert!(store.list_overdue(back).unwrap().is_empty());
    }

    #[test]
    fn test_loans_are_journaled() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = stocked_store(temp_dir.path(), 1);
        store.borrow("alice", "Dune", day0()).unwrap();
        store.return_loan("alice", "Dune", day0()).unwrap();

        let kinds: Vec<_> = store
            .journal_events()
            .unwrap()
            .iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![LoanEventKind::Borrowed, LoanEventKind::Returned]);
    }

    #[test]
    fn test_journal_uses_operation_time() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = stocked_store(temp_dir.path(), 1);
        let back = day0() + Duration::days(3);
        store.borrow("alice", "Dune", day0()).unwrap();
        store.return_loan("alice", "Dune", back).unwrap();

        let stamps: Vec<_> = store
            .journal_events()
            .unwrap()
            .iter()
            .map(|e| e.recorded_at)
            .collect();
        assert_eq!(stamps, vec![day0(), back]);
    }

    #[test]
    fn test_find_book_and_blank_borrower() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = stocked_store(temp_dir.path(), 1);

        let book = store.find_book("Dune").unwrap().unwrap();
        assert_eq!(book.author.as_deref(), Some("Frank Herbert"));
        assert!(store.find_book("Emma").unwrap().is_none());

        let before = std::fs::read(temp_dir.path().join(STATE_FILE)).unwrap();
        let result = store.borrow("  ", "Dune", day0());
        assert!(matches!(result, Err(Error::Validation(_))));
        let after = std::fs::read(temp_dir.path().join(STATE_FILE)).unwrap();
        assert_eq!(before, after);
        assert!(store.journal_events().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_borrows_of_last_copy() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(stocked_store(temp_dir.path(), 1));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store.borrow(&format!("reader{}", i), "Dune", day0())
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();

        assert_eq!(successes, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, Error::Unavailable { .. })));
        assert_eq!(store.get_available("Dune").unwrap(), 0);
    }

    #[test]
    fn test_separate_stores_on_one_directory_serialize() {
        let temp_dir = tempfile::tempdir().unwrap();
        stocked_store(temp_dir.path(), 1)
            .borrow("alice", "Dune", day0())
            .unwrap();

        // Each thread opens its own store, like separate processes would.
        let dir = temp_dir.path().to_path_buf();
        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let dir = dir.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let store = LibraryStore::open(&dir, FinePolicy::default()).unwrap();
                    barrier.wait();
                    store.return_loan("alice", "Dune", day0()).is_ok()
                })
            })
            .collect();

        let closed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        let store = open_store(temp_dir.path());
        assert_eq!(closed, 1);
        assert_eq!(store.get_available("Dune").unwrap(), 1);
    }

    #[test]
    fn test_import_replaces_catalog_and_export_writes_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = stocked_store(temp_dir.path(), 1);
        store.borrow("alice", "Dune", day0()).unwrap();

        let csv_path = temp_dir.path().join("import.csv");
        std::fs::write(&csv_path, "Title,Author,Quantity\nEmma,Jane Austen,2\nWalden,,\n").unwrap();

        assert_eq!(store.import_books_csv(&csv_path).unwrap(), 2);
        assert_eq!(store.get_available("Emma").unwrap(), 2);
        assert_eq!(store.get_available("Walden").unwrap(), 1);
        assert_eq!(store.get_available("Dune").unwrap(), 0);
        assert_eq!(store.validate().unwrap().len(), 1);

        let result = store.return_loan("alice", "Dune", day0());
        assert!(matches!(result, Err(Error::UnknownTitle(_))));
        assert_eq!(store.list_open_loans("alice").unwrap().len(), 1);

        let books_out = temp_dir.path().join("books.csv");
        let loans_out = temp_dir.path().join("loans.csv");
        assert_eq!(store.export_books_csv(&books_out).unwrap(), 2);
        assert_eq!(store.export_loans_csv(&loans_out).unwrap(), 1);
    }

    #[test]
    fn test_accounts_and_stats() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = stocked_store(temp_dir.path(), 2);
        store
            .register_user("Alice", "alice@example.com", "pw", day0())
            .unwrap();
        store
            .ensure_admin("admin@library.local", "admin123", "Admin", day0())
            .unwrap();
        store.borrow("alice", "Dune", day0()).unwrap();

        assert!(store
            .verify_credentials("alice@example.com", "pw")
            .unwrap()
            .is_some());
        assert!(store
            .verify_credentials("alice@example.com", "nope")
            .unwrap()
            .is_none());
        assert_eq!(store.list_users().unwrap().len(), 2);

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_users, 1);
        assert_eq!(stats.total_books, 1);
        assert_eq!(stats.borrowed_books, 1);
        assert_eq!(stats.total_fines, 0);
        assert_eq!(store.top_borrowed(3).unwrap(), vec![("Dune".to_string(), 1)]);
        assert_eq!(store.recent_activity(3).unwrap().len(), 1);
    }
}
