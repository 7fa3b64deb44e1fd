//! CSV import and export for the catalog and the loan ledger.
//!
//! Catalog spreadsheets arrive with inconsistent headers, so column names
//! are normalised and mapped onto the book fields before rows are read.

use crate::{Book, LoanRecord, NewBook, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::collections::HashMap;
use std::path::Path;

/// Header aliases, after normalisation, for each book field
const COLUMN_ALIASES: &[(&str, &[&str])] = &[
    ("title", &["title", "book_title", "bookname", "book"]),
    ("author", &["author", "writer", "author_name"]),
    ("genre", &["genre", "genre_category", "category", "type"]),
    ("isbn", &["isbn", "isbn_number"]),
    ("publisher", &["publisher", "publishing_company", "pub"]),
    ("year", &["year", "publish_year"]),
    ("price", &["price", "cost", "amount", "book_price"]),
    (
        "available",
        &["available", "copies_available", "copies", "no_of_copies", "quantity", "stock"],
    ),
    ("shelf", &["shelf", "shelf_number", "shelf_no", "rack_no"]),
];

fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase().replace(' ', "_")
}

fn canonical_column(header: &str) -> Option<&'static str> {
    let normalized = normalize_header(header);
    COLUMN_ALIASES
        .iter()
        .find(|(_, aliases)| aliases.contains(&normalized.as_str()))
        .map(|(field, _)| *field)
}

/// Positions of each known field in a particular file's header row
struct ColumnMap(HashMap<&'static str, usize>);

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> Self {
        let mut map = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            if let Some(field) = canonical_column(header) {
                // first matching column wins
                map.entry(field).or_insert(idx);
            }
        }
        Self(map)
    }

    fn get<'r>(&self, record: &'r StringRecord, field: &str) -> Option<&'r str> {
        self.0
            .get(field)
            .and_then(|&idx| record.get(idx))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// Copies cell: blank or unparsable means one copy, negatives clamp to zero.
fn parse_copies(value: Option<&str>) -> u32 {
    match value.map(|v| v.parse::<f64>()) {
        Some(Ok(n)) if n.is_finite() => n.max(0.0).min(f64::from(u32::MAX)) as u32,
        _ => 1,
    }
}

fn parse_year(value: Option<&str>) -> Option<i32> {
    value
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|y| y.is_finite())
        .map(|y| y as i32)
}

/// Read catalog rows from a CSV file
///
/// Rows with an empty title are skipped. Unreadable rows are logged and
/// skipped rather than failing the whole import.
pub fn read_books_csv(path: &Path) -> Result<Vec<NewBook>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let columns = ColumnMap::from_headers(reader.headers()?);
    if !columns.0.contains_key("title") {
        tracing::warn!("No title column found in {:?}", path);
    }

    let mut books = Vec::new();
    for (row_num, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Failed to read CSV row {}: {}", row_num + 2, e);
                continue;
            }
        };

        let title = match columns.get(&record, "title") {
            Some(title) => title.to_string(),
            None => continue,
        };

        books.push(NewBook {
            title,
            author: columns.get(&record, "author").map(String::from),
            price: columns
                .get(&record, "price")
                .and_then(|p| p.parse::<f64>().ok()),
            copies: parse_copies(columns.get(&record, "available")),
            genre: columns.get(&record, "genre").map(String::from),
            isbn: columns.get(&record, "isbn").map(String::from),
            publisher: columns.get(&record, "publisher").map(String::from),
            year: parse_year(columns.get(&record, "year")),
            shelf: columns.get(&record, "shelf").map(String::from),
        });
    }

    tracing::info!("Read {} catalog rows from {:?}", books.len(), path);
    Ok(books)
}

/// A row in the loans CSV output
#[derive(Debug, serde::Serialize)]
struct LoanCsvRow<'a> {
    id: u64,
    borrower: &'a str,
    title: &'a str,
    book_id: u64,
    borrowed_at: String,
    due_at: String,
    returned_at: Option<String>,
    fine: u64,
}

impl<'a> From<&'a LoanRecord> for LoanCsvRow<'a> {
    fn from(loan: &'a LoanRecord) -> Self {
        LoanCsvRow {
            id: loan.id,
            borrower: &loan.borrower,
            title: &loan.title,
            book_id: loan.book_id,
            borrowed_at: loan.borrowed_at.to_rfc3339(),
            due_at: loan.due_at.to_rfc3339(),
            returned_at: loan.returned_at.map(|t| t.to_rfc3339()),
            fine: loan.fine,
        }
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Write the catalog to a CSV file, replacing it. Headers use the canonical
/// field names so the file imports back unchanged.
pub fn write_books_csv<'a>(
    path: &Path,
    books: impl IntoIterator<Item = &'a Book>,
) -> Result<usize> {
    ensure_parent_dir(path)?;
    let mut writer = WriterBuilder::new().has_headers(true).from_path(path)?;

    let mut count = 0;
    for book in books {
        writer.serialize(book)?;
        count += 1;
    }

    writer.flush()?;
    tracing::info!("Wrote {} books to {:?}", count, path);
    Ok(count)
}

/// Write loan records to a CSV file, replacing it
pub fn write_loans_csv(path: &Path, loans: &[LoanRecord]) -> Result<usize> {
    ensure_parent_dir(path)?;
    let mut writer = WriterBuilder::new().has_headers(true).from_path(path)?;

    for loan in loans {
        writer.serialize(LoanCsvRow::from(loan))?;
    }

    writer.flush()?;
    tracing::info!("Wrote {} loans to {:?}", loans.len(), path);
    Ok(loans.len())
}
