//! Client table view-model: search, per-column filters, sorting, pagination,
//! and row selection over an in-memory snapshot of the active collection.
//!
//! The browser fetches (records, columns) once per refresh signal and every
//! later interaction is a pure recomputation from that snapshot — no network
//! calls. [`visible_rows`] is the whole pipeline as one referentially
//! transparent function so the transformations stay trivially testable.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::data::{Document, Value, IDENTIFIER_FIELD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Exact/substring filter on one column: numeric cells match by parsed
/// equality, text cells by case-insensitive substring.
#[derive(Debug, Clone)]
pub struct ColumnFilter {
    pub column: String,
    pub value: String,
}

/// Everything the table widget derives its visible rows from. Page indexes
/// are zero-based.
#[derive(Debug, Clone)]
pub struct TableQuery {
    pub search: String,
    pub filters: Vec<ColumnFilter>,
    pub sort_column: Option<String>,
    pub direction: SortDirection,
    pub page: usize,
    pub page_size: usize,
}

impl Default for TableQuery {
    fn default() -> Self {
        TableQuery {
            search: String::new(),
            filters: Vec::new(),
            sort_column: Some(IDENTIFIER_FIELD.to_string()),
            direction: SortDirection::Ascending,
            page: 0,
            page_size: 10,
        }
    }
}

/// The full pipeline: identifier gate → search → filters → sort → paginate.
pub fn visible_rows<'a>(
    records: &'a [Document],
    columns: &[String],
    query: &TableQuery,
) -> Vec<&'a Document> {
    let mut rows: Vec<&Document> = records
        .iter()
        .filter(|doc| identifier_of(doc).is_some())
        .filter(|doc| search_matches(doc, columns, &query.search))
        .filter(|doc| query.filters.iter().all(|f| filter_matches(doc, f)))
        .collect();

    if let Some(key) = &query.sort_column {
        rows.sort_by(|a, b| compare_rows(a, b, key, query.direction));
    }

    paginate(rows, query.page, query.page_size)
}

/// Identifier shown for a row, or `None` when the row lacks a usable one.
/// Rows without an identifier are excluded from every view unconditionally.
pub fn identifier_of(doc: &Document) -> Option<String> {
    let display = doc.get(IDENTIFIER_FIELD)?.as_display();
    if display.is_empty() || display == "-" {
        return None;
    }
    Some(display)
}

fn search_matches(doc: &Document, columns: &[String], term: &str) -> bool {
    if term.is_empty() {
        return true;
    }
    let needle = term.to_lowercase();
    columns.iter().any(|column| {
        doc.get(column)
            .is_some_and(|v| v.as_display().to_lowercase().contains(&needle))
    })
}

fn filter_matches(doc: &Document, filter: &ColumnFilter) -> bool {
    match doc.get(&filter.column) {
        None => false,
        Some(Value::Number(n)) => filter.value.parse::<f64>().map_or(false, |v| v == *n),
        Some(Value::Text(s)) => s
            .to_lowercase()
            .contains(&filter.value.to_lowercase()),
    }
}

/// Rows missing the sort key go last ascending / first descending, so they
/// trail the defined rows whichever way the column is sorted.
fn compare_rows(a: &Document, b: &Document, key: &str, direction: SortDirection) -> Ordering {
    match (a.get(key), b.get(key)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => match direction {
            SortDirection::Ascending => Ordering::Greater,
            SortDirection::Descending => Ordering::Less,
        },
        (Some(_), None) => match direction {
            SortDirection::Ascending => Ordering::Less,
            SortDirection::Descending => Ordering::Greater,
        },
        (Some(left), Some(right)) => {
            let ordering = compare_values(left, right);
            match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        }
    }
}

fn compare_values(left: &Value, right: &Value) -> Ordering {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return a.total_cmp(&b);
    }
    let (a, b) = (left.as_display(), right.as_display());
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(&b))
}

fn paginate<T>(rows: Vec<T>, page: usize, page_size: usize) -> Vec<T> {
    if page_size == 0 {
        return rows;
    }
    rows.into_iter()
        .skip(page.saturating_mul(page_size))
        .take(page_size)
        .collect()
}

/// Multi-selection keyed by row identifier.
#[derive(Debug, Default)]
pub struct Selection {
    ids: BTreeSet<String>,
}

impl Selection {
    pub fn toggle(&mut self, id: &str) {
        if !self.ids.remove(id) {
            self.ids.insert(id.to_string());
        }
    }

    pub fn select_all<'a>(&mut self, rows: impl IntoIterator<Item = &'a Document>) {
        for doc in rows {
            if let Some(id) = identifier_of(doc) {
                self.ids.insert(id);
            }
        }
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Snapshot plus interaction state, mirroring what the table widget holds.
#[derive(Debug, Default)]
pub struct TableView {
    records: Vec<Document>,
    columns: Vec<String>,
    pub query: TableQuery,
    pub selection: Selection,
}

impl TableView {
    /// Replaces the snapshot after a refetch. Selection always resets with
    /// the snapshot; the query (search, filters, sort, page) is kept.
    pub fn refresh(&mut self, records: Vec<Document>, columns: Vec<String>) {
        self.records = records;
        self.columns = columns;
        self.selection.clear();
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> Vec<&Document> {
        visible_rows(&self.records, &self.columns, &self.query)
    }
}
