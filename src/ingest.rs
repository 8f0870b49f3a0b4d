//! CSV ingestion pipeline: a fully-buffered upload is parsed into an ordered
//! header list plus typed documents, ready for one transactional bulk write.
//!
//! The parse is synchronous and complete-before-write: no rows reach the
//! store until the whole file has been read and coerced.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::debug;

use crate::data::{self, Document, Value, IDENTIFIER_FIELD};

/// Parsed upload: the header row verbatim plus one typed document per data row.
#[derive(Debug, Clone)]
pub struct CsvDataset {
    pub columns: Vec<String>,
    pub documents: Vec<Document>,
}

impl CsvDataset {
    pub fn row_count(&self) -> usize {
        self.documents.len()
    }
}

/// Parses an in-memory CSV upload. The first row is captured verbatim as the
/// ordered column list; every data row becomes a [`Document`] with coerced
/// cell values and a guaranteed non-empty `loanNumber` field. Short rows are
/// tolerated; the missing trailing cells are simply absent from the document.
pub fn parse_dataset(bytes: &[u8]) -> Result<CsvDataset> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let columns: Vec<String> = reader
        .headers()
        .context("Reading CSV header row")?
        .iter()
        .map(|h| h.to_string())
        .collect();
    debug!("CSV headers: {columns:?}");

    let mut documents = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Reading CSV data row {}", idx + 1))?;
        let raw: BTreeMap<String, String> = columns
            .iter()
            .zip(record.iter())
            .map(|(name, cell)| (name.clone(), cell.to_string()))
            .collect();
        documents.push(build_document(&raw, &columns));
    }

    Ok(CsvDataset { columns, documents })
}

/// Builds one document from a row of raw cells: every cell is numerically
/// coerced, then the identifier field is filled in (or repaired, when the
/// row's own `loanNumber` cell is empty) with the resolved identifier.
fn build_document(raw: &BTreeMap<String, String>, columns: &[String]) -> Document {
    let mut document: Document = raw
        .iter()
        .map(|(name, cell)| (name.clone(), data::coerce_cell(cell)))
        .collect();

    let identifier_missing = match document.get(IDENTIFIER_FIELD) {
        None => true,
        Some(Value::Text(s)) => s.is_empty(),
        Some(Value::Number(_)) => false,
    };
    if identifier_missing {
        let resolved = data::resolve_loan_number(raw, columns);
        document.insert(IDENTIFIER_FIELD.to_string(), Value::Text(resolved));
    }
    document
}

/// Derives the target collection name and parses the upload. The store write
/// itself happens in [`crate::store::Store::ingest`]; keeping the parse pure
/// lets failures surface before anything touches the database.
pub fn prepare_upload(
    filename: &str,
    bytes: &[u8],
    uploaded_at: DateTime<Utc>,
) -> Result<(String, CsvDataset)> {
    let collection = data::collection_name_for(filename, uploaded_at);
    let dataset =
        parse_dataset(bytes).with_context(|| format!("Parsing CSV upload '{filename}'"))?;
    Ok((collection, dataset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_text<'a>(doc: &'a Document, key: &str) -> &'a str {
        match doc.get(key) {
            Some(Value::Text(s)) => s,
            other => panic!("expected text for '{key}', got {other:?}"),
        }
    }

    #[test]
    fn parse_counts_data_rows_and_keeps_header_order() {
        let csv = "loanNumber,region,amt\nL1,East,100\nL2,West,200\n";
        let dataset = parse_dataset(csv.as_bytes()).unwrap();
        assert_eq!(dataset.columns, ["loanNumber", "region", "amt"]);
        assert_eq!(dataset.row_count(), 2);
        assert_eq!(
            dataset.documents[0].get("amt"),
            Some(&Value::Number(100.0))
        );
        assert_eq!(doc_text(&dataset.documents[1], "region"), "West");
    }

    #[test]
    fn identifier_kept_numeric_when_column_is_numeric() {
        let csv = "loanNumber,region\n123,East\n";
        let dataset = parse_dataset(csv.as_bytes()).unwrap();
        assert_eq!(
            dataset.documents[0].get(IDENTIFIER_FIELD),
            Some(&Value::Number(123.0))
        );
    }

    #[test]
    fn identifier_resolved_from_alias_column() {
        let csv = "region,Loan Number\nEast,L-42\n";
        let dataset = parse_dataset(csv.as_bytes()).unwrap();
        let doc = &dataset.documents[0];
        assert_eq!(doc_text(doc, IDENTIFIER_FIELD), "L-42");
        assert_eq!(doc_text(doc, "Loan Number"), "L-42");
    }

    #[test]
    fn identifier_resolved_from_first_column() {
        let csv = "borrower,region\nAcme,East\n";
        let dataset = parse_dataset(csv.as_bytes()).unwrap();
        assert_eq!(doc_text(&dataset.documents[0], IDENTIFIER_FIELD), "Acme");
    }

    #[test]
    fn identifier_generated_when_every_candidate_is_empty() {
        let csv = "loanNumber,region\n,\n";
        let dataset = parse_dataset(csv.as_bytes()).unwrap();
        let id = doc_text(&dataset.documents[0], IDENTIFIER_FIELD);
        assert!(id.starts_with("LOAN-"), "got '{id}'");
    }

    #[test]
    fn empty_cells_stay_empty_strings() {
        let csv = "loanNumber,note\nL1,\n";
        let dataset = parse_dataset(csv.as_bytes()).unwrap();
        assert_eq!(doc_text(&dataset.documents[0], "note"), "");
    }

    #[test]
    fn header_only_file_yields_zero_documents() {
        let csv = "loanNumber,region,amt\n";
        let dataset = parse_dataset(csv.as_bytes()).unwrap();
        assert_eq!(dataset.columns.len(), 3);
        assert!(dataset.documents.is_empty());
    }

    #[test]
    fn empty_file_yields_no_columns_and_no_rows() {
        let dataset = parse_dataset(b"").unwrap();
        assert!(dataset.columns.is_empty());
        assert!(dataset.documents.is_empty());
    }

    #[test]
    fn short_rows_drop_missing_trailing_cells() {
        let csv = "loanNumber,region,amt\nL1,East\n";
        let dataset = parse_dataset(csv.as_bytes()).unwrap();
        let doc = &dataset.documents[0];
        assert_eq!(doc_text(doc, "region"), "East");
        assert!(doc.get("amt").is_none());
    }

    #[test]
    fn prepare_upload_names_collection_from_filename() {
        let at = Utc::now();
        let (collection, dataset) =
            prepare_upload("west loans.csv", b"loanNumber\nL1\n", at).unwrap();
        assert_eq!(
            collection,
            format!("loans_west_loans_{}", at.timestamp_millis())
        );
        assert_eq!(dataset.row_count(), 1);
    }
}
