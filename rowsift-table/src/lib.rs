//! The in-memory table model: named string columns loaded from CSV
//! bytes, preserving source row and column order.
//!
//! Decoding tries a fixed ordered list of encodings (UTF-8 strict,
//! then two common legacy single-byte encodings); the first one that
//! both decodes and parses wins. Exhausting the list is a typed
//! `InvalidFormat` error, never a silent lossy fallback.

use encoding_rs::Encoding;
use rowsift_types::PreviewRecord;
use thiserror::Error;

/// Errors that can occur when loading or serializing a table.
#[derive(Debug, Error)]
pub enum TableError {
    /// No supported encoding yielded a parseable CSV.
    #[error("unable to read CSV data: {0}")]
    InvalidFormat(String),
    /// Well-formed but header-only: nothing to filter.
    #[error("CSV contains a header row but no data rows")]
    EmptyData,
    /// Column names must be unique.
    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),
    /// Serialization failure on the way out.
    #[error("failed to write CSV: {0}")]
    Write(String),
}

/// Legacy encodings tried after strict UTF-8, in order.
const FALLBACK_ENCODINGS: [&Encoding; 2] =
    [encoding_rs::WINDOWS_1252, encoding_rs::ISO_8859_15];

/// An ordered collection of named columns and rows. Cells are plain
/// strings; the CSV source carries no type information.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Parse CSV bytes into a table, trying encodings in order.
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self, TableError> {
        let mut last_err = String::from("empty input");

        if let Ok(text) = std::str::from_utf8(bytes) {
            match Self::from_csv_text(text) {
                Ok(table) => return Ok(table),
                Err(e @ (TableError::EmptyData | TableError::DuplicateColumn(_))) => {
                    return Err(e)
                }
                Err(e) => last_err = e.to_string(),
            }
        }

        for enc in FALLBACK_ENCODINGS {
            let (text, _, had_errors) = enc.decode(bytes);
            if had_errors {
                continue;
            }
            match Self::from_csv_text(&text) {
                Ok(table) => return Ok(table),
                Err(e @ (TableError::EmptyData | TableError::DuplicateColumn(_))) => {
                    return Err(e)
                }
                Err(e) => last_err = e.to_string(),
            }
        }

        Err(TableError::InvalidFormat(last_err))
    }

    /// Parse already-decoded CSV text.
    pub fn from_csv_text(text: &str) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(false)
            .from_reader(text.as_bytes());

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| TableError::InvalidFormat(e.to_string()))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        if columns.is_empty() {
            return Err(TableError::InvalidFormat("no header row".into()));
        }
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].iter().any(|other| other == name) {
                return Err(TableError::DuplicateColumn(name.clone()));
            }
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| TableError::InvalidFormat(e.to_string()))?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }

        if rows.is_empty() {
            return Err(TableError::EmptyData);
        }

        Ok(Self { columns, rows })
    }

    /// Build a table directly from parts. Used by the filter engine to
    /// assemble its output; the header invariants are the caller's.
    pub fn from_parts(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Index of a named column, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// First `n` rows as ordered field->value records.
    pub fn preview(&self, n: usize) -> Vec<PreviewRecord> {
        self.rows
            .iter()
            .take(n)
            .map(|row| {
                let mut record = PreviewRecord::new();
                for (col, cell) in self.columns.iter().zip(row.iter()) {
                    record.insert(col.clone(), serde_json::Value::String(cell.clone()));
                }
                record
            })
            .collect()
    }

    /// Column-aligned rendering of the first `n` rows, the shape the
    /// code generator puts in the user message so the model can see
    /// real column names and representative values.
    pub fn render_sample(&self, n: usize) -> String {
        let shown: Vec<&Vec<String>> = self.rows.iter().take(n).collect();
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &shown {
            for (i, cell) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) {
                    *w = (*w).max(cell.chars().count());
                }
            }
        }

        let mut out = String::new();
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                out.push_str("  ");
            }
            out.push_str(&format!("{:width$}", col, width = widths[i]));
        }
        out.push('\n');
        for row in shown {
            for (i, cell) in row.iter().enumerate() {
                if i > 0 {
                    out.push_str("  ");
                }
                out.push_str(&format!("{:width$}", cell, width = widths[i]));
            }
            out.push('\n');
        }
        out
    }

    /// Serialize to CSV bytes, headers first, source column order.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, TableError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.columns)
            .map_err(|e| TableError::Write(e.to_string()))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|e| TableError::Write(e.to_string()))?;
        }
        writer
            .into_inner()
            .map_err(|e| TableError::Write(e.to_string()))
    }
}
