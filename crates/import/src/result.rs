use serde::Serialize;

use tally_core::Transaction;

/// Provenance of a failed or flagged input row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowRef {
    /// Zero-based record index in a CSV file (header included in numbering).
    Row(usize),
    /// One-based page number in a PDF document.
    Page(usize),
    /// One-based line within a PDF page.
    Line { page: usize, line: usize },
}

impl std::fmt::Display for RowRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowRef::Row(i) => write!(f, "row {i}"),
            RowRef::Page(p) => write!(f, "page {p}"),
            RowRef::Line { page, line } => write!(f, "page {page} line {line}"),
        }
    }
}

/// A row that could not be normalized. Recoverable: recorded and skipped,
/// never raised past the ingest boundary.
#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    pub at: RowRef,
    pub raw: String,
    pub reason: String,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.at, self.reason, self.raw)
    }
}

/// Low-confidence marker attached to a transaction that was produced by
/// fallback heuristics and may need manual review.
#[derive(Debug, Clone, Serialize)]
pub struct Annotation {
    pub transaction_id: String,
    pub note: String,
}

/// The output of one ingest pass. Every candidate input row ends up either in
/// `transactions` or in `errors`; nothing is silently dropped apart from rows
/// with no date+amount pair (expected statement noise).
#[derive(Debug, Serialize)]
pub struct ParseResult {
    /// Detected or declared source format, e.g. `"Chase"`.
    pub format: String,
    /// In input order.
    pub transactions: Vec<Transaction>,
    pub errors: Vec<RowError>,
    pub annotations: Vec<Annotation>,
}

impl ParseResult {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            transactions: Vec::new(),
            errors: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn push_error(&mut self, at: RowRef, raw: impl Into<String>, reason: impl Into<String>) {
        self.errors.push(RowError {
            at,
            raw: raw.into(),
            reason: reason.into(),
        });
    }
}
