use serde::Serialize;
use tracing::info;

use tally_core::{Owner, Transaction};

use crate::categorize::CategoryMatcher;
use crate::csv::{parse_csv, CsvError, CsvFormat};
use crate::dedup::{DuplicateDetector, DuplicateHit, DEFAULT_SIMILARITY_THRESHOLD};
use crate::pdf::{parse_pdf, FormatId, PdfError};
use crate::result::{Annotation, ParseResult, RowError};

/// A parsed transaction that matched an already-stored one and was not
/// imported.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedDuplicate {
    pub transaction: Transaction,
    pub existing_id: String,
    pub score: f32,
}

/// Outcome of one pipeline run: the three partitions plus any low-confidence
/// annotations. Counts are always consistent with the parse — nothing is
/// silently dropped between ingest and summary.
#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub format: String,
    pub imported: Vec<Transaction>,
    pub duplicates: Vec<SkippedDuplicate>,
    pub errors: Vec<RowError>,
    pub annotations: Vec<Annotation>,
}

impl ImportSummary {
    pub fn imported_count(&self) -> usize {
        self.imported.len()
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicates.len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

impl std::fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {}, skipped {} duplicates, {} errors ({})",
            self.imported.len(),
            self.duplicates.len(),
            self.errors.len(),
            self.format
        )
    }
}

/// Orchestrates ingest → categorize → dedup → partition for one statement.
/// Stateless between runs; the category registry and the store's existing
/// window are supplied by the caller.
pub struct StatementPipeline<'a> {
    matcher: &'a CategoryMatcher,
    dedup_threshold: f32,
}

impl<'a> StatementPipeline<'a> {
    pub fn new(matcher: &'a CategoryMatcher) -> Self {
        Self { matcher, dedup_threshold: DEFAULT_SIMILARITY_THRESHOLD }
    }

    pub fn with_dedup_threshold(matcher: &'a CategoryMatcher, threshold: f32) -> Self {
        Self { matcher, dedup_threshold: threshold }
    }

    /// Categorize and dedup-check an ingest result against `existing`, the
    /// store's pre-filtered transaction window.
    pub fn run(&self, parsed: ParseResult, existing: &[Transaction]) -> ImportSummary {
        let mut detector = DuplicateDetector::with_threshold(existing, self.dedup_threshold);
        let mut imported = Vec::new();
        let mut duplicates = Vec::new();

        for mut tx in parsed.transactions {
            tx.category = self.matcher.categorize(&tx.description).to_string();
            match detector.check(&tx) {
                Some(DuplicateHit { existing_id, score }) => {
                    duplicates.push(SkippedDuplicate { transaction: tx, existing_id, score });
                }
                None => {
                    detector.insert(&tx);
                    imported.push(tx);
                }
            }
        }

        let summary = ImportSummary {
            format: parsed.format,
            imported,
            duplicates,
            errors: parsed.errors,
            annotations: parsed.annotations,
        };
        info!(
            format = %summary.format,
            imported = summary.imported.len(),
            duplicates = summary.duplicates.len(),
            errors = summary.errors.len(),
            "statement pipeline finished"
        );
        summary
    }

    /// One-shot CSV entrypoint for the surrounding bot/dashboard layer.
    pub fn run_csv(
        &self,
        data: &[u8],
        format: &CsvFormat,
        owner: Owner,
        card: &str,
        existing: &[Transaction],
    ) -> Result<ImportSummary, CsvError> {
        Ok(self.run(parse_csv(data, format, owner, card)?, existing))
    }

    /// One-shot PDF entrypoint for the surrounding bot/dashboard layer.
    pub fn run_pdf(
        &self,
        data: &[u8],
        format: FormatId,
        owner: Owner,
        card: &str,
        existing: &[Transaction],
    ) -> Result<ImportSummary, PdfError> {
        Ok(self.run(parse_pdf(data, format, owner, card)?, existing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv::parse_csv;
    use crate::pdf::parse_text;
    use tally_core::{CategoryRegistry, Money};

    fn matcher() -> CategoryMatcher {
        CategoryMatcher::new(CategoryRegistry::default())
    }

    const STATEMENT: &[u8] = b"Date,Description,Amount\n\
        03/01/2024,WHOLE FOODS MARKET #123,45.20\n\
        03/02/2024,SHELL GAS 57444,30.00\n\
        bad-date,STARBUCKS,5.00\n";

    fn parse_statement() -> ParseResult {
        parse_csv(STATEMENT, &CsvFormat::amex(), Owner::User1, "Test Card").unwrap()
    }

    #[test]
    fn partitions_fresh_statement() {
        let m = matcher();
        let pipeline = StatementPipeline::new(&m);
        let summary = pipeline.run(parse_statement(), &[]);

        assert_eq!(summary.imported_count(), 2);
        assert_eq!(summary.duplicate_count(), 0);
        assert_eq!(summary.error_count(), 1);
        assert_eq!(summary.imported[0].category, "Groceries");
        assert_eq!(summary.imported[1].category, "Transport");
        assert_eq!(summary.imported[0].amount, Money::from_cents(-4520));
    }

    #[test]
    fn second_upload_lands_in_duplicates() {
        let m = matcher();
        let pipeline = StatementPipeline::new(&m);

        let first = pipeline.run(parse_statement(), &[]);
        assert_eq!(first.imported_count(), 2);

        // The store now contains the first run's rows; re-upload the file.
        let second = pipeline.run(parse_statement(), &first.imported);
        assert_eq!(second.imported_count(), 0);
        assert_eq!(second.duplicate_count(), 2);
        let whole_foods = &second.duplicates[0];
        assert_eq!(whole_foods.existing_id, first.imported[0].id);
        assert_eq!(whole_foods.score, 1.0);
    }

    #[test]
    fn same_row_twice_in_one_file_dedupes_within_batch() {
        let data = b"Date,Description,Amount\n\
            03/01/2024,WHOLE FOODS MARKET #123,45.20\n\
            03/01/2024,WHOLE FOODS MARKET #123,45.20\n";
        let parsed = parse_csv(data, &CsvFormat::amex(), Owner::User1, "").unwrap();
        let m = matcher();
        let summary = StatementPipeline::new(&m).run(parsed, &[]);
        assert_eq!(summary.imported_count(), 1);
        assert_eq!(summary.duplicate_count(), 1);
    }

    #[test]
    fn same_row_for_other_user_is_not_a_duplicate() {
        let m = matcher();
        let pipeline = StatementPipeline::new(&m);
        let first = pipeline.run(parse_statement(), &[]);

        let other_user =
            parse_csv(STATEMENT, &CsvFormat::amex(), Owner::User2, "Test Card").unwrap();
        let second = pipeline.run(other_user, &first.imported);
        assert_eq!(second.imported_count(), 2);
        assert_eq!(second.duplicate_count(), 0);
    }

    #[test]
    fn annotations_survive_the_pipeline() {
        let text = "\
SOME REGIONAL BANK
Member FDIC since 03/01/2024

03/02/2024 COSTCO WHOLESALE 120.50
";
        let parsed = parse_text(text, FormatId::Auto, Owner::User1, "").unwrap();
        let m = matcher();
        let summary = StatementPipeline::new(&m).run(parsed, &[]);
        assert_eq!(summary.imported_count(), 1);
        assert_eq!(summary.annotations.len(), 1);
        assert_eq!(summary.annotations[0].transaction_id, summary.imported[0].id);
        assert_eq!(summary.imported[0].category, "Shopping");
    }

    #[test]
    fn display_renders_counts() {
        let m = matcher();
        let summary = StatementPipeline::new(&m).run(parse_statement(), &[]);
        assert_eq!(
            summary.to_string(),
            "Imported 2, skipped 0 duplicates, 1 errors (Amex)"
        );
    }
}
