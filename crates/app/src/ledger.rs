use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};

use tally_core::{Money, Owner, Source, Transaction};

const HEADERS: [&str; 10] = [
    "id",
    "date",
    "amount",
    "category",
    "description",
    "user",
    "source",
    "card",
    "is_shared",
    "created_at",
];

/// Flat-file transaction store. Stands in for the spreadsheet backend the
/// bot writes to: one row per transaction, appended in import order.
pub struct CsvLedger {
    path: PathBuf,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored transactions, empty when the ledger does not exist yet.
    pub fn load(&self) -> Result<Vec<Transaction>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("open ledger {}", self.path.display()))?;

        let mut transactions = Vec::new();
        for record in reader.records() {
            let record = record.context("read ledger row")?;
            transactions.push(parse_row(&record)?);
        }
        Ok(transactions)
    }

    /// The store-side pre-filter: only transactions within the date range are
    /// handed to the duplicate detector.
    pub fn window(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Transaction>> {
        let mut transactions = self.load()?;
        transactions.retain(|t| t.date >= start && t.date <= end);
        Ok(transactions)
    }

    /// Append transactions, writing the header first when creating the file.
    pub fn append(&self, transactions: &[Transaction]) -> Result<()> {
        let fresh = !self.path.exists();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open ledger {}", self.path.display()))?;
        let mut writer = csv::Writer::from_writer(file);

        if fresh {
            writer.write_record(HEADERS)?;
        }
        for tx in transactions {
            writer.write_record([
                tx.id.clone(),
                tx.date.to_string(),
                tx.amount.to_decimal().to_string(),
                tx.category.clone(),
                tx.description.clone(),
                tx.owner.to_string(),
                tx.source.to_string(),
                tx.card.clone(),
                String::from(if tx.shared { "TRUE" } else { "FALSE" }),
                tx.created_at.to_rfc3339(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn parse_row(record: &csv::StringRecord) -> Result<Transaction> {
    let field = |i: usize| record.get(i).unwrap_or_default().trim();
    let date = NaiveDate::parse_from_str(field(1), "%Y-%m-%d")
        .with_context(|| format!("bad ledger date '{}'", field(1)))?;
    let amount =
        Money::parse(field(2)).map_err(|e| anyhow::anyhow!("bad ledger amount: {e}"))?;
    let owner =
        Owner::from_str(field(5)).map_err(|e| anyhow::anyhow!("bad ledger owner: {e}"))?;
    let source = Source::from_str(field(6)).unwrap_or(Source::Manual);
    let created_at = DateTime::parse_from_rfc3339(field(9))
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(Transaction {
        id: field(0).to_string(),
        date,
        amount,
        category: field(3).to_string(),
        description: field(4).to_string(),
        owner,
        source,
        card: field(7).to_string(),
        shared: field(8).eq_ignore_ascii_case("true"),
        created_at,
    })
}
