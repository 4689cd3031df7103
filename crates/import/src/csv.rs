use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use tally_core::{Money, Owner, SignConvention, Source, Transaction};

use crate::result::{ParseResult, RowRef};

/// Column-to-field mapping for one CSV export layout. Either `amount_column`
/// or the `debit_column`/`credit_column` pair must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvFormat {
    pub name: String,
    pub date_column: usize,
    pub description_column: usize,
    pub amount_column: Option<usize>,
    pub debit_column: Option<usize>,
    pub credit_column: Option<usize>,
    pub delimiter: String,
    pub date_format: String,
    pub sign: SignConvention,
}

impl CsvFormat {
    /// Chase credit card export: purchases negative, payments positive.
    /// `Transaction Date, Post Date, Description, Category, Type, Amount, Memo`
    pub fn chase() -> Self {
        Self {
            name: "Chase".to_string(),
            date_column: 0,
            description_column: 2,
            amount_column: Some(5),
            debit_column: None,
            credit_column: None,
            delimiter: ",".to_string(),
            date_format: "%m/%d/%Y".to_string(),
            sign: SignConvention::DebitsNegative,
        }
    }

    /// Amex export: purchases positive. `Date, Description, Amount`
    pub fn amex() -> Self {
        Self {
            name: "Amex".to_string(),
            date_column: 0,
            description_column: 1,
            amount_column: Some(2),
            debit_column: None,
            credit_column: None,
            delimiter: ",".to_string(),
            date_format: "%m/%d/%Y".to_string(),
            sign: SignConvention::ChargesPositive,
        }
    }

    /// Discover export: purchases positive.
    /// `Trans. Date, Post Date, Description, Amount, Category`
    pub fn discover() -> Self {
        Self {
            name: "Discover".to_string(),
            date_column: 0,
            description_column: 2,
            amount_column: Some(3),
            debit_column: None,
            credit_column: None,
            delimiter: ",".to_string(),
            date_format: "%m/%d/%Y".to_string(),
            sign: SignConvention::ChargesPositive,
        }
    }

    /// Capital One export: split Debit/Credit columns, ISO dates.
    /// `Transaction Date, Posted Date, Card No., Description, Category, Debit, Credit`
    pub fn capital_one() -> Self {
        Self {
            name: "Capital One".to_string(),
            date_column: 0,
            description_column: 3,
            amount_column: None,
            debit_column: Some(5),
            credit_column: Some(6),
            delimiter: ",".to_string(),
            date_format: "%Y-%m-%d".to_string(),
            sign: SignConvention::SplitColumns,
        }
    }

    /// Look up a built-in format by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name.to_lowercase().replace([' ', '-', '_'], "").as_str() {
            "chase" => Some(Self::chase()),
            "amex" => Some(Self::amex()),
            "discover" => Some(Self::discover()),
            "capitalone" => Some(Self::capital_one()),
            _ => None,
        }
    }

    /// Load a user-defined format descriptor from TOML.
    pub fn from_toml(content: &str) -> Result<Self, CsvError> {
        let format: CsvFormat = toml::from_str(content)?;
        format.validate()?;
        Ok(format)
    }

    fn validate(&self) -> Result<(), CsvError> {
        if self.amount_column.is_none()
            && (self.debit_column.is_none() || self.credit_column.is_none())
        {
            return Err(CsvError::BadFormat(self.name.clone()));
        }
        Ok(())
    }

    fn delimiter_byte(&self) -> u8 {
        self.delimiter.as_bytes().first().copied().unwrap_or(b',')
    }
}

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid format descriptor: {0}")]
    Descriptor(#[from] toml::de::Error),
    #[error("format '{0}' has neither an amount column nor a debit/credit pair")]
    BadFormat(String),
    #[error("no data rows")]
    Empty,
}

/// Detect a built-in issuer format from a header row by column signature.
/// Precedence mirrors the column overlap between issuers: Capital One before
/// Chase (both carry `Transaction Date`), Discover before Amex.
pub fn detect_format<S: AsRef<str>>(headers: &[S]) -> Option<CsvFormat> {
    let cols: Vec<String> = headers
        .iter()
        .map(|h| h.as_ref().trim().to_lowercase())
        .collect();
    let col = |name: &str| cols.iter().position(|c| c == name);

    if let (Some(date), Some(desc), Some(debit), Some(credit)) = (
        col("transaction date"),
        col("description"),
        col("debit"),
        col("credit"),
    ) {
        return Some(CsvFormat {
            date_column: date,
            description_column: desc,
            debit_column: Some(debit),
            credit_column: Some(credit),
            ..CsvFormat::capital_one()
        });
    }

    if let (Some(date), Some(_), Some(desc), Some(amount)) = (
        col("transaction date"),
        col("post date"),
        col("description"),
        col("amount"),
    ) {
        return Some(CsvFormat {
            date_column: date,
            description_column: desc,
            amount_column: Some(amount),
            ..CsvFormat::chase()
        });
    }

    if let (Some(date), Some(desc), Some(amount)) =
        (col("trans. date"), col("description"), col("amount"))
    {
        return Some(CsvFormat {
            date_column: date,
            description_column: desc,
            amount_column: Some(amount),
            ..CsvFormat::discover()
        });
    }

    if let (Some(date), Some(desc), Some(amount)) =
        (col("date"), col("description"), col("amount"))
    {
        return Some(CsvFormat {
            date_column: date,
            description_column: desc,
            amount_column: Some(amount),
            ..CsvFormat::amex()
        });
    }

    None
}

/// Detect a built-in format from raw bytes by sniffing the first record.
pub fn sniff(data: &[u8]) -> Option<CsvFormat> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);
    let record = reader.records().next()?.ok()?;
    let headers: Vec<&str> = record.iter().collect();
    detect_format(&headers)
}

/// Parse delimited statement bytes into a [`ParseResult`].
///
/// The first record is treated as a header only when every tested column
/// (date + amount or debit/credit) fails to parse as its declared type, so
/// headerless exports keep their first row. Each data row parses
/// independently; a bad field becomes a row error and parsing continues.
pub fn parse_csv(
    data: &[u8],
    format: &CsvFormat,
    owner: Owner,
    card: &str,
) -> Result<ParseResult, CsvError> {
    format.validate()?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(format.delimiter_byte())
        .from_reader(data);

    let mut result = ParseResult::new(format.name.clone());
    let mut saw_data_row = false;

    for (index, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                result.push_error(RowRef::Row(index), "", format!("unreadable record: {e}"));
                continue;
            }
        };

        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        if index == 0 && looks_like_header(&record, format) {
            debug!(format = %format.name, "first row detected as header");
            continue;
        }
        saw_data_row = true;

        let raw = record.iter().collect::<Vec<_>>().join(&format.delimiter);

        let date_field = record.get(format.date_column).unwrap_or_default();
        let date = match parse_date(date_field, &format.date_format) {
            Some(d) => d,
            None => {
                result.push_error(
                    RowRef::Row(index),
                    raw,
                    format!("invalid date '{date_field}'"),
                );
                continue;
            }
        };

        let amount = match row_amount(&record, format) {
            Ok(a) => a,
            Err(reason) => {
                result.push_error(RowRef::Row(index), raw, reason);
                continue;
            }
        };

        let description = record
            .get(format.description_column)
            .unwrap_or_default()
            .trim()
            .to_string();

        result.transactions.push(Transaction::new(
            date,
            amount,
            description,
            owner,
            Source::Csv,
            card,
        ));
    }

    if !saw_data_row {
        return Err(CsvError::Empty);
    }

    info!(
        format = %format.name,
        transactions = result.transactions.len(),
        errors = result.errors.len(),
        "parsed CSV statement"
    );
    Ok(result)
}

/// Normalized signed amount for one record, per the format's convention.
fn row_amount(record: &csv::StringRecord, format: &CsvFormat) -> Result<Money, String> {
    if let Some(col) = format.amount_column {
        let field = record.get(col).unwrap_or_default();
        let raw = Money::parse(field).map_err(|_| format!("invalid amount '{field}'"))?;
        return Ok(format.sign.normalize(raw));
    }

    // Split debit/credit pair — validated to exist by this point.
    let cell = |col: Option<usize>| -> Result<Option<Money>, String> {
        let field = col.and_then(|c| record.get(c)).unwrap_or_default();
        if field.trim().is_empty() {
            return Ok(None);
        }
        Money::parse(field)
            .map(Some)
            .map_err(|_| format!("invalid amount '{field}'"))
    };
    let debit = cell(format.debit_column)?;
    let credit = cell(format.credit_column)?;
    SignConvention::combine(debit, credit).ok_or_else(|| "no debit or credit value".to_string())
}

fn parse_date(s: &str, format: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, format) {
        return Some(date);
    }
    // Common fallbacks across bank exports.
    for fmt in &[
        "%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%d/%m/%Y", "%Y/%m/%d", "%m-%d-%Y",
    ] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }
    None
}

/// A first row is a header when all tested columns fail to parse as their
/// declared types.
fn looks_like_header(record: &csv::StringRecord, format: &CsvFormat) -> bool {
    let date_ok = record
        .get(format.date_column)
        .and_then(|f| parse_date(f, &format.date_format))
        .is_some();

    let amount_cols: Vec<usize> = format
        .amount_column
        .into_iter()
        .chain(format.debit_column)
        .chain(format.credit_column)
        .collect();
    let amount_ok = amount_cols.iter().any(|&col| {
        record
            .get(col)
            .map(|f| !f.trim().is_empty() && Money::parse(f).is_ok())
            .unwrap_or(false)
    });

    !date_ok && !amount_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::Owner;

    fn parse(data: &[u8], format: &CsvFormat) -> ParseResult {
        parse_csv(data, format, Owner::User1, "Test Card").unwrap()
    }

    // ── header detection ──────────────────────────────────────────────────────

    #[test]
    fn header_row_is_skipped() {
        let data = b"Date,Description,Amount\n03/01/2024,WHOLE FOODS,45.20\n";
        let result = parse(data, &CsvFormat::amex());
        assert_eq!(result.transactions.len(), 1);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn headerless_export_keeps_first_row() {
        let data = b"03/01/2024,WHOLE FOODS,45.20\n03/02/2024,STARBUCKS,5.00\n";
        let result = parse(data, &CsvFormat::amex());
        assert_eq!(result.transactions.len(), 2);
    }

    // ── row independence & accounting ─────────────────────────────────────────

    #[test]
    fn bad_rows_become_errors_and_parsing_continues() {
        let data = b"Date,Description,Amount\n\
            03/01/2024,WHOLE FOODS,45.20\n\
            not-a-date,STARBUCKS,5.00\n\
            03/03/2024,CHIPOTLE,abc\n\
            03/04/2024,SHELL,30.00\n";
        let result = parse(data, &CsvFormat::amex());
        assert_eq!(result.transactions.len(), 2);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].reason.contains("invalid date"));
        assert!(result.errors[1].reason.contains("invalid amount"));
        // Errors reference the failing file row and carry its raw content.
        assert_eq!(result.errors[0].at, RowRef::Row(2));
        assert!(result.errors[0].raw.contains("STARBUCKS"));
    }

    #[test]
    fn transaction_plus_error_count_equals_data_rows() {
        let data = b"Date,Description,Amount\n\
            03/01/2024,A,1.00\n\
            bad,B,2.00\n\
            03/03/2024,C,xx\n";
        let result = parse(data, &CsvFormat::amex());
        assert_eq!(result.transactions.len() + result.errors.len(), 3);
    }

    #[test]
    fn output_order_matches_input_order() {
        let data = b"03/05/2024,LATER,1.00\n03/01/2024,EARLIER,2.00\n";
        let result = parse(data, &CsvFormat::amex());
        assert_eq!(result.transactions[0].description, "LATER");
        assert_eq!(result.transactions[1].description, "EARLIER");
    }

    #[test]
    fn empty_input_errors() {
        assert!(matches!(
            parse_csv(b"", &CsvFormat::amex(), Owner::User1, ""),
            Err(CsvError::Empty)
        ));
        assert!(matches!(
            parse_csv(
                b"Date,Description,Amount\n",
                &CsvFormat::amex(),
                Owner::User1,
                ""
            ),
            Err(CsvError::Empty)
        ));
    }

    // ── sign conventions ──────────────────────────────────────────────────────

    #[test]
    fn chase_keeps_negative_purchases() {
        let data = b"Transaction Date,Post Date,Description,Category,Type,Amount,Memo\n\
            01/15/2024,01/16/2024,WHOLE FOODS MARKET,Groceries,Sale,-45.67,\n\
            01/20/2024,01/21/2024,AUTOMATIC PAYMENT,,Payment,500.00,\n";
        let result = parse(data, &CsvFormat::chase());
        assert_eq!(result.transactions[0].amount, Money::from_cents(-4567));
        assert_eq!(result.transactions[1].amount, Money::from_cents(50000));
    }

    #[test]
    fn amex_flips_positive_purchases() {
        let data = b"Date,Description,Amount\n01/15/2024,WHOLE FOODS MARKET,45.67\n";
        let result = parse(data, &CsvFormat::amex());
        assert_eq!(result.transactions[0].amount, Money::from_cents(-4567));
    }

    #[test]
    fn capital_one_split_columns() {
        let data =
            b"Transaction Date,Posted Date,Card No.,Description,Category,Debit,Credit\n\
            2024-01-15,2024-01-16,1234,WHOLE FOODS MARKET,Groceries,45.67,\n\
            2024-01-20,2024-01-21,1234,PAYMENT RECEIVED,,,500.00\n\
            2024-01-22,2024-01-23,1234,MYSTERY ROW,,,\n";
        let result = parse(data, &CsvFormat::capital_one());
        assert_eq!(result.transactions.len(), 2);
        assert_eq!(result.transactions[0].amount, Money::from_cents(-4567));
        assert_eq!(result.transactions[1].amount, Money::from_cents(50000));
        // Neither debit nor credit → row error, not a silent drop.
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].reason.contains("no debit or credit"));
    }

    #[test]
    fn whole_foods_scenario() {
        // Debits-negative convention: the raw sign is already internal.
        let format = CsvFormat {
            name: "Generic".to_string(),
            date_column: 0,
            description_column: 2,
            amount_column: Some(1),
            debit_column: None,
            credit_column: None,
            delimiter: ",".to_string(),
            date_format: "%Y-%m-%d".to_string(),
            sign: SignConvention::DebitsNegative,
        };
        let data = b"2024-03-01,-45.20,WHOLE FOODS MARKET #123\n";
        let result = parse(data, &format);
        let tx = &result.transactions[0];
        assert_eq!(tx.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(tx.amount, Money::from_cents(-4520));
        assert_eq!(tx.description, "WHOLE FOODS MARKET #123");
    }

    // ── detection ─────────────────────────────────────────────────────────────

    #[test]
    fn detect_capital_one_before_chase() {
        let headers = [
            "Transaction Date",
            "Posted Date",
            "Card No.",
            "Description",
            "Category",
            "Debit",
            "Credit",
        ];
        assert_eq!(detect_format(&headers).unwrap().name, "Capital One");
    }

    #[test]
    fn detect_chase_discover_amex() {
        let chase = [
            "Transaction Date",
            "Post Date",
            "Description",
            "Category",
            "Type",
            "Amount",
            "Memo",
        ];
        assert_eq!(detect_format(&chase).unwrap().name, "Chase");

        let discover = ["Trans. Date", "Post Date", "Description", "Amount", "Category"];
        assert_eq!(detect_format(&discover).unwrap().name, "Discover");

        let amex = ["Date", "Description", "Amount"];
        assert_eq!(detect_format(&amex).unwrap().name, "Amex");

        assert!(detect_format(&["Foo", "Bar"]).is_none());
    }

    #[test]
    fn detect_resolves_shuffled_columns() {
        let headers = ["Amount", "Date", "Description"];
        let format = detect_format(&headers).unwrap();
        assert_eq!(format.amount_column, Some(0));
        assert_eq!(format.date_column, 1);
        assert_eq!(format.description_column, 2);
    }

    #[test]
    fn sniff_from_bytes() {
        let data = b"Date,Description,Amount\n01/15/2024,X,1.00\n";
        assert_eq!(sniff(data).unwrap().name, "Amex");
        assert!(sniff(b"what,ever\n").is_none());
    }

    // ── descriptors ───────────────────────────────────────────────────────────

    #[test]
    fn format_from_toml() {
        let doc = r#"
name = "Credit Union"
date_column = 1
description_column = 0
amount_column = 3
delimiter = ";"
date_format = "%d/%m/%Y"
sign = "charges_positive"
"#;
        let format = CsvFormat::from_toml(doc).unwrap();
        assert_eq!(format.name, "Credit Union");
        assert_eq!(format.delimiter_byte(), b';');
        assert_eq!(format.sign, SignConvention::ChargesPositive);
    }

    #[test]
    fn format_without_amount_columns_rejected() {
        let doc = r#"
name = "Broken"
date_column = 0
description_column = 1
delimiter = ","
date_format = "%Y-%m-%d"
sign = "debits_negative"
"#;
        assert!(matches!(
            CsvFormat::from_toml(doc),
            Err(CsvError::BadFormat(_))
        ));
    }
}
