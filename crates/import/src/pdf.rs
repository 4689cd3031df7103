use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

use tally_core::{Money, Owner, Source, Transaction};

use crate::result::{Annotation, ParseResult, RowRef};

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// Full transaction line: date, description, amount at end of line.
re!(re_txn_line,
    r"^(?P<date>\d{1,2}/\d{1,2}(?:/\d{2,4})?)\s+(?P<desc>.+?)\s+(?P<sign>-)?\s*\$?(?P<amt>[\d,]+\.\d{2})\s*$");
re!(re_date_lead, r"^\d{1,2}/\d{1,2}(?:/\d{2,4})?\b");
re!(re_amount_tail, r"(?:-\s*)?\$?[\d,]+\.\d{2}\s*$");
re!(re_year_full, r"\b\d{1,2}/\d{1,2}/(\d{4})\b");
re!(re_month_year,
    r"(?i)\b(?:january|february|march|april|may|june|july|august|september|october|november|december)\s+(\d{4})\b");

/// Rows whose description marks a payment/credit rather than a purchase.
const PAYMENT_KEYWORDS: &[&str] = &[
    "payment",
    "thank you",
    "credit",
    "autopay",
    "refund",
    "adjustment",
    "late fee reversal",
    "returned",
];

/// Wrapped descriptions are merged from at most this many follow-on lines.
const MAX_CONTINUATION_LINES: u8 = 2;

// ── Format registry ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatId {
    /// Detect the issuer from first-page text signatures.
    Auto,
    Chase,
    Amex,
    Discover,
    CapitalOne,
    /// Best-effort extraction for unrecognized layouts. Output is flagged
    /// low-confidence.
    Generic,
}

impl std::fmt::Display for FormatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FormatId::Auto => "auto",
            FormatId::Chase => "chase",
            FormatId::Amex => "amex",
            FormatId::Discover => "discover",
            FormatId::CapitalOne => "capital-one",
            FormatId::Generic => "generic",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for FormatId {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace([' ', '-', '_'], "").as_str() {
            "auto" => Ok(FormatId::Auto),
            "chase" => Ok(FormatId::Chase),
            "amex" => Ok(FormatId::Amex),
            "discover" => Ok(FormatId::Discover),
            "capitalone" => Ok(FormatId::CapitalOne),
            "generic" => Ok(FormatId::Generic),
            other => Err(format!("Unknown PDF format: '{other}'")),
        }
    }
}

/// One registered issuer layout: a text-signature predicate plus the parsing
/// behavior that differs per issuer. The registry is ordered; the generic
/// catch-all is always last.
pub struct IssuerFormat {
    pub id: FormatId,
    pub name: &'static str,
    matches: fn(&str) -> bool,
    joins_continuations: bool,
}

fn registry() -> &'static [IssuerFormat] {
    static REGISTRY: &[IssuerFormat] = &[
        IssuerFormat {
            id: FormatId::Chase,
            name: "Chase",
            matches: |t| t.contains("jpmorgan chase") || t.contains("chase.com"),
            joins_continuations: true,
        },
        IssuerFormat {
            id: FormatId::Amex,
            name: "Amex",
            matches: |t| t.contains("american express") || t.contains("amex"),
            joins_continuations: true,
        },
        IssuerFormat {
            id: FormatId::Discover,
            name: "Discover",
            matches: |t| {
                t.contains("discover")
                    && (t.contains("discover.com")
                        || t.contains("discover bank")
                        || t.contains("discover financial")
                        || t.contains("cashback"))
            },
            joins_continuations: true,
        },
        IssuerFormat {
            id: FormatId::CapitalOne,
            name: "Capital One",
            matches: |t| t.contains("capital one"),
            joins_continuations: true,
        },
        IssuerFormat {
            id: FormatId::Generic,
            name: "Generic",
            matches: |_| true,
            joins_continuations: false,
        },
    ];
    REGISTRY
}

fn generic() -> &'static IssuerFormat {
    &registry()[registry().len() - 1]
}

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("could not read PDF: {0}")]
    Unreadable(String),
    #[error("no extractable text in document (may be image-based)")]
    NoText,
    #[error("unrecognized statement format: no registered issuer matched and generic extraction found no transactions")]
    UnknownFormat,
}

// ── Entry points ─────────────────────────────────────────────────────────────

/// Parse a PDF statement into a [`ParseResult`].
///
/// With [`FormatId::Auto`] the issuer is detected from first-page text in
/// registry order; an unrecognized layout falls back to generic extraction
/// and flags every produced transaction low-confidence. Only a document with
/// no usable text at all, or an auto-detect run where even the fallback finds
/// nothing, is a document-level error.
pub fn parse_pdf(
    data: &[u8],
    format: FormatId,
    owner: Owner,
    card: &str,
) -> Result<ParseResult, PdfError> {
    let text = pdf_extract::extract_text_from_mem(data)
        .map_err(|e| PdfError::Unreadable(e.to_string()))?;
    parse_text(&text, format, owner, card)
}

/// Parse already-extracted statement text. Pages are separated by form feeds
/// as emitted by the text extractor; text without form feeds is one page.
pub fn parse_text(
    text: &str,
    format: FormatId,
    owner: Owner,
    card: &str,
) -> Result<ParseResult, PdfError> {
    let mut pages: Vec<&str> = text.split('\u{0c}').collect();
    // A trailing form feed leaves an empty chunk that is not a real page.
    while pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }

    let first_page = pages
        .iter()
        .find(|p| !p.trim().is_empty())
        .ok_or(PdfError::NoText)?;

    let lower = first_page.to_lowercase();
    let (issuer, auto_fallback) = match format {
        FormatId::Auto => {
            let known = registry().len() - 1;
            match registry()[..known].iter().find(|f| (f.matches)(&lower)) {
                Some(f) => (f, false),
                None => (generic(), true),
            }
        }
        id => (
            registry().iter().find(|f| f.id == id).unwrap_or(generic()),
            false,
        ),
    };
    debug!(issuer = issuer.name, pages = pages.len(), "parsing statement");

    let statement_year = scrape_year(text);
    let mut result = ParseResult::new(issuer.name);

    for (page_no, page) in pages.iter().enumerate() {
        let page_no = page_no + 1;
        if page.trim().is_empty() {
            result.push_error(RowRef::Page(page_no), "", "no extractable text");
            continue;
        }
        parse_page(page, page_no, issuer, statement_year, owner, card, &mut result);
    }

    if issuer.id == FormatId::Generic {
        for tx in &result.transactions {
            result.annotations.push(Annotation {
                transaction_id: tx.id.clone(),
                note: "low-confidence: extracted by generic fallback".to_string(),
            });
        }
    }

    if auto_fallback && result.transactions.is_empty() {
        return Err(PdfError::UnknownFormat);
    }

    info!(
        issuer = issuer.name,
        transactions = result.transactions.len(),
        errors = result.errors.len(),
        "parsed PDF statement"
    );
    Ok(result)
}

// ── Page parsing ─────────────────────────────────────────────────────────────

fn parse_page(
    page: &str,
    page_no: usize,
    issuer: &IssuerFormat,
    statement_year: Option<i32>,
    owner: Owner,
    card: &str,
    result: &mut ParseResult,
) {
    // Index of the transaction a wrapped description may continue into.
    let mut open_txn: Option<usize> = None;
    let mut joined: u8 = 0;

    for (line_no, line) in page.lines().enumerate() {
        let line_no = line_no + 1;
        let line = line.trim();
        if line.is_empty() {
            open_txn = None;
            continue;
        }

        if let Some(cap) = re_txn_line().captures(line) {
            let date_str = &cap["date"];
            let Some(date) = parse_statement_date(date_str, statement_year) else {
                result.push_error(
                    RowRef::Line { page: page_no, line: line_no },
                    line,
                    format!("invalid date '{date_str}'"),
                );
                open_txn = None;
                continue;
            };
            let amt_str = &cap["amt"];
            let Ok(raw) = Money::parse(amt_str) else {
                result.push_error(
                    RowRef::Line { page: page_no, line: line_no },
                    line,
                    format!("invalid amount '{amt_str}'"),
                );
                open_txn = None;
                continue;
            };

            let description = cap["desc"].trim().to_string();
            let credit = cap.name("sign").is_some() || is_payment(&description);
            let amount = if credit { raw.abs() } else { -raw.abs() };

            result.transactions.push(Transaction::new(
                date,
                amount,
                description,
                owner,
                Source::Statement,
                card,
            ));
            open_txn = Some(result.transactions.len() - 1);
            joined = 0;
        } else if issuer.joins_continuations
            && joined < MAX_CONTINUATION_LINES
            && !re_date_lead().is_match(line)
            && !re_amount_tail().is_match(line)
        {
            // A line with neither a date nor an amount directly below a
            // transaction is a wrapped description.
            if let Some(idx) = open_txn {
                let tx = &mut result.transactions[idx];
                tx.description.push(' ');
                tx.description.push_str(line);
                joined += 1;
            }
        } else {
            // Fee summaries, interest tables, page furniture: candidate rows
            // without a date+amount pair are expected noise, not errors.
            open_txn = None;
        }
    }
}

fn is_payment(description: &str) -> bool {
    let lower = description.to_lowercase();
    PAYMENT_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Statement dates come as `MM/DD/YYYY`, `MM/DD/YY`, or bare `MM/DD` — the
/// latter resolved against the year scraped from the document, falling back
/// to the current year.
fn parse_statement_date(s: &str, statement_year: Option<i32>) -> Option<NaiveDate> {
    let s = s.trim();
    for fmt in &["%m/%d/%Y", "%m/%d/%y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }
    let parts: Vec<&str> = s.split('/').collect();
    if parts.len() == 2 {
        let month: u32 = parts[0].parse().ok()?;
        let day: u32 = parts[1].parse().ok()?;
        let year = statement_year.unwrap_or_else(|| Utc::now().year());
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    None
}

/// Find the statement year: any fully-qualified date, else `MonthName YYYY`.
fn scrape_year(text: &str) -> Option<i32> {
    if let Some(cap) = re_year_full().captures(text) {
        return cap[1].parse().ok();
    }
    if let Some(cap) = re_month_year().captures(text) {
        return cap[1].parse().ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tally_core::Money;

    fn parse(text: &str, format: FormatId) -> ParseResult {
        parse_text(text, format, Owner::User1, "Test Card").unwrap()
    }

    const CHASE_PAGE: &str = "\
JPMorgan Chase Bank, N.A.
Statement Date: 01/25/2024
Account ending in 1234

01/15 WHOLE FOODS MARKET #123 45.67
01/16 STARBUCKS STORE 08421 5.50
01/20 AUTOMATIC PAYMENT - THANK YOU 500.00

Total fees charged $0.00
";

    // ── detection ─────────────────────────────────────────────────────────────

    #[test]
    fn auto_detects_chase() {
        let result = parse(CHASE_PAGE, FormatId::Auto);
        assert_eq!(result.format, "Chase");
        assert_eq!(result.transactions.len(), 3);
        assert!(result.annotations.is_empty());
    }

    #[test]
    fn auto_detects_discover_with_compound_signature() {
        let text = "Discover Card\nCashback Bonus summary\n\n01/15/2024 CHIPOTLE 0711 12.40\n";
        let result = parse(text, FormatId::Auto);
        assert_eq!(result.format, "Discover");
        // Plain "discover" alone is not enough.
        let text = "We discovered a great deal\n01/15/2024 CHIPOTLE 0711 12.40\n";
        assert_eq!(parse(text, FormatId::Auto).format, "Generic");
    }

    #[test]
    fn explicit_format_skips_detection() {
        let text = "No signatures anywhere\n\n03/02/2024 TRADER JOE S #553 31.18\n";
        let result = parse(text, FormatId::Amex);
        assert_eq!(result.format, "Amex");
        assert_eq!(result.transactions.len(), 1);
    }

    #[test]
    fn format_id_round_trip() {
        for id in [
            FormatId::Auto,
            FormatId::Chase,
            FormatId::Amex,
            FormatId::Discover,
            FormatId::CapitalOne,
            FormatId::Generic,
        ] {
            assert_eq!(FormatId::from_str(&id.to_string()).unwrap(), id);
        }
        assert_eq!(FormatId::from_str("Capital One").unwrap(), FormatId::CapitalOne);
        assert!(FormatId::from_str("hsbc").is_err());
    }

    // ── amounts & signs ───────────────────────────────────────────────────────

    #[test]
    fn purchases_negative_payments_positive() {
        let result = parse(CHASE_PAGE, FormatId::Auto);
        assert_eq!(result.transactions[0].amount, Money::from_cents(-4567));
        assert_eq!(result.transactions[1].amount, Money::from_cents(-550));
        // Payment row recognized by keyword, kept as a credit.
        assert_eq!(result.transactions[2].amount, Money::from_cents(50000));
    }

    #[test]
    fn explicit_minus_marks_credit() {
        let text = "Capital One\nJanuary 2024\n\nJan header\n01/28 WALMART.COM REFUND - $14.05\n";
        let result = parse(text, FormatId::Auto);
        assert_eq!(result.format, "Capital One");
        assert_eq!(result.transactions[0].amount, Money::from_cents(1405));
    }

    // ── dates ─────────────────────────────────────────────────────────────────

    #[test]
    fn bare_dates_resolve_against_scraped_year() {
        let result = parse(CHASE_PAGE, FormatId::Auto);
        assert_eq!(
            result.transactions[0].date,
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
    }

    #[test]
    fn month_name_year_is_scraped() {
        let text = "american express\nStatement period January 2023\n\n02/07 DELTA AIR LINES 412.30\n";
        let result = parse(text, FormatId::Auto);
        assert_eq!(
            result.transactions[0].date,
            NaiveDate::from_ymd_opt(2023, 2, 7).unwrap()
        );
    }

    #[test]
    fn impossible_date_is_a_row_error() {
        let text = "chase.com\n01/15/2024 statement\n\n13/45 GARBAGE ROW 12.00\n";
        let result = parse(text, FormatId::Auto);
        assert!(result.transactions.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].reason.contains("invalid date"));
        assert!(matches!(result.errors[0].at, RowRef::Line { page: 1, .. }));
    }

    // ── continuation & noise ──────────────────────────────────────────────────

    #[test]
    fn wrapped_description_joins_previous_transaction() {
        let text = "\
chase.com
Statement Date: 01/25/2024

01/15 SQ *BLUE BOTTLE 12.75
COFFEE ROASTERS OAKLAND CA
01/16 SHELL OIL 5.00
";
        let result = parse(text, FormatId::Auto);
        assert_eq!(result.transactions.len(), 2);
        assert_eq!(
            result.transactions[0].description,
            "SQ *BLUE BOTTLE COFFEE ROASTERS OAKLAND CA"
        );
    }

    #[test]
    fn continuation_join_is_bounded() {
        let text = "\
chase.com 01/25/2024

01/15 MERCHANT 10.00
wrap one
wrap two
wrap three
";
        let result = parse(text, FormatId::Auto);
        let desc = &result.transactions[0].description;
        assert!(desc.contains("wrap one") && desc.contains("wrap two"));
        assert!(!desc.contains("wrap three"));
    }

    #[test]
    fn non_transaction_tables_are_silent_noise() {
        let text = "\
chase.com
Statement Date: 01/25/2024

Interest charge calculation
Annual percentage rate 24.99%
Fees charged this period $0.00

01/15 REAL MERCHANT 22.00
";
        let result = parse(text, FormatId::Auto);
        assert_eq!(result.transactions.len(), 1);
        assert!(result.errors.is_empty());
    }

    // ── pages ─────────────────────────────────────────────────────────────────

    #[test]
    fn blank_interior_page_is_a_page_error() {
        let text = "chase.com 01/25/2024\n01/15 MERCHANT A 10.00\n\u{0c}   \u{0c}01/17 MERCHANT B 20.00\n";
        let result = parse(text, FormatId::Auto);
        assert_eq!(result.transactions.len(), 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].at, RowRef::Page(2));
    }

    // ── fallback & failures ───────────────────────────────────────────────────

    #[test]
    fn unknown_layout_falls_back_to_generic_with_annotations() {
        let text = "\
SOME REGIONAL BANK
Member FDIC since 03/01/2024

03/02/2024 COSTCO WHOLESALE 120.50
03/05/2024 NETFLIX.COM 15.49
";
        let result = parse(text, FormatId::Auto);
        assert_eq!(result.format, "Generic");
        assert_eq!(result.transactions.len(), 2);
        // Every fallback transaction carries the low-confidence marker.
        assert_eq!(result.annotations.len(), result.transactions.len());
        let ids: Vec<_> = result.transactions.iter().map(|t| t.id.clone()).collect();
        assert!(result
            .annotations
            .iter()
            .all(|a| ids.contains(&a.transaction_id)));
    }

    #[test]
    fn unknown_format_when_fallback_finds_nothing() {
        let text = "SOME REGIONAL BANK\nNothing that looks like a transaction.\n";
        assert!(matches!(
            parse_text(text, FormatId::Auto, Owner::User1, ""),
            Err(PdfError::UnknownFormat)
        ));
    }

    #[test]
    fn explicit_issuer_with_no_rows_is_empty_not_an_error() {
        let text = "chase.com 01/25/2024\nNo transactions this period.\n";
        let result = parse(text, FormatId::Chase);
        assert!(result.transactions.is_empty());
    }

    #[test]
    fn no_text_at_all() {
        assert!(matches!(
            parse_text("  \n ", FormatId::Auto, Owner::User1, ""),
            Err(PdfError::NoText)
        ));
    }
}
