pub mod categorize;
pub mod csv;
pub mod dedup;
pub mod pdf;
pub mod pipeline;
pub mod result;
pub(crate) mod util;

pub use categorize::{CategoryMatcher, DEFAULT_FUZZY_THRESHOLD};
pub use csv::{detect_format, parse_csv, sniff, CsvError, CsvFormat};
pub use dedup::{DuplicateDetector, DuplicateHit, DEFAULT_SIMILARITY_THRESHOLD};
pub use pdf::{parse_pdf, parse_text, FormatId, IssuerFormat, PdfError};
pub use pipeline::{ImportSummary, SkippedDuplicate, StatementPipeline};
pub use result::{Annotation, ParseResult, RowError, RowRef};
