//! Line-item ingestion from tabular text.
//!
//! Columns are positional: SKU, quantity, discount. Anything after the third column
//! is ignored. Records whose SKU or quantity does not validate are dropped and
//! reported as skipped; the accepted items keep their input order.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::line_item::{DiscountKind, LineItem};
use crate::error::Result;

const SKU_COLUMN: usize = 0;
const QUANTITY_COLUMN: usize = 1;
const DISCOUNT_COLUMN: usize = 2;

/// How tabular input is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Field delimiter. Detected from the first non-blank line when unset.
    pub delimiter: Option<u8>,
    /// Skip the first record without counting it.
    pub has_headers: bool,
    /// Kind for discount fields without a trailing `%`
    pub default_kind: DiscountKind,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            delimiter: None,
            has_headers: false,
            default_kind: DiscountKind::Percent,
        }
    }
}

/// A dropped record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    /// 1-based line of the input the record started on
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub items: Vec<LineItem>,
    pub skipped: Vec<SkippedRecord>,
}

impl IngestReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Pick `;`, tab or `,` from the first non-blank line.
///
/// Characters inside double-quoted fields do not count.
pub fn detect_delimiter(input: impl AsRef<[u8]>) -> u8 {
    let first = input
        .as_ref()
        .split(|&b| b == b'\n')
        .find(|line| !line.iter().all(u8::is_ascii_whitespace))
        .unwrap_or_default();

    let mut in_quotes = false;
    let (mut semicolon, mut tab) = (false, false);
    for &byte in first {
        match byte {
            b'"' => in_quotes = !in_quotes,
            b';' if !in_quotes => semicolon = true,
            b'\t' if !in_quotes => tab = true,
            _ => {}
        }
    }

    if semicolon {
        b';'
    } else if tab {
        b'\t'
    } else {
        b','
    }
}

fn unquote(field: &str) -> &str {
    field.trim().trim_matches(|c| c == '"' || c == '\'').trim()
}

/// Parse a number that may use a comma as decimal separator.
pub fn parse_decimal(field: &str) -> Option<f64> {
    let cleaned: String = unquote(field)
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Normalize a discount field.
///
/// A trailing `%` marks a percentage; other fields take `default_kind`. The value is
/// clamped to be non-negative and rounded to two decimals. Unreadable fields are 0.
pub fn parse_discount(field: &str, default_kind: DiscountKind) -> (f64, DiscountKind) {
    let field = unquote(field);
    let (number, kind) = match field.strip_suffix('%') {
        Some(number) => (number, DiscountKind::Percent),
        None => (field, default_kind),
    };
    let value = parse_decimal(number).unwrap_or(0.0).max(0.0);
    ((value * 100.0).round() / 100.0, kind)
}

/// Parse line items from tabular text.
///
/// # Errors
/// Only fails if the reader cannot be set up; malformed records are skipped instead.
pub fn parse_line_items(text: &str, config: &IngestConfig) -> Result<IngestReport> {
    parse_line_bytes(text.as_bytes(), config)
}

/// Parse line items from raw bytes in any ASCII-compatible encoding.
///
/// Only the SKU, quantity and discount columns must be valid UTF-8. A record whose
/// other columns hold stray bytes (a Windows-1252 note, say) is still accepted.
///
/// # Errors
/// Only fails if the reader cannot be set up; malformed records are skipped instead.
pub fn parse_line_bytes(input: &[u8], config: &IngestConfig) -> Result<IngestReport> {
    let delimiter = config.delimiter.unwrap_or_else(|| detect_delimiter(input));
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(config.has_headers)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut report = IngestReport::default();

    for record in reader.byte_records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                tracing::warn!(line, error = %e, "Unreadable record skipped");
                report.skipped.push(SkippedRecord {
                    line,
                    reason: format!("unreadable record: {}", e),
                });
                continue;
            }
        };

        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.iter().all(is_blank) {
            continue;
        }

        let [sku, quantity_field, discount_field] = match decode_columns(&record) {
            Ok(columns) => columns,
            Err(column) => {
                tracing::debug!(line, column, "Record skipped, column is not UTF-8");
                report.skipped.push(SkippedRecord {
                    line,
                    reason: format!("column {} is not valid UTF-8", column + 1),
                });
                continue;
            }
        };

        let Some(quantity) = parse_decimal(quantity_field) else {
            report.skipped.push(SkippedRecord {
                line,
                reason: format!("quantity '{}' is not a number", quantity_field),
            });
            continue;
        };
        let (discount_value, discount_kind) = parse_discount(discount_field, config.default_kind);

        match LineItem::new(sku, quantity, discount_value, discount_kind) {
            Ok(item) => report.items.push(item),
            Err(e) => {
                tracing::debug!(line, error = %e, "Record skipped");
                report.skipped.push(SkippedRecord {
                    line,
                    reason: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        accepted = report.items.len(),
        skipped = report.skipped.len(),
        "Parsed line items"
    );

    Ok(report)
}

fn is_blank(field: &[u8]) -> bool {
    field
        .iter()
        .all(|b| b.is_ascii_whitespace() || *b == b'"' || *b == b'\'')
}

/// SKU, quantity and discount fields, unquoted. `Err` holds the first column that
/// does not decode.
fn decode_columns(record: &csv::ByteRecord) -> std::result::Result<[&str; 3], usize> {
    let decode = move |column: usize| {
        std::str::from_utf8(record.get(column).unwrap_or_default())
            .map(unquote)
            .map_err(|_| column)
    };
    Ok([
        decode(SKU_COLUMN)?,
        decode(QUANTITY_COLUMN)?,
        decode(DISCOUNT_COLUMN)?,
    ])
}

/// Read and parse a file of line items.
///
/// # Errors
/// Returns an I/O error if the file cannot be read.
pub fn read_line_items(path: &Path, config: &IngestConfig) -> Result<IngestReport> {
    let bytes = std::fs::read(path)?;
    parse_line_bytes(&bytes, config)
}
