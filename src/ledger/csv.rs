//! The ledger's flat-file format.
//!
//! Line 1 is the fixed header `ID,DateTime,CategoryID,CategoryType,Amount,Description`. Every
//! following line is one transaction. Fields are split by a hand-written scanner in which every `"`
//! toggles an inside-quotes flag and only a comma seen outside quotes ends a field. A stray,
//! unbalanced quote therefore swallows the rest of its line and the row fails to parse.

use crate::error::{typed_error, ErrorType, IntoResult};
use crate::model::{Amount, Category, CategoryRegistry, CategoryType, Transaction, DATE_TIME_FORMAT};
use crate::{fs, Result};
use anyhow::Context;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The first line of every ledger file.
pub const HEADER: &str = "ID,DateTime,CategoryID,CategoryType,Amount,Description";

const FIELD_COUNT: usize = 6;

/// A durable home for the ledger. The store calls `save` with the full list after every mutation.
pub trait LedgerPersistence: Send {
    /// Loads every readable record. Unreadable input is logged and skipped rather than returned as
    /// an error, so the store can always start.
    fn load(&mut self) -> Vec<Transaction>;

    /// Replaces the persisted ledger with `transactions`, in the given order.
    fn save(&mut self, transactions: &[Transaction]) -> Result<()>;
}

/// Persists the ledger as a CSV file that is rewritten in full on every save.
pub struct CsvPersistence {
    path: PathBuf,
    registry: Arc<dyn CategoryRegistry>,
    atomic: bool,
}

impl CsvPersistence {
    /// Creates a `CsvPersistence` for the file at `path`. Category ids found in the file are resolved
    /// through `registry`. When `atomic` is set, saves go to a temp file that is renamed over `path`.
    pub fn new(path: impl Into<PathBuf>, registry: Arc<dyn CategoryRegistry>, atomic: bool) -> Self {
        Self {
            path: path.into(),
            registry,
            atomic,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reset(&self) {
        if let Err(e) = fs::rewrite(&self.path, render(&[]).as_bytes(), self.atomic) {
            warn!("{e:#}");
        }
    }
}

impl LedgerPersistence for CsvPersistence {
    fn load(&mut self) -> Vec<Transaction> {
        let content = match fs::read_optional_lossy(&self.path) {
            Ok(Some(content)) => content,
            Ok(None) => {
                info!("Creating ledger file {}", self.path.display());
                self.reset();
                return Vec::new();
            }
            Err(e) => {
                warn!("{e:#}. Continuing with an empty in-memory ledger.");
                return Vec::new();
            }
        };

        let mut records = split_records(&content).into_iter();
        match records.next() {
            Some((_, header)) if header == HEADER => {}
            _ => {
                warn!(
                    "The ledger file {} does not start with the expected header, replacing it with \
                    an empty ledger",
                    self.path.display()
                );
                self.reset();
                return Vec::new();
            }
        }

        let registry = &self.registry;
        let mut transactions = Vec::new();
        for (line_no, record) in records {
            if record.trim().is_empty() {
                continue;
            }
            match parse_row(&record, |id, kind| Ok(registry.get_or_placeholder(id, kind))) {
                Ok(t) => transactions.push(t),
                Err(e) => warn!(
                    "Skipping line {line_no} of {}: {e:#}",
                    self.path.display()
                ),
            }
        }
        debug!(
            "Loaded {} transactions from {}",
            transactions.len(),
            self.path.display()
        );
        transactions
    }

    fn save(&mut self, transactions: &[Transaction]) -> Result<()> {
        fs::rewrite(&self.path, render(transactions).as_bytes(), self.atomic)
            .with_context(|| format!("Unable to save the ledger to {}", self.path.display()))
    }
}

/// Renders the header and one line per transaction.
pub fn render(transactions: &[Transaction]) -> String {
    let mut out = String::with_capacity(HEADER.len() + 1 + transactions.len() * 64);
    out.push_str(HEADER);
    out.push('\n');
    for t in transactions {
        out.push_str(&render_row(t));
        out.push('\n');
    }
    out
}

/// Renders a single transaction as one CSV line (without the line terminator).
pub fn render_row(t: &Transaction) -> String {
    format!(
        "{},{},{},{},{},{}",
        quote(t.id()),
        t.timestamp().format(DATE_TIME_FORMAT),
        t.category().id(),
        t.kind(),
        t.amount(),
        quote(t.description().unwrap_or_default()),
    )
}

/// Wraps `field` in quotes, doubling internal quotes, if it contains a comma, quote or line break.
fn quote(field: &str) -> String {
    if field.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Splits `content` into logical records paired with the 1-based line number they start on. A line
/// break inside a quoted Description continues the record onto the next line, keeping any `\r` that
/// belongs to it; an unbalanced quote in any other field ends the record at its line. A `\r\n`
/// terminator is treated like `\n`.
pub(crate) fn split_records(content: &str) -> Vec<(usize, String)> {
    let content = content.strip_suffix('\n').unwrap_or(content);
    if content.is_empty() {
        return Vec::new();
    }
    let mut records = Vec::new();
    let mut current: Option<(usize, String)> = None;
    for (ix, line) in content.split('\n').enumerate() {
        let (start, record) = match current.take() {
            Some((start, record)) => (start, format!("{record}\n{line}")),
            None => (ix + 1, line.to_string()),
        };
        if continues_on_next_line(&record) {
            current = Some((start, record));
        } else {
            records.push((start, strip_cr(record)));
        }
    }
    records.extend(current.map(|(start, record)| (start, strip_cr(record))));
    records
}

fn strip_cr(mut record: String) -> String {
    if record.ends_with('\r') {
        record.pop();
    }
    record
}

/// True when `record` ends inside a quoted last field.
fn continues_on_next_line(record: &str) -> bool {
    let mut in_quotes = false;
    let mut field_ix = 0;
    let mut field_start = true;
    let mut quoted_field = false;
    for c in record.chars() {
        if field_start {
            quoted_field = c == '"';
            field_start = false;
        }
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                field_ix += 1;
                field_start = true;
            }
            _ => {}
        }
    }
    in_quotes && quoted_field && field_ix == FIELD_COUNT - 1
}

/// Splits one record into fields.
pub(crate) fn split_fields(record: &str) -> Vec<String> {
    let mut fields = Vec::with_capacity(FIELD_COUNT);
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = record.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Parses one record into a `Transaction`, using `resolve` to turn the category id and recorded type
/// into a `Category`.
pub(crate) fn parse_row<F>(record: &str, resolve: F) -> Result<Transaction>
where
    F: FnOnce(i64, CategoryType) -> Result<Category>,
{
    let fields = split_fields(record);
    if fields.len() != FIELD_COUNT {
        return Err(typed_error(
            ErrorType::Parse,
            format!("Expected {FIELD_COUNT} fields but found {}", fields.len()),
        ));
    }
    let id = fields[0].trim();
    if id.is_empty() {
        return Err(typed_error(ErrorType::Parse, "The ID field is empty"));
    }
    let timestamp = NaiveDateTime::parse_from_str(fields[1].trim(), DATE_TIME_FORMAT)
        .with_context(|| format!("Invalid DateTime '{}'", fields[1]))
        .typed(ErrorType::Parse)?;
    let category_id: i64 = fields[2]
        .trim()
        .parse()
        .with_context(|| format!("Invalid CategoryID '{}'", fields[2]))
        .typed(ErrorType::Parse)?;
    let kind = CategoryType::from_str(fields[3].trim())
        .with_context(|| format!("Invalid CategoryType '{}'", fields[3]))
        .typed(ErrorType::Parse)?;
    let amount = Amount::from_str(&fields[4])
        .with_context(|| format!("Invalid Amount '{}'", fields[4]))
        .typed(ErrorType::Parse)?;
    let description = match fields[5].as_str() {
        "" => None,
        d => Some(d.to_string()),
    };
    let category = resolve(category_id, kind)?;
    Ok(Transaction::new(id, timestamp, category, amount, description))
}
