use crate::error::{typed_error, ErrorType};
use crate::model::{Amount, Category, CategoryType};
use crate::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// The timestamp pattern used in the ledger file, e.g. `2024-05-01 10:00:00`.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single ledger entry. The `id` is its sole identity: two transactions with the same id are the
/// same transaction regardless of their other fields.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Transaction {
    id: String,
    timestamp: NaiveDateTime,
    category: Category,
    amount: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl Transaction {
    pub fn new(
        id: impl Into<String>,
        timestamp: NaiveDateTime,
        category: Category,
        amount: Amount,
        description: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            category,
            amount,
            description,
        }
    }

    /// Creates a transaction with a freshly generated id.
    pub fn create(
        timestamp: NaiveDateTime,
        category: Category,
        amount: Amount,
        description: Option<String>,
    ) -> Self {
        Self::new(generate_transaction_id(), timestamp, category, amount, description)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    pub fn kind(&self) -> CategoryType {
        self.category.kind()
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Rejects transactions that are missing a required field.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(typed_error(
                ErrorType::Validation,
                "A transaction must have a non-empty id",
            ));
        }
        if self.id.contains(&['\r', '\n'][..]) {
            return Err(typed_error(
                ErrorType::Validation,
                format!("Transaction id {:?} contains a line break", self.id),
            ));
        }
        if self.category.name().trim().is_empty() {
            return Err(typed_error(
                ErrorType::Validation,
                format!("Transaction '{}' has a category with no name", self.id),
            ));
        }
        Ok(())
    }

    /// Returns a copy with the amount rescaled to two decimal places and the description trimmed
    /// with line breaks collapsed to single spaces. Blank descriptions become `None`.
    pub fn normalized(&self) -> Self {
        let description = self
            .description
            .as_deref()
            .map(collapse_line_breaks)
            .filter(|d| !d.is_empty());
        Self {
            id: self.id.clone(),
            timestamp: self.timestamp,
            category: self.category.clone(),
            amount: self.amount.rescaled(),
            description,
        }
    }
}

/// Trims `s` and replaces every run of CR/LF characters with a single space.
fn collapse_line_breaks(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_break = false;
    for c in s.trim().chars() {
        if c == '\r' || c == '\n' {
            if !in_break {
                out.push(' ');
                in_break = true;
            }
        } else {
            out.push(c);
            in_break = false;
        }
    }
    out
}

/// Generates a unique transaction id.
pub fn generate_transaction_id() -> String {
    format!("txn-{}", uuid::Uuid::new_v4().simple())
}
