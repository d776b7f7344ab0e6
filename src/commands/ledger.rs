//! Ledger command handlers: add, delete, update, list and summary.

use crate::app::App;
use crate::args::{AddArgs, DeleteArgs, ListArgs, UpdateArgs};
use crate::commands::{plural, Out};
use crate::error::{typed_error, ErrorType, IntoResult};
use crate::model::{generate_transaction_id, Amount, Category, Transaction, DATE_TIME_FORMAT};
use crate::{Config, Result};
use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Adds one transaction. The id is generated unless one is given, and the timestamp defaults to now.
pub async fn add(config: Config, args: AddArgs) -> Result<Out<Transaction>> {
    let app = App::open(config)?;
    let category = category(&app, args.category_id())?;
    let amount = parse_amount(args.amount())?;
    let timestamp = match args.date() {
        Some(s) => parse_timestamp(s)?,
        None => chrono::Local::now().naive_local().trunc_subsecs(0),
    };
    let id = args
        .id()
        .map(str::to_string)
        .unwrap_or_else(generate_transaction_id);
    let t = Transaction::new(
        id,
        timestamp,
        category,
        amount,
        args.description().map(str::to_string),
    )
    .normalized();
    app.ledger().add(t.clone())?;
    Ok(Out::new(format!("Added transaction {}", t.id()), t))
}

/// Deletes the transaction with the given id. Deleting an id that does not exist changes nothing.
pub async fn delete(config: Config, args: DeleteArgs) -> Result<Out<bool>> {
    let app = App::open(config)?;
    let deleted = app.ledger().delete_id(args.id())?;
    let message = if deleted {
        format!("Deleted transaction {}", args.id())
    } else {
        format!("There is no transaction with id '{}'", args.id())
    };
    Ok(Out::new(message, deleted))
}

/// Replaces the given fields of an existing transaction.
pub async fn update(config: Config, args: UpdateArgs) -> Result<Out<Transaction>> {
    let app = App::open(config)?;
    let existing = app.ledger().get(args.id())?.ok_or_else(|| {
        typed_error(
            ErrorType::Validation,
            format!("There is no transaction with id '{}'", args.id()),
        )
    })?;
    let category = match args.category_id() {
        Some(id) => category(&app, id)?,
        None => existing.category().clone(),
    };
    let amount = match args.amount() {
        Some(s) => parse_amount(s)?,
        None => existing.amount(),
    };
    let timestamp = match args.date() {
        Some(s) => parse_timestamp(s)?,
        None => existing.timestamp(),
    };
    let description = match args.description() {
        Some(d) => Some(d.to_string()),
        None => existing.description().map(str::to_string),
    };
    let t = Transaction::new(existing.id(), timestamp, category, amount, description).normalized();
    app.ledger().update(t.clone())?;
    Ok(Out::new(format!("Updated transaction {}", t.id()), t))
}

/// Lists transactions, newest first, optionally filtered by category type and category.
pub async fn list(config: Config, args: ListArgs) -> Result<Out<Vec<Transaction>>> {
    let app = App::open(config)?;
    let mut transactions = match args.category_id() {
        Some(id) => app.ledger().by_category(&category(&app, id)?)?,
        None => app.ledger().all()?,
    };
    if let Some(kind) = args.kind() {
        transactions.retain(|t| t.kind() == kind);
    }
    let mut message = plural(transactions.len(), "transaction");
    for t in &transactions {
        message.push_str(&format!(
            "\n{}  {}  {:<16}  {:>12}  {}",
            t.timestamp().format(DATE_TIME_FORMAT),
            t.id(),
            t.category().name(),
            t.amount().money(),
            t.description().unwrap_or_default()
        ));
    }
    Ok(Out::new(message, transactions))
}

/// Totals for the whole ledger.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub transactions: usize,
    pub income: Amount,
    pub expense: Amount,
    pub balance: Amount,
}

/// Shows total income, total expense and the balance.
pub async fn summary(config: Config) -> Result<Out<Summary>> {
    let app = App::open(config)?;
    let ledger = app.ledger();
    let summary = Summary {
        transactions: ledger.len()?,
        income: ledger.total_income()?,
        expense: ledger.total_expense()?,
        balance: ledger.balance()?,
    };
    let message = format!(
        "{}: income {}, expense {}, balance {}",
        plural(summary.transactions, "transaction"),
        summary.income.money(),
        summary.expense.money(),
        summary.balance.money()
    );
    Ok(Out::new(message, summary))
}

fn category(app: &App, id: i64) -> Result<Category> {
    app.registry()
        .get(id)
        .ok_or_else(|| typed_error(ErrorType::Validation, format!("Unknown category id {id}")))
}

fn parse_amount(s: &str) -> Result<Amount> {
    Amount::from_str(s)
        .with_context(|| format!("Invalid amount '{s}'"))
        .typed(ErrorType::Validation)
}

/// Accepts `YYYY-MM-DD HH:MM:SS` or a bare `YYYY-MM-DD`, which means midnight.
fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(s, DATE_TIME_FORMAT) {
        return Ok(ts);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| d.and_time(chrono::NaiveTime::MIN))
        .with_context(|| format!("Invalid date '{s}', expected YYYY-MM-DD HH:MM:SS"))
        .typed(ErrorType::Validation)
}
