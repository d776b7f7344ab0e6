//! The authoritative in-memory ledger.
//!
//! `LedgerStore` owns the list of transactions. It is constructed unbound and must be given a
//! `LedgerPersistence` through `initialize` before any other call. Every mutation rewrites the whole
//! backing file before it returns, then notifies listeners on the caller's thread.

mod csv;
mod observer;

pub use self::csv::{render, render_row, CsvPersistence, LedgerPersistence, HEADER};
pub(crate) use self::csv::{parse_row, split_records};
pub use observer::{ChangeKind, LedgerEvent, LedgerListener, ListenerId, SyncFacade};

use crate::error::{typed_error, ErrorType};
use crate::model::{Amount, Category, CategoryType, Transaction};
use crate::Result;
use observer::Listeners;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, warn};

struct State {
    /// Kept in insertion order. Sorting happens on copies.
    records: Vec<Transaction>,
    persistence: Box<dyn LedgerPersistence>,
}

impl State {
    fn persist(&mut self) {
        if let Err(e) = self.persistence.save(&self.records) {
            error!("{e:#}. The in-memory ledger and its file may now differ.");
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|t| t.id() == id)
    }
}

/// The single shared collection of transactions.
///
/// All reads and writes of the list happen under one mutex. Persistence runs while the lock is
/// held, so once a call returns the file and memory agree. Listeners are notified after the lock is
/// released, so a listener may read the store.
///
/// Snapshots are sorted by timestamp, newest first. Transactions with equal timestamps keep their
/// insertion order.
#[derive(Default)]
pub struct LedgerStore {
    state: Mutex<Option<State>>,
    listeners: Listeners,
}

impl LedgerStore {
    /// Creates an unbound store. Call `initialize` before using it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the store to `persistence` and loads every record from it. Returns the number of
    /// transactions loaded.
    ///
    /// # Errors
    /// - Returns a `Usage` error if the store is already initialized.
    pub fn initialize(&self, mut persistence: Box<dyn LedgerPersistence>) -> Result<usize> {
        let mut guard = self.lock();
        if guard.is_some() {
            return Err(typed_error(
                ErrorType::Usage,
                "The ledger store has already been initialized",
            ));
        }
        let records = unique(persistence.load());
        let count = records.len();
        *guard = Some(State {
            records,
            persistence,
        });
        debug!("Ledger store initialized with {count} transactions");
        Ok(count)
    }

    /// Returns true once `initialize` has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }

    /// Appends `t`, rewrites the backing file and notifies listeners with `Add`.
    ///
    /// # Errors
    /// - `Validation` if `t` is missing a required field or its id is already in the ledger.
    /// - `Usage` if the store has not been initialized.
    pub fn add(&self, t: Transaction) -> Result<()> {
        t.validate()?;
        {
            let mut guard = self.lock();
            let state = bound(&mut guard)?;
            if state.position(t.id()).is_some() {
                return Err(typed_error(
                    ErrorType::Validation,
                    format!("A transaction with id '{}' already exists", t.id()),
                ));
            }
            state.records.push(t.clone());
            state.persist();
        }
        self.listeners
            .notify(&LedgerEvent::new(ChangeKind::Add, Some(t)));
        Ok(())
    }

    /// Removes the transaction whose id equals `t`'s id. Returns false, changing nothing, if there
    /// is no such transaction.
    pub fn delete(&self, t: &Transaction) -> Result<bool> {
        self.delete_id(t.id())
    }

    /// Removes the transaction with `id`. Returns false, changing nothing, if there is none.
    pub fn delete_id(&self, id: &str) -> Result<bool> {
        let removed = {
            let mut guard = self.lock();
            let state = bound(&mut guard)?;
            match state.position(id) {
                None => return Ok(false),
                Some(ix) => {
                    let removed = state.records.remove(ix);
                    state.persist();
                    removed
                }
            }
        };
        self.listeners
            .notify(&LedgerEvent::new(ChangeKind::Delete, Some(removed)));
        Ok(true)
    }

    /// Replaces the transaction that has `t`'s id, keeping its position. Returns false, changing
    /// nothing, if there is no such transaction.
    pub fn update(&self, t: Transaction) -> Result<bool> {
        t.validate()?;
        {
            let mut guard = self.lock();
            let state = bound(&mut guard)?;
            match state.position(t.id()) {
                None => return Ok(false),
                Some(ix) => {
                    state.records[ix] = t.clone();
                    state.persist();
                }
            }
        }
        self.listeners
            .notify(&LedgerEvent::new(ChangeKind::Update, Some(t)));
        Ok(true)
    }

    /// Discards the in-memory list, reloads it from the backing file and notifies `Refresh`.
    pub fn reload(&self) -> Result<usize> {
        let count = {
            let mut guard = self.lock();
            let state = bound(&mut guard)?;
            state.records = unique(state.persistence.load());
            state.records.len()
        };
        self.listeners
            .notify(&LedgerEvent::new(ChangeKind::Refresh, None));
        Ok(count)
    }

    /// All transactions, newest first.
    pub fn all(&self) -> Result<Vec<Transaction>> {
        self.snapshot(|_| true)
    }

    /// Transactions whose category is of type `kind`, newest first.
    pub fn by_type(&self, kind: CategoryType) -> Result<Vec<Transaction>> {
        self.snapshot(|t| t.kind() == kind)
    }

    /// Transactions in `category` (matched by id), newest first.
    pub fn by_category(&self, category: &Category) -> Result<Vec<Transaction>> {
        self.snapshot(|t| t.category().id() == category.id())
    }

    /// The transaction with `id`, if any.
    pub fn get(&self, id: &str) -> Result<Option<Transaction>> {
        let mut guard = self.lock();
        let state = bound(&mut guard)?;
        Ok(state.records.iter().find(|t| t.id() == id).cloned())
    }

    pub fn len(&self) -> Result<usize> {
        let mut guard = self.lock();
        Ok(bound(&mut guard)?.records.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The sum of all income transaction amounts.
    pub fn total_income(&self) -> Result<Amount> {
        self.total(CategoryType::Income)
    }

    /// The sum of all expense transaction amounts.
    pub fn total_expense(&self) -> Result<Amount> {
        self.total(CategoryType::Expense)
    }

    /// `total_income() - total_expense()`.
    ///
    /// # Errors
    /// - `Validation` if a total does not fit in an `Amount`.
    pub fn balance(&self) -> Result<Amount> {
        let mut guard = self.lock();
        let state = bound(&mut guard)?;
        let income = checked_sum(&state.records, CategoryType::Income)?;
        let expense = checked_sum(&state.records, CategoryType::Expense)?;
        income
            .checked_sub(expense)
            .ok_or_else(|| typed_error(ErrorType::Validation, "The ledger balance overflows"))
    }

    /// Subscribes `listener` to change notifications. Listeners are called in subscription order.
    pub fn subscribe(&self, listener: Arc<dyn LedgerListener>) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    /// Removes a subscription. Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    fn total(&self, kind: CategoryType) -> Result<Amount> {
        let mut guard = self.lock();
        let state = bound(&mut guard)?;
        checked_sum(&state.records, kind)
    }

    fn snapshot<F>(&self, filter: F) -> Result<Vec<Transaction>>
    where
        F: Fn(&Transaction) -> bool,
    {
        let mut guard = self.lock();
        let state = bound(&mut guard)?;
        let mut out: Vec<Transaction> = state.records.iter().filter(|t| filter(t)).cloned().collect();
        out.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        Ok(out)
    }

    fn lock(&self) -> MutexGuard<'_, Option<State>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn checked_sum(records: &[Transaction], kind: CategoryType) -> Result<Amount> {
    records
        .iter()
        .filter(|t| t.kind() == kind)
        .try_fold(Amount::ZERO, |acc, t| acc.checked_add(t.amount()))
        .ok_or_else(|| {
            typed_error(
                ErrorType::Validation,
                format!("The {kind} total of the ledger overflows"),
            )
        })
}

/// Drops every transaction whose id was already seen, keeping the first.
fn unique(loaded: Vec<Transaction>) -> Vec<Transaction> {
    let mut seen = HashSet::new();
    loaded
        .into_iter()
        .filter(|t| {
            let first = seen.insert(t.id().to_string());
            if !first {
                warn!("Ignoring a second transaction with id '{}'", t.id());
            }
            first
        })
        .collect()
}

fn bound<'a>(guard: &'a mut MutexGuard<'_, Option<State>>) -> Result<&'a mut State> {
    guard.as_mut().ok_or_else(|| {
        typed_error(
            ErrorType::Usage,
            "The ledger store must be initialized before it is used",
        )
    })
}

/// A `LedgerPersistence` that keeps the "file" in memory. Useful for tests and for running without
/// a writable home directory.
#[derive(Debug, Default, Clone)]
pub struct MemoryPersistence {
    saved: Arc<Mutex<Vec<Transaction>>>,
    saves: Arc<Mutex<usize>>,
}

impl MemoryPersistence {
    pub fn new(initial: Vec<Transaction>) -> Self {
        Self {
            saved: Arc::new(Mutex::new(initial)),
            saves: Arc::new(Mutex::new(0)),
        }
    }

    /// What was last saved.
    pub fn saved(&self) -> Vec<Transaction> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// How many times `save` has been called.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LedgerPersistence for MemoryPersistence {
    fn load(&mut self) -> Vec<Transaction> {
        self.saved()
    }

    fn save(&mut self, transactions: &[Transaction]) -> Result<()> {
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = transactions.to_vec();
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}
