//! Brings transactions from an external CSV file into the ledger.
//!
//! The file uses the ledger's own row format. Rows that already exist in the ledger (matched by id
//! only) are dropped, the rest are normalized and added one at a time.

use crate::error::{typed_error, ErrorType};
use crate::ledger::{parse_row, split_records, LedgerStore, HEADER};
use crate::model::{CategoryRegistry, Transaction};
use crate::Result;
use anyhow::Context;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Decodes import files, removes rows the ledger already has, and feeds the rest to the store.
pub struct ImportDeduplicator {
    store: Arc<LedgerStore>,
    registry: Arc<dyn CategoryRegistry>,
}

impl ImportDeduplicator {
    pub fn new(store: Arc<LedgerStore>, registry: Arc<dyn CategoryRegistry>) -> Self {
        Self { store, registry }
    }

    /// Reads every parseable row of the CSV file at `path`.
    ///
    /// A first line equal to the ledger header is skipped. Unlike loading the ledger, nothing is
    /// repaired here: a row that fails to parse or names a category id that is not registered is
    /// dropped.
    ///
    /// # Errors
    /// - Returns a `Persistence` error if the file cannot be read.
    pub fn decode(&self, path: &Path) -> Result<Vec<Transaction>> {
        let content = crate::fs::read_optional_lossy(path)
            .with_context(|| format!("Unable to read the import file {}", path.display()))?
            .ok_or_else(|| {
                typed_error(
                    ErrorType::Persistence,
                    format!("The import file {} does not exist", path.display()),
                )
            })?;
        Ok(self.decode_str(&content, path))
    }

    fn decode_str(&self, content: &str, path: &Path) -> Vec<Transaction> {
        let mut out = Vec::new();
        for (ix, (line_no, record)) in split_records(content).into_iter().enumerate() {
            if (ix == 0 && record == HEADER) || record.trim().is_empty() {
                continue;
            }
            let parsed = parse_row(&record, |id, _| {
                self.registry.get(id).ok_or_else(|| {
                    typed_error(ErrorType::Parse, format!("Unknown category id {id}"))
                })
            });
            match parsed {
                Ok(t) => out.push(t),
                Err(e) => warn!("Dropping line {line_no} of {}: {e:#}", path.display()),
            }
        }
        debug!("Decoded {} rows from {}", out.len(), path.display());
        out
    }

    /// Keeps the rows of `imported` whose id is not in `existing`, normalized for insertion.
    ///
    /// Only the id is compared. A repeated id within `imported` is kept once, the first time it
    /// appears.
    pub fn dedupe(imported: Vec<Transaction>, existing: &[Transaction]) -> Vec<Transaction> {
        let mut seen: HashSet<String> = existing.iter().map(|t| t.id().to_string()).collect();
        imported
            .into_iter()
            .filter(|t| seen.insert(t.id().to_string()))
            .map(|t| t.normalized())
            .collect()
    }

    /// Decodes the file at `path`, drops rows the ledger already has, and adds each remaining row to
    /// the ledger. Returns the rows that were added.
    ///
    /// Every add rewrites the ledger file, so importing `n` new rows rewrites it `n` times.
    pub fn import_and_save(&self, path: &Path) -> Result<Vec<Transaction>> {
        let imported = self.decode(path)?;
        let decoded = imported.len();
        let novel = Self::dedupe(imported, &self.store.all()?);
        let mut added = Vec::with_capacity(novel.len());
        for t in novel {
            match self.store.add(t.clone()) {
                Ok(()) => added.push(t),
                Err(e) => warn!("Unable to import transaction '{}': {e:#}", t.id()),
            }
        }
        info!(
            "Imported {} of {decoded} rows from {}",
            added.len(),
            path.display()
        );
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryPersistence;
    use crate::model::{Amount, Categories, Category, CategoryType};
    use chrono::NaiveDate;
    use std::str::FromStr;
    use tempfile::TempDir;

    fn setup(existing: &[&str]) -> (ImportDeduplicator, Arc<LedgerStore>) {
        let registry: Arc<dyn CategoryRegistry> = Arc::new(Categories::seeded());
        let store = Arc::new(LedgerStore::new());
        store
            .initialize(Box::new(MemoryPersistence::default()))
            .unwrap();
        let when = NaiveDate::from_ymd_opt(2024, 4, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        for id in existing {
            store
                .add(Transaction::new(
                    *id,
                    when,
                    Category::new(10, "Food", CategoryType::Expense),
                    Amount::from_str("1.00").unwrap(),
                    None,
                ))
                .unwrap();
        }
        (ImportDeduplicator::new(store.clone(), registry), store)
    }

    fn write(dir: &TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("import.csv");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_scenario_b() {
        let dir = TempDir::new().unwrap();
        let (importer, store) = setup(&["t2"]);
        let path = write(
            &dir,
            "ID,DateTime,CategoryID,CategoryType,Amount,Description\n\
            t1,2024-05-01 10:00:00,10,EXPENSE,68.5,lunch\n\
            t2,2024-05-02 10:00:00,10,EXPENSE,12.00,\n\
            t3,2024-05-03 10:00:00,1,INCOME,5000,\"pay\r\nday \"\n",
        );
        let added = importer.import_and_save(&path).unwrap();
        assert_eq!(added.len(), 2);
        assert_eq!(store.len().unwrap(), 3);
        assert_eq!(added[0].amount().to_string(), "68.50");
        assert_eq!(added[1].amount().to_string(), "5000.00");
        assert_eq!(added[1].description(), Some("pay day"));
    }

    #[test]
    fn test_all_ids_existing_adds_nothing() {
        let dir = TempDir::new().unwrap();
        let (importer, store) = setup(&["a", "b"]);
        let path = write(
            &dir,
            "a,2024-05-01 10:00:00,10,EXPENSE,99.00,different content\n\
            b,2024-05-02 10:00:00,11,EXPENSE,1.00,\n",
        );
        assert!(importer.import_and_save(&path).unwrap().is_empty());
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(
            store.get("a").unwrap().unwrap().amount(),
            Amount::from_str("1.00").unwrap()
        );
    }

    #[test]
    fn test_n_novel_m_duplicate() {
        let dir = TempDir::new().unwrap();
        let existing: Vec<String> = (0..4).map(|i| format!("old{i}")).collect();
        let existing: Vec<&str> = existing.iter().map(String::as_str).collect();
        let (importer, store) = setup(&existing);
        let mut content = String::new();
        for i in 0..6 {
            content.push_str(&format!("new{i},2024-05-01 10:00:00,12,EXPENSE,3.00,same\n"));
        }
        for id in &existing {
            content.push_str(&format!("{id},2024-05-01 10:00:00,12,EXPENSE,3.00,same\n"));
        }
        let path = write(&dir, &content);
        assert_eq!(importer.import_and_save(&path).unwrap().len(), 6);
        assert_eq!(store.len().unwrap(), 10);
    }

    #[test]
    fn test_malformed_and_unknown_category_rows_dropped() {
        let dir = TempDir::new().unwrap();
        let (importer, _) = setup(&[]);
        let path = write(
            &dir,
            "ok,2024-05-01 10:00:00,10,EXPENSE,1.00,\n\
            bad-date,2024-13-01 10:00:00,10,EXPENSE,1.00,\n\
            bad-cat,2024-05-01 10:00:00,999,EXPENSE,1.00,\n\
            bad-amount,2024-05-01 10:00:00,10,EXPENSE,lots,\n",
        );
        let decoded = importer.decode(&path).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].id(), "ok");
    }

    #[test]
    fn test_invalid_utf8_only_affects_its_row() {
        let dir = TempDir::new().unwrap();
        let (importer, store) = setup(&[]);
        let path = dir.path().join("latin1.csv");
        std::fs::write(
            &path,
            b"a,2024-05-01 10:00:00,10,EXPENSE,1.00,tea\n\
            b,2024-05-02 10:00:00,10,EXPENSE,2.00,caf\xE9\n\
            c,2024-05-03 10:00:00,10,EXPENSE,3.00,\n",
        )
        .unwrap();
        let added = importer.import_and_save(&path).unwrap();
        let ids: Vec<&str> = added.iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(added[1].description(), Some("caf\u{FFFD}"));
        assert_eq!(store.len().unwrap(), 3);
    }

    #[test]
    fn test_missing_file_is_a_persistence_error() {
        let dir = TempDir::new().unwrap();
        let (importer, _) = setup(&[]);
        let e = importer
            .import_and_save(&dir.path().join("nope.csv"))
            .unwrap_err();
        assert_eq!(crate::error::error_type(&e), Some(ErrorType::Persistence));
    }

    #[test]
    fn test_dedupe_repeats_within_batch() {
        let (importer, _) = setup(&[]);
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "x,2024-05-01 10:00:00,10,EXPENSE,1.00,first\n\
            x,2024-05-01 10:00:00,10,EXPENSE,2.00,second\n",
        );
        let out = ImportDeduplicator::dedupe(importer.decode(&path).unwrap(), &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].description(), Some("first"));
    }
}
