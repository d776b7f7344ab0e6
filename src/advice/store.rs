//! The recommendation list and its JSON file.

use crate::error::{typed_error, ErrorType};
use crate::model::{Recommendation, RecommendationKind};
use crate::{fs, Result};
use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Holds every recommendation ever generated. The file is read once when the store is opened and
/// rewritten in full after every mutation.
#[derive(Debug)]
pub struct RecommendationStore {
    path: PathBuf,
    atomic: bool,
    items: Vec<Recommendation>,
}

impl RecommendationStore {
    /// Opens the store at `path`. A missing file means there are no recommendations yet. An
    /// unreadable or corrupt file is logged and treated the same way.
    pub fn open(path: impl Into<PathBuf>, atomic: bool) -> Self {
        let path = path.into();
        let items = match fs::read_optional(&path) {
            Ok(None) => Vec::new(),
            Ok(Some(content)) => match serde_json::from_str::<Vec<Recommendation>>(&content) {
                Ok(items) => items,
                Err(e) => {
                    warn!(
                        "Ignoring unreadable recommendations in {}: {e}",
                        path.display()
                    );
                    Vec::new()
                }
            },
            Err(e) => {
                warn!("{e:#}");
                Vec::new()
            }
        };
        debug!("Loaded {} recommendations from {}", items.len(), path.display());
        Self { path, atomic, items }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every recommendation, including dismissed ones, in creation order.
    pub fn all(&self) -> &[Recommendation] {
        &self.items
    }

    /// Recommendations that have not been dismissed.
    pub fn active(&self) -> Vec<Recommendation> {
        self.items
            .iter()
            .filter(|r| !r.is_dismissed())
            .cloned()
            .collect()
    }

    /// Drops the non-dismissed recommendations of `kind`, appends one new recommendation per message
    /// and saves. Dismissed recommendations are kept as history. Returns the new recommendations.
    pub fn replace_kind(
        &mut self,
        kind: RecommendationKind,
        messages: Vec<String>,
        created: NaiveDate,
    ) -> Vec<Recommendation> {
        self.items.retain(|r| r.kind() != kind || r.is_dismissed());
        let fresh: Vec<Recommendation> = messages
            .into_iter()
            .map(|m| Recommendation::new(kind, m, created))
            .collect();
        self.items.extend(fresh.iter().cloned());
        self.persist();
        fresh
    }

    /// Marks `id` as dismissed. Returns false if it already was.
    ///
    /// # Errors
    /// - Returns a `Validation` error if there is no recommendation with `id`.
    pub fn dismiss(&mut self, id: &str) -> Result<bool> {
        let changed = self.find_mut(id)?.dismiss();
        if changed {
            self.persist();
        }
        Ok(changed)
    }

    /// Records feedback on `id` and returns the new feedback key.
    ///
    /// # Errors
    /// - Returns a `Validation` error if there is no recommendation with `id`.
    pub fn feedback(
        &mut self,
        id: &str,
        helpful: bool,
        comment: Option<String>,
        date: NaiveDateTime,
    ) -> Result<String> {
        let key = self.find_mut(id)?.add_feedback(helpful, comment, date);
        self.persist();
        Ok(key)
    }

    /// Writes the whole list to the file.
    pub fn save(&self) -> Result<()> {
        let data = serde_json::to_string_pretty(&self.items)
            .context("Unable to serialize recommendations")?;
        fs::rewrite(&self.path, data.as_bytes(), self.atomic)
            .with_context(|| format!("Unable to save recommendations to {}", self.path.display()))
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            warn!("{e:#}. The in-memory recommendations and their file may now differ.");
        }
    }

    fn find_mut(&mut self, id: &str) -> Result<&mut Recommendation> {
        self.items
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or_else(|| typed_error(ErrorType::Validation, format!("No recommendation with id '{id}'")))
    }
}
