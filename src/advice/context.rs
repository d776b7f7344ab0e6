//! The inputs a recommendation cycle works from: the user's spending profile and upcoming holidays.

use crate::error::{ErrorType, IntoResult};
use crate::ledger::LedgerStore;
use crate::model::{Amount, CategoryType};
use crate::{fs, Result};
use anyhow::Context;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// How far ahead, in days, holidays are considered.
pub const HOLIDAY_WINDOW_DAYS: i64 = 30;

/// How much a holiday tends to affect spending.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Importance {
    Major,
    Minor,
}

serde_plain::derive_display_from_serialize!(Importance);
serde_plain::derive_fromstr_from_deserialize!(Importance);

/// A dated holiday, e.g. `{"name": "Christmas", "date": "2024-12-25", "type": "PUBLIC", "importance": "MAJOR"}`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Holiday {
    pub name: String,
    pub date: NaiveDate,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub importance: Importance,
}

impl Holiday {
    pub fn new(name: impl Into<String>, date: NaiveDate, importance: Importance) -> Self {
        Self {
            name: name.into(),
            date,
            kind: String::new(),
            importance,
        }
    }

    /// Whole days from `today` until the holiday.
    pub fn days_from(&self, today: NaiveDate) -> i64 {
        (self.date - today).num_days()
    }
}

/// Provides holidays.
pub trait HolidayCalendar: Send + Sync {
    /// Holidays falling on `today` or within the next `within_days` days, soonest first.
    fn upcoming(&self, today: NaiveDate, within_days: i64) -> Vec<Holiday>;

    /// The soonest holiday within the next `within_days` days.
    fn nearest(&self, today: NaiveDate, within_days: i64) -> Option<Holiday> {
        self.upcoming(today, within_days).into_iter().next()
    }
}

/// A `HolidayCalendar` over a fixed list, usually read from `holidays.json`.
#[derive(Debug, Clone, Default)]
pub struct StaticCalendar {
    holidays: Vec<Holiday>,
}

impl StaticCalendar {
    pub fn new(mut holidays: Vec<Holiday>) -> Self {
        holidays.sort_by(|a, b| a.date.cmp(&b.date));
        Self { holidays }
    }

    /// Reads a JSON array of holidays from `path`. A missing file is an empty calendar.
    pub fn load(path: &Path) -> Result<Self> {
        let holidays: Vec<Holiday> = match fs::read_optional(path)? {
            None => Vec::new(),
            Some(content) => serde_json::from_str(&content)
                .with_context(|| format!("Unable to parse holidays from {}", path.display()))
                .typed(ErrorType::Parse)?,
        };
        debug!("Loaded {} holidays from {}", holidays.len(), path.display());
        Ok(Self::new(holidays))
    }

    pub fn holidays(&self) -> &[Holiday] {
        &self.holidays
    }
}

impl HolidayCalendar for StaticCalendar {
    fn upcoming(&self, today: NaiveDate, within_days: i64) -> Vec<Holiday> {
        let last = today + Duration::days(within_days);
        self.holidays
            .iter()
            .filter(|h| h.date >= today && h.date <= last)
            .cloned()
            .collect()
    }
}

/// Spending aggregates for one user. Month keys are `YYYY-MM`, category keys are category names.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub region: String,
    /// Average income per month over the months present in the ledger.
    pub monthly_income: Amount,
    pub monthly_spending: BTreeMap<String, BTreeMap<String, Amount>>,
    pub budgets: BTreeMap<String, Amount>,
}

impl ProfileSnapshot {
    /// Every category that appears in `monthly_spending`.
    pub fn used_categories(&self) -> BTreeSet<&str> {
        self.monthly_spending
            .values()
            .flat_map(|m| m.keys().map(String::as_str))
            .collect()
    }

    /// Total spending per category across all months.
    pub fn totals_by_category(&self) -> BTreeMap<&str, Amount> {
        let mut totals: BTreeMap<&str, Amount> = BTreeMap::new();
        for month in self.monthly_spending.values() {
            for (category, amount) in month {
                let total = totals.entry(category.as_str()).or_default();
                *total = *total + *amount;
            }
        }
        totals
    }

    /// The category with the highest cumulative spend. Ties go to the name that sorts first.
    pub fn top_category(&self) -> Option<(&str, Amount)> {
        self.totals_by_category()
            .into_iter()
            .fold(None, |best, (name, total)| match best {
                Some((_, best_total)) if best_total >= total => best,
                _ => Some((name, total)),
            })
    }

    pub fn has_spending(&self) -> bool {
        self.monthly_spending.values().any(|m| !m.is_empty())
    }

    /// Drops budgets for categories the user has never spent in.
    fn restricted(mut self) -> Self {
        let used: BTreeSet<String> = self.used_categories().into_iter().map(str::to_string).collect();
        self.budgets.retain(|name, _| used.contains(name));
        self
    }
}

/// Provides a user's spending aggregates.
pub trait SpendingProfile: Send + Sync {
    fn snapshot(&self) -> Result<ProfileSnapshot>;
}

/// A `SpendingProfile` computed from the ledger on every call.
pub struct LedgerProfile {
    store: Arc<LedgerStore>,
    region: String,
    budgets: BTreeMap<String, Amount>,
}

impl LedgerProfile {
    pub fn new(store: Arc<LedgerStore>, region: impl Into<String>, budgets: BTreeMap<String, Amount>) -> Self {
        Self {
            store,
            region: region.into(),
            budgets,
        }
    }
}

impl SpendingProfile for LedgerProfile {
    fn snapshot(&self) -> Result<ProfileSnapshot> {
        let mut months = BTreeSet::new();
        let mut income = Amount::ZERO;
        let mut spending: BTreeMap<String, BTreeMap<String, Amount>> = BTreeMap::new();
        for t in self.store.all()? {
            let ts = t.timestamp();
            let month = format!("{:04}-{:02}", ts.year(), ts.month());
            match t.kind() {
                CategoryType::Income => income = income + t.amount(),
                CategoryType::Expense => {
                    let total = spending
                        .entry(month.clone())
                        .or_default()
                        .entry(t.category().name().to_string())
                        .or_default();
                    *total = *total + t.amount();
                }
            }
            months.insert(month);
        }
        let monthly_income = if months.is_empty() {
            Amount::ZERO
        } else {
            Amount::new(income.value() / rust_decimal::Decimal::from(months.len())).rescaled()
        };
        Ok(ProfileSnapshot {
            region: self.region.clone(),
            monthly_income,
            monthly_spending: spending,
            budgets: self.budgets.clone(),
        })
    }
}

/// Everything a strategy needs to produce recommendations.
#[derive(Debug, Clone, Serialize)]
pub struct AdviceContext {
    pub today: NaiveDate,
    pub profile: ProfileSnapshot,
    /// Holidays within `HOLIDAY_WINDOW_DAYS`, soonest first.
    pub holidays: Vec<Holiday>,
}

impl AdviceContext {
    /// Builds a context, keeping only budgets for categories the user has transacted in.
    pub fn new(today: NaiveDate, profile: ProfileSnapshot, holidays: Vec<Holiday>) -> Self {
        Self {
            today,
            profile: profile.restricted(),
            holidays,
        }
    }

    /// Gathers the profile and upcoming holidays as of `today`.
    pub fn gather(
        today: NaiveDate,
        profile: &dyn SpendingProfile,
        calendar: &dyn HolidayCalendar,
    ) -> Result<Self> {
        Ok(Self::new(
            today,
            profile.snapshot()?,
            calendar.upcoming(today, HOLIDAY_WINDOW_DAYS),
        ))
    }

    pub fn nearest_holiday(&self) -> Option<&Holiday> {
        self.holidays.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryPersistence;
    use crate::model::{Category, Transaction};
    use std::str::FromStr;
    use tempfile::TempDir;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn amount(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    #[test]
    fn test_calendar_window() {
        let calendar = StaticCalendar::new(vec![
            Holiday::new("Late", date(7, 1), Importance::Minor),
            Holiday::new("Soon", date(5, 10), Importance::Major),
            Holiday::new("Past", date(4, 30), Importance::Major),
            Holiday::new("Edge", date(5, 31), Importance::Minor),
        ]);
        let names: Vec<String> = calendar
            .upcoming(date(5, 1), HOLIDAY_WINDOW_DAYS)
            .into_iter()
            .map(|h| h.name)
            .collect();
        assert_eq!(names, vec!["Soon", "Edge"]);
        assert_eq!(calendar.nearest(date(5, 1), 30).unwrap().name, "Soon");
        assert!(calendar.nearest(date(8, 1), 30).is_none());
    }

    #[test]
    fn test_calendar_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("holidays.json");
        assert!(StaticCalendar::load(&path).unwrap().holidays().is_empty());
        std::fs::write(
            &path,
            r#"[{"name":"Christmas","date":"2024-12-25","type":"PUBLIC","importance":"MAJOR"}]"#,
        )
        .unwrap();
        let calendar = StaticCalendar::load(&path).unwrap();
        assert_eq!(calendar.holidays()[0].kind, "PUBLIC");
        assert_eq!(calendar.holidays()[0].importance, Importance::Major);
        std::fs::write(&path, "not json").unwrap();
        let e = StaticCalendar::load(&path).unwrap_err();
        assert_eq!(crate::error::error_type(&e), Some(ErrorType::Parse));
    }

    #[test]
    fn test_ledger_profile() {
        let store = Arc::new(LedgerStore::new());
        store
            .initialize(Box::new(MemoryPersistence::default()))
            .unwrap();
        let food = Category::new(10, "Food", CategoryType::Expense);
        let travel = Category::new(18, "Travel", CategoryType::Expense);
        let salary = Category::new(1, "Salary", CategoryType::Income);
        let add = |id: &str, m: u32, c: &Category, a: &str| {
            store
                .add(Transaction::new(
                    id,
                    date(m, 3).and_hms_opt(12, 0, 0).unwrap(),
                    c.clone(),
                    amount(a),
                    None,
                ))
                .unwrap();
        };
        add("1", 4, &food, "10.00");
        add("2", 4, &food, "5.50");
        add("3", 5, &travel, "300.00");
        add("4", 4, &salary, "3000.00");
        add("5", 5, &salary, "3001.00");

        let budgets = BTreeMap::from([
            ("Food".to_string(), amount("200")),
            ("Health".to_string(), amount("50")),
        ]);
        let profile = LedgerProfile::new(store, "US", budgets);
        let snapshot = profile.snapshot().unwrap();
        assert_eq!(snapshot.monthly_income, amount("3000.50"));
        assert_eq!(snapshot.monthly_spending["2024-04"]["Food"], amount("15.50"));
        assert_eq!(snapshot.monthly_spending["2024-05"]["Travel"], amount("300.00"));
        assert_eq!(snapshot.top_category(), Some(("Travel", amount("300.00"))));

        let context = AdviceContext::new(date(5, 20), snapshot, Vec::new());
        assert_eq!(context.profile.budgets.len(), 1);
        assert!(context.profile.budgets.contains_key("Food"));
    }
}
