use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// The name given to categories that are synthesized for unknown ids found in the ledger file.
pub const UNKNOWN_CATEGORY: &str = "Unknown Category";

/// Whether money in a category comes in or goes out.
#[derive(Default, Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CategoryType {
    Income,
    #[default]
    Expense,
}

serde_plain::derive_display_from_serialize!(CategoryType);
serde_plain::derive_fromstr_from_deserialize!(CategoryType);

/// A spending or income category. Many transactions reference one category by its `id`.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Category {
    id: i64,
    name: String,
    #[serde(rename = "type")]
    kind: CategoryType,
}

impl Category {
    pub fn new(id: i64, name: impl Into<String>, kind: CategoryType) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
        }
    }

    /// A stand-in for a category id that the registry does not know about.
    pub fn placeholder(id: i64, kind: CategoryType) -> Self {
        Self::new(id, UNKNOWN_CATEGORY, kind)
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CategoryType {
        self.kind
    }

    pub fn is_placeholder(&self) -> bool {
        self.name == UNKNOWN_CATEGORY
    }
}

/// Looks up categories by id.
///
/// Implementations must be shareable across threads because the ledger store and the importer both
/// hold a handle to the same registry.
pub trait CategoryRegistry: Send + Sync {
    /// Returns the category with `id`, if one is registered.
    fn get(&self, id: i64) -> Option<Category>;

    /// Registers `category`, replacing any existing category with the same id.
    fn register(&self, category: Category);

    /// All registered categories ordered by id.
    fn all(&self) -> Vec<Category>;

    /// Returns the category with `id`, registering a placeholder of type `kind` if it is unknown.
    fn get_or_placeholder(&self, id: i64, kind: CategoryType) -> Category {
        match self.get(id) {
            Some(c) => c,
            None => {
                let placeholder = Category::placeholder(id, kind);
                debug!("Registering placeholder for unknown category id {id}");
                self.register(placeholder.clone());
                placeholder
            }
        }
    }
}

/// A `CategoryRegistry` held in memory.
#[derive(Debug, Default)]
pub struct Categories {
    data: RwLock<BTreeMap<i64, Category>>,
}

impl Categories {
    pub fn new(categories: impl IntoIterator<Item = Category>) -> Self {
        Self {
            data: RwLock::new(categories.into_iter().map(|c| (c.id(), c)).collect()),
        }
    }

    /// The categories a new home starts with.
    pub fn seeded() -> Self {
        Self::new(DEFAULT_CATEGORIES.iter().map(|(id, name, kind)| Category::new(*id, *name, *kind)))
    }
}

impl CategoryRegistry for Categories {
    fn get(&self, id: i64) -> Option<Category> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn register(&self, category: Category) {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(category.id(), category);
    }

    fn all(&self) -> Vec<Category> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

const DEFAULT_CATEGORIES: &[(i64, &str, CategoryType)] = &[
    (1, "Salary", CategoryType::Income),
    (2, "Bonus", CategoryType::Income),
    (3, "Investment", CategoryType::Income),
    (10, "Food", CategoryType::Expense),
    (11, "Transport", CategoryType::Expense),
    (12, "Shopping", CategoryType::Expense),
    (13, "Entertainment", CategoryType::Expense),
    (14, "Housing", CategoryType::Expense),
    (15, "Utilities", CategoryType::Expense),
    (16, "Health", CategoryType::Expense),
    (17, "Education", CategoryType::Expense),
    (18, "Travel", CategoryType::Expense),
    (19, "Subscriptions", CategoryType::Expense),
];
