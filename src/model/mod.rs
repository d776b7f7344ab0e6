//! Types that represent the core data model, such as `Transaction`, `Category` and
//! `Recommendation`.
mod amount;
mod category;
mod recommendation;
mod transaction;

pub use amount::{Amount, AmountError};
pub use category::{Categories, Category, CategoryRegistry, CategoryType, UNKNOWN_CATEGORY};
pub use recommendation::{Feedback, Recommendation, RecommendationKind};
pub use transaction::{generate_transaction_id, Transaction, DATE_TIME_FORMAT};
