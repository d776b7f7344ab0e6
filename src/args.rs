//! These structs provide the CLI interface for the fintrack CLI.

use crate::model::CategoryType;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing::level_filters::LevelFilter;

/// fintrack: A command-line personal-finance ledger.
///
/// Transactions are kept in a CSV file in the fintrack home directory. You can add, update and
/// delete them, import more from CSV files that use the same layout, and ask for spending
/// recommendations. Recommendations come from a remote text-generation service when one is
/// configured in config.json, and from built-in rules otherwise.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the home directory and a default config.json.
    ///
    /// This is the first command you should run. By default the home directory is $HOME/fintrack;
    /// pass --home or set FINTRACK_HOME to put it somewhere else.
    Init,
    /// Add a transaction to the ledger.
    Add(AddArgs),
    /// Delete a transaction by id.
    Delete(DeleteArgs),
    /// Replace the fields of an existing transaction.
    Update(UpdateArgs),
    /// List transactions, newest first.
    List(ListArgs),
    /// Show total income, total expense and the balance.
    Summary,
    /// Import transactions from a CSV file, skipping ids the ledger already has.
    Import(ImportArgs),
    /// Generate new personalized recommendations.
    Advise,
    /// Refresh the holiday recommendations from the holiday list.
    Holidays,
    /// Show recommendations.
    Recommendations(RecommendationsArgs),
    /// Dismiss a recommendation.
    Dismiss(DismissArgs),
    /// Leave feedback on a recommendation.
    Feedback(FeedbackArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where fintrack data and configuration is held. Defaults to ~/fintrack
    #[arg(long, env = "FINTRACK_HOME", default_value_t = default_fintrack_home())]
    home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, home: PathBuf) -> Self {
        Self {
            log_level,
            home: home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn home(&self) -> &DisplayPath {
        &self.home
    }
}

/// Args for the `fintrack add` command.
#[derive(Debug, ClapArgs, Clone)]
pub struct AddArgs {
    /// The category id, e.g. 10 for Food.
    #[arg(long)]
    category_id: i64,

    /// The amount, e.g. 68.50.
    #[arg(long, allow_hyphen_values = true)]
    amount: String,

    /// When the transaction happened, as `YYYY-MM-DD HH:MM:SS`. Defaults to now.
    #[arg(long)]
    date: Option<String>,

    #[arg(long)]
    description: Option<String>,

    /// Use this id instead of generating one.
    #[arg(long)]
    id: Option<String>,
}

impl AddArgs {
    pub fn new(category_id: i64, amount: impl Into<String>) -> Self {
        Self {
            category_id,
            amount: amount.into(),
            date: None,
            description: None,
            id: None,
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn category_id(&self) -> i64 {
        self.category_id
    }

    pub fn amount(&self) -> &str {
        &self.amount
    }

    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// Args for the `fintrack delete` command.
#[derive(Debug, ClapArgs, Clone)]
pub struct DeleteArgs {
    /// The id of the transaction to delete.
    id: String,
}

impl DeleteArgs {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Args for the `fintrack update` command. Fields that are not given keep their current value.
#[derive(Debug, ClapArgs, Clone)]
pub struct UpdateArgs {
    /// The id of the transaction to update.
    id: String,

    #[arg(long)]
    category_id: Option<i64>,

    #[arg(long, allow_hyphen_values = true)]
    amount: Option<String>,

    /// As `YYYY-MM-DD HH:MM:SS`.
    #[arg(long)]
    date: Option<String>,

    #[arg(long)]
    description: Option<String>,
}

impl UpdateArgs {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category_id: None,
            amount: None,
            date: None,
            description: None,
        }
    }

    pub fn with_amount(mut self, amount: impl Into<String>) -> Self {
        self.amount = Some(amount.into());
        self
    }

    pub fn with_category_id(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn category_id(&self) -> Option<i64> {
        self.category_id
    }

    pub fn amount(&self) -> Option<&str> {
        self.amount.as_deref()
    }

    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Args for the `fintrack list` command.
#[derive(Debug, Default, ClapArgs, Clone)]
pub struct ListArgs {
    /// Only list INCOME or EXPENSE transactions.
    #[arg(long = "type")]
    kind: Option<CategoryType>,

    /// Only list transactions in this category.
    #[arg(long)]
    category_id: Option<i64>,
}

impl ListArgs {
    pub fn new(kind: Option<CategoryType>, category_id: Option<i64>) -> Self {
        Self { kind, category_id }
    }

    pub fn kind(&self) -> Option<CategoryType> {
        self.kind
    }

    pub fn category_id(&self) -> Option<i64> {
        self.category_id
    }
}

/// Args for the `fintrack import` command.
#[derive(Debug, ClapArgs, Clone)]
pub struct ImportArgs {
    /// The CSV file to import. It must use the ledger's column layout.
    file: PathBuf,
}

impl ImportArgs {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self { file: file.into() }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }
}

/// Args for the `fintrack recommendations` command.
#[derive(Debug, Default, ClapArgs, Clone)]
pub struct RecommendationsArgs {
    /// Include dismissed recommendations.
    #[arg(long)]
    all: bool,
}

impl RecommendationsArgs {
    pub fn new(all: bool) -> Self {
        Self { all }
    }

    pub fn all(&self) -> bool {
        self.all
    }
}

/// Args for the `fintrack dismiss` command.
#[derive(Debug, ClapArgs, Clone)]
pub struct DismissArgs {
    id: String,
}

impl DismissArgs {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Args for the `fintrack feedback` command.
#[derive(Debug, ClapArgs, Clone)]
pub struct FeedbackArgs {
    id: String,

    /// The recommendation was helpful.
    #[arg(long, conflicts_with = "not_helpful", required_unless_present = "not_helpful")]
    helpful: bool,

    /// The recommendation was not helpful.
    #[arg(long)]
    not_helpful: bool,

    #[arg(long)]
    comment: Option<String>,
}

impl FeedbackArgs {
    pub fn new(id: impl Into<String>, helpful: bool, comment: Option<String>) -> Self {
        Self {
            id: id.into(),
            helpful,
            not_helpful: !helpful,
            comment,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn helpful(&self) -> bool {
        self.helpful && !self.not_helpful
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }
}

fn default_fintrack_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("fintrack"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --home or FINTRACK_HOME instead of relying on the default \
                fintrack home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("fintrack")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        let args = Args::try_parse_from([
            "fintrack", "--home", "/tmp/x", "list", "--type", "EXPENSE", "--category-id", "10",
        ])
        .unwrap();
        assert_eq!(args.common().home().path(), Path::new("/tmp/x"));
        match args.command() {
            Command::List(list) => {
                assert_eq!(list.kind(), Some(CategoryType::Expense));
                assert_eq!(list.category_id(), Some(10));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_add_negative_amount() {
        let args = Args::try_parse_from([
            "fintrack", "add", "--category-id", "10", "--amount", "-3.50",
        ])
        .unwrap();
        match args.command() {
            Command::Add(add) => assert_eq!(add.amount(), "-3.50"),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_feedback() {
        let args = Args::try_parse_from(["fintrack", "feedback", "rec-1", "--not-helpful"]).unwrap();
        match args.command() {
            Command::Feedback(f) => {
                assert_eq!(f.id(), "rec-1");
                assert!(!f.helpful());
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(Args::try_parse_from(["fintrack", "feedback", "rec-1"]).is_err());
        assert!(
            Args::try_parse_from(["fintrack", "feedback", "rec-1", "--helpful", "--not-helpful"])
                .is_err()
        );
    }
}
