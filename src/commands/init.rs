use crate::app::App;
use crate::commands::Out;
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the home directory, an initial `config.json` with default settings and an empty ledger
/// file.
///
/// # Arguments
/// - `home` - The directory that will be the root of the data directory, e.g. `$HOME/fintrack`
///
/// # Errors
/// - Returns an error if any file operations fail.
pub async fn init(home: &Path) -> Result<Out<()>> {
    let config = Config::create(home)
        .await
        .context("Unable to create the data directory and config")?;
    let root = config.root().display().to_string();
    // Opening the app creates the ledger file with its header.
    App::open(config)?;
    Ok(format!("Successfully created the fintrack directory at {root}").into())
}
