use crate::app::App;
use crate::args::ImportArgs;
use crate::commands::{plural, Out};
use crate::model::Transaction;
use crate::{Config, Result};
use tracing::debug;

/// Imports the CSV file in `args`, adding only the rows whose ids are new to the ledger.
pub async fn import(config: Config, args: ImportArgs) -> Result<Out<Vec<Transaction>>> {
    let mut app = App::open(config)?;
    let added = app.importer().import_and_save(args.file())?;
    debug!("{} ledger changes forwarded", app.take_changes().len());
    Ok(Out::new(
        format!(
            "Imported {} from {}",
            plural(added.len(), "new transaction"),
            args.file().display()
        ),
        added,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::AddArgs;
    use crate::commands::add;
    use crate::test::TestEnv;

    #[tokio::test]
    async fn test_import_command() {
        let env = TestEnv::new().await;
        add(env.config(), AddArgs::new(10, "1").with_id("old"))
            .await
            .unwrap();
        let file = env.scratch().join("bank.csv");
        std::fs::write(
            &file,
            "ID,DateTime,CategoryID,CategoryType,Amount,Description\n\
            old,2024-05-01 10:00:00,10,EXPENSE,1.00,\n\
            new,2024-05-02 10:00:00,12,EXPENSE,30.00,\"shoes, red\"\n",
        )
        .unwrap();

        let out = import(env.config(), ImportArgs::new(&file)).await.unwrap();
        assert!(out.message().starts_with("Imported 1 new transaction from"));
        assert_eq!(out.structure().unwrap()[0].description(), Some("shoes, red"));

        let out = import(env.config(), ImportArgs::new(&file)).await.unwrap();
        assert!(out.structure().unwrap().is_empty());
        let text = std::fs::read_to_string(env.config().ledger_path()).unwrap();
        assert_eq!(text.lines().count(), 3);
    }
}
