//! The application root. `App` builds every long-lived component once and hands out shared handles
//! to them; nothing in the crate is a global.

use crate::advice::{
    ChatClient, HttpChatClient, LedgerProfile, RecommendationEngine, RecommendationStore,
    RemoteStrategy, StaticCalendar,
};
use crate::import::ImportDeduplicator;
use crate::ledger::{CsvPersistence, LedgerEvent, LedgerStore, SyncFacade};
use crate::model::{Categories, CategoryRegistry};
use crate::{Config, Result};
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

/// Owns the ledger, the category registry and the recommendation engine for one home directory.
pub struct App {
    config: Config,
    registry: Arc<dyn CategoryRegistry>,
    ledger: Arc<LedgerStore>,
    engine: Arc<RecommendationEngine>,
    changes: UnboundedReceiver<LedgerEvent>,
}

impl App {
    /// Opens the data files named by `config`. The remote recommendation stage is enabled when the
    /// config turns it on and a credential is available.
    pub fn open(config: Config) -> Result<Self> {
        let client: Option<Arc<dyn ChatClient>> = match config.remote().active_credential() {
            Some(key) => Some(Arc::new(
                HttpChatClient::new(config.remote(), key)
                    .context("Unable to set up the remote recommendation client")?,
            )),
            None => {
                debug!("The remote recommendation service is not configured");
                None
            }
        };
        Self::open_with_client(config, client)
    }

    /// Opens the data files named by `config`, using `client` for the remote stage if given.
    pub fn open_with_client(config: Config, client: Option<Arc<dyn ChatClient>>) -> Result<Self> {
        let registry: Arc<dyn CategoryRegistry> = Arc::new(Categories::seeded());

        let ledger = Arc::new(LedgerStore::new());
        let persistence = CsvPersistence::new(
            config.ledger_path(),
            registry.clone(),
            config.atomic_writes(),
        );
        let count = ledger.initialize(Box::new(persistence))?;
        info!("Loaded {count} transactions");

        let (facade, changes) = SyncFacade::channel();
        ledger.subscribe(Arc::new(facade));

        let profile = LedgerProfile::new(ledger.clone(), config.region(), config.budgets().clone());
        let calendar = StaticCalendar::load(&config.holidays_path())?;
        let store = RecommendationStore::open(config.recommendations_path(), config.atomic_writes());
        let mut engine = RecommendationEngine::new(store, Arc::new(profile), Arc::new(calendar));
        if let Some(client) = client {
            engine = engine.with_remote(Arc::new(RemoteStrategy::new(client)));
        }

        Ok(Self {
            config,
            registry,
            ledger,
            engine: Arc::new(engine),
            changes,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<dyn CategoryRegistry> {
        &self.registry
    }

    pub fn ledger(&self) -> &Arc<LedgerStore> {
        &self.ledger
    }

    pub fn engine(&self) -> &Arc<RecommendationEngine> {
        &self.engine
    }

    pub fn importer(&self) -> ImportDeduplicator {
        ImportDeduplicator::new(self.ledger.clone(), self.registry.clone())
    }

    /// Takes the ledger changes forwarded since the last call.
    pub fn take_changes(&mut self) -> Vec<LedgerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.changes.try_recv() {
            out.push(event);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ChangeKind;
    use crate::model::{Amount, Transaction};
    use crate::advice::{Cycle, Source};
    use crate::test::TestEnv;
    use crate::RemoteSettings;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_open_creates_ledger_and_forwards_changes() {
        let env = TestEnv::new().await;
        let mut app = App::open(env.config()).unwrap();
        assert!(env.config().ledger_path().is_file());
        assert_eq!(app.ledger().len().unwrap(), 0);

        let food = app.registry().get(10).unwrap();
        app.ledger()
            .add(Transaction::create(
                env.now(),
                food,
                Amount::from_str("12.00").unwrap(),
                None,
            ))
            .unwrap();
        let changes = app.take_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind(), ChangeKind::Add);
        assert!(app.take_changes().is_empty());

        let reopened = App::open(env.config()).unwrap();
        assert_eq!(reopened.ledger().len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_open_wires_remote_stage_when_enabled_with_credential() {
        let mut env = TestEnv::new().await;
        let remote = RemoteSettings {
            enabled: false,
            // nothing listens on the discard port, so the call fails fast
            endpoint: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            api_key: Some("test-key".to_string()),
            api_key_env: "FINTRACK_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            timeout_secs: 2,
            ..RemoteSettings::default()
        };

        let mut config = env.config();
        config.set_remote(remote.clone());
        env.set_config(config).await;
        assert!(!App::open(env.config()).unwrap().engine().has_remote());

        let mut config = env.config();
        config.set_remote(RemoteSettings {
            enabled: true,
            ..remote
        });
        env.set_config(config).await;
        let loaded = Config::load(env.config().root()).await.unwrap();
        assert!(loaded.remote().enabled);

        let app = App::open(loaded).unwrap();
        assert!(app.engine().has_remote());
        match app.engine().generate().await {
            Cycle::Completed {
                source,
                recommendations,
            } => {
                assert_eq!(source, Source::Local);
                assert!(!recommendations.is_empty());
            }
            Cycle::AlreadyRunning => panic!("no other cycle is running"),
        }
    }
}
