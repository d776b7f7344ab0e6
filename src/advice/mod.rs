//! Generates recommendations from the ledger.
//!
//! A cycle gathers an `AdviceContext` and runs an ordered pipeline of `AdviceStrategy` stages. The
//! first stage that proposes at least one message wins; the local stage is always last and always
//! proposes something, so a cycle never ends empty-handed. Only one cycle runs at a time; a trigger
//! that arrives while a cycle is running is rejected, not queued.

mod context;
mod local;
mod remote;
mod store;
mod text;

pub use context::{
    AdviceContext, Holiday, HolidayCalendar, Importance, LedgerProfile, ProfileSnapshot,
    SpendingProfile, StaticCalendar, HOLIDAY_WINDOW_DAYS,
};
pub use local::{holiday_messages, LocalStrategy, MAX_RECOMMENDATIONS, MIN_RECOMMENDATIONS};
pub use remote::{
    build_prompt, content_from_response, parse_recommendations, ChatClient, ChatMessage,
    HttpChatClient, RemoteStrategy,
};
pub use store::RecommendationStore;
pub use text::{extract_candidates, strip_fences, MIN_CANDIDATE_LEN};

use crate::model::{Recommendation, RecommendationKind};
use crate::Result;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Which stage of the pipeline produced a set of recommendations.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Source {
    /// The remote service answered with the expected JSON.
    Remote,
    /// The remote service answered with free text that advice was extracted from.
    TextFallback,
    /// The local rules.
    Local,
}

serde_plain::derive_display_from_serialize!(Source);

/// What a stage proposes. `messages` become `AI_PERSONALIZED` recommendations. A non-empty
/// `holiday` replaces the `HOLIDAY_RELATED` ones.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Proposal {
    pub source: Source,
    pub messages: Vec<String>,
    pub holiday: Vec<String>,
}

impl Proposal {
    pub fn new(source: Source, messages: Vec<String>) -> Self {
        Self {
            source,
            messages,
            holiday: Vec::new(),
        }
    }

    pub fn with_holiday(mut self, holiday: Vec<String>) -> Self {
        self.holiday = holiday;
        self
    }
}

/// One stage of the recommendation pipeline.
#[async_trait::async_trait]
pub trait AdviceStrategy: Send + Sync {
    /// A short name for logs.
    fn name(&self) -> &'static str;

    /// Proposes recommendation messages for `context`. An error or an empty proposal passes the
    /// cycle on to the next stage.
    async fn propose(&self, context: &AdviceContext) -> Result<Proposal>;
}

/// The engine's status, published on a `watch` channel.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    /// No cycle has run yet.
    Idle,
    Generating,
    /// The last cycle finished with recommendations from this stage. No cycle is running.
    Finished(Source),
}

/// The result of triggering a cycle.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Cycle {
    /// The cycle ran. `recommendations` are the ones it added.
    Completed {
        source: Source,
        recommendations: Vec<Recommendation>,
    },
    /// Another cycle was already running so this trigger was dropped.
    AlreadyRunning,
}

type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Owns the recommendation list and runs generation cycles against it.
pub struct RecommendationEngine {
    store: Mutex<RecommendationStore>,
    remote: Option<Arc<dyn AdviceStrategy>>,
    local: Arc<dyn AdviceStrategy>,
    profile: Arc<dyn SpendingProfile>,
    calendar: Arc<dyn HolidayCalendar>,
    in_progress: AtomicBool,
    status: watch::Sender<CycleState>,
    clock: Clock,
}

impl RecommendationEngine {
    /// Creates an engine with only the local stage. Use `with_remote` to put a remote stage in front
    /// of it.
    pub fn new(
        store: RecommendationStore,
        profile: Arc<dyn SpendingProfile>,
        calendar: Arc<dyn HolidayCalendar>,
    ) -> Self {
        let (status, _) = watch::channel(CycleState::Idle);
        Self {
            store: Mutex::new(store),
            remote: None,
            local: Arc::new(LocalStrategy),
            profile,
            calendar,
            in_progress: AtomicBool::new(false),
            status,
            clock: Box::new(|| chrono::Local::now().naive_local()),
        }
    }

    /// Adds a remote stage that runs before the local one.
    pub fn with_remote(mut self, remote: Arc<dyn AdviceStrategy>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Replaces the source of the current time.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> NaiveDateTime + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    /// Subscribes to status updates.
    pub fn status(&self) -> watch::Receiver<CycleState> {
        self.status.subscribe()
    }

    /// True when a remote stage runs before the local one.
    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Runs a cycle that replaces the non-dismissed `AI_PERSONALIZED` recommendations. When the
    /// local stage answers with holiday advice, that replaces the `HOLIDAY_RELATED` ones.
    ///
    /// The remote stage, if configured, goes first. Any failure, empty reply or unusable reply falls
    /// through to the local stage. This never fails: problems are logged and the local stage answers.
    pub async fn generate(&self) -> Cycle {
        let Some(_guard) = self.begin() else {
            return Cycle::AlreadyRunning;
        };
        let now = (self.clock)();
        let context = self.context(now.date());
        let proposal = self.run_pipeline(&context).await;
        let source = proposal.source;
        let recommendations = {
            let mut store = self.lock();
            let mut added = store.replace_kind(
                RecommendationKind::AiPersonalized,
                proposal.messages,
                now.date(),
            );
            if !proposal.holiday.is_empty() {
                added.extend(store.replace_kind(
                    RecommendationKind::HolidayRelated,
                    proposal.holiday,
                    now.date(),
                ));
            }
            added
        };
        info!(
            "Generated {} recommendations from the {source} stage",
            recommendations.len()
        );
        self.status.send_replace(CycleState::Finished(source));
        Cycle::Completed {
            source,
            recommendations,
        }
    }

    /// Runs `generate` on the tokio runtime.
    pub fn spawn_generate(self: &Arc<Self>) -> JoinHandle<Cycle> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.generate().await })
    }

    /// Runs a cycle that replaces the non-dismissed `HOLIDAY_RELATED` recommendations with advice for
    /// the nearest upcoming holiday. With no holiday in the window, the old ones are cleared and
    /// nothing is added.
    pub async fn update_holiday_recommendations(&self) -> Cycle {
        let Some(_guard) = self.begin() else {
            return Cycle::AlreadyRunning;
        };
        let now = (self.clock)();
        let today = now.date();
        let messages = self
            .calendar
            .nearest(today, HOLIDAY_WINDOW_DAYS)
            .map(|h| holiday_messages(&h, today))
            .unwrap_or_default();
        let recommendations =
            self.lock()
                .replace_kind(RecommendationKind::HolidayRelated, messages, today);
        debug!("Holiday cycle added {} recommendations", recommendations.len());
        self.status.send_replace(CycleState::Finished(Source::Local));
        Cycle::Completed {
            source: Source::Local,
            recommendations,
        }
    }

    /// Recommendations that have not been dismissed.
    pub fn active(&self) -> Vec<Recommendation> {
        self.lock().active()
    }

    /// Every recommendation, including dismissed ones.
    pub fn all(&self) -> Vec<Recommendation> {
        self.lock().all().to_vec()
    }

    /// Dismisses `id`. Returns false if it was already dismissed.
    pub fn dismiss(&self, id: &str) -> Result<bool> {
        self.lock().dismiss(id)
    }

    /// Records feedback on `id` and returns the new feedback key.
    pub fn feedback(&self, id: &str, helpful: bool, comment: Option<String>) -> Result<String> {
        let now = (self.clock)();
        self.lock().feedback(id, helpful, comment, now)
    }

    fn context(&self, today: NaiveDate) -> AdviceContext {
        match AdviceContext::gather(today, self.profile.as_ref(), self.calendar.as_ref()) {
            Ok(context) => context,
            Err(e) => {
                warn!("{e:#}. Generating recommendations without a spending profile.");
                AdviceContext::new(
                    today,
                    ProfileSnapshot::default(),
                    self.calendar.upcoming(today, HOLIDAY_WINDOW_DAYS),
                )
            }
        }
    }

    /// Runs each stage in order and returns the first non-empty proposal. The local stage's proposal
    /// is returned even if it is empty.
    async fn run_pipeline(&self, context: &AdviceContext) -> Proposal {
        if let Some(remote) = &self.remote {
            match remote.propose(context).await {
                Ok(p) if !p.messages.is_empty() => return p,
                Ok(_) => warn!("The {} stage proposed nothing, falling back", remote.name()),
                Err(e) => warn!("The {} stage failed, falling back: {e:#}", remote.name()),
            }
        }
        match self.local.propose(context).await {
            Ok(p) => p,
            Err(e) => {
                warn!("The {} stage failed: {e:#}", self.local.name());
                local::proposal(context)
            }
        }
    }

    /// Claims the in-progress flag. `None` if a cycle is already running.
    fn begin(&self) -> Option<CycleGuard<'_>> {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            debug!("A recommendation cycle is already running");
            return None;
        }
        self.status.send_replace(CycleState::Generating);
        Some(CycleGuard { flag: &self.in_progress })
    }

    fn lock(&self) -> MutexGuard<'_, RecommendationStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the in-progress flag when a cycle ends, however it ends.
struct CycleGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
