//! Priority-ordered fallback across sources.
//!
//! `fetch_easy` serves a period from the cache when it can. Otherwise it opens
//! a session and walks the ranked sources one at a time until one returns a
//! value the validator accepts. Attempts never run in parallel, and at most
//! one session per period is in flight: later callers either wait for the
//! running one or are rejected, depending on [`ConcurrentFetchPolicy`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::autoconfig::AutoConfigurator;
use crate::cache::InflationCache;
use crate::clock::Clock;
use crate::errors::{FetchError, Result, RetryClass};
use crate::models::{CachedEntry, InflationReading, Period, Source};
use crate::registry::{FallbackPolicy, ResponseValidator, SourceManager};
use crate::store::{CacheStore, SessionStore};

use super::result::FetchResult;
use super::session::{FetchSession, SessionSnapshot, SessionStatus, SourceAttempt};

const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// What a second caller for an in-flight period gets.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrentFetchPolicy {
    /// Wait for the running session and share its result.
    #[default]
    Await,
    /// Fail immediately with a state conflict.
    Reject,
}

impl fmt::Display for ConcurrentFetchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Await => "await",
            Self::Reject => "reject",
        })
    }
}

impl FromStr for ConcurrentFetchPolicy {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "await" => Ok(Self::Await),
            "reject" => Ok(Self::Reject),
            other => Err(FetchError::InvalidInput(format!(
                "unknown concurrent fetch policy '{}'",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Bound on a single adapter call.
    pub attempt_timeout: Duration,
    pub fallback_policy: FallbackPolicy,
    pub concurrent_fetch: ConcurrentFetchPolicy,
    /// Initial validation flag; the auto-config record may change it.
    pub validation_enabled: bool,
    /// Run auto-configuration when no sources are registered.
    pub auto_configure: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            fallback_policy: FallbackPolicy::default(),
            concurrent_fetch: ConcurrentFetchPolicy::default(),
            validation_enabled: true,
            auto_configure: true,
        }
    }
}

type Outcome = Option<Result<FetchResult>>;
type InFlight = Arc<Mutex<HashMap<Period, watch::Receiver<Outcome>>>>;
type Running = Arc<Mutex<HashMap<String, Arc<Mutex<FetchSession>>>>>;

const ABANDONED: &str = "abandoned: the fetch was dropped before it finished";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Orchestrator mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Held by the caller that runs the session for a period. Dropping it frees
/// the period; waiters see a closed channel if no outcome was published.
struct FlightGuard {
    period: Period,
    in_flight: InFlight,
    tx: watch::Sender<Outcome>,
}

impl FlightGuard {
    fn publish(&self, result: &Result<FetchResult>) {
        let _ = self.tx.send(Some(result.clone()));
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.period);
    }
}

/// Held while a session runs. If the driving future is dropped before the
/// loop settles, the session is failed and saved in the background.
struct SessionGuard {
    session: Arc<Mutex<FetchSession>>,
    active: Running,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    settled: bool,
}

impl SessionGuard {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let snapshot = {
            let mut session = lock(&self.session);
            if !session.status().is_terminal() {
                if let Err(e) = session.complete_failure(ABANDONED, self.clock.now()) {
                    warn!("{}", e);
                }
            }
            session.snapshot()
        };
        {
            let mut active = lock(&self.active);
            if active
                .get(&snapshot.id)
                .is_some_and(|running| Arc::ptr_eq(running, &self.session))
            {
                active.remove(&snapshot.id);
            }
        }
        warn!("Session {} was abandoned as {}", snapshot.id, snapshot.status);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = self.store.clone();
                handle.spawn(async move {
                    if let Err(e) = store.save_session(&snapshot).await {
                        warn!("Failed to persist abandoned session {}: {}", snapshot.id, e);
                    }
                });
            }
            Err(_) => warn!(
                "No runtime to persist abandoned session {}",
                snapshot.id
            ),
        }
    }
}

enum Claim {
    Leader(FlightGuard),
    Follower(watch::Receiver<Outcome>),
}

/// Adapter errors only ever condemn the source that raised them. Errors that
/// would otherwise end the session become provider errors.
fn source_local(source: &Source, error: FetchError) -> FetchError {
    match error.retry_class() {
        RetryClass::Never => FetchError::provider(&source.name, error.to_string()),
        _ => error,
    }
}

/// A value that passed (or skipped) validation.
struct Accepted {
    reading: InflationReading,
    quality_score: f64,
    validated: bool,
}

pub struct FetchOrchestrator {
    cache: Arc<InflationCache>,
    sources: Arc<SourceManager>,
    validator: Arc<ResponseValidator>,
    auto_config: Option<Arc<AutoConfigurator>>,
    session_store: Arc<dyn SessionStore>,
    cache_store: Arc<dyn CacheStore>,
    config: OrchestratorConfig,
    validation_enabled: AtomicBool,
    active: Running,
    in_flight: InFlight,
    clock: Arc<dyn Clock>,
}

impl FetchOrchestrator {
    pub fn new(
        cache: Arc<InflationCache>,
        sources: Arc<SourceManager>,
        validator: Arc<ResponseValidator>,
        session_store: Arc<dyn SessionStore>,
        cache_store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = OrchestratorConfig::default();
        Self {
            cache,
            sources,
            validator,
            auto_config: None,
            session_store,
            cache_store,
            validation_enabled: AtomicBool::new(config.validation_enabled),
            config,
            active: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.validation_enabled = AtomicBool::new(config.validation_enabled);
        self.config = config;
        self
    }

    pub fn with_auto_config(mut self, auto_config: Arc<AutoConfigurator>) -> Self {
        self.auto_config = Some(auto_config);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn set_validation_enabled(&self, enabled: bool) {
        self.validation_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn validation_enabled(&self) -> bool {
        self.validation_enabled.load(Ordering::Relaxed)
    }

    /// Returns one accepted value for `period`.
    ///
    /// Fails with [`FetchError::AllSourcesFailed`] when every eligible source
    /// was tried without success. No automatic retry happens; use
    /// [`Self::retry`] on the failed session.
    pub async fn fetch_easy(&self, period: Period) -> Result<FetchResult> {
        let started = Instant::now();
        if let Some(entry) = self.cache.get(&period) {
            debug!("Cache hit for {}", period);
            return Ok(FetchResult::from_cache(entry, elapsed_ms(started)));
        }

        match self.claim(period)? {
            Claim::Follower(rx) => {
                debug!("Waiting for in-flight fetch of {}", period);
                Self::await_flight(period, rx).await
            }
            Claim::Leader(guard) => {
                // The previous leader may have filled the cache meanwhile.
                let result = match self.cache.get(&period) {
                    Some(entry) => Ok(FetchResult::from_cache(entry, elapsed_ms(started))),
                    None => self.run_new(period, started).await,
                };
                guard.publish(&result);
                result
            }
        }
    }

    /// Re-runs the fallback loop for a failed or cancelled session.
    pub async fn retry(&self, session_id: &str) -> Result<FetchResult> {
        let started = Instant::now();
        let mut session = self.load_session(session_id).await?;
        if !session.status().is_terminal() {
            return Err(FetchError::StateConflict(format!(
                "session {} is still {}",
                session_id,
                session.status()
            )));
        }

        let period = *session.period();
        let guard = match self.claim(period)? {
            Claim::Leader(guard) => guard,
            Claim::Follower(_) => {
                return Err(FetchError::StateConflict(format!(
                    "a fetch for {} is already in progress",
                    period
                )))
            }
        };

        session.retry()?;
        session.start(self.clock.now())?;
        let retry_count = session.retry_count();
        let session = Arc::new(Mutex::new(session));
        let running = self.begin(session_id, &session).await?;
        info!(
            "Retrying session {} for {} (retry #{})",
            session_id, period, retry_count
        );

        let result = self.run_attempts(&session, period, started).await;
        running.settle();
        guard.publish(&result);
        result
    }

    /// Cooperatively cancels a pending or running session.
    ///
    /// An attempt already in flight is not aborted; the loop stops before
    /// starting the next one.
    pub async fn cancel(&self, session_id: &str) -> Result<SessionSnapshot> {
        let now = self.clock.now();
        let running = lock(&self.active).get(session_id).cloned();
        let snapshot = match running {
            Some(session) => {
                let mut session = lock(&session);
                session.cancel(now)?;
                session.snapshot()
            }
            None => {
                let mut session = self.load_session(session_id).await?;
                session.cancel(now)?;
                session.snapshot()
            }
        };
        self.session_store.save_session(&snapshot).await?;
        info!("Cancelled session {}", session_id);
        Ok(snapshot)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<SessionSnapshot> {
        if let Some(session) = lock(&self.active).get(session_id) {
            return Ok(lock(session).snapshot());
        }
        self.session_store
            .get_session(session_id)
            .await?
            .ok_or_else(|| FetchError::SessionNotFound(session_id.to_string()))
    }

    pub async fn list_sessions(
        &self,
        period: Option<Period>,
        limit: usize,
    ) -> Result<Vec<SessionSnapshot>> {
        self.session_store.list_sessions(period.as_ref(), limit).await
    }

    /// Drops a cached period from memory and from the store.
    pub async fn invalidate(&self, period: &Period) -> Result<bool> {
        let removed = self.cache.invalidate(period);
        self.cache_store.delete_cached_entry(period).await?;
        Ok(removed)
    }

    /// In-memory copy for a session that is running or failed to persist its
    /// final state, the stored record otherwise.
    async fn load_session(&self, session_id: &str) -> Result<FetchSession> {
        let running = lock(&self.active).get(session_id).cloned();
        if let Some(session) = running {
            return Ok(lock(&session).clone());
        }
        let snapshot = self
            .session_store
            .get_session(session_id)
            .await?
            .ok_or_else(|| FetchError::SessionNotFound(session_id.to_string()))?;
        FetchSession::restore(snapshot)
    }

    fn claim(&self, period: Period) -> Result<Claim> {
        let mut in_flight = lock(&self.in_flight);
        if let Some(rx) = in_flight.get(&period) {
            return match self.config.concurrent_fetch {
                ConcurrentFetchPolicy::Reject => Err(FetchError::StateConflict(format!(
                    "a fetch for {} is already in progress",
                    period
                ))),
                ConcurrentFetchPolicy::Await => Ok(Claim::Follower(rx.clone())),
            };
        }
        let (tx, rx) = watch::channel(None);
        in_flight.insert(period, rx);
        Ok(Claim::Leader(FlightGuard {
            period,
            in_flight: self.in_flight.clone(),
            tx,
        }))
    }

    async fn await_flight(period: Period, mut rx: watch::Receiver<Outcome>) -> Result<FetchResult> {
        let abandoned =
            || FetchError::StateConflict(format!("in-flight fetch for {} was abandoned", period));
        let outcome = rx
            .wait_for(|outcome| outcome.is_some())
            .await
            .map(|outcome| (*outcome).clone())
            .map_err(|_| abandoned())?;
        outcome.unwrap_or_else(|| Err(abandoned()))
    }

    /// Registers sources through auto-configuration when none exist.
    async fn ensure_sources(&self) -> Result<()> {
        if !self.config.auto_configure || !self.sources.registry().is_empty() {
            return Ok(());
        }
        let Some(auto_config) = &self.auto_config else {
            return Ok(());
        };
        if !auto_config.is_discovery_enabled().await? {
            return Ok(());
        }

        info!("No sources registered, running auto-configuration");
        match auto_config.auto_configure_sources().await {
            Ok(added) => {
                info!("Auto-configuration registered {} sources", added.len());
                Ok(())
            }
            Err(e) if self.sources.registry().is_empty() => Err(e),
            Err(e) => {
                warn!("Auto-configuration partially failed: {}", e);
                Ok(())
            }
        }
    }

    async fn run_new(&self, period: Period, started: Instant) -> Result<FetchResult> {
        self.ensure_sources().await?;

        let now = self.clock.now();
        let mut session = FetchSession::new(period, now);
        session.start(now)?;
        let session_id = session.id().to_string();
        let session = Arc::new(Mutex::new(session));
        let running = self.begin(&session_id, &session).await?;
        debug!("Session {} started for {}", session_id, period);

        let result = self.run_attempts(&session, period, started).await;
        running.settle();
        result
    }

    /// Publishes a started session to the running set, then saves it. The
    /// session is visible to `cancel` and `get_session` before the first
    /// write completes.
    async fn begin(
        &self,
        session_id: &str,
        session: &Arc<Mutex<FetchSession>>,
    ) -> Result<SessionGuard> {
        lock(&self.active).insert(session_id.to_string(), session.clone());
        let guard = SessionGuard {
            session: session.clone(),
            active: self.active.clone(),
            store: self.session_store.clone(),
            clock: self.clock.clone(),
            settled: false,
        };

        let snapshot = lock(session).snapshot();
        if let Err(e) = self.session_store.save_session(&snapshot).await {
            warn!("Failed to persist session {}: {}", session_id, e);
            lock(&self.active).remove(session_id);
            guard.settle();
            return Err(e);
        }
        Ok(guard)
    }

    /// The sequential fallback loop over the ranked sources.
    async fn run_attempts(
        &self,
        session: &Arc<Mutex<FetchSession>>,
        period: Period,
        started: Instant,
    ) -> Result<FetchResult> {
        let (session_id, first_attempt) = {
            let s = lock(session);
            (s.id().to_string(), s.attempts().len())
        };
        let order = self.sources.get_fallback_order(self.config.fallback_policy);
        let mut failures: Vec<String> = Vec::new();

        for source in order {
            if lock(session).status() == SessionStatus::Cancelled {
                return self.finish_cancelled(session, &session_id).await;
            }
            if !self.sources.serves(&source, &period) {
                debug!("Skipping '{}': cannot serve {}", source.name, period);
                continue;
            }

            let attempted_at = self.clock.now();
            if source.rate_budget.is_exhausted(attempted_at) {
                let error = FetchError::RateLimitExceeded {
                    source_name: source.name.clone(),
                    retry_after: source.rate_budget.reset_at,
                };
                debug!("Skipping '{}': {}", source.name, error);
                self.push_attempt(session, &source, attempted_at, 0, Some(&error));
                failures.push(format!("{}: {}", source.name, error));
                continue;
            }

            let attempt_started = Instant::now();
            let outcome = self.attempt(&source, &period).await;
            let response_time_ms = elapsed_ms(attempt_started);

            match outcome {
                Ok(accepted) => {
                    self.push_attempt(session, &source, attempted_at, response_time_ms, None);
                    if let Err(e) = self
                        .sources
                        .mark_source_success(&source.id, response_time_ms)
                        .await
                    {
                        warn!("Could not record success of '{}': {}", source.id, e);
                    }
                    return self
                        .accept(session, &session_id, first_attempt, &source, accepted, started)
                        .await;
                }
                Err(error) => {
                    debug!(
                        "Attempt on '{}' for {} failed: {}",
                        source.name, period, error
                    );
                    self.push_attempt(
                        session,
                        &source,
                        attempted_at,
                        response_time_ms,
                        Some(&error),
                    );
                    match error.retry_class() {
                        RetryClass::FailoverWithPenalty => self.penalize(&source, &error).await,
                        RetryClass::NextSource => {}
                        RetryClass::Never => return self.fail(session, &session_id, error).await,
                    }
                    failures.push(format!("{}: {}", source.name, error));
                }
            }
        }

        if lock(session).status() == SessionStatus::Cancelled {
            return self.finish_cancelled(session, &session_id).await;
        }

        let attempts = lock(session).attempts()[first_attempt..].to_vec();
        let summary = if failures.is_empty() {
            "no eligible sources".to_string()
        } else {
            failures.join("; ")
        };
        let error = FetchError::AllSourcesFailed {
            period: period.key(),
            summary,
            attempts,
        };
        warn!("{}", error);
        self.fail(session, &session_id, error).await
    }

    /// One adapter call plus validation.
    async fn attempt(&self, source: &Source, period: &Period) -> Result<Accepted> {
        let provider = self
            .sources
            .providers()
            .get(&source.provider_id)
            .ok_or_else(|| FetchError::provider(&source.provider_id, "no adapter registered"))?;

        let credential = self
            .sources
            .credential_for(source)
            .map_err(|e| FetchError::MissingCredential(format!("{}: {}", source.id, e)))?;
        if source.auth.is_required() && credential.is_none() {
            return Err(FetchError::MissingCredential(source.id.clone()));
        }

        // Waiting for a rate-limit token counts against the attempt bound.
        let timeout = self.config.attempt_timeout;
        let call = async {
            self.sources.rate_limiter().acquire(&source.id).await;
            provider
                .fetch(&source.series_code, period, credential.as_deref())
                .await
        };
        let reading = match tokio::time::timeout(timeout, call).await {
            Ok(reading) => reading.map_err(|e| source_local(source, e))?,
            Err(_) => {
                return Err(FetchError::Timeout {
                    source_name: source.name.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        };

        if !self.validation_enabled() {
            return Ok(Accepted {
                reading,
                quality_score: 1.0,
                validated: false,
            });
        }

        let validation =
            self.validator
                .validate_for_period(&reading, source, period, self.clock.now());
        for warning in &validation.warnings {
            debug!("Validation warning for '{}': {}", source.name, warning);
        }
        match validation.to_error() {
            Some(error) => Err(error),
            None => Ok(Accepted {
                reading,
                quality_score: validation.quality_score,
                validated: true,
            }),
        }
    }

    fn push_attempt(
        &self,
        session: &Mutex<FetchSession>,
        source: &Source,
        attempted_at: chrono::DateTime<chrono::Utc>,
        response_time_ms: u64,
        error: Option<&FetchError>,
    ) {
        let attempt = SourceAttempt {
            source_id: source.id.clone(),
            source_name: source.name.clone(),
            attempted_at,
            success: error.is_none(),
            response_time_ms,
            error: error.map(|e| e.to_string()),
        };
        if let Err(e) = lock(session).record_attempt(attempt) {
            warn!("{}", e);
        }
    }

    async fn penalize(&self, source: &Source, error: &FetchError) {
        if let Err(e) = self
            .sources
            .mark_source_failed(&source.id, &error.to_string())
            .await
        {
            warn!("Could not record failure of '{}': {}", source.id, e);
        }
        if let FetchError::RateLimitExceeded {
            retry_after: Some(reset_at),
            ..
        } = error
        {
            if let Err(e) = self.sources.record_throttle(&source.id, Some(*reset_at)).await {
                warn!("Could not record throttle of '{}': {}", source.id, e);
            }
        }
    }

    async fn accept(
        &self,
        session: &Arc<Mutex<FetchSession>>,
        session_id: &str,
        first_attempt: usize,
        source: &Source,
        accepted: Accepted,
        started: Instant,
    ) -> Result<FetchResult> {
        if lock(session).status() == SessionStatus::Cancelled {
            return self.finish_cancelled(session, session_id).await;
        }
        let entry: CachedEntry =
            self.cache
                .set(accepted.reading, accepted.quality_score, accepted.validated);
        if let Err(e) = self.cache_store.save_cached_entry(&entry).await {
            warn!("Failed to persist cache entry for {}: {}", entry.period, e);
            self.cache.invalidate(&entry.period);
            let error = match e {
                FetchError::Storage(_) => e,
                other => FetchError::Storage(other.to_string()),
            };
            return self.fail(session, session_id, error).await;
        }

        let completed = {
            let mut s = lock(session);
            if s.status() == SessionStatus::Cancelled {
                None
            } else {
                s.complete_success(&source.name, self.clock.now())?;
                Some((s.snapshot(), s.attempts()[first_attempt..].to_vec()))
            }
        };
        let Some((snapshot, attempts)) = completed else {
            return self.finish_cancelled(session, session_id).await;
        };
        self.persist_final(&snapshot).await?;

        info!(
            "Fetched {} = {}% from '{}' after {} attempt(s)",
            entry.period,
            entry.rate,
            source.name,
            attempts.len()
        );
        Ok(FetchResult {
            success: true,
            data: Some(entry),
            source: Some(source.name.clone()),
            attempts,
            cached: false,
            duration_ms: elapsed_ms(started),
            session_id: Some(session_id.to_string()),
            error: None,
        })
    }

    /// Completes the session as failed and returns `error`.
    async fn fail(
        &self,
        session: &Arc<Mutex<FetchSession>>,
        session_id: &str,
        error: FetchError,
    ) -> Result<FetchResult> {
        let snapshot = {
            let mut s = lock(session);
            if s.status() == SessionStatus::Cancelled {
                None
            } else {
                s.complete_failure(&error.to_string(), self.clock.now())?;
                Some(s.snapshot())
            }
        };
        let Some(snapshot) = snapshot else {
            return self.finish_cancelled(session, session_id).await;
        };
        self.persist_final(&snapshot).await?;
        Err(error)
    }

    async fn finish_cancelled(
        &self,
        session: &Arc<Mutex<FetchSession>>,
        session_id: &str,
    ) -> Result<FetchResult> {
        let snapshot = lock(session).snapshot();
        self.persist_final(&snapshot).await?;
        info!("Session {} stopped after cancellation", session_id);
        Err(FetchError::Cancelled(session_id.to_string()))
    }

    /// Persists a terminal session and drops it from the running set.
    async fn persist_final(&self, snapshot: &SessionSnapshot) -> Result<()> {
        if let Err(e) = self.session_store.save_session(snapshot).await {
            warn!("Failed to persist session {}: {}", snapshot.id, e);
            return Err(e);
        }
        lock(&self.active).remove(&snapshot.id);
        Ok(())
    }
}
