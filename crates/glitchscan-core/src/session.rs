use crate::classifier::{Classifier, Outcome};
use crate::executor::{ExecutorError, TrialExecutor};
use crate::space::{ParameterPoint, ParameterSpace};
use crate::store::ResultStore;
use crate::strategy::{Proposal, SearchStrategy};
use crate::translator::{EncodedPoint, IdentityTranslator, TranslateError, UnitTranslator};
use crate::util::{CancelToken, NamedProgress};
use arc_swap::ArcSwap;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Configuration parameters for a search session.
///
/// Controls the trial budget, the retry policy and pacing.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchConfig {
    /// Maximum number of trials recorded by the session
    pub budget: u64,
    /// Retries of a trial after a transient executor error or timeout
    pub max_retries: u32,
    /// Time limit for a single executor call
    pub trial_timeout: Duration,
    /// Pause after each recorded trial (None = no pause)
    pub iteration_delay: Option<Duration>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            budget: 1000,
            max_retries: 2,
            trial_timeout: Duration::from_secs(5),
            iteration_delay: None,
        }
    }
}

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Built but not started
    Idle,
    /// The controller loop is active
    Running,
    /// The strategy finished or the budget ran out
    Completed,
    /// Stopped early; see [`AbortReason`]
    Aborted,
}

impl SessionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionStatus::Idle,
            1 => SessionStatus::Running,
            2 => SessionStatus::Completed,
            _ => SessionStatus::Aborted,
        }
    }

    /// Whether the session has finished, successfully or not.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Aborted)
    }
}

/// Why a session stopped before its strategy was done.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AbortReason {
    /// Cancellation was requested.
    #[error("Cancelled")]
    Cancelled,
    /// The executor reported an unusable device.
    #[error("Device fault: {0}")]
    DeviceFault(String),
    /// A proposed point could not be translated.
    #[error("Could not translate point ({point}): {error}")]
    Translation {
        /// The proposed point
        point: ParameterPoint,
        /// Translator error
        error: TranslateError,
    },
    /// Recording a trial failed.
    #[error("Could not record trial: {0}")]
    Store(String),
}

impl Serialize for AbortReason {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Result of a finished session.
///
/// The store holds every trial recorded before the session ended, also when
/// it was aborted.
#[derive(Clone, Debug)]
pub struct SessionReport {
    /// Final status, [`SessionStatus::Completed`] or [`SessionStatus::Aborted`]
    pub status: SessionStatus,
    /// Set if the session was aborted
    pub abort_reason: Option<AbortReason>,
    /// The frozen result store
    pub store: ResultStore,
    /// Trials recorded by this session (excluding resumed ones)
    pub trials_executed: u64,
    /// Wall time of the controller loop
    pub elapsed: Duration,
}

/// Errors of the session lifecycle.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `join` was called on a session that never started in the background.
    #[error("Session was not started")]
    NotStarted,
    /// `start` or `run` was called twice.
    #[error("Session was already started")]
    AlreadyStarted,
    /// The controller thread panicked.
    #[error("Session worker panicked")]
    WorkerPanicked,
    /// The controller thread could not be spawned.
    #[error("Failed to spawn session worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors reported by [`SessionBuilder::build`].
#[derive(Debug, Error)]
pub enum BuildError {
    /// No parameter space specified.
    #[error("No parameter space specified")]
    Space,
    /// No search strategy specified.
    #[error("No search strategy specified")]
    Strategy,
    /// No trial executor specified.
    #[error("No trial executor specified")]
    Executor,
    /// No classifier specified.
    #[error("No classifier specified")]
    Classifier,
    /// The store to resume from covers a different parameter space.
    #[error("Resumed store does not match the parameter space")]
    ResumeMismatch,
    /// The configuration is unusable.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// State visible to handles. The controller owns the live store and publishes
/// a frozen copy after every trial, so readers never wait for the controller.
struct Shared {
    status: AtomicU8,
    cancel: CancelToken,
    published: ArcSwap<ResultStore>,
}

impl Shared {
    fn status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: SessionStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    fn publish(&self, store: &ResultStore) {
        self.published.store(Arc::new(store.snapshot()));
    }

    fn snapshot(&self) -> Arc<ResultStore> {
        self.published.load_full()
    }
}

/// Cloneable handle to observe and cancel a session from other threads.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    /// Requests cancellation. Takes effect before the next trial.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        self.shared.status()
    }

    /// A frozen copy of the trials recorded so far. Never blocks.
    pub fn snapshot(&self) -> Arc<ResultStore> {
        self.shared.snapshot()
    }
}

struct Controller {
    space: ParameterSpace,
    store: ResultStore,
    strategy: Box<dyn SearchStrategy + Send>,
    translator: Arc<dyn UnitTranslator + Send + Sync>,
    executor: Box<dyn TrialExecutor + Send>,
    classifier: Box<dyn Classifier + Send>,
    config: SearchConfig,
    progress: Option<MultiProgress>,
}

/// A search session: drives one strategy against one executor until the
/// strategy is done, the budget is exhausted, the device faults or the session
/// is cancelled.
///
/// Use [`Session::builder()`] to construct a session. Trials are strictly
/// serialized. [`run`](Session::run) blocks the calling thread,
/// [`start`](Session::start) moves the controller to a background thread
/// that [`join`](Session::join) waits for.
pub struct Session {
    shared: Arc<Shared>,
    controller: Option<Controller>,
    worker: Option<JoinHandle<SessionReport>>,
}

impl Session {
    /// Creates a new session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// A handle for other threads.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        self.shared.status()
    }

    /// Requests cancellation. Takes effect before the next trial.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
    }

    /// A frozen copy of the trials recorded so far. Never blocks.
    pub fn snapshot(&self) -> Arc<ResultStore> {
        self.shared.snapshot()
    }

    /// Runs the session on the current thread until it ends.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyStarted`] if the session was started before.
    pub fn run(mut self) -> Result<SessionReport, SessionError> {
        let controller = self.controller.take().ok_or(SessionError::AlreadyStarted)?;
        self.shared.set_status(SessionStatus::Running);
        Ok(controller.run(&self.shared))
    }

    /// Starts the session on a background thread.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyStarted`] if the session was started before
    /// and [`SessionError::Spawn`] if the thread cannot be created.
    pub fn start(&mut self) -> Result<(), SessionError> {
        let controller = self.controller.take().ok_or(SessionError::AlreadyStarted)?;
        let shared = Arc::clone(&self.shared);
        self.shared.set_status(SessionStatus::Running);
        let worker = thread::Builder::new()
            .name("glitchscan-session".into())
            .spawn(move || controller.run(&shared))
            .inspect_err(|_| self.shared.set_status(SessionStatus::Aborted))?;
        self.worker = Some(worker);
        Ok(())
    }

    /// Waits for a started session to end.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotStarted`] if [`start`](Session::start) was not
    /// called and [`SessionError::WorkerPanicked`] if the controller panicked.
    pub fn join(mut self) -> Result<SessionReport, SessionError> {
        let worker = self.worker.take().ok_or(SessionError::NotStarted)?;
        worker.join().map_err(|_| {
            self.shared.set_status(SessionStatus::Aborted);
            SessionError::WorkerPanicked
        })
    }
}

impl Controller {
    fn run(mut self, shared: &Shared) -> SessionReport {
        let start = Instant::now();
        shared.set_status(SessionStatus::Running);
        info!(
            "Starting {} search over {} grid cells with a budget of {} trials",
            self.strategy.name(),
            self.space.grid_size(),
            self.config.budget
        );
        let budget_progress = self.progress.as_ref().map(|p| {
            let p = p.add(ProgressBar::new(self.config.budget));
            p.set_style(ProgressStyle::named_bar("Trial budget"));
            p
        });

        let mut remaining = self.config.budget;
        let mut executed = 0;
        let abort_reason = loop {
            if shared.cancel.is_cancelled() {
                info!("Cancellation requested. Stopping.");
                break Some(AbortReason::Cancelled);
            }
            if remaining == 0 {
                info!("Trial budget exhausted. Stopping.");
                break None;
            }
            let proposal = self.strategy.propose(&self.space, &self.store, remaining);
            let points = match proposal {
                Proposal::Done => {
                    info!("Strategy {} is done.", self.strategy.name());
                    break None;
                }
                Proposal::Points(points) => points,
            };
            debug!(
                "{} proposed {} point(s)",
                self.strategy.name(),
                points.len()
            );
            let batch = usize::try_from(remaining).unwrap_or(usize::MAX);
            if let Some(reason) = self.run_batch(
                shared,
                points.into_iter().take(batch),
                &mut remaining,
                &mut executed,
                budget_progress.as_ref(),
            ) {
                break Some(reason);
            }
        };

        self.store.freeze();
        shared.publish(&self.store);
        let status = match abort_reason {
            Some(_) => SessionStatus::Aborted,
            None => SessionStatus::Completed,
        };
        shared.set_status(status);
        if let Some(p) = &budget_progress {
            p.finish();
        }
        info!(
            "Session {:?} after {} trials: {:?}",
            status,
            executed,
            self.store.class_counts()
        );
        SessionReport {
            status,
            abort_reason,
            store: self.store,
            trials_executed: executed,
            elapsed: start.elapsed(),
        }
    }

    fn run_batch(
        &mut self,
        shared: &Shared,
        points: impl Iterator<Item = ParameterPoint>,
        remaining: &mut u64,
        executed: &mut u64,
        progress: Option<&ProgressBar>,
    ) -> Option<AbortReason> {
        for point in points {
            if shared.cancel.is_cancelled() {
                info!("Cancellation requested. Stopping.");
                return Some(AbortReason::Cancelled);
            }
            let encoded = match self.translator.translate(&self.space, &point) {
                Ok(encoded) => encoded,
                Err(error) => {
                    warn!("Failed to translate {}: {}", point, error);
                    return Some(AbortReason::Translation { point, error });
                }
            };
            let (outcome, retries) = match self.execute_with_retries(&encoded) {
                Ok(result) => result,
                Err(fault) => {
                    warn!("Device fault at {}: {}", point, fault);
                    return Some(AbortReason::DeviceFault(fault));
                }
            };
            debug!("Trial at {} ({}): {}", point, encoded, outcome.class);
            if let Err(e) = self.store.record(point, encoded, outcome, retries) {
                warn!("Failed to record trial: {}", e);
                return Some(AbortReason::Store(e.to_string()));
            }
            shared.publish(&self.store);
            *remaining -= 1;
            *executed += 1;
            if let Some(p) = progress {
                p.inc(1);
            }
            if let Some(delay) = self.config.iteration_delay
                && *remaining > 0
                && !shared.cancel.is_cancelled()
            {
                thread::sleep(delay);
            }
        }
        None
    }

    /// Executes one trial, retrying recoverable errors.
    ///
    /// Returns the outcome and the number of retries, or the message of a device fault.
    fn execute_with_retries(&mut self, encoded: &EncodedPoint) -> Result<(Outcome, u32), String> {
        let timeout = self.config.trial_timeout;
        let attempts = self.config.max_retries.saturating_add(1);
        let mut last_error = None;
        for attempt in 0..attempts {
            let started = Instant::now();
            let result = self.executor.execute(encoded, timeout);
            let elapsed = started.elapsed();
            let result = match result {
                Ok(_) if elapsed > timeout => Err(ExecutorError::Timeout(elapsed)),
                other => other,
            };
            match result {
                Ok(signal) => return Ok((self.classifier.classify(&signal), attempt)),
                Err(ExecutorError::DeviceFault(msg)) => return Err(msg),
                Err(e) => {
                    warn!("Attempt {}/{} failed: {}", attempt + 1, attempts, e);
                    last_error = Some(e);
                }
            }
        }
        let last_error = last_error.map(|e| e.to_string()).unwrap_or_default();
        Ok((
            Outcome::retries_exhausted(attempts, last_error),
            attempts - 1,
        ))
    }
}

/// Builder for [`Session`]s.
///
/// Space, strategy, executor and classifier are required. The translator
/// defaults to [`IdentityTranslator`].
#[derive(Default)]
pub struct SessionBuilder {
    space: Option<ParameterSpace>,
    strategy: Option<Box<dyn SearchStrategy + Send>>,
    translator: Option<Arc<dyn UnitTranslator + Send + Sync>>,
    executor: Option<Box<dyn TrialExecutor + Send>>,
    classifier: Option<Box<dyn Classifier + Send>>,
    config: SearchConfig,
    cancel: Option<CancelToken>,
    progress: Option<MultiProgress>,
    resume_from: Option<ResultStore>,
}

impl SessionBuilder {
    /// Sets the parameter space to search.
    pub fn space(mut self, space: ParameterSpace) -> Self {
        self.space = Some(space);
        self
    }

    /// Sets the search strategy.
    pub fn strategy(mut self, strategy: impl SearchStrategy + Send + 'static) -> Self {
        self.strategy = Some(Box::new(strategy));
        self
    }

    /// Sets the unit translator.
    pub fn translator(mut self, translator: impl UnitTranslator + Send + Sync + 'static) -> Self {
        self.translator = Some(Arc::new(translator));
        self
    }

    /// Uses a translator that is shared with someone else, e.g. a simulated target.
    pub fn shared_translator(mut self, translator: Arc<dyn UnitTranslator + Send + Sync>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Sets the trial executor.
    pub fn executor(mut self, executor: impl TrialExecutor + Send + 'static) -> Self {
        self.executor = Some(Box::new(executor));
        self
    }

    /// Sets the classifier.
    pub fn classifier(mut self, classifier: impl Classifier + Send + 'static) -> Self {
        self.classifier = Some(Box::new(classifier));
        self
    }

    /// Sets the search configuration.
    pub fn config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Observes an externally owned cancellation token.
    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Shows a budget bar in `progress`.
    pub fn progress(mut self, progress: MultiProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Continues a previous campaign. Its trials are kept and steer the strategy;
    /// the budget only counts new trials.
    pub fn resume_from(mut self, store: ResultStore) -> Self {
        self.resume_from = Some(store);
        self
    }

    /// Builds the session.
    ///
    /// # Errors
    ///
    /// Fails if a required component is missing, the configuration is unusable
    /// or the store to resume from covers another space.
    pub fn build(self) -> Result<Session, BuildError> {
        if self.config.trial_timeout.is_zero() {
            return Err(BuildError::InvalidConfig(
                "trial_timeout must be positive".into(),
            ));
        }
        let space = self.space.ok_or(BuildError::Space)?;
        let store = match self.resume_from {
            Some(previous) if previous.space() != &space => return Err(BuildError::ResumeMismatch),
            Some(previous) => ResultStore::continue_from(&previous),
            None => ResultStore::new(space.clone()),
        };
        let controller = Controller {
            strategy: self.strategy.ok_or(BuildError::Strategy)?,
            translator: self
                .translator
                .unwrap_or_else(|| Arc::new(IdentityTranslator)),
            executor: self.executor.ok_or(BuildError::Executor)?,
            classifier: self.classifier.ok_or(BuildError::Classifier)?,
            config: self.config,
            progress: self.progress,
            space,
            store,
        };
        Ok(Session {
            shared: Arc::new(Shared {
                status: AtomicU8::new(SessionStatus::Idle as u8),
                cancel: self.cancel.unwrap_or_default(),
                published: ArcSwap::from_pointee(controller.store.snapshot()),
            }),
            controller: Some(controller),
            worker: None,
        })
    }
}
