// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session orchestration: selection, priming, generation and titles.
//!
//! The orchestrator owns at most one message subscription, one priming
//! job and one generation job at a time. Each is held by its
//! [`AbortHandle`] and cancelled before a replacement starts. Title jobs
//! run on a [`TaskTracker`] so callers can drain them on exit.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::StreamExt;
use futures::future::{BoxFuture, FutureExt, Shared};
use recall_config::RecallConfig;
use recall_core::{ChatMessage, ChatSession, InferenceEngine, RecallError, StorageAdapter};
use recall_memory::{RetrievalIndex, augment_prompt};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::state::{ChatState, EngineStatus, StateCell};
use crate::title::{clean_title, title_prompt};

/// Behavior knobs taken from `[memory]` and `[chat]`.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub memory_enabled: bool,
    pub max_results: usize,
    pub similarity_threshold: f32,
    pub default_title: String,
}

impl OrchestratorSettings {
    pub fn from_config(config: &RecallConfig) -> Self {
        Self {
            memory_enabled: config.memory.enabled,
            max_results: config.memory.max_results,
            similarity_threshold: config.memory.similarity_threshold,
            default_title: config.chat.default_title.clone(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&RecallConfig::default())
    }
}

/// A spawned task that can be cancelled and joined by many waiters.
struct Job {
    abort: AbortHandle,
    done: Shared<BoxFuture<'static, ()>>,
}

impl Job {
    fn spawn<F>(fut: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        let abort = handle.abort_handle();
        let done = async move {
            let _ = handle.await;
        }
        .boxed()
        .shared();
        Self { abort, done }
    }
}

/// Context replay for the selected session.
///
/// `snapshot` flips to true once the history has been read from storage.
/// Turns written after that point are not part of the replay.
struct Priming {
    job: Job,
    snapshot: watch::Receiver<bool>,
}

#[derive(Default)]
struct Jobs {
    sessions: Option<AbortHandle>,
    messages: Option<(String, AbortHandle)>,
    priming: Option<Priming>,
    generation: Option<AbortHandle>,
}

struct Inner {
    storage: Arc<dyn StorageAdapter>,
    engine: Arc<dyn InferenceEngine>,
    retrieval: Option<Arc<RetrievalIndex>>,
    settings: OrchestratorSettings,
    state: StateCell,
    jobs: Mutex<Jobs>,
    background: TaskTracker,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let jobs = self.jobs.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(h) = jobs.sessions.take() {
            h.abort();
        }
        if let Some((_, h)) = jobs.messages.take() {
            h.abort();
        }
        if let Some(priming) = jobs.priming.take() {
            priming.job.abort.abort();
        }
        if let Some(h) = jobs.generation.take() {
            h.abort();
        }
    }
}

/// Coordinates storage, retrieval and the engine for one chat surface.
#[derive(Clone)]
pub struct SessionOrchestrator {
    inner: Arc<Inner>,
}

impl SessionOrchestrator {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        engine: Arc<dyn InferenceEngine>,
        retrieval: Option<Arc<RetrievalIndex>>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                engine,
                retrieval,
                settings,
                state: StateCell::new(),
                jobs: Mutex::new(Jobs::default()),
                background: TaskTracker::new(),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> ChatState {
        self.inner.state.snapshot()
    }

    pub fn current_session_id(&self) -> Option<String> {
        self.inner.state.snapshot().current_session_id
    }

    /// Session id of the live message subscription.
    pub fn active_subscription(&self) -> Option<String> {
        self.inner
            .jobs()
            .messages
            .as_ref()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(id, _)| id.clone())
    }

    /// Prune empty sessions, publish the list and select the latest one.
    pub async fn start(&self) -> Result<(), RecallError> {
        let inner = &self.inner;
        let pruned = inner.storage.delete_empty_sessions().await?;
        if pruned > 0 {
            info!(pruned, "removed empty sessions");
        }
        let sessions = inner.storage.list_sessions().await?;
        let latest = sessions.first().map(|s| s.id.clone());
        inner.state.set_sessions(sessions);
        if let Some(id) = latest
            && inner.state.claim_if_unselected(&id)
        {
            inner.select_session(&id);
        }
        inner.watch_sessions();
        Ok(())
    }

    /// Run engine initialization, mirroring progress into the state.
    pub async fn initialize_engine(&self) -> Result<(), RecallError> {
        self.inner.state.set_engine(EngineStatus::Loading(0.0));
        self.inner.run_initialize().await
    }

    /// Initialize again unless the engine is ready or loading.
    ///
    /// Returns false when nothing was started.
    pub async fn retry_initialization(&self) -> Result<bool, RecallError> {
        if !self.inner.state.try_begin_loading() {
            return Ok(false);
        }
        self.inner.run_initialize().await.map(|()| true)
    }

    pub fn select_session(&self, session_id: &str) {
        self.inner.select_session(session_id);
    }

    /// Start a fresh session unless the current one has no messages yet.
    pub async fn create_new_chat(&self) -> Result<Option<String>, RecallError> {
        if let Some(current) = self.current_session_id()
            && self.inner.storage.messages_for_session(&current).await?.is_empty()
        {
            return Ok(None);
        }
        let session = self.inner.create_session().await?;
        Ok(Some(session))
    }

    /// Persist `text`, generate a reply and persist that too.
    ///
    /// Returns the full reply, or `None` for blank input or a cancelled
    /// generation.
    pub async fn send_message(&self, text: &str) -> Result<Option<String>, RecallError> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let inner = &self.inner;
        let session_id = match self.current_session_id() {
            Some(id) => id,
            None => {
                warn!("no active session, creating one");
                inner.create_session().await?
            }
        };

        inner.priming_snapshot_taken().await;
        inner
            .storage
            .upsert_message(&ChatMessage::user(&session_id, text))
            .await?;
        inner.join_priming().await;

        let prompt = inner.augment(text).await;
        let handle = tokio::spawn(inner.clone().respond(
            session_id.clone(),
            prompt,
            text.to_string(),
        ));
        inner.jobs().generation = Some(handle.abort_handle());

        match handle.await {
            Ok(reply) => reply.map(Some),
            Err(e) if e.is_cancelled() => {
                inner.state.end_typing(&session_id);
                info!(session_id = %session_id, "generation cancelled");
                Ok(None)
            }
            Err(e) => {
                inner.state.end_typing(&session_id);
                Err(RecallError::Internal(format!("generation task failed: {e}")))
            }
        }
    }

    /// Abort the in-flight generation. Returns false if none was running.
    pub fn cancel_generation(&self) -> bool {
        match self.inner.jobs().generation.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    /// Wait for background title jobs to finish.
    pub async fn wait_background(&self) {
        let tracker = &self.inner.background;
        tracker.close();
        tracker.wait().await;
        tracker.reopen();
    }
}

impl Inner {
    fn jobs(&self) -> MutexGuard<'_, Jobs> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_initialize(self: &Arc<Self>) -> Result<(), RecallError> {
        let state = self.state.clone();
        let progress = move |p: f32| state.set_engine(EngineStatus::Loading(p));
        match self.engine.initialize(&progress).await {
            Ok(()) => {
                self.state.set_engine(EngineStatus::Ready);
                info!(model_id = %self.engine.model_id(), "engine ready");
                match self.state.snapshot().current_session_id {
                    Some(id) => {
                        let mut jobs = self.jobs();
                        self.spawn_priming(&mut jobs, &id);
                    }
                    None => {
                        if let Err(e) = self.engine.start_session(&[]).await {
                            warn!(error = %e, "failed to open an empty session");
                        }
                    }
                }
                Ok(())
            }
            Err(e) => {
                warn!(model_id = %self.engine.model_id(), error = %e, "engine initialization failed");
                self.state.set_engine(EngineStatus::Error(e.user_message()));
                Err(e)
            }
        }
    }

    async fn create_session(self: &Arc<Self>) -> Result<String, RecallError> {
        let session = ChatSession::new(self.settings.default_title.clone());
        self.storage.upsert_session(&session).await?;
        self.select_session(&session.id);
        Ok(session.id)
    }

    fn watch_sessions(self: &Arc<Self>) {
        let mut stream = self.storage.watch_sessions();
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                match item {
                    Ok(sessions) => {
                        let latest = sessions.first().map(|s| s.id.clone());
                        inner.state.set_sessions(sessions);
                        if let Some(id) = latest
                            && inner.state.claim_if_unselected(&id)
                        {
                            inner.select_session(&id);
                        }
                    }
                    Err(e) => warn!(error = %e, "session subscription error"),
                }
            }
        });
        if let Some(old) = self.jobs().sessions.replace(handle.abort_handle()) {
            old.abort();
        }
    }

    fn select_session(self: &Arc<Self>, session_id: &str) {
        let mut jobs = self.jobs();
        if let Some((_, old)) = jobs.messages.take() {
            old.abort();
        }
        self.state.select(session_id);

        let id = session_id.to_string();
        let state = self.state.clone();
        let mut stream = self.storage.watch_messages(session_id);
        let subscription = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(messages) => {
                        state.set_messages_for(&id, messages);
                    }
                    Err(e) => warn!(session_id = %id, error = %e, "message subscription error"),
                }
            }
        });
        jobs.messages = Some((session_id.to_string(), subscription.abort_handle()));
        self.spawn_priming(&mut jobs, session_id);
        debug!(session_id, "session selected");
    }

    /// Replace the priming job with one replaying `session_id`.
    fn spawn_priming(&self, jobs: &mut Jobs, session_id: &str) {
        if let Some(old) = jobs.priming.take() {
            old.job.abort.abort();
        }
        let storage = self.storage.clone();
        let engine = self.engine.clone();
        let id = session_id.to_string();
        let (taken, snapshot) = watch::channel(false);
        let job = Job::spawn(async move {
            let loaded = storage.messages_for_session(&id).await;
            taken.send_replace(true);
            let history = match loaded {
                Ok(history) => history,
                Err(e) => {
                    warn!(session_id = %id, error = %e, "failed to load history for priming");
                    return;
                }
            };
            match engine.start_session(&history).await {
                Ok(()) => debug!(session_id = %id, turns = history.len(), "session primed"),
                Err(RecallError::EngineNotReady(_)) => {
                    debug!(session_id = %id, "engine not ready, priming skipped");
                }
                Err(e) => warn!(session_id = %id, error = %e, "failed to restore session context"),
            }
        });
        jobs.priming = Some(Priming { job, snapshot });
    }

    /// Wait until the current priming job has read its history.
    ///
    /// A job aborted before reading drops its sender, which also ends the wait.
    async fn priming_snapshot_taken(&self) {
        let pending = self.jobs().priming.as_ref().map(|p| p.snapshot.clone());
        if let Some(mut snapshot) = pending {
            let _ = snapshot.wait_for(|taken| *taken).await;
        }
    }

    async fn join_priming(&self) {
        let pending = self.jobs().priming.as_ref().map(|p| p.job.done.clone());
        if let Some(done) = pending {
            done.await;
        }
    }

    async fn augment(&self, text: &str) -> String {
        let Some(retrieval) = self.retrieval.as_ref().filter(|_| self.settings.memory_enabled)
        else {
            return text.to_string();
        };
        let matches = retrieval
            .find_relevant(text, self.settings.max_results, self.settings.similarity_threshold)
            .await;
        debug!(matches = matches.len(), "memories retrieved");
        augment_prompt(text, &matches)
    }

    async fn respond(
        self: Arc<Self>,
        session_id: String,
        prompt: String,
        user_text: String,
    ) -> Result<String, RecallError> {
        self.state.begin_typing(&session_id);
        let mut stream = self.engine.generate(&prompt);
        let mut reply = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => reply.push_str(&chunk),
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "generation error");
                    reply.push_str(&format!("Error: {}", e.user_message()));
                }
            }
            self.state.set_pending_for(&session_id, &reply);
        }
        drop(stream);
        self.state.end_typing(&session_id);

        self.storage
            .upsert_message(&ChatMessage::assistant(&session_id, reply.clone()))
            .await?;

        match self.storage.get_session(&session_id).await {
            Ok(Some(session)) if session.title == self.settings.default_title => {
                self.spawn_title_job(session_id, user_text, reply.clone());
            }
            Ok(_) => {}
            Err(e) => warn!(session_id = %session_id, error = %e, "failed to read session title"),
        }
        Ok(reply)
    }

    fn spawn_title_job(&self, session_id: String, user_text: String, reply: String) {
        let engine = self.engine.clone();
        let storage = self.storage.clone();
        self.background.spawn(async move {
            let mut stream = engine.generate_stateless(&title_prompt(&user_text, &reply));
            let mut raw = String::new();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(chunk) => raw.push_str(&chunk),
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "title generation failed");
                        return;
                    }
                }
            }
            let Some(title) = clean_title(&raw) else {
                return;
            };
            match storage.update_session_title(&session_id, &title).await {
                Ok(()) => debug!(session_id = %session_id, title = %title, "session titled"),
                Err(e) => warn!(session_id = %session_id, error = %e, "failed to save title"),
            }
        });
    }
}
