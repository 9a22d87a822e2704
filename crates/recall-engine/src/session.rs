// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The gated chat session shared by runtime-backed engines.
//!
//! One `tokio::sync::Mutex` guards the loaded model and the live context.
//! `start_session`, `generate` and `generate_stateless` all take it, so a
//! reset can never interleave with a stream in flight.

use std::sync::Arc;

use futures::stream;
use recall_core::{ChatMessage, RecallError, TokenStream};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::chatml;
use crate::runtime::{ChatContext, LoadedModel};

/// Knobs shared by every engine variant.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub system_prompt: String,
    pub history_turns: usize,
    pub max_new_tokens: usize,
    pub settle_delay_ms: u64,
    pub failure_backoff_ms: u64,
}

impl EngineOptions {
    pub fn from_config(
        config: &recall_config::model::EngineConfig,
        system_prompt: Option<&str>,
    ) -> Self {
        Self {
            system_prompt: system_prompt
                .unwrap_or(chatml::DEFAULT_SYSTEM_PROMPT)
                .to_string(),
            history_turns: config.history_turns,
            max_new_tokens: config.max_new_tokens,
            settle_delay_ms: config.settle_delay_ms,
            failure_backoff_ms: config.failure_backoff_ms,
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&recall_config::model::EngineConfig::default(), None)
    }
}

#[derive(Default)]
struct Slot {
    model: Option<Arc<dyn LoadedModel>>,
    context: Option<Box<dyn ChatContext>>,
}

/// A single stream item used when an engine is not ready.
pub fn not_ready(reason: &str) -> TokenStream {
    let err = RecallError::EngineNotReady(reason.to_string());
    Box::pin(stream::once(async move { Err(err) }))
}

pub struct SessionCore {
    gate: Arc<Mutex<Slot>>,
    options: EngineOptions,
}

impl SessionCore {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            gate: Arc::new(Mutex::new(Slot::default())),
            options,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Adopt freshly loaded weights and open an empty session.
    pub async fn install(&self, model: Arc<dyn LoadedModel>) -> Result<(), RecallError> {
        let mut slot = self.gate.lock().await;
        slot.context = None;
        let preamble = chatml::turn("system", &self.options.system_prompt);
        let context = open_context(model.clone(), preamble).await?;
        slot.model = Some(model);
        slot.context = Some(context);
        Ok(())
    }

    /// Drop the context and the weights.
    pub async fn clear(&self) {
        let mut slot = self.gate.lock().await;
        slot.context = None;
        slot.model = None;
    }

    pub async fn start_session(&self, history: &[ChatMessage]) -> Result<(), RecallError> {
        let mut slot = self.gate.lock().await;
        let model = slot
            .model
            .clone()
            .ok_or_else(|| RecallError::EngineNotReady("no model loaded".into()))?;
        slot.context = None;
        let replay = chatml::replay(&self.options.system_prompt, history, self.options.history_turns);
        let replayed = history.len().min(self.options.history_turns);
        slot.context = Some(open_context(model, replay).await?);
        debug!(replayed, "session primed");
        Ok(())
    }

    /// Append `prompt` as a user turn and stream the reply.
    pub fn generate(&self, prompt: &str) -> TokenStream {
        let gate = self.gate.clone();
        let preamble = chatml::turn("system", &self.options.system_prompt);
        let max_new_tokens = self.options.max_new_tokens;
        let text = chatml::user_prompt(prompt);
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut slot = gate.lock_owned().await;
            let Some(model) = slot.model.clone() else {
                let _ = tx
                    .send(Err(RecallError::EngineNotReady("no model loaded".into())))
                    .await;
                return;
            };
            let context = match slot.context.take() {
                Some(context) => context,
                None => match open_context(model, preamble).await {
                    Ok(context) => context,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                },
            };

            let token_tx = tx.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                let mut context = context;
                let result = context.append(&text).and_then(|()| {
                    context.generate(max_new_tokens, &mut |piece| {
                        token_tx.blocking_send(Ok(piece.to_string())).is_ok()
                    })
                });
                result
                    .and_then(|()| context.append(chatml::ASSISTANT_CLOSE))
                    .map(|()| context)
            })
            .await;

            match outcome {
                Ok(Ok(context)) => slot.context = Some(context),
                Ok(Err(e)) => {
                    warn!(error = %e, "generation failed, context discarded");
                    let _ = tx.send(Err(e)).await;
                }
                Err(join) => {
                    warn!(error = %join, "generation task panicked, context discarded");
                    let _ = tx
                        .send(Err(RecallError::Internal(format!("generation panicked: {join}"))))
                        .await;
                }
            }
        });

        receiver_stream(rx)
    }

    /// Generate outside the session context, still under the gate.
    pub fn generate_stateless(&self, prompt: &str) -> TokenStream {
        let gate = self.gate.clone();
        let max_new_tokens = self.options.max_new_tokens;
        let text = chatml::stateless_prompt(&self.options.system_prompt, prompt);
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let slot = gate.lock_owned().await;
            let Some(model) = slot.model.clone() else {
                let _ = tx
                    .send(Err(RecallError::EngineNotReady("no model loaded".into())))
                    .await;
                return;
            };
            let token_tx = tx.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                model.generate_stateless(&text, max_new_tokens, &mut |piece| {
                    token_tx.blocking_send(Ok(piece.to_string())).is_ok()
                })
            })
            .await;
            drop(slot);

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(join) => Some(RecallError::Internal(format!("generation panicked: {join}"))),
            };
            if let Some(e) = failure {
                let _ = tx.send(Err(e)).await;
            }
        });

        receiver_stream(rx)
    }
}

/// Build a context and feed it `preamble` on a blocking thread.
async fn open_context(
    model: Arc<dyn LoadedModel>,
    preamble: String,
) -> Result<Box<dyn ChatContext>, RecallError> {
    tokio::task::spawn_blocking(move || {
        let mut context = model.new_context()?;
        context.append(&preamble)?;
        Ok(context)
    })
    .await
    .map_err(|e| RecallError::Internal(format!("context setup panicked: {e}")))?
}

fn receiver_stream(rx: mpsc::Receiver<Result<String, RecallError>>) -> TokenStream {
    Box::pin(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::Mutex as StdMutex;

    use crate::runtime::TokenSink;

    #[derive(Default)]
    struct Transcript {
        contexts_opened: usize,
        appended: Vec<String>,
    }

    struct EchoModel {
        log: Arc<StdMutex<Transcript>>,
        words: Vec<&'static str>,
        fail_generation: bool,
    }

    struct EchoContext {
        log: Arc<StdMutex<Transcript>>,
        words: Vec<&'static str>,
        fail_generation: bool,
    }

    impl ChatContext for EchoContext {
        fn append(&mut self, text: &str) -> Result<(), RecallError> {
            self.log.lock().unwrap().appended.push(text.to_string());
            Ok(())
        }

        fn generate(&mut self, _max: usize, sink: TokenSink<'_>) -> Result<(), RecallError> {
            if self.fail_generation {
                return Err(RecallError::Internal("decoder exploded".into()));
            }
            for word in &self.words {
                if !sink(word) {
                    break;
                }
            }
            Ok(())
        }
    }

    impl LoadedModel for EchoModel {
        fn new_context(&self) -> Result<Box<dyn ChatContext>, RecallError> {
            self.log.lock().unwrap().contexts_opened += 1;
            Ok(Box::new(EchoContext {
                log: self.log.clone(),
                words: self.words.clone(),
                fail_generation: self.fail_generation,
            }))
        }

        fn generate_stateless(
            &self,
            prompt: &str,
            _max: usize,
            sink: TokenSink<'_>,
        ) -> Result<(), RecallError> {
            sink(&format!("len={}", prompt.len()));
            Ok(())
        }
    }

    fn echo(words: Vec<&'static str>, fail: bool) -> (Arc<dyn LoadedModel>, Arc<StdMutex<Transcript>>) {
        let log = Arc::new(StdMutex::new(Transcript::default()));
        let model = Arc::new(EchoModel {
            log: log.clone(),
            words,
            fail_generation: fail,
        });
        (model, log)
    }

    async fn collect(stream: TokenStream) -> Vec<Result<String, RecallError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn generate_without_model_yields_single_error() {
        let core = SessionCore::new(EngineOptions::default());
        let items = collect(core.generate("hi")).await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(RecallError::EngineNotReady(_))));
    }

    #[tokio::test]
    async fn generate_streams_and_closes_turn() {
        let core = SessionCore::new(EngineOptions::default());
        let (model, log) = echo(vec!["Hello ", "Sam"], false);
        core.install(model).await.unwrap();

        let text: String = collect(core.generate("I'm Sam"))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(text, "Hello Sam");

        let log = log.lock().unwrap();
        assert!(log.appended[0].starts_with("<|im_start|>system\n"));
        assert_eq!(log.appended[1], chatml::user_prompt("I'm Sam"));
        assert_eq!(log.appended[2], chatml::ASSISTANT_CLOSE);
    }

    #[tokio::test]
    async fn dropped_stream_returns_context_to_gate() {
        let core = SessionCore::new(EngineOptions::default());
        let (model, log) = echo(vec!["one ", "two ", "three "], false);
        core.install(model).await.unwrap();

        let mut stream = core.generate("count");
        assert_eq!(stream.next().await.unwrap().unwrap(), "one ");
        drop(stream);

        let second: Vec<_> = collect(core.generate("again")).await;
        assert!(second.iter().all(Result::is_ok));
        assert_eq!(log.lock().unwrap().contexts_opened, 1);
    }

    #[tokio::test]
    async fn mid_stream_error_discards_context() {
        let core = SessionCore::new(EngineOptions::default());
        let (model, log) = echo(vec![], true);
        core.install(model).await.unwrap();

        let items = collect(core.generate("boom")).await;
        assert!(items.last().unwrap().is_err());
        let _ = collect(core.generate("again")).await;
        assert_eq!(log.lock().unwrap().contexts_opened, 2);
    }

    #[tokio::test]
    async fn start_session_replays_history_tail() {
        let options = EngineOptions {
            history_turns: 2,
            ..EngineOptions::default()
        };
        let core = SessionCore::new(options);
        let (model, log) = echo(vec!["ok"], false);
        core.install(model).await.unwrap();

        let history = vec![
            ChatMessage::user("s", "first"),
            ChatMessage::assistant("s", "second"),
            ChatMessage::user("s", "third"),
        ];
        core.start_session(&history).await.unwrap();
        let log = log.lock().unwrap();
        let replay = log.appended.last().unwrap();
        assert!(!replay.contains("first"));
        assert!(replay.contains("second"));
        assert!(replay.contains("third"));
        assert_eq!(log.contexts_opened, 2);
    }

    #[tokio::test]
    async fn stateless_generation_leaves_context_alone() {
        let core = SessionCore::new(EngineOptions::default());
        let (model, log) = echo(vec!["x"], false);
        core.install(model).await.unwrap();
        let before = log.lock().unwrap().appended.len();

        let items = collect(core.generate_stateless("title please")).await;
        assert_eq!(items.len(), 1);
        assert!(items[0].as_ref().unwrap().starts_with("len="));
        assert_eq!(log.lock().unwrap().appended.len(), before);
    }

    #[tokio::test]
    async fn clear_makes_session_unavailable() {
        let core = SessionCore::new(EngineOptions::default());
        let (model, _log) = echo(vec!["x"], false);
        core.install(model).await.unwrap();
        core.clear().await;
        assert!(matches!(
            core.start_session(&[]).await,
            Err(RecallError::EngineNotReady(_))
        ));
    }
}
