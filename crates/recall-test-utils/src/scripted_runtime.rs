// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A fake native runtime for driving real engines in tests.
//!
//! `ScriptedRuntime` plays both [`RuntimeFactory`] and [`BundleLoader`].
//! Construction and load faults are scripted per backend, replies are
//! queued, and everything appended to a context is kept as a transcript.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use recall_core::{Backend, RecallError};
use recall_engine::runtime::TokenSink;
use recall_engine::{BackendHandle, BundleLoader, ChatContext, LoadedModel, RuntimeFactory};

const DEFAULT_REPLY: &str = "scripted reply";

#[derive(Debug, Clone)]
enum ConstructFault {
    Error(String),
    Panic,
}

#[derive(Default)]
struct Script {
    construct_faults: HashMap<Backend, ConstructFault>,
    load_failures: VecDeque<String>,
    replies: VecDeque<String>,
    attempts: Vec<Backend>,
    loads: Vec<(PathBuf, String)>,
    transcripts: Vec<String>,
}

#[derive(Clone, Default)]
struct Shared(Arc<Mutex<Script>>);

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Script> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self, path: &Path, lib: &str) -> Result<Arc<dyn LoadedModel>, RecallError> {
        let mut script = self.lock();
        if let Some(message) = script.load_failures.pop_front() {
            return Err(RecallError::BackendLoad {
                message,
                source: None,
            });
        }
        script.loads.push((path.to_path_buf(), lib.to_string()));
        Ok(Arc::new(ScriptedModel {
            shared: self.clone(),
        }))
    }

    fn next_reply(&self) -> String {
        self.lock()
            .replies
            .pop_front()
            .unwrap_or_else(|| DEFAULT_REPLY.to_string())
    }
}

/// Scriptable stand-in for the native inference runtime.
#[derive(Clone, Default)]
pub struct ScriptedRuntime {
    shared: Shared,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructing `backend` returns an error with `message`.
    pub fn fail_construct(&self, backend: Backend, message: impl Into<String>) {
        self.shared
            .lock()
            .construct_faults
            .insert(backend, ConstructFault::Error(message.into()));
    }

    /// Constructing `backend` panics, as a broken GPU driver might.
    pub fn panic_construct(&self, backend: Backend) {
        self.shared
            .lock()
            .construct_faults
            .insert(backend, ConstructFault::Panic);
    }

    /// The next weight load is rejected with `message`.
    pub fn fail_next_load(&self, message: impl Into<String>) {
        self.shared.lock().load_failures.push_back(message.into());
    }

    /// Queue the text of the next reply. Unscripted replies say "scripted reply".
    pub fn push_reply(&self, text: impl Into<String>) {
        self.shared.lock().replies.push_back(text.into());
    }

    /// Backends whose construction was attempted, in order.
    pub fn construct_attempts(&self) -> Vec<Backend> {
        self.shared.lock().attempts.clone()
    }

    /// Successful loads as `(model_dir, model_lib)`.
    pub fn loads(&self) -> Vec<(PathBuf, String)> {
        self.shared.lock().loads.clone()
    }

    /// Everything appended to each context opened so far.
    pub fn transcripts(&self) -> Vec<String> {
        self.shared.lock().transcripts.clone()
    }

    /// The transcript of the most recently opened context.
    pub fn last_transcript(&self) -> Option<String> {
        self.shared.lock().transcripts.last().cloned()
    }
}

impl RuntimeFactory for ScriptedRuntime {
    fn construct(&self, backend: Backend) -> Result<Arc<dyn BackendHandle>, RecallError> {
        let fault = {
            let mut script = self.shared.lock();
            script.attempts.push(backend);
            script.construct_faults.get(&backend).cloned()
        };
        match fault {
            Some(ConstructFault::Error(message)) => Err(RecallError::BackendConstruction {
                backend: backend.to_string(),
                message,
            }),
            Some(ConstructFault::Panic) => panic!("scripted {backend} driver crash"),
            None => Ok(Arc::new(ScriptedBackend {
                backend,
                shared: self.shared.clone(),
            })),
        }
    }
}

impl BundleLoader for ScriptedRuntime {
    fn load_bundle(&self, path: &Path) -> Result<Arc<dyn LoadedModel>, RecallError> {
        self.shared.load(path, "bundle")
    }
}

struct ScriptedBackend {
    backend: Backend,
    shared: Shared,
}

impl BackendHandle for ScriptedBackend {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn load(&self, model_dir: &Path, model_lib: &str) -> Result<Arc<dyn LoadedModel>, RecallError> {
        self.shared.load(model_dir, model_lib)
    }
}

struct ScriptedModel {
    shared: Shared,
}

impl LoadedModel for ScriptedModel {
    fn new_context(&self) -> Result<Box<dyn ChatContext>, RecallError> {
        let mut script = self.shared.lock();
        script.transcripts.push(String::new());
        Ok(Box::new(ScriptedContext {
            index: script.transcripts.len() - 1,
            shared: self.shared.clone(),
        }))
    }

    fn generate_stateless(
        &self,
        _prompt: &str,
        max_new_tokens: usize,
        sink: TokenSink<'_>,
    ) -> Result<(), RecallError> {
        emit(&self.shared.next_reply(), max_new_tokens, sink);
        Ok(())
    }
}

struct ScriptedContext {
    index: usize,
    shared: Shared,
}

impl ChatContext for ScriptedContext {
    fn append(&mut self, text: &str) -> Result<(), RecallError> {
        if let Some(transcript) = self.shared.lock().transcripts.get_mut(self.index) {
            transcript.push_str(text);
        }
        Ok(())
    }

    fn generate(&mut self, max_new_tokens: usize, sink: TokenSink<'_>) -> Result<(), RecallError> {
        let reply = self.shared.next_reply();
        let produced = emit(&reply, max_new_tokens, sink);
        self.append(&produced)
    }
}

/// Feed `reply` word by word into `sink`, returning what was accepted.
fn emit(reply: &str, max_new_tokens: usize, sink: TokenSink<'_>) -> String {
    let mut produced = String::new();
    for piece in reply.split_inclusive(' ').take(max_new_tokens) {
        if !sink(piece) {
            break;
        }
        produced.push_str(piece);
    }
    produced
}
