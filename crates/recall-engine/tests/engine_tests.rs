// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engines driven end to end over a scripted runtime.

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use recall_core::{Backend, ChatMessage, EngineState, InferenceEngine, RecallError};
use recall_engine::{BundledEngine, EngineOptions, FailedBackends, NativeEngine};
use recall_models::{ArtifactStore, BackendDetector, BackendProbe};
use recall_test_utils::{MockDownloader, ScriptedRuntime, fixtures};
use tempfile::TempDir;

const GPU_MODEL: &str = "qwen2.5-0.5b-instruct-q4f16";
const CPU_MODEL: &str = "qwen2.5-0.5b-instruct-q4f16-cpu";

struct AllBackends;

impl BackendProbe for AllBackends {
    fn has_vulkan(&self) -> bool {
        true
    }

    fn has_opencl(&self) -> bool {
        true
    }

    fn gpu_renderer(&self) -> Option<String> {
        Some("Adreno (TM) 740".into())
    }
}

struct Rig {
    _dir: TempDir,
    store: Arc<ArtifactStore>,
    detector: Arc<BackendDetector>,
    runtime: ScriptedRuntime,
    failed: FailedBackends,
}

impl Rig {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ArtifactStore::new(
            dir.path().join("models"),
            None,
            None,
            Arc::new(MockDownloader::new()),
        ));
        for id in [GPU_MODEL, CPU_MODEL] {
            fixtures::install_model(&store.path_for(id), id);
        }
        Self {
            _dir: dir,
            store,
            detector: Arc::new(BackendDetector::new(Box::new(AllBackends))),
            runtime: ScriptedRuntime::new(),
            failed: FailedBackends::new(),
        }
    }

    fn engine(&self, model_id: &str) -> NativeEngine {
        NativeEngine::new(
            model_id,
            self.store.clone(),
            self.detector.clone(),
            Arc::new(self.runtime.clone()),
            self.failed.clone(),
            options(),
        )
    }
}

fn options() -> EngineOptions {
    EngineOptions {
        settle_delay_ms: 0,
        failure_backoff_ms: 0,
        ..EngineOptions::default()
    }
}

async fn collect_text(engine: &dyn InferenceEngine, prompt: &str) -> Result<String, RecallError> {
    let mut stream = engine.generate(prompt);
    let mut text = String::new();
    while let Some(item) = stream.next().await {
        text.push_str(&item?);
    }
    Ok(text)
}

#[tokio::test]
async fn uses_best_backend_when_it_constructs() {
    let rig = Rig::new();
    let engine = rig.engine(GPU_MODEL);
    let seen = Mutex::new(Vec::new());

    engine.initialize(&|p: f32| seen.lock().unwrap().push(p)).await.unwrap();

    assert!(engine.is_initialized());
    assert_eq!(engine.active_backend().await, Some(Backend::Vulkan));
    assert_eq!(seen.lock().unwrap().last().copied(), Some(1.0));
    let (dir, lib) = &rig.runtime.loads()[0];
    assert_eq!(dir, &rig.store.path_for(GPU_MODEL));
    assert_eq!(lib, "qwen2_q4f16_1");
}

#[tokio::test]
async fn construction_failures_fall_back_and_are_remembered() {
    let rig = Rig::new();
    rig.runtime.fail_construct(Backend::Vulkan, "vkCreateDevice failed");

    let first = rig.engine(GPU_MODEL);
    first.initialize(&|_: f32| {}).await.unwrap();
    assert_eq!(first.active_backend().await, Some(Backend::OpenCl));
    assert!(rig.failed.contains(Backend::Vulkan));

    let second = rig.engine(GPU_MODEL);
    second.initialize(&|_: f32| {}).await.unwrap();
    assert_eq!(
        rig.runtime.construct_attempts(),
        vec![Backend::Vulkan, Backend::OpenCl, Backend::OpenCl]
    );
}

#[tokio::test]
async fn every_backend_failing_yields_one_error() {
    let rig = Rig::new();
    rig.runtime.fail_construct(Backend::Vulkan, "no device");
    rig.runtime.panic_construct(Backend::OpenCl);
    rig.runtime.fail_construct(Backend::Cpu, "out of memory");
    let engine = rig.engine(GPU_MODEL);

    let err = engine.initialize(&|_: f32| {}).await.unwrap_err();

    match &err {
        RecallError::BackendConstruction { message, .. } => {
            assert!(message.contains("out of memory"), "{message}")
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.user_message().starts_with("Failed to initialize AI engine"));
    assert!(!engine.is_initialized());
    assert_eq!(engine.state(), EngineState::Failed);
    assert_eq!(
        rig.failed.snapshot(),
        vec![Backend::Vulkan, Backend::OpenCl, Backend::Cpu]
    );

    let again = engine.initialize(&|_: f32| {}).await.unwrap_err();
    assert!(again.to_string().contains("no untried backends"));
    assert_eq!(rig.runtime.construct_attempts().len(), 3);
    assert!(matches!(
        collect_text(&engine, "hi").await,
        Err(RecallError::EngineNotReady(_))
    ));
}

#[tokio::test]
async fn cpu_pinned_model_only_tries_cpu() {
    let rig = Rig::new();
    let engine = rig.engine(CPU_MODEL);

    engine.initialize(&|_: f32| {}).await.unwrap();

    assert_eq!(rig.runtime.construct_attempts(), vec![Backend::Cpu]);
    assert_eq!(rig.runtime.loads()[0].1, "qwen2_q4f16_1_cpu");
}

#[tokio::test]
async fn load_failure_discards_the_backend_instance() {
    let rig = Rig::new();
    rig.runtime.fail_next_load("weights do not match library");
    let engine = rig.engine(GPU_MODEL);

    let err = engine.initialize(&|_: f32| {}).await.unwrap_err();
    assert!(matches!(err, RecallError::BackendLoad { .. }));
    assert_eq!(engine.active_backend().await, None);
    assert!(!rig.failed.contains(Backend::Vulkan));

    engine.initialize(&|_: f32| {}).await.unwrap();
    assert_eq!(rig.runtime.construct_attempts(), vec![Backend::Vulkan, Backend::Vulkan]);
}

#[tokio::test]
async fn missing_artifacts_fail_before_any_construction() {
    let rig = Rig::new();
    std::fs::remove_file(rig.store.path_for(GPU_MODEL).join("weights-index.json")).unwrap();
    let engine = rig.engine(GPU_MODEL);

    let err = engine.initialize(&|_: f32| {}).await.unwrap_err();

    assert!(matches!(err, RecallError::Integrity { .. }));
    assert!(rig.runtime.construct_attempts().is_empty());
}

#[tokio::test]
async fn session_replays_at_most_twenty_turns() {
    let rig = Rig::new();
    let engine = rig.engine(GPU_MODEL);
    engine.initialize(&|_: f32| {}).await.unwrap();
    let history: Vec<ChatMessage> = (0..30)
        .map(|i| {
            if i % 2 == 0 {
                ChatMessage::user("s", format!("turn {i:02}"))
            } else {
                ChatMessage::assistant("s", format!("turn {i:02}"))
            }
        })
        .collect();

    engine.start_session(&history).await.unwrap();

    let transcript = rig.runtime.last_transcript().unwrap();
    assert!(!transcript.contains("turn 09"));
    assert!(transcript.contains("turn 10"));
    assert!(transcript.contains("turn 29"));
    assert_eq!(transcript.matches("<|im_start|>").count(), 21);
}

#[tokio::test]
async fn replies_stream_into_the_live_context() {
    let rig = Rig::new();
    rig.runtime.push_reply("Hello Sam, nice to meet you");
    rig.runtime.push_reply("Your name is Sam");
    let engine = rig.engine(GPU_MODEL);
    engine.initialize(&|_: f32| {}).await.unwrap();

    assert_eq!(
        collect_text(&engine, "My name is Sam").await.unwrap(),
        "Hello Sam, nice to meet you"
    );
    assert_eq!(collect_text(&engine, "What is my name?").await.unwrap(), "Your name is Sam");

    let transcript = rig.runtime.last_transcript().unwrap();
    assert!(transcript.contains("<|im_start|>user\nMy name is Sam<|im_end|>"));
    assert!(transcript.contains("Hello Sam, nice to meet you<|im_end|>"));
    assert!(transcript.ends_with("Your name is Sam<|im_end|>\n"));
}

#[tokio::test]
async fn bundled_engine_loads_single_file_bundle() {
    let rig = Rig::new();
    let bundle_id = "gemma-bundle";
    let root = rig.store.path_for(bundle_id);
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("gemma.task"), b"bundle").unwrap();
    rig.runtime.push_reply("bundled hello");

    let engine = BundledEngine::new(
        bundle_id,
        rig.store.clone(),
        Arc::new(rig.runtime.clone()),
        options(),
    );
    engine.initialize(&|_: f32| {}).await.unwrap();

    assert_eq!(rig.runtime.loads()[0].0, root.join("gemma.task"));
    assert_eq!(collect_text(&engine, "hi").await.unwrap(), "bundled hello");
    assert!(rig.runtime.construct_attempts().is_empty());
}

#[tokio::test]
async fn bundled_engine_without_bundle_is_an_integrity_error() {
    let rig = Rig::new();
    let engine = BundledEngine::new(
        "absent",
        rig.store.clone(),
        Arc::new(rig.runtime.clone()),
        options(),
    );
    let err = engine.initialize(&|_: f32| {}).await.unwrap_err();
    assert!(matches!(err, RecallError::Integrity { .. }));
    assert_eq!(engine.state(), EngineState::Failed);
}
