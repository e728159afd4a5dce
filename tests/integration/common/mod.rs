//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lessonloop_engine::{
    Config, Engine, EngineError, LessonCatalog, ModelClient, ModelRequest, ProgressStore,
    TutorConfig,
};

/// Model client that answers from a fixed script and records what it was asked.
#[derive(Default)]
pub struct ScriptedModel {
    answers: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| Ok((*a).to_string())).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queues a failure for the next call.
    pub fn then_fail(self, message: &str) -> Self {
        self.answers
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, request: ModelRequest) -> lessonloop_engine::Result<String> {
        self.requests.lock().unwrap().push(request);
        match self.answers.lock().unwrap().pop_front() {
            Some(Ok(answer)) => Ok(answer),
            Some(Err(message)) => Err(EngineError::model_response(message)),
            None => Err(EngineError::model_response("no scripted answer left")),
        }
    }
}

/// The sample lessons shipped at the repository root.
pub fn lessons_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../lessons")
}

pub fn sample_catalog() -> LessonCatalog {
    LessonCatalog::load_dir(lessons_dir()).expect("sample lessons should load")
}

/// Engine with instant pacing around the given model and store.
pub fn test_engine(model: Arc<ScriptedModel>, store: Arc<dyn ProgressStore>) -> Engine {
    let model: Arc<dyn ModelClient> = model;
    Engine::with_model(&Config::default(), model, store).with_pacing(TutorConfig::instant())
}

/// A unique scratch directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("lessonloop_it_{name}_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
