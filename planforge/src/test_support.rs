//! Test-only helpers: a scripted generation backend and a throwaway workspace.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::engine::Engine;
use crate::io::config::EngineConfig;
use crate::io::generator::{GenerationRequest, Generator};
use crate::io::sandbox::Sandbox;
use crate::io::workspace::{ProjectPaths, WorkspaceStore};

/// One queued response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    Text(String),
    /// The backend call fails with this message.
    Fail(String),
}

/// Generator that pops queued replies and records every request.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: RefCell<VecDeque<ScriptedReply>>,
    requests: RefCell<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Queue plain text replies.
    pub fn replies<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            texts
                .into_iter()
                .map(|text| ScriptedReply::Text(text.into()))
                .collect(),
        )
    }

    /// A generator whose first call fails.
    pub fn failing(message: &str) -> Self {
        Self::new(vec![ScriptedReply::Fail(message.to_string())])
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.borrow().clone()
    }

    /// Panics if queued replies were never consumed.
    pub fn assert_drained(&self) {
        let remaining = self.replies.borrow().len();
        assert_eq!(remaining, 0, "{remaining} scripted replies left unused");
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        match self.replies.borrow_mut().pop_front() {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Fail(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted generator has no replies left")),
        }
    }
}

/// Workspace in a temp directory, with a sandbox rooted at it.
pub struct TestWorkspace {
    _temp: TempDir,
    store: WorkspaceStore,
    sandbox: Sandbox,
    config: EngineConfig,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Result<Self> {
        let temp = tempfile::tempdir().context("create temp workspace")?;
        let store = WorkspaceStore::open(temp.path())?;
        let sandbox = Sandbox::new(store.root(), config.sandbox.clone())?;
        Ok(Self {
            _temp: temp,
            store,
            sandbox,
            config,
        })
    }

    pub fn root(&self) -> &Path {
        self.store.root()
    }

    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn engine<'a, G: Generator>(&'a self, generator: &'a G) -> Result<Engine<'a, G>> {
        Engine::new(&self.store, &self.sandbox, generator, &self.config)
    }

    /// Initialize `name` and write `plan` as its build plan.
    pub fn project_with_plan(&self, name: &str, plan: &str) -> Result<ProjectPaths> {
        let paths = self.store.init_project(name, Some("test request"))?;
        self.store.write_plan(name, plan)?;
        Ok(paths)
    }
}
