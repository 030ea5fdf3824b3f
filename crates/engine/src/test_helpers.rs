//! Test doubles shared by the engine's unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use mnemo_core::{
    Error, FactFilter, Importance, MemoryFact, MemoryStore, Message, Provider, ProviderError,
    ProviderRequest, ProviderResponse, Result, StorageError,
};

/// A provider that plays back a script of replies and failures, then
/// falls back to a fixed reply. Every request is recorded.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<std::result::Result<String, ProviderError>>>,
    fallback: String,
    delay: Option<Duration>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::replying("Okay.")
    }

    pub fn replying(fallback: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: fallback.into(),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn then_reply(self, text: impl Into<String>) -> Self {
        self.script.lock().unwrap().push_back(Ok(text.into()));
        self
    }

    pub fn then_fail(self, error: ProviderError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()));
        next.map(|text| ProviderResponse {
            message: Message::assistant(text),
            usage: None,
            model,
        })
    }
}

/// A memory store that fails every write. Reads are empty, or fail too
/// when built with `unreadable`.
#[derive(Default)]
pub struct UnwritableMemoryStore {
    reads_fail: bool,
}

impl UnwritableMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreadable() -> Self {
        Self { reads_fail: true }
    }
}

fn io_failure() -> Error {
    StorageError::Io("disk is read-only".into()).into()
}

#[async_trait]
impl MemoryStore for UnwritableMemoryStore {
    fn name(&self) -> &str {
        "unwritable"
    }

    async fn save(&self, _fact: MemoryFact) -> Result<String> {
        Err(io_failure())
    }

    async fn find(&self, _filter: &FactFilter) -> Result<Vec<MemoryFact>> {
        if self.reads_fail {
            return Err(io_failure());
        }
        Ok(Vec::new())
    }

    async fn get(&self, id: &str) -> Result<MemoryFact> {
        Err(Error::not_found("memory", id))
    }

    async fn delete(&self, _id: &str) -> Result<()> {
        Err(io_failure())
    }

    async fn update_importance(&self, _id: &str, _importance: Importance) -> Result<()> {
        Err(io_failure())
    }

    async fn delete_thread_scoped(&self, _thread_id: &str) -> Result<usize> {
        Err(io_failure())
    }

    async fn count(&self) -> Result<usize> {
        Ok(0)
    }
}
