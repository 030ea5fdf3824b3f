//! The engine: one conversational turn end to end.
//!
//! A turn runs under its thread's lock: track context, split the budget,
//! compress memories, pick prompt components, call the model. Everything
//! that learns from the reply (history, fact extraction, quality scoring,
//! weight updates) runs in a spawned write-back task that owns the thread
//! lock, so it finishes even if the caller goes away and the next turn on
//! the same thread sees its results.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use futures::future::join_all;
use mnemo_config::{AppConfig, EngineConfig, ExtractorMode};
use mnemo_core::{
    ComponentStore, ContextState, ContextStore, Error, FactFilter, MemoryFact, MemoryStore,
    Message, Provider, ProviderRequest, Result, TokenAllocation,
};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::allocator::TokenBudgetAllocator;
use crate::compressor::{CompressionStats, ContextCompressor};
use crate::extractor::{FactExtractor, LlmExtractor, PatternExtractor};
use crate::prompt::{build_system_prompt, memory_block, memory_header_tokens, trim_history};
use crate::quality::QualityAssessor;
use crate::registry::{PromptComponentRegistry, WeightUpdate};
use crate::tracker::{ConversationContextTracker, context_awareness};

/// Completed turns remembered for deduplication and rating.
const LEDGER_CAPACITY: usize = 1024;

/// The three persistence seams the engine needs.
#[derive(Clone)]
pub struct EngineStores {
    pub memory: Arc<dyn MemoryStore>,
    pub components: Arc<dyn ComponentStore>,
    pub contexts: Arc<dyn ContextStore>,
}

impl EngineStores {
    /// One backend serving all three roles.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: MemoryStore + ComponentStore + ContextStore + 'static,
    {
        Self {
            memory: store.clone(),
            components: store.clone(),
            contexts: store,
        }
    }
}

/// What the caller gets back from a turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    /// Id for `Engine::rate_turn`
    pub turn_id: String,
    pub reply: String,
    pub allocation: TokenAllocation,
    pub compression: CompressionStats,
    /// Ids of the prompt components used
    pub components: Vec<String>,
    pub context: ContextState,
    /// True when the model call failed and `reply` is the fallback message
    pub degraded: bool,
}

/// What `Engine::delete_thread` removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedThread {
    pub thread_id: String,
    pub history_messages: usize,
    pub had_context: bool,
    pub facts_removed: usize,
}

#[derive(Debug, Default)]
struct ThreadState {
    history: VecDeque<Message>,
}

#[derive(Debug)]
struct TurnRecord {
    components: Vec<String>,
    quality: Option<f32>,
    applied: bool,
    rated: bool,
}

/// Bounded record of recent turns. Guards against applying a turn's
/// write-back or rating twice.
#[derive(Debug, Default)]
struct TurnLedger {
    order: VecDeque<String>,
    turns: HashMap<String, TurnRecord>,
}

impl TurnLedger {
    fn register(&mut self, turn_id: &str, components: Vec<String>) {
        if self.turns.contains_key(turn_id) {
            return;
        }
        self.order.push_back(turn_id.to_string());
        self.turns.insert(
            turn_id.to_string(),
            TurnRecord {
                components,
                quality: None,
                applied: false,
                rated: false,
            },
        );
        while self.order.len() > LEDGER_CAPACITY {
            if let Some(evicted) = self.order.pop_front() {
                self.turns.remove(&evicted);
            }
        }
    }

    /// Marks the write-back as applied. False if it already was, or the
    /// turn is unknown.
    fn begin_write_back(&mut self, turn_id: &str) -> bool {
        match self.turns.get_mut(turn_id) {
            Some(record) if !record.applied => {
                record.applied = true;
                true
            }
            _ => false,
        }
    }

    fn record_quality(&mut self, turn_id: &str, quality: f32) {
        if let Some(record) = self.turns.get_mut(turn_id) {
            record.quality = Some(quality);
        }
    }

    /// Components and quality for a first rating of `turn_id`.
    fn take_for_rating(&mut self, turn_id: &str) -> Option<(Vec<String>, Option<f32>)> {
        let record = self.turns.get_mut(turn_id)?;
        if record.rated {
            return None;
        }
        record.rated = true;
        Some((record.components.clone(), record.quality))
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct Engine {
    provider: Arc<dyn Provider>,
    memory: Arc<dyn MemoryStore>,
    extractor: Arc<dyn FactExtractor>,
    allocator: TokenBudgetAllocator,
    compressor: ContextCompressor,
    registry: Arc<PromptComponentRegistry>,
    assessor: Arc<QualityAssessor>,
    tracker: ConversationContextTracker,
    config: EngineConfig,
    model: String,
    temperature: f32,
    provider_timeout: Duration,
    threads: StdMutex<HashMap<String, Arc<Mutex<ThreadState>>>>,
    ledger: Arc<StdMutex<TurnLedger>>,
    write_backs: StdMutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Build an engine from configuration, loading (and if needed seeding)
    /// prompt components from `stores.components`.
    pub async fn new(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        stores: EngineStores,
    ) -> Result<Self> {
        let registry =
            PromptComponentRegistry::load(stores.components.clone(), config.registry.clone())
                .await?;
        Self::with_registry(config, provider, stores, Arc::new(registry))
    }

    /// Build an engine around an existing registry, e.g. one shared with
    /// another engine.
    pub fn with_registry(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        stores: EngineStores,
        registry: Arc<PromptComponentRegistry>,
    ) -> Result<Self> {
        config.validate().map_err(|e| Error::Config {
            message: e.to_string(),
        })?;

        let extractor: Arc<dyn FactExtractor> = match config.extractor.mode {
            ExtractorMode::Pattern => Arc::new(PatternExtractor::new()),
            ExtractorMode::Llm => {
                let model = config
                    .extractor
                    .model
                    .clone()
                    .unwrap_or_else(|| config.provider.model.clone());
                Arc::new(LlmExtractor::new(provider.clone(), model))
            }
        };

        info!(
            provider = %provider.name(),
            memory = %stores.memory.name(),
            extractor = %extractor.name(),
            model = %config.provider.model,
            "Engine ready"
        );

        Ok(Self {
            memory: stores.memory,
            extractor,
            allocator: TokenBudgetAllocator::new(config.budget.clone()),
            compressor: ContextCompressor::new(&config.compressor),
            registry,
            assessor: Arc::new(QualityAssessor::heuristic(config.registry.success_threshold)),
            tracker: ConversationContextTracker::new(stores.contexts, config.tracker.clone()),
            config: config.engine.clone(),
            model: config.provider.model.clone(),
            temperature: config.provider.temperature,
            provider_timeout: Duration::from_secs(config.provider.timeout_secs),
            threads: StdMutex::new(HashMap::new()),
            ledger: Arc::new(StdMutex::new(TurnLedger::default())),
            write_backs: StdMutex::new(Vec::new()),
            provider,
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn FactExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_assessor(mut self, assessor: QualityAssessor) -> Self {
        self.assessor = Arc::new(assessor);
        self
    }

    pub fn registry(&self) -> &Arc<PromptComponentRegistry> {
        &self.registry
    }

    fn thread(&self, thread_id: &str) -> Arc<Mutex<ThreadState>> {
        lock(&self.threads)
            .entry(thread_id.to_string())
            .or_default()
            .clone()
    }

    /// Run one turn: returns the reply and how the prompt was built.
    ///
    /// Provider failures, timeouts, and storage failures while reading
    /// context or memories all produce a degraded reply rather than an
    /// error.
    pub async fn handle_turn(&self, thread_id: &str, user_text: &str) -> Result<TurnOutcome> {
        let guard = self.thread(thread_id).lock_owned().await;
        let history: Vec<Message> = guard.history.iter().cloned().collect();

        let (context, memories) = match self.read_state(thread_id, &history, user_text).await {
            Ok(state) => state,
            Err(e) => {
                warn!(thread_id, error = %e, "Failed to read conversation state");
                return Ok(TurnOutcome {
                    turn_id: String::new(),
                    reply: self.config.degraded_reply.clone(),
                    allocation: TokenAllocation::default(),
                    compression: CompressionStats::default(),
                    components: Vec::new(),
                    context: ContextState::new(thread_id),
                    degraded: true,
                });
            }
        };
        let allocation = self
            .allocator
            .allocate(user_text, self.config.total_tokens, Some(&context));

        let memory_budget = allocation
            .memory_context
            .saturating_sub(memory_header_tokens());
        let (compressed, compression) = self.compressor.compress(&memories, user_text, memory_budget);

        let selected = self.registry.select(&context).await;
        let component_ids: Vec<String> = selected.iter().map(|s| s.component.id.clone()).collect();
        let system_prompt = build_system_prompt(
            &self.config.base_system_prompt,
            &selected,
            &context_awareness(&context),
            allocation.system_prompt,
        );

        let mut messages = vec![Message::system(system_prompt)];
        if let Some(block) = memory_block(&compressed) {
            messages.push(Message::system(block));
        }
        messages.extend(trim_history(&history, allocation.conversation_history));
        let user_message = Message::user(user_text);
        messages.push(user_message.clone());

        let mut request = ProviderRequest::new(self.model.clone(), messages);
        request.temperature = self.temperature;
        request.max_tokens = Some(u32::try_from(allocation.response_buffer).unwrap_or(u32::MAX));

        debug!(
            thread_id,
            %allocation,
            memories_included = compression.memories_included,
            components = ?component_ids,
            "Calling provider"
        );

        let outcome = |turn_id: String, reply: String, degraded: bool| TurnOutcome {
            turn_id,
            reply,
            allocation,
            compression,
            components: component_ids.clone(),
            context: context.clone(),
            degraded,
        };

        let reply = match tokio::time::timeout(self.provider_timeout, self.provider.complete(request)).await {
            Ok(Ok(response)) => response.message.content,
            Ok(Err(e)) => {
                warn!(thread_id, provider = %self.provider.name(), error = %e, "Provider call failed");
                return Ok(outcome(String::new(), self.config.degraded_reply.clone(), true));
            }
            Err(_) => {
                warn!(thread_id, timeout_secs = self.provider_timeout.as_secs(), "Provider call timed out");
                return Ok(outcome(String::new(), self.config.degraded_reply.clone(), true));
            }
        };

        let turn_id = uuid::Uuid::new_v4().to_string();
        lock(&self.ledger).register(&turn_id, component_ids.clone());

        let write_back = WriteBack {
            turn_id: turn_id.clone(),
            thread_id: thread_id.to_string(),
            user: user_message,
            assistant: Message::assistant(reply.clone()),
            components: component_ids.clone(),
            agent: self.config.agent.clone(),
            history_window: self.config.history_window,
            guard,
            memory: self.memory.clone(),
            extractor: self.extractor.clone(),
            registry: self.registry.clone(),
            assessor: self.assessor.clone(),
            ledger: self.ledger.clone(),
        };
        let handle = tokio::spawn(write_back.run());
        {
            let mut handles = lock(&self.write_backs);
            handles.retain(|h| !h.is_finished());
            handles.push(handle);
        }

        Ok(outcome(turn_id, reply, false))
    }

    async fn read_state(
        &self,
        thread_id: &str,
        history: &[Message],
        user_text: &str,
    ) -> Result<(ContextState, Vec<MemoryFact>)> {
        let context = self.tracker.update(thread_id, history, user_text).await?;
        let memories = self.memory.find(&FactFilter::all()).await?;
        Ok((context, memories))
    }

    /// Wait for every spawned write-back to finish.
    pub async fn wait_idle(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *lock(&self.write_backs));
        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Write-back task failed");
            }
        }
    }

    /// The thread's tracked context; `Error::NotFound` if never seen.
    pub async fn get_context(&self, thread_id: &str) -> Result<ContextState> {
        self.tracker.get(thread_id).await
    }

    /// Stored facts carrying any of `tags` (all when `None`) recorded by
    /// `agent` (any when `None`), in insertion order.
    pub async fn query_memories(
        &self,
        tags: Option<BTreeSet<String>>,
        agent: Option<String>,
    ) -> Result<Vec<MemoryFact>> {
        let filter = FactFilter { tags, agent };
        self.memory.find(&filter).await
    }

    /// Remove a thread's history, its context state, and facts scoped to
    /// it. Facts that are not thread-scoped are kept.
    pub async fn delete_thread(&self, thread_id: &str) -> Result<DeletedThread> {
        let existing = lock(&self.threads).get(thread_id).cloned();
        let history_messages = match existing {
            Some(thread) => {
                // Waits for any in-flight write-back on this thread.
                let mut state = thread.lock().await;
                let n = state.history.len();
                state.history.clear();
                lock(&self.threads).remove(thread_id);
                n
            }
            None => 0,
        };

        let had_context = self.tracker.forget(thread_id).await?;
        let facts_removed = self.memory.delete_thread_scoped(thread_id).await?;

        if history_messages == 0 && !had_context && facts_removed == 0 {
            return Err(Error::not_found("thread", thread_id));
        }
        info!(thread_id, history_messages, facts_removed, "Deleted thread");
        Ok(DeletedThread {
            thread_id: thread_id.to_string(),
            history_messages,
            had_context,
            facts_removed,
        })
    }

    /// Apply a 1-5 user rating to the components used in `turn_id`.
    /// Each turn can be rated once; unknown or already rated turns are
    /// `Error::NotFound`.
    pub async fn rate_turn(&self, turn_id: &str, rating: u8) -> Result<WeightUpdate> {
        let (components, quality) = lock(&self.ledger)
            .take_for_rating(turn_id)
            .ok_or_else(|| Error::not_found("turn", turn_id))?;
        let quality = quality.unwrap_or(0.5);
        debug!(turn_id, rating, quality, "Applying user rating");
        self.registry
            .update_weights(&components, quality, Some(rating))
            .await
    }
}

/// Everything the post-reply work needs, owned so it can outlive the call.
struct WriteBack {
    turn_id: String,
    thread_id: String,
    user: Message,
    assistant: Message,
    components: Vec<String>,
    agent: String,
    history_window: usize,
    guard: OwnedMutexGuard<ThreadState>,
    memory: Arc<dyn MemoryStore>,
    extractor: Arc<dyn FactExtractor>,
    registry: Arc<PromptComponentRegistry>,
    assessor: Arc<QualityAssessor>,
    ledger: Arc<StdMutex<TurnLedger>>,
}

impl WriteBack {
    async fn run(mut self) {
        if !lock(&self.ledger).begin_write_back(&self.turn_id) {
            debug!(turn_id = %self.turn_id, "Write-back already applied");
            return;
        }

        let history = &mut self.guard.history;
        history.push_back(self.user.clone());
        history.push_back(self.assistant.clone());
        while history.len() > self.history_window {
            history.pop_front();
        }

        let candidates = self
            .extractor
            .extract(&self.user.content, &self.assistant.content)
            .await;
        let mut saved = 0;
        for candidate in candidates {
            let fact = candidate.into_fact(&self.agent, Some(&self.thread_id));
            match self.memory.save(fact).await {
                Ok(_) => saved += 1,
                Err(e) => warn!(thread_id = %self.thread_id, error = %e, "Failed to save memory"),
            }
        }

        let report = self
            .assessor
            .score(&self.assistant.content, &self.user.content);
        lock(&self.ledger).record_quality(&self.turn_id, report.overall_score);
        if let Err(e) = self
            .registry
            .update_weights(&self.components, report.overall_score, None)
            .await
        {
            warn!(turn_id = %self.turn_id, error = %e, "Failed to update component weights");
        }

        debug!(
            thread_id = %self.thread_id,
            turn_id = %self.turn_id,
            saved,
            quality = report.overall_score,
            issues = ?report.issues,
            "Write-back finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, UnwritableMemoryStore};
    use mnemo_core::{ProviderError, Role, THREAD_SCOPED_TAG};
    use mnemo_memory::InMemoryStore;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.registry.seed = Some(42);
        config
    }

    async fn engine_with(provider: Arc<ScriptedProvider>) -> (Engine, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let engine = Engine::new(&config(), provider, EngineStores::shared(store.clone()))
            .await
            .unwrap();
        (engine, store)
    }

    #[tokio::test]
    async fn turn_returns_reply_and_learns_facts() {
        let provider = Arc::new(ScriptedProvider::replying("Nice to meet you, Alex!"));
        let (engine, store) = engine_with(provider.clone()).await;

        let outcome = engine
            .handle_turn("t1", "My name is Alex and I work at Google")
            .await
            .unwrap();
        assert_eq!(outcome.reply, "Nice to meet you, Alex!");
        assert!(!outcome.degraded);
        assert_eq!(outcome.components.len(), 5);
        assert!(outcome.allocation.total() <= 4000);
        assert_eq!(outcome.context.evolution_count, 1);

        engine.wait_idle().await;
        let facts = store.find(&FactFilter::all()).await.unwrap();
        assert!(facts.len() >= 2);
        assert!(facts.iter().all(|f| f.source_thread_id.as_deref() == Some("t1")));
        assert!(facts.iter().any(|f| f.answer == "Alex"));

        let request = &provider.requests()[0];
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.max_tokens, Some(outcome.allocation.response_buffer as u32));
    }

    #[tokio::test]
    async fn later_turns_see_memories_and_history() {
        let provider = Arc::new(ScriptedProvider::replying("Got it."));
        let (engine, _) = engine_with(provider.clone()).await;

        engine.handle_turn("t1", "My name is Alex").await.unwrap();
        engine.handle_turn("t1", "What's my name?").await.unwrap();

        let second = &provider.requests()[1];
        let memory = second
            .messages
            .iter()
            .find(|m| m.content.starts_with(crate::prompt::MEMORY_HEADER))
            .expect("memory block present");
        assert!(memory.content.contains("A: Alex"));
        assert!(second.messages.iter().any(|m| m.role == Role::User && m.content == "My name is Alex"));
        assert_eq!(second.messages.last().unwrap().content, "What's my name?");
    }

    #[tokio::test]
    async fn provider_failure_degrades_without_learning() {
        let provider = Arc::new(
            ScriptedProvider::new().then_fail(ProviderError::Network("connection refused".into())),
        );
        let (engine, store) = engine_with(provider).await;
        let before = engine.registry().components().await;

        let outcome = engine.handle_turn("t1", "My name is Alex").await.unwrap();
        engine.wait_idle().await;

        assert!(outcome.degraded);
        assert_eq!(outcome.reply, config().engine.degraded_reply);
        assert!(store.find(&FactFilter::all()).await.unwrap().is_empty());
        let after = engine.registry().components().await;
        for (b, a) in before.iter().zip(&after) {
            assert_eq!(b.weight, a.weight);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let provider = Arc::new(ScriptedProvider::new().with_delay(Duration::from_secs(600)));
        let (engine, _) = engine_with(provider).await;
        let outcome = engine.handle_turn("t1", "hello there friend").await.unwrap();
        assert!(outcome.degraded);
    }

    #[tokio::test]
    async fn failed_memory_save_does_not_block_reply() {
        let store = Arc::new(InMemoryStore::new());
        let stores = EngineStores {
            memory: Arc::new(UnwritableMemoryStore::new()),
            components: store.clone(),
            contexts: store,
        };
        let provider = Arc::new(ScriptedProvider::replying("Hi Alex"));
        let engine = Engine::new(&config(), provider, stores).await.unwrap();

        let outcome = engine.handle_turn("t1", "My name is Alex").await.unwrap();
        engine.wait_idle().await;
        assert_eq!(outcome.reply, "Hi Alex");
        assert!(!outcome.degraded);
    }

    #[tokio::test]
    async fn unreadable_memory_degrades_instead_of_failing() {
        let store = Arc::new(InMemoryStore::new());
        let stores = EngineStores {
            memory: Arc::new(UnwritableMemoryStore::unreadable()),
            components: store.clone(),
            contexts: store,
        };
        let provider = Arc::new(ScriptedProvider::replying("Hi Alex"));
        let engine = Engine::new(&config(), provider.clone(), stores).await.unwrap();

        let outcome = engine.handle_turn("t1", "My name is Alex").await.unwrap();
        engine.wait_idle().await;
        assert!(outcome.degraded);
        assert_eq!(outcome.reply, config().engine.degraded_reply);
        assert_eq!(provider.request_count(), 0);
        assert!(engine.rate_turn(&outcome.turn_id, 5).await.is_err());

        // The thread lock was released; the next turn runs too.
        assert!(engine.handle_turn("t1", "hello").await.unwrap().degraded);
    }

    #[tokio::test]
    async fn context_is_tracked_per_thread() {
        let (engine, _) = engine_with(Arc::new(ScriptedProvider::new())).await;
        assert!(engine.get_context("t1").await.unwrap_err().is_not_found());

        engine.handle_turn("t1", "hello").await.unwrap();
        engine.wait_idle().await;
        let context = engine.get_context("t1").await.unwrap();
        assert_eq!(context.evolution_count, 1);
        assert!(engine.get_context("t2").await.is_err());
    }

    #[tokio::test]
    async fn memories_can_be_queried_by_tag() {
        let (engine, store) = engine_with(Arc::new(ScriptedProvider::new())).await;
        store
            .save(MemoryFact::new("Where does the user work?", "Google", "default").with_tags(["work"]))
            .await
            .unwrap();
        store
            .save(MemoryFact::new("What is the user's name?", "Alex", "other").with_tags(["identity"]))
            .await
            .unwrap();

        let work = engine
            .query_memories(Some(BTreeSet::from(["work".to_string()])), None)
            .await
            .unwrap();
        assert_eq!(work.len(), 1);
        assert_eq!(work[0].answer, "Google");

        let other = engine.query_memories(None, Some("other".into())).await.unwrap();
        assert_eq!(other.len(), 1);
        assert_eq!(engine.query_memories(None, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn deleting_a_thread_cascades() {
        let (engine, store) = engine_with(Arc::new(ScriptedProvider::new())).await;
        engine.handle_turn("t1", "hello").await.unwrap();
        engine.wait_idle().await;

        store
            .save(
                MemoryFact::new("What is the draft title?", "Night Trains", "default")
                    .with_tags([THREAD_SCOPED_TAG])
                    .with_thread("t1"),
            )
            .await
            .unwrap();
        store
            .save(MemoryFact::new("What is the user's name?", "Alex", "default").with_thread("t1"))
            .await
            .unwrap();

        let deleted = engine.delete_thread("t1").await.unwrap();
        assert_eq!(deleted.history_messages, 2);
        assert!(deleted.had_context);
        assert_eq!(deleted.facts_removed, 1);

        let remaining = store.find(&FactFilter::all()).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].answer, "Alex");
        assert!(engine.get_context("t1").await.unwrap_err().is_not_found());
        assert!(engine.delete_thread("t1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn conversation_only_facts_go_with_their_thread() {
        let (engine, store) = engine_with(Arc::new(ScriptedProvider::new())).await;
        engine
            .handle_turn("t1", "My name is Alex. Remember that the draft is called Night Trains for this conversation.")
            .await
            .unwrap();
        engine.wait_idle().await;
        assert_eq!(store.count().await.unwrap(), 2);

        let deleted = engine.delete_thread("t1").await.unwrap();
        assert_eq!(deleted.facts_removed, 1);
        let remaining = store.find(&FactFilter::all()).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].answer, "Alex");
    }

    #[tokio::test]
    async fn rating_applies_once() {
        let (engine, _) = engine_with(Arc::new(ScriptedProvider::replying(
            "Here's how: first, open the settings page and pick a theme.",
        )))
        .await;
        let outcome = engine.handle_turn("t1", "How do I change the theme?").await.unwrap();
        engine.wait_idle().await;

        let before: HashMap<String, f32> = engine
            .registry()
            .components()
            .await
            .into_iter()
            .map(|c| (c.id, c.weight))
            .collect();
        let update = engine.rate_turn(&outcome.turn_id, 5).await.unwrap();
        assert_eq!(update.updated.len(), 5);
        for id in &outcome.components {
            let after = engine.registry().get(id).await.unwrap().weight;
            assert!(after > before[id]);
        }

        assert!(engine.rate_turn(&outcome.turn_id, 5).await.unwrap_err().is_not_found());
        assert!(engine.rate_turn("no-such-turn", 3).await.is_err());
    }

    #[tokio::test]
    async fn turns_on_one_thread_are_serialized() {
        let (engine, _) = engine_with(Arc::new(ScriptedProvider::new())).await;
        let engine = Arc::new(engine);

        let tasks: Vec<_> = (0..5)
            .map(|i| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.handle_turn("shared", &format!("message {i}")).await })
            })
            .collect();
        for t in tasks {
            assert!(!t.await.unwrap().unwrap().degraded);
        }
        engine.wait_idle().await;

        let context = engine.get_context("shared").await.unwrap();
        assert_eq!(context.evolution_count, 5);
        let thread = engine.thread("shared");
        assert_eq!(thread.lock().await.history.len(), 10);
    }

    #[tokio::test]
    async fn separate_threads_do_not_share_history() {
        let provider = Arc::new(ScriptedProvider::new());
        let (engine, _) = engine_with(provider.clone()).await;
        engine.handle_turn("a", "first thread message").await.unwrap();
        engine.handle_turn("b", "second thread message").await.unwrap();
        engine.wait_idle().await;

        let to_b = &provider.requests()[1];
        assert!(!to_b.messages.iter().any(|m| m.content == "first thread message"));
    }

    #[test]
    fn ledger_is_bounded_and_single_use() {
        let mut ledger = TurnLedger::default();
        ledger.register("t0", vec!["a".into()]);
        assert!(ledger.begin_write_back("t0"));
        assert!(!ledger.begin_write_back("t0"));
        assert!(!ledger.begin_write_back("unknown"));

        for i in 1..=LEDGER_CAPACITY {
            ledger.register(&format!("t{i}"), Vec::new());
        }
        assert!(ledger.take_for_rating("t0").is_none());
        assert_eq!(ledger.turns.len(), LEDGER_CAPACITY);
    }
}
