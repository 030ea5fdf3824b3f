//! In-memory store, useful for testing and ephemeral sessions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mnemo_core::error::{Error, Result};
use mnemo_core::{
    ComponentStore, ContextState, ContextStore, FactFilter, Importance, MemoryFact, MemoryStore,
    PromptComponent,
};
use tokio::sync::RwLock;

/// Keeps facts in a Vec (insertion order) plus maps for components and
/// thread contexts. Nothing survives the process.
pub struct InMemoryStore {
    facts: Arc<RwLock<Vec<MemoryFact>>>,
    components: Arc<RwLock<HashMap<String, PromptComponent>>>,
    contexts: Arc<RwLock<HashMap<String, ContextState>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            facts: Arc::new(RwLock::new(Vec::new())),
            components: Arc::new(RwLock::new(HashMap::new())),
            contexts: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn save(&self, fact: MemoryFact) -> Result<String> {
        let fact = fact.normalized();
        let id = fact.id.clone();
        let mut facts = self.facts.write().await;
        match facts.iter_mut().find(|f| f.id == id) {
            Some(existing) => *existing = fact,
            None => facts.push(fact),
        }
        Ok(id)
    }

    async fn find(&self, filter: &FactFilter) -> Result<Vec<MemoryFact>> {
        let facts = self.facts.read().await;
        Ok(facts.iter().filter(|f| filter.matches(f)).cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<MemoryFact> {
        let facts = self.facts.read().await;
        facts
            .iter()
            .find(|f| f.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found("memory", id))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut facts = self.facts.write().await;
        let len_before = facts.len();
        facts.retain(|f| f.id != id);
        if facts.len() == len_before {
            return Err(Error::not_found("memory", id));
        }
        Ok(())
    }

    async fn update_importance(&self, id: &str, importance: Importance) -> Result<()> {
        let mut facts = self.facts.write().await;
        let fact = facts
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| Error::not_found("memory", id))?;
        fact.importance = importance;
        Ok(())
    }

    async fn delete_thread_scoped(&self, thread_id: &str) -> Result<usize> {
        let mut facts = self.facts.write().await;
        let len_before = facts.len();
        facts.retain(|f| !f.is_thread_scoped_to(thread_id));
        Ok(len_before - facts.len())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.facts.read().await.len())
    }
}

#[async_trait]
impl ComponentStore for InMemoryStore {
    async fn load_components(&self) -> Result<Vec<PromptComponent>> {
        let mut all: Vec<_> = self.components.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn upsert_component(&self, component: &PromptComponent) -> Result<()> {
        self.components
            .write()
            .await
            .insert(component.id.clone(), component.clone());
        Ok(())
    }
}

#[async_trait]
impl ContextStore for InMemoryStore {
    async fn load_context(&self, thread_id: &str) -> Result<Option<ContextState>> {
        Ok(self.contexts.read().await.get(thread_id).cloned())
    }

    async fn upsert_context(&self, state: &ContextState) -> Result<()> {
        self.contexts
            .write()
            .await
            .insert(state.thread_id.clone(), state.clone());
        Ok(())
    }

    async fn delete_context(&self, thread_id: &str) -> Result<bool> {
        Ok(self.contexts.write().await.remove(thread_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_core::THREAD_SCOPED_TAG;

    fn fact(q: &str, a: &str, tags: &[&str]) -> MemoryFact {
        MemoryFact::new(q, a, "default").with_tags(tags.iter().copied())
    }

    #[tokio::test]
    async fn save_and_find_by_tag() {
        let store = InMemoryStore::new();
        store
            .save(fact("What is the user's name?", "Alex", &["identity"]))
            .await
            .unwrap();
        store
            .save(fact("Where does the user work?", "Google", &["work"]))
            .await
            .unwrap();

        let found = store.find(&FactFilter::tagged(["identity"])).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].question, "What is the user's name?");
        assert_eq!(found[0].answer, "Alex");
    }

    #[tokio::test]
    async fn find_preserves_insertion_order() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store.save(fact(&format!("Q{i}"), "A", &[])).await.unwrap();
        }
        let all = store.find(&FactFilter::all()).await.unwrap();
        let questions: Vec<_> = all.iter().map(|f| f.question.as_str()).collect();
        assert_eq!(questions, vec!["Q0", "Q1", "Q2", "Q3", "Q4"]);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let store = InMemoryStore::new();
        assert!(store.get("missing").await.unwrap_err().is_not_found());
        assert!(store.delete("missing").await.unwrap_err().is_not_found());
        assert!(
            store
                .update_importance("missing", Importance::High)
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn empty_id_gets_assigned() {
        let store = InMemoryStore::new();
        let mut f = fact("Q", "A", &[]);
        f.id.clear();
        let id = store.save(f).await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(store.get(&id).await.unwrap().answer, "A");
    }

    #[tokio::test]
    async fn thread_cascade_spares_global_facts() {
        let store = InMemoryStore::new();
        store
            .save(fact("Q1", "A", &[THREAD_SCOPED_TAG]).with_thread("t1"))
            .await
            .unwrap();
        store.save(fact("Q2", "A", &[]).with_thread("t1")).await.unwrap();
        store
            .save(fact("Q3", "A", &[THREAD_SCOPED_TAG]).with_thread("t2"))
            .await
            .unwrap();

        assert_eq!(store.delete_thread_scoped("t1").await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn contexts_round_trip() {
        let store = InMemoryStore::new();
        let mut state = ContextState::new("t1");
        state.evolution_count = 3;
        store.upsert_context(&state).await.unwrap();
        assert_eq!(store.load_context("t1").await.unwrap(), Some(state));
        assert!(store.delete_context("t1").await.unwrap());
        assert!(!store.delete_context("t1").await.unwrap());
    }
}
