//! File-based store — JSON-lines facts plus JSON documents for learned state.
//!
//! Layout under the store directory:
//! - `facts.jsonl`: one `MemoryFact` per line, insertion order
//! - `components.json`: array of `PromptComponent`
//! - `contexts.json`: map of thread id to `ContextState`
//!
//! Storage location by default: `~/.mnemo/data/`
//!
//! Everything is loaded on open and flushed on every mutation, giving fast
//! reads with durable writes. Human-inspectable and dependency-free.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use mnemo_core::error::{Error, Result, StorageError};
use mnemo_core::{
    ComponentStore, ContextState, ContextStore, FactFilter, Importance, MemoryFact, MemoryStore,
    PromptComponent,
};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const FACTS_FILE: &str = "facts.jsonl";
const COMPONENTS_FILE: &str = "components.json";
const CONTEXTS_FILE: &str = "contexts.json";

/// A directory-backed store.
pub struct FileStore {
    dir: PathBuf,
    facts: Arc<RwLock<Vec<MemoryFact>>>,
    components: Arc<RwLock<BTreeMap<String, PromptComponent>>>,
    contexts: Arc<RwLock<BTreeMap<String, ContextState>>>,
}

impl FileStore {
    /// Open (or lazily create) a store in `dir`.
    ///
    /// Missing files start empty and are created on first write. Corrupted
    /// fact lines are skipped with a warning; a corrupted JSON document or
    /// an unreadable file is an error.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let facts = Self::load_facts(&dir.join(FACTS_FILE))?;
        let components: Vec<PromptComponent> = load_document(&dir.join(COMPONENTS_FILE))?;
        let contexts: BTreeMap<String, ContextState> = load_document(&dir.join(CONTEXTS_FILE))?;
        debug!(
            path = %dir.display(),
            facts = facts.len(),
            components = components.len(),
            threads = contexts.len(),
            "File store loaded"
        );
        Ok(Self {
            dir,
            facts: Arc::new(RwLock::new(facts)),
            components: Arc::new(RwLock::new(
                components
                    .into_iter()
                    .map(|c| (c.id.clone(), c.normalized()))
                    .collect(),
            )),
            contexts: Arc::new(RwLock::new(contexts)),
        })
    }

    /// Default directory: `~/.mnemo/data`
    pub fn default_dir() -> PathBuf {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".mnemo").join("data")
    }

    fn load_facts(path: &Path) -> Result<Vec<MemoryFact>> {
        // Read raw bytes so one bad line only drops that line. Anything but
        // a missing file fails the open.
        let content = match std::fs::read(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::Io(format!("{}: {e}", path.display())).into());
            }
        };

        Ok(content
            .split(|b| *b == b'\n')
            .filter_map(|line| match std::str::from_utf8(line) {
                Ok(line) => Some(line),
                Err(e) => {
                    warn!(error = %e, "Skipping fact line with invalid UTF-8");
                    None
                }
            })
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<MemoryFact>(line) {
                Ok(fact) => Some(fact.normalized()),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted fact line");
                    None
                }
            })
            .collect())
    }

    fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            StorageError::Io(format!("Failed to create {}: {e}", self.dir.display())).into()
        })
    }

    async fn flush_facts(&self) -> Result<()> {
        // Exclusive guard so concurrent flushes never share the temp file.
        let facts = self.facts.write().await;
        self.ensure_dir()?;

        let mut content = String::new();
        for fact in facts.iter() {
            content.push_str(&serde_json::to_string(fact)?);
            content.push('\n');
        }
        write_atomically(&self.dir.join(FACTS_FILE), &content)
    }

    async fn flush_components(&self) -> Result<()> {
        let components = self.components.write().await;
        self.ensure_dir()?;
        let list: Vec<&PromptComponent> = components.values().collect();
        write_atomically(
            &self.dir.join(COMPONENTS_FILE),
            &serde_json::to_string_pretty(&list)?,
        )
    }

    async fn flush_contexts(&self) -> Result<()> {
        let contexts = self.contexts.write().await;
        self.ensure_dir()?;
        write_atomically(
            &self.dir.join(CONTEXTS_FILE),
            &serde_json::to_string_pretty(&*contexts)?,
        )
    }
}

fn load_document<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match std::fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(T::default()),
        Ok(content) => serde_json::from_str(&content).map_err(|e| {
            StorageError::Corrupt(format!("{}: {e}", path.display())).into()
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(StorageError::Io(format!("{}: {e}", path.display())).into()),
    }
}

/// Write via a sibling temp file and rename, so a crash never leaves a
/// half-written document behind.
fn write_atomically(path: &Path, content: &str) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content)
        .and_then(|_| std::fs::rename(&tmp, path))
        .map_err(|e| StorageError::Io(format!("Failed to write {}: {e}", path.display())))?;
    Ok(())
}

#[async_trait]
impl MemoryStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn save(&self, fact: MemoryFact) -> Result<String> {
        let fact = fact.normalized();
        let id = fact.id.clone();
        {
            let mut facts = self.facts.write().await;
            match facts.iter_mut().find(|f| f.id == id) {
                Some(existing) => *existing = fact,
                None => facts.push(fact),
            }
        }
        self.flush_facts().await?;
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
        let deleted = facts.len() < len_before;
        drop(facts);
        if !deleted {
            return Err(Error::not_found("memory", id));
        }
        self.flush_facts().await
    }

    async fn update_importance(&self, id: &str, importance: Importance) -> Result<()> {
        {
            let mut facts = self.facts.write().await;
            let fact = facts
                .iter_mut()
                .find(|f| f.id == id)
                .ok_or_else(|| Error::not_found("memory", id))?;
            fact.importance = importance;
        }
        self.flush_facts().await
    }

    async fn delete_thread_scoped(&self, thread_id: &str) -> Result<usize> {
        let removed = {
            let mut facts = self.facts.write().await;
            let len_before = facts.len();
            facts.retain(|f| !f.is_thread_scoped_to(thread_id));
            len_before - facts.len()
        };
        if removed > 0 {
            self.flush_facts().await?;
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.facts.read().await.len())
    }
}

#[async_trait]
impl ComponentStore for FileStore {
    async fn load_components(&self) -> Result<Vec<PromptComponent>> {
        Ok(self.components.read().await.values().cloned().collect())
    }

    async fn upsert_component(&self, component: &PromptComponent) -> Result<()> {
        self.components
            .write()
            .await
            .insert(component.id.clone(), component.clone());
        self.flush_components().await
    }
}

#[async_trait]
impl ContextStore for FileStore {
    async fn load_context(&self, thread_id: &str) -> Result<Option<ContextState>> {
        Ok(self.contexts.read().await.get(thread_id).cloned())
    }

    async fn upsert_context(&self, state: &ContextState) -> Result<()> {
        self.contexts
            .write()
            .await
            .insert(state.thread_id.clone(), state.clone());
        self.flush_contexts().await
    }

    async fn delete_context(&self, thread_id: &str) -> Result<bool> {
        let existed = self.contexts.write().await.remove(thread_id).is_some();
        if existed {
            self.flush_contexts().await?;
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn fact(q: &str, a: &str, tags: &[&str]) -> MemoryFact {
        MemoryFact::new(q, a, "default").with_tags(tags.iter().copied())
    }

    #[tokio::test]
    async fn save_persists_across_reopen() {
        let dir = TempDir::new().unwrap();

        let store = FileStore::open(dir.path()).unwrap();
        let id = store
            .save(fact("What is the user's name?", "Alex", &["identity"]))
            .await
            .unwrap();

        let content = std::fs::read_to_string(dir.path().join(FACTS_FILE)).unwrap();
        assert!(content.contains("Alex"));

        let reopened = FileStore::open(dir.path()).unwrap();
        let loaded = reopened.get(&id).await.unwrap();
        assert_eq!(loaded.answer, "Alex");
        assert!(loaded.tags.contains("identity"));
    }

    #[tokio::test]
    async fn find_by_tag_after_reopen() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.save(fact("Favorite food?", "Ramen", &["preferences"])).await.unwrap();
        store.save(fact("Employer?", "Google", &["work"])).await.unwrap();

        let reopened = FileStore::open(dir.path()).unwrap();
        let work = reopened.find(&FactFilter::tagged(["work"])).await.unwrap();
        assert_eq!(work.len(), 1);
        assert_eq!(work[0].question, "Employer?");
        assert_eq!(work[0].answer, "Google");
    }

    #[tokio::test]
    async fn delete_persists() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let id = store.save(fact("Q", "To be deleted", &[])).await.unwrap();
        store.delete(&id).await.unwrap();

        let reopened = FileStore::open(dir.path()).unwrap();
        assert!(reopened.get(&id).await.unwrap_err().is_not_found());
        assert_eq!(reopened.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn handles_missing_directory_gracefully() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("not").join("yet")).unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.load_components().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn skips_corrupted_fact_lines() {
        let dir = TempDir::new().unwrap();
        let valid = serde_json::to_string(&fact("Q1", "A1", &[])).unwrap();
        let also_valid = serde_json::to_string(&fact("Q2", "A2", &[])).unwrap();
        let mut file = std::fs::File::create(dir.path().join(FACTS_FILE)).unwrap();
        writeln!(file, "{valid}").unwrap();
        writeln!(file, "this is not json").unwrap();
        writeln!(file, "{also_valid}").unwrap();

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_discard_saved_facts() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.save(fact("Name?", "Alex", &[])).await.unwrap();
        store.save(fact("Employer?", "Google", &[])).await.unwrap();
        drop(store);

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join(FACTS_FILE))
            .unwrap();
        file.write_all(&[0xff]).unwrap();
        drop(file);

        let reopened = FileStore::open(dir.path()).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 2);
        reopened.save(fact("City?", "Lisbon", &[])).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join(FACTS_FILE)).unwrap();
        for answer in ["Alex", "Google", "Lisbon"] {
            assert!(content.contains(answer), "{answer} lost");
        }
    }

    #[tokio::test]
    async fn unreadable_fact_file_fails_open() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(FACTS_FILE)).unwrap();
        let err = FileStore::open(dir.path()).err().unwrap();
        assert!(matches!(err, Error::Storage(StorageError::Io(_))));
    }

    #[tokio::test]
    async fn corrupted_component_document_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(COMPONENTS_FILE), "{ nope").unwrap();
        let err = FileStore::open(dir.path()).err().unwrap();
        assert!(matches!(err, Error::Storage(StorageError::Corrupt(_))));
    }

    #[tokio::test]
    async fn components_and_contexts_persist() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let mut component = PromptComponent::new("tone.witty", "tone", "Be witty.");
        component.weight = 0.4;
        store.upsert_component(&component).await.unwrap();

        let mut state = ContextState::new("t1");
        state.evolution_count = 7;
        store.upsert_context(&state).await.unwrap();

        let reopened = FileStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load_components().await.unwrap(), vec![component]);
        let restored = reopened.load_context("t1").await.unwrap().unwrap();
        assert_eq!(restored.evolution_count, 7);
    }
}
