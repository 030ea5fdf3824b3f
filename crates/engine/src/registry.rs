//! Prompt component registry.
//!
//! Holds every prompt fragment, picks one per category for each prompt by
//! weighted random sampling, and learns weights from response quality.
//!
//! A component's sampling priority is `exp(weight / temperature)` scaled
//! by its squared success rate and by a bonus when its text suits the
//! thread's `PromptStrategy`. Priorities are normalized within a category,
//! so even negatively weighted fragments keep some exploration. Among
//! components of equal weight the less used ones get a further bonus.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use mnemo_config::RegistryConfig;
use mnemo_core::{
    ComponentStore, ContextState, ExpertiseLevel, PromptComponent, Result, TaskComplexity,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Lowest sampling temperature accepted; avoids dividing by zero.
const MIN_TEMPERATURE: f64 = 1e-3;

/// Success rates below this count as this, so failing components are
/// still tried now and then.
const MIN_SUCCESS_RATE: f64 = 0.1;

/// Weights closer than this are tied.
const WEIGHT_TIE: f32 = 1e-6;

/// Priority multiplier for the least used of tied components.
const TIE_BONUS: f64 = 2.0;

/// How a prompt should lean, read from the thread's context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStrategy {
    /// The user has corrected several recent answers
    ErrorRecovery,
    DetailedGuidance,
    ConciseExpert,
    /// A long-running thread
    ContextAware,
    Balanced,
}

impl PromptStrategy {
    pub fn for_context(context: &ContextState) -> Self {
        if context.recent_errors > 2 {
            Self::ErrorRecovery
        } else if context.task_complexity == TaskComplexity::Complex {
            Self::DetailedGuidance
        } else if context.user_expertise == ExpertiseLevel::High {
            Self::ConciseExpert
        } else if context.evolution_count > 10 {
            Self::ContextAware
        } else {
            Self::Balanced
        }
    }

    fn cues(self) -> &'static [&'static str] {
        match self {
            Self::ErrorRecovery => &["careful", "accurate", "precise", "double-check", "confident"],
            Self::DetailedGuidance => {
                &["detailed", "specific", "thorough", "step by step", "numbered steps"]
            }
            Self::ConciseExpert => &["concise", "brief", "short", "efficient", "lead with the answer"],
            Self::ContextAware | Self::Balanced => &[],
        }
    }

    fn multiplier(self) -> f64 {
        match self {
            Self::ErrorRecovery => 1.3,
            Self::DetailedGuidance => 1.4,
            Self::ConciseExpert => 1.5,
            Self::ContextAware | Self::Balanced => 1.0,
        }
    }

    /// Multiplier for a component whose text suits this strategy.
    fn bonus_for(self, component: &PromptComponent) -> f64 {
        let text = component.text_template.to_lowercase();
        if self.cues().iter().any(|cue| text.contains(cue)) {
            self.multiplier()
        } else {
            1.0
        }
    }
}

/// A component chosen for one prompt, with its template rendered.
#[derive(Debug, Clone, Serialize)]
pub struct SelectedComponent {
    /// Snapshot taken right after the selection was recorded
    pub component: PromptComponent,
    pub text: String,
}

/// Result of a weight update batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeightUpdate {
    pub updated: Vec<String>,
    /// Ids that matched no component
    pub unknown: Vec<String>,
}

pub struct PromptComponentRegistry {
    components: RwLock<HashMap<String, Arc<Mutex<PromptComponent>>>>,
    store: Arc<dyn ComponentStore>,
    rng: std::sync::Mutex<StdRng>,
    config: RegistryConfig,
}

impl PromptComponentRegistry {
    /// Load components from `store`, seeding the built-in set when the
    /// store has none and `config.seed_defaults` is on.
    pub async fn load(store: Arc<dyn ComponentStore>, config: RegistryConfig) -> Result<Self> {
        let mut loaded = store.load_components().await?;
        if loaded.is_empty() && config.seed_defaults {
            loaded = default_components();
            for component in &loaded {
                store.upsert_component(component).await?;
            }
            info!(count = loaded.len(), "Seeded default prompt components");
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let components = loaded
            .into_iter()
            .map(|c| {
                let c = c.normalized();
                (c.id.clone(), Arc::new(Mutex::new(c)))
            })
            .collect::<HashMap<_, _>>();
        debug!(count = components.len(), "Prompt component registry ready");

        Ok(Self {
            components: RwLock::new(components),
            store,
            rng: std::sync::Mutex::new(rng),
            config,
        })
    }

    /// Replace the sampling RNG.
    pub fn with_rng(self, rng: StdRng) -> Self {
        Self {
            rng: std::sync::Mutex::new(rng),
            ..self
        }
    }

    /// Add (or replace) a component and persist it.
    pub async fn register(&self, component: PromptComponent) -> Result<()> {
        let component = component.normalized();
        self.store.upsert_component(&component).await?;
        self.components
            .write()
            .await
            .insert(component.id.clone(), Arc::new(Mutex::new(component)));
        Ok(())
    }

    /// Snapshot of every component, sorted by category then id.
    pub async fn components(&self) -> Vec<PromptComponent> {
        let map = self.components.read().await;
        let mut out = Vec::with_capacity(map.len());
        for component in map.values() {
            out.push(component.lock().await.clone());
        }
        out.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub async fn get(&self, id: &str) -> Option<PromptComponent> {
        let handle = self.components.read().await.get(id).cloned()?;
        let component = handle.lock().await.clone();
        Some(component)
    }

    /// Pick one component per category for a prompt in `context`.
    ///
    /// Each pick is recorded (usage count, last use) and persisted; a
    /// persistence failure is logged and does not undo the selection.
    pub async fn select(&self, context: &ContextState) -> Vec<SelectedComponent> {
        let handles: Vec<Arc<Mutex<PromptComponent>>> =
            self.components.read().await.values().cloned().collect();

        let mut by_category: BTreeMap<String, Vec<(PromptComponent, Arc<Mutex<PromptComponent>>)>> =
            BTreeMap::new();
        for handle in handles {
            let snapshot = handle.lock().await.clone();
            by_category
                .entry(snapshot.category.clone())
                .or_default()
                .push((snapshot, handle));
        }

        let temperature = f64::from(self.config.sampling_temperature).max(MIN_TEMPERATURE);
        let strategy = PromptStrategy::for_context(context);
        let winners: Vec<Arc<Mutex<PromptComponent>>> = {
            let mut rng = match self.rng.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            by_category
                .into_values()
                .filter_map(|mut entries| {
                    entries.sort_by(|(a, _), (b, _)| a.id.cmp(&b.id));
                    let bonuses = tie_bonuses(entries.iter().map(|(c, _)| c));
                    let keyed: Vec<_> = entries
                        .into_iter()
                        .zip(bonuses)
                        .map(|((snapshot, handle), tie_bonus)| {
                            let p = priority(&snapshot, temperature, strategy) * tie_bonus;
                            let u: f64 = rng.random();
                            (sampling_key(p, u), snapshot, handle)
                        })
                        .collect();
                    pick_winner(keyed)
                })
                .collect()
        };

        let conversation_type = context.conversation_type.as_str();
        let expertise = context.user_expertise.as_str();
        let mut selected = Vec::with_capacity(winners.len());
        for handle in winners {
            let mut component = handle.lock().await;
            component.mark_used();
            if let Err(e) = self.store.upsert_component(&component).await {
                warn!(component = %component.id, error = %e, "Failed to persist component usage");
            }
            selected.push(SelectedComponent {
                text: component.render(conversation_type, expertise),
                component: component.clone(),
            });
        }

        debug!(
            thread_id = %context.thread_id,
            ?strategy,
            selected = ?selected.iter().map(|s| s.component.id.as_str()).collect::<Vec<_>>(),
            "Selected prompt components"
        );
        selected
    }

    /// Learn from one response.
    ///
    /// `quality_score` is in [0, 1]; an optional 1-5 `user_rating` is
    /// averaged in. Unknown ids are skipped and reported. Every known
    /// component is updated even when persisting one of them fails; the
    /// first persistence error is returned.
    pub async fn update_weights(
        &self,
        component_ids: &[String],
        quality_score: f32,
        user_rating: Option<u8>,
    ) -> Result<WeightUpdate> {
        let signal = learning_signal(quality_score, user_rating);
        let map = self.components.read().await;

        let mut report = WeightUpdate::default();
        let mut first_error = None;
        for id in component_ids {
            let Some(handle) = map.get(id) else {
                report.unknown.push(id.clone());
                continue;
            };

            let mut component = handle.lock().await;
            self.apply(&mut component, signal);
            if let Err(e) = self.store.upsert_component(&component).await {
                warn!(component = %id, error = %e, "Failed to persist component weight");
                first_error.get_or_insert(e);
            }
            report.updated.push(id.clone());
        }

        if !report.unknown.is_empty() {
            debug!(unknown = ?report.unknown, "Skipped unknown components");
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    fn apply(&self, component: &mut PromptComponent, signal: f32) {
        let lr = self.config.learning_rate;
        let alpha = self.config.ema_alpha.clamp(0.0, 1.0);
        component.weight = (component.weight + lr * (signal - 0.5)).clamp(-1.0, 1.0);
        let hit = if signal > self.config.success_threshold { 1.0 } else { 0.0 };
        component.success_rate =
            ((1.0 - alpha) * component.success_rate + alpha * hit).clamp(0.0, 1.0);
    }
}

/// Quality, or quality averaged with a 1-5 rating mapped onto [0, 1].
fn learning_signal(quality_score: f32, user_rating: Option<u8>) -> f32 {
    let quality = if quality_score.is_nan() { 0.0 } else { quality_score.clamp(0.0, 1.0) };
    match user_rating {
        Some(rating) => {
            let rating = f32::from(rating.clamp(1, 5) - 1) / 4.0;
            (quality + rating) / 2.0
        }
        None => quality,
    }
}

/// Relative chance of `component` winning its category.
fn priority(component: &PromptComponent, temperature: f64, strategy: PromptStrategy) -> f64 {
    let success = f64::from(component.success_rate).max(MIN_SUCCESS_RATE);
    (f64::from(component.weight) / temperature).exp()
        * success
        * success
        * strategy.bonus_for(component)
}

/// `TIE_BONUS` for each component that is the least used among others of
/// the same weight, 1.0 for the rest.
fn tie_bonuses<'a>(components: impl Iterator<Item = &'a PromptComponent> + Clone) -> Vec<f64> {
    components
        .clone()
        .map(|c| {
            let tied = components
                .clone()
                .filter(|o| (o.weight - c.weight).abs() < WEIGHT_TIE);
            let least = tied.clone().map(|o| o.usage_count).min().unwrap_or(c.usage_count);
            let most = tied.map(|o| o.usage_count).max().unwrap_or(c.usage_count);
            if c.usage_count == least && most > least {
                TIE_BONUS
            } else {
                1.0
            }
        })
        .collect()
}

/// Weighted sampling key (Efraimidis-Spirakis). The largest key wins;
/// a component's chance of winning is proportional to its priority.
fn sampling_key(priority: f64, u: f64) -> f64 {
    (1.0 - u).ln() / priority
}

/// Highest key; equal keys go to the less used component, then the
/// smaller id.
fn pick_winner<T>(mut keyed: Vec<(f64, PromptComponent, T)>) -> Option<T> {
    keyed.sort_by(|(ka, a, _), (kb, b, _)| {
        kb.total_cmp(ka)
            .then(a.usage_count.cmp(&b.usage_count))
            .then_with(|| a.id.cmp(&b.id))
    });
    keyed.into_iter().next().map(|(_, _, handle)| handle)
}

/// The built-in fragments, one small family per category.
pub fn default_components() -> Vec<PromptComponent> {
    [
        ("tone.warm", "tone", "Be warm and encouraging."),
        ("tone.precise", "tone", "Be precise and matter-of-fact."),
        ("tone.witty", "tone", "Keep a light, witty tone where it fits."),
        (
            "reasoning_style.stepwise",
            "reasoning_style",
            "Work through problems step by step and show the reasoning that matters.",
        ),
        (
            "reasoning_style.direct",
            "reasoning_style",
            "Lead with the answer, then add only the reasoning needed to trust it.",
        ),
        (
            "persona.peer",
            "persona",
            "You are a knowledgeable peer in a {conversation_type} conversation with a user of {user_expertise} expertise.",
        ),
        (
            "persona.mentor",
            "persona",
            "You are a patient mentor. Pitch explanations for a user of {user_expertise} expertise.",
        ),
        (
            "persona.expert",
            "persona",
            "You are a domain expert helping with a {conversation_type} request.",
        ),
        (
            "memory_guidelines.natural",
            "memory_guidelines",
            "Use what you know about the user naturally, without announcing that you remember it.",
        ),
        (
            "memory_guidelines.explicit",
            "memory_guidelines",
            "When you rely on something the user told you earlier, say so briefly.",
        ),
        (
            "output_format.concise",
            "output_format",
            "Keep answers short; use lists only when they help.",
        ),
        (
            "output_format.structured",
            "output_format",
            "Organize longer answers with short headings or numbered steps.",
        ),
    ]
    .into_iter()
    .map(|(id, category, text)| PromptComponent::new(id, category, text))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mnemo_core::{ComponentStatus, ConversationType, Error, ExpertiseLevel, StorageError};
    use mnemo_memory::InMemoryStore;

    fn config() -> RegistryConfig {
        RegistryConfig {
            seed: Some(7),
            ..RegistryConfig::default()
        }
    }

    async fn registry_with(components: Vec<PromptComponent>) -> (PromptComponentRegistry, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        for c in &components {
            store.upsert_component(c).await.unwrap();
        }
        let registry = PromptComponentRegistry::load(store.clone(), config()).await.unwrap();
        (registry, store)
    }

    #[tokio::test]
    async fn empty_store_is_seeded() {
        let store = Arc::new(InMemoryStore::new());
        let registry = PromptComponentRegistry::load(store.clone(), config()).await.unwrap();
        let components = registry.components().await;
        assert_eq!(components.len(), 12);
        assert_eq!(store.load_components().await.unwrap().len(), 12);

        let categories: std::collections::BTreeSet<_> =
            components.iter().map(|c| c.category.as_str()).collect();
        assert_eq!(
            categories.into_iter().collect::<Vec<_>>(),
            vec!["memory_guidelines", "output_format", "persona", "reasoning_style", "tone"]
        );
        assert!(components.iter().all(|c| c.status() == ComponentStatus::Candidate));
    }

    #[tokio::test]
    async fn stored_components_are_not_reseeded() {
        let (registry, _) = registry_with(vec![PromptComponent::new("tone.only", "tone", "Be calm.")]).await;
        assert_eq!(registry.components().await.len(), 1);
    }

    #[tokio::test]
    async fn seeding_can_be_disabled() {
        let store = Arc::new(InMemoryStore::new());
        let config = RegistryConfig {
            seed_defaults: false,
            ..config()
        };
        let registry = PromptComponentRegistry::load(store, config).await.unwrap();
        assert!(registry.components().await.is_empty());
        assert!(registry.select(&ContextState::new("t")).await.is_empty());
    }

    #[tokio::test]
    async fn select_picks_one_per_category_and_records_use() {
        let store = Arc::new(InMemoryStore::new());
        let registry = PromptComponentRegistry::load(store.clone(), config()).await.unwrap();
        let selected = registry.select(&ContextState::new("t1")).await;
        assert_eq!(selected.len(), 5);

        for s in &selected {
            assert_eq!(s.component.usage_count, 1);
            assert_eq!(s.component.status(), ComponentStatus::Active);
            assert!(s.component.last_used_at.is_some());
        }

        let persisted = store.load_components().await.unwrap();
        let used: u64 = persisted.iter().map(|c| c.usage_count).sum();
        assert_eq!(used, 5);
    }

    #[tokio::test]
    async fn selection_renders_placeholders() {
        let (registry, _) = registry_with(vec![PromptComponent::new(
            "persona.peer",
            "persona",
            "A {conversation_type} chat, {user_expertise} expertise.",
        )])
        .await;
        let mut ctx = ContextState::new("t1");
        ctx.conversation_type = ConversationType::Technical;
        ctx.user_expertise = ExpertiseLevel::High;
        let selected = registry.select(&ctx).await;
        assert_eq!(selected[0].text, "A technical chat, high expertise.");
    }

    #[tokio::test]
    async fn higher_weight_is_selected_more_often() {
        let mut good = PromptComponent::new("tone.good", "tone", "Good.");
        good.weight = 1.0;
        let mut bad = PromptComponent::new("tone.bad", "tone", "Bad.");
        bad.weight = -1.0;
        let (registry, _) = registry_with(vec![good, bad]).await;

        let ctx = ContextState::new("t");
        let mut good_wins = 0;
        for _ in 0..200 {
            if registry.select(&ctx).await[0].component.id == "tone.good" {
                good_wins += 1;
            }
        }
        assert!(good_wins > 150, "good won {good_wins}/200");
    }

    #[tokio::test]
    async fn seeded_selection_is_reproducible() {
        let (a, _) = registry_with(default_components()).await;
        let (b, _) = registry_with(default_components()).await;
        let ctx = ContextState::new("t");
        for _ in 0..10 {
            let ids_a: Vec<_> = a.select(&ctx).await.into_iter().map(|s| s.component.id).collect();
            let ids_b: Vec<_> = b.select(&ctx).await.into_iter().map(|s| s.component.id).collect();
            assert_eq!(ids_a, ids_b);
        }
    }

    async fn wins_of(registry: &PromptComponentRegistry, ctx: &ContextState, id: &str, rounds: usize) -> usize {
        let mut wins = 0;
        for _ in 0..rounds {
            if registry.select(ctx).await[0].component.id == id {
                wins += 1;
            }
        }
        wins
    }

    #[tokio::test]
    async fn equal_weights_favour_the_less_used_component() {
        let mut busy = PromptComponent::new("tone.busy", "tone", "Busy.");
        busy.usage_count = 1_000;
        let fresh = PromptComponent::new("tone.fresh", "tone", "Fresh.");
        let (registry, _) = registry_with(vec![busy, fresh]).await;

        let wins = wins_of(&registry, &ContextState::new("t"), "tone.fresh", 300).await;
        assert!(wins > 170, "fresh won {wins}/300");
    }

    #[test]
    fn tie_bonus_only_applies_within_a_weight_group() {
        let mut a = PromptComponent::new("a", "tone", "x");
        a.usage_count = 4;
        let b = PromptComponent::new("b", "tone", "y");
        let mut c = PromptComponent::new("c", "tone", "z");
        c.weight = 0.5;
        let mut d = PromptComponent::new("d", "tone", "w");
        d.weight = 0.5;
        let components = [a, b, c, d];
        assert_eq!(tie_bonuses(components.iter()), vec![1.0, TIE_BONUS, 1.0, 1.0]);
    }

    #[tokio::test]
    async fn higher_success_rate_is_selected_more_often() {
        let mut proven = PromptComponent::new("tone.proven", "tone", "Proven.");
        proven.success_rate = 0.9;
        let mut shaky = PromptComponent::new("tone.shaky", "tone", "Shaky.");
        shaky.success_rate = 0.3;
        shaky.weight = 0.001;
        let (registry, _) = registry_with(vec![proven, shaky]).await;

        let wins = wins_of(&registry, &ContextState::new("t"), "tone.proven", 300).await;
        assert!(wins > 240, "proven won {wins}/300");
    }

    #[test]
    fn strategy_follows_context() {
        let mut ctx = ContextState::new("t");
        assert_eq!(PromptStrategy::for_context(&ctx), PromptStrategy::Balanced);
        ctx.evolution_count = 11;
        assert_eq!(PromptStrategy::for_context(&ctx), PromptStrategy::ContextAware);
        ctx.user_expertise = ExpertiseLevel::High;
        assert_eq!(PromptStrategy::for_context(&ctx), PromptStrategy::ConciseExpert);
        ctx.task_complexity = TaskComplexity::Complex;
        assert_eq!(PromptStrategy::for_context(&ctx), PromptStrategy::DetailedGuidance);
        ctx.recent_errors = 3;
        assert_eq!(PromptStrategy::for_context(&ctx), PromptStrategy::ErrorRecovery);
    }

    #[test]
    fn strategy_boosts_matching_text() {
        let stepwise = default_components()
            .into_iter()
            .find(|c| c.id == "reasoning_style.stepwise")
            .unwrap();
        let direct = default_components()
            .into_iter()
            .find(|c| c.id == "reasoning_style.direct")
            .unwrap();
        let detailed = PromptStrategy::DetailedGuidance;
        assert_eq!(detailed.bonus_for(&stepwise), 1.4);
        assert_eq!(detailed.bonus_for(&direct), 1.0);
        assert_eq!(PromptStrategy::ConciseExpert.bonus_for(&direct), 1.5);
        assert_eq!(PromptStrategy::Balanced.bonus_for(&stepwise), 1.0);

        let p = priority(&stepwise, 0.5, detailed) / priority(&stepwise, 0.5, PromptStrategy::Balanced);
        assert!((p - 1.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn expert_context_prefers_concise_components() {
        let brief = PromptComponent::new("tone.brief", "tone", "Be brief.");
        let mut chatty = PromptComponent::new("tone.chatty", "tone", "Be chatty.");
        chatty.weight = 0.01;
        let (registry, _) = registry_with(vec![brief, chatty]).await;

        let mut ctx = ContextState::new("t");
        ctx.user_expertise = ExpertiseLevel::High;
        let wins = wins_of(&registry, &ctx, "tone.brief", 1_000).await;
        assert!(wins > 540, "brief won {wins}/1000");
    }

    #[test]
    fn ties_go_to_less_used_then_lower_id() {
        let mut busy = PromptComponent::new("a", "tone", "x");
        busy.usage_count = 5;
        let fresh = PromptComponent::new("b", "tone", "y");
        let also_fresh = PromptComponent::new("c", "tone", "z");
        let winner = pick_winner(vec![
            (-1.0, busy, "a"),
            (-1.0, also_fresh, "c"),
            (-1.0, fresh, "b"),
        ]);
        assert_eq!(winner, Some("b"));
    }

    #[test]
    fn rating_is_blended_into_signal() {
        assert!((learning_signal(0.5, Some(5)) - 0.75).abs() < 1e-6);
        assert!((learning_signal(0.8, Some(1)) - 0.4).abs() < 1e-6);
        assert!((learning_signal(1.7, None) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn good_quality_raises_weight_monotonically_to_one() {
        let (registry, store) = registry_with(vec![PromptComponent::new("tone.warm", "tone", "Warm.")]).await;
        let ids = vec!["tone.warm".to_string()];

        let mut last = 0.0;
        for _ in 0..40 {
            registry.update_weights(&ids, 0.9, None).await.unwrap();
            let weight = registry.get("tone.warm").await.unwrap().weight;
            assert!(weight > last || weight == 1.0);
            assert!(weight <= 1.0);
            last = weight;
        }
        assert_eq!(last, 1.0);

        let persisted = store.load_components().await.unwrap();
        assert_eq!(persisted[0].weight, 1.0);
        assert!(persisted[0].success_rate > 0.5);
    }

    #[tokio::test]
    async fn poor_quality_lowers_weight_and_success_rate() {
        let (registry, _) = registry_with(vec![PromptComponent::new("tone.warm", "tone", "Warm.")]).await;
        let update = registry
            .update_weights(&["tone.warm".to_string()], 0.1, None)
            .await
            .unwrap();
        assert_eq!(update.updated, vec!["tone.warm"]);

        let c = registry.get("tone.warm").await.unwrap();
        assert!((c.weight - -0.04).abs() < 1e-6);
        assert!((c.success_rate - 0.45).abs() < 1e-6);
    }

    #[tokio::test]
    async fn unknown_ids_are_reported() {
        let (registry, _) = registry_with(default_components()).await;
        let update = registry
            .update_weights(&["tone.warm".to_string(), "nope".to_string()], 0.9, None)
            .await
            .unwrap();
        assert_eq!(update.updated, vec!["tone.warm"]);
        assert_eq!(update.unknown, vec!["nope"]);
    }

    #[tokio::test]
    async fn concurrent_updates_are_not_lost() {
        let (registry, _) = registry_with(vec![PromptComponent::new("tone.warm", "tone", "Warm.")]).await;
        let registry = Arc::new(registry);

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry
                        .update_weights(&["tone.warm".to_string()], 0.9, None)
                        .await
                        .unwrap();
                })
            })
            .collect();
        for t in tasks {
            t.await.unwrap();
        }

        let weight = registry.get("tone.warm").await.unwrap().weight;
        assert!((weight - 0.4).abs() < 1e-4, "weight {weight}");
    }

    struct ReadOnlyStore(Vec<PromptComponent>);

    #[async_trait]
    impl ComponentStore for ReadOnlyStore {
        async fn load_components(&self) -> Result<Vec<PromptComponent>> {
            Ok(self.0.clone())
        }

        async fn upsert_component(&self, _component: &PromptComponent) -> Result<()> {
            Err(StorageError::Io("read-only".into()).into())
        }
    }

    #[tokio::test]
    async fn persistence_failure_surfaces_after_applying() {
        let store = Arc::new(ReadOnlyStore(vec![PromptComponent::new("tone.warm", "tone", "Warm.")]));
        let registry = PromptComponentRegistry::load(store, config()).await.unwrap();

        let result = registry.update_weights(&["tone.warm".to_string()], 0.9, None).await;
        assert!(matches!(result, Err(Error::Storage(_))));
        assert!(registry.get("tone.warm").await.unwrap().weight > 0.0);

        // Selection still works; the failure is only logged.
        assert_eq!(registry.select(&ContextState::new("t")).await.len(), 1);
    }
}
