//! # Mnemo Engine
//!
//! Decides, for every exchange, what to remember about the user, how to
//! split a fixed token budget across prompt regions, which memories fit,
//! and which prompt fragments to use. Quality signals from each response
//! feed back into the fragment weights.
//!
//! Per turn:
//!
//! ```text
//! tracker.update -> allocator.allocate -> compressor.compress + registry.select
//!   -> provider.complete
//!   -> (background) extractor.extract -> store.save, assessor.score -> registry.update_weights
//! ```

pub mod token;
pub mod allocator;
pub mod compressor;
pub mod extractor;
pub mod quality;
pub mod registry;
pub mod tracker;
pub mod prompt;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use allocator::TokenBudgetAllocator;
pub use compressor::{CompressionStats, ContextCompressor};
pub use extractor::{FactExtractor, LlmExtractor, PatternExtractor};
pub use quality::{QualityAssessor, QualityReport, QualitySignal, SignalOutcome};
pub use registry::{PromptComponentRegistry, SelectedComponent, WeightUpdate};
pub use tracker::ConversationContextTracker;
pub use orchestrator::{DeletedThread, Engine, EngineStores, TurnOutcome};
