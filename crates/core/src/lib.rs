//! # Mnemo Core
//!
//! Domain types, traits, and error definitions for the Mnemo context and
//! memory orchestration engine. This crate has **no framework dependencies**:
//! it defines the model that the storage, provider, and engine crates
//! implement against.
//!
//! Every persistence seam is a trait here (`MemoryStore`, `ComponentStore`,
//! `ContextStore`) and the language model is the opaque `Provider`.

pub mod error;
pub mod message;
pub mod provider;
pub mod memory;
pub mod component;
pub mod context;
pub mod budget;

pub use error::{Error, ExtractionError, ProviderError, Result, StorageError};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use memory::{FactCandidate, FactFilter, Importance, MemoryFact, MemoryStore, THREAD_SCOPED_TAG};
pub use component::{ComponentStatus, ComponentStore, PromptComponent};
pub use context::{
    ContextState, ContextStore, ConversationType, EmotionalTone, ExpertiseLevel, TaskComplexity,
    Urgency, UserPattern,
};
pub use budget::TokenAllocation;
