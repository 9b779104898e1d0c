//! # Switchyard Core
//!
//! Domain types, traits, and error definitions for the Switchyard run
//! orchestration engine. This crate does **no I/O** — it defines the domain
//! model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator is defined as a trait here. Implementations live in
//! their respective crates:
//! - [`ModelProvider`] in `switchyard-providers`
//! - [`RunStore`] in `switchyard-store`
//!
//! The engine only ever sees the traits, so tests swap in in-memory stores
//! and deterministic providers.

pub mod catalog;
pub mod cpir;
pub mod error;
pub mod memory;
pub mod message;
pub mod provider;
pub mod routing;
pub mod run;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use catalog::{ModelCatalog, ModelCatalogEntry, ProviderKey};
pub use cpir::{
    Constraints, ContextPack, ContextTurn, Cpir, CpirInputs, Depth, MemoryRef, OutputContract,
    OutputContractType, TaskType,
};
pub use error::{Error, ProviderError, Result, StoreError};
pub use memory::{MemoryItem, MemoryItemType, MemoryPatch, MemoryValue};
pub use message::{Message, Role, Session};
pub use provider::{CallOrigin, ModelCallOptions, ModelCallResult, ModelProvider};
pub use routing::{ModelChoice, RouterCandidate, RouterDecision, RouterPreferences};
pub use run::{
    Artifact, ArtifactKind, Run, RunMode, RunPatch, RunStatus, RunTotals, Step, StepPatch,
    StepStatus, StepType,
};
pub use store::{RunCompletion, RunDetails, RunStore, StoreResult};
