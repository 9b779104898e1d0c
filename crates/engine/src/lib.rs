//! The run engine — the heart of Switchyard.
//!
//! A user turn becomes a run in two phases:
//!
//! 1. **Post**: [`SessionService`] stores the message, compiles a
//!    [`ContextPack`](switchyard_core::ContextPack) and builds the CPIR for a
//!    `PENDING` run
//! 2. **Execute**: [`RunExecutor`] plans a step DAG for the run's mode
//!    (`auto`, `compare` or `chain`), runs it in dependency waves, and
//!    persists the final answer
//!
//! Routing is a transparent heuristic: every candidate model gets a score and
//! a list of reasons, and the decision is stored on the run.

pub mod context;
pub mod executor;
pub mod normalize;
pub mod plan;
pub mod router;
pub mod session;
pub mod token;

pub use context::ContextCompiler;
pub use executor::RunExecutor;
pub use normalize::{Disagreement, NormalizedOutput, detect_disagreements, normalize_output};
pub use plan::{BuiltRun, ModelRef, Planner, StepPlanNode, validate_plan};
pub use router::{build_cpir, decide_route};
pub use session::{NewMemory, PostMessage, PostedMessage, SessionService};
