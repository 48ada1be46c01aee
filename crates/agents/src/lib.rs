//! Agent Action Engine - autonomous interventions over organizational state
//!
//! This crate is the decision-making half of tiller:
//! - **Advisory** (`advisory`) - confidence-scored LLM review behind a
//!   degrade-to-silent boundary
//! - **Policy** (`policy`) - the agent contract plus the gated
//!   evaluate/persist/execute cycle
//! - **Concrete agents** (`reassigner`, `nudger`, `scope`) - the three
//!   intervention categories
//! - **Registry & Executor** (`registry`, `executor`) - configuration
//!   dispatch and the per-organization batch pass
//!
//! # Safety Principle
//!
//! The LLM never mutates anything. Deterministic heuristics nominate
//! candidates, the advisory verdict gates them, and every side effect flows
//! through a persisted, auditable `AgentAction` whose state machine lives in
//! `tiller-core`.

pub mod advisory;
pub mod executor;
pub mod nudger;
pub mod policy;
pub mod reassigner;
pub mod registry;
pub mod scope;

pub use advisory::{HttpAdvisor, ScriptedAdvisor};
pub use executor::{AgentExecutor, ConfigCycle, DrainOutcome, OrgRunReport};
pub use nudger::NudgerAgent;
pub use policy::{run_cycle, CycleReport, PolicyAgent};
pub use reassigner::ReassignerAgent;
pub use registry::{build_agent, resolve_kind, AgentInstance, EngineServices};
pub use scope::ScopeAdjusterAgent;
