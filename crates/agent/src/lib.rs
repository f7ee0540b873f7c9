//! Agent action pipeline - turns model tool calls into side effects
//!
//! This crate sits between the chat model and the outside world:
//! - Parses and validates tool calls (`llm`, `commands`, `tools`)
//! - Gates each call on team policy and risk before anything runs (`runtime`)
//! - Runs low-risk calls immediately, stages the rest (`proposer`)
//! - Resolves staged calls exactly once on confirm or cancel (`gateway`)
//! - Dispatches to messaging, voice, calendar and life-data services (`executor`, `services`)
//!
//! # Flow
//!
//! 1. **Classify** - risk tier from the action type
//! 2. **Policy** - team switches for email, SMS and voice; a denial writes nothing
//! 3. **Propose** - execute now or stage as a pending action with a 30 minute TTL
//! 4. **Confirm** - a single conditional update claims the row, then the executor runs
//! 5. **Record** - one history entry per terminal attempt, pushed to subscribers
//!
//! # Safety Principle
//!
//! The model only ever proposes. Whether something runs, and how often, is
//! decided by storage-level guards, never by the model or the client.

pub mod commands;
pub mod executor;
pub mod gateway;
pub mod llm;
pub mod proposer;
pub mod runtime;
pub mod services;
pub mod sweeper;
pub mod tools;

pub use executor::{ActionExecutor, ExecutionOutcome};
pub use gateway::{ConfirmationGateway, ConfirmationReceipt};
pub use proposer::{ActionProposer, Proposal, ProposalOutcome};
pub use runtime::{AgentRuntime, PipelineStores};
pub use services::{ServiceError, ServiceRegistry};
pub use sweeper::{ExpirySweeper, SweepReport};
