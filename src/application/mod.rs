//! Orchestration layer: owns no broker wire knowledge (that's
//! [`crate::infrastructure`]) and no domain invariants of its own (those live
//! in [`crate::domain`]) -- it wires the two together into the session
//! lifecycle and the per-cycle trading loop.

pub mod account_state_manager;
pub mod bootstrap;
pub mod candidate_provider;
pub mod risk_management;
pub mod strategies;
pub mod system;
pub mod telemetry;
pub mod trading_cycle;

pub use account_state_manager::AccountStateManager;
pub use bootstrap::Session;
pub use candidate_provider::CandidateProvider;
pub use trading_cycle::TradingCycleEngine;
