//! Sync engine: win evaluation, settlement commits and cycle orchestration

pub mod evaluator;
pub mod settlement;
pub mod sync;

pub use settlement::SettlementCommitter;
pub use sync::SyncOrchestrator;
