pub mod config;
mod coordinator;
pub mod outcome;
pub mod reduce;

pub use config::{AlignmentConfig, AlignmentPlan};
pub use coordinator::{AlignRequest, Aligner};
pub use outcome::{AlignmentOutcome, AlignmentStrategy, FailureReason, StrategyAttempt};
