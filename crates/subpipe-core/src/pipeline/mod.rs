pub mod config;
pub mod ledger;
mod orchestrator;
pub mod run;
mod scratch;
mod types;

pub use ledger::{BatchLedger, LedgerEntry};
pub use orchestrator::{
    prepare_workdir, run_batch, run_batch_reported, BatchRequest, WorkdirMode,
};
pub use run::{CompletedRun, PipelineRun, RunStatus};
pub use scratch::ScratchArena;
pub use types::{NoOpReporter, PipelineStage, ProgressReporter};
