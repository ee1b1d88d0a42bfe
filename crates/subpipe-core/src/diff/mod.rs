pub mod direction;
mod gate;
pub mod params;
pub mod selector;

pub use direction::DirectionHint;
pub use gate::{
    artifact, Differencer, DifferencingOutcome, DifferencingState, KernelSum, SubtractRequest,
};
pub use params::{DifferencingConfig, KernelProfile};
pub use selector::{profile_for_seeing, select_params, SEEING_PROFILES};
