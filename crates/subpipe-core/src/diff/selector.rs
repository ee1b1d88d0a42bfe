use tracing::info;

use crate::consts::ADAPTIVE_SEEING_LOWER_BOUND;

use super::params::{DifferencingConfig, KernelProfile};

/// Seeing breakpoints (pixels, ascending) and the profile each selects.
pub const SEEING_PROFILES: [(f64, KernelProfile); 6] = [
    (5.0, profile(13, 19, [0.8, 1.6, 2.6])),
    (6.0, profile(15, 21, [0.9, 1.7, 3.0])),
    (7.0, profile(17, 23, [1.0, 1.7, 3.4])),
    (7.5, profile(19, 25, [1.0, 1.8, 3.5])),
    (8.5, profile(21, 27, [1.0, 2.0, 3.7])),
    (10.0, profile(23, 29, [1.0, 2.5, 4.3])),
];

const fn profile(half_mesh_size: u32, half_stamp_size: u32, sigmas: [f64; 3]) -> KernelProfile {
    KernelProfile {
        half_mesh_size,
        half_stamp_size,
        sigmas,
    }
}

/// Profile for `seeing`, or `None` when the base configuration applies.
///
/// Only seeing strictly above the lower bound adapts; above it the last
/// breakpoint not exceeding the seeing wins. NaN never adapts.
pub fn profile_for_seeing(seeing: f64) -> Option<KernelProfile> {
    if seeing.is_nan() || seeing <= ADAPTIVE_SEEING_LOWER_BOUND {
        return None;
    }
    SEEING_PROFILES
        .iter()
        .rev()
        .find(|(breakpoint, _)| *breakpoint <= seeing)
        .map(|(_, p)| *p)
}

/// Effective engine configuration for an image of the given seeing.
pub fn select_params(seeing: f64, base: &DifferencingConfig) -> DifferencingConfig {
    if !base.adapt {
        return base.clone();
    }
    match profile_for_seeing(seeing) {
        Some(p) => {
            info!(
                seeing,
                half_mesh_size = p.half_mesh_size,
                half_stamp_size = p.half_stamp_size,
                sigma1 = p.sigmas[0],
                sigma2 = p.sigmas[1],
                sigma3 = p.sigmas[2],
                "Differencing parameters adapted to seeing"
            );
            base.with_profile(p)
        }
        None => base.clone(),
    }
}
