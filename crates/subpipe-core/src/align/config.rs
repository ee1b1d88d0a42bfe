use serde::{Deserialize, Serialize};

/// Batch-wide alignment settings, as loaded. Never mutated during a run;
/// each image gets its own [`AlignmentPlan`] derived from it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlignmentConfig {
    /// Allow the catalog-matching strategies.
    #[serde(default = "default_true")]
    pub coordinate_matching: bool,
    /// Allow resampling onto the template's world-coordinate frame as the
    /// last resort.
    #[serde(default)]
    pub frame_resampling: bool,
    /// Frames are already on the template grid; skip alignment entirely.
    #[serde(default)]
    pub prealigned: bool,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_nmatch")]
    pub nmatch: usize,
    #[serde(default = "default_separation")]
    pub separation: f64,
    /// Matched pairs needed before a transform is attempted.
    #[serde(default = "default_min_matches")]
    pub min_matches: usize,
    /// Pixel radius for the coincidence filter. Zero disables that step.
    #[serde(default = "default_search_radius")]
    pub search_radius: f64,
    /// Tolerance used by the point-set matching step.
    #[serde(default = "default_tolerance_mode_tolerance")]
    pub tolerance_mode_tolerance: f64,
}

fn default_true() -> bool {
    true
}
fn default_tolerance() -> f64 {
    3.0
}
fn default_nmatch() -> usize {
    60
}
fn default_separation() -> f64 {
    5.0
}
fn default_min_matches() -> usize {
    5
}
fn default_search_radius() -> f64 {
    25.0
}
fn default_tolerance_mode_tolerance() -> f64 {
    5.0
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            coordinate_matching: true,
            frame_resampling: false,
            prealigned: false,
            tolerance: default_tolerance(),
            nmatch: default_nmatch(),
            separation: default_separation(),
            min_matches: default_min_matches(),
            search_radius: default_search_radius(),
            tolerance_mode_tolerance: default_tolerance_mode_tolerance(),
        }
    }
}

/// Strategies enabled for one image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlignmentPlan {
    pub prealigned: bool,
    pub coordinate_matching: bool,
    pub search_radius: f64,
    pub frame_resampling: bool,
    /// `(image, template)` object counts when matching was dropped for them.
    pub too_few_objects: Option<(usize, usize)>,
}

impl AlignmentConfig {
    /// Derive the plan for one image from its and the template's object
    /// counts and whether its WCS is flagged as unreliable.
    ///
    /// Catalog matching is dropped when either catalog is too small to ever
    /// reach `min_matches`; frame resampling is dropped for a bad WCS.
    pub fn plan(
        &self,
        image_objects: usize,
        template_objects: usize,
        wcs_error: bool,
    ) -> AlignmentPlan {
        let enough_objects =
            image_objects >= self.min_matches && template_objects >= self.min_matches;
        AlignmentPlan {
            prealigned: self.prealigned,
            coordinate_matching: self.coordinate_matching && enough_objects,
            search_radius: self.search_radius,
            frame_resampling: self.frame_resampling && !wcs_error,
            too_few_objects: (self.coordinate_matching && !enough_objects)
                .then_some((image_objects, template_objects)),
        }
    }
}
