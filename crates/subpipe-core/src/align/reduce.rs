use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::io::catalog::{write_coordinates, Catalog, CatalogColumns};

/// Image points lying within `radius` pixels of at least one template point.
pub fn coincident_points(
    image: &[(f64, f64)],
    template: &[(f64, f64)],
    radius: f64,
) -> Vec<(f64, f64)> {
    let r2 = radius * radius;
    image
        .iter()
        .copied()
        .filter(|&(x, y)| {
            template
                .iter()
                .any(|&(tx, ty)| (x - tx).powi(2) + (y - ty).powi(2) <= r2)
        })
        .collect()
}

/// Filter the image catalog down to points coincident with the template
/// catalog and write them as an `x y` list to `output`.
///
/// Returns the number of points kept. The file is written even when the
/// count is too small to be worth matching, so it can be inspected.
pub fn write_reduced_list(
    image_catalog: &Path,
    template_catalog: &Path,
    columns: &CatalogColumns,
    radius: f64,
    output: &Path,
) -> Result<usize> {
    let image = Catalog::read(image_catalog, columns)?.points();
    let template = Catalog::read(template_catalog, columns)?.points();
    let kept = coincident_points(&image, &template, radius);
    debug!(
        before = image.len(),
        after = kept.len(),
        radius,
        "Reduced image coordinate list"
    );
    write_coordinates(output, &kept)?;
    Ok(kept.len())
}
