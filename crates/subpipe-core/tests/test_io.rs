mod common;

use approx::assert_relative_eq;
use common::{catalog_line, write_image, write_lines};
use ndarray::Array2;
use subpipe_core::clean::trim_border;
use subpipe_core::header::{HeaderConfig, HeaderInfo};
use subpipe_core::io::catalog::{
    count_rows, read_coordinates, sort_by_column, write_coordinates, Catalog, CatalogColumns,
};
use subpipe_core::io::fits::{read_fits, read_header, write_fits, FitsHeader};
use subpipe_core::io::preview::write_preview;
use subpipe_core::seeing::{median_seeing, seeing_ratio};
use subpipe_core::stats::{compute_stats, median};
use tempfile::tempdir;

// ---------------------------------------------------------------------------
// FITS
// ---------------------------------------------------------------------------

#[test]
fn test_fits_write_read_preserves_pixels_and_cards() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frame.fits");
    let data = Array2::from_shape_fn((5, 7), |(r, c)| (r * 10 + c) as f32 - 3.5);
    let mut header = FitsHeader::default();
    header.set_str("OBJECT", "SN 2024ab");
    header.set_str("FILTER", "it's r");
    header.set_f64("EXPTIME", 120.0);
    header.set_f64("NAXIS1", 999.0);

    write_fits(&path, &data, Some(&header)).unwrap();
    let image = read_fits(&path).unwrap();

    assert_eq!(image.width(), 7);
    assert_eq!(image.height(), 5);
    assert_eq!(image.data, data);
    assert_eq!(image.header.get("object").as_deref(), Some("SN 2024ab"));
    assert_eq!(image.header.get("FILTER").as_deref(), Some("it's r"));
    assert_eq!(image.header.get_f64("EXPTIME"), Some(120.0));
    // Structural cards are regenerated from the data, not copied.
    assert_eq!(image.header.get_i64("NAXIS1"), Some(7));
    assert_eq!(std::fs::metadata(&path).unwrap().len() % 2880, 0);
}

#[test]
fn test_rewrite_keeps_one_copy_of_each_card() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frame.fits");
    write_image(&path, 6, 4, &[("GAIN", 1.5), ("RDNOISE", 7.0)], |r, _| r as f32);

    let first = read_fits(&path).unwrap();
    write_fits(&path, &first.data, Some(&first.header)).unwrap();
    let second = read_fits(&path).unwrap();

    let count = |key: &str| {
        second
            .header
            .cards()
            .iter()
            .filter(|c| c.split(['=', ' ']).next() == Some(key))
            .count()
    };
    for key in ["SIMPLE", "BITPIX", "NAXIS1", "GAIN", "RDNOISE"] {
        assert_eq!(count(key), 1, "{key}");
    }
    assert_eq!(second.header.get_i64("BITPIX"), Some(-32));
    assert_eq!(second.header.get_f64("GAIN"), Some(1.5));
    assert_eq!(second.data, first.data);
}

#[test]
fn test_set_card_replaces_existing_value() {
    let mut header = FitsHeader::default();
    header.set_f64("KERNSUM", 1.0);
    header.set_f64("kernsum", 2.5);
    header.set_str("CONVOLVD", "IMAGE");
    header.set_str("CONVOLVD", "TEMPLATE");

    assert_eq!(header.cards().len(), 2);
    assert_eq!(header.get_f64("KERNSUM"), Some(2.5));
    assert_eq!(header.get("CONVOLVD").as_deref(), Some("TEMPLATE"));
}

#[test]
fn test_header_only_read_and_rejects_garbage() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frame.fits");
    write_image(&path, 4, 4, &[("GAIN", 2.2)], |_, _| 1.0);
    assert_eq!(read_header(&path).unwrap().get_f64("GAIN"), Some(2.2));

    let junk = dir.path().join("junk.fits");
    std::fs::write(&junk, vec![b'x'; 2880]).unwrap();
    assert!(read_fits(&junk).is_err());
}

#[test]
fn test_truncated_file_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frame.fits");
    write_image(&path, 64, 64, &[], |_, _| 1.0);
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..2880 + 100]).unwrap();

    assert!(read_fits(&path).is_err());
}

#[test]
fn test_preview_is_written_beside_image() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("diff.sub.fits");
    write_image(&path, 16, 12, &[], |r, c| (r * c) as f32);

    let png = write_preview(&path, 2).unwrap();

    assert_eq!(png, dir.path().join("diff.sub.png"));
    let decoded = image::open(&png).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (8, 6));
}

#[test]
fn test_trim_border_zeroes_edges_only() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frame.fits");
    write_image(&path, 10, 8, &[("GAIN", 1.0)], |_, _| 5.0);

    trim_border(&path, 2).unwrap();

    let image = read_fits(&path).unwrap();
    assert_eq!(image.data[[0, 5]], 0.0);
    assert_eq!(image.data[[7, 5]], 0.0);
    assert_eq!(image.data[[4, 1]], 0.0);
    assert_eq!(image.data[[4, 8]], 0.0);
    assert_eq!(image.data[[2, 2]], 5.0);
    assert_eq!(image.data[[5, 7]], 5.0);
    assert_eq!(image.header.get_f64("GAIN"), Some(1.0));
}

// ---------------------------------------------------------------------------
// Catalogs
// ---------------------------------------------------------------------------

#[test]
fn test_catalog_parse_skips_comments() {
    let text = format!(
        "# NUMBER X Y\n{}\n\n{}\n",
        catalog_line(10.0, 20.0, 0, 1.1, 3.2),
        catalog_line(30.0, 40.0, 4, 2.5, 5.0)
    );
    let catalog = Catalog::parse(&text, &CatalogColumns::default()).unwrap();

    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.rows[1].flag, 4);
    assert_relative_eq!(catalog.rows[0].fwhm, 3.2);
    assert_eq!(catalog.points(), vec![(10.0, 20.0), (30.0, 40.0)]);
}

#[test]
fn test_catalog_rejects_short_rows() {
    let err = Catalog::parse("1.0 2.0 3.0\n", &CatalogColumns::default()).unwrap_err();
    assert!(err.to_string().contains("columns"));
}

#[test]
fn test_coordinate_files() {
    let dir = tempdir().unwrap();
    let coords = dir.path().join("list.coo");
    write_coordinates(&coords, &[(1.5, 2.5), (100.0, 200.25)]).unwrap();
    assert_eq!(
        read_coordinates(&coords).unwrap(),
        vec![(1.5, 2.5), (100.0, 200.25)]
    );
    assert_eq!(count_rows(&coords).unwrap(), 2);
    assert_eq!(count_rows(&dir.path().join("missing.coo")).unwrap(), 0);
}

#[test]
fn test_sort_by_column() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cat.txt");
    write_lines(
        &path,
        &[
            catalog_line(1.0, 1.0, 0, 1.0, 4.0),
            catalog_line(2.0, 2.0, 0, 1.0, 2.0),
            catalog_line(3.0, 3.0, 0, 1.0, 3.0),
        ],
    );

    sort_by_column(&path, 9).unwrap();

    let catalog = Catalog::read(&path, &CatalogColumns::default()).unwrap();
    let widths: Vec<f64> = catalog.rows.iter().map(|r| r.fwhm).collect();
    assert_eq!(widths, vec![2.0, 3.0, 4.0]);
}

// ---------------------------------------------------------------------------
// Seeing
// ---------------------------------------------------------------------------

#[test]
fn test_median_seeing_ignores_flagged_and_elongated() {
    let text = [
        catalog_line(10.0, 10.0, 0, 1.1, 3.0),
        catalog_line(20.0, 20.0, 0, 1.2, 4.0),
        catalog_line(30.0, 30.0, 0, 1.3, 5.0),
        catalog_line(40.0, 40.0, 2, 1.0, 50.0),
        catalog_line(50.0, 50.0, 0, 3.0, 60.0),
    ]
    .join("\n");
    let catalog = Catalog::parse(&text, &CatalogColumns::default()).unwrap();
    assert_relative_eq!(median_seeing(&catalog).unwrap(), 4.0);
    assert!(median_seeing(&Catalog::default()).is_none());
}

#[test]
fn test_seeing_ratio_pairs_by_position() {
    let columns = CatalogColumns::default();
    let image = Catalog::parse(
        &[
            catalog_line(10.0, 10.0, 0, 1.0, 3.0),
            catalog_line(50.0, 50.0, 0, 1.0, 6.0),
            catalog_line(90.0, 90.0, 0, 1.0, 9.0),
        ]
        .join("\n"),
        &columns,
    )
    .unwrap();
    let template = Catalog::parse(
        &[
            catalog_line(10.5, 10.5, 0, 1.0, 2.0),
            catalog_line(50.0, 51.0, 0, 1.0, 4.0),
            catalog_line(300.0, 300.0, 0, 1.0, 1.0),
        ]
        .join("\n"),
        &columns,
    )
    .unwrap();

    assert_relative_eq!(seeing_ratio(&image, &template).unwrap(), 1.5);

    let far = Catalog::parse(&catalog_line(500.0, 500.0, 0, 1.0, 2.0), &columns).unwrap();
    assert!(seeing_ratio(&image, &far).is_none());
}

// ---------------------------------------------------------------------------
// Statistics and headers
// ---------------------------------------------------------------------------

#[test]
fn test_stats_clip_outliers_and_zeros() {
    let mut data = Array2::<f32>::from_elem((20, 20), 10.0);
    data[[0, 0]] = 10_000.0;
    for c in 0..20 {
        data[[19, c]] = 0.0;
    }

    let with_zeros = compute_stats(&data, false);
    let without = compute_stats(&data, true);

    assert_relative_eq!(without.mean, 10.0, epsilon = 1e-9);
    assert_relative_eq!(without.stddev, 0.0, epsilon = 1e-9);
    assert!(without.total_stddev > 100.0);
    assert_eq!(without.max, 10_000.0);
    assert_eq!(with_zeros.min, 0.0);
    assert_eq!(without.min, 10.0);
    assert_eq!((without.width, without.height), (20, 20));
}

#[test]
fn test_median() {
    assert_eq!(median(&[]), None);
    assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
    assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
}

#[test]
fn test_header_info_fallbacks() {
    let mut header = FitsHeader::default();
    header.set_str("FILTER", "clear");
    header.set_str("FILTER2", "SDSS-R");
    header.set_str("MJD", "not a date");
    header.set_f64("JD-OBS", 2460000.5);
    header.set_f64("WCS_ERR", 1.0);

    let info = HeaderInfo::from_header(&header, &HeaderConfig::default());

    assert_eq!(info.filter.as_deref(), Some("r"));
    assert_eq!(info.obs_date, Some(2460000.5));
    assert_eq!(info.object, "myobject");
    assert_eq!(info.gain, 2.0);
    assert_eq!(info.read_noise, 5.0);
    assert_eq!(info.exposure, None);
    assert!(info.wcs_error);
}
