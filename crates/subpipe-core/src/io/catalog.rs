use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SubpipeError};

/// 1-indexed column positions of the fields read from detector catalogs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogColumns {
    pub x: usize,
    pub y: usize,
    pub flag: usize,
    pub elongation: usize,
    pub fwhm: usize,
}

impl Default for CatalogColumns {
    fn default() -> Self {
        Self {
            x: 1,
            y: 2,
            flag: 5,
            elongation: 8,
            fwhm: 9,
        }
    }
}

impl CatalogColumns {
    fn required_width(&self) -> usize {
        [self.x, self.y, self.flag, self.elongation, self.fwhm]
            .into_iter()
            .max()
            .unwrap_or(0)
    }
}

/// One detected source.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogRow {
    pub x: f64,
    pub y: f64,
    pub flag: i64,
    pub elongation: f64,
    pub fwhm: f64,
}

impl CatalogRow {
    /// Unflagged and round enough to trust its width.
    pub fn is_clean_point_source(&self, max_elongation: f64) -> bool {
        self.flag == 0 && self.elongation < max_elongation
    }

    pub fn distance_to(&self, other: &CatalogRow) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Parsed detector catalog, in file order (brightest first by convention).
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    pub rows: Vec<CatalogRow>,
}

impl Catalog {
    pub fn read(path: &Path, columns: &CatalogColumns) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, columns)
            .map_err(|e| SubpipeError::Catalog(format!("{}: {e}", path.display())))
    }

    pub fn parse(text: &str, columns: &CatalogColumns) -> Result<Self> {
        let width = columns.required_width();
        let mut rows = Vec::new();
        for (line_no, line) in data_lines(text).enumerate() {
            let fields: Vec<f64> = line
                .split_whitespace()
                .map(|t| t.parse::<f64>())
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| {
                    SubpipeError::Catalog(format!("row {}: {e}", line_no + 1))
                })?;
            if fields.len() < width {
                return Err(SubpipeError::Catalog(format!(
                    "row {} has {} columns, expected at least {width}",
                    line_no + 1,
                    fields.len()
                )));
            }
            rows.push(CatalogRow {
                x: fields[columns.x - 1],
                y: fields[columns.y - 1],
                flag: fields[columns.flag - 1] as i64,
                elongation: fields[columns.elongation - 1],
                fwhm: fields[columns.fwhm - 1],
            });
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Positions only.
    pub fn points(&self) -> Vec<(f64, f64)> {
        self.rows.iter().map(|r| (r.x, r.y)).collect()
    }
}

/// Number of data rows in a catalog file. A missing file counts as empty.
pub fn count_rows(path: &Path) -> Result<usize> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(data_lines(&text).count()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Write a two-column `x y` coordinate list.
pub fn write_coordinates(path: &Path, points: &[(f64, f64)]) -> Result<()> {
    let mut w = BufWriter::new(fs::File::create(path)?);
    for (x, y) in points {
        writeln!(w, "{x:13.3} {y:13.3}")?;
    }
    w.flush()?;
    Ok(())
}

/// Read the first two columns of a coordinate list or catalog.
pub fn read_coordinates(path: &Path) -> Result<Vec<(f64, f64)>> {
    let text = fs::read_to_string(path)?;
    data_lines(&text)
        .enumerate()
        .map(|(i, line)| {
            let mut it = line.split_whitespace().map(|t| t.parse::<f64>());
            match (it.next(), it.next()) {
                (Some(Ok(x)), Some(Ok(y))) => Ok((x, y)),
                _ => Err(SubpipeError::Catalog(format!(
                    "{}: row {} is not an x y pair",
                    path.display(),
                    i + 1
                ))),
            }
        })
        .collect()
}

/// Sort a catalog file in place, ascending on a 1-indexed numeric column.
/// Comment lines are dropped.
pub fn sort_by_column(path: &Path, column: usize) -> Result<()> {
    let text = fs::read_to_string(path)?;
    let mut keyed: Vec<(f64, &str)> = data_lines(&text)
        .map(|line| {
            let key = line
                .split_whitespace()
                .nth(column.saturating_sub(1))
                .and_then(|t| t.parse::<f64>().ok())
                .unwrap_or(f64::INFINITY);
            (key, line)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut w = BufWriter::new(fs::File::create(path)?);
    for (_, line) in keyed {
        writeln!(w, "{line}")?;
    }
    w.flush()?;
    Ok(())
}

fn data_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
}
