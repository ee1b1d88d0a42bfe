use std::ffi::{c_char, c_int, CStr};
use std::path::Path;

use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::images::{ImageDescription, ImageType};
use fitsio::FitsFile;
use ndarray::Array2;

use crate::error::{Result, SubpipeError};

/// Keys cfitsio writes itself from the image description.
const STRUCTURAL_KEYS: &[&str] = &[
    "SIMPLE", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "NAXIS3", "EXTEND", "BZERO", "BSCALE",
    "END",
];

/// cfitsio card buffer length (80 columns plus NUL).
const CARD_BUFFER: usize = 81;

/// Primary HDU header: the raw 80-column cards, in file order.
#[derive(Clone, Debug, Default)]
pub struct FitsHeader {
    cards: Vec<String>,
}

impl FitsHeader {
    pub fn cards(&self) -> &[String] {
        &self.cards
    }

    /// Raw value text of `key` (case-insensitive), with quotes and comments removed.
    pub fn get(&self, key: &str) -> Option<String> {
        let wanted = key.trim().to_ascii_uppercase();
        self.cards
            .iter()
            .find(|c| card_key(c) == wanted)
            .and_then(|c| card_value(c))
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        // cfitsio may use a Fortran `D` exponent for doubles.
        self.get(key)
            .and_then(|v| v.trim().replace(['D', 'd'], "E").parse().ok())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    /// Insert or replace a string-valued card.
    pub fn set_str(&mut self, key: &str, value: &str) {
        let card = format!(
            "{:<8}= '{:<8}'",
            key.to_ascii_uppercase(),
            value.replace('\'', "''")
        );
        self.set_card(key, card);
    }

    /// Insert or replace a numeric card.
    pub fn set_f64(&mut self, key: &str, value: f64) {
        let card = format!("{:<8}= {:>20}", key.to_ascii_uppercase(), value);
        self.set_card(key, card);
    }

    fn set_card(&mut self, key: &str, card: String) {
        let wanted = key.to_ascii_uppercase();
        match self.cards.iter_mut().find(|c| card_key(c) == wanted) {
            Some(existing) => *existing = card,
            None => self.cards.push(card),
        }
    }

    /// Copy every valued, non-structural card into `hdu`.
    fn write_to(&self, hdu: &FitsHdu, fptr: &mut FitsFile) -> Result<()> {
        for card in &self.cards {
            let key = card_key(card);
            if key.is_empty() || STRUCTURAL_KEYS.contains(&key.as_str()) {
                continue;
            }
            let Some(value) = card_value(card) else {
                continue;
            };
            if is_quoted(card) {
                hdu.write_key(fptr, &key, value)?;
            } else if let Ok(int) = value.parse::<i64>() {
                hdu.write_key(fptr, &key, int)?;
            } else if let Ok(float) = value.replace(['D', 'd'], "E").parse::<f64>() {
                hdu.write_key(fptr, &key, float)?;
            } else {
                hdu.write_key(fptr, &key, value)?;
            }
        }
        Ok(())
    }
}

/// A 2-D primary image. Row 0 is the first row stored in the file (FITS y = 1).
#[derive(Clone, Debug)]
pub struct FitsImage {
    pub header: FitsHeader,
    pub data: Array2<f32>,
}

impl FitsImage {
    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }
}

/// Read only the primary header of a FITS file.
pub fn read_header(path: &Path) -> Result<FitsHeader> {
    let mut fptr = open(path)?;
    fptr.primary_hdu()?;
    read_cards(&mut fptr)
}

/// Decode the primary image of a FITS file as f32 (BZERO/BSCALE applied).
pub fn read_fits(path: &Path) -> Result<FitsImage> {
    let mut fptr = open(path)?;
    let hdu = fptr.primary_hdu()?;

    // fitsio reports the shape slowest axis first: [height, width].
    let (height, width) = match &hdu.info {
        HduInfo::ImageInfo { shape, .. } if shape.len() == 2 => (shape[0], shape[1]),
        HduInfo::ImageInfo { shape, .. } => {
            return Err(SubpipeError::InvalidFits(format!(
                "{}: primary HDU has NAXIS={}, expected an image",
                path.display(),
                shape.len()
            )))
        }
        _ => {
            return Err(SubpipeError::InvalidFits(format!(
                "{}: primary HDU is not an image",
                path.display()
            )))
        }
    };
    if width == 0 || height == 0 {
        return Err(SubpipeError::InvalidFits(format!(
            "{}: invalid image dimensions {width}x{height}",
            path.display()
        )));
    }

    let pixels: Vec<f32> = hdu.read_image(&mut fptr)?;
    let data = Array2::from_shape_vec((height, width), pixels)
        .map_err(|e| SubpipeError::InvalidFits(format!("{}: {e}", path.display())))?;
    let header = read_cards(&mut fptr)?;
    Ok(FitsImage { header, data })
}

/// Write a 2-D float image (BITPIX -32), replacing any existing file.
/// Valued non-structural cards of `header` are carried over.
pub fn write_fits(path: &Path, data: &Array2<f32>, header: Option<&FitsHeader>) -> Result<()> {
    let (height, width) = data.dim();
    let description = ImageDescription {
        data_type: ImageType::Float,
        dimensions: &[height, width],
    };
    let mut fptr = FitsFile::create(path)
        .with_custom_primary(&description)
        .overwrite()
        .open()?;
    let hdu = fptr.primary_hdu()?;

    let pixels: Vec<f32> = data.iter().copied().collect();
    hdu.write_image(&mut fptr, &pixels)?;
    if let Some(h) = header {
        h.write_to(&hdu, &mut fptr)?;
    }
    Ok(())
}

fn open(path: &Path) -> Result<FitsFile> {
    FitsFile::open(path).map_err(|e| {
        SubpipeError::InvalidFits(format!("cannot open {}: {e}", path.display()))
    })
}

/// Every card of the current HDU, in file order.
fn read_cards(fptr: &mut FitsFile) -> Result<FitsHeader> {
    let mut status: c_int = 0;
    let mut existing: c_int = 0;
    let mut more: c_int = 0;
    let mut cards = Vec::new();
    // SAFETY: `fptr` is an open file positioned on the requested HDU and the
    // card buffer is the size cfitsio requires.
    unsafe {
        let raw = fptr.as_raw();
        fitsio::sys::ffghsp(raw, &mut existing, &mut more, &mut status);
        for index in 1..=existing {
            let mut buffer = [0 as c_char; CARD_BUFFER];
            fitsio::sys::ffgrec(raw, index, buffer.as_mut_ptr(), &mut status);
            if status != 0 {
                break;
            }
            let card = CStr::from_ptr(buffer.as_ptr()).to_string_lossy();
            cards.push(card.trim_end().to_string());
        }
    }
    if status != 0 {
        return Err(SubpipeError::InvalidFits(format!(
            "header read failed with cfitsio status {status}"
        )));
    }
    Ok(FitsHeader { cards })
}

fn card_key(card: &str) -> String {
    card.get(..8.min(card.len()))
        .unwrap_or("")
        .trim()
        .to_ascii_uppercase()
}

fn is_quoted(card: &str) -> bool {
    card.get(10..)
        .is_some_and(|rest| rest.trim_start().starts_with('\''))
}

fn card_value(card: &str) -> Option<String> {
    if card.get(8..10) != Some("= ") {
        return None;
    }
    let rest = card.get(10..)?.trim_start();
    if let Some(quoted) = rest.strip_prefix('\'') {
        // '' inside a string is an escaped quote.
        let mut value = String::new();
        let mut chars = quoted.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    value.push('\'');
                    chars.next();
                } else {
                    break;
                }
            } else {
                value.push(c);
            }
        }
        Some(value.trim_end().to_string())
    } else {
        let value = rest.split('/').next().unwrap_or("").trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }
}
