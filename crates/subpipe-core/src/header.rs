use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::io::fits::FitsHeader;

/// Which header keys carry observation metadata, and the fallbacks used
/// when a key is absent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeaderConfig {
    #[serde(default = "default_exposure_key")]
    pub exposure_key: String,
    #[serde(default = "default_object_key")]
    pub object_key: String,
    #[serde(default = "default_object_name")]
    pub object_default: String,
    #[serde(default = "default_gain_key")]
    pub gain_key: String,
    #[serde(default = "default_gain")]
    pub gain_default: f64,
    #[serde(default = "default_read_noise_key")]
    pub read_noise_key: String,
    #[serde(default = "default_read_noise")]
    pub read_noise_default: f64,
    /// Tried in order; the first value that parses as a float wins.
    #[serde(default = "default_date_keys")]
    pub date_keys: Vec<String>,
    /// Tried in order; empty and `clear` values are skipped.
    #[serde(default = "default_filter_keys")]
    pub filter_keys: Vec<String>,
}

fn default_exposure_key() -> String {
    "EXPTIME".into()
}
fn default_object_key() -> String {
    "OBJECT".into()
}
fn default_object_name() -> String {
    "myobject".into()
}
fn default_gain_key() -> String {
    "GAIN".into()
}
fn default_gain() -> f64 {
    2.0
}
fn default_read_noise_key() -> String {
    "READNOIS".into()
}
fn default_read_noise() -> f64 {
    5.0
}
fn default_date_keys() -> Vec<String> {
    ["JD", "MJD", "JD-OBS", "MJD-OBS", "OBSJD", "OBSMJD"]
        .map(String::from)
        .to_vec()
}
fn default_filter_keys() -> Vec<String> {
    ["FILTER", "FILTERS", "FILTER1", "FILTER2", "WFFBAND"]
        .map(String::from)
        .to_vec()
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            exposure_key: default_exposure_key(),
            object_key: default_object_key(),
            object_default: default_object_name(),
            gain_key: default_gain_key(),
            gain_default: default_gain(),
            read_noise_key: default_read_noise_key(),
            read_noise_default: default_read_noise(),
            date_keys: default_date_keys(),
            filter_keys: default_filter_keys(),
        }
    }
}

/// Observation parameters read from a FITS header.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeaderInfo {
    pub object: String,
    pub filter: Option<String>,
    pub exposure: Option<f64>,
    pub gain: f64,
    pub read_noise: f64,
    pub obs_date: Option<f64>,
    /// Non-zero `WCS_ERR` means the WCS cannot be trusted for resampling.
    pub wcs_error: bool,
}

impl HeaderInfo {
    pub fn from_header(header: &FitsHeader, config: &HeaderConfig) -> Self {
        let filter = find_filter(header, &config.filter_keys);
        if filter.is_none() {
            warn!("Could not determine the observation filter");
        }

        let exposure = header.get_f64(&config.exposure_key);
        if exposure.is_none() {
            warn!(key = %config.exposure_key, "Exposure header not found");
        }

        let obs_date = find_obs_date(header, &config.date_keys);
        if obs_date.is_none() {
            warn!("No float observation date found in header");
        }

        let wcs_error = header.get_f64("WCS_ERR").is_some_and(|v| v != 0.0);
        if wcs_error {
            debug!("WCS_ERR header is non-zero");
        }

        Self {
            object: header
                .get(&config.object_key)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| config.object_default.clone()),
            filter,
            exposure,
            gain: header.get_f64(&config.gain_key).unwrap_or(config.gain_default),
            read_noise: header
                .get_f64(&config.read_noise_key)
                .unwrap_or(config.read_noise_default),
            obs_date,
            wcs_error,
        }
    }
}

/// First filter value that is neither empty nor `clear`, with SDSS band
/// names shortened to their letter.
pub fn find_filter(header: &FitsHeader, keys: &[String]) -> Option<String> {
    let raw = keys.iter().find_map(|k| {
        header
            .get(k)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("clear"))
    })?;
    let short = match raw.as_str() {
        "SDSS-U" => "u",
        "SDSS-G" => "g",
        "SDSS-R" => "r",
        "SDSS-I" => "i",
        "SDSS-Z" => "z",
        other => other,
    };
    Some(short.to_string())
}

/// First date key whose value parses as a float.
pub fn find_obs_date(header: &FitsHeader, keys: &[String]) -> Option<f64> {
    keys.iter().find_map(|k| header.get_f64(k))
}
