use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

use super::run::CompletedRun;

/// One ledger line, flattened for reporting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub image: String,
    pub object: String,
    pub filter: Option<String>,
    pub obs_date: Option<f64>,
    pub image_fwhm: Option<f64>,
    pub image_stddev: Option<f64>,
    pub template_fwhm: Option<f64>,
    pub template_stddev: f64,
    pub objects: Option<usize>,
    pub threshold: Option<f64>,
    /// Winning alignment method, or the failure reason.
    pub aligned: String,
    pub seeing_ratio: Option<f64>,
    pub reverse: Option<bool>,
    pub sub_mean: Option<f64>,
    pub sub_stddev: Option<f64>,
    pub sub_total_stddev: Option<f64>,
    pub sub_fwhm: Option<f64>,
    pub kernel_sum: Option<f64>,
    pub attempts: u8,
    pub status: String,
    pub fail_code: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<&CompletedRun> for LedgerEntry {
    fn from(done: &CompletedRun) -> Self {
        let run = &done.run;
        let record = run.record.as_ref();
        let diff = run.differencing.as_ref();
        // Difference statistics only mean something for an accepted run.
        let sub = run.difference_stats.filter(|_| done.status.is_success());
        Self {
            image: run.image.clone(),
            object: record
                .map(|r| r.header.object.clone())
                .unwrap_or_else(|| run.template.record.header.object.clone()),
            filter: record.and_then(|r| r.header.filter.clone()),
            obs_date: record.and_then(|r| r.header.obs_date),
            image_fwhm: record.and_then(|r| r.fwhm),
            image_stddev: record.map(|r| r.stats.stddev),
            template_fwhm: run.template.record.fwhm,
            template_stddev: run.template.record.stats.stddev,
            objects: run.search.as_ref().map(|s| s.object_count),
            threshold: run.search.as_ref().map(|s| s.threshold),
            aligned: run
                .alignment
                .as_ref()
                .map(|a| a.label())
                .unwrap_or_else(|| "n/a".into()),
            seeing_ratio: diff.and_then(|d| d.seeing_ratio),
            reverse: diff.and_then(|d| d.reverse),
            sub_mean: sub.map(|s| s.mean),
            sub_stddev: sub.map(|s| s.stddev),
            sub_total_stddev: sub.map(|s| s.total_stddev),
            sub_fwhm: run.difference_fwhm,
            kernel_sum: diff.filter(|d| d.attempts > 0).map(|d| d.kernel_sum.as_f64()),
            attempts: diff.map_or(0, |d| d.attempts),
            status: done.status.to_string(),
            fail_code: done.fail_code(),
            detail: done.detail.clone(),
        }
    }
}

/// Batch results keyed by image name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchLedger {
    entries: BTreeMap<String, LedgerEntry>,
}

impl BatchLedger {
    /// Load a ledger; a missing file is an empty ledger.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!(path = %path.display(), entries = self.entries.len(), "Ledger saved");
        Ok(())
    }

    /// Insert or replace the entry for its image.
    pub fn record(&mut self, entry: LedgerEntry) {
        self.entries.insert(entry.image.clone(), entry);
    }

    pub fn get(&self, image: &str) -> Option<&LedgerEntry> {
        self.entries.get(image)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.values()
    }

    pub fn failures(&self) -> usize {
        self.entries.values().filter(|e| e.fail_code != 0).count()
    }
}
