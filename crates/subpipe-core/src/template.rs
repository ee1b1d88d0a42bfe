//! Batch-scoped memo of the template's one-time preparation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::clean::{clean_image, CleaningPass, TemplateCleaning};
use crate::detection::{find_objects, ObjectSearch};
use crate::error::Result;
use crate::header::HeaderInfo;
use crate::io::fits::read_header;
use crate::pipeline::config::PipelineConfig;
use crate::record::ImageRecord;
use crate::tools::Toolset;

/// Everything derived from the template once per batch.
#[derive(Clone, Debug)]
pub struct TemplateRecord {
    pub record: ImageRecord,
    /// Object search at the template's own thresholds; its catalog is the
    /// reference list for coordinate matching.
    pub search: ObjectSearch,
    pub cleaning: TemplateCleaning,
}

impl TemplateRecord {
    pub fn path(&self) -> &Path {
        &self.record.path
    }

    pub fn catalog(&self) -> &Path {
        &self.search.catalog
    }
}

/// Prepares each template at most once and hands out shared records.
///
/// Owned by the batch driver, never global. After the first call for a
/// path, later calls return the same record whatever arguments they pass.
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: HashMap<PathBuf, Arc<TemplateRecord>>,
    preparations: usize,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached record for `template`, preparing it on first use.
    ///
    /// Preparation cleans the template in place under `policy`, measures its
    /// statistics and FWHM, and runs the template threshold search.
    pub fn get_or_prepare(
        &mut self,
        template: &Path,
        policy: TemplateCleaning,
        tools: &Toolset,
        config: &PipelineConfig,
        scratch: &Path,
    ) -> Result<Arc<TemplateRecord>> {
        if let Some(hit) = self.entries.get(template) {
            debug!(template = %template.display(), "Template record cached");
            return Ok(Arc::clone(hit));
        }

        info!(template = %template.display(), %policy, "Preparing template");
        let header = HeaderInfo::from_header(&read_header(template)?, &config.headers);
        if let Some(pass) =
            CleaningPass::for_template(&config.cleaning, policy, header.gain, header.read_noise)
        {
            clean_image(tools.cleaner.as_ref(), template, &pass, scratch)?;
        }

        let record = ImageRecord::measure(
            template,
            tools.detector.as_ref(),
            &config.detection,
            &config.headers,
            false,
        )?;
        let search = find_objects(
            tools.detector.as_ref(),
            template,
            &config.detection.template,
            scratch,
        )?;

        let prepared = Arc::new(TemplateRecord {
            record,
            search,
            cleaning: policy,
        });
        self.preparations += 1;
        self.entries
            .insert(template.to_path_buf(), Arc::clone(&prepared));
        Ok(prepared)
    }

    /// How many times a template has actually been prepared.
    pub fn preparations(&self) -> usize {
        self.preparations
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every prepared template, e.g. between independent batches.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.preparations = 0;
    }
}
