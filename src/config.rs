use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::extraction::classifier::ClassifierThresholds;
use crate::extraction::policy::PolicyKind;
use crate::extraction::types::PageSegmentation;
use crate::extraction::ExtractionError;

/// Application-level constants
pub const APP_NAME: &str = "docsift";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "docsift=info"
}

/// Recognition languages when none are configured.
pub const DEFAULT_LANGUAGES: [&str; 2] = ["rus", "eng"];

/// Runtime configuration for the extraction router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub policy: PolicyKind,
    /// Tesseract language codes, most expected first.
    pub languages: Vec<String>,
    pub segmentation: PageSegmentation,
    /// Overrides the policy's page cap for every method.
    pub page_cap: Option<usize>,
    /// Corrected text shorter than this (trimmed) becomes the sentinel.
    pub min_text_chars: usize,
    pub thresholds: ClassifierThresholds,
    pub tessdata_dir: Option<PathBuf>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            languages: DEFAULT_LANGUAGES.iter().map(|l| l.to_string()).collect(),
            segmentation: PageSegmentation::default(),
            page_cap: None,
            min_text_chars: 1,
            thresholds: ClassifierThresholds::default(),
            tessdata_dir: None,
        }
    }
}

impl ExtractionConfig {
    /// Defaults overlaid with `DOCSIFT_*` environment variables.
    pub fn from_env() -> Result<Self, ExtractionError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    ///
    /// Recognized keys: `DOCSIFT_POLICY`, `DOCSIFT_LANGUAGES` (`rus,eng` or
    /// `rus+eng`), `DOCSIFT_PSM` (`auto` or `block`), `DOCSIFT_PAGE_CAP`,
    /// `DOCSIFT_TESSDATA` (falls back to `TESSDATA_PREFIX`).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ExtractionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(policy) = lookup("DOCSIFT_POLICY") {
            config.policy = policy.parse()?;
        }

        if let Some(raw) = lookup("DOCSIFT_LANGUAGES") {
            let languages: Vec<String> = raw
                .split([',', '+'])
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
            if languages.is_empty() {
                return Err(ExtractionError::Config(
                    "DOCSIFT_LANGUAGES is set but names no language".into(),
                ));
            }
            config.languages = languages;
        }

        if let Some(psm) = lookup("DOCSIFT_PSM") {
            config.segmentation = psm.parse()?;
        }

        if let Some(raw) = lookup("DOCSIFT_PAGE_CAP") {
            let cap: usize = raw.trim().parse().map_err(|_| {
                ExtractionError::Config(format!("DOCSIFT_PAGE_CAP must be a positive integer, got '{raw}'"))
            })?;
            if cap == 0 {
                return Err(ExtractionError::Config("DOCSIFT_PAGE_CAP must be at least 1".into()));
            }
            config.page_cap = Some(cap);
        }

        config.tessdata_dir = lookup("DOCSIFT_TESSDATA")
            .or_else(|| lookup("TESSDATA_PREFIX"))
            .map(PathBuf::from);

        Ok(config)
    }
}
