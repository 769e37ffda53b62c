//! Post-OCR error correction.
//!
//! Runs the rule table's stages in order (digit repair, dictionary, noise,
//! whitespace) and repeats the pass until the text stops changing, so
//! correcting already-corrected text is a no-op. The loop ends: outside the
//! dictionary every rule deletes text or replaces characters no rule emits,
//! and dictionary output is never itself a garbled variant.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::rules::{rule_table, RuleTable, Stage};
use super::types::trimmed_char_count;

/// Returned in place of text when there is nothing worth correcting.
pub const TEXT_TOO_SHORT: &str = "Text too short";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrectionOutcome {
    Corrected(String),
    InsufficientText,
}

impl CorrectionOutcome {
    pub fn is_insufficient(&self) -> bool {
        matches!(self, Self::InsufficientText)
    }

    /// Corrected text, or the sentinel when there was too little input.
    pub fn into_text(self) -> String {
        match self {
            Self::Corrected(text) => text,
            Self::InsufficientText => TEXT_TOO_SHORT.to_string(),
        }
    }
}

/// Replacement counts per stage, summed over all passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionReport {
    pub rules_version: String,
    pub passes: usize,
    pub digit_repairs: usize,
    pub dictionary_repairs: usize,
    pub noise_removed: usize,
    pub whitespace_fixes: usize,
}

impl CorrectionReport {
    pub fn total(&self) -> usize {
        self.digit_repairs + self.dictionary_repairs + self.noise_removed + self.whitespace_fixes
    }

    fn record(&mut self, stage: Stage, count: usize) {
        match stage {
            Stage::DigitRepair => self.digit_repairs += count,
            Stage::Dictionary => self.dictionary_repairs += count,
            Stage::Noise => self.noise_removed += count,
            Stage::Whitespace => self.whitespace_fixes += count,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorrectionEngine {
    table: &'static RuleTable,
    min_chars: usize,
}

impl Default for CorrectionEngine {
    fn default() -> Self {
        Self::new(1)
    }
}

impl CorrectionEngine {
    /// `min_chars`: trimmed input (and output) shorter than this is insufficient.
    pub fn new(min_chars: usize) -> Self {
        Self {
            table: rule_table(),
            min_chars: min_chars.max(1),
        }
    }

    pub fn rules_version(&self) -> &'static str {
        self.table.version
    }

    /// Correct `text`, returning the outcome and what was changed.
    pub fn apply(&self, text: &str) -> (CorrectionOutcome, CorrectionReport) {
        let mut report = CorrectionReport {
            rules_version: self.table.version.to_string(),
            ..Default::default()
        };

        if trimmed_char_count(text) < self.min_chars {
            debug!(chars = trimmed_char_count(text), "Too little text to correct");
            return (CorrectionOutcome::InsufficientText, report);
        }

        let mut current = text.to_string();
        loop {
            let next = self.pass(&current, &mut report);
            report.passes += 1;
            if next == current {
                break;
            }
            current = next;
        }

        debug!(
            passes = report.passes,
            replacements = report.total(),
            "Correction finished"
        );

        if trimmed_char_count(&current) < self.min_chars {
            return (CorrectionOutcome::InsufficientText, report);
        }
        (CorrectionOutcome::Corrected(current), report)
    }

    /// Corrected text, or `TEXT_TOO_SHORT`. Never fails.
    pub fn correct(&self, text: &str) -> String {
        self.apply(text).0.into_text()
    }

    fn pass(&self, text: &str, report: &mut CorrectionReport) -> String {
        let mut current = text.to_string();
        for stage in Stage::ORDER {
            current = self.run_stage(stage, &current, report);
        }
        current
    }

    /// Run one stage over `text`.
    pub fn run_stage(&self, stage: Stage, text: &str, report: &mut CorrectionReport) -> String {
        let mut current = text.to_string();
        for rule in self.table.stage(stage) {
            let (next, count) = rule.apply(&current);
            if count > 0 {
                report.record(stage, count);
                current = next;
            }
        }
        current
    }
}
