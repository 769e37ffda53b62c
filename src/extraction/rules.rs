//! Versioned table of OCR correction rules.
//!
//! Rules are grouped into stages that run in a fixed order. Every matcher is
//! a literal, a whole-word literal, or a narrowly anchored pattern; there is no
//! fuzzy matching. Bump `RULES_VERSION` whenever an entry changes.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::error;

pub const RULES_VERSION: &str = "2.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Cyrillic letters standing in for digits inside numbers.
    DigitRepair,
    /// Closed list of garbled institutional terms.
    Dictionary,
    /// Recognition artifacts and stray symbols.
    Noise,
    Whitespace,
}

impl Stage {
    pub const ORDER: [Stage; 4] = [
        Stage::DigitRepair,
        Stage::Dictionary,
        Stage::Noise,
        Stage::Whitespace,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// Exact substring.
    Literal(&'static str),
    /// Exact substring not glued to neighbouring letters or digits.
    WholeWord(&'static str),
    /// Regular expression; the replacement may use `$1`-style groups.
    Pattern(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct RuleSpec {
    pub stage: Stage,
    pub matcher: Matcher,
    pub replacement: &'static str,
}

const fn digit(pattern: &'static str, replacement: &'static str) -> RuleSpec {
    RuleSpec {
        stage: Stage::DigitRepair,
        matcher: Matcher::Pattern(pattern),
        replacement,
    }
}

const fn word(garbled: &'static str, canonical: &'static str) -> RuleSpec {
    RuleSpec {
        stage: Stage::Dictionary,
        matcher: Matcher::WholeWord(garbled),
        replacement: canonical,
    }
}

const fn noise(token: &'static str, replacement: &'static str) -> RuleSpec {
    RuleSpec {
        stage: Stage::Noise,
        matcher: Matcher::Literal(token),
        replacement,
    }
}

const fn space(pattern: &'static str, replacement: &'static str) -> RuleSpec {
    RuleSpec {
        stage: Stage::Whitespace,
        matcher: Matcher::Pattern(pattern),
        replacement,
    }
}

pub const RULE_SPECS: &[RuleSpec] = &[
    // Years: 2О11 -> 2011
    digit(r"\b2О(\d{2})\b", "20$1"),
    // Between digits: 1О5 -> 105
    digit(r"(\d)О(\d)", "${1}0${2}"),
    // Closing a two-digit number: 3О -> 30
    digit(r"\b([1-9])О\b", "${1}0"),
    word("МИНЙСТЕРСТВО", "МИНИСТЕРСТВО"),
    word("МИИИСТЕРСТВО", "МИНИСТЕРСТВО"),
    word("МИНИСТЕРСТВ0", "МИНИСТЕРСТВО"),
    word("ЗДРАВОХРАНЕНИЯ", "ЗДРАВООХРАНЕНИЯ"),
    word("ЗДРАВООХРАНЕН1Я", "ЗДРАВООХРАНЕНИЯ"),
    word("ЗДРАВООХРАНЕНЯ", "ЗДРАВООХРАНЕНИЯ"),
    word("РОССИИСКОЙ", "РОССИЙСКОЙ"),
    word("РОССНЙСКОЙ", "РОССИЙСКОЙ"),
    word("РОССИЙСКОИ", "РОССИЙСКОЙ"),
    word("ФЕДЕРАЦЙИ", "ФЕДЕРАЦИИ"),
    word("ФЕДЕРАЦИ1", "ФЕДЕРАЦИИ"),
    word("ФЕДЕРАНИИ", "ФЕДЕРАЦИИ"),
    word("ПР1КАЗ", "ПРИКАЗ"),
    word("ПРЙКАЗ", "ПРИКАЗ"),
    word("ПРИКАЗ©", "ПРИКАЗ"),
    word("СТРАНЦА", "СТРАНИЦА"),
    word("соответствипунктом", "соответствии с пунктом"),
    word("лицензированиотдельных", "лицензировании отдельных"),
    word("пнадзору", "по надзору"),
    noise("Pe Seg", ""),
    noise("or«", ""),
    noise("¥", ""),
    noise("$", ""),
    noise("[", ""),
    noise("]", ""),
    RuleSpec {
        stage: Stage::Noise,
        matcher: Matcher::Pattern(r"№(?: J)+"),
        replacement: "№",
    },
    noise("©", "О"),
    RuleSpec {
        stage: Stage::Noise,
        matcher: Matcher::Pattern(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F\x{FFFD}]+"),
        replacement: "",
    },
    space(r"\r\n?", "\n"),
    space(r"[ \t\x{A0}]{2,}|[\t\x{A0}]", " "),
    space(r" +\n *|\n +", "\n"),
    space(r"\n{3,}", "\n\n"),
    space(r"\A\s+|\s+\z", ""),
];

/// A rule ready to run.
#[derive(Debug)]
pub struct CompiledRule {
    pub stage: Stage,
    pub source: &'static str,
    regex: Regex,
    replacement: &'static str,
    expand: bool,
}

impl CompiledRule {
    fn compile(spec: &RuleSpec) -> Result<Self, regex::Error> {
        let (pattern, source, expand) = match spec.matcher {
            Matcher::Literal(lit) => (regex::escape(lit), lit, false),
            Matcher::WholeWord(lit) => (whole_word_pattern(lit), lit, false),
            Matcher::Pattern(p) => (p.to_string(), p, true),
        };
        Ok(Self {
            stage: spec.stage,
            source,
            regex: Regex::new(&pattern)?,
            replacement: spec.replacement,
            expand,
        })
    }

    /// Apply the rule, returning the new text and the number of matches.
    pub fn apply(&self, text: &str) -> (String, usize) {
        let count = self.regex.find_iter(text).count();
        if count == 0 {
            return (text.to_string(), 0);
        }
        let replaced = if self.expand {
            self.regex.replace_all(text, self.replacement)
        } else {
            self.regex.replace_all(text, regex::NoExpand(self.replacement))
        };
        (replaced.into_owned(), count)
    }
}

/// Word boundaries are only required on edges that are word characters;
/// an edge like `©` already delimits itself.
fn whole_word_pattern(literal: &str) -> String {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let mut pattern = String::new();
    if literal.chars().next().is_some_and(is_word) {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&regex::escape(literal));
    if literal.chars().last().is_some_and(is_word) {
        pattern.push_str(r"\b");
    }
    pattern
}

#[derive(Debug)]
pub struct RuleTable {
    pub version: &'static str,
    rules: Vec<CompiledRule>,
}

impl RuleTable {
    pub fn compile(specs: &[RuleSpec]) -> Self {
        let mut rules: Vec<CompiledRule> = specs
            .iter()
            .filter_map(|spec| match CompiledRule::compile(spec) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    error!(rule = ?spec.matcher, error = %e, "Correction rule failed to compile");
                    None
                }
            })
            .collect();
        // Stable: keeps declaration order inside a stage.
        rules.sort_by_key(|r| r.stage);
        Self {
            version: RULES_VERSION,
            rules,
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn stage(&self, stage: Stage) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter().filter(move |r| r.stage == stage)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter()
    }
}

static RULE_TABLE: LazyLock<RuleTable> = LazyLock::new(|| RuleTable::compile(RULE_SPECS));

/// The process-wide compiled rule table.
pub fn rule_table() -> &'static RuleTable {
    &RULE_TABLE
}
