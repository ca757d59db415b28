//! Gatekeeper rules file
//!
//! Rules come from an optional JSON file with a `global` section and
//! per-host overrides. A rule fires when all of its signals match.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::signals::QualityRecord;
use super::BlockClass;

/// One matchable condition inside a rule. Closed set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signal {
    ContainsScript { value: String },
    TitleMatches { value: String },
    BodyTextLenLt { value: usize },
    StatusIn { value: Vec<u16> },
    RedirectToLogin { value: Vec<String> },
    HtmlBytesLt { value: usize },
    VisibleTextLenLt { value: usize },
    MainContentLenLt { value: usize },
    HasStructuredData { value: bool },
}

impl Signal {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ContainsScript { .. } => "contains_script",
            Self::TitleMatches { .. } => "title_matches",
            Self::BodyTextLenLt { .. } => "body_text_len_lt",
            Self::StatusIn { .. } => "status_in",
            Self::RedirectToLogin { .. } => "redirect_to_login",
            Self::HtmlBytesLt { .. } => "html_bytes_lt",
            Self::VisibleTextLenLt { .. } => "visible_text_len_lt",
            Self::MainContentLenLt { .. } => "main_content_len_lt",
            Self::HasStructuredData { .. } => "has_structured_data",
        }
    }

    /// Evaluate this signal against one response.
    #[must_use]
    pub fn matches(
        &self,
        html: &str,
        status_code: u16,
        final_url: &str,
        title: Option<&str>,
        visible_text: &str,
        quality: &QualityRecord,
    ) -> bool {
        match self {
            Self::ContainsScript { value } => html.contains(value.as_str()),
            Self::TitleMatches { value } => title
                .map(|t| t.to_lowercase().contains(&value.to_lowercase()))
                .unwrap_or(false),
            Self::BodyTextLenLt { value } => visible_text.chars().count() < *value,
            Self::StatusIn { value } => value.contains(&status_code),
            Self::RedirectToLogin { value } => {
                let url = final_url.to_lowercase();
                value.iter().any(|needle| url.contains(&needle.to_lowercase()))
            }
            Self::HtmlBytesLt { value } => quality.html_bytes < *value,
            Self::VisibleTextLenLt { value } => quality.visible_text_chars < *value,
            Self::MainContentLenLt { value } => quality.main_content_chars < *value,
            Self::HasStructuredData { value } => quality.has_structured_data == *value,
        }
    }
}

/// Confidence assumed for rules that omit one.
pub const DEFAULT_RULE_CONFIDENCE: f64 = 0.7;

/// One classification rule; fires when all signals match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub block_class: BlockClass,
    pub signals: Vec<Signal>,
    pub confidence: Option<f64>,
}

impl Rule {
    #[must_use]
    pub fn confidence(&self) -> f64 {
        self.confidence
            .unwrap_or(DEFAULT_RULE_CONFIDENCE)
            .clamp(0.0, 1.0)
    }
}

/// Thresholds applied when no rule fires. All fields optional in the
/// file; unset values resolve against environment defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PartialThresholds {
    pub min_html_bytes: Option<usize>,
    pub min_visible_text_chars: Option<usize>,
    pub min_main_content_chars: Option<usize>,
    pub require_structured_data: Option<bool>,
}

/// Fully-resolved thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub min_html_bytes: usize,
    pub min_visible_text_chars: usize,
    pub min_main_content_chars: usize,
    pub require_structured_data: bool,
}

impl Thresholds {
    /// Overlay file-level partial thresholds onto this base.
    #[must_use]
    pub fn overlay(self, partial: &PartialThresholds) -> Self {
        Self {
            min_html_bytes: partial.min_html_bytes.unwrap_or(self.min_html_bytes),
            min_visible_text_chars: partial
                .min_visible_text_chars
                .unwrap_or(self.min_visible_text_chars),
            min_main_content_chars: partial
                .min_main_content_chars
                .unwrap_or(self.min_main_content_chars),
            require_structured_data: partial
                .require_structured_data
                .unwrap_or(self.require_structured_data),
        }
    }
}

/// One section of the rules file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub thresholds: PartialThresholds,
}

/// The rules file: a global section plus per-host overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesFile {
    #[serde(default)]
    pub global: RuleSet,
    #[serde(default)]
    pub domains: HashMap<String, RuleSet>,
}
