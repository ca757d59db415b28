//! Response gatekeeper
//!
//! Classifies a fetched HTML response into a block-class (none, thin,
//! challenge, login, soft-block) with supporting evidence. Rules come
//! from an optional JSON file loaded lazily once per process; when no
//! rule fires, quality thresholds decide. The classifier is pure:
//! identical inputs always produce an identical evidence record.

pub mod rules;
pub mod signals;

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use rules::{RuleSet, RulesFile, Thresholds};
use signals::QualityRecord;

/// Why a response may be unusable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockClass {
    None,
    Thin,
    Challenge,
    Login,
    SoftBlock,
}

/// User-visible projection of the block-class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Usable,
    Thin,
    Challenge,
    Login,
    SoftBlock,
}

impl From<BlockClass> for ContentStatus {
    fn from(block: BlockClass) -> Self {
        match block {
            BlockClass::None => Self::Usable,
            BlockClass::Thin => Self::Thin,
            BlockClass::Challenge => Self::Challenge,
            BlockClass::Login => Self::Login,
            BlockClass::SoftBlock => Self::SoftBlock,
        }
    }
}

/// One fired rule (or the threshold fallback) in the evidence trail
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleEvidence {
    pub rule_id: String,
    pub matched_signals: Vec<String>,
    pub block_class: BlockClass,
    pub confidence: f64,
}

/// The full classification record attached to document metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateReport {
    pub block_class: BlockClass,
    pub content_status: ContentStatus,
    pub confidence: f64,
    pub evidence: Vec<RuleEvidence>,
    pub quality: QualityRecord,
    pub thresholds: Thresholds,
}

/// Everything the classifier looks at for one response
pub struct GateInput<'a> {
    pub html: &'a str,
    pub status_code: u16,
    pub final_url: &'a str,
}

/// The classifier. Holds the lazily-loaded rules file and the
/// environment-resolved base thresholds.
pub struct Gatekeeper {
    rules_path: Option<std::path::PathBuf>,
    base_thresholds: Thresholds,
    rules: OnceLock<RulesFile>,
}

impl Gatekeeper {
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        Self {
            rules_path: config.gatekeeper_rules_path.clone(),
            base_thresholds: Thresholds {
                min_html_bytes: config.min_html_bytes,
                min_visible_text_chars: config.min_visible_text_chars,
                min_main_content_chars: config.min_main_content_chars,
                require_structured_data: false,
            },
            rules: OnceLock::new(),
        }
    }

    /// Construct with an in-memory rules file; used by tests.
    #[must_use]
    pub fn with_rules(rules_file: RulesFile, base_thresholds: Thresholds) -> Self {
        let rules = OnceLock::new();
        let _ = rules.set(rules_file);
        Self {
            rules_path: None,
            base_thresholds,
            rules,
        }
    }

    fn rules(&self) -> &RulesFile {
        self.rules.get_or_init(|| {
            let Some(path) = &self.rules_path else {
                return RulesFile::default();
            };
            match std::fs::read_to_string(path) {
                Ok(raw) => match serde_json::from_str(&raw) {
                    Ok(file) => file,
                    Err(e) => {
                        tracing::error!(path = %path.display(), error = %e,
                            "gatekeeper rules file failed to parse; running with defaults");
                        RulesFile::default()
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e,
                        "gatekeeper rules file unreadable; running with defaults");
                    RulesFile::default()
                }
            }
        })
    }

    fn rule_sets_for<'a>(&'a self, host: &str) -> (Option<&'a RuleSet>, &'a RuleSet) {
        let file = self.rules();
        (file.domains.get(host), &file.global)
    }

    /// Classify one response. Host-specific rules are evaluated ahead
    /// of global ones; host thresholds overlay global thresholds which
    /// overlay the environment base.
    #[must_use]
    pub fn classify(&self, input: &GateInput<'_>) -> GateReport {
        let (quality, title, visible) = signals::measure(input.html);
        let host = url::Url::parse(input.final_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
            .unwrap_or_default();
        let (host_set, global_set) = self.rule_sets_for(&host);

        let mut thresholds = self.base_thresholds.overlay(&global_set.thresholds);
        if let Some(host_set) = host_set {
            thresholds = thresholds.overlay(&host_set.thresholds);
        }

        let mut fired: Vec<RuleEvidence> = Vec::new();
        let rule_iter = host_set
            .map(|s| s.rules.as_slice())
            .unwrap_or_default()
            .iter()
            .chain(global_set.rules.iter());

        for rule in rule_iter {
            if rule.signals.is_empty() {
                continue;
            }
            let all_match = rule.signals.iter().all(|signal| {
                signal.matches(
                    input.html,
                    input.status_code,
                    input.final_url,
                    title.as_deref(),
                    &visible,
                    &quality,
                )
            });
            if all_match {
                fired.push(RuleEvidence {
                    rule_id: rule.id.clone(),
                    matched_signals: rule
                        .signals
                        .iter()
                        .map(|s| s.name().to_string())
                        .collect(),
                    block_class: rule.block_class,
                    confidence: rule.confidence(),
                });
            }
        }

        if !fired.is_empty() {
            // Stable sort keeps host-before-global ordering on ties.
            fired.sort_by(|a, b| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let winner = &fired[0];
            return GateReport {
                block_class: winner.block_class,
                content_status: winner.block_class.into(),
                confidence: winner.confidence,
                evidence: fired.clone(),
                quality,
                thresholds,
            };
        }

        // Threshold fallback.
        let mut failing: Vec<&'static str> = Vec::new();
        if quality.html_bytes < thresholds.min_html_bytes {
            failing.push("min_html_bytes");
        }
        if quality.visible_text_chars < thresholds.min_visible_text_chars {
            failing.push("min_visible_text_chars");
        }
        if quality.main_content_chars < thresholds.min_main_content_chars {
            failing.push("min_main_content_chars");
        }
        if thresholds.require_structured_data && !quality.has_structured_data {
            failing.push("require_structured_data");
        }

        if failing.is_empty() {
            GateReport {
                block_class: BlockClass::None,
                content_status: ContentStatus::Usable,
                confidence: 1.0,
                evidence: Vec::new(),
                quality,
                thresholds,
            }
        } else {
            let confidence = (0.4 + 0.15 * failing.len() as f64).min(1.0);
            GateReport {
                block_class: BlockClass::Thin,
                content_status: ContentStatus::Thin,
                confidence,
                evidence: vec![RuleEvidence {
                    rule_id: "thresholds".to_string(),
                    matched_signals: failing.iter().map(|s| s.to_string()).collect(),
                    block_class: BlockClass::Thin,
                    confidence,
                }],
                quality,
                thresholds,
            }
        }
    }
}
