// src/stream/correlate.rs

//! Mapping free-text remote log messages to node types.
//!
//! The remote job never names node ids, so the reconciler asks a
//! [`NodeCorrelation`] which node type a message is about. The default
//! [`KeywordCorrelation`] looks for known operation keywords; a structured
//! protocol can plug in its own implementation without touching the tracker.

use std::fmt;

use regex::Regex;
use tracing::warn;

use crate::types::NodeType;

pub trait NodeCorrelation: Send + Sync + fmt::Debug {
    /// The node type a log message refers to, if any.
    fn correlate(&self, message: &str) -> Option<NodeType>;
}

/// Keywords shipped with the crate, used when no table is configured.
pub const BUILTIN_KEYWORDS: &[(&str, NodeType)] = &[
    ("load_table", NodeType::DataSource),
    ("profile_table", NodeType::DataSource),
    ("load_data", NodeType::DataSource),
    ("transform", NodeType::Transform),
    ("clean_data", NodeType::Transform),
    ("ai_analysis", NodeType::AiAnalysis),
    ("run_analysis", NodeType::AiAnalysis),
    ("analyze", NodeType::AiAnalysis),
    ("generate_chart", NodeType::ChartGenerator),
    ("generate_charts", NodeType::ChartGenerator),
    ("generate_insights", NodeType::InsightExtractor),
    ("extract_insights", NodeType::InsightExtractor),
    ("export", NodeType::Output),
    ("write_output", NodeType::Output),
];

#[derive(Debug, Clone)]
struct KeywordRule {
    keyword: String,
    pattern: Regex,
    node_type: NodeType,
}

/// Whole-word, case-insensitive keyword matcher.
///
/// Each keyword is bound to exactly one node type. When a message contains
/// several keywords, the one appearing first in the message wins; ties go to
/// the rule registered first.
#[derive(Debug, Clone)]
pub struct KeywordCorrelation {
    rules: Vec<KeywordRule>,
}

impl KeywordCorrelation {
    /// Build from `(keyword, node type)` bindings. Empty keywords are ignored.
    pub fn new<I, K>(bindings: I) -> Self
    where
        I: IntoIterator<Item = (K, NodeType)>,
        K: Into<String>,
    {
        let mut rules = Vec::new();

        for (keyword, node_type) in bindings {
            let keyword = keyword.into().trim().to_string();
            if keyword.is_empty() {
                continue;
            }

            match keyword_pattern(&keyword) {
                Ok(pattern) => rules.push(KeywordRule {
                    keyword,
                    pattern,
                    node_type,
                }),
                Err(e) => {
                    warn!(%keyword, error = %e, "invalid correlation keyword; ignoring");
                }
            }
        }

        Self { rules }
    }

    pub fn builtin() -> Self {
        Self::new(BUILTIN_KEYWORDS.iter().map(|&(k, t)| (k, t)))
    }

    pub fn keywords(&self) -> impl Iterator<Item = (&str, NodeType)> {
        self.rules.iter().map(|r| (r.keyword.as_str(), r.node_type))
    }
}

impl Default for KeywordCorrelation {
    fn default() -> Self {
        Self::builtin()
    }
}

impl NodeCorrelation for KeywordCorrelation {
    fn correlate(&self, message: &str) -> Option<NodeType> {
        self.rules
            .iter()
            .filter_map(|rule| rule.pattern.find(message).map(|m| (m.start(), rule)))
            .min_by_key(|(start, _)| *start)
            .map(|(_, rule)| rule.node_type)
    }
}

/// Compile the whole-word pattern for `keyword`.
pub fn keyword_pattern(keyword: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(keyword)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_match_whole_words_only() {
        let correlation = KeywordCorrelation::builtin();

        assert_eq!(
            correlation.correlate("Running PROFILE_TABLE on sales"),
            Some(NodeType::DataSource)
        );
        assert_eq!(correlation.correlate("retransformed rows"), None);
        assert_eq!(correlation.correlate("heartbeat"), None);
    }

    #[test]
    fn earliest_keyword_in_message_wins() {
        let correlation = KeywordCorrelation::builtin();

        assert_eq!(
            correlation.correlate("generate_insights after generate_chart"),
            Some(NodeType::InsightExtractor)
        );
    }

    #[test]
    fn blank_keywords_are_dropped() {
        let correlation = KeywordCorrelation::new([("  ", NodeType::Output), ("ship", NodeType::Output)]);

        let keywords: Vec<_> = correlation.keywords().collect();
        assert_eq!(keywords, vec![("ship", NodeType::Output)]);
    }
}
