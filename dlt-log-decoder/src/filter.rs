//! Message search filter
//!
//! Matches messages against a set of search patterns. Each pattern is either a
//! plain substring or a regular expression; both match case-insensitively
//! against `"<ecu> <app> <ctx> <payload>"`. A message matches when any pattern
//! matches.

use crate::types::{DltError, Message, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// One search pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPattern {
    pub pattern: String,
    #[serde(default)]
    pub is_regex: bool,
}

impl SearchPattern {
    pub fn substring(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            is_regex: false,
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            is_regex: true,
        }
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Regex(Regex),
    /// Lowercased needle
    Substring(String),
}

/// Compiled set of search patterns
#[derive(Debug, Clone)]
pub struct MessageFilter {
    matchers: Vec<Matcher>,
}

impl MessageFilter {
    /// Compile the patterns; empty patterns are ignored
    pub fn new(patterns: &[SearchPattern]) -> Result<Self> {
        let mut matchers = Vec::with_capacity(patterns.len());
        for pattern in patterns.iter().filter(|p| !p.pattern.is_empty()) {
            if pattern.is_regex {
                let regex = RegexBuilder::new(&pattern.pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| DltError::InvalidPattern(format!("{}: {}", pattern.pattern, e)))?;
                matchers.push(Matcher::Regex(regex));
            } else {
                matchers.push(Matcher::Substring(pattern.pattern.to_lowercase()));
            }
        }
        Ok(Self { matchers })
    }

    /// True if no usable pattern was given
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn matches(&self, message: &Message) -> bool {
        let haystack = format!(
            "{} {} {} {}",
            message.ecu_id(),
            message.app_id(),
            message.context_id(),
            message.payload_text()
        );
        let mut lowered: Option<String> = None;

        self.matchers.iter().any(|matcher| match matcher {
            Matcher::Regex(regex) => regex.is_match(&haystack),
            Matcher::Substring(needle) => lowered
                .get_or_insert_with(|| haystack.to_lowercase())
                .contains(needle.as_str()),
        })
    }

    /// Global indices of the matching messages, in input order
    pub fn matching_indices(&self, messages: &[Message]) -> Vec<u64> {
        messages
            .iter()
            .filter(|m| self.matches(m))
            .map(|m| m.index())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::MessageAssembler;
    use crate::config::DecoderConfig;
    use crate::formats::HeaderDecoder;
    use crate::payload::PayloadDecoder;
    use crate::types::{Argument, ArgumentValue, LogLevel, MessageType};
    use crate::writer::FrameBuilder;

    fn messages() -> Vec<Message> {
        let config = DecoderConfig::new();
        let mut assembler = MessageAssembler::new(10, &config);
        let decoder = PayloadDecoder::new(config.encoding, None);
        [("ENG", "Engine Started"), ("BRK", "brake pressure 42"), ("ENG", "shutdown")]
            .iter()
            .map(|(app, text)| {
                let frame = FrameBuilder::new()
                    .storage_header(0, 0, "ECU1")
                    .extended_header(MessageType::Log(LogLevel::Info), app, "MAIN")
                    .verbose(&[Argument::new(ArgumentValue::String(text.to_string()))])
                    .build()
                    .unwrap();
                let headers = HeaderDecoder::new(false).decode(&frame).unwrap();
                let payload = decoder.decode(&headers, &frame).unwrap();
                assembler.assemble(&headers, payload, "trace.dlt")
            })
            .collect()
    }

    #[test]
    fn test_substring_is_case_insensitive() {
        let filter = MessageFilter::new(&[SearchPattern::substring("engine")]).unwrap();
        assert_eq!(filter.matching_indices(&messages()), vec![10]);
    }

    #[test]
    fn test_matches_header_fields() {
        let filter = MessageFilter::new(&[SearchPattern::substring("eng main")]).unwrap();
        assert_eq!(filter.matching_indices(&messages()), vec![10, 12]);
    }

    #[test]
    fn test_regex_any_pattern() {
        let filter = MessageFilter::new(&[
            SearchPattern::regex(r"pressure \d+$"),
            SearchPattern::substring("SHUTDOWN"),
        ])
        .unwrap();
        assert_eq!(filter.matching_indices(&messages()), vec![11, 12]);
    }

    #[test]
    fn test_invalid_regex() {
        let err = MessageFilter::new(&[SearchPattern::regex("(unclosed")]).unwrap_err();
        assert!(matches!(err, DltError::InvalidPattern(_)));
    }

    #[test]
    fn test_empty_patterns_ignored() {
        let filter = MessageFilter::new(&[SearchPattern::substring("")]).unwrap();
        assert!(filter.is_empty());
        assert!(filter.matching_indices(&messages()).is_empty());
    }
}
