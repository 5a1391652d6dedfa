use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::agent::{AgentError, NormalizationMode};

/// Structured form of a reply. The variant follows the normalization mode,
/// never the reply text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NormalizedResult {
    Text(String),
    Bool(bool),
    List(Vec<String>),
    /// `None` means the fields were not found, not that they were empty.
    Record(Option<Vec<String>>),
    Records(Vec<Vec<String>>),
}

impl NormalizedResult {
    pub fn into_text(self) -> Option<String> {
        match self {
            NormalizedResult::Text(text) => Some(text),
            _ => None,
        }
    }
}

fn bracket_regex() -> &'static Regex {
    static BRACKET: OnceLock<Regex> = OnceLock::new();
    BRACKET.get_or_init(|| Regex::new(r"(?s)\[(.*?)\]").expect("Invalid bracket regex"))
}

fn quoted_regex() -> &'static Regex {
    static QUOTED: OnceLock<Regex> = OnceLock::new();
    QUOTED.get_or_init(|| Regex::new(r#""(.*?)""#).expect("Invalid quoted regex"))
}

/// Record patterns are compiled once, when the normalizer is built.
#[derive(Debug, Clone)]
pub struct ResponseNormalizer {
    mode: NormalizationMode,
    record_pattern: Option<Regex>,
}

impl ResponseNormalizer {
    pub fn new(mode: NormalizationMode) -> Result<Self, AgentError> {
        let pattern = match &mode {
            NormalizationMode::SingleRecord(fields) => Some(single_record_pattern(fields)),
            NormalizationMode::MultiRecord(fields) => Some(multi_record_pattern(fields)),
            _ => None,
        };
        let record_pattern = pattern
            .map(|p| Regex::new(&p))
            .transpose()
            .map_err(|e| AgentError::InvalidConfiguration(format!("record pattern: {}", e)))?;

        Ok(Self {
            mode,
            record_pattern,
        })
    }

    pub fn mode(&self) -> &NormalizationMode {
        &self.mode
    }

    pub fn normalize(&self, reply: &str) -> NormalizedResult {
        match (&self.mode, &self.record_pattern) {
            (NormalizationMode::Raw, _) => NormalizedResult::Text(reply.to_string()),
            (NormalizationMode::Boolean, _) => NormalizedResult::Bool(normalize_bool(reply)),
            (NormalizationMode::FlatList, _) => NormalizedResult::List(normalize_list(reply)),
            (NormalizationMode::SingleRecord(_), Some(pattern)) => {
                NormalizedResult::Record(match_record(pattern, reply))
            }
            (NormalizationMode::MultiRecord(_), Some(pattern)) => {
                NormalizedResult::Records(match_records(pattern, reply))
            }
            (NormalizationMode::SingleRecord(_), None) => NormalizedResult::Record(None),
            (NormalizationMode::MultiRecord(_), None) => NormalizedResult::Records(Vec::new()),
        }
    }
}

/// True when the lowercased reply contains `true` anywhere.
pub fn normalize_bool(reply: &str) -> bool {
    reply.to_lowercase().contains("true")
}

/// Quoted items inside the first `[...]` span. Empty when there is no span.
pub fn normalize_list(reply: &str) -> Vec<String> {
    let Some(span) = bracket_regex().captures(reply).and_then(|c| c.get(1)) else {
        return Vec::new();
    };
    quoted_regex()
        .captures_iter(span.as_str())
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// `F1:(.+?)\nF2:(.+?)` with the last capture running to the end of the reply.
pub fn single_record_pattern(fields: &[String]) -> String {
    let body = fields
        .iter()
        .map(|field| format!("{}:(.+?)", regex::escape(field)))
        .collect::<Vec<_>>()
        .join("\n");
    format!(r"(?s){}\n?\z", body)
}

/// `F1 \d+: (.+?)\nF2 \d+: (.+?)\n`, repeated through the reply.
pub fn multi_record_pattern(fields: &[String]) -> String {
    let body: String = fields
        .iter()
        .map(|field| format!(r"{} \d+: (.+?)\n", regex::escape(field)))
        .collect();
    format!("(?s){}", body)
}

pub fn normalize_record(reply: &str, fields: &[String]) -> Option<Vec<String>> {
    let pattern = Regex::new(&single_record_pattern(fields)).ok()?;
    match_record(&pattern, reply)
}

pub fn normalize_records(reply: &str, fields: &[String]) -> Vec<Vec<String>> {
    if fields.is_empty() {
        return Vec::new();
    }
    Regex::new(&multi_record_pattern(fields))
        .map(|pattern| match_records(&pattern, reply))
        .unwrap_or_default()
}

fn match_record(pattern: &Regex, reply: &str) -> Option<Vec<String>> {
    let captures = pattern.captures(reply)?;
    Some(
        captures
            .iter()
            .skip(1)
            .map(|m| m.map(|m| m.as_str().trim().to_string()).unwrap_or_default())
            .collect(),
    )
}

fn match_records(pattern: &Regex, reply: &str) -> Vec<Vec<String>> {
    if pattern.captures_len() <= 1 {
        return Vec::new();
    }
    pattern
        .captures_iter(reply)
        .map(|captures| {
            captures
                .iter()
                .skip(1)
                .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_flat_list_ignores_text_between_items() {
        let reply = "Sure! Here you go:\n[\n  \"a\", // first\n  and then \"b\"\n]\nDone [\"c\"]";
        assert_eq!(normalize_list(reply), vec!["a", "b"]);
    }

    #[test]
    fn test_flat_list_without_brackets_is_empty() {
        assert!(normalize_list("\"a\", \"b\"").is_empty());
        assert!(normalize_list("[]").is_empty());
    }

    #[test]
    fn test_single_record() {
        let names = fields(&["Name", "Age"]);
        assert_eq!(
            normalize_record("Name:Alice\nAge:30", &names),
            Some(vec!["Alice".to_string(), "30".to_string()])
        );
        assert_eq!(normalize_record("Name:Alice", &names), None);
        assert_eq!(normalize_record("Age:30\nName:Alice", &names), None);
    }

    #[test]
    fn test_single_record_spans_lines_and_trims() {
        let names = fields(&["Summary", "Score"]);
        let reply = "Preamble\nSummary: first line\nsecond line \nScore: 7 \n";
        assert_eq!(
            normalize_record(reply, &names),
            Some(vec!["first line\nsecond line".to_string(), "7".to_string()])
        );
    }

    #[test]
    fn test_single_record_escapes_field_names() {
        let names = fields(&["a.b", "c"]);
        assert_eq!(normalize_record("axb:1\nc:2", &names), None);
        assert_eq!(
            normalize_record("a.b:1\nc:2", &names),
            Some(vec!["1".to_string(), "2".to_string()])
        );
    }

    #[test]
    fn test_multi_record() {
        let names = fields(&["Item"]);
        assert_eq!(
            normalize_records("Item 1: foo\nItem 2: bar\n", &names),
            vec![vec!["foo".to_string()], vec!["bar".to_string()]]
        );
        assert!(normalize_records("", &names).is_empty());
    }

    #[test]
    fn test_multi_record_keeps_whitespace_and_pairs_fields() {
        let names = fields(&["Title", "Url"]);
        let reply = "Title 1:  Bedrock \nUrl 1: https://a\nTitle 2: Llama\nUrl 2: https://b\n";
        assert_eq!(
            normalize_records(reply, &names),
            vec![
                vec![" Bedrock ".to_string(), "https://a".to_string()],
                vec!["Llama".to_string(), "https://b".to_string()],
            ]
        );
    }

    #[test]
    fn test_boolean() {
        for reply in ["TRUE.", "it's true", "True"] {
            assert!(normalize_bool(reply), "{}", reply);
        }
        for reply in ["false", "maybe"] {
            assert!(!normalize_bool(reply), "{}", reply);
        }
    }

    #[test]
    fn test_variant_follows_mode() {
        let reply = "[\"x\"] true";
        let cases = [
            (NormalizationMode::Raw, NormalizedResult::Text(reply.to_string())),
            (NormalizationMode::Boolean, NormalizedResult::Bool(true)),
            (NormalizationMode::FlatList, NormalizedResult::List(vec!["x".to_string()])),
            (
                NormalizationMode::SingleRecord(fields(&["Name"])),
                NormalizedResult::Record(None),
            ),
            (
                NormalizationMode::MultiRecord(fields(&["Item"])),
                NormalizedResult::Records(Vec::new()),
            ),
        ];
        for (mode, expected) in cases {
            let normalizer = ResponseNormalizer::new(mode).unwrap();
            assert_eq!(normalizer.normalize(reply), expected);
        }
    }

    #[test]
    fn test_raw_is_unmodified() {
        let normalizer = ResponseNormalizer::new(NormalizationMode::Raw).unwrap();
        let reply = "  \"query\"\n";
        assert_eq!(normalizer.normalize(reply).into_text().as_deref(), Some(reply));
    }
}
