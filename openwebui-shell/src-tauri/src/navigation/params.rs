//! Allow-list sanitizer for the query parameters Open WebUI understands.
//!
//! Unknown keys and invalid values are dropped; sanitizing never fails the
//! navigation as a whole.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Every key that can survive sanitization.
pub const RECOGNIZED_KEYS: [&str; 9] = [
    "models",
    "model",
    "youtube",
    "tools",
    "tool-ids",
    "web-search",
    "call",
    "temporary-chat",
    "q",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRule {
    /// Comma separated identifiers; invalid items are dropped individually.
    IdentifierList,
    YoutubeId,
    /// Only the literal value `true` is kept.
    Flag,
    /// Free-form chat prompt.
    Query,
}

impl ParamRule {
    pub fn for_key(key: &str) -> Option<Self> {
        match key {
            "models" | "model" | "tools" | "tool-ids" => Some(ParamRule::IdentifierList),
            "youtube" => Some(ParamRule::YoutubeId),
            "web-search" | "call" | "temporary-chat" => Some(ParamRule::Flag),
            "q" => Some(ParamRule::Query),
            _ => None,
        }
    }

    /// Returns the value to keep, or `None` when the parameter must be dropped.
    pub fn apply(self, value: &str) -> Option<String> {
        match self {
            ParamRule::IdentifierList => {
                let valid: Vec<&str> = value
                    .split(',')
                    .filter(|item| !item.trim().is_empty())
                    .filter(|item| identifier_regex().is_match(item))
                    .collect();
                if valid.is_empty() {
                    None
                } else {
                    Some(valid.join(","))
                }
            }
            ParamRule::YoutubeId => {
                youtube_id_regex().is_match(value).then(|| value.to_string())
            }
            ParamRule::Flag => (value == "true").then(|| "true".to_string()),
            ParamRule::Query => {
                (!value.trim().is_empty() && query_regex().is_match(value))
                    .then(|| value.to_string())
            }
        }
    }
}

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("identifier regex"))
}

fn youtube_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("youtube regex"))
}

// Word characters, whitespace and punctuation, all ASCII.
fn query_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_ \t\n\x0B\x0C\r[:punct:]]+$").expect("query regex")
    })
}

/// Sanitizes decoded query pairs.
///
/// Only the first occurrence of each key is considered, and surviving pairs
/// keep the relative order in which their keys first appeared.
pub fn sanitize_params<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Vec<(String, String)>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut kept = Vec::new();

    for (key, value) in pairs {
        let (key, value) = (key.as_ref(), value.as_ref());
        if !seen.insert(key.to_string()) {
            continue;
        }

        let Some(rule) = ParamRule::for_key(key) else {
            debug!("Dropping unrecognized parameter: {}", key);
            continue;
        };

        match rule.apply(value) {
            Some(sanitized) => {
                debug!("Validated {}: {}", key, sanitized);
                kept.push((key.to_string(), sanitized));
            }
            None => warn!("Dropping invalid {} value: {:?}", key, value),
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitize(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        sanitize_params(pairs.iter().copied())
    }

    #[test]
    fn test_models_keep_only_valid_items() {
        assert_eq!(
            sanitize(&[("models", "gpt-4,bad!name,llama3_8b")]),
            vec![("models".to_string(), "gpt-4,llama3_8b".to_string())]
        );
        assert!(sanitize(&[("model", "bad!name,also bad")]).is_empty());
        assert_eq!(
            sanitize(&[("tool-ids", "web,,search")]),
            vec![("tool-ids".to_string(), "web,search".to_string())]
        );
    }

    #[test]
    fn test_youtube_requires_eleven_chars() {
        assert_eq!(
            sanitize(&[("youtube", "dQw4w9WgXcQ")]),
            vec![("youtube".to_string(), "dQw4w9WgXcQ".to_string())]
        );
        assert!(sanitize(&[("youtube", "dQw4w9WgXc")]).is_empty());
        assert!(sanitize(&[("youtube", "dQw4w9WgXcQQ")]).is_empty());
        assert!(sanitize(&[("youtube", "dQw4w9WgX!Q")]).is_empty());
    }

    #[test]
    fn test_flags_must_be_literal_true() {
        assert_eq!(
            sanitize(&[("web-search", "true"), ("call", "TRUE"), ("temporary-chat", "1")]),
            vec![("web-search".to_string(), "true".to_string())]
        );
    }

    #[test]
    fn test_query_accepts_ascii_text_and_punctuation() {
        assert_eq!(
            sanitize(&[("q", "What is 2+2? (quickly!)")]),
            vec![("q".to_string(), "What is 2+2? (quickly!)".to_string())]
        );
        assert!(sanitize(&[("q", "   ")]).is_empty());
        assert!(sanitize(&[("q", "")]).is_empty());
        assert!(sanitize(&[("q", "café")]).is_empty());
    }

    #[test]
    fn test_unrecognized_keys_dropped_and_order_kept() {
        let out = sanitize(&[
            ("foo", "1"),
            ("q", "hello"),
            ("utm_source", "x"),
            ("models", "a"),
            ("q", "second"),
        ]);
        assert_eq!(
            out,
            vec![
                ("q".to_string(), "hello".to_string()),
                ("models".to_string(), "a".to_string()),
            ]
        );
    }

    #[test]
    fn test_surviving_values_satisfy_their_rule() {
        let inputs = [
            ("models", "ok,no pe,x"),
            ("youtube", "abc"),
            ("tools", "t1,t-2"),
            ("call", "true"),
            ("q", "fine"),
            ("other", "value"),
        ];
        for (key, value) in sanitize(&inputs) {
            assert!(RECOGNIZED_KEYS.contains(&key.as_str()), "{} is not recognized", key);
            let rule = ParamRule::for_key(&key).unwrap();
            assert_eq!(rule.apply(&value).as_deref(), Some(value.as_str()));
        }
    }
}
