//! Replacement map: placeholder tokens and their substitution values.

use crate::error::Result;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// The reserved logo token. It always resolves to empty text and raises a
/// logo request, whether or not the map carries an entry for it.
pub const LOGO_TOKEN: &str = "<logo>";

/// Case-insensitive token/value map driving substitution.
///
/// Keys wrapped in `<`...`>` are tokens eligible for matching; other keys
/// are stored but never matched. A token that is absent, or whose value
/// trims to empty, is resolvable-but-empty rather than an error.
#[derive(Debug, Clone, Default)]
pub struct ReplacementMap {
    /// Values keyed by lowercased key.
    values: HashMap<String, String>,
    /// Matchable tokens (lowercase, including [`LOGO_TOKEN`]), longest
    /// first so that prefix tokens never shadow longer ones.
    tokens: Vec<String>,
}

impl ReplacementMap {
    /// Create an empty map.
    pub fn new() -> Self {
        let mut map = ReplacementMap {
            values: HashMap::new(),
            tokens: Vec::new(),
        };
        map.rebuild_tokens();
        map
    }

    /// Load a flat JSON object (`{"<token>": "value", ...}`).
    ///
    /// `null` values become empty strings. Keys differing only by case
    /// collapse onto one entry; the alphabetically last key wins, which
    /// keeps loading deterministic.
    pub fn from_json_str(data: &str) -> Result<Self> {
        let raw: BTreeMap<String, Option<String>> = serde_json::from_str(data)?;
        let mut map = ReplacementMap::new();
        for (key, value) in raw {
            map.insert(&key, &value.unwrap_or_default());
        }
        Ok(map)
    }

    /// Load a flat JSON object from a file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Insert or replace an entry. Lookup is case-insensitive, so the key
    /// is stored lowercased; the value is kept verbatim.
    pub fn insert(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_lowercase(), value.to_string());
        self.rebuild_tokens();
    }

    /// Absorb another map; its entries win on key collisions.
    pub fn merge(&mut self, other: ReplacementMap) {
        self.values.extend(other.values);
        self.rebuild_tokens();
    }

    /// Value for a key, case-insensitive.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.to_lowercase()).map(String::as_str)
    }

    /// Whether a token resolves to nothing: absent, or empty after
    /// trimming.
    pub fn is_blank(&self, key: &str) -> bool {
        self.get(key).map_or(true, |v| v.trim().is_empty())
    }

    /// All matchable tokens (lowercase), longest first. Always contains
    /// [`LOGO_TOKEN`].
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the map holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn rebuild_tokens(&mut self) {
        let mut tokens: Vec<String> = self
            .values
            .keys()
            .filter(|k| k.starts_with('<') && k.ends_with('>') && k.len() > 2)
            .cloned()
            .collect();
        if !tokens.iter().any(|t| t == LOGO_TOKEN) {
            tokens.push(LOGO_TOKEN.to_string());
        }
        tokens.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        self.tokens = tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let mut map = ReplacementMap::new();
        map.insert("<Company Name>", "Acme Pty Ltd");
        assert_eq!(map.get("<company name>"), Some("Acme Pty Ltd"));
        assert_eq!(map.get("<COMPANY NAME>"), Some("Acme Pty Ltd"));
        assert_eq!(map.get("<missing>"), None);
    }

    #[test]
    fn test_blank_detection() {
        let mut map = ReplacementMap::new();
        map.insert("<empty>", "");
        map.insert("<spaces>", "   ");
        map.insert("<filled>", "x");
        assert!(map.is_blank("<empty>"));
        assert!(map.is_blank("<spaces>"));
        assert!(map.is_blank("<absent>"));
        assert!(!map.is_blank("<filled>"));
    }

    #[test]
    fn test_tokens_longest_first_with_logo() {
        let mut map = ReplacementMap::new();
        map.insert("<name>", "a");
        map.insert("<name extended>", "b");
        map.insert("plain key", "inert");
        let tokens = map.tokens();
        assert_eq!(tokens[0], "<name extended>");
        assert!(tokens.contains(&LOGO_TOKEN.to_string()));
        assert!(!tokens.iter().any(|t| t == "plain key"));
        let name_pos = tokens.iter().position(|t| t == "<name>").unwrap();
        let ext_pos = tokens.iter().position(|t| t == "<name extended>").unwrap();
        assert!(ext_pos < name_pos);
    }

    #[test]
    fn test_from_json_with_nulls() {
        let map =
            ReplacementMap::from_json_str(r#"{"<company name>": "Acme", "<abn>": null}"#).unwrap();
        assert_eq!(map.get("<company name>"), Some("Acme"));
        assert_eq!(map.get("<abn>"), Some(""));
        assert!(map.is_blank("<abn>"));
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(ReplacementMap::from_json_str("[1, 2]").is_err());
    }

    #[test]
    fn test_empty_map_still_matches_logo() {
        let map = ReplacementMap::new();
        assert_eq!(map.tokens(), &[LOGO_TOKEN.to_string()]);
        assert!(map.is_blank(LOGO_TOKEN));
    }

    #[test]
    fn test_merge_later_entries_win() {
        let mut base = ReplacementMap::new();
        base.insert("<company name>", "Old Name");
        base.insert("<abn>", "123");
        let mut incoming = ReplacementMap::new();
        incoming.insert("<Company Name>", "New Name");
        incoming.insert("<phone>", "555");
        base.merge(incoming);
        assert_eq!(base.get("<company name>"), Some("New Name"));
        assert_eq!(base.get("<abn>"), Some("123"));
        assert_eq!(base.get("<phone>"), Some("555"));
        assert!(base.tokens().iter().any(|t| t == "<phone>"));
    }
}
