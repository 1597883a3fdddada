//! Schema mapping domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The two systems a run talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemId {
    /// Row-oriented database being migrated from
    Source,
    /// Warehouse being migrated to
    Target,
}

impl SystemId {
    /// Whether queries sent to this system go through schema rewriting
    pub fn requires_translation(&self) -> bool {
        matches!(self, SystemId::Target)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SystemId::Source => "source",
            SystemId::Target => "target",
        }
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source-schema identifier to target-schema identifier
///
/// Keys are matched case-insensitively; they are stored upper-cased.
/// Loaded once per run and never mutated while the run executes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct SchemaMapping {
    entries: BTreeMap<String, String>,
}

impl SchemaMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Looks up the target identifier for a source identifier, ignoring case
    pub fn get(&self, source: &str) -> Option<&str> {
        self.entries
            .get(&source.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// Keys ordered longest first, ties broken alphabetically
    pub fn keys_longest_first(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<BTreeMap<String, String>> for SchemaMapping {
    fn from(raw: BTreeMap<String, String>) -> Self {
        let entries = raw
            .into_iter()
            .filter(|(k, v)| !k.trim().is_empty() && !v.trim().is_empty())
            .map(|(k, v)| (k.trim().to_ascii_uppercase(), v.trim().to_string()))
            .collect();
        Self { entries }
    }
}

impl From<SchemaMapping> for BTreeMap<String, String> {
    fn from(mapping: SchemaMapping) -> Self {
        mapping.entries
    }
}

impl<const N: usize> From<[(&str, &str); N]> for SchemaMapping {
    fn from(pairs: [(&str, &str); N]) -> Self {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>()
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mapping = SchemaMapping::from([("sample_dim", "DIM")]);
        assert_eq!(mapping.get("SAMPLE_DIM"), Some("DIM"));
        assert_eq!(mapping.get("Sample_Dim"), Some("DIM"));
        assert_eq!(mapping.get("SAMPLE"), None);
    }

    #[test]
    fn test_keys_longest_first() {
        let mapping = SchemaMapping::from([("A", "X"), ("SAMPLE_DIM", "DIM"), ("SAMPLE", "S")]);
        assert_eq!(mapping.keys_longest_first(), vec!["SAMPLE_DIM", "SAMPLE", "A"]);
    }

    #[test]
    fn test_deserialize_drops_blank_entries() {
        let mapping: SchemaMapping =
            serde_json::from_str(r#"{"SAMPLE_FACT": "FACT", " ": "X", "Y": ""}"#).unwrap();
        assert_eq!(mapping.len(), 1);
        assert!(SystemId::Target.requires_translation());
        assert!(!SystemId::Source.requires_translation());
    }
}
