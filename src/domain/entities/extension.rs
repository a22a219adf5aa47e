//! Extension identity, load state and the per-server extension record

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("extension name pattern is valid"));

/// Check a name against the extension/command naming rules.
///
/// Names are letters, digits, underscores and hyphens, and never start with
/// a period (which also keeps them from escaping the extensions directory).
pub fn is_valid_name(name: &str) -> bool {
    !name.starts_with('.') && NAME_PATTERN.is_match(name)
}

/// Whether an extension is currently instantiated in this process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionState {
    Unloaded,
    Loaded,
}

impl ExtensionState {
    pub fn as_str(&self) -> &str {
        match self {
            ExtensionState::Unloaded => "unloaded",
            ExtensionState::Loaded => "loaded",
        }
    }
}

impl fmt::Display for ExtensionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted per-server record: the ordered set of extensions a server opted into.
///
/// The base extension is implicit and never stored here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    #[serde(default)]
    extensions: Vec<String>,
}

impl ServerRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.extensions.iter().any(|n| n == name)
    }

    /// Append `name`, returning `false` if it was already present
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.extensions.push(name);
        true
    }

    /// Remove `name`, returning `false` if it was not present
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.extensions.len();
        self.extensions.retain(|n| n != name);
        self.extensions.len() != before
    }

    pub fn names(&self) -> &[String] {
        &self.extensions
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ServerRecord {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut record = ServerRecord::new();
        for name in iter {
            record.insert(name);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_rules() {
        assert!(is_valid_name("weather"));
        assert!(is_valid_name("role_manager-2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name(".hidden"));
        assert!(!is_valid_name("../etc"));
        assert!(!is_valid_name("two words"));
    }

    #[test]
    fn test_record_keeps_order_and_rejects_duplicates() {
        let mut record = ServerRecord::new();
        assert!(record.insert("weather"));
        assert!(record.insert("time"));
        assert!(!record.insert("weather"));
        assert_eq!(record.names(), ["weather", "time"]);

        assert!(record.remove("weather"));
        assert!(!record.remove("weather"));
        assert_eq!(record.names(), ["time"]);
    }

    #[test]
    fn test_record_json_shape() {
        let record: ServerRecord = ["weather"].into_iter().collect();
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"extensions":["weather"]}"#);

        let empty: ServerRecord = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }
}
