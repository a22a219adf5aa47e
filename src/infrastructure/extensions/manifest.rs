//! Source unit definition (`<extensions-dir>/<name>.yaml`)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What an extension's source text declares
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SourceUnit {
    /// Description of the extension's command
    pub description: Option<String>,

    /// Usage line shown in help
    pub usage: Option<String>,

    /// Reply template for a scripted extension
    pub reply: Option<String>,

    /// Shared library implementing a native extension
    pub library: Option<PathBuf>,
}

/// How a source unit is instantiated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind<'a> {
    Script(&'a str),
    Library(&'a Path),
}

impl SourceUnit {
    pub fn parse(text: &str) -> Result<Self, String> {
        if text.trim().is_empty() {
            return Err("source is empty".to_string());
        }

        let unit: SourceUnit = serde_yaml::from_str(text)
            .map_err(|e| format!("Failed to parse source: {}", e))?;
        unit.kind()?;
        Ok(unit)
    }

    pub fn kind(&self) -> Result<UnitKind<'_>, String> {
        match (&self.reply, &self.library) {
            (Some(reply), None) => Ok(UnitKind::Script(reply)),
            (None, Some(library)) => Ok(UnitKind::Library(library)),
            (Some(_), Some(_)) => Err("set either `reply` or `library`, not both".to_string()),
            (None, None) => Err("missing `reply` or `library`".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script_unit() {
        let unit = SourceUnit::parse("description: Show the weather\nreply: Sunny in {args}\n").unwrap();
        assert_eq!(unit.kind().unwrap(), UnitKind::Script("Sunny in {args}"));
        assert_eq!(unit.description.as_deref(), Some("Show the weather"));
    }

    #[test]
    fn test_parse_library_unit() {
        let unit = SourceUnit::parse("library: libweather.so").unwrap();
        assert_eq!(unit.kind().unwrap(), UnitKind::Library(Path::new("libweather.so")));
    }

    #[test]
    fn test_rejects_bad_units() {
        assert!(SourceUnit::parse("   \n").is_err());
        assert!(SourceUnit::parse("description: nothing to run").is_err());
        assert!(SourceUnit::parse("reply: a\nlibrary: b.so").is_err());
        assert!(SourceUnit::parse("reply: a\nunknown: 1").is_err());
        assert!(SourceUnit::parse("print('hello')").is_err());
    }
}
