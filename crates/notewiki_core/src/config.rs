use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DOC_EXTENSION: &str = "md";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct NoteConfig {
    #[serde(default)]
    pub notes: NotesSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct NotesSection {
    pub extension: Option<String>,
}

impl NoteConfig {
    /// Resolve the document extension: env NOTEWIKI_DOC_EXTENSION > config >
    /// DEFAULT_DOC_EXTENSION. A leading dot in any source is tolerated.
    pub fn doc_extension(&self) -> String {
        if let Ok(value) = env::var("NOTEWIKI_DOC_EXTENSION") {
            let trimmed = value.trim().trim_start_matches('.').to_string();
            if !trimmed.is_empty() {
                return trimmed;
            }
        }
        self.notes
            .extension
            .as_deref()
            .map(|extension| extension.trim().trim_start_matches('.'))
            .filter(|extension| !extension.is_empty())
            .unwrap_or(DEFAULT_DOC_EXTENSION)
            .to_string()
    }
}

/// Load and parse a NoteConfig from a TOML file. Returns defaults if the
/// file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<NoteConfig> {
    if !config_path.exists() {
        return Ok(NoteConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: NoteConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_uses_markdown_extension() {
        let config = NoteConfig::default();
        assert_eq!(config.doc_extension(), "md");
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert!(config.notes.extension.is_none());
    }

    #[test]
    fn load_config_parses_notes_section() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[notes]\nextension = \"markdown\"\n").expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.doc_extension(), "markdown");
    }

    #[test]
    fn doc_extension_strips_a_leading_dot() {
        let config = NoteConfig {
            notes: NotesSection {
                extension: Some(".md".to_string()),
            },
        };
        assert_eq!(config.doc_extension(), "md");
    }

    #[test]
    fn load_config_tolerates_partial_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[other]\nkey = \"value\"\n").expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.doc_extension(), "md");
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[notes\nextension = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }
}
