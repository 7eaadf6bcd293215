//! Language registry
//!
//! Fixed mapping from language tag to container image and harness contract,
//! loaded from the embedded `files/languages.toml`. The registry is built
//! once and passed explicitly to the sandbox manager; there is no global.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::types::Language;

/// Per-language registry entry
#[derive(Debug, Clone, Deserialize)]
pub struct LanguageSpec {
    /// Container image tag
    pub image: String,
    /// File name the user source is uploaded under
    pub source_file: String,
    /// Harness executable on the image's PATH
    pub harness: String,
    /// Accepted standard tags
    pub standards: Vec<String>,
    /// Standard applied when a submission names none
    pub default_standard: String,
    /// Human-readable name for the languages listing
    pub description: String,
}

/// Registry of supported languages
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    entries: HashMap<String, LanguageSpec>,
}

impl LanguageRegistry {
    /// Build the registry from the embedded configuration file
    pub fn builtin() -> Result<Self> {
        Self::from_toml(include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/files/languages.toml"
        )))
    }

    /// Parse a registry from TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        let entries: HashMap<String, LanguageSpec> =
            toml::from_str(content).context("failed to parse language registry")?;
        Ok(Self { entries })
    }

    /// Look up the registry entry for a language
    pub fn get(&self, language: Language) -> Result<&LanguageSpec> {
        self.entries
            .get(&language.to_string())
            .with_context(|| format!("no registry entry for language {}", language))
    }

    /// All registered language tags
    pub fn languages(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_covers_both_languages() {
        let registry = LanguageRegistry::builtin().unwrap();
        let c = registry.get(Language::C).unwrap();
        let cpp = registry.get(Language::Cpp).unwrap();
        assert_eq!(c.source_file, "user.c");
        assert_eq!(cpp.source_file, "user.cpp");
        assert_eq!(c.default_standard, "c99");
        assert_eq!(cpp.default_standard, "cpp17");
        assert!(c.standards.contains(&"c11".to_string()));
        assert!(cpp.standards.contains(&"cpp20".to_string()));
    }

    #[test]
    fn test_languages_listing_is_sorted() {
        let registry = LanguageRegistry::builtin().unwrap();
        assert_eq!(registry.languages(), vec!["c", "cpp"]);
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(LanguageRegistry::from_toml("not = [valid").is_err());
    }
}
