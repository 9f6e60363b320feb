use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// A marketplace listing category (e.g. `"Class B"`) and the numeric code the
/// search endpoint pairs with it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub code: String,
}

impl Category {
    #[must_use]
    pub fn new(name: &str, code: &str) -> Self {
        Self {
            name: name.to_owned(),
            code: code.to_owned(),
        }
    }

    /// Value of the `type` query parameter: `"<name>|<code>"`.
    #[must_use]
    pub fn query_value(&self) -> String {
        format!("{}|{}", self.name, self.code)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Deserialize)]
pub struct CategoriesFile {
    pub categories: Vec<Category>,
}

impl CategoriesFile {
    /// Looks up a category by name, ignoring ASCII case.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Category> {
        self.categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
    }
}

/// Load and validate the category table from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_categories(path: &Path) -> Result<CategoriesFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::CategoriesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_categories(&content)
}

/// Parse and validate a category table from YAML text.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_categories(content: &str) -> Result<CategoriesFile, ConfigError> {
    let file: CategoriesFile = serde_yaml::from_str(content)?;
    validate_categories(&file)?;
    Ok(file)
}

fn validate_categories(file: &CategoriesFile) -> Result<(), ConfigError> {
    if file.categories.is_empty() {
        return Err(ConfigError::Validation(
            "at least one category must be configured".to_string(),
        ));
    }

    let mut seen_names = HashSet::new();
    let mut seen_codes = HashSet::new();

    for category in &file.categories {
        if category.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "category name must be non-empty".to_string(),
            ));
        }

        if category.name.contains('|') {
            return Err(ConfigError::Validation(format!(
                "category '{}' must not contain '|'",
                category.name
            )));
        }

        if category.code.is_empty() || !category.code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::Validation(format!(
                "category '{}' has non-numeric code '{}'",
                category.name, category.code
            )));
        }

        if !seen_names.insert(category.name.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate category name: '{}'",
                category.name
            )));
        }

        if !seen_codes.insert(category.code.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate category code: '{}' (from category '{}')",
                category.code, category.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_value_joins_name_and_code() {
        let category = Category::new("Class B", "198068");
        assert_eq!(category.query_value(), "Class B|198068");
    }

    #[test]
    fn parse_categories_accepts_valid_table() {
        let yaml = "categories:\n  - name: Class A\n    code: \"198066\"\n  - name: Class B\n    code: \"198068\"\n";
        let file = parse_categories(yaml).unwrap();
        assert_eq!(file.categories.len(), 2);
        assert_eq!(file.find("class b").map(|c| c.code.as_str()), Some("198068"));
        assert!(file.find("Class Z").is_none());
    }

    #[test]
    fn parse_categories_rejects_duplicate_names() {
        let yaml = "categories:\n  - name: Class A\n    code: \"1\"\n  - name: class a\n    code: \"2\"\n";
        let err = parse_categories(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("duplicate category name")));
    }

    #[test]
    fn parse_categories_rejects_duplicate_codes() {
        let yaml = "categories:\n  - name: Class A\n    code: \"1\"\n  - name: Class B\n    code: \"1\"\n";
        let err = parse_categories(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("duplicate category code")));
    }

    #[test]
    fn parse_categories_rejects_non_numeric_code() {
        let yaml = "categories:\n  - name: Class A\n    code: \"abc\"\n";
        let err = parse_categories(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("non-numeric")));
    }

    #[test]
    fn parse_categories_rejects_empty_table() {
        let err = parse_categories("categories: []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn parse_categories_reports_yaml_errors() {
        let err = parse_categories("categories: [").unwrap_err();
        assert!(matches!(err, ConfigError::CategoriesFileParse(_)));
    }

    #[test]
    fn bundled_categories_file_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/categories.yaml");
        let file = load_categories(&path).unwrap();
        assert_eq!(file.categories.len(), 11);
        assert_eq!(file.find("Class B").map(|c| c.code.as_str()), Some("198068"));
    }
}
