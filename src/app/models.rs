use serde::{Deserialize, Serialize};

/// The persisted document: ordered package-name lists, nothing else.
/// Wire names match the original on-disk format, so existing documents
/// keep working. `longTermPackages` may be absent, `null` or a list;
/// absent/`null` read the same as an empty list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MainFile {
    pub packages: Vec<String>,
    #[serde(
        rename = "longTermPackages",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub long_term_packages: Option<Vec<String>>,
}

impl MainFile {
    pub fn empty() -> Self {
        Self {
            packages: Vec::new(),
            long_term_packages: None,
        }
    }

    pub fn list(&self, list_type: ListType) -> &[String] {
        match list_type {
            ListType::Main => &self.packages,
            ListType::LongTerm => self
                .long_term_packages
                .as_deref()
                .unwrap_or(&[]),
        }
    }

    pub fn list_mut(&mut self, list_type: ListType) -> &mut Vec<String> {
        match list_type {
            ListType::Main => &mut self.packages,
            ListType::LongTerm => self.long_term_packages.get_or_insert_with(Vec::new),
        }
    }
}

/// Which of the two independently ordered lists an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListType {
    Main,
    LongTerm,
}

/// A tracked package joined with its live device state. Only the package
/// name is ever persisted; label and flags are re-read on every use.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AppEntry {
    pub label: String,
    pub package_name: String,
    pub is_enabled: bool,
    pub is_installed: bool,
}

impl AppEntry {
    pub fn missing(package_name: &str) -> Self {
        Self {
            label: "Unknown app".to_string(),
            package_name: package_name.to_string(),
            is_enabled: false,
            is_installed: false,
        }
    }
}
