// Single-pass configuration inspection for executor validation
//
// Executors read their keys through a ConfigInspector, which records every
// missing or mistyped value instead of stopping at the first one.

use serde_json::Value;

use crate::errors::ValidationError;
use crate::models::{ConfigMap, MigrationConfig, ValidationResult};

/// Which half of a MigrationConfig a key lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Source,
    Destination,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Source => "source",
            Section::Destination => "destination",
        }
    }
}

/// Collects configuration problems for one validation pass
#[derive(Debug)]
pub struct ConfigInspector<'a> {
    config: &'a MigrationConfig,
    errors: Vec<ValidationError>,
    warnings: Vec<String>,
}

impl<'a> ConfigInspector<'a> {
    pub fn new(config: &'a MigrationConfig) -> Self {
        Self {
            config,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn map(&self, section: Section) -> &'a ConfigMap {
        match section {
            Section::Source => &self.config.source,
            Section::Destination => &self.config.destination,
        }
    }

    fn field(section: Section, key: &str) -> String {
        format!("{}.{}", section.as_str(), key)
    }

    /// Present, non-null value for `key`, if any
    fn value(&self, section: Section, key: &str) -> Option<&'a Value> {
        self.map(section).get(key).filter(|v| !v.is_null())
    }

    fn required(&mut self, section: Section, key: &str) -> Option<&'a Value> {
        let value = self.value(section, key);
        if value.is_none() {
            self.errors
                .push(ValidationError::MissingField(Self::field(section, key)));
        }
        value
    }

    fn mistyped(&mut self, section: Section, key: &str, expected: &str) {
        self.errors.push(ValidationError::invalid(
            Self::field(section, key),
            format!("expected {}", expected),
        ));
    }

    fn string_value(&mut self, section: Section, key: &str, value: &'a Value) -> Option<&'a str> {
        match value.as_str() {
            Some(s) if s.trim().is_empty() => {
                self.errors.push(ValidationError::invalid(
                    Self::field(section, key),
                    "must not be empty",
                ));
                None
            }
            Some(s) => Some(s),
            None => {
                self.mistyped(section, key, "a string");
                None
            }
        }
    }

    /// Required non-empty string
    pub fn require_str(&mut self, section: Section, key: &str) -> Option<&'a str> {
        let value = self.required(section, key)?;
        self.string_value(section, key, value)
    }

    /// Optional non-empty string; absent or null yields None without an error
    pub fn optional_str(&mut self, section: Section, key: &str) -> Option<&'a str> {
        let value = self.value(section, key)?;
        self.string_value(section, key, value)
    }

    /// Required unsigned integer
    pub fn require_u64(&mut self, section: Section, key: &str) -> Option<u64> {
        let value = self.required(section, key)?;
        let parsed = value.as_u64();
        if parsed.is_none() {
            self.mistyped(section, key, "a non-negative integer");
        }
        parsed
    }

    /// Optional unsigned integer
    pub fn optional_u64(&mut self, section: Section, key: &str) -> Option<u64> {
        let value = self.value(section, key)?;
        let parsed = value.as_u64();
        if parsed.is_none() {
            self.mistyped(section, key, "a non-negative integer");
        }
        parsed
    }

    /// Optional boolean
    pub fn optional_bool(&mut self, section: Section, key: &str) -> Option<bool> {
        let value = self.value(section, key)?;
        let parsed = value.as_bool();
        if parsed.is_none() {
            self.mistyped(section, key, "a boolean");
        }
        parsed
    }

    /// Optional nested object
    pub fn optional_object(&mut self, section: Section, key: &str) -> Option<&'a ConfigMap> {
        let value = self.value(section, key)?;
        let parsed = value.as_object();
        if parsed.is_none() {
            self.mistyped(section, key, "an object");
        }
        parsed
    }

    /// Required ordered list
    pub fn require_array(&mut self, section: Section, key: &str) -> Option<&'a Vec<Value>> {
        let value = self.required(section, key)?;
        let parsed = value.as_array();
        if parsed.is_none() {
            self.mistyped(section, key, "a list");
        }
        parsed
    }

    /// Record a problem found by executor-specific checks
    pub fn error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Record an advisory, non-blocking note
    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn finish(self) -> ValidationResult {
        ValidationResult::from_parts(
            self.errors.iter().map(ToString::to_string).collect(),
            self.warnings,
        )
    }
}
