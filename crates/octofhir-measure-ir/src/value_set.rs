//! Value set references

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::Confidence;

/// Base URL for VSAC value set canonicals
pub const VSAC_VALUE_SET_BASE: &str = "http://cts.nlm.nih.gov/fhir/ValueSet/";

/// A single code inside a value set
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueSetCode {
    pub code: String,
    pub system: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl ValueSetCode {
    pub fn new(code: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            system: system.into(),
            display: None,
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }
}

/// A named, optionally OID-identified collection of codes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSetReference {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub codes: Vec<ValueSetCode>,
    #[serde(default)]
    pub confidence: Confidence,
}

impl ValueSetReference {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            oid: None,
            url: None,
            codes: Vec::new(),
            confidence: Confidence::default(),
        }
    }

    pub fn with_oid(mut self, oid: impl Into<String>) -> Self {
        self.oid = Some(oid.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_code(mut self, code: ValueSetCode) -> Self {
        self.codes.push(code);
        self
    }

    /// Trimmed OID, if a non-blank one is present
    pub fn oid(&self) -> Option<&str> {
        self.oid.as_deref().map(str::trim).filter(|oid| !oid.is_empty())
    }

    /// Deduplication key: the OID when present, else the lower-cased trimmed name
    pub fn dedup_key(&self) -> String {
        match self.oid() {
            Some(oid) => oid.to_string(),
            None => self.name.trim().to_lowercase(),
        }
    }

    /// Canonical URL: the explicit url, else one built from the OID
    pub fn canonical_url(&self) -> Option<String> {
        if let Some(url) = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            return Some(url.to_string());
        }
        self.oid().map(|oid| format!("{VSAC_VALUE_SET_BASE}{oid}"))
    }

    /// A value set with no codes and no way to resolve them
    pub fn is_placeholder(&self) -> bool {
        self.codes.is_empty() && self.canonical_url().is_none()
    }

    /// Append codes from `other` that are not already present, keyed by (code, system)
    pub fn merge_codes(&mut self, other: &ValueSetReference) {
        for code in &other.codes {
            let exists = self
                .codes
                .iter()
                .any(|c| c.code == code.code && c.system == code.system);
            if !exists {
                self.codes.push(code.clone());
            }
        }
        if self.oid().is_none() {
            self.oid = other.oid.clone();
        }
        if self.url.is_none() {
            self.url = other.url.clone();
        }
    }
}

/// Deduplicate value sets by [`ValueSetReference::dedup_key`], merging codes in
/// first-seen order
pub fn dedupe_value_sets<I>(value_sets: I) -> Vec<ValueSetReference>
where
    I: IntoIterator<Item = ValueSetReference>,
{
    let mut by_key: IndexMap<String, ValueSetReference> = IndexMap::new();
    for vs in value_sets {
        match by_key.get_mut(&vs.dedup_key()) {
            Some(existing) => existing.merge_codes(&vs),
            None => {
                by_key.insert(vs.dedup_key(), vs);
            }
        }
    }
    by_key.into_values().collect()
}
