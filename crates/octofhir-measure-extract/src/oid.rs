//! Value set OID validation

use async_trait::async_trait;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Root of the VSAC/HL7 OID arc
pub const VSAC_OID_ROOT: &str = "2.16.840.1.113883.";

static OID_SYNTAX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[0-2](\.(0|[1-9][0-9]*))+$").ok());

/// Outcome of validating one OID
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OidValidation {
    pub valid: bool,
    /// Whether the OID was found in a catalog; `None` when no catalog was consulted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_match: Option<bool>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl OidValidation {
    pub fn valid() -> Self {
        Self {
            valid: true,
            ..Self::default()
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            errors: vec![error.into()],
            ..Self::default()
        }
    }
}

/// Validator collaborator consulted for every extracted value set OID
#[async_trait]
pub trait OidValidator: Send + Sync {
    async fn validate(&self, oid: &str, name: Option<&str>) -> Result<OidValidation, OidValidatorError>;
}

#[derive(Debug, thiserror::Error)]
pub enum OidValidatorError {
    #[error("OID catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Offline validator: OID syntax, the VSAC root, and an optional catalog of
/// known OID to name entries
#[derive(Debug, Clone, Default)]
pub struct CatalogOidValidator {
    catalog: IndexMap<String, String>,
}

impl CatalogOidValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, oid: impl Into<String>, name: impl Into<String>) -> Self {
        self.catalog.insert(oid.into(), name.into());
        self
    }

    pub fn with_entries<I, K, V>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.catalog
            .extend(entries.into_iter().map(|(oid, name)| (oid.into(), name.into())));
        self
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// Synchronous check shared by the trait impl
    pub fn check(&self, oid: &str, name: Option<&str>) -> OidValidation {
        let oid = oid.trim();
        if oid.is_empty() {
            return OidValidation::invalid("OID is empty");
        }
        let well_formed = OID_SYNTAX.as_ref().is_some_and(|re| re.is_match(oid));
        if !well_formed {
            return OidValidation::invalid(format!("'{oid}' is not a dotted-numeric OID"));
        }

        let mut result = OidValidation::valid();
        if !oid.starts_with(VSAC_OID_ROOT) {
            result
                .warnings
                .push(format!("'{oid}' is outside the VSAC root {}", VSAC_OID_ROOT.trim_end_matches('.')));
        }

        if self.catalog.is_empty() {
            return result;
        }
        match self.catalog.get(oid) {
            Some(known) => {
                result.catalog_match = Some(true);
                if let Some(name) = name.filter(|n| !names_agree(n, known)) {
                    result
                        .warnings
                        .push(format!("'{oid}' is catalogued as \"{known}\", not \"{name}\""));
                }
            }
            None => {
                result.catalog_match = Some(false);
                result.warnings.push(format!("'{oid}' is not in the value set catalog"));
            }
        }
        result
    }
}

#[async_trait]
impl OidValidator for CatalogOidValidator {
    async fn validate(&self, oid: &str, name: Option<&str>) -> Result<OidValidation, OidValidatorError> {
        Ok(self.check(oid, name))
    }
}

/// Names agree when one normalized form contains the other
fn names_agree(a: &str, b: &str) -> bool {
    let (a, b) = (normalize_name(a), normalize_name(b));
    !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a))
}

fn normalize_name(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
