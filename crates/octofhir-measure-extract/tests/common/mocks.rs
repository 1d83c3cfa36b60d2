//! Mock implementations for testing
//!
//! Provides a scripted oracle that answers by matching request text against
//! configured rules, and an OID validator with a fixed set of failures.

use async_trait::async_trait;
use octofhir_measure_extract::{
    CompletionRequest, OidValidation, OidValidator, OidValidatorError, Oracle, OracleError,
};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

struct Rule {
    needles: Vec<String>,
    response: Result<String, String>,
}

/// Oracle that answers with the first rule whose needles all occur in the request
pub struct ScriptedOracle {
    rules: Arc<RwLock<Vec<Rule>>>,
    requests: Arc<RwLock<Vec<CompletionRequest>>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            rules: Arc::new(RwLock::new(Vec::new())),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Respond with `response` when every needle occurs in the system prompt or user text
    pub fn when(self, needles: &[&str], response: impl Into<String>) -> Self {
        self.rules.write().push(Rule {
            needles: needles.iter().map(|n| n.to_string()).collect(),
            response: Ok(response.into()),
        });
        self
    }

    /// Fail with an unavailable error when every needle matches
    pub fn fail_when(self, needles: &[&str], message: impl Into<String>) -> Self {
        self.rules.write().push(Rule {
            needles: needles.iter().map(|n| n.to_string()).collect(),
            response: Err(message.into()),
        });
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.read().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.read().len()
    }
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, OracleError> {
        self.requests.write().push(request.clone());
        let haystack = format!("{}\n{}", request.system_prompt, request.user_text());
        let rules = self.rules.read();
        let rule = rules
            .iter()
            .find(|rule| rule.needles.iter().all(|needle| haystack.contains(needle.as_str())));
        match rule {
            Some(Rule { response: Ok(text), .. }) => Ok(text.clone()),
            Some(Rule { response: Err(message), .. }) => Err(OracleError::Unavailable(message.clone())),
            None => Err(OracleError::InvalidResponse("no scripted response".to_string())),
        }
    }

    fn name(&self) -> &str {
        "scripted-oracle"
    }
}

/// OID validator rejecting a configured set of OIDs
pub struct MockOidValidator {
    invalid: Arc<RwLock<HashSet<String>>>,
    seen: Arc<RwLock<Vec<String>>>,
}

impl MockOidValidator {
    pub fn new() -> Self {
        Self {
            invalid: Arc::new(RwLock::new(HashSet::new())),
            seen: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn reject(&self, oid: impl Into<String>) {
        self.invalid.write().insert(oid.into());
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.read().clone()
    }
}

impl Default for MockOidValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OidValidator for MockOidValidator {
    async fn validate(&self, oid: &str, _name: Option<&str>) -> Result<OidValidation, OidValidatorError> {
        self.seen.write().push(oid.to_string());
        if self.invalid.read().contains(oid) {
            Ok(OidValidation::invalid(format!("{oid} is not in VSAC")))
        } else {
            Ok(OidValidation::valid())
        }
    }
}
