//! Manual code overrides
//!
//! A locked override replaces the generated code for one component (a
//! population id, or the measure id for the whole artifact) and is emitted
//! verbatim after its edit notes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::GenerationTarget;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditNote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub note: String,
}

impl EditNote {
    pub fn new(note: impl Into<String>) -> Self {
        Self {
            author: None,
            timestamp: None,
            note: note.into(),
        }
    }

    pub fn by(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeOverride {
    pub component_id: String,
    pub target: GenerationTarget,
    pub code: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub edit_notes: Vec<EditNote>,
}

impl CodeOverride {
    pub fn new(component_id: impl Into<String>, target: GenerationTarget, code: impl Into<String>) -> Self {
        Self {
            component_id: component_id.into(),
            target,
            code: code.into(),
            locked: false,
            edit_notes: Vec::new(),
        }
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    pub fn with_note(mut self, note: EditNote) -> Self {
        self.edit_notes.push(note);
        self
    }

    /// Edit notes rendered as line comments of the target language
    pub fn note_comments(&self) -> String {
        let prefix = self.target.comment_prefix();
        let mut out = format!("{prefix} Manual override for '{}' (locked, not regenerated)\n", self.component_id);
        if self.edit_notes.is_empty() {
            out.push_str(&format!("{prefix} No edit notes recorded\n"));
        }
        for note in &self.edit_notes {
            let mut header = String::new();
            if let Some(ts) = note.timestamp {
                header.push_str(&ts.format("%Y-%m-%d %H:%M UTC").to_string());
            }
            if let Some(author) = &note.author {
                if !header.is_empty() {
                    header.push(' ');
                }
                header.push_str(author);
            }
            for (index, line) in note.note.lines().enumerate() {
                if index == 0 && !header.is_empty() {
                    out.push_str(&format!("{prefix} [{header}] {line}\n"));
                } else {
                    out.push_str(&format!("{prefix} {line}\n"));
                }
            }
        }
        out
    }
}

/// Overrides keyed by component id and target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideSet {
    overrides: Vec<CodeOverride>,
}

impl OverrideSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an override, replacing any existing one for the same component and target
    pub fn insert(&mut self, code_override: CodeOverride) {
        self.overrides
            .retain(|o| !(o.component_id == code_override.component_id && o.target == code_override.target));
        self.overrides.push(code_override);
    }

    pub fn with(mut self, code_override: CodeOverride) -> Self {
        self.insert(code_override);
        self
    }

    pub fn get(&self, component_id: &str, target: GenerationTarget) -> Option<&CodeOverride> {
        self.overrides
            .iter()
            .find(|o| o.component_id == component_id && o.target == target)
    }

    /// The override to emit verbatim, if one is locked
    pub fn locked(&self, component_id: &str, target: GenerationTarget) -> Option<&CodeOverride> {
        self.get(component_id, target).filter(|o| o.locked)
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}
