use super::diff::build_diff;
use crate::error::WorkflowError;
use crate::tools::StagedFile;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeKind {
    #[default]
    Modify,
    Create,
    Delete,
}

/// An unapplied, proposed file modification.
///
/// Serializes to the tool-result wire shape: `file`, `original`, `modified`,
/// `diff`, `description`, `change_kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChange {
    #[serde(rename = "file")]
    pub target_path: String,
    #[serde(rename = "original", default)]
    pub original_content: String,
    #[serde(rename = "modified", default)]
    pub new_content: String,
    pub diff: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub change_kind: ChangeKind,
}

impl PendingChange {
    /// Parse a tool payload that carries a `diff` key.
    pub fn from_payload(value: &Value) -> Result<Self, WorkflowError> {
        let change: Self = serde_json::from_value(value.clone())
            .map_err(|e| WorkflowError::MalformedChange(e.to_string()))?;
        if change.target_path.trim().is_empty() {
            return Err(WorkflowError::MalformedChange("empty file path".into()));
        }
        Ok(change)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// A modification whose before and after are the same text.
    pub fn is_noop(&self) -> bool {
        self.change_kind == ChangeKind::Modify && self.diff.is_empty()
    }
}

/// What [`Plan::add`] did with a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanUpdate {
    Added,
    Merged,
    /// The change (or its merge with an earlier one) has no net effect.
    Dropped,
}

/// Ordered collection of pending changes, one entry per target file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    changes: Vec<PendingChange>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PendingChange> {
        self.changes.iter()
    }

    pub fn changes(&self) -> &[PendingChange] {
        &self.changes
    }

    /// Empty the plan, returning how many entries were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.changes.len();
        self.changes.clear();
        discarded
    }

    /// Hand the whole plan over, leaving it empty.
    pub fn take(&mut self) -> Vec<PendingChange> {
        std::mem::take(&mut self.changes)
    }

    /// Add a change, merging with an existing entry for the same file.
    ///
    /// A merged entry keeps its position and its first original content,
    /// takes the newest content, and joins descriptions with `"; "`.
    pub fn add(&mut self, change: PendingChange) -> PlanUpdate {
        let Some(index) = self
            .changes
            .iter()
            .position(|existing| existing.target_path == change.target_path)
        else {
            if change.is_noop() {
                return PlanUpdate::Dropped;
            }
            self.changes.push(change);
            return PlanUpdate::Added;
        };

        let kind = match (self.changes[index].change_kind, change.change_kind) {
            (ChangeKind::Create, ChangeKind::Delete) => {
                self.changes.remove(index);
                return PlanUpdate::Dropped;
            }
            (ChangeKind::Create, _) => ChangeKind::Create,
            (_, ChangeKind::Delete) => ChangeKind::Delete,
            (ChangeKind::Modify | ChangeKind::Delete, _) => ChangeKind::Modify,
        };

        let existing = &self.changes[index];
        let original_content = existing.original_content.clone();
        let new_content = if kind == ChangeKind::Delete {
            String::new()
        } else {
            change.new_content
        };
        let description = match (existing.description.is_empty(), change.description.is_empty())
        {
            (_, true) => existing.description.clone(),
            (true, false) => change.description,
            (false, false) => format!("{}; {}", existing.description, change.description),
        };
        let diff = build_diff(&original_content, &new_content, &change.target_path);

        let merged = PendingChange {
            target_path: change.target_path,
            original_content,
            new_content,
            diff,
            description,
            change_kind: kind,
        };
        if merged.is_noop() {
            self.changes.remove(index);
            return PlanUpdate::Dropped;
        }
        self.changes[index] = merged;
        PlanUpdate::Merged
    }

    /// Planned file contents keyed by repo-relative path, for tools that must
    /// build on earlier proposals.
    pub fn staged_files(&self) -> HashMap<String, StagedFile> {
        self.changes
            .iter()
            .map(|change| {
                let staged = match change.change_kind {
                    ChangeKind::Delete => StagedFile::Deleted,
                    ChangeKind::Modify | ChangeKind::Create => {
                        StagedFile::Content(change.new_content.clone())
                    }
                };
                (change.target_path.clone(), staged)
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a PendingChange;
    type IntoIter = std::slice::Iter<'a, PendingChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}
