// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`JobSnapshot`] is the slice of caller-owned job state the orchestrator
//! reads and writes. Ownership of the rest of the record stays with the
//! caller; the orchestrator only ever touches the fields named here, and
//! only through `JobStore::upsert`'s merge-by-latest-read.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LetterTone {
    Formal,
    Direct,
    Personal,
}

crate::simple_display! {
    LetterTone {
        Formal => "formal",
        Direct => "direct",
        Personal => "personal",
    }
}

/// Returned by [`LetterTone`]'s `FromStr` impl when the string isn't one
/// of the known tones.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown letter tone: {0}")]
pub struct ParseLetterToneError(String);

impl std::str::FromStr for LetterTone {
    type Err = ParseLetterToneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "formal" => Ok(LetterTone::Formal),
            "direct" => Ok(LetterTone::Direct),
            "personal" => Ok(LetterTone::Personal),
            other => Err(ParseLetterToneError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub issue_description: String,
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
    #[serde(default)]
    pub follow_up_answers: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,

    #[serde(default)]
    pub research_status: Option<JobStatus>,
    #[serde(default)]
    pub research_content: Option<String>,
    #[serde(default)]
    pub research_response_id: Option<String>,

    #[serde(default)]
    pub letter_status: Option<JobStatus>,
    #[serde(default)]
    pub letter_tone: Option<LetterTone>,
    #[serde(default)]
    pub letter_content: Option<String>,
    #[serde(default)]
    pub letter_references: Vec<String>,
    #[serde(default)]
    pub letter_response_id: Option<String>,
    #[serde(default)]
    pub letter_json: Option<serde_json::Value>,
}

impl JobSnapshot {
    /// Precondition for starting a letter run (preconditions).
    pub fn has_research_for_letter(&self) -> bool {
        matches!(self.research_status, Some(JobStatus::Completed))
        && self.research_content.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Merge `patch` onto `self` in place. Only the orchestrator-owned
    /// fields named on [`JobSnapshotPatch`] are touched; every other field
    /// on this snapshot is left exactly as the caller last wrote it. This is
    /// the merge `JobStore::upsert` must apply against a freshly-read
    /// snapshot so a concurrent caller edit is never clobbered.
    pub fn apply_patch(&mut self, patch: JobSnapshotPatch) {
        if let Some(v) = patch.research_status {
            self.research_status = Some(v);
        }
        if let Some(v) = patch.research_content {
            self.research_content = Some(v);
        }
        if let Some(v) = patch.research_response_id {
            self.research_response_id = Some(v);
        }
        if let Some(v) = patch.letter_status {
            self.letter_status = Some(v);
        }
        if let Some(v) = patch.letter_content {
            self.letter_content = Some(v);
        }
        if let Some(v) = patch.letter_references {
            self.letter_references = v;
        }
        if let Some(v) = patch.letter_response_id {
            self.letter_response_id = Some(v);
        }
        if let Some(v) = patch.letter_json {
            self.letter_json = Some(v);
        }
    }
}

/// A sparse patch applied to a [`JobSnapshot`] by `JobStore::upsert`. Only
/// `Some` fields are merged; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct JobSnapshotPatch {
    pub research_status: Option<JobStatus>,
    pub research_content: Option<String>,
    pub research_response_id: Option<String>,
    pub letter_status: Option<JobStatus>,
    pub letter_content: Option<String>,
    pub letter_references: Option<Vec<String>>,
    pub letter_response_id: Option<String>,
    pub letter_json: Option<serde_json::Value>,
}

#[cfg(test)]
#[path = "job_snapshot_tests.rs"]
mod tests;
