//! Long-term knowledge vault: note lifecycle, weighted retrieval, and
//! deviation detection (spec §4.5).
//!
//! Grounded on `thought_chain.rs`'s persisted, append-only `Thought` log
//! in the teacher crate — generalized from a flat append-only sequence
//! into notes with an explicit lifecycle, plus a scored retrieval query
//! the thought chain has no equivalent for (it resolves context by
//! explicit ref, not relevance scoring).

use crate::audit::AuditLog;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of knowledge a note records (spec §3 `KnowledgeNote`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    Progress,
    Conclusion,
    Blocker,
    NextAction,
    Reference,
}

impl NoteType {
    /// Default type weight used by [`VaultRetriever::fetch`]'s scoring
    /// formula (spec §4.5).
    pub fn weight(self) -> f64 {
        match self {
            NoteType::Blocker => 3.0,
            NoteType::NextAction => 2.0,
            NoteType::Conclusion => 1.0,
            NoteType::Progress => 0.8,
            NoteType::Reference => 0.5,
        }
    }
}

/// Lifecycle state of a note (spec §3): draft → pending_user → {approved,
/// draft} → approved → archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    Draft,
    PendingUser,
    Approved,
    Archived,
}

/// Vault entry (spec §3 `KnowledgeNote`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeNote {
    pub note_id: String,
    pub note_type: NoteType,
    pub status: NoteStatus,
    pub content: String,
    pub owner: String,
    pub version: u32,
    pub tags: Vec<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Errors from vault lifecycle operations (spec §3 invariant: "approved
/// notes are immutable").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("note {0} not found")]
    NotFound(String),
    #[error("illegal transition from {from:?} to {to:?}")]
    IllegalTransition { from: NoteStatus, to: NoteStatus },
    #[error("note {0} is approved and immutable; archive it instead of mutating content or tags")]
    ApprovedImmutable(String),
}

/// Lifecycle manager and note store. Concurrent reads may proceed
/// alongside each other but not alongside a write (spec §5: "concurrent
/// vault mutations must be serialized under a vault-wide lock").
/// [`DashMap`] gives per-shard locking that approximates this without a
/// single coarse `Mutex` around the whole map.
pub struct KnowledgeVault {
    notes: DashMap<String, KnowledgeNote>,
    audit: std::sync::Mutex<AuditLog>,
}

impl Default for KnowledgeVault {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeVault {
    pub fn new() -> Self {
        Self {
            notes: DashMap::new(),
            audit: std::sync::Mutex::new(AuditLog::new()),
        }
    }

    fn audit(&self, note_id: &str, action: &str, actor: &str, metadata: serde_json::Value) {
        let mut log = self.audit.lock().expect("audit log mutex poisoned");
        log.append(
            uuid::Uuid::new_v4().to_string(),
            note_id,
            action,
            actor,
            chrono::Utc::now(),
            metadata,
        );
    }

    /// Create a note in `draft` status (spec §4.5 "Creating a note
    /// defaults to draft").
    pub fn create(
        &self,
        note_id: impl Into<String>,
        note_type: NoteType,
        content: impl Into<String>,
        owner: impl Into<String>,
        tags: Vec<String>,
    ) -> KnowledgeNote {
        let note_id = note_id.into();
        let owner = owner.into();
        let now = chrono::Utc::now();
        let note = KnowledgeNote {
            note_id: note_id.clone(),
            note_type,
            status: NoteStatus::Draft,
            content: content.into(),
            owner: owner.clone(),
            version: 1,
            tags,
            approved_by: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
        };
        self.notes.insert(note_id.clone(), note.clone());
        self.audit(&note_id, "create", &owner, serde_json::json!({}));
        note
    }

    fn transition(
        &self,
        note_id: &str,
        to: NoteStatus,
        actor: &str,
    ) -> Result<KnowledgeNote, VaultError> {
        let mut entry = self
            .notes
            .get_mut(note_id)
            .ok_or_else(|| VaultError::NotFound(note_id.to_string()))?;
        let legal = matches!(
            (entry.status, to),
            (NoteStatus::Draft, NoteStatus::PendingUser)
                | (NoteStatus::PendingUser, NoteStatus::Approved)
                | (NoteStatus::PendingUser, NoteStatus::Draft)
                | (NoteStatus::Approved, NoteStatus::Archived)
        );
        if !legal {
            return Err(VaultError::IllegalTransition {
                from: entry.status,
                to,
            });
        }
        entry.status = to;
        entry.updated_at = chrono::Utc::now();
        let result = entry.clone();
        drop(entry);
        self.audit(note_id, &format!("{:?}", to).to_lowercase(), actor, serde_json::json!({}));
        Ok(result)
    }

    pub fn submit(&self, note_id: &str, actor: &str) -> Result<KnowledgeNote, VaultError> {
        self.transition(note_id, NoteStatus::PendingUser, actor)
    }

    pub fn approve(&self, note_id: &str, approver: &str) -> Result<KnowledgeNote, VaultError> {
        let result = self.transition(note_id, NoteStatus::Approved, approver)?;
        let mut entry = self.notes.get_mut(note_id).unwrap();
        entry.approved_by = Some(approver.to_string());
        entry.approved_at = Some(chrono::Utc::now());
        Ok(entry.clone())
    }

    pub fn reject(&self, note_id: &str, actor: &str) -> Result<KnowledgeNote, VaultError> {
        self.transition(note_id, NoteStatus::Draft, actor)
    }

    pub fn archive(&self, note_id: &str, actor: &str) -> Result<KnowledgeNote, VaultError> {
        self.transition(note_id, NoteStatus::Archived, actor)
    }

    /// Update content/tags. Rejected on an approved note (spec §3
    /// invariant: "approved notes are immutable").
    pub fn update(
        &self,
        note_id: &str,
        content: Option<String>,
        tags: Option<Vec<String>>,
        actor: &str,
    ) -> Result<KnowledgeNote, VaultError> {
        let mut entry = self
            .notes
            .get_mut(note_id)
            .ok_or_else(|| VaultError::NotFound(note_id.to_string()))?;
        if entry.status == NoteStatus::Approved {
            return Err(VaultError::ApprovedImmutable(note_id.to_string()));
        }
        if let Some(content) = content {
            entry.content = content;
        }
        if let Some(tags) = tags {
            entry.tags = tags;
        }
        entry.version += 1;
        entry.updated_at = chrono::Utc::now();
        let result = entry.clone();
        drop(entry);
        self.audit(note_id, "update", actor, serde_json::json!({}));
        Ok(result)
    }

    pub fn get(&self, note_id: &str) -> Option<KnowledgeNote> {
        self.notes.get(note_id).map(|n| n.clone())
    }

    pub fn audit_log(&self) -> AuditLog {
        self.audit.lock().expect("audit log mutex poisoned").clone()
    }

    /// Coordinator inspector sweep (spec §4.5): blockers matching
    /// resolution keywords become conclusions; `next_action` notes older
    /// than `archive_after` are archived.
    pub fn inspector_sweep(&self, archive_after: chrono::Duration) {
        const RESOLUTION_KEYWORDS: &[&str] = &[
            "solved", "resolved", "fixed", "completed", "已解决", "已修复",
        ];
        let now = chrono::Utc::now();
        let ids: Vec<String> = self.notes.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            let Some(note) = self.get(&id) else { continue };
            if note.note_type == NoteType::Blocker
                && RESOLUTION_KEYWORDS
                    .iter()
                    .any(|kw| note.content.to_lowercase().contains(&kw.to_lowercase()))
            {
                if let Some(mut entry) = self.notes.get_mut(&id) {
                    entry.note_type = NoteType::Conclusion;
                    entry.updated_at = now;
                }
                self.audit(&id, "inspector_convert_to_conclusion", "coordinator-inspector", serde_json::json!({}));
            }
            if note.note_type == NoteType::NextAction
                && note.status != NoteStatus::Archived
                && now - note.created_at > archive_after
            {
                let _ = self.archive(&id, "coordinator-inspector");
            }
        }
    }
}

/// Retrieval signal over a query string (spec §4.5): exact content
/// substring = 0.5, tag match = 0.3, per-term match = 0.1 each.
fn relevance(note: &KnowledgeNote, query: &str) -> f64 {
    let query_lower = query.to_lowercase();
    let content_lower = note.content.to_lowercase();
    let mut score = 0.0;
    if content_lower.contains(&query_lower) {
        score += 0.5;
    }
    if note.tags.iter().any(|t| t.to_lowercase() == query_lower) {
        score += 0.3;
    }
    for term in query_lower.split_whitespace() {
        if content_lower.contains(term) {
            score += 0.1;
        }
    }
    score
}

/// Weighted retrieval over approved notes (spec §4.5 `VaultRetriever.fetch`).
pub struct VaultRetriever;

impl VaultRetriever {
    /// Score every eligible note against `query`, normalize to `[0, 1]`,
    /// and return the top `k` (clamped to the candidate count).
    ///
    /// `include_unapproved` opts into scoring non-approved notes too
    /// (spec §4.5: "Only approved notes are eligible unless a parameter
    /// opts in").
    pub fn fetch(
        vault: &KnowledgeVault,
        query: &str,
        k: usize,
        include_unapproved: bool,
    ) -> Vec<(KnowledgeNote, f64)> {
        let mut scored: Vec<(KnowledgeNote, f64)> = vault
            .notes
            .iter()
            .map(|e| e.value().clone())
            .filter(|n| include_unapproved || n.status == NoteStatus::Approved)
            .map(|n| {
                let raw = relevance(&n, query) * n.note_type.weight();
                (n, raw)
            })
            .collect();

        let max_score = scored.iter().map(|(_, s)| *s).fold(0.0_f64, f64::max);
        if max_score > 0.0 {
            for (_, score) in scored.iter_mut() {
                *score /= max_score;
            }
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

/// Severity of a deviation alert (spec §4.5 "Deviation detection").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationSeverity {
    High,
    Medium,
    Low,
}

/// Alert kind raised when injected guidance goes unheeded (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationAlert {
    ReplanRequired,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deviation {
    pub note_id: String,
    pub alert: DeviationAlert,
    pub severity: DeviationSeverity,
}

/// Compare notes injected at the pre-loop point against the agent's
/// subsequent referenced note ids (spec §4.5 "Deviation detection").
pub fn detect_deviations(
    injected: &[KnowledgeNote],
    referenced_note_ids: &[String],
) -> Vec<Deviation> {
    injected
        .iter()
        .filter(|note| !referenced_note_ids.contains(&note.note_id))
        .map(|note| match note.note_type {
            NoteType::Blocker => Deviation {
                note_id: note.note_id.clone(),
                alert: DeviationAlert::ReplanRequired,
                severity: DeviationSeverity::High,
            },
            NoteType::NextAction => Deviation {
                note_id: note.note_id.clone(),
                alert: DeviationAlert::Warning,
                severity: DeviationSeverity::Medium,
            },
            NoteType::Conclusion => Deviation {
                note_id: note.note_id.clone(),
                alert: DeviationAlert::Warning,
                severity: DeviationSeverity::Low,
            },
            _ => Deviation {
                note_id: note.note_id.clone(),
                alert: DeviationAlert::Warning,
                severity: DeviationSeverity::Low,
            },
        })
        .collect()
}
