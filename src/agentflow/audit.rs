//! Append-only, hash-chained audit log (spec §4.5 "Audit log").
//!
//! Grounded on `thought_chain.rs`'s SHA-256 hash-chained `.jsonl` log in
//! the teacher crate: each entry's hash folds in the previous entry's
//! hash, so any tampering with or removal of a prior entry is detectable
//! by recomputing the chain. The knowledge vault is this module's only
//! consumer (spec §4.5); the Coordinator's save-request audit trail has a
//! different, simpler shape (spec §4.6) and keeps its own `Vec` instead.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One append-only audit entry (spec §4.5: `{log_id, note_id, action,
/// actor, timestamp, metadata}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub log_id: String,
    pub note_id: String,
    pub action: String,
    pub actor: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub metadata: serde_json::Value,
    /// Hex-encoded SHA-256 of this entry's content folded with the
    /// previous entry's hash; `None` only for the very first entry's
    /// predecessor.
    pub prev_hash: Option<String>,
    pub hash: String,
}

fn compute_hash(
    log_id: &str,
    note_id: &str,
    action: &str,
    actor: &str,
    timestamp: &chrono::DateTime<chrono::Utc>,
    metadata: &serde_json::Value,
    prev_hash: &Option<String>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(log_id.as_bytes());
    hasher.update(note_id.as_bytes());
    hasher.update(action.as_bytes());
    hasher.update(actor.as_bytes());
    hasher.update(timestamp.to_rfc3339().as_bytes());
    hasher.update(metadata.to_string().as_bytes());
    if let Some(prev) = prev_hash {
        hasher.update(prev.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Append-only audit log. `append` is the only mutator; there is no
/// delete or update path, matching spec §4.5's "append-only" invariant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &mut self,
        log_id: impl Into<String>,
        note_id: impl Into<String>,
        action: impl Into<String>,
        actor: impl Into<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
        metadata: serde_json::Value,
    ) -> &AuditEntry {
        let log_id = log_id.into();
        let note_id = note_id.into();
        let action = action.into();
        let actor = actor.into();
        let prev_hash = self.entries.last().map(|e| e.hash.clone());
        let hash = compute_hash(&log_id, &note_id, &action, &actor, &timestamp, &metadata, &prev_hash);
        self.entries.push(AuditEntry {
            log_id,
            note_id,
            action,
            actor,
            timestamp,
            metadata,
            prev_hash,
            hash,
        });
        self.entries.last().unwrap()
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn entries_for_note(&self, note_id: &str) -> Vec<&AuditEntry> {
        self.entries.iter().filter(|e| e.note_id == note_id).collect()
    }

    /// Recompute every entry's hash from its recorded fields and compare
    /// against the stored chain; `false` means the log was tampered with.
    pub fn verify_chain(&self) -> bool {
        let mut prev: Option<String> = None;
        for entry in &self.entries {
            let expected = compute_hash(
                &entry.log_id,
                &entry.note_id,
                &entry.action,
                &entry.actor,
                &entry.timestamp,
                &entry.metadata,
                &prev,
            );
            if expected != entry.hash || entry.prev_hash != prev {
                return false;
            }
            prev = Some(entry.hash.clone());
        }
        true
    }
}
