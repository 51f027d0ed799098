//! Tamper-evident operations audit log
//!
//! Each entry hashes its canonical fields together with the previous
//! entry's hash (SHA-256), so the chain is verifiable end to end.
//! Sensitive fields are masked before an entry is sealed. The log is
//! append-only; this component is the only writer, every other component
//! submits entries through it.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, VecDeque};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::ContinuityConfig;
use crate::types::{AuditAction, AuditEntry, AuditSeverity};

use super::audit_store::{AuditSegmentStore, AuditStoreError};

/// Field names masked in entry details before sealing.
const SENSITIVE_FIELDS: [&str; 5] = ["password", "token", "api_key", "secret", "credential"];
const MASK: &str = "***MASKED***";

/// Chain verification failure.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("chain broken at entry {entry_id}: previous hash mismatch")]
    ChainBroken { entry_id: String },

    #[error("entry {entry_id} hash does not match its contents")]
    HashMismatch { entry_id: String },

    #[error("audit log is in read-only lockout after integrity violation")]
    ReadOnly,

    #[error(transparent)]
    Store(#[from] AuditStoreError),
}

/// Hash-chained audit log with optional segment persistence.
pub struct AuditLog {
    config: ContinuityConfig,
    session_id: String,
    entries: VecDeque<AuditEntry>,
    last_hash: Option<String>,
    store: Option<AuditSegmentStore>,
    /// Set after an integrity violation; writes are refused, reads continue.
    read_only: bool,
    entries_logged: u64,
}

const MEMORY_ENTRIES: usize = 10_000;

impl AuditLog {
    pub fn new(config: ContinuityConfig) -> Self {
        Self {
            config,
            session_id: Uuid::new_v4().to_string(),
            entries: VecDeque::with_capacity(MEMORY_ENTRIES),
            last_hash: None,
            store: None,
            read_only: false,
            entries_logged: 0,
        }
    }

    /// Attach a segment store; subsequent appends persist through it.
    pub fn with_store(mut self, store: AuditSegmentStore) -> Self {
        self.last_hash = store.last_hash();
        self.store = Some(store);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Canonical hash input: sorted-key JSON of the identifying fields
    /// plus the previous hash.
    fn compute_hash(entry: &AuditEntry) -> String {
        let canonical = json!({
            "action": entry.action,
            "description": entry.description,
            "entry_id": entry.entry_id,
            "previous_hash": entry.previous_entry_hash,
            "source": entry.source,
            "timestamp": entry.timestamp.to_rfc3339(),
        });
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    fn mask_details(
        details: BTreeMap<String, serde_json::Value>,
    ) -> BTreeMap<String, serde_json::Value> {
        details
            .into_iter()
            .map(|(key, value)| {
                let lowered = key.to_lowercase();
                if SENSITIVE_FIELDS.iter().any(|s| lowered.contains(s)) {
                    (key, serde_json::Value::String(MASK.to_string()))
                } else if let serde_json::Value::Object(map) = value {
                    let inner: BTreeMap<String, serde_json::Value> = map.into_iter().collect();
                    (
                        key,
                        serde_json::Value::Object(
                            Self::mask_details(inner).into_iter().collect(),
                        ),
                    )
                } else {
                    (key, value)
                }
            })
            .collect()
    }

    /// Append an entry to the chain.
    pub fn append(
        &mut self,
        action: AuditAction,
        severity: AuditSeverity,
        source: &str,
        description: &str,
        target: Option<String>,
        user_id: Option<String>,
        details: BTreeMap<String, serde_json::Value>,
    ) -> Result<AuditEntry, AuditError> {
        if self.read_only {
            return Err(AuditError::ReadOnly);
        }

        let mut entry = AuditEntry {
            entry_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            action,
            severity,
            source: source.to_string(),
            target,
            user_id,
            description: description.to_string(),
            details: Self::mask_details(details),
            session_id: self.session_id.clone(),
            previous_entry_hash: self.last_hash.clone(),
            entry_hash: None,
        };
        let hash = Self::compute_hash(&entry);
        entry.entry_hash = Some(hash.clone());
        self.last_hash = Some(hash);

        if let Some(store) = &mut self.store {
            store.append(&entry)?;
        }

        if self.entries.len() >= MEMORY_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.clone());
        self.entries_logged += 1;
        Ok(entry)
    }

    /// Convenience append with no target/user/details.
    pub fn log(
        &mut self,
        action: AuditAction,
        severity: AuditSeverity,
        source: &str,
        description: &str,
    ) -> Result<AuditEntry, AuditError> {
        self.append(action, severity, source, description, None, None, BTreeMap::new())
    }

    /// Walk the in-memory chain verifying linkage and per-entry hashes.
    ///
    /// On violation, the log enters read-only for writes; analysis may
    /// continue. Operators are paged through the returned error.
    pub fn verify_chain(&mut self) -> Result<(), AuditError> {
        let result = Self::verify_entries(self.entries.make_contiguous());
        if result.is_err() {
            error!("AUDIT CHAIN INTEGRITY VIOLATION - entering write lockout");
            self.read_only = true;
        }
        result
    }

    /// Verify an arbitrary slice of entries (e.g. replayed from disk).
    pub fn verify_entries(entries: &[AuditEntry]) -> Result<(), AuditError> {
        for window in entries.windows(2) {
            let (prev, cur) = (&window[0], &window[1]);
            if cur.previous_entry_hash != prev.entry_hash {
                return Err(AuditError::ChainBroken {
                    entry_id: cur.entry_id.clone(),
                });
            }
        }
        for entry in entries {
            let expected = Self::compute_hash(entry);
            if entry.entry_hash.as_deref() != Some(expected.as_str()) {
                return Err(AuditError::HashMismatch {
                    entry_id: entry.entry_id.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn entries(
        &self,
        action: Option<AuditAction>,
        severity: Option<AuditSeverity>,
        limit: usize,
    ) -> Vec<&AuditEntry> {
        self.entries
            .iter()
            .rev()
            .filter(|e| action.is_none_or(|a| e.action == a))
            .filter(|e| severity.is_none_or(|s| e.severity == s))
            .take(limit)
            .collect()
    }

    pub fn entries_logged(&self) -> u64 {
        self.entries_logged
    }

    /// Time-based retention over the in-memory window; persisted segments
    /// roll to cold storage separately with the chain left continuous.
    pub fn enforce_retention(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::days(self.config.audit_retention_days);
        let before = self.entries.len();
        while self
            .entries
            .front()
            .is_some_and(|e| e.timestamp < cutoff)
        {
            self.entries.pop_front();
        }
        before - self.entries.len()
    }

    /// Compliance summary for a reporting window.
    pub fn compliance_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> serde_json::Value {
        let in_window: Vec<&AuditEntry> = self
            .entries
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .collect();
        let mut by_action: BTreeMap<String, u64> = BTreeMap::new();
        let mut by_severity: BTreeMap<String, u64> = BTreeMap::new();
        for e in &in_window {
            *by_action
                .entry(format!("{:?}", e.action))
                .or_insert(0) += 1;
            *by_severity
                .entry(format!("{:?}", e.severity))
                .or_insert(0) += 1;
        }
        let chain_ok = Self::verify_entries(
            &in_window.iter().map(|e| (*e).clone()).collect::<Vec<_>>(),
        )
        .is_ok();
        info!(
            entries = in_window.len(),
            chain_ok, "Compliance report generated"
        );
        json!({
            "period": { "start": start.to_rfc3339(), "end": end.to_rfc3339() },
            "total_entries": in_window.len(),
            "entries_by_action": by_action,
            "entries_by_severity": by_severity,
            "chain_integrity_verified": chain_ok,
            "compliance_status": if chain_ok { "compliant" } else { "review_required" },
            "retention_days": self.config.audit_retention_days,
        })
    }
}
