//! CJIS query logging and suspicious-query heuristics
//!
//! Every query over regulated data produces an audit record with masked
//! parameters. Heuristics flag rate bursts and sensitive queries without
//! a case number for supervisor review.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{info, warn};
use uuid::Uuid;

use crate::types::CjisQueryRecord;

/// Parameter names masked before a record is stored.
const SENSITIVE_PARAMS: [&str; 5] = ["ssn", "dob", "password", "token", "dl_number"];
const MASK: &str = "***MASKED***";

/// Query types that count as sensitive for the heuristics.
const SENSITIVE_QUERY_TYPES: [&str; 4] =
    ["criminal_history", "wanted_person", "iii_query", "ncic_query"];

/// CJIS query log.
pub struct CjisQueryLog {
    rate_burst_threshold: usize,
    records: VecDeque<CjisQueryRecord>,
    per_user_times: HashMap<String, VecDeque<DateTime<Utc>>>,
}

const LOG_SIZE: usize = 50_000;

impl CjisQueryLog {
    pub fn new(rate_burst_threshold: usize) -> Self {
        Self {
            rate_burst_threshold,
            records: VecDeque::with_capacity(LOG_SIZE),
            per_user_times: HashMap::new(),
        }
    }

    /// Log one regulated query. Returns the stored record, flagged when a
    /// heuristic fired.
    pub fn log_query(
        &mut self,
        user_id: &str,
        purpose: &str,
        query_type: &str,
        parameters: BTreeMap<String, String>,
        response_summary: &str,
        case_number: Option<String>,
    ) -> CjisQueryRecord {
        let now = Utc::now();
        let masked: BTreeMap<String, String> = parameters
            .into_iter()
            .map(|(k, v)| {
                let lowered = k.to_lowercase();
                if SENSITIVE_PARAMS.iter().any(|s| lowered.contains(s)) {
                    (k, MASK.to_string())
                } else {
                    (k, v)
                }
            })
            .collect();

        let sensitive = SENSITIVE_QUERY_TYPES.contains(&query_type);

        // Rate-burst window: queries in the last minute per user.
        let times = self.per_user_times.entry(user_id.to_string()).or_default();
        times.push_back(now);
        while times
            .front()
            .is_some_and(|t| now - *t > Duration::minutes(1))
        {
            times.pop_front();
        }
        let burst = times.len() > self.rate_burst_threshold;

        let missing_case = sensitive && case_number.is_none();
        let (flagged, flag_reason) = if burst {
            (
                true,
                Some(format!(
                    "rate burst: {} queries in the last minute",
                    times.len()
                )),
            )
        } else if missing_case {
            (
                true,
                Some("sensitive query without an associated case number".to_string()),
            )
        } else {
            (false, None)
        };

        let record = CjisQueryRecord {
            transaction_id: format!("cjis-{}", Uuid::new_v4().simple()),
            user_id: user_id.to_string(),
            purpose: purpose.to_string(),
            query_type: query_type.to_string(),
            parameters: masked,
            response_summary: response_summary.to_string(),
            case_number,
            sensitive,
            timestamp: now,
            flagged,
            flag_reason,
        };

        if flagged {
            warn!(
                transaction_id = %record.transaction_id,
                user_id,
                reason = record.flag_reason.as_deref().unwrap_or("-"),
                "Suspicious CJIS query flagged for supervisor review"
            );
        } else {
            info!(
                transaction_id = %record.transaction_id,
                user_id,
                query_type,
                "CJIS query logged"
            );
        }

        if self.records.len() >= LOG_SIZE {
            self.records.pop_front();
        }
        self.records.push_back(record.clone());
        record
    }

    pub fn records(&self, user_id: Option<&str>, limit: usize) -> Vec<&CjisQueryRecord> {
        self.records
            .iter()
            .rev()
            .filter(|r| user_id.is_none_or(|u| r.user_id == u))
            .take(limit)
            .collect()
    }

    /// Flagged records awaiting supervisor review.
    pub fn flagged(&self) -> Vec<&CjisQueryRecord> {
        self.records.iter().filter(|r| r.flagged).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> CjisQueryLog {
        CjisQueryLog::new(30)
    }

    #[test]
    fn parameters_are_masked() {
        let mut l = log();
        let mut params = BTreeMap::new();
        params.insert("ssn".to_string(), "123-45-6789".to_string());
        params.insert("name".to_string(), "John Smith".to_string());
        let record = l.log_query(
            "u1",
            "investigation",
            "person_query",
            params,
            "1 hit",
            Some("case-22".into()),
        );
        assert_eq!(record.parameters["ssn"], MASK);
        assert_eq!(record.parameters["name"], "John Smith");
        assert!(!record.flagged);
    }

    #[test]
    fn sensitive_query_without_case_number_flags() {
        let mut l = log();
        let record = l.log_query(
            "u1",
            "patrol",
            "criminal_history",
            BTreeMap::new(),
            "2 hits",
            None,
        );
        assert!(record.sensitive);
        assert!(record.flagged);
        assert_eq!(l.flagged().len(), 1);
    }

    #[test]
    fn sensitive_query_with_case_number_passes() {
        let mut l = log();
        let record = l.log_query(
            "u1",
            "investigation",
            "criminal_history",
            BTreeMap::new(),
            "2 hits",
            Some("case-7".into()),
        );
        assert!(!record.flagged);
    }

    #[test]
    fn rate_burst_flags() {
        let mut l = CjisQueryLog::new(5);
        for i in 0..6 {
            l.log_query(
                "u1",
                "patrol",
                "plate_query",
                BTreeMap::new(),
                "ok",
                Some(format!("case-{i}")),
            );
        }
        let last = l.records(Some("u1"), 1)[0];
        assert!(last.flagged);
        assert!(last.flag_reason.as_deref().unwrap().contains("rate burst"));
    }
}
