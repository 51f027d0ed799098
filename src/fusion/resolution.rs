//! Entity Resolution - probabilistic matching and greedy clustering
//!
//! Records are clustered within their type using weighted similarity
//! scores. Weights are conditional on both values being present; the
//! final score divides by the sum of active weights, so sparse records
//! are compared on what they actually share.
//!
//! ## Per-type metrics
//!
//! - **Person**: blended name metric (edit 0.4 / Soundex 0.3 / token
//!   Jaccard 0.3) at 0.4, DOB exact 0.3, SSN exact 0.5, DL exact 0.4,
//!   address edit-distance 0.2, normalized phone 0.3
//! - **Vehicle**: plate similarity 0.5, VIN exact 0.6, make/model edit
//!   0.2 each, year proximity (0.2/yr decay) 0.15, color exact 0.1
//! - **Incident**: case number 0.6, type 0.2, location edit 0.3,
//!   timestamp proximity (0.1/hr decay) 0.25
//! - **Address**: street edit 0.4, city 0.2, ZIP5 0.3, geodesic 0.4
//! - **Generic**: mean of common-field similarities

use chrono::DateTime;
use rayon::prelude::*;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::types::{
    EntityRecord, EntityType, MatchCandidate, MatchConfidence, ResolvedEntity,
};

// ============================================================================
// String Metrics
// ============================================================================

/// Levenshtein distance between two strings.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let insertions = previous[j + 1] + 1;
            let deletions = current[j] + 1;
            let substitutions = previous[j] + usize::from(ca != cb);
            current[j + 1] = insertions.min(deletions).min(substitutions);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Edit-distance similarity on a 0-1 scale, case-insensitive.
pub fn edit_distance_similarity(s1: &str, s2: &str) -> f64 {
    if s1.is_empty() || s2.is_empty() {
        return 0.0;
    }
    let a = s1.to_lowercase();
    let b = s2.to_lowercase();
    let a = a.trim();
    let b = b.trim();
    if a == b {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein_distance(a, b) as f64 / max_len as f64)
}

/// Soundex code for a name (first letter + 3 digits, zero padded).
pub fn soundex(name: &str) -> String {
    let letters: Vec<char> = name
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect();
    let Some(&first) = letters.first() else {
        return String::new();
    };

    fn code(c: char) -> Option<char> {
        match c {
            'B' | 'F' | 'P' | 'V' => Some('1'),
            'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
            'D' | 'T' => Some('3'),
            'L' => Some('4'),
            'M' | 'N' => Some('5'),
            'R' => Some('6'),
            _ => None,
        }
    }

    let mut out = String::new();
    out.push(first);
    for &c in &letters[1..] {
        if let Some(d) = code(c) {
            if out.chars().last() != Some(d) {
                out.push(d);
            }
        }
        if out.len() >= 4 {
            break;
        }
    }
    while out.len() < 4 {
        out.push('0');
    }
    out.truncate(4);
    out
}

/// Phonetic similarity: 1.0 on Soundex match, else fraction of matching positions.
pub fn phonetic_similarity(name1: &str, name2: &str) -> f64 {
    if name1.is_empty() || name2.is_empty() {
        return 0.0;
    }
    let s1 = soundex(name1);
    let s2 = soundex(name2);
    if s1.is_empty() || s2.is_empty() {
        return 0.0;
    }
    if s1 == s2 {
        return 1.0;
    }
    let matching = s1.chars().zip(s2.chars()).filter(|(a, b)| a == b).count();
    matching as f64 / 4.0
}

#[allow(clippy::unwrap_used)] // pattern is a compile-time constant
fn name_prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s]").unwrap())
}

/// Normalize a person name: lowercase, strip punctuation and honorifics.
pub fn normalize_name(name: &str) -> String {
    const PREFIXES: [&str; 9] = ["mr", "mrs", "ms", "dr", "jr", "sr", "ii", "iii", "iv"];
    let lowered = name.to_lowercase();
    let stripped = name_prefix_regex().replace_all(&lowered, "");
    stripped
        .split_whitespace()
        .filter(|p| !PREFIXES.contains(p))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Blended name similarity: edit 0.4 + phonetic 0.3 + token Jaccard 0.3.
pub fn name_similarity(name1: &str, name2: &str) -> f64 {
    let n1 = normalize_name(name1);
    let n2 = normalize_name(name2);
    if n1.is_empty() || n2.is_empty() {
        return 0.0;
    }
    if n1 == n2 {
        return 1.0;
    }

    let edit = edit_distance_similarity(&n1, &n2);
    let phonetic = phonetic_similarity(&n1, &n2);

    let parts1: BTreeSet<&str> = n1.split_whitespace().collect();
    let parts2: BTreeSet<&str> = n2.split_whitespace().collect();
    let jaccard = if parts1.is_empty() || parts2.is_empty() {
        0.0
    } else {
        parts1.intersection(&parts2).count() as f64 / parts1.union(&parts2).count() as f64
    };

    edit * 0.4 + phonetic * 0.3 + jaccard * 0.3
}

/// Normalize a license plate: uppercase alphanumerics only.
pub fn normalize_plate(plate: &str) -> String {
    plate
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Plate similarity on normalized alphanumerics.
pub fn plate_similarity(plate1: &str, plate2: &str) -> f64 {
    let n1 = normalize_plate(plate1);
    let n2 = normalize_plate(plate2);
    if n1.is_empty() || n2.is_empty() {
        return 0.0;
    }
    if n1 == n2 {
        return 1.0;
    }
    edit_distance_similarity(&n1, &n2)
}

fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

// ============================================================================
// Weighted Scoring
// ============================================================================

/// 1.0 on an exact match, 0.0 otherwise.
fn exact(matched: bool) -> f64 {
    if matched {
        1.0
    } else {
        0.0
    }
}

/// Accumulates (score, weight) pairs where both sides supplied a value.
#[derive(Default)]
struct WeightedScore {
    total: f64,
    weight: f64,
}

impl WeightedScore {
    fn add(&mut self, score: f64, weight: f64) {
        self.total += score * weight;
        self.weight += weight;
    }

    fn finish(&self) -> f64 {
        if self.weight <= 0.0 {
            0.0
        } else {
            self.total / self.weight
        }
    }
}

fn person_similarity(a: &EntityRecord, b: &EntityRecord) -> f64 {
    let mut acc = WeightedScore::default();

    if let (Some(n1), Some(n2)) = (first_attr(a, &["name", "full_name"]), first_attr(b, &["name", "full_name"])) {
        acc.add(name_similarity(n1, n2), 0.4);
    }
    if let (Some(d1), Some(d2)) = (first_attr(a, &["dob", "date_of_birth"]), first_attr(b, &["dob", "date_of_birth"])) {
        acc.add(exact(d1 == d2), 0.3);
    }
    if let (Some(s1), Some(s2)) = (first_attr(a, &["ssn", "ssn_last4"]), first_attr(b, &["ssn", "ssn_last4"])) {
        acc.add(exact(s1 == s2), 0.5);
    }
    if let (Some(l1), Some(l2)) = (
        first_attr(a, &["drivers_license", "dl_number"]),
        first_attr(b, &["drivers_license", "dl_number"]),
    ) {
        acc.add(exact(l1 == l2), 0.4);
    }
    if let (Some(a1), Some(a2)) = (a.attr("address"), b.attr("address")) {
        acc.add(edit_distance_similarity(a1, a2), 0.2);
    }
    if let (Some(p1), Some(p2)) = (
        first_attr(a, &["phone", "phone_number"]),
        first_attr(b, &["phone", "phone_number"]),
    ) {
        acc.add(exact(normalize_phone(p1) == normalize_phone(p2)), 0.3);
    }

    acc.finish()
}

fn vehicle_similarity(a: &EntityRecord, b: &EntityRecord) -> f64 {
    let mut acc = WeightedScore::default();

    if let (Some(p1), Some(p2)) = (
        first_attr(a, &["plate_number", "license_plate"]),
        first_attr(b, &["plate_number", "license_plate"]),
    ) {
        acc.add(plate_similarity(p1, p2), 0.5);
    }
    if let (Some(v1), Some(v2)) = (a.attr("vin"), b.attr("vin")) {
        acc.add(exact(v1.eq_ignore_ascii_case(v2)), 0.6);
    }
    if let (Some(m1), Some(m2)) = (a.attr("make"), b.attr("make")) {
        acc.add(edit_distance_similarity(m1, m2), 0.2);
    }
    if let (Some(m1), Some(m2)) = (a.attr("model"), b.attr("model")) {
        acc.add(edit_distance_similarity(m1, m2), 0.2);
    }
    if let (Some(y1), Some(y2)) = (a.attr("year"), b.attr("year")) {
        if let (Ok(y1), Ok(y2)) = (y1.parse::<i32>(), y2.parse::<i32>()) {
            let diff = f64::from((y1 - y2).abs());
            acc.add((1.0 - diff * 0.2).max(0.0), 0.15);
        }
    }
    if let (Some(c1), Some(c2)) = (a.attr("color"), b.attr("color")) {
        acc.add(exact(c1.eq_ignore_ascii_case(c2)), 0.1);
    }

    acc.finish()
}

fn incident_similarity(a: &EntityRecord, b: &EntityRecord) -> f64 {
    let mut acc = WeightedScore::default();

    if let (Some(c1), Some(c2)) = (
        first_attr(a, &["case_number", "incident_number"]),
        first_attr(b, &["case_number", "incident_number"]),
    ) {
        acc.add(exact(c1 == c2), 0.6);
    }
    if let (Some(t1), Some(t2)) = (
        first_attr(a, &["incident_type", "type"]),
        first_attr(b, &["incident_type", "type"]),
    ) {
        acc.add(edit_distance_similarity(t1, t2), 0.2);
    }
    if let (Some(l1), Some(l2)) = (
        first_attr(a, &["location", "address"]),
        first_attr(b, &["location", "address"]),
    ) {
        acc.add(edit_distance_similarity(l1, l2), 0.3);
    }
    if let (Some(t1), Some(t2)) = (
        first_attr(a, &["timestamp", "occurred_at"]),
        first_attr(b, &["timestamp", "occurred_at"]),
    ) {
        if let (Ok(t1), Ok(t2)) = (
            DateTime::parse_from_rfc3339(t1),
            DateTime::parse_from_rfc3339(t2),
        ) {
            let hours = (t1 - t2).num_seconds().abs() as f64 / 3600.0;
            acc.add((1.0 - hours * 0.1).max(0.0), 0.25);
        }
    }

    acc.finish()
}

fn address_similarity(a: &EntityRecord, b: &EntityRecord) -> f64 {
    let mut acc = WeightedScore::default();

    if let (Some(s1), Some(s2)) = (
        first_attr(a, &["street", "address"]),
        first_attr(b, &["street", "address"]),
    ) {
        acc.add(edit_distance_similarity(s1, s2), 0.4);
    }
    if let (Some(c1), Some(c2)) = (a.attr("city"), b.attr("city")) {
        acc.add(
            if c1.eq_ignore_ascii_case(c2) {
                1.0
            } else {
                edit_distance_similarity(c1, c2)
            },
            0.2,
        );
    }
    if let (Some(z1), Some(z2)) = (
        first_attr(a, &["zip_code", "zip"]),
        first_attr(b, &["zip_code", "zip"]),
    ) {
        let z1: String = z1.chars().take(5).collect();
        let z2: String = z2.chars().take(5).collect();
        acc.add(exact(z1 == z2), 0.3);
    }
    if let (Some(lat1), Some(lon1), Some(lat2), Some(lon2)) = (
        a.attr("latitude").and_then(|v| v.parse::<f64>().ok()),
        a.attr("longitude").and_then(|v| v.parse::<f64>().ok()),
        b.attr("latitude").and_then(|v| v.parse::<f64>().ok()),
        b.attr("longitude").and_then(|v| v.parse::<f64>().ok()),
    ) {
        let approx = ((lat1 - lat2).powi(2) + (lon1 - lon2).powi(2)).sqrt();
        acc.add((1.0 - approx * 100.0).max(0.0), 0.4);
    }

    acc.finish()
}

fn generic_similarity(a: &EntityRecord, b: &EntityRecord) -> f64 {
    const SKIP: [&str; 4] = ["id", "entity_id", "created_at", "updated_at"];
    let mut scores = Vec::new();
    for (key, v1) in &a.attributes {
        if SKIP.contains(&key.as_str()) {
            continue;
        }
        if let Some(v2) = b.attributes.get(key) {
            scores.push(edit_distance_similarity(v1, v2));
        }
    }
    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

fn first_attr<'a>(rec: &'a EntityRecord, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| rec.attr(k)).filter(|v| !v.is_empty())
}

/// Pairwise similarity between two records. Cross-type pairs score 0.
pub fn calculate_similarity(a: &EntityRecord, b: &EntityRecord) -> f64 {
    if a.entity_type != b.entity_type {
        return 0.0;
    }
    match a.entity_type {
        EntityType::Person => person_similarity(a, b),
        EntityType::Vehicle => vehicle_similarity(a, b),
        EntityType::Incident => incident_similarity(a, b),
        EntityType::Address => address_similarity(a, b),
        EntityType::Generic => generic_similarity(a, b),
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Entity resolver coordinating resolution across entity types.
pub struct EntityResolver {
    similarity_threshold: f64,
    high_confidence_threshold: f64,
    medium_confidence_threshold: f64,
}

impl EntityResolver {
    pub fn new(
        similarity_threshold: f64,
        high_confidence_threshold: f64,
        medium_confidence_threshold: f64,
    ) -> Self {
        Self {
            similarity_threshold,
            high_confidence_threshold,
            medium_confidence_threshold,
        }
    }

    /// Resolver tuned from the deployment config.
    pub fn from_config(cfg: &crate::config::FusionConfig) -> Self {
        Self::new(
            cfg.similarity_threshold,
            cfg.high_confidence_threshold,
            cfg.medium_confidence_threshold,
        )
    }

    /// Resolve a batch into entity clusters.
    ///
    /// Clustering is greedy single-pass: the first unresolved record opens
    /// a cluster and absorbs all later records whose similarity to it
    /// meets the threshold; absorbed records are not considered as
    /// independent cluster seeds in the same pass. Resolving the same
    /// batch twice yields structurally equal clusters.
    pub fn resolve(&self, records: &[EntityRecord]) -> Vec<ResolvedEntity> {
        // Score all ordered pairs up front in parallel; clustering itself
        // stays sequential so the greedy pass is deterministic.
        let n = records.len();
        let pair_scores: Vec<Vec<f64>> = records
            .par_iter()
            .map(|a| {
                records
                    .iter()
                    .map(|b| {
                        if std::ptr::eq(a, b) {
                            1.0
                        } else {
                            calculate_similarity(a, b)
                        }
                    })
                    .collect()
            })
            .collect();

        let mut resolved = Vec::new();
        let mut processed = vec![false; n];

        for i in 0..n {
            if processed[i] {
                continue;
            }
            let seed = &records[i];
            let mut candidates = Vec::new();

            for j in 0..n {
                if i == j || processed[j] {
                    continue;
                }
                let similarity = pair_scores[i][j];
                if similarity >= self.similarity_threshold {
                    candidates.push(MatchCandidate {
                        entity_id: seed.entity_id.clone(),
                        other_id: records[j].entity_id.clone(),
                        similarity,
                        confidence: self.confidence_band(similarity),
                    });
                }
            }

            let confidence = candidates
                .iter()
                .map(|c| c.similarity)
                .fold(f64::NAN, f64::max);
            let confidence = if confidence.is_nan() { 1.0 } else { confidence };

            let mut source_ids = vec![seed.entity_id.clone()];
            let mut alias_set = Vec::new();
            for c in &candidates {
                source_ids.push(c.other_id.clone());
                alias_set.push(c.other_id.clone());
            }

            processed[i] = true;
            for c in &candidates {
                if let Some(idx) = records.iter().position(|r| r.entity_id == c.other_id) {
                    processed[idx] = true;
                }
            }

            resolved.push(ResolvedEntity {
                entity_id: seed.entity_id.clone(),
                entity_type: seed.entity_type,
                canonical_attributes: seed.attributes.clone(),
                alias_set,
                merge_candidates: candidates,
                confidence,
                source_ids,
            });
        }

        info!(
            input_count = n,
            output_count = resolved.len(),
            merge_candidates = resolved.iter().map(|e| e.merge_candidates.len()).sum::<usize>(),
            "Entity resolution pass complete"
        );

        resolved
    }

    fn confidence_band(&self, similarity: f64) -> MatchConfidence {
        if similarity >= self.high_confidence_threshold {
            MatchConfidence::High
        } else if similarity >= self.medium_confidence_threshold {
            MatchConfidence::Medium
        } else {
            MatchConfidence::Low
        }
    }

    /// Pairwise score for two records; exposed for linkage queries.
    pub fn similarity(&self, a: &EntityRecord, b: &EntityRecord) -> f64 {
        let s = calculate_similarity(a, b);
        debug!(a = %a.entity_id, b = %b.entity_id, score = s, "pairwise similarity");
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: &str, name: &str, dob: &str) -> EntityRecord {
        EntityRecord::new(id, EntityType::Person)
            .with_attr("name", name)
            .with_attr("dob", dob)
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("same", "same"), 0);
    }

    #[test]
    fn soundex_matches_classic_examples() {
        assert_eq!(soundex("Robert"), "R163");
        assert_eq!(soundex("Rupert"), "R163");
        assert_eq!(soundex("Smith"), soundex("Smyth"));
    }

    #[test]
    fn name_similarity_ignores_honorifics() {
        let s = name_similarity("Dr John Smith", "john smith");
        assert!((s - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn identical_persons_match() {
        let a = person("p1", "John Smith", "1990-03-14");
        let b = person("p2", "John Smith", "1990-03-14");
        assert!(calculate_similarity(&a, &b) > 0.99);
    }

    #[test]
    fn cross_type_pairs_never_match() {
        let a = person("p1", "John Smith", "1990-03-14");
        let b = EntityRecord::new("v1", EntityType::Vehicle).with_attr("vin", "1ABC");
        assert!((calculate_similarity(&a, &b)).abs() < f64::EPSILON);
    }

    #[test]
    fn plate_normalization_strips_punctuation() {
        assert!((plate_similarity("ABC-123", "abc 123") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn vehicle_year_decay() {
        let a = EntityRecord::new("v1", EntityType::Vehicle)
            .with_attr("plate_number", "ABC123")
            .with_attr("year", "2020");
        let b = EntityRecord::new("v2", EntityType::Vehicle)
            .with_attr("plate_number", "ABC123")
            .with_attr("year", "2022");
        // plate 1.0*0.5 + year 0.6*0.15 over 0.65 total weight
        let s = calculate_similarity(&a, &b);
        assert!(s > 0.85 && s < 1.0, "got {s}");
    }

    #[test]
    fn greedy_clustering_absorbs_matches() {
        let resolver = EntityResolver::new(0.75, 0.9, 0.8);
        let records = vec![
            person("p1", "John Smith", "1990-03-14"),
            person("p2", "Jon Smith", "1990-03-14"),
            person("p3", "Alice Wong", "1985-07-02"),
        ];
        let clusters = resolver.resolve(&records);
        assert_eq!(clusters.len(), 2);
        let first = &clusters[0];
        assert_eq!(first.entity_id, "p1");
        assert_eq!(first.merge_candidates.len(), 1);
        assert_eq!(first.merge_candidates[0].other_id, "p2");
        // Solo cluster has confidence 1.0
        assert!((clusters[1].confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn threshold_is_inclusive() {
        // A score exactly at the threshold is a match.
        let resolver = EntityResolver::new(1.0, 1.0, 0.8);
        let records = vec![
            person("p1", "John Smith", "1990-03-14"),
            person("p2", "John Smith", "1990-03-14"),
        ];
        let clusters = resolver.resolve(&records);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].merge_candidates.len(), 1);
    }

    #[test]
    fn resolution_is_idempotent() {
        let resolver = EntityResolver::new(0.75, 0.9, 0.8);
        let records = vec![
            person("p1", "John Smith", "1990-03-14"),
            person("p2", "Jon Smith", "1990-03-14"),
            person("p3", "Alice Wong", "1985-07-02"),
        ];
        let a = resolver.resolve(&records);
        let b = resolver.resolve(&records);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.entity_id, y.entity_id);
            assert_eq!(x.source_ids, y.source_ids);
        }
    }

    #[test]
    fn merge_candidates_meet_threshold() {
        let resolver = EntityResolver::new(0.75, 0.9, 0.8);
        let records = vec![
            person("p1", "John Smith", "1990-03-14"),
            person("p2", "Jon Smith", "1990-03-14"),
            person("p3", "Johnny Smithe", "1990-03-14"),
        ];
        for cluster in resolver.resolve(&records) {
            for c in &cluster.merge_candidates {
                assert!(c.similarity >= 0.75);
            }
        }
    }
}
