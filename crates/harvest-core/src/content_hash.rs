//! Deterministic content hashing for issues.
//!
//! Produces a SHA-256 hex digest over the harvested fields (excluding the
//! harvest timestamp) so an upsert of unchanged upstream data can be told
//! apart from a real update.

use sha2::{Digest, Sha256};

use crate::issue::Issue;

/// Separator byte written between fields.
const SEP: u8 = 0;

/// Computes a deterministic content hash for an issue.
pub fn compute_content_hash(issue: &Issue) -> String {
    let mut h = Sha256::new();

    write_str(&mut h, &issue.key);
    write_str(&mut h, &issue.summary);
    write_str(&mut h, &issue.type_id.to_string());
    write_str_opt(&mut h, issue.parent_key.as_deref());
    write_str(&mut h, issue.source.as_str());
    write_str(&mut h, &issue.status);
    write_str_opt(&mut h, issue.assignee.as_deref());
    write_str_opt(&mut h, issue.team.as_deref());

    // Labels are a sorted set, so iteration order is stable.
    for label in &issue.labels {
        write_str(&mut h, label);
    }
    h.update([SEP]);

    write_str_opt(&mut h, issue.created_at.map(|t| t.to_rfc3339()).as_deref());
    write_str_opt(&mut h, issue.updated_at.map(|t| t.to_rfc3339()).as_deref());

    format!("{:x}", h.finalize())
}

// -- helper writers --------------------------------------------------------

fn write_str(h: &mut Sha256, s: &str) {
    h.update(s.as_bytes());
    h.update([SEP]);
}

fn write_str_opt(h: &mut Sha256, s: Option<&str>) {
    if let Some(s) = s {
        h.update(s.as_bytes());
    }
    h.update([SEP]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::IssueBuilder;
    use chrono::{TimeZone, Utc};

    #[test]
    fn content_hash_deterministic() {
        let issue = IssueBuilder::new("A-1", 1).summary("x").label("l").build();
        let hash1 = compute_content_hash(&issue);
        let hash2 = compute_content_hash(&issue);
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn content_hash_differs_on_change() {
        let a = IssueBuilder::new("A-1", 1).status("Open").build();
        let b = IssueBuilder::new("A-1", 1).status("Done").build();
        assert_ne!(compute_content_hash(&a), compute_content_hash(&b));
    }

    #[test]
    fn content_hash_ignores_harvest_time() {
        let a = IssueBuilder::new("A-1", 1)
            .harvested_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .build();
        let b = IssueBuilder::new("A-1", 1)
            .harvested_at(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
            .build();
        assert_eq!(compute_content_hash(&a), compute_content_hash(&b));
    }

    #[test]
    fn label_boundaries_matter() {
        let a = IssueBuilder::new("A-1", 1).labels(["ab"]).build();
        let b = IssueBuilder::new("A-1", 1).labels(["a", "b"]).build();
        assert_ne!(compute_content_hash(&a), compute_content_hash(&b));
    }
}
