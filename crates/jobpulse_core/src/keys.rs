//! Stable hash keys used for the deduplication ledger (spec §4.10, §4.11).

use blake3::Hasher;

const SEP: u8 = 0x1f;

fn hash_parts(parts: &[&str]) -> String {
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(&[SEP]);
    }
    hasher.finalize().to_hex().to_string()
}

/// `(candidate_id, note_kind=AI_VETTING, resume_content_hash)` — spec §4.10 step 4.
pub fn note_dedup_key(candidate_id: &str, resume_content_hash: &str) -> String {
    hash_parts(&["AI_VETTING", candidate_id, resume_content_hash])
}

/// `(notification_kind, recipient_set_fingerprint, candidate_id)` — spec §4.10 step 7.
pub fn email_dedup_key(notification_kind: &str, recipients: &[&str], candidate_id: &str) -> String {
    let mut sorted: Vec<&str> = recipients.to_vec();
    sorted.sort_unstable();
    let fingerprint = sorted.join(",");
    hash_parts(&[notification_kind, &fingerprint, candidate_id])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_key_is_stable_and_distinguishes_hash() {
        let a = note_dedup_key("cand-1", "hash-a");
        let b = note_dedup_key("cand-1", "hash-a");
        let c = note_dedup_key("cand-1", "hash-b");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn email_key_is_order_independent_in_recipients() {
        let a = email_dedup_key("qualified", &["b@x.com", "a@x.com"], "cand-1");
        let b = email_dedup_key("qualified", &["a@x.com", "b@x.com"], "cand-1");
        assert_eq!(a, b);
    }
}
