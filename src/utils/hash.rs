//! One-way digests used for device binding, question identity, and the
//! integrity hashes published in winner rows.

use sha2::{Digest, Sha256};

use crate::dao::models::QuestionEntity;

/// Separator between digest input fields. Field values never contain it.
const FIELD_SEP: u8 = 0x1f;

fn digest_parts(parts: &[&str]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([FIELD_SEP]);
    }
    hasher.finalize().into()
}

/// Hex digest over the given ordered fields.
pub fn sha256_hex(parts: &[&str]) -> String {
    hex::encode(digest_parts(parts))
}

/// 32-byte seed over the given ordered fields, for deterministic shuffles.
pub fn seed32(parts: &[&str]) -> [u8; 32] {
    digest_parts(parts)
}

/// Digest binding an attempt to the device that created it.
pub fn device_hash(device_id: &str, fingerprint: &str, ip: &str) -> String {
    sha256_hex(&["device", device_id, fingerprint, ip])
}

/// Digest of the device id alone, for mismatch classification.
pub fn device_id_hash(device_id: &str) -> String {
    sha256_hex(&["device-id", device_id])
}

/// Digest identifying the exact question content served at a slot.
pub fn question_hash(text: &str, options: &[String], slot: usize) -> String {
    let slot_str = slot.to_string();
    let mut parts: Vec<&str> = vec!["question", text];
    parts.extend(options.iter().map(String::as_str));
    parts.push(&slot_str);
    sha256_hex(&parts)
}

/// Digest over the ordered question list, proving what a quiz asked.
pub fn quiz_integrity_hash(questions: &[QuestionEntity]) -> String {
    let mut hasher = Sha256::new();
    for question in questions {
        hasher.update(question.text.as_bytes());
        hasher.update([FIELD_SEP]);
        for option in &question.options {
            hasher.update(option.as_bytes());
            hasher.update([FIELD_SEP]);
        }
        hasher.update(question.correct_index.to_le_bytes());
        hasher.update([FIELD_SEP]);
    }
    hex::encode(<[u8; 32]>::from(hasher.finalize()))
}

/// Digest over a user's answers, answer timestamps, and slot permutation,
/// proving what was scored for them.
pub fn attempt_integrity_hash(
    answers: &[Option<u8>],
    answer_times_ms: &[Option<i64>],
    permutation: &[u16],
) -> String {
    let mut hasher = Sha256::new();
    for answer in answers {
        match answer {
            Some(choice) => hasher.update([1, *choice]),
            None => hasher.update([0, 0]),
        }
    }
    hasher.update([FIELD_SEP]);
    for time in answer_times_ms {
        match time {
            Some(ms) => {
                hasher.update([1]);
                hasher.update(ms.to_le_bytes());
            }
            None => hasher.update([0]),
        }
    }
    hasher.update([FIELD_SEP]);
    for slot in permutation {
        hasher.update(slot.to_le_bytes());
    }
    hex::encode(<[u8; 32]>::from(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_hash_is_stable_and_input_sensitive() {
        let a = device_hash("dev-1", "fp-1", "10.0.0.1");
        let b = device_hash("dev-1", "fp-1", "10.0.0.1");
        let c = device_hash("dev-1", "fp-2", "10.0.0.1");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        // Without separators "ab"+"c" and "a"+"bc" would collide.
        assert_ne!(sha256_hex(&["ab", "c"]), sha256_hex(&["a", "bc"]));
    }

    #[test]
    fn question_hash_covers_slot() {
        let options = vec!["a".to_string(), "b".to_string()];
        assert_ne!(
            question_hash("q", &options, 0),
            question_hash("q", &options, 1)
        );
    }

    #[test]
    fn attempt_hash_distinguishes_unanswered_from_zero() {
        let perm = [0u16, 1];
        let a = attempt_integrity_hash(&[Some(0), None], &[Some(10), None], &perm);
        let b = attempt_integrity_hash(&[None, Some(0)], &[None, Some(10)], &perm);
        assert_ne!(a, b);
    }
}
