//! Deterministic per-user shuffles. Both the question order and the per-slot
//! option order are derived from stable seeds, so retries and replay always
//! reproduce the same ordering without storing it.

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::{clock::QuizDate, utils::hash::seed32};

/// Permutation of question indices a user walks through on a given day.
/// `result[slot]` is the index into the quiz's ordered question list.
pub fn question_permutation(user_id: &str, date: QuizDate, question_count: usize) -> Vec<u16> {
    let date_str = date.to_string();
    let seed = seed32(&["question-order", user_id, &date_str]);
    let mut rng = StdRng::from_seed(seed);

    let mut order: Vec<u16> = (0..question_count as u16).collect();
    order.shuffle(&mut rng);
    order
}

/// Permutation of the four option positions for one slot.
/// `result[display_index]` is the original option index.
pub fn option_permutation(user_id: &str, date: QuizDate, slot: usize, options: usize) -> Vec<u8> {
    let date_str = date.to_string();
    let slot_str = slot.to_string();
    let seed = seed32(&["option-order", user_id, &date_str, &slot_str]);
    let mut rng = StdRng::from_seed(seed);

    let mut order: Vec<u8> = (0..options as u8).collect();
    order.shuffle(&mut rng);
    order
}

/// Map a displayed option index back to the original option index.
pub fn to_original_option(option_perm: &[u8], displayed: u8) -> Option<u8> {
    option_perm.get(displayed as usize).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> QuizDate {
        "2025-03-02".parse().unwrap()
    }

    #[test]
    fn question_permutation_is_deterministic_per_user() {
        let a = question_permutation("user-1", date(), 50);
        let b = question_permutation("user-1", date(), 50);
        assert_eq!(a, b);

        let other = question_permutation("user-2", date(), 50);
        assert_ne!(a, other);
    }

    #[test]
    fn question_permutation_covers_every_index() {
        let mut order = question_permutation("user-1", date(), 50);
        order.sort_unstable();
        assert_eq!(order, (0..50).collect::<Vec<u16>>());
    }

    #[test]
    fn option_permutation_varies_by_slot() {
        let slots: Vec<Vec<u8>> = (0..50)
            .map(|slot| option_permutation("user-1", date(), slot, 4))
            .collect();
        // 50 slots over 24 arrangements cannot all be identical.
        assert!(slots.iter().any(|perm| perm != &slots[0]));
        for perm in &slots {
            let mut sorted = perm.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, vec![0, 1, 2, 3]);
        }
    }

    #[test]
    fn displayed_to_original_round_trip() {
        let perm = option_permutation("user-1", date(), 7, 4);
        for displayed in 0..4u8 {
            let original = to_original_option(&perm, displayed).unwrap();
            assert_eq!(perm[displayed as usize], original);
        }
        assert_eq!(to_original_option(&perm, 4), None);
    }
}
