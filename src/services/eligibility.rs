//! Pure eligibility evaluator. Callers never decide eligibility from cached
//! flags; both admission and finalization come through here.

use chrono::{DateTime, Utc};

use crate::{
    clock::Deadlines,
    dao::models::{
        EligibilityReason, EligibilitySnapshot, PaymentEntity, PaymentStatus, QuizEntity,
    },
    state::lifecycle::QuizState,
};

/// Where the evaluation happens; admission additionally requires a live quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalContext {
    Admission,
    Finalization,
}

/// What the engine knows about the user at evaluation time. Profile and
/// subscription facts come from the external user service; the defaults
/// describe a complete profile with no extra requirements.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: String,
    pub profile_complete: bool,
    pub subscription_required: bool,
    pub subscription_active: bool,
    pub required_streak: Option<u32>,
    pub streak_days: u32,
}

impl UserContext {
    pub fn assumed_complete(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            profile_complete: true,
            subscription_required: false,
            subscription_active: false,
            required_streak: None,
            streak_days: 0,
        }
    }
}

/// Evaluate `(user, payment, quiz, now)` into an eligibility outcome.
pub fn evaluate(
    context: EvalContext,
    user: &UserContext,
    payment: Option<&PaymentEntity>,
    quiz: &QuizEntity,
    deadlines: &Deadlines,
    now: DateTime<Utc>,
) -> EligibilitySnapshot {
    if context == EvalContext::Admission {
        if quiz.state.results_readable() {
            return ineligible(EligibilityReason::QuizEnded);
        }
        if quiz.state != QuizState::Live {
            return ineligible(EligibilityReason::QuizNotLive);
        }
        if now > deadlines.end_at {
            return ineligible(EligibilityReason::QuizEnded);
        }
    }

    if !user.profile_complete {
        return ineligible(EligibilityReason::ProfileIncomplete);
    }
    if user.subscription_required && !user.subscription_active {
        return ineligible(EligibilityReason::SubscriptionRequired);
    }
    if let Some(required) = user.required_streak
        && user.streak_days < required
    {
        return ineligible(EligibilityReason::InsufficientStreak);
    }

    match payment {
        Some(paid) => match paid.status {
            PaymentStatus::Refunded => ineligible(EligibilityReason::RefundVoidsEligibility),
            PaymentStatus::Success => {
                // SUCCESS is only assigned to captures inside the window, but
                // the capture stamp is re-checked so a drifted record cannot
                // grant entry.
                match paid.captured_at {
                    Some(captured) if captured <= deadlines.payment_cutoff_at => EligibilitySnapshot {
                        eligible: true,
                        reason: EligibilityReason::Eligible,
                    },
                    _ => ineligible(EligibilityReason::PaymentMissing),
                }
            }
            _ => ineligible(EligibilityReason::PaymentMissing),
        },
        None => ineligible(EligibilityReason::PaymentMissing),
    }
}

fn ineligible(reason: EligibilityReason) -> EligibilitySnapshot {
    EligibilitySnapshot {
        eligible: false,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::QuizDate, dao::models::PaymentKind};
    use chrono::{Duration, TimeZone};

    fn date() -> QuizDate {
        "2025-03-02".parse().unwrap()
    }

    fn deadlines() -> Deadlines {
        let live_at = Utc.with_ymd_and_hms(2025, 3, 2, 14, 30, 0).unwrap();
        Deadlines {
            lock_at: live_at - Duration::minutes(10),
            payment_cutoff_at: live_at - Duration::minutes(5),
            live_at,
            end_at: live_at + Duration::minutes(30),
        }
    }

    fn live_quiz() -> QuizEntity {
        let mut quiz = QuizEntity::new(date(), "6".into(), vec![], deadlines().lock_at);
        quiz.state = QuizState::Live;
        quiz
    }

    fn success_payment(captured_at: DateTime<Utc>) -> PaymentEntity {
        PaymentEntity {
            user_id: "u1".into(),
            date: date(),
            status: PaymentStatus::Success,
            kind: PaymentKind::Gateway,
            amount_minor: 1000,
            order_id: Some("order-1".into()),
            capture_event_id: Some("evt-1".into()),
            captured_at: Some(captured_at),
            refunded_at: None,
            created_at: captured_at,
            updated_at: captured_at,
        }
    }

    #[test]
    fn paid_on_time_is_eligible() {
        let deadlines = deadlines();
        let payment = success_payment(deadlines.payment_cutoff_at);
        let result = evaluate(
            EvalContext::Admission,
            &UserContext::assumed_complete("u1"),
            Some(&payment),
            &live_quiz(),
            &deadlines,
            deadlines.live_at,
        );
        assert!(result.eligible);
        assert_eq!(result.reason, EligibilityReason::Eligible);
    }

    #[test]
    fn capture_one_ms_past_cutoff_is_not_eligible() {
        let deadlines = deadlines();
        let payment = success_payment(deadlines.payment_cutoff_at + Duration::milliseconds(1));
        let result = evaluate(
            EvalContext::Admission,
            &UserContext::assumed_complete("u1"),
            Some(&payment),
            &live_quiz(),
            &deadlines,
            deadlines.live_at,
        );
        assert!(!result.eligible);
        assert_eq!(result.reason, EligibilityReason::PaymentMissing);
    }

    #[test]
    fn missing_payment_is_reported() {
        let deadlines = deadlines();
        let result = evaluate(
            EvalContext::Admission,
            &UserContext::assumed_complete("u1"),
            None,
            &live_quiz(),
            &deadlines,
            deadlines.live_at,
        );
        assert_eq!(result.reason, EligibilityReason::PaymentMissing);
    }

    #[test]
    fn quiz_must_be_live_for_admission() {
        let deadlines = deadlines();
        let mut quiz = live_quiz();
        quiz.state = QuizState::Locked;
        let result = evaluate(
            EvalContext::Admission,
            &UserContext::assumed_complete("u1"),
            None,
            &quiz,
            &deadlines,
            deadlines.live_at,
        );
        assert_eq!(result.reason, EligibilityReason::QuizNotLive);

        quiz.state = QuizState::Ended;
        let result = evaluate(
            EvalContext::Admission,
            &UserContext::assumed_complete("u1"),
            None,
            &quiz,
            &deadlines,
            deadlines.end_at,
        );
        assert_eq!(result.reason, EligibilityReason::QuizEnded);
    }

    #[test]
    fn refund_voids_eligibility_at_finalization() {
        let deadlines = deadlines();
        let mut payment = success_payment(deadlines.payment_cutoff_at);
        payment.status = PaymentStatus::Refunded;
        payment.refunded_at = Some(deadlines.end_at);

        let mut quiz = live_quiz();
        quiz.state = QuizState::Ended;
        let result = evaluate(
            EvalContext::Finalization,
            &UserContext::assumed_complete("u1"),
            Some(&payment),
            &quiz,
            &deadlines,
            deadlines.end_at + Duration::minutes(1),
        );
        assert_eq!(result.reason, EligibilityReason::RefundVoidsEligibility);
    }

    #[test]
    fn incomplete_profile_blocks_entry() {
        let deadlines = deadlines();
        let mut user = UserContext::assumed_complete("u1");
        user.profile_complete = false;
        let result = evaluate(
            EvalContext::Admission,
            &user,
            None,
            &live_quiz(),
            &deadlines,
            deadlines.live_at,
        );
        assert_eq!(result.reason, EligibilityReason::ProfileIncomplete);
    }
}
