//! End-to-end engine scenarios over the in-memory store and coordinator,
//! driven by a manual clock.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::Mac;
use uuid::Uuid;

use brainrush_back::{
    clock::{Deadlines, ManualClock, QuizDate},
    config::AppConfig,
    coordinator::{AdvancePosition, Coordinator, CoordinatorHandle, memory::MemoryCoordinator},
    dao::{
        models::{
            EligibilityReason, PaymentEntity, PaymentKind, PaymentStatus, QuestionEntity,
            QuizEntity,
        },
        quiz_store::{QuizStore, memory::MemoryQuizStore},
    },
    dto::quiz::{AnswerRequest, AnswerResponse},
    error::ServiceError,
    services::{
        admission_service::{self, DeviceInfo},
        advancement, answer_service, finalize_service, payment_service, question_service,
        quiz_service, scheduler,
    },
    state::{
        AppState, SharedState,
        lifecycle::{Actor, QuizState},
    },
    utils::permute,
};

struct Harness {
    state: SharedState,
    store: MemoryQuizStore,
    clock: Arc<ManualClock>,
    coordinator_backend: Arc<MemoryCoordinator>,
    date: QuizDate,
    deadlines: Deadlines,
    questions: Vec<QuestionEntity>,
}

/// 2025-03-02 20:00 IST, the live anchor used throughout.
fn live_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 2, 14, 30, 0).unwrap()
}

fn device(owner: &str) -> DeviceInfo {
    DeviceInfo {
        device_id: format!("{owner}-device"),
        fingerprint: format!("{owner}-fingerprint"),
        ip: "10.1.2.3".into(),
    }
}

fn fifty_questions() -> Vec<QuestionEntity> {
    (0..50)
        .map(|index| QuestionEntity {
            id: Uuid::new_v4(),
            text: format!("question {index}"),
            options: vec![
                format!("option {index}-a"),
                format!("option {index}-b"),
                format!("option {index}-c"),
                format!("option {index}-d"),
            ],
            correct_index: (index % 4) as u8,
        })
        .collect()
}

async fn harness() -> Harness {
    harness_with(Arc::new(MemoryCoordinator::new()), MemoryQuizStore::new()).await
}

/// Build an engine "process" around shared backends, so multi-process
/// scenarios can share a store (and optionally a coordinator).
async fn harness_with(backend: Arc<MemoryCoordinator>, store: MemoryQuizStore) -> Harness {
    let config = AppConfig::for_tests();
    let clock = Arc::new(ManualClock::new(live_instant()));
    let coordinator = Arc::new(CoordinatorHandle::new(backend.clone()));
    let state = AppState::new(config, clock.clone(), coordinator);
    state.install_quiz_store(Arc::new(store.clone())).await;

    let date: QuizDate = "2025-03-02".parse().unwrap();
    let deadlines = state.calendar().deadlines_for(date);
    assert_eq!(deadlines.live_at, live_instant());

    Harness {
        state,
        store,
        clock,
        coordinator_backend: backend,
        date,
        deadlines,
        questions: Vec::new(),
    }
}

impl Harness {
    /// Seed a quiz already in the LIVE state at the daily anchor.
    async fn seed_live_quiz(&mut self) {
        let mut quiz = QuizEntity::new(
            self.date,
            "6".into(),
            fifty_questions(),
            self.deadlines.lock_at - Duration::hours(6),
        );
        quiz.state = QuizState::Live;
        quiz.locked_at = Some(self.deadlines.lock_at);
        quiz.payment_closed_at = Some(self.deadlines.payment_cutoff_at);
        quiz.live_at = Some(self.deadlines.live_at);
        self.questions = quiz.questions.clone();
        self.store.upsert_quiz(quiz).await.unwrap();
    }

    async fn pay_on_time(&self, user: &str) {
        self.save_payment(user, PaymentStatus::Success, self.deadlines.payment_cutoff_at)
            .await;
    }

    async fn save_payment(&self, user: &str, status: PaymentStatus, captured_at: DateTime<Utc>) {
        let payment = PaymentEntity {
            user_id: user.into(),
            date: self.date,
            status,
            kind: PaymentKind::Gateway,
            amount_minor: 2_500,
            order_id: Some(format!("order-{user}")),
            capture_event_id: Some(format!("evt-{user}")),
            captured_at: Some(captured_at),
            refunded_at: None,
            created_at: captured_at,
            updated_at: captured_at,
        };
        self.store.save_payment(payment).await.unwrap();
    }

    /// Put the shared index on `slot`, opening its 15-second window.
    async fn open_slot(&self, slot: usize) -> DateTime<Utc> {
        let started_at = self.deadlines.live_at + Duration::seconds(15 * slot as i64);
        self.coordinator_backend
            .advance_to(
                self.date,
                AdvancePosition {
                    index: slot as u32,
                    started_at,
                },
            )
            .await
            .unwrap();
        self.clock.set(started_at);
        started_at
    }

    /// Serve and correctly answer `slot` for `user`, three seconds in.
    async fn answer_slot_correctly(&self, user: &str, slot: usize) -> AnswerResponse {
        let started_at = self.open_slot(slot).await;

        let question = question_service::current_question(&self.state, user)
            .await
            .unwrap();
        assert_eq!(question.slot, slot);

        self.clock.set(started_at + Duration::seconds(3));
        self.submit(user, slot, question.question_id, true)
            .await
            .unwrap()
    }

    async fn submit(
        &self,
        user: &str,
        slot: usize,
        question_id: Uuid,
        correct: bool,
    ) -> Result<AnswerResponse, ServiceError> {
        let question_index =
            usize::from(permute::question_permutation(user, self.date, 50)[slot]);
        let correct_original = self.questions[question_index].correct_index;
        let option_perm = permute::option_permutation(user, self.date, slot, 4);
        let displayed = option_perm
            .iter()
            .position(|original| (*original == correct_original) == correct)
            .unwrap() as u8;

        answer_service::submit_answer(
            &self.state,
            user,
            AnswerRequest {
                question_id,
                selected_option_index: displayed,
                device_id: device(user).device_id,
                device_fingerprint: device(user).fingerprint,
            },
            device(user),
        )
        .await
    }

    async fn end_quiz(&self) {
        self.clock.set(self.deadlines.end_at);
        quiz_service::apply_transition(&self.state, self.date, QuizState::Ended, Actor::System)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn happy_leaderboard_of_three() {
    let mut h = harness().await;
    h.seed_live_quiz().await;
    for user in ["u1", "u2", "u3"] {
        h.pay_on_time(user).await;
    }

    h.clock.set(h.deadlines.live_at);
    for user in ["u1", "u2", "u3"] {
        let joined = admission_service::join(&h.state, user, device(user))
            .await
            .unwrap();
        assert!(joined.response.eligible);
    }

    for slot in 0..50 {
        for user in ["u1", "u2", "u3"] {
            let response = h.answer_slot_correctly(user, slot).await;
            assert!(response.is_correct);
            assert!(response.counts_for_score);
            assert!(!response.already_answered);
        }
    }

    // U1 finishes at 20:22, U2 at 20:23, U3 at 20:24 local time.
    for (user, minutes) in [("u1", 22), ("u2", 23), ("u3", 24)] {
        h.clock
            .set(h.deadlines.live_at + Duration::minutes(minutes));
        let finished = answer_service::finish(&h.state, user).await.unwrap();
        assert_eq!(finished.score, 50);
        assert!(finished.counted);
    }

    h.end_quiz().await;
    let summary = finalize_service::finalize(&h.state, h.date, Actor::System, false)
        .await
        .unwrap()
        .expect("fence should admit the first finalizer");
    assert_eq!(summary.winners, 3);
    assert_eq!(summary.counted_attempts, 3);

    let winners = h.store.list_winners(h.date).await.unwrap();
    assert_eq!(winners.len(), 3);
    assert_eq!(
        winners.iter().map(|w| w.user_id.as_str()).collect::<Vec<_>>(),
        ["u1", "u2", "u3"]
    );
    assert_eq!(
        winners.iter().map(|w| w.rank).collect::<Vec<_>>(),
        [1, 2, 3]
    );
    assert!(winners.iter().all(|w| w.score == 50));
    assert_eq!(
        winners.iter().map(|w| w.total_time_ms).collect::<Vec<_>>(),
        [1_320_000, 1_380_000, 1_440_000]
    );
    assert!(winners.iter().all(|w| w.accuracy == 1.0));
    assert!(winners.iter().all(|w| !w.quiz_integrity_hash.is_empty()));

    let quiz = h.store.find_quiz(h.date).await.unwrap().unwrap();
    assert_eq!(quiz.state, QuizState::Finalized);
}

#[tokio::test]
async fn late_payment_is_admitted_but_never_counts() {
    let mut h = harness().await;
    h.seed_live_quiz().await;
    // Captured one minute past the cutoff: the webhook would mark it LATE.
    h.save_payment(
        "late-user",
        PaymentStatus::Late,
        h.deadlines.payment_cutoff_at + Duration::minutes(1),
    )
    .await;

    h.clock.set(h.deadlines.live_at);
    let joined = admission_service::join(&h.state, "late-user", device("late-user"))
        .await
        .unwrap();
    assert!(!joined.response.eligible);
    assert_eq!(
        joined.response.eligibility_reason,
        EligibilityReason::PaymentMissing
    );

    for slot in 0..3 {
        let response = h.answer_slot_correctly("late-user", slot).await;
        assert!(response.is_correct);
        assert!(!response.counts_for_score);
    }

    h.clock.set(h.deadlines.live_at + Duration::minutes(5));
    answer_service::finish(&h.state, "late-user").await.unwrap();

    h.end_quiz().await;
    finalize_service::finalize(&h.state, h.date, Actor::System, false)
        .await
        .unwrap()
        .unwrap();

    assert!(h.store.list_winners(h.date).await.unwrap().is_empty());
    let attempt = h
        .store
        .find_attempt("late-user".into(), h.date)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attempt.counted, Some(false));
    assert_eq!(attempt.score, Some(3));
}

#[tokio::test]
async fn device_switch_mid_quiz_is_rejected_and_recorded() {
    let mut h = harness().await;
    h.seed_live_quiz().await;
    h.pay_on_time("u1").await;

    h.clock.set(h.deadlines.live_at);
    admission_service::join(&h.state, "u1", device("u1"))
        .await
        .unwrap();

    let started_at = h.open_slot(0).await;
    let question = question_service::current_question(&h.state, "u1")
        .await
        .unwrap();
    h.clock.set(started_at + Duration::seconds(5));

    let err = answer_service::submit_answer(
        &h.state,
        "u1",
        AnswerRequest {
            question_id: question.question_id,
            selected_option_index: 0,
            device_id: "other-device".into(),
            device_fingerprint: "other-fingerprint".into(),
        },
        DeviceInfo {
            device_id: "other-device".into(),
            fingerprint: "other-fingerprint".into(),
            ip: "10.9.9.9".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ServiceError::DeviceMismatch));

    let events = h.store.anticheat_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].user_id.as_deref(), Some("u1"));

    let attempt = h.store.find_attempt("u1".into(), h.date).await.unwrap().unwrap();
    assert!(attempt.answers.iter().all(Option::is_none));
}

#[tokio::test]
async fn crash_then_resume_catches_up_the_timeline() {
    let mut h = harness().await;
    h.seed_live_quiz().await;

    // First process advanced to slot 12, then died at 20:03.
    h.open_slot(12).await;

    // A fresh process shares the store but has lost the in-process
    // coordinator; its scheduler resumes from the published timeline.
    let h2 = harness_with(Arc::new(MemoryCoordinator::new()), h.store.clone()).await;
    h2.clock
        .set(h.deadlines.live_at + Duration::minutes(5));

    assert!(!h2.state.has_session(h2.date));
    scheduler::tick(&h2.state).await.unwrap();
    assert!(h2.state.has_session(h2.date));

    // Store-derived fallback lands on the published cadence: slot 20 at +5m.
    let position = advancement::resolve_position(&h2.state, h2.date, h2.deadlines.live_at).await;
    assert_eq!(position.index, 20);
    assert_eq!(
        position.started_at,
        h2.deadlines.live_at + Duration::seconds(300)
    );
}

#[tokio::test]
async fn finalization_contention_has_a_single_writer() {
    let shared_backend = Arc::new(MemoryCoordinator::new());
    let shared_store = MemoryQuizStore::new();

    let mut h1 = harness_with(shared_backend.clone(), shared_store.clone()).await;
    let h2 = harness_with(shared_backend, shared_store).await;

    h1.seed_live_quiz().await;
    h1.pay_on_time("u1").await;
    h1.clock.set(h1.deadlines.live_at);
    admission_service::join(&h1.state, "u1", device("u1"))
        .await
        .unwrap();
    for slot in 0..2 {
        h1.answer_slot_correctly("u1", slot).await;
    }
    h1.clock.set(h1.deadlines.live_at + Duration::minutes(4));
    answer_service::finish(&h1.state, "u1").await.unwrap();
    h1.end_quiz().await;
    h2.clock.set(h1.deadlines.end_at);

    let first = finalize_service::finalize(&h1.state, h1.date, Actor::System, false)
        .await
        .unwrap();
    assert!(first.is_some());
    let winners_after_first = h1.store.list_winners(h1.date).await.unwrap();

    // The loser receives token 2 and returns without effect.
    let second = finalize_service::finalize(&h2.state, h2.date, Actor::System, false)
        .await
        .unwrap();
    assert!(second.is_none());

    let winners_after_second = h1.store.list_winners(h1.date).await.unwrap();
    assert_eq!(winners_after_first.len(), winners_after_second.len());
    assert_eq!(winners_after_first.len(), 1);
    assert_eq!(
        winners_after_first[0].attempt_integrity_hash,
        winners_after_second[0].attempt_integrity_hash
    );
}

#[tokio::test]
async fn refund_after_start_voids_counting() {
    let mut h = harness().await;
    h.seed_live_quiz().await;
    h.pay_on_time("u1").await;

    h.clock.set(h.deadlines.live_at);
    let joined = admission_service::join(&h.state, "u1", device("u1"))
        .await
        .unwrap();
    assert!(joined.response.eligible);

    for slot in 0..5 {
        let response = h.answer_slot_correctly("u1", slot).await;
        assert!(response.counts_for_score);
    }
    h.clock.set(h.deadlines.live_at + Duration::minutes(6));
    answer_service::finish(&h.state, "u1").await.unwrap();

    // Refund lands between ENDED and finalization.
    h.end_quiz().await;
    let mut payment = h
        .store
        .find_payment("u1".into(), h.date)
        .await
        .unwrap()
        .unwrap();
    payment.status = PaymentStatus::Refunded;
    payment.refunded_at = Some(h.deadlines.end_at);
    h.store.save_payment(payment).await.unwrap();

    finalize_service::finalize(&h.state, h.date, Actor::System, false)
        .await
        .unwrap()
        .unwrap();

    assert!(h.store.list_winners(h.date).await.unwrap().is_empty());
    let attempt = h.store.find_attempt("u1".into(), h.date).await.unwrap().unwrap();
    assert_eq!(attempt.counted, Some(false));
    assert_eq!(
        attempt.counted_reason,
        Some(EligibilityReason::RefundVoidsEligibility)
    );
    assert_eq!(attempt.score, Some(5));
}

#[tokio::test]
async fn joining_twice_returns_the_same_attempt() {
    let mut h = harness().await;
    h.seed_live_quiz().await;
    h.pay_on_time("u1").await;
    h.clock.set(h.deadlines.live_at);

    let first = admission_service::join(&h.state, "u1", device("u1"))
        .await
        .unwrap();
    let second = admission_service::join(&h.state, "u1", device("u1"))
        .await
        .unwrap();
    assert_eq!(first.response.attempt_id, second.response.attempt_id);

    // A different device cannot adopt the attempt.
    let err = admission_service::join(&h.state, "u1", device("intruder"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::DeviceMismatch));
}

#[tokio::test]
async fn duplicate_answers_are_idempotent() {
    let mut h = harness().await;
    h.seed_live_quiz().await;
    h.pay_on_time("u1").await;
    h.clock.set(h.deadlines.live_at);
    admission_service::join(&h.state, "u1", device("u1"))
        .await
        .unwrap();

    let first = h.answer_slot_correctly("u1", 0).await;
    assert!(!first.already_answered);

    let question = question_service::current_question(&h.state, "u1")
        .await
        .unwrap();
    let second = h.submit("u1", 0, question.question_id, false).await.unwrap();
    assert!(second.already_answered);
    // The stored answer is unchanged, so correctness reports the first pick.
    assert!(second.is_correct);

    let attempt = h.store.find_attempt("u1".into(), h.date).await.unwrap().unwrap();
    assert_eq!(attempt.answered_count(), 1);
}

#[tokio::test]
async fn answer_window_boundaries_are_exact() {
    let mut h = harness().await;
    h.seed_live_quiz().await;
    h.pay_on_time("u1").await;
    h.clock.set(h.deadlines.live_at);
    admission_service::join(&h.state, "u1", device("u1"))
        .await
        .unwrap();

    let started_at = h.open_slot(0).await;
    let question = question_service::current_question(&h.state, "u1")
        .await
        .unwrap();

    // One millisecond past the window is rejected...
    h.clock
        .set(started_at + Duration::milliseconds(15_001));
    let err = h
        .submit("u1", 0, question.question_id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::TimeExpired));

    // ...while exactly 15000 ms is accepted.
    h.clock.set(started_at + Duration::milliseconds(15_000));
    let response = h.submit("u1", 0, question.question_id, true).await.unwrap();
    assert!(response.is_correct);
}

#[tokio::test]
async fn personal_window_hard_cap_is_exact() {
    let mut h = harness().await;
    h.seed_live_quiz().await;
    h.pay_on_time("u1").await;
    h.clock.set(h.deadlines.live_at);
    admission_service::join(&h.state, "u1", device("u1"))
        .await
        .unwrap();

    // Open the last slot with its window reaching past the personal cap.
    let cap = h.deadlines.live_at + Duration::minutes(30);
    h.coordinator_backend
        .advance_to(
            h.date,
            AdvancePosition {
                index: 49,
                started_at: cap - Duration::seconds(5),
            },
        )
        .await
        .unwrap();
    h.clock.set(cap - Duration::seconds(5));
    let question = question_service::current_question(&h.state, "u1")
        .await
        .unwrap();

    h.clock.set(cap);
    let response = h.submit("u1", 49, question.question_id, true).await.unwrap();
    assert!(response.is_correct);

    // One millisecond over the personal cap is rejected before any other
    // gate runs.
    h.clock.set(cap + Duration::milliseconds(1));
    let err = h
        .submit("u1", 49, question.question_id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::TimeExpired));
}

#[tokio::test]
async fn rapid_answers_trip_the_anticheat_wire() {
    let mut h = harness().await;
    h.seed_live_quiz().await;
    h.pay_on_time("u1").await;
    h.clock.set(h.deadlines.live_at);
    admission_service::join(&h.state, "u1", device("u1"))
        .await
        .unwrap();

    let started_at = h.open_slot(0).await;
    let question = question_service::current_question(&h.state, "u1")
        .await
        .unwrap();

    h.clock.set(started_at + Duration::milliseconds(500));
    let err = h
        .submit("u1", 0, question.question_id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::RapidAnswer));
    assert_eq!(h.store.anticheat_events().len(), 1);
}

#[tokio::test]
async fn webhook_is_idempotent_and_respects_the_cutoff() {
    let mut h = harness().await;
    h.seed_live_quiz().await;

    let secret = h.state.config().webhook_secret.clone();
    let sign = |body: &[u8]| {
        let mut mac =
            hmac::Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    };

    // Captured exactly at the cutoff: SUCCESS.
    h.clock.set(h.deadlines.payment_cutoff_at);
    let body = serde_json::json!({
        "eventId": "evt-100",
        "eventType": "payment.captured",
        "orderId": "order-100",
        "userId": "u1",
        "date": "2025-03-02",
        "amountMinor": 2500,
        "createdAt": h.deadlines.payment_cutoff_at,
    });
    let raw = serde_json::to_vec(&body).unwrap();
    let ack = payment_service::process_webhook(&h.state, &raw, &sign(&raw))
        .await
        .unwrap();
    assert!(ack.processed);

    let payment = h.store.find_payment("u1".into(), h.date).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);

    // Replay of the same event id is a no-op.
    let replay = payment_service::process_webhook(&h.state, &raw, &sign(&raw))
        .await
        .unwrap();
    assert!(replay.duplicate);

    // One millisecond past the cutoff lands as LATE for another user.
    let late_at = h.deadlines.payment_cutoff_at + Duration::milliseconds(1);
    h.clock.set(late_at);
    let late_body = serde_json::json!({
        "eventId": "evt-101",
        "eventType": "payment.captured",
        "orderId": "order-101",
        "userId": "u2",
        "date": "2025-03-02",
        "amountMinor": 2500,
        "createdAt": late_at,
    });
    let raw = serde_json::to_vec(&late_body).unwrap();
    payment_service::process_webhook(&h.state, &raw, &sign(&raw))
        .await
        .unwrap();
    let payment = h.store.find_payment("u2".into(), h.date).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Late);

    // Tampered bodies never pass the signature gate.
    let err = payment_service::process_webhook(&h.state, b"{}", &sign(&raw))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}

#[tokio::test]
async fn scheduler_drives_the_full_daily_timeline() {
    let mut h = harness().await;
    // Quiz authored as a draft well before the day starts.
    let quiz = QuizEntity::new(
        h.date,
        "6".into(),
        fifty_questions(),
        h.deadlines.lock_at - Duration::hours(6),
    );
    h.questions = quiz.questions.clone();
    h.store.upsert_quiz(quiz).await.unwrap();

    // Before the lock deadline nothing moves.
    h.clock.set(h.deadlines.lock_at - Duration::minutes(1));
    scheduler::tick(&h.state).await.unwrap();
    assert_eq!(
        h.store.find_quiz(h.date).await.unwrap().unwrap().state,
        QuizState::Draft
    );

    // Startup recovery after the live anchor catches up every transition.
    h.clock.set(h.deadlines.live_at + Duration::seconds(30));
    scheduler::tick(&h.state).await.unwrap();
    let quiz = h.store.find_quiz(h.date).await.unwrap().unwrap();
    assert_eq!(quiz.state, QuizState::Live);
    assert_eq!(quiz.locked_at, Some(h.deadlines.live_at + Duration::seconds(30)));
    assert!(quiz.payment_closed_at.is_some());
    assert!(quiz.live_at.is_some());
    assert!(h.state.has_session(h.date));

    // Past the end deadline the quiz ends and finalizes in one pass.
    h.clock.set(h.deadlines.end_at + Duration::seconds(1));
    scheduler::tick(&h.state).await.unwrap();
    let quiz = h.store.find_quiz(h.date).await.unwrap().unwrap();
    assert_eq!(quiz.state, QuizState::Finalized);
    assert!(quiz.ended_at.is_some());
    assert!(quiz.finalized_at.is_some());
}
