//! Quiz lifecycle entry point and read paths. Every state mutation of the
//! quiz row funnels through [`apply_transition`].

use uuid::Uuid;

use crate::{
    clock::QuizDate,
    config::{OPTIONS_PER_QUESTION, QUESTIONS_PER_QUIZ},
    dao::models::{QuestionEntity, QuizEntity},
    dto::{
        admin::{CreateQuizRequest, QuizSummary},
        quiz::{LeaderboardRow, QuizStatusResponse, TodayQuiz, TodayQuizResponse},
        ws::QuizRoomEvent,
    },
    error::ServiceError,
    services::{advancement, observability},
    state::{
        SharedState,
        lifecycle::{Actor, QuizState, Transition},
    },
};

/// Apply a lifecycle transition for `date`, enforcing FSM legality, stamping
/// the timestamp, auditing, broadcasting, and managing the day's session.
pub async fn apply_transition(
    state: &SharedState,
    date: QuizDate,
    to: QuizState,
    actor: Actor,
) -> Result<Transition, ServiceError> {
    let store = state.require_store().await?;

    let quiz = store
        .find_quiz(date)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("no quiz for {date}")))?;
    let from = quiz.state;

    if !from.can_transition(to) {
        return Err(ServiceError::InvalidTransition { from, to });
    }

    let at = state.clock().now();
    let updated = store.transition_quiz(date, from, to, at).await?;

    let transition = Transition {
        date,
        from,
        to,
        at,
        actor,
    };
    observability::record_transition(state, &transition).await;

    state.rooms().broadcast(
        date,
        QuizRoomEvent::QuizStateChanged { date, from, to, at },
    );

    match to {
        QuizState::Live => {
            // This process won the LIVE transition; it owns advancement.
            let live_at = updated.live_at.unwrap_or(at);
            advancement::arm(state, date, live_at);
        }
        QuizState::Ended => {
            state.rooms().broadcast(date, QuizRoomEvent::QuizEnded { date });
            state.remove_session(date);
        }
        QuizState::ResultPublished => {
            state.remove_session(date);
            state.rooms().broadcast(date, QuizRoomEvent::QuizEnded { date });
            state.rooms().close(date);
        }
        _ => {}
    }

    Ok(transition)
}

/// Create or replace the draft quiz for a date (admin authoring).
pub async fn create_quiz(
    state: &SharedState,
    date: QuizDate,
    request: CreateQuizRequest,
) -> Result<QuizSummary, ServiceError> {
    let store = state.require_store().await?;

    if let Some(existing) = store.find_quiz(date).await?
        && existing.state != QuizState::Draft
    {
        return Err(ServiceError::Conflict(format!(
            "quiz {date} is {:?} and can no longer be replaced",
            existing.state
        )));
    }

    if request.questions.len() != QUESTIONS_PER_QUIZ {
        return Err(ServiceError::Validation(format!(
            "a quiz carries exactly {QUESTIONS_PER_QUIZ} questions, got {}",
            request.questions.len()
        )));
    }

    let questions: Vec<QuestionEntity> = request
        .questions
        .into_iter()
        .map(|question| {
            if question.options.len() != OPTIONS_PER_QUESTION {
                return Err(ServiceError::Validation(format!(
                    "every question carries exactly {OPTIONS_PER_QUESTION} options"
                )));
            }
            if usize::from(question.correct_index) >= OPTIONS_PER_QUESTION {
                return Err(ServiceError::Validation(
                    "correct option index out of range".into(),
                ));
            }
            Ok(QuestionEntity {
                id: Uuid::new_v4(),
                text: question.text,
                options: question.options,
                correct_index: question.correct_index,
            })
        })
        .collect::<Result<_, _>>()?;

    let quiz = QuizEntity::new(date, request.class_grade, questions, state.clock().now());
    let summary = QuizSummary {
        date,
        state: quiz.state,
        total_questions: quiz.questions.len(),
        class_grade: quiz.class_grade.clone(),
        question_ids: quiz.questions.iter().map(|question| question.id).collect(),
    };
    store.upsert_quiz(quiz).await?;

    Ok(summary)
}

/// `GET /quiz/today` read model.
pub async fn today(
    state: &SharedState,
    user_id: Option<&str>,
) -> Result<TodayQuizResponse, ServiceError> {
    let store = state.require_store().await?;
    let now = state.clock().now();
    let date = state.calendar().today(now);

    let Some(quiz) = store.find_quiz(date).await? else {
        return Ok(TodayQuizResponse {
            exists: false,
            quiz: None,
        });
    };

    let deadlines = state.calendar().deadlines_for(date);
    let (user_participated, user_eligible) = match user_id {
        Some(user) => match store.find_attempt(user.to_owned(), date).await? {
            Some(attempt) => (true, attempt.eligibility.eligible),
            None => (false, false),
        },
        None => (false, false),
    };

    Ok(TodayQuizResponse {
        exists: true,
        quiz: Some(TodayQuiz {
            date,
            state: quiz.state,
            is_live: quiz.state == QuizState::Live,
            is_completed: quiz.state.results_readable(),
            total_questions: quiz.questions.len(),
            class_grade: quiz.class_grade,
            live_at: quiz.live_at.or(Some(deadlines.live_at)),
            ends_at: quiz.ended_at.or(Some(deadlines.end_at)),
            user_participated,
            user_eligible,
        }),
    })
}

/// `GET /quiz/status` read model; cheap enough for tight polling.
pub async fn status(state: &SharedState) -> Result<QuizStatusResponse, ServiceError> {
    let store = state.require_store().await?;
    let date = state.calendar().today(state.clock().now());

    let status = match store.find_quiz(date).await? {
        Some(quiz) => quiz.state.as_str().to_owned(),
        None => "NO_QUIZ".to_owned(),
    };
    Ok(QuizStatusResponse { state: status })
}

/// `GET /quiz/leaderboard/{date}`; only readable after the quiz ends.
pub async fn leaderboard(
    state: &SharedState,
    date: QuizDate,
) -> Result<Vec<LeaderboardRow>, ServiceError> {
    let store = state.require_store().await?;

    let quiz = store
        .find_quiz(date)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("no quiz for {date}")))?;
    if !quiz.state.results_readable() {
        return Err(ServiceError::Conflict(format!(
            "leaderboard for {date} is not available while the quiz is {:?}",
            quiz.state
        )));
    }

    let winners = store.list_winners(date).await?;
    Ok(winners.into_iter().map(Into::into).collect())
}
