use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::post,
};
use validator::Validate;

use crate::{
    clock::QuizDate,
    dto::{
        admin::{CreateQuizRequest, FinalizeResponse, QuizSummary, TransitionResponse},
        common::ok,
    },
    error::{AppError, ServiceError},
    services::{
        auth::{AdminUser, SuperAdminUser},
        finalize_service, quiz_service,
    },
    state::{
        SharedState,
        lifecycle::{Actor, QuizState},
    },
};

/// Admin lifecycle and disaster-recovery routes. Every mutation is audited.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/admin/quiz/{date}", post(create_quiz))
        .route("/admin/quiz/{date}/lock", post(lock_quiz))
        .route("/admin/quiz/{date}/start", post(start_quiz))
        .route("/admin/quiz/{date}/end", post(end_quiz))
        .route("/admin/quiz/{date}/publish", post(publish_results))
        .route("/admin/quiz/{date}/force-finalize", post(force_finalize))
}

fn parse_date(raw: &str) -> Result<QuizDate, ServiceError> {
    raw.parse()
        .map_err(|_| ServiceError::Validation("dates use the YYYY-MM-DD form".into()))
}

async fn transition(
    state: &SharedState,
    raw_date: &str,
    to: QuizState,
    admin: String,
) -> Result<Json<crate::dto::common::Envelope<TransitionResponse>>, AppError> {
    let date = parse_date(raw_date)?;
    let applied =
        quiz_service::apply_transition(state, date, to, Actor::Admin(admin)).await?;
    Ok(ok(TransitionResponse {
        date: applied.date,
        from: applied.from,
        to: applied.to,
        at: applied.at,
    }))
}

#[utoipa::path(
    post,
    path = "/admin/quiz/{date}",
    tag = "admin",
    params(("date" = String, Path, description = "Quiz date, YYYY-MM-DD")),
    request_body = CreateQuizRequest,
    responses((status = 200, description = "Draft quiz created", body = QuizSummary))
)]
/// Create or replace the draft quiz for a date.
pub async fn create_quiz(
    State(state): State<SharedState>,
    AdminUser(_claims): AdminUser,
    Path(date): Path<String>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|err| ServiceError::Validation(err.to_string()))?;
    let date = parse_date(&date)?;
    let summary = quiz_service::create_quiz(&state, date, payload).await?;
    Ok(ok(summary))
}

#[utoipa::path(
    post,
    path = "/admin/quiz/{date}/lock",
    tag = "admin",
    params(("date" = String, Path, description = "Quiz date, YYYY-MM-DD")),
    responses((status = 200, description = "Quiz locked", body = TransitionResponse))
)]
/// Freeze the question list ahead of the live window.
pub async fn lock_quiz(
    State(state): State<SharedState>,
    AdminUser(claims): AdminUser,
    Path(date): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    transition(&state, &date, QuizState::Locked, claims.sub).await
}

#[utoipa::path(
    post,
    path = "/admin/quiz/{date}/start",
    tag = "admin",
    params(("date" = String, Path, description = "Quiz date, YYYY-MM-DD")),
    responses((status = 200, description = "Quiz live", body = TransitionResponse))
)]
/// Start the quiz ahead of (or instead of) the scheduler.
pub async fn start_quiz(
    State(state): State<SharedState>,
    AdminUser(claims): AdminUser,
    Path(date): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    transition(&state, &date, QuizState::Live, claims.sub).await
}

#[utoipa::path(
    post,
    path = "/admin/quiz/{date}/end",
    tag = "admin",
    params(("date" = String, Path, description = "Quiz date, YYYY-MM-DD")),
    responses((status = 200, description = "Quiz ended and finalization started", body = TransitionResponse))
)]
/// End the live window and kick off finalization.
pub async fn end_quiz(
    State(state): State<SharedState>,
    AdminUser(claims): AdminUser,
    Path(date): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let response = transition(&state, &date, QuizState::Ended, claims.sub.clone()).await?;

    let date = parse_date(&date)?;
    if let Err(err) =
        finalize_service::finalize(&state, date, Actor::Admin(claims.sub), false).await
    {
        tracing::warn!(%date, %err, "finalization after admin end failed");
    }

    Ok(response)
}

#[utoipa::path(
    post,
    path = "/admin/quiz/{date}/publish",
    tag = "admin",
    params(("date" = String, Path, description = "Quiz date, YYYY-MM-DD")),
    responses((status = 200, description = "Results published", body = TransitionResponse))
)]
/// Make the finalized results visible to participants.
pub async fn publish_results(
    State(state): State<SharedState>,
    AdminUser(claims): AdminUser,
    Path(date): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    transition(&state, &date, QuizState::ResultPublished, claims.sub).await
}

#[utoipa::path(
    post,
    path = "/admin/quiz/{date}/force-finalize",
    tag = "admin",
    params(("date" = String, Path, description = "Quiz date, YYYY-MM-DD")),
    responses((status = 200, description = "Finalization re-run", body = FinalizeResponse))
)]
/// Disaster recovery: recompute winners regardless of the fence token.
pub async fn force_finalize(
    State(state): State<SharedState>,
    SuperAdminUser(claims): SuperAdminUser,
    Path(date): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let date = parse_date(&date)?;
    let summary = finalize_service::finalize(&state, date, Actor::Admin(claims.sub), true)
        .await?
        .ok_or_else(|| ServiceError::Internal("forced finalization did not run".into()))?;
    Ok(ok(summary))
}
