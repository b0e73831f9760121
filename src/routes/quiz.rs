use std::net::SocketAddr;

use axum::{
    Json, Router,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use validator::Validate;

use crate::{
    clock::QuizDate,
    dto::{
        common::ok,
        quiz::{
            AnswerRequest, AnswerResponse, CurrentQuestionResponse, FinishResponse, JoinRequest,
            JoinResponse, LeaderboardRow, QuizStatusResponse, TodayQuizResponse,
        },
    },
    error::{AppError, ServiceError},
    services::{
        admission_service::{self, DeviceInfo},
        answer_service, question_service, quiz_service,
        auth::{AuthUser, MaybeUser},
    },
    state::SharedState,
    utils::hash,
};

/// Participant-facing quiz routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/quiz/today", get(today))
        .route("/quiz/status", get(status))
        .route("/quiz/join", post(join))
        .route("/quiz/current-question", get(current_question))
        .route("/quiz/answer", post(answer))
        .route("/quiz/finish", post(finish))
        .route("/quiz/leaderboard/{date}", get(leaderboard))
}

#[utoipa::path(
    get,
    path = "/quiz/today",
    tag = "quiz",
    responses((status = 200, description = "Today's quiz overview", body = TodayQuizResponse))
)]
/// Overview of today's quiz, personalised when a bearer token is present.
pub async fn today(
    State(state): State<SharedState>,
    MaybeUser(claims): MaybeUser,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.as_ref().map(|claims| claims.sub.as_str());
    let response = quiz_service::today(&state, user_id).await?;
    Ok(ok(response))
}

#[utoipa::path(
    get,
    path = "/quiz/status",
    tag = "quiz",
    responses(
        (status = 200, description = "Current lifecycle state", body = QuizStatusResponse),
        (status = 304, description = "State unchanged since the provided ETag")
    )
)]
/// Lightweight state poll with ETag support and a server-advised interval.
pub async fn status(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let response = quiz_service::status(&state).await?;
    let etag = format!("\"{}\"", hash::sha256_hex(&["quiz-status", &response.state]));

    if let Some(candidate) = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok())
        && candidate == etag
    {
        return Ok((
            StatusCode::NOT_MODIFIED,
            [(header::ETAG, etag), (poll_interval_header(), "5".to_owned())],
        )
            .into_response());
    }

    Ok((
        [(header::ETAG, etag), (poll_interval_header(), "5".to_owned())],
        ok(response),
    )
        .into_response())
}

fn poll_interval_header() -> header::HeaderName {
    header::HeaderName::from_static("x-poll-interval")
}

#[utoipa::path(
    post,
    path = "/quiz/join",
    tag = "quiz",
    request_body = JoinRequest,
    responses((status = 200, description = "Attempt admitted or re-joined", body = JoinResponse))
)]
/// Join today's live quiz; idempotent for the same user, date, and device.
pub async fn join(
    State(state): State<SharedState>,
    AuthUser(claims): AuthUser,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(payload): Json<JoinRequest>,
) -> Result<Response, AppError> {
    payload
        .validate()
        .map_err(|err| ServiceError::Validation(err.to_string()))?;

    let device = DeviceInfo {
        device_id: payload.device_id,
        fingerprint: payload.device_fingerprint,
        ip: peer.ip().to_string(),
    };
    let outcome = admission_service::join(&state, &claims.sub, device).await?;

    let mut response = ok(outcome.response).into_response();
    if outcome.limiter_degraded {
        response.headers_mut().insert(
            header::HeaderName::from_static("x-ratelimit-degraded"),
            header::HeaderValue::from_static("true"),
        );
    }
    Ok(response)
}

#[utoipa::path(
    get,
    path = "/quiz/current-question",
    tag = "quiz",
    responses((status = 200, description = "The caller's current question", body = CurrentQuestionResponse))
)]
/// Serve the caller's view of the shared current slot.
pub async fn current_question(
    State(state): State<SharedState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let response = question_service::current_question(&state, &claims.sub).await?;
    Ok(ok(response))
}

#[utoipa::path(
    post,
    path = "/quiz/answer",
    tag = "quiz",
    request_body = AnswerRequest,
    responses((status = 200, description = "Answer recorded (or already present)", body = AnswerResponse))
)]
/// Submit an answer for the current slot.
pub async fn answer(
    State(state): State<SharedState>,
    AuthUser(claims): AuthUser,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(payload): Json<AnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|err| ServiceError::Validation(err.to_string()))?;

    let device = DeviceInfo {
        device_id: payload.device_id.clone(),
        fingerprint: payload.device_fingerprint.clone(),
        ip: peer.ip().to_string(),
    };
    let response = answer_service::submit_answer(&state, &claims.sub, payload, device).await?;
    Ok(ok(response))
}

#[utoipa::path(
    post,
    path = "/quiz/finish",
    tag = "quiz",
    responses((status = 200, description = "Attempt marked complete", body = FinishResponse))
)]
/// Mark the caller's attempt complete and return the provisional score.
pub async fn finish(
    State(state): State<SharedState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let response = answer_service::finish(&state, &claims.sub).await?;
    Ok(ok(response))
}

#[utoipa::path(
    get,
    path = "/quiz/leaderboard/{date}",
    tag = "quiz",
    params(("date" = String, Path, description = "Quiz date, YYYY-MM-DD")),
    responses((status = 200, description = "Ranked winner rows", body = [LeaderboardRow]))
)]
/// Published leaderboard; only readable once the quiz has ended.
pub async fn leaderboard(
    State(state): State<SharedState>,
    Path(date): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let date: QuizDate = date
        .parse()
        .map_err(|_| ServiceError::Validation("dates use the YYYY-MM-DD form".into()))?;
    let rows = quiz_service::leaderboard(&state, date).await?;
    Ok(ok(rows))
}
