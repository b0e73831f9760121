use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for BrainRush Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::quiz::today,
        crate::routes::quiz::status,
        crate::routes::quiz::join,
        crate::routes::quiz::current_question,
        crate::routes::quiz::answer,
        crate::routes::quiz::finish,
        crate::routes::quiz::leaderboard,
        crate::routes::websocket::ws_handler,
        crate::routes::webhook::payment_webhook,
        crate::routes::admin::create_quiz,
        crate::routes::admin::lock_quiz,
        crate::routes::admin::start_quiz,
        crate::routes::admin::end_quiz,
        crate::routes::admin::publish_results,
        crate::routes::admin::force_finalize,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::quiz::TodayQuizResponse,
            crate::dto::quiz::TodayQuiz,
            crate::dto::quiz::QuizStatusResponse,
            crate::dto::quiz::JoinRequest,
            crate::dto::quiz::JoinResponse,
            crate::dto::quiz::CurrentQuestionResponse,
            crate::dto::quiz::AnswerRequest,
            crate::dto::quiz::AnswerResponse,
            crate::dto::quiz::FinishResponse,
            crate::dto::quiz::LeaderboardRow,
            crate::dto::admin::CreateQuizRequest,
            crate::dto::admin::QuestionInput,
            crate::dto::admin::QuizSummary,
            crate::dto::admin::TransitionResponse,
            crate::dto::admin::FinalizeResponse,
            crate::dto::webhook::PaymentWebhookEvent,
            crate::dto::webhook::WebhookAck,
            crate::dto::ws::QuizRoomEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "quiz", description = "Participant-facing quiz flow"),
        (name = "push", description = "WebSocket room per quiz date"),
        (name = "webhook", description = "Payment gateway callbacks"),
        (name = "admin", description = "Lifecycle and recovery operations"),
    )
)]
pub struct ApiDoc;
