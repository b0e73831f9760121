pub mod admission_service;
pub mod advancement;
pub mod answer_service;
pub mod auth;
pub mod documentation;
pub mod eligibility;
pub mod finalize_service;
pub mod health_service;
pub mod observability;
pub mod payment_service;
pub mod push_service;
pub mod question_service;
pub mod quiz_service;
pub mod scheduler;
pub mod storage_supervisor;
