//! BSON document shapes. Timestamps are stored as native BSON dates so TTL
//! and range indexes work; everything else round-trips through serde.

use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    clock::QuizDate,
    dao::models::{
        AntiCheatEventEntity, AntiCheatKind, AttemptEntity, AuditEntity, EligibilityReason,
        EligibilitySnapshot, OpsMetricEntity, PaymentEntity, PaymentKind, PaymentStatus,
        ProgressEntity, QuestionEntity, QuizEntity, WinnerEntity,
    },
    state::lifecycle::{Actor, QuizState},
};

fn to_bson(value: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(value.timestamp_millis())
}

fn from_bson(value: BsonDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(value.timestamp_millis()).unwrap_or_default()
}

fn to_bson_opt(value: Option<DateTime<Utc>>) -> Option<BsonDateTime> {
    value.map(to_bson)
}

fn from_bson_opt(value: Option<BsonDateTime>) -> Option<DateTime<Utc>> {
    value.map(from_bson)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuizDocument {
    /// Civil date string, also the unique row key.
    #[serde(rename = "_id")]
    pub date: QuizDate,
    pub class_grade: String,
    pub state: QuizState,
    pub questions: Vec<QuestionEntity>,
    pub eligible_count: Option<u64>,
    pub created_at: BsonDateTime,
    pub scheduled_at: Option<BsonDateTime>,
    pub locked_at: Option<BsonDateTime>,
    pub payment_closed_at: Option<BsonDateTime>,
    pub live_at: Option<BsonDateTime>,
    pub ended_at: Option<BsonDateTime>,
    pub finalized_at: Option<BsonDateTime>,
    pub result_published_at: Option<BsonDateTime>,
}

impl From<QuizEntity> for QuizDocument {
    fn from(value: QuizEntity) -> Self {
        Self {
            date: value.date,
            class_grade: value.class_grade,
            state: value.state,
            questions: value.questions,
            eligible_count: value.eligible_count,
            created_at: to_bson(value.created_at),
            scheduled_at: to_bson_opt(value.scheduled_at),
            locked_at: to_bson_opt(value.locked_at),
            payment_closed_at: to_bson_opt(value.payment_closed_at),
            live_at: to_bson_opt(value.live_at),
            ended_at: to_bson_opt(value.ended_at),
            finalized_at: to_bson_opt(value.finalized_at),
            result_published_at: to_bson_opt(value.result_published_at),
        }
    }
}

impl From<QuizDocument> for QuizEntity {
    fn from(value: QuizDocument) -> Self {
        Self {
            date: value.date,
            class_grade: value.class_grade,
            state: value.state,
            questions: value.questions,
            eligible_count: value.eligible_count,
            created_at: from_bson(value.created_at),
            scheduled_at: from_bson_opt(value.scheduled_at),
            locked_at: from_bson_opt(value.locked_at),
            payment_closed_at: from_bson_opt(value.payment_closed_at),
            live_at: from_bson_opt(value.live_at),
            ended_at: from_bson_opt(value.ended_at),
            finalized_at: from_bson_opt(value.finalized_at),
            result_published_at: from_bson_opt(value.result_published_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AttemptDocument {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_id: String,
    pub date: QuizDate,
    pub permutation: Vec<u16>,
    pub option_perms: Vec<Vec<u8>>,
    pub answers: Vec<Option<u8>>,
    pub answer_times: Vec<Option<BsonDateTime>>,
    pub question_sent_times: Vec<Option<BsonDateTime>>,
    pub served_question_ids: Vec<Option<Uuid>>,
    pub device_hash: String,
    pub device_id_hash: String,
    pub eligible: bool,
    pub eligibility_reason: EligibilityReason,
    pub quiz_started_at: BsonDateTime,
    pub created_at: BsonDateTime,
    pub completed_at: Option<BsonDateTime>,
    pub answers_saved: bool,
    pub suspicious: bool,
    pub finalized_at: Option<BsonDateTime>,
    pub score: Option<u32>,
    pub counted: Option<bool>,
    pub counted_reason: Option<EligibilityReason>,
}

impl From<AttemptEntity> for AttemptDocument {
    fn from(value: AttemptEntity) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            date: value.date,
            permutation: value.permutation,
            option_perms: value.option_perms,
            answers: value.answers,
            answer_times: value.answer_times.into_iter().map(to_bson_opt).collect(),
            question_sent_times: value
                .question_sent_times
                .into_iter()
                .map(to_bson_opt)
                .collect(),
            served_question_ids: value.served_question_ids,
            device_hash: value.device_hash,
            device_id_hash: value.device_id_hash,
            eligible: value.eligibility.eligible,
            eligibility_reason: value.eligibility.reason,
            quiz_started_at: to_bson(value.quiz_started_at),
            created_at: to_bson(value.created_at),
            completed_at: to_bson_opt(value.completed_at),
            answers_saved: value.answers_saved,
            suspicious: value.suspicious,
            finalized_at: to_bson_opt(value.finalized_at),
            score: value.score,
            counted: value.counted,
            counted_reason: value.counted_reason,
        }
    }
}

impl From<AttemptDocument> for AttemptEntity {
    fn from(value: AttemptDocument) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            date: value.date,
            permutation: value.permutation,
            option_perms: value.option_perms,
            answers: value.answers,
            answer_times: value.answer_times.into_iter().map(from_bson_opt).collect(),
            question_sent_times: value
                .question_sent_times
                .into_iter()
                .map(from_bson_opt)
                .collect(),
            served_question_ids: value.served_question_ids,
            device_hash: value.device_hash,
            device_id_hash: value.device_id_hash,
            eligibility: EligibilitySnapshot {
                eligible: value.eligible,
                reason: value.eligibility_reason,
            },
            quiz_started_at: from_bson(value.quiz_started_at),
            created_at: from_bson(value.created_at),
            completed_at: from_bson_opt(value.completed_at),
            answers_saved: value.answers_saved,
            suspicious: value.suspicious,
            finalized_at: from_bson_opt(value.finalized_at),
            score: value.score,
            counted: value.counted,
            counted_reason: value.counted_reason,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentDocument {
    pub user_id: String,
    pub date: QuizDate,
    pub status: PaymentStatus,
    pub kind: PaymentKind,
    pub amount_minor: i64,
    pub order_id: Option<String>,
    pub capture_event_id: Option<String>,
    pub captured_at: Option<BsonDateTime>,
    pub refunded_at: Option<BsonDateTime>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

impl From<PaymentEntity> for PaymentDocument {
    fn from(value: PaymentEntity) -> Self {
        Self {
            user_id: value.user_id,
            date: value.date,
            status: value.status,
            kind: value.kind,
            amount_minor: value.amount_minor,
            order_id: value.order_id,
            capture_event_id: value.capture_event_id,
            captured_at: to_bson_opt(value.captured_at),
            refunded_at: to_bson_opt(value.refunded_at),
            created_at: to_bson(value.created_at),
            updated_at: to_bson(value.updated_at),
        }
    }
}

impl From<PaymentDocument> for PaymentEntity {
    fn from(value: PaymentDocument) -> Self {
        Self {
            user_id: value.user_id,
            date: value.date,
            status: value.status,
            kind: value.kind,
            amount_minor: value.amount_minor,
            order_id: value.order_id,
            capture_event_id: value.capture_event_id,
            captured_at: from_bson_opt(value.captured_at),
            refunded_at: from_bson_opt(value.refunded_at),
            created_at: from_bson(value.created_at),
            updated_at: from_bson(value.updated_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WinnerDocument {
    pub date: QuizDate,
    pub rank: u32,
    pub user_id: String,
    pub attempt_id: Uuid,
    pub score: u32,
    pub total_time_ms: i64,
    pub accuracy: f64,
    pub quiz_integrity_hash: String,
    pub attempt_integrity_hash: String,
    pub created_at: BsonDateTime,
}

impl From<WinnerEntity> for WinnerDocument {
    fn from(value: WinnerEntity) -> Self {
        Self {
            date: value.date,
            rank: value.rank,
            user_id: value.user_id,
            attempt_id: value.attempt_id,
            score: value.score,
            total_time_ms: value.total_time_ms,
            accuracy: value.accuracy,
            quiz_integrity_hash: value.quiz_integrity_hash,
            attempt_integrity_hash: value.attempt_integrity_hash,
            created_at: to_bson(value.created_at),
        }
    }
}

impl From<WinnerDocument> for WinnerEntity {
    fn from(value: WinnerDocument) -> Self {
        Self {
            date: value.date,
            rank: value.rank,
            user_id: value.user_id,
            attempt_id: value.attempt_id,
            score: value.score,
            total_time_ms: value.total_time_ms,
            accuracy: value.accuracy,
            quiz_integrity_hash: value.quiz_integrity_hash,
            attempt_integrity_hash: value.attempt_integrity_hash,
            created_at: from_bson(value.created_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProgressDocument {
    pub user_id: String,
    pub date: QuizDate,
    pub slot: u32,
    pub question_sent_at: BsonDateTime,
    pub answered_at: Option<BsonDateTime>,
    /// TTL index target; the server deletes the row past this instant.
    pub expire_at: BsonDateTime,
}

impl From<ProgressEntity> for ProgressDocument {
    fn from(value: ProgressEntity) -> Self {
        Self {
            user_id: value.user_id,
            date: value.date,
            slot: value.slot as u32,
            question_sent_at: to_bson(value.question_sent_at),
            answered_at: to_bson_opt(value.answered_at),
            expire_at: to_bson(value.expire_at),
        }
    }
}

impl From<ProgressDocument> for ProgressEntity {
    fn from(value: ProgressDocument) -> Self {
        Self {
            user_id: value.user_id,
            date: value.date,
            slot: value.slot as usize,
            question_sent_at: from_bson(value.question_sent_at),
            answered_at: from_bson_opt(value.answered_at),
            expire_at: from_bson(value.expire_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditDocument {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub date: QuizDate,
    pub actor: Actor,
    pub action: String,
    pub target: String,
    pub before: Option<String>,
    pub after: Option<String>,
    pub at: BsonDateTime,
}

impl From<AuditEntity> for AuditDocument {
    fn from(value: AuditEntity) -> Self {
        Self {
            id: value.id,
            date: value.date,
            actor: value.actor,
            action: value.action,
            target: value.target,
            before: value.before,
            after: value.after,
            at: to_bson(value.at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AntiCheatDocument {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub date: QuizDate,
    pub user_id: Option<String>,
    pub kind: AntiCheatKind,
    pub detail: String,
    pub ip: Option<String>,
    pub at: BsonDateTime,
}

impl From<AntiCheatEventEntity> for AntiCheatDocument {
    fn from(value: AntiCheatEventEntity) -> Self {
        Self {
            id: value.id,
            date: value.date,
            user_id: value.user_id,
            kind: value.kind,
            detail: value.detail,
            ip: value.ip,
            at: to_bson(value.at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpsMetricDocument {
    pub date: QuizDate,
    pub name: String,
    pub value: f64,
    pub detail: Option<String>,
    pub at: BsonDateTime,
}

impl From<OpsMetricEntity> for OpsMetricDocument {
    fn from(value: OpsMetricEntity) -> Self {
        Self {
            date: value.date,
            name: value.name,
            value: value.value,
            detail: value.detail,
            at: to_bson(value.at),
        }
    }
}
