use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database,
    bson::{Document, doc},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        AntiCheatDocument, AttemptDocument, AuditDocument, OpsMetricDocument, PaymentDocument,
        ProgressDocument, QuizDocument, WinnerDocument,
    },
};
use crate::{
    clock::QuizDate,
    dao::{
        models::{
            AntiCheatEventEntity, AntiCheatKind, AttemptEntity, AuditEntity, EligibilityReason,
            OpsMetricEntity, PaymentEntity, PaymentStatus, ProgressEntity, QuizEntity,
            WinnerEntity,
        },
        quiz_store::{AttemptAdmission, QuizStore},
        storage::StorageResult,
    },
    state::lifecycle::QuizState,
};

const QUIZ_COLLECTION: &str = "quizzes";
const ATTEMPT_COLLECTION: &str = "attempts";
const PAYMENT_COLLECTION: &str = "payments";
const WINNER_COLLECTION: &str = "winners";
const PROGRESS_COLLECTION: &str = "progress";
const AUDIT_COLLECTION: &str = "audit_log";
const ANTICHEAT_COLLECTION: &str = "anticheat_events";
const METRIC_COLLECTION: &str = "ops_metrics";

/// Field stamped when a quiz enters `state`.
fn timestamp_field(state: QuizState) -> &'static str {
    match state {
        QuizState::Draft => "created_at",
        QuizState::Scheduled => "scheduled_at",
        QuizState::Locked => "locked_at",
        QuizState::PaymentClosed => "payment_closed_at",
        QuizState::Live => "live_at",
        QuizState::Ended => "ended_at",
        QuizState::Finalized => "finalized_at",
        QuizState::ResultPublished => "result_published_at",
    }
}

#[derive(Clone)]
pub struct MongoQuizStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoQuizStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let unique = |keys: Document, name: &str| {
            mongodb::IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .name(Some(name.to_owned()))
                        .unique(Some(true))
                        .build(),
                )
                .build()
        };
        let plain = |keys: Document, name: &str| {
            mongodb::IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().name(Some(name.to_owned())).build())
                .build()
        };

        let ensure = async |collection: &'static str, index: &'static str, model| {
            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })
                .map(|_| ())
        };

        ensure(
            ATTEMPT_COLLECTION,
            "user_id,date",
            unique(doc! {"user_id": 1, "date": 1}, "attempt_user_date_idx"),
        )
        .await?;
        ensure(
            PAYMENT_COLLECTION,
            "user_id,date",
            unique(doc! {"user_id": 1, "date": 1}, "payment_user_date_idx"),
        )
        .await?;
        ensure(
            WINNER_COLLECTION,
            "date,rank",
            unique(doc! {"date": 1, "rank": 1}, "winner_date_rank_idx"),
        )
        .await?;
        ensure(
            WINNER_COLLECTION,
            "date,user_id",
            unique(doc! {"date": 1, "user_id": 1}, "winner_date_user_idx"),
        )
        .await?;
        ensure(
            PROGRESS_COLLECTION,
            "user_id,date",
            plain(doc! {"user_id": 1, "date": 1}, "progress_user_date_idx"),
        )
        .await?;
        // TTL: the server reaps progress rows once expire_at passes.
        ensure(
            PROGRESS_COLLECTION,
            "expire_at",
            mongodb::IndexModel::builder()
                .keys(doc! {"expire_at": 1})
                .options(
                    IndexOptions::builder()
                        .name(Some("progress_expiry_idx".to_owned()))
                        .expire_after(Some(std::time::Duration::ZERO))
                        .build(),
                )
                .build(),
        )
        .await?;
        ensure(
            ANTICHEAT_COLLECTION,
            "date,user_id,kind",
            plain(
                doc! {"date": 1, "user_id": 1, "kind": 1},
                "anticheat_date_user_idx",
            ),
        )
        .await?;
        ensure(
            AUDIT_COLLECTION,
            "date",
            plain(doc! {"date": 1}, "audit_date_idx"),
        )
        .await?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn client(&self) -> Client {
        let guard = self.inner.state.read().await;
        guard.client.clone()
    }

    async fn quizzes(&self) -> Collection<QuizDocument> {
        self.database().await.collection(QUIZ_COLLECTION)
    }

    async fn attempts(&self) -> Collection<AttemptDocument> {
        self.database().await.collection(ATTEMPT_COLLECTION)
    }

    async fn payments(&self) -> Collection<PaymentDocument> {
        self.database().await.collection(PAYMENT_COLLECTION)
    }

    async fn winners(&self) -> Collection<WinnerDocument> {
        self.database().await.collection(WINNER_COLLECTION)
    }

    async fn find_attempt_doc(
        &self,
        user_id: &str,
        date: QuizDate,
    ) -> MongoResult<Option<AttemptEntity>> {
        let document = self
            .attempts()
            .await
            .find_one(doc! {"user_id": user_id, "date": date.to_string()})
            .await
            .map_err(|source| MongoDaoError::operation("load attempt", source))?;
        Ok(document.map(Into::into))
    }

    async fn upsert_quiz(&self, quiz: QuizEntity) -> MongoResult<()> {
        let document: QuizDocument = quiz.into();
        self.quizzes()
            .await
            .replace_one(doc! {"_id": document.date.to_string()}, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::operation("save quiz", source))?;
        Ok(())
    }

    async fn find_quiz(&self, date: QuizDate) -> MongoResult<Option<QuizEntity>> {
        let document = self
            .quizzes()
            .await
            .find_one(doc! {"_id": date.to_string()})
            .await
            .map_err(|source| MongoDaoError::operation("load quiz", source))?;
        Ok(document.map(Into::into))
    }

    async fn transition_quiz(
        &self,
        date: QuizDate,
        from: QuizState,
        to: QuizState,
        at: DateTime<Utc>,
    ) -> MongoResult<QuizEntity> {
        let stamp = mongodb::bson::DateTime::from_millis(at.timestamp_millis());
        let updated = self
            .quizzes()
            .await
            .find_one_and_update(
                doc! {"_id": date.to_string(), "state": from.as_str()},
                doc! {"$set": {"state": to.as_str(), timestamp_field(to): stamp}},
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::operation("transition quiz", source))?;

        match updated {
            Some(document) => Ok(document.into()),
            None => match self.find_quiz(date).await? {
                Some(quiz) => Err(MongoDaoError::Precondition {
                    message: format!(
                        "quiz {date} is {:?}, expected {from:?}",
                        quiz.state
                    ),
                }),
                None => Err(MongoDaoError::Missing {
                    message: format!("quiz {date}"),
                }),
            },
        }
    }

    async fn create_attempt(&self, attempt: AttemptEntity) -> MongoResult<AttemptAdmission> {
        let user_id = attempt.user_id.clone();
        let date = attempt.date;
        let document: AttemptDocument = attempt.clone().into();

        match self.attempts().await.insert_one(&document).await {
            Ok(_) => Ok(AttemptAdmission {
                attempt,
                created: true,
            }),
            Err(source) => match MongoDaoError::operation("create attempt", source) {
                MongoDaoError::Duplicate { .. } => {
                    let existing = self
                        .find_attempt_doc(&user_id, date)
                        .await?
                        .ok_or_else(|| MongoDaoError::Missing {
                            message: format!("attempt {user_id}/{date}"),
                        })?;
                    Ok(AttemptAdmission {
                        attempt: existing,
                        created: false,
                    })
                }
                other => Err(other),
            },
        }
    }

    async fn commit_served_question(
        &self,
        user_id: String,
        date: QuizDate,
        slot: usize,
        question_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> MongoResult<AttemptEntity> {
        let stamp = mongodb::bson::DateTime::from_millis(sent_at.timestamp_millis());
        let served_field = format!("served_question_ids.{slot}");
        let sent_field = format!("question_sent_times.{slot}");
        let question_bson = mongodb::bson::to_bson(&question_id)
            .map_err(|err| MongoDaoError::Precondition {
                message: format!("serialize question id: {err}"),
            })?;

        self.attempts()
            .await
            .update_one(
                doc! {
                    "user_id": &user_id,
                    "date": date.to_string(),
                    served_field.as_str(): null,
                },
                doc! {"$set": {served_field.as_str(): question_bson, sent_field.as_str(): stamp}},
            )
            .await
            .map_err(|source| MongoDaoError::operation("commit served question", source))?;

        self.find_attempt_doc(&user_id, date)
            .await?
            .ok_or_else(|| MongoDaoError::Missing {
                message: format!("attempt {user_id}/{date}"),
            })
    }

    async fn record_answer(
        &self,
        user_id: String,
        date: QuizDate,
        slot: usize,
        original_option: u8,
        answered_at: DateTime<Utc>,
    ) -> MongoResult<()> {
        let stamp = mongodb::bson::DateTime::from_millis(answered_at.timestamp_millis());
        let answer_field = format!("answers.{slot}");
        let time_field = format!("answer_times.{slot}");

        let result = self
            .attempts()
            .await
            .update_one(
                doc! {
                    "user_id": &user_id,
                    "date": date.to_string(),
                    answer_field.as_str(): null,
                },
                doc! {"$set": {answer_field.as_str(): original_option as i32, time_field.as_str(): stamp}},
            )
            .await
            .map_err(|source| MongoDaoError::operation("record answer", source))?;

        if result.modified_count == 0 {
            return match self.find_attempt_doc(&user_id, date).await? {
                Some(_) => Err(MongoDaoError::Precondition {
                    message: format!("slot {slot} already answered"),
                }),
                None => Err(MongoDaoError::Missing {
                    message: format!("attempt {user_id}/{date}"),
                }),
            };
        }
        Ok(())
    }

    async fn set_completed(
        &self,
        user_id: String,
        date: QuizDate,
        completed_at: DateTime<Utc>,
    ) -> MongoResult<AttemptEntity> {
        let stamp = mongodb::bson::DateTime::from_millis(completed_at.timestamp_millis());
        self.attempts()
            .await
            .update_one(
                doc! {"user_id": &user_id, "date": date.to_string(), "completed_at": null},
                doc! {"$set": {"completed_at": stamp, "answers_saved": true}},
            )
            .await
            .map_err(|source| MongoDaoError::operation("complete attempt", source))?;

        self.find_attempt_doc(&user_id, date)
            .await?
            .ok_or_else(|| MongoDaoError::Missing {
                message: format!("attempt {user_id}/{date}"),
            })
    }

    async fn replace_winners(
        &self,
        date: QuizDate,
        winners: Vec<WinnerEntity>,
    ) -> MongoResult<()> {
        let client = self.client().await;
        let collection = self.winners().await;
        let documents: Vec<WinnerDocument> = winners.into_iter().map(Into::into).collect();

        let mut session = client
            .start_session()
            .await
            .map_err(|source| MongoDaoError::operation("start winners session", source))?;
        session
            .start_transaction()
            .await
            .map_err(|source| MongoDaoError::operation("start winners transaction", source))?;

        let outcome: MongoResult<()> = async {
            collection
                .delete_many(doc! {"date": date.to_string()})
                .session(&mut session)
                .await
                .map_err(|source| MongoDaoError::operation("clear winners", source))?;
            if !documents.is_empty() {
                collection
                    .insert_many(&documents)
                    .session(&mut session)
                    .await
                    .map_err(|source| MongoDaoError::operation("insert winners", source))?;
            }
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => session
                .commit_transaction()
                .await
                .map_err(|source| MongoDaoError::operation("commit winners", source)),
            Err(err) => {
                let _ = session.abort_transaction().await;
                Err(err)
            }
        }
    }
}

impl QuizStore for MongoQuizStore {
    fn upsert_quiz(&self, quiz: QuizEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_quiz(quiz).await.map_err(Into::into) })
    }

    fn find_quiz(&self, date: QuizDate) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_quiz(date).await.map_err(Into::into) })
    }

    fn transition_quiz(
        &self,
        date: QuizDate,
        from: QuizState,
        to: QuizState,
        at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<QuizEntity>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .transition_quiz(date, from, to, at)
                .await
                .map_err(Into::into)
        })
    }

    fn set_eligible_count(
        &self,
        date: QuizDate,
        count: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .quizzes()
                .await
                .update_one(
                    doc! {"_id": date.to_string()},
                    doc! {"$set": {"eligible_count": count as i64}},
                )
                .await
                .map_err(|source| MongoDaoError::operation("snapshot eligible count", source))?;
            Ok(())
        })
    }

    fn create_attempt(
        &self,
        attempt: AttemptEntity,
    ) -> BoxFuture<'static, StorageResult<AttemptAdmission>> {
        let store = self.clone();
        Box::pin(async move { store.create_attempt(attempt).await.map_err(Into::into) })
    }

    fn find_attempt(
        &self,
        user_id: String,
        date: QuizDate,
    ) -> BoxFuture<'static, StorageResult<Option<AttemptEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_attempt_doc(&user_id, date)
                .await
                .map_err(Into::into)
        })
    }

    fn commit_served_question(
        &self,
        user_id: String,
        date: QuizDate,
        slot: usize,
        question_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<AttemptEntity>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .commit_served_question(user_id, date, slot, question_id, sent_at)
                .await
                .map_err(Into::into)
        })
    }

    fn record_answer(
        &self,
        user_id: String,
        date: QuizDate,
        slot: usize,
        original_option: u8,
        answered_at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .record_answer(user_id, date, slot, original_option, answered_at)
                .await
                .map_err(Into::into)
        })
    }

    fn set_completed(
        &self,
        user_id: String,
        date: QuizDate,
        completed_at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<AttemptEntity>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .set_completed(user_id, date, completed_at)
                .await
                .map_err(Into::into)
        })
    }

    fn mark_suspicious(
        &self,
        user_id: String,
        date: QuizDate,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .attempts()
                .await
                .update_one(
                    doc! {"user_id": &user_id, "date": date.to_string()},
                    doc! {"$set": {"suspicious": true}},
                )
                .await
                .map_err(|source| MongoDaoError::operation("mark suspicious", source))?;
            Ok(())
        })
    }

    fn apply_finalization(
        &self,
        user_id: String,
        date: QuizDate,
        score: u32,
        counted: bool,
        reason: EligibilityReason,
        finalized_at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let stamp = mongodb::bson::DateTime::from_millis(finalized_at.timestamp_millis());
            let reason_bson =
                mongodb::bson::to_bson(&reason).map_err(|err| MongoDaoError::Precondition {
                    message: format!("serialize reason: {err}"),
                })?;
            store
                .attempts()
                .await
                .update_one(
                    doc! {"user_id": &user_id, "date": date.to_string()},
                    doc! {"$set": {
                        "score": score as i64,
                        "counted": counted,
                        "counted_reason": reason_bson,
                        "finalized_at": stamp,
                    }},
                )
                .await
                .map_err(|source| MongoDaoError::operation("finalize attempt", source))?;
            Ok(())
        })
    }

    fn list_attempts(
        &self,
        date: QuizDate,
    ) -> BoxFuture<'static, StorageResult<Vec<AttemptEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let documents: Vec<AttemptDocument> = store
                .attempts()
                .await
                .find(doc! {"date": date.to_string()})
                .await
                .map_err(|source| MongoDaoError::operation("list attempts", source))?
                .try_collect()
                .await
                .map_err(|source| MongoDaoError::operation("list attempts", source))?;
            Ok(documents.into_iter().map(Into::into).collect())
        })
    }

    fn save_payment(&self, payment: PaymentEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let allowed: Vec<&str> = PaymentStatus::ALL
                .into_iter()
                .filter(|status| *status == payment.status || status.can_become(payment.status))
                .map(PaymentStatus::as_str)
                .collect();
            let document: PaymentDocument = payment.into();

            // Regressions miss this filter; the unique index then turns the
            // resulting upsert-insert into a duplicate-key conflict.
            store
                .payments()
                .await
                .replace_one(
                    doc! {
                        "user_id": &document.user_id,
                        "date": document.date.to_string(),
                        "status": {"$in": allowed},
                    },
                    &document,
                )
                .upsert(true)
                .await
                .map_err(|source| MongoDaoError::operation("save payment", source))?;
            Ok(())
        })
    }

    fn find_payment(
        &self,
        user_id: String,
        date: QuizDate,
    ) -> BoxFuture<'static, StorageResult<Option<PaymentEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store
                .payments()
                .await
                .find_one(doc! {"user_id": &user_id, "date": date.to_string()})
                .await
                .map_err(|source| MongoDaoError::operation("load payment", source))?;
            Ok(document.map(Into::into))
        })
    }

    fn count_successful_payments(
        &self,
        date: QuizDate,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            let count = store
                .payments()
                .await
                .count_documents(doc! {
                    "date": date.to_string(),
                    "status": PaymentStatus::Success.as_str(),
                })
                .await
                .map_err(|source| MongoDaoError::operation("count payments", source))?;
            Ok(count)
        })
    }

    fn replace_winners(
        &self,
        date: QuizDate,
        winners: Vec<WinnerEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.replace_winners(date, winners).await.map_err(Into::into) })
    }

    fn list_winners(&self, date: QuizDate) -> BoxFuture<'static, StorageResult<Vec<WinnerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let documents: Vec<WinnerDocument> = store
                .winners()
                .await
                .find(doc! {"date": date.to_string()})
                .sort(doc! {"rank": 1})
                .await
                .map_err(|source| MongoDaoError::operation("list winners", source))?
                .try_collect()
                .await
                .map_err(|source| MongoDaoError::operation("list winners", source))?;
            Ok(documents.into_iter().map(Into::into).collect())
        })
    }

    fn record_progress(&self, progress: ProgressEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let document: ProgressDocument = progress.into();
            store
                .database()
                .await
                .collection::<ProgressDocument>(PROGRESS_COLLECTION)
                .insert_one(&document)
                .await
                .map_err(|source| MongoDaoError::operation("record progress", source))?;
            Ok(())
        })
    }

    fn list_progress(
        &self,
        user_id: String,
        date: QuizDate,
    ) -> BoxFuture<'static, StorageResult<Vec<ProgressEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let documents: Vec<ProgressDocument> = store
                .database()
                .await
                .collection(PROGRESS_COLLECTION)
                .find(doc! {"user_id": &user_id, "date": date.to_string()})
                .sort(doc! {"slot": 1})
                .await
                .map_err(|source| MongoDaoError::operation("list progress", source))?
                .try_collect()
                .await
                .map_err(|source| MongoDaoError::operation("list progress", source))?;
            Ok(documents.into_iter().map(Into::into).collect())
        })
    }

    fn append_audit(&self, entry: AuditEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let document: AuditDocument = entry.into();
            store
                .database()
                .await
                .collection::<AuditDocument>(AUDIT_COLLECTION)
                .insert_one(&document)
                .await
                .map_err(|source| MongoDaoError::operation("append audit", source))?;
            Ok(())
        })
    }

    fn record_anticheat(
        &self,
        event: AntiCheatEventEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let document: AntiCheatDocument = event.into();
            store
                .database()
                .await
                .collection::<AntiCheatDocument>(ANTICHEAT_COLLECTION)
                .insert_one(&document)
                .await
                .map_err(|source| MongoDaoError::operation("record anticheat event", source))?;
            Ok(())
        })
    }

    fn count_anticheat(
        &self,
        date: QuizDate,
        user_id: String,
        kind: AntiCheatKind,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            let count = store
                .database()
                .await
                .collection::<AntiCheatDocument>(ANTICHEAT_COLLECTION)
                .count_documents(doc! {
                    "date": date.to_string(),
                    "user_id": &user_id,
                    "kind": kind.as_str(),
                })
                .await
                .map_err(|source| MongoDaoError::operation("count anticheat events", source))?;
            Ok(count)
        })
    }

    fn record_metric(&self, metric: OpsMetricEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let document: OpsMetricDocument = metric.into();
            store
                .database()
                .await
                .collection::<OpsMetricDocument>(METRIC_COLLECTION)
                .insert_one(&document)
                .await
                .map_err(|source| MongoDaoError::operation("record metric", source))?;
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
