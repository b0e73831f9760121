//! MongoDB-backed coordinator for multi-process deployments. Counters live
//! in a single collection driven by atomic `find_one_and_update` operations;
//! claims ride a TTL index.

use std::time::Duration;

use futures::future::BoxFuture;
use mongodb::{
    Client, Collection, Database,
    bson::{DateTime as BsonDateTime, doc},
    options::{IndexOptions, ReturnDocument},
};
use serde::{Deserialize, Serialize};

use super::{AdvancePosition, Coordinator, CoordinatorError, CoordinatorResult};
use crate::clock::QuizDate;

const COUNTER_COLLECTION: &str = "coordinator_counters";
const CLAIM_COLLECTION: &str = "coordinator_claims";

#[derive(Debug, Serialize, Deserialize)]
struct CounterDocument {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    value: i64,
    #[serde(default)]
    started_at: Option<BsonDateTime>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClaimDocument {
    #[serde(rename = "_id")]
    id: String,
    expire_at: BsonDateTime,
}

/// Coordinator backend over a shared MongoDB database.
#[derive(Clone)]
pub struct MongoCoordinator {
    database: Database,
}

impl MongoCoordinator {
    /// Connect and ensure the claim TTL index exists.
    pub async fn connect(uri: &str, database_name: &str) -> CoordinatorResult<Self> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|err| CoordinatorError::Unavailable {
                message: err.to_string(),
            })?;
        let database = client.database(database_name);

        let ttl_index = mongodb::IndexModel::builder()
            .keys(doc! {"expire_at": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("claim_expiry_idx".to_owned()))
                    .expire_after(Some(Duration::ZERO))
                    .build(),
            )
            .build();
        database
            .collection::<ClaimDocument>(CLAIM_COLLECTION)
            .create_index(ttl_index)
            .await
            .map_err(|err| CoordinatorError::Unavailable {
                message: err.to_string(),
            })?;

        Ok(Self { database })
    }

    fn counters(&self) -> Collection<CounterDocument> {
        self.database.collection(COUNTER_COLLECTION)
    }

    fn claims(&self) -> Collection<ClaimDocument> {
        self.database.collection(CLAIM_COLLECTION)
    }
}

fn unavailable(err: mongodb::error::Error) -> CoordinatorError {
    CoordinatorError::Unavailable {
        message: err.to_string(),
    }
}

impl Coordinator for MongoCoordinator {
    fn position(
        &self,
        date: QuizDate,
    ) -> BoxFuture<'static, CoordinatorResult<Option<AdvancePosition>>> {
        let coordinator = self.clone();
        Box::pin(async move {
            let document = coordinator
                .counters()
                .find_one(doc! {"_id": format!("advance:{date}")})
                .await
                .map_err(unavailable)?;

            Ok(document.and_then(|counter| {
                let started_at = counter.started_at.map(|stamp| {
                    chrono::DateTime::from_timestamp_millis(stamp.timestamp_millis())
                        .unwrap_or_default()
                })?;
                Some(AdvancePosition {
                    index: counter.value.max(0) as u32,
                    started_at,
                })
            }))
        })
    }

    fn advance_to(
        &self,
        date: QuizDate,
        position: AdvancePosition,
    ) -> BoxFuture<'static, CoordinatorResult<()>> {
        let coordinator = self.clone();
        Box::pin(async move {
            let stamp = BsonDateTime::from_millis(position.started_at.timestamp_millis());
            // $max keeps the index monotonic under duplicate ticks; the
            // started_at stamp only moves forward together with the index.
            coordinator
                .counters()
                .update_one(
                    doc! {
                        "_id": format!("advance:{date}"),
                        "$or": [
                            {"value": {"$lt": position.index as i64}},
                            {"value": {"$exists": false}},
                        ],
                    },
                    doc! {"$set": {"value": position.index as i64, "started_at": stamp}},
                )
                .upsert(true)
                .await
                .map(|_| ())
                .or_else(|err| {
                    // A concurrent tick with a higher index makes the upsert
                    // race on _id; losing that race is the desired outcome.
                    if err.to_string().contains("E11000") {
                        Ok(())
                    } else {
                        Err(unavailable(err))
                    }
                })
        })
    }

    fn acquire_finalize_token(
        &self,
        date: QuizDate,
    ) -> BoxFuture<'static, CoordinatorResult<u64>> {
        let coordinator = self.clone();
        Box::pin(async move {
            let document = coordinator
                .counters()
                .find_one_and_update(
                    doc! {"_id": format!("finalize:{date}")},
                    doc! {"$inc": {"value": 1}},
                )
                .upsert(true)
                .return_document(ReturnDocument::After)
                .await
                .map_err(unavailable)?
                .ok_or_else(|| CoordinatorError::Unavailable {
                    message: "finalize counter upsert returned nothing".into(),
                })?;
            Ok(document.value.max(0) as u64)
        })
    }

    fn acquire_join_slot(
        &self,
        date: QuizDate,
        cap: u32,
    ) -> BoxFuture<'static, CoordinatorResult<bool>> {
        let coordinator = self.clone();
        Box::pin(async move {
            let document = coordinator
                .counters()
                .find_one_and_update(
                    doc! {"_id": format!("join:{date}")},
                    doc! {"$inc": {"value": 1}},
                )
                .upsert(true)
                .return_document(ReturnDocument::After)
                .await
                .map_err(unavailable)?
                .ok_or_else(|| CoordinatorError::Unavailable {
                    message: "join counter upsert returned nothing".into(),
                })?;

            if document.value > cap as i64 {
                coordinator
                    .counters()
                    .update_one(
                        doc! {"_id": format!("join:{date}")},
                        doc! {"$inc": {"value": -1}},
                    )
                    .await
                    .map_err(unavailable)?;
                return Ok(false);
            }
            Ok(true)
        })
    }

    fn release_join_slot(&self, date: QuizDate) -> BoxFuture<'static, CoordinatorResult<()>> {
        let coordinator = self.clone();
        Box::pin(async move {
            coordinator
                .counters()
                .update_one(
                    doc! {"_id": format!("join:{date}"), "value": {"$gt": 0}},
                    doc! {"$inc": {"value": -1}},
                )
                .await
                .map_err(unavailable)?;
            Ok(())
        })
    }

    fn claim_key(
        &self,
        namespace: &'static str,
        key: String,
        ttl: Duration,
    ) -> BoxFuture<'static, CoordinatorResult<bool>> {
        let coordinator = self.clone();
        Box::pin(async move {
            let expire_at = BsonDateTime::from_millis(
                chrono::Utc::now().timestamp_millis() + ttl.as_millis() as i64,
            );
            let claim = ClaimDocument {
                id: format!("{namespace}:{key}"),
                expire_at,
            };

            match coordinator.claims().insert_one(&claim).await {
                Ok(_) => Ok(true),
                Err(err) if err.to_string().contains("E11000") => Ok(false),
                Err(err) => Err(unavailable(err)),
            }
        })
    }

    fn health_check(&self) -> BoxFuture<'static, CoordinatorResult<()>> {
        let coordinator = self.clone();
        Box::pin(async move {
            coordinator
                .database
                .run_command(doc! {"ping": 1})
                .await
                .map(|_| ())
                .map_err(unavailable)
        })
    }
}
