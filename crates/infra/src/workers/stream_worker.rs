//! Redis stream consumer.
//!
//! Drains the `transactions` stream into the ledger and the
//! `user-actions` stream into the audit table. Entries are keyed by their
//! stream id, so a replay after a crash is idempotent.

use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use sqlx::PgPool;

use coffer_ledger::NewTransaction;

use crate::cache::{UserAction, TRANSACTIONS_STREAM, USER_ACTIONS_STREAM};
use crate::repositories::transactions::TransactionsRepository;

const BLOCK_MILLIS: usize = 1_000;
const BATCH_SIZE: usize = 100;

pub struct StreamWorker {
    redis: ConnectionManager,
    transactions: TransactionsRepository,
    pool: PgPool,
}

impl StreamWorker {
    pub fn new(redis: ConnectionManager, transactions: TransactionsRepository, pool: PgPool) -> Self {
        Self {
            redis,
            transactions,
            pool,
        }
    }

    pub async fn run(self) {
        // "$" starts at the stream tail; replays are only for entries that
        // arrive while this worker is alive.
        let mut last_transaction_id = "$".to_string();
        let mut last_action_id = "$".to_string();

        loop {
            match self
                .read_batch(&last_transaction_id, &last_action_id)
                .await
            {
                Ok(reply) => {
                    for key in reply.keys {
                        for entry in key.ids {
                            let Some(data) = entry_data(&entry) else {
                                tracing::warn!(stream = %key.key, id = %entry.id, "stream entry without data field");
                                continue;
                            };

                            match key.key.as_str() {
                                TRANSACTIONS_STREAM => {
                                    self.handle_transaction(&data).await;
                                    last_transaction_id = entry.id.clone();
                                }
                                USER_ACTIONS_STREAM => {
                                    self.handle_user_action(&entry.id, &data).await;
                                    last_action_id = entry.id.clone();
                                }
                                other => {
                                    tracing::warn!(stream = other, "unexpected stream key");
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("stream read failed, backing off: {e}");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn read_batch(
        &self,
        last_transaction_id: &str,
        last_action_id: &str,
    ) -> Result<StreamReadReply, redis::RedisError> {
        let mut conn = self.redis.clone();
        let opts = StreamReadOptions::default()
            .count(BATCH_SIZE)
            .block(BLOCK_MILLIS);

        conn.xread_options(
            &[TRANSACTIONS_STREAM, USER_ACTIONS_STREAM],
            &[last_transaction_id, last_action_id],
            &opts,
        )
        .await
    }

    async fn handle_transaction(&self, data: &str) {
        let new: NewTransaction = match serde_json::from_str(data) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!("undecodable transaction on stream: {e}");
                return;
            }
        };

        match self.transactions.insert_transaction(&new).await {
            Ok((inserted, attempted)) => {
                tracing::debug!(
                    external_id = %new.external_id,
                    inserted,
                    attempted,
                    "ledger rows written from stream"
                );
            }
            Err(e) => {
                tracing::error!(external_id = %new.external_id, "stream transaction insert failed: {e}");
            }
        }
    }

    async fn handle_user_action(&self, stream_id: &str, data: &str) {
        let action: UserAction = match serde_json::from_str(data) {
            Ok(a) => a,
            Err(e) => {
                tracing::error!("undecodable user action on stream: {e}");
                return;
            }
        };

        let result = sqlx::query(
            r#"
            INSERT INTO user_actions (action, user_id, info, occurred_at, stream_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (stream_id) DO NOTHING
            "#,
        )
        .bind(&action.action)
        .bind(action.user_id.map(uuid::Uuid::from))
        .bind(&action.info)
        .bind(action.occurred_at)
        .bind(stream_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::error!(stream_id, "user action insert failed: {e}");
        }
    }
}

fn entry_data(entry: &redis::streams::StreamId) -> Option<String> {
    entry
        .map
        .get("data")
        .and_then(|v| redis::from_redis_value::<String>(v).ok())
}
