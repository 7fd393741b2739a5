//! PostgreSQL implementation of the store port using SQLx.
//!
//! # Type Conversions
//!
//! PostgreSQL uses signed integers (i32, i64) for numeric columns while the
//! domain uses unsigned types. These casts are safe because:
//! - Block heights won't exceed i64::MAX (~9 quintillion)
//! - Result codes fit in i32
//! - Indices within a block fit in i32
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::Row;
use tracing::{debug, instrument};

use crate::config::DatabaseSettings;
use crate::error::{InfraError, Result};
use crate::ports::{EventDataset, IndexerStore, ParserKind, ParserTracker, TxDataset};
use crate::types::{
    BlockRecord, EventBatch, EventWrapper, FailureReason, Height, LifecyclePosition, TxBatch,
};

// ═══════════════════════════════════════════════════════════════════════════════
// POSTGRES STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// PostgreSQL-based store implementation.
///
/// Implements the store port using SQLx. Every write is an upsert on its
/// natural key, making the committer's one-shot retry and concurrent
/// failed-block bookkeeping safe.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new store with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool from database settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be established.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.connect_timeout())
            .idle_timeout(settings.idle_timeout())
            .connect(&settings.url)
            .await
            .map_err(InfraError::Database)?;
        Ok(Self::new(pool))
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| InfraError::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Upsert the block row inside an open transaction, returning its id.
    async fn upsert_block_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        block: &BlockRecord,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO blocks (chain_id, height, time, proposer, hash)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (chain_id, height) DO UPDATE
                SET time = EXCLUDED.time,
                    proposer = EXCLUDED.proposer,
                    hash = EXCLUDED.hash
            RETURNING id
            "#,
        )
        .bind(&block.chain_id)
        .bind(block.height.value() as i64)
        .bind(block.timestamp)
        .bind(&block.proposer)
        .bind(&block.hash)
        .fetch_one(&mut **tx)
        .await
        .map_err(InfraError::Database)?;

        Ok(row.get::<i64, _>("id"))
    }

    /// Upsert one event row inside an open transaction, returning its id.
    async fn upsert_event_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        block_row_id: i64,
        event: &EventWrapper,
    ) -> Result<i64> {
        let attributes: Vec<serde_json::Value> = event
            .attributes
            .iter()
            .map(|(k, v)| serde_json::json!({"key": k, "value": v}))
            .collect();

        let row = sqlx::query(
            r#"
            INSERT INTO block_events (block_id, position, event_index, event_type, attributes)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (block_id, position, event_index) DO UPDATE
                SET event_type = EXCLUDED.event_type,
                    attributes = EXCLUDED.attributes
            RETURNING id
            "#,
        )
        .bind(block_row_id)
        .bind(event.position.as_str())
        .bind(event.event_index as i32)
        .bind(&event.kind)
        .bind(Json(attributes))
        .fetch_one(&mut **tx)
        .await
        .map_err(InfraError::Database)?;

        Ok(row.get::<i64, _>("id"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STORE PORT IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl IndexerStore for PostgresStore {
    #[instrument(skip(self))]
    async fn upsert_chain(&self, chain_id: &str, chain_name: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO chains (chain_id, chain_name)
            VALUES ($1, $2)
            ON CONFLICT (chain_id) DO UPDATE SET chain_name = EXCLUDED.chain_name
            RETURNING id
            "#,
        )
        .bind(chain_id)
        .bind(chain_name)
        .fetch_one(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(row.get::<i64, _>("id"))
    }

    #[instrument(skip(self, batch), fields(height = %batch.block.height, txs = batch.txs.len()))]
    async fn index_new_block(&self, batch: &TxBatch) -> Result<TxDataset> {
        let mut tx = self.pool.begin().await.map_err(InfraError::Database)?;

        let block_row_id = Self::upsert_block_tx(&mut tx, &batch.block).await?;

        let mut dataset = TxDataset {
            block_row_id,
            ..TxDataset::default()
        };

        for wrapper in &batch.txs {
            let row = sqlx::query(
                r#"
                INSERT INTO txs (block_id, tx_index, hash, code)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (block_id, tx_index) DO UPDATE
                    SET hash = EXCLUDED.hash,
                        code = EXCLUDED.code
                RETURNING id
                "#,
            )
            .bind(block_row_id)
            .bind(wrapper.tx_index as i32)
            .bind(&wrapper.hash)
            .bind(wrapper.code as i32)
            .fetch_one(&mut *tx)
            .await
            .map_err(InfraError::Database)?;

            let tx_row_id = row.get::<i64, _>("id");
            dataset.tx_row_ids.push(tx_row_id);

            for message in &wrapper.messages {
                let row = sqlx::query(
                    r#"
                    INSERT INTO messages (tx_id, message_index, type_url, value)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (tx_id, message_index) DO UPDATE
                        SET type_url = EXCLUDED.type_url,
                            value = EXCLUDED.value
                    RETURNING id
                    "#,
                )
                .bind(tx_row_id)
                .bind(message.message_index as i32)
                .bind(&message.type_url)
                .bind(Json(message.value.clone()))
                .fetch_one(&mut *tx)
                .await
                .map_err(InfraError::Database)?;

                dataset
                    .message_row_ids
                    .insert((wrapper.tx_index, message.message_index), row.get::<i64, _>("id"));
            }
        }

        tx.commit().await.map_err(InfraError::Database)?;

        debug!(height = %batch.block.height, "Block committed");
        Ok(dataset)
    }

    #[instrument(skip(self, batch), fields(height = %batch.block.height, events = batch.len()))]
    async fn index_block_events(&self, batch: &EventBatch, dry_run: bool) -> Result<EventDataset> {
        if dry_run {
            return Ok(EventDataset::default());
        }

        let mut tx = self.pool.begin().await.map_err(InfraError::Database)?;

        let block_row_id = Self::upsert_block_tx(&mut tx, &batch.block).await?;

        let mut dataset = EventDataset {
            block_row_id,
            ..EventDataset::default()
        };

        for event in batch.begin_events.iter().chain(batch.end_events.iter()) {
            let row_id = Self::upsert_event_tx(&mut tx, block_row_id, event).await?;
            dataset
                .event_row_ids
                .insert((event.position, event.event_index), row_id);
        }

        tx.commit().await.map_err(InfraError::Database)?;

        debug!(height = %batch.block.height, "Block events committed");
        Ok(dataset)
    }

    #[instrument(skip_all, fields(height = %batch.block.height))]
    async fn index_custom_messages(
        &self,
        dataset: &TxDataset,
        batch: &TxBatch,
        trackers: &HashMap<String, ParserTracker>,
    ) -> Result<()> {
        for wrapper in &batch.txs {
            for message in &wrapper.messages {
                for (parser_id, value) in &message.artifacts {
                    let Some(tracker) = trackers.get(parser_id) else {
                        continue;
                    };
                    let Some(message_row_id) = dataset
                        .message_row_ids
                        .get(&(wrapper.tx_index, message.message_index))
                    else {
                        continue;
                    };

                    sqlx::query(
                        r#"
                        INSERT INTO custom_message_artifacts (parser_id, message_id, value)
                        VALUES ($1, $2, $3)
                        ON CONFLICT (parser_id, message_id) DO UPDATE
                            SET value = EXCLUDED.value
                        "#,
                    )
                    .bind(tracker.row_id)
                    .bind(message_row_id)
                    .bind(Json(value.clone()))
                    .execute(&self.pool)
                    .await
                    .map_err(InfraError::Database)?;
                }
            }
        }
        Ok(())
    }

    #[instrument(skip_all, fields(height = %batch.block.height))]
    async fn index_custom_block_events(
        &self,
        dataset: &EventDataset,
        batch: &EventBatch,
        trackers: &HashMap<String, ParserTracker>,
    ) -> Result<()> {
        for event in batch.begin_events.iter().chain(batch.end_events.iter()) {
            for (parser_id, value) in &event.artifacts {
                let Some(tracker) = trackers.get(parser_id) else {
                    continue;
                };
                let Some(event_row_id) =
                    dataset.event_row_ids.get(&(event.position, event.event_index))
                else {
                    continue;
                };

                sqlx::query(
                    r#"
                    INSERT INTO custom_block_event_artifacts (parser_id, event_id, value)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (parser_id, event_id) DO UPDATE
                        SET value = EXCLUDED.value
                    "#,
                )
                .bind(tracker.row_id)
                .bind(event_row_id)
                .bind(Json(value.clone()))
                .execute(&self.pool)
                .await
                .map_err(InfraError::Database)?;
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn upsert_failed_block(
        &self,
        height: Height,
        chain_id: &str,
        chain_name: &str,
        reason: FailureReason,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO failed_blocks (chain_id, chain_name, height, reason)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (chain_id, height) DO UPDATE
                SET reason = EXCLUDED.reason,
                    chain_name = EXCLUDED.chain_name
            "#,
        )
        .bind(chain_id)
        .bind(chain_name)
        .bind(height.value() as i64)
        .bind(reason.as_str())
        .execute(&self.pool)
        .await
        .map_err(InfraError::Database)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn upsert_failed_event_block(
        &self,
        height: Height,
        chain_id: &str,
        chain_name: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO failed_event_blocks (chain_id, chain_name, height)
            VALUES ($1, $2, $3)
            ON CONFLICT (chain_id, height) DO UPDATE
                SET chain_name = EXCLUDED.chain_name
            "#,
        )
        .bind(chain_id)
        .bind(chain_name)
        .bind(height.value() as i64)
        .execute(&self.pool)
        .await
        .map_err(InfraError::Database)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_or_create_custom_message_parsers(
        &self,
        identifiers: &[String],
    ) -> Result<HashMap<String, ParserTracker>> {
        let mut trackers = HashMap::new();
        for identifier in identifiers {
            let row = sqlx::query(
                r#"
                INSERT INTO custom_message_parsers (identifier)
                VALUES ($1)
                ON CONFLICT (identifier) DO UPDATE SET identifier = EXCLUDED.identifier
                RETURNING id
                "#,
            )
            .bind(identifier)
            .fetch_one(&self.pool)
            .await
            .map_err(InfraError::Database)?;

            trackers.insert(
                identifier.clone(),
                ParserTracker {
                    row_id: row.get::<i64, _>("id"),
                    identifier: identifier.clone(),
                    kind: ParserKind::Message,
                    position: None,
                },
            );
        }
        Ok(trackers)
    }

    #[instrument(skip(self))]
    async fn find_or_create_custom_block_event_parsers(
        &self,
        registrations: &[(String, LifecyclePosition)],
    ) -> Result<HashMap<String, ParserTracker>> {
        let mut trackers = HashMap::new();
        for (identifier, position) in registrations {
            let row = sqlx::query(
                r#"
                INSERT INTO custom_block_event_parsers (identifier, position)
                VALUES ($1, $2)
                ON CONFLICT (identifier) DO UPDATE SET position = EXCLUDED.position
                RETURNING id
                "#,
            )
            .bind(identifier)
            .bind(position.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(InfraError::Database)?;

            trackers.insert(
                identifier.clone(),
                ParserTracker {
                    row_id: row.get::<i64, _>("id"),
                    identifier: identifier.clone(),
                    kind: ParserKind::BlockEvent,
                    position: Some(*position),
                },
            );
        }
        Ok(trackers)
    }

    #[instrument(skip_all, fields(statements = ddl.len()))]
    async fn migrate_custom_models(&self, ddl: &[String]) -> Result<()> {
        for statement in ddl {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(InfraError::Database)?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn blocks_with_message_type(&self, message_type: &str) -> Result<Vec<Height>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT b.height
            FROM blocks b
            JOIN txs t ON t.block_id = b.id
            JOIN messages m ON m.tx_id = t.id
            WHERE m.type_url = $1
            ORDER BY b.height
            "#,
        )
        .bind(message_type)
        .fetch_all(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| Height::new(row.get::<i64, _>("height") as u64))
            .collect())
    }
}
