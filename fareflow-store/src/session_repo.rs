use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fareflow_core::repository::{CachedOrder, SessionStore};
use redis::{AsyncCommands, RedisResult};
use tracing::warn;

// Snapshots and sync state are working state for an active shopping
// session; the celebration guard has to outlive redirects and reloads.
const SNAPSHOT_TTL_SECONDS: u64 = 60 * 60 * 24;
const SYNC_TTL_SECONDS: i64 = 60 * 60 * 24;
const CELEBRATION_TTL_SECONDS: u64 = 60 * 60 * 24 * 30;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    fn snapshot_key(order_reference: &str) -> String {
        format!("order:{}:snapshot", order_reference)
    }

    fn created_on_key(order_reference: &str) -> String {
        format!("order:{}:created-on", order_reference)
    }

    fn celebration_key(order_reference: &str) -> String {
        format!("order:{}:celebrated", order_reference)
    }

    fn sync_key(trace_id: &str, offer_id: &str) -> String {
        format!("sync:{}:{}", trace_id, offer_id)
    }

    pub async fn check_rate_limit(
        &self,
        key: &str,
        limit: i64,
        window_seconds: i64,
    ) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

#[async_trait]
impl SessionStore for RedisClient {
    async fn put_snapshot(
        &self,
        record: &CachedOrder,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = Self::snapshot_key(&record.snapshot.order_reference);
        let json = serde_json::to_string(record)?;
        conn.set_ex::<_, _, ()>(key, json, SNAPSHOT_TTL_SECONDS).await?;
        Ok(())
    }

    async fn get_snapshot(
        &self,
        order_reference: &str,
    ) -> Result<Option<CachedOrder>, Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(Self::snapshot_key(order_reference)).await?;
        match raw {
            Some(json) => match serde_json::from_str(&json) {
                Ok(record) => Ok(Some(record)),
                Err(err) => {
                    // A corrupt entry heals itself on the next put.
                    warn!(order_reference, error = %err, "discarding unreadable cached snapshot");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn record_created_on(
        &self,
        order_reference: &str,
        created_on: DateTime<Utc>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(
            Self::created_on_key(order_reference),
            created_on.to_rfc3339(),
            CELEBRATION_TTL_SECONDS,
        )
        .await?;
        Ok(())
    }

    async fn get_created_on(
        &self,
        order_reference: &str,
    ) -> Result<Option<DateTime<Utc>>, Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(Self::created_on_key(order_reference)).await?;
        match raw {
            Some(value) => Ok(Some(DateTime::parse_from_rfc3339(&value)?.with_timezone(&Utc))),
            None => Ok(None),
        }
    }

    async fn claim_celebration(
        &self,
        order_reference: &str,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // SET NX: the first claim wins, across reloads and redirects.
        let result: Option<String> = redis::cmd("SET")
            .arg(Self::celebration_key(order_reference))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(CELEBRATION_TTL_SECONDS)
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    async fn get_traveller_id(
        &self,
        trace_id: &str,
        offer_id: &str,
        pax_index: usize,
    ) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let id: Option<String> = conn
            .hget(Self::sync_key(trace_id, offer_id), pax_index.to_string())
            .await?;
        Ok(id)
    }

    async fn set_traveller_id(
        &self,
        trace_id: &str,
        offer_id: &str,
        pax_index: usize,
        traveller_id: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = Self::sync_key(trace_id, offer_id);
        conn.hset::<_, _, _, ()>(&key, pax_index.to_string(), traveller_id).await?;
        conn.expire::<_, ()>(&key, SYNC_TTL_SECONDS).await?;
        Ok(())
    }
}
