use async_trait::async_trait;
use chrono::Duration;
use redis::{AsyncCommands, RedisResult};
use uuid::Uuid;
use vaamoose_core::repository::SessionStore;
use vaamoose_core::session::ReservationSession;
use vaamoose_core::{CoreError, CoreResult};

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter; true while `key` is within `limit` for the current window.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

fn session_key(id: Uuid) -> String {
    format!("session:{}", id)
}

fn redis_err(err: redis::RedisError) -> CoreError {
    CoreError::InternalError(format!("session store error: {}", err))
}

/// Reservation sessions as JSON strings with a TTL; Redis drops abandoned ones on its own.
#[async_trait]
impl SessionStore for RedisClient {
    async fn save(&self, session: &ReservationSession, ttl: Duration) -> CoreResult<()> {
        let payload = serde_json::to_string(session).map_err(CoreError::internal)?;
        let ttl_seconds = ttl.num_seconds().max(1) as u64;

        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(redis_err)?;
        conn.set_ex::<_, _, ()>(session_key(session.id), payload, ttl_seconds)
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<ReservationSession>> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(redis_err)?;
        let payload: Option<String> = conn.get(session_key(id)).await.map_err(redis_err)?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(CoreError::internal))
            .transpose()
    }

    async fn delete(&self, id: Uuid) -> CoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(redis_err)?;
        conn.del::<_, ()>(session_key(id)).await.map_err(redis_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_layout() {
        let id = Uuid::nil();
        assert_eq!(session_key(id), "session:00000000-0000-0000-0000-000000000000");
    }
}
