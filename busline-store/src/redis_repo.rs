use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;
use uuid::Uuid;

use busline_core::hold::{Acquired, SeatHoldStore};
use busline_core::repository::RateLimiter;
use busline_core::{CoreError, CoreResult};

// Set-if-absent (1), or refresh the TTL when the caller already holds the
// seat (2). 0 when another token holds it.
const ACQUIRE_SCRIPT: &str = r#"
    local current = redis.call("GET", KEYS[1])
    if not current then
        redis.call("SET", KEYS[1], ARGV[1], "EX", ARGV[2])
        return 1
    elseif current == ARGV[1] then
        redis.call("EXPIRE", KEYS[1], ARGV[2])
        return 2
    end
    return 0
"#;

const RELEASE_SCRIPT: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("DEL", KEYS[1])
    end
    return 0
"#;

// Fixed window: the TTL is set by the first hit only, so retries while
// blocked do not push the reset out.
const RATE_LIMIT_SCRIPT: &str = r#"
    local count = redis.call("INCR", KEYS[1])
    if count == 1 then
        redis.call("EXPIRE", KEYS[1], ARGV[1])
    end
    return count
"#;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> CoreResult<redis::aio::MultiplexedConnection> {
        self.client.get_multiplexed_async_connection().await.map_err(redis_err)
    }
}

fn hold_key(trip_id: Uuid, seat: &str) -> String {
    format!("hold:{}:{}", trip_id, seat)
}

fn acquired_from_reply(reply: i64) -> Acquired {
    match reply {
        1 => Acquired::Fresh,
        2 => Acquired::Refreshed,
        _ => Acquired::Taken,
    }
}

fn redis_err(err: redis::RedisError) -> CoreError {
    CoreError::Storage(format!("Redis: {}", err))
}

#[async_trait]
impl SeatHoldStore for RedisClient {
    async fn acquire(&self, trip_id: Uuid, seat: &str, token: &str, ttl_seconds: u64) -> CoreResult<Acquired> {
        let mut conn = self.connection().await?;
        let acquired: i64 = redis::Script::new(ACQUIRE_SCRIPT)
            .key(hold_key(trip_id, seat))
            .arg(token)
            .arg(ttl_seconds)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err)?;
        debug!("Hold acquire {}:{} -> {}", trip_id, seat, acquired);
        Ok(acquired_from_reply(acquired))
    }

    async fn release(&self, trip_id: Uuid, seat: &str, token: &str) -> CoreResult<bool> {
        let mut conn = self.connection().await?;
        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(hold_key(trip_id, seat))
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(deleted == 1)
    }

    async fn holder(&self, trip_id: Uuid, seat: &str) -> CoreResult<Option<String>> {
        let mut conn = self.connection().await?;
        conn.get(hold_key(trip_id, seat)).await.map_err(redis_err)
    }

    async fn clear(&self, trip_id: Uuid, seat: &str) -> CoreResult<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(hold_key(trip_id, seat)).await.map_err(redis_err)
    }
}

#[async_trait]
impl RateLimiter for RedisClient {
    async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> CoreResult<bool> {
        let mut conn = self.connection().await?;

        let count: i64 = redis::Script::new(RATE_LIMIT_SCRIPT)
            .key(key)
            .arg(window_seconds)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err)?;

        Ok(count <= limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_reply_mapping() {
        assert_eq!(acquired_from_reply(1), Acquired::Fresh);
        assert_eq!(acquired_from_reply(2), Acquired::Refreshed);
        assert_eq!(acquired_from_reply(0), Acquired::Taken);
    }

    #[test]
    fn test_rate_limit_expiry_only_on_first_hit() {
        assert!(RATE_LIMIT_SCRIPT.contains("if count == 1 then"));
        assert_eq!(RATE_LIMIT_SCRIPT.matches("EXPIRE").count(), 1);
    }

    #[test]
    fn test_hold_key_layout() {
        let trip = Uuid::nil();
        assert_eq!(hold_key(trip, "01A"), "hold:00000000-0000-0000-0000-000000000000:01A");
    }
}
