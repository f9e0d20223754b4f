//! Redis client construction and error mapping.

use flightline_core::{AppError, AppResult};
use redis::aio::ConnectionManager;

/// Opens a Redis client without connecting.
pub fn open_redis_client(redis_url: &str) -> AppResult<redis::Client> {
    redis::Client::open(redis_url)
        .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))
}

/// Connects a reconnecting, multiplexed connection shared by the command adapters.
pub async fn connect_redis(client: &redis::Client) -> AppResult<ConnectionManager> {
    ConnectionManager::new(client.clone())
        .await
        .map_err(|error| unavailable("failed to connect to redis", error))
}

/// Sends `PING` and checks the reply.
pub async fn ping_redis(connection: &ConnectionManager) -> AppResult<()> {
    let mut connection = connection.clone();
    let reply: String = redis::cmd("PING")
        .query_async(&mut connection)
        .await
        .map_err(|error| unavailable("redis ping failed", error))?;

    if reply.eq_ignore_ascii_case("pong") {
        Ok(())
    } else {
        Err(AppError::StoreUnavailable(format!(
            "unexpected redis ping response: {reply}"
        )))
    }
}

pub(crate) fn unavailable(context: &str, error: redis::RedisError) -> AppError {
    AppError::StoreUnavailable(format!("{context}: {error}"))
}
